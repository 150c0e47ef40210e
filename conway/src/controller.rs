// controller.rs - Async driver for a Session
//
// One Tokio task owns the session, the repeating timer and the single
// outstanding advance. Callers talk to it through a cloneable SessionHandle;
// every mutation goes through its command queue, and observers follow state
// through a `watch` channel.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::grid::Board;
use crate::patterns;
use crate::render::{RenderError, RenderGateway};
use crate::session::{
    AdvanceRequest, Completion, Session, SessionError, SessionSnapshot, SessionState, Ticket,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Start(Reply<Result<(), SessionError>>),
    Pause(Reply<()>),
    Step(Reply<Result<Completion, SessionError>>),
    Regenerate(Reply<()>),
    Reset(Reply<()>),
    LoadPreset(String, Reply<Result<(), SessionError>>),
    UpdateConfig(Box<SessionConfig>, Reply<bool>),
    SetSettingsOpen(bool, Reply<()>),
    Shutdown(Reply<()>),
}

struct Finished {
    ticket: Ticket,
    result: Result<Board, RenderError>,
}

/// Cloneable front door to a running session controller task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Spawns the controller on the current Tokio runtime. The board RNG is
    /// seeded from the config's seed when set, otherwise from the OS.
    pub fn spawn<G: RenderGateway>(config: SessionConfig, gateway: G) -> Self {
        let rng = match config.seed() {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self::spawn_with_rng(config, gateway, rng)
    }

    pub fn spawn_with_rng<G: RenderGateway>(
        config: SessionConfig,
        gateway: G,
        rng: SmallRng,
    ) -> Self {
        let session = Session::new(config);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (snapshots_tx, snapshots_rx) = watch::channel(session.snapshot());
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        let controller = Controller {
            timer_period: session.config().tick_period(),
            session,
            gateway: Arc::new(gateway),
            rng,
            commands: commands_rx,
            finished_tx,
            finished_rx,
            snapshots: snapshots_tx,
            timer: None,
            task: None,
            pending_step: None,
        };
        tokio::spawn(controller.run());

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Seeds a board if needed and starts the timed loop.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(Command::Start).await?
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.request(Command::Pause).await
    }

    /// Advances once and waits for the result. Returns `Advanced` or
    /// `Converged`; a failed call comes back as [`SessionError::Render`].
    pub async fn step(&self) -> Result<Completion, SessionError> {
        self.request(Command::Step).await?
    }

    pub async fn regenerate(&self) -> Result<(), SessionError> {
        self.request(Command::Regenerate).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(Command::Reset).await
    }

    pub async fn load_preset(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.request(|reply| Command::LoadPreset(name, reply)).await?
    }

    /// Replaces the whole config; returns whether the board was re-seeded.
    pub async fn update_config(&self, config: SessionConfig) -> Result<bool, SessionError> {
        self.request(|reply| Command::UpdateConfig(Box::new(config), reply)).await
    }

    pub async fn set_settings_open(&self, open: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::SetSettingsOpen(open, reply)).await
    }

    /// Stops the controller, abandoning any advance in flight.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(Command::Shutdown).await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

struct Controller<G> {
    session: Session,
    gateway: Arc<G>,
    rng: SmallRng,
    commands: mpsc::Receiver<Command>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    snapshots: watch::Sender<SessionSnapshot>,
    timer: Option<Interval>,
    timer_period: Duration,
    task: Option<(Ticket, JoinHandle<()>)>,
    pending_step: Option<(Ticket, Reply<Result<Completion, SessionError>>)>,
}

/// Reply held back until the new state has been published, so a caller
/// that awaited a command always observes its effect in the next snapshot.
enum Ack {
    Done(Reply<()>),
    Outcome(Reply<Result<(), SessionError>>, Result<(), SessionError>),
    Stepped(Reply<Result<Completion, SessionError>>, Result<Completion, SessionError>),
    Reseeded(Reply<bool>, bool),
}

impl Ack {
    fn send(self) {
        // A caller that stopped waiting is not an error.
        let _ = match self {
            Ack::Done(reply) => reply.send(()).ok(),
            Ack::Outcome(reply, result) => reply.send(result).ok(),
            Ack::Stepped(reply, result) => reply.send(result).ok(),
            Ack::Reseeded(reply, reseeded) => reply.send(reseeded).ok(),
        };
    }
}

impl<G: RenderGateway> Controller<G> {
    async fn run(mut self) {
        info!("session controller started");
        loop {
            let ack = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.teardown();
                        Ack::Done(reply).send();
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.teardown();
                        break;
                    }
                },
                () = next_tick(&mut self.timer) => {
                    self.on_tick();
                    None
                }
                Some(finished) = self.finished_rx.recv() => self.on_finished(finished),
            };
            self.sync();
            if let Some(ack) = ack {
                ack.send();
            }
        }
        info!("session controller stopped");
    }

    fn handle(&mut self, command: Command) -> Option<Ack> {
        let ack = match command {
            Command::Start(reply) => Ack::Outcome(reply, self.session.start(&mut self.rng)),
            Command::Pause(reply) => {
                self.session.pause();
                Ack::Done(reply)
            }
            Command::Step(reply) => match self.session.step() {
                Ok(request) => {
                    self.pending_step = Some((request.ticket, reply));
                    self.dispatch(request);
                    return None;
                }
                Err(err) => Ack::Stepped(reply, Err(err)),
            },
            Command::Regenerate(reply) => {
                self.session.regenerate(&mut self.rng);
                Ack::Done(reply)
            }
            Command::Reset(reply) => {
                self.session.reset();
                Ack::Done(reply)
            }
            Command::LoadPreset(name, reply) => {
                let result = match patterns::find(&name) {
                    Some(preset) => {
                        self.session.load_preset(preset);
                        Ok(())
                    }
                    None => Err(SessionError::UnknownPreset(name)),
                };
                Ack::Outcome(reply, result)
            }
            Command::UpdateConfig(config, reply) => {
                let reseeded = self.session.update_config(*config, &mut self.rng);
                Ack::Reseeded(reply, reseeded)
            }
            Command::SetSettingsOpen(open, reply) => {
                self.session.set_settings_open(open);
                Ack::Done(reply)
            }
            Command::Shutdown(reply) => {
                self.teardown();
                Ack::Done(reply)
            }
        };
        Some(ack)
    }

    fn on_tick(&mut self) {
        if let Some(request) = self.session.tick() {
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: AdvanceRequest) {
        let AdvanceRequest { ticket, board } = request;
        let gateway = Arc::clone(&self.gateway);
        let finished = self.finished_tx.clone();
        debug!(?ticket, "advance dispatched");

        let handle = tokio::spawn(async move {
            let result = gateway.advance(&board).await;
            let _ = finished.send(Finished { ticket, result });
        });
        if let Some((_, previous)) = self.task.replace((ticket, handle)) {
            previous.abort();
        }
    }

    fn on_finished(&mut self, finished: Finished) -> Option<Ack> {
        let Finished { ticket, result } = finished;
        if self.task.as_ref().is_some_and(|(current, _)| *current == ticket) {
            self.task = None;
        }

        let completion = self.session.complete(ticket, result);
        if completion == Completion::Stale {
            return None;
        }

        match self.pending_step.take() {
            Some((pending, reply)) if pending == ticket => {
                let outcome = match completion {
                    Completion::Failed(err) => Err(SessionError::Render(err)),
                    other => Ok(other),
                };
                Some(Ack::Stepped(reply, outcome))
            }
            other => {
                self.pending_step = other;
                None
            }
        }
    }

    /// Brings the timer, the outstanding task and waiting callers in line
    /// with the session, then publishes the new snapshot.
    fn sync(&mut self) {
        let period = self.session.config().tick_period();
        if self.session.state() == SessionState::Running {
            if self.timer.is_none() || self.timer_period != period {
                self.timer = Some(repeating_timer(period));
                self.timer_period = period;
            }
        } else if self.timer.take().is_some() {
            debug!("loop timer cancelled");
        }

        let in_flight = self.session.in_flight();
        if let Some((ticket, handle)) = &self.task {
            if in_flight != Some(*ticket) {
                handle.abort();
                self.task = None;
            }
        }

        self.publish();

        if let Some((ticket, _)) = &self.pending_step {
            if in_flight != Some(*ticket) {
                if let Some((_, reply)) = self.pending_step.take() {
                    Ack::Stepped(reply, Err(SessionError::Cancelled)).send();
                }
            }
        }
    }

    fn publish(&mut self) {
        let next = self.session.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Stops the loop, abandons the outstanding advance and publishes the
    /// final state.
    fn teardown(&mut self) {
        self.session.pause();
        self.session.cancel_in_flight();
        self.timer = None;
        if let Some((_, handle)) = self.task.take() {
            handle.abort();
        }
        self.publish();
        if let Some((_, reply)) = self.pending_step.take() {
            Ack::Stepped(reply, Err(SessionError::Cancelled)).send();
        }
    }
}

/// First tick lands one full period after the loop starts.
fn repeating_timer(period: Duration) -> Interval {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
