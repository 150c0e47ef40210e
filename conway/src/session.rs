// session.rs - Lifecycle state machine for one simulation session
//
// Pure and synchronous: the controller task feeds it commands, timer ticks
// and finished advances, and performs the advance requests it hands back.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::grid::Board;
use crate::patterns::{self, Preset};
use crate::render::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No board yet.
    #[default]
    Idle,
    /// Board present, loop not advancing.
    Paused,
    /// Timer-driven loop advancing the board.
    Running,
    /// A single explicit step is in flight.
    Stepping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Paused => "paused",
            SessionState::Running => "running",
            SessionState::Stepping => "stepping",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no board to advance")]
    NoBoard,
    #[error("cannot step while the simulation is running")]
    Running,
    #[error("an advance is already in flight")]
    Busy,
    #[error("the advance was abandoned before it completed")]
    Cancelled,
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("session controller has shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceKind {
    Tick,
    Step,
}

/// Identifies one outstanding advance. A result is applied only while its
/// ticket is still the session's in-flight ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    kind: AdvanceKind,
}

impl Ticket {
    pub fn kind(&self) -> AdvanceKind {
        self.kind
    }
}

/// An advance the caller must perform, reporting back through
/// [`Session::complete`].
#[derive(Debug, Clone)]
pub struct AdvanceRequest {
    pub ticket: Ticket,
    pub board: Board,
}

/// What a finished advance did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Board replaced by the next generation.
    Advanced,
    /// Next generation equals the current one; a running loop paused.
    Converged,
    /// The call failed; error recorded, loop paused.
    Failed(RenderError),
    /// The ticket was no longer current; result discarded.
    Stale,
}

/// Read-only view of a session published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub board: Option<Board>,
    pub last_error: Option<String>,
    pub generation: u64,
    pub settings_open: bool,
    pub config: Arc<SessionConfig>,
}

#[derive(Debug)]
pub struct Session {
    config: Arc<SessionConfig>,
    state: SessionState,
    board: Option<Board>,
    last_error: Option<String>,
    generation: u64,
    settings_open: bool,
    epoch: u64,
    in_flight: Option<Ticket>,
    resume: SessionState,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: SessionState::Idle,
            board: None,
            last_error: None,
            generation: 0,
            settings_open: true,
            epoch: 0,
            in_flight: None,
            resume: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings_open(&self) -> bool {
        self.settings_open
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.in_flight == Some(ticket)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            board: self.board.clone(),
            last_error: self.last_error.clone(),
            generation: self.generation,
            settings_open: self.settings_open,
            config: Arc::clone(&self.config),
        }
    }

    /// Seeds a board if there is none and enters `Running`.
    pub fn start<R: Rng>(&mut self, rng: &mut R) -> Result<(), SessionError> {
        match self.state {
            SessionState::Running => return Ok(()),
            SessionState::Stepping => return Err(SessionError::Busy),
            SessionState::Idle | SessionState::Paused => {}
        }
        if self.board.is_none() {
            self.seed(rng);
        }
        self.transition(SessionState::Running);
        Ok(())
    }

    /// `Running -> Paused`, abandoning any tick in flight. No effect elsewhere.
    pub fn pause(&mut self) {
        if self.state == SessionState::Running {
            self.cancel_in_flight();
            self.transition(SessionState::Paused);
        }
    }

    /// Timer tick. Returns the advance to perform, or `None` when the tick is
    /// dropped (not running, or an advance is still outstanding).
    pub fn tick(&mut self) -> Option<AdvanceRequest> {
        if self.state != SessionState::Running {
            return None;
        }
        if self.in_flight.is_some() {
            debug!(generation = self.generation, "tick dropped: advance still in flight");
            return None;
        }
        let board = self.board.clone()?;
        Some(self.issue(AdvanceKind::Tick, board))
    }

    /// Begins a single explicit step from `Idle`/`Paused`.
    pub fn step(&mut self) -> Result<AdvanceRequest, SessionError> {
        match self.state {
            SessionState::Running => return Err(SessionError::Running),
            SessionState::Stepping => return Err(SessionError::Busy),
            SessionState::Idle | SessionState::Paused => {}
        }
        let board = self.board.clone().ok_or(SessionError::NoBoard)?;
        self.resume = self.state;
        self.transition(SessionState::Stepping);
        Ok(self.issue(AdvanceKind::Step, board))
    }

    /// Applies a finished advance if its ticket is still current.
    pub fn complete(&mut self, ticket: Ticket, result: Result<Board, RenderError>) -> Completion {
        if !self.is_current(ticket) {
            debug!(?ticket, "discarding stale advance result");
            return Completion::Stale;
        }
        self.in_flight = None;

        let after = match ticket.kind {
            AdvanceKind::Tick => SessionState::Running,
            AdvanceKind::Step => self.resume,
        };

        match result {
            Ok(next) if self.board.as_ref() == Some(&next) => {
                self.last_error = None;
                if ticket.kind == AdvanceKind::Tick {
                    info!(generation = self.generation, "board converged; pausing");
                    self.transition(SessionState::Paused);
                } else {
                    self.transition(after);
                }
                Completion::Converged
            }
            Ok(next) => {
                self.board = Some(next);
                self.generation += 1;
                self.last_error = None;
                self.transition(after);
                Completion::Advanced
            }
            Err(err) => {
                warn!(error = %err, kind = ?ticket.kind, "advance failed");
                self.last_error = Some(format!("Error rendering generation: {err}"));
                let fallback = match ticket.kind {
                    AdvanceKind::Tick => SessionState::Paused,
                    AdvanceKind::Step => after,
                };
                self.transition(fallback);
                Completion::Failed(err)
            }
        }
    }

    /// Pauses, then replaces the board with a fresh random one.
    pub fn regenerate<R: Rng>(&mut self, rng: &mut R) {
        self.cancel_in_flight();
        self.seed(rng);
        self.transition(SessionState::Paused);
    }

    /// Pauses, then replaces the board with `preset`'s.
    pub fn load_preset(&mut self, preset: &Preset) {
        self.cancel_in_flight();
        self.replace_board(preset.board());
        info!(preset = preset.name, "preset loaded");
        self.transition(SessionState::Paused);
    }

    /// Back to `Idle`: no board, no error, settings open.
    pub fn reset(&mut self) {
        self.cancel_in_flight();
        self.board = None;
        self.last_error = None;
        self.generation = 0;
        self.settings_open = true;
        self.transition(SessionState::Idle);
    }

    /// Swaps in a new config. While settings are open a change to a seeding
    /// knob re-seeds (pausing first). Returns whether the board was re-seeded.
    pub fn update_config<R: Rng>(&mut self, config: SessionConfig, rng: &mut R) -> bool {
        let reseed = self.settings_open && self.config.seeding_differs(&config);
        self.config = Arc::new(config);
        if reseed {
            self.regenerate(rng);
        }
        reseed
    }

    pub fn set_settings_open(&mut self, open: bool) {
        self.settings_open = open;
    }

    /// Abandons whatever advance is outstanding. Its eventual result will
    /// be reported as stale. A step returns to the state it started from.
    pub fn cancel_in_flight(&mut self) {
        self.epoch += 1;
        if self.in_flight.take().is_some() && self.state == SessionState::Stepping {
            let resume = self.resume;
            self.transition(resume);
        }
    }

    fn issue(&mut self, kind: AdvanceKind, board: Board) -> AdvanceRequest {
        self.epoch += 1;
        let ticket = Ticket {
            epoch: self.epoch,
            kind,
        };
        self.in_flight = Some(ticket);
        AdvanceRequest { ticket, board }
    }

    fn seed<R: Rng>(&mut self, rng: &mut R) {
        let board = patterns::generate(
            self.config.dimensions(),
            self.config.density(),
            self.config.alive_chars(),
            rng,
        );
        self.replace_board(board);
    }

    fn replace_board(&mut self, board: Board) {
        debug!(dimensions = %board.dimensions(), alive = board.alive_count(), "board replaced");
        self.board = Some(board);
        self.last_error = None;
        self.generation = 0;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "session state changed");
            self.state = next;
        }
    }
}
