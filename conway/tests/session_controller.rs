use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use conway::codec;
use conway::{
    Board, Completion, RenderError, RenderGateway, SessionConfig, SessionError, SessionHandle,
    SessionSnapshot, SessionState,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::watch;

const PERIOD: Duration = Duration::from_millis(200);

#[derive(Clone, Copy)]
enum Reply {
    Echo,
    Clear,
    Fail,
    /// Swap the board with the blinker's other phase.
    Blink,
}

/// Scripted stand-in for the render service.
#[derive(Clone)]
struct StubGateway {
    reply: Reply,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StubGateway {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RenderGateway for StubGateway {
    async fn advance(&self, board: &Board) -> Result<Board, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.reply {
            Reply::Echo => Ok(board.clone()),
            Reply::Clear => Ok(Board::new(board.dimensions())),
            Reply::Fail => Err(RenderError::Transport("connection refused".to_string())),
            Reply::Blink => {
                let vertical = codec::decode("     \\n  O  \\n  O  \\n  O  \\n     ")
                    .expect("vertical blinker");
                let horizontal = codec::decode("     \\n     \\n OOO \\n     \\n     ")
                    .expect("horizontal blinker");
                Ok(if *board == horizontal { vertical } else { horizontal })
            }
        }
    }
}

fn config() -> SessionConfig {
    SessionConfig::builder()
        .dimensions(8, 6)
        .density(0.5)
        .alive_chars("O#")
        .tick_period(PERIOD)
        .build()
        .expect("valid config")
}

fn spawn(gateway: &StubGateway) -> SessionHandle {
    SessionHandle::spawn_with_rng(config(), gateway.clone(), SmallRng::seed_from_u64(42))
}

async fn wait_for(
    rx: &mut watch::Receiver<SessionSnapshot>,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(predicate))
        .await
        .expect("condition reached in time")
        .expect("controller still alive")
        .clone()
}

#[tokio::test(start_paused = true)]
async fn echoed_board_converges_after_one_tick() {
    let gateway = StubGateway::new(Reply::Echo);
    let session = spawn(&gateway);
    let mut rx = session.subscribe();

    session.start().await.expect("starts");
    let started = wait_for(&mut rx, |s| s.state == SessionState::Running).await;
    let seeded = started.board.clone().expect("start seeds a board");

    let settled = wait_for(&mut rx, |s| s.state == SessionState::Paused).await;
    assert_eq!(settled.board, Some(seeded));
    assert_eq!(settled.generation, 0);
    assert!(settled.last_error.is_none());
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn block_preset_settles_after_exactly_one_advance() {
    let gateway = StubGateway::new(Reply::Echo);
    let session = spawn(&gateway);
    let mut rx = session.subscribe();

    session.load_preset("block").await.expect("preset exists");
    let loaded = session.snapshot();
    assert_eq!(loaded.state, SessionState::Paused);
    let block = loaded.board.expect("preset board");
    assert_eq!(codec::encode(&block), "   \\n OO\\n OO");

    session.start().await.expect("starts");
    let settled = wait_for(&mut rx, |s| s.state == SessionState::Paused).await;
    assert_eq!(settled.board, Some(block));

    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_advance_suppresses_overlapping_ticks() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 5);
    let session = spawn(&gateway);

    session.start().await.expect("starts");
    tokio::time::sleep(PERIOD * 2 + PERIOD / 4).await;

    assert_eq!(gateway.calls(), 1);
    assert_eq!(session.snapshot().state, SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn loop_keeps_advancing_until_pause() {
    let gateway = StubGateway::new(Reply::Blink);
    let session = spawn(&gateway);
    let mut rx = session.subscribe();

    session.load_preset("blinker").await.expect("preset exists");
    session.start().await.expect("starts");

    // Period-2 oscillators never repeat their immediate predecessor.
    let later = wait_for(&mut rx, |s| s.generation >= 4).await;
    assert_eq!(later.state, SessionState::Running);

    session.pause().await.expect("pauses");
    let paused = session.snapshot();
    assert_eq!(paused.state, SessionState::Paused);

    let calls = gateway.calls();
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(gateway.calls(), calls);
    assert_eq!(session.snapshot().generation, paused.generation);
}

#[tokio::test(start_paused = true)]
async fn tick_failure_pauses_and_surfaces_error() {
    let gateway = StubGateway::new(Reply::Fail);
    let session = spawn(&gateway);
    let mut rx = session.subscribe();

    session.start().await.expect("starts");
    let board = session.snapshot().board;
    let failed = wait_for(&mut rx, |s| s.state == SessionState::Paused).await;

    assert_eq!(failed.board, board);
    let message = failed.last_error.expect("error recorded");
    assert!(message.contains("connection refused"), "{message}");

    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_step_keeps_state_and_board() {
    let gateway = StubGateway::new(Reply::Fail);
    let session = spawn(&gateway);

    session.regenerate().await.expect("regenerates");
    let before = session.snapshot();
    assert_eq!(before.state, SessionState::Paused);

    let err = session.step().await.unwrap_err();
    assert!(matches!(err, SessionError::Render(ref e) if e.is_transport()), "{err:?}");

    let after = session.snapshot();
    assert_eq!(after.state, SessionState::Paused);
    assert_eq!(after.board, before.board);
    assert!(after.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn step_advances_once_and_is_refused_while_running() {
    let gateway = StubGateway::new(Reply::Clear);
    let session = spawn(&gateway);

    assert_eq!(session.step().await, Err(SessionError::NoBoard));

    session.load_preset("glider").await.expect("preset exists");
    assert_eq!(session.step().await, Ok(Completion::Advanced));
    let stepped = session.snapshot();
    assert_eq!(stepped.state, SessionState::Paused);
    assert_eq!(stepped.generation, 1);
    assert!(stepped.board.expect("board").is_all_dead());

    assert_eq!(session.step().await, Ok(Completion::Converged));

    session.start().await.expect("starts");
    assert_eq!(session.step().await, Err(SessionError::Running));
    assert_eq!(gateway.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn regenerate_abandons_pending_step() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 10);
    let session = spawn(&gateway);
    session.load_preset("glider").await.expect("preset exists");

    let stepping = {
        let session = session.clone();
        tokio::spawn(async move { session.step().await })
    };
    let mut rx = session.subscribe();
    wait_for(&mut rx, |s| s.state == SessionState::Stepping).await;

    session.regenerate().await.expect("regenerates");
    assert_eq!(
        stepping.await.expect("step task joins"),
        Err(SessionError::Cancelled)
    );

    let regenerated = session.snapshot();
    tokio::time::sleep(PERIOD * 20).await;
    assert_eq!(session.snapshot(), regenerated);
    assert_eq!(regenerated.state, SessionState::Paused);
    assert_eq!(regenerated.generation, 0);
}

#[tokio::test(start_paused = true)]
async fn pause_discards_late_result() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 3);
    let session = spawn(&gateway);
    session.load_preset("glider").await.expect("preset exists");

    session.start().await.expect("starts");
    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(gateway.calls(), 1);
    session.pause().await.expect("pauses");

    tokio::time::sleep(PERIOD * 10).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.generation, 0);
    assert_eq!(snapshot.board.map(|b| b.alive_count()), Some(5));
}

#[tokio::test(start_paused = true)]
async fn reset_clears_all_derived_state() {
    let gateway = StubGateway::new(Reply::Fail);
    let session = spawn(&gateway);

    session.start().await.expect("starts");
    tokio::time::sleep(PERIOD * 2).await;
    let _ = session.step().await;
    session.set_settings_open(false).await.expect("closes settings");
    session.reset().await.expect("resets");

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.board.is_none());
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.generation, 0);
    assert!(snapshot.settings_open);
}

#[tokio::test(start_paused = true)]
async fn config_edit_reseeds_only_while_settings_open() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 10);
    let session = spawn(&gateway);
    session.start().await.expect("starts");

    let wider = config().to_builder().dimensions(12, 6).build().expect("valid");
    assert!(session.update_config(wider).await.expect("applied"));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.board.map(|b| b.width()), Some(12));

    session.set_settings_open(false).await.expect("closes settings");
    let taller = config().to_builder().dimensions(12, 9).build().expect("valid");
    assert!(!session.update_config(taller).await.expect("applied"));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.board.map(|b| b.height()), Some(6));
    assert_eq!(snapshot.config.dimensions().height(), 9);
}

#[tokio::test(start_paused = true)]
async fn unknown_preset_and_shutdown() {
    let gateway = StubGateway::new(Reply::Echo);
    let session = spawn(&gateway);

    assert_eq!(
        session.load_preset("gosper").await,
        Err(SessionError::UnknownPreset("gosper".to_string()))
    );

    session.shutdown().await.expect("shuts down");
    assert_eq!(session.start().await, Err(SessionError::Closed));
}

#[tokio::test(start_paused = true)]
async fn period_change_while_running_restarts_the_timer() {
    let gateway = StubGateway::new(Reply::Blink);
    let session = spawn(&gateway);
    session.load_preset("blinker").await.expect("preset exists");
    session.set_settings_open(false).await.expect("closes settings");
    session.start().await.expect("starts");

    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(gateway.calls(), 1);

    let slower = config()
        .to_builder()
        .tick_period(PERIOD * 5)
        .build()
        .expect("valid");
    assert!(!session.update_config(slower).await.expect("applied"));
    assert_eq!(session.snapshot().state, SessionState::Running);

    tokio::time::sleep(PERIOD * 4 + PERIOD / 2).await;
    assert_eq!(gateway.calls(), 1, "old period must not fire");

    tokio::time::sleep(PERIOD).await;
    assert_eq!(gateway.calls(), 2);
    assert_eq!(session.snapshot().state, SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_pending_step() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 10);
    let session = spawn(&gateway);
    session.load_preset("glider").await.expect("preset exists");
    let mut rx = session.subscribe();

    let stepping = {
        let session = session.clone();
        tokio::spawn(async move { session.step().await })
    };
    wait_for(&mut rx, |s| s.state == SessionState::Stepping).await;

    session.shutdown().await.expect("shuts down");
    assert_eq!(
        stepping.await.expect("step task joins"),
        Err(SessionError::Cancelled)
    );

    tokio::time::sleep(PERIOD * 20).await;
    let last = session.snapshot();
    assert_eq!(last.state, SessionState::Paused);
    assert_eq!(last.generation, 0);
    assert_eq!(last.board.map(|b| b.alive_count()), Some(5));
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_running_tick() {
    let gateway = StubGateway::new(Reply::Clear).delayed(PERIOD * 3);
    let session = spawn(&gateway);
    session.load_preset("glider").await.expect("preset exists");

    session.start().await.expect("starts");
    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(gateway.calls(), 1);
    session.shutdown().await.expect("shuts down");

    tokio::time::sleep(PERIOD * 10).await;
    let last = session.snapshot();
    assert_eq!(last.state, SessionState::Paused);
    assert_eq!(last.generation, 0);
    assert_eq!(last.board.map(|b| b.alive_count()), Some(5));
    assert_eq!(gateway.calls(), 1);
    assert_eq!(session.pause().await, Err(SessionError::Closed));
}
