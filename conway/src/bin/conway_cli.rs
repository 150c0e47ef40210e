use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use conway::config::{
    CHAIN_ID_VAR, DEFAULT_ALIVE_CHARS, DEFAULT_CHAIN_ID, DEFAULT_DENSITY, DEFAULT_HEIGHT,
    DEFAULT_REALM_PATH, DEFAULT_REMOTE_RPC, DEFAULT_RPC_TIMEOUT_MS, DEFAULT_TICK_PERIOD, DEFAULT_WIDTH,
    REALM_PATH_VAR, REMOTE_RPC_VAR, RPC_TIMEOUT_VAR,
};
use conway::{
    Board, BoardCodec, Completion, GnoRenderGateway, PRESETS, RowSeparator, ServiceConfig,
    SessionConfig, SessionError, SessionHandle, SessionSnapshot, SessionState,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "conway-cli",
    version,
    about = "Drive a Game of Life session whose generations are rendered by a Gno realm"
)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Chain the realm is deployed on.
    #[arg(long, env = CHAIN_ID_VAR, default_value = DEFAULT_CHAIN_ID)]
    chain_id: String,

    /// JSON-RPC endpoint of the node serving the realm.
    #[arg(long, env = REMOTE_RPC_VAR, default_value = DEFAULT_REMOTE_RPC)]
    remote_rpc: String,

    /// Package path of the realm whose Render computes the next generation.
    #[arg(long, env = REALM_PATH_VAR, default_value = DEFAULT_REALM_PATH)]
    realm_path: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = RPC_TIMEOUT_VAR, default_value_t = DEFAULT_RPC_TIMEOUT_MS)]
    timeout_ms: u64,
}

impl ServiceArgs {
    fn to_config(&self) -> ServiceConfig {
        ServiceConfig {
            chain_id: self.chain_id.clone(),
            remote_rpc: self.remote_rpc.clone(),
            realm_path: self.realm_path.clone(),
            request_timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Args, Debug)]
struct BoardArgs {
    /// Start from a named preset instead of a random board.
    #[arg(long)]
    preset: Option<String>,

    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: usize,

    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: usize,

    /// Probability in [0, 1] that a random cell starts alive.
    #[arg(long, default_value_t = DEFAULT_DENSITY)]
    density: f64,

    /// Characters drawn for live cells; repeat one to make it more likely.
    #[arg(long, default_value = DEFAULT_ALIVE_CHARS)]
    chars: String,

    /// Seed for reproducible random boards.
    #[arg(long)]
    seed: Option<u64>,

    /// Milliseconds between generations.
    #[arg(long, default_value_t = DEFAULT_TICK_PERIOD.as_millis() as u64)]
    period_ms: u64,
}

impl BoardArgs {
    fn to_config(&self) -> Result<SessionConfig> {
        SessionConfig::builder()
            .dimensions(self.width, self.height)
            .density(self.density)
            .alive_chars(self.chars.clone())
            .tick_period(Duration::from_millis(self.period_ms))
            .seed(self.seed)
            .build()
            .context("invalid board settings")
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in presets.
    Presets,
    /// Run the timed loop, printing each generation until the board settles.
    Run {
        #[command(flatten)]
        board: BoardArgs,

        /// Stop after this many generations even if the board keeps changing.
        #[arg(long)]
        max_generations: Option<u64>,
    },
    /// Advance the board a fixed number of single steps.
    Step {
        #[command(flatten)]
        board: BoardArgs,

        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Presets => list_presets(),
        Command::Run {
            board,
            max_generations,
        } => run_command(&cli.service, &board, max_generations).await?,
        Command::Step { board, count } => step_command(&cli.service, &board, count).await?,
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn list_presets() {
    for preset in PRESETS {
        let board = preset.board();
        println!("{} ({})", preset.name, board.dimensions());
        print_board(&board);
        println!();
    }
}

async fn open_session(service: &ServiceArgs, board: &BoardArgs) -> Result<SessionHandle> {
    let service = service.to_config();
    let gateway = GnoRenderGateway::new(&service).context("failed to build render gateway")?;
    info!(
        chain_id = %service.chain_id,
        endpoint = %service.remote_rpc,
        realm = %service.realm_path,
        "render gateway ready"
    );

    let session = SessionHandle::spawn(board.to_config()?, gateway);
    session.set_settings_open(false).await?;
    match &board.preset {
        Some(name) => session
            .load_preset(name)
            .await
            .with_context(|| format!("cannot load preset {name:?}"))?,
        None => session.regenerate().await?,
    }
    Ok(session)
}

async fn run_command(
    service: &ServiceArgs,
    board: &BoardArgs,
    max_generations: Option<u64>,
) -> Result<()> {
    let session = open_session(service, board).await?;
    let mut updates = session.subscribe();
    print_generation(&session.snapshot());

    session.start().await?;
    let mut last_printed = 0;
    loop {
        updates
            .changed()
            .await
            .context("session controller stopped unexpectedly")?;
        let snapshot = updates.borrow_and_update().clone();

        if snapshot.generation != last_printed {
            last_printed = snapshot.generation;
            print_generation(&snapshot);
        }

        if let Some(err) = &snapshot.last_error {
            session.shutdown().await?;
            bail!("{err}");
        }
        if snapshot.state == SessionState::Paused {
            println!("stable after {} generations", snapshot.generation);
            break;
        }
        if max_generations.is_some_and(|max| snapshot.generation >= max) {
            session.pause().await?;
            println!("stopped after {} generations", snapshot.generation);
            break;
        }
    }

    session.shutdown().await?;
    Ok(())
}

async fn step_command(service: &ServiceArgs, board: &BoardArgs, count: u32) -> Result<()> {
    let session = open_session(service, board).await?;
    print_generation(&session.snapshot());

    for _ in 0..count {
        match session.step().await {
            Ok(Completion::Converged) => {
                println!("stable after {} generations", session.snapshot().generation);
                break;
            }
            Ok(_) => print_generation(&session.snapshot()),
            Err(SessionError::Render(err)) => {
                warn!(error = %err, "step failed");
                session.shutdown().await?;
                bail!("render failed: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }

    session.shutdown().await?;
    Ok(())
}

fn print_generation(snapshot: &SessionSnapshot) {
    let Some(board) = &snapshot.board else {
        return;
    };
    println!(
        "generation {} ({} alive)",
        snapshot.generation,
        board.alive_count()
    );
    print_board(board);
}

fn print_board(board: &Board) {
    let text = BoardCodec::new(RowSeparator::Newline).encode(board);
    for row in text.lines() {
        println!("|{row}|");
    }
}
