//! stagegate CLI - inspect and drive hook-gated workflow sessions.

use clap::{Parser, Subcommand};
use stagegate::config::load_config;
use stagegate::{Engine, Result, cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Get the version string.
///
/// - Release builds (on a git tag): "0.1.0"
/// - Development builds: "0.1.0-dev (abc1234)"
/// - Dirty working directory: "0.1.0-dev (abc1234-dirty)"
fn version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("STAGEGATE_GIT_HASH");
    const IS_RELEASE: &str = env!("STAGEGATE_IS_RELEASE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            VERSION.to_string()
        } else {
            format!("{VERSION}-dev ({GIT_HASH})")
        }
    })
}

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(author, version = version(), about = "Hook-gated workflow stages for sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide one operation (request JSON on stdin, outcome JSON on stdout).
    Check,

    /// Show a session's workflow state.
    Status {
        /// Session ID.
        session_id: String,
    },

    /// Move a session to another stage.
    Transition {
        /// Session ID.
        session_id: String,

        /// Target stage.
        stage: String,
    },

    /// List live sessions.
    List {
        /// Maximum number of sessions to show. Defaults to 20.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// End a session and delete its data.
    End {
        /// Session ID.
        session_id: String,
    },

    /// Sweep expired records and end idle sessions.
    Clean {
        /// Idle duration (e.g., "7d", "30d", "24h"). Defaults to 7d.
        #[arg(long, default_value = "7d")]
        before: String,

        /// End all sessions.
        #[arg(long)]
        all: bool,
    },
}

/// Log to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STAGEGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(command: Commands) -> Result<()> {
    let config = load_config()?;
    let engine = Engine::from_config(&config).await?;

    match command {
        Commands::Check => cli::check::run(&engine).await,
        Commands::Status { session_id } => cli::status::run(&engine, &session_id).await,
        Commands::Transition { session_id, stage } => {
            cli::transition::run(&engine, &session_id, &stage).await
        }
        Commands::List { limit } => cli::list::run(&engine, limit).await,
        Commands::End { session_id } => cli::end::run(&engine, &session_id).await,
        Commands::Clean { before, all } => cli::clean::run(&engine, &before, all).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stagegate: error: {e}");
            ExitCode::FAILURE
        }
    }
}
