//! tipdesk - command-line shell for the trading dashboard backend.
//!
//! Signs in, keeps the session between runs, and fetches dashboard feeds
//! through the same request pipeline the dashboard screens use.

mod commands;
mod context;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for rolling log files; file logging is off when unset
const LOG_DIR_ENV: &str = "TIPDESK_LOG_DIR";

const LOG_FILE_PREFIX: &str = "tipdesk.log";

#[derive(Parser)]
#[command(name = "tipdesk", version, about = "Trading dashboard client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long, env = "TIPDESK_EMAIL")]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long, env = "TIPDESK_EMAIL")]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Status {
        /// Check the stored token with the backend
        #[arg(long)]
        verify: bool,
    },
    /// GET an API path and print the JSON response
    Get { path: String },
    /// Fetch the main dashboard feeds concurrently
    Dashboard,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("tipdesk starting");

    match cli.command {
        Command::Login { email } => commands::login(email).await,
        Command::Register { email, name } => commands::register(email, name).await,
        Command::Logout => commands::logout(),
        Command::Status { verify } => commands::status(verify).await,
        Command::Get { path } => commands::get(&path).await,
        Command::Dashboard => commands::dashboard().await,
    }
}
