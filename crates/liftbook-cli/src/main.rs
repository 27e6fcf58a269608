//! Liftbook CLI - sign in to the Liftbook workout server and browse your history.
//!
//! The session survives between runs: credentials are persisted by the
//! core library and restored on start before any command runs.

mod commands;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liftbook_core::Config;

use commands::Command;

/// Set to a file path to also write logs there
const LOG_FILE_ENV: &str = "LIFTBOOK_LOG_FILE";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the log file on drop.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_FILE_ENV).ok().map(std::path::PathBuf::from) {
        Some(path) => {
            let dir = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "liftbook.log".into());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
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
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(usage) => {
            eprintln!("{}", usage);
            std::process::exit(2);
        }
    };

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    config.apply_env_overrides();
    info!(api = %config.api_base_url, backend = ?config.credential_backend, "Liftbook starting");

    let session = config.session_store()?;
    let _transitions = session.subscribe(|event, snapshot| {
        tracing::debug!(?event, epoch = snapshot.epoch, "Session event");
    });
    session.bootstrap().await;

    if let Err(message) = commands::run(command, &session, &mut config).await {
        eprintln!("{}", message);
        std::process::exit(1);
    }
    Ok(())
}
