use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::errors::{LauncherError, Result};

pub const LOG_FILE_NAME: &str = "launcher-sync.log";

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init(log_dir: &Path, default_filter: &str) -> Result<()> {
    if LOG_GUARD.get().is_some() {
        return Err(LauncherError::Config("logging already initialized".to_string()));
    }
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = Subscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true);

    let result = if cfg!(debug_assertions) {
        tracing::subscriber::set_global_default(
            builder
                .with_writer(non_blocking.and(std::io::stderr))
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            builder.with_writer(non_blocking).with_ansi(false).finish(),
        )
    };
    result.map_err(|err| LauncherError::Config(err.to_string()))?;

    tracing::info!(
        "logging to {} (default filter {})",
        log_dir.join(LOG_FILE_NAME).display(),
        default_filter
    );
    Ok(())
}
