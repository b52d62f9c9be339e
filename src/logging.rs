//! Tracing setup shared by the CLI and the viewer
//!
//! Human-readable events go to stderr, which keeps stdout free for
//! `hyperview export`. Everything is also written to a daily log file.

use anyhow::Context;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log files are named `hyperview.YYYY-MM-DD.log`.
pub const LOG_FILE_PREFIX: &str = "hyperview";
const DEFAULT_FILTER: &str = "info,hyperview=debug";

/// `RUST_LOG` when set and valid, else [`DEFAULT_FILTER`].
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. The returned guard flushes the file log
/// when dropped, so hold it until the process exits.
pub fn init_logging(log_dir: impl AsRef<Path>) -> anyhow::Result<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .context("opening log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer().compact().with_writer(std::io::stderr).with_target(false);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;

    tracing::info!("Logging to {}", log_dir.display());
    Ok(guard)
}

/// Debug event for a view interaction: `log_view_event!("xy", "zoom", rows = n)`.
#[macro_export]
macro_rules! log_view_event {
    ($view:expr, $event:expr) => {
        tracing::debug!(view = %$view, event = %$event, "view event");
    };
    ($view:expr, $event:expr, $($field:tt)*) => {
        tracing::debug!(view = %$view, event = %$event, $($field)*, "view event");
    };
}

/// Error event carrying extra structured fields.
#[macro_export]
macro_rules! log_error {
    ($msg:expr) => {
        tracing::error!(error = %$msg, "hyperview error");
    };
    ($msg:expr, $($field:tt)*) => {
        tracing::error!(error = %$msg, $($field)*, "hyperview error");
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        // Another test may already own the global subscriber; the directory
        // is created before that matters.
        let _ = init_logging(&logs);
        assert!(logs.is_dir());
    }
}
