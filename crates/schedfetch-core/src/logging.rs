use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::{LocalTime, UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_FILTER_ENV: &str = "SCHEDFETCH_LOG";
pub const LOG_FILE_NAME: &str = "schedfetch.log";

/// Controls where structured logs are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingDestination {
    /// JSON lines in the daily log file plus readable lines on stderr.
    FileAndStderr,
    /// Only the daily log file (scheduled runs).
    FileOnly,
    /// Only stderr.
    StderrOnly,
}

#[derive(Debug)]
struct LoggingGuards {
    _guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

static LOGGING_STATE: OnceLock<LoggingGuards> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] io::Error),
    #[error("invalid logging filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install logging subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber, writing `schedfetch.log.<date>` files into `log_dir`.
///
/// The first call wins; later calls return the directory chosen by the first.
pub fn init_logging(
    destination: LoggingDestination,
    log_dir: &Path,
) -> Result<Option<&'static PathBuf>, LoggingError> {
    if LOGGING_STATE.get().is_none() {
        let guards = install_logging(destination, log_dir)?;
        if let Err(guards) = LOGGING_STATE.set(guards) {
            drop(guards);
        }
    }

    Ok(current_log_dir())
}

pub fn current_log_dir() -> Option<&'static PathBuf> {
    LOGGING_STATE
        .get()
        .and_then(|guards| guards.log_dir.as_ref())
}

fn install_logging(
    destination: LoggingDestination,
    log_dir: &Path,
) -> Result<LoggingGuards, LoggingError> {
    let filter = build_filter(env::var(LOG_FILTER_ENV).ok().as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let (file_layer, guard, log_dir) = match destination {
        LoggingDestination::FileAndStderr | LoggingDestination::FileOnly => {
            fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (writer, worker_guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .event_format(
                    tracing_subscriber::fmt::format()
                        .json()
                        .with_timer(UtcTime::rfc_3339())
                        .with_level(true)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(worker_guard), Some(log_dir.to_path_buf()))
        }
        LoggingDestination::StderrOnly => (None, None, None),
    };

    let stderr_layer = (destination != LoggingDestination::FileOnly).then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(
                tracing_subscriber::fmt::format()
                    .with_timer(LocalTime::rfc_3339())
                    .with_level(true)
                    .with_target(false)
                    .with_ansi(false),
            )
            .with_writer(io::stderr)
            .with_ansi(false)
            .boxed()
    });

    registry.with(file_layer).with(stderr_layer).try_init()?;

    if let Some(dir) = log_dir.as_ref() {
        info!(path = %dir.display(), "Structured logging enabled");
    }

    Ok(LoggingGuards {
        _guard: guard,
        log_dir,
    })
}

/// `SCHEDFETCH_LOG` wins, then `RUST_LOG`, then `info`.
fn build_filter(explicit: Option<&str>) -> Result<EnvFilter, ParseError> {
    if let Some(spec) = explicit.map(str::trim).filter(|spec| !spec.is_empty()) {
        return EnvFilter::try_new(spec);
    }

    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new("info"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_is_used() {
        let filter = build_filter(Some("schedfetch_core=debug")).expect("valid filter");
        assert_eq!(filter.to_string(), "schedfetch_core=debug");
    }

    #[test]
    fn invalid_filter_is_rejected() {
        assert!(build_filter(Some("schedfetch_core=loudest")).is_err());
    }
}
