//! Tracing setup: human-readable stderr plus an optional JSON log file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use dockwatch_service::LoggingConfig;

/// File name prefix inside `logging.file`; the date is appended on rotation.
const LOG_FILE_NAME: &str = "dockwatch.log";

/// Pick the stderr filter: `--quiet`/`--verbose` win, then `RUST_LOG`, then
/// the configured level.
pub fn stderr_filter(verbose: bool, quiet: bool, config: &LoggingConfig) -> EnvFilter {
    if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.tracing_level()))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init(verbose: bool, quiet: bool, no_color: bool, config: &LoggingConfig) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter(verbose, quiet, config));

    let (json_layer, guard) = match &config.file {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}
