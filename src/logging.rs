use crate::config::{AppConfig, LogFormat};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes structured logging for the process. Returns a `WorkerGuard`
/// that must be held for the lifetime of `main` — dropping it flushes and
/// stops the non-blocking file writer.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(&config.logging.dir, "signal-exec.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => {
            let file_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_writer(non_blocking)
                .with_ansi(false);
            registry.with(file_layer).init();
        }
        LogFormat::Text => {
            let file_layer = fmt::layer()
                .with_target(false)
                .with_writer(non_blocking)
                .with_ansi(false);
            let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
            registry.with(file_layer).with(stdout_layer).init();
        }
    }

    guard
}
