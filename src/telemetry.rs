//! Tracing subscriber installation.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::error::PaperError;
use crate::ports::config_port::ConfigPort;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Filter directive from `RUST_LOG`, else `[logging] level`, else `info`.
pub fn filter_from_config(config: &dyn ConfigPort) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.get_string("logging", "level"))
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber: human-readable on stderr, plus JSON lines
/// appended to `log_path` when given.
pub fn init_tracing(filter: &str, log_path: Option<&Path>) -> Result<(), PaperError> {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let file_layer = match log_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(filter)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PaperError::Io {
            reason: format!("failed to install tracing subscriber: {e}"),
        })
}
