//! Structured logging for hosts embedding the client.
//!
//! The client crates only emit `tracing` events; installing a subscriber is
//! the host's call. A host that keeps its settings in the client config file
//! can hand the `[logging]` section straight to [`init_from_config`]:
//!
//! ```no_run
//! use ewd_core::config::ClientConfig;
//! use ewd_core::logging;
//!
//! # fn main() -> ewd_core::EwdResult<()> {
//! let config = ClientConfig::load_default()?;
//! // Keep the guard alive for as long as file output is wanted.
//! let _guard = logging::init_from_config(&config.logging)?;
//! # Ok(())
//! # }
//! ```
//!
//! An empty `directory` logs to the console only. Otherwise events also go
//! to a daily-rotated `ewd-client.log`, as text or JSON.

use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::constants::{CLIENT_NAME, CLIENT_VERSION};
use crate::error::{EwdError, EwdResult};

const LOG_FILE_NAME: &str = "ewd-client.log";

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install console and daily-rotated file output.
///
/// `level` takes any filter directive (`"debug"`, `"ewd_socket=trace"`).
/// Fails with `EwdError::Config` when a global subscriber is already set.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> EwdResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_NAME));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    let file_layer = if json_output {
        file_layer.json().boxed()
    } else {
        file_layer.with_ansi(false).boxed()
    };

    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(fmt::layer().with_target(true).compact())
        .with(file_layer)
        .try_init()
        .map_err(|e| EwdError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(
        "{CLIENT_NAME} {CLIENT_VERSION} logging at level={level}, dir={}",
        log_dir.display()
    );

    Ok(LogGuard { _guard: guard })
}

/// Initialize logging from the `[logging]` section of the client config.
///
/// An empty `directory` means console-only output and returns no guard.
pub fn init_from_config(config: &LoggingConfig) -> EwdResult<Option<LogGuard>> {
    if config.directory.is_empty() {
        init_console_logging(&config.level);
        return Ok(None);
    }
    init_logging(&config.level, Path::new(&config.directory), config.json_output).map(Some)
}

/// Guard that keeps the non-blocking log writer alive.
/// Drop this to flush and close the log file.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize a minimal console-only logger for testing or embedding hosts.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(fmt::layer().with_target(true).compact())
        .try_init();
}
