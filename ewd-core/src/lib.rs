//! EWD Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the EWD.js client crates:
//! - Client configuration (server address, degraded channel, keep-alive, application)
//! - A single error type covering every failure category
//! - Structured logging with tracing
//! - Reserved message-type strings and protocol defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// Re-export commonly used items at the crate root
pub use config::ClientConfig;
pub use error::{EwdError, EwdResult};
pub use logging::init_logging;
