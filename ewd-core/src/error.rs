//! Error types for the EWD.js client.
//!
//! Every failure category across the client is unified into a single
//! `EwdError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using EwdError.
pub type EwdResult<T> = Result<T, EwdError>;

/// Unified error type for the EWD.js client.
#[derive(Error, Debug)]
pub enum EwdError {
    // -- Configuration errors --
    /// Failed to load or parse client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// No application descriptor was supplied before socket activity.
    #[error("application descriptor has not been defined")]
    MissingApplication,

    // -- Network errors --
    /// HTTP request on the degraded channel failed.
    #[error("http error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// The transport refused or failed to send a payload.
    #[error("socket error: {0}")]
    Socket(String),

    /// The transport reports itself disconnected.
    #[error("socket disconnected")]
    SocketDisconnected,

    // -- Session errors --
    /// An outbound message was attempted before registration completed.
    #[error("not registered: no session token has been issued yet")]
    NotRegistered,

    /// The server's registration confirmation could not be used.
    #[error("registration handshake failed: {0}")]
    HandshakeFailed(String),

    // -- Data errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for EwdError {
    fn from(e: serde_json::Error) -> Self {
        EwdError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for EwdError {
    fn from(e: toml::de::Error) -> Self {
        EwdError::Config(e.to_string())
    }
}

impl EwdError {
    /// Whether this error came from the network side rather than local state.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Timeout(_)
                | Self::ServerError { .. }
                | Self::Socket(_)
                | Self::SocketDisconnected
        )
    }
}
