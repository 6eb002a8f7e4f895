//! Protocol constants and client defaults.

/// Client name used in log lines.
pub const CLIENT_NAME: &str = "ewd-client";

/// Client version.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path of the degraded request/response endpoint.
pub const DEFAULT_AJAX_PATH: &str = "/ajax";

/// Timeout for a degraded-channel request in milliseconds.
pub const DEFAULT_AJAX_TIMEOUT_MS: u64 = 10_000;

/// Keep-alive cadence in minutes.
pub const DEFAULT_KEEP_ALIVE_MINS: u64 = 59;

/// Title used for form errors that do not carry an `alertTitle`.
pub const DEFAULT_FORM_ERROR_TITLE: &str = "Form Error";

/// Error text reported when the transport is not connected.
pub const SOCKET_DISCONNECTED: &str = "Socket disconnected";

/// How long a popover stays visible after it is shown, in milliseconds.
pub const DEFAULT_POPOVER_TIME_MS: u64 = 4_000;

/// Reserved message type strings exchanged with the EWD.js back end.
pub mod message_types {
    /// Sent by the server once the socket is up; triggers registration.
    pub const CONNECTED: &str = "EWD.connected";
    /// Registration request sent by the client.
    pub const REGISTER: &str = "EWD.register";
    /// Registration confirmation carrying the session token.
    pub const REGISTERED: &str = "EWD.registered";
    /// Substring marking form-submission responses.
    pub const FORM_PREFIX: &str = "EWD.form.";
    /// Substring marking server-reported errors.
    pub const ERROR_PREFIX: &str = "EWD.error";
    /// No-op message that keeps the transport from idling out.
    pub const KEEP_ALIVE: &str = "keepAlive";
    /// Type of the structured error object handed to the `error` handler.
    pub const ERROR: &str = "error";
    /// `messageType` reported when the transport itself disconnects.
    pub const SOCKET_DISCONNECTED: &str = "EWD.socket.disconnected";
}

/// Envelope field names.
pub mod fields {
    pub const TYPE: &str = "type";
    pub const TOKEN: &str = "token";
    pub const ERROR: &str = "error";
    pub const MESSAGE_TYPE: &str = "messageType";
    pub const ALERT_TITLE: &str = "alertTitle";
    pub const APPLICATION: &str = "application";
    pub const PARAMS: &str = "params";
    pub const MESSAGE: &str = "message";
    /// Correlation id stamped on requests that await a reply.
    pub const REQUEST_ID: &str = "requestId";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_prefixes_match_full_types() {
        assert!("EWD.form.login".contains(message_types::FORM_PREFIX));
        assert!("EWD.errorNotFound".contains(message_types::ERROR_PREFIX));
        assert!(!message_types::CONNECTED.contains(message_types::FORM_PREFIX));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_AJAX_TIMEOUT_MS, 10_000);
        assert_eq!(DEFAULT_KEEP_ALIVE_MINS, 59);
    }
}
