//! Transport seam.
//!
//! The client never opens a socket itself. The host owns the connection and
//! hands the client something that can report whether it is connected and
//! push a serialized frame. Inbound frames and disconnects flow the other
//! way, through `EwdClient::handle_raw_message` and `EwdClient::handle_disconnect`.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use ewd_core::error::{EwdError, EwdResult};

/// A bidirectional message socket supplied by the host.
pub trait Transport: Send + Sync {
    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Queue a serialized JSON frame for delivery.
    fn send(&self, payload: &str) -> EwdResult<()>;
}

/// Transport that forwards frames into a tokio channel.
///
/// Useful when the socket writer lives in its own task: the host drains the
/// receiver into the real connection and flips the connected flag as the
/// connection comes and goes.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    connected: AtomicBool,
}

impl ChannelTransport {
    /// Create a connected transport and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            connected: AtomicBool::new(true),
        };
        (transport, rx)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Transport for ChannelTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn send(&self, payload: &str) -> EwdResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EwdError::SocketDisconnected);
        }
        trace!("queueing frame of {} bytes", payload.len());
        self.tx
            .send(payload.to_string())
            .map_err(|_| EwdError::Socket("socket writer has shut down".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_forwards_frames() {
        let (transport, mut rx) = ChannelTransport::new();
        assert!(transport.is_connected());
        transport.send(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_channel_transport_connected_flag() {
        let (transport, _rx) = ChannelTransport::new();
        transport.set_connected(false);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send("{}"),
            Err(EwdError::SocketDisconnected)
        ));
        transport.set_connected(true);
        assert!(transport.is_connected());
    }

    #[test]
    fn test_closed_receiver_reports_disconnected() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(!transport.is_connected());
        assert!(matches!(transport.send("{}"), Err(EwdError::Socket(_))));
    }
}
