//! EWD Socket - message dispatcher for EWD.js socket clients.
//!
//! This crate sits between a host-supplied socket and application code:
//! - Registration handshake that gates outbound traffic on a session token
//! - Type-keyed publish/subscribe event bus with per-subscriber fault isolation
//! - Outbound sender with request-id correlated completions
//! - Degraded HTTP channel for request/response delivery
//! - Cancellable keep-alive timer
//! - Presentation adapter seam for form feedback

pub mod ajax;
pub mod client;
pub mod completion;
pub mod dispatcher;
pub mod event_bus;
pub mod events;
pub mod keepalive;
pub mod presentation;
pub mod sender;
pub mod session;
pub mod transport;

// Re-export key types
pub use ajax::{FallbackChannel, HttpFallback};
pub use client::{ClientBuilder, EwdClient};
pub use completion::{Completion, CompletionTable};
pub use dispatcher::{MessageDispatcher, ReadyHook, Route};
pub use event_bus::{handler, EventBus, Handler};
pub use events::{HandshakeState, Message, MessageKind};
pub use keepalive::KeepAlive;
pub use presentation::{FormSubmission, LogPresentation, PopoverSpec, PresentationAdapter};
pub use sender::{OutboundRequest, OutboundSender, SendOutcome};
pub use session::{ApplicationDescriptor, Framework, Session, SharedSession};
pub use transport::{ChannelTransport, Transport};
