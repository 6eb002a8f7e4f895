//! Outbound sender.
//!
//! An `OutboundSender` exists only once the registration handshake has
//! issued a session token, and only works while that registration is
//! current: after the next `EWD.connected` it refuses to send. Every
//! envelope it sends carries the token; a request with a `done` callback
//! also carries a `requestId` so the reply can be matched back to it.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use ewd_core::constants::{self, fields};
use ewd_core::error::{EwdError, EwdResult};

use crate::ajax::FallbackChannel;
use crate::completion::Completion;
use crate::events::Message;
use crate::session::{self, Session, SharedSession};
use crate::transport::Transport;

/// A request to send, built up before handing it to the sender.
///
/// A request built with `Default` has no type and is dropped by the sender.
#[derive(Default)]
pub struct OutboundRequest {
    /// Message type. Empty or absent means the request is not sent.
    pub kind: Option<String>,
    /// Payload fields.
    pub params: Map<String, Value>,
    /// Callback for the reply.
    pub done: Option<Completion>,
    /// Deliver over the degraded HTTP channel instead of the socket.
    pub ajax: bool,
}

impl OutboundRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Set a payload field. A string `type` sets the request type instead.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == fields::TYPE {
            self.kind = value.as_str().map(str::to_string);
        } else {
            self.params.insert(key, value);
        }
        self
    }

    /// Merge a map of payload fields.
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        for (key, value) in params {
            self = self.param(key, value);
        }
        self
    }

    pub fn on_done<F>(mut self, done: F) -> Self
    where
        F: FnOnce(&Message) + Send + 'static,
    {
        self.done = Some(Box::new(done));
        self
    }

    pub fn via_ajax(mut self) -> Self {
        self.ajax = true;
        self
    }
}

/// What happened to a request handed to [`OutboundSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket.
    Sent { request_id: Option<Uuid> },
    /// Posted on the degraded channel; the reply arrives later.
    Deferred { request_id: Option<Uuid> },
    /// The socket was down. The `error` handler has been told.
    Disconnected,
    /// The request had no type and was discarded.
    Dropped,
}

impl SendOutcome {
    /// Id of the pending completion, when the request carried one.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Sent { request_id } | Self::Deferred { request_id } => *request_id,
            Self::Disconnected | Self::Dropped => None,
        }
    }
}

/// Token-stamping sender bound to one registered connection.
#[derive(Clone)]
pub struct OutboundSender {
    /// Session token issued at registration.
    token: Arc<str>,
    /// Connection the token was issued on.
    connection: u64,
    /// Live socket handle.
    transport: Arc<dyn Transport>,
    /// Session holding the completion table and the `error` handler.
    session: SharedSession,
    /// Degraded channel, when one is configured.
    fallback: Option<Arc<dyn FallbackChannel>>,
}

impl OutboundSender {
    /// Bind a sender to the session's current registration.
    pub(crate) fn bind(
        session: SharedSession,
        transport: Arc<dyn Transport>,
        fallback: Option<Arc<dyn FallbackChannel>>,
    ) -> EwdResult<Self> {
        let (token, connection) = {
            let guard = session::lock(&session);
            let token: Arc<str> = guard.token().map(Arc::from).ok_or(EwdError::NotRegistered)?;
            (token, guard.connection())
        };
        Ok(Self {
            token,
            connection,
            transport,
            session,
            fallback,
        })
    }

    fn is_current(&self, session: &Session) -> bool {
        session.connection() == self.connection && session.token() == Some(&*self.token)
    }

    /// The token stamped on outbound messages.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Send a request.
    ///
    /// Fails with `EwdError::NotRegistered` once the connection this sender
    /// was bound to has been replaced, and with the transport's or degraded
    /// channel's error when they refuse the request. A disconnected socket is
    /// reported through the `error` handler and `SendOutcome::Disconnected`.
    pub fn send(&self, request: OutboundRequest) -> EwdResult<SendOutcome> {
        let OutboundRequest {
            kind,
            params,
            done,
            ajax,
        } = request;

        let Some(kind) = kind.filter(|k| !k.is_empty()) else {
            warn!("message not sent: type not defined");
            return Ok(SendOutcome::Dropped);
        };

        let request_id = {
            let mut guard = session::lock(&self.session);
            if !self.is_current(&guard) {
                debug!("{kind} not sent: sender belongs to an earlier registration");
                return Err(EwdError::NotRegistered);
            }
            done.map(|done| guard.completions().register(&kind, done))
        };

        let mut envelope = Message {
            kind: kind.clone(),
            fields: params,
        };
        envelope.insert(fields::TOKEN, &*self.token);
        if let Some(id) = request_id {
            envelope.insert(fields::REQUEST_ID, id.to_string());
        }

        if ajax {
            return self.post_via_fallback(envelope, request_id);
        }

        if !self.transport.is_connected() {
            warn!("{kind} not sent: {}", constants::SOCKET_DISCONNECTED);
            self.cancel(request_id);
            session::report_error(&self.session, &kind, constants::SOCKET_DISCONNECTED);
            return Ok(SendOutcome::Disconnected);
        }

        let delivered = envelope
            .to_json()
            .and_then(|payload| self.transport.send(&payload));
        if let Err(e) = delivered {
            self.cancel(request_id);
            return Err(e);
        }

        trace!("sent {kind}");
        Ok(SendOutcome::Sent { request_id })
    }

    fn post_via_fallback(
        &self,
        envelope: Message,
        request_id: Option<Uuid>,
    ) -> EwdResult<SendOutcome> {
        let Some(fallback) = self.fallback.clone() else {
            self.cancel(request_id);
            return Err(EwdError::MissingConfig("ajax fallback channel".into()));
        };
        let Ok(runtime) = Handle::try_current() else {
            self.cancel(request_id);
            return Err(EwdError::Internal(
                "ajax delivery requires a tokio runtime".into(),
            ));
        };

        debug!("posting {} over the degraded channel", envelope.kind);
        let session = self.session.clone();
        runtime.spawn(async move {
            match fallback.post(&envelope).await {
                Ok(reply) => {
                    let completion =
                        request_id.and_then(|id| session::lock(&session).completions().take(id));
                    match completion {
                        Some(completion) => completion(&reply),
                        None => {
                            if !session::deliver_reply(&session, &reply) {
                                debug!("ajax reply {} had no handler", reply.kind);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("ajax request {} failed: {e}", envelope.kind);
                    if let Some(id) = request_id {
                        session::lock(&session).completions().cancel(id);
                    }
                    session::report_error(&session, &envelope.kind, &e.to_string());
                }
            }
        });

        Ok(SendOutcome::Deferred { request_id })
    }

    fn cancel(&self, request_id: Option<Uuid>) {
        if let Some(id) = request_id {
            session::lock(&self.session).completions().cancel(id);
        }
    }
}
