//! Session state for one client.
//!
//! Holds the application descriptor, the registration handshake, the session
//! token and the runtime tables the dispatcher and sender share: the
//! persistent per-type `on_message` handlers, pending completions and
//! popover bookkeeping. The session is shared as `Arc<Mutex<Session>>`;
//! callbacks are always taken out of it and run after the lock is released.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use ewd_core::config::ApplicationConfig;
use ewd_core::constants::{fields, message_types};
use ewd_core::error::{EwdError, EwdResult};

use crate::completion::CompletionTable;
use crate::event_bus::Handler;
use crate::events::{HandshakeState, Message};
use crate::presentation::PopoverSpec;

/// Session shared between the dispatcher and the outbound sender.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a shared session, recovering from a poisoned lock.
pub(crate) fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Presentation framework named by the application descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framework {
    ExtJs,
    Bootstrap,
    Other(String),
}

impl FromStr for Framework {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "extjs" => Self::ExtJs,
            "bootstrap" => Self::Bootstrap,
            other => Self::Other(other.to_string()),
        })
    }
}

impl Framework {
    /// Whether form feedback for this framework is drawn by widgets the host must supply.
    pub fn has_widgets(&self) -> bool {
        matches!(self, Self::ExtJs | Self::Bootstrap)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ExtJs => "extjs",
            Self::Bootstrap => "bootstrap",
            Self::Other(s) => s.as_str(),
        }
    }
}

/// Static description of the host application, sent at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    /// Application name. Consumed by the first registration request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Presentation framework selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Any further fields the server expects.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Build a descriptor from the `[application]` config section.
    pub fn from_config(config: &ApplicationConfig) -> Self {
        Self {
            name: config.name.clone(),
            framework: config.framework.clone(),
            extra: config.extra.clone(),
        }
    }

    /// The selected framework, if any.
    pub fn framework(&self) -> Option<Framework> {
        let framework = self.framework.as_deref()?;
        match framework.parse::<Framework>() {
            Ok(framework) => Some(framework),
            Err(never) => match never {},
        }
    }

    /// JSON form embedded in the registration request.
    pub fn registration_payload(&self) -> EwdResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Explicit per-client session state.
pub struct Session {
    application: Option<ApplicationDescriptor>,
    state: HandshakeState,
    token: Option<String>,
    connection: u64,
    on_message: HashMap<String, Handler>,
    completions: CompletionTable,
    popovers: HashMap<String, bool>,
    popover: Option<PopoverSpec>,
}

impl Session {
    pub fn new(application: Option<ApplicationDescriptor>) -> Self {
        Self {
            application,
            state: HandshakeState::Unregistered,
            token: None,
            connection: 0,
            on_message: HashMap::new(),
            completions: CompletionTable::new(),
            popovers: HashMap::new(),
            popover: None,
        }
    }

    /// Wrap in the shared form used by the dispatcher and sender.
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn application(&self) -> Option<&ApplicationDescriptor> {
        self.application.as_ref()
    }

    pub fn set_application(&mut self, application: ApplicationDescriptor) {
        self.application = Some(application);
    }

    pub fn has_application(&self) -> bool {
        self.application.is_some()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The token, only while registered.
    pub fn token(&self) -> Option<&str> {
        match self.state {
            HandshakeState::Registered => self.token.as_deref(),
            HandshakeState::Unregistered => None,
        }
    }

    /// Counter bumped by every new connection.
    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// A new connection starts a new handshake.
    ///
    /// Senders bound to an earlier connection stop working.
    pub fn begin_connection(&mut self) {
        if self.state == HandshakeState::Registered {
            debug!("new connection; discarding previous session token");
        }
        self.connection += 1;
        self.state = HandshakeState::Unregistered;
        self.token = None;
    }

    /// Build the registration request. The application name is sent once.
    pub fn registration_request(&mut self) -> EwdResult<Message> {
        let application = self
            .application
            .as_mut()
            .ok_or(EwdError::MissingApplication)?;
        let payload = application.registration_payload()?;
        if let Some(name) = application.name.take() {
            debug!("registering application {name}");
        }
        Ok(Message::new(message_types::REGISTER).with(fields::APPLICATION, payload))
    }

    /// Store the issued token. Returns false if this connection already registered.
    pub fn complete_registration(&mut self, token: &str) -> bool {
        if self.state == HandshakeState::Registered {
            warn!("duplicate registration confirmation ignored");
            return false;
        }
        self.token = Some(token.to_string());
        self.state = HandshakeState::Registered;
        true
    }

    /// Install (or replace) the persistent handler for `kind`.
    pub fn set_handler(&mut self, kind: &str, handler: Handler) -> Option<Handler> {
        self.on_message.insert(kind.to_string(), handler)
    }

    pub fn remove_handler(&mut self, kind: &str) -> Option<Handler> {
        self.on_message.remove(kind)
    }

    pub fn handler(&self, kind: &str) -> Option<Handler> {
        self.on_message.get(kind).cloned()
    }

    pub fn completions(&mut self) -> &mut CompletionTable {
        &mut self.completions
    }

    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    /// Make `popover` the active one. Returns true the first time a button id is seen.
    pub fn activate_popover(&mut self, popover: PopoverSpec) -> bool {
        let first = !self.popover_initialized(&popover.button_id);
        self.popovers.insert(popover.button_id.clone(), true);
        self.popover = Some(popover);
        first
    }

    pub fn active_popover(&self) -> Option<&PopoverSpec> {
        self.popover.as_ref()
    }

    pub fn popover_initialized(&self, button_id: &str) -> bool {
        self.popovers.get(button_id).copied().unwrap_or(false)
    }
}

/// Deliver a reply to its pending completion, or else to the persistent
/// handler for its type. Returns whether anything consumed it.
pub(crate) fn deliver_reply(session: &SharedSession, reply: &Message) -> bool {
    let (completion, handler) = {
        let mut guard = lock(session);
        match guard.completions().resolve(reply) {
            Some(completion) => (Some(completion), None),
            None => (None, guard.handler(&reply.kind)),
        }
    };

    if let Some(completion) = completion {
        completion(reply);
        return true;
    }
    if let Some(handler) = handler {
        handler(reply);
        return true;
    }
    false
}

/// Hand a structured error to the application's `error` handler, if any.
pub(crate) fn report_error(session: &SharedSession, message_type: &str, error: &str) {
    let handler = lock(session).handler(message_types::ERROR);
    match handler {
        Some(handler) => handler(&Message::socket_error(message_type, error)),
        None => debug!("no error handler registered for {message_type}: {error}"),
    }
}
