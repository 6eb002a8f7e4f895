//! Inbound message routing.
//!
//! Every inbound message runs through a fixed precedence: the registration
//! handshake first, then the event bus, form feedback, server errors, the
//! legacy handler table and finally reply delivery. The first terminal rule
//! that matches wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use ewd_core::constants::{self, message_types};
use ewd_core::error::{EwdError, EwdResult};

use crate::ajax::FallbackChannel;
use crate::event_bus::{EventBus, Handler};
use crate::events::{HandshakeState, Message, MessageKind};
use crate::presentation::PresentationAdapter;
use crate::sender::OutboundSender;
use crate::session::{self, SharedSession};
use crate::transport::Transport;

/// Hook run once per connection when registration completes.
pub type ReadyHook = Arc<dyn Fn() + Send + Sync>;

/// Where an inbound message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No application descriptor; the message was dropped.
    NoApplication,
    /// `EWD.connected` answered with a registration request.
    RegistrationSent,
    /// The handshake could not proceed.
    RegistrationFailed,
    /// `EWD.registered` accepted; the session now has a token.
    Registered,
    /// A second `EWD.registered` on the same connection was ignored.
    DuplicateRegistration,
    /// A form response carried an error and was rendered.
    FormError,
    /// An `EWD.error*` message was logged.
    ServerError,
    /// Consumed by a legacy handler.
    LegacyHandler,
    /// Delivered to a pending completion or an `on_message` handler.
    Reply,
    /// Published on the bus only.
    Unhandled,
}

/// Routes inbound messages for one session.
pub struct MessageDispatcher {
    /// Shared session state.
    session: SharedSession,
    /// Pub/sub router every message is published on.
    bus: EventBus,
    /// Legacy per-type handlers.
    handlers: Mutex<HashMap<String, Handler>>,
    /// Form feedback.
    presentation: Arc<dyn PresentationAdapter>,
    /// Live socket.
    transport: Arc<dyn Transport>,
    /// Degraded channel handed to senders.
    fallback: Option<Arc<dyn FallbackChannel>>,
    /// Handshake state broadcast.
    state_tx: watch::Sender<HandshakeState>,
    /// Sockets-ready hook.
    ready_hook: Mutex<Option<ReadyHook>>,
}

impl MessageDispatcher {
    pub fn new(
        session: SharedSession,
        transport: Arc<dyn Transport>,
        presentation: Arc<dyn PresentationAdapter>,
        fallback: Option<Arc<dyn FallbackChannel>>,
    ) -> Self {
        let initial = session::lock(&session).state();
        let (state_tx, _) = watch::channel(initial);

        Self {
            session,
            bus: EventBus::new(),
            handlers: Mutex::new(HashMap::new()),
            presentation,
            transport,
            fallback,
            state_tx,
            ready_hook: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn presentation(&self) -> &Arc<dyn PresentationAdapter> {
        &self.presentation
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        *self.state_tx.borrow()
    }

    /// Subscribe to handshake state changes.
    pub fn state_receiver(&self) -> watch::Receiver<HandshakeState> {
        self.state_tx.subscribe()
    }

    pub fn set_ready_hook(&self, hook: ReadyHook) {
        *self.ready_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a legacy handler for `kind`. It takes precedence over replies.
    pub fn register_handler(&self, kind: &str, handler: Handler) {
        self.handlers().insert(kind.to_string(), handler);
    }

    pub fn remove_handler(&self, kind: &str) -> Option<Handler> {
        self.handlers().remove(kind)
    }

    /// A sender bound to the current registration.
    pub fn sender(&self) -> EwdResult<OutboundSender> {
        OutboundSender::bind(
            self.session.clone(),
            self.transport.clone(),
            self.fallback.clone(),
        )
    }

    /// Route one inbound message.
    pub fn dispatch(&self, message: &Message) -> Route {
        if !session::lock(&self.session).has_application() {
            error!(
                "{} dropped: application descriptor has not been defined",
                message.kind
            );
            return Route::NoApplication;
        }

        let kind = message.classify();
        match kind {
            MessageKind::Connected => return self.on_connected(),
            MessageKind::Registered => return self.on_registered(message),
            _ => {}
        }

        self.bus.publish(&message.kind, Some(message));

        if let MessageKind::Form(_) = kind {
            let popover = session::lock(&self.session).active_popover().cloned();
            if let Some(error) = message.error() {
                let title = message
                    .alert_title()
                    .unwrap_or(constants::DEFAULT_FORM_ERROR_TITLE);
                self.presentation
                    .render_form_error(title, &error, popover.as_ref());
                return Route::FormError;
            }
            self.presentation.on_form_success(message, popover.as_ref());
        }

        if let MessageKind::ServerError(_) = kind {
            match message.error() {
                Some(error) => warn!("{}: {error}", message.kind),
                None => warn!("{} received", message.kind),
            }
            return Route::ServerError;
        }

        let legacy = self.handlers().get(&message.kind).cloned();
        if let Some(handler) = legacy {
            handler(message);
            return Route::LegacyHandler;
        }

        if session::deliver_reply(&self.session, message) {
            return Route::Reply;
        }

        trace!("no handler for {}", message.kind);
        Route::Unhandled
    }

    fn on_connected(&self) -> Route {
        let request = {
            let mut session = session::lock(&self.session);
            session.begin_connection();
            session.registration_request()
        };
        self.set_state(HandshakeState::Unregistered);

        let sent = request
            .and_then(|request| request.to_json())
            .and_then(|payload| self.transport.send(&payload));
        match sent {
            Ok(()) => {
                info!("socket connected; registration request sent");
                Route::RegistrationSent
            }
            Err(e) => {
                error!("registration request not sent: {e}");
                Route::RegistrationFailed
            }
        }
    }

    fn on_registered(&self, message: &Message) -> Route {
        let Some(token) = message.token() else {
            error!("{}", EwdError::HandshakeFailed("confirmation carried no token".into()));
            return Route::RegistrationFailed;
        };
        if !session::lock(&self.session).complete_registration(token) {
            return Route::DuplicateRegistration;
        }
        self.set_state(HandshakeState::Registered);

        let hook = self
            .ready_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            debug!("invoking sockets-ready hook");
            hook();
        }
        Route::Registered
    }

    /// The transport closed. The token is left stale.
    pub fn handle_disconnect(&self) {
        warn!("{}", constants::SOCKET_DISCONNECTED);
        session::report_error(
            &self.session,
            message_types::SOCKET_DISCONNECTED,
            constants::SOCKET_DISCONNECTED,
        );
    }

    fn set_state(&self, new_state: HandshakeState) {
        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            info!("handshake state: {} -> {}", *state, new_state);
            *state = new_state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::handler;
    use crate::presentation::LogPresentation;
    use crate::session::{ApplicationDescriptor, Session};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<String>>,
    }

    impl Transport for RecordingTransport {
        fn is_connected(&self) -> bool {
            true
        }

        fn send(&self, payload: &str) -> EwdResult<()> {
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn dispatcher(application: Option<ApplicationDescriptor>) -> (MessageDispatcher, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = MessageDispatcher::new(
            Session::new(application).shared(),
            transport.clone(),
            Arc::new(LogPresentation),
            None,
        );
        (dispatcher, transport)
    }

    fn registered() -> (MessageDispatcher, Arc<RecordingTransport>) {
        let (dispatcher, transport) = dispatcher(Some(ApplicationDescriptor::new("demo")));
        dispatcher.dispatch(&Message::new("EWD.connected"));
        dispatcher.dispatch(&Message::new("EWD.registered").with("token", "T1"));
        (dispatcher, transport)
    }

    fn counter() -> (Handler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (handler(move |_| { c.fetch_add(1, Ordering::SeqCst); }), count)
    }

    #[test]
    fn test_no_application_drops_everything() {
        let (dispatcher, transport) = dispatcher(None);
        let (h, count) = counter();
        dispatcher.bus().subscribe("ping", h);

        assert_eq!(dispatcher.dispatch(&Message::new("EWD.connected")), Route::NoApplication);
        assert_eq!(dispatcher.dispatch(&Message::new("ping")), Route::NoApplication);
        assert!(transport.frames.lock().unwrap().is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_connected_sends_registration() {
        let (dispatcher, transport) = dispatcher(Some(ApplicationDescriptor::new("demo")));
        assert_eq!(dispatcher.dispatch(&Message::new("EWD.connected")), Route::RegistrationSent);

        let frames = transport.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let sent = Message::parse(&frames[0]).unwrap();
        assert_eq!(sent.kind, "EWD.register");
        assert_eq!(sent.get("application"), Some(&json!({"name": "demo"})));
    }

    #[test]
    fn test_registration_requires_token() {
        let (dispatcher, _) = dispatcher(Some(ApplicationDescriptor::new("demo")));
        assert_eq!(
            dispatcher.dispatch(&Message::new("EWD.registered")),
            Route::RegistrationFailed
        );
        assert_eq!(dispatcher.state(), HandshakeState::Unregistered);
        assert!(matches!(dispatcher.sender(), Err(EwdError::NotRegistered)));
    }

    #[test]
    fn test_registration_fires_ready_hook_once() {
        let (dispatcher, _) = dispatcher(Some(ApplicationDescriptor::new("demo")));
        let ready = Arc::new(AtomicUsize::new(0));
        let r = ready.clone();
        dispatcher.set_ready_hook(Arc::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        let mut states = dispatcher.state_receiver();

        let confirm = Message::new("EWD.registered").with("token", "T1");
        assert_eq!(dispatcher.dispatch(&confirm), Route::Registered);
        assert_eq!(dispatcher.dispatch(&confirm), Route::DuplicateRegistration);

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), HandshakeState::Registered);
        assert_eq!(dispatcher.sender().unwrap().token(), "T1");
    }

    #[test]
    fn test_handshake_messages_are_not_published() {
        let (dispatcher, _) = dispatcher(Some(ApplicationDescriptor::new("demo")));
        let (h, count) = counter();
        dispatcher.bus().subscribe("EWD.connected", h.clone());
        dispatcher.bus().subscribe("EWD.registered", h);

        dispatcher.dispatch(&Message::new("EWD.connected"));
        dispatcher.dispatch(&Message::new("EWD.registered").with("token", "T1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_server_error_stops_after_publish() {
        let (dispatcher, _) = registered();
        let (published, published_count) = counter();
        let (legacy, legacy_count) = counter();
        dispatcher.bus().subscribe("EWD.error.auth", published);
        dispatcher.register_handler("EWD.error.auth", legacy);

        let route = dispatcher.dispatch(&Message::new("EWD.error.auth").with("error", "denied"));
        assert_eq!(route, Route::ServerError);
        assert_eq!(published_count.load(Ordering::SeqCst), 1);
        assert_eq!(legacy_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_legacy_handler_beats_replies() {
        let (dispatcher, _) = registered();
        let (legacy, legacy_count) = counter();
        let (reply, reply_count) = counter();
        dispatcher.register_handler("getPatients", legacy);
        session::lock(dispatcher.session()).set_handler("getPatients", reply);

        assert_eq!(dispatcher.dispatch(&Message::new("getPatients")), Route::LegacyHandler);
        assert_eq!(legacy_count.load(Ordering::SeqCst), 1);
        assert_eq!(reply_count.load(Ordering::SeqCst), 0);

        dispatcher.remove_handler("getPatients");
        assert_eq!(dispatcher.dispatch(&Message::new("getPatients")), Route::Reply);
        assert_eq!(reply_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unhandled_message_is_still_published() {
        let (dispatcher, _) = registered();
        let (h, count) = counter();
        dispatcher.bus().subscribe("push", h);
        assert_eq!(dispatcher.dispatch(&Message::new("push")), Route::Unhandled);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_resets_handshake() {
        let (dispatcher, transport) = registered();
        assert_eq!(dispatcher.state(), HandshakeState::Registered);

        assert_eq!(dispatcher.dispatch(&Message::new("EWD.connected")), Route::RegistrationSent);
        assert_eq!(dispatcher.state(), HandshakeState::Unregistered);
        assert!(dispatcher.sender().is_err());

        let frames = transport.frames.lock().unwrap();
        let second = Message::parse(&frames[1]).unwrap();
        assert_eq!(second.get("application"), Some(&json!({})));
    }

    #[test]
    fn test_disconnect_notifies_error_handler() {
        let (dispatcher, _) = registered();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        session::lock(dispatcher.session()).set_handler(
            "error",
            handler(move |m| *sink.lock().unwrap() = Some(m.clone())),
        );

        dispatcher.handle_disconnect();
        let error = seen.lock().unwrap().clone().unwrap();
        assert_eq!(error.str_field("messageType"), Some("EWD.socket.disconnected"));
        assert_eq!(error.error().as_deref(), Some("Socket disconnected"));
    }
}
