//! Client facade.
//!
//! `EwdClient` wires a session, a dispatcher and the host's transport
//! together and exposes the surface an application uses: lifecycle hooks,
//! handler tables, the event bus, sending and the keep-alive timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ewd_core::config::ClientConfig;
use ewd_core::constants;
use ewd_core::error::EwdResult;

use crate::ajax::{FallbackChannel, HttpFallback};
use crate::dispatcher::{MessageDispatcher, Route};
use crate::event_bus::{handler, EventBus, Handler};
use crate::events::{HandshakeState, Message, MessageKind};
use crate::keepalive::KeepAlive;
use crate::presentation::{FormSubmission, LogPresentation, PresentationAdapter};
use crate::sender::{OutboundRequest, OutboundSender, SendOutcome};
use crate::session::{self, ApplicationDescriptor, Framework, Session};
use crate::transport::Transport;

/// Builder for [`EwdClient`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    application: Option<ApplicationDescriptor>,
    presentation: Option<Arc<dyn PresentationAdapter>>,
    fallback: Option<Arc<dyn FallbackChannel>>,
    keep_alive_interval: Duration,
    auto_keep_alive: bool,
}

impl ClientBuilder {
    pub fn application(mut self, application: ApplicationDescriptor) -> Self {
        self.application = Some(application);
        self
    }

    pub fn presentation(mut self, presentation: Arc<dyn PresentationAdapter>) -> Self {
        self.presentation = Some(presentation);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackChannel>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Start the keep-alive automatically whenever registration completes.
    pub fn auto_keep_alive(mut self, enabled: bool) -> Self {
        self.auto_keep_alive = enabled;
        self
    }

    pub fn build(self) -> EwdClient {
        let framework = self.application.as_ref().and_then(ApplicationDescriptor::framework);
        let presentation = match self.presentation {
            Some(presentation) => presentation,
            None => {
                if let Some(framework) = framework.filter(Framework::has_widgets) {
                    warn!(
                        "application uses {} but no presentation adapter was supplied; form feedback goes to the log",
                        framework.as_str()
                    );
                }
                Arc::new(LogPresentation)
            }
        };
        let dispatcher = MessageDispatcher::new(
            Session::new(self.application).shared(),
            self.transport,
            presentation,
            self.fallback,
        );

        EwdClient {
            dispatcher: Arc::new(dispatcher),
            keep_alive: Arc::new(Mutex::new(None)),
            keep_alive_interval: self.keep_alive_interval,
            auto_keep_alive: self.auto_keep_alive,
        }
    }
}

/// EWD.js socket client.
///
/// Cloning shares the same session.
#[derive(Clone)]
pub struct EwdClient {
    dispatcher: Arc<MessageDispatcher>,
    keep_alive: Arc<Mutex<Option<KeepAlive>>>,
    keep_alive_interval: Duration,
    auto_keep_alive: bool,
}

impl EwdClient {
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            transport,
            application: None,
            presentation: None,
            fallback: None,
            keep_alive_interval: Duration::from_secs(constants::DEFAULT_KEEP_ALIVE_MINS * 60),
            auto_keep_alive: false,
        }
    }

    /// Build a client from loaded configuration.
    ///
    /// The degraded channel is only set up when a server address is configured.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> EwdResult<Self> {
        let mut builder = Self::builder(transport)
            .keep_alive_interval(config.keep_alive.interval())
            .auto_keep_alive(config.keep_alive.enabled);

        if let Some(app) = &config.application {
            builder = builder.application(ApplicationDescriptor::from_config(app));
        }
        if config.is_server_configured() {
            let fallback = HttpFallback::new(&config.server)?;
            info!("degraded channel at {}", fallback.url());
            builder = builder.fallback(Arc::new(fallback));
        }
        Ok(builder.build())
    }

    fn keep_alive_slot(&self) -> MutexGuard<'_, Option<KeepAlive>> {
        self.keep_alive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Host application contract --

    /// Supply (or replace) the application descriptor.
    pub fn set_application(&self, application: ApplicationDescriptor) {
        session::lock(self.dispatcher.session()).set_application(application);
    }

    /// Run `hook` each time a connection completes registration.
    pub fn on_sockets_ready<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.dispatcher.set_ready_hook(Arc::new(hook));
    }

    /// Persistent handler for replies of type `kind`.
    ///
    /// Register under `"error"` to receive disconnect and delivery errors.
    pub fn on_message<F>(&self, kind: &str, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        session::lock(self.dispatcher.session()).set_handler(kind, handler(callback));
    }

    pub fn remove_on_message(&self, kind: &str) {
        session::lock(self.dispatcher.session()).remove_handler(kind);
    }

    /// Legacy per-type handler. Takes precedence over replies.
    pub fn register_handler<F>(&self, kind: &str, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.dispatcher.register_handler(kind, handler(callback));
    }

    pub fn remove_handler(&self, kind: &str) {
        self.dispatcher.remove_handler(kind);
    }

    // -- Event bus --

    pub fn events(&self) -> &EventBus {
        self.dispatcher.bus()
    }

    /// Subscribe to messages of type `kind`. Keep the handle to unsubscribe it later.
    pub fn subscribe<F>(&self, kind: &str, callback: F) -> Handler
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let callback = handler(callback);
        self.events().subscribe(kind, callback.clone());
        callback
    }

    pub fn unsubscribe(&self, kind: &str, callback: &Handler) {
        self.events().unsubscribe(kind, callback);
    }

    pub fn unsubscribe_all(&self, kind: &str) {
        self.events().unsubscribe_all(kind);
    }

    pub fn publish(&self, kind: &str, data: Option<&Message>) {
        self.events().publish(kind, data);
    }

    // -- Inbound --

    /// Parse and route a raw inbound frame.
    pub fn handle_raw_message(&self, raw: &str) -> EwdResult<Route> {
        let message = Message::parse(raw)?;
        Ok(self.handle_message(&message))
    }

    /// Route an inbound message.
    pub fn handle_message(&self, message: &Message) -> Route {
        if message.classify() == MessageKind::Connected {
            self.stop_keep_alive();
        }
        let route = self.dispatcher.dispatch(message);
        match route {
            Route::Registered if self.auto_keep_alive => {
                if let Err(e) = self.start_keep_alive(None) {
                    warn!("keep-alive not started: {e}");
                }
            }
            _ => {}
        }
        route
    }

    /// The transport reported a disconnect.
    pub fn handle_disconnect(&self) {
        self.stop_keep_alive();
        self.dispatcher.handle_disconnect();
    }

    // -- Session --

    pub fn state(&self) -> HandshakeState {
        self.dispatcher.state()
    }

    pub fn state_receiver(&self) -> watch::Receiver<HandshakeState> {
        self.dispatcher.state_receiver()
    }

    /// Whether a session token has been issued on the current connection.
    pub fn token_present(&self) -> bool {
        session::lock(self.dispatcher.session()).token().is_some()
    }

    /// Number of requests still waiting for their reply.
    pub fn pending_completions(&self) -> usize {
        session::lock(self.dispatcher.session()).pending_completions()
    }

    // -- Outbound --

    /// A sender bound to the current token. Fails before registration.
    pub fn sender(&self) -> EwdResult<OutboundSender> {
        self.dispatcher.sender()
    }

    pub fn send(&self, request: OutboundRequest) -> EwdResult<SendOutcome> {
        self.sender()?.send(request)
    }

    /// Submit a form as `{type, params}`.
    ///
    /// The first submission through a popover button prepares that popover.
    pub fn submit_form(&self, form: FormSubmission) -> EwdResult<SendOutcome> {
        let sender = self.sender()?;
        let presentation = self.dispatcher.presentation();

        if let Some(popover) = &form.popover {
            let first = session::lock(self.dispatcher.session()).activate_popover(popover.clone());
            if first {
                debug!("initializing popover for {}", popover.button_id);
                presentation.init_popover(popover, form.popover_title());
            }
        }

        sender.send(form.into_request(presentation.as_ref()))
    }

    // -- Keep-alive --

    /// Start (or restart) the keep-alive timer. Requires registration.
    pub fn start_keep_alive(&self, interval: Option<Duration>) -> EwdResult<()> {
        let sender = self.sender()?;
        let keep_alive = KeepAlive::spawn(sender, interval.unwrap_or(self.keep_alive_interval))?;
        if let Some(previous) = self.keep_alive_slot().replace(keep_alive) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_keep_alive(&self) {
        if let Some(keep_alive) = self.keep_alive_slot().take() {
            keep_alive.stop();
        }
    }

    pub fn keep_alive_running(&self) -> bool {
        self.keep_alive_slot()
            .as_ref()
            .is_some_and(KeepAlive::is_running)
    }
}
