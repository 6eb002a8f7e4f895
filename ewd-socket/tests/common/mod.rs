//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ewd_core::error::{EwdError, EwdResult};
use ewd_socket::{
    ApplicationDescriptor, EwdClient, FallbackChannel, Message, PopoverSpec, PresentationAdapter,
    Transport,
};

/// Transport that records every frame and can be switched off.
#[derive(Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    frames: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Every frame sent so far, parsed.
    pub fn sent(&self) -> Vec<Message> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|raw| Message::parse(raw).expect("sent frame is not a message"))
            .collect()
    }

    /// Frames of one type.
    pub fn sent_of(&self, kind: &str) -> Vec<Message> {
        self.sent().into_iter().filter(|m| m.kind == kind).collect()
    }

    pub fn send_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    fn send(&self, payload: &str) -> EwdResult<()> {
        if !self.is_connected() {
            return Err(EwdError::SocketDisconnected);
        }
        self.frames.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

/// Presentation adapter that records what it was asked to show.
#[derive(Default)]
pub struct RecordingPresentation {
    pub errors: Mutex<Vec<(String, String)>>,
    pub successes: Mutex<Vec<Message>>,
    pub popovers: Mutex<Vec<(String, String)>>,
    /// Button id of the popover handed with each form error or success.
    pub feedback_popovers: Mutex<Vec<Option<String>>>,
}

impl RecordingPresentation {
    fn note_popover(&self, popover: Option<&PopoverSpec>) {
        self.feedback_popovers
            .lock()
            .unwrap()
            .push(popover.map(|p| p.button_id.clone()));
    }
}

impl PresentationAdapter for RecordingPresentation {
    fn render_form_error(&self, title: &str, message: &str, popover: Option<&PopoverSpec>) {
        self.note_popover(popover);
        self.errors
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn on_form_success(&self, message: &Message, popover: Option<&PopoverSpec>) {
        self.note_popover(popover);
        self.successes.lock().unwrap().push(message.clone());
    }

    fn init_popover(&self, popover: &PopoverSpec, title: &str) {
        self.popovers
            .lock()
            .unwrap()
            .push((popover.button_id.clone(), title.to_string()));
    }
}

/// Degraded channel that answers every request with a canned reply.
pub struct CannedFallback {
    pub reply: Message,
    pub requests: Mutex<Vec<Message>>,
}

impl CannedFallback {
    pub fn new(reply: Message) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FallbackChannel for CannedFallback {
    async fn post(&self, envelope: &Message) -> EwdResult<Message> {
        self.requests.lock().unwrap().push(envelope.clone());
        Ok(self.reply.clone())
    }
}

/// Degraded channel whose every request fails.
pub struct FailingFallback;

#[async_trait]
impl FallbackChannel for FailingFallback {
    async fn post(&self, _envelope: &Message) -> EwdResult<Message> {
        Err(EwdError::Timeout("ajax request timed out".into()))
    }
}

/// Client for application "demo" with a mock transport and recording adapter.
pub fn create_test_client() -> (EwdClient, Arc<MockTransport>, Arc<RecordingPresentation>) {
    let transport = Arc::new(MockTransport::default());
    let presentation = Arc::new(RecordingPresentation::default());
    let client = EwdClient::builder(transport.clone())
        .application(ApplicationDescriptor::new("demo").with_framework("bootstrap"))
        .presentation(presentation.clone())
        .build();
    (client, transport, presentation)
}

/// Drive the handshake to completion with token `T1`.
pub fn register(client: &EwdClient) {
    client
        .handle_raw_message(r#"{"type":"EWD.connected"}"#)
        .expect("connected frame");
    client
        .handle_raw_message(r#"{"type":"EWD.registered","token":"T1"}"#)
        .expect("registered frame");
}

/// Collects messages handed to a callback.
pub fn recorder() -> (Arc<Mutex<Vec<Message>>>, impl Fn(&Message) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |m: &Message| sink.lock().unwrap().push(m.clone()))
}
