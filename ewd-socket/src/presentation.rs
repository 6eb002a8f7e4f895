//! Presentation seam: form feedback and form submission.
//!
//! The dispatcher never knows which UI toolkit the host uses. It reports
//! form errors and successes through a `PresentationAdapter` supplied by the
//! host; `LogPresentation` is the fallback when none is given.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use ewd_core::constants::{self, fields};

use crate::completion::Completion;
use crate::events::Message;
use crate::sender::OutboundRequest;

/// Capability interface for rendering form feedback.
pub trait PresentationAdapter: Send + Sync {
    /// Show a form error to the user.
    ///
    /// `popover` is the one attached to the button of the most recent popover
    /// submission, when there was one.
    fn render_form_error(&self, title: &str, message: &str, popover: Option<&PopoverSpec>);

    /// A form response arrived without an error.
    fn on_form_success(&self, message: &Message, popover: Option<&PopoverSpec>);

    /// Read the current values of a form widget, when the toolkit owns them.
    fn read_form_values(&self, _form_id: &str) -> Option<Map<String, Value>> {
        None
    }

    /// Prepare a popover the first time its button is used for a form.
    fn init_popover(&self, _popover: &PopoverSpec, _title: &str) {}
}

/// Adapter that reports feedback through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresentation;

impl PresentationAdapter for LogPresentation {
    fn render_form_error(&self, title: &str, message: &str, popover: Option<&PopoverSpec>) {
        match popover {
            Some(popover) => warn!("{title}: {message} (popover {})", popover.button_id),
            None => warn!("{title}: {message}"),
        }
    }

    fn on_form_success(&self, message: &Message, popover: Option<&PopoverSpec>) {
        if let Some(popover) = popover {
            debug!("hiding popover {}", popover.button_id);
        }
        info!("form accepted: {}", message.kind);
    }
}

/// Popover attached to a form's submit button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopoverSpec {
    /// Id of the button the popover hangs off.
    pub button_id: String,
    /// Id of the element that contains the popover.
    pub container: String,
    /// How long the popover stays visible once shown.
    pub time_ms: u64,
}

impl PopoverSpec {
    pub fn new(button_id: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            button_id: button_id.into(),
            container: container.into(),
            time_ms: constants::DEFAULT_POPOVER_TIME_MS,
        }
    }

    pub fn with_time_ms(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }
}

/// A form to submit as `{type, params}`.
pub struct FormSubmission {
    pub message_type: String,
    pub fields: Map<String, Value>,
    pub form_id: Option<String>,
    pub alert_title: Option<String>,
    pub popover: Option<PopoverSpec>,
    pub done: Option<Completion>,
}

impl FormSubmission {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Map::new(),
            form_id: None,
            alert_title: None,
            popover: None,
            done: None,
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Read field values from this widget through the adapter instead.
    pub fn form_id(mut self, form_id: impl Into<String>) -> Self {
        self.form_id = Some(form_id.into());
        self
    }

    pub fn alert_title(mut self, title: impl Into<String>) -> Self {
        self.alert_title = Some(title.into());
        self
    }

    pub fn popover(mut self, popover: PopoverSpec) -> Self {
        self.popover = Some(popover);
        self
    }

    pub fn on_done<F>(mut self, done: F) -> Self
    where
        F: FnOnce(&Message) + Send + 'static,
    {
        self.done = Some(Box::new(done));
        self
    }

    /// Title used when the popover is first prepared.
    pub(crate) fn popover_title(&self) -> &str {
        self.alert_title.as_deref().unwrap_or("Error")
    }

    /// Turn the form into an outbound request.
    ///
    /// Values read from the widget replace the literal fields.
    pub(crate) fn into_request(self, adapter: &dyn PresentationAdapter) -> OutboundRequest {
        let mut params = match self.form_id.as_deref() {
            Some(id) => adapter.read_form_values(id).unwrap_or_else(|| {
                debug!("form {id} has no widget values; using supplied fields");
                self.fields.clone()
            }),
            None => self.fields,
        };
        if let Some(title) = self.alert_title {
            params.insert(fields::ALERT_TITLE.to_string(), Value::String(title));
        }

        let mut request =
            OutboundRequest::new(self.message_type).param(fields::PARAMS, Value::Object(params));
        request.done = self.done;
        request
    }
}
