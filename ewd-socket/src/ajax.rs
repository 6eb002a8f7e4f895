//! Degraded request/response channel.
//!
//! When a request asks for it, the envelope is POSTed to the back end's
//! `/ajax` endpoint instead of going over the socket, and the JSON reply is
//! routed like an inbound message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use ewd_core::config::ServerConfig;
use ewd_core::error::{EwdError, EwdResult};

use crate::events::Message;

/// One-shot request/response delivery used instead of the socket.
#[async_trait]
pub trait FallbackChannel: Send + Sync {
    /// Deliver `envelope` and return the server's reply.
    async fn post(&self, envelope: &Message) -> EwdResult<Message>;
}

/// `FallbackChannel` over HTTP POST.
#[derive(Clone)]
pub struct HttpFallback {
    inner: Client,
    url: String,
    timeout: Duration,
    custom_headers: Vec<(String, String)>,
}

impl HttpFallback {
    /// Create the channel from server configuration.
    pub fn new(config: &ServerConfig) -> EwdResult<Self> {
        let url = config.ajax_url()?;
        let timeout = Duration::from_millis(config.ajax_timeout_ms);

        let inner = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(15)))
            .build()
            .map_err(|e| EwdError::Http(format!("failed to build HTTP client: {e}")))?;

        let custom_headers = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            inner,
            url,
            timeout,
            custom_headers,
        })
    }

    /// The endpoint requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify_error(e: reqwest::Error) -> EwdError {
        if e.is_timeout() {
            EwdError::Timeout(e.to_string())
        } else if e.is_decode() {
            EwdError::Serialization(e.to_string())
        } else {
            EwdError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl FallbackChannel for HttpFallback {
    async fn post(&self, envelope: &Message) -> EwdResult<Message> {
        debug!("POST {} ({})", self.url, envelope.kind);

        let mut builder = self.inner.post(&self.url).timeout(self.timeout).json(envelope);
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(Self::classify_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EwdError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EwdError::Serialization(format!("failed to parse ajax response: {e}")))?;
        let reply = Message::from_value(body)?;
        debug!("ajax reply {}", reply.kind);
        Ok(reply)
    }
}
