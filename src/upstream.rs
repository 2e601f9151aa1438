//! Upstream chat-completions client.
//!
//! One streaming POST per relay operation. The handshake is fully resolved
//! here: a non-success status is read to completion and surfaced as
//! [`RelayError::UpstreamStatus`] before any streaming begins, so callers
//! never observe a partially-streamed error response.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::UpstreamConfig;
use crate::error::RelayError;

/// Raw byte stream handed to the decoder. Tied to one upstream connection;
/// dropping it closes the connection.
pub type UpstreamByteStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Immutable upstream request payload, built once per inbound call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.into(),
            }],
            stream: true,
        }
    }
}

pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::InternalError(format!("building HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Issue the streaming call and return the response byte stream.
    ///
    /// Non-2xx responses never stream: the body is collected and returned
    /// with the upstream's status code.
    pub async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<UpstreamByteStream, RelayError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        tracing::debug!(url = %url, model = %request.model, "opening upstream stream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "upstream rejected the call");
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}
