use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ChatError;

/// Shown when the backend answers without a usable `reply` field.
pub const NO_RESPONSE_REPLY: &str = "🤖 No response received.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// One request/response exchange with the chat backend.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post `message` and return the reply text. A well-formed JSON body
    /// without a usable `reply` yields [`NO_RESPONSE_REPLY`]; network and
    /// parse failures are errors.
    async fn post_message(&self, message: &str) -> Result<String, ChatError>;
}

/// Pull the reply out of a response body, degrading to the fixed fallback.
pub fn reply_from_body(body: &Value) -> String {
    match body.get("reply").and_then(Value::as_str) {
        Some(reply) if !reply.is_empty() => reply.to_string(),
        _ => {
            warn!("Backend response has no usable 'reply' field: {}", body);
            NO_RESPONSE_REPLY.to_string()
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    temperature: Option<f32>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        let client = builder
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone().filter(|m| !m.trim().is_empty()),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_message(&self, message: &str) -> Result<String, ChatError> {
        debug!("Posting {} characters to {}", message.len(), self.endpoint);

        let request = ChatRequest {
            message,
            model: self.model.as_deref(),
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("request failed: {}", e)))?;

        // The backend reports its own failures as `{"reply": ...}` with a
        // 4xx/5xx status, so the body is read regardless of status.
        let status = response.status();
        if !status.is_success() {
            warn!("Backend returned status {}", status);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("failed to parse response: {}", e)))?;

        Ok(reply_from_body(&body))
    }
}
