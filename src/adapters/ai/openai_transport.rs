//! OpenAI-compatible transport - ChatTransport over the chat-completions API.
//!
//! Works with any provider exposing `POST {base_url}/chat/completions`
//! (OpenAI, DeepSeek, and most hosted gateways).
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAICompatibleConfig::new(api_key)
//!     .with_base_url("https://api.deepseek.com")
//!     .with_timeout(Duration::from_secs(60));
//!
//! let transport = OpenAICompatibleTransport::new(config)?;
//! ```
//!
//! # Streaming
//!
//! Streaming responses are Server-Sent Events; the body is handed to
//! [`delta_stream`] which yields one delta per `data:` frame until `[DONE]`.
//!
//! The client timeout is a per-request deadline, so every fallback attempt
//! gets a fresh one.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::sse::delta_stream;
use crate::domain::reply::{ConversationMessage, RequestSpec, ResponseFormat};
use crate::ports::{ChatTransport, DeltaStream, ProviderMessage, ReplyError};

/// Configuration for the OpenAI-compatible transport.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    /// API key for authentication (may be empty; checked per request).
    api_key: Secret<String>,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Per-attempt deadline.
    pub timeout: Duration,
}

impl OpenAICompatibleConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Sets the base URL. Trailing slashes are removed.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exposes the API key, if one is configured.
    fn api_key(&self) -> Option<&str> {
        let key = self.api_key.expose_secret().trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Chat-completions transport over HTTP.
pub struct OpenAICompatibleTransport {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleTransport {
    /// Creates a transport with its own connection pool.
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self, ReplyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReplyError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Builds the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Sends one request and checks its status.
    async fn send(&self, spec: &RequestSpec) -> Result<Response, ReplyError> {
        let api_key = self.config.api_key().ok_or(ReplyError::MissingCredentials)?;
        let body = ChatRequest::from_spec(spec);

        tracing::debug!(
            model = %spec.model,
            stream = spec.stream,
            response_format = ?body.response_format.as_ref().map(|f| f.kind),
            temperature = ?spec.temperature,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.handle_response_status(response).await
    }

    /// Maps a reqwest failure to a reply error.
    fn classify(&self, e: reqwest::Error) -> ReplyError {
        if e.is_timeout() {
            ReplyError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if e.is_connect() {
            ReplyError::network(format!("Connection failed: {}", e))
        } else {
            ReplyError::network(e.to_string())
        }
    }

    /// Turns error statuses into [`ReplyError::Transport`].
    async fn handle_response_status(&self, response: Response) -> Result<Response, ReplyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Chat provider returned error status");
        Err(ReplyError::transport(status.as_u16(), body.trim()))
    }
}

#[async_trait]
impl ChatTransport for OpenAICompatibleTransport {
    async fn complete(&self, spec: &RequestSpec) -> Result<ProviderMessage, ReplyError> {
        let response = self.send(spec).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReplyError::parse(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReplyError::parse("No choices in response"))?;

        Ok(ProviderMessage {
            content: choice.message.content.unwrap_or_default(),
            refusal: choice.message.refusal.filter(|r| !r.trim().is_empty()),
        })
    }

    async fn open_stream(&self, spec: &RequestSpec) -> Result<DeltaStream, ReplyError> {
        let response = self.send(spec).await?;
        let timeout_secs = self.config.timeout.as_secs();

        let bytes = response.bytes_stream().map(move |chunk| {
            chunk.map(|b| b.to_vec()).map_err(|e| {
                if e.is_timeout() {
                    ReplyError::Timeout { timeout_secs }
                } else {
                    ReplyError::stream_read(e.to_string())
                }
            })
        });

        Ok(delta_stream(bytes))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ----- Chat Completions Wire Types -----

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat<'a>>,
}

impl<'a> ChatRequest<'a> {
    fn from_spec(spec: &'a RequestSpec) -> Self {
        Self {
            model: &spec.model,
            messages: spec.messages.iter().map(WireMessage::from).collect(),
            temperature: spec.temperature,
            stream: spec.stream,
            response_format: WireResponseFormat::from_format(&spec.response_format),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ConversationMessage> for WireMessage<'a> {
    fn from(message: &'a ConversationMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<WireJsonSchema<'a>>,
}

impl<'a> WireResponseFormat<'a> {
    fn from_format(format: &'a ResponseFormat) -> Option<Self> {
        match format {
            ResponseFormat::None => None,
            ResponseFormat::JsonObject => Some(Self {
                kind: "json_object",
                json_schema: None,
            }),
            ResponseFormat::JsonSchema(schema) => Some(Self {
                kind: "json_schema",
                json_schema: Some(WireJsonSchema {
                    name: &schema.name,
                    description: schema.description.as_deref(),
                    schema: &schema.schema,
                    strict: schema.strict,
                }),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireJsonSchema<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}
