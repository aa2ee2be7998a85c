//! Chat Transport Port - Interface for chat-completion providers.
//!
//! The reply service talks to any provider speaking the chat-completions
//! dialect through this port. An attempt is one HTTP request; fallback
//! negotiation between attempts belongs to the caller, which inspects
//! [`ReplyError::Transport`] to decide whether to relax the request.
//!
//! # Design
//!
//! - Buffered mode returns the first choice's message
//! - Streaming mode returns the decoded content deltas in arrival order; the
//!   stream is lazy, so each item costs one network read at most
//! - Missing credentials fail before any request is issued

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::reply::RequestSpec;

/// Content deltas of a streaming request, in arrival order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, ReplyError>> + Send>>;

/// Port for issuing single chat-completion attempts.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issues a buffered request and returns the first choice's message.
    async fn complete(&self, spec: &RequestSpec) -> Result<ProviderMessage, ReplyError>;

    /// Issues a streaming request and returns its deltas.
    ///
    /// Errors for the request itself (status, credentials) are returned here;
    /// failures while reading the body arrive as stream items.
    async fn open_stream(&self, spec: &RequestSpec) -> Result<DeltaStream, ReplyError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Message returned by a buffered completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMessage {
    /// Generated content (may be empty when the provider refused).
    pub content: String,
    /// Refusal explanation, when the provider declined to answer.
    pub refusal: Option<String>,
}

impl ProviderMessage {
    /// Creates a message with content only.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            refusal: None,
        }
    }

    /// Creates a refusal with no content.
    pub fn refusal(reason: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            refusal: Some(reason.into()),
        }
    }
}

/// One streamed fragment, folded over all choices of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    /// Raw content text (a fragment of the reply object).
    pub content: String,
    /// Refusal text, if the provider is declining.
    pub refusal: String,
}

impl StreamDelta {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.refusal.is_empty()
    }
}

/// Errors surfaced by a reply call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReplyError {
    /// Credentials are not configured; no request was attempted.
    #[error("missing API key for chat provider")]
    MissingCredentials,

    /// Provider answered with an error status.
    #[error("provider error: status={status} body={body}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Trimmed response body.
        body: String,
    },

    /// Request could not be delivered.
    #[error("network error: {0}")]
    Network(String),

    /// Attempt exceeded its deadline.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured per-attempt deadline.
        timeout_secs: u64,
    },

    /// Provider response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Provider explicitly refused to answer.
    #[error("provider refused to answer")]
    Refused,

    /// No usable reply text after all fallbacks.
    #[error("provider returned empty content")]
    EmptyReply,

    /// Reading the streamed body failed midway.
    #[error("stream read error: {0}")]
    StreamRead(String),

    /// The caller's sink rejected output, ending the stream.
    #[error("reply sink aborted: {0}")]
    Aborted(String),

    /// The caller cancelled the call.
    #[error("reply cancelled")]
    Cancelled,
}

impl ReplyError {
    /// Creates a transport error.
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a stream read error.
    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead(message.into())
    }

    /// Status and body when this is a provider error response.
    pub fn rejection(&self) -> Option<(u16, &str)> {
        match self {
            ReplyError::Transport { status, body } => Some((*status, body.as_str())),
            _ => None,
        }
    }
}

/// Receives streamed output of one reply call.
///
/// `on_token` is called zero or more times with reply text in order;
/// `on_emotion` at most once, as soon as the emotion is known. Returning an
/// error aborts the call with [`ReplyError::Aborted`].
pub trait ReplySink: Send {
    /// Called with each batch of newly decoded reply text.
    fn on_token(&mut self, delta: &str) -> Result<(), SinkError>;

    /// Called once with the normalized emotion.
    fn on_emotion(&mut self, emotion: &str) -> Result<(), SinkError>;
}

/// Error raised by a [`ReplySink`], e.g. when the downstream client went away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<SinkError> for ReplyError {
    fn from(err: SinkError) -> Self {
        ReplyError::Aborted(err.0)
    }
}

/// Sink built from two closures.
pub struct FnSink<T, E> {
    on_token: T,
    on_emotion: E,
}

impl<T, E> FnSink<T, E>
where
    T: FnMut(&str) -> Result<(), SinkError> + Send,
    E: FnMut(&str) -> Result<(), SinkError> + Send,
{
    /// Creates a sink from token and emotion callbacks.
    pub fn new(on_token: T, on_emotion: E) -> Self {
        Self {
            on_token,
            on_emotion,
        }
    }
}

impl<T, E> ReplySink for FnSink<T, E>
where
    T: FnMut(&str) -> Result<(), SinkError> + Send,
    E: FnMut(&str) -> Result<(), SinkError> + Send,
{
    fn on_token(&mut self, delta: &str) -> Result<(), SinkError> {
        (self.on_token)(delta)
    }

    fn on_emotion(&mut self, emotion: &str) -> Result<(), SinkError> {
        (self.on_emotion)(emotion)
    }
}

/// Sink that records everything it receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectingSink {
    pub tokens: Vec<String>,
    pub emotions: Vec<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All received reply text, concatenated.
    pub fn text(&self) -> String {
        self.tokens.concat()
    }
}

impl ReplySink for CollectingSink {
    fn on_token(&mut self, delta: &str) -> Result<(), SinkError> {
        self.tokens.push(delta.to_string());
        Ok(())
    }

    fn on_emotion(&mut self, emotion: &str) -> Result<(), SinkError> {
        self.emotions.push(emotion.to_string());
        Ok(())
    }
}
