//! Mock Chat Transport for testing.
//!
//! Provides a scripted implementation of the ChatTransport port so the reply
//! service can be exercised without a real provider.
//!
//! # Features
//!
//! - Pre-configured buffered messages and streamed SSE bodies
//! - Error injection for fallback and failure testing
//! - Call tracking for verification of escalation
//!
//! # Example
//!
//! ```ignore
//! let transport = MockChatTransport::new()
//!     .with_error(ReplyError::transport(400, "temperature unsupported"))
//!     .with_content(r#"{"emotion":"happy","reply":"Hi"}"#);
//!
//! let reply = ReplyService::new(transport.clone(), settings).generate_reply(&history).await?;
//! assert_eq!(transport.call_count(), 2);
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use super::sse::delta_stream;
use crate::domain::reply::RequestSpec;
use crate::ports::{ChatTransport, DeltaStream, ProviderMessage, ReplyError};

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Buffered completion.
    Message(ProviderMessage),
    /// Streamed SSE body, delivered one network chunk per entry.
    Stream {
        chunks: Vec<String>,
        /// Read error raised after the chunks, if any.
        error: Option<ReplyError>,
    },
    /// Request failure.
    Error(ReplyError),
}

/// Mock chat transport for testing.
///
/// Responses are consumed in order by either mode; clones share the queue
/// and the call history.
#[derive(Debug, Clone, Default)]
pub struct MockChatTransport {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    calls: Arc<Mutex<Vec<RequestSpec>>>,
    /// Pause before each streamed chunk.
    chunk_delay: Duration,
}

impl MockChatTransport {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a buffered message with the given content.
    pub fn with_content(self, content: impl Into<String>) -> Self {
        self.with_response(MockResponse::Message(ProviderMessage::content(content)))
    }

    /// Queues a buffered refusal.
    pub fn with_refusal(self, reason: impl Into<String>) -> Self {
        self.with_response(MockResponse::Message(ProviderMessage::refusal(reason)))
    }

    /// Queues a streamed body made of the given raw network chunks.
    pub fn with_stream<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_response(MockResponse::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: None,
        })
    }

    /// Queues a streamed body that fails after its chunks.
    pub fn with_broken_stream<I, S>(self, chunks: I, error: ReplyError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_response(MockResponse::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: Some(error),
        })
    }

    /// Queues a request failure.
    pub fn with_error(self, error: ReplyError) -> Self {
        self.with_response(MockResponse::Error(error))
    }

    /// Queues any response.
    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Sets a pause before each streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Returns the number of requests issued.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Returns all recorded requests.
    pub fn get_calls(&self) -> Vec<RequestSpec> {
        lock(&self.calls).clone()
    }

    /// Builds SSE frames carrying the given content deltas, then `[DONE]`.
    pub fn sse_frames(deltas: &[&str]) -> Vec<String> {
        deltas
            .iter()
            .map(|d| {
                format!(
                    "data: {}\n\n",
                    serde_json::json!({ "choices": [{ "delta": { "content": d } }] })
                )
            })
            .chain(std::iter::once("data: [DONE]\n\n".to_string()))
            .collect()
    }

    fn next_response(&self, spec: &RequestSpec) -> Option<MockResponse> {
        lock(&self.calls).push(spec.clone());
        lock(&self.responses).pop_front()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn complete(&self, spec: &RequestSpec) -> Result<ProviderMessage, ReplyError> {
        match self.next_response(spec) {
            Some(MockResponse::Message(message)) => Ok(message),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Stream { .. }) => {
                Err(ReplyError::parse("mock scripted a stream for a buffered call"))
            }
            None => Err(ReplyError::network("mock script exhausted")),
        }
    }

    async fn open_stream(&self, spec: &RequestSpec) -> Result<DeltaStream, ReplyError> {
        let (chunks, error) = match self.next_response(spec) {
            Some(MockResponse::Stream { chunks, error }) => (chunks, error),
            Some(MockResponse::Error(err)) => return Err(err),
            Some(MockResponse::Message(_)) => {
                return Err(ReplyError::parse("mock scripted a message for a streaming call"))
            }
            None => return Err(ReplyError::network("mock script exhausted")),
        };

        let delay = self.chunk_delay;
        let bytes = stream::iter(chunks.into_iter().map(|c| Ok(c.into_bytes())))
            .chain(stream::iter(error.map(Err)))
            .then(move |item| async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                item
            });

        Ok(delta_stream(bytes))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
