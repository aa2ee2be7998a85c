//! Provider-neutral description of one chat-completion attempt.

use super::message::ConversationMessage;
use super::schema::ResponseFormat;

/// Everything needed to issue one chat-completion request.
///
/// Only the fallback negotiator changes a spec between attempts of the same
/// logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    /// `None` leaves sampling temperature to the provider default.
    pub temperature: Option<f32>,
    pub stream: bool,
    pub response_format: ResponseFormat,
}

impl RequestSpec {
    /// Creates a buffered request with no structured-output contract.
    pub fn new(model: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            stream: false,
            response_format: ResponseFormat::None,
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Marks the request as streaming.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the structured-output contract.
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}
