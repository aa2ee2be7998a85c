//! Chat Transport Adapters.
//!
//! Implementations of the ChatTransport port.
//!
//! ## Available Adapters
//!
//! - `OpenAICompatibleTransport` - Any chat-completions API (OpenAI, DeepSeek)
//! - `MockChatTransport` - Scripted mock for testing
//!
//! `sse` holds the Server-Sent Events framing shared by both.

mod mock_transport;
mod openai_transport;
pub mod sse;

pub use mock_transport::{MockChatTransport, MockResponse};
pub use openai_transport::{OpenAICompatibleConfig, OpenAICompatibleTransport};
