//! Ports - interfaces between the reply service and the outside world.
//!
//! - `ChatTransport` - Sends chat-completion requests to a provider
//! - `ReplySink` - Receives streamed reply output

mod chat_transport;

pub use chat_transport::{
    ChatTransport, CollectingSink, DeltaStream, FnSink, ProviderMessage, ReplyError, ReplySink,
    SinkError, StreamDelta,
};
