//! Structured persona replies.
//!
//! Pure logic for turning a conversation into a `{reply, emotion}` answer:
//!
//! - `message` - Conversation turns and the final [`StructuredReply`]
//! - `emotion` - Allowed emotion vocabulary and normalization
//! - `schema` - Structured-output contract ([`ResponseFormat`])
//! - `request` - Provider-neutral [`RequestSpec`]
//! - `negotiator` - Escalation decisions after provider rejections
//! - `extractor` - Incremental decoding of the streamed reply object
//! - `payload` - Whole-text parsing of the reply object
//! - `prompt` - System prompt and history assembly

mod emotion;
mod extractor;
mod message;
mod negotiator;
mod payload;
mod prompt;
mod request;
mod schema;

pub use emotion::{EmotionSet, DEFAULT_EMOTION};
pub use extractor::{FeedOutcome, FieldExtractor};
pub use message::{ChatRole, ConversationMessage, StructuredReply};
pub use negotiator::{
    structured_output_unsupported, temperature_unsupported, Downgrade, Escalation,
    EscalationState, MAX_ATTEMPTS,
};
pub use payload::{parse_reply_payload, ReplyPayload};
pub use prompt::{build_messages, format_instruction};
pub use request::RequestSpec;
pub use schema::{
    reply_response_format, JsonSchemaFormat, ResponseFormat, EMOTION_FIELD, REPLY_FIELD,
    REPLY_SCHEMA_NAME,
};
