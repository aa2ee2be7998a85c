//! Whole-text parsing of the `{reply, emotion}` object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{EMOTION_FIELD, REPLY_FIELD};

/// The object the model is asked to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub emotion: String,
}

impl ReplyPayload {
    /// Reads both fields from a JSON object.
    ///
    /// Missing, `null` or non-string fields read as empty. A repeated key
    /// keeps its last value.
    fn from_object(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            reply: field(REPLY_FIELD),
            emotion: field(EMOTION_FIELD),
        })
    }
}

/// Parses `content` as the reply object.
///
/// Tries the whole text first; models sometimes wrap the object in prose or a
/// code fence, so on failure the span from the first `{` to the last `}` is
/// tried as well.
pub fn parse_reply_payload(content: &str) -> Option<ReplyPayload> {
    if let Some(payload) = parse_object(content) {
        return Some(payload);
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    parse_object(&content[start..=end])
}

fn parse_object(text: &str) -> Option<ReplyPayload> {
    let value: Value = serde_json::from_str(text).ok()?;
    ReplyPayload::from_object(&value)
}
