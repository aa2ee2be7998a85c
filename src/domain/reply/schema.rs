//! Structured-output contract sent to the provider.

use serde_json::{json, Value};

use super::emotion::EmotionSet;

/// Field streamed to the caller as it decodes.
pub const REPLY_FIELD: &str = "reply";

/// Field delivered once, when complete.
pub const EMOTION_FIELD: &str = "emotion";

/// Schema name announced to the provider.
pub const REPLY_SCHEMA_NAME: &str = "chat_reply";

/// Structured-output contract currently in effect for a request.
///
/// Escalation only ever moves down the ladder
/// `JsonSchema -> JsonObject -> None`, never back up.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// No `response_format`; the prompt instruction alone asks for JSON.
    None,
    /// Strict JSON Schema structured output.
    JsonSchema(JsonSchemaFormat),
    /// Provider "JSON object" mode without a schema.
    JsonObject,
}

impl ResponseFormat {
    /// The next, more relaxed contract, if any.
    pub fn relaxed(&self) -> Option<ResponseFormat> {
        match self {
            ResponseFormat::JsonSchema(_) => Some(ResponseFormat::JsonObject),
            ResponseFormat::JsonObject => Some(ResponseFormat::None),
            ResponseFormat::None => None,
        }
    }
}

/// A named JSON Schema for strict structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub description: Option<String>,
    pub schema: Value,
    pub strict: bool,
}

/// Builds the `{reply, emotion}` contract for the given emotion vocabulary.
///
/// Both properties are required strings and no other properties are allowed.
/// A non-empty vocabulary becomes an `enum` on `emotion`, listed verbatim.
pub fn reply_response_format(emotions: &EmotionSet) -> ResponseFormat {
    let mut emotion = json!({ "type": "string" });
    if !emotions.is_empty() {
        emotion["enum"] = json!(emotions.values());
    }

    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            REPLY_FIELD: { "type": "string" },
            EMOTION_FIELD: emotion,
        },
        "required": [REPLY_FIELD, EMOTION_FIELD],
    });

    ResponseFormat::JsonSchema(JsonSchemaFormat {
        name: REPLY_SCHEMA_NAME.to_string(),
        description: Some("Structured response for chat reply and emotion.".to_string()),
        schema,
        strict: true,
    })
}
