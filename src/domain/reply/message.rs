//! Conversation messages and the structured reply produced for them.

use serde::{Deserialize, Serialize};

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions that steer the model (only ever built internally).
    System,
    /// Visitor input.
    User,
    /// Persona (model) response.
    Assistant,
}

impl ChatRole {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// True for the roles that may appear in caller-supplied history.
    pub fn is_conversational(&self) -> bool {
        matches!(self, ChatRole::User | ChatRole::Assistant)
    }
}

/// A message in the conversation, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who sent this message.
    pub role: ChatRole,
    /// Message content.
    pub content: String,
}

impl ConversationMessage {
    /// Creates a new message.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Final result of one reply call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredReply {
    /// Reply text, trimmed.
    pub text: String,
    /// Lower-cased emotion, always a member of the allowed set or its fallback.
    pub emotion: String,
}

impl StructuredReply {
    /// Creates a new reply.
    pub fn new(text: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: emotion.into(),
        }
    }
}
