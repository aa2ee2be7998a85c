//! Allowed emotion vocabulary and normalization against it.

use serde::{Deserialize, Serialize};

/// Emotion used when the configured set has no usable entry.
pub const DEFAULT_EMOTION: &str = "neutral";

/// Ordered set of emotions the persona may express.
///
/// Entries are kept verbatim (they are published in the schema enum as-is);
/// comparisons are case-insensitive and ignore surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionSet(Vec<String>);

impl EmotionSet {
    /// Creates a set from configured values, preserving order.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Configured values, verbatim.
    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-separated list for prompt text.
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }

    /// First non-blank entry, lower-cased, or [`DEFAULT_EMOTION`].
    pub fn fallback(&self) -> String {
        self.0
            .iter()
            .map(|e| e.trim())
            .find(|e| !e.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| DEFAULT_EMOTION.to_string())
    }

    /// Returns the lower-cased emotion if it is allowed, `None` otherwise.
    pub fn matching(&self, raw: &str) -> Option<String> {
        let wanted = raw.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.0
            .iter()
            .any(|e| e.trim().to_lowercase() == wanted)
            .then_some(wanted)
    }

    /// Maps a raw provider emotion onto the allowed set, falling back when it
    /// does not match.
    pub fn normalize(&self, raw: &str) -> String {
        self.matching(raw).unwrap_or_else(|| self.fallback())
    }
}
