//! Persona prompt resolution.
//!
//! The prompt may live in a file so it can be edited while the service runs.
//! The file is re-read on every call; when it is missing, unreadable or blank
//! the inline prompt is used instead.

use std::path::PathBuf;

/// Where the persona prompt comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSource {
    inline: String,
    path: Option<PathBuf>,
}

impl PromptSource {
    /// A fixed prompt.
    pub fn inline(prompt: impl Into<String>) -> Self {
        Self {
            inline: prompt.into(),
            path: None,
        }
    }

    /// Prefers the contents of `path`, falling back to the inline prompt.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the prompt in effect right now, trimmed.
    pub async fn resolve(&self) -> String {
        if let Some(path) = &self.path {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) if !contents.trim().is_empty() => {
                    return contents.trim().to_string();
                }
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "Prompt file is empty, using inline prompt");
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Prompt file unreadable, using inline prompt: {}", e);
                }
            }
        }
        self.inline.trim().to_string()
    }
}
