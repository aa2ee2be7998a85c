//! Chat provider configuration

use serde::{Deserialize, Deserializer};
use std::time::Duration;

use super::error::ValidationError;

/// Chat provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Provider API key
    pub api_key: Option<String>,

    /// Base URL of the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Inline persona prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prompt file that overrides the inline prompt when readable
    pub system_prompt_path: Option<String>,

    /// Allowed emotions, in order (comma-separated in the environment)
    #[serde(
        default = "default_emotions",
        deserialize_with = "deserialize_emotions"
    )]
    pub emotions: Vec<String>,

    /// Per-attempt request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Most recent history messages forwarded (0 = all)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl AiConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Base URL without trailing slashes
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate chat provider configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_api_key() {
            return Err(ValidationError::MissingRequired("AI__API_KEY"));
        }

        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AI__MODEL"));
        }

        let url = self.normalized_base_url();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl);
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidTemperature);
        }

        Ok(())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            system_prompt_path: None,
            emotions: default_emotions(),
            timeout_secs: default_timeout(),
            max_history: default_max_history(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_system_prompt() -> String {
    "You are Ugur. You are chatting with a visitor on your personal website. \
     Reply in the first person as Ugur. Be concise, friendly, and natural."
        .to_string()
}

fn default_emotions() -> Vec<String> {
    [
        "neutral",
        "happy",
        "sad",
        "angry",
        "confused",
        "amused",
        "thoughtful",
        "excited",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_history() -> usize {
    20
}

/// Accepts either a list or a comma-separated string.
fn deserialize_emotions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Emotions {
        List(Vec<String>),
        Csv(String),
    }

    let values = match Emotions::deserialize(deserializer)? {
        Emotions::List(list) => list,
        Emotions::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AiConfig {
        AiConfig {
            api_key: Some("sk-xxx".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_ai_config_defaults() {
        let config = AiConfig::default();
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_history, 20);
        assert_eq!(config.emotions.len(), 8);
        assert_eq!(config.emotions[0], "neutral");
    }

    #[test]
    fn test_timeout_duration() {
        let config = AiConfig {
            timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_normalized_base_url() {
        let config = AiConfig {
            base_url: "https://api.openai.com/v1//".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_key() {
        let config = AiConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("AI__API_KEY"))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = AiConfig {
            base_url: "ftp://example.com".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBaseUrl)));

        let config = AiConfig {
            timeout_secs: 0,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTimeout)));

        let config = AiConfig {
            temperature: 3.5,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTemperature)));

        let config = AiConfig {
            model: String::new(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_emotions_accept_csv_and_list() {
        let from_csv: AiConfig =
            serde_json::from_str(r#"{"emotions":" happy, sad ,,curious"}"#).unwrap();
        assert_eq!(from_csv.emotions, vec!["happy", "sad", "curious"]);

        let from_list: AiConfig = serde_json::from_str(r#"{"emotions":["a","b"]}"#).unwrap();
        assert_eq!(from_list.emotions, vec!["a", "b"]);
    }
}
