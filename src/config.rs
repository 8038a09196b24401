use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "chat-bar";

fn default_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_char_interval_ms() -> u64 {
    40
}

fn default_code_interval_ms() -> u64 {
    50
}

fn default_word_interval_ms() -> u64 {
    16
}

fn default_loading_delay_ms() -> u64 {
    500
}

fn default_copy_confirm_ms() -> u64 {
    1000
}

fn default_suggestions() -> Vec<String> {
    vec![
        "Help me plan a relaxing weekend trip to the mountains".to_string(),
        "Explain how a hash map works in simple terms".to_string(),
        "Write a short python function that reverses a string".to_string(),
        "Suggest three names for a friendly houseplant".to_string(),
    ]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub typing: TypingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Persona preamble sent as a system message ahead of every turn.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    #[default]
    Auto,
    Character,
    Word,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypingConfig {
    #[serde(default)]
    pub strategy: StrategyChoice,
    #[serde(default = "default_char_interval_ms")]
    pub char_interval_ms: u64,
    #[serde(default = "default_code_interval_ms")]
    pub code_interval_ms: u64,
    #[serde(default = "default_word_interval_ms")]
    pub word_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_loading_delay_ms")]
    pub loading_delay_ms: u64,
    #[serde(default = "default_copy_confirm_ms")]
    pub copy_confirm_ms: u64,
    #[serde(default = "default_suggestions")]
    pub suggestions: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            system_prompt: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 720,
            height: 820,
            min_width: 400,
            min_height: 360,
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        TypingConfig {
            strategy: StrategyChoice::Auto,
            char_interval_ms: default_char_interval_ms(),
            code_interval_ms: default_code_interval_ms(),
            word_interval_ms: default_word_interval_ms(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            loading_delay_ms: default_loading_delay_ms(),
            copy_confirm_ms: default_copy_confirm_ms(),
            suggestions: default_suggestions(),
        }
    }
}

impl ApiConfig {
    /// Reads the bearer token from the configured environment variable.
    /// Blank values count as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

impl ChatConfig {
    pub fn loading_delay(&self) -> Duration {
        Duration::from_millis(self.loading_delay_ms)
    }

    pub fn copy_confirm(&self) -> Duration {
        Duration::from_millis(self.copy_confirm_ms)
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        path = %config_path.display(),
                        "error parsing config.toml: {e}. Using defaults."
                    ),
                },
                Err(e) => tracing::warn!(
                    path = %config_path.display(),
                    "error reading config.toml: {e}. Using defaults."
                ),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config").join(APP_DIR)
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.api.model, "llama3-8b-8192");
        assert_eq!(config.api.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.chat.loading_delay(), Duration::from_millis(500));
        assert_eq!(config.chat.copy_confirm(), Duration::from_secs(1));
        assert_eq!(config.typing.strategy, StrategyChoice::Auto);
        assert_eq!(config.chat.suggestions.len(), 4);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [api]
            model = "mixtral-8x7b-32768"
            system_prompt = "Answer like a pirate."

            [typing]
            strategy = "word"
            word_interval_ms = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.api.model, "mixtral-8x7b-32768");
        assert_eq!(config.api.url, default_api_url());
        assert_eq!(config.api.system_prompt.as_deref(), Some("Answer like a pirate."));
        assert_eq!(config.typing.strategy, StrategyChoice::Word);
        assert_eq!(config.typing.word_interval_ms, 30);
        assert_eq!(config.typing.char_interval_ms, 40);
        assert_eq!(config.window.width, 720);
    }

    #[test]
    fn test_invalid_strategy_is_rejected() {
        assert!(Config::parse("[typing]\nstrategy = \"sideways\"\n").is_err());
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let api = ApiConfig {
            api_key_env: "CHAT_BAR_TEST_BLANK_KEY".to_string(),
            ..ApiConfig::default()
        };
        std::env::set_var("CHAT_BAR_TEST_BLANK_KEY", "   ");
        assert_eq!(api.api_key(), None);
        std::env::set_var("CHAT_BAR_TEST_BLANK_KEY", "gsk_test");
        assert_eq!(api.api_key().as_deref(), Some("gsk_test"));
        std::env::remove_var("CHAT_BAR_TEST_BLANK_KEY");
    }
}
