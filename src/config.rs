use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;
use tracing::debug;

use crate::error::ChatError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Forwarded to the backend only when set.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Unset means the HTTP client default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5000/chat".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: None,
            temperature: None,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    /// "auto", "none", or the name of a speech program on PATH.
    #[serde(default = "default_synthesizer")]
    pub synthesizer: String,
    #[serde(default = "default_lang")]
    pub default_lang: String,
    /// Choices offered for the language selector. Empty accepts any tag.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_synthesizer() -> String {
    "auto".to_string()
}

pub fn default_lang() -> String {
    "en-US".to_string()
}

fn default_languages() -> Vec<String> {
    ["en-US", "en-GB", "en-IN", "hi-IN", "es-ES", "fr-FR", "de-DE"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            synthesizer: default_synthesizer(),
            default_lang: default_lang(),
            languages: default_languages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VoiceConfig {
    /// Program and arguments that capture one utterance and print its
    /// transcript on stdout. `{lang}` is replaced by the language tag.
    /// Empty disables voice typing.
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UiConfig {
    #[serde(default = "default_copy_feedback_ms")]
    pub copy_feedback_ms: u64,
    #[serde(default = "default_true")]
    pub show_welcome: bool,
    /// Rows shown when scrolling through history.
    #[serde(default = "default_history_rows")]
    pub history_rows: usize,
}

fn default_history_rows() -> usize {
    10
}

fn default_copy_feedback_ms() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            copy_feedback_ms: default_copy_feedback_ms(),
            show_welcome: true,
            history_rows: default_history_rows(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            speech: SpeechConfig::default(),
            voice: VoiceConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

/// Loose BCP 47 shape: primary subtag plus optional subtags (`en`, `en-US`, `zh-Hant-TW`).
pub fn is_language_tag(tag: &str) -> bool {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(tag))
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        Self::validate_config_path(path)?;

        if !path.exists() {
            debug!("Config file not found at {:?}, creating default", path);
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.client.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ChatError::Config("client endpoint cannot be empty".to_string()).into());
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ChatError::Config(format!(
                "client endpoint must be an http(s) URL, got '{}'",
                endpoint
            ))
            .into());
        }

        if let Some(t) = self.client.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatError::Config(
                    "temperature must be between 0.0 and 2.0".to_string(),
                )
                .into());
            }
        }

        if let Some(timeout) = self.client.timeout_ms {
            if !(1000..=300_000).contains(&timeout) {
                return Err(ChatError::Config(
                    "timeout_ms must be between 1000 and 300000".to_string(),
                )
                .into());
            }
        }

        if !is_language_tag(&self.speech.default_lang) {
            return Err(ChatError::Config(format!(
                "default_lang '{}' is not a language tag",
                self.speech.default_lang
            ))
            .into());
        }
        if let Some(bad) = self.speech.languages.iter().find(|l| !is_language_tag(l)) {
            return Err(ChatError::Config(format!(
                "languages entry '{}' is not a language tag",
                bad
            ))
            .into());
        }
        if !self.speech.languages.is_empty()
            && !self.speech.languages.contains(&self.speech.default_lang)
        {
            return Err(ChatError::Config(
                "default_lang must be one of the configured languages".to_string(),
            )
            .into());
        }

        if self.speech.synthesizer.trim().is_empty() {
            return Err(ChatError::Config(
                "synthesizer cannot be empty (use \"auto\" or \"none\")".to_string(),
            )
            .into());
        }

        if self.ui.copy_feedback_ms < 100 || self.ui.copy_feedback_ms > 10_000 {
            return Err(ChatError::Config(
                "copy_feedback_ms must be between 100 and 10000".to_string(),
            )
            .into());
        }

        if !(1..=200).contains(&self.ui.history_rows) {
            return Err(ChatError::Config(
                "history_rows must be between 1 and 200".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Validate that a config path is safe
    fn validate_config_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            return Err(ChatError::Config(
                "Config path cannot contain path traversal sequences".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.client.endpoint, "http://127.0.0.1:5000/chat");
        assert!(config.client.model.is_none());
        assert_eq!(config.speech.default_lang, "en-US");
        assert_eq!(config.ui.copy_feedback_ms, 900);
        assert!(config.voice.command.is_empty());
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let mut config = Config::default();
        config.client.temperature = Some(0.4);
        config.save(&config_path).await.unwrap();

        let loaded = Config::load(&config_path).await.unwrap();
        assert_eq!(loaded.client.endpoint, config.client.endpoint);
        assert_eq!(loaded.client.temperature, Some(0.4));
        assert_eq!(loaded.speech.languages, config.speech.languages);
    }

    #[tokio::test]
    async fn test_config_load_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/config.toml");

        let loaded = Config::load(&config_path).await.unwrap();
        assert!(config_path.exists());
        assert_eq!(loaded.ui.copy_feedback_ms, 900);
    }

    #[tokio::test]
    async fn test_config_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[client]\nendpoint = \"https://chat.example/chat\"\n").unwrap();

        let loaded = Config::load(&config_path).await.unwrap();
        assert_eq!(loaded.client.endpoint, "https://chat.example/chat");
        assert_eq!(loaded.speech.synthesizer, "auto");
        assert!(loaded.ui.show_welcome);
    }

    #[tokio::test]
    async fn test_config_load_rejects_path_traversal() {
        let result = Config::load(Path::new("/tmp/../etc/mindmeld.toml")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation_valid_values() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_endpoint() {
        let mut config = Config::default();
        config.client.endpoint = String::new();
        assert!(config.validate().is_err());

        config.client.endpoint = "ftp://host/chat".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_temperature() {
        let mut config = Config::default();
        config.client.temperature = Some(2.5);
        assert!(config.validate().is_err());

        config.client.temperature = Some(-0.1);
        assert!(config.validate().is_err());

        config.client.temperature = Some(2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_timeout() {
        let mut config = Config::default();
        config.client.timeout_ms = Some(10);
        assert!(config.validate().is_err());

        config.client.timeout_ms = Some(30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_default_lang_must_be_listed() {
        let mut config = Config::default();
        config.speech.default_lang = "pt-BR".to_string();
        assert!(config.validate().is_err());

        config.speech.languages.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_copy_feedback() {
        let mut config = Config::default();
        config.ui.copy_feedback_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_history_rows() {
        let mut config = Config::default();
        config.ui.history_rows = 0;
        assert!(config.validate().is_err());
        config.ui.history_rows = 40;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_language_tag() {
        assert!(is_language_tag("en"));
        assert!(is_language_tag("en-US"));
        assert!(is_language_tag("zh-Hant-TW"));
        assert!(!is_language_tag(""));
        assert!(!is_language_tag("english please"));
        assert!(!is_language_tag("e"));
    }
}
