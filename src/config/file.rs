//! Client configuration loaded from TOML files
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::FailurePolicy;

/// Root configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Answer service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Conversation store behavior
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Transcript display
    #[serde(default)]
    pub display: DisplayConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ConfigFile = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL; requests go to `{base_url}/api/chat`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout for one answer call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("service.base_url is empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "service.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Refuse new questions while an answer is pending
    #[serde(default = "default_true")]
    pub single_pending: bool,

    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_true() -> bool {
    true
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            single_pending: true,
            on_failure: FailurePolicy::Silent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Terminal columns used for alignment
    #[serde(default = "default_width")]
    pub width: usize,

    /// Print the greeting before the first prompt
    #[serde(default = "default_true")]
    pub banner: bool,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_intro")]
    pub intro: String,

    #[serde(default = "default_call_to_action")]
    pub call_to_action: String,

    /// Prompt shown while waiting for input
    #[serde(default = "default_input_hint")]
    pub input_hint: String,
}

fn default_width() -> usize {
    80
}

fn default_name() -> String {
    "ACHALUGO".to_string()
}

fn default_intro() -> String {
    "Hello, I am Achalugo, your closest Igbo elder and onye Amamihe. I am here to help you \
     understand the Igbo culture, tradition, customs and other things pertaining to the Igbo's."
        .to_string()
}

fn default_call_to_action() -> String {
    "JUO'M AJUJU!".to_string()
}

fn default_input_hint() -> String {
    "Ask me something...".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            banner: true,
            name: default_name(),
            intro: default_intro(),
            call_to_action: default_call_to_action(),
            input_hint: default_input_hint(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
