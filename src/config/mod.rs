//! Application configuration
//!
//! An optional TOML file provides the base; `ACHALUGO_*` environment
//! variables (including ones from a `.env` file) override it.

pub mod file;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub use file::{ConfigError, ConfigFile, ConversationConfig, DisplayConfig, ServiceConfig};

use crate::core::StoreOptions;

const DEFAULT_CONFIG_PATH: &str = "achalugo.toml";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub conversation: ConversationConfig,
    pub display: DisplayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var("ACHALUGO_CONFIG").ok().map(PathBuf::from);
        Self::load(path, |key| env::var(key).ok())
    }

    /// Read the file at `path` (or the default path, if present) and apply
    /// overrides from `lookup`.
    pub fn load(
        path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ConfigFile::from_file(&path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    ConfigFile::from_file(&default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let mut config = Self::from(file);
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("ACHALUGO_API_URL") {
            self.service.base_url = url;
        }
        if let Some(secs) = lookup("ACHALUGO_TIMEOUT_SECS") {
            self.service.timeout_secs = parse("ACHALUGO_TIMEOUT_SECS", &secs)?;
        }
        if let Some(flag) = lookup("ACHALUGO_SINGLE_PENDING") {
            self.conversation.single_pending = parse("ACHALUGO_SINGLE_PENDING", &flag)?;
        }
        if let Some(policy) = lookup("ACHALUGO_ON_FAILURE") {
            self.conversation.on_failure = policy.parse().map_err(ConfigError::Validation)?;
        }
        if let Some(width) = lookup("ACHALUGO_WIDTH") {
            self.display.width = parse("ACHALUGO_WIDTH", &width)?;
        }

        self.service.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            single_pending: self.conversation.single_pending,
            on_failure: self.conversation.on_failure,
        }
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            service: file.service,
            conversation: file.conversation,
            display: file.display,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} has invalid value '{}'", key, value)))
}
