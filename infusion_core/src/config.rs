//! Configuration file support for the infusion calculator.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/infusion/config.toml`.
//! Every section is optional.

use crate::codec::FALLBACK_BASE;
use crate::debounce::DEFAULT_WINDOW;
use crate::{Error, Language, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub ui: UiConfig,

    #[serde(default)]
    pub share: ShareConfig,
}

/// Where live drug configuration comes from
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Document URL; no remote refresh when unset
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_refresh_on_start")]
    pub refresh_on_start: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
            refresh_on_start: default_refresh_on_start(),
        }
    }
}

/// Presentation defaults
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    /// Language used when a location carries no `lang`
    #[serde(default)]
    pub language: Language,

    /// Quiet period before the location bar is rewritten
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            language: Language::En,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl UiConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Share-link settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ShareConfig {
    /// Page that share links point at
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

// Default value functions
fn default_timeout_secs() -> u64 {
    10
}

fn default_refresh_on_start() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    DEFAULT_WINDOW.as_millis() as u64
}

fn default_base_url() -> String {
    FALLBACK_BASE.to_string()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.remote.timeout_secs == 0 {
            return Err(Error::Config("remote.timeout_secs must be at least 1".into()));
        }
        if let Some(url) = &self.remote.url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("remote.url '{}' is invalid: {}", url, e)))?;
        }
        self.share_base()?;
        Ok(())
    }

    /// The parsed share base URL
    pub fn share_base(&self) -> Result<url::Url> {
        url::Url::parse(&self.share.base_url).map_err(|e| {
            Error::Config(format!(
                "share.base_url '{}' is invalid: {}",
                self.share.base_url, e
            ))
        })
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("infusion").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
