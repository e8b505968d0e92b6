//! Configuration management
//!
//! This module handles loading, saving, and migrating the bkt configuration file.
//! The configuration file is stored in TOML format at ~/.config/bkt/config.toml,
//! or under the directory named by `BKT_CONFIG_DIR` when that is set.
//!
//! PROTECTED FILE: Changes to schema_version require migration support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Current configuration schema version
///
/// IMPORTANT: Bumping this version requires a migration step in
/// `ConfigManager::migrate` and matching tests.
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BKT_CONFIG_DIR";

/// Default listing page size
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default output format
const DEFAULT_OUTPUT: &str = "human";

/// Default color setting
const DEFAULT_COLOR: &str = "auto";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Configured profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Default settings for CLI behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress spinners
    #[serde(default = "default_true")]
    pub progress: bool,

    /// Listing page size used when neither profile nor query sets one
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            profiles: Vec::new(),
        }
    }
}

impl Config {
    /// Page size for a profile: profile override, then configured default
    pub fn page_size_for(&self, profile: &Profile) -> u32 {
        profile.page_size.unwrap_or(self.defaults.page_size).max(1)
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(Self {
                config_path: PathBuf::from(dir).join("config.toml"),
            });
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".into()))?;
        let config_path = config_dir.join("bkt").join("config.toml");
        Ok(Self { config_path })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade bkt.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        tracing::debug!(path = %self.config_path.display(), "Saved configuration");
        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;
        tracing::debug!(
            from = config.schema_version,
            to = SCHEMA_VERSION,
            "Migrating configuration"
        );
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
