//! Configuration management for the headline engine.
//!
//! Configuration is read from `~/.config/rivulet/headlines.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::OwnerPrefs;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    /// Preference defaults; an owner's stored prefs override them.
    pub defaults: OwnerPrefs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file. `None` means `<data_dir>/rivulet/rivulet.db`.
    pub path: Option<PathBuf>,
}

/// Limits and windows applied to every headline request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_limit: i64,
    pub max_limit: i64,
    pub query_timeout_secs: u64,
    /// How far back the pagination guard looks for new arrivals.
    pub first_id_window_minutes: i64,
    pub recently_read_hours: i64,
    pub max_category_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: 30,
            max_limit: 200,
            query_timeout_secs: 10,
            first_id_window_minutes: 60,
            recently_read_hours: 24,
            max_category_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Clamps a requested page size. Zero or negative means the default.
    pub fn clamp_limit(&self, limit: i64) -> i64 {
        let max = self.max_limit.max(1);
        if limit <= 0 {
            self.default_limit.clamp(1, max)
        } else {
            limit.min(max)
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/rivulet/headlines.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("rivulet").join("headlines.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# Rivulet headline engine configuration

[database]
# Database file. Defaults to <data dir>/rivulet/rivulet.db
# path = "/var/lib/rivulet/rivulet.db"

[engine]
# Page size used when a request asks for 0 rows
default_limit = 30

# Upper bound for a single page
max_limit = 200

# Requests running longer than this are cancelled
query_timeout_secs = 10

# Pagination check: only articles that arrived within this window can
# invalidate a cached page cursor
first_id_window_minutes = 60

# Age window of the "Recently read" feed
recently_read_hours = 24

# Category trees deeper than this are cut off while counting
max_category_depth = 64

[defaults]
# Per-user preferences stored in the database override these.

# Hours an unread article counts as fresh
fresh_article_max_age = 24

# Group virtual feeds by feed title
vfeed_group_by_feed = false

# Skip SELECT DISTINCT on headline pages
headlines_no_distinct = false

# One of: simple, english, german, french, spanish, russian
default_search_language = "simple"

# IANA zone such as "Europe/Berlin", UTC, or a fixed offset such as "+02:00"
timezone = "UTC"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
