//! TOML-based configuration for the semantic query layer.
//!
//! Supports a config file (`semlayer.toml`) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! dialect = "postgres"
//! dev_mode_security_warning = true
//!
//! [cache_defaults]
//! default_ttl_ms = 60000
//! max_entries = 10000
//! key_prefix = "semlayer"
//!
//! [filter_cache]
//! log_verbosity = "stats"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Active SQL dialect, as its lowercase name ("postgres", "mysql", "sqlite", "duckdb").
    pub dialect: String,

    /// Result-cache defaults.
    pub cache_defaults: CacheDefaults,

    /// Emit a `tracing::warn!` when a cube's base `sql(ctx)` has no `where`
    /// clause. Intended for development; hosts may disable in production
    /// once every cube is known to carry a tenant filter.
    pub dev_mode_security_warning: bool,

    /// Filter-SQL cache logging.
    pub filter_cache: FilterCacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialect: "postgres".to_string(),
            cache_defaults: CacheDefaults::default(),
            dev_mode_security_warning: true,
            filter_cache: FilterCacheSettings::default(),
        }
    }
}

/// Result-cache defaults (§4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheDefaults {
    /// Default time-to-live for cached results, in milliseconds.
    pub default_ttl_ms: u64,

    /// Maximum number of entries held by the memory cache before LRU eviction.
    pub max_entries: usize,

    /// Prefix prepended to every generated cache key.
    pub key_prefix: String,
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            max_entries: 10_000,
            key_prefix: "semlayer".to_string(),
        }
    }
}

/// Verbosity of filter-SQL cache stats logging (§4.5, §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCacheLogVerbosity {
    Silent,
    Stats,
    Debug,
}

impl Default for FilterCacheLogVerbosity {
    fn default() -> Self {
        FilterCacheLogVerbosity::Stats
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterCacheSettings {
    pub log_verbosity: FilterCacheLogVerbosity,
}

impl Default for FilterCacheSettings {
    fn default() -> Self {
        Self {
            log_verbosity: FilterCacheLogVerbosity::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content)?;
        let settings: Settings = toml::from_str(&expanded)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. `./semlayer.toml`
    /// 2. `~/.config/semlayer/config.toml`
    /// 3. Environment variable `SEMLAYER_CONFIG`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SEMLAYER_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("semlayer.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("semlayer").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Resolve the configured dialect name into a [`Dialect`].
    pub fn resolved_dialect(&self) -> Result<Dialect, SettingsError> {
        match self.dialect.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "duckdb" => Ok(Dialect::DuckDb),
            other => Err(SettingsError::UnsupportedDialect(other.to_string())),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(chars.next().unwrap());
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
