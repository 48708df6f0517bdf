//! Configuration for the semantic query layer.
//!
//! Handles TOML settings and environment variable expansion: the active
//! dialect, result-cache defaults, the dev-mode security warning toggle,
//! and filter-cache logging verbosity.

mod settings;

pub use settings::{
    expand_env_vars, CacheDefaults, FilterCacheLogVerbosity, FilterCacheSettings, Settings,
    SettingsError,
};
