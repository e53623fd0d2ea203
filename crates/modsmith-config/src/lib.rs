//! Modsmith Configuration System
//!
//! Provides configuration for the mod build pipeline:
//! - Global user configuration (~/.modsmith/config.toml): install layout,
//!   host application and external tool locations
//! - Launch configuration: unsafe-code toggle, extra preprocessor symbols and
//!   an externally built debug binary
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.modsmith/config.toml)
//! 3. Environment variables (MODSMITH_*)
//! 4. CLI flags (applied by the caller)
//!
//! # Example
//!
//! ```no_run
//! use modsmith_config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load().unwrap();
//! println!("mods are installed to {}", config.mods_dir().display());
//! ```

pub mod global;
pub mod launch;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required setting '{0}'")]
    MissingSetting(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::{GlobalConfig, HostConfig, ToolsConfig};
pub use launch::LaunchConfig;
pub use loader::{Config, ConfigLoader};
