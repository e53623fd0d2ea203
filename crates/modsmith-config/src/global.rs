//! Global Configuration (~/.modsmith/config.toml)
//!
//! Describes where the host application is installed, which backend it runs
//! on, and where the external compiler and metadata tools live.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.modsmith/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Root for installed mods, mod sources and shared references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,

    /// Host application settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostConfig>,

    /// External tool locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
}

/// Host application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Directory holding the host binary and its `ModCompile` folder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// File name of the running host binary inside `install_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    /// Version of the running host, checked against mod `host_version` ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Backend the running host uses ("xna" or "fna")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Primary debug symbol format ("portable-pdb" or "native-pdb")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_format: Option<String>,
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Compiler program invoked once per variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<PathBuf>,

    /// Binary metadata inspector / rewriter program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspector: Option<PathBuf>,

    /// Directory of platform framework reference assemblies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_references: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(host) = &self.host {
            if let Some(variant) = &host.variant {
                if !matches!(variant.to_ascii_lowercase().as_str(), "xna" | "fna") {
                    return Err(ConfigError::InvalidValue {
                        field: "host.variant".to_string(),
                        reason: format!("must be 'xna' or 'fna', got '{}'", variant),
                    });
                }
            }

            if let Some(format) = &host.symbol_format {
                if !matches!(format.as_str(), "portable-pdb" | "native-pdb") {
                    return Err(ConfigError::InvalidValue {
                        field: "host.symbol_format".to_string(),
                        reason: format!(
                            "must be 'portable-pdb' or 'native-pdb', got '{}'",
                            format
                        ),
                    });
                }
            }

            if let Some(version) = &host.version {
                if version.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "host.version".to_string(),
                        reason: "version cannot be empty".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Get the global config file path (~/.modsmith/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        Ok(default_save_dir()?.join("config.toml"))
    }

    /// Merge another global config into this one.
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.save_dir.is_some() {
            self.save_dir = other.save_dir.clone();
        }
        if let Some(other_host) = &other.host {
            let host = self.host.get_or_insert_with(HostConfig::default);
            merge_option(&mut host.install_dir, &other_host.install_dir);
            merge_option(&mut host.binary, &other_host.binary);
            merge_option(&mut host.version, &other_host.version);
            merge_option(&mut host.variant, &other_host.variant);
            merge_option(&mut host.symbol_format, &other_host.symbol_format);
        }
        if let Some(other_tools) = &other.tools {
            let tools = self.tools.get_or_insert_with(ToolsConfig::default);
            merge_option(&mut tools.compiler, &other_tools.compiler);
            merge_option(&mut tools.inspector, &other_tools.inspector);
            merge_option(
                &mut tools.framework_references,
                &other_tools.framework_references,
            );
        }
    }

    pub fn host(&self) -> Option<&HostConfig> {
        self.host.as_ref()
    }

    pub fn tools(&self) -> Option<&ToolsConfig> {
        self.tools.as_ref()
    }
}

fn merge_option<T: Clone>(target: &mut Option<T>, other: &Option<T>) {
    if other.is_some() {
        *target = other.clone();
    }
}

/// Default save directory (~/.modsmith)
pub fn default_save_dir() -> ConfigResult<PathBuf> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(home.join(".modsmith"))
}
