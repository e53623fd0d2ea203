//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::{default_save_dir, GlobalConfig, HostConfig, ToolsConfig};
use crate::launch::LaunchConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the advisory lock file inside the save directory
pub const LOCK_FILE: &str = "buildlock";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.modsmith/config.toml) - lowest priority
/// 2. Environment variables (MODSMITH_*) - overrides global
/// 3. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Global configuration after environment overrides
    pub global: GlobalConfig,

    /// Per-invocation compile switches
    pub launch: LaunchConfig,

    /// Resolved save directory
    pub save_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global config from an explicit path instead of ~/.modsmith
    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load and merge every configuration source
    pub fn load(&mut self) -> ConfigResult<Config> {
        let global = self.load_global_config()?;
        let global = apply_env_overrides(global);
        global.validate()?;

        let save_dir = match &global.save_dir {
            Some(dir) => dir.clone(),
            None => default_save_dir()?,
        };

        Ok(Config {
            global,
            launch: LaunchConfig::from_env(),
            save_dir,
        })
    }

    /// Load global configuration from ~/.modsmith/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional - if it doesn't exist, return default
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }
}

/// Apply MODSMITH_* environment overrides on top of the file configuration
fn apply_env_overrides(mut config: GlobalConfig) -> GlobalConfig {
    if let Some(dir) = env_path("MODSMITH_SAVE_DIR") {
        config.save_dir = Some(dir);
    }

    if let Some(dir) = env_path("MODSMITH_HOST_DIR") {
        config
            .host
            .get_or_insert_with(HostConfig::default)
            .install_dir = Some(dir);
    }

    if let Some(compiler) = env_path("MODSMITH_COMPILER") {
        config
            .tools
            .get_or_insert_with(ToolsConfig::default)
            .compiler = Some(compiler);
    }

    if let Some(inspector) = env_path("MODSMITH_INSPECTOR") {
        config
            .tools
            .get_or_insert_with(ToolsConfig::default)
            .inspector = Some(inspector);
    }

    config
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Directory holding installed `.tmod` archives
    pub fn mods_dir(&self) -> PathBuf {
        self.save_dir.join("Mods")
    }

    /// Directory holding mod source folders
    pub fn mod_sources_dir(&self) -> PathBuf {
        self.save_dir.join("ModSources")
    }

    /// Shared reference folder for IDE builds
    pub fn references_dir(&self) -> PathBuf {
        self.mod_sources_dir().join("references")
    }

    /// Advisory lock file serializing builds across processes
    pub fn lock_path(&self) -> PathBuf {
        self.save_dir.join(LOCK_FILE)
    }

    /// Host install directory; required for any build
    pub fn install_dir(&self) -> ConfigResult<&Path> {
        self.global
            .host()
            .and_then(|h| h.install_dir.as_deref())
            .ok_or_else(|| ConfigError::MissingSetting("host.install_dir".to_string()))
    }

    /// File name of the running host binary
    pub fn host_binary(&self) -> &str {
        self.global
            .host()
            .and_then(|h| h.binary.as_deref())
            .unwrap_or("tModLoader.exe")
    }

    /// Host version string, if configured
    pub fn host_version(&self) -> Option<&str> {
        self.global.host().and_then(|h| h.version.as_deref())
    }

    /// Backend the running host uses, lowercase
    pub fn host_variant(&self) -> String {
        self.global
            .host()
            .and_then(|h| h.variant.as_deref())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| default_variant().to_string())
    }

    /// Primary symbol format name
    pub fn symbol_format(&self) -> &str {
        self.global
            .host()
            .and_then(|h| h.symbol_format.as_deref())
            .unwrap_or("portable-pdb")
    }

    /// Compiler program; required for compiling sources
    pub fn compiler(&self) -> ConfigResult<&Path> {
        self.global
            .tools()
            .and_then(|t| t.compiler.as_deref())
            .ok_or_else(|| ConfigError::MissingSetting("tools.compiler".to_string()))
    }

    /// Metadata inspector program; required for verification
    pub fn inspector(&self) -> ConfigResult<&Path> {
        self.global
            .tools()
            .and_then(|t| t.inspector.as_deref())
            .ok_or_else(|| ConfigError::MissingSetting("tools.inspector".to_string()))
    }

    /// Framework reference directory, defaulting to `<install>/ModCompile/framework`
    pub fn framework_references(&self) -> Option<PathBuf> {
        self.global
            .tools()
            .and_then(|t| t.framework_references.clone())
            .or_else(|| {
                self.install_dir()
                    .ok()
                    .map(|dir| dir.join("ModCompile").join("framework"))
            })
    }
}

// Windows hosts run the XNA build, everything else FNA
fn default_variant() -> &'static str {
    if cfg!(windows) {
        "xna"
    } else {
        "fna"
    }
}
