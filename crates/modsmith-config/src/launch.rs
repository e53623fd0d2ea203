//! Launch configuration
//!
//! Per-invocation switches that change how mods are compiled. They come from
//! the environment (`MODSMITH_UNSAFE`, `MODSMITH_DEFINE`,
//! `MODSMITH_DEBUG_BINARY`) and can be overridden by CLI flags.

use std::env;
use std::path::PathBuf;

/// Per-invocation compile switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Allow `unsafe` blocks in mod sources
    pub allow_unsafe: bool,
    /// Extra preprocessor symbols, added after the variant tag
    pub defines: Vec<String>,
    /// Externally built binary used instead of compiling the variant the
    /// host currently runs on
    pub debug_binary: Option<PathBuf>,
}

impl LaunchConfig {
    /// Load launch configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            allow_unsafe: env::var("MODSMITH_UNSAFE")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            defines: env::var("MODSMITH_DEFINE")
                .map(|v| parse_defines(&v))
                .unwrap_or_default(),
            debug_binary: env::var("MODSMITH_DEBUG_BINARY")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_unsafe(mut self, allow_unsafe: bool) -> Self {
        self.allow_unsafe = allow_unsafe;
        self
    }

    /// Append symbols; each item may itself hold a `;`/space separated list
    pub fn with_defines<I, S>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for define in defines {
            self.defines.extend(parse_defines(define.as_ref()));
        }
        self
    }

    pub fn with_debug_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_binary = Some(path.into());
        self
    }

    /// Symbol file that accompanies the debug binary
    pub fn debug_symbols_path(&self) -> Option<PathBuf> {
        self.debug_binary.as_ref().map(|p| p.with_extension("pdb"))
    }
}

/// Split a define list on `;` and spaces, dropping empty items
pub fn parse_defines(value: &str) -> Vec<String> {
    value
        .split([';', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
