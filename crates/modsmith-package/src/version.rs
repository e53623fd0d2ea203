//! Mod versions and dependency references

use crate::PackageError;
use semver::{BuildMetadata, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse a mod version.
///
/// Mod authors write versions with one to four numeric components
/// (`1`, `0.4`, `1.2.3`, `0.11.7.5`). Missing components default to zero
/// and a fourth component is kept as build metadata. Full semver strings
/// are accepted unchanged.
pub fn parse_version(s: &str) -> crate::Result<Version> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(PackageError::InvalidVersion(s.to_string()));
    }

    let mut numbers = [0u64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| PackageError::InvalidVersion(s.to_string()))?;
    }

    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
    if parts.len() == 4 {
        version.build = BuildMetadata::new(&numbers[3].to_string())
            .map_err(|_| PackageError::InvalidVersion(s.to_string()))?;
    }
    Ok(version)
}

/// A reference to another mod, optionally pinned to a minimum version.
///
/// Written as `Name` or `Name@1.2` in manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModReference {
    pub name: String,
    pub min_version: Option<Version>,
}

impl ModReference {
    /// Reference without a version pin
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
        }
    }

    /// Reference requiring at least `version`
    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Whether `version` satisfies this reference's pin
    pub fn accepts(&self, version: &Version) -> bool {
        match &self.min_version {
            Some(min) => version >= min,
            None => true,
        }
    }
}

impl FromStr for ModReference {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name.trim(), Some(parse_version(version)?)),
            None => (s, None),
        };

        if name.is_empty() {
            return Err(PackageError::InvalidField {
                field: "mod reference".to_string(),
                reason: format!("'{}' has an empty mod name", s),
            });
        }

        Ok(Self {
            name: name.to_string(),
            min_version: version,
        })
    }
}

impl TryFrom<String> for ModReference {
    type Error = PackageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModReference> for String {
    fn from(reference: ModReference) -> Self {
        reference.to_string()
    }
}

impl fmt::Display for ModReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.min_version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}
