//! Mod descriptors and the `build.toml` manifest

use crate::version::{parse_version, ModReference};
use crate::PackageError;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Name of the build manifest inside a mod source folder
pub const MANIFEST_FILE: &str = "build.toml";

/// Raw `build.toml` contents, as written by mod authors
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildManifest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mod_references: Vec<ModReference>,
    #[serde(default)]
    pub weak_references: Vec<ModReference>,
    #[serde(default)]
    pub dll_references: Vec<String>,
    #[serde(default)]
    pub build_ignore: Vec<String>,
    #[serde(default)]
    pub include_source: bool,
    #[serde(default = "default_include_pdb")]
    pub include_pdb: bool,
    #[serde(default)]
    pub no_compile: bool,
    /// Range of host versions the mod targets, e.g. `">=0.11, <0.12"`
    #[serde(default)]
    pub host_version: Option<String>,
}

fn default_include_pdb() -> bool {
    true
}

/// Immutable description of a mod, derived from its manifest and folder name.
///
/// This is also what gets serialized into the archive's `Info` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModDescriptor {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub mod_references: Vec<ModReference>,
    #[serde(default)]
    pub weak_references: Vec<ModReference>,
    #[serde(default)]
    pub dll_references: Vec<String>,
    #[serde(default)]
    pub build_ignore: Vec<String>,
    #[serde(default)]
    pub include_source: bool,
    #[serde(default)]
    pub include_pdb: bool,
    #[serde(default)]
    pub no_compile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_version: Option<VersionReq>,
    /// Symbol file of an externally supplied debug binary, recorded so the
    /// runtime can pick it up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_symbols_path: Option<PathBuf>,
}

impl ModDescriptor {
    /// Minimal descriptor with defaults for every optional field
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            display_name: None,
            author: None,
            homepage: None,
            description: None,
            mod_references: Vec::new(),
            weak_references: Vec::new(),
            dll_references: Vec::new(),
            build_ignore: Vec::new(),
            include_source: false,
            include_pdb: true,
            no_compile: false,
            host_version: None,
            debug_symbols_path: None,
        }
    }

    /// Build a descriptor from a parsed manifest
    pub fn from_manifest(name: impl Into<String>, manifest: BuildManifest) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PackageError::InvalidField {
                field: "name".to_string(),
                reason: "mod name cannot be empty".to_string(),
            });
        }

        let version = match manifest.version.as_deref() {
            Some(v) => parse_version(v)?,
            None => Version::new(1, 0, 0),
        };

        let host_version = manifest
            .host_version
            .as_deref()
            .map(|range| {
                VersionReq::parse(range).map_err(|error| PackageError::InvalidVersionRange {
                    range: range.to_string(),
                    error,
                })
            })
            .transpose()?;

        if let Some(lib) = manifest.dll_references.iter().find(|l| l.trim().is_empty()) {
            return Err(PackageError::InvalidField {
                field: "dll_references".to_string(),
                reason: format!("invalid library name '{}'", lib),
            });
        }

        Ok(Self {
            name,
            version,
            display_name: manifest.display_name,
            author: manifest.author,
            homepage: manifest.homepage,
            description: manifest.description,
            mod_references: manifest.mod_references,
            weak_references: manifest.weak_references,
            dll_references: manifest.dll_references,
            build_ignore: manifest
                .build_ignore
                .iter()
                .map(|p| p.replace('\\', "/"))
                .collect(),
            include_source: manifest.include_source,
            include_pdb: manifest.include_pdb,
            no_compile: manifest.no_compile,
            host_version,
            debug_symbols_path: None,
        })
    }

    /// Parse manifest text for the mod `name`
    pub fn from_toml_str(name: impl Into<String>, content: &str, path: &Path) -> crate::Result<Self> {
        let manifest: BuildManifest =
            toml::from_str(content).map_err(|error| PackageError::ParseError {
                path: path.to_path_buf(),
                error,
            })?;
        Self::from_manifest(name, manifest)
    }

    /// Read the descriptor of the mod source folder `folder`.
    ///
    /// The mod name is the folder's file name; a missing manifest yields a
    /// descriptor with defaults.
    pub fn read_from_folder(folder: &Path) -> crate::Result<Self> {
        let name = mod_name_from_folder(folder)?;
        let manifest_path = folder.join(MANIFEST_FILE);

        if !manifest_path.exists() {
            return Self::from_manifest(name, empty_manifest());
        }

        let content = std::fs::read_to_string(&manifest_path)?;
        Self::from_toml_str(name, &content, &manifest_path)
    }

    /// Names of referenced mods; weak references are included on request
    pub fn ref_names(&self, include_weak: bool) -> Vec<&str> {
        self.references(include_weak).map(|r| r.name.as_str()).collect()
    }

    /// Referenced mods, strong references first
    pub fn references(&self, include_weak: bool) -> impl Iterator<Item = &ModReference> {
        let weak: &[ModReference] = if include_weak {
            &self.weak_references
        } else {
            &[]
        };
        self.mod_references.iter().chain(weak.iter())
    }

    /// Whether `name` is only referenced weakly
    pub fn is_weak_reference(&self, name: &str) -> bool {
        self.weak_references.iter().any(|r| r.name == name)
    }

    /// Compile the `build_ignore` patterns
    pub fn ignore_set(&self) -> crate::Result<IgnoreSet> {
        IgnoreSet::new(&self.build_ignore)
    }

    /// Serialize for the archive `Info` entry
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize an archive `Info` entry
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn empty_manifest() -> BuildManifest {
    BuildManifest {
        version: None,
        display_name: None,
        author: None,
        homepage: None,
        description: None,
        mod_references: Vec::new(),
        weak_references: Vec::new(),
        dll_references: Vec::new(),
        build_ignore: Vec::new(),
        include_source: false,
        include_pdb: default_include_pdb(),
        no_compile: false,
        host_version: None,
    }
}

/// Derive a mod name from its source folder, ignoring trailing separators
pub fn mod_name_from_folder(folder: &Path) -> crate::Result<String> {
    let last = match folder.components().next_back() {
        Some(Component::Normal(name)) => name.to_str(),
        _ => None,
    };

    last.filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PackageError::InvalidField {
            field: "name".to_string(),
            reason: format!("cannot derive a mod name from '{}'", folder.display()),
        })
}

/// Compiled wildcard patterns from a mod's `build_ignore` list.
///
/// `*` matches any run of characters (including `/`), `?` matches one
/// character, and a pattern must match the whole relative path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> crate::Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let body = regex::escape(&pattern.replace('\\', "/"))
                    .replace(r"\*", ".*")
                    .replace(r"\?", ".");
                Regex::new(&format!("^{}$", body)).map_err(|e| PackageError::InvalidField {
                    field: "build_ignore".to_string(),
                    reason: format!("pattern '{}': {}", pattern, e),
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether the `/`-separated relative path is ignored
    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(rel_path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
