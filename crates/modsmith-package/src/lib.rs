//! Modsmith package layer
//!
//! Types shared by every stage of the mod build pipeline:
//! - Mod descriptors read from `build.toml` manifests
//! - Dependency references with optional minimum versions
//! - Backend variants (XNA / FNA) and their binary naming conventions
//! - Packaged mod archives (`.tmod`), read and written as zip containers

pub mod archive;
pub mod descriptor;
pub mod variant;
pub mod version;

pub use archive::{ArchiveEntry, ModArchive, ARCHIVE_EXTENSION, INFO_ENTRY};
pub use descriptor::{mod_name_from_folder, BuildManifest, IgnoreSet, ModDescriptor, MANIFEST_FILE};
pub use variant::{all_platforms_binary_name, Variant};
pub use version::{parse_version, ModReference};

use std::path::PathBuf;

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse manifest {path}: {error}")]
    ParseError {
        path: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize descriptor: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version range '{range}': {error}")]
    InvalidVersionRange { range: String, error: semver::Error },

    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Archive {path} is corrupt: expected hash {expected}, found {found}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Invalid archive entry path '{0}'")]
    InvalidEntryPath(String),

    #[error("Archive entry '{0}' is reserved")]
    ReservedEntry(String),

    #[error("Archive has no '{0}' entry")]
    MissingEntry(String),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, PackageError>;
