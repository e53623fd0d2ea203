//! Build pipeline error types

use crate::compiler::Diagnostic;
use modsmith_package::PackageError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Environment not ready: {0}")]
    EnvironmentNotReady(String),

    #[error("Failed to read manifest at {path}: {error}")]
    ManifestReadError { path: PathBuf, error: String },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Missing dependency '{dependency}' required by '{required_by}'")]
    MissingDependency {
        dependency: String,
        required_by: String,
    },

    #[error("'{mod_name}' requires {dependency} {required}, found {found}")]
    VersionMismatch {
        mod_name: String,
        dependency: String,
        required: String,
        found: String,
    },

    #[error("Library '{library}' referenced by '{mod_name}' could not be found")]
    ReferenceMissing { library: String, mod_name: String },

    #[error(
        "Compilation failed for '{mod_name}': {errors} errors, {warnings} warnings. First error: {first_error}"
    )]
    CompileError {
        mod_name: String,
        errors: usize,
        warnings: usize,
        first_error: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Verification failed for '{mod_name}': {rule}")]
    VerificationError { mod_name: String, rule: VerifyRule },

    #[error("I/O error at {path}: {error}")]
    PackagingIo {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Precompiled binary not found: {}", .path.display())]
    PrecompiledMissing { path: PathBuf },

    /// A shared lazy reference failed; every caller sees the same cause
    #[error("Failed to extract reference '{name}': {cause}")]
    ReferenceExtraction { name: String, cause: Arc<BuildError> },

    #[error("Archive error: {0}")]
    Archive(#[from] PackageError),

    #[error("{tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("{source}")]
    Mod {
        name: String,
        #[source]
        source: Box<BuildError>,
    },
}

/// Error kind, independent of per-mod annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EnvironmentNotReady,
    ManifestReadError,
    DependencyCycle,
    MissingDependency,
    VersionMismatch,
    ReferenceMissing,
    CompileError,
    VerificationError,
    PackagingIo,
    PrecompiledMissing,
    Archive,
    Tool,
}

/// Verification rule a compiled binary violated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyRule {
    NameMismatch { expected: String, found: String },
    ReservedName,
    MissingOrAmbiguousModClass { found: usize },
    NamespaceMismatch { expected: String, found: String },
}

impl fmt::Display for VerifyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameMismatch { expected, found } => {
                write!(f, "name mismatch (binary is '{}', expected '{}')", found, expected)
            }
            Self::ReservedName => f.write_str("reserved name"),
            Self::MissingOrAmbiguousModClass { found } => {
                write!(f, "missing or ambiguous mod class ({} found)", found)
            }
            Self::NamespaceMismatch { expected, found } => write!(
                f,
                "namespace mismatch (mod class is in '{}', expected '{}')",
                found, expected
            ),
        }
    }
}

impl BuildError {
    /// Create a manifest read error
    pub fn manifest_read(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::ManifestReadError {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::PackagingIo {
            path: path.into(),
            error,
        }
    }

    /// Create a missing dependency error
    pub fn missing_dependency(dependency: impl Into<String>, required_by: impl Into<String>) -> Self {
        Self::MissingDependency {
            dependency: dependency.into(),
            required_by: required_by.into(),
        }
    }

    /// Create a missing reference error
    pub fn reference_missing(library: impl Into<String>, mod_name: impl Into<String>) -> Self {
        Self::ReferenceMissing {
            library: library.into(),
            mod_name: mod_name.into(),
        }
    }

    /// Create a verification error
    pub fn verification(mod_name: impl Into<String>, rule: VerifyRule) -> Self {
        Self::VerificationError {
            mod_name: mod_name.into(),
            rule,
        }
    }

    /// Create a compile error from the full diagnostic list
    pub fn compile(mod_name: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        let warnings = diagnostics.len() - errors;
        let first_error = diagnostics
            .iter()
            .find(|d| d.is_error())
            .map(|d| d.to_string())
            .unwrap_or_default();
        Self::CompileError {
            mod_name: mod_name.into(),
            errors,
            warnings,
            first_error,
            diagnostics,
        }
    }

    /// Create an external tool failure
    pub fn tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Tag an error with the mod it was raised for. Already tagged errors are
    /// left alone.
    pub fn for_mod(self, name: impl Into<String>) -> Self {
        match self {
            Self::Mod { .. } => self,
            other => Self::Mod {
                name: name.into(),
                source: Box::new(other),
            },
        }
    }

    /// Mod this error was raised for, if tagged
    pub fn mod_name(&self) -> Option<&str> {
        match self {
            Self::Mod { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The underlying error, looking through the per-mod annotation and
    /// shared reference failures
    pub fn root(&self) -> &BuildError {
        match self {
            Self::Mod { source, .. } => source.root(),
            Self::ReferenceExtraction { cause, .. } => cause.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::EnvironmentNotReady(_) => ErrorKind::EnvironmentNotReady,
            Self::ManifestReadError { .. } => ErrorKind::ManifestReadError,
            Self::DependencyCycle(_) => ErrorKind::DependencyCycle,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::ReferenceMissing { .. } => ErrorKind::ReferenceMissing,
            Self::CompileError { .. } => ErrorKind::CompileError,
            Self::VerificationError { .. } => ErrorKind::VerificationError,
            Self::PackagingIo { .. } => ErrorKind::PackagingIo,
            Self::PrecompiledMissing { .. } => ErrorKind::PrecompiledMissing,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Tool { .. } => ErrorKind::Tool,
            // root() never returns a wrapper
            Self::Mod { source, .. } => source.kind(),
            Self::ReferenceExtraction { cause, .. } => cause.kind(),
        }
    }
}

/// Attach mod identity to any fallible build step
pub trait ModContext<T> {
    fn for_mod(self, name: &str) -> BuildResult<T>;
}

impl<T> ModContext<T> for BuildResult<T> {
    fn for_mod(self, name: &str) -> BuildResult<T> {
        self.map_err(|e| e.for_mod(name))
    }
}
