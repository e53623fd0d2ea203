//! Installed mods and post-build lifecycle hooks
use crate::error::{BuildError, BuildResult};
use modsmith_package::{ModArchive, ModDescriptor, ARCHIVE_EXTENSION};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An already packaged mod
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledMod {
    pub descriptor: ModDescriptor,
    pub archive_path: PathBuf,
}

impl InstalledMod {
    /// Read the descriptor of a packaged mod
    pub fn open(archive_path: &Path) -> BuildResult<Self> {
        let archive = ModArchive::open(archive_path)?;
        Ok(Self {
            descriptor: archive.descriptor()?,
            archive_path: archive_path.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Lookup of installed mods by name
pub trait ModRegistry: Send + Sync {
    /// `Ok(None)` when no mod of that name is installed
    fn find(&self, name: &str) -> BuildResult<Option<InstalledMod>>;

    fn installed(&self) -> BuildResult<Vec<InstalledMod>>;
}

/// Hooks run after a mod archive is saved
pub trait ModLifecycle: Send + Sync {
    /// Release any previously active version of the mod
    fn unload(&self, name: &str) -> BuildResult<()>;

    /// Mark the freshly built mod available for use
    fn activate(&self, name: &str) -> BuildResult<()>;
}

/// Registry backed by the `*.tmod` files of a mods directory
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    mods_dir: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(mods_dir: impl Into<PathBuf>) -> Self {
        Self {
            mods_dir: mods_dir.into(),
        }
    }
}

impl ModRegistry for DirectoryRegistry {
    fn find(&self, name: &str) -> BuildResult<Option<InstalledMod>> {
        let path = self
            .mods_dir
            .join(format!("{}.{}", name, ARCHIVE_EXTENSION));
        if !path.is_file() {
            return Ok(None);
        }
        InstalledMod::open(&path).map(Some)
    }

    fn installed(&self) -> BuildResult<Vec<InstalledMod>> {
        if !self.mods_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.mods_dir).map_err(|e| BuildError::io(&self.mods_dir, e))? {
            let path = entry.map_err(|e| BuildError::io(&self.mods_dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut installed = Vec::with_capacity(paths.len());
        for path in &paths {
            match InstalledMod::open(path) {
                Ok(m) => installed.push(m),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable mod"),
            }
        }
        Ok(installed)
    }
}

/// Lifecycle hooks backed by an `enabled.json` list in the mods directory
#[derive(Debug, Clone)]
pub struct EnabledList {
    path: PathBuf,
}

impl EnabledList {
    pub const FILE_NAME: &'static str = "enabled.json";

    pub fn new(mods_dir: &Path) -> Self {
        Self {
            path: mods_dir.join(Self::FILE_NAME),
        }
    }

    /// Names currently enabled
    pub fn read(&self) -> BuildResult<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let content = fs::read(&self.path).map_err(|e| BuildError::io(&self.path, e))?;
        serde_json::from_slice(&content)
            .map_err(|e| BuildError::io(&self.path, std::io::Error::other(e)))
    }

    fn write(&self, names: &BTreeSet<String>) -> BuildResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        let content = serde_json::to_vec_pretty(names)
            .map_err(|e| BuildError::io(&self.path, std::io::Error::other(e)))?;
        fs::write(&self.path, content).map_err(|e| BuildError::io(&self.path, e))
    }
}

impl ModLifecycle for EnabledList {
    fn unload(&self, name: &str) -> BuildResult<()> {
        let mut names = self.read()?;
        if names.remove(name) {
            debug!(mod_name = %name, "disabled previous version");
            self.write(&names)?;
        }
        Ok(())
    }

    fn activate(&self, name: &str) -> BuildResult<()> {
        let mut names = self.read()?;
        names.insert(name.to_string());
        debug!(mod_name = %name, "enabled");
        self.write(&names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use tempfile::TempDir;

    fn install(dir: &Path, name: &str) {
        let desc = ModDescriptor::new(name, Version::new(1, 2, 0));
        let mut archive = ModArchive::new(name, desc.version.clone());
        archive.set_descriptor(&desc).unwrap();
        archive
            .save(&dir.join(format!("{}.tmod", name)))
            .unwrap();
    }

    #[test]
    fn test_directory_registry() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "CoreLib");
        install(dir.path(), "Helpers");
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let registry = DirectoryRegistry::new(dir.path());
        let found = registry.find("CoreLib").unwrap().unwrap();
        assert_eq!(found.descriptor.version, Version::new(1, 2, 0));
        assert!(registry.find("Absent").unwrap().is_none());

        let names: Vec<_> = registry
            .installed()
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["CoreLib", "Helpers"]);
    }

    #[test]
    fn test_unreadable_archive_is_skipped() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "CoreLib");
        std::fs::write(dir.path().join("Broken.tmod"), b"not a zip").unwrap();

        let registry = DirectoryRegistry::new(dir.path());
        let installed = registry.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].name(), "CoreLib");
        assert!(registry.find("Broken").is_err());
    }

    #[test]
    fn test_missing_mods_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(dir.path().join("Mods"));
        assert!(registry.installed().unwrap().is_empty());
    }

    #[test]
    fn test_enabled_list() {
        let dir = TempDir::new().unwrap();
        let list = EnabledList::new(dir.path());

        list.activate("ExampleMod").unwrap();
        list.activate("CoreLib").unwrap();
        assert_eq!(list.read().unwrap().len(), 2);

        list.unload("ExampleMod").unwrap();
        assert!(!list.read().unwrap().contains("ExampleMod"));
        assert!(list.read().unwrap().contains("CoreLib"));
    }
}
