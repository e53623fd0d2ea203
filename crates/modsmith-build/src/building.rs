//! Mods being built from a source folder
use crate::error::{BuildError, BuildResult};
use crate::registry::InstalledMod;
use modsmith_package::{IgnoreSet, ModDescriptor, Variant, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions of compiler source files, packaged only on request
pub const SOURCE_EXTENSIONS: [&str; 3] = ["cs", "csproj", "sln"];

/// A mod descriptor plus its source tree, created per build invocation
#[derive(Debug, Clone)]
pub struct BuildingMod {
    pub descriptor: ModDescriptor,
    /// Source folder
    pub path: PathBuf,
    /// Installed mods this one compiles against, filled in before compiling
    pub ref_mods: Vec<InstalledMod>,
    ignore: IgnoreSet,
}

impl BuildingMod {
    pub fn new(descriptor: ModDescriptor, path: impl Into<PathBuf>) -> BuildResult<Self> {
        let ignore = descriptor.ignore_set()?;
        Ok(Self {
            descriptor,
            path: path.into(),
            ref_mods: Vec::new(),
            ignore,
        })
    }

    /// Read the manifest of a mod source folder
    pub fn read(folder: &Path) -> BuildResult<Self> {
        let descriptor = ModDescriptor::read_from_folder(folder)
            .map_err(|e| BuildError::manifest_read(folder.join(MANIFEST_FILE), e))?;
        Self::new(descriptor, folder)
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Excluded from both compilation and packaging
    pub fn ignore_completely(&self, rel_path: &str) -> bool {
        self.ignore.matches(rel_path)
            || rel_path.starts_with('.')
            || rel_path.starts_with("bin/")
            || rel_path.starts_with("obj/")
    }

    /// Excluded from packaging
    pub fn ignore_resource(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.ignore_completely(rel_path)
            || rel_path == MANIFEST_FILE
            || (!self.descriptor.include_source && is_source_file(rel_path))
            || file_name == "Thumbs.db"
    }

    /// Every file under the source folder as `(absolute, relative)` pairs,
    /// relative paths `/`-separated and sorted
    pub fn files(&self) -> BuildResult<Vec<(PathBuf, String)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.path).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.path).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.path)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((entry.into_path(), rel));
        }
        Ok(files)
    }

    /// `.cs` files handed to the compiler
    pub fn source_files(&self) -> BuildResult<Vec<PathBuf>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|(_, rel)| rel.ends_with(".cs") && !self.ignore_completely(rel))
            .map(|(path, _)| path)
            .collect())
    }

    /// Locate a declared external library.
    ///
    /// Looks for `lib/<name>.<Variant>.dll` (when a variant is given), then
    /// `lib/<name>.dll`, then `<name>.dll` beside the debug binary override.
    pub fn library_path(
        &self,
        library: &str,
        variant: Option<Variant>,
        debug_binary: Option<&Path>,
    ) -> BuildResult<PathBuf> {
        let lib_dir = self.lib_dir();

        if let Some(variant) = variant {
            let specific = lib_dir.join(variant.library_name(library));
            if specific.is_file() {
                return Ok(specific);
            }
        }

        let neutral = lib_dir.join(format!("{}.dll", library));
        if neutral.is_file() {
            return Ok(neutral);
        }

        if let Some(dir) = debug_binary.and_then(Path::parent) {
            let copied = dir.join(format!("{}.dll", library));
            if copied.is_file() {
                return Ok(copied);
            }
        }

        Err(BuildError::reference_missing(library, self.name()))
    }

    /// Mod-local library folder
    pub fn lib_dir(&self) -> PathBuf {
        self.path.join("lib")
    }
}

fn is_source_file(rel_path: &str) -> bool {
    Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
