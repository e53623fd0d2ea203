//! Reference tables: every library a mod compiles against
//!
//! A [`ReferenceTable`] maps file names (`Foo.dll`) to [`LazyPath`]s. Host
//! libraries and plain files on disk are ready immediately; binaries of
//! referenced mods and libraries embedded in a host binary are extracted on
//! first use. Compiling materializes the whole table, while symbol rewriting
//! only touches the few entries the inspector asks for.

use crate::building::BuildingMod;
use crate::error::{BuildError, BuildResult};
use crate::host::{HostLayout, ENGINE_LIBRARIES, HOST_REFERENCE};
use crate::inspect::{AssemblyResolver, MetadataInspector};
use crate::memo::LazyPath;
use crate::reference_folder;
use modsmith_package::{ModArchive, Variant};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use walkdir::WalkDir;

/// Library file name to lazily produced location
#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    entries: BTreeMap<String, Arc<LazyPath>>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an existing file under its file name, replacing any entry
    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let name = file_name(&path);
        self.entries
            .insert(name.clone(), Arc::new(LazyPath::ready(name, path)));
    }

    /// Add an entry produced on first use, replacing any entry
    pub fn add_lazy<F>(&mut self, name: impl Into<String>, supplier: F)
    where
        F: FnOnce() -> BuildResult<PathBuf> + Send + 'static,
    {
        let name = name.into();
        self.entries
            .insert(name.clone(), Arc::new(LazyPath::deferred(name, supplier)));
    }

    /// Merge another table; its entries win
    pub fn extend(&mut self, other: ReferenceTable) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, name: &str) -> Option<Arc<LazyPath>> {
        self.entries.get(name).cloned()
    }

    /// Resolve one entry, producing it if needed
    pub fn resolve(&self, name: &str) -> BuildResult<Option<PathBuf>> {
        self.entries.get(name).map(|lazy| lazy.get()).transpose()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<LazyPath>> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce every entry, extracting in parallel. Paths follow name order.
    pub fn materialize_all(&self) -> BuildResult<Vec<PathBuf>> {
        self.entries
            .values()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|lazy| lazy.get())
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Builds reference tables for mods and for the shared references folder
pub struct ReferenceResolver<'a> {
    layout: &'a HostLayout,
    inspector: Arc<dyn MetadataInspector>,
    debug_binary: Option<&'a Path>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(layout: &'a HostLayout, inspector: Arc<dyn MetadataInspector>) -> Self {
        Self {
            layout,
            inspector,
            debug_binary: None,
        }
    }

    /// Also look beside this binary for declared libraries
    pub fn with_debug_binary(mut self, debug_binary: Option<&'a Path>) -> Self {
        self.debug_binary = debug_binary;
        self
    }

    pub fn layout(&self) -> &HostLayout {
        self.layout
    }

    /// Everything `building` compiles against for `variant`. Entries that need
    /// extracting are written to `temp_dir`.
    pub fn table_for(
        &self,
        building: &BuildingMod,
        variant: Variant,
        temp_dir: &Path,
    ) -> BuildResult<ReferenceTable> {
        let mut table = self.host_references(variant, temp_dir)?;

        for path in self.framework_references()? {
            table.add_path(path);
        }

        for library in &building.descriptor.dll_references {
            table.add_path(building.library_path(library, Some(variant), self.debug_binary)?);
        }

        for ref_mod in &building.ref_mods {
            let main = format!("{}.dll", ref_mod.name());
            let archive_path = ref_mod.archive_path.clone();
            let dest = temp_dir.join(&main);
            table.add_lazy(main, move || {
                let archive = ModArchive::open(&archive_path)?;
                write_entry(&dest, archive.main_binary(variant)?)
            });

            for library in &ref_mod.descriptor.dll_references {
                let name = format!("{}.dll", library);
                let archive_path = ref_mod.archive_path.clone();
                let dest = temp_dir.join(&name);
                let library = library.clone();
                table.add_lazy(name, move || {
                    let archive = ModArchive::open(&archive_path)?;
                    write_entry(&dest, archive.library(&library, variant)?)
                });
            }
        }

        debug!(
            mod_name = %building.name(),
            variant = %variant,
            references = table.len(),
            "reference table ready"
        );
        Ok(table)
    }

    /// The host API surface for a variant.
    ///
    /// For the running variant: the host binary, engine libraries beside it
    /// and its embedded libraries, which are materialized in the shared
    /// references folder. For the other variant: the `ModCompile` host binary
    /// and engine libraries, with embedded libraries extracted to `temp_dir`.
    pub fn host_references(&self, variant: Variant, temp_dir: &Path) -> BuildResult<ReferenceTable> {
        let mut table = ReferenceTable::new();

        let (host, lib_dir, extract_dir) = if variant == self.layout.active_variant {
            (
                self.layout.host_binary_path(),
                self.layout.install_dir.clone(),
                self.layout.references_dir.clone(),
            )
        } else {
            (
                self.layout.variant_host_binary(variant),
                self.layout.mod_compile_dir(),
                temp_dir.to_path_buf(),
            )
        };

        table
            .entries
            .insert(HOST_REFERENCE.to_string(), Arc::new(LazyPath::ready(HOST_REFERENCE, &host)));

        for library in ENGINE_LIBRARIES {
            let path = lib_dir.join(library);
            if path.is_file() {
                table.add_path(path);
            }
        }

        if variant == self.layout.active_variant && self.references_current() {
            for path in dlls_in(&self.layout.references_dir)? {
                table.add_path(path);
            }
            return Ok(table);
        }

        for name in self.inspector.embedded_libraries(&host)? {
            let file = file_name(Path::new(&name));
            let inspector = Arc::clone(&self.inspector);
            let host = host.clone();
            let dest = extract_dir.join(&file);
            table.add_lazy(file, move || {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
                }
                inspector.extract_embedded(&host, &name, &dest)?;
                Ok(dest)
            });
        }

        Ok(table)
    }

    fn references_current(&self) -> bool {
        self.layout
            .touch_stamp()
            .map(|stamp| reference_folder::is_current(&self.layout.references_dir, &stamp))
            .unwrap_or(false)
    }

    /// Platform framework assemblies, skipping interop thunks and wrappers
    pub fn framework_references(&self) -> BuildResult<Vec<PathBuf>> {
        let Some(dir) = &self.layout.framework_references else {
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::io(dir, e.into()))?;
            let name = entry.file_name().to_string_lossy();
            let wanted = name.ends_with(".dll")
                && !name.ends_with("Thunk.dll")
                && !name.ends_with("Wrapper.dll");
            if wanted && entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }
}

fn write_entry(dest: &Path, bytes: &[u8]) -> BuildResult<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(dest, bytes).map_err(|e| BuildError::io(dest, e))?;
    Ok(dest.to_path_buf())
}

fn dlls_in(dir: &Path) -> BuildResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))? {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("dll") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Assembly resolution during symbol rewriting.
///
/// Files in the directory of the binary being rewritten win over the
/// reference table, so IDE or no-compile builds see the libraries they were
/// built against.
pub struct BuildDirResolver<'a> {
    build_dir: PathBuf,
    references: &'a ReferenceTable,
    cache: Mutex<HashMap<String, PathBuf>>,
}

impl<'a> BuildDirResolver<'a> {
    pub fn new(build_dir: impl Into<PathBuf>, references: &'a ReferenceTable) -> Self {
        Self {
            build_dir: build_dir.into(),
            references,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn find_in_build_dir(&self, name: &str) -> Option<PathBuf> {
        ["dll", "exe"]
            .iter()
            .map(|ext| self.build_dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }
}

impl AssemblyResolver for BuildDirResolver<'_> {
    fn resolve(&self, name: &str) -> BuildResult<Option<PathBuf>> {
        if let Some(path) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Some(path.clone()));
        }

        let found = match self.find_in_build_dir(name) {
            Some(path) => Some(path),
            None => match self.references.resolve(&format!("{}.dll", name))? {
                Some(path) => Some(path),
                None => self.references.resolve(&format!("{}.exe", name))?,
            },
        };

        if let Some(path) = &found {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), path.clone());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_add_path_uses_file_name() {
        let mut table = ReferenceTable::new();
        table.add_path("/refs/Newtonsoft.Json.dll");
        assert!(table.contains("Newtonsoft.Json.dll"));
        assert_eq!(
            table.resolve("Newtonsoft.Json.dll").unwrap(),
            Some(PathBuf::from("/refs/Newtonsoft.Json.dll"))
        );
        assert_eq!(table.resolve("Other.dll").unwrap(), None);
    }

    #[test]
    fn test_later_entries_replace_earlier() {
        let mut table = ReferenceTable::new();
        table.add_path("/host/Shared.dll");
        table.add_path("/mod/lib/Shared.dll");
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.resolve("Shared.dll").unwrap(),
            Some(PathBuf::from("/mod/lib/Shared.dll"))
        );
    }

    #[test]
    fn test_materialize_all_runs_each_supplier_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut table = ReferenceTable::new();
        for i in 0..4 {
            let calls = Arc::clone(&calls);
            table.add_lazy(format!("Lib{}.dll", i), move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(PathBuf::from(format!("/tmp/Lib{}.dll", i)))
            });
        }

        let first = table.materialize_all().unwrap();
        let second = table.materialize_all().unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], PathBuf::from("/tmp/Lib0.dll"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_build_dir_shadows_table() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Shared.dll"), b"local").unwrap();

        let mut table = ReferenceTable::new();
        table.add_path("/refs/Shared.dll");
        table.add_path("/refs/Other.dll");
        table.add_path("/host/Terraria.exe");

        let resolver = BuildDirResolver::new(dir.path(), &table);
        assert_eq!(
            resolver.resolve("Shared").unwrap(),
            Some(dir.path().join("Shared.dll"))
        );
        assert_eq!(
            resolver.resolve("Other").unwrap(),
            Some(PathBuf::from("/refs/Other.dll"))
        );
        assert_eq!(
            resolver.resolve("Terraria").unwrap(),
            Some(PathBuf::from("/host/Terraria.exe"))
        );
        assert_eq!(resolver.resolve("Unknown").unwrap(), None);
    }
}
