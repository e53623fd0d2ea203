//! Packaging resources into a mod archive
use crate::building::BuildingMod;
use crate::error::{BuildError, BuildResult};
use crate::status::BuildStatus;
use modsmith_package::ModArchive;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Converts a resource into an engine-native form
pub trait ResourceConverter: Send + Sync {
    /// Return the converted entry path and bytes, or `None` to keep the file
    /// as it is.
    fn convert(&self, rel_path: &str, bytes: &[u8]) -> BuildResult<Option<(String, Vec<u8>)>>;
}

/// Converters keyed by lowercase file extension
#[derive(Default, Clone)]
pub struct ConverterRegistry {
    by_extension: HashMap<String, Arc<dyn ResourceConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: &str, converter: Arc<dyn ResourceConverter>) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), converter);
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }

    /// Offer a file to the converter for its extension; raw bytes otherwise
    pub fn convert(&self, rel_path: &str, bytes: Vec<u8>) -> BuildResult<(String, Vec<u8>)> {
        let extension = Path::new(rel_path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        if let Some(converter) = extension.and_then(|e| self.by_extension.get(&e)) {
            if let Some(converted) = converter.convert(rel_path, &bytes)? {
                return Ok(converted);
            }
        }
        Ok((rel_path.to_string(), bytes))
    }
}

pub struct Packager<'a> {
    converters: &'a ConverterRegistry,
    status: &'a dyn BuildStatus,
}

impl<'a> Packager<'a> {
    pub fn new(converters: &'a ConverterRegistry, status: &'a dyn BuildStatus) -> Self {
        Self { converters, status }
    }

    /// Fold the descriptor, every packaged resource and externally supplied
    /// libraries into `archive`. Nothing is written to disk.
    pub fn package(
        &self,
        building: &BuildingMod,
        archive: &mut ModArchive,
        debug_binary: Option<&Path>,
    ) -> BuildResult<()> {
        self.status
            .set_status(&format!("Packaging: {}", building.name()));
        self.status.set_progress(0, Some(1));

        archive.set_descriptor(&building.descriptor)?;

        let resources: Vec<_> = building
            .files()?
            .into_iter()
            .filter(|(_, rel)| !building.ignore_resource(rel))
            .collect();
        let total = resources.len();
        self.status.set_progress(0, Some(total));

        let packed = AtomicUsize::new(0);
        let converted = resources
            .par_iter()
            .map(|(path, rel)| -> BuildResult<(String, Vec<u8>)> {
                let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
                let entry = self.converters.convert(rel, bytes)?;
                let done = packed.fetch_add(1, Ordering::SeqCst) + 1;
                self.status.set_progress(done, Some(total));
                Ok(entry)
            })
            .collect::<BuildResult<Vec<_>>>()?;

        for (rel, bytes) in converted {
            if archive.get(&rel).is_some() {
                warn!(mod_name = %building.name(), entry = %rel, "resource replaces a packaged binary");
            }
            archive.add_file(rel, bytes)?;
        }

        let lib_dir = building.lib_dir();
        for library in &building.descriptor.dll_references {
            let path = building.library_path(library, None, debug_binary)?;
            if path.starts_with(&lib_dir) {
                continue;
            }
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!(library = %library, path = %path.display(), "packaging external library");
            let bytes = fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
            archive.add_file(format!("lib/{}", file), bytes)?;
        }

        info!(mod_name = %building.name(), resources = total, entries = archive.len(), "packaged");
        Ok(())
    }
}
