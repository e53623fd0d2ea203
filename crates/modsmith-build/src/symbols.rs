//! Debug symbol reconciliation
//!
//! Rewriting a binary to regenerate its symbols renumbers sequence points, so
//! compiler output and regenerated symbols never match byte for byte. The
//! rewritten copy is therefore the source of truth: when the pipeline compiled
//! the binary itself, the rewritten bytes replace it in the archive. An
//! author-supplied binary is kept as is and only the rewritten debug header is
//! packaged beside it, for the loader to patch in.

use crate::error::{BuildError, BuildResult};
use crate::inspect::{AssemblyResolver, MetadataInspector, SymbolFormat};
use modsmith_package::{ModArchive, Variant};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything packaged for one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub variant: Variant,
    /// Entry name of the main binary, e.g. `ExampleMod.XNA.dll`
    pub binary_name: String,
    pub binary: Vec<u8>,
    /// Primary format symbols
    pub symbols: Option<Vec<u8>>,
    /// Secondary format symbols
    pub secondary_symbols: Option<Vec<u8>>,
    pub debug_header: Option<Vec<u8>>,
}

impl BuildArtifact {
    pub fn new(variant: Variant, binary_name: impl Into<String>, binary: Vec<u8>) -> Self {
        Self {
            variant,
            binary_name: binary_name.into(),
            binary,
            symbols: None,
            secondary_symbols: None,
            debug_header: None,
        }
    }

    /// `ExampleMod.XNA.pdb`
    pub fn symbols_name(&self) -> String {
        Path::new(&self.binary_name)
            .with_extension("pdb")
            .to_string_lossy()
            .into_owned()
    }

    /// `ExampleMod.XNA.dll.debugheader`
    pub fn debug_header_name(&self) -> String {
        format!("{}.debugheader", self.binary_name)
    }

    /// `ExampleMod.FNA.dll.mdb`
    pub fn secondary_symbols_name(&self) -> String {
        format!("{}.mdb", self.binary_name)
    }

    /// Add the binary and its companions to an archive
    pub fn add_to(&self, archive: &mut ModArchive) -> BuildResult<()> {
        archive.add_file(&self.binary_name, self.binary.clone())?;
        if let Some(symbols) = &self.symbols {
            archive.add_file(self.symbols_name(), symbols.clone())?;
        }
        if let Some(header) = &self.debug_header {
            archive.add_file(self.debug_header_name(), header.clone())?;
        }
        if let Some(secondary) = &self.secondary_symbols {
            archive.add_file(self.secondary_symbols_name(), secondary.clone())?;
        }
        Ok(())
    }
}

pub struct SymbolReconciler<'a> {
    inspector: &'a dyn MetadataInspector,
    primary: SymbolFormat,
}

impl<'a> SymbolReconciler<'a> {
    pub fn new(inspector: &'a dyn MetadataInspector, primary: SymbolFormat) -> Self {
        Self { inspector, primary }
    }

    /// Regenerate symbols for `binary` and record them on `artifact`.
    ///
    /// The rewrite always lands at `temp_dir/<binary_name>`, so a precompiled
    /// input is never overwritten.
    pub fn reconcile(
        &self,
        binary: &Path,
        temp_dir: &Path,
        resolver: &dyn AssemblyResolver,
        artifact: &mut BuildArtifact,
    ) -> BuildResult<()> {
        let rewrite_path = temp_dir.join(&artifact.binary_name);
        let written = self
            .inspector
            .write_with_symbols(binary, &rewrite_path, self.primary, resolver)?;
        artifact.symbols = Some(read(&written.symbols)?);

        if same_file(binary, &written.binary) {
            debug!(binary = %artifact.binary_name, "packaging rewritten binary");
            artifact.binary = read(&written.binary)?;
        } else {
            debug!(binary = %artifact.binary_name, "packaging debug header for precompiled binary");
            artifact.debug_header = Some(self.inspector.debug_header(&written.binary)?);
        }

        if artifact.variant.wants_secondary_symbols() {
            let secondary =
                self.inspector
                    .write_with_symbols(binary, &rewrite_path, SymbolFormat::Mdb, resolver)?;
            artifact.secondary_symbols = Some(read(&secondary.symbols)?);
        }

        Ok(())
    }
}

fn read(path: &Path) -> BuildResult<Vec<u8>> {
    fs::read(path).map_err(|e| BuildError::io(path, e))
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (canonical(a), canonical(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_companion_names() {
        let artifact = BuildArtifact::new(Variant::Fna, "ExampleMod.FNA.dll", vec![1]);
        assert_eq!(artifact.symbols_name(), "ExampleMod.FNA.pdb");
        assert_eq!(artifact.debug_header_name(), "ExampleMod.FNA.dll.debugheader");
        assert_eq!(artifact.secondary_symbols_name(), "ExampleMod.FNA.dll.mdb");
    }

    #[test]
    fn test_add_to_archive() {
        let mut artifact = BuildArtifact::new(Variant::Xna, "ExampleMod.XNA.dll", vec![1, 2]);
        artifact.symbols = Some(vec![3]);
        artifact.debug_header = Some(vec![4]);

        let mut archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        artifact.add_to(&mut archive).unwrap();

        assert_eq!(archive.get("ExampleMod.XNA.dll"), Some(&[1u8, 2][..]));
        assert_eq!(archive.get("ExampleMod.XNA.pdb"), Some(&[3u8][..]));
        assert_eq!(archive.get("ExampleMod.XNA.dll.debugheader"), Some(&[4u8][..]));
        assert!(!archive.contains("ExampleMod.XNA.dll.mdb"));
    }
}
