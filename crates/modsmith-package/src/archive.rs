//! Packaged mod archives
//!
//! A mod archive is an ordered set of uniquely named byte entries plus one
//! reserved `Info` entry holding the serialized [`ModDescriptor`]. On disk it
//! is a zip container: `Info` is written first, the remaining entries follow
//! sorted by path, and the zip comment carries a SHA-256 digest over every
//! entry so corrupt or hand-edited archives are rejected on read.

use crate::descriptor::ModDescriptor;
use crate::variant::{all_platforms_binary_name, Variant};
use crate::PackageError;
use semver::Version;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Reserved entry holding the serialized descriptor
pub const INFO_ENTRY: &str = "Info";

/// File extension of packaged mods
pub const ARCHIVE_EXTENSION: &str = "tmod";

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_ENTRY_PREALLOC: usize = 16 * 1024 * 1024;

/// A single named entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// In-memory mod archive
#[derive(Debug, Clone)]
pub struct ModArchive {
    name: String,
    version: Version,
    info: Option<Vec<u8>>,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl ModArchive {
    /// Create an empty archive for a mod
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            info: None,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Add or replace an entry.
    ///
    /// Paths are normalised to `/` separators and must be relative without
    /// `.` or `..` segments. The `Info` entry can only be set through
    /// [`ModArchive::set_descriptor`].
    pub fn add_file(&mut self, path: impl AsRef<str>, bytes: Vec<u8>) -> crate::Result<()> {
        let path = normalize_entry_path(path.as_ref())?;
        if path == INFO_ENTRY {
            return Err(PackageError::ReservedEntry(path));
        }

        match self.index.get(&path) {
            Some(&i) => self.entries[i].bytes = bytes,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push(ArchiveEntry { path, bytes });
            }
        }
        Ok(())
    }

    /// Store the descriptor as the archive's metadata entry
    pub fn set_descriptor(&mut self, descriptor: &ModDescriptor) -> crate::Result<()> {
        self.name = descriptor.name.clone();
        self.version = descriptor.version.clone();
        self.info = Some(descriptor.to_bytes()?);
        Ok(())
    }

    /// Parse the metadata entry
    pub fn descriptor(&self) -> crate::Result<ModDescriptor> {
        let info = self
            .info
            .as_deref()
            .ok_or_else(|| PackageError::MissingEntry(INFO_ENTRY.to_string()))?;
        ModDescriptor::from_bytes(info)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index
            .get(path)
            .map(|&i| self.entries[i].bytes.as_slice())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Entries in insertion order, excluding `Info`
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Number of entries including `Info` when present
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.info.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Main binary for a variant; a variant-neutral `<name>.All.dll` wins
    pub fn main_binary(&self, variant: Variant) -> crate::Result<&[u8]> {
        let all = all_platforms_binary_name(&self.name);
        let specific = variant.binary_name(&self.name);
        self.get(&all)
            .or_else(|| self.get(&specific))
            .ok_or(PackageError::MissingEntry(specific))
    }

    /// Library bytes for a variant; `lib/<name>.<Variant>.dll` wins over
    /// `lib/<name>.dll`
    pub fn library(&self, library: &str, variant: Variant) -> crate::Result<&[u8]> {
        let specific = format!("lib/{}", variant.library_name(library));
        let neutral = format!("lib/{}.dll", library);
        self.get(&specific)
            .or_else(|| self.get(&neutral))
            .ok_or(PackageError::MissingEntry(neutral))
    }

    /// Entries in on-disk order: everything but `Info`, sorted by path
    fn sorted_entries(&self) -> Vec<&ArchiveEntry> {
        let mut sorted: Vec<&ArchiveEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        sorted
    }

    /// SHA-256 over `Info` and every entry, in on-disk order
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(info) = &self.info {
            hash_entry(&mut hasher, INFO_ENTRY, info);
        }
        for entry in self.sorted_entries() {
            hash_entry(&mut hasher, &entry.path, &entry.bytes);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Write the archive to `path`.
    ///
    /// The zip is written to a sibling temporary file and renamed into place,
    /// so an interrupted save never leaves a truncated archive behind.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let info = self
            .info
            .as_deref()
            .ok_or_else(|| PackageError::MissingEntry(INFO_ENTRY.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_path_for(path);
        let result = self.write_zip(&tmp_path, info);
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn write_zip(&self, path: &Path, info: &[u8]) -> crate::Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        zip.set_comment(self.hash());

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        zip.start_file(INFO_ENTRY, options)?;
        zip.write_all(info)?;

        for entry in self.sorted_entries() {
            zip.start_file(entry.path.as_str(), options)?;
            zip.write_all(&entry.bytes)?;
        }

        zip.finish()?;
        Ok(())
    }

    /// Read and verify an archive from disk
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, path)
    }

    /// Read and verify an archive from any seekable reader; `path` is only
    /// used in error messages.
    pub fn from_reader<R: Read + Seek>(reader: R, path: &Path) -> crate::Result<Self> {
        let invalid = |reason: String| PackageError::InvalidArchive {
            path: path.to_path_buf(),
            reason,
        };

        let mut zip = ZipArchive::new(reader)?;
        let expected = String::from_utf8(zip.comment().to_vec())
            .map_err(|_| invalid("archive hash is not valid UTF-8".to_string()))?;

        let mut info = None;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let declared = file.size();
            let bytes = read_entry(&mut file, declared)?;

            if name == INFO_ENTRY {
                if info.is_some() {
                    return Err(invalid("duplicate Info entry".to_string()));
                }
                info = Some(bytes);
            } else {
                entries.push((name, bytes));
            }
        }

        let info = info.ok_or_else(|| invalid("missing Info entry".to_string()))?;
        let descriptor = ModDescriptor::from_bytes(&info)?;

        let mut archive = ModArchive::new(descriptor.name.clone(), descriptor.version.clone());
        archive.info = Some(info);
        for (name, bytes) in entries {
            if archive.contains(&name) {
                return Err(invalid(format!("duplicate entry '{}'", name)));
            }
            archive.add_file(&name, bytes)?;
        }

        let found = archive.hash();
        if found != expected {
            return Err(PackageError::HashMismatch {
                path: path.to_path_buf(),
                expected,
                found,
            });
        }

        Ok(archive)
    }
}

/// Read an entry without trusting its declared size for allocation
fn read_entry(reader: &mut impl Read, declared: u64) -> std::io::Result<Vec<u8>> {
    let hint = usize::try_from(declared).map_or(MAX_ENTRY_PREALLOC, |n| n.min(MAX_ENTRY_PREALLOC));
    let mut bytes = Vec::with_capacity(hint);
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn hash_entry(hasher: &mut Sha256, path: &str, bytes: &[u8]) {
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Normalise an entry path to `/` separators and reject anything that could
/// escape an extraction directory.
pub fn normalize_entry_path(path: &str) -> crate::Result<String> {
    let normalized = path.replace('\\', "/");
    let valid = !normalized.is_empty()
        && !normalized.starts_with('/')
        && normalized
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid {
        Ok(normalized)
    } else {
        Err(PackageError::InvalidEntryPath(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn descriptor() -> ModDescriptor {
        ModDescriptor::new("ExampleMod", Version::new(1, 0, 0))
    }

    #[test]
    fn test_entry_read_ignores_inflated_declared_size() {
        let mut reader = &b"tiny entry"[..];
        let bytes = read_entry(&mut reader, u64::MAX).unwrap();
        assert_eq!(bytes, b"tiny entry");
        assert!(bytes.capacity() <= MAX_ENTRY_PREALLOC);
    }

    #[test]
    fn test_add_file_replaces_existing_entry() {
        let mut archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        archive.add_file("a.txt", b"one".to_vec()).unwrap();
        archive.add_file("a.txt", b"two".to_vec()).unwrap();

        assert_eq!(archive.entries().len(), 1);
        assert_eq!(archive.get("a.txt"), Some(&b"two"[..]));
    }

    #[test]
    fn test_info_entry_is_reserved() {
        let mut archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        assert!(matches!(
            archive.add_file(INFO_ENTRY, Vec::new()),
            Err(PackageError::ReservedEntry(_))
        ));
    }

    #[rstest]
    #[case("")]
    #[case("/abs.txt")]
    #[case("../escape.txt")]
    #[case("a/./b.txt")]
    #[case("a//b.txt")]
    fn test_invalid_entry_paths(#[case] path: &str) {
        assert!(normalize_entry_path(path).is_err());
    }

    #[test]
    fn test_backslashes_are_normalised() {
        assert_eq!(
            normalize_entry_path("Items\\Sword.png").unwrap(),
            "Items/Sword.png"
        );
    }

    #[test]
    fn test_main_binary_prefers_all_platforms() {
        let mut archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        archive
            .add_file("ExampleMod.XNA.dll", b"xna".to_vec())
            .unwrap();
        assert_eq!(archive.main_binary(Variant::Xna).unwrap(), b"xna");
        assert!(archive.main_binary(Variant::Fna).is_err());

        archive
            .add_file("ExampleMod.All.dll", b"all".to_vec())
            .unwrap();
        assert_eq!(archive.main_binary(Variant::Xna).unwrap(), b"all");
        assert_eq!(archive.main_binary(Variant::Fna).unwrap(), b"all");
    }

    #[test]
    fn test_library_prefers_variant_specific() {
        let mut archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        archive.add_file("lib/Json.dll", b"neutral".to_vec()).unwrap();
        archive
            .add_file("lib/Json.FNA.dll", b"fna".to_vec())
            .unwrap();

        assert_eq!(archive.library("Json", Variant::Xna).unwrap(), b"neutral");
        assert_eq!(archive.library("Json", Variant::Fna).unwrap(), b"fna");
        assert!(archive.library("Missing", Variant::Xna).is_err());
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let mut a = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        a.set_descriptor(&descriptor()).unwrap();
        a.add_file("b.txt", b"b".to_vec()).unwrap();
        a.add_file("a.txt", b"a".to_vec()).unwrap();

        let mut b = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        b.set_descriptor(&descriptor()).unwrap();
        b.add_file("a.txt", b"a".to_vec()).unwrap();
        b.add_file("b.txt", b"b".to_vec()).unwrap();

        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_save_requires_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ModArchive::new("ExampleMod", Version::new(1, 0, 0));
        let result = archive.save(&dir.path().join("ExampleMod.tmod"));
        assert!(matches!(result, Err(PackageError::MissingEntry(_))));
        assert!(!dir.path().join("ExampleMod.tmod").exists());
    }
}
