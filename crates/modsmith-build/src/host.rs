//! Host installation layout and environment readiness
use crate::error::{BuildError, BuildResult};
use crate::inspect::SymbolFormat;
use modsmith_config::Config;
use modsmith_package::{parse_version, Variant, ARCHIVE_EXTENSION};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Key under which the host API binary appears in reference tables
pub const HOST_REFERENCE: &str = "Terraria.exe";

/// Engine libraries the host ships for either backend
pub const ENGINE_LIBRARIES: [&str; 5] = [
    "Microsoft.Xna.Framework.dll",
    "Microsoft.Xna.Framework.Game.dll",
    "Microsoft.Xna.Framework.Graphics.dll",
    "Microsoft.Xna.Framework.Xact.dll",
    "FNA.dll",
];

/// Where the host, its compile support files and the user's mods live
#[derive(Debug, Clone)]
pub struct HostLayout {
    pub install_dir: PathBuf,
    /// File name of the running host binary inside `install_dir`
    pub host_binary: String,
    /// Backend the running host uses
    pub active_variant: Variant,
    pub host_version: Option<Version>,
    pub mods_dir: PathBuf,
    pub mod_sources_dir: PathBuf,
    pub references_dir: PathBuf,
    pub framework_references: Option<PathBuf>,
    /// Primary debug symbol format
    pub symbol_format: SymbolFormat,
}

impl HostLayout {
    /// Layout rooted at `save_dir` with defaults for everything else
    pub fn new(install_dir: impl Into<PathBuf>, save_dir: &Path) -> Self {
        let mod_sources_dir = save_dir.join("ModSources");
        Self {
            install_dir: install_dir.into(),
            host_binary: "tModLoader.exe".to_string(),
            active_variant: Variant::Xna,
            host_version: None,
            mods_dir: save_dir.join("Mods"),
            references_dir: mod_sources_dir.join("references"),
            mod_sources_dir,
            framework_references: None,
            symbol_format: SymbolFormat::PortablePdb,
        }
    }

    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let install_dir = config
            .install_dir()
            .map_err(|e| BuildError::EnvironmentNotReady(e.to_string()))?;

        let active_variant = config
            .host_variant()
            .parse::<Variant>()
            .map_err(BuildError::EnvironmentNotReady)?;
        let symbol_format = config
            .symbol_format()
            .parse::<SymbolFormat>()
            .map_err(BuildError::EnvironmentNotReady)?;
        let host_version = config.host_version().map(parse_version).transpose()?;

        Ok(Self {
            install_dir: install_dir.to_path_buf(),
            host_binary: config.host_binary().to_string(),
            active_variant,
            host_version,
            mods_dir: config.mods_dir(),
            mod_sources_dir: config.mod_sources_dir(),
            references_dir: config.references_dir(),
            framework_references: config.framework_references(),
            symbol_format,
        })
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.active_variant = variant;
        self
    }

    pub fn with_host_version(mut self, version: Version) -> Self {
        self.host_version = Some(version);
        self
    }

    pub fn with_framework_references(mut self, dir: impl Into<PathBuf>) -> Self {
        self.framework_references = Some(dir.into());
        self
    }

    pub fn with_symbol_format(mut self, format: SymbolFormat) -> Self {
        self.symbol_format = format;
        self
    }

    /// The running host binary
    pub fn host_binary_path(&self) -> PathBuf {
        self.install_dir.join(&self.host_binary)
    }

    /// Compile support folder shipped beside the host
    pub fn mod_compile_dir(&self) -> PathBuf {
        self.install_dir.join("ModCompile")
    }

    /// Host binary built for a variant, as shipped in `ModCompile`
    pub fn variant_host_binary(&self, variant: Variant) -> PathBuf {
        self.mod_compile_dir()
            .join(format!("tModLoader.{}.exe", variant.tag()))
    }

    /// Scratch directory used while compiling one variant
    pub fn temp_dir(&self) -> PathBuf {
        self.mods_dir.join("compile_temp")
    }

    /// Destination of a packaged mod
    pub fn archive_path(&self, mod_name: &str) -> PathBuf {
        self.mods_dir
            .join(format!("{}.{}", mod_name, ARCHIVE_EXTENSION))
    }

    /// Stamp identifying the host binary build, `<path> @ <mtime>`
    pub fn touch_stamp(&self) -> BuildResult<String> {
        let path = self.host_binary_path();
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| BuildError::io(&path, e))?;
        let secs = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(format!("{} @ {}", path.display(), secs))
    }

    /// Non-hidden folders of the mod sources directory, sorted
    pub fn find_mod_sources(&self) -> BuildResult<Vec<PathBuf>> {
        let dir = &self.mod_sources_dir;
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

        let mut folders = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))? {
            let entry = entry.map_err(|e| BuildError::io(dir, e))?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.path().is_dir() && !hidden && entry.path() != self.references_dir {
                folders.push(entry.path());
            }
        }
        folders.sort();
        Ok(folders)
    }
}

/// Outcome of a readiness query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub message: String,
}

impl Readiness {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
        }
    }

    /// Convert to an error when not ready
    pub fn require(self) -> BuildResult<String> {
        if self.ready {
            Ok(self.message)
        } else {
            Err(BuildError::EnvironmentNotReady(self.message))
        }
    }
}

/// Whether the toolchain needed to compile mods is available
pub trait Environment: Send + Sync {
    fn check(&self) -> Readiness;
}

/// Ready when the compiler, the inspector and the framework references exist
#[derive(Debug, Clone)]
pub struct ToolchainEnvironment {
    compiler: Option<PathBuf>,
    inspector: Option<PathBuf>,
    framework_references: Option<PathBuf>,
}

impl ToolchainEnvironment {
    pub fn new(
        compiler: Option<PathBuf>,
        inspector: Option<PathBuf>,
        framework_references: Option<PathBuf>,
    ) -> Self {
        Self {
            compiler,
            inspector,
            framework_references,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.compiler().ok().map(Path::to_path_buf),
            config.inspector().ok().map(Path::to_path_buf),
            config.framework_references(),
        )
    }
}

impl Environment for ToolchainEnvironment {
    fn check(&self) -> Readiness {
        let checks = [
            ("compiler", &self.compiler, false),
            ("metadata inspector", &self.inspector, false),
            ("framework references", &self.framework_references, true),
        ];

        for (what, path, is_dir) in checks {
            match path {
                None => return Readiness::not_ready(format!("no {} configured", what)),
                Some(path) => {
                    let found = if is_dir { path.is_dir() } else { path.is_file() };
                    if !found {
                        return Readiness::not_ready(format!(
                            "{} not found at {}",
                            what,
                            path.display()
                        ));
                    }
                }
            }
        }

        Readiness::ready("toolchain ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = HostLayout::new("/games/host", Path::new("/data"));
        assert_eq!(layout.mods_dir, PathBuf::from("/data/Mods"));
        assert_eq!(layout.temp_dir(), PathBuf::from("/data/Mods/compile_temp"));
        assert_eq!(
            layout.archive_path("ExampleMod"),
            PathBuf::from("/data/Mods/ExampleMod.tmod")
        );
        assert_eq!(
            layout.variant_host_binary(Variant::Fna),
            PathBuf::from("/games/host/ModCompile/tModLoader.FNA.exe")
        );
        assert_eq!(
            layout.references_dir,
            PathBuf::from("/data/ModSources/references")
        );
    }

    #[test]
    fn test_find_mod_sources_skips_hidden_and_references() {
        let dir = TempDir::new().unwrap();
        let layout = HostLayout::new(dir.path(), dir.path());
        for name in ["Beta", "Alpha", ".hidden", "references"] {
            fs::create_dir_all(layout.mod_sources_dir.join(name)).unwrap();
        }
        fs::write(layout.mod_sources_dir.join("readme.txt"), "").unwrap();

        let found = layout.find_mod_sources().unwrap();
        assert_eq!(
            found,
            vec![
                layout.mod_sources_dir.join("Alpha"),
                layout.mod_sources_dir.join("Beta")
            ]
        );
    }

    #[test]
    fn test_toolchain_environment() {
        let dir = TempDir::new().unwrap();
        let compiler = dir.path().join("csc");
        let inspector = dir.path().join("inspect");
        fs::write(&compiler, "").unwrap();

        let env = ToolchainEnvironment::new(
            Some(compiler.clone()),
            Some(inspector.clone()),
            Some(dir.path().to_path_buf()),
        );
        let readiness = env.check();
        assert!(!readiness.ready);
        assert!(readiness.message.contains("metadata inspector"));
        assert!(env.check().require().is_err());

        fs::write(&inspector, "").unwrap();
        assert!(env.check().ready);
    }
}
