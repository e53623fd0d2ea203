//! Build orchestration and pipeline management
use crate::build_order::DependencyResolver;
use crate::building::BuildingMod;
use crate::compiler::{CompilerDriver, Diagnostic, ModCompiler};
use crate::error::{BuildError, BuildResult, ModContext};
use crate::host::HostLayout;
use crate::inspect::MetadataInspector;
use crate::packager::{ConverterRegistry, Packager, ResourceConverter};
use crate::reference_folder;
use crate::references::{BuildDirResolver, ReferenceResolver};
use crate::registry::{DirectoryRegistry, EnabledList, InstalledMod, ModLifecycle, ModRegistry};
use crate::status::{BuildStatus, NullStatus};
use crate::symbols::{BuildArtifact, SymbolReconciler};
use crate::verify::verify_module;

use modsmith_config::LaunchConfig;
use modsmith_package::{ModArchive, ModDescriptor, Variant};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one mod build
#[derive(Debug, Clone)]
pub struct ModReport {
    pub name: String,
    pub archive_path: PathBuf,
    /// Every compiler warning, across both variants
    pub warnings: Vec<Diagnostic>,
    pub build_time: Duration,
}

/// Outcome of a batch build
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Built mods in build order
    pub mods: Vec<ModReport>,
    pub total_time: Duration,
}

impl BuildReport {
    pub fn warning_count(&self) -> usize {
        self.mods.iter().map(|m| m.warnings.len()).sum()
    }
}

/// Name shown for a mod folder before its properties are read
fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Main builder for orchestrating mod builds
pub struct ModBuilder {
    layout: HostLayout,
    launch: LaunchConfig,
    compiler: Arc<dyn ModCompiler>,
    inspector: Arc<dyn MetadataInspector>,
    registry: Box<dyn ModRegistry>,
    lifecycle: Box<dyn ModLifecycle>,
    status: Arc<dyn BuildStatus>,
    converters: ConverterRegistry,
}

impl ModBuilder {
    /// Create a builder using the mods directory of `layout` as registry and
    /// enabled list
    pub fn new(
        layout: HostLayout,
        compiler: Arc<dyn ModCompiler>,
        inspector: Arc<dyn MetadataInspector>,
    ) -> Self {
        let registry = Box::new(DirectoryRegistry::new(&layout.mods_dir));
        let lifecycle = Box::new(EnabledList::new(&layout.mods_dir));
        Self {
            layout,
            launch: LaunchConfig::default(),
            compiler,
            inspector,
            registry,
            lifecycle,
            status: Arc::new(NullStatus),
            converters: ConverterRegistry::new(),
        }
    }

    pub fn with_launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_registry(mut self, registry: impl ModRegistry + 'static) -> Self {
        self.registry = Box::new(registry);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: impl ModLifecycle + 'static) -> Self {
        self.lifecycle = Box::new(lifecycle);
        self
    }

    pub fn with_status(mut self, status: Arc<dyn BuildStatus>) -> Self {
        self.status = status;
        self
    }

    /// Register a resource converter for files with `extension`
    pub fn with_converter(mut self, extension: &str, converter: Arc<dyn ResourceConverter>) -> Self {
        self.converters.register(extension, converter);
        self
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    /// Build the mod in `folder`
    pub fn build(&self, folder: &Path) -> BuildResult<ModReport> {
        let building = self.read_building_mod(folder)?;
        self.build_mod(building)
    }

    /// Build every mod in the mod sources folder, dependencies first. Stops at
    /// the first failure.
    pub fn build_all(&self) -> BuildResult<BuildReport> {
        let started = Instant::now();

        let mut building = Vec::new();
        for folder in self.layout.find_mod_sources()? {
            building.push(self.read_building_mod(&folder)?);
        }

        let descriptors: Vec<ModDescriptor> =
            building.iter().map(|b| b.descriptor.clone()).collect();
        let installed: Vec<ModDescriptor> = self
            .registry
            .installed()?
            .into_iter()
            .map(|m| m.descriptor)
            .collect();

        let resolved = DependencyResolver::new(self.layout.host_version.clone())
            .resolve(&descriptors, &installed)?;
        info!(
            mods = resolved.to_build.len(),
            required = resolved.required_from_install.len(),
            "build order resolved"
        );

        let total = resolved.to_build.len();
        let mut report = BuildReport::default();
        for (i, name) in resolved.to_build.iter().enumerate() {
            self.status.set_progress(i, Some(total));
            let Some(index) = building.iter().position(|b| b.name() == name) else {
                continue;
            };
            let next = building.swap_remove(index);
            report.mods.push(self.build_mod(next)?);
        }

        report.total_time = started.elapsed();
        Ok(report)
    }

    fn read_building_mod(&self, folder: &Path) -> BuildResult<BuildingMod> {
        let name = folder_label(folder);
        self.status
            .set_status(&format!("Reading properties: {}", name));
        BuildingMod::read(folder).for_mod(&name)
    }

    /// Build one mod, tagging any failure with its name
    pub fn build_mod(&self, mut building: BuildingMod) -> BuildResult<ModReport> {
        let name = building.name().to_string();
        self.build_mod_inner(&mut building).for_mod(&name)
    }

    fn build_mod_inner(&self, building: &mut BuildingMod) -> BuildResult<ModReport> {
        let started = Instant::now();
        let name = building.name().to_string();
        self.status.set_status(&format!("Building {}...", name));
        info!(mod_name = %name, path = %building.path.display(), "building mod");

        self.check_host_version(&building.descriptor)?;
        building.ref_mods = self.find_referenced_mods(&building.descriptor)?;

        let resolver = ReferenceResolver::new(&self.layout, Arc::clone(&self.inspector))
            .with_debug_binary(self.launch.debug_binary.as_deref());
        reference_folder::update(&resolver)?;

        let mut archive = ModArchive::new(&name, building.descriptor.version.clone());
        let mut warnings = Vec::new();
        for variant in Variant::ALL {
            self.status.set_progress(variant.index(), Some(Variant::ALL.len()));
            warnings.extend(self.build_variant(building, variant, &resolver, &mut archive)?);
        }

        if let Some(symbols) = self.launch.debug_symbols_path() {
            self.status
                .set_status(&format!("Recording debug symbols path {}", symbols.display()));
            building.descriptor.debug_symbols_path = Some(symbols);
        }

        Packager::new(&self.converters, self.status.as_ref()).package(
            building,
            &mut archive,
            self.launch.debug_binary.as_deref(),
        )?;

        let archive_path = self.layout.archive_path(&name);
        self.lifecycle.unload(&name)?;
        archive.save(&archive_path)?;
        self.lifecycle.activate(&name)?;

        let build_time = started.elapsed();
        info!(
            mod_name = %name,
            archive = %archive_path.display(),
            warnings = warnings.len(),
            elapsed_ms = build_time.as_millis() as u64,
            "mod built"
        );

        Ok(ModReport {
            name,
            archive_path,
            warnings,
            build_time,
        })
    }

    fn check_host_version(&self, descriptor: &ModDescriptor) -> BuildResult<()> {
        let (Some(range), Some(host)) = (&descriptor.host_version, &self.layout.host_version) else {
            return Ok(());
        };
        if range.matches(host) {
            return Ok(());
        }
        Err(BuildError::VersionMismatch {
            mod_name: descriptor.name.clone(),
            dependency: "host".to_string(),
            required: range.to_string(),
            found: host.to_string(),
        })
    }

    /// Installed mods `descriptor` compiles against: its strong and weak
    /// references, then the strong references of those, transitively
    pub fn find_referenced_mods(&self, descriptor: &ModDescriptor) -> BuildResult<Vec<InstalledMod>> {
        let mut found = Vec::new();
        self.collect_referenced_mods(descriptor, true, &mut found)?;
        Ok(found)
    }

    fn collect_referenced_mods(
        &self,
        descriptor: &ModDescriptor,
        include_weak: bool,
        found: &mut Vec<InstalledMod>,
    ) -> BuildResult<()> {
        for reference in descriptor.references(include_weak) {
            if found.iter().any(|m| m.name() == reference.name) {
                continue;
            }

            let Some(installed) = self.registry.find(&reference.name)? else {
                if descriptor.is_weak_reference(&reference.name) {
                    debug!(mod_name = %descriptor.name, reference = %reference.name, "weak reference not installed");
                    continue;
                }
                return Err(BuildError::missing_dependency(&reference.name, &descriptor.name));
            };

            if !reference.accepts(&installed.descriptor.version) {
                return Err(BuildError::VersionMismatch {
                    mod_name: descriptor.name.clone(),
                    dependency: reference.name.clone(),
                    required: reference
                        .min_version
                        .as_ref()
                        .map(|v| format!(">={}", v))
                        .unwrap_or_default(),
                    found: installed.descriptor.version.to_string(),
                });
            }

            let next = installed.descriptor.clone();
            found.push(installed);
            self.collect_referenced_mods(&next, false, found)?;
        }
        Ok(())
    }

    /// Compile, verify and reconcile one variant, adding the results to
    /// `archive`. Returns the compiler warnings.
    fn build_variant(
        &self,
        building: &BuildingMod,
        variant: Variant,
        resolver: &ReferenceResolver<'_>,
        archive: &mut ModArchive,
    ) -> BuildResult<Vec<Diagnostic>> {
        let scratch = ScratchDir::fresh(self.layout.temp_dir())?;

        let table = resolver.table_for(building, variant, scratch.path())?;
        let driver = CompilerDriver::new(
            self.compiler.as_ref(),
            self.status.as_ref(),
            &self.launch,
            self.layout.active_variant,
        );
        let compiled = driver.produce(building, variant, scratch.path(), &table)?;

        let bytes = fs::read(&compiled.path).map_err(|e| BuildError::io(&compiled.path, e))?;
        let mut artifact = BuildArtifact::new(variant, variant.binary_name(building.name()), bytes);

        let module = self.inspector.read_module(&compiled.path)?;
        verify_module(building.name(), &module)?;

        if building.descriptor.include_pdb {
            let build_dir = compiled.path.parent().unwrap_or(scratch.path());
            let assemblies = BuildDirResolver::new(build_dir, &table);
            SymbolReconciler::new(self.inspector.as_ref(), self.layout.symbol_format).reconcile(
                &compiled.path,
                scratch.path(),
                &assemblies,
                &mut artifact,
            )?;
        }

        artifact.add_to(archive)?;
        debug!(mod_name = %building.name(), variant = %variant, precompiled = compiled.precompiled, "variant built");
        Ok(compiled.warnings)
    }
}

/// Compile scratch directory, emptied on creation and removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn fresh(path: PathBuf) -> BuildResult<Self> {
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove compile temp dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_label() {
        assert_eq!(folder_label(Path::new("/save/ModSources/ExampleMod")), "ExampleMod");
        assert_eq!(folder_label(Path::new("ModSources/ExampleMod/")), "ExampleMod");
        assert_eq!(folder_label(Path::new("/")), "/");
    }

    #[test]
    fn test_scratch_dir_is_fresh_and_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compile_temp");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("stale.dll"), b"old").unwrap();

        {
            let scratch = ScratchDir::fresh(path.clone()).unwrap();
            assert!(scratch.path().is_dir());
            assert!(!scratch.path().join("stale.dll").exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_report_warning_count() {
        let warning = Diagnostic::new(crate::compiler::Severity::Warning, "CS0168", "unused");
        let report = BuildReport {
            mods: vec![
                ModReport {
                    name: "A".into(),
                    archive_path: PathBuf::from("A.tmod"),
                    warnings: vec![warning.clone()],
                    build_time: Duration::ZERO,
                },
                ModReport {
                    name: "B".into(),
                    archive_path: PathBuf::from("B.tmod"),
                    warnings: vec![warning.clone(), warning],
                    build_time: Duration::ZERO,
                },
            ],
            total_time: Duration::ZERO,
        };
        assert_eq!(report.warning_count(), 3);
    }
}
