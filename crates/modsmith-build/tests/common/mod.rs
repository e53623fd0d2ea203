//! Shared fixtures for pipeline tests
//!
//! The fake compiler writes a JSON `ModuleInfo` as the "binary"; the fake
//! inspector reads it back and implements rewriting by appending a marker.

#![allow(dead_code)]

use modsmith_build::inspect::{AssemblyResolver, WrittenModule};
use modsmith_build::verify::MOD_BASE_TYPE;
use modsmith_build::{
    BuildResult, BuildStatus, CompileRequest, Diagnostic, HostLayout, LogLevel,
    MetadataInspector, ModBuilder, ModCompiler, ModuleInfo, SymbolFormat, TypeInfo,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const REWRITE_MARKER: &[u8] = b"\n#rewritten";
pub const EMBEDDED_LIBRARY: &str = "Embedded.Lib.dll";

/// A well-formed module for `name`
pub fn module_for(name: &str) -> ModuleInfo {
    ModuleInfo {
        name: name.to_string(),
        types: vec![
            TypeInfo::new(name, name).extending(MOD_BASE_TYPE),
            TypeInfo::new(format!("{}.Items", name), "Sword").extending("Terraria.ModLoader.ModItem"),
        ],
    }
}

pub fn binary_bytes(module: &ModuleInfo) -> Vec<u8> {
    serde_json::to_vec(module).unwrap()
}

/// What the compiler was asked to do
#[derive(Debug, Clone)]
pub struct RecordedCompile {
    pub mod_name: String,
    pub output: PathBuf,
    pub symbols: Vec<String>,
    pub references: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub allow_unsafe: bool,
}

#[derive(Default)]
pub struct FakeCompiler {
    pub calls: Mutex<Vec<RecordedCompile>>,
    /// Modules to emit instead of the well-formed default, by mod name
    pub modules: Mutex<HashMap<String, ModuleInfo>>,
    /// Diagnostics to report, by mod name
    pub diagnostics: Mutex<HashMap<String, Vec<Diagnostic>>>,
}

impl FakeCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit_module(&self, mod_name: &str, module: ModuleInfo) {
        self.modules.lock().unwrap().insert(mod_name.to_string(), module);
    }

    pub fn report(&self, mod_name: &str, diagnostics: Vec<Diagnostic>) {
        self.diagnostics
            .lock()
            .unwrap()
            .insert(mod_name.to_string(), diagnostics);
    }

    pub fn calls(&self) -> Vec<RecordedCompile> {
        self.calls.lock().unwrap().clone()
    }

    pub fn compiled_mods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.mod_name).collect()
    }
}

impl ModCompiler for FakeCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<Vec<Diagnostic>> {
        self.calls.lock().unwrap().push(RecordedCompile {
            mod_name: request.mod_name.to_string(),
            output: request.output.to_path_buf(),
            symbols: request.symbols.to_vec(),
            references: request.references.to_vec(),
            sources: request.sources.to_vec(),
            allow_unsafe: request.allow_unsafe,
        });

        let diagnostics = self
            .diagnostics
            .lock()
            .unwrap()
            .get(request.mod_name)
            .cloned()
            .unwrap_or_default();
        if diagnostics.iter().any(|d| d.is_error()) {
            return Ok(diagnostics);
        }

        let module = self
            .modules
            .lock()
            .unwrap()
            .get(request.mod_name)
            .cloned()
            .unwrap_or_else(|| module_for(request.mod_name));
        fs::write(request.output, binary_bytes(&module)).unwrap();
        Ok(diagnostics)
    }
}

#[derive(Default)]
pub struct FakeInspector {
    pub extractions: AtomicUsize,
    pub rewrites: Mutex<Vec<(PathBuf, PathBuf, SymbolFormat)>>,
}

impl FakeInspector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Bytes a rewrite of `original` produces
    pub fn rewritten(original: &[u8]) -> Vec<u8> {
        let mut bytes = strip_marker(original).to_vec();
        bytes.extend_from_slice(REWRITE_MARKER);
        bytes
    }

    pub fn header_for(binary_name: &str) -> Vec<u8> {
        format!("HDR:{}", binary_name).into_bytes()
    }
}

fn strip_marker(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(REWRITE_MARKER).unwrap_or(bytes)
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl MetadataInspector for FakeInspector {
    fn read_module(&self, binary: &Path) -> BuildResult<ModuleInfo> {
        let bytes = fs::read(binary).unwrap();
        Ok(serde_json::from_slice(strip_marker(&bytes)).unwrap())
    }

    fn write_with_symbols(
        &self,
        binary: &Path,
        output: &Path,
        format: SymbolFormat,
        _resolver: &dyn AssemblyResolver,
    ) -> BuildResult<WrittenModule> {
        self.rewrites
            .lock()
            .unwrap()
            .push((binary.to_path_buf(), output.to_path_buf(), format));

        let bytes = Self::rewritten(&fs::read(binary).unwrap());
        fs::write(output, &bytes).unwrap();

        let symbols = match format {
            SymbolFormat::Mdb => PathBuf::from(format!("{}.mdb", output.display())),
            _ => output.with_extension("pdb"),
        };
        fs::write(&symbols, format!("pdb:{}:{}", format, file_name(output))).unwrap();

        Ok(WrittenModule {
            binary: output.to_path_buf(),
            symbols,
        })
    }

    fn debug_header(&self, binary: &Path) -> BuildResult<Vec<u8>> {
        Ok(Self::header_for(&file_name(binary)))
    }

    fn embedded_libraries(&self, _host: &Path) -> BuildResult<Vec<String>> {
        Ok(vec![EMBEDDED_LIBRARY.to_string()])
    }

    fn extract_embedded(&self, host: &Path, name: &str, dest: &Path) -> BuildResult<()> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, format!("{} from {}", name, file_name(host))).unwrap();
        Ok(())
    }
}

/// A host install plus save directory in a temp dir
pub struct Workspace {
    pub dir: TempDir,
    pub layout: HostLayout,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("install");
        fs::create_dir_all(install.join("ModCompile")).unwrap();
        fs::write(install.join("tModLoader.exe"), b"host").unwrap();
        fs::write(install.join("Microsoft.Xna.Framework.dll"), b"xna").unwrap();
        fs::write(install.join("ModCompile").join("tModLoader.FNA.exe"), b"fna host").unwrap();
        fs::write(install.join("ModCompile").join("FNA.dll"), b"fna").unwrap();

        let layout = HostLayout::new(&install, &dir.path().join("save"));
        fs::create_dir_all(&layout.mods_dir).unwrap();
        fs::create_dir_all(&layout.mod_sources_dir).unwrap();
        Self { dir, layout }
    }

    /// Create `ModSources/<name>` with a manifest, one source file and
    /// `extra` files
    pub fn write_mod(&self, name: &str, manifest: &str, extra: &[(&str, &[u8])]) -> PathBuf {
        let folder = self.layout.mod_sources_dir.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("build.toml"), manifest).unwrap();
        fs::write(
            folder.join(format!("{}.cs", name)),
            format!("namespace {} {{ public class {} : Mod {{}} }}", name, name),
        )
        .unwrap();
        for (rel, bytes) in extra {
            let path = folder.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
        folder
    }

    pub fn builder(&self, compiler: Arc<FakeCompiler>, inspector: Arc<FakeInspector>) -> ModBuilder {
        ModBuilder::new(self.layout.clone(), compiler, inspector)
    }
}

/// Keeps every status and compiler line
#[derive(Default)]
pub struct RecordingStatus {
    pub statuses: Mutex<Vec<String>>,
    pub compiler_lines: Mutex<Vec<(String, LogLevel)>>,
    pub max_progress: AtomicUsize,
}

impl RecordingStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn compiler_lines(&self) -> Vec<(String, LogLevel)> {
        self.compiler_lines.lock().unwrap().clone()
    }
}

impl BuildStatus for RecordingStatus {
    fn set_progress(&self, done: usize, _total: Option<usize>) {
        self.max_progress.fetch_max(done, Ordering::SeqCst);
    }

    fn set_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn log_compiler_line(&self, message: &str, level: LogLevel) {
        self.compiler_lines
            .lock()
            .unwrap()
            .push((message.to_string(), level));
    }
}
