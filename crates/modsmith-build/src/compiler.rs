//! Compiling mod sources, once per variant
use crate::building::BuildingMod;
use crate::error::{BuildError, BuildResult};
use crate::references::ReferenceTable;
use crate::status::{BuildStatus, LogLevel};
use modsmith_config::LaunchConfig;
use modsmith_package::{all_platforms_binary_name, Variant};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One compiler message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Parse a `file(line,col): error CODE: message` line
    pub fn parse(line: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| {
                Regex::new(
                    r"^(?:(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\):\s*)?(?P<sev>error|warning)\s+(?P<code>[A-Za-z0-9]+)\s*:\s*(?P<msg>.*)$",
                )
                .ok()
            })
            .as_ref()?;

        let caps = pattern.captures(line.trim())?;
        let severity = match &caps["sev"] {
            "error" => Severity::Error,
            _ => Severity::Warning,
        };
        let mut diagnostic = Self::new(severity, &caps["code"], &caps["msg"]);
        if let (Some(file), Some(line), Some(col)) =
            (caps.name("file"), caps.name("line"), caps.name("col"))
        {
            diagnostic = diagnostic.at(
                file.as_str(),
                line.as_str().parse().unwrap_or(0),
                col.as_str().parse().unwrap_or(0),
            );
        }
        Some(diagnostic)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(
                f,
                "{}({},{}): ",
                file.display(),
                self.line.unwrap_or(0),
                self.column.unwrap_or(0)
            )?;
        }
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} {}: {}", severity, self.code, self.message)
    }
}

/// Everything a compiler needs for one variant
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    /// Assembly name
    pub mod_name: &'a str,
    pub output: &'a Path,
    pub sources: &'a [PathBuf],
    pub references: &'a [PathBuf],
    /// Preprocessor symbols, variant tag first
    pub symbols: &'a [String],
    pub allow_unsafe: bool,
    pub debug_info: bool,
}

/// External compile capability
pub trait ModCompiler: Send + Sync {
    /// Compile the request, returning every diagnostic. Errors in the
    /// returned list are not failures of this call.
    fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<Vec<Diagnostic>>;
}

/// Compiler backed by an external wrapper program.
///
/// Invoked as `<program> --name <mod> --out <path> [--define SYM]...
/// [--reference PATH]... [--unsafe] [--debug] -- <sources>...`; diagnostics
/// are read from stdout and stderr in the usual
/// `file(line,col): error CODE: message` form.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn arguments(request: &CompileRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--name".to_string(),
            request.mod_name.to_string(),
            "--out".to_string(),
            request.output.display().to_string(),
        ];
        for symbol in request.symbols {
            args.push("--define".to_string());
            args.push(symbol.clone());
        }
        for reference in request.references {
            args.push("--reference".to_string());
            args.push(reference.display().to_string());
        }
        if request.allow_unsafe {
            args.push("--unsafe".to_string());
        }
        if request.debug_info {
            args.push("--debug".to_string());
        }
        args.push("--".to_string());
        args.extend(request.sources.iter().map(|s| s.display().to_string()));
        args
    }
}

impl ModCompiler for ProcessCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<Vec<Diagnostic>> {
        let tool = || format!("compiler {}", self.program.display());
        let output = Command::new(&self.program)
            .args(Self::arguments(request))
            .output()
            .map_err(|e| BuildError::tool(tool(), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics: Vec<Diagnostic> = stdout
            .lines()
            .chain(stderr.lines())
            .filter_map(Diagnostic::parse)
            .collect();

        if !output.status.success() && !diagnostics.iter().any(Diagnostic::is_error) {
            return Err(BuildError::tool(
                tool(),
                format!("{} {}", output.status, stderr.trim()),
            ));
        }
        Ok(diagnostics)
    }
}

/// Binary produced for one variant
#[derive(Debug, Clone)]
pub struct CompiledBinary {
    pub path: PathBuf,
    /// Supplied by the author instead of compiled by the pipeline
    pub precompiled: bool,
    pub warnings: Vec<Diagnostic>,
}

/// Produces one binary per variant: a precompiled file when one is declared,
/// otherwise a fresh compile.
pub struct CompilerDriver<'a> {
    compiler: &'a dyn ModCompiler,
    status: &'a dyn BuildStatus,
    launch: &'a LaunchConfig,
    active_variant: Variant,
}

impl<'a> CompilerDriver<'a> {
    pub fn new(
        compiler: &'a dyn ModCompiler,
        status: &'a dyn BuildStatus,
        launch: &'a LaunchConfig,
        active_variant: Variant,
    ) -> Self {
        Self {
            compiler,
            status,
            launch,
            active_variant,
        }
    }

    /// Path of a binary to use instead of compiling, if any.
    ///
    /// `no_compile` mods use `<name>.All.dll` when present, else
    /// `<name>.<Variant>.dll`. Otherwise the debug binary override stands in
    /// for the variant the host runs on.
    pub fn precompiled_path(&self, building: &BuildingMod, variant: Variant) -> Option<PathBuf> {
        if building.descriptor.no_compile {
            let all = building.path.join(all_platforms_binary_name(building.name()));
            if all.is_file() {
                return Some(all);
            }
            return Some(building.path.join(variant.binary_name(building.name())));
        }

        if variant == self.active_variant {
            return self.launch.debug_binary.clone();
        }
        None
    }

    /// Obtain the binary for `variant`, compiling into `temp_dir` if needed
    pub fn produce(
        &self,
        building: &BuildingMod,
        variant: Variant,
        temp_dir: &Path,
        references: &ReferenceTable,
    ) -> BuildResult<CompiledBinary> {
        let binary_name = variant.binary_name(building.name());

        if let Some(path) = self.precompiled_path(building, variant) {
            if !path.is_file() {
                return Err(BuildError::PrecompiledMissing { path });
            }
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.status
                .set_status(&format!("Loading precompiled {} from {}", binary_name, file));
            return Ok(CompiledBinary {
                path,
                precompiled: true,
                warnings: Vec::new(),
            });
        }

        let output = temp_dir.join(&binary_name);
        let warnings = self.compile(building, variant, &output, references)?;
        Ok(CompiledBinary {
            path: output,
            precompiled: false,
            warnings,
        })
    }

    /// Compile sources to `output`. Returns the warnings; any error
    /// diagnostic fails with [`BuildError::CompileError`].
    pub fn compile(
        &self,
        building: &BuildingMod,
        variant: Variant,
        output: &Path,
        references: &ReferenceTable,
    ) -> BuildResult<Vec<Diagnostic>> {
        let file = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.status.set_status(&format!("Compiling {}", file));

        let sources = building.source_files()?;
        let reference_paths = references.materialize_all()?;
        let symbols = preprocessor_symbols(variant, &self.launch.defines);

        debug!(
            mod_name = %building.name(),
            variant = %variant,
            sources = sources.len(),
            references = reference_paths.len(),
            "invoking compiler"
        );

        let diagnostics = self.compiler.compile(&CompileRequest {
            mod_name: building.name(),
            output,
            sources: &sources,
            references: &reference_paths,
            symbols: &symbols,
            allow_unsafe: self.launch.allow_unsafe,
            debug_info: building.descriptor.include_pdb,
        })?;

        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        let warnings = diagnostics.len() - errors;
        info!(mod_name = %building.name(), variant = %variant, errors, warnings, "compiled");

        self.status.log_compiler_line(
            &format!("Compilation finished with {} errors and {} warnings", errors, warnings),
            LogLevel::Info,
        );
        for diagnostic in &diagnostics {
            let level = if diagnostic.is_error() {
                LogLevel::Error
            } else {
                LogLevel::Warn
            };
            self.status.log_compiler_line(&diagnostic.to_string(), level);
        }

        if errors > 0 {
            return Err(BuildError::compile(building.name(), diagnostics));
        }
        Ok(diagnostics)
    }
}

/// Variant tag first, then user symbols
pub fn preprocessor_symbols(variant: Variant, defines: &[String]) -> Vec<String> {
    std::iter::once(variant.tag().to_string())
        .chain(defines.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NullStatus;
    use modsmith_package::ModDescriptor;
    use rstest::rstest;
    use semver::Version;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[rstest]
    #[case(
        "Items/Sword.cs(12,5): error CS1002: ; expected",
        Severity::Error,
        "CS1002",
        Some(12)
    )]
    #[case(
        "C:\\src\\Mod.cs(3,1): warning CS0168: The variable 'e' is declared but never used",
        Severity::Warning,
        "CS0168",
        Some(3)
    )]
    #[case("error CS0006: Metadata file 'x.dll' could not be found", Severity::Error, "CS0006", None)]
    fn test_parse_diagnostic(
        #[case] line: &str,
        #[case] severity: Severity,
        #[case] code: &str,
        #[case] at_line: Option<u32>,
    ) {
        let diagnostic = Diagnostic::parse(line).unwrap();
        assert_eq!(diagnostic.severity, severity);
        assert_eq!(diagnostic.code, code);
        assert_eq!(diagnostic.line, at_line);
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        assert!(Diagnostic::parse("Microsoft (R) Visual C# Compiler").is_none());
        assert!(Diagnostic::parse("").is_none());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        let diagnostic =
            Diagnostic::new(Severity::Error, "CS0103", "The name 'x' does not exist").at("A.cs", 4, 9);
        assert_eq!(diagnostic.to_string(), "A.cs(4,9): error CS0103: The name 'x' does not exist");
        assert_eq!(Diagnostic::parse(&diagnostic.to_string()).unwrap(), diagnostic);
    }

    #[test]
    fn test_preprocessor_symbols() {
        let defines = vec!["DEBUG".to_string(), "TRACE".to_string()];
        assert_eq!(
            preprocessor_symbols(Variant::Fna, &defines),
            vec!["FNA", "DEBUG", "TRACE"]
        );
    }

    #[test]
    fn test_process_compiler_arguments() {
        let sources = vec![PathBuf::from("A.cs")];
        let references = vec![PathBuf::from("/refs/Terraria.exe")];
        let symbols = vec!["XNA".to_string()];
        let args = ProcessCompiler::arguments(&CompileRequest {
            mod_name: "ExampleMod",
            output: Path::new("/tmp/ExampleMod.XNA.dll"),
            sources: &sources,
            references: &references,
            symbols: &symbols,
            allow_unsafe: true,
            debug_info: false,
        });
        assert_eq!(
            args,
            vec![
                "--name",
                "ExampleMod",
                "--out",
                "/tmp/ExampleMod.XNA.dll",
                "--define",
                "XNA",
                "--reference",
                "/refs/Terraria.exe",
                "--unsafe",
                "--",
                "A.cs"
            ]
        );
    }

    struct Scripted {
        diagnostics: Vec<Diagnostic>,
        seen_symbols: Mutex<Vec<String>>,
    }

    impl ModCompiler for Scripted {
        fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<Vec<Diagnostic>> {
            *self.seen_symbols.lock().unwrap() = request.symbols.to_vec();
            Ok(self.diagnostics.clone())
        }
    }

    fn building(dir: &Path, no_compile: bool) -> BuildingMod {
        let mut desc = ModDescriptor::new("ExampleMod", Version::new(1, 0, 0));
        desc.no_compile = no_compile;
        BuildingMod::new(desc, dir).unwrap()
    }

    #[test]
    fn test_errors_fail_and_warnings_are_returned() {
        let dir = TempDir::new().unwrap();
        let launch = LaunchConfig::default().with_defines(["EXTRA"]);
        let warning = Diagnostic::new(Severity::Warning, "CS0168", "unused");
        let compiler = Scripted {
            diagnostics: vec![warning.clone()],
            seen_symbols: Mutex::new(Vec::new()),
        };
        let driver = CompilerDriver::new(&compiler, &NullStatus, &launch, Variant::Xna);
        let m = building(dir.path(), false);

        let warnings = driver
            .compile(&m, Variant::Xna, &dir.path().join("out.dll"), &ReferenceTable::new())
            .unwrap();
        assert_eq!(warnings, vec![warning]);
        assert_eq!(*compiler.seen_symbols.lock().unwrap(), vec!["XNA", "EXTRA"]);

        let failing = Scripted {
            diagnostics: vec![Diagnostic::new(Severity::Error, "CS1002", "; expected")],
            seen_symbols: Mutex::new(Vec::new()),
        };
        let driver = CompilerDriver::new(&failing, &NullStatus, &launch, Variant::Xna);
        let err = driver
            .compile(&m, Variant::Fna, &dir.path().join("out.dll"), &ReferenceTable::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::CompileError { errors: 1, .. }));
    }

    #[test]
    fn test_precompiled_all_platforms_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ExampleMod.All.dll"), b"all").unwrap();
        fs::write(dir.path().join("ExampleMod.XNA.dll"), b"xna").unwrap();

        let launch = LaunchConfig::default();
        let compiler = Scripted {
            diagnostics: Vec::new(),
            seen_symbols: Mutex::new(Vec::new()),
        };
        let driver = CompilerDriver::new(&compiler, &NullStatus, &launch, Variant::Xna);
        let m = building(dir.path(), true);

        let binary = driver
            .produce(&m, Variant::Xna, dir.path(), &ReferenceTable::new())
            .unwrap();
        assert!(binary.precompiled);
        assert_eq!(binary.path, dir.path().join("ExampleMod.All.dll"));
    }

    #[test]
    fn test_debug_binary_only_replaces_active_variant() {
        let dir = TempDir::new().unwrap();
        let launch = LaunchConfig::default().with_debug_binary(dir.path().join("bin/ExampleMod.dll"));
        let compiler = Scripted {
            diagnostics: Vec::new(),
            seen_symbols: Mutex::new(Vec::new()),
        };
        let driver = CompilerDriver::new(&compiler, &NullStatus, &launch, Variant::Fna);
        let m = building(dir.path(), false);

        assert_eq!(
            driver.precompiled_path(&m, Variant::Fna),
            Some(dir.path().join("bin/ExampleMod.dll"))
        );
        assert_eq!(driver.precompiled_path(&m, Variant::Xna), None);
    }
}
