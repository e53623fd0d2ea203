//! Binary metadata inspection and rewriting
//!
//! The pipeline never parses compiled binaries itself. It needs a handful of
//! structural facts (module name, top-level types and their base types) and a
//! way to rewrite a binary together with freshly generated debug symbols.
//! [`MetadataInspector`] is that narrow capability; [`ProcessInspector`]
//! backs it with an external tool speaking JSON.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;
use std::thread;
use tracing::debug;

/// Debug symbol file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolFormat {
    PortablePdb,
    NativePdb,
    Mdb,
}

impl SymbolFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PortablePdb => "portable-pdb",
            Self::NativePdb => "native-pdb",
            Self::Mdb => "mdb",
        }
    }
}

impl fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portable-pdb" => Ok(Self::PortablePdb),
            "native-pdb" => Ok(Self::NativePdb),
            "mdb" => Ok(Self::Mdb),
            other => Err(format!("unknown symbol format '{}'", other)),
        }
    }
}

/// A top-level type declared by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Full name of the direct base type
    #[serde(default)]
    pub base_type: Option<String>,
}

impl TypeInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            base_type: None,
        }
    }

    pub fn extending(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }
}

/// Structural metadata of a compiled module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Declared assembly name
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeInfo>,
}

/// Files produced by a symbol rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenModule {
    pub binary: PathBuf,
    pub symbols: PathBuf,
}

/// Resolves assemblies the inspector asks for while rewriting
pub trait AssemblyResolver: Send + Sync {
    /// Path of the named assembly (no extension), `Ok(None)` if unknown
    fn resolve(&self, name: &str) -> BuildResult<Option<PathBuf>>;
}

/// Narrow binary metadata capability
pub trait MetadataInspector: Send + Sync {
    fn read_module(&self, binary: &Path) -> BuildResult<ModuleInfo>;

    /// Write `binary` to `output` together with symbols in `format`.
    /// Rewriting the same input twice yields identical bytes.
    fn write_with_symbols(
        &self,
        binary: &Path,
        output: &Path,
        format: SymbolFormat,
        resolver: &dyn AssemblyResolver,
    ) -> BuildResult<WrittenModule>;

    /// Debug directory header of a binary
    fn debug_header(&self, binary: &Path) -> BuildResult<Vec<u8>>;

    /// Names of `.dll` resources embedded in a host binary
    fn embedded_libraries(&self, host: &Path) -> BuildResult<Vec<String>>;

    /// Copy an embedded resource out of a host binary
    fn extract_embedded(&self, host: &Path, name: &str, dest: &Path) -> BuildResult<()>;
}

/// Inspector backed by an external program.
///
/// Commands: `module <bin>`, `write <bin> <out> <format>`, `debug-header <bin>`,
/// `resources <host>` and `extract <host> <name> <dest>`. The tool prints its
/// JSON result as the final stdout line. While rewriting it may print
/// `resolve <Name>` lines; each is answered on stdin with a path, or an empty
/// line when the assembly is unknown.
#[derive(Debug, Clone)]
pub struct ProcessInspector {
    program: PathBuf,
}

#[derive(Deserialize)]
struct HeaderReply {
    header: Vec<u8>,
}

impl ProcessInspector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str], resolver: Option<&dyn AssemblyResolver>) -> BuildResult<String> {
        debug!(program = %self.program.display(), ?args, "running inspector");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(format!("could not start: {}", e)))?;

        let mut stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let stdin = child.stdin.take();
        let outcome = match child.stdout.take() {
            Some(stdout) => self.read_replies(stdout, stdin, resolver),
            None => Err(self.failure("stdout not captured")),
        };
        if outcome.is_err() {
            let _ = child.kill();
        }

        let status = child.wait().map_err(|e| self.failure(e));
        let stderr = stderr_reader.join().unwrap_or_default();
        let last = outcome?;
        let status = status?;
        if !status.success() {
            return Err(self.failure(format!("{} {}", status, stderr.trim())));
        }
        Ok(last)
    }

    /// Answer `resolve` requests until stdout closes; returns the last
    /// other non-empty line
    fn read_replies(
        &self,
        stdout: ChildStdout,
        mut stdin: Option<ChildStdin>,
        resolver: Option<&dyn AssemblyResolver>,
    ) -> BuildResult<String> {
        let mut last = String::new();
        for line in BufReader::new(stdout).lines() {
            let line = line.map_err(|e| self.failure(e))?;
            match line.strip_prefix("resolve ") {
                Some(name) => {
                    let path = match resolver {
                        Some(resolver) => resolver.resolve(name.trim())?,
                        None => None,
                    };
                    let reply = path
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    if let Some(stdin) = stdin.as_mut() {
                        writeln!(stdin, "{}", reply).map_err(|e| self.failure(e))?;
                        stdin.flush().map_err(|e| self.failure(e))?;
                    }
                }
                None if !line.trim().is_empty() => last = line,
                None => {}
            }
        }
        Ok(last)
    }

    fn run_json<T: for<'de> Deserialize<'de>>(
        &self,
        args: &[&str],
        resolver: Option<&dyn AssemblyResolver>,
    ) -> BuildResult<T> {
        let output = self.run(args, resolver)?;
        serde_json::from_str(&output)
            .map_err(|e| self.failure(format!("invalid reply '{}': {}", output, e)))
    }

    fn failure(&self, reason: impl ToString) -> BuildError {
        BuildError::tool(format!("inspector {}", self.program.display()), reason)
    }
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

impl MetadataInspector for ProcessInspector {
    fn read_module(&self, binary: &Path) -> BuildResult<ModuleInfo> {
        self.run_json(&["module", &arg(binary)], None)
    }

    fn write_with_symbols(
        &self,
        binary: &Path,
        output: &Path,
        format: SymbolFormat,
        resolver: &dyn AssemblyResolver,
    ) -> BuildResult<WrittenModule> {
        self.run_json(
            &["write", &arg(binary), &arg(output), format.as_str()],
            Some(resolver),
        )
    }

    fn debug_header(&self, binary: &Path) -> BuildResult<Vec<u8>> {
        let reply: HeaderReply = self.run_json(&["debug-header", &arg(binary)], None)?;
        Ok(reply.header)
    }

    fn embedded_libraries(&self, host: &Path) -> BuildResult<Vec<String>> {
        let names: Vec<String> = self.run_json(&["resources", &arg(host)], None)?;
        Ok(names.into_iter().filter(|n| n.ends_with(".dll")).collect())
    }

    fn extract_embedded(&self, host: &Path, name: &str, dest: &Path) -> BuildResult<()> {
        self.run(&["extract", &arg(host), name, &arg(dest)], None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_format_names() {
        for format in [SymbolFormat::PortablePdb, SymbolFormat::NativePdb, SymbolFormat::Mdb] {
            assert_eq!(format.as_str().parse::<SymbolFormat>().unwrap(), format);
        }
        assert!("dwarf".parse::<SymbolFormat>().is_err());
    }

    #[test]
    fn test_module_info_json() {
        let json = r#"{"name":"ExampleMod","types":[
            {"namespace":"ExampleMod","name":"ExampleMod","base_type":"Terraria.ModLoader.Mod"},
            {"name":"<Module>"}]}"#;
        let info: ModuleInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name, "ExampleMod");
        assert_eq!(
            info.types[0],
            TypeInfo::new("ExampleMod", "ExampleMod").extending("Terraria.ModLoader.Mod")
        );
        assert_eq!(info.types[1].namespace, "");
        assert_eq!(info.types[1].base_type, None);
    }

    #[test]
    fn test_missing_program_is_a_tool_error() {
        let inspector = ProcessInspector::new("/nonexistent/modsmith-inspector");
        let err = inspector.read_module(Path::new("x.dll")).unwrap_err();
        assert!(matches!(err, BuildError::Tool { .. }));
    }

    struct FailingResolver;

    impl AssemblyResolver for FailingResolver {
        fn resolve(&self, name: &str) -> BuildResult<Option<PathBuf>> {
            Err(BuildError::reference_missing(name, "ExampleMod"))
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resolver_failure_stops_inspector() {
        use crate::error::ErrorKind;
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("inspector.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho $$ > '{}'\necho 'resolve Missing.Lib'\nexec sleep 30\n",
                pid_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = Instant::now();
        let err = ProcessInspector::new(&script)
            .write_with_symbols(
                Path::new("in.dll"),
                Path::new("out.dll"),
                SymbolFormat::PortablePdb,
                &FailingResolver,
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReferenceMissing);
        assert!(started.elapsed() < Duration::from_secs(20));
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!Path::new("/proc").join(pid.trim()).exists());
    }
}
