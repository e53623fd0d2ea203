//! Shared references folder for IDE builds
//!
//! Holds the host's embedded libraries plus an MSBuild `.targets` file listing
//! every reference, so mod projects can be built outside the pipeline. The
//! folder is rebuilt when the host binary changes, detected through a `touch`
//! file holding `<host path> @ <mtime>`. Within a process the last stamp seen
//! per folder is cached, so later builds skip the check entirely.

use crate::error::{BuildError, BuildResult};
use crate::host::HOST_REFERENCE;
use crate::references::ReferenceResolver;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

pub const TOUCH_FILE: &str = "touch";
pub const TARGETS_FILE: &str = "tModLoader.targets";

fn current() -> &'static Mutex<HashMap<PathBuf, String>> {
    static CURRENT: OnceLock<Mutex<HashMap<PathBuf, String>>> = OnceLock::new();
    CURRENT.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Whether `dir` was brought up to date for `stamp` in this process
pub fn is_current(dir: &Path, stamp: &str) -> bool {
    current()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(dir)
        .is_some_and(|s| s == stamp)
}

fn mark_current(dir: &Path, stamp: &str) {
    current()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(dir.to_path_buf(), stamp.to_string());
}

/// Forget the cached state of `dir`
pub fn invalidate(dir: &Path) {
    current()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(dir);
}

/// Bring the references folder up to date. Returns whether it was rewritten.
pub fn update(resolver: &ReferenceResolver<'_>) -> BuildResult<bool> {
    let layout = resolver.layout();
    let dir = &layout.references_dir;
    let stamp = layout.touch_stamp()?;

    if is_current(dir, &stamp) {
        return Ok(false);
    }

    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

    let touch = dir.join(TOUCH_FILE);
    let last = fs::read_to_string(&touch).ok();
    if last.as_deref() == Some(stamp.as_str()) {
        debug!(dir = %dir.display(), "references folder up to date");
        mark_current(dir, &stamp);
        return Ok(false);
    }

    info!(dir = %dir.display(), "updating references folder");

    let mut libs = resolver.host_references(layout.active_variant, dir)?;
    libs.materialize_all()?;

    for entry in fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))? {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.ends_with(".dll") && !libs.contains(&name) {
            fs::remove_file(&path).map_err(|e| BuildError::io(&path, e))?;
        }
    }

    libs.remove(HOST_REFERENCE);
    let paths = libs.materialize_all()?;
    let targets = targets_file(&layout.install_dir, &layout.host_binary_path(), dir, &paths);
    let targets_path = dir.join(TARGETS_FILE);
    fs::write(&targets_path, targets).map_err(|e| BuildError::io(&targets_path, e))?;
    fs::write(&touch, &stamp).map_err(|e| BuildError::io(&touch, e))?;

    mark_current(dir, &stamp);
    Ok(true)
}

/// Render the MSBuild targets file
fn targets_file(install_dir: &Path, host: &Path, refs_dir: &Path, libs: &[PathBuf]) -> String {
    let server = server_binary(host);

    let mut references = vec![reference_xml("Terraria", "$(tMLPath)")];
    for lib in libs {
        let name = lib
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hint = if lib.parent() == Some(refs_dir) {
            let file = lib
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("$(MSBuildThisFileDirectory){}", file)
        } else {
            lib.display().to_string()
        };
        references.push(reference_xml(&name, &hint));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Project ToolsVersion="14.0" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup>
    <TerrariaSteamPath>{}</TerrariaSteamPath>
    <tMLPath>{}</tMLPath>
    <tMLServerPath>{}</tMLServerPath>
  </PropertyGroup>
  <ItemGroup>
{}
  </ItemGroup>
</Project>"#,
        escape_xml(&install_dir.display().to_string()),
        escape_xml(&host.display().to_string()),
        escape_xml(&server.display().to_string()),
        references.join("\n")
    )
}

fn reference_xml(name: &str, hint_path: &str) -> String {
    format!(
        "    <Reference Include=\"{}\">\n      <HintPath>{}</HintPath>\n    </Reference>",
        escape_xml(name),
        escape_xml(hint_path)
    )
}

/// Dedicated server binary shipped beside the client
fn server_binary(host: &Path) -> PathBuf {
    let name = host
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let server = if name == "Terraria.exe" {
        "tModLoaderServer.exe".to_string()
    } else {
        name.replace("tModLoader", "tModLoaderServer")
    };
    host.with_file_name(server)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
