//! Configuration loading and precedence tests

use modsmith_config::{ConfigError, ConfigLoader, GlobalConfig, LaunchConfig};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("config.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn clear_env() {
    for key in [
        "MODSMITH_SAVE_DIR",
        "MODSMITH_HOST_DIR",
        "MODSMITH_COMPILER",
        "MODSMITH_INSPECTOR",
        "MODSMITH_UNSAFE",
        "MODSMITH_DEFINE",
        "MODSMITH_DEBUG_BINARY",
    ] {
        env::remove_var(key);
    }
}

// ============================================================================
// Global Config Loading
// ============================================================================

#[test]
#[serial]
fn test_load_full_config() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
save_dir = "/data/modsmith"

[host]
install_dir = "/games/host"
binary = "tModLoader.exe"
version = "0.11.8.4"
variant = "XNA"
symbol_format = "native-pdb"

[tools]
compiler = "/opt/csc"
inspector = "/opt/il-inspect"
framework_references = "/opt/framework"
"#,
    );

    let config = ConfigLoader::new().with_global_path(&path).load().unwrap();

    assert_eq!(config.save_dir, PathBuf::from("/data/modsmith"));
    assert_eq!(config.mods_dir(), PathBuf::from("/data/modsmith/Mods"));
    assert_eq!(
        config.mod_sources_dir(),
        PathBuf::from("/data/modsmith/ModSources")
    );
    assert_eq!(
        config.references_dir(),
        PathBuf::from("/data/modsmith/ModSources/references")
    );
    assert_eq!(config.install_dir().unwrap(), Path::new("/games/host"));
    assert_eq!(config.host_binary(), "tModLoader.exe");
    assert_eq!(config.host_version(), Some("0.11.8.4"));
    assert_eq!(config.host_variant(), "xna");
    assert_eq!(config.symbol_format(), "native-pdb");
    assert_eq!(config.inspector().unwrap(), Path::new("/opt/il-inspect"));
    assert_eq!(
        config.framework_references(),
        Some(PathBuf::from("/opt/framework"))
    );
}

#[test]
#[serial]
fn test_invalid_variant_rejected_on_load() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
[host]
variant = "directx"
"#,
    );

    let result = ConfigLoader::new().with_global_path(&path).load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_missing_tools_are_reported_by_name() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("MODSMITH_SAVE_DIR", temp_dir.path());

    let config = ConfigLoader::new()
        .with_global_path(temp_dir.path().join("none.toml"))
        .load()
        .unwrap();

    match config.compiler() {
        Err(ConfigError::MissingSetting(name)) => assert_eq!(name, "tools.compiler"),
        other => panic!("expected MissingSetting, got {:?}", other),
    }
    assert_eq!(config.symbol_format(), "portable-pdb");
    clear_env();
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_global_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
save_dir = "/from/file"

[tools]
inspector = "/file/inspect"
"#,
    );

    env::set_var("MODSMITH_SAVE_DIR", "/from/env");
    env::set_var("MODSMITH_INSPECTOR", "/env/inspect");

    let config = ConfigLoader::new().with_global_path(&path).load().unwrap();
    assert_eq!(config.save_dir, PathBuf::from("/from/env"));
    assert_eq!(config.inspector().unwrap(), Path::new("/env/inspect"));
    clear_env();
}

#[test]
#[serial]
fn test_launch_config_from_env_then_cli() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("MODSMITH_SAVE_DIR", temp_dir.path());
    env::set_var("MODSMITH_DEFINE", "FROM_ENV");

    let config = ConfigLoader::new()
        .with_global_path(temp_dir.path().join("none.toml"))
        .load()
        .unwrap();

    let launch = config.launch.with_defines(["FROM_CLI"]).with_unsafe(true);
    assert_eq!(launch.defines, vec!["FROM_ENV", "FROM_CLI"]);
    assert!(launch.allow_unsafe);
    clear_env();
}

#[test]
fn test_merge_keeps_unset_fields() {
    let mut base: GlobalConfig = toml::from_str(
        r#"
[host]
install_dir = "/a"
version = "0.11"
"#,
    )
    .unwrap();
    let overlay: GlobalConfig = toml::from_str(
        r#"
[host]
install_dir = "/b"
"#,
    )
    .unwrap();

    base.merge(&overlay);
    let host = base.host().unwrap();
    assert_eq!(host.install_dir, Some(PathBuf::from("/b")));
    assert_eq!(host.version.as_deref(), Some("0.11"));
}

#[test]
fn test_launch_defaults() {
    let launch = LaunchConfig::default();
    assert!(!launch.allow_unsafe);
    assert!(launch.defines.is_empty());
    assert_eq!(launch.debug_symbols_path(), None);
}
