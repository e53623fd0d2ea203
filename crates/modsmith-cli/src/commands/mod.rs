pub mod build;
pub mod build_all;
pub mod refs;

use crate::LaunchArgs;
use anyhow::{Context, Result};
use modsmith_build::{
    BuildError, BuildLock, ConsoleStatus, Environment, HostLayout, ModBuilder, ProcessCompiler,
    ProcessInspector, ToolchainEnvironment,
};
use modsmith_config::{Config, ConfigLoader, LaunchConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Load configuration, from `path` if given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_global_path(path);
    }
    loader.load().context("Failed to load configuration")
}

/// CLI flags win over MODSMITH_* settings
pub fn launch_config(config: &Config, args: LaunchArgs) -> LaunchConfig {
    let mut launch = config.launch.clone().with_defines(&args.defines);
    if args.allow_unsafe {
        launch = launch.with_unsafe(true);
    }
    if let Some(path) = args.debug_binary {
        launch = launch.with_debug_binary(path);
    }
    launch
}

/// Fail unless the toolchain is ready
pub fn ensure_environment(config: &Config) -> Result<()> {
    let readiness = ToolchainEnvironment::from_config(config).check();
    let message = readiness.require()?;
    debug!(%message, "environment ready");
    Ok(())
}

/// Serialize with other command-line builds
pub fn acquire_lock(config: &Config) -> Result<BuildLock> {
    let path = config.lock_path();
    let lock = BuildLock::acquire(&path, || {
        println!("Waiting for other builds to complete");
    })?;
    Ok(lock)
}

/// Builder wired to the configured external tools
pub fn mod_builder(config: &Config, launch: LaunchConfig) -> Result<ModBuilder> {
    let layout = HostLayout::from_config(config)?;
    let compiler = ProcessCompiler::new(config.compiler()?);
    let inspector = ProcessInspector::new(config.inspector()?);

    Ok(ModBuilder::new(layout, Arc::new(compiler), Arc::new(inspector))
        .with_launch(launch)
        .with_status(Arc::new(ConsoleStatus)))
}

/// Name the failing mod in the error chain
pub fn describe(err: BuildError) -> anyhow::Error {
    match err {
        BuildError::Mod { name, source } => {
            anyhow::Error::new(*source).context(format!("Building {} failed", name))
        }
        other => anyhow::Error::new(other),
    }
}
