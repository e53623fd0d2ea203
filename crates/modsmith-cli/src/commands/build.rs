//! Build command - compile and package a single mod

use super::{acquire_lock, describe, ensure_environment, launch_config, load_config, mod_builder};
use crate::LaunchArgs;
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: Option<&Path>, dir: &Path, args: LaunchArgs) -> Result<()> {
    let config = load_config(config_path)?;
    ensure_environment(&config)?;
    let _lock = acquire_lock(&config)?;

    let launch = launch_config(&config, args);
    let builder = mod_builder(&config, launch)?;
    let report = builder.build(dir).map_err(describe)?;

    println!(
        "Built {} in {:.2}s ({} warnings) -> {}",
        report.name,
        report.build_time.as_secs_f64(),
        report.warnings.len(),
        report.archive_path.display()
    );
    Ok(())
}
