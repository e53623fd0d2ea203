//! Build-all command - build every mod in the mod sources folder

use super::{acquire_lock, describe, ensure_environment, launch_config, load_config, mod_builder};
use crate::LaunchArgs;
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: Option<&Path>, args: LaunchArgs) -> Result<()> {
    let config = load_config(config_path)?;
    ensure_environment(&config)?;
    let _lock = acquire_lock(&config)?;

    let launch = launch_config(&config, args);
    let builder = mod_builder(&config, launch)?;
    let report = builder.build_all().map_err(describe)?;

    if report.mods.is_empty() {
        println!(
            "No mods found in {}",
            builder.layout().mod_sources_dir.display()
        );
        return Ok(());
    }

    for built in &report.mods {
        println!("  {} -> {}", built.name, built.archive_path.display());
    }
    println!(
        "Built {} mods in {:.2}s ({} warnings)",
        report.mods.len(),
        report.total_time.as_secs_f64(),
        report.warning_count()
    );
    Ok(())
}
