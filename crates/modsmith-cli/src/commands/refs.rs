//! Refs command - bring the shared references folder up to date

use super::{acquire_lock, ensure_environment, load_config};
use anyhow::{Context, Result};
use modsmith_build::{reference_folder, HostLayout, ProcessInspector, ReferenceResolver};
use std::path::Path;
use std::sync::Arc;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    ensure_environment(&config)?;
    let _lock = acquire_lock(&config)?;

    let layout = HostLayout::from_config(&config)?;
    let inspector = Arc::new(ProcessInspector::new(config.inspector()?));
    let resolver = ReferenceResolver::new(&layout, inspector);

    let updated = reference_folder::update(&resolver)
        .context("Failed to update the references folder")?;
    if updated {
        println!("Updated references in {}", layout.references_dir.display());
    } else {
        println!("References in {} are up to date", layout.references_dir.display());
    }
    Ok(())
}
