//! `teamrules remove`: tear the registry down.

use anyhow::{Context, Result};

use super::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<()> {
    let engine = global.restored_engine()?;
    let removed = engine
        .remove_registry()
        .context("failed to remove registry")?;
    if removed {
        println!("✓ registry removed");
    } else {
        println!("No registry configured.");
    }
    Ok(())
}
