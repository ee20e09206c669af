//! `teamrules restore`: startup recovery on demand.

use anyhow::{Context, Result};
use colored::Colorize;

use teamrules_sync::LinkOutcome;

use super::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<()> {
    let engine = global.engine()?;
    let Some(restored) = engine.restore().context("restore failed")? else {
        println!("No registry to restore.");
        return Ok(());
    };

    let projection = &restored.projection;
    println!(
        "✓ restored '{}' ({} files): {} relinked, {} skipped",
        restored.descriptor.remote_url,
        restored.descriptor.files.len(),
        projection.changed(),
        projection.skipped(),
    );
    for outcome in &projection.outcomes {
        let path = outcome.path();
        let shown = path
            .strip_prefix(engine.workspace_root())
            .unwrap_or(path)
            .display();
        match outcome {
            LinkOutcome::Created { .. } => println!("  {}  {shown} (link recreated)", "✎".green()),
            LinkOutcome::Repaired { .. } => println!("  {}  {shown} (stale link replaced)", "✎".green()),
            LinkOutcome::SkippedRegularFile { .. } => {
                println!("  {}  {shown} (local file kept)", "·".yellow())
            }
            LinkOutcome::SkippedDirectory { .. } => {
                println!("  {}  {shown} (directory in the way)", "·".yellow())
            }
            LinkOutcome::MissingTarget { .. } => {
                println!("  {}  {shown} (missing in checkout)", "!".red())
            }
            _ => {}
        }
    }
    Ok(())
}
