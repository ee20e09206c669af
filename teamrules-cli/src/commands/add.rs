//! `teamrules add`: clone a registry and link its files.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use teamrules_sync::LinkOutcome;

use super::GlobalArgs;

/// Arguments for `teamrules add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Remote URL of the rules repository.
    pub url: String,
}

impl AddArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let engine = global.restored_engine()?;
        let added = engine
            .add_registry(&self.url)
            .with_context(|| format!("failed to add registry '{}'", self.url))?;

        println!(
            "{} '{}' ({}): {} linked, {} skipped",
            "✓".green().bold(),
            added.descriptor.remote_url,
            added.branch,
            added.projection.linked(),
            added.projection.skipped(),
        );
        for outcome in &added.projection.outcomes {
            match outcome {
                LinkOutcome::SkippedRegularFile { path } => {
                    println!("  {}  {} (local file kept)", "·".yellow(), path.display())
                }
                LinkOutcome::SkippedDirectory { path } => {
                    println!("  {}  {} (directory in the way)", "·".yellow(), path.display())
                }
                LinkOutcome::MissingTarget { path, .. } => {
                    println!("  {}  {} (missing in checkout)", "!".red(), path.display())
                }
                _ => {}
            }
        }
        Ok(())
    }
}
