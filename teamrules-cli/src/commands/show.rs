//! `teamrules show`: print the active registry.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::GlobalArgs;

/// Arguments for `teamrules show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON (`null` when no registry is configured).
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let engine = global.restored_engine()?;
        let active = engine.active_registry();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&active).context("failed to serialize registry")?
            );
            return Ok(());
        }

        let Some(descriptor) = active else {
            println!("No registry configured.");
            return Ok(());
        };
        println!("{} {}", "registry".bold(), descriptor.remote_url);
        println!("{} {}", "checkout".bold(), descriptor.checkout_dir().display());
        println!(
            "{} {}",
            "added   ".bold(),
            descriptor.added_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("{} {}", "files   ".bold(), descriptor.files.len());
        for file in &descriptor.files {
            println!("  {file}");
        }
        Ok(())
    }
}
