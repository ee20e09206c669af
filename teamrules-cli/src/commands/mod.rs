pub mod add;
pub mod commit;
pub mod remote;
pub mod remove;
pub mod restore;
pub mod show;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use teamrules_sync::RegistryEngine;

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Version-control binary to invoke instead of the configured one.
    #[arg(long, global = true, value_name = "BINARY")]
    pub git: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    fn workspace_root(&self) -> Result<PathBuf> {
        let dir = match &self.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        dir.canonicalize()
            .with_context(|| format!("workspace '{}' does not exist", dir.display()))
    }

    /// Build the engine without running startup recovery.
    pub fn engine(&self) -> Result<RegistryEngine> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let workspace = self.workspace_root()?;

        tracing::debug!(workspace = %workspace.display(), git = ?self.git, "opening engine");
        RegistryEngine::open_at(&home, &workspace, self.git.as_deref())
            .context("failed to load teamrules config")
    }

    /// Build the engine and restore the persisted registry, if any.
    pub fn restored_engine(&self) -> Result<RegistryEngine> {
        let engine = self.engine()?;
        engine
            .restore()
            .context("failed to restore the persisted registry")?;
        Ok(engine)
    }
}

/// Fail with a hint when the workspace has no registry.
pub fn require_registry(engine: &RegistryEngine) -> Result<()> {
    if engine.active_registry().is_none() {
        anyhow::bail!(
            "no registry configured for {}; run `teamrules add <url>` first",
            engine.workspace_root().display()
        );
    }
    Ok(())
}
