//! `teamrules commit`: stage and commit one registry file.

use anyhow::{Context, Result};
use clap::Args;

use super::{require_registry, GlobalArgs};

/// Arguments for `teamrules commit`.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Workspace-relative path of the rule file.
    pub path: String,

    /// Commit message.
    #[arg(short, long)]
    pub message: String,
}

impl CommitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let engine = global.restored_engine()?;
        require_registry(&engine)?;
        engine
            .stage_and_commit_file(&self.path, &self.message)
            .with_context(|| format!("failed to commit '{}'", self.path))?;
        println!("✓ committed {}", self.path);
        Ok(())
    }
}
