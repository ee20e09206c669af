//! `teamrules push | pull | sync`: exchange commits with the registry remote.

use anyhow::{Context, Result};

use super::{require_registry, GlobalArgs};

#[derive(Debug, Clone, Copy)]
pub enum RemoteCommand {
    Push,
    Pull,
    /// Fetch, rebase onto upstream, push.
    Sync,
}

pub fn run(global: &GlobalArgs, command: RemoteCommand) -> Result<()> {
    let engine = global.restored_engine()?;
    require_registry(&engine)?;

    match command {
        RemoteCommand::Push => {
            engine.push_changes().context("push failed")?;
            println!("✓ pushed");
        }
        RemoteCommand::Pull => {
            let report = engine.pull_changes().context("pull failed")?;
            let files = engine
                .active_registry()
                .map(|d| d.files.len())
                .unwrap_or_default();
            println!(
                "✓ pulled: {files} files, {} links changed, {} skipped",
                report.changed(),
                report.skipped()
            );
        }
        RemoteCommand::Sync => {
            engine
                .fetch_and_rebase_then_push()
                .context("sync failed")?;
            println!("✓ synced");
        }
    }
    Ok(())
}
