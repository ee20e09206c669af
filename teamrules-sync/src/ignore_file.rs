//! Workspace `.gitignore` maintenance.
//!
//! While a registry is active, the projected subtree is listed in the
//! workspace's own `.gitignore` so the links never end up in the user's
//! repository. Only applies when the workspace is itself a git work tree.

use std::path::Path;

use crate::error::{io_err, SyncError};
use crate::process::Git;

pub const GITIGNORE: &str = ".gitignore";

/// Whether `workspace_root` is inside a git work tree.
pub fn is_git_work_tree(git: &Git<'_>, workspace_root: &Path) -> bool {
    git.run_trimmed(workspace_root, &["rev-parse", "--is-inside-work-tree"])
        .map(|out| out == "true")
        .unwrap_or(false)
}

/// Append `entry` to `{workspace_root}/.gitignore` unless an identical line
/// exists. Returns whether the file changed.
pub fn add_entry(workspace_root: &Path, entry: &str) -> Result<bool, SyncError> {
    let path = workspace_root.join(GITIGNORE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(&path, e)),
    };
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    std::fs::write(&path, updated).map_err(|e| io_err(&path, e))?;
    tracing::info!(entry, "added ignore entry");
    Ok(true)
}

/// Remove every line equal to `entry`. Returns whether the file changed.
pub fn remove_entry(workspace_root: &Path, entry: &str) -> Result<bool, SyncError> {
    let path = workspace_root.join(GITIGNORE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_err(&path, e)),
    };
    if !existing.lines().any(|line| line.trim() == entry) {
        return Ok(false);
    }

    let mut updated: String = existing
        .lines()
        .filter(|line| line.trim() != entry)
        .collect::<Vec<_>>()
        .join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    std::fs::write(&path, updated).map_err(|e| io_err(&path, e))?;
    tracing::info!(entry, "removed ignore entry");
    Ok(true)
}
