//! Rule file enumeration over a freshly materialised checkout.

use std::path::Path;

use teamrules_core::types::join_slash_path;
use walkdir::WalkDir;

use crate::error::{io_err, SyncError};

/// List every file under `{repo_root}/{subtree}` whose extension is in
/// `extensions` (case-insensitive, leading dots ignored).
///
/// Returned paths are relative to `repo_root`, `/`-separated and sorted.
pub fn enumerate(
    repo_root: &Path,
    subtree: &str,
    extensions: &[String],
) -> Result<Vec<String>, SyncError> {
    let subtree_root = join_slash_path(repo_root, subtree);
    if !subtree_root.is_dir() {
        return Err(SyncError::MissingSubtree {
            subtree: subtree.to_string(),
        });
    }

    let allowed: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(&subtree_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(subtree_root.as_path()).to_path_buf();
            io_err(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| allowed.iter().any(|a| *a == ext));
        if !matches {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(repo_root)
            .unwrap_or(entry.path());
        files.push(to_slash_path(relative));
    }

    files.sort();
    tracing::debug!(count = files.len(), subtree, "enumerated rule files");
    Ok(files)
}

/// Render a relative path with `/` separators regardless of host platform.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
