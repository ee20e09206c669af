//! Domain types for the team rules registry.
//!
//! Filesystem locations use `PathBuf`. Workspace-relative rule file paths are
//! plain `String`s that always use `/` separators, whatever the host platform,
//! because they are persisted and reported to collaborators verbatim.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Directory inside `storage_location` that holds the sparse checkout.
pub const CHECKOUT_DIR: &str = "repo";

/// Namespace prefix of every [`WorkspaceKey`].
pub const KEY_NAMESPACE: &str = "teamRegistry";

// ---------------------------------------------------------------------------
// Workspace key
// ---------------------------------------------------------------------------

/// Stable identifier scoping persisted state to one working directory.
///
/// `teamRegistry.<first 8 hex chars of sha256(absolute workspace path)>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceKey(pub String);

impl WorkspaceKey {
    /// Derive the key for an absolute workspace path.
    pub fn for_workspace(workspace_root: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(workspace_root.to_string_lossy().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("{KEY_NAMESPACE}.{}", &digest[..8]))
    }
}

impl fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkspaceKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Registry descriptor
// ---------------------------------------------------------------------------

/// The durable unit of state: one per workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDescriptor {
    /// Origin location of the tracked repository.
    pub remote_url: String,
    /// Absolute path to the private sparse checkout, outside the workspace.
    pub storage_location: PathBuf,
    /// Workspace-relative, `/`-separated rule file paths.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl RegistryDescriptor {
    pub fn new(remote_url: impl Into<String>, storage_location: PathBuf, files: Vec<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            storage_location,
            files,
            added_at: Utc::now(),
        }
    }

    /// `{storage_location}/repo`
    pub fn checkout_dir(&self) -> PathBuf {
        self.storage_location.join(CHECKOUT_DIR)
    }
}

/// Join a `/`-separated relative path onto `base` using platform separators.
pub fn join_slash_path(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Coarse per-file local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Modified,
    #[default]
    Unmodified,
    Untracked,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Unmodified => write!(f, "unmodified"),
            FileStatus::Untracked => write!(f, "untracked"),
        }
    }
}

/// Relationship between the checkout branch and its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteStatus {
    Ahead,
    Behind,
    Diverged,
    UpToDate,
    #[default]
    NoRemote,
}

impl RemoteStatus {
    /// Classify ahead/behind commit counts against a configured upstream.
    pub fn classify(ahead: u32, behind: u32) -> Self {
        match (ahead > 0, behind > 0) {
            (true, true) => RemoteStatus::Diverged,
            (true, false) => RemoteStatus::Ahead,
            (false, true) => RemoteStatus::Behind,
            (false, false) => RemoteStatus::UpToDate,
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Ahead => write!(f, "ahead"),
            RemoteStatus::Behind => write!(f, "behind"),
            RemoteStatus::Diverged => write!(f, "diverged"),
            RemoteStatus::UpToDate => write!(f, "up-to-date"),
            RemoteStatus::NoRemote => write!(f, "no-remote"),
        }
    }
}

/// Per-file status computed on demand. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetailedFileStatus {
    pub local_status: FileStatus,
    pub remote_status: RemoteStatus,
    pub has_unstaged_changes: bool,
    pub has_uncommitted_changes: bool,
    /// The file is an unmerged path (rebase or pull stopped on a conflict).
    pub has_conflicts: bool,
    pub ahead: u32,
    pub behind: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

/// One row of a [`RegistryStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusEntry {
    pub path: String,
    pub status: DetailedFileStatus,
}

/// Aggregate status over every file of the active registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub remote_status: RemoteStatus,
    pub ahead: u32,
    pub behind: u32,
    pub files: Vec<FileStatusEntry>,
}

impl RegistryStatus {
    /// Number of files with local changes (modified or untracked).
    pub fn changed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|entry| entry.status.local_status != FileStatus::Unmodified)
            .count()
    }

    pub fn conflicted_count(&self) -> usize {
        self.files.iter().filter(|entry| entry.status.has_conflicts).count()
    }
}

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// Emitted whenever the active registry is added, removed, or restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(RegistryDescriptor),
    Removed,
    Restored(RegistryDescriptor),
}

impl RegistryEvent {
    /// The descriptor active after this event, if any.
    pub fn descriptor(&self) -> Option<&RegistryDescriptor> {
        match self {
            RegistryEvent::Added(d) | RegistryEvent::Restored(d) => Some(d),
            RegistryEvent::Removed => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn workspace_key_is_stable_and_namespaced() {
        let a = WorkspaceKey::for_workspace(Path::new("/home/dev/project"));
        let b = WorkspaceKey::for_workspace(Path::new("/home/dev/project"));
        assert_eq!(a, b);
        assert!(a.0.starts_with("teamRegistry."));
        let suffix = a.0.trim_start_matches("teamRegistry.");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn workspace_key_differs_per_workspace() {
        let a = WorkspaceKey::for_workspace(Path::new("/home/dev/one"));
        let b = WorkspaceKey::for_workspace(Path::new("/home/dev/two"));
        assert_ne!(a, b);
    }

    #[rstest]
    #[case(2, 0, RemoteStatus::Ahead)]
    #[case(0, 3, RemoteStatus::Behind)]
    #[case(1, 1, RemoteStatus::Diverged)]
    #[case(0, 0, RemoteStatus::UpToDate)]
    fn classify_ahead_behind(#[case] ahead: u32, #[case] behind: u32, #[case] want: RemoteStatus) {
        assert_eq!(RemoteStatus::classify(ahead, behind), want);
    }

    #[test]
    fn status_display_matches_wire_names() {
        assert_eq!(RemoteStatus::UpToDate.to_string(), "up-to-date");
        assert_eq!(RemoteStatus::NoRemote.to_string(), "no-remote");
        assert_eq!(FileStatus::Untracked.to_string(), "untracked");
        assert_eq!(
            serde_json::to_string(&RemoteStatus::UpToDate).unwrap(),
            "\"up-to-date\""
        );
    }

    #[test]
    fn default_detailed_status_is_conservative() {
        let status = DetailedFileStatus::default();
        assert_eq!(status.local_status, FileStatus::Unmodified);
        assert_eq!(status.remote_status, RemoteStatus::NoRemote);
        assert!(status.last_commit_hash.is_none());
        assert!(status.commit_message.is_none());
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let d = RegistryDescriptor::new(
            "https://example.com/team/rules.git",
            PathBuf::from("/data/storage"),
            vec![".cursor/rules/a.mdc".to_string()],
        );
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["remoteUrl"], "https://example.com/team/rules.git");
        assert_eq!(json["storageLocation"], "/data/storage");
        assert_eq!(json["files"][0], ".cursor/rules/a.mdc");
    }

    #[test]
    fn slash_paths_join_component_wise() {
        let d = RegistryDescriptor::new("u", PathBuf::from("/data/s"), vec![]);
        let p = join_slash_path(&d.checkout_dir(), "rules/nested/a.mdc");
        assert_eq!(
            p,
            PathBuf::from("/data/s").join("repo").join("rules").join("nested").join("a.mdc")
        );
    }

    #[test]
    fn event_descriptor_accessor() {
        let d = RegistryDescriptor::new("u", PathBuf::from("/s"), vec![]);
        assert_eq!(RegistryEvent::Added(d.clone()).descriptor(), Some(&d));
        assert_eq!(RegistryEvent::Removed.descriptor(), None);
    }
}
