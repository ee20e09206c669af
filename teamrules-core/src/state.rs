//! Per-workspace registry state.
//!
//! # Storage layout
//!
//! ```text
//! ~/.teamrules/
//!   state/
//!     <key>.json        (one RegistryDescriptor per workspace, mode 0600)
//!   storage/
//!     <key>/repo/       (sparse checkout owned by the sync engine)
//! ```
//!
//! Every helper takes the home directory explicitly; callers resolve it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{io_err, StateError};
use crate::types::{RegistryDescriptor, WorkspaceKey};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.teamrules`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".teamrules")
}

/// `<home>/.teamrules/state/`
pub fn state_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("state")
}

/// `<home>/.teamrules/state/<key>.json`: pure, no I/O.
pub fn state_path_at(home: &Path, key: &WorkspaceKey) -> PathBuf {
    state_dir_at(home).join(format!("{}.json", key.0))
}

/// `<home>/.teamrules/storage/`: parent of every per-workspace checkout.
pub fn storage_root_at(home: &Path) -> PathBuf {
    root_at(home).join("storage")
}

// ---------------------------------------------------------------------------
// 2. Store trait
// ---------------------------------------------------------------------------

/// Durable storage for the single active descriptor of each workspace.
pub trait StateStore: Send + Sync {
    fn save(&self, key: &WorkspaceKey, descriptor: &RegistryDescriptor) -> Result<(), StateError>;

    /// Returns `Ok(None)` when nothing is stored for `key`.
    fn load(&self, key: &WorkspaceKey) -> Result<Option<RegistryDescriptor>, StateError>;

    /// Removing an absent key is not an error.
    fn clear(&self, key: &WorkspaceKey) -> Result<(), StateError>;
}

// ---------------------------------------------------------------------------
// 3. JSON file store (atomic)
// ---------------------------------------------------------------------------

/// Stores each descriptor as `<home>/.teamrules/state/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    home: PathBuf,
}

impl FileStateStore {
    /// Store rooted at an explicit home directory.
    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl StateStore for FileStateStore {
    /// Write flow: serialize → `.json.tmp` sibling → `chmod 0600` → `rename`.
    fn save(&self, key: &WorkspaceKey, descriptor: &RegistryDescriptor) -> Result<(), StateError> {
        let dir = state_dir_at(&self.home);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            set_dir_permissions(&dir)?;
        }

        let path = state_path_at(&self.home, key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(descriptor)?;
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    fn load(&self, key: &WorkspaceKey) -> Result<Option<RegistryDescriptor>, StateError> {
        let path = state_path_at(&self.home, key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StateError::Parse {
                path,
                source: Box::new(e),
            })
    }

    fn clear(&self, key: &WorkspaceKey) -> Result<(), StateError> {
        let path = state_path_at(&self.home, key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. In-memory store
// ---------------------------------------------------------------------------

/// Non-durable store for embedding hosts that persist state themselves.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<WorkspaceKey, RegistryDescriptor>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<WorkspaceKey, RegistryDescriptor>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, key: &WorkspaceKey, descriptor: &RegistryDescriptor) -> Result<(), StateError> {
        self.records().insert(key.clone(), descriptor.clone());
        Ok(())
    }

    fn load(&self, key: &WorkspaceKey) -> Result<Option<RegistryDescriptor>, StateError> {
        Ok(self.records().get(key).cloned())
    }

    fn clear(&self, key: &WorkspaceKey) -> Result<(), StateError> {
        self.records().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StateError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StateError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
