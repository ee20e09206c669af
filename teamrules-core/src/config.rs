//! Engine configuration, read from `~/.teamrules/config.yaml`.
//!
//! Every field is optional; a missing file yields [`EngineConfig::default`].
//!
//! ```yaml
//! subtree: .cursor/rules
//! extensions: [mdc, md]
//! git_binary: /usr/local/bin/git
//! manage_gitignore: false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StateError};
use crate::state::root_at;

pub const DEFAULT_SUBTREE: &str = ".cursor/rules";
pub const DEFAULT_EXTENSION: &str = "mdc";
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Tunables for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Repository subtree that is checked out and projected, `/`-separated.
    pub subtree: String,
    /// Rule file extensions, matched case-insensitively.
    pub extensions: Vec<String>,
    /// Version-control binary to spawn.
    pub git_binary: String,
    /// Add `<subtree>/` to the workspace `.gitignore` while a registry is active.
    pub manage_gitignore: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subtree: DEFAULT_SUBTREE.to_string(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            git_binary: DEFAULT_GIT_BINARY.to_string(),
            manage_gitignore: true,
        }
    }
}

impl EngineConfig {
    /// Subtree with separators normalised and surrounding slashes removed.
    pub fn normalized_subtree(&self) -> String {
        self.subtree
            .replace('\\', "/")
            .trim_start_matches("./")
            .trim_matches('/')
            .to_string()
    }

    /// The `.gitignore` line that hides projected links from the workspace repo.
    pub fn ignore_entry(&self) -> String {
        format!("{}/", self.normalized_subtree())
    }
}

/// `<home>/.teamrules/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

/// Load the config rooted at `home`, falling back to defaults when absent.
pub fn load_at(home: &Path) -> Result<EngineConfig, StateError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| StateError::Parse {
        path,
        source: Box::new(e),
    })
}

/// Write the config atomically (`.yaml.tmp` + rename).
pub fn save_at(home: &Path, config: &EngineConfig) -> Result<(), StateError> {
    let path = config_path_at(home);
    let dir = root_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
