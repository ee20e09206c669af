//! Error types for teamrules-sync.

use std::path::PathBuf;

use thiserror::Error;

use teamrules_core::StateError;

use crate::process::ProcessError;

/// All errors that can arise from registry sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The version-control tool failed; carries its stderr.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// An error from the state store or config layer.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cloned repository does not contain the tracked subtree.
    #[error("no tracked subtree found: '{subtree}' does not exist in the repository")]
    MissingSubtree { subtree: String },

    /// A mutating operation was requested while no registry is active.
    #[error("no team registry is active for this workspace")]
    NoActiveRegistry,

    #[error("remote URL must not be empty")]
    EmptyRemoteUrl,

    #[error("commit message must not be empty")]
    EmptyCommitMessage,

    /// A file path that does not belong to the tracked subtree.
    #[error("'{path}' is not inside the tracked subtree '{subtree}'")]
    PathOutsideSubtree { path: String, subtree: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
