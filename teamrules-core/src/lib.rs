//! Teamrules core library: domain types, state persistence, config, errors.
//!
//! Public API surface:
//! - [`types`]: descriptor, status enums, workspace key, events
//! - [`error`]: [`StateError`]
//! - [`state`]: [`StateStore`] and its file / in-memory implementations
//! - [`config`]: [`EngineConfig`] loaded from `~/.teamrules/config.yaml`

pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::EngineConfig;
pub use error::StateError;
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use types::{
    DetailedFileStatus, FileStatus, FileStatusEntry, RegistryDescriptor, RegistryEvent, RegistryStatus,
    RemoteStatus, WorkspaceKey,
};
