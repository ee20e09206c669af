//! # teamrules-sync
//!
//! Sparse checkout, symlink projection and git status for a team rules
//! registry.
//!
//! [`RegistryEngine`] is the entry point collaborators hold on to. The
//! building blocks it composes are public so hosts can drive them directly:
//! [`process`] spawns the version-control tool, [`fetcher`] performs the
//! sparse clone, [`enumerate`] lists rule files, [`projector`] links them into
//! the workspace and [`status`] answers local/remote status queries.

pub mod engine;
pub mod enumerate;
pub mod error;
pub mod fetcher;
pub mod ignore_file;
pub mod process;
pub mod projector;
pub mod status;

pub use engine::{AddResult, RegistryEngine, RestoreResult};
pub use error::SyncError;
pub use process::{Git, ProcessError, ProcessRunner, SystemRunner};
pub use projector::{LinkOutcome, ProjectionReport, Projector};
