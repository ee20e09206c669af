//! Symlink projector: make checkout files appear inside the workspace.
//!
//! Deep-merge policy: a real file or directory at a link location always wins.
//! The projector only ever creates, replaces or removes symbolic links; it
//! never deletes or overwrites anything else, on projection or on teardown.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use teamrules_core::types::{join_slash_path, CHECKOUT_DIR};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Outcome of projecting or removing a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// No link existed; one was created.
    Created { path: PathBuf },
    /// A correct link was already in place.
    Unchanged { path: PathBuf },
    /// A link pointing elsewhere (or dangling) was replaced.
    Repaired { path: PathBuf },
    /// A regular file occupies the link location and was left alone.
    SkippedRegularFile { path: PathBuf },
    /// A directory occupies the link location and was left alone.
    SkippedDirectory { path: PathBuf },
    /// The checkout does not contain the enumerated file; no link created.
    MissingTarget { path: PathBuf, target: PathBuf },
    /// Teardown removed the link.
    Removed { path: PathBuf },
    /// Teardown found a non-link at the location and kept it.
    Kept { path: PathBuf },
    /// Teardown found nothing at the location.
    Absent { path: PathBuf },
}

impl LinkOutcome {
    pub fn path(&self) -> &Path {
        match self {
            LinkOutcome::Created { path }
            | LinkOutcome::Unchanged { path }
            | LinkOutcome::Repaired { path }
            | LinkOutcome::SkippedRegularFile { path }
            | LinkOutcome::SkippedDirectory { path }
            | LinkOutcome::MissingTarget { path, .. }
            | LinkOutcome::Removed { path }
            | LinkOutcome::Kept { path }
            | LinkOutcome::Absent { path } => path,
        }
    }

    /// Whether the filesystem was changed.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            LinkOutcome::Created { .. } | LinkOutcome::Repaired { .. } | LinkOutcome::Removed { .. }
        )
    }

    /// Whether a projected file is not reachable through a link.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            LinkOutcome::SkippedRegularFile { .. }
                | LinkOutcome::SkippedDirectory { .. }
                | LinkOutcome::MissingTarget { .. }
        )
    }
}

/// Per-file outcomes of a projector pass, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    pub outcomes: Vec<LinkOutcome>,
}

impl ProjectionReport {
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_change()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skip()).count()
    }

    /// Links that are in place after the pass (created, repaired or unchanged).
    pub fn linked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    LinkOutcome::Created { .. }
                        | LinkOutcome::Repaired { .. }
                        | LinkOutcome::Unchanged { .. }
                )
            })
            .count()
    }
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Projects registry files into one workspace.
#[derive(Debug, Clone)]
pub struct Projector {
    workspace_root: PathBuf,
    subtree_root: PathBuf,
}

impl Projector {
    /// `subtree` is the `/`-separated tracked subtree; teardown never prunes
    /// directories above `{workspace_root}/{subtree}`.
    pub fn new(workspace_root: impl Into<PathBuf>, subtree: &str) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            subtree_root: join_slash_path(&workspace_root, subtree),
            workspace_root,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Link every file of `{storage_location}/repo` into the workspace.
    pub fn project(
        &self,
        storage_location: &Path,
        files: &[String],
    ) -> Result<ProjectionReport, SyncError> {
        let checkout = storage_location.join(CHECKOUT_DIR);
        let mut report = ProjectionReport::default();
        for file in files {
            let target = join_slash_path(&checkout, file);
            let link = join_slash_path(&self.workspace_root, file);
            report.outcomes.push(link_one(&target, &link)?);
        }
        tracing::debug!(
            changed = report.changed(),
            skipped = report.skipped(),
            "projection pass complete"
        );
        Ok(report)
    }

    /// Recreate missing or stale links. Idempotent: a second call on a
    /// healthy projection changes nothing.
    pub fn verify_and_repair(
        &self,
        storage_location: &Path,
        files: &[String],
    ) -> Result<ProjectionReport, SyncError> {
        let report = self.project(storage_location, files)?;
        if report.changed() > 0 {
            tracing::info!(repaired = report.changed(), "repaired projected links");
        }
        Ok(report)
    }

    /// Remove the links for `files`. Non-link entries survive untouched.
    pub fn unproject(&self, files: &[String]) -> Result<ProjectionReport, SyncError> {
        let mut report = ProjectionReport::default();
        for file in files {
            let link = join_slash_path(&self.workspace_root, file);
            let outcome = match std::fs::symlink_metadata(&link) {
                Err(e) if e.kind() == ErrorKind::NotFound => LinkOutcome::Absent { path: link },
                Err(e) => return Err(io_err(&link, e)),
                Ok(meta) if meta.file_type().is_symlink() => {
                    remove_link(&link)?;
                    self.prune_empty_parents(&link);
                    LinkOutcome::Removed { path: link }
                }
                Ok(_) => {
                    tracing::info!(path = %link.display(), "keeping local file on teardown");
                    LinkOutcome::Kept { path: link }
                }
            };
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Remove directories left empty by teardown, up to and including the
    /// subtree root. Its ancestors and the workspace root are never touched.
    fn prune_empty_parents(&self, link: &Path) {
        let mut current = link.parent();
        while let Some(dir) = current {
            if dir == self.workspace_root || !dir.starts_with(&self.subtree_root) {
                break;
            }
            let empty = std::fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty || std::fs::remove_dir(dir).is_err() {
                break;
            }
            if dir == self.subtree_root {
                break;
            }
            current = dir.parent();
        }
    }
}

fn link_one(target: &Path, link: &Path) -> Result<LinkOutcome, SyncError> {
    if !target.exists() {
        tracing::warn!(
            target = %target.display(),
            "enumerated file missing from checkout; not linking"
        );
        return Ok(LinkOutcome::MissingTarget {
            path: link.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let meta = match std::fs::symlink_metadata(link) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            create_link(target, link)?;
            tracing::debug!(path = %link.display(), "linked");
            return Ok(LinkOutcome::Created {
                path: link.to_path_buf(),
            });
        }
        Err(e) => return Err(io_err(link, e)),
    };

    let file_type = meta.file_type();
    if file_type.is_symlink() {
        let current = std::fs::read_link(link).map_err(|e| io_err(link, e))?;
        if current == target {
            return Ok(LinkOutcome::Unchanged {
                path: link.to_path_buf(),
            });
        }
        remove_link(link)?;
        create_link(target, link)?;
        tracing::info!(
            path = %link.display(),
            previous = %current.display(),
            "replaced stale link"
        );
        return Ok(LinkOutcome::Repaired {
            path: link.to_path_buf(),
        });
    }

    if file_type.is_dir() {
        tracing::warn!(path = %link.display(), "directory occupies link location; skipping");
        return Ok(LinkOutcome::SkippedDirectory {
            path: link.to_path_buf(),
        });
    }

    tracing::info!(path = %link.display(), "local file takes precedence; skipping");
    Ok(LinkOutcome::SkippedRegularFile {
        path: link.to_path_buf(),
    })
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<(), SyncError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| io_err(link, e))
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> Result<(), SyncError> {
    std::os::windows::fs::symlink_file(target, link).map_err(|e| io_err(link, e))
}

fn remove_link(link: &Path) -> Result<(), SyncError> {
    std::fs::remove_file(link).map_err(|e| io_err(link, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
