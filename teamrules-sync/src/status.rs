//! Status engine: local and remote status of checkout files, and the
//! mutating git sequences (commit, push, pull, fetch + rebase + push).
//!
//! All functions take repository-relative, `/`-separated paths and run git
//! inside the checkout directory. Read functions degrade to conservative
//! defaults instead of failing; mutating functions surface the tool's stderr.

use std::path::Path;

use teamrules_core::{DetailedFileStatus, FileStatus, RemoteStatus};

use crate::error::SyncError;
use crate::process::{Git, ProcessError};

/// Two-character porcelain codes that mark an unmerged path.
const CONFLICT_CODES: [&str; 7] = ["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

// ---------------------------------------------------------------------------
// Porcelain parsing
// ---------------------------------------------------------------------------

/// The `XY` code of one `status --porcelain` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PorcelainCode {
    /// Index (staged) column.
    pub index: char,
    /// Work-tree (unstaged) column.
    pub worktree: char,
}

impl PorcelainCode {
    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    pub fn is_conflict(&self) -> bool {
        let code: String = [self.index, self.worktree].iter().collect();
        CONFLICT_CODES.contains(&code.as_str())
    }

    pub fn has_unstaged(&self) -> bool {
        self.worktree != ' '
    }

    pub fn has_uncommitted(&self) -> bool {
        self.index != ' ' || self.worktree != ' '
    }

    pub fn file_status(&self) -> FileStatus {
        if self.is_untracked() {
            FileStatus::Untracked
        } else if self.has_uncommitted() {
            FileStatus::Modified
        } else {
            FileStatus::Unmodified
        }
    }
}

/// First status code in porcelain output; `None` means a clean path.
pub fn parse_porcelain(output: &str) -> Option<PorcelainCode> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| {
            let mut chars = line.chars();
            let index = chars.next()?;
            let worktree = chars.next()?;
            Some(PorcelainCode { index, worktree })
        })
}

/// Parse `rev-list --left-right --count <upstream>...HEAD` as `(behind, ahead)`.
pub fn parse_left_right(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some((behind, ahead))
}

// ---------------------------------------------------------------------------
// Local status
// ---------------------------------------------------------------------------

/// Porcelain code of a single path, `None` when it is clean.
pub fn porcelain_code(
    git: &Git<'_>,
    repo: &Path,
    path: &str,
) -> Result<Option<PorcelainCode>, ProcessError> {
    let out = git.run(repo, &["status", "--porcelain", "--", path])?;
    Ok(parse_porcelain(&out))
}

/// Coarse status of one path.
pub fn file_status(git: &Git<'_>, repo: &Path, path: &str) -> Result<FileStatus, ProcessError> {
    Ok(porcelain_code(git, repo, path)?
        .map(|code| code.file_status())
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Remote status
// ---------------------------------------------------------------------------

/// Branch/upstream relationship of the checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracking {
    pub branch: Option<String>,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub remote_status: RemoteStatus,
    pub head_hash: Option<String>,
    pub upstream_hash: Option<String>,
}

/// Resolve the current branch, its upstream and the ahead/behind counts.
///
/// Every failure degrades: no branch or no upstream yields `no-remote`.
pub fn tracking(git: &Git<'_>, repo: &Path) -> Tracking {
    let branch = match git.run_trimmed(repo, &["rev-parse", "--abbrev-ref", "HEAD"]) {
        Ok(branch) if !branch.is_empty() && branch != "HEAD" => branch,
        Ok(_) => {
            tracing::debug!("detached HEAD; no upstream");
            return Tracking::default();
        }
        Err(err) => {
            tracing::debug!(error = %err, "current branch unresolved");
            return Tracking::default();
        }
    };

    let upstream_ref = format!("{branch}@{{upstream}}");
    let upstream = match git.run_trimmed(repo, &["rev-parse", "--abbrev-ref", &upstream_ref]) {
        Ok(upstream) if !upstream.is_empty() => upstream,
        _ => {
            return Tracking {
                branch: Some(branch),
                ..Tracking::default()
            }
        }
    };

    let range = format!("{upstream}...HEAD");
    let counts = git
        .run_trimmed(repo, &["rev-list", "--left-right", "--count", &range])
        .ok()
        .and_then(|out| parse_left_right(&out));
    let Some((behind, ahead)) = counts else {
        tracing::warn!(upstream = %upstream, "ahead/behind counts unavailable");
        return Tracking {
            branch: Some(branch),
            ..Tracking::default()
        };
    };

    Tracking {
        head_hash: resolve_hash(git, repo, "HEAD"),
        upstream_hash: resolve_hash(git, repo, &upstream),
        branch: Some(branch),
        upstream: Some(upstream),
        ahead,
        behind,
        remote_status: RemoteStatus::classify(ahead, behind),
    }
}

fn resolve_hash(git: &Git<'_>, repo: &Path, rev: &str) -> Option<String> {
    git.run_trimmed(repo, &["rev-parse", rev])
        .ok()
        .filter(|hash| !hash.is_empty())
}

/// Full status of one path. Never fails.
pub fn detailed_file_status(git: &Git<'_>, repo: &Path, path: &str) -> DetailedFileStatus {
    let tracking = tracking(git, repo);
    detailed_with_tracking(git, repo, path, &tracking)
}

/// Full status of one path against an already resolved [`Tracking`], so
/// aggregate queries resolve the branch relationship only once.
pub fn detailed_with_tracking(
    git: &Git<'_>,
    repo: &Path,
    path: &str,
    tracking: &Tracking,
) -> DetailedFileStatus {
    let mut status = DetailedFileStatus::default();

    match porcelain_code(git, repo, path) {
        Ok(Some(code)) => {
            status.local_status = code.file_status();
            status.has_unstaged_changes = code.has_unstaged();
            status.has_uncommitted_changes = code.has_uncommitted();
            status.has_conflicts = code.is_conflict();
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(path, error = %err, "local status unavailable"),
    }

    if tracking.upstream.is_none() {
        return status;
    }
    status.remote_status = tracking.remote_status;
    status.ahead = tracking.ahead;
    status.behind = tracking.behind;
    status.last_commit_hash = tracking.head_hash.clone();
    status.remote_commit_hash = tracking.upstream_hash.clone();
    status.commit_message = git
        .run_trimmed(repo, &["log", "-1", "--pretty=format:%s", "--", path])
        .ok()
        .filter(|msg| !msg.is_empty());
    status
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Stage exactly `path` and commit it with `message`.
pub fn stage_and_commit(
    git: &Git<'_>,
    repo: &Path,
    path: &str,
    message: &str,
) -> Result<(), SyncError> {
    if message.trim().is_empty() {
        return Err(SyncError::EmptyCommitMessage);
    }
    git.run(repo, &["add", "--", path])?;
    git.run(repo, &["commit", "-m", message])?;
    tracing::info!(path, "committed rule file");
    Ok(())
}

pub fn push(git: &Git<'_>, repo: &Path) -> Result<(), SyncError> {
    git.run(repo, &["push"])?;
    tracing::info!("pushed registry changes");
    Ok(())
}

pub fn pull(git: &Git<'_>, repo: &Path) -> Result<(), SyncError> {
    git.run(repo, &["pull"])?;
    tracing::info!("pulled registry changes");
    Ok(())
}

/// `fetch`, then `rebase`, then `push`. Stops at the first failure and leaves the
/// repository in whatever state git left it for manual resolution.
pub fn fetch_rebase_push(git: &Git<'_>, repo: &Path) -> Result<(), SyncError> {
    for step in [&["fetch"][..], &["rebase"][..], &["push"][..]] {
        if let Err(err) = git.run(repo, step) {
            tracing::warn!(step = step[0], error = %err, "fetch-rebase-push aborted");
            return Err(err.into());
        }
    }
    tracing::info!("rebased onto upstream and pushed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
