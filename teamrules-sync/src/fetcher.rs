//! Sparse fetcher: clone a remote without a working tree and materialise
//! only the tracked subtree.
//!
//! Steps, in strict order (any failure aborts the rest):
//!
//! 1. `clone --no-checkout -- <url> {storage}/repo`
//! 2. `sparse-checkout set <subtree>`
//! 3. resolve the default branch from `refs/remotes/origin/HEAD` (fallback `main`)
//! 4. `checkout <branch>`
//! 5. verify `{storage}/repo/{subtree}` exists
//!
//! A failure at any step removes `{storage}/repo` before the error propagates.

use std::path::Path;

use teamrules_core::types::{join_slash_path, CHECKOUT_DIR};

use crate::error::{io_err, SyncError};
use crate::process::Git;

/// Branch used when the remote HEAD cannot be resolved.
pub const FALLBACK_BRANCH: &str = "main";

const REMOTE_HEAD_PREFIX: &str = "refs/remotes/origin/";

/// Clone `remote_url` into `{storage_location}/repo` as a sparse checkout of
/// `subtree`. Returns the checked-out branch name.
pub fn clone_sparse(
    git: &Git<'_>,
    remote_url: &str,
    storage_location: &Path,
    subtree: &str,
) -> Result<String, SyncError> {
    let repo = storage_location.join(CHECKOUT_DIR);

    std::fs::create_dir_all(storage_location).map_err(|e| io_err(storage_location, e))?;
    if repo.exists() {
        std::fs::remove_dir_all(&repo).map_err(|e| io_err(&repo, e))?;
    }

    match clone_steps(git, remote_url, storage_location, &repo, subtree) {
        Ok(branch) => {
            tracing::info!(remote = remote_url, branch = %branch, subtree, "sparse checkout ready");
            Ok(branch)
        }
        Err(err) => {
            if repo.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(&repo) {
                    tracing::warn!(
                        path = %repo.display(),
                        error = %cleanup,
                        "failed to remove partial clone"
                    );
                }
            }
            Err(err)
        }
    }
}

fn clone_steps(
    git: &Git<'_>,
    remote_url: &str,
    storage_location: &Path,
    repo: &Path,
    subtree: &str,
) -> Result<String, SyncError> {
    let repo_arg = repo.to_string_lossy();
    git.run(
        storage_location,
        &["clone", "--no-checkout", "--", remote_url, &repo_arg],
    )?;
    git.run(repo, &["sparse-checkout", "set", subtree])?;

    let branch = default_branch(git, repo);
    git.run(repo, &["checkout", &branch])?;

    if !join_slash_path(repo, subtree).is_dir() {
        return Err(SyncError::MissingSubtree {
            subtree: subtree.to_string(),
        });
    }
    Ok(branch)
}

/// Default branch of `origin`, derived from its symbolic HEAD ref.
///
/// Falls back to [`FALLBACK_BRANCH`] when the ref is missing or unparsable.
pub fn default_branch(git: &Git<'_>, repo: &Path) -> String {
    match git.run_trimmed(repo, &["symbolic-ref", "refs/remotes/origin/HEAD"]) {
        Ok(reference) => match reference.strip_prefix(REMOTE_HEAD_PREFIX) {
            Some(branch) if !branch.is_empty() => branch.to_string(),
            _ => {
                tracing::debug!(reference = %reference, "unexpected remote HEAD, using fallback");
                FALLBACK_BRANCH.to_string()
            }
        },
        Err(err) => {
            tracing::debug!(error = %err, "remote HEAD unresolved, using fallback");
            FALLBACK_BRANCH.to_string()
        }
    }
}
