//! `teamrules status`: local and remote state of the registry files.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use teamrules_core::{DetailedFileStatus, FileStatus, RegistryStatus, RemoteStatus};

use super::{require_registry, GlobalArgs};

/// Arguments for `teamrules status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Report a single workspace-relative file instead of the whole registry.
    pub path: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileStatusJson<'a> {
    path: &'a str,
    #[serde(flatten)]
    status: &'a DetailedFileStatus,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let engine = global.restored_engine()?;
        require_registry(&engine)?;

        if let Some(path) = self.path.as_deref() {
            let repo_path = engine.repo_path(path)?;
            let status = engine.detailed_file_status(&repo_path);
            if self.json {
                let payload = FileStatusJson {
                    path: &repo_path,
                    status: &status,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload).context("failed to serialize status")?
                );
            } else {
                print_file(&repo_path, &status);
            }
            return Ok(());
        }

        let status = engine.registry_status();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status")?
            );
            return Ok(());
        }
        print_table(&status);
        Ok(())
    }
}

fn print_file(path: &str, status: &DetailedFileStatus) {
    println!("{}", path.bold());
    println!("  local   {}", local_label(status.local_status));
    println!("  remote  {}", remote_label(status.remote_status));
    let detail = detail(status);
    if !detail.is_empty() {
        println!("  detail  {detail}");
    }
    if let Some(hash) = &status.last_commit_hash {
        println!("  head    {}", short_hash(hash));
    }
    if let Some(hash) = &status.remote_commit_hash {
        println!("  remote  {}", short_hash(hash));
    }
    if let Some(message) = &status.commit_message {
        println!("  last    {message}");
    }
}

fn print_table(status: &RegistryStatus) {
    let branch = status.branch.as_deref().unwrap_or("(detached)");
    println!(
        "Teamrules v{} | branch {} | {} | {} files | {} changed",
        env!("CARGO_PKG_VERSION"),
        branch,
        remote_summary(status),
        status.files.len(),
        status.changed_count(),
    );

    if status.files.is_empty() {
        println!("No rule files in the registry.");
        return;
    }

    let rows: Vec<StatusTableRow> = status
        .files
        .iter()
        .map(|entry| StatusTableRow {
            path: entry.path.clone(),
            local: local_label(entry.status.local_status),
            remote: remote_label(entry.status.remote_status),
            detail: detail(&entry.status),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if status.conflicted_count() > 0 {
        println!(
            "{}",
            "Resolve conflicts in the checkout before pushing.".red().bold()
        );
    } else if status.remote_status == RemoteStatus::Diverged {
        println!("Run 'teamrules sync' to rebase onto the remote and push.");
    } else if status.remote_status == RemoteStatus::Behind {
        println!("Run 'teamrules pull' to fetch the latest rules.");
    }
}

fn remote_summary(status: &RegistryStatus) -> String {
    match status.remote_status {
        RemoteStatus::NoRemote => "no upstream".to_string(),
        RemoteStatus::UpToDate => "up to date".to_string(),
        _ => format!("↑{} ↓{}", status.ahead, status.behind),
    }
}

fn local_label(status: FileStatus) -> String {
    let label = status.to_string();
    match status {
        FileStatus::Unmodified => label.green().to_string(),
        FileStatus::Modified => label.yellow().bold().to_string(),
        FileStatus::Untracked => label.magenta().to_string(),
    }
}

fn remote_label(status: RemoteStatus) -> String {
    let label = status.to_string();
    match status {
        RemoteStatus::UpToDate => label.green().to_string(),
        RemoteStatus::Ahead => label.cyan().to_string(),
        RemoteStatus::Behind => label.yellow().to_string(),
        RemoteStatus::Diverged => label.red().bold().to_string(),
        RemoteStatus::NoRemote => label.bright_black().to_string(),
    }
}

fn detail(status: &DetailedFileStatus) -> String {
    let mut parts = Vec::new();
    if status.has_conflicts {
        parts.push("conflict".to_string());
    }
    if status.has_unstaged_changes {
        parts.push("unstaged".to_string());
    } else if status.has_uncommitted_changes {
        parts.push("staged".to_string());
    }
    if status.ahead > 0 {
        parts.push(format!("{} ahead", status.ahead));
    }
    if status.behind > 0 {
        parts.push(format!("{} behind", status.behind));
    }
    parts.join(", ")
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
