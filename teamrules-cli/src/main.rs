//! Teamrules: share a team's rule files across workspaces.
//!
//! # Usage
//!
//! ```text
//! teamrules [--workspace <dir>] [--git <binary>] [-v|-vv] <command>
//!
//! teamrules add <url>
//! teamrules remove
//! teamrules show [--json]
//! teamrules restore
//! teamrules status [<path>] [--json]
//! teamrules commit <path> -m <message>
//! teamrules push | pull | sync
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    add::AddArgs, commit::CommitArgs, remote::RemoteCommand, show::ShowArgs,
    status::StatusArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "teamrules",
    version,
    about = "Link a team's shared rule files into your workspace",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a rules registry and link its files into the workspace.
    Add(AddArgs),

    /// Remove the active registry, its checkout and its links.
    Remove,

    /// Show the active registry.
    Show(ShowArgs),

    /// Re-create missing or stale links for the persisted registry.
    Restore,

    /// Show local and remote status of the registry files.
    Status(StatusArgs),

    /// Stage and commit one registry file.
    Commit(CommitArgs),

    /// Push committed changes to the registry remote.
    Push,

    /// Pull remote changes and refresh the links.
    Pull,

    /// Fetch, rebase onto the remote and push.
    Sync,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = cli.global;
    match cli.command {
        Commands::Add(args) => args.run(&global),
        Commands::Remove => commands::remove::run(&global),
        Commands::Show(args) => args.run(&global),
        Commands::Restore => commands::restore::run(&global),
        Commands::Status(args) => args.run(&global),
        Commands::Commit(args) => args.run(&global),
        Commands::Push => commands::remote::run(&global, RemoteCommand::Push),
        Commands::Pull => commands::remote::run(&global, RemoteCommand::Pull),
        Commands::Sync => commands::remote::run(&global, RemoteCommand::Sync),
    }
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
