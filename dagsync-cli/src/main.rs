//! dagsync: Git-backed sync for DAGs, skills, souls and memory files.
//!
//! # Usage
//!
//! ```text
//! dagsync status [--json]
//! dagsync pull
//! dagsync publish <id> [-m <msg>] [--force]
//! dagsync publish --all [-m <msg>] [ids..]
//! dagsync discard <id>
//! dagsync forget <ids..>
//! dagsync cleanup [--dry-run]
//! dagsync delete <id> [-m <msg>] [--force]
//! dagsync delete --all-missing [-m <msg>] [--dry-run]
//! dagsync mv <old> <new> [-m <msg>] [--force] [--dry-run]
//! dagsync diff <id>
//! dagsync config show|set
//! dagsync test-connection
//! dagsync daemon start|stop|status
//! ```

mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand,
    daemon::DaemonCommand,
    diff::DiffArgs,
    local::{CleanupArgs, DiscardArgs, ForgetArgs},
    remove::{DeleteArgs, MoveArgs},
    status::StatusArgs,
    sync::{PublishArgs, PullArgs},
    Workspace,
};
use dagsync_core::AuthType;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dagsync",
    version,
    about = "Synchronize DAGs, skills, souls and memory with a Git repository",
    long_about = None,
)]
struct Cli {
    /// Directory holding the local items (default: ~/.dagsync/items).
    #[arg(long, global = true, env = "DAGSYNC_ITEMS_DIR", value_name = "DIR")]
    items_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the sync state of every item.
    Status(StatusArgs),

    /// Fetch the remote and apply remote-only changes locally.
    Pull(PullArgs),

    /// Commit and push local changes.
    Publish(PublishArgs),

    /// Throw away local changes to an item.
    Discard(DiscardArgs),

    /// Stop tracking items without touching files or the remote.
    Forget(ForgetArgs),

    /// Forget every item whose local file is gone.
    Cleanup(CleanupArgs),

    /// Delete an item from the remote and locally.
    Delete(DeleteArgs),

    /// Rename an item on the remote and locally.
    Mv(MoveArgs),

    /// Show local changes against the remote copy of an item.
    Diff(DiffArgs),

    /// Show or change the sync configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Check that the configured remote is reachable.
    TestConnection,

    /// Run or control the background auto-sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared AuthType argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `AuthType` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthTypeArg(pub AuthType);

impl FromStr for AuthTypeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self(AuthType::None)),
            "token" => Ok(Self(AuthType::Token)),
            "ssh" => Ok(Self(AuthType::Ssh)),
            other => Err(format!(
                "unknown auth type '{other}'; expected: none, token, ssh"
            )),
        }
    }
}

impl fmt::Display for AuthTypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            AuthType::None => write!(f, "none"),
            AuthType::Token => write!(f, "token"),
            AuthType::Ssh => write!(f, "ssh"),
        }
    }
}

impl From<AuthTypeArg> for AuthType {
    fn from(arg: AuthTypeArg) -> Self {
        arg.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    // the daemon installs its own subscriber
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        init_tracing();
    }

    let workspace = Workspace::resolve(cli.items_dir)?;
    match cli.command {
        Commands::Status(args) => args.run(&workspace),
        Commands::Pull(args) => args.run(&workspace),
        Commands::Publish(args) => args.run(&workspace),
        Commands::Discard(args) => args.run(&workspace),
        Commands::Forget(args) => args.run(&workspace),
        Commands::Cleanup(args) => args.run(&workspace),
        Commands::Delete(args) => args.run(&workspace),
        Commands::Mv(args) => args.run(&workspace),
        Commands::Diff(args) => args.run(&workspace),
        Commands::Config { command } => commands::config::run(command, &workspace),
        Commands::TestConnection => commands::config::test_connection(&workspace),
        Commands::Daemon { command } => commands::daemon::run(command, &workspace),
    }
}

/// Warnings and errors go to stderr so `--json` output stays clean.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
