pub mod config;
pub mod daemon;
pub mod diff;
pub mod local;
pub mod remove;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use dagsync_core::SyncResult;
use dagsync_engine::SyncCoordinator;

/// Where the CLI finds its state: the home directory and the item root.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub home: PathBuf,
    pub items_dir: Option<PathBuf>,
}

impl Workspace {
    pub fn resolve(items_dir: Option<PathBuf>) -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(Self { home, items_dir })
    }

    pub fn coordinator(&self) -> Result<SyncCoordinator> {
        SyncCoordinator::open_at(&self.home, self.items_dir.clone())
            .context("failed to open dagsync state")
    }
}

/// Print a pull or publish outcome; a failed result becomes the error.
pub fn report(result: &SyncResult) -> Result<()> {
    let mark = if result.success {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("{mark} {}", result.message);

    for id in &result.synced {
        println!("  ✎  {id}");
    }
    for id in &result.modified {
        println!("  ~  {id} {}", "(local changes kept)".bright_black());
    }
    for id in &result.conflicts {
        println!("  {}  {id} {}", "!".yellow().bold(), "conflict".yellow());
    }
    for error in &result.errors {
        println!("  {}  {}: {}", "✗".red(), error.item_id, error.message);
    }

    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

/// `42s`, `5m`, `3h`, `2d`.
pub fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

pub fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
