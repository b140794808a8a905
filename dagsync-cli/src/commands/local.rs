//! Local-only commands: `discard`, `forget`, `cleanup`.

use anyhow::{Context, Result};
use clap::Args;

use dagsync_core::{ItemId, SyncStatus};
use dagsync_engine::{CancellationToken, SyncCoordinator};

use super::Workspace;

/// Arguments for `dagsync discard`.
#[derive(Args, Debug)]
pub struct DiscardArgs {
    /// Item whose local changes are thrown away.
    pub id: String,
}

impl DiscardArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        workspace
            .coordinator()?
            .discard(&CancellationToken::new(), &self.id)
            .with_context(|| format!("discard failed for '{}'", self.id))?;
        println!("✓ discarded local changes to '{}'", self.id);
        Ok(())
    }
}

/// Arguments for `dagsync forget`.
#[derive(Args, Debug)]
pub struct ForgetArgs {
    /// Items to stop tracking.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

impl ForgetArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let forgotten = workspace
            .coordinator()?
            .forget(&CancellationToken::new(), &self.ids)
            .context("forget failed")?;
        print_ids("forgot", &forgotten);
        Ok(())
    }
}

/// Arguments for `dagsync cleanup`.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// List what would be forgotten without changing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CleanupArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let coordinator = workspace.coordinator()?;
        if self.dry_run {
            let missing = missing_items(&coordinator)?;
            print_ids("[dry-run] would forget", &missing);
            return Ok(());
        }

        let forgotten = coordinator
            .cleanup(&CancellationToken::new())
            .context("cleanup failed")?;
        print_ids("forgot", &forgotten);
        Ok(())
    }
}

/// Items whose local file is gone, as the status view sees them.
pub fn missing_items(coordinator: &SyncCoordinator) -> Result<Vec<ItemId>> {
    let status = coordinator
        .status()
        .context("failed to compute sync status")?;
    Ok(status
        .items
        .into_values()
        .filter(|item| item.status == SyncStatus::Missing)
        .map(|item| item.item_id)
        .collect())
}

pub fn print_ids(verb: &str, ids: &[ItemId]) {
    if ids.is_empty() {
        println!("✓ nothing to do");
        return;
    }
    println!("✓ {verb} {} item(s)", ids.len());
    for id in ids {
        println!("  ·  {id}");
    }
}
