//! `dagsync delete` and `dagsync mv`.

use anyhow::{bail, Context, Result};
use clap::Args;

use dagsync_core::{config, ItemId};
use dagsync_engine::CancellationToken;

use super::local::{missing_items, print_ids};
use super::Workspace;

/// Arguments for `dagsync delete`.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Published item to delete (omit when using `--all-missing`).
    pub id: Option<String>,

    /// Delete every item whose local file is gone, in one commit.
    #[arg(long, conflicts_with = "id")]
    pub all_missing: bool,

    /// Commit message.
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Delete even with unpublished local changes or a newer remote version.
    #[arg(long, conflicts_with = "all_missing")]
    pub force: bool,

    /// List what would be deleted without changing anything.
    #[arg(long, requires = "all_missing")]
    pub dry_run: bool,
}

impl DeleteArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let coordinator = workspace.coordinator()?;
        let cancel = CancellationToken::new();

        if self.all_missing {
            if self.dry_run {
                let missing = missing_items(&coordinator)?;
                print_ids("[dry-run] would delete", &missing);
                return Ok(());
            }
            let deleted = coordinator
                .delete_all_missing(&cancel, self.message.as_deref())
                .context("delete --all-missing failed")?;
            print_ids("deleted", &deleted);
            return Ok(());
        }

        let Some(id) = self.id else {
            bail!("provide an item id or use --all-missing");
        };
        coordinator
            .delete(&cancel, &id, self.message.as_deref(), self.force)
            .with_context(|| format!("delete failed for '{id}'"))?;
        println!("✓ deleted '{id}'");
        Ok(())
    }
}

/// Arguments for `dagsync mv`.
#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Current item id.
    pub old_id: String,

    /// New item id, of the same kind.
    pub new_id: String,

    /// Commit message.
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Move even if the remote changed since the last sync.
    #[arg(long)]
    pub force: bool,

    /// Show the rename without changing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl MoveArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        if self.dry_run {
            let old = ItemId::parse(self.old_id.as_str())?;
            let new = ItemId::parse(self.new_id.as_str())?;
            if old.kind() != new.kind() {
                bail!("cannot move a {} to a {}", old.kind(), new.kind());
            }
            let config = config::load_at(&workspace.home).context("failed to load sync config")?;
            println!("[dry-run] would move '{old}' to '{new}'");
            println!("  -  {}", config.remote_path(&old));
            println!("  +  {}", config.remote_path(&new));
            return Ok(());
        }

        workspace
            .coordinator()?
            .move_item(
                &CancellationToken::new(),
                &self.old_id,
                &self.new_id,
                self.message.as_deref(),
                self.force,
            )
            .with_context(|| format!("move failed for '{}'", self.old_id))?;
        println!("✓ moved '{}' to '{}'", self.old_id, self.new_id);
        Ok(())
    }
}
