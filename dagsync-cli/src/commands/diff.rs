//! `dagsync diff <id>`: local content against the last known remote copy.

use anyhow::{Context, Result};
use clap::Args;

use super::{short, Workspace};

/// Arguments for `dagsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Item to diff.
    pub id: String,
}

impl DiffArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let diff = workspace
            .coordinator()?
            .item_diff(&self.id)
            .with_context(|| format!("diff failed for '{}'", self.id))?;

        if let (Some(commit), Some(author)) = (&diff.remote_commit, &diff.remote_author) {
            println!("# remote {} by {author}", short(commit));
        }
        if diff.unified_diff.is_empty() {
            println!("No differences for '{}'.", diff.item_id);
            return Ok(());
        }

        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
