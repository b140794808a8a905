//! `dagsync pull` and `dagsync publish`.

use anyhow::{bail, Context, Result};
use clap::Args;

use dagsync_engine::CancellationToken;

use super::{report, Workspace};

/// Arguments for `dagsync pull`.
#[derive(Args, Debug)]
pub struct PullArgs {}

impl PullArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let result = workspace
            .coordinator()?
            .pull(&CancellationToken::new())
            .context("pull failed")?;
        report(&result)
    }
}

/// Arguments for `dagsync publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Item to publish (omit when using `--all`).
    pub id: Option<String>,

    /// Publish every modified and untracked item, or only the listed ones.
    #[arg(long, conflicts_with = "id", num_args = 0.., value_name = "IDS")]
    pub all: Option<Vec<String>>,

    /// Commit message.
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Publish over a remote change made since the last sync.
    #[arg(long, conflicts_with = "all")]
    pub force: bool,
}

impl PublishArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let coordinator = workspace.coordinator()?;
        let cancel = CancellationToken::new();

        if let Some(ids) = self.all {
            let selected = (!ids.is_empty()).then_some(ids.as_slice());
            let result = coordinator
                .publish_all(&cancel, self.message.as_deref(), selected)
                .context("publish --all failed")?;
            return report(&result);
        }

        let Some(id) = self.id else {
            bail!("provide an item id or use --all");
        };
        let result = coordinator
            .publish(&cancel, &id, self.message.as_deref(), self.force)
            .with_context(|| format!("publish failed for '{id}'"))?;
        report(&result)
    }
}
