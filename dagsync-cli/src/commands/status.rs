//! `dagsync status`: per-item sync state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dagsync_core::{OverallStatus, SummaryStatus, SyncItem};

use super::{format_age, short, Workspace};

/// Arguments for `dagsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, workspace: &Workspace) -> Result<()> {
        let status = workspace
            .coordinator()?
            .status()
            .context("failed to compute sync status")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&status);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last synced")]
    last_synced: String,
    #[tabled(rename = "remote")]
    remote: String,
}

fn print_table(status: &OverallStatus) {
    if !status.enabled {
        println!("Git sync is not enabled.");
        println!("Run 'dagsync config set --enabled true --repository <url>' to set it up.");
        return;
    }

    println!(
        "dagsync v{} | {}@{} | {}",
        env!("CARGO_PKG_VERSION"),
        status.repository,
        status.branch,
        summary_label(status.summary),
    );
    let counts = &status.counts;
    println!(
        "{} synced  {} modified  {} untracked  {} conflict  {} missing",
        counts.synced, counts.modified, counts.untracked, counts.conflict, counts.missing,
    );
    match (status.last_sync_at, &status.last_sync_commit) {
        (Some(at), Some(commit)) => println!("last sync {} ago at {}", format_age(at), short(commit)),
        (Some(at), None) => println!("last sync {} ago", format_age(at)),
        _ => println!("never synced"),
    }
    if let Some(error) = &status.last_error {
        println!("{} {error}", "last error:".red().bold());
    }

    if status.items.is_empty() {
        println!("No items found.");
        return;
    }

    let rows: Vec<StatusTableRow> = status.items.values().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if counts.conflict > 0 {
        println!("Resolve conflicts with 'dagsync discard <id>' or 'dagsync publish <id> --force'.");
    } else if counts.modified + counts.untracked > 0 {
        println!("Run 'dagsync publish --all' to publish local changes.");
    }
}

fn row(item: &SyncItem) -> StatusTableRow {
    let remote = match (&item.remote_commit, &item.remote_author) {
        (Some(commit), Some(author)) => format!("{} by {author}", short(commit)),
        (Some(commit), None) => short(commit).to_string(),
        _ => "-".to_string(),
    };
    StatusTableRow {
        item: item.item_id.to_string(),
        kind: item.kind.to_string(),
        status: item.status.to_string().to_uppercase(),
        last_synced: item
            .last_synced_at
            .map(format_age)
            .unwrap_or_else(|| "never".to_string()),
        remote,
    }
}

fn summary_label(summary: SummaryStatus) -> String {
    let label = summary.to_string().to_uppercase();
    match summary {
        SummaryStatus::Synced => label.green().bold().to_string(),
        SummaryStatus::Pending => label.yellow().bold().to_string(),
        SummaryStatus::Missing => label.magenta().bold().to_string(),
        SummaryStatus::Conflict | SummaryStatus::Error => label.red().bold().to_string(),
    }
}
