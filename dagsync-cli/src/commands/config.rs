//! `dagsync config` and `dagsync test-connection`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use dagsync_core::config;

use super::Workspace;
use crate::AuthTypeArg;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the configuration with secrets redacted.
    Show,
    /// Change configuration fields; unspecified fields keep their value.
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    #[arg(long)]
    pub enabled: Option<bool>,

    /// Repository URL or `host/owner/repo` shorthand.
    #[arg(long)]
    pub repository: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    /// Subdirectory inside the repository that holds the items.
    #[arg(long)]
    pub path: Option<String>,

    #[arg(long)]
    pub push_enabled: Option<bool>,

    /// none | token | ssh
    #[arg(long, value_name = "TYPE")]
    pub auth_type: Option<AuthTypeArg>,

    /// Access token for token auth.
    #[arg(long, env = "DAGSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Private key for ssh auth.
    #[arg(long)]
    pub ssh_key_path: Option<PathBuf>,

    #[arg(long)]
    pub auto_sync: Option<bool>,

    #[arg(long)]
    pub auto_sync_on_startup: Option<bool>,

    #[arg(long, value_name = "SECONDS")]
    pub auto_sync_interval: Option<u64>,

    #[arg(long)]
    pub author_name: Option<String>,

    #[arg(long)]
    pub author_email: Option<String>,
}

pub fn run(command: ConfigCommand, workspace: &Workspace) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let view = workspace.coordinator()?.config();
            println!(
                "{}",
                serde_json::to_string_pretty(&view).context("failed to serialize config JSON")?
            );
        }
        ConfigCommand::Set(args) => {
            let current =
                config::load_at(&workspace.home).context("failed to load sync config")?;
            let mut next = current.clone();
            args.apply(&mut next);
            if next == current {
                bail!("nothing to change; pass at least one field");
            }
            workspace
                .coordinator()?
                .update_config(next)
                .context("config update rejected")?;
            println!(
                "✓ saved {}",
                dagsync_core::paths::config_path_at(&workspace.home).display()
            );
        }
    }
    Ok(())
}

impl ConfigSetArgs {
    fn apply(self, config: &mut dagsync_core::SyncConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(repository) = self.repository {
            config.repository = repository;
        }
        if let Some(branch) = self.branch {
            config.branch = branch;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(push_enabled) = self.push_enabled {
            config.push_enabled = push_enabled;
        }
        if let Some(kind) = self.auth_type {
            config.auth.kind = kind.into();
        }
        if let Some(token) = self.token {
            config.auth.token = Some(token);
        }
        if let Some(key) = self.ssh_key_path {
            config.auth.ssh_key_path = Some(key);
        }
        if let Some(enabled) = self.auto_sync {
            config.auto_sync.enabled = enabled;
        }
        if let Some(on_startup) = self.auto_sync_on_startup {
            config.auto_sync.on_startup = on_startup;
        }
        if let Some(seconds) = self.auto_sync_interval {
            config.auto_sync.interval_seconds = seconds;
        }
        if let Some(name) = self.author_name {
            config.commit.author_name = name;
        }
        if let Some(email) = self.author_email {
            config.commit.author_email = email;
        }
    }
}

pub fn test_connection(workspace: &Workspace) -> Result<()> {
    let result = workspace.coordinator()?.test_connection();
    if result.success {
        println!("{} {}", "✓".green().bold(), result.message);
        return Ok(());
    }

    println!("{} {}", "✗".red().bold(), result.message);
    match result.error {
        Some(error) => bail!("{}: {error}", result.message),
        None => bail!("{}", result.message),
    }
}
