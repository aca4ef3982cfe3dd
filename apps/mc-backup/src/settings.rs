use std::path::PathBuf;

use anyhow::{Context, Result};
use backup_core::{BackupConfig, Overrides, load_config_file};
use backup_utils::{StatePaths, default_config_path, state_paths, state_paths_in};
use clap::Args;

/// Options shared by every subcommand. Each falls back to an
/// `MC_BACKUP_*` environment variable, then to the config file.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for the lock, run marker and scheduler state
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Container name
    #[arg(long, global = true)]
    pub container: Option<String>,

    /// Backup root directory
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Host path of the server data to copy
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// User owning the screen session inside the container
    #[arg(long, global = true)]
    pub service_user: Option<String>,

    /// User granted access to the session
    #[arg(long, global = true)]
    pub connect_user: Option<String>,

    /// Screen session name
    #[arg(long, global = true)]
    pub session: Option<String>,
}

pub async fn resolve_config(args: &GlobalArgs) -> Result<BackupConfig> {
    let env = |key: &str| std::env::var(key).ok();
    let path = config_path(args, env)?;
    let file = load_config_file(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let config = file
        .resolve(resolve_overrides(args, env))
        .with_context(|| format!("Incomplete configuration (config file: {})", path.display()))?;
    Ok(config)
}

pub fn resolve_state_paths(args: &GlobalArgs) -> StatePaths {
    args.state_dir
        .clone()
        .or_else(|| {
            normalize_optional(std::env::var("MC_BACKUP_STATE_DIR").ok()).map(PathBuf::from)
        })
        .map(state_paths_in)
        .unwrap_or_else(state_paths)
}

fn config_path(args: &GlobalArgs, env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    args.config
        .clone()
        .or_else(|| normalize_optional(env("MC_BACKUP_CONFIG")).map(PathBuf::from))
        .or_else(default_config_path)
        .context("Unable to resolve a config file location (pass --config)")
}

fn resolve_overrides(args: &GlobalArgs, env: impl Fn(&str) -> Option<String>) -> Overrides {
    let text = |flag: &Option<String>, key: &str| {
        normalize_optional(flag.clone()).or_else(|| normalize_optional(env(key)))
    };
    let path = |flag: &Option<PathBuf>, key: &str| {
        flag.clone()
            .or_else(|| normalize_optional(env(key)).map(PathBuf::from))
    };

    Overrides {
        container: text(&args.container, "MC_BACKUP_CONTAINER"),
        backup_dir: path(&args.backup_dir, "MC_BACKUP_BACKUP_DIR"),
        data_dir: path(&args.data_dir, "MC_BACKUP_DATA_DIR"),
        service_user: text(&args.service_user, "MC_BACKUP_SERVICE_USER"),
        connect_user: text(&args.connect_user, "MC_BACKUP_CONNECT_USER"),
        session: text(&args.session, "MC_BACKUP_SESSION"),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
