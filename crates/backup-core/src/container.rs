use tracing::info;

use crate::errors::BackupError;
use crate::exec::{CommandRunner, run_checked};

/// Thin wrapper over the container runtime CLI (`docker`, `podman`).
pub struct ContainerRuntime<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
}

impl<'a> ContainerRuntime<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    /// True when `name` is in the running-container listing.
    pub async fn is_running(&self, name: &str) -> Result<bool, BackupError> {
        self.listed(name, false).await
    }

    /// True when `name` exists at all, running or stopped.
    pub async fn exists(&self, name: &str) -> Result<bool, BackupError> {
        self.listed(name, true).await
    }

    pub async fn stop(&self, name: &str) -> Result<(), BackupError> {
        info!("stopping container {name}");
        run_checked(self.runner, self.program, &["stop".to_string(), name.to_string()]).await?;
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<(), BackupError> {
        info!("starting container {name}");
        run_checked(self.runner, self.program, &["start".to_string(), name.to_string()]).await?;
        Ok(())
    }

    async fn listed(&self, name: &str, all: bool) -> Result<bool, BackupError> {
        let mut args = vec!["ps".to_string()];
        if all {
            args.push("-a".to_string());
        }
        args.push("--format".to_string());
        args.push("{{.Names}}".to_string());

        let output = run_checked(self.runner, self.program, &args).await?;
        Ok(listing_contains(&output.stdout, name))
    }
}

/// Arguments for running `command` as `user` inside `container`.
pub fn exec_args(container: &str, user: &str, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "-u".to_string(),
        user.to_string(),
        container.to_string(),
    ];
    args.extend(command.iter().cloned());
    args
}

fn listing_contains(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| line.trim() == name)
}
