use anyhow::{Context, Result};
use backup_core::{
    BackupConfig, BackupError, BackupOutcome, EXIT_FATAL, MarkerStore, Orchestrator, ProcessRunner,
    RunOptions, TokioClock, exit_code,
};
use backup_utils::{StatePaths, ensure_dir};
use tracing::{error, info, warn};

use crate::lock;
use crate::settings::{GlobalArgs, resolve_config, resolve_state_paths};

pub async fn exec(args: &GlobalArgs, resume: bool) -> Result<u8> {
    let config = resolve_config(args).await?;
    let paths = resolve_state_paths(args);
    ensure_dir(&paths.state_dir)
        .with_context(|| format!("Failed to create {}", paths.state_dir.display()))?;

    let Some(_guard) = lock::try_acquire(&paths.lock_path)
        .with_context(|| format!("Failed to open {}", paths.lock_path.display()))?
    else {
        warn!("another backup is already running (lock held), exiting");
        return Ok(EXIT_FATAL);
    };

    let result = run_backup(&config, &paths, resume).await;
    Ok(exit_code(&result))
}

/// One orchestrated run with the real process runner. The caller holds the lock.
pub async fn run_backup(
    config: &BackupConfig,
    paths: &StatePaths,
    resume: bool,
) -> Result<BackupOutcome, BackupError> {
    let markers = MarkerStore::new(&paths.marker_path);
    info!("starting backup of container {}", config.container);
    let result = Orchestrator::new(config, &ProcessRunner, &TokioClock, &markers)
        .run(RunOptions { resume })
        .await;

    match &result {
        Ok(BackupOutcome::Completed) => {}
        Ok(BackupOutcome::CompletedWithWarnings(_)) => {
            warn!("backup finished with warnings; fix session access before the next run");
        }
        Err(err @ BackupError::Interrupted { .. }) => error!("{err}"),
        Err(err) => {
            error!("backup failed: {err}");
            if markers.path().exists() {
                warn!(
                    "run state kept at {}; check the container, then rerun with --resume",
                    markers.path().display()
                );
            }
        }
    }
    result
}
