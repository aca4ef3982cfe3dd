use anyhow::{Context, Result};
use backup_core::EXIT_FATAL;
use backup_utils::ensure_dir;
use chrono::Local;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::commands::run::run_backup;
use crate::lock;
use crate::schedule::{due_date, read_last_backup_date, until_next, write_last_backup_date};
use crate::settings::{GlobalArgs, resolve_config, resolve_state_paths};

/// Runs the backup once a day at `schedule.at` local time. A run that was
/// missed while the machine slept starts as soon as the daemon wakes.
pub async fn exec(args: &GlobalArgs) -> Result<u8> {
    let config = resolve_config(args).await?;
    let at = config.schedule.time_of_day()?;
    let paths = resolve_state_paths(args);
    ensure_dir(&paths.state_dir)
        .with_context(|| format!("Failed to create {}", paths.state_dir.display()))?;

    let Some(_guard) = lock::try_acquire(&paths.lock_path)
        .with_context(|| format!("Failed to open {}", paths.lock_path.display()))?
    else {
        warn!("another backup process is already running (lock held), exiting");
        return Ok(EXIT_FATAL);
    };

    let mut last_backup_date = read_last_backup_date(&paths.last_run_path).await;
    info!("daily backup scheduled at {} for {}", at.format("%H:%M"), config.container);

    loop {
        let now = Local::now().naive_local();

        if let Some(today) = due_date(now, at, last_backup_date) {
            info!("daily backup: starting backup for date {}", today);
            match run_backup(&config, &paths, false).await {
                Ok(outcome) => {
                    info!("daily backup finished (exit code {})", outcome.exit_code());
                    write_last_backup_date(&paths.last_run_path, today).await;
                }
                Err(err) => warn!("daily backup failed: {}", err),
            }
            // Do not retrigger today, even after a failure.
            last_backup_date = Some(today);
            sleep(Duration::from_secs(5)).await;
            continue;
        }

        let wait = until_next(now, at);
        debug!("daily backup scheduler sleeping for {}s", wait.as_secs());
        sleep(wait).await;
    }
}
