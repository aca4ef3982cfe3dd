use anyhow::Result;
use backup_core::{EXIT_FATAL, MarkerStore, Orchestrator, ProcessRunner, TokioClock};
use tracing::error;

use crate::settings::{GlobalArgs, resolve_config, resolve_state_paths};

pub async fn exec(args: &GlobalArgs) -> Result<u8> {
    let config = resolve_config(args).await?;
    let paths = resolve_state_paths(args);
    let markers = MarkerStore::new(&paths.marker_path);

    let report = match Orchestrator::new(&config, &ProcessRunner, &TokioClock, &markers)
        .check()
        .await
    {
        Ok(report) => report,
        Err(err) => {
            error!("check failed: {err}");
            return Ok(EXIT_FATAL);
        }
    };

    println!("container {}: running", config.container);
    println!("backup dir {}: ok", config.backup_dir.display());
    println!("data dir {}: ok", config.data_dir.display());
    println!(
        "session {}: {}{}",
        report.session.name,
        if report.session.multi_user { "multi-user" } else { "single-user (will be enabled)" },
        if report.session.attached { ", attached" } else { "" }
    );
    Ok(0)
}
