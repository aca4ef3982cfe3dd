use anyhow::Result;
use backup_core::MarkerStore;

use crate::schedule::read_last_backup_date;
use crate::settings::{GlobalArgs, resolve_state_paths};

pub async fn exec(args: &GlobalArgs) -> Result<u8> {
    let paths = resolve_state_paths(args);
    let markers = MarkerStore::new(&paths.marker_path);

    match markers.load().await? {
        Some(marker) => {
            println!(
                "interrupted run for {}: started {}, last completed step `{}` at {}",
                marker.container, marker.started_at, marker.completed, marker.updated_at
            );
            println!("run `mc-backup run --resume` once the container state has been checked");
        }
        None => println!("no interrupted run"),
    }

    match read_last_backup_date(&paths.last_run_path).await {
        Some(date) => println!("last scheduled backup: {date}"),
        None => println!("last scheduled backup: never"),
    }
    Ok(0)
}
