use std::path::Path;
use std::time::Duration;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::fs as async_fs;
use tracing::warn;

pub async fn read_last_backup_date(path: &Path) -> Option<NaiveDate> {
    let content = async_fs::read_to_string(path).await.ok()?;
    let content = content.trim();
    if content.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(content, "%Y-%m-%d").ok()
}

pub async fn write_last_backup_date(path: &Path, date: NaiveDate) {
    if let Some(dir) = path.parent() {
        let _ = async_fs::create_dir_all(dir).await;
    }
    let tmp = path.with_extension("txt.tmp");
    let content = date.format("%Y-%m-%d").to_string();
    if let Err(e) = async_fs::write(&tmp, content.as_bytes()).await {
        warn!("failed to write last_backup tmp file: {}", e);
        return;
    }
    if let Err(e) = async_fs::rename(&tmp, path).await {
        warn!("failed to persist last_backup file: {}", e);
        let _ = async_fs::remove_file(&tmp).await;
    }
}

/// The date a backup is owed for, if any: today's slot has passed and no
/// backup has been recorded for today. Covers waking up late after a suspend.
pub fn due_date(now: NaiveDateTime, at: NaiveTime, last: Option<NaiveDate>) -> Option<NaiveDate> {
    let today = now.date();
    if now.time() >= at && last != Some(today) {
        Some(today)
    } else {
        None
    }
}

/// Time from `now` until the next `at` slot, never less than a second.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today = now.date();
    let next = if now.time() < at {
        today.and_time(at)
    } else {
        today
            .checked_add_days(Days::new(1))
            .unwrap_or(today)
            .and_time(at)
    };
    (next - now)
        .to_std()
        .unwrap_or_default()
        .max(Duration::from_secs(1))
}
