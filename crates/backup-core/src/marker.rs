use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tracing::warn;

use crate::errors::BackupError;
use crate::step::Step;

/// Progress of a run that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    pub container: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed: Step,
}

impl RunMarker {
    pub fn new(container: &str, completed: Step) -> Self {
        let now = Utc::now();
        Self {
            container: container.to_string(),
            started_at: now,
            updated_at: now,
            completed,
        }
    }

    pub fn advance(&mut self, completed: Step) {
        self.completed = completed;
        self.updated_at = Utc::now();
    }
}

pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<RunMarker>, BackupError> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(value) => value,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BackupError::io("reading run marker", err)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Replace the marker. Written to a temp file first, then renamed into place.
    pub async fn save(&self, marker: &RunMarker) -> Result<(), BackupError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|err| BackupError::io("creating state directory", err))?;
        }
        let payload = serde_json::to_string_pretty(marker)?;
        let tmp = self.path.with_extension("json.tmp");
        async_fs::write(&tmp, payload.as_bytes())
            .await
            .map_err(|err| BackupError::io("writing run marker", err))?;
        if let Err(err) = async_fs::rename(&tmp, &self.path).await {
            let _ = async_fs::remove_file(&tmp).await;
            return Err(BackupError::io("persisting run marker", err));
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), BackupError> {
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!("failed to remove run marker {}: {err}", self.path.display());
                Err(BackupError::io("removing run marker", err))
            }
        }
    }
}
