use std::path::Path;

use tracing::info;

use crate::errors::BackupError;
use crate::exec::{CommandRunner, run_checked};

/// rsync arguments for an archival mirror of `source` onto `destination`.
/// Trailing slashes make rsync copy the directory contents, not the directory.
pub fn mirror_args(source: &Path, destination: &Path) -> Vec<String> {
    vec![
        "-a".to_string(),
        "--delete".to_string(),
        dir_arg(source),
        dir_arg(destination),
    ]
}

/// Mirror `source` to `destination`, deleting destination files that no
/// longer exist at the source. `destination` is created if missing.
pub async fn mirror(
    runner: &dyn CommandRunner,
    rsync: &str,
    source: &Path,
    destination: &Path,
) -> Result<(), BackupError> {
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|err| BackupError::io("creating backup destination", err))?;

    info!("copying {} -> {}", source.display(), destination.display());
    run_checked(runner, rsync, &mirror_args(source, destination)).await?;
    Ok(())
}

fn dir_arg(path: &Path) -> String {
    let mut value = path.to_string_lossy().into_owned();
    if !value.ends_with('/') {
        value.push('/');
    }
    value
}
