use fs2::FileExt;
use std::{fs::File, fs::OpenOptions, path::Path};

/// Held for as long as this process owns the state directory.
pub struct LockGuard {
    _file: File,
}

pub fn acquire_lock(path: &Path) -> std::io::Result<LockGuard> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;

    file.try_lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

/// `Ok(None)` when another process already holds the lock.
pub fn try_acquire(path: &Path) -> std::io::Result<Option<LockGuard>> {
    match acquire_lock(path) {
        Ok(guard) => Ok(Some(guard)),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}
