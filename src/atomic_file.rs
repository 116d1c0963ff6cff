//! Locked, atomic file replacement shared by the config and the record store.
//!
//! Writers take an exclusive `fs2` lock on a sibling `<name>.lock` file, write
//! `<name>.tmp` and rename it over the target. The lock lives in its own file so
//! the rename cannot drop it.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Exclusive lock for `path`, held until the returned file is dropped
pub(crate) fn lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let lock_path = sibling(path, "lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| format!("Failed to lock {}", path.display()))?;
    Ok(lock_file)
}

/// Replace `path` with `content` via temp file + rename. Caller holds the lock.
pub(crate) fn replace(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = sibling(path, "tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    temp_file
        .sync_all()
        .with_context(|| format!("Failed to sync {}", temp_path.display()))?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename into {}", path.display()))?;
    Ok(())
}

/// Lock, replace, unlock
pub(crate) fn write(path: &Path, content: &[u8]) -> Result<()> {
    let _lock = lock(path)?;
    replace(path, content)
}
