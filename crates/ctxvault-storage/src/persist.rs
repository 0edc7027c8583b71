//! Atomic file replacement.
//!
//! The canonical path is never written in place: data goes to a `.tmp`
//! sibling, is synced, and is renamed over the target.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// The transient sibling used while committing `path`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    sibling_with_suffix(path, ".tmp")
}

/// `path` with `suffix` appended to its file name.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("data"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `data` to `path` atomically.
pub async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let temp = temp_sibling(path);
    let mut file = fs::File::create(&temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&temp, path).await?;
    Ok(())
}

/// Create the parent directory of `path` if it is missing.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}
