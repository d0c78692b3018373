//! Crash-safe file replacement.
//!
//! The new contents go to a sibling temp file that is fsynced and then
//! renamed over the target. A reader therefore sees either the old file or
//! the complete new one, never a torn write. Every write gets its own temp
//! name, so overlapping writers to one target never share a temp file; the
//! last rename wins.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::PersistError;

/// Fresh sibling path for one in-flight save: `<name>.<uuid>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::now_v7().simple()));
    path.with_file_name(name)
}

/// Replace `path` with `bytes` atomically.
///
/// On any failure the temp file is removed and an existing file at `path`
/// is left untouched.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if writing, syncing, or renaming fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let tmp = temp_path(path);
    let result = write_and_rename(&tmp, path, bytes);
    if result.is_err() {
        // Best effort; the original error is what matters.
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let mut file = File::create(tmp).map_err(|e| PersistError::io(tmp, e))?;
    file.write_all(bytes).map_err(|e| PersistError::io(tmp, e))?;
    file.sync_all().map_err(|e| PersistError::io(tmp, e))?;
    drop(file);

    std::fs::rename(tmp, path).map_err(|e| PersistError::io(path, e))?;

    // Persist the rename itself. Not every platform can open a directory.
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent.and_then(|p| File::open(p).ok()) {
        let _ = dir.sync_all();
    }
    debug!(path = %path.display(), bytes = bytes.len(), "file replaced atomically");
    Ok(())
}
