//! File-text primitives over the config tree.
//!
//! Every failure is reported as [`ReconcileError::Filesystem`] carrying the
//! offending path, so pass-level logs point at the exact file.

use crate::error::{ReconcileError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting the manifest or values files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| ReconcileError::filesystem(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ReconcileError::filesystem(dir, e))?;
    tmp.write_all(data)
        .map_err(|e| ReconcileError::filesystem(path, e))?;
    tmp.persist(path)
        .map_err(|e| ReconcileError::filesystem(path, e.error))?;
    Ok(())
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ReconcileError::filesystem(path, e))
}

/// Recursively copy `src` to `dst`, preserving the directory structure.
/// `dst` must not exist yet.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir(dst).map_err(|e| ReconcileError::filesystem(dst, e))?;
    let entries = std::fs::read_dir(src).map_err(|e| ReconcileError::filesystem(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ReconcileError::filesystem(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ReconcileError::filesystem(&from, e))?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| ReconcileError::filesystem(&from, e))?;
        }
    }
    Ok(())
}

/// Remove a directory tree. Returns `false` if it did not exist.
pub fn remove_tree(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReconcileError::filesystem(path, e)),
    }
}

pub fn file_contains(path: &Path, needle: &str) -> Result<bool> {
    Ok(read_text(path)?.contains(needle))
}

/// Replace every occurrence of `search` with `replace` in a file.
///
/// Returns `true` if a match existed. A missing match leaves the file
/// untouched and is not an error.
pub fn replace_in_file(path: &Path, search: &str, replace: &str) -> Result<bool> {
    let content = read_text(path)?;
    if !content.contains(search) {
        return Ok(false);
    }
    atomic_write(path, content.replace(search, replace).as_bytes())?;
    Ok(true)
}

/// Apply [`replace_in_file`] to every regular file under `dir`.
/// Returns the number of files that changed.
pub fn replace_in_tree(dir: &Path, search: &str, replace: &str) -> Result<usize> {
    let mut changed = 0;
    let entries = std::fs::read_dir(dir).map_err(|e| ReconcileError::filesystem(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ReconcileError::filesystem(dir, e))?.path();
        if path.is_dir() {
            changed += replace_in_tree(&path, search, replace)?;
        } else if replace_in_file(&path, search, replace)? {
            changed += 1;
        }
    }
    Ok(changed)
}
