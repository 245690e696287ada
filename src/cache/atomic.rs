//! Durable JSON writes via temp-file-then-rename

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::CacheError;

/// Serializes `value` to `path` atomically
///
/// The JSON is written and synced to a temporary file in the destination
/// directory, then renamed over `path`. A crash at any point leaves either
/// the old file or the new one in place. Concurrent writers of the same path
/// each use their own temp file; the last rename wins.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;

    Ok(())
}
