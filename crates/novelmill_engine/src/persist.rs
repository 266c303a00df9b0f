use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure a directory exists; create it (and its parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Write `content` to `target` atomically: temp file in the target's
/// directory, flush and fsync, then rename over the target. Either the old
/// file (or nothing) is on disk, or the complete new content is.
pub fn write_atomic(target: &Path, content: &str) -> Result<(), PersistError> {
    write_atomic_bytes(target, content.as_bytes())
}

/// Binary variant of [`write_atomic`], for resources like cover images.
pub fn write_atomic_bytes(target: &Path, content: &[u8]) -> Result<(), PersistError> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| PersistError::OutputDir("target has no parent directory".into()))?;
    ensure_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}
