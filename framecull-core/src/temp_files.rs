//! Temporary file management utilities.
//!
//! Frame files, downloads and video artifacts are first written to a
//! `NamedTempFile` in their destination directory and renamed into place, so
//! a reader never sees a partially written file.

use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, NamedTempFile};

/// Creates a uniquely named directory under `base` that outlives the process.
pub fn create_persistent_dir(base: &Path, prefix: &str) -> CoreResult<PathBuf> {
    std::fs::create_dir_all(base)?;
    let dir = TempFileBuilder::new()
        .prefix(&format!("{prefix}_"))
        .rand_bytes(6)
        .tempdir_in(base)?;
    Ok(dir.keep())
}

/// Creates a temporary file with prefix and extension. Auto-deleted when dropped.
pub fn create_temp_file(dir: &Path, prefix: &str, extension: &str) -> CoreResult<NamedTempFile> {
    std::fs::create_dir_all(dir)?;
    let temp_file = TempFileBuilder::new()
        .prefix(&format!(".{prefix}_"))
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?;

    Ok(temp_file)
}

/// Moves a finished temporary file to `destination`, replacing nothing.
pub fn persist_new(temp: NamedTempFile, destination: &Path) -> CoreResult<()> {
    temp.persist_noclobber(destination).map_err(|e| {
        CoreError::Io(std::io::Error::new(
            e.error.kind(),
            format!("could not move finished file to {}: {}", destination.display(), e.error),
        ))
    })?;
    Ok(())
}

/// Moves a finished temporary file to `destination`, replacing any existing file.
pub fn persist_replace(temp: NamedTempFile, destination: &Path) -> CoreResult<()> {
    temp.persist(destination).map_err(|e| {
        CoreError::Io(std::io::Error::new(
            e.error.kind(),
            format!("could not move finished file to {}: {}", destination.display(), e.error),
        ))
    })?;
    Ok(())
}
