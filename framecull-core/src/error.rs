// ============================================================================
// framecull-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error Types and Constructors for framecull-core
//
// Every fallible operation in the library returns `CoreResult<T>`. The pipeline
// error kinds (SourceUnreadable, EmptyFrameSet, ExtractionFailed, UploadFailed,
// SourceUnreachable) sit next to the ambient I/O, process and configuration
// failures.

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors produced by framecull-core.
#[derive(Error, Debug)]
pub enum CoreError {
    // ---- Pipeline error kinds ----
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("Source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Nothing to process: {0} has no kept frames")]
    EmptyFrameSet(String),

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    // ---- Ambient failures ----
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Run directory {0} is locked by another run")]
    DirectoryLocked(String),

    #[error("Run index error: {0}")]
    RunIndex(String),

    #[error("Required dependency '{0}' not found")]
    DependencyNotFound(String),

    #[error("Failed to start {0}: {1}")]
    CommandStart(String, io::Error),

    #[error("{0} exited with {1}: {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("Failed waiting for {0}: {1}")]
    CommandWait(String, io::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for framecull-core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// True for the "nothing to process" outcome of a stage with no input.
    #[must_use]
    pub fn is_nothing_to_process(&self) -> bool {
        matches!(self, CoreError::EmptyFrameSet(_))
    }
}

pub fn command_start_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandStart(cmd.into(), err)
}

pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed(cmd.into(), status, stderr.into())
}

pub fn command_wait_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}
