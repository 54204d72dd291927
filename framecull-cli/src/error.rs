// ============================================================================
// framecull-cli/src/error.rs
// ============================================================================
//
// CLI ERROR HANDLING: Error types and utilities for the CLI
//
// Commands return core errors. This module adds context to them and decides
// how a failed command is reported and which exit status it maps to.

use framecull_core::{CoreError, CoreResult};

use std::fmt;

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Type alias for CLI results using CoreError.
pub type CliResult<T> = CoreResult<T>;

// ============================================================================
// ERROR CONVERSION UTILITIES
// ============================================================================

/// Extension trait for adding context to errors in the CLI.
///
/// On a `Result`, the underlying error is flattened into
/// `CoreError::OperationFailed` with the context in front of its message, so
/// only use it where the original kind does not matter to the caller. On an
/// `Option`, a missing value becomes `CoreError::Config`: in the CLI that is
/// always a flag or environment variable the user left out.
pub trait CliErrorContext<T> {
    /// Add context to an error.
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display;

    /// Add context using a closure (for lazy evaluation).
    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T, E> CliErrorContext<T> for Result<T, E>
where
    E: Into<CoreError>,
{
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display,
    {
        self.cli_with_context(|| context)
    }

    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let core_error: CoreError = e.into();
            CoreError::OperationFailed(format!("{}: {}", f(), core_error))
        })
    }
}

impl<T> CliErrorContext<T> for Option<T> {
    /// `context` should name the missing input, e.g. the flag to pass.
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display,
    {
        self.cli_with_context(|| context)
    }

    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| CoreError::Config(f().to_string()))
    }
}

// ============================================================================
// REPORTING
// ============================================================================

/// A hint printed under the error message, where one helps.
pub fn suggestion_for(error: &CoreError) -> Option<&'static str> {
    match error {
        CoreError::DependencyNotFound(_) => Some("Install ffmpeg and ffprobe and make sure they are on PATH"),
        CoreError::DirectoryLocked(_) => {
            Some("Wait for the other stage to finish; .framecull.lock names the process holding the run")
        }
        CoreError::SourceUnreachable(_) => Some("Check the URL and that yt-dlp is installed for streaming sites"),
        CoreError::EmptyFrameSet(_) => Some("The run kept no frames; try a lower --target-fps or a different input"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_context_prefixes_message() {
        let result: Result<(), CoreError> = Err(CoreError::RunIndex("no run.json".to_string()));
        let err = result.cli_context("Refusing to remove /tmp/x").unwrap_err();
        assert!(matches!(err, CoreError::OperationFailed(_)));
        assert_eq!(
            err.to_string(),
            "Operation failed: Refusing to remove /tmp/x: Run index error: no run.json"
        );
    }

    #[test]
    fn missing_option_is_a_config_error() {
        let err = None::<String>.cli_context("--api-key is required").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn locked_run_gets_a_hint() {
        let err = CoreError::DirectoryLocked("/work/run_1".to_string());
        assert!(suggestion_for(&err).is_some_and(|hint| hint.contains(".framecull.lock")));
    }
}
