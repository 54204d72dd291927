// ============================================================================
// framecull-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// This module encapsulates interactions with ffmpeg, ffprobe and yt-dlp. Each
// tool sits behind a trait so pipeline stages can be driven by scripted
// implementations in tests.

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- Standard library imports ----
use std::io;
use std::process::{Command, Stdio};

// ============================================================================
// SUBMODULES
// ============================================================================

/// Contains traits and implementations for executing ffmpeg commands
pub mod ffmpeg_executor;

/// Contains traits and implementations for executing ffprobe commands
pub mod ffprobe_executor;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use ffmpeg_executor::{FfmpegEvents, FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner};
pub use ffprobe_executor::{CrateFfprobeExecutor, FfprobeExecutor, SourceProperties, parse_frame_rate};

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks if a required external command is available and executable.
///
/// Runs the command with its version flag (`-version` for the ffmpeg family,
/// `--version` for everything else) and only cares whether it could be
/// started.
///
/// # Returns
///
/// * `Ok(())` - The command exists
/// * `Err(CoreError::DependencyNotFound)` - The command is not on PATH
/// * `Err(CoreError::CommandStart)` - The command exists but fails to start
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let version_arg = if cmd_name.starts_with("ff") {
        "-version"
    } else {
        "--version"
    };

    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{}': {}", cmd_name, e);
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_is_reported() {
        let result = check_dependency("framecull-definitely-not-a-real-binary");
        assert!(matches!(result, Err(CoreError::DependencyNotFound(_))));
    }
}
