// ============================================================================
// framecull-core/src/external/ffmpeg_executor.rs
// ============================================================================
//
// FFMPEG EXECUTOR: FFmpeg Process Management and Abstraction
//
// Abstractions for spawning ffmpeg and interacting with the running process.
// The decoder pulls rawvideo frames out of the event stream, the encoder feeds
// rawvideo frames into stdin; both go through these traits so that tests can
// substitute scripted processes.
//
// KEY COMPONENTS:
// - FfmpegProcess: Trait representing an active FFmpeg process
// - FfmpegSpawner: Trait for creating new FFmpeg processes
// - SidecarSpawner: Concrete implementation using ffmpeg-sidecar

use crate::error::{CoreResult, command_failed_error, command_start_error, command_wait_error};
use ffmpeg_sidecar::child::FfmpegChild as SidecarChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::process::{ChildStdin, ExitStatus};

// --- FFmpeg Execution Abstraction ---

/// Boxed stream of events emitted by a running ffmpeg process.
pub type FfmpegEvents = Box<dyn Iterator<Item = FfmpegEvent>>;

/// Trait representing an active ffmpeg process instance.
pub trait FfmpegProcess {
    /// Takes ownership of the event stream. May only be called once.
    fn events(&mut self) -> CoreResult<FfmpegEvents>;

    /// Takes the process stdin, if it was piped.
    fn take_stdin(&mut self) -> Option<ChildStdin>;

    /// Terminates the process.
    fn kill(&mut self) -> CoreResult<()>;

    /// Waits for the command to complete and returns its exit status.
    fn wait(&mut self) -> CoreResult<ExitStatus>;

    /// Processes events from the running command using a provided handler closure.
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        for event in self.events()? {
            handler(event)?;
        }
        Ok(())
    }
}

/// Trait representing something that can spawn an FfmpegProcess.
pub trait FfmpegSpawner {
    type Process: FfmpegProcess;
    /// Spawns the ffmpeg command, consuming the command object.
    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process>;
}

// --- Concrete Implementation using ffmpeg-sidecar ---

/// Wrapper around `ffmpeg_sidecar::child::FfmpegChild` implementing `FfmpegProcess`.
pub struct SidecarProcess(SidecarChild);

impl FfmpegProcess for SidecarProcess {
    fn events(&mut self) -> CoreResult<FfmpegEvents> {
        let iterator = self.0.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {}", e);
            command_failed_error(
                "ffmpeg (sidecar - get iter)",
                ExitStatus::default(),
                e.to_string(),
            )
        })?;
        Ok(Box::new(iterator))
    }

    fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.0.take_stdin()
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.0
            .kill()
            .map_err(|e| command_wait_error("ffmpeg (sidecar - kill)", e))
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        self.0
            .wait()
            .map_err(|e| command_wait_error("ffmpeg (sidecar)", e))
    }
}

/// Concrete implementation of `FfmpegSpawner` using `ffmpeg-sidecar`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl FfmpegSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        log::debug!("Spawning ffmpeg: {:?}", cmd.as_inner());
        cmd.spawn()
            .map(SidecarProcess)
            .map_err(|e| command_start_error("ffmpeg (sidecar)", e))
    }
}

/// Collects the text of an error-level ffmpeg event, if it is one.
pub(crate) fn error_text(event: &FfmpegEvent) -> Option<String> {
    use ffmpeg_sidecar::event::LogLevel;
    match event {
        FfmpegEvent::Error(msg) => Some(msg.clone()),
        FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, msg) => Some(msg.clone()),
        _ => None,
    }
}
