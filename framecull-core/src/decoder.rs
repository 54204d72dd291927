// ============================================================================
// framecull-core/src/decoder.rs
// ============================================================================
//
// FRAME DECODER: Sequential Access to a Video Container
//
// Opens a source video, reads its declared properties with ffprobe and streams
// rgb24 frames out of an ffmpeg rawvideo pipe. Every frame gets a zero-based
// index in decode order and a timestamp of `index / frame_rate`.
//
// The ffmpeg child holds the only read handle on the source. It is reaped when
// the stream ends and killed when the decoder is dropped early, so the handle
// is released on every exit path.

use crate::error::{CoreError, CoreResult, command_failed_error};
use crate::external::ffmpeg_executor::error_text;
use crate::external::{FfmpegEvents, FfmpegProcess, FfmpegSpawner, FfprobeExecutor, SourceProperties};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Number of ffmpeg error lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// A decoded raster with its position in the source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, frame_rate: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp: index as f64 / frame_rate,
            image,
        }
    }
}

/// Sequential frame producer consumed by the deduplicating writer.
pub trait FrameSource {
    /// Frames per second used for sampling and timestamps.
    fn frame_rate(&self) -> f64;

    /// Best guess at the total number of frames, if the source declares one.
    fn expected_frame_count(&self) -> Option<u64>;

    /// Returns the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> CoreResult<Option<Frame>>;
}

/// Frame decoder backed by an ffmpeg rawvideo pipe.
pub struct FfmpegFrameDecoder<P: FfmpegProcess> {
    source: PathBuf,
    properties: SourceProperties,
    frame_rate: f64,
    process: P,
    events: FfmpegEvents,
    decoded: u64,
    stderr_tail: Vec<String>,
    finished: bool,
}

impl<P: FfmpegProcess> FfmpegFrameDecoder<P> {
    /// Opens `source` for decoding.
    ///
    /// Fails with `SourceUnreadable` when the file is missing, has no video
    /// stream, or declares no frame rate and no override is given.
    pub fn open<S, E>(
        spawner: &S,
        prober: &E,
        source: &Path,
        frame_rate_override: Option<f64>,
    ) -> CoreResult<Self>
    where
        S: FfmpegSpawner<Process = P>,
        E: FfprobeExecutor,
    {
        if !source.is_file() {
            return Err(CoreError::SourceUnreadable(format!(
                "{} does not exist or is not a file",
                source.display()
            )));
        }

        let properties = prober.probe_source(source).map_err(|e| match e {
            CoreError::SourceUnreadable(_) => e,
            other => CoreError::SourceUnreadable(format!("{}: {}", source.display(), other)),
        })?;

        let frame_rate = frame_rate_override.or(properties.frame_rate).ok_or_else(|| {
            CoreError::SourceUnreadable(format!(
                "{} declares no frame rate; set a source fps override",
                source.display()
            ))
        })?;

        log::info!(
            "Opening {} ({}x{}, {:.3} fps, container {})",
            source.display(),
            properties.width,
            properties.height,
            frame_rate,
            properties.container
        );

        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        cmd.input(source.to_string_lossy().as_ref());
        cmd.args(["-map", "0:v:0", "-an", "-sn"]);
        cmd.args(["-fps_mode", "passthrough"]);
        cmd.rawvideo();

        let mut process = spawner.spawn(cmd)?;
        let events = match process.events() {
            Ok(events) => events,
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(e);
            }
        };

        Ok(Self {
            source: source.to_path_buf(),
            properties,
            frame_rate,
            process,
            events,
            decoded: 0,
            stderr_tail: Vec::new(),
            finished: false,
        })
    }

    pub fn properties(&self) -> &SourceProperties {
        &self.properties
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn record_stderr(&mut self, line: String) {
        log::debug!("ffmpeg: {}", line);
        if self.stderr_tail.len() == STDERR_TAIL_LINES {
            self.stderr_tail.remove(0);
        }
        self.stderr_tail.push(line);
    }

    /// Reaps the process and classifies its exit.
    fn finish(&mut self) -> CoreResult<()> {
        self.finished = true;
        let status = self.process.wait()?;
        if status.success() {
            log::debug!(
                "Decoder for {} finished after {} frames",
                self.source.display(),
                self.decoded
            );
            return Ok(());
        }

        let stderr = self.stderr_tail.join("\n");
        if self.decoded == 0 {
            Err(CoreError::SourceUnreadable(format!(
                "ffmpeg could not decode {}: {}",
                self.source.display(),
                stderr
            )))
        } else {
            Err(command_failed_error(
                format!("ffmpeg (decode after frame {})", self.decoded),
                status,
                stderr,
            ))
        }
    }
}

impl<P: FfmpegProcess> FrameSource for FfmpegFrameDecoder<P> {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn expected_frame_count(&self) -> Option<u64> {
        self.properties.frame_count.or_else(|| {
            self.properties
                .duration_secs
                .map(|d| (d * self.frame_rate).ceil() as u64)
        })
    }

    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        while let Some(event) = self.events.next() {
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    let expected = frame.width as usize * frame.height as usize * 3;
                    if frame.data.len() != expected {
                        return Err(CoreError::OperationFailed(format!(
                            "ffmpeg produced a {}-byte frame, expected {} for {}x{} rgb24",
                            frame.data.len(),
                            expected,
                            frame.width,
                            frame.height
                        )));
                    }
                    let image = RgbImage::from_raw(frame.width, frame.height, frame.data)
                        .ok_or_else(|| {
                            CoreError::OperationFailed("rawvideo buffer rejected".to_string())
                        })?;
                    let decoded = Frame::new(self.decoded, self.frame_rate, image);
                    self.decoded += 1;
                    return Ok(Some(decoded));
                }
                FfmpegEvent::Done => break,
                other => {
                    if let Some(line) = error_text(&other) {
                        self.record_stderr(line);
                    }
                }
            }
        }

        self.finish()?;
        Ok(None)
    }
}

impl<P: FfmpegProcess> Drop for FfmpegFrameDecoder<P> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!(
                "Decoder for {} dropped after {} frames; stopping ffmpeg",
                self.source.display(),
                self.decoded
            );
            let _ = self.process.kill();
            let _ = self.process.wait();
        }
    }
}
