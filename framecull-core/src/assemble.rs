// ============================================================================
// framecull-core/src/assemble.rs
// ============================================================================
//
// RE-ASSEMBLER: Ordered Frame Records -> Video Artifacts
//
// Frames are fed to the encoder strictly in sequence order at a fixed output
// rate, so the result is a re-timing of the kept frames, not a reconstruction
// of the source. The first requested format is encoded from the frames; every
// further format is transcoded from that primary artifact.
//
// Frame dimensions come from the first record. Any later frame with other
// dimensions is resized to match (never cropped).
//
// Each artifact is written to a temporary file next to its destination and
// renamed on success, so a failed encode leaves nothing behind.

use crate::config::{DEFAULT_WEBM_BITRATE, OutputFormat};
use crate::error::{CoreError, CoreResult, command_failed_error};
use crate::external::ffmpeg_executor::error_text;
use crate::external::{FfmpegProcess, FfmpegSpawner};
use crate::reporting::{NullReporter, Reporter};
use crate::temp_files;
use crate::writer::FrameRecord;
use ffmpeg_sidecar::command::FfmpegCommand;
use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

/// A video produced from a run's kept frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub frame_count: u64,
    pub output_fps: f64,
}

impl VideoArtifact {
    /// Nominal duration, `frame_count / output_fps`.
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.output_fps
    }
}

/// Encoding backend used by the re-assembler.
pub trait VideoEncoder {
    /// Encodes `frames` (already in sequence order) into `destination`.
    fn encode_frames(
        &self,
        frames: &[FrameRecord],
        width: u32,
        height: u32,
        fps: f64,
        format: OutputFormat,
        destination: &Path,
    ) -> CoreResult<()>;

    /// Converts `primary` into `format` without touching frame content or order.
    fn transcode(&self, primary: &Path, format: OutputFormat, destination: &Path) -> CoreResult<()>;
}

/// Loads a frame as rgb24 and resizes it to `width` x `height` if needed.
pub fn load_frame(record: &FrameRecord, width: u32, height: u32) -> CoreResult<RgbImage> {
    let image = image::open(&record.path)?.to_rgb8();
    if image.dimensions() == (width, height) {
        return Ok(image);
    }
    log::debug!(
        "Resizing {} from {}x{} to {}x{}",
        record.file_name,
        image.width(),
        image.height(),
        width,
        height
    );
    Ok(imageops::resize(&image, width, height, FilterType::Triangle))
}

/// Re-assembles ordered frame records into one artifact per requested format.
///
/// Fails with `EmptyFrameSet` and writes nothing when `frames` is empty.
pub fn assemble<E: VideoEncoder + ?Sized>(
    encoder: &E,
    frames: &[FrameRecord],
    output_fps: f64,
    formats: &[OutputFormat],
    output_dir: &Path,
    stem: &str,
    reporter: &dyn Reporter,
) -> CoreResult<Vec<VideoArtifact>> {
    if frames.is_empty() {
        log::warn!("Re-assembly requested with no kept frames");
        return Err(CoreError::EmptyFrameSet("re-assembly".to_string()));
    }
    let Some((&primary_format, secondary_formats)) = formats.split_first() else {
        return Err(CoreError::Config("no output format requested".to_string()));
    };

    let mut ordered = frames.to_vec();
    ordered.sort_by_key(|record| record.sequence);

    let (width, height) = image::image_dimensions(&ordered[0].path)?;
    log::info!(
        "Re-assembling {} frames at {}x{}, {} fps",
        ordered.len(),
        width,
        height,
        output_fps
    );

    std::fs::create_dir_all(output_dir)?;
    let frame_count = ordered.len() as u64;
    let mut artifacts = Vec::with_capacity(formats.len());

    let primary_path = output_dir.join(format!("{stem}.{}", primary_format.extension()));
    write_atomically(&primary_path, primary_format, |temp_path| {
        encoder.encode_frames(&ordered, width, height, output_fps, primary_format, temp_path)
    })?;
    reporter.artifact_written(&primary_path);
    artifacts.push(VideoArtifact {
        format: primary_format,
        path: primary_path.clone(),
        frame_count,
        output_fps,
    });

    for &format in secondary_formats {
        let path = output_dir.join(format!("{stem}.{}", format.extension()));
        write_atomically(&path, format, |temp_path| {
            encoder.transcode(&primary_path, format, temp_path)
        })?;
        reporter.artifact_written(&path);
        artifacts.push(VideoArtifact {
            format,
            path,
            frame_count,
            output_fps,
        });
    }

    Ok(artifacts)
}

/// Same as [`assemble`] without progress output.
pub fn assemble_quiet<E: VideoEncoder + ?Sized>(
    encoder: &E,
    frames: &[FrameRecord],
    output_fps: f64,
    formats: &[OutputFormat],
    output_dir: &Path,
    stem: &str,
) -> CoreResult<Vec<VideoArtifact>> {
    assemble(encoder, frames, output_fps, formats, output_dir, stem, &NullReporter)
}

fn write_atomically<F>(destination: &Path, format: OutputFormat, produce: F) -> CoreResult<()>
where
    F: FnOnce(&Path) -> CoreResult<()>,
{
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let temp = temp_files::create_temp_file(dir, "assemble", format.extension())?;
    produce(temp.path())?;
    temp_files::persist_replace(temp, destination)?;
    log::info!("Wrote {}", destination.display());
    Ok(())
}

// ============================================================================
// FFMPEG ENCODER
// ============================================================================

/// `VideoEncoder` that pipes rgb24 frames into ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegVideoEncoder<S: FfmpegSpawner> {
    spawner: S,
}

impl<S: FfmpegSpawner> FfmpegVideoEncoder<S> {
    pub fn new(spawner: S) -> Self {
        Self { spawner }
    }
}

fn add_codec_args(cmd: &mut FfmpegCommand, format: OutputFormat) {
    match format {
        OutputFormat::Mp4 => {
            // MPEG-4 Part 2, the "mp4v" fourcc
            cmd.args(["-c:v", "mpeg4", "-q:v", "2"]);
            cmd.args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"]);
            cmd.args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);
        }
        OutputFormat::Webm => {
            cmd.args(["-c:v", "libvpx-vp9", "-b:v", DEFAULT_WEBM_BITRATE]);
            cmd.args(["-pix_fmt", "yuv420p"]);
        }
    }
    cmd.arg("-an");
}

/// Drains events until exit and checks the exit status.
fn finish_process<P: FfmpegProcess>(process: &mut P, label: &str) -> CoreResult<()> {
    let mut errors = Vec::new();
    process.handle_events(|event| {
        if let Some(line) = error_text(&event) {
            log::debug!("ffmpeg: {}", line);
            errors.push(line);
        }
        Ok(())
    })?;
    let status = process.wait()?;
    if !status.success() {
        return Err(command_failed_error(label, status, errors.join("\n")));
    }
    Ok(())
}

impl<S: FfmpegSpawner> VideoEncoder for FfmpegVideoEncoder<S> {
    fn encode_frames(
        &self,
        frames: &[FrameRecord],
        width: u32,
        height: u32,
        fps: f64,
        format: OutputFormat,
        destination: &Path,
    ) -> CoreResult<()> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24"]);
        cmd.args(["-s", &format!("{width}x{height}"), "-r", &fps.to_string()]);
        cmd.input("-");
        add_codec_args(&mut cmd, format);
        cmd.args(["-r", &fps.to_string()]);
        cmd.overwrite();
        cmd.output(destination.to_string_lossy().as_ref());

        let mut process = self.spawner.spawn(cmd)?;
        let Some(stdin) = process.take_stdin() else {
            let _ = process.kill();
            let _ = process.wait();
            return Err(CoreError::OperationFailed(
                "ffmpeg stdin was not piped".to_string(),
            ));
        };

        // ffmpeg's output has to be drained while frames are written, so the
        // frames go in from a separate thread.
        let records = frames.to_vec();
        let feeder = thread::spawn(move || -> CoreResult<u64> {
            let mut input = BufWriter::new(stdin);
            let mut written = 0u64;
            for record in &records {
                let image = load_frame(record, width, height)?;
                input.write_all(image.as_raw())?;
                written += 1;
            }
            input.flush()?;
            Ok(written)
        });

        let encode_result = finish_process(&mut process, "ffmpeg (encode)");
        let feed_result = feeder
            .join()
            .map_err(|_| CoreError::OperationFailed("frame feeder thread panicked".to_string()))?;

        encode_result?;
        let written = feed_result?;
        log::debug!("Fed {} frames to ffmpeg", written);
        Ok(())
    }

    fn transcode(&self, primary: &Path, format: OutputFormat, destination: &Path) -> CoreResult<()> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        cmd.input(primary.to_string_lossy().as_ref());
        add_codec_args(&mut cmd, format);
        cmd.overwrite();
        cmd.output(destination.to_string_lossy().as_ref());

        let mut process = self.spawner.spawn(cmd)?;
        finish_process(&mut process, "ffmpeg (transcode)")
    }
}
