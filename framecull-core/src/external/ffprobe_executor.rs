//! FFprobe integration for source video analysis
//!
//! Reads the properties the decoder and sampler need before the first frame is
//! pulled: dimensions, declared frame rate, frame count and duration.

use crate::error::{CoreError, CoreResult, command_failed_error, command_start_error};
use ffprobe::{FfProbeError, ffprobe};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Properties of a source video as declared by its container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceProperties {
    /// Short name(s) of the container format, e.g. "mov,mp4,m4a,3gp,3g2,mj2".
    pub container: String,
    pub width: u32,
    pub height: u32,
    /// Declared frame rate, if the container has a usable one.
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
    pub duration_secs: Option<f64>,
}

/// Trait for reading source properties, so decoding can be tested without ffprobe.
pub trait FfprobeExecutor {
    fn probe_source(&self, input_path: &Path) -> CoreResult<SourceProperties>;
}

/// `FfprobeExecutor` backed by the `ffprobe` crate.
#[derive(Debug, Clone, Default)]
pub struct CrateFfprobeExecutor;

impl CrateFfprobeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl FfprobeExecutor for CrateFfprobeExecutor {
    fn probe_source(&self, input_path: &Path) -> CoreResult<SourceProperties> {
        probe_source(input_path)
    }
}

/// Gets source properties for a given input file.
pub fn probe_source(input_path: &Path) -> CoreResult<SourceProperties> {
    log::debug!(
        "Running ffprobe (via crate) for source properties on: {}",
        input_path.display()
    );
    let metadata = ffprobe(input_path).map_err(|err| {
        log::error!(
            "ffprobe failed for source properties on {}: {:?}",
            input_path.display(),
            err
        );
        map_ffprobe_error(err, "source properties")
    })?;

    let video_stream = metadata
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            CoreError::SourceUnreadable(format!(
                "No video stream found in {}",
                input_path.display()
            ))
        })?;

    let (width, height) = match (video_stream.width, video_stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w as u32, h as u32),
        (w, h) => {
            return Err(CoreError::SourceUnreadable(format!(
                "Invalid video dimensions in {}: width={:?}, height={:?}",
                input_path.display(),
                w,
                h
            )));
        }
    };

    let frame_rate = parse_frame_rate(&video_stream.avg_frame_rate)
        .or_else(|| parse_frame_rate(&video_stream.r_frame_rate));

    let frame_count = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0);

    let duration_secs = metadata
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok());

    Ok(SourceProperties {
        container: metadata.format.format_name.clone(),
        width,
        height,
        frame_rate,
        frame_count,
        duration_secs,
    })
}

/// Parses an ffprobe rate string ("30000/1001" or "25"). Zero and malformed rates yield `None`.
#[must_use]
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn map_ffprobe_error(err: FfProbeError, context: &str) -> CoreError {
    match err {
        FfProbeError::Io(io_err) => command_start_error(format!("ffprobe ({context})"), io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            command_failed_error(format!("ffprobe ({context})"), output.status, stderr)
        }
        FfProbeError::Deserialize(err) => CoreError::Json(err),
        _ => CoreError::OperationFailed(format!(
            "Unknown ffprobe error during {context}: {err:?}"
        )),
    }
}
