//! Configuration structures and constants for the framecull-core library.
//!
//! `CoreConfig` is passed explicitly into the pipeline at construction. Nothing
//! in the library reads credentials or directory paths from global state.

mod builder;

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use builder::CoreConfigBuilder;

// Default constants

/// Frame rate of re-assembled videos, independent of the source rate.
pub const DEFAULT_OUTPUT_FPS: f64 = 30.0;

/// Pixel-distance duplicate threshold. The distance is the L2 norm over all
/// 8-bit RGB samples, so 1.0 only tolerates a single off-by-one sample.
pub const DEFAULT_PIXEL_DISTANCE_THRESHOLD: f64 = 1.0;

/// JPEG quality used when persisting kept frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Number of concurrent text-extraction calls.
pub const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;

/// Bitrate of the secondary WebM delivery artifact.
pub const DEFAULT_WEBM_BITRATE: &str = "5000k";

/// Minimum number of digits in a frame file's sequence number.
pub const MIN_SEQUENCE_DIGITS: usize = 6;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Duplicate-detection strategy used by the similarity engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityStrategy {
    /// Exact equality of normalized 256-bin grayscale histograms.
    #[default]
    Histogram,
    /// L2 pixel distance below a threshold, after resizing to the baseline.
    PixelDistance,
}

impl fmt::Display for SimilarityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityStrategy::Histogram => write!(f, "histogram"),
            SimilarityStrategy::PixelDistance => write!(f, "pixel"),
        }
    }
}

impl FromStr for SimilarityStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "histogram" | "hist" => Ok(SimilarityStrategy::Histogram),
            "pixel" | "pixel_distance" | "pixel-distance" => Ok(SimilarityStrategy::PixelDistance),
            other => Err(CoreError::Config(format!(
                "Unknown similarity strategy '{other}' (expected histogram or pixel)"
            ))),
        }
    }
}

/// Container format of a re-assembled video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Webm,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "webm" => Ok(OutputFormat::Webm),
            other => Err(CoreError::Config(format!(
                "Unknown output format '{other}' (expected mp4 or webm)"
            ))),
        }
    }
}

/// Image encoding of persisted frame files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl FrameImageFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            FrameImageFormat::Jpeg => "jpg",
            FrameImageFormat::Png => "png",
        }
    }

    /// MIME type used when the frame is sent inline to a remote service.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            FrameImageFormat::Jpeg => "image/jpeg",
            FrameImageFormat::Png => "image/png",
        }
    }
}

impl FromStr for FrameImageFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FrameImageFormat::Jpeg),
            "png" => Ok(FrameImageFormat::Png),
            other => Err(CoreError::Config(format!(
                "Unknown frame image format '{other}' (expected jpeg or png)"
            ))),
        }
    }
}

/// Main configuration structure for the framecull-core library.
///
/// The first five fields are the pipeline knobs; the rest control where runs
/// live, how frames are stored and how long collaborators may block.
///
/// # Examples
///
/// ```rust
/// use framecull_core::config::{CoreConfigBuilder, OutputFormat, SimilarityStrategy};
///
/// let config = CoreConfigBuilder::new()
///     .target_fps(5.0)
///     .similarity_strategy(SimilarityStrategy::PixelDistance)
///     .output_formats(vec![OutputFormat::Mp4, OutputFormat::Webm])
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Replaces the frame rate declared by the source container.
    pub source_fps_override: Option<f64>,

    /// Sampling cadence. `None` considers every decoded frame.
    pub target_fps: Option<f64>,

    pub similarity_strategy: SimilarityStrategy,

    /// Pixel-distance threshold. Ignored by the histogram strategy.
    pub duplicate_threshold: f64,

    /// Re-assembly formats. The first entry is encoded from frames, later
    /// entries are transcoded from it.
    pub output_formats: Vec<OutputFormat>,

    /// Root under which fresh per-run directories are created.
    pub work_dir: PathBuf,

    pub output_fps: f64,

    pub frame_image_format: FrameImageFormat,

    pub jpeg_quality: u8,

    /// Upper bound on concurrent text-extraction calls.
    pub extraction_concurrency: usize,

    pub extraction_timeout: Duration,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,

    /// Delete the acquired source video once all dependent stages are done.
    pub remove_source_after_run: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            source_fps_override: None,
            target_fps: None,
            similarity_strategy: SimilarityStrategy::default(),
            duplicate_threshold: DEFAULT_PIXEL_DISTANCE_THRESHOLD,
            output_formats: vec![OutputFormat::Mp4],
            work_dir: PathBuf::from("."),
            output_fps: DEFAULT_OUTPUT_FPS,
            frame_image_format: FrameImageFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            extraction_concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            remove_source_after_run: false,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with defaults rooted at `work_dir`.
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            ..Self::default()
        }
    }

    /// Checks that every value is usable before a run starts.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(fps) = self.source_fps_override {
            validate_rate("source_fps_override", fps)?;
        }
        if let Some(fps) = self.target_fps {
            validate_rate("target_fps", fps)?;
        }
        validate_rate("output_fps", self.output_fps)?;

        if !self.duplicate_threshold.is_finite() || self.duplicate_threshold < 0.0 {
            return Err(CoreError::Config(format!(
                "duplicate_threshold must be a finite, non-negative number (got {})",
                self.duplicate_threshold
            )));
        }

        if self.output_formats.is_empty() {
            return Err(CoreError::Config(
                "output_formats must contain at least one format".to_string(),
            ));
        }
        for (i, format) in self.output_formats.iter().enumerate() {
            if self.output_formats[..i].contains(format) {
                return Err(CoreError::Config(format!(
                    "output format '{format}' listed more than once"
                )));
            }
        }

        if self.extraction_concurrency == 0 {
            return Err(CoreError::Config(
                "extraction_concurrency must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CoreError::Config(format!(
                "jpeg_quality must be between 1 and 100 (got {})",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

fn validate_rate(name: &str, value: f64) -> CoreResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::Config(format!(
            "{name} must be a positive frame rate (got {value})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_rates() {
        let mut config = CoreConfig::default();
        config.target_fps = Some(0.0);
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = CoreConfig::default();
        config.output_fps = f64::NAN;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_and_empty_formats() {
        let mut config = CoreConfig::default();
        config.output_formats.clear();
        assert!(config.validate().is_err());

        config.output_formats = vec![OutputFormat::Mp4, OutputFormat::Mp4];
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!(
            "pixel".parse::<SimilarityStrategy>().unwrap(),
            SimilarityStrategy::PixelDistance
        );
        assert_eq!(
            "Histogram".parse::<SimilarityStrategy>().unwrap(),
            SimilarityStrategy::Histogram
        );
        assert!("ssim".parse::<SimilarityStrategy>().is_err());
    }
}
