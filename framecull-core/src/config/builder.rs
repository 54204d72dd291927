// ============================================================================
// framecull-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of CoreConfig. Unset fields keep the defaults declared
// in config/mod.rs; `build` does not validate, callers run
// `CoreConfig::validate` before starting a pipeline.

// ---- Standard library imports ----
use std::path::PathBuf;
use std::time::Duration;

// ---- Internal crate imports ----
use super::{CoreConfig, FrameImageFormat, OutputFormat, SimilarityStrategy};

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use framecull_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .work_dir(PathBuf::from("/tmp/framecull"))
///     .target_fps(1.0)
///     .duplicate_threshold(2.5)
///     .build();
/// assert_eq!(config.target_fps, Some(1.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// Creates a new CoreConfigBuilder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root directory for per-run directories.
    pub fn work_dir(mut self, work_dir: PathBuf) -> Self {
        self.config.work_dir = work_dir;
        self
    }

    /// Overrides the frame rate declared by the source.
    pub fn source_fps_override(mut self, fps: f64) -> Self {
        self.config.source_fps_override = Some(fps);
        self
    }

    /// Enables fixed-cadence sampling at `fps` frames per second.
    pub fn target_fps(mut self, fps: f64) -> Self {
        self.config.target_fps = Some(fps);
        self
    }

    pub fn similarity_strategy(mut self, strategy: SimilarityStrategy) -> Self {
        self.config.similarity_strategy = strategy;
        self
    }

    pub fn duplicate_threshold(mut self, threshold: f64) -> Self {
        self.config.duplicate_threshold = threshold;
        self
    }

    /// Sets the re-assembly formats, dropping repeats while keeping order.
    pub fn output_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        let mut unique = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        self.config.output_formats = unique;
        self
    }

    pub fn output_fps(mut self, fps: f64) -> Self {
        self.config.output_fps = fps;
        self
    }

    pub fn frame_image_format(mut self, format: FrameImageFormat) -> Self {
        self.config.frame_image_format = format;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn extraction_concurrency(mut self, concurrency: usize) -> Self {
        self.config.extraction_concurrency = concurrency;
        self
    }

    pub fn extraction_timeout(mut self, timeout: Duration) -> Self {
        self.config.extraction_timeout = timeout;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.config.upload_timeout = timeout;
        self
    }

    pub fn remove_source_after_run(mut self, remove: bool) -> Self {
        self.config.remove_source_after_run = remove;
        self
    }

    /// Builds the CoreConfig.
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_first_occurrence_order() {
        let config = CoreConfigBuilder::new()
            .output_formats(vec![OutputFormat::Webm, OutputFormat::Mp4, OutputFormat::Webm])
            .build();
        assert_eq!(config.output_formats, vec![OutputFormat::Webm, OutputFormat::Mp4]);
    }

    #[test]
    fn builder_defaults_match_core_defaults() {
        let built = CoreConfigBuilder::new().build();
        let default = CoreConfig::default();
        assert_eq!(built.output_fps, default.output_fps);
        assert_eq!(built.duplicate_threshold, default.duplicate_threshold);
        assert_eq!(built.target_fps, None);
    }
}
