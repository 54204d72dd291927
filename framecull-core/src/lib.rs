//! Core library for sampling, deduplicating and re-assembling video frames.
//!
//! A source video is decoded frame by frame, optionally thinned to a fixed
//! cadence, and every frame that is not a duplicate of the previous kept frame
//! is written to a fresh run directory. The kept frames can then be sent to a
//! vision model for text extraction, stitched back into a video at a fixed
//! frame rate, and uploaded.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use framecull_core::config::{CoreConfigBuilder, SimilarityStrategy};
//! use framecull_core::external::{CrateFfprobeExecutor, SidecarSpawner};
//! use framecull_core::{FfmpegVideoEncoder, Pipeline};
//! use std::path::{Path, PathBuf};
//!
//! let config = CoreConfigBuilder::new()
//!     .work_dir(PathBuf::from("/tmp/framecull"))
//!     .target_fps(1.0)
//!     .similarity_strategy(SimilarityStrategy::PixelDistance)
//!     .build();
//! let pipeline = Pipeline::new(config).unwrap();
//!
//! let mut run = pipeline
//!     .dedupe(&SidecarSpawner, &CrateFfprobeExecutor::new(), Path::new("talk.mp4"), "talk.mp4")
//!     .unwrap();
//! let encoder = FfmpegVideoEncoder::new(SidecarSpawner);
//! let artifacts = pipeline.assemble(&encoder, &mut run, None).unwrap();
//! println!("{} frames kept, wrote {:?}", run.frames().len(), artifacts);
//! ```

pub mod acquisition;
pub mod assemble;
pub mod config;
pub mod decoder;
pub mod error;
pub mod external;
pub mod extraction;
pub mod file_logging;
pub mod pipeline;
pub mod reporting;
pub mod run;
pub mod sampler;
pub mod similarity;
pub mod temp_files;
pub mod upload;
pub mod utils;
pub mod writer;

// Re-exports for public API
pub use acquisition::{AcquiredVideo, DefaultAcquirer, VideoAcquirer, VideoSource};
pub use assemble::{FfmpegVideoEncoder, VideoArtifact, VideoEncoder, assemble};
pub use config::{CoreConfig, CoreConfigBuilder, FrameImageFormat, OutputFormat, SimilarityStrategy};
pub use decoder::{FfmpegFrameDecoder, Frame, FrameSource};
pub use error::{CoreError, CoreResult};
pub use extraction::{
    ExtractionEntry, ExtractionOutcome, OpenAiVisionExtractor, TextExtractor, extract_all,
    write_results_csv, write_results_json,
};
pub use external::check_dependency;
pub use pipeline::{Pipeline, PipelineResult, Stages};
pub use reporting::{NullReporter, Reporter, TerminalReporter};
pub use run::{PipelineRun, RunIndex};
pub use sampler::Sampler;
pub use similarity::{FrameFingerprint, SimilarityEngine};
pub use upload::{ArtifactUploader, AzureBlobUploader};
pub use utils::{format_bytes, format_duration};
pub use writer::{CancellationToken, DedupOutcome, DedupWriter, FrameRecord, Interruption};
