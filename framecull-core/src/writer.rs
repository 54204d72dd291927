// ============================================================================
// framecull-core/src/writer.rs
// ============================================================================
//
// DEDUPLICATING FRAME WRITER: decode -> sample -> fingerprint -> keep or drop
//
// State carried across frames:
// - the next sequence number (starts at 0, advances only on keep)
// - the duplicate counter (advances only on drop)
// - the fingerprint of the last kept frame (replaced only on keep)
//
// Kept frames are encoded into a temporary file in the output directory and
// renamed to `frame_<sequence>.<ext>`, so each frame file is either complete
// or absent. A decode failure after the first frame, or a failed frame write,
// ends the run but keeps what was already written; the outcome records why it
// stopped.

use crate::config::{CoreConfig, FrameImageFormat};
use crate::decoder::{Frame, FrameSource};
use crate::error::{CoreError, CoreResult};
use crate::reporting::{DedupProgress, NullReporter, Reporter};
use crate::sampler::Sampler;
use crate::similarity::{FrameFingerprint, SimilarityEngine, engine_for};
use crate::temp_files;
use crate::utils::{frame_file_name, sequence_digits};
use image::codecs::jpeg::JpegEncoder;
use image::ImageOutputFormat;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A kept frame persisted to disk. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Gap-free position among kept frames, starting at 0.
    pub sequence: u64,
    pub file_name: String,
    /// Index of the frame in the decoded stream.
    pub source_index: u64,
    pub timestamp: f64,
    /// Absolute location, rebuilt from the run directory when an index is loaded.
    #[serde(skip)]
    pub path: PathBuf,
}

/// Why a dedup run stopped before the end of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interruption {
    Cancelled { after_decoded: u64 },
    DecodeFailed { after_decoded: u64, reason: String },
    /// A kept frame could not be written. Earlier frames stay on disk.
    WriteFailed { after_decoded: u64, reason: String },
}

/// Result of one dedup pass.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub source_fps: f64,
    pub sampler: Sampler,
    pub decoded_count: u64,
    pub considered_count: u64,
    pub unique_count: u64,
    pub duplicate_count: u64,
    pub records: Vec<FrameRecord>,
    pub interruption: Option<Interruption>,
}

impl DedupOutcome {
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Cooperative cancellation flag checked after every frame-level step.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a frame source through sampling and duplicate detection and
/// persists the survivors.
pub struct DedupWriter<'a> {
    engine: Box<dyn SimilarityEngine>,
    output_dir: PathBuf,
    target_fps: Option<f64>,
    image_format: FrameImageFormat,
    jpeg_quality: u8,
    reporter: &'a dyn Reporter,
    cancel: CancellationToken,
}

impl<'a> DedupWriter<'a> {
    pub fn new(engine: Box<dyn SimilarityEngine>, output_dir: &Path) -> Self {
        Self {
            engine,
            output_dir: output_dir.to_path_buf(),
            target_fps: None,
            image_format: FrameImageFormat::default(),
            jpeg_quality: crate::config::DEFAULT_JPEG_QUALITY,
            reporter: &NullReporter,
            cancel: CancellationToken::new(),
        }
    }

    /// Writer configured from the pipeline configuration.
    pub fn from_config(config: &CoreConfig, output_dir: &Path) -> Self {
        Self::new(
            engine_for(config.similarity_strategy, config.duplicate_threshold),
            output_dir,
        )
        .target_fps(config.target_fps)
        .image_format(config.frame_image_format, config.jpeg_quality)
    }

    pub fn target_fps(mut self, target_fps: Option<f64>) -> Self {
        self.target_fps = target_fps;
        self
    }

    pub fn image_format(mut self, format: FrameImageFormat, jpeg_quality: u8) -> Self {
        self.image_format = format;
        self.jpeg_quality = jpeg_quality;
        self
    }

    pub fn reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the source until it ends, is cancelled, or a frame fails to
    /// decode or write.
    ///
    /// Fails with `SourceUnreadable` (and writes nothing) when the source
    /// breaks before its first frame.
    pub fn run<S: FrameSource + ?Sized>(&self, source: &mut S) -> CoreResult<DedupOutcome> {
        let source_fps = source.frame_rate();
        let expected_frames = source.expected_frame_count();
        let sampler = Sampler::new(source_fps, self.target_fps);
        let digits = sequence_digits(expected_frames);

        log::info!(
            "Deduplicating with {} strategy, source {:.3} fps, sampling interval {}",
            self.engine.strategy(),
            source_fps,
            sampler.interval()
        );

        let mut outcome = DedupOutcome {
            source_fps,
            sampler,
            decoded_count: 0,
            considered_count: 0,
            unique_count: 0,
            duplicate_count: 0,
            records: Vec::new(),
            interruption: None,
        };
        let mut previous: Option<FrameFingerprint> = None;

        loop {
            if self.cancel.is_cancelled() {
                log::warn!("Dedup cancelled after {} decoded frames", outcome.decoded_count);
                outcome.interruption = Some(Interruption::Cancelled {
                    after_decoded: outcome.decoded_count,
                });
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if outcome.decoded_count == 0 => {
                    return Err(match e {
                        CoreError::SourceUnreadable(_) => e,
                        other => CoreError::SourceUnreadable(other.to_string()),
                    });
                }
                Err(e) => {
                    log::error!(
                        "Decoding failed after {} frames, keeping {} frames already written: {}",
                        outcome.decoded_count,
                        outcome.unique_count,
                        e
                    );
                    self.reporter.warning(&format!("decode stopped early: {e}"));
                    outcome.interruption = Some(Interruption::DecodeFailed {
                        after_decoded: outcome.decoded_count,
                        reason: e.to_string(),
                    });
                    break;
                }
            };
            outcome.decoded_count += 1;

            if !sampler.should_consider(frame.index) {
                continue;
            }
            outcome.considered_count += 1;

            let fingerprint = self.engine.fingerprint(&frame.image);
            let duplicate = previous
                .as_ref()
                .is_some_and(|prev| self.engine.is_duplicate(prev, &fingerprint));

            if duplicate {
                outcome.duplicate_count += 1;
                log::debug!("Frame {} dropped as duplicate", frame.index);
            } else {
                let record = match self.persist(&frame, outcome.unique_count, digits) {
                    Ok(record) => record,
                    Err(e) => {
                        log::error!(
                            "Writing frame {} failed, keeping {} frames already written: {}",
                            frame.index,
                            outcome.unique_count,
                            e
                        );
                        self.reporter.warning(&format!("frame write failed: {e}"));
                        // Unwritten frame is neither kept nor dropped.
                        outcome.considered_count -= 1;
                        outcome.interruption = Some(Interruption::WriteFailed {
                            after_decoded: outcome.decoded_count,
                            reason: e.to_string(),
                        });
                        break;
                    }
                };
                log::debug!(
                    "Frame {} kept as {} ({:.3}s)",
                    frame.index,
                    record.file_name,
                    frame.timestamp
                );
                outcome.records.push(record);
                outcome.unique_count += 1;
                previous = Some(fingerprint);
            }

            self.reporter.frame_considered(&DedupProgress {
                decoded: outcome.decoded_count,
                considered: outcome.considered_count,
                unique: outcome.unique_count,
                duplicates: outcome.duplicate_count,
                expected_frames,
            });
        }

        log::info!(
            "Dedup finished: decoded {}, considered {}, kept {}, dropped {}",
            outcome.decoded_count,
            outcome.considered_count,
            outcome.unique_count,
            outcome.duplicate_count
        );
        Ok(outcome)
    }

    /// Writes one kept frame atomically.
    fn persist(&self, frame: &Frame, sequence: u64, digits: usize) -> CoreResult<FrameRecord> {
        let extension = self.image_format.extension();
        let file_name = frame_file_name(sequence, digits, extension);
        let path = self.output_dir.join(&file_name);

        let mut temp = temp_files::create_temp_file(&self.output_dir, "frame", extension)?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            match self.image_format {
                FrameImageFormat::Jpeg => {
                    JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
                        .encode_image(&frame.image)?;
                }
                FrameImageFormat::Png => {
                    frame.image.write_to(&mut out, ImageOutputFormat::Png)?;
                }
            }
            out.flush()?;
        }
        temp_files::persist_new(temp, &path)?;

        Ok(FrameRecord {
            sequence,
            file_name,
            source_index: frame.index,
            timestamp: frame.timestamp,
            path,
        })
    }
}
