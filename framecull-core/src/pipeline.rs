// ============================================================================
// framecull-core/src/pipeline.rs
// ============================================================================
//
// PIPELINE: Stage Orchestration over an Explicit PipelineRun
//
// Control flow:
//   acquire -> decode -> sample -> dedupe (frames + run.json)
//           -> [extract text] -> [re-assemble] -> [upload]
//
// Each stage receives the run it works on. The dedup stage creates it; the
// other stages read the ordered frame records from it, never from a directory
// listing. A stage with no kept frames is skipped with a "nothing to process"
// note instead of producing degenerate output.

use crate::acquisition::{AcquiredVideo, VideoAcquirer, VideoSource};
use crate::assemble::{VideoArtifact, VideoEncoder, assemble};
use crate::config::CoreConfig;
use crate::decoder::{FfmpegFrameDecoder, FrameSource};
use crate::error::{CoreError, CoreResult};
use crate::extraction::{ExtractionEntry, TextExtractor, extract_all, write_results_csv, write_results_json};
use crate::external::{FfmpegSpawner, FfprobeExecutor, SourceProperties};
use crate::reporting::{NullReporter, Reporter};
use crate::run::{PipelineRun, RunIndex};
use crate::upload::ArtifactUploader;
use crate::writer::{CancellationToken, DedupWriter, FrameRecord, Interruption};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name of the CSV result table inside a run directory.
pub const RESULTS_CSV_FILE: &str = "results.csv";
/// File name of the JSON result table inside a run directory.
pub const RESULTS_JSON_FILE: &str = "results.json";

/// Optional collaborators for the stages after dedup. A missing collaborator
/// skips its stage.
#[derive(Default)]
pub struct Stages<'c> {
    pub extractor: Option<&'c dyn TextExtractor>,
    pub encoder: Option<&'c dyn VideoEncoder>,
    pub uploader: Option<&'c dyn ArtifactUploader>,
}

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_dir: PathBuf,
    pub unique_count: u64,
    pub duplicate_count: u64,
    pub frames: Vec<FrameRecord>,
    pub interruption: Option<Interruption>,
    pub extracted_text: Option<Vec<ExtractionEntry>>,
    pub results_table: Option<PathBuf>,
    pub artifacts: Vec<VideoArtifact>,
    pub uploaded_urls: Vec<String>,
    /// Why uploading stopped early. URLs uploaded before the failure stay in
    /// `uploaded_urls`.
    pub upload_failure: Option<String>,
    /// Stages that were skipped because there was nothing to process.
    pub skipped_stages: Vec<String>,
}

/// Pipeline configured once and reused for any number of runs.
pub struct Pipeline<'a> {
    config: CoreConfig,
    reporter: &'a dyn Reporter,
    cancel: CancellationToken,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reporter: &NullReporter,
            cancel: CancellationToken::new(),
        })
    }

    pub fn reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Dedup
    // ------------------------------------------------------------------------

    /// Decodes `video`, drops duplicates and records the kept frames in a
    /// fresh run.
    ///
    /// Fails with `SourceUnreadable` when the video cannot be opened or
    /// breaks before its first frame; no run directory is left behind then.
    pub fn dedupe<S, E>(
        &self,
        spawner: &S,
        prober: &E,
        video: &Path,
        source_label: &str,
    ) -> CoreResult<PipelineRun>
    where
        S: FfmpegSpawner,
        E: FfprobeExecutor,
    {
        self.reporter
            .stage_started("dedupe", &format!("{}", video.display()));
        let mut decoder =
            FfmpegFrameDecoder::open(spawner, prober, video, self.config.source_fps_override)?;
        let properties = decoder.properties().clone();
        self.dedupe_source(&mut decoder, source_label, video, Some(properties))
    }

    /// Dedup over any frame source.
    pub fn dedupe_source<F: FrameSource + ?Sized>(
        &self,
        source: &mut F,
        source_label: &str,
        source_file: &Path,
        properties: Option<SourceProperties>,
    ) -> CoreResult<PipelineRun> {
        let mut run = PipelineRun::create(&self.config.work_dir)?;
        let writer = DedupWriter::from_config(&self.config, run.dir())
            .reporter(self.reporter)
            .cancellation(self.cancel.clone());

        let outcome = match writer.run(source) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Dedup of {} failed: {}", source_label, e);
                if let Err(cleanup_err) = run.cleanup() {
                    log::warn!("Could not remove failed run directory: {}", cleanup_err);
                }
                return Err(e);
            }
        };

        run.record_dedup(RunIndex::from_outcome(
            source_label,
            source_file,
            properties,
            &self.config,
            &outcome,
        ))?;
        self.reporter.stage_complete(&format!(
            "kept {} frames, dropped {} duplicates",
            outcome.unique_count, outcome.duplicate_count
        ));
        Ok(run)
    }

    // ------------------------------------------------------------------------
    // Later stages
    // ------------------------------------------------------------------------

    /// Re-assembles the run's frames in every configured format.
    ///
    /// Artifacts go to `output_dir`, or the run directory when `None`.
    pub fn assemble<E: VideoEncoder + ?Sized>(
        &self,
        encoder: &E,
        run: &mut PipelineRun,
        output_dir: Option<&Path>,
    ) -> CoreResult<Vec<VideoArtifact>> {
        let index = run.index().ok_or_else(|| {
            CoreError::RunIndex(format!("{} has no dedup result", run.dir().display()))
        })?;
        let stem = index.artifact_stem();
        let dir = output_dir.map_or_else(|| run.dir().to_path_buf(), Path::to_path_buf);

        self.reporter.stage_started(
            "assemble",
            &format!("{} frames at {} fps", index.frames.len(), self.config.output_fps),
        );
        let artifacts = assemble(
            encoder,
            run.frames(),
            self.config.output_fps,
            &self.config.output_formats,
            &dir,
            &stem,
            self.reporter,
        )?;

        let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        run.record_artifacts(&paths)?;
        self.reporter
            .stage_complete(&format!("{} video artifact(s) written", artifacts.len()));
        Ok(artifacts)
    }

    /// Extracts text from every kept frame, in sequence order.
    pub fn extract_all_text<T: TextExtractor + ?Sized>(
        &self,
        extractor: &T,
        run: &PipelineRun,
    ) -> CoreResult<Vec<ExtractionEntry>> {
        self.reporter
            .stage_started("extract text", &format!("{} frames", run.frames().len()));
        let entries = extract_all(
            extractor,
            run.frames(),
            self.config.extraction_concurrency,
            self.reporter,
        )?;
        let failed = entries.iter().filter(|e| e.is_failed()).count();
        if failed > 0 {
            self.reporter
                .warning(&format!("{failed} of {} frames failed extraction", entries.len()));
        }
        self.reporter
            .stage_complete(&format!("{} result entries", entries.len()));
        Ok(entries)
    }

    // ------------------------------------------------------------------------
    // Full run
    // ------------------------------------------------------------------------

    /// Acquires `input`, dedupes it and runs every stage that has a
    /// collaborator in `stages`.
    ///
    /// Acquisition failures are returned as-is. A failed upload ends the
    /// upload stage and is recorded in `upload_failure` next to the URLs
    /// already uploaded. The run directory and its `run.json` stay in place,
    /// so completed stages are not lost.
    pub fn process<S, E>(
        &self,
        input: &str,
        acquirer: &dyn VideoAcquirer,
        spawner: &S,
        prober: &E,
        stages: &Stages<'_>,
    ) -> CoreResult<PipelineResult>
    where
        S: FfmpegSpawner,
        E: FfprobeExecutor,
    {
        let source = VideoSource::classify(input)?;
        self.reporter.stage_started("acquire", &source.to_string());
        let acquired = acquirer.acquire_video(&source, &self.config.work_dir.join("downloads"))?;
        log::info!("Source available at {}", acquired.path.display());

        let result = self.process_acquired(&source, &acquired, spawner, prober, stages);
        self.remove_source(&acquired);
        result
    }

    fn process_acquired<S, E>(
        &self,
        source: &VideoSource,
        acquired: &AcquiredVideo,
        spawner: &S,
        prober: &E,
        stages: &Stages<'_>,
    ) -> CoreResult<PipelineResult>
    where
        S: FfmpegSpawner,
        E: FfprobeExecutor,
    {
        let mut run = self.dedupe(spawner, prober, &acquired.path, &source.to_string())?;
        self.run_stages(&mut run, stages)
    }

    /// Runs the post-dedup stages on an existing run.
    pub fn run_stages(&self, run: &mut PipelineRun, stages: &Stages<'_>) -> CoreResult<PipelineResult> {
        let index = run.index().cloned().ok_or_else(|| {
            CoreError::RunIndex(format!("{} has no dedup result", run.dir().display()))
        })?;

        let mut result = PipelineResult {
            run_dir: run.dir().to_path_buf(),
            unique_count: index.unique_count,
            duplicate_count: index.duplicate_count,
            frames: index.frames.clone(),
            interruption: index.interruption.clone(),
            extracted_text: None,
            results_table: None,
            artifacts: Vec::new(),
            uploaded_urls: Vec::new(),
            upload_failure: None,
            skipped_stages: Vec::new(),
        };

        if let Some(extractor) = stages.extractor {
            match self.extract_all_text(extractor, run) {
                Ok(entries) => {
                    let csv_path = run.dir().join(RESULTS_CSV_FILE);
                    write_results_csv(&entries, &csv_path)?;
                    write_results_json(&entries, &run.dir().join(RESULTS_JSON_FILE))?;
                    result.results_table = Some(csv_path);
                    result.extracted_text = Some(entries);
                }
                Err(e) if e.is_nothing_to_process() => self.skip(&mut result, "extract text"),
                Err(e) => return Err(e),
            }
        }

        if let Some(encoder) = stages.encoder {
            match self.assemble(encoder, run, None) {
                Ok(artifacts) => result.artifacts = artifacts,
                Err(e) if e.is_nothing_to_process() => self.skip(&mut result, "assemble"),
                Err(e) => return Err(e),
            }
        }

        if let Some(uploader) = stages.uploader {
            if result.artifacts.is_empty() {
                self.skip(&mut result, "upload");
            } else {
                self.reporter
                    .stage_started("upload", &format!("{} artifact(s)", result.artifacts.len()));
                for artifact in &result.artifacts {
                    match uploader.upload_artifact(&artifact.path) {
                        Ok(url) => result.uploaded_urls.push(url),
                        Err(e) => {
                            log::error!("Upload of {} failed: {}", artifact.path.display(), e);
                            self.reporter.warning(&e.to_string());
                            result.upload_failure = Some(match e {
                                CoreError::UploadFailed(reason) => reason,
                                other => other.to_string(),
                            });
                            break;
                        }
                    }
                }
                self.reporter
                    .stage_complete(&format!("{} artifact(s) uploaded", result.uploaded_urls.len()));
            }
        }

        Ok(result)
    }

    fn skip(&self, result: &mut PipelineResult, stage: &str) {
        log::info!("Skipping {}: nothing to process", stage);
        self.reporter
            .warning(&format!("{stage}: nothing to process"));
        result.skipped_stages.push(stage.to_string());
    }

    /// Deletes a downloaded source once every dependent stage is done. Local
    /// inputs are never removed.
    fn remove_source(&self, acquired: &AcquiredVideo) {
        if !self.config.remove_source_after_run || !acquired.downloaded {
            return;
        }
        match std::fs::remove_file(&acquired.path) {
            Ok(()) => log::info!("Removed downloaded source {}", acquired.path.display()),
            Err(e) => log::warn!(
                "Could not remove downloaded source {}: {}",
                acquired.path.display(),
                e
            ),
        }
    }
}
