mod common;

use common::{SyntheticSource, five_static_five_distinct, solid};
use framecull_core::assemble::assemble_quiet;
use framecull_core::pipeline::{RESULTS_CSV_FILE, RESULTS_JSON_FILE};
use framecull_core::run::{LOCK_FILE, RUN_INDEX_FILE, RunIndex};
use framecull_core::{
    ArtifactUploader, CoreConfig, CoreConfigBuilder, CoreError, CoreResult, ExtractionOutcome,
    Frame, FrameRecord, FrameSource, Interruption, NullReporter, OutputFormat, Pipeline,
    PipelineRun, Stages, TextExtractor, VideoEncoder, extract_all,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::tempdir;

fn config(work_dir: &Path) -> CoreConfig {
    CoreConfigBuilder::new()
        .work_dir(work_dir.to_path_buf())
        .output_formats(vec![OutputFormat::Mp4, OutputFormat::Webm])
        .extraction_concurrency(3)
        .build()
}

fn dedupe_frames(pipeline: &Pipeline<'_>, frames: Vec<image::RgbImage>) -> CoreResult<PipelineRun> {
    let mut source = SyntheticSource::new(frames, 30.0);
    pipeline.dedupe_source(&mut source, "lecture.mp4", Path::new("lecture.mp4"), None)
}

/// Encoder that records what it was asked to do and writes a marker file.
#[derive(Default)]
struct RecordingEncoder {
    encoded: Mutex<Vec<Vec<u64>>>,
    transcoded: Mutex<Vec<(PathBuf, OutputFormat)>>,
    fail: bool,
}

impl VideoEncoder for RecordingEncoder {
    fn encode_frames(
        &self,
        frames: &[FrameRecord],
        _width: u32,
        _height: u32,
        _fps: f64,
        format: OutputFormat,
        destination: &Path,
    ) -> CoreResult<()> {
        std::fs::write(destination, format!("{format}"))?;
        if self.fail {
            return Err(CoreError::OperationFailed("encoder crashed".to_string()));
        }
        let sequences = frames.iter().map(|f| f.sequence).collect();
        self.encoded.lock().unwrap().push(sequences);
        Ok(())
    }

    fn transcode(&self, primary: &Path, format: OutputFormat, destination: &Path) -> CoreResult<()> {
        std::fs::write(destination, format!("{format}"))?;
        self.transcoded
            .lock()
            .unwrap()
            .push((primary.to_path_buf(), format));
        Ok(())
    }
}

/// Fails on bright frames and reports the gray level of dark ones.
struct BrightnessExtractor;

impl TextExtractor for BrightnessExtractor {
    fn extract_text(&self, image_bytes: &[u8], _mime_type: &str) -> CoreResult<String> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();
        let level = image.get_pixel(0, 0)[0];
        if level > 150 {
            return Err(CoreError::ExtractionFailed("rate limited".to_string()));
        }
        Ok(format!("level {}", level / 10))
    }
}

#[derive(Default)]
struct RecordingUploader {
    uploaded: Mutex<Vec<PathBuf>>,
    /// Rejects every upload once this many have succeeded.
    accept_only: Option<usize>,
}

impl ArtifactUploader for RecordingUploader {
    fn upload_artifact(&self, local_path: &Path) -> CoreResult<String> {
        let mut uploaded = self.uploaded.lock().unwrap();
        if self.accept_only.is_some_and(|limit| uploaded.len() >= limit) {
            return Err(CoreError::UploadFailed("storage quota exceeded".to_string()));
        }
        uploaded.push(local_path.to_path_buf());
        Ok(format!("https://store.example/{}", local_path.display()))
    }
}

#[test]
fn run_index_hands_frames_to_later_stages() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, five_static_five_distinct())?;
    let dir = run.dir().to_path_buf();
    assert!(dir.join(RUN_INDEX_FILE).is_file());
    drop(run);

    let reopened = PipelineRun::open(&dir)?;
    let index = reopened.index().ok_or("index missing")?;
    assert_eq!(index.unique_count, 6);
    assert_eq!(index.duplicate_count, 4);
    assert_eq!(index.artifact_stem(), "lecture_deduplicated");
    for (position, record) in reopened.frames().iter().enumerate() {
        assert_eq!(record.sequence, position as u64);
        assert_eq!(record.path, dir.join(&record.file_name));
        assert!(record.path.is_file());
    }
    Ok(())
}

#[test]
fn open_run_is_locked_against_a_second_stage() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, vec![solid(10), solid(90)])?;

    let result = PipelineRun::open(run.dir());
    assert!(matches!(result, Err(CoreError::DirectoryLocked(_))));
    Ok(())
}

#[test]
fn extraction_yields_one_entry_per_frame_despite_failures() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let values = [25u8, 200, 60, 220, 100, 240, 140];
    let run = dedupe_frames(&pipeline, values.iter().map(|&v| solid(v)).collect())?;

    let entries = extract_all(&BrightnessExtractor, run.frames(), 3, &NullReporter)?;
    assert_eq!(entries.len(), values.len());
    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..values.len() as u64).collect::<Vec<_>>());

    let failed: Vec<u64> = entries
        .iter()
        .filter(|e| e.is_failed())
        .map(|e| e.sequence)
        .collect();
    assert_eq!(failed, vec![1, 3, 5]);
    assert_eq!(entries[0].outcome, ExtractionOutcome::Text("level 2".to_string()));
    Ok(())
}

#[test]
fn extraction_of_empty_set_reports_nothing_to_process() {
    let result = extract_all(&BrightnessExtractor, &[], 2, &NullReporter);
    assert!(matches!(result, Err(CoreError::EmptyFrameSet(_))));
}

#[test]
fn assembling_empty_set_writes_no_file() -> Result<(), Box<dyn Error>> {
    let out = tempdir()?;
    let encoder = RecordingEncoder::default();
    let result = assemble_quiet(&encoder, &[], 30.0, &[OutputFormat::Mp4], out.path(), "empty");

    assert!(matches!(result, Err(CoreError::EmptyFrameSet(_))));
    assert!(!out.path().join("empty.mp4").exists());
    assert!(encoder.encoded.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn assembly_feeds_frames_in_sequence_order() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, five_static_five_distinct())?;

    let mut shuffled = run.frames().to_vec();
    shuffled.reverse();
    let out = tempdir()?;
    let encoder = RecordingEncoder::default();
    let artifacts = assemble_quiet(
        &encoder,
        &shuffled,
        30.0,
        &[OutputFormat::Mp4, OutputFormat::Webm],
        out.path(),
        "talk",
    )?;

    assert_eq!(*encoder.encoded.lock().unwrap(), vec![vec![0, 1, 2, 3, 4, 5]]);
    let transcoded = encoder.transcoded.lock().unwrap();
    assert_eq!(
        *transcoded,
        vec![(out.path().join("talk.mp4"), OutputFormat::Webm)]
    );
    assert_eq!(artifacts.len(), 2);
    assert!((artifacts[0].duration_secs() - 0.2).abs() < 1e-9);
    assert!(artifacts.iter().all(|a| a.path.is_file() && a.frame_count == 6));
    Ok(())
}

#[test]
fn failed_encode_leaves_no_artifact() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, vec![solid(10), solid(90)])?;

    let out = tempdir()?;
    let encoder = RecordingEncoder {
        fail: true,
        ..Default::default()
    };
    let result = assemble_quiet(&encoder, run.frames(), 30.0, &[OutputFormat::Mp4], out.path(), "talk");

    assert!(matches!(result, Err(CoreError::OperationFailed(_))));
    assert_eq!(std::fs::read_dir(out.path())?.count(), 0);
    Ok(())
}

#[test]
fn all_stages_run_against_one_run() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let mut run = dedupe_frames(&pipeline, five_static_five_distinct())?;

    let encoder = RecordingEncoder::default();
    let uploader = RecordingUploader::default();
    let stages = Stages {
        extractor: Some(&BrightnessExtractor),
        encoder: Some(&encoder),
        uploader: Some(&uploader),
    };
    let result = pipeline.run_stages(&mut run, &stages)?;

    assert!(result.skipped_stages.is_empty());
    assert_eq!(result.extracted_text.as_ref().map(Vec::len), Some(6));
    assert!(run.dir().join(RESULTS_CSV_FILE).is_file());
    assert!(run.dir().join(RESULTS_JSON_FILE).is_file());
    let csv = std::fs::read_to_string(run.dir().join(RESULTS_CSV_FILE))?;
    assert!(csv.starts_with("Image_Name,Extracted_Text\r\n"));
    assert!(csv.contains("frame_000004.jpg,ERROR: "));

    assert_eq!(result.artifacts.len(), 2);
    assert_eq!(result.uploaded_urls.len(), 2);
    assert_eq!(uploader.uploaded.lock().unwrap().len(), 2);
    let index = run.index().ok_or("index missing")?;
    assert_eq!(
        index.artifacts,
        vec!["lecture_deduplicated.mp4", "lecture_deduplicated.webm"]
    );
    Ok(())
}

#[test]
fn failed_upload_keeps_urls_already_uploaded() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let mut run = dedupe_frames(&pipeline, five_static_five_distinct())?;

    let encoder = RecordingEncoder::default();
    let uploader = RecordingUploader {
        accept_only: Some(1),
        ..Default::default()
    };
    let stages = Stages {
        encoder: Some(&encoder),
        uploader: Some(&uploader),
        ..Default::default()
    };
    let result = pipeline.run_stages(&mut run, &stages)?;

    assert_eq!(result.artifacts.len(), 2);
    assert_eq!(result.uploaded_urls.len(), 1);
    assert!(result.uploaded_urls[0].ends_with("lecture_deduplicated.mp4"));
    assert_eq!(result.upload_failure.as_deref(), Some("storage quota exceeded"));
    Ok(())
}

#[test]
fn stages_are_skipped_when_nothing_was_kept() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let mut run = dedupe_frames(&pipeline, Vec::new())?;
    assert!(run.frames().is_empty());

    let encoder = RecordingEncoder::default();
    let uploader = RecordingUploader::default();
    let stages = Stages {
        extractor: Some(&BrightnessExtractor),
        encoder: Some(&encoder),
        uploader: Some(&uploader),
    };
    let result = pipeline.run_stages(&mut run, &stages)?;

    assert_eq!(result.skipped_stages, vec!["extract text", "assemble", "upload"]);
    assert!(result.artifacts.is_empty());
    assert!(uploader.uploaded.lock().unwrap().is_empty());
    assert!(!run.dir().join(RESULTS_CSV_FILE).exists());
    Ok(())
}

#[test]
fn failed_dedup_leaves_no_run_directory() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let mut source = SyntheticSource::new(five_static_five_distinct(), 30.0).unreadable();
    let result = pipeline.dedupe_source(&mut source, "broken.mp4", Path::new("broken.mp4"), None);

    assert!(matches!(result, Err(CoreError::SourceUnreadable(_))));
    assert_eq!(std::fs::read_dir(work.path())?.count(), 0);
    Ok(())
}

/// Frame source that blocks one frame file name in the run directory just
/// before that frame is produced.
struct CollidingSource {
    inner: SyntheticSource,
    work_dir: PathBuf,
    collide_at: u64,
    produced: u64,
}

impl FrameSource for CollidingSource {
    fn frame_rate(&self) -> f64 {
        self.inner.frame_rate()
    }

    fn expected_frame_count(&self) -> Option<u64> {
        self.inner.expected_frame_count()
    }

    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        if self.produced == self.collide_at {
            for entry in std::fs::read_dir(&self.work_dir)? {
                let run_dir = entry?.path();
                if run_dir.is_dir() {
                    std::fs::create_dir(run_dir.join(format!("frame_{:06}.jpg", self.collide_at)))?;
                }
            }
        }
        self.produced += 1;
        self.inner.next_frame()
    }
}

#[test]
fn failed_frame_write_keeps_run_and_earlier_frames() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let frames = (0..6).map(|i| solid(i * 40)).collect();
    let mut source = CollidingSource {
        inner: SyntheticSource::new(frames, 30.0),
        work_dir: work.path().to_path_buf(),
        collide_at: 3,
        produced: 0,
    };

    let run = pipeline.dedupe_source(&mut source, "lecture.mp4", Path::new("lecture.mp4"), None)?;
    let dir = run.dir().to_path_buf();
    drop(run);

    let reopened = PipelineRun::open(&dir)?;
    let index = reopened.index().ok_or("index missing")?;
    assert!(matches!(
        index.interruption,
        Some(Interruption::WriteFailed { after_decoded: 4, .. })
    ));
    assert_eq!(reopened.frames().len(), 3);
    for record in reopened.frames() {
        assert!(record.path.is_file());
    }
    Ok(())
}

#[test]
fn decode_failure_hands_partial_frames_to_later_stages() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let mut source = SyntheticSource::new(five_static_five_distinct(), 30.0).failing_after(7);
    let run = pipeline.dedupe_source(&mut source, "lecture.mp4", Path::new("lecture.mp4"), None)?;
    let dir = run.dir().to_path_buf();
    drop(run);

    let index: RunIndex = serde_json::from_slice(&std::fs::read(dir.join(RUN_INDEX_FILE))?)?;
    assert!(matches!(
        index.interruption,
        Some(Interruption::DecodeFailed { after_decoded: 7, .. })
    ));

    let mut reopened = PipelineRun::open(&dir)?;
    let kept: Vec<u64> = reopened.frames().iter().map(|r| r.source_index).collect();
    assert_eq!(kept, vec![0, 5, 6]);

    let encoder = RecordingEncoder::default();
    let artifacts = pipeline.assemble(&encoder, &mut reopened, None)?;
    assert_eq!(artifacts[0].frame_count, 3);
    assert_eq!(*encoder.encoded.lock().unwrap(), vec![vec![0, 1, 2]]);
    Ok(())
}

#[cfg(unix)]
#[test]
fn run_left_locked_by_exited_process_can_be_reopened() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, vec![solid(10), solid(90)])?;
    let dir = run.dir().to_path_buf();
    // Lock never released, as after a killed process.
    std::mem::forget(run);
    let mut interrupted = std::process::Command::new("true").spawn()?;
    let dead_pid = interrupted.id();
    interrupted.wait()?;
    std::fs::write(dir.join(LOCK_FILE), format!("{dead_pid}\n"))?;

    let reopened = PipelineRun::open(&dir)?;
    assert_eq!(reopened.frames().len(), 2);
    assert!(matches!(
        PipelineRun::open(&dir),
        Err(CoreError::DirectoryLocked(_))
    ));
    Ok(())
}

#[test]
fn cleanup_removes_run_directory() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let pipeline = Pipeline::new(config(work.path()))?;
    let run = dedupe_frames(&pipeline, vec![solid(10), solid(90)])?;
    let dir = run.dir().to_path_buf();

    run.cleanup()?;
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let config = CoreConfigBuilder::new().duplicate_threshold(-1.0).build();
    assert!(matches!(Pipeline::new(config), Err(CoreError::Config(_))));
}

// Needs ffmpeg and ffprobe on PATH.
#[test]
#[ignore]
fn reassembled_video_has_one_frame_per_kept_frame() -> Result<(), Box<dyn Error>> {
    use framecull_core::FfmpegVideoEncoder;
    use framecull_core::external::{CrateFfprobeExecutor, FfprobeExecutor, SidecarSpawner};

    let work = tempdir()?;
    let config = CoreConfigBuilder::new()
        .work_dir(work.path().to_path_buf())
        .output_fps(10.0)
        .build();
    let pipeline = Pipeline::new(config)?;
    let mut run = dedupe_frames(&pipeline, five_static_five_distinct())?;

    let encoder = FfmpegVideoEncoder::new(SidecarSpawner);
    let artifacts = pipeline.assemble(&encoder, &mut run, None)?;
    let properties = CrateFfprobeExecutor::new().probe_source(&artifacts[0].path)?;

    assert_eq!(properties.frame_count, Some(6));
    let duration = properties.duration_secs.ok_or("no duration")?;
    assert!((duration - 0.6).abs() < 0.05, "duration {duration}");

    let spawner = SidecarSpawner;
    let prober = CrateFfprobeExecutor::new();
    let rerun = pipeline.dedupe(&spawner, &prober, &artifacts[0].path, "round trip")?;
    assert_eq!(rerun.index().map(|i| i.decoded_count), Some(6));
    Ok(())
}
