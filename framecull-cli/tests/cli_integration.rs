use assert_cmd::Command;
use framecull_core::run::LOCK_FILE;
use framecull_core::{CoreConfig, CoreResult, Frame, FrameSource, Pipeline};
use image::{Rgb, RgbImage};
use predicates::str::contains;
use std::error::Error;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

// Helper function to get the path to the compiled binary
fn framecull_cmd() -> Command {
    let mut cmd = Command::cargo_bin("framecull").expect("Failed to find framecull binary");
    cmd.arg("--no-log");
    cmd
}

/// Gray frames with distinct levels, so every frame is kept.
struct Gradient {
    remaining: Vec<u8>,
    index: u64,
}

impl FrameSource for Gradient {
    fn frame_rate(&self) -> f64 {
        25.0
    }

    fn expected_frame_count(&self) -> Option<u64> {
        None
    }

    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        let Some(level) = self.remaining.pop() else {
            return Ok(None);
        };
        let frame = Frame::new(self.index, 25.0, RgbImage::from_pixel(8, 8, Rgb([level; 3])));
        self.index += 1;
        Ok(Some(frame))
    }
}

/// Creates an unlocked run directory with `frames` kept frames.
fn make_run(work_dir: &Path, frames: u8) -> Result<PathBuf, Box<dyn Error>> {
    let pipeline = Pipeline::new(CoreConfig::new(work_dir.to_path_buf()))?;
    let mut source = Gradient {
        remaining: (0..frames).map(|i| i * 30).collect(),
        index: 0,
    };
    let run = pipeline.dedupe_source(&mut source, "clip.mp4", Path::new("clip.mp4"), None)?;
    Ok(run.dir().to_path_buf())
}

#[test]
fn test_help_lists_commands() -> Result<(), Box<dyn Error>> {
    let mut cmd = framecull_cmd();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(contains("dedupe"))
        .stdout(contains("extract-text"))
        .stdout(contains("cleanup"));
    Ok(())
}

#[test]
fn test_dedupe_non_existent_input() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let mut cmd = framecull_cmd();
    cmd.arg("dedupe")
        .arg("--input")
        .arg("surely/this/does/not/exist/input.mp4")
        .arg("--work-dir")
        .arg(work.path());

    cmd.assert().failure().stderr(contains("does not exist"));
    assert_eq!(std::fs::read_dir(work.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_dedupe_rejects_unknown_strategy() -> Result<(), Box<dyn Error>> {
    let mut cmd = framecull_cmd();
    cmd.arg("dedupe")
        .arg("--input")
        .arg("talk.mp4")
        .arg("--strategy")
        .arg("perceptual");

    cmd.assert()
        .failure()
        .stderr(contains("Unknown similarity strategy"));
    Ok(())
}

#[test]
fn test_process_upload_requires_assemble() -> Result<(), Box<dyn Error>> {
    let mut cmd = framecull_cmd();
    cmd.arg("process")
        .arg("--input")
        .arg("talk.mp4")
        .arg("--upload");

    cmd.assert().failure().stderr(contains("--assemble"));
    Ok(())
}

#[test]
fn test_assemble_empty_run_is_nothing_to_process() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 0)?;

    let mut cmd = framecull_cmd();
    cmd.arg("assemble").arg("--run").arg(&run_dir);

    cmd.assert().failure().stderr(contains("Nothing to process"));
    let videos = std::fs::read_dir(&run_dir)?
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "mp4"))
        .count();
    assert_eq!(videos, 0);
    Ok(())
}

#[test]
fn test_extract_text_empty_run_is_nothing_to_process() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 0)?;

    let mut cmd = framecull_cmd();
    cmd.arg("extract-text")
        .arg("--run")
        .arg(&run_dir)
        .arg("--api-key")
        .arg("test-key");

    cmd.assert().failure().stderr(contains("Nothing to process"));
    assert!(!run_dir.join("results.csv").exists());
    Ok(())
}

#[test]
fn test_extract_text_requires_api_key() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 3)?;

    let mut cmd = framecull_cmd();
    cmd.env_remove("OPENAI_API_KEY")
        .arg("extract-text")
        .arg("--run")
        .arg(&run_dir);

    cmd.assert().failure().stderr(contains("API key"));
    Ok(())
}

#[test]
fn test_locked_run_is_refused() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 2)?;
    // Held by this test process, which outlives the command.
    std::fs::write(run_dir.join(LOCK_FILE), format!("{}\n", std::process::id()))?;

    let mut cmd = framecull_cmd();
    cmd.arg("assemble").arg("--run").arg(&run_dir);

    cmd.assert().failure().stderr(contains("locked"));
    Ok(())
}

#[test]
fn test_cleanup_removes_run() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 2)?;

    let mut cmd = framecull_cmd();
    cmd.arg("cleanup").arg("--run").arg(&run_dir);

    cmd.assert().success().stdout(contains("Removed"));
    assert!(!run_dir.exists());
    Ok(())
}

#[test]
fn test_cleanup_of_locked_run_keeps_lock_error() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 2)?;
    std::fs::write(run_dir.join(LOCK_FILE), format!("{}\n", std::process::id()))?;

    let mut cmd = framecull_cmd();
    cmd.arg("cleanup").arg("--run").arg(&run_dir);

    cmd.assert()
        .failure()
        .stderr(contains("is locked by another run"))
        .stderr(contains("Suggestion: Wait for the other stage"));
    assert!(run_dir.exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_cleanup_takes_over_lock_of_exited_run() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let run_dir = make_run(work.path(), 2)?;
    let mut interrupted = std::process::Command::new("true").spawn()?;
    let dead_pid = interrupted.id();
    interrupted.wait()?;
    std::fs::write(run_dir.join(LOCK_FILE), format!("{dead_pid}\n"))?;

    let mut cmd = framecull_cmd();
    cmd.arg("cleanup").arg("--run").arg(&run_dir);

    cmd.assert().success().stdout(contains("Removed"));
    assert!(!run_dir.exists());
    Ok(())
}

#[test]
fn test_cleanup_refuses_plain_directory() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("notes.txt"), "keep me")?;

    let mut cmd = framecull_cmd();
    cmd.arg("cleanup").arg("--run").arg(dir.path());

    cmd.assert().failure().stderr(contains("Refusing to remove"));
    assert!(dir.path().join("notes.txt").exists());
    Ok(())
}

#[test]
fn test_upload_missing_file() -> Result<(), Box<dyn Error>> {
    let mut cmd = framecull_cmd();
    cmd.arg("upload")
        .arg("--file")
        .arg("surely/this/does/not/exist/out.mp4")
        .arg("--container-url")
        .arg("https://acct.blob.core.windows.net/videos?sv=1");

    cmd.assert().failure().stderr(contains("Upload failed"));
    Ok(())
}
