// ============================================================================
// framecull-core/src/run.rs
// ============================================================================
//
// PIPELINE RUN: Per-Run Directory, Lock and Index
//
// A run owns one directory. It is created fresh for every dedup pass and held
// under an exclusive lock file while any stage works on it. After dedup the
// ordered frame records are written to `run.json`; later stages (text
// extraction, re-assembly) load the records from there instead of listing the
// directory.

use crate::config::{CoreConfig, SimilarityStrategy};
use crate::error::{CoreError, CoreResult};
use crate::external::SourceProperties;
use crate::sampler::Sampler;
use crate::temp_files;
use crate::utils::sanitize_file_name;
use crate::writer::{DedupOutcome, FrameRecord, Interruption};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name of the run-scoped index inside a run directory.
pub const RUN_INDEX_FILE: &str = "run.json";

/// Name of the lock file inside a run directory.
pub const LOCK_FILE: &str = ".framecull.lock";

const RUN_INDEX_VERSION: u32 = 1;

/// Lock files held by this process. A lock file naming our own PID is only
/// live while its path is listed here.
static HELD_LOCKS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// Exclusive claim on a run directory. Released on drop.
///
/// A lock file left behind by a process that no longer exists is taken over,
/// so an interrupted run does not block its directory forever.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Claims `dir`. Fails with `DirectoryLocked` if a live run holds it.
    pub fn acquire(dir: &Path) -> CoreResult<Self> {
        let path = dir.join(LOCK_FILE);
        let locked = || CoreError::DirectoryLocked(dir.display().to_string());

        match create_lock_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_holder(&path);
                if holder.is_some_and(|pid| holder_is_live(pid, &path)) {
                    return Err(locked());
                }
                match holder {
                    Some(pid) => log::warn!(
                        "Taking over stale run lock {} left by pid {}",
                        path.display(),
                        pid
                    ),
                    None => log::warn!("Taking over unreadable run lock {}", path.display()),
                }
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                create_lock_file(&path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        locked()
                    } else {
                        e.into()
                    }
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        if let Ok(mut held) = HELD_LOCKS.lock() {
            held.insert(path.clone());
        }
        log::debug!("Locked run directory {}", dir.display());
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Ok(mut held) = HELD_LOCKS.lock() {
            held.remove(&self.path);
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Could not release run lock {}: {}", self.path.display(), e);
            }
        }
    }
}

fn create_lock_file(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

/// PID recorded in a lock file, `None` when it cannot be read.
fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn holder_is_live(pid: u32, path: &Path) -> bool {
    if pid == std::process::id() {
        return HELD_LOCKS
            .lock()
            .map_or(true, |held| held.contains(path));
    }
    process_exists(pid)
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 probes for existence. EPERM means it exists under another user.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    true
}

/// Persisted description of a dedup pass and its kept frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIndex {
    pub version: u32,
    pub created_at: String,
    /// Local path or URL the run was started from.
    pub source: String,
    /// Local file that was decoded.
    pub source_file: PathBuf,
    pub source_properties: Option<SourceProperties>,
    pub source_fps: f64,
    pub sampler: Sampler,
    pub similarity_strategy: SimilarityStrategy,
    pub duplicate_threshold: f64,
    pub decoded_count: u64,
    pub considered_count: u64,
    pub unique_count: u64,
    pub duplicate_count: u64,
    pub interruption: Option<Interruption>,
    pub frames: Vec<FrameRecord>,
    /// File names of video artifacts produced from this run.
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl RunIndex {
    /// Base name for artifacts produced from this run.
    pub fn artifact_stem(&self) -> String {
        let stem = self
            .source_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        format!("{}_deduplicated", sanitize_file_name(&stem))
    }

    pub fn from_outcome(
        source: &str,
        source_file: &Path,
        source_properties: Option<SourceProperties>,
        config: &CoreConfig,
        outcome: &DedupOutcome,
    ) -> Self {
        Self {
            version: RUN_INDEX_VERSION,
            created_at: chrono::Local::now().to_rfc3339(),
            source: source.to_string(),
            source_file: source_file.to_path_buf(),
            source_properties,
            source_fps: outcome.source_fps,
            sampler: outcome.sampler,
            similarity_strategy: config.similarity_strategy,
            duplicate_threshold: config.duplicate_threshold,
            decoded_count: outcome.decoded_count,
            considered_count: outcome.considered_count,
            unique_count: outcome.unique_count,
            duplicate_count: outcome.duplicate_count,
            interruption: outcome.interruption.clone(),
            frames: outcome.records.clone(),
            artifacts: Vec::new(),
        }
    }
}

/// One pipeline run and its directory.
#[derive(Debug)]
pub struct PipelineRun {
    dir: PathBuf,
    lock: Option<RunLock>,
    index: Option<RunIndex>,
}

impl PipelineRun {
    /// Creates and locks a fresh run directory under `work_dir`.
    pub fn create(work_dir: &Path) -> CoreResult<Self> {
        let prefix = format!("run_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let dir = temp_files::create_persistent_dir(work_dir, &prefix)?;
        let lock = RunLock::acquire(&dir)?;
        log::info!("Created run directory {}", dir.display());
        Ok(Self {
            dir,
            lock: Some(lock),
            index: None,
        })
    }

    /// Locks an existing run directory and loads its index.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        if !dir.is_dir() {
            return Err(CoreError::RunIndex(format!(
                "{} is not a run directory",
                dir.display()
            )));
        }
        let lock = RunLock::acquire(dir)?;
        let index = load_index(dir)?;
        log::info!(
            "Opened run {} with {} kept frames",
            dir.display(),
            index.frames.len()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Some(lock),
            index: Some(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index(&self) -> Option<&RunIndex> {
        self.index.as_ref()
    }

    /// Ordered kept frames. Empty before dedup has been recorded.
    pub fn frames(&self) -> &[FrameRecord] {
        self.index.as_ref().map_or(&[], |index| index.frames.as_slice())
    }

    /// Stores the dedup result and writes the run index.
    pub fn record_dedup(&mut self, index: RunIndex) -> CoreResult<()> {
        write_index(&self.dir, &index)?;
        self.index = Some(index);
        Ok(())
    }

    /// Appends artifact file names to the index.
    pub fn record_artifacts(&mut self, artifacts: &[PathBuf]) -> CoreResult<()> {
        let Some(index) = self.index.as_mut() else {
            return Err(CoreError::RunIndex(
                "artifacts recorded before dedup".to_string(),
            ));
        };
        for artifact in artifacts {
            let name = artifact
                .strip_prefix(&self.dir)
                .unwrap_or(artifact)
                .to_string_lossy()
                .into_owned();
            if !index.artifacts.contains(&name) {
                index.artifacts.push(name);
            }
        }
        write_index(&self.dir, index)
    }

    /// Deletes the run directory and every frame record in it.
    pub fn cleanup(mut self) -> CoreResult<()> {
        self.lock.take();
        fs::remove_dir_all(&self.dir)?;
        log::info!("Removed run directory {}", self.dir.display());
        Ok(())
    }
}

fn write_index(dir: &Path, index: &RunIndex) -> CoreResult<()> {
    let mut temp = temp_files::create_temp_file(dir, "run", "json")?;
    serde_json::to_writer_pretty(temp.as_file_mut(), index)?;
    temp.as_file_mut().flush()?;
    temp_files::persist_replace(temp, &dir.join(RUN_INDEX_FILE))
}

/// Reads and checks `run.json` in `dir`.
pub fn load_index(dir: &Path) -> CoreResult<RunIndex> {
    let path = dir.join(RUN_INDEX_FILE);
    let data = fs::read(&path).map_err(|e| {
        CoreError::RunIndex(format!("cannot read {}: {}", path.display(), e))
    })?;
    let mut index: RunIndex = serde_json::from_slice(&data)?;

    if index.version != RUN_INDEX_VERSION {
        return Err(CoreError::RunIndex(format!(
            "{} has unsupported version {}",
            path.display(),
            index.version
        )));
    }
    for (position, record) in index.frames.iter_mut().enumerate() {
        if record.sequence != position as u64 {
            return Err(CoreError::RunIndex(format!(
                "{} lists sequence {} at position {}",
                path.display(),
                record.sequence,
                position
            )));
        }
        record.path = dir.join(&record.file_name);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = RunLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            RunLock::acquire(dir.path()),
            Err(CoreError::DirectoryLocked(_))
        ));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        drop(RunLock::acquire(dir.path()).unwrap());
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn lock_left_by_exited_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        fs::write(dir.path().join(LOCK_FILE), format!("{dead_pid}\n")).unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        let holder = read_holder(&lock.path);
        assert_eq!(holder, Some(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn lock_held_by_live_process_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        fs::write(dir.path().join(LOCK_FILE), format!("{}\n", child.id())).unwrap();

        let result = RunLock::acquire(dir.path());
        let _ = child.kill();
        let _ = child.wait();
        assert!(matches!(result, Err(CoreError::DirectoryLocked(_))));
    }

    #[test]
    fn unreadable_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE), "").unwrap();
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn runs_get_distinct_directories() {
        let work = tempfile::tempdir().unwrap();
        let a = PipelineRun::create(work.path()).unwrap();
        let b = PipelineRun::create(work.path()).unwrap();
        assert_ne!(a.dir(), b.dir());
        assert!(a.frames().is_empty());
    }

    #[test]
    fn open_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PipelineRun::open(dir.path()),
            Err(CoreError::RunIndex(_))
        ));
    }
}
