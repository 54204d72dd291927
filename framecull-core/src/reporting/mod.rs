use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;

/// Counters after a frame was offered to the similarity engine.
#[derive(Clone, Debug)]
pub struct DedupProgress {
    pub decoded: u64,
    pub considered: u64,
    pub unique: u64,
    pub duplicates: u64,
    pub expected_frames: Option<u64>,
}

/// Text extraction progress.
#[derive(Clone, Debug)]
pub struct ExtractionProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Reporter interface implemented by terminal and silent reporters.
pub trait Reporter: Send + Sync {
    fn stage_started(&self, _stage: &str, _detail: &str) {}
    fn frame_considered(&self, _progress: &DedupProgress) {}
    fn text_extracted(&self, _progress: &ExtractionProgress) {}
    fn artifact_written(&self, _path: &Path) {}
    fn warning(&self, _message: &str) {}
    fn stage_complete(&self, _message: &str) {}
}

/// No-op reporter that discards all updates.
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Human-friendly reporter that prints stage headers and a progress bar.
pub struct TerminalReporter {
    progress: Mutex<Option<ProgressBar>>,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            progress: Mutex::new(None),
        }
    }

    fn with_bar<F>(&self, length: Option<u64>, update: F)
    where
        F: FnOnce(&ProgressBar),
    {
        let Ok(mut guard) = self.progress.lock() else {
            return;
        };
        let bar = guard.get_or_insert_with(|| match length {
            Some(len) => {
                let pb = ProgressBar::new(len);
                pb.set_style(
                    ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::with_template("  {spinner} {pos} frames {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        });
        update(bar);
    }

    fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl Reporter for TerminalReporter {
    fn stage_started(&self, stage: &str, detail: &str) {
        self.finish_progress();
        println!("\n{}", style(stage.to_uppercase()).bold().cyan());
        if !detail.is_empty() {
            println!("  {}{}", style("› ").magenta(), detail);
        }
    }

    fn frame_considered(&self, progress: &DedupProgress) {
        self.with_bar(progress.expected_frames, |pb| {
            pb.set_position(progress.decoded);
            pb.set_message(format!(
                "kept {}, dropped {}",
                progress.unique, progress.duplicates
            ));
        });
    }

    fn text_extracted(&self, progress: &ExtractionProgress) {
        self.with_bar(Some(progress.total as u64), |pb| {
            pb.set_position(progress.completed as u64);
            if progress.failed > 0 {
                pb.set_message(format!("{} failed", progress.failed));
            }
        });
    }

    fn artifact_written(&self, path: &Path) {
        self.finish_progress();
        println!("  {} {}", style("Wrote").bold(), path.display());
    }

    fn warning(&self, message: &str) {
        if let Ok(guard) = self.progress.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(format!("  {} {}", style("!").yellow().bold(), message));
                return;
            }
        }
        println!("  {} {}", style("!").yellow().bold(), message);
    }

    fn stage_complete(&self, message: &str) {
        self.finish_progress();
        println!("  {} {}", style("✓").green(), message);
    }
}
