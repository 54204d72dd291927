//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

pub mod assemble;
pub mod cleanup;
pub mod dedupe;
pub mod extract_text;
pub mod process;
pub mod upload;

use crate::cli::Commands;
use crate::error::CliResult;
use crate::terminal;
use framecull_core::{CoreError, Interruption, Reporter, RunIndex, VideoSource, check_dependency};

/// Runs one parsed command.
pub fn run_command(command: Commands, reporter: &dyn Reporter) -> CliResult<()> {
    match command {
        Commands::Dedupe(args) => dedupe::run_dedupe(args, reporter),
        Commands::Assemble(args) => assemble::run_assemble(args, reporter),
        Commands::ExtractText(args) => extract_text::run_extract_text(args, reporter),
        Commands::Upload(args) => upload::run_upload(args),
        Commands::Process(args) => process::run_process(args, reporter),
        Commands::Cleanup(args) => cleanup::run_cleanup(args),
    }
}

/// Fails early on a missing local input and on missing ffmpeg tools, before
/// any run directory is created.
pub(crate) fn preflight(input: &str) -> CliResult<VideoSource> {
    let source = VideoSource::classify(input)?;
    if let VideoSource::LocalFile(path) = &source {
        if !path.is_file() {
            return Err(CoreError::SourceUnreachable(format!(
                "{} does not exist",
                path.display()
            )));
        }
    }
    check_dependency("ffmpeg")?;
    check_dependency("ffprobe")?;
    Ok(source)
}

/// Prints the dedup block shared by `dedupe` and `process`.
pub(crate) fn print_dedup_summary(run_dir: &std::path::Path, index: &RunIndex) {
    terminal::print_section("Dedup");
    terminal::print_status("Source", &index.source, false);
    terminal::print_status("Run directory", &run_dir.display().to_string(), false);
    terminal::print_status("Decoded", &index.decoded_count.to_string(), false);
    terminal::print_status("Considered", &index.considered_count.to_string(), false);
    terminal::print_status("Duplicates", &index.duplicate_count.to_string(), false);
    terminal::print_status("Kept frames", &index.unique_count.to_string(), true);
    match &index.interruption {
        Some(Interruption::Cancelled { after_decoded }) => {
            terminal::print_warning(&format!("Cancelled after {after_decoded} decoded frames"));
        }
        Some(Interruption::DecodeFailed {
            after_decoded,
            reason,
        }) => {
            terminal::print_warning(&format!(
                "Decoding stopped after {after_decoded} frames: {reason}"
            ));
        }
        Some(Interruption::WriteFailed {
            after_decoded,
            reason,
        }) => {
            terminal::print_warning(&format!(
                "Writing frames stopped after {after_decoded} decoded frames: {reason}"
            ));
        }
        None => {}
    }
}
