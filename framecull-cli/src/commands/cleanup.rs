//! Implementation of the 'cleanup' subcommand.

use crate::cli::CleanupArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::terminal;

use framecull_core::{CoreError, PipelineRun};

/// Deletes a run directory. Only directories holding a run index are
/// accepted, and a run locked by another stage is left alone.
pub fn run_cleanup(args: CleanupArgs) -> CliResult<()> {
    let run = match PipelineRun::open(&args.run_dir) {
        Ok(run) => run,
        Err(e @ CoreError::DirectoryLocked(_)) => return Err(e),
        Err(e) => {
            return Err(e)
                .cli_with_context(|| format!("Refusing to remove {}", args.run_dir.display()));
        }
    };
    let frames = run.frames().len();
    run.cleanup()?;

    terminal::print_success(&format!(
        "Removed {} ({} kept frames)",
        args.run_dir.display(),
        frames
    ));
    Ok(())
}
