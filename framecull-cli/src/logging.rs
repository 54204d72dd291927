// ============================================================================
// framecull-cli/src/logging.rs
// ============================================================================
//
// LOGGING UTILITIES: Log File Naming and Logger Setup
//
// The console only shows warnings and errors by default so the progress
// output stays readable; the log file gets everything from info up. With
// --verbose both go down to debug.

use crate::cli::Cli;
use framecull_core::file_logging::setup_file_logging;
use log::LevelFilter;
use std::path::{Path, PathBuf};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
///
/// # Example
/// ```
/// let log_filename = format!("framecull_dedupe_{}.log", framecull_cli::logging::get_timestamp());
/// assert!(log_filename.ends_with(".log"));
/// ```
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Path of the log file for one invocation of `command`.
pub fn log_file_path(log_dir: &Path, command: &str) -> PathBuf {
    log_dir.join(format!("framecull_{}_{}.log", command, get_timestamp()))
}

/// Installs the global logger for this invocation.
///
/// Returns the log file path, if one is written.
pub fn init_logging(cli: &Cli, default_log_dir: &Path) -> Option<PathBuf> {
    let (file_level, console_level) = if cli.verbose {
        (LevelFilter::Debug, LevelFilter::Debug)
    } else {
        (LevelFilter::Info, LevelFilter::Warn)
    };

    let log_file = (!cli.no_log).then(|| {
        let dir = cli.log_dir.as_deref().unwrap_or(default_log_dir);
        log_file_path(dir, cli.command.name())
    });

    match setup_file_logging(log_file.as_deref(), file_level, console_level) {
        Ok(()) => log_file,
        Err(e) => {
            eprintln!("Warning: could not set up file logging: {e:#}");
            // Fall back to console-only logging.
            if setup_file_logging(None, file_level, console_level).is_err() {
                eprintln!("Warning: logging is disabled");
            }
            None
        }
    }
}
