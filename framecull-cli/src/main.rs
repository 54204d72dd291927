// framecull-cli/src/main.rs
//
// Entry point for the framecull command-line tool.
//
// Parses arguments, installs logging (console plus an optional log file),
// runs the selected command and maps its outcome to an exit status: 0 on
// success, 1 on any failure, including a single-stage command that found
// nothing to process.

use clap::Parser;
use framecull_cli::error::suggestion_for;
use framecull_cli::logging::init_logging;
use framecull_cli::{Cli, Commands, run_command, terminal};
use framecull_core::{CoreConfig, TerminalReporter};
use std::path::PathBuf;
use std::process;

/// Log directory used when `--log-dir` is not given.
fn default_log_dir(command: &Commands) -> PathBuf {
    let root = match command {
        Commands::Dedupe(args) => args.options.work_dir.clone(),
        Commands::Process(args) => args.options.work_dir.clone(),
        _ => None,
    };
    root.unwrap_or_else(|| CoreConfig::default().work_dir)
        .join("logs")
}

fn main() {
    let cli = Cli::parse();

    let log_file = init_logging(&cli, &default_log_dir(&cli.command));
    if let Some(path) = &log_file {
        log::debug!("Log file: {}", path.display());
    }
    log::info!("framecull {} started: {}", env!("CARGO_PKG_VERSION"), cli.command.name());

    let reporter = TerminalReporter::new();
    match run_command(cli.command, &reporter) {
        Ok(()) => {
            log::info!("Finished successfully");
        }
        Err(e) if e.is_nothing_to_process() => {
            log::info!("{}", e);
            terminal::print_error("Nothing to process", &e.to_string(), suggestion_for(&e));
            process::exit(1);
        }
        Err(e) => {
            // The console shows the error block below; the log file gets it here.
            log::info!("Command failed: {}", e);
            terminal::print_error("Command failed", &e.to_string(), suggestion_for(&e));
            if let Some(path) = &log_file {
                eprintln!("  Log file:   {}", path.display());
            }
            process::exit(1);
        }
    }
}
