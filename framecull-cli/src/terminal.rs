//! Summary output for finished commands.
//!
//! Progress while a stage runs is drawn by the core `TerminalReporter`; these
//! helpers print the result blocks once a command is done.

use console::style;

const LABEL_WIDTH: usize = 16;

/// Print a section header
pub fn print_section(title: &str) {
    println!();
    println!("{}", style(format!("===== {} =====", title.to_uppercase())).cyan());
}

/// Print a status line (key-value pair)
pub fn print_status(label: &str, value: &str, highlight: bool) {
    let label = format!("{label}:");
    if highlight {
        println!("  {label:<LABEL_WIDTH$} {}", style(value).bold().green());
    } else {
        println!("  {label:<LABEL_WIDTH$} {value}");
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!();
    println!("  {} {}", style("✓").green(), style(message).green());
}

/// Print a warning
pub fn print_warning(message: &str) {
    println!("  {} {}", style("⚠").yellow(), style(message).yellow());
}

/// Print an error block to stderr
pub fn print_error(title: &str, message: &str, suggestion: Option<&str>) {
    eprintln!("{} {}", style("✗").red().bold(), style(title).red().bold());
    eprintln!("  Message:    {message}");
    if let Some(suggestion) = suggestion {
        eprintln!("  Suggestion: {suggestion}");
    }
}
