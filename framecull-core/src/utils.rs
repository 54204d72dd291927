//! Utility functions for formatting and file naming.
//!
//! General-purpose helpers used throughout framecull-core: duration and byte
//! formatting, frame file naming and file-name sanitizing.

use crate::config::MIN_SEQUENCE_DIGITS;

/// Formats seconds as HH:MM:SS (e.g., 3725.0 -> "01:02:05"). Returns "??:??:??" for invalid inputs.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 || !seconds.is_finite() {
        return "??:??:??".to_string();
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Formats bytes with appropriate binary units (B, KiB, MiB, GiB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;

    let bytes_f64 = bytes as f64;
    if bytes_f64 >= GIB {
        format!("{:.2} GiB", bytes_f64 / GIB)
    } else if bytes_f64 >= MIB {
        format!("{:.2} MiB", bytes_f64 / MIB)
    } else if bytes_f64 >= KIB {
        format!("{:.2} KiB", bytes_f64 / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Zero-padding width for sequence numbers: enough digits for the largest
/// expected frame count, and never fewer than six.
#[must_use]
pub fn sequence_digits(expected_frames: Option<u64>) -> usize {
    let needed = expected_frames
        .map(|n| n.saturating_sub(1).max(1).to_string().len())
        .unwrap_or(0);
    needed.max(MIN_SEQUENCE_DIGITS)
}

/// File name of a kept frame, e.g. `frame_000042.jpg`.
#[must_use]
pub fn frame_file_name(sequence: u64, digits: usize, extension: &str) -> String {
    format!("frame_{sequence:0digits$}.{extension}")
}

/// Replaces characters that are awkward in file and blob names with `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            ' ' | ':' | '/' | '\\' | '?' | '*' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}
