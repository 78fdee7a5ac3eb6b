//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::fmt::Write;
use std::time::Duration;

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Renders bytes as a bracketed list of unsigned values, eliding long buffers
pub fn bytes_to_string(bytes: &[u8], limit: usize) -> String {
    let mut out = String::from("[");
    for b in bytes.iter().take(limit) {
        let _ = write!(out, " {}", b);
    }
    if bytes.len() > limit {
        let _ = write!(out, " ..{} more", bytes.len() - limit);
    }
    out.push_str(" ]");
    out
}
