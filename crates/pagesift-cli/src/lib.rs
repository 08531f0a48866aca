//! `pagesift` crate (library surface).
//!
//! The primary entrypoint is the `pagesift` binary. This module holds the output envelope
//! and the terminal progress reporter so they can be tested without spawning the binary.

pub use pagesift_core as core;

pub mod envelope;

use pagesift_core::{progress_fraction, Error, ProgressSink};
use std::io::Write;

/// Writes `parsed batch i of n` lines to stderr, keeping stdout clean for the payload.
#[derive(Debug, Default)]
pub struct StderrProgress {
    pub quiet: bool,
}

impl StderrProgress {
    pub fn line(done: usize, total: usize) -> String {
        format!(
            "parsed batch {done} of {total} ({:.0}%)",
            progress_fraction(done, total) * 100.0
        )
    }
}

impl ProgressSink for StderrProgress {
    fn on_progress(&self, done: usize, total: usize) {
        if self.quiet {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", Self::line(done, total));
    }

    fn on_chunk_error(&self, chunk_index: usize, e: &Error) {
        if self.quiet {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "batch {} skipped: {e}", chunk_index + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_is_one_based_with_percentage() {
        assert_eq!(StderrProgress::line(1, 4), "parsed batch 1 of 4 (25%)");
        assert_eq!(StderrProgress::line(3, 3), "parsed batch 3 of 3 (100%)");
    }
}
