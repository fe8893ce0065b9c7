//! Errors produced while running the OCR tool on a single file.
//!
//! These are deliberately coarse. The batch loop never aborts on one of
//! them; it records the error, annotates the status line, and moves on to
//! the next file. The variants exist so callers can tell "the tool is not
//! installed" apart from "the tool ran and failed".

use thiserror::Error;

/// What went wrong while processing one file.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The existence probe could not resolve the tool on the search path.
    /// The main command is never started in this case.
    #[error(
        "{tool} not found. Install it (e.g. `brew install ocrmypdf` or your \
         package manager) and make sure it is on your PATH"
    )]
    ToolNotFound {
        /// The executable name we looked for.
        tool: String,
    },

    /// The tool was resolved but could not be started.
    #[error("could not start {tool}: {source}")]
    Spawn {
        /// The executable name.
        tool: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The tool ran and exited with a non-zero status. `detail` is the
    /// combined output of the run, or a generic message when the run
    /// produced no output at all.
    #[error("{detail}")]
    ProcessFailed {
        /// The child's exit code (`-1` if it was killed by a signal).
        exit_code: i32,
        /// The accumulated output, or `"process exited with code N"`.
        detail: String,
    },
}
