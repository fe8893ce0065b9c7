//! The combined output log of a batch.
//!
//! Everything the OCR tool prints, plus the batch's own separator and error
//! annotations, lands here in arrival order. The buffer is append-only and
//! has a single writer (the running batch); display code takes snapshots.

use std::sync::Mutex;

/// An append-only text buffer.
#[derive(Debug, Default)]
pub struct Transcript {
    text: Mutex<String>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Chunks are concatenated exactly as they arrive;
    /// partial lines are fine.
    pub fn append(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.lock().expect("lock poisoned").push_str(chunk);
    }

    /// A copy of everything appended so far.
    pub fn snapshot(&self) -> String {
        self.text.lock().expect("lock poisoned").clone()
    }

    /// Total bytes appended so far.
    pub fn len(&self) -> usize {
        self.text.lock().expect("lock poisoned").len()
    }

    /// Is the transcript still empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
