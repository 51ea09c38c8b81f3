//! Chunk Splitter
//!
//! Turns a reply that arrives in arbitrary pieces into ordered chunks cut at
//! natural speaking breaks, so the face can start talking before the whole
//! reply exists.
//!
//! Concatenating every chunk's text in index order reproduces the input
//! exactly. Nothing is trimmed or collapsed.

use std::collections::HashSet;

/// Characters that end a chunk when none are configured
pub const DEFAULT_BOUNDARIES: &str = ".,;:!?\n";

/// One indexed piece of a reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position within the turn
    pub index: u32,
    /// Chunk text, boundary character included
    pub text: String,
}

/// Incremental splitter scoped to one turn
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    boundaries: HashSet<char>,
    buffer: String,
    next_index: u32,
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARIES.chars())
    }
}

impl ChunkSplitter {
    /// Create a splitter that cuts after any of `boundaries`
    pub fn new(boundaries: impl IntoIterator<Item = char>) -> Self {
        Self {
            boundaries: boundaries.into_iter().collect(),
            buffer: String::new(),
            next_index: 0,
        }
    }

    /// Feed a fragment and collect every chunk it completes
    pub fn push(&mut self, fragment: &str) -> Vec<Chunk> {
        let mut out = Vec::new();
        for c in fragment.chars() {
            self.buffer.push(c);
            if self.boundaries.contains(&c) {
                out.push(self.take());
            }
        }
        out
    }

    /// Flush whatever is left once the stream is over
    pub fn finish(&mut self) -> Option<Chunk> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Number of chunks handed out so far
    #[must_use]
    pub fn emitted(&self) -> u32 {
        self.next_index
    }

    /// Text buffered since the last boundary
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn take(&mut self) -> Chunk {
        let chunk = Chunk {
            index: self.next_index,
            text: std::mem::take(&mut self.buffer),
        };
        self.next_index += 1;
        chunk
    }
}
