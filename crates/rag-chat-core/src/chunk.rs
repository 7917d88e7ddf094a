//! Recursive character text splitter.
//!
//! Splits raw document text into [`Chunk`]s of at most `chunk_size`
//! characters, with up to `chunk_overlap` characters shared between
//! consecutive chunks so that context is not lost at chunk boundaries.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", ".", " ", ""]` that
//!    occurs in the text (the empty separator splits into characters).
//! 2. Split on it. A `"."` stays attached to the end of the piece before
//!    it; whitespace separators are removed. Pieces shorter than
//!    `chunk_size` are kept for merging; longer pieces are split again with
//!    the remaining separators.
//! 3. Merge consecutive pieces greedily (re-joined with the whitespace
//!    separator, or directly for `"."`) until
//!    the next piece would overflow `chunk_size`, then emit the chunk and
//!    drop pieces from the front until at most `chunk_overlap` characters
//!    remain as the start of the next chunk.
//! 4. Trim each chunk and discard empty ones.
//!
//! Each chunk receives a fresh UUID, its index within the document, the
//! source filename, and a SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use rag_chat_core::chunk::{Chunker, RecursiveChunker};
//!
//! let chunker = RecursiveChunker::new(1000, 200);
//! let chunks = chunker.split("Hello world.\n\nSecond paragraph.", "notes.txt");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source, "notes.txt");
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

/// Splits raw document text into ordered chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks tagged with `source`.
    ///
    /// Indices are contiguous from 0. Empty or whitespace-only text yields
    /// no chunks.
    fn split(&self, text: &str, source: &str) -> Vec<Chunk>;
}

/// Character-length recursive splitter with overlap.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a splitter. `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty string pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &DEFAULT_SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        // Whitespace separators are dropped and restored when merging;
        // punctuation stays on the end of its sentence.
        let (pieces, joiner): (Vec<&str>, &str) = if separator.is_empty() {
            let chars = text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect();
            (chars, "")
        } else if separator.trim().is_empty() {
            (text.split(separator).filter(|s| !s.is_empty()).collect(), separator)
        } else {
            (text.split_inclusive(separator).collect(), "")
        };

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting, joiner));
                fitting.clear();
            }
            if remaining.is_empty() {
                if let Some(trimmed) = non_empty_trimmed(piece) {
                    out.push(trimmed);
                }
            } else {
                out.extend(self.split_recursive(piece, remaining));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting, joiner));
        }
        out
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                if let Some(text) = join_window(&window, separator) {
                    merged.push(text);
                }
                // Keep at most `chunk_overlap` characters as the head of the next chunk.
                loop {
                    let joiner = if window.is_empty() { 0 } else { sep_len };
                    let must_shrink = total > self.chunk_overlap
                        || (total > 0 && total + len + joiner > self.chunk_size);
                    if !must_shrink {
                        break;
                    }
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }
            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        if let Some(text) = join_window(&window, separator) {
            merged.push(text);
        }
        merged
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str, source: &str) -> Vec<Chunk> {
        self.split_text(text)
            .iter()
            .enumerate()
            .map(|(i, piece)| make_chunk(source, i as i64, piece))
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn join_window(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    non_empty_trimmed(&joined)
}

/// Build a chunk with a fresh id and a SHA-256 hash of its text.
pub fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
