//! Sliding-window text chunker.
//!
//! Splits extracted page text into fixed-size character windows with a
//! configurable overlap, so that sentences near a window boundary appear in
//! two adjacent chunks. Window arithmetic is done in characters, never
//! bytes, so multi-byte text is sliced safely.
//!
//! Each chunk records its starting character offset and carries a copy of
//! the source document's metadata.

use crate::models::{SourceDocument, TextChunk};

/// Split a document's text into overlapping character windows.
///
/// Windows advance by `window_chars - overlap_chars` per step. Empty text
/// produces no chunks; text no longer than one window produces exactly one.
/// The final window is allowed to be shorter than `window_chars`.
pub fn chunk_text(
    document: &SourceDocument,
    window_chars: usize,
    overlap_chars: usize,
) -> Vec<TextChunk> {
    let text = document.text.as_str();
    if text.is_empty() || window_chars == 0 {
        return Vec::new();
    }

    let step = window_chars.saturating_sub(overlap_chars).max(1);

    // Byte offset of every character, so windows can be cut on char
    // boundaries regardless of encoding width.
    let char_starts: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
    let total_chars = char_starts.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + window_chars).min(total_chars);
        let byte_start = char_starts[start];
        let byte_end = if end < total_chars {
            char_starts[end]
        } else {
            text.len()
        };

        chunks.push(TextChunk {
            text: text[byte_start..byte_end].to_string(),
            start_offset: start,
            metadata: document.metadata.clone(),
        });

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}
