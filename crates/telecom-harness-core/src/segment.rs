//! Line-boundary log segmenter.
//!
//! Groups raw log text into [`TextChunk`]s that are the unit of embedding.
//! Lines are never split and never trimmed: each chunk is a run of whole
//! original lines (terminators included), so joining the chunks in order
//! reproduces the input byte for byte.
//!
//! # Algorithm
//!
//! 1. Walk the lines of the text in order, keeping line terminators.
//! 2. Close the current chunk when appending the next line would push it
//!    past `max_chunk_bytes`, or when the next line starts a new log record
//!    (it begins with a timestamp). Either rule only fires on a non-empty
//!    chunk.
//! 3. A single line longer than `max_chunk_bytes` becomes its own oversized
//!    chunk instead of being truncated.
//!
//! # Example
//!
//! ```rust
//! use telecom_harness_core::segment::segment;
//!
//! let text = "2024-03-01T10:00:00Z INFO a\n  detail\n2024-03-01T10:00:01Z INFO b\n";
//! let chunks = segment(text, 512);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "2024-03-01T10:00:00Z INFO a\n  detail\n");
//! ```

use crate::logparse::starts_with_timestamp;
use crate::models::TextChunk;

/// Default upper bound on chunk size in bytes.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 512;

/// Split `text` into chunks of at most `max_chunk_bytes` bytes.
///
/// Returns no chunks for empty text. Indices are contiguous from 0.
pub fn segment(text: &str, max_chunk_bytes: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        let overflows = current.len() + line.len() > max_chunk_bytes;
        if !current.is_empty() && (overflows || starts_with_timestamp(line)) {
            push_chunk(&mut chunks, std::mem::take(&mut current));
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, current);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: String) {
    let index = chunks.len();
    chunks.push(TextChunk { index, text });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(chunks: &[TextChunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(segment("", 512).is_empty());
    }

    #[test]
    fn test_single_chunk_without_timestamps() {
        let text = "alpha\nbeta\ngamma";
        let chunks = segment(text, 512);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_timestamp_starts_new_chunk() {
        let text = "2024-03-01T10:00:00Z ERROR link down\n    at stack\n2024-03-01T10:00:05Z INFO link up\n";
        let chunks = segment(text, 512);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.ends_with("    at stack\n"));
        assert!(chunks[1].text.starts_with("2024-03-01T10:00:05Z"));
        assert_eq!(rejoin(&chunks), text);
    }

    #[test]
    fn test_size_bound_respected() {
        let text: String = (0..100).map(|i| format!("line number {:03}\n", i)).collect();
        let chunks = segment(&text, 64);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.byte_len() <= 64, "chunk {} has {} bytes", c.index, c.byte_len());
        }
        assert_eq!(rejoin(&chunks), text);
    }

    #[test]
    fn test_oversized_line_is_its_own_chunk() {
        let long = "x".repeat(100);
        let text = format!("short\n{}\nshort again\n", long);
        let chunks = segment(&text, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, format!("{}\n", long));
        assert_eq!(rejoin(&chunks), text);
    }

    #[test]
    fn test_indices_contiguous() {
        let text = "a\nb\nc\nd\ne\n";
        let chunks = segment(text, 4);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_roundtrip_preserves_crlf_and_missing_final_newline() {
        let text = "Mar  1 10:00:00 gw up\r\n\r\nMar  1 10:00:01 gw down";
        let chunks = segment(text, 8);
        assert_eq!(rejoin(&chunks), text);
    }
}
