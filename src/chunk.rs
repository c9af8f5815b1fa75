//! Overlapping fixed-budget text chunker.
//!
//! Splits content into chunks of at most `max_chars` characters with a
//! configurable overlap between consecutive chunks. Chunk boundaries are
//! purely positional, so re-chunking identical content always yields the
//! identical chunk set — the property that makes record ids stable.

use sha2::{Digest, Sha256};

use crate::models::SourceType;

/// Split text into overlapping chunks. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max_chars {
        return vec![trimmed.to_string()];
    }

    // Step must make progress even with a misconfigured overlap.
    let step = max_chars.saturating_sub(overlap_chars).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Deterministic vector-record id derived from the record's identity.
/// Re-indexing a source therefore overwrites rather than duplicates.
pub fn record_id(source_type: SourceType, source_id: &str, chunk_index: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(chunk_index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of document content, used for no-op detection on
/// re-index.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 200);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\t ", 1000, 200).is_empty());
    }

    #[test]
    fn test_chunks_respect_budget() {
        let text = "abcdefghij".repeat(50);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_text(&text, 100, 20);
        // Each chunk after the first starts 80 chars after the previous,
        // so the last 20 chars of one chunk open the next.
        let first: Vec<char> = chunks[0].chars().collect();
        let second: Vec<char> = chunks[1].chars().collect();
        assert_eq!(&first[80..], &second[..20]);
    }

    #[test]
    fn test_full_text_covered() {
        let text = "0123456789".repeat(30);
        let chunks = chunk_text(&text, 70, 10);
        let last = chunks.last().unwrap();
        assert!(text.ends_with(last.as_str()));
    }

    #[test]
    fn test_chunking_deterministic() {
        let text = "The quick brown fox. ".repeat(40);
        assert_eq!(chunk_text(&text, 100, 25), chunk_text(&text, 100, 25));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "héllо wörld ".repeat(40);
        let chunks = chunk_text(&text, 50, 10);
        // Reassembly must not panic or split inside a codepoint.
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_record_id_deterministic() {
        let a = record_id(SourceType::Document, "doc-1", 0);
        let b = record_id(SourceType::Document, "doc-1", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_id_distinguishes_identity() {
        let doc = record_id(SourceType::Document, "x", 0);
        let thread = record_id(SourceType::Thread, "x", 0);
        let other_chunk = record_id(SourceType::Document, "x", 1);
        assert_ne!(doc, thread);
        assert_ne!(doc, other_chunk);
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_eq!(content_hash("same"), content_hash("same"));
    }
}
