//! Sliding-window text chunker with fixed overlap.
//!
//! Splits document text into windows of at most `max_chars` chars, each
//! window starting `max_chars - overlap_chars` chars after the previous
//! window's start. Cuts prefer natural breaks (paragraph, line, sentence,
//! word) inside a small tolerance zone before the hard limit, falling back
//! to a hard cut.
//!
//! All arithmetic is in chars, not bytes, so multi-byte text never splits
//! inside a code point. Identical input and parameters always produce
//! identical chunk boundaries and ids; that determinism is what makes
//! re-ingestion idempotent.

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Break patterns in preference order: paragraph, line, sentence, word.
const BREAKS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split a document into overlapping chunks.
///
/// Empty text produces zero chunks (the caller skips the document). Text of
/// `max_chars` chars or fewer produces exactly one chunk.
pub fn chunk_document(doc: &Document, max_chars: usize, overlap_chars: usize) -> Result<Vec<Chunk>> {
    if max_chars == 0 {
        return Err(Error::Configuration("max_chars must be > 0".into()));
    }
    if overlap_chars >= max_chars {
        return Err(Error::Configuration(format!(
            "overlap_chars ({}) must be smaller than max_chars ({})",
            overlap_chars, max_chars
        )));
    }

    // Byte offset of every char boundary, plus the end of the text.
    let mut boundaries: Vec<usize> = doc.text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(doc.text.len());
    let total_chars = boundaries.len() - 1;

    if total_chars == 0 {
        return Ok(Vec::new());
    }

    // A snapped cut may land at most `tolerance` chars before the hard
    // limit. Keeping it under a quarter of the stride guarantees every
    // window still advances past the overlap.
    let tolerance = ((max_chars - overlap_chars) / 4).min(120);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + max_chars).min(total_chars);
        let end = if hard_end == total_chars {
            total_chars
        } else {
            snap_to_break(&doc.text, &boundaries, start, hard_end, tolerance)
        };

        let text = &doc.text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(doc, chunks.len(), start, text));

        if end == total_chars {
            break;
        }
        start = end - overlap_chars;
    }

    Ok(chunks)
}

/// Find a cut at or before `hard_end`, preferring natural breaks inside the
/// tolerance zone. Returns a char index in `(hard_end - tolerance, hard_end]`.
fn snap_to_break(
    text: &str,
    boundaries: &[usize],
    start: usize,
    hard_end: usize,
    tolerance: usize,
) -> usize {
    let window = &text[boundaries[start]..boundaries[hard_end]];
    let floor_byte = boundaries[hard_end - tolerance] - boundaries[start];

    for pattern in BREAKS {
        if let Some(pos) = window.rfind(pattern) {
            let cut_byte = pos + pattern.len();
            if cut_byte > floor_byte {
                let cut_abs = boundaries[start] + cut_byte;
                // Break patterns are ASCII, so the cut is a char boundary.
                let cut_char = boundaries.partition_point(|&b| b < cut_abs);
                return cut_char;
            }
        }
    }

    hard_end
}

fn make_chunk(doc: &Document, index: usize, offset: usize, text: &str) -> Chunk {
    let mut metadata = doc.metadata.clone();
    metadata.insert("document_id".to_string(), doc.id.clone());
    metadata.insert("chunk_index".to_string(), index.to_string());

    Chunk {
        chunk_id: format!("{}:{}", doc.id, index),
        document_id: doc.id.clone(),
        chunk_index: index,
        offset,
        text: text.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc1", text)
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_document(&doc("Hello, world!"), 100, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "doc1:0");
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_zero_chunks() {
        let chunks = chunk_document(&doc(""), 100, 20).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = chunk_document(&doc("some text"), 100, 100).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_fixed_windows_without_breaks() {
        // 250 chars with no break characters: hard cuts only.
        let text = "a".repeat(250);
        let chunks = chunk_document(&doc(&text), 100, 20).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 80);
        assert_eq!(chunks[2].offset, 160);
        assert_eq!(chunks[3].offset, 240);
        assert_eq!(chunks[1].text.chars().count(), 100); // covers [80, 180)
        assert_eq!(chunks[3].text.chars().count(), 10);
    }

    #[test]
    fn test_prefers_paragraph_break_near_limit() {
        // Paragraph break at char 95, inside the tolerance zone for a
        // 100-char window with stride 80 (tolerance 20).
        let text = format!("{}\n\n{}", "b".repeat(93), "c".repeat(200));
        let chunks = chunk_document(&doc(&text), 100, 20).unwrap();
        assert_eq!(chunks[0].text, format!("{}\n\n", "b".repeat(93)));
        assert_eq!(chunks[1].offset, 75); // 95 - overlap
    }

    #[test]
    fn test_reconstruction_removes_overlap_exactly() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let overlap = 25;
        let chunks = chunk_document(&doc(&text), 120, overlap).unwrap();
        assert!(chunks.len() > 1);

        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_offsets_cover_text_without_gaps() {
        let text = "x".repeat(1000);
        let chunks = chunk_document(&doc(&text), 300, 50).unwrap();
        for pair in chunks.windows(2) {
            let end = pair[0].offset + pair[0].char_len();
            assert_eq!(pair[1].offset, end - 50);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.offset + last.char_len(), 1000);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. ".repeat(40);
        let a = chunk_document(&doc(&text), 150, 30).unwrap();
        let b = chunk_document(&doc(&text), 150, 30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_text_never_splits_code_points() {
        let text = "héllø wörld ».".repeat(50);
        let chunks = chunk_document(&doc(&text), 90, 10).unwrap();
        let overlap = 10;
        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_metadata_inherited_and_indexed() {
        let document = Document::new("notes/a.md", "words ".repeat(200))
            .with_metadata("source_type", "filesystem")
            .with_metadata("origin", "notes/a.md");
        let chunks = chunk_document(&document, 200, 40).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.get("source_type").unwrap(), "filesystem");
            assert_eq!(chunk.metadata.get("chunk_index").unwrap(), &i.to_string());
            assert_eq!(chunk.chunk_id, format!("notes/a.md:{}", i));
        }
    }
}
