//! Context assembler: ranked hits → bounded prompt context.
//!
//! Accepts hits greedily in rank order under a char budget. A hit that does
//! not fit whole is skipped, never truncated; a smaller hit later in the
//! ranking may still be accepted. Duplicate chunk ids are dropped, and two
//! hits from the same document whose char spans overlap substantially keep
//! only the higher-ranked one.

use crate::models::{Chunk, Context, ContextSegment, RetrievalHit};

/// Span-overlap dedup threshold: fraction of the shorter span that must be
/// shared before the lower-ranked hit is dropped. Adjacent windows built
/// with the default chunking overlap stay well under this.
const OVERLAP_DEDUP_RATIO: f64 = 0.5;

/// Select and order hits into a [`Context`] no larger than
/// `max_context_chars` total text.
pub fn assemble(hits: &[RetrievalHit], max_context_chars: usize) -> Context {
    let mut context = Context::default();
    let mut seen_ids: Vec<&str> = Vec::new();

    for hit in hits {
        if seen_ids.contains(&hit.chunk.chunk_id.as_str()) {
            continue;
        }

        if context
            .segments
            .iter()
            .any(|s| spans_overlap(&s.hit.chunk, &hit.chunk))
        {
            continue;
        }

        let len = hit.chunk.char_len();
        if context.total_chars + len > max_context_chars {
            continue;
        }

        seen_ids.push(hit.chunk.chunk_id.as_str());
        context.total_chars += len;
        context.segments.push(ContextSegment {
            citation: citation_label(&hit.chunk),
            hit: hit.clone(),
        });
    }

    context
}

/// Citation label for a chunk: origin, else title, else document id.
fn citation_label(chunk: &Chunk) -> String {
    chunk
        .metadata
        .get("origin")
        .or_else(|| chunk.metadata.get("title"))
        .cloned()
        .unwrap_or_else(|| chunk.document_id.clone())
}

/// True when both chunks come from the same document and their char spans
/// share more than [`OVERLAP_DEDUP_RATIO`] of the shorter span.
fn spans_overlap(a: &Chunk, b: &Chunk) -> bool {
    if a.document_id != b.document_id {
        return false;
    }

    let (a_start, a_end) = (a.offset, a.offset + a.char_len());
    let (b_start, b_end) = (b.offset, b.offset + b.char_len());

    let shared = a_end.min(b_end).saturating_sub(a_start.max(b_start));
    let shorter = (a_end - a_start).min(b_end - b_start);
    if shorter == 0 {
        return false;
    }

    shared as f64 / shorter as f64 > OVERLAP_DEDUP_RATIO
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn hit(chunk_id: &str, doc_id: &str, offset: usize, text: &str, rank: usize) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk {
                chunk_id: chunk_id.to_string(),
                document_id: doc_id.to_string(),
                chunk_index: rank,
                offset,
                text: text.to_string(),
                metadata: BTreeMap::new(),
            },
            score: 1.0 - rank as f32 * 0.1,
            rank,
        }
    }

    #[test]
    fn test_budget_never_exceeded() {
        let hits: Vec<RetrievalHit> = (0..20)
            .map(|i| hit(&format!("c{}", i), &format!("d{}", i), 0, &"x".repeat(37), i))
            .collect();

        for budget in [0, 1, 36, 37, 38, 100, 500, 10_000] {
            let context = assemble(&hits, budget);
            assert!(
                context.total_chars <= budget,
                "budget {} exceeded: {}",
                budget,
                context.total_chars
            );
            let actual: usize = context
                .segments
                .iter()
                .map(|s| s.hit.chunk.char_len())
                .sum();
            assert_eq!(actual, context.total_chars);
        }
    }

    #[test]
    fn test_oversized_hit_skipped_not_truncated() {
        let hits = vec![
            hit("c0", "d0", 0, &"a".repeat(90), 0),
            hit("c1", "d1", 0, &"b".repeat(90), 1),
            hit("c2", "d2", 0, &"c".repeat(10), 2),
        ];
        let context = assemble(&hits, 100);

        let ids: Vec<&str> = context
            .segments
            .iter()
            .map(|s| s.hit.chunk.chunk_id.as_str())
            .collect();
        // c1 does not fit whole; the smaller c2 still gets in.
        assert_eq!(ids, vec!["c0", "c2"]);
        assert_eq!(context.total_chars, 100);
    }

    #[test]
    fn test_duplicate_chunk_ids_dropped() {
        let hits = vec![
            hit("c0", "d0", 0, "same chunk", 0),
            hit("c0", "d0", 0, "same chunk", 1),
        ];
        let context = assemble(&hits, 1000);
        assert_eq!(context.segments.len(), 1);
    }

    #[test]
    fn test_substantial_span_overlap_keeps_higher_rank() {
        // Spans [0, 100) and [20, 120): 80 shared chars, 80% of either.
        let hits = vec![
            hit("c0", "doc", 0, &"x".repeat(100), 0),
            hit("c1", "doc", 20, &"y".repeat(100), 1),
        ];
        let context = assemble(&hits, 1000);
        assert_eq!(context.segments.len(), 1);
        assert_eq!(context.segments[0].hit.chunk.chunk_id, "c0");
    }

    #[test]
    fn test_small_window_overlap_keeps_both() {
        // Spans [0, 100) and [80, 180): 20 shared chars, 20% of either.
        let hits = vec![
            hit("c0", "doc", 0, &"x".repeat(100), 0),
            hit("c1", "doc", 80, &"y".repeat(100), 1),
        ];
        let context = assemble(&hits, 1000);
        assert_eq!(context.segments.len(), 2);
    }

    #[test]
    fn test_same_offsets_different_documents_kept() {
        let hits = vec![
            hit("a:0", "a", 0, &"x".repeat(50), 0),
            hit("b:0", "b", 0, &"y".repeat(50), 1),
        ];
        let context = assemble(&hits, 1000);
        assert_eq!(context.segments.len(), 2);
    }

    #[test]
    fn test_citation_prefers_origin_metadata() {
        let mut with_origin = hit("c0", "d0", 0, "text", 0);
        with_origin
            .chunk
            .metadata
            .insert("origin".to_string(), "notes/a.md".to_string());
        let bare = hit("c1", "d1", 0, "text", 1);

        let context = assemble(&[with_origin, bare], 1000);
        assert_eq!(context.citations(), vec!["notes/a.md", "d1"]);
    }
}
