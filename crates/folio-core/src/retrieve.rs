//! Lexical evidence retrieval
//!
//! Scores the spans of one page against a literal query with partial fuzzy
//! similarity, expands the best matches to their reading-order neighbors to
//! recover context around mid-paragraph hits, and returns the deduplicated
//! evidence in page reading order.

use crate::error::Result;
use crate::span::{Evidence, Span};
use crate::store::SpanStore;
use rapidfuzz::fuzz;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Lexical retrieval tuning
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Number of top-scoring candidates to select
    pub top_k: usize,
    /// Reading-order neighbors pulled in around each selected candidate (±N)
    pub neighbor_window: usize,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 8,
            neighbor_window: 1,
        }
    }
}

/// Retrieve evidence for a text selection on one page.
///
/// Fails with `DocumentNotFound` if the document has no stored spans.
/// Returns an empty sequence (not an error) when the page has no spans.
/// Neighbor spans inherit the score of the match that pulled them in.
pub fn retrieve(
    store: &SpanStore,
    doc_id: &str,
    page: u32,
    selected_text: &str,
    opts: &RetrieveOptions,
) -> Result<Vec<Evidence>> {
    let spans = store.read_spans(doc_id)?;
    let candidates: Vec<&Span> = spans
        .iter()
        .filter(|s| s.page == page && !s.is_header && !s.is_footer)
        .collect();

    let query = crate::ingest::collapse_ws(selected_text);

    let mut scored: Vec<(f64, &Span)> = candidates
        .iter()
        .map(|s| (fuzz::partial_ratio(query.chars(), s.text.chars()), *s))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    let top = &scored[..scored.len().min(opts.top_k)];

    // Neighbor expansion works over the page-local reading order
    let mut ro_sorted = candidates.clone();
    ro_sorted.sort_by_key(|s| s.reading_order);
    let idx_by_id: HashMap<&str, usize> = ro_sorted
        .iter()
        .enumerate()
        .map(|(i, s)| (s.span_id.as_str(), i))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut out: Vec<Evidence> = Vec::new();
    for (score, span) in top {
        let Some(&i) = idx_by_id.get(span.span_id.as_str()) else {
            continue;
        };
        let lo = i.saturating_sub(opts.neighbor_window);
        let hi = (i + opts.neighbor_window + 1).min(ro_sorted.len());
        for neighbor in &ro_sorted[lo..hi] {
            if seen.insert(neighbor.span_id.as_str()) {
                out.push(Evidence::from_span(neighbor, *score as f32));
            }
        }
    }

    // Present evidence top-to-bottom as on the page, not by score;
    // spans with no recoverable order go last.
    out.sort_by_key(|e| {
        idx_by_id
            .get(e.span_id.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
    Ok(out)
}
