//! Embedding index build and semantic retrieval
//!
//! The index is a file pair per document: a raw little-endian f32 matrix
//! (one L2-normalized row per embeddable span) and a JSON sidecar recording
//! the model identity, the ordered span ids, and the dimensionality.
//! Rebuilding overwrites the pair in place; there is no incremental merge.

use crate::error::{FolioError, Result};
use crate::llm::Embedder;
use crate::span::{Evidence, Span, SpanKind, PLACEHOLDER_PREFIX};
use crate::store::{write_atomic, SpanStore};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use tracing::debug;

/// Select the spans eligible for vector indexing.
///
/// Excludes header/footer spans, picture/graphic regions, placeholder
/// markers, and spans shorter than `min_chars`.
pub fn filter_embeddable(spans: &[Span], min_chars: usize) -> Vec<&Span> {
    spans
        .iter()
        .filter(|s| {
            !s.is_header
                && !s.is_footer
                && !matches!(s.kind, Some(SpanKind::Picture) | Some(SpanKind::Graphic))
                && !s.text.starts_with(PLACEHOLDER_PREFIX)
                && s.text.chars().count() >= min_chars
        })
        .collect()
}

/// Sidecar metadata persisted next to the vector matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMeta {
    model: String,
    span_ids: Vec<String>,
    dim: usize,
}

/// In-memory embedding index: row i embeds the span `span_ids[i]`
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    pub model: String,
    pub dim: usize,
    pub span_ids: Vec<String>,
    vectors: Vec<f32>,
}

impl EmbeddingIndex {
    pub fn rows(&self) -> usize {
        self.span_ids.len()
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dim..(i + 1) * self.dim]
    }

    /// Load the index for a document.
    ///
    /// Fails with [`FolioError::EmbeddingsNotFound`] when the file pair is
    /// absent — distinct from a missing document, so callers can tell
    /// "run vectorize" from "run ingest".
    pub fn load(store: &SpanStore, doc_id: &str) -> Result<Self> {
        let paths = store.paths(doc_id);
        if !paths.embeddings.exists() || !paths.embeddings_meta.exists() {
            return Err(FolioError::EmbeddingsNotFound(doc_id.to_string()));
        }
        let meta: IndexMeta = serde_json::from_slice(&fs::read(&paths.embeddings_meta)?)?;
        let bytes = fs::read(&paths.embeddings)?;
        let expected = meta.span_ids.len() * meta.dim * std::mem::size_of::<f32>();
        if bytes.len() != expected {
            return Err(FolioError::InvalidInput(format!(
                "embedding matrix for {doc_id} is {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let vectors = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            model: meta.model,
            dim: meta.dim,
            span_ids: meta.span_ids,
            vectors,
        })
    }

    /// Overwrite the on-disk index for a document
    pub fn save(&self, store: &SpanStore, doc_id: &str) -> Result<()> {
        let paths = store.paths(doc_id);
        let mut buf = Vec::with_capacity(self.vectors.len() * 4);
        for v in &self.vectors {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        write_atomic(&paths.embeddings, &buf)?;
        let meta = IndexMeta {
            model: self.model.clone(),
            span_ids: self.span_ids.clone(),
            dim: self.dim,
        };
        write_atomic(&paths.embeddings_meta, &serde_json::to_vec_pretty(&meta)?)
    }
}

/// Outcome of an index build
#[derive(Debug, Clone, Serialize)]
pub struct VectorizeReport {
    pub doc_id: String,
    pub model: String,
    pub dim: usize,
    pub n_embedded: usize,
    pub n_skipped: usize,
}

/// Build (or fully rebuild) the embedding index for a document.
///
/// Embeds every embeddable span in one batch, L2-normalizes the rows, and
/// overwrites the index file pair. Re-run after any re-ingestion.
pub async fn vectorize_spans(
    store: &SpanStore,
    embedder: &dyn Embedder,
    doc_id: &str,
    min_chars: usize,
) -> Result<VectorizeReport> {
    let spans = store.read_spans(doc_id)?;
    let embeddable = filter_embeddable(&spans, min_chars);
    let texts: Vec<String> = embeddable.iter().map(|s| s.text.clone()).collect();

    let rows = embedder.embed_batch(&texts).await?;
    if rows.len() != texts.len() {
        return Err(FolioError::Llm(format!(
            "embedding service returned {} vectors for {} inputs",
            rows.len(),
            texts.len()
        )));
    }
    let dim = rows.first().map(|v| v.len()).unwrap_or(embedder.dimensions());

    let mut vectors = Vec::with_capacity(rows.len() * dim);
    for mut row in rows {
        if row.len() != dim {
            return Err(FolioError::Llm(format!(
                "embedding dimension varies within one batch ({} vs {dim})",
                row.len()
            )));
        }
        l2_normalize(&mut row);
        vectors.extend_from_slice(&row);
    }

    let index = EmbeddingIndex {
        model: embedder.model_name().to_string(),
        dim,
        span_ids: embeddable.iter().map(|s| s.span_id.clone()).collect(),
        vectors,
    };
    index.save(store, doc_id)?;

    Ok(VectorizeReport {
        doc_id: doc_id.to_string(),
        model: index.model,
        dim,
        n_embedded: index.span_ids.len(),
        n_skipped: spans.len() - index.span_ids.len(),
    })
}

/// Retrieve evidence by vector similarity.
///
/// Rows are pre-normalized at index time, so a plain dot product against
/// the normalized query equals cosine similarity. The sidecar's model
/// identity is authoritative: an embedder with a different model or
/// dimensionality is rejected rather than producing silently wrong scores.
pub async fn retrieve_semantic(
    store: &SpanStore,
    embedder: &dyn Embedder,
    doc_id: &str,
    query: &str,
    page: Option<u32>,
    top_k: usize,
) -> Result<Vec<Evidence>> {
    let spans = store.read_spans(doc_id)?;
    let index = EmbeddingIndex::load(store, doc_id)?;

    if embedder.model_name() != index.model {
        return Err(FolioError::InvalidInput(format!(
            "index for {doc_id} was built with model '{}', not '{}'",
            index.model,
            embedder.model_name()
        )));
    }

    let mut query_vec = embedder.embed(query).await?;
    if query_vec.len() != index.dim {
        return Err(FolioError::InvalidInput(format!(
            "query embedding has dim {}, index has dim {}",
            query_vec.len(),
            index.dim
        )));
    }
    l2_normalize(&mut query_vec);

    let by_id: HashMap<&str, &Span> = spans.iter().map(|s| (s.span_id.as_str(), s)).collect();

    let mut sims: Vec<(usize, f32)> = (0..index.rows())
        .map(|i| (i, dot(&query_vec, index.row(i))))
        .collect();
    sims.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut out = Vec::new();
    for (i, sim) in sims {
        if out.len() >= top_k {
            break;
        }
        let span_id = index.span_ids[i].as_str();
        let Some(span) = by_id.get(span_id) else {
            // stale index row; tolerated
            debug!("index row {i} references unknown span {span_id}");
            continue;
        };
        if let Some(p) = page {
            if span.page != p {
                continue;
            }
        }
        out.push(Evidence::from_span(span, sim));
    }
    Ok(out)
}

/// Scale a vector to unit length (no-op for the zero vector)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Plain dot product; equals cosine similarity for unit vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn make_span(text: &str) -> Span {
        Span {
            span_id: "p000_b000".to_string(),
            doc_id: "sha256:test".to_string(),
            page: 0,
            bbox_pdf: [0.0, 0.0, 1.0, 1.0],
            bbox_norm: [0.0, 0.0, 1.0, 1.0],
            text: text.to_string(),
            reading_order: 0,
            is_header: false,
            is_footer: false,
            kind: None,
            pos: None,
            source: None,
        }
    }

    #[test]
    fn test_filter_keeps_normal_text() {
        let spans = vec![make_span("Hello world, this is a test span.")];
        assert_eq!(filter_embeddable(&spans, 20).len(), 1);
    }

    #[test]
    fn test_filter_removes_pictures_and_graphics() {
        let mut picture = make_span("[[PICTURE]]");
        picture.kind = Some(SpanKind::Picture);
        let mut graphic = make_span("[[GRAPHIC]]");
        graphic.kind = Some(SpanKind::Graphic);
        assert!(filter_embeddable(&[picture, graphic], 1).is_empty());
    }

    #[test]
    fn test_filter_removes_headers_and_footers() {
        let mut header = make_span("A header long enough to otherwise pass");
        header.is_header = true;
        let mut footer = make_span("A footer long enough to otherwise pass");
        footer.is_footer = true;
        assert!(filter_embeddable(&[header, footer], 20).is_empty());
    }

    #[test]
    fn test_filter_removes_short_text() {
        let spans = vec![make_span("short")];
        assert!(filter_embeddable(&spans, 20).is_empty());
    }

    #[test]
    fn test_filter_removes_placeholder_text() {
        let spans = vec![make_span("[[TABLE 3x4]] with enough trailing characters")];
        assert!(filter_embeddable(&spans, 20).is_empty());
    }

    #[test]
    fn test_l2_normalize_and_dot() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        let index = EmbeddingIndex {
            model: "stub".to_string(),
            dim: 2,
            span_ids: vec!["a".to_string(), "b".to_string()],
            vectors: vec![1.0, 0.0, 0.0, 1.0],
        };
        index.save(&store, "sha256:test").unwrap();
        let back = EmbeddingIndex::load(&store, "sha256:test").unwrap();
        assert_eq!(back.rows(), 2);
        assert_eq!(back.row(1), &[0.0, 1.0]);
        assert_eq!(back.model, "stub");
    }

    #[test]
    fn test_load_missing_index_is_embeddings_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        match EmbeddingIndex::load(&store, "sha256:test") {
            Err(FolioError::EmbeddingsNotFound(_)) => {}
            other => panic!("expected EmbeddingsNotFound, got {other:?}"),
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_semantic_distinguishes_missing_doc_from_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        let embedder = FixedEmbedder;

        // no spans at all -> document missing
        match retrieve_semantic(&store, &embedder, "sha256:test", "q", None, 5).await {
            Err(FolioError::DocumentNotFound(_)) => {}
            other => panic!("expected DocumentNotFound, got {other:?}"),
        }

        // spans but no index -> embeddings missing
        store
            .write_spans("sha256:test", &[make_span("Hello world, this is a test span.")])
            .unwrap();
        match retrieve_semantic(&store, &embedder, "sha256:test", "q", None, 5).await {
            Err(FolioError::EmbeddingsNotFound(_)) => {}
            other => panic!("expected EmbeddingsNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_semantic_rejects_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        store
            .write_spans("sha256:test", &[make_span("Hello world, this is a test span.")])
            .unwrap();
        let index = EmbeddingIndex {
            model: "some-other-model".to_string(),
            dim: 2,
            span_ids: vec!["p000_b000".to_string()],
            vectors: vec![1.0, 0.0],
        };
        index.save(&store, "sha256:test").unwrap();
        match retrieve_semantic(&store, &FixedEmbedder, "sha256:test", "q", None, 5).await {
            Err(FolioError::InvalidInput(_)) => {}
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }
}
