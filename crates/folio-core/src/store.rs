//! Content-addressed span store
//!
//! One file pair per document under the data directory: an append-only JSONL
//! stream of spans plus a JSON summary. The original PDF bytes and the
//! embedding index live alongside under the same content-hash key.
//!
//! Write discipline: spans are committed before the doc summary, and every
//! file goes through a same-directory temp file + rename, so a reader that
//! sees the summary can rely on the spans being present and whole.

use crate::error::{FolioError, Result};
use crate::span::Span;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of every document id
pub const DOC_ID_PREFIX: &str = "sha256:";

/// Compute the content-addressed document id for a byte payload.
///
/// Identical bytes always map to the same id, which makes re-ingestion
/// idempotent.
pub fn doc_id_from_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(DOC_ID_PREFIX.len() + digest.len() * 2);
    out.push_str(DOC_ID_PREFIX);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// On-disk locations for one document
#[derive(Debug, Clone)]
pub struct DocPaths {
    pub pdf: PathBuf,
    pub spans: PathBuf,
    pub doc: PathBuf,
    pub embeddings: PathBuf,
    pub embeddings_meta: PathBuf,
}

/// Ingestion parameters recorded in the doc summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMeta {
    pub engine: String,
    pub min_chars: usize,
}

/// Per-document summary written after the spans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub doc_id: String,
    pub n_pages: u32,
    pub n_spans: usize,
    pub ingest: IngestMeta,
}

/// Filesystem-backed span store
#[derive(Debug, Clone)]
pub struct SpanStore {
    root: PathBuf,
}

impl SpanStore {
    /// Open a store rooted at the given directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File locations for a document id (`:` is not portable in filenames)
    pub fn paths(&self, doc_id: &str) -> DocPaths {
        let safe = doc_id.replace(':', "_");
        DocPaths {
            pdf: self.root.join(format!("{safe}.pdf")),
            spans: self.root.join(format!("{safe}.spans.jsonl")),
            doc: self.root.join(format!("{safe}.doc.json")),
            embeddings: self.root.join(format!("{safe}.embeddings.f32")),
            embeddings_meta: self.root.join(format!("{safe}.embeddings_meta.json")),
        }
    }

    /// Persist the original PDF bytes
    pub fn write_pdf(&self, doc_id: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.paths(doc_id).pdf, bytes)
    }

    /// Read back the original PDF bytes
    pub fn read_pdf(&self, doc_id: &str) -> Result<Vec<u8>> {
        let path = self.paths(doc_id).pdf;
        if !path.exists() {
            return Err(FolioError::DocumentNotFound(doc_id.to_string()));
        }
        Ok(fs::read(path)?)
    }

    /// Persist spans for a document, replacing any prior set
    pub fn write_spans(&self, doc_id: &str, spans: &[Span]) -> Result<()> {
        let mut buf = Vec::new();
        for span in spans {
            serde_json::to_writer(&mut buf, span)?;
            buf.push(b'\n');
        }
        write_atomic(&self.paths(doc_id).spans, &buf)
    }

    /// Read the ordered span sequence for a document.
    ///
    /// Fails with [`FolioError::DocumentNotFound`] if the document was never
    /// ingested. Unknown record fields are ignored and absent optional
    /// fields default, so payloads from other engine versions still load.
    pub fn read_spans(&self, doc_id: &str) -> Result<Vec<Span>> {
        let path = self.paths(doc_id).spans;
        if !path.exists() {
            return Err(FolioError::DocumentNotFound(doc_id.to_string()));
        }
        let raw = fs::read_to_string(path)?;
        let mut spans = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            spans.push(serde_json::from_str::<Span>(line)?);
        }
        Ok(spans)
    }

    /// Write the doc summary. Call only after the spans are committed.
    pub fn write_doc_meta(&self, meta: &DocMeta) -> Result<()> {
        let buf = serde_json::to_vec_pretty(meta)?;
        write_atomic(&self.paths(&meta.doc_id).doc, &buf)
    }

    /// Read the doc summary
    pub fn read_doc_meta(&self, doc_id: &str) -> Result<DocMeta> {
        let path = self.paths(doc_id).doc;
        if !path.exists() {
            return Err(FolioError::DocumentNotFound(doc_id.to_string()));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// True once both spans and summary are committed
    pub fn is_ingested(&self, doc_id: &str) -> bool {
        let p = self.paths(doc_id);
        p.spans.exists() && p.doc.exists()
    }
}

/// Write bytes through a same-directory temp file and rename into place,
/// so concurrent readers never observe a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanKind;

    fn make_span(span_id: &str, reading_order: u32) -> Span {
        Span {
            span_id: span_id.to_string(),
            doc_id: "sha256:test".to_string(),
            page: 0,
            bbox_pdf: [0.0, 0.0, 100.0, 20.0],
            bbox_norm: [0.0, 0.0, 0.2, 0.03],
            text: "The quick brown fox jumps over the lazy dog.".to_string(),
            reading_order,
            is_header: false,
            is_footer: false,
            kind: Some(SpanKind::Text),
            pos: None,
            source: Some("mupdf_blocks".to_string()),
        }
    }

    #[test]
    fn test_doc_id_is_idempotent() {
        let a = doc_id_from_bytes(b"same bytes");
        let b = doc_id_from_bytes(b"same bytes");
        assert_eq!(a, b);
        assert!(a.starts_with(DOC_ID_PREFIX));
        assert_ne!(a, doc_id_from_bytes(b"other bytes"));
    }

    #[test]
    fn test_read_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        match store.read_spans("sha256:absent") {
            Err(FolioError::DocumentNotFound(id)) => assert_eq!(id, "sha256:absent"),
            other => panic!("expected DocumentNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_span_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        let spans = vec![make_span("p000_b000", 0), make_span("p000_b001", 1)];
        store.write_spans("sha256:test", &spans).unwrap();
        let back = store.read_spans("sha256:test").unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].span_id, "p000_b000");
        assert_eq!(back[1].reading_order, 1);
    }

    #[test]
    fn test_read_tolerates_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        let line = r#"{"span_id":"p000_b000","doc_id":"sha256:test","page":0,
            "bbox_pdf":[0.0,0.0,1.0,1.0],"bbox_norm":[0.0,0.0,1.0,1.0],
            "text":"forward compatible record","reading_order":0,
            "future_field":{"nested":true}}"#
            .replace('\n', " ");
        let path = store.paths("sha256:test").spans;
        std::fs::write(path, format!("{line}\n")).unwrap();
        let spans = store.read_spans("sha256:test").unwrap();
        assert_eq!(spans.len(), 1);
        assert!(!spans[0].is_header);
        assert_eq!(spans[0].kind, None);
    }

    #[test]
    fn test_doc_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpanStore::open(dir.path()).unwrap();
        let meta = DocMeta {
            doc_id: "sha256:test".to_string(),
            n_pages: 3,
            n_spans: 12,
            ingest: IngestMeta {
                engine: "blocks".to_string(),
                min_chars: 20,
            },
        };
        store.write_doc_meta(&meta).unwrap();
        let back = store.read_doc_meta("sha256:test").unwrap();
        assert_eq!(back.n_pages, 3);
        assert_eq!(back.ingest.engine, "blocks");
    }
}
