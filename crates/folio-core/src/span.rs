//! Span and evidence data model
//!
//! A [`Span`] is an atomic unit of extracted document content: positioned,
//! classified, immutable once written. [`Evidence`] is the scored projection
//! of a span returned by the retrievers; it is constructed per request and
//! never persisted.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle `[x0, y0, x1, y1]`, top-left origin.
pub type BBox = [f32; 4];

/// Placeholder marker prefix for non-text span content (`[[PICTURE]]` etc.)
pub const PLACEHOLDER_PREFIX: &str = "[[";

/// Layout classification of a span.
///
/// Open set: values produced by newer extraction engines that this build
/// does not know decode as [`SpanKind::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanKind {
    Text,
    Table,
    Picture,
    Graphic,
    PageHeader,
    PageFooter,
    #[serde(other)]
    Unknown,
}

/// A positioned, classified fragment of extracted document text.
///
/// Persisted as one JSONL record per span. Decoding is schema-tolerant:
/// unknown fields are ignored and absent optional fields take their
/// defaults, so records written by older or newer engines still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique within one ingestion of one document
    pub span_id: String,
    /// Content hash of the source bytes, `sha256:<hex>`
    pub doc_id: String,
    /// 0-indexed page number
    pub page: u32,
    /// Rectangle in source point coordinates (top-left origin)
    pub bbox_pdf: BBox,
    /// Rectangle normalized to [0,1] by page width/height
    pub bbox_norm: BBox,
    /// Whitespace-collapsed text content
    pub text: String,
    /// Monotonically increasing extraction order within the document
    pub reading_order: u32,
    #[serde(default)]
    pub is_header: bool,
    #[serde(default)]
    pub is_footer: bool,
    /// Layout classification, absent for engines that do not classify
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SpanKind>,
    /// Half-open character offsets into the per-page text blob, if recovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<(u32, u32)>,
    /// Provenance tag identifying the extraction path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Span {
    /// True when the text is a reserved placeholder marker rather than content
    pub fn is_placeholder(&self) -> bool {
        self.text.starts_with(PLACEHOLDER_PREFIX)
    }
}

/// A scored span returned from a retrieval operation.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub span_id: String,
    pub page: u32,
    pub bbox_norm: BBox,
    pub text: String,
    /// Retrieval-method-specific score; not comparable across methods
    pub score: f32,
}

impl Evidence {
    /// Project a span into evidence with the given score
    pub fn from_span(span: &Span, score: f32) -> Self {
        Self {
            span_id: span.span_id.clone(),
            page: span.page,
            bbox_norm: span.bbox_norm,
            text: span.text.clone(),
            score,
        }
    }
}
