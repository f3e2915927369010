//! PDF ingestion
//!
//! Turns PDF bytes into an ordered span sequence and persists it through the
//! [`SpanStore`]. All geometry comes from the structured-text API of the
//! parsing engine; this module only sorts, filters, classifies, and records.
//!
//! Two engines:
//! - `blocks`: plain text blocks in top-left reading order.
//! - `layout`: additionally preserves image blocks as placeholder picture
//!   spans and classifies short blocks inside the page margin bands as
//!   header/footer.

use crate::error::Result;
use crate::span::{BBox, Span, SpanKind};
use crate::store::{doc_id_from_bytes, DocMeta, IngestMeta, SpanStore};
use mupdf::{Document, Page, Rect, TextPageOptions};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Placeholder text recorded for image blocks
pub const PICTURE_PLACEHOLDER: &str = "[[PICTURE]]";

/// Pages are divided into margin bands for header/footer classification:
/// a short block entirely above `HEADER_BAND` (normalized y) is a header,
/// one entirely below `FOOTER_BAND` is a footer.
const HEADER_BAND: f32 = 0.08;
const FOOTER_BAND: f32 = 0.92;

/// Blocks longer than this never classify as header/footer
const MARGIN_MAX_CHARS: usize = 120;

/// Ingestion engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Blocks,
    Layout,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Blocks => "blocks",
            Engine::Layout => "layout",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion parameters
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub engine: Engine,
    pub min_chars: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            engine: Engine::Blocks,
            min_chars: 20,
        }
    }
}

/// Ingest a PDF byte payload, replacing any prior spans for the same bytes.
///
/// The document id is the content hash of the input, so ingesting identical
/// bytes twice is idempotent. Spans are committed before the doc summary.
pub fn ingest_pdf_bytes(
    store: &SpanStore,
    pdf_bytes: &[u8],
    opts: &IngestOptions,
) -> Result<DocMeta> {
    let doc_id = doc_id_from_bytes(pdf_bytes);
    store.write_pdf(&doc_id, pdf_bytes)?;

    let doc = Document::from_bytes(pdf_bytes, "application/pdf")?;
    let n_pages = doc.page_count()? as u32;

    let mut spans: Vec<Span> = Vec::new();
    let mut reading_order: u32 = 0;

    for page_i in 0..n_pages {
        let page = doc.load_page(page_i as i32)?;
        let bounds = page.bounds()?;
        let text_opts = match opts.engine {
            Engine::Blocks => TextPageOptions::empty(),
            Engine::Layout => TextPageOptions::PRESERVE_IMAGES,
        };
        let blocks = page_blocks(&page, text_opts)?;

        match opts.engine {
            Engine::Blocks => {
                for (bi, block) in blocks.iter().enumerate() {
                    if block.text.chars().count() < opts.min_chars {
                        continue;
                    }
                    spans.push(Span {
                        span_id: format!("p{page_i:03}_b{bi:03}"),
                        doc_id: doc_id.clone(),
                        page: page_i,
                        bbox_pdf: block.bbox,
                        bbox_norm: norm_bbox(&block.bbox, &bounds),
                        text: block.text.clone(),
                        reading_order,
                        is_header: false,
                        is_footer: false,
                        kind: None,
                        pos: None,
                        source: Some("mupdf_blocks".to_string()),
                    });
                    reading_order += 1;
                }
            }
            Engine::Layout => {
                let mut page_counter: HashMap<&'static str, usize> = HashMap::new();
                let mut li = 0usize;
                for block in &blocks {
                    let bbox_norm = norm_bbox(&block.bbox, &bounds);
                    let block_chars = block.text.chars().count();
                    let (kind, text, is_header, is_footer) = if block.text.is_empty() {
                        (SpanKind::Picture, PICTURE_PLACEHOLDER.to_string(), false, false)
                    } else if bbox_norm[3] <= HEADER_BAND && block_chars <= MARGIN_MAX_CHARS {
                        (SpanKind::PageHeader, block.text.clone(), true, false)
                    } else if bbox_norm[1] >= FOOTER_BAND && block_chars <= MARGIN_MAX_CHARS {
                        (SpanKind::PageFooter, block.text.clone(), false, true)
                    } else {
                        (SpanKind::Text, block.text.clone(), false, false)
                    };
                    if kind == SpanKind::Text && block_chars < opts.min_chars {
                        continue;
                    }
                    *page_counter.entry(kind_label(kind)).or_insert(0) += 1;
                    spans.push(Span {
                        span_id: format!("p{page_i:03}_L{li:04}"),
                        doc_id: doc_id.clone(),
                        page: page_i,
                        bbox_pdf: block.bbox,
                        bbox_norm,
                        text,
                        reading_order,
                        is_header,
                        is_footer,
                        kind: Some(kind),
                        pos: None,
                        source: Some("mupdf_layout".to_string()),
                    });
                    reading_order += 1;
                    li += 1;
                }
                info!("page {page_i}: {page_counter:?}");
            }
        }
    }

    let meta = DocMeta {
        doc_id: doc_id.clone(),
        n_pages,
        n_spans: spans.len(),
        ingest: IngestMeta {
            engine: opts.engine.as_str().to_string(),
            min_chars: opts.min_chars,
        },
    };

    store.write_spans(&doc_id, &spans)?;
    store.write_doc_meta(&meta)?;

    info!(
        "ingested {} pages, {} spans ({} engine)",
        n_pages,
        spans.len(),
        opts.engine
    );
    Ok(meta)
}

struct RawBlock {
    bbox: BBox,
    text: String,
}

/// Extract the page's text blocks, sorted into top-left reading order.
fn page_blocks(page: &Page, opts: TextPageOptions) -> Result<Vec<RawBlock>> {
    let text_page = page.to_text_page(opts)?;
    let mut blocks = Vec::new();
    for block in text_page.blocks() {
        let b = block.bounds();
        let mut text = String::new();
        for line in block.lines() {
            if !text.is_empty() {
                text.push('\n');
            }
            for ch in line.chars() {
                if let Some(c) = ch.char() {
                    text.push(c);
                }
            }
        }
        blocks.push(RawBlock {
            bbox: [b.x0, b.y0, b.x1, b.y1],
            text: collapse_ws(&text),
        });
    }
    blocks.sort_by(|a, b| {
        (a.bbox[1], a.bbox[0])
            .partial_cmp(&(b.bbox[1], b.bbox[0]))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(blocks)
}

/// Collapse all whitespace runs to single spaces and trim
pub(crate) fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a point-coordinate bbox into [0,1] page space
fn norm_bbox(bbox: &BBox, page: &Rect) -> BBox {
    let w = (page.x1 - page.x0).max(f32::EPSILON);
    let h = (page.y1 - page.y0).max(f32::EPSILON);
    let nx = |x: f32| ((x - page.x0) / w).clamp(0.0, 1.0);
    let ny = |y: f32| ((y - page.y0) / h).clamp(0.0, 1.0);
    [nx(bbox[0]), ny(bbox[1]), nx(bbox[2]), ny(bbox[3])]
}

fn kind_label(kind: SpanKind) -> &'static str {
    match kind {
        SpanKind::Text => "text",
        SpanKind::Table => "table",
        SpanKind::Picture => "picture",
        SpanKind::Graphic => "graphic",
        SpanKind::PageHeader => "page-header",
        SpanKind::PageFooter => "page-footer",
        SpanKind::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_ws() {
        assert_eq!(collapse_ws("  a\n\tb   c "), "a b c");
        assert_eq!(collapse_ws(""), "");
    }

    #[test]
    fn test_norm_bbox_clamps_into_unit_square() {
        let page = Rect::new(0.0, 0.0, 612.0, 792.0);
        let n = norm_bbox(&[-10.0, 0.0, 306.0, 800.0], &page);
        assert_eq!(n[0], 0.0);
        assert!((n[2] - 0.5).abs() < 1e-6);
        assert_eq!(n[3], 1.0);
        assert!(n[0] <= n[2] && n[1] <= n[3]);
    }

    #[test]
    fn test_engine_labels() {
        assert_eq!(Engine::Blocks.as_str(), "blocks");
        assert_eq!(Engine::Layout.to_string(), "layout");
    }
}
