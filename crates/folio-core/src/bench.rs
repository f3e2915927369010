//! Ingestion quality evaluation
//!
//! Pure functions matching predicted layout spans against gold annotations
//! by bounding-box IoU. Matching is greedy and order-dependent: gold spans
//! claim their best unmatched predicted span in input order, ties broken by
//! predicted-list order. This is a fast approximation, not optimal bipartite
//! assignment, and is kept exactly as-is so historical metric runs stay
//! comparable.

use crate::span::{BBox, SpanKind};
use serde::{Deserialize, Serialize};

/// Default IoU acceptance threshold for a match
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// A span reduced to what the evaluator needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSpan {
    pub bbox_norm: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SpanKind>,
}

/// One accepted gold/predicted pairing
#[derive(Debug, Clone, PartialEq)]
pub struct SpanMatch {
    pub gold: usize,
    pub predicted: usize,
    pub iou: f64,
}

/// Aggregated quality metrics for one page or document
#[derive(Debug, Clone, Serialize)]
pub struct IngestionMetrics {
    /// Mean IoU over accepted matches
    pub mean_iou: f64,
    /// Fraction of matches whose `kind` labels agree
    pub layout_accuracy: f64,
    /// Fraction of gold spans that found a match
    pub coverage: f64,
    /// Fraction of predicted spans left unmatched (0 when none predicted)
    pub spurious_rate: f64,
    pub n_gold: usize,
    pub n_predicted: usize,
    pub n_matched: usize,
}

/// Intersection-over-union of two bboxes `[x0, y0, x1, y1]`.
///
/// Returns 0 when the union area is non-positive (degenerate or disjoint).
pub fn bbox_iou(a: &BBox, b: &BBox) -> f64 {
    let a = [a[0] as f64, a[1] as f64, a[2] as f64, a[3] as f64];
    let b = [b[0] as f64, b[1] as f64, b[2] as f64, b[3] as f64];
    let x0 = a[0].max(b[0]);
    let y0 = a[1].max(b[1]);
    let x1 = a[2].min(b[2]);
    let y1 = a[3].min(b[3]);
    let inter = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Match gold spans to predicted spans by best IoU, greedily.
///
/// Each predicted span matches at most once; a pairing is accepted only
/// when its IoU reaches `iou_threshold`. First gold span wins contested
/// predictions.
pub fn match_spans(
    gold: &[LayoutSpan],
    predicted: &[LayoutSpan],
    iou_threshold: f64,
) -> Vec<SpanMatch> {
    let mut used = vec![false; predicted.len()];
    let mut matches = Vec::new();
    for (gi, g) in gold.iter().enumerate() {
        let mut best_iou = 0.0;
        let mut best_idx = None;
        for (pi, p) in predicted.iter().enumerate() {
            if used[pi] {
                continue;
            }
            let iou = bbox_iou(&g.bbox_norm, &p.bbox_norm);
            if iou > best_iou {
                best_iou = iou;
                best_idx = Some(pi);
            }
        }
        if let Some(pi) = best_idx {
            if best_iou >= iou_threshold {
                used[pi] = true;
                matches.push(SpanMatch {
                    gold: gi,
                    predicted: pi,
                    iou: best_iou,
                });
            }
        }
    }
    matches
}

/// Compute ingestion quality metrics between gold and predicted spans.
pub fn ingestion_metrics(gold: &[LayoutSpan], predicted: &[LayoutSpan]) -> IngestionMetrics {
    let matches = match_spans(gold, predicted, DEFAULT_IOU_THRESHOLD);

    let mean_iou = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|m| m.iou).sum::<f64>() / matches.len() as f64
    };

    let kind_correct = matches
        .iter()
        .filter(|m| gold[m.gold].kind == predicted[m.predicted].kind)
        .count();
    let layout_accuracy = if matches.is_empty() {
        0.0
    } else {
        kind_correct as f64 / matches.len() as f64
    };

    let coverage = if gold.is_empty() {
        0.0
    } else {
        matches.len() as f64 / gold.len() as f64
    };

    let spurious_rate = if predicted.is_empty() {
        0.0
    } else {
        1.0 - matches.len() as f64 / predicted.len() as f64
    };

    IngestionMetrics {
        mean_iou: round4(mean_iou),
        layout_accuracy: round4(layout_accuracy),
        coverage: round4(coverage),
        spurious_rate: round4(spurious_rate),
        n_gold: gold.len(),
        n_predicted: predicted.len(),
        n_matched: matches.len(),
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
