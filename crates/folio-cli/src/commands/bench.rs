//! `folio bench` - ingestion quality against gold annotations
//!
//! Gold files are `<name>.gold.json`:
//! `{"doc_id": "sha256:...", "pages": {"0": [{"bbox_norm": [..], "kind": "text"}, ...]}}`

use crate::app::BenchArgs;
use anyhow::Context;
use folio_core::{ingestion_metrics, FolioError, LayoutSpan, SpanStore};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

#[derive(Deserialize)]
struct GoldFile {
    doc_id: String,
    #[serde(default)]
    pages: BTreeMap<String, Vec<LayoutSpan>>,
}

pub fn run(args: BenchArgs, store: &SpanStore) -> anyhow::Result<()> {
    if !args.annotations_dir.exists() {
        anyhow::bail!(
            "annotations dir not found: {} (create gold annotation JSON files there)",
            args.annotations_dir.display()
        );
    }

    let mut gold_files: Vec<_> = fs::read_dir(&args.annotations_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".gold.json"))
        })
        .collect();
    gold_files.sort();

    for path in gold_files {
        let gold: GoldFile = serde_json::from_slice(&fs::read(&path)?)
            .with_context(|| format!("parsing {}", path.display()))?;
        println!("Evaluating: {}", path.display());

        let spans = match store.read_spans(&gold.doc_id) {
            Ok(spans) => spans,
            Err(FolioError::DocumentNotFound(_)) => {
                eprintln!("  spans not found for {} - ingest the PDF first", gold.doc_id);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        for (page_key, gold_spans) in &gold.pages {
            let page: u32 = page_key
                .parse()
                .with_context(|| format!("page key '{page_key}' in {}", path.display()))?;
            let predicted: Vec<LayoutSpan> = spans
                .iter()
                .filter(|s| s.page == page)
                .map(|s| LayoutSpan {
                    bbox_norm: s.bbox_norm,
                    kind: s.kind,
                })
                .collect();
            let metrics = ingestion_metrics(gold_spans, &predicted);
            println!(
                "  page {page}: IoU={:.3}  Layout={:.3}  Coverage={:.3}  Spurious={:.3}  (gold={} predicted={} matched={})",
                metrics.mean_iou,
                metrics.layout_accuracy,
                metrics.coverage,
                metrics.spurious_rate,
                metrics.n_gold,
                metrics.n_predicted,
                metrics.n_matched,
            );
        }
    }
    Ok(())
}
