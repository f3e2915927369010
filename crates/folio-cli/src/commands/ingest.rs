//! `folio ingest` - extract spans from a PDF into the store

use crate::app::IngestArgs;
use folio_core::{ingest_pdf_bytes, Config, IngestOptions, SpanStore};

pub fn run(args: IngestArgs, store: &SpanStore, config: &Config) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.pdf)?;
    let opts = IngestOptions {
        engine: args.engine.into(),
        min_chars: config.min_chars,
    };
    let meta = ingest_pdf_bytes(store, &bytes, &opts)?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}
