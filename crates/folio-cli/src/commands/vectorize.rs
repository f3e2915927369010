//! `folio vectorize` - build the embedding index for a document

use crate::app::VectorizeArgs;
use folio_core::{vectorize_spans, Config, HttpEmbedder, SpanStore};

pub async fn run(args: VectorizeArgs, store: &SpanStore, config: &Config) -> anyhow::Result<()> {
    let embedder = HttpEmbedder::new(config.embedding.clone())?;
    let report = vectorize_spans(store, &embedder, &args.doc_id, config.min_chars).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
