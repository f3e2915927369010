//! `folio retrieve` / `folio retrieve-semantic` - evidence lookup

use crate::app::{RetrieveArgs, SemanticArgs};
use folio_core::{
    retrieve, retrieve_semantic, Config, EmbeddingIndex, HttpEmbedder, RetrieveOptions, SpanStore,
};

pub fn run_lexical(args: RetrieveArgs, store: &SpanStore, config: &Config) -> anyhow::Result<()> {
    let opts = RetrieveOptions {
        top_k: config.topk_evidence,
        neighbor_window: config.neighbor_window,
    };
    let evidence = retrieve(store, &args.doc_id, args.page, &args.text, &opts)?;
    println!("{}", serde_json::to_string_pretty(&evidence)?);
    Ok(())
}

pub async fn run_semantic(
    args: SemanticArgs,
    store: &SpanStore,
    config: &Config,
) -> anyhow::Result<()> {
    // The index sidecar dictates which model embeds the query
    let index = EmbeddingIndex::load(store, &args.doc_id)?;
    let embedder = HttpEmbedder::for_model(config.embedding.clone(), index.model.clone())?;
    let evidence = retrieve_semantic(
        store,
        &embedder,
        &args.doc_id,
        &args.query,
        args.page,
        args.top_k.unwrap_or(config.topk_evidence),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&evidence)?);
    Ok(())
}
