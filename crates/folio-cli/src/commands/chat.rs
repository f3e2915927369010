//! `folio chat` - interactive Q&A over an ingested document

use crate::app::ChatArgs;
use folio_core::prompts::SYSTEM_PROMPT;
use folio_core::{
    build_model, make_rag_retrieve_tool, make_web_search_tool, run_agent, AgentHooks, Config,
    Embedder, EmbeddingIndex, HttpEmbedder, SpanStore, StreamEvent, ToolRegistry,
};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::sync::Arc;

pub async fn run(
    args: ChatArgs,
    store: &SpanStore,
    config: &Config,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut llm_config = config.llm.clone();
    if let Some(provider) = args.provider {
        llm_config.provider = provider;
    }
    if let Some(model) = args.model {
        llm_config.model = model;
    }

    // Both lookups fail with their own NotFound flavor, telling the user
    // whether to run `ingest` or `vectorize` first.
    let meta = store.read_doc_meta(&args.doc_id)?;
    let index = EmbeddingIndex::load(store, &args.doc_id)?;

    let model = build_model(&llm_config)?;
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::for_model(
        config.embedding.clone(),
        index.model.clone(),
    )?);

    let mut registry = ToolRegistry::new();
    let (rag_def, rag_fn) = make_rag_retrieve_tool(store.clone(), embedder, args.doc_id.clone());
    registry.register(rag_def, rag_fn);
    match &config.tavily_api_key {
        Some(key) => {
            let (ws_def, ws_fn) = make_web_search_tool(key.clone());
            registry.register(ws_def, ws_fn);
        }
        None => eprintln!("No Tavily API key: web search disabled."),
    }

    println!(
        "Document: {} ({} pages, {} spans)",
        meta.doc_id, meta.n_pages, meta.n_spans
    );
    println!(
        "Provider: {} | Model: {}",
        llm_config.provider, llm_config.model
    );
    println!("Type 'exit' or Ctrl-D to quit.\n");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("you > ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        let mut on_stream = |event: &StreamEvent| match event {
            StreamEvent::TextDelta { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::ToolCallStart { name } => {
                println!("\n  -> calling {name}...");
            }
            StreamEvent::ToolCallDone { tool_call } if verbose => {
                println!("     args: {}", tool_call.arguments);
            }
            _ => {}
        };
        let mut on_tool_result = |name: &str, _arguments: &Value, payload: &str| {
            if !verbose {
                return;
            }
            let display: String = payload.chars().take(200).collect();
            println!("     {name} -> {display}");
        };

        run_agent(
            model.as_ref(),
            query,
            &registry,
            SYSTEM_PROMPT,
            llm_config.max_iterations,
            AgentHooks {
                on_stream: Some(&mut on_stream),
                on_tool_result: Some(&mut on_tool_result),
            },
        )
        .await?;
        println!("\n");
    }

    Ok(())
}
