//! Tool registry
//!
//! A lookup table from tool name to (schema, async closure). Failures stay
//! inside the registry: an unknown name or a closure error becomes a
//! serialized `{"error": …}` payload the model can read and react to, so a
//! bad tool call never unwinds the agent loop.

use crate::error::{FolioError, Result};
use crate::llm::{Embedder, ToolDef};
use crate::store::SpanStore;
use crate::vectorize::retrieve_semantic;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Async tool callable: JSON argument object in, serialized payload out
pub type ToolFn = Box<dyn Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Name-indexed tool table exposed to the agent
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolDef, ToolFn)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tool by name
    pub fn register(&mut self, def: ToolDef, f: ToolFn) {
        if let Some(slot) = self.tools.iter_mut().find(|(d, _)| d.name == def.name) {
            *slot = (def, f);
        } else {
            self.tools.push((def, f));
        }
    }

    /// Schemas to hand to the model's function-calling interface
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|(def, _)| def.clone()).collect()
    }

    /// Invoke a tool by name.
    ///
    /// Never fails the caller: unknown names and callable errors come back
    /// as structured error payloads.
    pub async fn call(&self, name: &str, arguments: &Value) -> String {
        let Some((_, f)) = self.tools.iter().find(|(def, _)| def.name == name) else {
            return json!({"error": format!("Unknown tool: {name}")}).to_string();
        };
        match f(arguments.clone()).await {
            Ok(payload) => payload,
            Err(err) => json!({"error": err.to_string()}).to_string(),
        }
    }
}

fn required_str(arguments: &Value, key: &str, tool: &str) -> Result<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FolioError::InvalidInput(format!("{tool} requires a '{key}' argument")))
}

/// Build the paper-retrieval tool, scoped to one document.
///
/// Returns text excerpts with page numbers, similarity scores, and
/// normalized bounding boxes as a JSON array payload.
pub fn make_rag_retrieve_tool(
    store: SpanStore,
    embedder: Arc<dyn Embedder>,
    doc_id: impl Into<String>,
) -> (ToolDef, ToolFn) {
    let doc_id = doc_id.into();
    let def = ToolDef {
        name: "rag_retrieve".to_string(),
        description: "Search the current research paper for relevant passages. \
                      Returns text excerpts with page numbers, relevance scores, and bounding boxes."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language search query about the paper content",
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                    "default": 5,
                },
            },
            "required": ["query"],
        }),
    };

    let f: ToolFn = Box::new(move |arguments: Value| {
        let store = store.clone();
        let embedder = Arc::clone(&embedder);
        let doc_id = doc_id.clone();
        async move {
            let query = required_str(&arguments, "query", "rag_retrieve")?;
            let top_k = arguments
                .get("top_k")
                .and_then(Value::as_u64)
                .unwrap_or(5) as usize;
            let evidence =
                retrieve_semantic(&store, embedder.as_ref(), &doc_id, &query, None, top_k).await?;
            let rows: Vec<Value> = evidence
                .iter()
                .map(|e| {
                    json!({
                        "text": e.text,
                        "page": e.page,
                        "score": e.score,
                        "bbox_norm": e.bbox_norm,
                    })
                })
                .collect();
            Ok(serde_json::to_string(&rows)?)
        }
        .boxed()
    });

    (def, f)
}

/// Build the web search tool backed by the Tavily API.
pub fn make_web_search_tool(api_key: impl Into<String>) -> (ToolDef, ToolFn) {
    let api_key = api_key.into();
    let client = reqwest::Client::new();
    let def = ToolDef {
        name: "web_search".to_string(),
        description: "Search the web for context, background, or related work. \
                      Returns result titles, URLs, and content snippets."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Web search query",
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                    "default": 5,
                },
            },
            "required": ["query"],
        }),
    };

    let f: ToolFn = Box::new(move |arguments: Value| {
        let api_key = api_key.clone();
        let client = client.clone();
        async move {
            let query = required_str(&arguments, "query", "web_search")?;
            let max_results = arguments
                .get("max_results")
                .and_then(Value::as_u64)
                .unwrap_or(5);
            let response = client
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": api_key,
                    "query": query,
                    "max_results": max_results,
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(FolioError::External(format!(
                    "Tavily error (HTTP {status}): {body}"
                )));
            }
            let payload: Value = response.json().await?;
            let rows: Vec<Value> = payload["results"]
                .as_array()
                .map(|results| {
                    results
                        .iter()
                        .map(|r| {
                            json!({
                                "title": r["title"],
                                "url": r["url"],
                                "snippet": r["content"],
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(serde_json::to_string(&rows)?)
        }
        .boxed()
    });

    (def, f)
}
