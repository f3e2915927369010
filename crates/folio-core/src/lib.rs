//! Folio Core Library
//!
//! Extracts positioned text spans from PDF documents, indexes them for
//! lexical and semantic retrieval, and exposes the indexed content to a
//! tool-using conversational agent.
//!
//! # Features
//! - Content-addressed span store (JSONL records + JSON summaries)
//! - Fuzzy lexical retrieval with reading-order neighbor expansion
//! - Dense-vector semantic retrieval over an f32 matrix sidecar
//! - Streaming agent loop with dynamic tool dispatch
//! - Greedy IoU matcher for ingestion quality evaluation

pub mod agent;
pub mod bench;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod prompts;
pub mod retrieve;
pub mod span;
pub mod store;
pub mod tools;
pub mod vectorize;

pub use agent::{run_agent, AgentHooks};
pub use bench::{bbox_iou, ingestion_metrics, match_spans, IngestionMetrics, LayoutSpan};
pub use config::{Config, EmbeddingConfig, LlmConfig};
pub use error::{Error, FolioError, Result};
pub use ingest::{ingest_pdf_bytes, Engine, IngestOptions};
pub use llm::{
    build_model, AnthropicModel, ChatModel, Embedder, HttpEmbedder, Message, OpenAiModel, Role,
    StreamEvent, ToolCall, ToolDef, ToolResult,
};
pub use retrieve::{retrieve, RetrieveOptions};
pub use span::{BBox, Evidence, Span, SpanKind};
pub use store::{doc_id_from_bytes, DocMeta, DocPaths, SpanStore};
pub use tools::{make_rag_retrieve_tool, make_web_search_tool, ToolFn, ToolRegistry};
pub use vectorize::{
    filter_embeddable, retrieve_semantic, vectorize_spans, EmbeddingIndex, VectorizeReport,
};
