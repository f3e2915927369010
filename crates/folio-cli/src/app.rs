//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use folio_core::Engine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "folio",
    about = "PDF span extraction, evidence retrieval, and document chat",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show tool arguments, retrieved chunks, and info-level logs
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a PDF into the span store
    Ingest(IngestArgs),
    /// Retrieve evidence for selected text on one page
    Retrieve(RetrieveArgs),
    /// Build the embedding index for an ingested document
    Vectorize(VectorizeArgs),
    /// Retrieve evidence by semantic similarity
    RetrieveSemantic(SemanticArgs),
    /// Interactive Q&A chat with an ingested document
    Chat(ChatArgs),
    /// Evaluate ingestion quality against gold annotations
    Bench(BenchArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EngineArg {
    Blocks,
    Layout,
}

impl From<EngineArg> for Engine {
    fn from(value: EngineArg) -> Self {
        match value {
            EngineArg::Blocks => Engine::Blocks,
            EngineArg::Layout => Engine::Layout,
        }
    }
}

#[derive(Args)]
pub struct IngestArgs {
    /// Path to the PDF file
    pub pdf: PathBuf,

    /// Ingestion engine
    #[arg(long, value_enum, default_value_t = EngineArg::Blocks)]
    pub engine: EngineArg,
}

#[derive(Args)]
pub struct RetrieveArgs {
    /// Document id (sha256:<hex>)
    pub doc_id: String,

    /// 0-indexed page number
    pub page: u32,

    /// The highlighted/selected text to match
    pub text: String,
}

#[derive(Args)]
pub struct VectorizeArgs {
    /// Document id (sha256:<hex>)
    pub doc_id: String,
}

#[derive(Args)]
pub struct SemanticArgs {
    /// Document id (sha256:<hex>)
    pub doc_id: String,

    /// Natural-language query
    pub query: String,

    /// Filter to a specific page
    #[arg(short, long)]
    pub page: Option<u32>,

    /// Max results
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Document id (sha256:<hex>)
    pub doc_id: String,

    /// LLM provider: anthropic or openai
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model ID
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct BenchArgs {
    /// Directory with gold annotation files (*.gold.json)
    #[arg(long, default_value = "data/benchmark")]
    pub annotations_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
