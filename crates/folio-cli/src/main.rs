//! Folio CLI
//!
//! Ingest PDFs, retrieve anchored evidence, and chat with a document.

use clap::Parser;
use folio_core::{Config, FolioError, SpanStore};

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    let config = Config::default();
    let result = run(cli, &config).await;

    if let Err(err) = result {
        eprintln!("error: {err}");
        let code = err
            .downcast_ref::<FolioError>()
            .map(FolioError::exit_code)
            .unwrap_or(folio_core::error::exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let store = SpanStore::open(&config.data_dir)?;
    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args, &store, config),
        Commands::Retrieve(args) => commands::retrieve::run_lexical(args, &store, config),
        Commands::Vectorize(args) => commands::vectorize::run(args, &store, config).await,
        Commands::RetrieveSemantic(args) => {
            commands::retrieve::run_semantic(args, &store, config).await
        }
        Commands::Chat(args) => commands::chat::run(args, &store, config, cli.verbose).await,
        Commands::Bench(args) => commands::bench::run(args, &store),
    }
}
