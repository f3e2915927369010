//! Error types for folio

use thiserror::Error;

/// Result type alias using FolioError
pub type Result<T> = std::result::Result<T, FolioError>;

/// Error type alias for convenience
pub type Error = FolioError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for folio
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Embeddings not found for document: {0} (run vectorize first)")]
    EmbeddingsNotFound(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<mupdf::Error> for FolioError {
    fn from(err: mupdf::Error) -> Self {
        FolioError::Pdf(err.to_string())
    }
}

impl FolioError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DocumentNotFound(_) | Self::EmbeddingsNotFound(_) => exit_codes::NOT_FOUND,
            Self::UnsupportedProvider(_) | Self::MissingCredential(_) | Self::InvalidInput(_) => {
                exit_codes::INVALID_INPUT
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
