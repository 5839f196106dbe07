//! Error definitions for document loading.

use anyhow::Error as TokenizerError;
use thiserror::Error;

/// Errors produced while turning raw text into token-bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Loader configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Tokenizer model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted while loading and chunking a source document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The extension has no text decoder.
    #[error("Unsupported document format '{0}'")]
    UnsupportedFormat(String),
    /// The PDF could not be parsed or its text extracted.
    #[error("Failed to extract text from PDF '{path}': {source}")]
    Pdf {
        /// Path of the PDF.
        path: String,
        /// Error raised by the PDF parser.
        #[source]
        source: lopdf::Error,
    },
    /// The file is not valid UTF-8 text.
    #[error("Document '{0}' is not valid UTF-8 text")]
    InvalidEncoding(String),
    /// Decoding produced no text at all.
    #[error("No text extracted from '{0}'")]
    Empty(String),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
}
