//! Document loading: file reading, text decoding, and token-bounded chunking.

pub mod chunking;
mod loader;
pub mod types;

pub use loader::{DocumentLoader, FileService, SourceDocument};
pub use types::{ChunkingError, DocumentError};
