//! Pipeline agents: the manager that fans a run out and joins it, the two branch workers,
//! and the terminal result sink.

pub mod extractor;
pub mod join;
pub mod manager;
pub mod prompts;
pub mod section_generator;
pub mod sink;

pub use extractor::{BatchSummarizer, ExtractorAgent};
pub use join::{Branch, JoinCoordinator, JoinDecision, JoinState};
pub use manager::{ManagerAgent, parse_document_path};
pub use section_generator::SectionGeneratorAgent;
pub use sink::{CollectedResult, ResultSink};

use crate::bus::BusError;
use crate::llm::LlmClientError;
use crate::processing::DocumentError;
use thiserror::Error;

/// A document path that does not look like `<name>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid file path '{0}': expected <name>.<extension>")]
pub struct FormatError(pub String);

/// Errors returned by agent handlers.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The start path failed validation.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The document could not be loaded or chunked.
    #[error("Failed to load document: {0}")]
    Document(#[from] DocumentError),
    /// The model provider failed.
    #[error("Model call failed: {0}")]
    Provider(#[from] LlmClientError),
    /// The final classification was not the expected three-field JSON object.
    #[error("Extraction response is not a valid classification: {0}")]
    ExtractionParse(#[source] serde_json::Error),
    /// The outline was not the expected `{"sections": [...]}` object.
    #[error("Generation response is not a valid section outline: {0}")]
    GenerationParse(#[source] serde_json::Error),
    /// A message that needs a run scope arrived without a topic.
    #[error("Agent '{agent}' received '{kind}' without a topic")]
    MissingTopic {
        /// Instance that received the message.
        agent: String,
        /// Variant name of the message.
        kind: &'static str,
    },
    /// A message the agent does not handle.
    #[error("Agent '{agent}' cannot handle '{kind}' messages")]
    UnexpectedMessage {
        /// Instance that received the message.
        agent: String,
        /// Variant name of the message.
        kind: &'static str,
    },
    /// Publishing or sending from inside a handler failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    /// The run's cancellation token fired before the handler finished.
    #[error("Run was cancelled")]
    Cancelled,
    /// The handler panicked.
    #[error("Agent handler panicked")]
    Panicked,
}
