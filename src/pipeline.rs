//! End-to-end driver for a single document.
//!
//! The pipeline owns the collaborators (document loader and model client), wires the static
//! topology onto a fresh [`AgentRuntime`] per run, sends the start message, waits for the bus
//! to go idle and reports what came out.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agents::{
    AgentError, BatchSummarizer, CollectedResult, ExtractorAgent, FormatError, ManagerAgent,
    ResultSink, SectionGeneratorAgent,
};
use crate::bus::{
    AgentId, AgentRuntime, AgentType, BusError, HandlerFailure, RuntimeBuilder, TopicType,
};
use crate::config::{Config, DEFAULT_EXTRACTION_BATCH_SIZE};
use crate::llm::{LlmClient, LlmClientError, client_from_config};
use crate::messages::{Message, Results, StartMessage};
use crate::processing::{DocumentLoader, FileService};
use crate::usage::{TrackedLlmClient, UsageSnapshot, UsageTracker};

/// Routing rules of the pipeline: which role handles which topic.
pub const SUBSCRIPTIONS: [(TopicType, AgentType); 6] = [
    (TopicType::Start, AgentType::Manager),
    (TopicType::Extracted, AgentType::Manager),
    (TopicType::Generated, AgentType::Manager),
    (TopicType::Extract, AgentType::Extractor),
    (TopicType::Generate, AgentType::SectionGenerator),
    (TopicType::Results, AgentType::ResultSink),
];

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document path is malformed; nothing was published.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The manager rejected the start message.
    #[error("Run failed to start: {0}")]
    Start(#[source] AgentError),
    /// The manager answered the start message with something other than an acceptance.
    #[error("Unexpected reply '{0}' to start message")]
    UnexpectedReply(&'static str),
    /// The runtime itself failed.
    #[error(transparent)]
    Bus(BusError),
}

impl From<BusError> for PipelineError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Handler { source, .. } => match *source {
                AgentError::Format(format) => Self::Format(format),
                other => Self::Start(other),
            },
            other => Self::Bus(other),
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Scope shared by every topic of the run.
    pub run_id: String,
    /// Document name without directory or extension.
    pub document: String,
    /// Document extension.
    pub extension: String,
    /// Chunks handed to the extraction branch.
    pub chunk_count: usize,
    /// RFC 3339 timestamp of the start message.
    pub started_at: String,
    /// Wall-clock duration until the bus went idle.
    pub elapsed_ms: u128,
    /// Merged record, or `None` when the run stalled before joining.
    pub results: Option<Results>,
    /// Model usage attributed to this run.
    pub usage: UsageSnapshot,
    /// Messages handled by the bus.
    pub delivered: u64,
    /// Branch handler failures observed during the run.
    pub failures: Vec<HandlerFailure>,
}

impl RunReport {
    /// Whether both branches completed and the merged record was published.
    pub fn is_complete(&self) -> bool {
        self.results.is_some()
    }
}

/// Runs documents through extraction and section generation.
#[derive(Clone)]
pub struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    llm: Arc<dyn LlmClient>,
    batch_size: usize,
}

impl Pipeline {
    /// Pipeline over the given collaborators with the default batch size.
    pub fn new(loader: Arc<dyn DocumentLoader>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            loader,
            llm,
            batch_size: DEFAULT_EXTRACTION_BATCH_SIZE,
        }
    }

    /// Override the number of chunks per extraction batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pipeline backed by the file service and the Ollama client from `config`.
    pub fn from_config(config: &Config) -> Result<Self, LlmClientError> {
        let llm = client_from_config(config)?;
        Ok(Self::new(Arc::new(FileService::from_config(config)), Arc::new(llm))
            .with_batch_size(config.extraction_batch_size))
    }

    /// Process the document at `path`.
    pub async fn run(&self, path: &str) -> Result<RunReport, PipelineError> {
        self.run_with_cancellation(path, CancellationToken::new())
            .await
    }

    /// Process the document at `path`; cancelling `cancellation` aborts the remaining handlers.
    ///
    /// A run whose branches fail still returns a report, with `results` left empty and the
    /// failures listed.
    pub async fn run_with_cancellation(
        &self,
        path: &str,
        cancellation: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let started = std::time::Instant::now();
        let started_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let usage = Arc::new(UsageTracker::new());
        let llm: Arc<dyn LlmClient> =
            Arc::new(TrackedLlmClient::new(self.llm.clone(), usage.clone()));
        let (sender, mut collected) = mpsc::unbounded_channel();
        let runtime = self.build_runtime(llm, sender)?;

        let reply = runtime
            .send_cancellable(
                Message::Start(StartMessage {
                    path: path.to_string(),
                }),
                AgentId::default_for(AgentType::Manager),
                cancellation,
            )
            .await?;
        let accepted = match reply {
            Some(Message::Accepted(accepted)) => accepted,
            other => {
                return Err(PipelineError::UnexpectedReply(
                    other.as_ref().map_or("none", Message::kind),
                ));
            }
        };

        let stats = runtime.stop_when_idle().await;
        let mut results = None;
        while let Ok(CollectedResult { run_id, results: merged }) = collected.try_recv() {
            if run_id == accepted.run_id {
                results = Some(merged);
            }
        }

        let report = RunReport {
            run_id: accepted.run_id,
            document: accepted.name,
            extension: accepted.extension,
            chunk_count: accepted.chunk_count,
            started_at,
            elapsed_ms: started.elapsed().as_millis(),
            results,
            usage: usage.snapshot(),
            delivered: stats.delivered,
            failures: stats.failures,
        };
        if report.is_complete() {
            tracing::info!(run_id = %report.run_id, elapsed_ms = report.elapsed_ms, "Run complete");
        } else {
            tracing::warn!(
                run_id = %report.run_id,
                failures = report.failures.len(),
                "Run went idle without a final result"
            );
        }
        Ok(report)
    }

    fn build_runtime(
        &self,
        llm: Arc<dyn LlmClient>,
        sink: mpsc::UnboundedSender<CollectedResult>,
    ) -> Result<AgentRuntime, BusError> {
        let mut builder = RuntimeBuilder::new();

        let loader = self.loader.clone();
        builder.register(AgentType::Manager, move |id| {
            Box::new(ManagerAgent::new(id.clone(), loader.clone()))
        })?;

        let extractor_llm = llm.clone();
        let batch_size = self.batch_size;
        builder.register(AgentType::Extractor, move |id| {
            Box::new(ExtractorAgent::new(
                id.clone(),
                BatchSummarizer::new(extractor_llm.clone(), batch_size),
            ))
        })?;

        builder.register(AgentType::SectionGenerator, move |id| {
            Box::new(SectionGeneratorAgent::new(id.clone(), llm.clone()))
        })?;

        builder.register(AgentType::ResultSink, move |id| {
            Box::new(ResultSink::new(id.clone(), sink.clone()))
        })?;

        for (topic_type, agent_type) in SUBSCRIPTIONS {
            builder.add_subscription(topic_type, agent_type)?;
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::DocumentError;

    #[test]
    fn handler_format_errors_surface_as_format() {
        let error = PipelineError::from(BusError::Handler {
            agent: "manager/default".into(),
            source: Box::new(AgentError::Format(FormatError("noext".into()))),
        });
        assert!(matches!(error, PipelineError::Format(FormatError(path)) if path == "noext"));
    }

    #[test]
    fn other_handler_errors_surface_as_start_failures() {
        let error = PipelineError::from(BusError::Handler {
            agent: "manager/default".into(),
            source: Box::new(AgentError::Document(DocumentError::Empty("a.txt".into()))),
        });
        assert!(matches!(error, PipelineError::Start(AgentError::Document(_))));
        assert!(matches!(
            PipelineError::from(BusError::Stopped),
            PipelineError::Bus(BusError::Stopped)
        ));
    }

    #[test]
    fn every_role_has_a_subscription() {
        for role in [
            AgentType::Manager,
            AgentType::Extractor,
            AgentType::SectionGenerator,
            AgentType::ResultSink,
        ] {
            assert!(SUBSCRIPTIONS.iter().any(|(_, agent)| *agent == role), "{role}");
        }
    }
}
