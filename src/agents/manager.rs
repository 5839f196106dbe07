//! Manager agent: validates the start request, fans the run out to both branches and joins
//! their results.
//!
//! The instance keyed `default` receives `Start` messages. Every run gets a fresh run id that
//! scopes all of its topics, so both branch results land on the manager instance keyed by that
//! run id. That instance owns the accumulated [`Results`] and the [`JoinCoordinator`].

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use uuid::Uuid;

use super::join::{Branch, JoinCoordinator, JoinDecision, JoinState};
use super::{AgentError, FormatError};
use crate::bus::{Agent, AgentId, MessageContext, TopicId, TopicType};
use crate::messages::{ExtractRequest, GenerateRequest, Message, Results, RunAccepted, StartMessage};
use crate::processing::DocumentLoader;

static DOCUMENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:.*/)?([^/]+)\.([^/]+)$").expect("valid regex"));

/// Split `path` into document name and extension.
///
/// Accepts `<optional-dir>/<name>.<extension>`; both parts must be non-empty.
pub fn parse_document_path(path: &str) -> Result<(String, String), FormatError> {
    DOCUMENT_PATH
        .captures(path)
        .and_then(|captures| {
            let name = captures.get(1)?.as_str();
            let extension = captures.get(2)?.as_str();
            Some((name.to_string(), extension.to_string()))
        })
        .ok_or_else(|| FormatError(path.to_string()))
}

/// Orchestrates one run per instance.
pub struct ManagerAgent {
    id: AgentId,
    loader: Arc<dyn DocumentLoader>,
    results: Results,
    join: JoinCoordinator,
}

impl ManagerAgent {
    /// Manager for instance `id`, loading documents through `loader`.
    pub fn new(id: AgentId, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            id,
            loader,
            results: Results::default(),
            join: JoinCoordinator::new(),
        }
    }

    async fn start(
        &mut self,
        request: StartMessage,
        ctx: &MessageContext,
    ) -> Result<RunAccepted, AgentError> {
        let (name, extension) = parse_document_path(&request.path)?;
        let document = self.loader.load_and_chunk(&request.path).await?;

        let run_id = Uuid::new_v4().simple().to_string();
        let chunk_count = document.chunks.len();
        tracing::info!(
            run_id,
            path = %request.path,
            chunks = chunk_count,
            "Starting run"
        );

        ctx.publish(
            Message::ExtractRequest(ExtractRequest {
                chunks: document.chunks,
            }),
            TopicId::new(TopicType::Extract, run_id.clone()),
        )?;
        ctx.publish(
            Message::GenerateRequest(GenerateRequest {
                content: document.text,
            }),
            TopicId::new(TopicType::Generate, run_id.clone()),
        )?;

        Ok(RunAccepted {
            run_id,
            name,
            extension,
            chunk_count,
        })
    }

    /// Fold one branch result into the run and publish the merged record once both are in.
    ///
    /// Results are frozen once published; later completions are logged and dropped.
    fn complete_branch(
        &mut self,
        branch: Branch,
        kind: &'static str,
        ctx: &MessageContext,
        apply: impl FnOnce(&mut Results),
    ) -> Result<(), AgentError> {
        let run_id = ctx.source().ok_or_else(|| AgentError::MissingTopic {
            agent: self.id.to_string(),
            kind,
        })?;

        if self.join.state() == JoinState::BothDone {
            tracing::warn!(
                run_id,
                ?branch,
                "Ignoring completion after results were published"
            );
            return Ok(());
        }

        apply(&mut self.results);
        match self.join.complete(branch) {
            JoinDecision::Wait => {
                tracing::info!(
                    run_id,
                    ?branch,
                    state = ?self.join.state(),
                    "Branch finished; waiting for the other"
                );
            }
            JoinDecision::Publish => {
                tracing::info!(run_id, ?branch, "Both branches finished; publishing results");
                ctx.publish(
                    Message::Final(self.results.clone()),
                    TopicId::new(TopicType::Results, run_id),
                )?;
            }
            JoinDecision::AlreadyPublished => {
                tracing::debug!(run_id, ?branch, "Join already released");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Agent for ManagerAgent {
    async fn on_message(
        &mut self,
        message: Message,
        ctx: &MessageContext,
    ) -> Result<Option<Message>, AgentError> {
        match message {
            Message::Start(request) => {
                let accepted = self.start(request, ctx).await?;
                Ok(Some(Message::Accepted(accepted)))
            }
            Message::Extracted(extracted) => self
                .complete_branch(Branch::Extraction, "extracted", ctx, |results| {
                    results.apply_extracted(extracted)
                })
                .map(|()| None),
            Message::Generated(generated) => self
                .complete_branch(Branch::Generation, "generated", ctx, |results| {
                    results.apply_generated(generated)
                })
                .map(|()| None),
            other => Err(AgentError::UnexpectedMessage {
                agent: self.id.to_string(),
                kind: other.kind(),
            }),
        }
    }
}
