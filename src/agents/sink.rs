//! Terminal agent handing merged run results back to the caller.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::AgentError;
use crate::bus::{Agent, AgentId, MessageContext};
use crate::messages::{Message, Results};

/// A merged result together with the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedResult {
    /// Run identifier taken from the topic source.
    pub run_id: String,
    /// Merged record.
    pub results: Results,
}

/// Terminal subscriber forwarding final results to the caller.
pub struct ResultSink {
    id: AgentId,
    output: mpsc::UnboundedSender<CollectedResult>,
}

impl ResultSink {
    /// Sink forwarding into `output`.
    pub fn new(id: AgentId, output: mpsc::UnboundedSender<CollectedResult>) -> Self {
        Self { id, output }
    }
}

#[async_trait]
impl Agent for ResultSink {
    async fn on_message(
        &mut self,
        message: Message,
        ctx: &MessageContext,
    ) -> Result<Option<Message>, AgentError> {
        let results = match message {
            Message::Final(results) => results,
            other => {
                return Err(AgentError::UnexpectedMessage {
                    agent: self.id.to_string(),
                    kind: other.kind(),
                });
            }
        };
        let run_id = ctx.source().unwrap_or(&self.id.key).to_string();
        tracing::info!(run_id, "Final result collected");
        // The receiver may already be gone when the caller gave up on the run.
        let _ = self.output.send(CollectedResult { run_id, results });
        Ok(None)
    }
}
