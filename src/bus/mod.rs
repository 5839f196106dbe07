//! Topic-addressed publish/subscribe runtime.
//!
//! Routing is static: agent roles are registered and subscribed to topic types on a
//! [`RuntimeBuilder`], and [`RuntimeBuilder::build`] freezes those rules into an
//! [`AgentRuntime`]. Every published message reaches the instance keyed by the topic's
//! `source`, which is created on first delivery. Each instance owns a mailbox drained by a
//! single task, so one instance never handles two messages at once and sees them in delivery
//! order. Different instances run concurrently.

mod runtime;
mod topic;

pub use runtime::{AgentRuntime, RuntimeBuilder};
pub use topic::{AgentId, AgentType, DEFAULT_AGENT_KEY, TopicId, TopicType};

use crate::agents::AgentError;
use crate::messages::Message;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by the runtime itself, as opposed to agent handlers.
#[derive(Debug, Error)]
pub enum BusError {
    /// An agent role was registered twice.
    #[error("Agent type '{0}' is already registered")]
    DuplicateAgentType(AgentType),
    /// A subscription or delivery referenced a role without a factory.
    #[error("Agent type '{0}' is not registered")]
    UnknownAgentType(AgentType),
    /// A topic name outside the known set was supplied.
    #[error("Unknown topic type '{0}'")]
    UnknownTopicType(String),
    /// The runtime no longer accepts messages.
    #[error("Runtime has been stopped")]
    Stopped,
    /// The target instance stopped reading its mailbox.
    #[error("Mailbox for agent '{0}' is closed")]
    MailboxClosed(String),
    /// The target instance went away before replying.
    #[error("Agent '{0}' dropped the reply channel")]
    ReplyDropped(String),
    /// The handler of a `send` failed.
    #[error("Agent '{agent}' failed to handle message: {source}")]
    Handler {
        /// Instance that raised the error.
        agent: String,
        /// Error returned by the handler.
        #[source]
        source: Box<AgentError>,
    },
}

/// A stateful message handler bound to one role.
///
/// The runtime guarantees that `on_message` is never entered concurrently for the same
/// instance, so implementations keep their state in plain fields.
#[async_trait]
pub trait Agent: Send {
    /// Handle one message. The returned value is only observed by `send` callers.
    async fn on_message(
        &mut self,
        message: Message,
        ctx: &MessageContext,
    ) -> Result<Option<Message>, AgentError>;
}

/// Builds a fresh agent for an instance identity on first delivery.
pub type AgentFactory = Box<dyn Fn(&AgentId) -> Box<dyn Agent> + Send + Sync>;

/// Delivery metadata handed to a handler, plus a way to talk back to the runtime.
#[derive(Clone)]
pub struct MessageContext {
    /// Topic the message arrived on; `None` for point-to-point sends.
    pub topic: Option<TopicId>,
    /// Token shared by every message descending from the same trigger.
    pub cancellation: CancellationToken,
    runtime: AgentRuntime,
}

impl MessageContext {
    /// Scope of the topic the message arrived on, if any.
    pub fn source(&self) -> Option<&str> {
        self.topic.as_ref().map(|topic| topic.source.as_str())
    }

    /// Publish on behalf of the handler, propagating its cancellation token.
    pub fn publish(&self, message: Message, topic: TopicId) -> Result<(), BusError> {
        self.runtime
            .publish_cancellable(message, topic, self.cancellation.clone())
    }

    /// Send on behalf of the handler, propagating its cancellation token.
    pub async fn send(
        &self,
        message: Message,
        target: AgentId,
    ) -> Result<Option<Message>, BusError> {
        self.runtime
            .send_cancellable(message, target, self.cancellation.clone())
            .await
    }

    /// Context for driving a handler directly in tests.
    #[cfg(test)]
    pub(crate) fn for_topic(runtime: &AgentRuntime, topic: TopicId) -> Self {
        Self {
            topic: Some(topic),
            cancellation: CancellationToken::new(),
            runtime: runtime.clone(),
        }
    }
}

/// A handler error observed on a published (fire-and-forget) message.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerFailure {
    /// Instance that failed.
    pub agent: String,
    /// Topic the message was published on.
    pub topic: Option<String>,
    /// Variant name of the message.
    pub message: &'static str,
    /// Rendered error.
    pub error: String,
}

/// Counters describing runtime activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeStats {
    /// Messages whose handler has returned.
    pub delivered: u64,
    /// Failures of published messages, in completion order.
    pub failures: Vec<HandlerFailure>,
}
