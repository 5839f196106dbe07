use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{
    Agent, AgentFactory, AgentId, AgentType, BusError, HandlerFailure, MessageContext,
    RuntimeStats, TopicId, TopicType,
};
use crate::agents::AgentError;
use crate::messages::Message;

type Reply = oneshot::Sender<Result<Option<Message>, AgentError>>;

struct Envelope {
    message: Message,
    topic: Option<TopicId>,
    cancellation: CancellationToken,
    reply: Option<Reply>,
}

/// Collects registrations and subscriptions before the runtime starts.
#[derive(Default)]
pub struct RuntimeBuilder {
    factories: HashMap<AgentType, AgentFactory>,
    subscriptions: BTreeMap<TopicType, Vec<AgentType>>,
}

impl RuntimeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used to instantiate `agent_type`.
    pub fn register<F>(&mut self, agent_type: AgentType, factory: F) -> Result<&mut Self, BusError>
    where
        F: Fn(&AgentId) -> Box<dyn Agent> + Send + Sync + 'static,
    {
        if self.factories.contains_key(&agent_type) {
            return Err(BusError::DuplicateAgentType(agent_type));
        }
        self.factories.insert(agent_type, Box::new(factory));
        Ok(self)
    }

    /// Route every message published on `topic_type` to instances of `agent_type`.
    ///
    /// The role must already be registered. Subscribing the same pair twice is a no-op.
    pub fn add_subscription(
        &mut self,
        topic_type: TopicType,
        agent_type: AgentType,
    ) -> Result<&mut Self, BusError> {
        if !self.factories.contains_key(&agent_type) {
            return Err(BusError::UnknownAgentType(agent_type));
        }
        let subscribers = self.subscriptions.entry(topic_type).or_default();
        if !subscribers.contains(&agent_type) {
            subscribers.push(agent_type);
        }
        Ok(self)
    }

    /// Freeze the routing rules and start accepting messages.
    pub fn build(self) -> AgentRuntime {
        tracing::debug!(
            agents = self.factories.len(),
            topics = self.subscriptions.len(),
            "Agent runtime started"
        );
        let (in_flight, _) = watch::channel(0usize);
        AgentRuntime {
            inner: Arc::new(RuntimeInner {
                factories: self.factories,
                subscriptions: self.subscriptions,
                instances: Mutex::new(HashMap::new()),
                in_flight,
                stopped: AtomicBool::new(false),
                delivered: AtomicU64::new(0),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct RuntimeInner {
    factories: HashMap<AgentType, AgentFactory>,
    subscriptions: BTreeMap<TopicType, Vec<AgentType>>,
    instances: Mutex<HashMap<AgentId, mpsc::UnboundedSender<Envelope>>>,
    in_flight: watch::Sender<usize>,
    stopped: AtomicBool,
    delivered: AtomicU64,
    failures: Mutex<Vec<HandlerFailure>>,
}

/// Handle to a running bus. Cloning is cheap; all clones share one routing table.
#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

impl AgentRuntime {
    /// Fire-and-forget publish with a fresh cancellation token.
    pub fn publish(&self, message: Message, topic: TopicId) -> Result<(), BusError> {
        self.publish_cancellable(message, topic, CancellationToken::new())
    }

    /// Deliver `message` to every role subscribed to `topic.topic_type`, scoped by
    /// `topic.source`. Handler failures are recorded, never returned.
    pub fn publish_cancellable(
        &self,
        message: Message,
        topic: TopicId,
        cancellation: CancellationToken,
    ) -> Result<(), BusError> {
        self.ensure_running()?;
        let Some(subscribers) = self.inner.subscriptions.get(&topic.topic_type) else {
            tracing::debug!(topic = %topic, kind = message.kind(), "No subscribers for topic");
            return Ok(());
        };

        for agent_type in subscribers {
            let target = AgentId::new(*agent_type, topic.source.clone());
            self.enqueue(
                &target,
                Envelope {
                    message: message.clone(),
                    topic: Some(topic.clone()),
                    cancellation: cancellation.clone(),
                    reply: None,
                },
            )?;
        }
        Ok(())
    }

    /// Point-to-point request with a fresh cancellation token.
    pub async fn send(
        &self,
        message: Message,
        target: AgentId,
    ) -> Result<Option<Message>, BusError> {
        self.send_cancellable(message, target, CancellationToken::new())
            .await
    }

    /// Deliver `message` to exactly `target` and wait for the handler's response.
    pub async fn send_cancellable(
        &self,
        message: Message,
        target: AgentId,
        cancellation: CancellationToken,
    ) -> Result<Option<Message>, BusError> {
        self.ensure_running()?;
        let (reply, response) = oneshot::channel();
        self.enqueue(
            &target,
            Envelope {
                message,
                topic: None,
                cancellation,
                reply: Some(reply),
            },
        )?;

        match response.await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(source)) => Err(BusError::Handler {
                agent: target.to_string(),
                source: Box::new(source),
            }),
            Err(_) => Err(BusError::ReplyDropped(target.to_string())),
        }
    }

    /// Wait until no message is queued or being handled, then stop accepting new ones.
    pub async fn stop_when_idle(&self) -> RuntimeStats {
        let mut in_flight = self.inner.in_flight.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = in_flight.wait_for(|count| *count == 0).await;
        self.inner.stopped.store(true, Ordering::SeqCst);
        lock(&self.inner.instances).clear();
        tracing::debug!("Agent runtime idle; stopped");
        self.stats()
    }

    /// Snapshot of delivery counters and recorded failures.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failures: lock(&self.inner.failures).clone(),
        }
    }

    fn ensure_running(&self) -> Result<(), BusError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            Err(BusError::Stopped)
        } else {
            Ok(())
        }
    }

    fn enqueue(&self, target: &AgentId, envelope: Envelope) -> Result<(), BusError> {
        let mailbox = self.mailbox(target)?;
        self.inner.in_flight.send_modify(|count| *count += 1);
        if mailbox.send(envelope).is_err() {
            self.finish_one();
            return Err(BusError::MailboxClosed(target.to_string()));
        }
        Ok(())
    }

    fn mailbox(&self, target: &AgentId) -> Result<mpsc::UnboundedSender<Envelope>, BusError> {
        let mut instances = lock(&self.inner.instances);
        if let Some(mailbox) = instances.get(target) {
            return Ok(mailbox.clone());
        }

        let factory = self
            .inner
            .factories
            .get(&target.agent_type)
            .ok_or(BusError::UnknownAgentType(target.agent_type))?;
        let agent = factory(target);
        let (mailbox, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_instance(
            Arc::downgrade(&self.inner),
            target.clone(),
            agent,
            receiver,
        ));
        tracing::debug!(agent = %target, "Created agent instance");
        instances.insert(target.clone(), mailbox.clone());
        Ok(mailbox)
    }

    async fn dispatch(&self, id: &AgentId, agent: &mut dyn Agent, envelope: Envelope) {
        let Envelope {
            message,
            topic,
            cancellation,
            reply,
        } = envelope;
        let kind = message.kind();
        let topic_label = topic.as_ref().map(ToString::to_string);
        tracing::debug!(agent = %id, kind, topic = ?topic_label, "Handling message");

        let ctx = MessageContext {
            topic,
            cancellation: cancellation.clone(),
            runtime: self.clone(),
        };
        let outcome = if cancellation.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(AgentError::Cancelled),
                result = AssertUnwindSafe(agent.on_message(message, &ctx)).catch_unwind() => {
                    result.unwrap_or_else(|_| Err(AgentError::Panicked))
                }
            }
        };
        drop(ctx);
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);

        match reply {
            Some(reply) => {
                // A dropped receiver means the caller stopped waiting.
                let _ = reply.send(outcome);
            }
            None => {
                if let Err(error) = outcome {
                    tracing::error!(
                        agent = %id,
                        kind,
                        topic = ?topic_label,
                        error = %error,
                        "Handler failed"
                    );
                    lock(&self.inner.failures).push(HandlerFailure {
                        agent: id.to_string(),
                        topic: topic_label,
                        message: kind,
                        error: error.to_string(),
                    });
                }
            }
        }

        self.finish_one();
    }

    fn finish_one(&self) {
        self.inner
            .in_flight
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

async fn run_instance(
    runtime: Weak<RuntimeInner>,
    id: AgentId,
    mut agent: Box<dyn Agent>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = mailbox.recv().await {
        let Some(inner) = runtime.upgrade() else {
            break;
        };
        AgentRuntime { inner }
            .dispatch(&id, agent.as_mut(), envelope)
            .await;
    }
    tracing::debug!(agent = %id, "Agent instance finished");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
