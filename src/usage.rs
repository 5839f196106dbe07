//! Per-run LLM usage accounting.
//!
//! A tracker is created for each run and handed to the agents through [`TrackedLlmClient`];
//! its snapshot travels back to the caller in the run report.

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmClientError};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe counters describing model usage within one run.
#[derive(Default)]
pub struct UsageTracker {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    model_calls: AtomicU64,
    models: Mutex<BTreeSet<String>>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful completion.
    pub fn record(&self, completion: &Completion) {
        self.prompt_tokens
            .fetch_add(completion.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion.completion_tokens, Ordering::Relaxed);
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(model) = &completion.model {
            self.models
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(model.clone());
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> UsageSnapshot {
        let prompt_tokens = self.prompt_tokens.load(Ordering::Relaxed);
        let completion_tokens = self.completion_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            model_calls: self.model_calls.load(Ordering::Relaxed),
            models_used: self
                .models
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
        }
    }
}

/// Immutable view of usage counters used for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Prompt tokens across all calls.
    pub prompt_tokens: u64,
    /// Completion tokens across all calls.
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u64,
    /// Number of successful completions.
    pub model_calls: u64,
    /// Distinct models that answered, sorted.
    pub models_used: Vec<String>,
}

/// Decorator recording every successful completion into a [`UsageTracker`].
pub struct TrackedLlmClient {
    inner: Arc<dyn LlmClient>,
    tracker: Arc<UsageTracker>,
}

impl TrackedLlmClient {
    /// Wrap `inner`, reporting into `tracker`.
    pub fn new(inner: Arc<dyn LlmClient>, tracker: Arc<UsageTracker>) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl LlmClient for TrackedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmClientError> {
        let completion = self.inner.complete(request).await?;
        self.tracker.record(&completion);
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl LlmClient for Fixed {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmClientError> {
            if request.user_prompt == "fail" {
                return Err(LlmClientError::GenerationFailed("nope".into()));
            }
            Ok(Completion {
                text: "ok".into(),
                model: Some("qwen".into()),
                prompt_tokens: 10,
                completion_tokens: 3,
            })
        }
    }

    fn request(user_prompt: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: String::new(),
            user_prompt: user_prompt.into(),
        }
    }

    #[tokio::test]
    async fn tracked_client_accumulates_successful_calls_only() {
        let tracker = Arc::new(UsageTracker::new());
        let client = TrackedLlmClient::new(Arc::new(Fixed), tracker.clone());

        client.complete(request("a")).await.expect("first");
        client.complete(request("b")).await.expect("second");
        client.complete(request("fail")).await.expect_err("failure");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.model_calls, 2);
        assert_eq!(snapshot.prompt_tokens, 20);
        assert_eq!(snapshot.completion_tokens, 6);
        assert_eq!(snapshot.total_tokens, 26);
        assert_eq!(snapshot.models_used, vec!["qwen".to_string()]);
    }

    #[test]
    fn fresh_tracker_is_empty() {
        assert_eq!(UsageTracker::new().snapshot(), UsageSnapshot::default());
    }
}
