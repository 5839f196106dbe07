//! Extraction agent: a context-carrying reduction over chunk batches.
//!
//! Chunks are folded into a running classification one batch at a time. Each model response
//! replaces the previous classification wholesale, so the final response must account for
//! every batch and is the only text that gets parsed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::AgentError;
use super::prompts::{EXTRACTION_SYSTEM_PROMPT, extraction_user_prompt};
use crate::bus::{Agent, AgentId, MessageContext, TopicId, TopicType};
use crate::config::DEFAULT_EXTRACTION_BATCH_SIZE;
use crate::llm::{CompletionRequest, LlmClient};
use crate::messages::{ExtractRequest, ExtractedResult, Message};

/// Split `chunks` into consecutive batches of `batch_size`.
///
/// The final batch keeps whatever remains; an empty input yields no batches.
pub fn partition_batches(chunks: &[String], batch_size: usize) -> Vec<&[String]> {
    chunks.chunks(batch_size.max(1)).collect()
}

/// Sequential batch classifier.
pub struct BatchSummarizer {
    llm: Arc<dyn LlmClient>,
    batch_size: usize,
}

impl BatchSummarizer {
    /// Summarizer issuing one model call per `batch_size` chunks.
    pub fn new(llm: Arc<dyn LlmClient>, batch_size: usize) -> Self {
        Self {
            llm,
            batch_size: batch_size.max(1),
        }
    }

    /// Summarizer using the default batch size.
    pub fn with_default_batch_size(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, DEFAULT_EXTRACTION_BATCH_SIZE)
    }

    /// Fold every batch into the running classification and return the last response verbatim.
    ///
    /// A provider error aborts the remaining batches. Cancellation is checked between batches.
    pub async fn reduce(
        &self,
        chunks: &[String],
        cancellation: &CancellationToken,
    ) -> Result<String, AgentError> {
        let batches = partition_batches(chunks, self.batch_size);
        let total = batches.len();
        let mut previous = String::new();

        for (index, batch) in batches.into_iter().enumerate() {
            if cancellation.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::debug!(batch = index + 1, total, chunks = batch.len(), "Classifying batch");
            let completion = self
                .llm
                .complete(CompletionRequest {
                    system_prompt: EXTRACTION_SYSTEM_PROMPT.to_string(),
                    user_prompt: extraction_user_prompt(&previous, batch),
                })
                .await?;
            previous = completion.text;
        }

        Ok(previous)
    }

    /// Run the reduction and parse the final classification.
    pub async fn summarize(
        &self,
        chunks: &[String],
        cancellation: &CancellationToken,
    ) -> Result<ExtractedResult, AgentError> {
        let accumulated = self.reduce(chunks, cancellation).await?;
        parse_classification(&accumulated)
    }
}

/// Strictly parse the three-field classification. There is no lenient fallback.
pub fn parse_classification(raw: &str) -> Result<ExtractedResult, AgentError> {
    serde_json::from_str(raw.trim()).map_err(AgentError::ExtractionParse)
}

/// Agent classifying the chunks of one run.
pub struct ExtractorAgent {
    id: AgentId,
    summarizer: BatchSummarizer,
}

impl ExtractorAgent {
    /// Agent for instance `id`.
    pub fn new(id: AgentId, summarizer: BatchSummarizer) -> Self {
        Self { id, summarizer }
    }

    async fn extract(
        &self,
        request: ExtractRequest,
        ctx: &MessageContext,
    ) -> Result<(), AgentError> {
        let run_id = ctx.source().ok_or_else(|| AgentError::MissingTopic {
            agent: self.id.to_string(),
            kind: "extract_request",
        })?;
        tracing::info!(run_id, chunks = request.chunks.len(), "Extracting");

        let extracted = self
            .summarizer
            .summarize(&request.chunks, &ctx.cancellation)
            .await?;

        ctx.publish(
            Message::Extracted(extracted),
            TopicId::new(TopicType::Extracted, run_id),
        )?;
        tracing::info!(run_id, "Extraction published");
        Ok(())
    }
}

#[async_trait]
impl Agent for ExtractorAgent {
    async fn on_message(
        &mut self,
        message: Message,
        ctx: &MessageContext,
    ) -> Result<Option<Message>, AgentError> {
        match message {
            Message::ExtractRequest(request) => self.extract(request, ctx).await.map(|()| None),
            other => Err(AgentError::UnexpectedMessage {
                agent: self.id.to_string(),
                kind: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, LlmClientError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const VALID: &str = r#"{"problem_statement":"P","requirements":"R","expectations":"E"}"#;

    /// Replays scripted responses and records the prompts it received.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: &[Result<&str, &str>]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .iter()
                        .copied()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmClientError> {
            self.prompts.lock().unwrap().push(request.user_prompt);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(Completion::text(text)),
                Some(Err(message)) => Err(LlmClientError::GenerationFailed(message)),
                None => Err(LlmClientError::GenerationFailed("script exhausted".into())),
            }
        }
    }

    fn chunks(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("chunk-{index}")).collect()
    }

    #[test]
    fn partition_counts_follow_ceiling_division() {
        for (count, expected_batches, expected_last) in [
            (0usize, 0usize, 0usize),
            (1, 1, 1),
            (299, 1, 299),
            (300, 1, 300),
            (301, 2, 1),
            (600, 2, 300),
            (750, 3, 150),
        ] {
            let input = chunks(count);
            let batches = partition_batches(&input, 300);
            assert_eq!(batches.len(), expected_batches, "count {count}");
            assert_eq!(
                batches.last().map_or(0, |batch| batch.len()),
                expected_last,
                "count {count}"
            );
            assert_eq!(batches.iter().map(|batch| batch.len()).sum::<usize>(), count);
        }
    }

    #[tokio::test]
    async fn reduction_returns_last_response_verbatim() {
        let llm = Scripted::new(&[Ok("first"), Ok("second"), Ok("third")]);
        let summarizer = BatchSummarizer::new(llm.clone(), 2);
        let accumulated = summarizer
            .reduce(&chunks(5), &CancellationToken::new())
            .await
            .expect("reduce");
        assert_eq!(accumulated, "third");
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn each_batch_sees_previous_response() {
        let llm = Scripted::new(&[Ok("FIRST-SUMMARY"), Ok(VALID)]);
        let summarizer = BatchSummarizer::new(llm.clone(), 1);
        summarizer
            .summarize(&chunks(2), &CancellationToken::new())
            .await
            .expect("summarize");
        let prompts = llm.prompts.lock().unwrap().clone();
        assert!(!prompts[0].contains("FIRST-SUMMARY"));
        assert!(prompts[1].contains("FIRST-SUMMARY"));
        assert!(prompts[1].contains("chunk-1"));
        assert!(!prompts[1].contains("chunk-0"));
    }

    #[tokio::test]
    async fn valid_final_response_parses_into_three_fields() {
        let llm = Scripted::new(&[Ok(VALID)]);
        let extracted = BatchSummarizer::with_default_batch_size(llm)
            .summarize(&chunks(3), &CancellationToken::new())
            .await
            .expect("summarize");
        assert_eq!(extracted.problem_statement, "P");
        assert_eq!(extracted.requirements, "R");
        assert_eq!(extracted.expectations, "E");
    }

    #[tokio::test]
    async fn zero_chunks_fail_to_parse() {
        let llm = Scripted::new(&[]);
        let error = BatchSummarizer::new(llm.clone(), 300)
            .summarize(&[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::ExtractionParse(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn provider_error_aborts_remaining_batches() {
        let llm = Scripted::new(&[Ok("first"), Err("down"), Ok(VALID)]);
        let error = BatchSummarizer::new(llm.clone(), 1)
            .summarize(&chunks(3), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::Provider(_)));
        assert_eq!(llm.calls(), 2);
    }

    #[test]
    fn classification_parsing_is_strict() {
        assert!(parse_classification(VALID).is_ok());
        assert!(parse_classification(&format!("```json\n{VALID}\n```")).is_err());
        assert!(parse_classification(r#"{"problem_statement":"P","requirements":"R"}"#).is_err());
        assert!(
            parse_classification(
                r#"{"problem_statement":"P","requirements":["R"],"expectations":"E"}"#
            )
            .is_err()
        );
    }

    /// Cancels the run while answering its first call.
    struct CancelsDuringCall {
        token: CancellationToken,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmClient for CancelsDuringCall {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<Completion, LlmClientError> {
            *self.calls.lock().unwrap() += 1;
            self.token.cancel();
            Ok(Completion::text("first"))
        }
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_batch() {
        let token = CancellationToken::new();
        let llm = Arc::new(CancelsDuringCall {
            token: token.clone(),
            calls: Mutex::new(0),
        });
        let error = BatchSummarizer::new(llm.clone(), 1)
            .reduce(&chunks(3), &token)
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::Cancelled));
        assert_eq!(*llm.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_skips_every_batch() {
        let llm = Scripted::new(&[Ok("first"), Ok(VALID)]);
        let token = CancellationToken::new();
        token.cancel();
        let error = BatchSummarizer::new(llm.clone(), 1)
            .reduce(&chunks(2), &token)
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::Cancelled));
        assert_eq!(llm.calls(), 0);
    }
}
