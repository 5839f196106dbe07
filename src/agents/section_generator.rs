//! Section-generation agent: one model call turns the full document into an ordered outline.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::AgentError;
use super::prompts::{SECTION_SYSTEM_PROMPT, section_user_prompt};
use crate::bus::{Agent, AgentId, MessageContext, TopicId, TopicType};
use crate::llm::{CompletionRequest, LlmClient};
use crate::messages::{GenerateRequest, GeneratedResult, Message, SectionData};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionOutline {
    sections: Vec<SectionData>,
}

/// Parse the outline returned by the model.
pub fn parse_outline(raw: &str) -> Result<GeneratedResult, AgentError> {
    let outline: SectionOutline =
        serde_json::from_str(raw.trim()).map_err(AgentError::GenerationParse)?;
    Ok(GeneratedResult {
        sections: outline.sections,
    })
}

/// Single-shot outline generator working on the full document text.
pub struct SectionGeneratorAgent {
    id: AgentId,
    llm: Arc<dyn LlmClient>,
}

impl SectionGeneratorAgent {
    /// Agent for instance `id`.
    pub fn new(id: AgentId, llm: Arc<dyn LlmClient>) -> Self {
        Self { id, llm }
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        ctx: &MessageContext,
    ) -> Result<(), AgentError> {
        let run_id = ctx.source().ok_or_else(|| AgentError::MissingTopic {
            agent: self.id.to_string(),
            kind: "generate_request",
        })?;
        tracing::info!(run_id, characters = request.content.len(), "Generating sections");

        let completion = self
            .llm
            .complete(CompletionRequest {
                system_prompt: SECTION_SYSTEM_PROMPT.to_string(),
                user_prompt: section_user_prompt(&request.content),
            })
            .await?;
        let generated = parse_outline(&completion.text)?;
        tracing::info!(run_id, sections = generated.sections.len(), "Sections generated");

        ctx.publish(
            Message::Generated(generated),
            TopicId::new(TopicType::Generated, run_id),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Agent for SectionGeneratorAgent {
    async fn on_message(
        &mut self,
        message: Message,
        ctx: &MessageContext,
    ) -> Result<Option<Message>, AgentError> {
        match message {
            Message::GenerateRequest(request) => self.generate(request, ctx).await.map(|()| None),
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

    #[test]
    fn outline_parses_ordered_sections() {
        let generated = parse_outline(
            r#"{"sections":[
                {"title":"Company overview","questions":["Who are you?"]},
                {"title":"Pricing","questions":["What is the cost?","Which discounts apply?"]}
            ]}"#,
        )
        .expect("outline");
        let titles: Vec<_> = generated.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Company overview", "Pricing"]);
        assert_eq!(generated.sections[1].questions.len(), 2);
    }

    #[test]
    fn outline_without_sections_key_is_rejected() {
        let error = parse_outline(r#"[{"title":"x","questions":[]}]"#).unwrap_err();
        assert!(matches!(error, AgentError::GenerationParse(_)));
    }

    #[test]
    fn empty_outline_is_accepted() {
        let generated = parse_outline(r#"{"sections":[]}"#).expect("outline");
        assert!(generated.sections.is_empty());
    }
}
