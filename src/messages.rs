//! Typed payloads exchanged between agents.
//!
//! Messages are plain data. Every stage of the pipeline owns one request/response pair and the
//! manager folds the two branch results into a single [`Results`] record.

use serde::{Deserialize, Serialize};

/// Kick off a run for the document at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartMessage {
    /// File path (or identifier) of the uploaded question document.
    pub path: String,
}

/// Acknowledgement returned to the caller once a run has been fanned out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunAccepted {
    /// Scoping token shared by every topic of the run.
    pub run_id: String,
    /// Document name without directory or extension.
    pub name: String,
    /// Document extension.
    pub extension: String,
    /// Number of chunks handed to the extraction branch.
    pub chunk_count: usize,
}

/// Chunks to classify into problem statement, requirements and expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    /// Token-bounded chunks in document order.
    pub chunks: Vec<String>,
}

/// Outcome of the extraction branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedResult {
    /// Consolidated problem statement paragraph.
    pub problem_statement: String,
    /// Consolidated requirements paragraph.
    pub requirements: String,
    /// Consolidated expectations paragraph.
    pub expectations: String,
}

/// Full document text handed to the section generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Extracted document text.
    pub content: String,
}

/// One answerable section of the response outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionData {
    /// Section heading.
    pub title: String,
    /// Candidate questions, in order.
    pub questions: Vec<String>,
}

/// Outcome of the section-generation branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedResult {
    /// Ordered outline of sections.
    pub sections: Vec<SectionData>,
}

/// Merged record published once per run on the `results` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    /// Requirements paragraph from the extraction branch.
    pub requirements: Option<String>,
    /// Expectations paragraph from the extraction branch.
    pub expectations: Option<String>,
    /// Problem statement paragraph from the extraction branch.
    pub problem_statement: Option<String>,
    /// Section outline from the generation branch.
    pub sections: Option<Vec<SectionData>>,
}

impl Results {
    /// Copy the extraction branch fields into the record.
    pub fn apply_extracted(&mut self, extracted: ExtractedResult) {
        self.requirements = Some(extracted.requirements);
        self.expectations = Some(extracted.expectations);
        self.problem_statement = Some(extracted.problem_statement);
    }

    /// Copy the generation branch fields into the record.
    pub fn apply_generated(&mut self, generated: GeneratedResult) {
        self.sections = Some(generated.sections);
    }
}

/// Closed set of payloads routed by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Begin a run.
    Start(StartMessage),
    /// Reply to [`Message::Start`].
    Accepted(RunAccepted),
    /// Extraction branch input.
    ExtractRequest(ExtractRequest),
    /// Extraction branch output.
    Extracted(ExtractedResult),
    /// Generation branch input.
    GenerateRequest(GenerateRequest),
    /// Generation branch output.
    Generated(GeneratedResult),
    /// Merged run output.
    Final(Results),
}

impl Message {
    /// Short name of the variant, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Accepted(_) => "accepted",
            Self::ExtractRequest(_) => "extract_request",
            Self::Extracted(_) => "extracted",
            Self::GenerateRequest(_) => "generate_request",
            Self::Generated(_) => "generated",
            Self::Final(_) => "final",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn results_serialize_with_null_placeholders() {
        let value = serde_json::to_value(Results::default()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "requirements": null,
                "expectations": null,
                "problem_statement": null,
                "sections": null
            })
        );
    }

    #[test]
    fn extracted_result_rejects_extra_keys() {
        let parsed = serde_json::from_str::<ExtractedResult>(
            r#"{"problem_statement":"P","requirements":"R","expectations":"E","notes":"x"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn applying_branches_fills_every_field() {
        let mut results = Results::default();
        results.apply_generated(GeneratedResult {
            sections: vec![SectionData {
                title: "Scope".into(),
                questions: vec!["What is in scope?".into()],
            }],
        });
        results.apply_extracted(ExtractedResult {
            problem_statement: "P".into(),
            requirements: "R".into(),
            expectations: "E".into(),
        });
        assert_eq!(results.requirements.as_deref(), Some("R"));
        assert_eq!(results.problem_statement.as_deref(), Some("P"));
        assert_eq!(results.expectations.as_deref(), Some("E"));
        assert_eq!(results.sections.as_ref().map(Vec::len), Some(1));
    }
}
