//! Prompt templates for the extraction and section-generation agents.

/// System prompt enforcing the strict three-field classification output.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You classify statements taken from a request-for-proposal document into three categories and keep a running, consolidated summary across batches.

Categories:
- problem_statement: issues, challenges, or situations the issuer needs addressed.
- requirements: what must or should be delivered; specifications, mandatory features, constraints.
- expectations: desired outcomes, goals, targets, or success criteria.

You receive the previous classification (possibly empty) and a new batch of text. Fold the new batch into the previous classification: keep earlier findings, add new ones, and rewrite each category as one coherent paragraph with a brief justification.

Output rules:
1. Return ONLY a JSON object with exactly these keys: "problem_statement", "requirements", "expectations".
2. Every value is a single string. No nested objects, no arrays.
3. No text before or after the JSON, no markdown, no code fences, no extra keys.
4. Use double quotes and no trailing commas.

Start the response with { and end it with }."#;

/// System prompt for the section outline.
pub const SECTION_SYSTEM_PROMPT: &str = r#"You design the response outline for a request-for-proposal document. Propose the sections a complete answer must contain, in the order they should appear, and for each section the questions the answer must cover, in order.

Output rules:
1. Return ONLY a JSON object of the form {"sections": [{"title": "...", "questions": ["...", "..."]}]}.
2. "title" is a string; "questions" is an array of strings.
3. No text before or after the JSON, no markdown, no code fences, no extra keys.

Start the response with { and end it with }."#;

/// User prompt for one extraction batch.
pub fn extraction_user_prompt(previous_classification: &str, batch: &[String]) -> String {
    let previous = if previous_classification.trim().is_empty() {
        "(none yet)"
    } else {
        previous_classification
    };
    let rendered_batch = serde_json::to_string_pretty(batch).unwrap_or_else(|_| batch.join("\n"));
    format!(
        "PREVIOUS CLASSIFICATION:\n{previous}\n\n\
         Update the previous classification with the new batch below. Each category must \
         summarise both the earlier insights and the new information.\n\n\
         BATCH OF TEXT:\n{rendered_batch}\n\n\
         Respond with the JSON object only."
    )
}

/// User prompt carrying the full document for the section outline.
pub fn section_user_prompt(content: &str) -> String {
    format!(
        "DOCUMENT:\n{content}\n\n\
         Produce the ordered section outline with the questions each section must answer. \
         Respond with the JSON object only."
    )
}
