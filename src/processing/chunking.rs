//! Token-bounded chunking of extracted document text.
//!
//! Boundaries come from `semchunk-rs`, which splits recursively on the most meaningful
//! separator that keeps each piece under the budget. Token counts use a `tiktoken-rs`
//! encoding when the configured tokenizer is known, otherwise a whitespace counter. An
//! optional overlap prefixes every chunk with the tail of its predecessor so statements that
//! straddle a boundary stay visible to the classifier.

use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

/// Shared token counting function.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Tokenizer name selecting the whitespace counter explicitly.
pub const WHITESPACE_TOKENIZER: &str = "whitespace";

/// Split `text` into chunks of at most `chunk_size` tokens with `overlap` tokens of context.
///
/// Returns an empty vector when the input is all whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    tokenizer_model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_token_counter(tokenizer_model)?;
    Ok(chunk_text_with_counter(text, chunk_size, overlap, counter))
}

/// Resolve a token counter for a model or encoding name.
///
/// Unknown names fall back to whitespace counting with a warning so that loading keeps
/// flowing for locally aliased models.
pub fn build_token_counter(tokenizer_model: &str) -> Result<TokenCounter, ChunkingError> {
    let name = tokenizer_model.trim();
    if name.eq_ignore_ascii_case(WHITESPACE_TOKENIZER) {
        return Ok(whitespace_counter());
    }

    let encoding = match get_bpe_from_model(name) {
        Ok(encoding) => encoding,
        Err(_) => match encoding_from_name(name) {
            Some(loaded) => loaded.map_err(|source| ChunkingError::Tokenizer {
                model: name.to_string(),
                source,
            })?,
            None => {
                tracing::warn!(
                    tokenizer = name,
                    "Unknown tokenizer; falling back to whitespace token counting"
                );
                return Ok(whitespace_counter());
            }
        },
    };

    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn encoding_from_name(name: &str) -> Option<anyhow::Result<CoreBPE>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
) -> Vec<String> {
    let for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| for_chunker.as_ref()(segment)),
    );
    let chunks = chunker.chunk(text);

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<&str> = None;
    for current in &chunks {
        let chunk = match previous {
            Some(previous) => join_with_overlap(previous, current, overlap, chunk_size, &counter),
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }
    overlapped
}

fn join_with_overlap(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &TokenCounter,
) -> String {
    let tail = suffix_within_budget(previous, overlap, counter);
    if tail.is_empty() {
        return current.to_string();
    }

    let needs_space =
        !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if needs_space {
        combined.push(' ');
    }
    combined.push_str(current);
    suffix_within_budget(&combined, chunk_size, counter).to_string()
}

/// Longest left-trimmed suffix of `text` whose token count fits in `budget`.
fn suffix_within_budget<'a>(text: &'a str, budget: usize, counter: &TokenCounter) -> &'a str {
    if budget == 0 {
        return "";
    }
    text.char_indices()
        .map(|(offset, _)| text[offset..].trim_start())
        .find(|candidate| counter.as_ref()(candidate) <= budget)
        .unwrap_or("")
}
