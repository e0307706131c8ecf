//! Judge and claim extraction over a generic chat completion backend.

use std::sync::Arc;

use casuist_relevance::{Claim, ClaimExtractor, LlmJudge, ProviderError};

use crate::parse::{parse_claims, parse_relevance};
use crate::prompts::{claims_prompt, judge_prompt, CLAIM_INSTRUCTIONS, JUDGE_INSTRUCTIONS};
use crate::LlmError;

/// A single non-streaming chat turn: system instructions plus one user message.
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `json` asks the backend to constrain output to a JSON object when it can.
    fn complete(&self, instructions: &str, prompt: &str, json: bool) -> Result<String, LlmError>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, instructions: &str, prompt: &str, json: bool) -> Result<String, LlmError> {
        (**self).complete(instructions, prompt, json)
    }
}

pub struct ChatJudge<B> {
    backend: B,
}

impl<B: ChatBackend> ChatJudge<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: ChatBackend> LlmJudge for ChatJudge<B> {
    fn judge_relevance(&self, section_text: &str, concept_label: &str) -> Result<f64, ProviderError> {
        let raw = self
            .backend
            .complete(JUDGE_INSTRUCTIONS, &judge_prompt(section_text, concept_label), true)?;
        let score = parse_relevance(&raw).map_err(|e| {
            tracing::debug!(backend = self.backend.name(), error = %e, "unparseable judge reply");
            e
        })?;
        Ok(score)
    }
}

pub struct ChatClaimExtractor<B> {
    backend: B,
}

impl<B: ChatBackend> ChatClaimExtractor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: ChatBackend> ClaimExtractor for ChatClaimExtractor<B> {
    fn extract(&self, text: &str) -> Result<Vec<Claim>, ProviderError> {
        let raw = self
            .backend
            .complete(CLAIM_INSTRUCTIONS, &claims_prompt(text), true)?;
        Ok(parse_claims(&raw)?)
    }
}
