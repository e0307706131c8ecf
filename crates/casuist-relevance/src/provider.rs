//! Provider contracts for the external inference service.
//!
//! All three are capability plugins: the engine runs without an LLM judge or
//! with a failing embedding service, and only loses the metric they feed.
//! Implementations own their latency bound (HTTP client timeouts) and report
//! an exceeded bound as [`ProviderError::Timeout`].

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Fixed-dimension text embedding. Deterministic for a fixed model version.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the model (part of the embedding cache key).
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Optional LLM relevance judgment, returning an estimate in `[0, 1]`.
pub trait LlmJudge: Send + Sync {
    fn judge_relevance(&self, section_text: &str, concept_label: &str) -> Result<f64, ProviderError>;
}

/// Whether a claim asserts or denies the thing it talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Affirms,
    Denies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub stance: Stance,
}

impl Claim {
    pub fn new(text: impl Into<String>, stance: Stance) -> Self {
        Self {
            text: text.into(),
            stance,
        }
    }
}

/// Splits generated reasoning text into checkable claims.
pub trait ClaimExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<Vec<Claim>, ProviderError>;
}
