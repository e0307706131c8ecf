use casuist_ontology::{ConceptId, SectionId, WorldId};

/// Failures at the provider boundary (embedding service, LLM judge, claim
/// extraction). The engine absorbs these as "metric unavailable" except during
/// coarse retrieval filtering.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out after {0}ms")]
    Timeout(u64),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid provider response: {0}")]
    BadResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelevanceError {
    /// Transient: the embedding provider failed where an embedding was
    /// mandatory (coarse retrieval). Retry with backoff.
    #[error("embedding unavailable for {subject}: {source}")]
    EmbeddingUnavailable {
        subject: String,
        #[source]
        source: ProviderError,
    },

    /// Permanent: the concept has nothing to score on.
    #[error("concept {concept_id} has no embedding and no term or structural signal")]
    InvalidConcept { concept_id: ConceptId },

    #[error("candidate pool is empty for query section {query_section_id}")]
    EmptyPool { query_section_id: SectionId },

    #[error("no ontology loaded for world {world_id}")]
    UnknownWorld { world_id: WorldId },

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelevanceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelevanceError::EmbeddingUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelevanceError>;
