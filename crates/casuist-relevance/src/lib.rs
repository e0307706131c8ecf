//! Casuist relevance engine.
//!
//! Decides which ontology concepts matter to a case section, retrieves and
//! ranks precedent sections, flags precedents that reached opposite
//! conclusions, and checks generated reasoning against the ontology.
//!
//! Scoring flows one way:
//!
//! ```text
//! embedding -> calculator -> threshold -> retriever -> contradiction detector
//! ```
//!
//! with a separate validation path (generated text -> claims -> calculator +
//! ontology relationships). All of it is reachable through
//! [`RelevanceEngine`].

pub mod ann;
pub mod cache;
pub mod calculator;
pub mod cancel;
pub mod claims;
pub mod config;
pub mod contradiction;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod provider;
pub mod retriever;
pub mod structural;
pub mod term_index;
pub mod text;
pub mod threshold;
pub mod validator;

pub use cache::{CacheStamp, CacheStats, EngineCaches, ScoreCache};
pub use calculator::{
    combine, sigmoid, MetricScores, RelevanceCalculator, RelevanceScore, ScoringContext, Weights,
};
pub use cancel::CancelToken;
pub use claims::SentenceClaimExtractor;
pub use config::EngineConfig;
pub use contradiction::{ContradictionDetector, ContradictionRecord, ResolutionHint};
pub use embedding::{EmbeddingCache, TokenHashEmbedder};
pub use engine::{ConceptRanking, Providers, RelevanceEngine};
pub use error::{ProviderError, RelevanceError, Result};
pub use provider::{Claim, ClaimExtractor, EmbeddingProvider, LlmJudge, Stance};
pub use retriever::{PrecedentMatch, PrecedentRetriever, Retrieval};
pub use structural::StructuralTable;
pub use term_index::TermIndex;
pub use threshold::{ThresholdDecision, ThresholdSelector, ThresholdStrategy};
pub use validator::{AdmissibilityValidator, ClaimConflict, ConflictKind, ValidationResult};
