//! Multi-metric relevance calculator.
//!
//! A (section, concept) pair is scored by up to four metrics:
//!
//! | metric     | weight | source                                              |
//! |------------|--------|-----------------------------------------------------|
//! | vector     | 0.40   | `sigmoid(cos(section, concept))`, center 0.5, k=10  |
//! | term       | 0.25   | TF-IDF weighted Jaccard of content tokens           |
//! | structural | 0.20   | structural prior x graph-distance discount          |
//! | llm        | 0.15   | optional LLM judge                                  |
//!
//! A metric that cannot be computed is *absent*, never zero: its weight is
//! dropped and the remaining weights are rescaled to sum to 1 before
//! combining. With every metric in `[0, 1]` and weights summing to 1, the
//! combined score is a convex combination and stays in `[0, 1]`.

use std::sync::Arc;

use casuist_ontology::{Concept, ConceptGraph, ConceptId, Section, SectionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::VectorConfig;
use crate::embedding::{cosine, EmbeddingCache};
use crate::error::{ProviderError, RelevanceError, Result};
use crate::provider::{EmbeddingProvider, LlmJudge};
use crate::structural::StructuralTable;
use crate::term_index::TermIndex;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub vector: f64,
    pub term: f64,
    pub structural: f64,
    pub llm: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            vector: 0.40,
            term: 0.25,
            structural: 0.20,
            llm: 0.15,
        }
    }
}

impl Weights {
    pub const ZERO: Weights = Weights {
        vector: 0.0,
        term: 0.0,
        structural: 0.0,
        llm: 0.0,
    };

    pub fn sum(&self) -> f64 {
        self.vector + self.term + self.structural + self.llm
    }

    fn as_array(&self) -> [f64; 4] {
        [self.vector, self.term, self.structural, self.llm]
    }

    fn from_array([vector, term, structural, llm]: [f64; 4]) -> Self {
        Self {
            vector,
            term,
            structural,
            llm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RelevanceError::Config(format!(
                "weights must be finite and non-negative: {self:?}"
            )));
        }
        if (self.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RelevanceError::Config(format!(
                "weights must sum to 1.0, got {}",
                self.sum()
            )));
        }
        Ok(())
    }

    /// Weights restricted to the metrics present in `metrics`, rescaled to
    /// sum to 1. Absent metrics get weight 0.
    ///
    /// If every present metric has configured weight 0, the present metrics
    /// share the weight equally. Returns `None` when no metric is present.
    pub fn renormalized(&self, metrics: &MetricScores) -> Option<Weights> {
        let present = metrics.presence();
        let count = present.iter().filter(|p| **p).count();
        if count == 0 {
            return None;
        }
        let raw = self.as_array();
        let present_sum: f64 = raw
            .iter()
            .zip(present)
            .filter(|(_, p)| *p)
            .map(|(w, _)| *w)
            .sum();

        let mut out = [0.0; 4];
        for i in 0..4 {
            if !present[i] {
                continue;
            }
            out[i] = if present_sum > 0.0 {
                raw[i] / present_sum
            } else {
                1.0 / count as f64
            };
        }
        Some(Weights::from_array(out))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub vector: Option<f64>,
    pub term: Option<f64>,
    pub structural: Option<f64>,
    pub llm: Option<f64>,
}

impl MetricScores {
    fn as_array(&self) -> [Option<f64>; 4] {
        [self.vector, self.term, self.structural, self.llm]
    }

    fn presence(&self) -> [bool; 4] {
        self.as_array().map(|m| m.is_some())
    }

    pub fn available(&self) -> usize {
        self.presence().iter().filter(|p| **p).count()
    }
}

/// `Σ weight_i * metric_i` over the present metrics with renormalized weights.
///
/// Metric values are clamped to `[0, 1]` before combining.
pub fn combine(weights: &Weights, metrics: &MetricScores) -> Option<(Weights, f64)> {
    let used = weights.renormalized(metrics)?;
    let combined: f64 = used
        .as_array()
        .iter()
        .zip(metrics.as_array())
        .filter_map(|(w, m)| m.map(|m| w * m.clamp(0.0, 1.0)))
        .sum();
    Some((used, combined.clamp(0.0, 1.0)))
}

/// Logistic stretch of a cosine similarity: `1 / (1 + e^{-k (cos - c)})`.
pub fn sigmoid(cos: f64, center: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * (cos - center)).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub section_id: SectionId,
    pub concept_id: ConceptId,
    pub vector_score: Option<f64>,
    pub term_score: Option<f64>,
    pub structural_score: Option<f64>,
    pub llm_score: Option<f64>,
    pub weights_used: Weights,
    pub combined_score: f64,
}

impl RelevanceScore {
    pub fn metrics(&self) -> MetricScores {
        MetricScores {
            vector: self.vector_score,
            term: self.term_score,
            structural: self.structural_score,
            llm: self.llm_score,
        }
    }
}

/// Graph context for the structural metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext<'a> {
    pub graph: Option<&'a ConceptGraph>,
    /// Concepts already known to be relevant to the section's document.
    pub known_relevant: &'a [ConceptId],
}

impl<'a> ScoringContext<'a> {
    pub fn new(graph: &'a ConceptGraph, known_relevant: &'a [ConceptId]) -> Self {
        Self {
            graph: Some(graph),
            known_relevant,
        }
    }
}

/// The calculator proper. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct RelevanceCalculator {
    weights: Weights,
    vector: VectorConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    judge: Option<Arc<dyn LlmJudge>>,
    term_index: Arc<RwLock<TermIndex>>,
    structural: Arc<StructuralTable>,
    embeddings: Arc<EmbeddingCache>,
}

impl RelevanceCalculator {
    pub fn new(
        weights: Weights,
        vector: VectorConfig,
        term_index: Arc<RwLock<TermIndex>>,
        structural: Arc<StructuralTable>,
        embeddings: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            weights,
            vector,
            embedder: None,
            judge: None,
            term_index,
            structural,
            embeddings,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn LlmJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub fn structural(&self) -> &StructuralTable {
        &self.structural
    }

    pub fn term_index(&self) -> &RwLock<TermIndex> {
        &self.term_index
    }

    /// The section's stored embedding, or one computed through the cache.
    pub fn section_embedding(&self, section: &Section) -> std::result::Result<Arc<[f32]>, ProviderError> {
        if let Some(e) = &section.embedding {
            return Ok(Arc::from(e.as_slice()));
        }
        self.text_embedding(&section.text)
    }

    pub fn text_embedding(&self, text: &str) -> std::result::Result<Arc<[f32]>, ProviderError> {
        let Some(embedder) = &self.embedder else {
            return Err(ProviderError::Unavailable(
                "no embedding provider configured".to_string(),
            ));
        };
        self.embeddings.get_or_embed(embedder.as_ref(), text)
    }

    pub fn vector_metric(&self, a: &[f32], b: &[f32]) -> Option<f64> {
        let cos = cosine(a, b)?;
        Some(sigmoid(
            cos,
            self.vector.sigmoid_center,
            self.vector.sigmoid_steepness,
        ))
    }

    pub fn term_metric(&self, a: &str, b: &str) -> Option<f64> {
        self.term_index.read().weighted_jaccard(a, b)
    }

    /// The judge's estimate, and whether a configured judge failed to give one.
    fn llm_metric(&self, subject: &str, text: &str, label: &str) -> (Option<f64>, bool) {
        let Some(judge) = self.judge.as_ref() else {
            return (None, false);
        };
        match judge.judge_relevance(text, label) {
            Ok(v) if v.is_finite() => (Some(v.clamp(0.0, 1.0)), false),
            Ok(v) => {
                tracing::warn!(subject, value = v, "llm judge returned a non-finite score; metric dropped");
                (None, true)
            }
            Err(e) => {
                tracing::warn!(subject, error = %e, "llm judge unavailable; metric dropped");
                (None, true)
            }
        }
    }

    /// Score one (section, concept) pair.
    pub fn score(
        &self,
        section: &Section,
        concept: &Concept,
        ctx: ScoringContext<'_>,
    ) -> Result<RelevanceScore> {
        self.score_checked(section, concept, ctx).map(|(score, _)| score)
    }

    /// Like [`score`](Self::score), also reporting whether a provider failed
    /// and its metric was dropped. Such scores must not be cached.
    pub(crate) fn score_checked(
        &self,
        section: &Section,
        concept: &Concept,
        ctx: ScoringContext<'_>,
    ) -> Result<(RelevanceScore, bool)> {
        let mut provider_failure: Option<ProviderError> = None;

        let vector = match &concept.embedding {
            None => None,
            Some(concept_embedding) => match self.section_embedding(section) {
                Ok(section_embedding) => {
                    let v = self.vector_metric(&section_embedding, concept_embedding);
                    if v.is_none() {
                        tracing::warn!(
                            section = %section.id,
                            concept = %concept.id,
                            section_dim = section_embedding.len(),
                            concept_dim = concept_embedding.len(),
                            "embedding dimensions disagree or vector is zero; vector metric dropped"
                        );
                    }
                    v
                }
                Err(e) => {
                    tracing::warn!(section = %section.id, error = %e, "section embedding unavailable; vector metric dropped");
                    provider_failure = Some(e);
                    None
                }
            },
        };

        let term = self.term_metric(&section.text, &concept.text());

        let structural = {
            let known = ctx.known_relevant;
            let distance = match (ctx.graph, known.is_empty()) {
                (Some(graph), false) => {
                    graph.min_distance_to_any(&concept.id, known.iter().map(String::as_str))
                }
                _ => None,
            };
            let has_known = ctx.graph.is_some() && !known.is_empty();
            self.structural
                .score(section.section_type, concept.category, distance, has_known)
        };

        if vector.is_none() && term.is_none() && structural.is_none() {
            if concept.embedding.is_none() {
                return Err(RelevanceError::InvalidConcept {
                    concept_id: concept.id.clone(),
                });
            }
            if !self.has_judge() {
                let source = provider_failure.unwrap_or_else(|| {
                    ProviderError::BadResponse("embedding dimensions disagree".to_string())
                });
                return Err(RelevanceError::EmbeddingUnavailable {
                    subject: format!("section {}", section.id),
                    source,
                });
            }
        }

        let (llm, judge_failed) = self.llm_metric(&section.id, &section.text, &concept.label);
        let degraded = judge_failed || provider_failure.is_some();

        let metrics = MetricScores {
            vector,
            term,
            structural,
            llm,
        };
        let Some((weights_used, combined_score)) = combine(&self.weights, &metrics) else {
            return Err(RelevanceError::EmbeddingUnavailable {
                subject: format!("section {}", section.id),
                source: provider_failure.unwrap_or_else(|| {
                    ProviderError::Unavailable("llm judge was the only signal and failed".to_string())
                }),
            });
        };

        let score = RelevanceScore {
            section_id: section.id.clone(),
            concept_id: concept.id.clone(),
            vector_score: vector,
            term_score: term,
            structural_score: structural,
            llm_score: llm,
            weights_used,
            combined_score,
        };
        Ok((score, degraded))
    }

    /// Score a candidate precedent section against a query section.
    ///
    /// Embeddings come from the coarse retrieval phase. The structural metric
    /// is the section-type affinity; the LLM judge sees the candidate text in
    /// place of a concept label.
    pub fn score_precedent(
        &self,
        query: &Section,
        query_embedding: Option<&[f32]>,
        candidate: &Section,
        candidate_embedding: Option<&[f32]>,
    ) -> Option<(MetricScores, Weights, f64)> {
        let vector = match (query_embedding, candidate_embedding) {
            (Some(q), Some(c)) => self.vector_metric(q, c),
            _ => None,
        };
        let term = self.term_metric(&query.text, &candidate.text);
        let structural = self
            .structural
            .section_affinity(query.section_type, candidate.section_type);
        let (llm, _) = self.llm_metric(&candidate.id, &query.text, &candidate.text);
        let metrics = MetricScores {
            vector,
            term,
            structural,
            llm,
        };
        let (weights, combined) = combine(&self.weights, &metrics)?;
        Some((metrics, weights, combined))
    }
}
