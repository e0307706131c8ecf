//! Two-phase precedent retrieval.
//!
//! 1. Coarse: embed the query and every candidate (through the embedding
//!    cache) and keep the top `max(k * coarse_multiplier, min_coarse)` by
//!    cosine. Any provider failure here aborts the request.
//! 2. Fine: score the coarse set with the full multi-metric calculator in
//!    parallel, compute the batch threshold, drop everything below it, sort
//!    descending with ties broken by ascending candidate id, keep `k`.

use std::sync::Arc;

use casuist_ontology::{DocumentId, Section, SectionId, SectionType};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::ann::coarse_top_n;
use crate::calculator::{MetricScores, RelevanceCalculator, Weights};
use crate::cancel::CancelToken;
use crate::config::RetrievalConfig;
use crate::error::{ProviderError, RelevanceError, Result};
use crate::threshold::{ThresholdDecision, ThresholdSelector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentMatch {
    pub query_section_id: SectionId,
    pub candidate_id: SectionId,
    pub candidate_document_id: DocumentId,
    pub candidate_section_type: SectionType,
    pub combined_score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
    pub metrics: MetricScores,
    pub weights_used: Weights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub query_section_id: SectionId,
    pub pool_size: usize,
    pub coarse_size: usize,
    pub threshold: ThresholdDecision,
    pub matches: Vec<PrecedentMatch>,
}

pub struct PrecedentRetriever {
    calculator: RelevanceCalculator,
    thresholds: ThresholdSelector,
    config: RetrievalConfig,
    pool: Arc<ThreadPool>,
}

impl PrecedentRetriever {
    pub fn new(
        calculator: RelevanceCalculator,
        thresholds: ThresholdSelector,
        config: RetrievalConfig,
        pool: Arc<ThreadPool>,
    ) -> Self {
        Self {
            calculator,
            thresholds,
            config,
            pool,
        }
    }

    pub fn coarse_size(&self, k: usize) -> usize {
        k.saturating_mul(self.config.coarse_multiplier)
            .max(self.config.min_coarse)
    }

    pub fn retrieve(
        &self,
        query: &Section,
        candidates: &[Arc<Section>],
        k: usize,
        cancel: &CancelToken,
    ) -> Result<Retrieval> {
        let empty_pool = || RelevanceError::EmptyPool {
            query_section_id: query.id.clone(),
        };
        let pool: Vec<&Arc<Section>> = candidates.iter().filter(|c| c.id != query.id).collect();
        if pool.is_empty() {
            return Err(empty_pool());
        }
        cancel.check()?;

        // Phase 1: coarse filter.
        let query_embedding = self
            .calculator
            .section_embedding(query)
            .map_err(|source| RelevanceError::EmbeddingUnavailable {
                subject: format!("query section {}", query.id),
                source,
            })?;

        let embeddings: Vec<Arc<[f32]>> = self.pool.install(|| {
            pool.par_iter()
                .map(|c| {
                    cancel.check()?;
                    let e = self.calculator.section_embedding(c).map_err(|source| {
                        RelevanceError::EmbeddingUnavailable {
                            subject: format!("candidate section {}", c.id),
                            source,
                        }
                    })?;
                    if e.len() != query_embedding.len() {
                        return Err(RelevanceError::EmbeddingUnavailable {
                            subject: format!("candidate section {}", c.id),
                            source: ProviderError::BadResponse(format!(
                                "dimension {} does not match query dimension {}",
                                e.len(),
                                query_embedding.len()
                            )),
                        });
                    }
                    Ok(e)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let coarse = coarse_top_n(
            &query_embedding,
            &embeddings,
            self.coarse_size(k),
            &self.config,
        );
        tracing::debug!(
            query = %query.id,
            pool = pool.len(),
            coarse = coarse.len(),
            "coarse filter complete"
        );
        cancel.check()?;

        // Phase 2: fine rerank.
        let mut scored: Vec<PrecedentMatch> = self.pool.install(|| {
            coarse
                .par_iter()
                .map(|hit| {
                    cancel.check()?;
                    let candidate = pool[hit.index];
                    let scored = self.calculator.score_precedent(
                        query,
                        Some(&query_embedding),
                        candidate,
                        Some(&embeddings[hit.index]),
                    );
                    Ok(scored.map(|(metrics, weights_used, combined_score)| PrecedentMatch {
                        query_section_id: query.id.clone(),
                        candidate_id: candidate.id.clone(),
                        candidate_document_id: candidate.document_id.clone(),
                        candidate_section_type: candidate.section_type,
                        combined_score,
                        rank: 0,
                        metrics,
                        weights_used,
                    }))
                })
                .collect::<Result<Vec<_>>>()
        })?
        .into_iter()
        .flatten()
        .collect();
        cancel.check()?;

        let batch: Vec<f64> = scored.iter().map(|m| m.combined_score).collect();
        let threshold = self.thresholds.decide(&batch, query.section_type);

        scored.retain(|m| threshold.admits(m.combined_score));
        sort_matches(&mut scored);
        scored.truncate(k);
        for (i, m) in scored.iter_mut().enumerate() {
            m.rank = i + 1;
        }

        tracing::info!(
            query = %query.id,
            pool = pool.len(),
            coarse = coarse.len(),
            threshold = threshold.value,
            returned = scored.len(),
            k,
            "precedent retrieval complete"
        );

        Ok(Retrieval {
            query_section_id: query.id.clone(),
            pool_size: pool.len(),
            coarse_size: coarse.len(),
            threshold,
            matches: scored,
        })
    }
}

/// Descending by combined score; ties by ascending candidate id.
pub fn sort_matches(matches: &mut [PrecedentMatch]) {
    matches.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StructuralConfig, ThresholdConfig, VectorConfig};
    use crate::embedding::{EmbeddingCache, TokenHashEmbedder};
    use crate::provider::EmbeddingProvider;
    use crate::structural::StructuralTable;
    use crate::term_index::TermIndex;
    use parking_lot::RwLock;

    fn retriever(embedder: Arc<dyn EmbeddingProvider>, floors_zero: bool) -> PrecedentRetriever {
        let mut threshold = ThresholdConfig::default();
        if floors_zero {
            threshold.base_floors.facts = 0.0;
            threshold.percentile = 0.01;
        }
        let calculator = RelevanceCalculator::new(
            Weights::default(),
            VectorConfig::default(),
            Arc::new(RwLock::new(TermIndex::new())),
            Arc::new(StructuralTable::new(StructuralConfig::default())),
            Arc::new(EmbeddingCache::new()),
        )
        .with_embedder(embedder);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        PrecedentRetriever::new(
            calculator,
            ThresholdSelector::new(threshold),
            RetrievalConfig::default(),
            Arc::new(pool),
        )
    }

    fn facts(id: &str, text: &str) -> Arc<Section> {
        Arc::new(Section::new(id, format!("doc-{id}"), SectionType::Facts, text))
    }

    #[test]
    fn empty_pool_is_an_error() {
        let r = retriever(Arc::new(TokenHashEmbedder::new(64)), false);
        let q = Section::new("q", "dq", SectionType::Facts, "bridge defect");
        let err = r.retrieve(&q, &[], 3, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RelevanceError::EmptyPool { .. }));

        // A pool holding only the query itself is empty too.
        let err = r
            .retrieve(&q, &[Arc::new(q.clone())], 3, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, RelevanceError::EmptyPool { .. }));
    }

    #[test]
    fn results_are_sorted_ranked_and_above_threshold() {
        let r = retriever(Arc::new(TokenHashEmbedder::new(64)), true);
        let q = Section::new("q", "dq", SectionType::Facts, "engineer found bridge defect and stayed silent");
        let pool = vec![
            facts("b", "engineer found bridge defect and stayed silent"),
            facts("a", "engineer found bridge defect and stayed silent"),
            facts("c", "client confidentiality agreement signed"),
            facts("d", "bridge defect reported to authorities"),
        ];
        let out = r.retrieve(&q, &pool, 3, &CancelToken::new()).unwrap();
        assert!(!out.matches.is_empty());
        assert!(out.matches.len() <= 3);
        for w in out.matches.windows(2) {
            assert!(w[0].combined_score >= w[1].combined_score);
        }
        // identical scores: "a" before "b"
        assert_eq!(out.matches[0].candidate_id, "a");
        assert_eq!(out.matches[1].candidate_id, "b");
        for (i, m) in out.matches.iter().enumerate() {
            assert_eq!(m.rank, i + 1);
            assert!(m.combined_score >= out.threshold.value);
        }
    }

    #[test]
    fn coarse_failure_aborts() {
        struct Down;
        impl EmbeddingProvider for Down {
            fn model_id(&self) -> &str {
                "down"
            }
            fn dimension(&self) -> usize {
                8
            }
            fn embed(&self, _: &str) -> std::result::Result<Vec<f32>, ProviderError> {
                Err(ProviderError::Timeout(50))
            }
        }
        let r = retriever(Arc::new(Down), false);
        let q = Section::new("q", "dq", SectionType::Facts, "bridge defect");
        let err = r
            .retrieve(&q, &[facts("a", "bridge")], 1, &CancelToken::new())
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn cancelled_request_stops() {
        let r = retriever(Arc::new(TokenHashEmbedder::new(64)), false);
        let q = Section::new("q", "dq", SectionType::Facts, "bridge defect");
        let token = CancelToken::new();
        token.cancel();
        let err = r.retrieve(&q, &[facts("a", "bridge")], 1, &token).unwrap_err();
        assert!(matches!(err, RelevanceError::Cancelled));
    }
}
