//! `RelevanceEngine`: the facade the reasoning layer talks to.
//!
//! It wires the calculator, threshold selector, retriever, contradiction
//! detector, and validator to one config, one worker pool, the read-only
//! ontology and case services, and an explicit [`EngineCaches`] bundle.

use std::sync::Arc;

use casuist_ontology::{
    CaseSections, Concept, ConceptId, OntologyService, Section, SectionId, SectionType, World,
    WorldId,
};
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::cache::{fingerprint, CacheStamp, EngineCaches};
use crate::calculator::{RelevanceCalculator, RelevanceScore, ScoringContext};
use crate::cancel::CancelToken;
use crate::claims::SentenceClaimExtractor;
use crate::config::EngineConfig;
use crate::contradiction::{ContradictionDetector, ContradictionRecord};
use crate::embedding::TokenHashEmbedder;
use crate::error::{RelevanceError, Result};
use crate::provider::{ClaimExtractor, EmbeddingProvider, LlmJudge};
use crate::retriever::{PrecedentMatch, PrecedentRetriever, Retrieval};
use crate::structural::StructuralTable;
use crate::term_index::TermIndex;
use crate::threshold::{ThresholdDecision, ThresholdSelector};
use crate::validator::{AdmissibilityValidator, ValidationResult};

/// The pluggable inference capabilities. A missing judge just drops the LLM
/// metric; a missing embedder drops the vector metric and makes retrieval fail.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub judge: Option<Arc<dyn LlmJudge>>,
    pub claim_extractor: Arc<dyn ClaimExtractor>,
}

impl Providers {
    /// Token-hash embeddings, sentence claims, no judge.
    pub fn offline() -> Self {
        Self {
            embedder: Some(Arc::new(TokenHashEmbedder::default())),
            judge: None,
            claim_extractor: Arc::new(SentenceClaimExtractor),
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

    pub fn with_claim_extractor(mut self, extractor: Arc<dyn ClaimExtractor>) -> Self {
        self.claim_extractor = extractor;
        self
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self::offline()
    }
}

/// A section scored against every concept of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRanking {
    pub section_id: SectionId,
    pub world_id: WorldId,
    /// All scores, best first, ties by ascending concept id.
    pub scores: Vec<RelevanceScore>,
    /// The scores at or above the batch threshold, in the same order.
    pub admitted: Vec<RelevanceScore>,
    pub threshold: ThresholdDecision,
    /// Concepts with nothing to score on.
    pub skipped: Vec<ConceptId>,
}

pub struct RelevanceEngine {
    config: EngineConfig,
    ontology: Arc<dyn OntologyService>,
    sections: Arc<dyn CaseSections>,
    caches: EngineCaches,
    calculator: RelevanceCalculator,
    thresholds: ThresholdSelector,
    retriever: PrecedentRetriever,
    detector: ContradictionDetector,
    validator: AdmissibilityValidator,
    pool: Arc<ThreadPool>,
    scorer_fingerprint: String,
}

impl RelevanceEngine {
    pub fn new(
        config: EngineConfig,
        ontology: Arc<dyn OntologyService>,
        sections: Arc<dyn CaseSections>,
        providers: Providers,
    ) -> Result<Self> {
        Self::with_caches(config, ontology, sections, providers, EngineCaches::new())
    }

    pub fn with_caches(
        config: EngineConfig,
        ontology: Arc<dyn OntologyService>,
        sections: Arc<dyn CaseSections>,
        providers: Providers,
        caches: EngineCaches,
    ) -> Result<Self> {
        config.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("casuist-score-{i}"));
        if config.workers > 0 {
            builder = builder.num_threads(config.workers);
        }
        let pool = Arc::new(
            builder
                .build()
                .map_err(|e| RelevanceError::Config(format!("failed to build worker pool: {e}")))?,
        );

        let term_index = Arc::new(RwLock::new(TermIndex::new()));
        let structural = Arc::new(StructuralTable::new(config.structural.clone()));
        let mut calculator = RelevanceCalculator::new(
            config.weights,
            config.vector.clone(),
            term_index,
            structural,
            Arc::clone(&caches.embeddings),
        );
        if let Some(embedder) = &providers.embedder {
            calculator = calculator.with_embedder(Arc::clone(embedder));
        }
        if let Some(judge) = &providers.judge {
            calculator = calculator.with_judge(Arc::clone(judge));
        }

        let scorer_fingerprint = {
            let weights = format!("{:?}", config.weights);
            let vector = format!("{:?}", config.vector);
            let structural = format!("{:?}", config.structural);
            let model = providers
                .embedder
                .as_ref()
                .map(|e| e.model_id().to_string())
                .unwrap_or_default();
            let judge = if providers.judge.is_some() { "judge" } else { "" };
            fingerprint([
                weights.as_str(),
                vector.as_str(),
                structural.as_str(),
                model.as_str(),
                judge,
            ])
        };

        let thresholds = ThresholdSelector::new(config.threshold.clone());
        let retriever = PrecedentRetriever::new(
            calculator.clone(),
            thresholds.clone(),
            config.retrieval.clone(),
            Arc::clone(&pool),
        );
        let detector = ContradictionDetector::new(calculator.clone(), config.contradiction.clone());
        let validator = AdmissibilityValidator::new(
            calculator.clone(),
            Arc::clone(&providers.claim_extractor),
            config.validation.clone(),
            Arc::clone(&pool),
        );

        tracing::debug!(
            workers = pool.current_num_threads(),
            embedder = providers.embedder.is_some(),
            judge = providers.judge.is_some(),
            "relevance engine ready"
        );

        Ok(Self {
            config,
            ontology,
            sections,
            caches,
            calculator,
            thresholds,
            retriever,
            detector,
            validator,
            pool,
            scorer_fingerprint,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn caches(&self) -> &EngineCaches {
        &self.caches
    }

    pub fn structural(&self) -> &StructuralTable {
        self.calculator.structural()
    }

    fn world(&self, world_id: &str) -> Result<Arc<World>> {
        self.ontology
            .world(world_id)
            .ok_or_else(|| RelevanceError::UnknownWorld {
                world_id: world_id.to_string(),
            })
    }

    /// Rebuild term statistics from the given sections plus (optionally) a
    /// world's concept texts. Cached scores are dropped since every term
    /// score depends on the statistics.
    #[tracing::instrument(skip_all, fields(sections = sections.len()))]
    pub fn index_corpus(&self, sections: &[Arc<Section>], world_id: Option<&str>) -> Result<usize> {
        let world = world_id.map(|id| self.world(id)).transpose()?;
        let mut texts: Vec<String> = sections.iter().map(|s| s.text.clone()).collect();
        if let Some(world) = &world {
            texts.extend(world.graph.concepts().map(Concept::text));
        }
        let index = TermIndex::build(texts.iter().map(String::as_str));
        let documents = index.documents();
        *self.calculator.term_index().write() = index;
        self.caches.scores.clear();
        tracing::debug!(documents, "term index rebuilt");
        Ok(documents)
    }

    fn stamp(&self, section: &Section, concept: &Concept, ctx: &ScoringContext<'_>) -> CacheStamp {
        let mut known: Vec<&str> = ctx.known_relevant.iter().map(String::as_str).collect();
        known.sort_unstable();
        let structural_rev = self.calculator.structural().revision().to_string();
        let mut parts = vec![self.scorer_fingerprint.as_str(), structural_rev.as_str()];
        parts.extend(known.iter().copied());
        let graph_revision = match ctx.graph {
            Some(graph) if !ctx.known_relevant.is_empty() => graph.revision(),
            _ => 0,
        };
        CacheStamp {
            section_hash: section.content_hash(),
            concept_hash: concept.fingerprint(),
            graph_revision,
            context: fingerprint(parts),
        }
    }

    /// Score one (section, concept) pair, reusing a cached score when the
    /// section, concept, graph, and scoring context are unchanged. A score
    /// that lost a metric to a provider failure is returned but not cached,
    /// so the next call asks the provider again.
    #[tracing::instrument(skip_all, fields(section = %section.id, concept = %concept.id))]
    pub fn score(
        &self,
        section: &Section,
        concept: &Concept,
        ctx: ScoringContext<'_>,
    ) -> Result<RelevanceScore> {
        let stamp = self.stamp(section, concept, &ctx);
        if let Some(hit) = self.caches.scores.get(&section.id, &concept.id, &stamp) {
            return Ok(hit);
        }
        let (score, degraded) = self.calculator.score_checked(section, concept, ctx)?;
        if degraded {
            tracing::debug!("provider failure dropped a metric; score not cached");
        } else {
            self.caches.scores.insert(stamp, score.clone());
        }
        Ok(score)
    }

    /// Score a section against one concept of a world by id.
    pub fn score_in_world(
        &self,
        section: &Section,
        world_id: &str,
        concept_id: &str,
        known_relevant: &[ConceptId],
    ) -> Result<RelevanceScore> {
        let world = self.world(world_id)?;
        let concept = world
            .graph
            .get(concept_id)
            .ok_or_else(|| RelevanceError::InvalidConcept {
                concept_id: concept_id.to_string(),
            })?;
        self.score(section, concept, ScoringContext::new(&world.graph, known_relevant))
    }

    /// Score a section against every concept of a world and apply the batch
    /// threshold for the section's type.
    #[tracing::instrument(skip_all, fields(section = %section.id, world = world_id))]
    pub fn score_concepts(
        &self,
        section: &Section,
        world_id: &str,
        known_relevant: &[ConceptId],
        cancel: &CancelToken,
    ) -> Result<ConceptRanking> {
        let world = self.world(world_id)?;
        let concepts: Vec<&Concept> = world.graph.concepts().collect();
        let ctx = ScoringContext::new(&world.graph, known_relevant);

        let outcomes: Vec<std::result::Result<RelevanceScore, ConceptId>> = self.pool.install(|| {
            concepts
                .par_iter()
                .map(|concept| {
                    cancel.check()?;
                    match self.score(section, concept, ctx) {
                        Ok(score) => Ok(Ok(score)),
                        Err(RelevanceError::InvalidConcept { concept_id }) => Ok(Err(concept_id)),
                        Err(e) => Err(e),
                    }
                })
                .collect::<Result<Vec<_>>>()
        })?;
        cancel.check()?;

        let mut scores = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(score) => scores.push(score),
                Err(concept_id) => skipped.push(concept_id),
            }
        }
        skipped.sort();
        scores.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.concept_id.cmp(&b.concept_id))
        });

        let batch: Vec<f64> = scores.iter().map(|s| s.combined_score).collect();
        let threshold = self.thresholds.decide(&batch, section.section_type);
        let admitted: Vec<RelevanceScore> = scores
            .iter()
            .filter(|s| threshold.admits(s.combined_score))
            .cloned()
            .collect();

        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), "concepts without any scoring signal were skipped");
        }
        tracing::debug!(
            scored = scores.len(),
            admitted = admitted.len(),
            threshold = threshold.value,
            "concept batch scored"
        );

        Ok(ConceptRanking {
            section_id: section.id.clone(),
            world_id: world.id.clone(),
            scores,
            admitted,
            threshold,
            skipped,
        })
    }

    pub fn threshold(&self, scores: &[f64], section_type: SectionType) -> f64 {
        self.thresholds.threshold(scores, section_type)
    }

    #[tracing::instrument(skip_all, fields(query = %query.id, pool = candidates.len(), k = k))]
    pub fn retrieve(
        &self,
        query: &Section,
        candidates: &[Arc<Section>],
        k: usize,
    ) -> Result<Vec<PrecedentMatch>> {
        Ok(self
            .retrieve_detailed(query, candidates, k, &CancelToken::new())?
            .matches)
    }

    /// Retrieval with its batch threshold and phase sizes, cancellable.
    pub fn retrieve_detailed(
        &self,
        query: &Section,
        candidates: &[Arc<Section>],
        k: usize,
        cancel: &CancelToken,
    ) -> Result<Retrieval> {
        self.retriever.retrieve(query, candidates, k, cancel)
    }

    #[tracing::instrument(skip_all, fields(matches = matches.len()))]
    pub fn find_contradictions(&self, matches: &[PrecedentMatch]) -> Vec<ContradictionRecord> {
        self.detector.find_contradictions(matches, self.sections.as_ref())
    }

    #[tracing::instrument(skip_all, fields(world = world_id))]
    pub fn validate(&self, generated_text: &str, world_id: &str) -> Result<ValidationResult> {
        self.validate_with_cancel(generated_text, world_id, &CancelToken::new())
    }

    pub fn validate_with_cancel(
        &self,
        generated_text: &str,
        world_id: &str,
        cancel: &CancelToken,
    ) -> Result<ValidationResult> {
        let world = self.world(world_id)?;
        self.validator.validate(generated_text, &world, cancel)
    }

    /// Fold a reviewer judgment into the structural priors.
    pub fn observe_feedback(&self, section_type: SectionType, concept: &Concept, relevant: bool) {
        self.calculator
            .structural()
            .observe(section_type, concept.category, relevant);
    }

    pub fn invalidate_section(&self, section_id: &str) -> usize {
        self.caches.scores.invalidate_section(section_id)
    }

    pub fn invalidate_concept(&self, concept_id: &str) -> usize {
        self.caches.scores.invalidate_concept(concept_id)
    }
}
