//! Admissibility validation of generated reasoning.
//!
//! Claims are extracted from the text, each claim is mapped to the
//! best-scoring concept of the world (scored as an Analysis section), and the
//! mapped concept's tension neighbourhood is checked:
//!
//! - an affirming claim about `C` conflicts with every obligation or principle
//!   `H` reachable from `C` through a `conflicts_with` / `overrides` edge that
//!   outranks the norm backing `C` (the highest priority among `C` and the
//!   norms reachable from it without crossing a tension edge);
//! - a denying claim about a normative `C` conflicts with `C` itself when `C`
//!   outranks something it is in tension with (the claim rejects the winner).

use std::sync::Arc;

use casuist_ontology::{Concept, ConceptId, Section, SectionType, World, WorldId};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::calculator::{RelevanceCalculator, ScoringContext};
use crate::cancel::CancelToken;
use crate::claims::SentenceClaimExtractor;
use crate::config::ValidationConfig;
use crate::error::Result;
use crate::provider::{Claim, ClaimExtractor, Stance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The claim affirms a concept that a higher-priority norm is in tension with.
    OutrankedByReachable,
    /// The claim denies a norm that overrides something it is in tension with.
    DeniesOverridingNorm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimConflict {
    pub claim: Claim,
    pub mapped_concept: ConceptId,
    pub match_score: f64,
    pub conflicting_concept: ConceptId,
    pub conflicting_label: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub world_id: WorldId,
    pub passed: bool,
    pub conflicts: Vec<ClaimConflict>,
    pub claims_checked: usize,
    pub unmapped_claims: Vec<Claim>,
}

pub struct AdmissibilityValidator {
    calculator: RelevanceCalculator,
    extractor: Arc<dyn ClaimExtractor>,
    config: ValidationConfig,
    pool: Arc<ThreadPool>,
}

impl AdmissibilityValidator {
    pub fn new(
        calculator: RelevanceCalculator,
        extractor: Arc<dyn ClaimExtractor>,
        config: ValidationConfig,
        pool: Arc<ThreadPool>,
    ) -> Self {
        Self {
            calculator,
            extractor,
            config,
            pool,
        }
    }

    fn claims(&self, text: &str) -> Vec<Claim> {
        match self.extractor.extract(text) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "claim extractor failed; falling back to sentence splitting");
                SentenceClaimExtractor
                    .extract(text)
                    .unwrap_or_default()
            }
        }
    }

    /// Best concept for a claim, ties broken by ascending concept id.
    fn map_claim<'w>(
        &self,
        index: usize,
        claim: &Claim,
        world: &'w World,
    ) -> Option<(&'w Concept, f64)> {
        let pseudo = Section::new(
            format!("claim-{index}"),
            "generated",
            SectionType::Analysis,
            claim.text.clone(),
        );
        let ctx = ScoringContext::new(&world.graph, &[]);
        world
            .graph
            .concepts()
            .filter_map(|concept| match self.calculator.score(&pseudo, concept, ctx) {
                Ok(score) => Some((concept, score.combined_score)),
                Err(e) => {
                    tracing::debug!(concept = %concept.id, error = %e, "concept skipped during claim mapping");
                    None
                }
            })
            .max_by(|(ca, sa), (cb, sb)| sa.total_cmp(sb).then_with(|| cb.id.cmp(&ca.id)))
    }

    fn backing_priority(&self, concept: &Concept, world: &World) -> u8 {
        world
            .graph
            .reachable(&concept.id, self.config.max_graph_depth)
            .iter()
            .filter(|r| !r.via_tension && r.concept.category.is_normative())
            .map(|r| r.concept.priority)
            .fold(concept.priority, u8::max)
    }

    fn conflicts_for(
        &self,
        claim: &Claim,
        mapped: &Concept,
        match_score: f64,
        world: &World,
    ) -> Vec<ClaimConflict> {
        let tension = world
            .graph
            .reachable_in_tension(&mapped.id, self.config.max_graph_depth);
        let conflict = |target: &Concept, kind| ClaimConflict {
            claim: claim.clone(),
            mapped_concept: mapped.id.clone(),
            match_score,
            conflicting_concept: target.id.clone(),
            conflicting_label: target.label.clone(),
            kind,
        };

        match claim.stance {
            Stance::Affirms => {
                let backing = self.backing_priority(mapped, world);
                tension
                    .iter()
                    .filter(|r| r.concept.category.is_normative() && r.concept.priority > backing)
                    .map(|r| conflict(r.concept, ConflictKind::OutrankedByReachable))
                    .collect()
            }
            Stance::Denies => {
                let overrides_something = mapped.category.is_normative()
                    && tension.iter().any(|r| r.concept.priority < mapped.priority);
                if overrides_something {
                    vec![conflict(mapped, ConflictKind::DeniesOverridingNorm)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn validate(&self, text: &str, world: &World, cancel: &CancelToken) -> Result<ValidationResult> {
        cancel.check()?;
        let claims = self.claims(text);
        cancel.check()?;

        let mapped: Vec<Option<(&Concept, f64)>> = self.pool.install(|| {
            claims
                .par_iter()
                .enumerate()
                .map(|(i, claim)| {
                    cancel.check()?;
                    Ok(self.map_claim(i, claim, world))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        cancel.check()?;

        let mut conflicts = Vec::new();
        let mut unmapped_claims = Vec::new();
        for (claim, mapping) in claims.iter().zip(mapped) {
            match mapping {
                Some((concept, score)) if score >= self.config.min_claim_match => {
                    conflicts.extend(self.conflicts_for(claim, concept, score, world));
                }
                _ => unmapped_claims.push(claim.clone()),
            }
        }
        conflicts.sort_by(|a, b| {
            a.mapped_concept
                .cmp(&b.mapped_concept)
                .then_with(|| a.conflicting_concept.cmp(&b.conflicting_concept))
                .then_with(|| a.claim.text.cmp(&b.claim.text))
        });

        let result = ValidationResult {
            world_id: world.id.clone(),
            passed: conflicts.is_empty(),
            conflicts,
            claims_checked: claims.len(),
            unmapped_claims,
        };
        tracing::info!(
            world = %result.world_id,
            claims = result.claims_checked,
            unmapped = result.unmapped_claims.len(),
            conflicts = result.conflicts.len(),
            passed = result.passed,
            "validation complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Weights;
    use crate::config::{StructuralConfig, VectorConfig};
    use crate::embedding::EmbeddingCache;
    use crate::structural::StructuralTable;
    use crate::term_index::TermIndex;
    use casuist_ontology::{ConceptCategory, Predicate};
    use parking_lot::RwLock;

    fn world() -> World {
        World::new(
            "engineering",
            "Engineering ethics",
            [
                Concept::new("public_safety", "", "Public safety", ConceptCategory::Principle)
                    .with_description("hold paramount the safety of the public")
                    .with_priority(10),
                Concept::new(
                    "client_confidentiality",
                    "",
                    "Client confidentiality",
                    ConceptCategory::Obligation,
                )
                .with_description("keep client information confidential")
                .with_priority(5)
                .relate(Predicate::ConflictsWith, "public_safety"),
                Concept::new("report_hazard", "", "Report hazard", ConceptCategory::Action)
                    .with_description("report a hazard to the authorities")
                    .relate(Predicate::Supports, "public_safety"),
            ],
        )
        .unwrap()
    }

    fn validator() -> AdmissibilityValidator {
        let calculator = RelevanceCalculator::new(
            Weights::default(),
            VectorConfig::default(),
            Arc::new(RwLock::new(TermIndex::new())),
            Arc::new(StructuralTable::new(StructuralConfig::default())),
            Arc::new(EmbeddingCache::new()),
        );
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        AdmissibilityValidator::new(
            calculator,
            Arc::new(SentenceClaimExtractor),
            ValidationConfig::default(),
            Arc::new(pool),
        )
    }

    #[test]
    fn lower_priority_obligation_against_higher_principle_fails() {
        let w = world();
        let result = validator()
            .validate(
                "Engineer A should keep the client information confidential.",
                &w,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.claims_checked, 1);
        assert_eq!(result.conflicts.len(), 1);
        let c = &result.conflicts[0];
        assert_eq!(c.mapped_concept, "client_confidentiality");
        assert_eq!(c.conflicting_concept, "public_safety");
        assert_eq!(c.kind, ConflictKind::OutrankedByReachable);
    }

    #[test]
    fn action_backed_by_the_higher_norm_passes() {
        let w = world();
        let result = validator()
            .validate("Engineer A must report the hazard to the authorities.", &w, &CancelToken::new())
            .unwrap();
        assert!(result.passed, "{:?}", result.conflicts);
        assert!(result.unmapped_claims.is_empty());
    }

    #[test]
    fn denying_the_overriding_principle_fails() {
        let w = world();
        let result = validator()
            .validate(
                "Engineer A need not hold the safety of the public paramount.",
                &w,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.conflicts[0].conflicting_concept, "public_safety");
        assert_eq!(result.conflicts[0].kind, ConflictKind::DeniesOverridingNorm);
    }

    #[test]
    fn cancellation_is_honoured() {
        let token = CancelToken::new();
        token.cancel();
        let err = validator().validate("anything at all", &world(), &token).unwrap_err();
        assert!(matches!(err, crate::RelevanceError::Cancelled));
    }
}
