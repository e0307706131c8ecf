//! Contradictions between retrieved precedents.
//!
//! Two matches against the same query contradict when both clear the
//! similarity floor and their cases' outcome labels disagree on the same
//! principle. Each record carries a resolution hint:
//!
//! - `temporal`: the cases were decided under different code editions, or
//!   far enough apart in time;
//! - `contextual`: the two cases' Facts sections barely overlap, so
//!   distinguishing facts likely explain the divergence;
//! - `unresolved`: neither applies; a human has to look.

use std::collections::BTreeMap;
use std::sync::Arc;

use casuist_ontology::{CaseSections, OutcomeLabel, Section, SectionId};
use serde::{Deserialize, Serialize};

use crate::calculator::RelevanceCalculator;
use crate::config::ContradictionConfig;
use crate::retriever::{sort_matches, PrecedentMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionHint {
    Temporal,
    Contextual,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub query_section_id: SectionId,
    pub first: PrecedentMatch,
    pub second: PrecedentMatch,
    pub first_outcome: OutcomeLabel,
    pub second_outcome: OutcomeLabel,
    /// The lower of the two combined scores.
    pub mutual_score: f64,
    pub resolution_hint: ResolutionHint,
}

/// Outcome and decision metadata of the case a matched section belongs to.
#[derive(Debug, Clone)]
struct CaseOutcome {
    label: OutcomeLabel,
    decided_year: Option<i32>,
    standard_version: Option<String>,
}

pub struct ContradictionDetector {
    calculator: RelevanceCalculator,
    config: ContradictionConfig,
}

impl ContradictionDetector {
    pub fn new(calculator: RelevanceCalculator, config: ContradictionConfig) -> Self {
        Self { calculator, config }
    }

    pub fn find_contradictions(
        &self,
        matches: &[PrecedentMatch],
        sections: &dyn CaseSections,
    ) -> Vec<ContradictionRecord> {
        // query -> candidate -> best match; merged retrievals may repeat a candidate.
        let mut by_query: BTreeMap<&str, BTreeMap<&str, &PrecedentMatch>> = BTreeMap::new();
        for m in matches {
            if m.combined_score < self.config.similarity_floor {
                continue;
            }
            let best = by_query
                .entry(m.query_section_id.as_str())
                .or_default()
                .entry(m.candidate_id.as_str())
                .or_insert(m);
            if m.combined_score > best.combined_score {
                *best = m;
            }
        }

        let mut records = Vec::new();
        for (query_id, candidates) in by_query {
            let mut group: Vec<PrecedentMatch> = candidates.into_values().cloned().collect();
            sort_matches(&mut group);

            let outcomes: Vec<Option<CaseOutcome>> = group
                .iter()
                .map(|m| case_outcome(m, sections))
                .collect();

            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    let (a, b) = (&group[i], &group[j]);
                    if a.candidate_document_id == b.candidate_document_id {
                        continue;
                    }
                    let (Some(oa), Some(ob)) = (&outcomes[i], &outcomes[j]) else {
                        continue;
                    };
                    if !oa.label.disagrees_with(&ob.label) {
                        continue;
                    }
                    let resolution_hint = self.hint(a, oa, b, ob, sections);
                    tracing::debug!(
                        query = query_id,
                        first = %a.candidate_id,
                        second = %b.candidate_id,
                        ?resolution_hint,
                        "contradiction found"
                    );
                    records.push(ContradictionRecord {
                        query_section_id: query_id.to_string(),
                        first: a.clone(),
                        second: b.clone(),
                        first_outcome: oa.label.clone(),
                        second_outcome: ob.label.clone(),
                        mutual_score: a.combined_score.min(b.combined_score),
                        resolution_hint,
                    });
                }
            }
        }
        records
    }

    fn hint(
        &self,
        a: &PrecedentMatch,
        oa: &CaseOutcome,
        b: &PrecedentMatch,
        ob: &CaseOutcome,
        sections: &dyn CaseSections,
    ) -> ResolutionHint {
        let versions_differ = matches!(
            (&oa.standard_version, &ob.standard_version),
            (Some(x), Some(y)) if x != y
        );
        let years_apart = matches!(
            (oa.decided_year, ob.decided_year),
            (Some(x), Some(y)) if (x - y).abs() >= self.config.temporal_gap_years
        );
        if versions_differ || years_apart {
            return ResolutionHint::Temporal;
        }

        let facts = (
            sections.facts_for(&a.candidate_document_id),
            sections.facts_for(&b.candidate_document_id),
        );
        if let (Some(fa), Some(fb)) = facts {
            let overlap = self.calculator.term_metric(&fa.text, &fb.text).unwrap_or(0.0);
            if overlap < self.config.contextual_overlap_ceiling {
                return ResolutionHint::Contextual;
            }
        }
        ResolutionHint::Unresolved
    }
}

/// The matched section's own label, else the first labelled section of its
/// case. Decision metadata is taken the same way.
fn case_outcome(m: &PrecedentMatch, sections: &dyn CaseSections) -> Option<CaseOutcome> {
    let own = sections.section(&m.candidate_id);
    let siblings: Vec<Arc<Section>> = sections.sections_for(&m.candidate_document_id);
    let ordered = || own.iter().chain(siblings.iter());

    let label = ordered().find_map(|s| s.outcome_label.clone())?;
    Some(CaseOutcome {
        label,
        decided_year: ordered().find_map(|s| s.decided_year),
        standard_version: ordered().find_map(|s| s.standard_version.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{MetricScores, Weights};
    use crate::config::{StructuralConfig, VectorConfig};
    use crate::embedding::EmbeddingCache;
    use crate::structural::StructuralTable;
    use crate::term_index::TermIndex;
    use casuist_ontology::{CaseLibrary, SectionType, Verdict};
    use parking_lot::RwLock;

    fn detector() -> ContradictionDetector {
        let calculator = RelevanceCalculator::new(
            Weights::default(),
            VectorConfig::default(),
            Arc::new(RwLock::new(TermIndex::new())),
            Arc::new(StructuralTable::new(StructuralConfig::default())),
            Arc::new(EmbeddingCache::new()),
        );
        ContradictionDetector::new(calculator, ContradictionConfig::default())
    }

    fn matched(candidate: &str, document: &str, score: f64) -> PrecedentMatch {
        PrecedentMatch {
            query_section_id: "q".to_string(),
            candidate_id: candidate.to_string(),
            candidate_document_id: document.to_string(),
            candidate_section_type: SectionType::Conclusion,
            combined_score: score,
            rank: 0,
            metrics: MetricScores::default(),
            weights_used: Weights::default(),
        }
    }

    fn library(facts_a: &str, facts_b: &str) -> CaseLibrary {
        CaseLibrary::from_sections([
            Section::new("a-facts", "case-a", SectionType::Facts, facts_a),
            Section::new("a-concl", "case-a", SectionType::Conclusion, "It was ethical.")
                .with_outcome(OutcomeLabel::new(Verdict::Ethical).on_principle("public_safety")),
            Section::new("b-facts", "case-b", SectionType::Facts, facts_b),
            Section::new("b-concl", "case-b", SectionType::Conclusion, "It was unethical.")
                .with_outcome(OutcomeLabel::new(Verdict::Unethical).on_principle("public_safety")),
        ])
    }

    #[test]
    fn opposite_outcomes_produce_one_record() {
        let lib = library(
            "Engineer discovered a bridge defect during inspection.",
            "Engineer discovered a bridge defect during inspection.",
        );
        let records = detector().find_contradictions(
            &[matched("a-concl", "case-a", 0.9), matched("b-concl", "case-b", 0.9)],
            &lib,
        );
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.first.candidate_id, "a-concl");
        assert_eq!(r.mutual_score, 0.9);
        assert_eq!(r.resolution_hint, ResolutionHint::Unresolved);
    }

    #[test]
    fn below_floor_or_agreeing_pairs_are_ignored() {
        let lib = library("x bridge", "x bridge");
        let d = detector();
        assert!(d
            .find_contradictions(
                &[matched("a-concl", "case-a", 0.9), matched("b-concl", "case-b", 0.5)],
                &lib
            )
            .is_empty());

        let agreeing = CaseLibrary::from_sections([
            Section::new("a", "case-a", SectionType::Conclusion, "ok")
                .with_outcome(OutcomeLabel::new(Verdict::Ethical)),
            Section::new("b", "case-b", SectionType::Conclusion, "ok")
                .with_outcome(OutcomeLabel::new(Verdict::Ethical)),
        ]);
        assert!(d
            .find_contradictions(&[matched("a", "case-a", 0.9), matched("b", "case-b", 0.9)], &agreeing)
            .is_empty());
    }

    #[test]
    fn repeated_candidates_keep_their_best_score() {
        let lib = library(
            "Engineer discovered a bridge defect during inspection.",
            "Engineer discovered a bridge defect during inspection.",
        );
        let records = detector().find_contradictions(
            &[
                matched("a-concl", "case-a", 0.95),
                matched("b-concl", "case-b", 0.9),
                matched("a-concl", "case-a", 0.85),
            ],
            &lib,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first.candidate_id, "a-concl");
        assert_eq!(records[0].first.combined_score, 0.95);
        assert_eq!(records[0].mutual_score, 0.9);
    }

    #[test]
    fn floor_is_inclusive() {
        let lib = library("x bridge", "x bridge");
        let floor = ContradictionConfig::default().similarity_floor;
        let records = detector().find_contradictions(
            &[matched("a-concl", "case-a", floor), matched("b-concl", "case-b", 0.9)],
            &lib,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mutual_score, floor);
    }

    #[test]
    fn different_code_editions_are_temporal() {
        let lib = CaseLibrary::from_sections([
            Section::new("a", "case-a", SectionType::Conclusion, "ethical")
                .with_outcome(OutcomeLabel::new(Verdict::Ethical))
                .decided(1985, Some("1981")),
            Section::new("b", "case-b", SectionType::Conclusion, "unethical")
                .with_outcome(OutcomeLabel::new(Verdict::Unethical))
                .decided(2019, Some("2018")),
        ]);
        let records = detector()
            .find_contradictions(&[matched("a", "case-a", 0.8), matched("b", "case-b", 0.95)], &lib);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resolution_hint, ResolutionHint::Temporal);
        assert_eq!(records[0].first.candidate_id, "b");
        assert_eq!(records[0].mutual_score, 0.8);
    }

    #[test]
    fn disjoint_facts_are_contextual() {
        let lib = library(
            "Engineer discovered a bridge defect during inspection.",
            "Consultant shared confidential client pricing with competitor.",
        );
        let records = detector().find_contradictions(
            &[matched("a-concl", "case-a", 0.9), matched("b-concl", "case-b", 0.9)],
            &lib,
        );
        assert_eq!(records[0].resolution_hint, ResolutionHint::Contextual);
    }
}
