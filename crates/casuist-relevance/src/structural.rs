//! Structural relevance priors.
//!
//! Two lookup tables:
//! - `(section type, concept category) -> prior`, the prior probability that a
//!   concept of that category matters to a section of that type;
//! - `(query section type, candidate section type) -> affinity`, used when the
//!   "concept" being scored is itself a precedent section.
//!
//! Priors start from the built-in table and can be nudged by reviewer
//! feedback through [`StructuralTable::observe`] (exponential moving average).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use casuist_ontology::{ConceptCategory, SectionType};
use parking_lot::RwLock;

use crate::config::StructuralConfig;

#[derive(Debug)]
pub struct StructuralTable {
    priors: RwLock<HashMap<(SectionType, ConceptCategory), f64>>,
    affinity: HashMap<(SectionType, SectionType), f64>,
    config: StructuralConfig,
    revision: AtomicU64,
}

impl StructuralTable {
    pub fn new(config: StructuralConfig) -> Self {
        Self {
            priors: RwLock::new(default_priors()),
            affinity: default_affinity(),
            config,
            revision: AtomicU64::new(0),
        }
    }

    pub fn empty(config: StructuralConfig) -> Self {
        Self {
            priors: RwLock::new(HashMap::new()),
            affinity: HashMap::new(),
            config,
            revision: AtomicU64::new(0),
        }
    }

    pub fn set_prior(&self, section_type: SectionType, category: ConceptCategory, prior: f64) {
        self.priors
            .write()
            .insert((section_type, category), prior.clamp(0.0, 1.0));
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Bumped on every prior change; part of the score cache stamp.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn prior(&self, section_type: SectionType, category: ConceptCategory) -> Option<f64> {
        self.priors.read().get(&(section_type, category)).copied()
    }

    pub fn section_affinity(&self, query: SectionType, candidate: SectionType) -> Option<f64> {
        self.affinity.get(&(query, candidate)).copied()
    }

    /// Discount for graph distance to the nearest known-relevant concept.
    ///
    /// `None` distance with a non-empty known set means unreachable.
    pub fn graph_discount(&self, distance: Option<usize>, has_known: bool) -> f64 {
        if !has_known {
            return 1.0;
        }
        match distance {
            Some(d) => 1.0 / (1.0 + self.config.graph_decay * d as f64),
            None => self.config.unreachable_factor,
        }
    }

    /// Structural score: prior times graph discount.
    pub fn score(
        &self,
        section_type: SectionType,
        category: ConceptCategory,
        distance: Option<usize>,
        has_known: bool,
    ) -> Option<f64> {
        let prior = self.prior(section_type, category)?;
        Some((prior * self.graph_discount(distance, has_known)).clamp(0.0, 1.0))
    }

    /// Fold one reviewer judgment into the prior for this pair.
    pub fn observe(&self, section_type: SectionType, category: ConceptCategory, relevant: bool) {
        let target = if relevant { 1.0 } else { 0.0 };
        let rate = self.config.learning_rate;
        let mut priors = self.priors.write();
        let prior = priors.entry((section_type, category)).or_insert(0.5);
        *prior = (*prior + rate * (target - *prior)).clamp(0.0, 1.0);
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            section_type = %section_type,
            category = %category,
            relevant,
            prior = *prior,
            "structural prior updated"
        );
    }
}

fn default_priors() -> HashMap<(SectionType, ConceptCategory), f64> {
    use ConceptCategory as C;
    use SectionType as S;

    // Rows follow the section order; columns follow ConceptCategory::ALL:
    // role, principle, obligation, state, action, event, capability,
    // constraint, precedent_pattern.
    let rows: [(S, [f64; 9]); 5] = [
        (S::Facts, [0.85, 0.35, 0.40, 0.80, 0.85, 0.85, 0.55, 0.40, 0.30]),
        (S::Issues, [0.55, 0.75, 0.75, 0.50, 0.60, 0.45, 0.40, 0.65, 0.55]),
        (S::Rules, [0.45, 0.85, 0.90, 0.30, 0.35, 0.25, 0.45, 0.80, 0.50]),
        (S::Analysis, [0.60, 0.80, 0.80, 0.55, 0.65, 0.55, 0.60, 0.70, 0.75]),
        (S::Conclusion, [0.50, 0.80, 0.80, 0.40, 0.55, 0.35, 0.40, 0.60, 0.80]),
    ];
    let mut out = HashMap::new();
    for (section_type, values) in rows {
        for (category, value) in C::ALL.into_iter().zip(values) {
            out.insert((section_type, category), value);
        }
    }
    out
}

fn default_affinity() -> HashMap<(SectionType, SectionType), f64> {
    let mut out = HashMap::new();
    for q in SectionType::ALL {
        for c in SectionType::ALL {
            let v = if q == c {
                0.90
            } else {
                match (q, c) {
                    (SectionType::Analysis, SectionType::Conclusion)
                    | (SectionType::Conclusion, SectionType::Analysis)
                    | (SectionType::Issues, SectionType::Conclusion)
                    | (SectionType::Issues, SectionType::Analysis)
                    | (SectionType::Rules, SectionType::Analysis) => 0.70,
                    (SectionType::Facts, _) | (_, SectionType::Facts) => 0.35,
                    _ => 0.50,
                }
            };
            out.insert((q, c), v);
        }
    }
    out
}
