//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Precedence: explicit struct values, then environment overrides
//! (`apply_env_overrides`), then defaults.

use std::path::Path;

use casuist_ontology::SectionType;
use serde::{Deserialize, Serialize};

use crate::calculator::Weights;
use crate::error::{RelevanceError, Result};

pub const CASUIST_WORKERS_ENV: &str = "CASUIST_WORKERS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: Weights,
    pub vector: VectorConfig,
    pub threshold: ThresholdConfig,
    pub retrieval: RetrievalConfig,
    pub structural: StructuralConfig,
    pub contradiction: ContradictionConfig,
    pub validation: ValidationConfig,
    /// Size of the scoring worker pool; `0` uses rayon's default (one per core).
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            vector: VectorConfig::default(),
            threshold: ThresholdConfig::default(),
            retrieval: RetrievalConfig::default(),
            structural: StructuralConfig::default(),
            contradiction: ContradictionConfig::default(),
            validation: ValidationConfig::default(),
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub sigmoid_center: f64,
    pub sigmoid_steepness: f64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            sigmoid_center: 0.5,
            sigmoid_steepness: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// A batch is "tight" when `std_dev / (max - min)` is below this ratio.
    pub tight_ratio: f64,
    /// Multiplier on the standard deviation for tight batches (`mean - k*std`).
    pub tight_std_factor: f64,
    /// Percentile used for spread-out batches.
    pub percentile: f64,
    pub base_floors: BaseFloors,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            tight_ratio: 0.25,
            tight_std_factor: 0.5,
            percentile: 0.70,
            base_floors: BaseFloors::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseFloors {
    pub facts: f64,
    pub issues: f64,
    pub rules: f64,
    pub analysis: f64,
    pub conclusion: f64,
}

impl Default for BaseFloors {
    fn default() -> Self {
        Self {
            facts: 0.55,
            issues: 0.60,
            rules: 0.65,
            analysis: 0.60,
            conclusion: 0.60,
        }
    }
}

impl BaseFloors {
    pub fn floor(&self, section_type: SectionType) -> f64 {
        match section_type {
            SectionType::Facts => self.facts,
            SectionType::Issues => self.issues,
            SectionType::Rules => self.rules,
            SectionType::Analysis => self.analysis,
            SectionType::Conclusion => self.conclusion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Coarse set size is `k * coarse_multiplier`, at least `min_coarse`.
    pub coarse_multiplier: usize,
    pub min_coarse: usize,
    /// Pools smaller than this are scanned exactly instead of through HNSW.
    pub exact_scan_below: usize,
    pub hnsw_max_connections: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            coarse_multiplier: 5,
            min_coarse: 20,
            exact_scan_below: 64,
            hnsw_max_connections: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    /// Discount factor is `1 / (1 + graph_decay * hops)`.
    pub graph_decay: f64,
    /// Discount applied when no known-relevant concept is reachable.
    pub unreachable_factor: f64,
    /// EMA rate for `StructuralTable::observe`.
    pub learning_rate: f64,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            graph_decay: 0.25,
            unreachable_factor: 0.5,
            learning_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContradictionConfig {
    /// Inclusive: a match scoring exactly the floor still qualifies.
    pub similarity_floor: f64,
    pub temporal_gap_years: i32,
    pub contextual_overlap_ceiling: f64,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.7,
            temporal_gap_years: 10,
            contextual_overlap_ceiling: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Claims whose best concept match scores below this are left unmapped.
    pub min_claim_match: f64,
    pub max_graph_depth: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_claim_match: 0.3,
            max_graph_depth: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| RelevanceError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelevanceError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `CASUIST_WORKERS` if set. An empty value is ignored.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        match std::env::var(CASUIST_WORKERS_ENV) {
            Ok(v) if !v.trim().is_empty() => {
                self.workers = v.trim().parse::<usize>().map_err(|_| {
                    RelevanceError::Config(format!(
                        "invalid {CASUIST_WORKERS_ENV}={v:?} (expected a thread count; 0 = default)"
                    ))
                })?;
            }
            Ok(_) | Err(std::env::VarError::NotPresent) => {}
            Err(e) => {
                return Err(RelevanceError::Config(format!(
                    "failed to read {CASUIST_WORKERS_ENV}: {e}"
                )))
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;

        if !(self.vector.sigmoid_steepness > 0.0) {
            return Err(RelevanceError::Config(
                "vector.sigmoid_steepness must be positive".to_string(),
            ));
        }
        let t = &self.threshold;
        if !(t.percentile > 0.0 && t.percentile < 1.0) {
            return Err(RelevanceError::Config(format!(
                "threshold.percentile must be in (0, 1), got {}",
                t.percentile
            )));
        }
        if t.tight_ratio < 0.0 || t.tight_std_factor < 0.0 {
            return Err(RelevanceError::Config(
                "threshold.tight_ratio and tight_std_factor must be non-negative".to_string(),
            ));
        }
        for st in SectionType::ALL {
            let floor = t.base_floors.floor(st);
            if !(0.0..=1.0).contains(&floor) {
                return Err(RelevanceError::Config(format!(
                    "threshold.base_floors.{st} must be in [0, 1], got {floor}"
                )));
            }
        }
        if self.retrieval.coarse_multiplier == 0 {
            return Err(RelevanceError::Config(
                "retrieval.coarse_multiplier must be at least 1".to_string(),
            ));
        }
        let s = &self.structural;
        if s.graph_decay < 0.0
            || !(0.0..=1.0).contains(&s.unreachable_factor)
            || !(0.0..=1.0).contains(&s.learning_rate)
        {
            return Err(RelevanceError::Config(
                "structural: graph_decay must be >= 0; unreachable_factor and learning_rate in [0, 1]"
                    .to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.contradiction.similarity_floor) {
            return Err(RelevanceError::Config(
                "contradiction.similarity_floor must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.threshold.base_floors.floor(SectionType::Rules), 0.65);
        assert_eq!(c.threshold.base_floors.floor(SectionType::Facts), 0.55);
        assert_eq!(c.weights.vector, 0.40);
        assert_eq!(c.weights.llm, 0.15);
        c.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = EngineConfig::from_json_str(r#"{ "workers": 3, "threshold": { "percentile": 0.8 } }"#)
            .expect("parse");
        assert_eq!(c.workers, 3);
        assert_eq!(c.threshold.percentile, 0.8);
        assert_eq!(c.threshold.base_floors.rules, 0.65);
        assert_eq!(c.retrieval, RetrievalConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "threshold": { "percentile": 1.5 } }"#).unwrap_err();
        assert!(matches!(err, RelevanceError::Config(msg) if msg.contains("percentile")));

        let err = EngineConfig::from_json_str(
            r#"{ "weights": { "vector": 0.5, "term": 0.5, "structural": 0.5, "llm": 0.5 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, RelevanceError::Config(_)));
    }

    #[test]
    fn config_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casuist.json");
        std::fs::write(&path, r#"{ "contradiction": { "temporal_gap_years": 5 } }"#).unwrap();
        let c = EngineConfig::load(&path).unwrap();
        assert_eq!(c.contradiction.temporal_gap_years, 5);
    }
}
