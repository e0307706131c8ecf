//! Dynamic admission threshold per scoring batch and section type.
//!
//! ```text
//! tight batch  (σ < tight_ratio · (max − min), or max == min):  μ − 0.5σ
//! otherwise:                                                     P70
//! threshold = max(statistical value, base floor for the section type)
//! ```
//!
//! Pure: identical score multisets give identical decisions regardless of
//! input order.

use casuist_ontology::SectionType;
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStrategy {
    /// No scores; the base floor applies alone.
    Empty,
    TightCluster,
    Percentile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDecision {
    pub section_type: SectionType,
    pub batch_size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub strategy: ThresholdStrategy,
    pub statistical: Option<f64>,
    pub base_floor: f64,
    pub value: f64,
}

impl ThresholdDecision {
    pub fn admits(&self, score: f64) -> bool {
        score >= self.value
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdSelector {
    config: ThresholdConfig,
}

impl ThresholdSelector {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self, scores: &[f64], section_type: SectionType) -> f64 {
        self.decide(scores, section_type).value
    }

    pub fn decide(&self, scores: &[f64], section_type: SectionType) -> ThresholdDecision {
        let base_floor = self.config.base_floors.floor(section_type);
        let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if sorted.is_empty() {
            return ThresholdDecision {
                section_type,
                batch_size: 0,
                mean: 0.0,
                std_dev: 0.0,
                strategy: ThresholdStrategy::Empty,
                statistical: None,
                base_floor,
                value: base_floor,
            };
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let range = sorted[sorted.len() - 1] - sorted[0];

        let tight = range <= f64::EPSILON || std_dev < self.config.tight_ratio * range;
        let (strategy, statistical) = if tight {
            (
                ThresholdStrategy::TightCluster,
                mean - self.config.tight_std_factor * std_dev,
            )
        } else {
            (
                ThresholdStrategy::Percentile,
                percentile(&sorted, self.config.percentile),
            )
        };
        let value = statistical.max(base_floor).clamp(0.0, 1.0);

        tracing::debug!(
            section_type = %section_type,
            batch = sorted.len(),
            mean,
            std_dev,
            ?strategy,
            statistical,
            base_floor,
            value,
            "threshold selected"
        );

        ThresholdDecision {
            section_type,
            batch_size: sorted.len(),
            mean,
            std_dev,
            strategy,
            statistical: Some(statistical),
            base_floor,
            value,
        }
    }
}

/// Linear-interpolation percentile over an ascending, non-empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
