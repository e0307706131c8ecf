//! TermIndex: document-frequency statistics for lexical overlap scoring.
//!
//! Overlap between two texts is the weighted Jaccard (Ruzicka) similarity of
//! their TF-IDF vectors:
//!
//! ```text
//! overlap(a, b) = Σ_t min(wa(t), wb(t)) / Σ_t max(wa(t), wb(t))
//! w(t)          = tf(t) / |tokens| * idf(t)
//! idf(t)        = ln((N + 1) / (df(t) + 1)) + 1
//! ```
//!
//! The smoothed idf keeps terms that never appeared in the corpus at full
//! weight instead of dividing by zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::text::tokenize;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermIndex {
    documents: usize,
    document_frequency: HashMap<String, usize>,
}

impl TermIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<'a>(corpus: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::new();
        for doc in corpus {
            index.add_document(doc);
        }
        index
    }

    pub fn add_document(&mut self, text: &str) {
        let mut tokens = tokenize(text);
        tokens.sort_unstable();
        tokens.dedup();
        for t in tokens {
            *self.document_frequency.entry(t).or_insert(0) += 1;
        }
        self.documents += 1;
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn idf(&self, term: &str) -> f64 {
        let df = self.document_frequency.get(term).copied().unwrap_or(0);
        ((self.documents as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
    }

    pub fn tfidf(&self, text: &str) -> HashMap<String, f64> {
        let tokens = tokenize(text);
        let total = tokens.len() as f64;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for t in tokens {
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(t, n)| {
                let w = n as f64 / total * self.idf(&t);
                (t, w)
            })
            .collect()
    }

    /// TF-IDF weighted Jaccard similarity in `[0, 1]`; `None` when either side
    /// has no content tokens (the metric is unavailable, not zero).
    pub fn weighted_jaccard(&self, a: &str, b: &str) -> Option<f64> {
        let wa = self.tfidf(a);
        let wb = self.tfidf(b);
        if wa.is_empty() || wb.is_empty() {
            return None;
        }
        let mut num = 0.0;
        let mut den = 0.0;
        for (t, &x) in &wa {
            let y = wb.get(t).copied().unwrap_or(0.0);
            num += x.min(y);
            den += x.max(y);
        }
        for (t, &y) in &wb {
            if !wa.contains_key(t) {
                den += y;
            }
        }
        if den <= 0.0 {
            return None;
        }
        Some((num / den).clamp(0.0, 1.0))
    }
}
