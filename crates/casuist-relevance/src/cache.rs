//! Relevance score cache and the engine's cache bundle.
//!
//! Entries are keyed by `(section_id, concept_id)` and stamped with the
//! fingerprints they were computed under. A lookup with a different stamp is
//! a miss, so a re-embedded section, an edited concept, or a changed
//! relationship graph never serves a stale score.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use casuist_ontology::{ConceptId, SectionId};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::calculator::RelevanceScore;
use crate::embedding::EmbeddingCache;

/// Everything a cached score depends on besides its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStamp {
    pub section_hash: String,
    pub concept_hash: String,
    /// Graph revision; only relevant when the structural metric used distances.
    pub graph_revision: u64,
    /// Scorer and scoring-context fingerprint (weights, providers, known set).
    pub context: String,
}

#[derive(Debug, Clone)]
struct CachedScore {
    stamp: CacheStamp,
    score: RelevanceScore,
}

#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: DashMap<(SectionId, ConceptId), CachedScore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section_id: &str, concept_id: &str, stamp: &CacheStamp) -> Option<RelevanceScore> {
        let key = (section_id.to_string(), concept_id.to_string());
        let hit = self
            .entries
            .get(&key)
            .filter(|e| e.stamp == *stamp)
            .map(|e| e.score.clone());
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Upsert. Concurrent writers of the same pair store equal values.
    pub fn insert(&self, stamp: CacheStamp, score: RelevanceScore) {
        let key = (score.section_id.clone(), score.concept_id.clone());
        self.entries.insert(key, CachedScore { stamp, score });
    }

    pub fn invalidate_section(&self, section_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(s, _), _| s != section_id);
        before - self.entries.len()
    }

    pub fn invalidate_concept(&self, concept_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, c), _| c != concept_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Hash an ordered list of string parts into a short fingerprint.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest[..12].iter().map(|b| format!("{b:02x}")).collect()
}

/// The caches an engine reads and writes. Clone shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct EngineCaches {
    pub embeddings: Arc<EmbeddingCache>,
    pub scores: Arc<ScoreCache>,
}

impl EngineCaches {
    pub fn new() -> Self {
        Self::default()
    }
}
