//! Coarse nearest-neighbour filter over candidate embeddings.
//!
//! Large pools go through an HNSW graph built over L2-normalized copies of
//! the vectors (for unit vectors L2 order equals cosine order); small pools
//! and pools no larger than the requested set are scanned exactly.

use std::sync::Arc;

use hnsw_rs::prelude::{DistL2, Hnsw};

use crate::config::RetrievalConfig;
use crate::embedding::{cosine, normalize_in_place};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseHit {
    /// Position in the candidate slice.
    pub index: usize,
    pub cosine: f64,
}

/// The `n` candidates most similar to `query`, best first (ties by index).
///
/// Every vector must have the query's dimension; callers check this.
pub fn coarse_top_n(
    query: &[f32],
    vectors: &[Arc<[f32]>],
    n: usize,
    config: &RetrievalConfig,
) -> Vec<CoarseHit> {
    if vectors.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut hits = if vectors.len() <= n || vectors.len() < config.exact_scan_below {
        exact_scan(query, vectors)
    } else {
        hnsw_search(query, vectors, n, config)
    };
    hits.sort_by(|a, b| b.cosine.total_cmp(&a.cosine).then_with(|| a.index.cmp(&b.index)));
    hits.truncate(n);
    hits
}

fn exact_scan(query: &[f32], vectors: &[Arc<[f32]>]) -> Vec<CoarseHit> {
    vectors
        .iter()
        .enumerate()
        .map(|(index, v)| CoarseHit {
            index,
            cosine: cosine(query, v).unwrap_or(-1.0),
        })
        .collect()
}

fn hnsw_search(
    query: &[f32],
    vectors: &[Arc<[f32]>],
    n: usize,
    config: &RetrievalConfig,
) -> Vec<CoarseHit> {
    let nb_elem = vectors.len();
    let max_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
    let hnsw = Hnsw::<f32, DistL2>::new(
        config.hnsw_max_connections,
        nb_elem,
        max_layer,
        config.hnsw_ef_construction,
        DistL2 {},
    );

    let normalized: Vec<Vec<f32>> = vectors
        .iter()
        .map(|v| {
            let mut v = v.to_vec();
            normalize_in_place(&mut v);
            v
        })
        .collect();
    for (i, v) in normalized.iter().enumerate() {
        hnsw.insert((&v[..], i));
    }

    let mut q = query.to_vec();
    normalize_in_place(&mut q);
    let ef_search = config.hnsw_ef_search.max(n);
    hnsw.search(&q, n, ef_search)
        .into_iter()
        .filter(|neighbour| neighbour.d_id < nb_elem)
        .map(|neighbour| CoarseHit {
            index: neighbour.d_id,
            cosine: cosine(query, &vectors[neighbour.d_id]).unwrap_or(-1.0),
        })
        .collect()
}
