//! Embedding cache, vector math, and the offline token-hash embedder.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;
use crate::provider::EmbeddingProvider;
use crate::text::tokenize;

/// Cache key: SHA-256 over (model id, text).
pub type ContentKey = [u8; 32];

pub fn content_key(model_id: &str, text: &str) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// Embeddings keyed by content hash.
///
/// Reads are lock-free per shard; inserts are idempotent, so two workers
/// embedding the same text concurrently waste a call but store the same value.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<ContentKey, Arc<[f32]>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str, text: &str) -> Option<Arc<[f32]>> {
        self.entries
            .get(&content_key(model_id, text))
            .map(|v| Arc::clone(v.value()))
    }

    pub fn insert(&self, model_id: &str, text: &str, vector: Arc<[f32]>) {
        self.entries.insert(content_key(model_id, text), vector);
    }

    pub fn get_or_embed(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
    ) -> Result<Arc<[f32]>, ProviderError> {
        let key = content_key(provider.model_id(), text);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }
        let vector = provider.embed(text)?;
        if vector.len() != provider.dimension() {
            return Err(ProviderError::BadResponse(format!(
                "{} returned {} dims, expected {}",
                provider.model_id(),
                vector.len(),
                provider.dimension()
            )));
        }
        let vector: Arc<[f32]> = vector.into();
        self.entries.insert(key, Arc::clone(&vector));
        Ok(vector)
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
}

pub fn normalize_in_place(v: &mut [f32]) {
    let norm2: f32 = v.iter().map(|x| x * x).sum();
    if norm2 <= 0.0 {
        return;
    }
    let inv = 1.0f32 / norm2.sqrt();
    for x in v.iter_mut() {
        *x *= inv;
    }
}

/// Cosine similarity in `[-1, 1]`; `None` on dimension mismatch or a zero vector.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= 0.0 || nb <= 0.0 {
        return None;
    }
    Some((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

/// Deterministic signed feature-hashing embedder.
///
/// Each content token is hashed (FNV-1a 64) into one of `dim` buckets with a
/// sign taken from the high half of the hash; the result is L2-normalized.
/// It needs no model and no network, which makes it the default backend for
/// offline runs and tests.
#[derive(Debug, Clone)]
pub struct TokenHashEmbedder {
    dim: usize,
    model_id: String,
}

impl TokenHashEmbedder {
    pub const DEFAULT_DIM: usize = 256;

    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            model_id: format!("token-hash-v1-{}", dim.max(1)),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for t in tokenize(text) {
            let h = fnv1a64(&t);
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize_in_place(&mut v);
        v
    }
}

impl Default for TokenHashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl EmbeddingProvider for TokenHashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }
}

fn fnv1a64(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut h = OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        inner: TokenHashEmbedder,
    }

    impl EmbeddingProvider for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
    }

    #[test]
    fn cache_avoids_redundant_calls() {
        let provider = CountingEmbedder {
            calls: AtomicUsize::new(0),
            inner: TokenHashEmbedder::new(32),
        };
        let cache = EmbeddingCache::new();
        let a = cache.get_or_embed(&provider, "public safety").unwrap();
        let b = cache.get_or_embed(&provider, "public safety").unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);

        cache.get_or_embed(&provider, "confidentiality").unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        struct Liar;
        impl EmbeddingProvider for Liar {
            fn model_id(&self) -> &str {
                "liar"
            }
            fn dimension(&self) -> usize {
                4
            }
            fn embed(&self, _: &str) -> Result<Vec<f32>, ProviderError> {
                Ok(vec![1.0; 3])
            }
        }
        let cache = EmbeddingCache::new();
        let err = cache.get_or_embed(&Liar, "x").unwrap_err();
        assert!(matches!(err, ProviderError::BadResponse(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn token_hash_is_deterministic_and_normalized() {
        let e = TokenHashEmbedder::new(64);
        let a = e.embed_text("Engineer must report the hazard");
        let b = e.embed_text("Engineer must report the hazard");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_relative_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0);
        assert_relative_eq!(cosine(&[3.0, 4.0], &[6.0, 8.0]).unwrap(), 1.0, epsilon = 1e-9);
    }
}
