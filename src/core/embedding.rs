//! Embedding providers
//!
//! An embedding provider turns text into a fixed-length vector. A missing
//! vector is a normal outcome: callers store `None` and retrieval falls back
//! to keywords.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use xxhash_rust::xxh64::xxh64;

use super::text::tokens;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`. `Ok(None)` means the provider has no vector to offer.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Ask `provider` for a vector, bounded by `timeout`.
///
/// Errors and timeouts are logged and reported as `None`.
pub async fn embed_or_none(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Option<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(Ok(Some(v))) if !v.is_empty() && v.iter().all(|x| x.is_finite()) => Some(v),
        Ok(Ok(Some(_))) => {
            tracing::warn!(provider = provider.name(), "embedding rejected: empty or non-finite vector");
            None
        }
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            tracing::warn!(provider = provider.name(), error = %e, "embedding failed, storing without vector");
            None
        }
        Err(_) => {
            tracing::warn!(provider = provider.name(), ?timeout, "embedding timed out, storing without vector");
            None
        }
    }
}

/// Provider used when no embedding service is configured
#[derive(Debug, Default, Clone)]
pub struct NoEmbeddings;

#[async_trait]
impl EmbeddingProvider for NoEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

const HASH_SEED: u64 = 0;

/// Offline provider: feature-hashes words and word bigrams into a fixed
/// number of dimensions, then L2-normalizes.
///
/// Only lexical overlap is captured. Same text always gives the same vector,
/// across builds and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        // Fixed algorithm and seed: vectors stored by one build must match
        // query vectors computed by the next
        let hash = xxh64(feature.as_bytes(), HASH_SEED);
        let index = (hash % self.dimension as u64) as usize;
        // Sign bit spreads collisions around zero
        let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
        (index, sign)
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let words = tokens(text);
        let mut embedding = vec![0.0f32; self.dimension];

        for word in &words {
            let (i, sign) = self.bucket(word);
            embedding[i] += sign;
        }
        for pair in words.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            embedding[i] += 0.5 * sign;
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let v = self.embed_sync(text);
        if v.iter().all(|x| *x == 0.0) {
            // Nothing to hash (punctuation only)
            return Ok(None);
        }
        Ok(Some(v))
    }

    fn name(&self) -> &str {
        "local-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::similarity::cosine_similarity;

    struct Failing;

    #[async_trait]
    impl EmbeddingProvider for Failing {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            anyhow::bail!("service unavailable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct Slow;

    #[async_trait]
    impl EmbeddingProvider for Slow {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(vec![1.0]))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_sync("We ship from Leeds");
        let b = e.embed_sync("We ship from Leeds");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_buckets_are_pinned() {
        // Reference value: xxh64("", 0) = 0xEF46DB3751D8E999
        let (index, sign) = HashingEmbedder::new(64).bucket("");
        assert_eq!(index, 25);
        assert_eq!(sign, -1.0);
    }

    #[test]
    fn test_hashing_prefers_overlapping_text() {
        let e = HashingEmbedder::default();
        let q = e.embed_sync("launch date");
        let close = e.embed_sync("The launch date is March 22");
        let far = e.embed_sync("Payroll runs every Friday");
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn test_hashing_punctuation_only_is_none() -> Result<()> {
        assert!(HashingEmbedder::default().embed("?!").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_becomes_none() {
        let v = embed_or_none(&Failing, "x", Duration::from_secs(1)).await;
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_none() {
        let v = embed_or_none(&Slow, "x", Duration::from_millis(20)).await;
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn test_no_embeddings() {
        assert!(embed_or_none(&NoEmbeddings, "x", Duration::from_secs(1)).await.is_none());
    }
}
