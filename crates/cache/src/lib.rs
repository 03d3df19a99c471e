//! Fingerprinted, TTL-scoped, tolerance-aware recommendation memo.
//!
//! A request fingerprint hashes (product_type, product_id, client_id,
//! τ-bucketed sentiment score) so near-identical sentiments reuse prior
//! work. Lookups try three modes in order: exact fingerprint, fuzzy
//! fingerprints with the bucket shifted ±τ, then a product-level key shared
//! across clients that only hits when the cached sentiment is within τ of
//! the request.
//!
//! Every operation tolerates backend unavailability: gets degrade to a miss,
//! puts to a best-effort false. A stale read within TTL after a concurrent
//! invalidation is acceptable.

mod backend;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use locarank_core::ProductType;

pub use backend::{CacheBackend, MemoryBackend};

const RECOMMENDATION_PREFIX: &str = "rec";
const PRODUCT_PREFIX: &str = "prod";

/// Stored values must expose the sentiment score they were computed for, so
/// the product-level lookup can apply the tolerance check.
pub trait SentimentKeyed {
    fn sentiment_score(&self) -> f64;
}

/// Which lookup mode produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHitKind {
    Exact,
    Fuzzy,
    Product,
}

#[derive(Debug, Clone)]
pub struct CacheHit<T> {
    pub value: T,
    pub key: String,
    pub kind: CacheHitKind,
}

/// Identity of a memoizable recommendation request.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub product_type: ProductType,
    pub product_id: Uuid,
    pub client_id: String,
    pub sentiment_score: f64,
}

/// Snapshot of hit/miss counters since startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_pct: f32,
}

/// Quantize a score to the nearest multiple of `tolerance`.
pub fn bucket(score: f64, tolerance: f64) -> f64 {
    (score / tolerance).round() * tolerance
}

pub struct RecommendationCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    tolerance: f64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecommendationCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl_seconds: u64, tolerance: f64) -> Self {
        Self {
            backend,
            ttl: Duration::from_secs(ttl_seconds),
            tolerance,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Fingerprint key: first 16 hex chars of the MD5 of the canonical
    /// string, to bound key size. Collisions at this length are negligible
    /// for the workload.
    fn fingerprint_key(&self, request: &CacheRequest, score: f64) -> String {
        let score_bucket = bucket(score, self.tolerance);
        let canonical = format!(
            "{}:{}:{}:{:.2}",
            request.product_type, request.product_id, request.client_id, score_bucket
        );
        let digest = format!("{:x}", md5::compute(canonical.as_bytes()));
        format!("{RECOMMENDATION_PREFIX}:{}:{}", request.product_type, &digest[..16])
    }

    fn product_key(&self, product_type: ProductType, product_id: Uuid) -> String {
        format!("{PRODUCT_PREFIX}:{product_type}:{product_id}")
    }

    /// Look up a memoized result, trying exact, fuzzy, then product-level
    /// keys. Backend failures read as a miss.
    pub async fn get<T>(&self, request: &CacheRequest) -> Option<CacheHit<T>>
    where
        T: DeserializeOwned + SentimentKeyed,
    {
        // Exact fingerprint.
        let exact_key = self.fingerprint_key(request, request.sentiment_score);
        if let Some(value) = self.fetch::<T>(&exact_key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            info!(key = %exact_key, kind = "exact", "cache hit");
            return Some(CacheHit { value, key: exact_key, kind: CacheHitKind::Exact });
        }

        // Fuzzy: bucket shifted by ±τ, staying within the score domain.
        for delta in [-self.tolerance, self.tolerance] {
            let nearby = request.sentiment_score + delta;
            if !(-1.0..=1.0).contains(&nearby) {
                continue;
            }
            let fuzzy_key = self.fingerprint_key(request, nearby);
            if fuzzy_key == exact_key {
                continue;
            }
            if let Some(value) = self.fetch::<T>(&fuzzy_key).await {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(key = %fuzzy_key, kind = "fuzzy", delta, "cache hit");
                return Some(CacheHit { value, key: fuzzy_key, kind: CacheHitKind::Fuzzy });
            }
        }

        // Product-level: most recent result for this product regardless of
        // client, accepted only within the sentiment tolerance.
        let product_key = self.product_key(request.product_type, request.product_id);
        if let Some(value) = self.fetch::<T>(&product_key).await {
            if (value.sentiment_score() - request.sentiment_score).abs() <= self.tolerance {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(key = %product_key, kind = "product", "cache hit");
                return Some(CacheHit { value, key: product_key, kind: CacheHitKind::Product });
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(product_id = %request.product_id, "cache miss");
        None
    }

    /// Store a result under both the specific fingerprint and the
    /// product-level key. Best-effort: returns false on backend failure.
    pub async fn put<T>(&self, request: &CacheRequest, value: &T) -> bool
    where
        T: Serialize,
    {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize cache value");
                return false;
            }
        };

        let specific_key = self.fingerprint_key(request, request.sentiment_score);
        let product_key = self.product_key(request.product_type, request.product_id);

        let specific = self.backend.set_ex(&specific_key, serialized.clone(), self.ttl).await;
        let product = self.backend.set_ex(&product_key, serialized, self.ttl).await;

        match (specific, product) {
            (Ok(()), Ok(())) => {
                debug!(key = %specific_key, ttl_seconds = self.ttl.as_secs(), "cache store complete");
                true
            }
            (specific, product) => {
                if let Err(e) = specific.and(product) {
                    warn!(error = %e, "cache store failed");
                }
                false
            }
        }
    }

    /// Drop all recommendation keys for the product type plus the product's
    /// own key. Returns the number of deleted keys; backend failure reads
    /// as zero.
    pub async fn invalidate(
        &self,
        product_id: Uuid,
        product_type: ProductType,
        _client_id: Option<&str>,
    ) -> usize {
        let prefix = format!("{RECOMMENDATION_PREFIX}:{product_type}:");
        let mut deleted = 0;

        match self.backend.scan_prefix(&prefix).await {
            Ok(keys) => {
                for key in keys {
                    if matches!(self.backend.delete(&key).await, Ok(true)) {
                        deleted += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "cache invalidation scan failed");
                return 0;
            }
        }

        let product_key = self.product_key(product_type, product_id);
        if matches!(self.backend.delete(&product_key).await, Ok(true)) {
            deleted += 1;
        }

        info!(product_id = %product_id, deleted, "cache invalidation complete");
        deleted
    }

    pub async fn health_check(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache health check failed");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate_pct: if total == 0 { 0.0 } else { (hits as f32 / total as f32) * 100.0 },
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "cache entry failed to deserialize; treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache lookup failed; treating as miss");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Memo {
        sentiment: f64,
        payload: String,
    }

    impl SentimentKeyed for Memo {
        fn sentiment_score(&self) -> f64 {
            self.sentiment
        }
    }

    fn cache() -> RecommendationCache {
        RecommendationCache::new(Arc::new(MemoryBackend::new(64)), 3600, 0.1)
    }

    fn request(product_id: Uuid, client: &str, score: f64) -> CacheRequest {
        CacheRequest {
            product_type: ProductType::Vehicle,
            product_id,
            client_id: client.to_string(),
            sentiment_score: score,
        }
    }

    #[test]
    fn bucket_rounds_to_tolerance_multiples() {
        assert!((bucket(0.72, 0.1) - 0.7).abs() < 1e-9);
        assert!((bucket(0.76, 0.1) - 0.8).abs() < 1e-9);
        assert!((bucket(-0.34, 0.1) + 0.3).abs() < 1e-9);
    }

    #[test]
    fn bucket_is_idempotent_across_the_score_domain() {
        let tolerance = 0.1;
        let mut s = -1.0;
        while s <= 1.0 {
            let once = bucket(s, tolerance);
            let twice = bucket(once, tolerance);
            assert!((once - twice).abs() < 1e-9, "s={s}");
            s += 0.013;
        }
    }

    #[test]
    fn fingerprint_keys_are_bounded_and_stable() {
        let cache = cache();
        let req = request(Uuid::nil(), "client-1", 0.7);
        let key = cache.fingerprint_key(&req, req.sentiment_score);
        assert!(key.starts_with("rec:vehicle:"));
        // Prefix + 16-hex-char hash.
        assert_eq!(key.len(), "rec:vehicle:".len() + 16);
        assert_eq!(key, cache.fingerprint_key(&req, 0.7));
    }

    #[tokio::test]
    async fn exact_hit_after_put() {
        let cache = cache();
        let req = request(Uuid::new_v4(), "c1", 0.7);
        let memo = Memo { sentiment: 0.7, payload: "ranked".to_string() };

        assert!(cache.put(&req, &memo).await);
        let hit = cache.get::<Memo>(&req).await.unwrap();
        assert_eq!(hit.kind, CacheHitKind::Exact);
        assert_eq!(hit.value, memo);
    }

    #[tokio::test]
    async fn nearby_score_hits_exact_or_fuzzy() {
        let cache = cache();
        let product = Uuid::new_v4();
        let seed = request(product, "c1", 0.70);
        let memo = Memo { sentiment: 0.70, payload: "seeded".to_string() };
        cache.put(&seed, &memo).await;

        // 0.72 buckets to 0.7: exact. 0.78 buckets to 0.8: fuzzy via -τ.
        let near = cache.get::<Memo>(&request(product, "c1", 0.72)).await.unwrap();
        assert!(matches!(near.kind, CacheHitKind::Exact | CacheHitKind::Fuzzy));

        let shifted = cache.get::<Memo>(&request(product, "c1", 0.78)).await.unwrap();
        assert_eq!(shifted.kind, CacheHitKind::Fuzzy);
        assert_eq!(shifted.value, memo);
    }

    #[tokio::test]
    async fn other_client_hits_product_level_within_tolerance() {
        let cache = cache();
        let product = Uuid::new_v4();
        cache
            .put(&request(product, "c1", 0.5), &Memo { sentiment: 0.5, payload: "x".to_string() })
            .await;

        let other = cache.get::<Memo>(&request(product, "c2", 0.55)).await.unwrap();
        assert_eq!(other.kind, CacheHitKind::Product);

        // Outside tolerance the product-level entry must not hit.
        assert!(cache.get::<Memo>(&request(product, "c2", 0.9)).await.is_none());
    }

    #[tokio::test]
    async fn far_score_for_same_client_misses() {
        let cache = cache();
        let product = Uuid::new_v4();
        cache
            .put(&request(product, "c1", -0.8), &Memo { sentiment: -0.8, payload: "x".to_string() })
            .await;

        assert!(cache.get::<Memo>(&request(product, "c1", 0.4)).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_then_get_misses() {
        let cache = cache();
        let product = Uuid::new_v4();
        let req = request(product, "c1", 0.3);
        cache.put(&req, &Memo { sentiment: 0.3, payload: "x".to_string() }).await;

        let deleted = cache.invalidate(product, ProductType::Vehicle, None).await;
        assert_eq!(deleted, 2); // fingerprint + product key

        assert!(cache.get::<Memo>(&req).await.is_none());
    }

    #[tokio::test]
    async fn fuzzy_probe_never_leaves_score_domain() {
        let cache = cache();
        let product = Uuid::new_v4();
        // A request at the domain edge: the +τ probe would be 1.1 and must
        // be skipped rather than generating an out-of-range bucket.
        cache
            .put(&request(product, "c1", 1.0), &Memo { sentiment: 1.0, payload: "x".to_string() })
            .await;
        let hit = cache.get::<Memo>(&request(product, "c1", 1.0)).await.unwrap();
        assert_eq!(hit.kind, CacheHitKind::Exact);
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = cache();
        let product = Uuid::new_v4();
        let req = request(product, "c1", 0.0);

        assert!(cache.get::<Memo>(&req).await.is_none());
        cache.put(&req, &Memo { sentiment: 0.0, payload: "x".to_string() }).await;
        assert!(cache.get::<Memo>(&req).await.is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_pct - 50.0).abs() < f32::EPSILON);
    }
}
