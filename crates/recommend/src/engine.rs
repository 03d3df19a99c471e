//! The recommendation pipeline (Core A): cache probe, anchor fetch, query
//! build, embed, index search, details batch fetch, fusion rank, cache put.
//!
//! The engine holds handles to its collaborators behind seams narrow enough
//! to substitute alternate backends (or test doubles) without rebuilding
//! anything downstream. Cache writes happen only after a successful rank,
//! so an abandoned request can never leave a partial entry behind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use locarank_cache::{CacheRequest, RecommendationCache};
use locarank_core::{ProductDetails, ProductType, Result};
use locarank_embedding::EmbeddingService;
use locarank_index::{SimilarProduct, VectorIndex};
use locarank_repository::SharedRepository;

use crate::ranker::Ranker;
use crate::types::{RecommendationRequest, RecommendationResult};

/// Text-to-vector seam.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn health_check(&self) -> bool;
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        EmbeddingService::encode(self, text).await
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        EmbeddingService::encode_batch(self, texts).await
    }

    async fn health_check(&self) -> bool {
        EmbeddingService::health_check(self).await
    }
}

/// Nearest-neighbor search seam.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        product_type: ProductType,
        query_vector: Vec<f32>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SimilarProduct>>;

    async fn health_check(&self) -> bool;
}

#[async_trait]
impl VectorSearch for VectorIndex {
    async fn search(
        &self,
        product_type: ProductType,
        query_vector: Vec<f32>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SimilarProduct>> {
        VectorIndex::search(self, product_type, query_vector, top_k, score_threshold).await
    }

    async fn health_check(&self) -> bool {
        VectorIndex::health_check(self).await
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineHealth {
    pub cache: bool,
    pub embeddings: bool,
    pub vectors: bool,
    pub repository: bool,
}

impl EngineHealth {
    pub fn all_healthy(&self) -> bool {
        self.cache && self.embeddings && self.vectors && self.repository
    }
}

#[derive(Clone)]
pub struct RecommendationEngine {
    cache: Arc<RecommendationCache>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorSearch>,
    repository: SharedRepository,
    ranker: Ranker,
}

impl RecommendationEngine {
    pub fn new(
        cache: Arc<RecommendationCache>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorSearch>,
        repository: SharedRepository,
        ranker: Ranker,
    ) -> Self {
        Self { cache, embedder, index, repository, ranker }
    }

    pub fn cache(&self) -> &Arc<RecommendationCache> {
        &self.cache
    }

    /// Run the full pipeline for one request.
    pub async fn recommend(&self, request: &RecommendationRequest) -> Result<RecommendationResult> {
        request.validate()?;
        info!(
            product_id = %request.product_id,
            client_id = %request.client_id,
            sentiment = request.sentiment_score,
            "processing recommendation"
        );

        let cache_request = CacheRequest {
            product_type: request.product_type,
            product_id: request.product_id,
            client_id: request.client_id.clone(),
            sentiment_score: request.sentiment_score,
        };

        // Stage 1: tolerance-aware cache probe before any expensive work.
        if let Some(hit) = self.cache.get::<RecommendationResult>(&cache_request).await {
            let mut result = hit.value;
            result.cached = true;
            result.cache_key = Some(hit.key);
            result.cache_hit_kind = Some(hit.kind);
            info!(kind = ?hit.kind, "returning cached recommendation");
            return Ok(result);
        }

        // Stage 2: anchor fetch. A missing anchor degrades to an empty
        // result rather than an error.
        let Some(anchor) = self.repository.get_vehicle(request.product_id).await? else {
            warn!(product_id = %request.product_id, "anchor product not found");
            return Ok(RecommendationResult::empty(request));
        };

        // Stages 3–4: canonical description, one embedding call.
        let description = anchor.description();
        let query_vector = self.embedder.encode(&description).await?;

        // Stage 5: over-fetch, exclude the anchor, truncate. An index outage
        // degrades to an empty candidate set.
        let mut similar = match self
            .index
            .search(request.product_type, query_vector, request.top_k * 2, 0.0)
            .await
        {
            Ok(similar) => similar,
            Err(e) => {
                warn!(error = %e, "vector search unavailable; returning empty result");
                Vec::new()
            }
        };
        similar.retain(|candidate| candidate.product_id != request.product_id);
        similar.truncate(request.top_k);

        if similar.is_empty() {
            info!("no similar products found");
            return Ok(RecommendationResult::empty(request));
        }

        // Stage 6: details batch fetch.
        let candidate_ids: Vec<Uuid> = similar.iter().map(|c| c.product_id).collect();
        let records = self.repository.get_vehicles(&candidate_ids).await?;
        let details: HashMap<Uuid, ProductDetails> = records
            .iter()
            .map(|record| (record.id, ProductDetails::from_vehicle(record)))
            .collect();

        // Stage 7: fusion rank.
        let ranked = self.ranker.rank(&similar, &details, request.product_type);

        let result = RecommendationResult {
            client_id: request.client_id.clone(),
            reference_product_id: request.product_id,
            sentiment_score: request.sentiment_score,
            product_type: request.product_type,
            total_results: ranked.len(),
            recommendations: ranked,
            cached: false,
            cache_key: None,
            cache_hit_kind: None,
            processed_at: Utc::now(),
        };

        // Stage 8: dual-key cache put, only after a successful rank.
        self.cache.put(&cache_request, &result).await;

        info!(results = result.total_results, "recommendation complete");
        Ok(result)
    }

    /// Probe every collaborator once. Touches the embedding model, which
    /// triggers its lazy load.
    pub async fn health_check(&self) -> EngineHealth {
        EngineHealth {
            cache: self.cache.health_check().await,
            embeddings: self.embedder.health_check().await,
            vectors: self.index.health_check().await,
            repository: self.repository.health_check().await,
        }
    }

    /// Probe only the storage backends. Readiness checks use this so they
    /// never force a model load; the first real request pays that cost.
    pub async fn backend_health(&self) -> EngineHealth {
        EngineHealth {
            cache: self.cache.health_check().await,
            embeddings: true,
            vectors: self.index.health_check().await,
            repository: self.repository.health_check().await,
        }
    }
}
