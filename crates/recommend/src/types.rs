use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use locarank_cache::{CacheHitKind, SentimentKeyed};
use locarank_core::{Error, ProductType, Result};

/// A recommendation query with an already-resolved sentiment score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub client_id: String,
    pub product_id: Uuid,
    /// Score in [-1, 1].
    pub sentiment_score: f64,
    pub product_type: ProductType,
    pub top_k: usize,
}

impl RecommendationRequest {
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.sentiment_score) {
            return Err(Error::validation(format!(
                "sentiment score out of [-1, 1]: {}",
                self.sentiment_score
            )));
        }
        if !(1..=100).contains(&self.top_k) {
            return Err(Error::validation(format!("top_k out of [1, 100]: {}", self.top_k)));
        }
        if self.client_id.trim().is_empty() {
            return Err(Error::validation("client_id must not be empty"));
        }
        Ok(())
    }
}

/// One scored recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedProduct {
    pub product_id: Uuid,
    pub product_type: ProductType,
    /// Cosine similarity to the anchor, in [0, 1].
    pub similarity_score: f64,
    /// 1.0 when available, 0.0 otherwise.
    pub availability_score: f64,
    /// Rating normalized to [0, 1].
    pub reputation_score: f64,
    /// Fused score in [0, 1].
    pub final_score: f64,
    /// 1-based position after the descending sort.
    pub rank: usize,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The memoizable outcome of one recommendation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub client_id: String,
    pub reference_product_id: Uuid,
    pub sentiment_score: f64,
    pub product_type: ProductType,
    pub recommendations: Vec<RankedProduct>,
    pub total_results: usize,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_hit_kind: Option<CacheHitKind>,
    pub processed_at: DateTime<Utc>,
}

impl RecommendationResult {
    pub fn empty(request: &RecommendationRequest) -> Self {
        Self {
            client_id: request.client_id.clone(),
            reference_product_id: request.product_id,
            sentiment_score: request.sentiment_score,
            product_type: request.product_type,
            recommendations: Vec::new(),
            total_results: 0,
            cached: false,
            cache_key: None,
            cache_hit_kind: None,
            processed_at: Utc::now(),
        }
    }
}

impl SentimentKeyed for RecommendationResult {
    fn sentiment_score(&self) -> f64 {
        self.sentiment_score
    }
}
