//! Task kinds, their queue routing, and the production handler that
//! executes them against the engine handles.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use locarank_core::{ProductType, Result};
use locarank_embedding::EmbeddingService;
use locarank_index::{IndexPoint, VectorIndex};
use locarank_recommend::{RecommendationEngine, RecommendationRequest};
use locarank_repository::SharedRepository;
use locarank_sentiment::{SentimentInput, SentimentService};

use crate::runner::TaskHandler;

/// Named queues consumed by the worker pool. FIFO within a queue; nothing
/// is promised across queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Recommendations,
    Sentiment,
    Vectorization,
    Default,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Recommendations,
        QueueName::Sentiment,
        QueueName::Vectorization,
        QueueName::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recommendations => "recommendations",
            Self::Sentiment => "sentiment",
            Self::Vectorization => "vectorization",
            Self::Default => "default",
        }
    }
}

/// One unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskKind {
    /// Sentiment analysis followed by recommendation, as one job.
    FullWorkflow {
        product_id: Uuid,
        client_id: String,
        comment: String,
        product_type: ProductType,
        top_k: usize,
    },
    /// Recommendation with a pre-computed sentiment score.
    Recommendation { request: RecommendationRequest },
    /// Standalone sentiment analysis.
    Sentiment {
        product_id: String,
        client_id: String,
        comment: String,
        product_type: Option<ProductType>,
    },
    /// Rebuild (or extend) a product type's vector collection.
    Vectorize {
        product_type: ProductType,
        batch_size: usize,
        recreate: bool,
    },
    /// Periodic service probe.
    HealthCheck,
}

impl TaskKind {
    pub fn queue(&self) -> QueueName {
        match self {
            Self::FullWorkflow { .. } | Self::Recommendation { .. } => QueueName::Recommendations,
            Self::Sentiment { .. } => QueueName::Sentiment,
            Self::Vectorize { .. } => QueueName::Vectorization,
            Self::HealthCheck => QueueName::Default,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FullWorkflow { .. } => "full_workflow",
            Self::Recommendation { .. } => "recommendation",
            Self::Sentiment { .. } => "sentiment",
            Self::Vectorize { .. } => "vectorize",
            Self::HealthCheck => "health_check",
        }
    }
}

/// Outcome of a vectorization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizeReport {
    pub product_type: ProductType,
    pub total_products: usize,
    pub total_vectors: usize,
}

/// Embed every repository record of a product type and upsert the vectors,
/// in batches. With `recreate` the collection is dropped first, which makes
/// the run reproducible; without it the operation is a plain upsert.
pub async fn vectorize_products(
    repository: &SharedRepository,
    embedder: &EmbeddingService,
    index: &VectorIndex,
    product_type: ProductType,
    batch_size: usize,
    recreate: bool,
) -> Result<VectorizeReport> {
    let records = repository.list_vehicles().await?;
    info!(
        product_type = %product_type,
        products = records.len(),
        recreate,
        "vectorization started"
    );

    index.ensure_collection(product_type, recreate).await?;

    let batch_size = batch_size.max(1);
    let mut total_vectors = 0;
    for batch in records.chunks(batch_size) {
        let descriptions: Vec<String> = batch.iter().map(|r| r.description()).collect();
        let vectors = embedder.encode_batch(&descriptions).await?;

        let points: Vec<IndexPoint> = batch
            .iter()
            .zip(vectors)
            .map(|(record, vector)| {
                let mut hints = record.metadata();
                hints.insert("available".to_string(), serde_json::json!(record.available));
                if let Some(location) = &record.location {
                    hints.insert("location".to_string(), serde_json::json!(location));
                }
                hints.insert("rating".to_string(), serde_json::json!(record.average_rating));
                IndexPoint { real_product_id: record.id, vector, hints }
            })
            .collect();

        total_vectors += index.upsert_batch(product_type, points).await?.len();
        info!(total_vectors, "vectorization batch complete");
    }

    Ok(VectorizeReport { product_type, total_products: records.len(), total_vectors })
}

/// Production task handler wired with the real engine handles.
pub struct WorkflowHandler {
    pub engine: RecommendationEngine,
    pub sentiment: SentimentService,
    pub embedder: EmbeddingService,
    pub index: VectorIndex,
    pub repository: SharedRepository,
}

#[async_trait::async_trait]
impl TaskHandler for WorkflowHandler {
    async fn execute(&self, kind: &TaskKind) -> Result<serde_json::Value> {
        match kind {
            TaskKind::FullWorkflow { product_id, client_id, comment, product_type, top_k } => {
                let sentiment = self
                    .sentiment
                    .analyze(SentimentInput {
                        product_id: product_id.to_string(),
                        client_id: client_id.clone(),
                        comment: comment.clone(),
                        product_type: Some(*product_type),
                    })
                    .await;

                let request = RecommendationRequest {
                    client_id: client_id.clone(),
                    product_id: *product_id,
                    sentiment_score: sentiment.sentiment_score,
                    product_type: *product_type,
                    top_k: *top_k,
                };
                let recommendations = self.engine.recommend(&request).await?;

                Ok(serde_json::json!({
                    "sentiment": sentiment,
                    "recommendations": recommendations,
                }))
            }
            TaskKind::Recommendation { request } => {
                let result = self.engine.recommend(request).await?;
                Ok(serde_json::to_value(result).unwrap_or_default())
            }
            TaskKind::Sentiment { product_id, client_id, comment, product_type } => {
                let result = self
                    .sentiment
                    .analyze(SentimentInput {
                        product_id: product_id.clone(),
                        client_id: client_id.clone(),
                        comment: comment.clone(),
                        product_type: *product_type,
                    })
                    .await;
                Ok(serde_json::to_value(result).unwrap_or_default())
            }
            TaskKind::Vectorize { product_type, batch_size, recreate } => {
                let report = vectorize_products(
                    &self.repository,
                    &self.embedder,
                    &self.index,
                    *product_type,
                    *batch_size,
                    *recreate,
                )
                .await?;
                Ok(serde_json::to_value(report).unwrap_or_default())
            }
            TaskKind::HealthCheck => {
                let engine = self.engine.health_check().await;
                let sentiment = self.sentiment.health_check().await;
                let healthy = engine.all_healthy() && sentiment;
                Ok(serde_json::json!({
                    "healthy": healthy,
                    "services": {
                        "cache": engine.cache,
                        "embeddings": engine.embeddings,
                        "vectors": engine.vectors,
                        "repository": engine.repository,
                        "sentiment": sentiment,
                    },
                }))
            }
        }
    }
}
