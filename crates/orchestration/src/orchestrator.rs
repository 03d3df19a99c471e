//! Orchestrator: owns the sentiment → recommendation fan-in, dispatches the
//! same logical jobs to the worker pool, and fronts cache invalidation and
//! health checks.

use std::time::Instant;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use locarank_core::{ProductType, Result, SentimentResult};
use locarank_recommend::{RecommendationEngine, RecommendationRequest, RecommendationResult};
use locarank_sentiment::{SentimentInput, SentimentService};

use crate::runner::{HealthSnapshot, RevokeOutcome, TaskRunner, TaskView};
use crate::tasks::TaskKind;

/// Combined outcome of the two-stage synchronous workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub status: String,
    pub processing_time_seconds: f64,
    pub sentiment: SentimentResult,
    pub recommendations: RecommendationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorHealth {
    pub healthy: bool,
    pub cache: bool,
    pub embeddings: bool,
    pub vectors: bool,
    pub repository: bool,
    pub sentiment: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    engine: RecommendationEngine,
    sentiment: SentimentService,
    runner: TaskRunner,
}

impl Orchestrator {
    pub fn new(engine: RecommendationEngine, sentiment: SentimentService, runner: TaskRunner) -> Self {
        Self { engine, sentiment, runner }
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn sentiment(&self) -> &SentimentService {
        &self.sentiment
    }

    /// Two-stage fan-in: classify the comment, then recommend with the
    /// resulting score. One call serves the whole HTTP request.
    pub async fn process_workflow(
        &self,
        product_id: Uuid,
        client_id: &str,
        comment: &str,
        product_type: ProductType,
        top_k: usize,
    ) -> Result<WorkflowOutcome> {
        let started = Instant::now();
        info!(product_id = %product_id, client_id, "processing full workflow");

        let sentiment = self
            .sentiment
            .analyze(SentimentInput {
                product_id: product_id.to_string(),
                client_id: client_id.to_string(),
                comment: comment.to_string(),
                product_type: Some(product_type),
            })
            .await;
        info!(score = sentiment.sentiment_score, "sentiment stage complete");

        let request = RecommendationRequest {
            client_id: client_id.to_string(),
            product_id,
            sentiment_score: sentiment.sentiment_score,
            product_type,
            top_k,
        };
        let recommendations = self.engine.recommend(&request).await?;

        Ok(WorkflowOutcome {
            status: "completed".to_string(),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            sentiment,
            recommendations,
        })
    }

    /// Recommendation stage alone, with a pre-computed sentiment score.
    pub async fn process_direct(&self, request: &RecommendationRequest) -> Result<RecommendationResult> {
        self.engine.recommend(request).await
    }

    /// Enqueue the same logical job for background execution.
    pub async fn submit(&self, kind: TaskKind) -> Uuid {
        self.runner.submit(kind).await
    }

    pub async fn task_status(&self, task_id: Uuid) -> Option<TaskView> {
        self.runner.status(task_id).await
    }

    pub async fn cancel(&self, task_id: Uuid) -> RevokeOutcome {
        self.runner.revoke(task_id).await
    }

    /// Drop cached recommendations for a product.
    pub async fn invalidate(&self, product_id: Uuid, product_type: ProductType) -> usize {
        self.engine.cache().invalidate(product_id, product_type, None).await
    }

    /// Probe every service now. Use from async contexts only; workers and
    /// readiness endpoints that must not block use [`health_snapshot`].
    ///
    /// [`health_snapshot`]: Self::health_snapshot
    pub async fn health_check(&self) -> OrchestratorHealth {
        let engine = self.engine.health_check().await;
        let sentiment = self.sentiment.health_check().await;
        OrchestratorHealth {
            healthy: engine.all_healthy() && sentiment,
            cache: engine.cache,
            embeddings: engine.embeddings,
            vectors: engine.vectors,
            repository: engine.repository,
            sentiment,
        }
    }

    /// Storage-backend probe that never forces a model load; suitable for
    /// readiness endpoints.
    pub async fn backend_health(&self) -> bool {
        self.engine.backend_health().await.all_healthy()
    }

    /// Latest periodic probe outcome, read synchronously from the runner's
    /// watch channel. Never spins up work of its own.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.runner.health_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use locarank_cache::{MemoryBackend, RecommendationCache};
    use locarank_config::TaskConfig;
    use locarank_core::{TaskStatus, VehicleRecord};
    use locarank_index::SimilarProduct;
    use locarank_recommend::{Embedder, Ranker, VectorSearch};
    use locarank_repository::MemoryRepository;
    use std::fs;
    use std::sync::Arc;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }

        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct StubIndex {
        results: Vec<SimilarProduct>,
    }

    #[async_trait]
    impl VectorSearch for StubIndex {
        async fn search(
            &self,
            _product_type: ProductType,
            _query_vector: Vec<f32>,
            _top_k: usize,
            _score_threshold: f32,
        ) -> Result<Vec<SimilarProduct>> {
            Ok(self.results.clone())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl crate::runner::TaskHandler for EchoHandler {
        async fn execute(&self, kind: &TaskKind) -> Result<serde_json::Value> {
            match kind {
                TaskKind::HealthCheck => Ok(serde_json::json!({ "healthy": true })),
                other => Ok(serde_json::json!({ "echo": other.name() })),
            }
        }
    }

    fn vehicle(id: Uuid) -> VehicleRecord {
        VehicleRecord {
            id,
            brand: Some("Citroën".to_string()),
            model: Some("C3".to_string()),
            year: Some(2020),
            vehicle_type: Some("citadine".to_string()),
            transmission: Some("manual".to_string()),
            fuel_type: Some("essence".to_string()),
            seats: Some(5),
            luggage_capacity_l: Some(300.0),
            location: Some("Paris".to_string()),
            daily_price: Some(35.0),
            available: true,
            average_rating: 4.0,
            rental_count: 3,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    async fn orchestrator(anchor: Uuid, other: Uuid) -> Orchestrator {
        let repo = MemoryRepository::new();
        repo.insert(vehicle(anchor)).await;
        repo.insert(vehicle(other)).await;

        let engine = RecommendationEngine::new(
            Arc::new(RecommendationCache::new(Arc::new(MemoryBackend::new(64)), 3600, 0.1)),
            Arc::new(FixedEmbedder),
            Arc::new(StubIndex {
                results: vec![SimilarProduct {
                    product_id: other,
                    similarity: 0.8,
                    vector_id: "v1".to_string(),
                }],
            }),
            Arc::new(repo),
            Ranker::new(0.6, 0.25, 0.15).unwrap(),
        );

        // A checkpoint directory with garbage files: the sentiment load
        // fails locally and every analysis degrades to neutral.
        let dir = tempfile::tempdir().unwrap();
        for name in ["config.json", "tokenizer.json", "model.safetensors"] {
            fs::write(dir.path().join(name), "garbage").unwrap();
        }
        let sentiment = SentimentService::new(dir.path());

        let runner = TaskRunner::start(Arc::new(EchoHandler), TaskConfig::default());
        Orchestrator::new(engine, sentiment, runner)
    }

    #[tokio::test]
    async fn workflow_chains_sentiment_into_recommendation() {
        let anchor = Uuid::new_v4();
        let other = Uuid::new_v4();
        let orchestrator = orchestrator(anchor, other).await;

        let outcome = orchestrator
            .process_workflow(anchor, "client-1", "Excellent service", ProductType::Vehicle, 10)
            .await
            .unwrap();

        assert_eq!(outcome.status, "completed");
        // Neutral sentiment from the degraded model still drives a
        // recommendation pass.
        assert_eq!(outcome.recommendations.sentiment_score, outcome.sentiment.sentiment_score);
        assert_eq!(outcome.recommendations.total_results, 1);
        assert_eq!(outcome.recommendations.recommendations[0].product_id, other);
    }

    #[tokio::test]
    async fn submitted_task_becomes_queryable_and_finishes() {
        let orchestrator = orchestrator(Uuid::new_v4(), Uuid::new_v4()).await;
        let task_id = orchestrator.submit(TaskKind::HealthCheck).await;

        let mut last = None;
        for _ in 0..100 {
            last = orchestrator.task_status(task_id).await;
            if last.as_ref().is_some_and(|v| v.ready) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let view = last.unwrap();
        assert_eq!(view.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn invalidate_clears_cached_results() {
        let anchor = Uuid::new_v4();
        let other = Uuid::new_v4();
        let orchestrator = orchestrator(anchor, other).await;

        let request = RecommendationRequest {
            client_id: "c1".to_string(),
            product_id: anchor,
            sentiment_score: 0.0,
            product_type: ProductType::Vehicle,
            top_k: 10,
        };
        orchestrator.process_direct(&request).await.unwrap();
        let deleted = orchestrator.invalidate(anchor, ProductType::Vehicle).await;
        assert!(deleted > 0);

        let recomputed = orchestrator.process_direct(&request).await.unwrap();
        assert!(!recomputed.cached);
    }

    #[tokio::test]
    async fn health_snapshot_is_synchronous_and_defaults_unhealthy() {
        let orchestrator = orchestrator(Uuid::new_v4(), Uuid::new_v4()).await;
        // No periodic probe has run yet in this fresh runner.
        let snapshot = orchestrator.health_snapshot();
        assert!(!snapshot.healthy);
        assert!(snapshot.checked_at.is_none());
    }
}
