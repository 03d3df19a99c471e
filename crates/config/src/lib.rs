use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
    /// Requests allowed per remote address per window.
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            prefix: "/api/v1".to_string(),
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub pool_size: usize,
    pub pool_overflow: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "locarank".to_string(),
            password: String::new(),
            dbname: "locarank".to_string(),
            pool_size: 10,
            pool_overflow: 20,
        }
    }
}

impl DatabaseConfig {
    /// Hard cap on concurrently checked-out connections.
    pub fn max_connections(&self) -> usize {
        self.pool_size + self.pool_overflow
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Qdrant gRPC endpoint.
    pub url: String,
    pub collection_vehicles: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection_vehicles: "vehicles".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    /// Sentiment bucket width τ used by fingerprinting and fuzzy lookups.
    pub sentiment_tolerance: f64,
    /// Entry capacity of the in-process backend.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            sentiment_tolerance: 0.1,
            capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Local directory holding the embedding model files; when absent the
    /// public fallback checkpoint is fetched instead.
    pub embedding_model_path: String,
    pub embedding_dimension: usize,
    /// Local directory holding the sentiment classifier files.
    pub sentiment_model_path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_model_path: "./models/bi-encoder".to_string(),
            embedding_dimension: 768,
            sentiment_model_path: "./models/sentiment".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub similarity_weight: f64,
    pub availability_weight: f64,
    pub reputation_weight: f64,
    pub default_top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.60,
            availability_weight: 0.25,
            reputation_weight: 0.15,
            default_top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Concurrent workers across all queues.
    pub worker_concurrency: usize,
    /// Total executions per task, first attempt included.
    pub max_attempts: u32,
    pub retry_base_delay_seconds: u64,
    pub retry_max_delay_seconds: u64,
    pub health_check_interval_seconds: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            max_attempts: 3,
            retry_base_delay_seconds: 30,
            retry_max_delay_seconds: 600,
            health_check_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for admin bearer tokens.
    pub secret_key: String,
    pub token_expire_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "change-me".to_string(),
            token_expire_minutes: 30,
        }
    }
}

/// Root configuration, immutable after startup and passed by handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub index: IndexConfig,
    pub cache: CacheConfig,
    pub models: ModelConfig,
    pub ranking: RankingConfig,
    pub tasks: TaskConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load from a TOML file (missing file yields defaults), then apply
    /// environment overrides for the handful of deploy-time knobs.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("LOCARANK_DB_HOST") {
            if !value.is_empty() {
                config.database.host = value;
            }
        }
        if let Ok(value) = env::var("LOCARANK_DB_PASSWORD") {
            if !value.is_empty() {
                config.database.password = value;
            }
        }
        if let Ok(value) = env::var("LOCARANK_QDRANT_URL") {
            if !value.is_empty() {
                config.index.url = value;
            }
        }
        if let Ok(value) = env::var("LOCARANK_SECRET_KEY") {
            if !value.is_empty() {
                config.auth.secret_key = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert!((config.cache.sentiment_tolerance - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.ranking.default_top_k, 10);
        assert!((config.ranking.similarity_weight - 0.60).abs() < f64::EPSILON);
        assert_eq!(config.tasks.worker_concurrency, 4);
        assert_eq!(config.api.rate_limit_requests, 100);
        assert_eq!(config.models.embedding_dimension, 768);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load_from("/nonexistent/locarank.toml").unwrap();
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locarank.toml");

        let mut config = AppConfig::default();
        config.api.port = 9001;
        config.cache.ttl_seconds = 120;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api.port, 9001);
        assert_eq!(loaded.cache.ttl_seconds, 120);
    }

    #[test]
    fn partial_toml_fills_missing_sections_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[api]\nport = 8100\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api.port, 8100);
        assert_eq!(loaded.cache.ttl_seconds, 3600);
    }
}
