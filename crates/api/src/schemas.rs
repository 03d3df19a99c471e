//! Request and response bodies for the HTTP surface. Identifier and enum
//! fields arrive as strings and are parsed explicitly so malformed input
//! maps to 400 rather than a framework rejection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use locarank_core::{Error, ProductType, Result, TaskStatus};

pub fn parse_product_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::validation(format!("invalid product id: {raw}")))
}

pub fn parse_product_type(raw: &str) -> Result<ProductType> {
    ProductType::from_str(raw)
}

fn default_top_k() -> usize {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_recreate() -> bool {
    true
}

/// `POST /recommendations/` body.
#[derive(Debug, Deserialize)]
pub struct RecommendationBody {
    pub product_id: String,
    pub client_id: String,
    /// Free-text comment driving the sentiment stage.
    pub commentaire: String,
    pub product_type: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub async_processing: bool,
}

/// `POST /recommendations/direct` body: sentiment already computed.
#[derive(Debug, Deserialize)]
pub struct DirectRecommendationBody {
    pub product_id: String,
    pub client_id: String,
    pub sentiment_score: f64,
    pub product_type: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// `GET /recommendations/vehicles` query string.
#[derive(Debug, Deserialize)]
pub struct VehicleQuery {
    pub product_id: String,
    pub client_id: String,
    pub commentaire: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct SentimentBody {
    pub product_id: String,
    pub client_id: String,
    pub commentaire: String,
    #[serde(default)]
    pub product_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentimentBatchBody {
    pub comments: Vec<SentimentBody>,
}

#[derive(Debug, Deserialize)]
pub struct VectorizeBody {
    pub product_type: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_recreate")]
    pub recreate: bool,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateBody {
    pub product_id: String,
    pub product_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct CourierRankQuery {
    #[serde(default)]
    pub include_details: bool,
}

#[derive(Debug, Serialize)]
pub struct AsyncTaskResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}
