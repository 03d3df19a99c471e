//! Core A: sentiment-driven recommendation pipeline and fusion ranker.

mod engine;
mod ranker;
mod types;

pub use engine::{Embedder, EngineHealth, RecommendationEngine, VectorSearch};
pub use ranker::Ranker;
pub use types::{RankedProduct, RecommendationRequest, RecommendationResult};
