//! Shared domain types for the recommendation and courier-ranking service.

mod error;
mod product;
mod sentiment;
mod task;

pub use error::{Error, Result};
pub use product::{ProductDetails, ProductType, VehicleRecord};
pub use sentiment::{SentimentLabel, SentimentResult};
pub use task::TaskStatus;
