//! Qdrant-backed vector index client.
//!
//! One named collection per product type, cosine distance, HNSW graph with
//! m=16 / ef_construct=100 / full_scan_threshold=10_000. Every point gets a
//! fresh opaque UUID; the authoritative repository key travels in the
//! `real_product_id` payload field together with denormalized filtering
//! hints. Searches run approximate with ef=128 and come back sorted by
//! descending cosine similarity; the caller excludes the anchor and
//! truncates.

use std::collections::HashMap;
use std::sync::Arc;

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    HnswConfigDiffBuilder, PointStruct, SearchParamsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use locarank_core::{Error, ProductType, Result};

const HNSW_M: u64 = 16;
const HNSW_EF_CONSTRUCT: u64 = 100;
const HNSW_FULL_SCAN_THRESHOLD: u64 = 10_000;
const SEARCH_EF: u64 = 128;

/// A vector plus the payload it is stored with.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub real_product_id: Uuid,
    pub vector: Vec<f32>,
    /// Denormalized hints (availability, location, price, rating) used only
    /// for filtering; the repository stays authoritative.
    pub hints: HashMap<String, serde_json::Value>,
}

/// One search result: the repository key, the cosine similarity, and the
/// opaque vector id it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarProduct {
    pub product_id: Uuid,
    pub similarity: f64,
    pub vector_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub points_count: u64,
    pub status: String,
}

/// Shared handle over the Qdrant client and the per-type collection names.
#[derive(Clone)]
pub struct VectorIndex {
    client: Arc<Qdrant>,
    dimension: usize,
    collections: HashMap<ProductType, String>,
}

impl VectorIndex {
    pub fn connect(url: &str, dimension: usize, vehicles_collection: String) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::unavailable("vector-index", e))?;
        info!(url, dimension, "vector index client connected");

        let mut collections = HashMap::new();
        collections.insert(ProductType::Vehicle, vehicles_collection);

        Ok(Self { client: Arc::new(client), dimension, collections })
    }

    pub fn collection_name(&self, product_type: ProductType) -> &str {
        self.collections
            .get(&product_type)
            .map(String::as_str)
            .unwrap_or("products")
    }

    /// Idempotent collection creation; `recreate` drops an existing
    /// collection first.
    pub async fn ensure_collection(&self, product_type: ProductType, recreate: bool) -> Result<()> {
        let name = self.collection_name(product_type).to_string();

        let mut exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| Error::unavailable("vector-index", e))?;

        if exists && recreate {
            self.client
                .delete_collection(&name)
                .await
                .map_err(|e| Error::unavailable("vector-index", e))?;
            info!(collection = %name, "dropped existing collection");
            exists = false;
        }

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&name)
                        .vectors_config(VectorParamsBuilder::new(
                            self.dimension as u64,
                            Distance::Cosine,
                        ))
                        .hnsw_config(
                            HnswConfigDiffBuilder::default()
                                .m(HNSW_M)
                                .ef_construct(HNSW_EF_CONSTRUCT)
                                .full_scan_threshold(HNSW_FULL_SCAN_THRESHOLD),
                        ),
                )
                .await
                .map_err(|e| Error::unavailable("vector-index", e))?;
            info!(collection = %name, dimension = self.dimension, "created collection");
        }

        Ok(())
    }

    /// Insert one point under a fresh vector id. Returns the id.
    pub async fn upsert(&self, product_type: ProductType, point: IndexPoint) -> Result<String> {
        let mut ids = self.upsert_batch(product_type, vec![point]).await?;
        Ok(ids.pop().unwrap_or_default())
    }

    /// Batch insert; every point gets a fresh vector id. Returns the ids in
    /// input order.
    pub async fn upsert_batch(
        &self,
        product_type: ProductType,
        points: Vec<IndexPoint>,
    ) -> Result<Vec<String>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let name = self.collection_name(product_type).to_string();

        let mut vector_ids = Vec::with_capacity(points.len());
        let mut structs = Vec::with_capacity(points.len());
        for point in points {
            let vector_id = Uuid::new_v4().to_string();

            let mut payload_map = serde_json::Map::new();
            payload_map.insert(
                "real_product_id".to_string(),
                serde_json::json!(point.real_product_id.to_string()),
            );
            for (key, value) in point.hints {
                payload_map.insert(key, value);
            }
            let payload = Payload::try_from(serde_json::Value::Object(payload_map))
                .map_err(|e| Error::internal(format!("invalid index payload: {e}")))?;

            structs.push(PointStruct::new(vector_id.clone(), point.vector, payload));
            vector_ids.push(vector_id);
        }

        let count = structs.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&name, structs).wait(true))
            .await
            .map_err(|e| Error::unavailable("vector-index", e))?;
        info!(collection = %name, count, "upserted vectors");

        Ok(vector_ids)
    }

    /// Approximate nearest-neighbor search, sorted by descending cosine
    /// similarity. Points without a parseable `real_product_id` payload are
    /// skipped.
    pub async fn search(
        &self,
        product_type: ProductType,
        query_vector: Vec<f32>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SimilarProduct>> {
        let name = self.collection_name(product_type).to_string();

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&name, query_vector, top_k as u64)
                    .score_threshold(score_threshold)
                    .with_payload(true)
                    .params(SearchParamsBuilder::default().hnsw_ef(SEARCH_EF).exact(false)),
            )
            .await
            .map_err(|e| Error::unavailable("vector-index", e))?;

        let mut similar = Vec::with_capacity(response.result.len());
        for scored in response.result {
            let vector_id = scored
                .id
                .as_ref()
                .and_then(|id| id.point_id_options.as_ref())
                .map(|options| match options {
                    qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid) => uuid.clone(),
                    qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
                })
                .unwrap_or_default();

            let Some(product_id) = scored
                .payload
                .get("real_product_id")
                .and_then(|value| match &value.kind {
                    Some(Kind::StringValue(s)) => Uuid::parse_str(s).ok(),
                    _ => None,
                })
            else {
                warn!(collection = %name, vector_id, "search hit without real_product_id payload");
                continue;
            };

            similar.push(SimilarProduct {
                product_id,
                similarity: f64::from(scored.score),
                vector_id,
            });
        }

        debug!(collection = %name, results = similar.len(), "vector search complete");
        Ok(similar)
    }

    /// Delete every vector belonging to a repository product.
    pub async fn delete_by_product_id(
        &self,
        product_type: ProductType,
        real_product_id: Uuid,
    ) -> Result<()> {
        let name = self.collection_name(product_type).to_string();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&name)
                    .points(Filter::must([Condition::matches(
                        "real_product_id",
                        real_product_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(|e| Error::unavailable("vector-index", e))?;
        info!(collection = %name, product_id = %real_product_id, "deleted vectors for product");
        Ok(())
    }

    pub async fn collection_stats(&self, product_type: ProductType) -> Result<CollectionStats> {
        let name = self.collection_name(product_type).to_string();
        let response = self
            .client
            .collection_info(&name)
            .await
            .map_err(|e| Error::unavailable("vector-index", e))?;
        let info = response
            .result
            .ok_or_else(|| Error::not_found(format!("collection {name}")))?;

        Ok(CollectionStats {
            name,
            points_count: info.points_count.unwrap_or(0),
            status: info.status().as_str_name().to_string(),
        })
    }

    pub async fn health_check(&self) -> bool {
        match self.client.health_check().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "vector index health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similar_product_serializes_with_uuid_and_score() {
        let similar = SimilarProduct {
            product_id: Uuid::nil(),
            similarity: 0.87,
            vector_id: "v-1".to_string(),
        };
        let json = serde_json::to_value(&similar).unwrap();
        assert_eq!(json["product_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["similarity"], 0.87);
    }

    #[test]
    fn collection_stats_serialize_for_the_admin_surface() {
        let stats = CollectionStats {
            name: "vehicles".to_string(),
            points_count: 42,
            status: "Green".to_string(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["points_count"], 42);
        assert_eq!(json["name"], "vehicles");
    }
}
