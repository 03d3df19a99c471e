//! Product repository: the narrow read-only interface the recommendation
//! core consumes. The relational schema is owned by upstream collaborators;
//! this crate only maps rows to domain records.
//!
//! Two implementations share the trait: a Postgres-backed one for
//! deployments and an in-memory one for tests and single-node demos, so
//! dependents never rebuild against a specific backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::sync::RwLock;
use tokio_postgres::{NoTls, Row};
use tracing::warn;
use uuid::Uuid;

use locarank_config::DatabaseConfig;
use locarank_core::{Error, Result, VehicleRecord};

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Fetch one vehicle by its repository key.
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<VehicleRecord>>;

    /// Fetch a batch of vehicles; missing ids are silently absent from the
    /// result.
    async fn get_vehicles(&self, ids: &[Uuid]) -> Result<Vec<VehicleRecord>>;

    /// Every vehicle, for vectorization bootstrap.
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>>;

    async fn health_check(&self) -> bool;
}

pub type SharedRepository = Arc<dyn ProductRepository>;

// ── Postgres ──────────────────────────────────────────────────────────────────

const VEHICLE_COLUMNS: &str = "vehicle_id, brand, model, year, vehicle_type, \
     transmission_type, fuel_type, total_seat_number, luggage_max_capacity, \
     localisation, prix_journalier, disponible, note_moyenne, nombre_locations, \
     created_at, updated_at";

pub struct PostgresRepository {
    pool: Pool,
}

impl PostgresRepository {
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pg = deadpool_postgres::Config::new();
        pg.host = Some(config.host.clone());
        pg.port = Some(config.port);
        pg.user = Some(config.user.clone());
        pg.password = Some(config.password.clone());
        pg.dbname = Some(config.dbname.clone());
        pg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        pg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections()));

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::unavailable("repository", e))?;
        Ok(Self { pool })
    }

    fn row_to_record(row: &Row) -> VehicleRecord {
        VehicleRecord {
            id: row.get("vehicle_id"),
            brand: row.get("brand"),
            model: row.get("model"),
            year: row.get("year"),
            vehicle_type: row.get("vehicle_type"),
            transmission: row.get("transmission_type"),
            fuel_type: row.get("fuel_type"),
            seats: row.get("total_seat_number"),
            luggage_capacity_l: row.get("luggage_max_capacity"),
            location: row.get("localisation"),
            daily_price: row.get("prix_journalier"),
            available: row.get("disponible"),
            average_rating: row.get("note_moyenne"),
            rental_count: row.get::<_, i32>("nombre_locations") as i64,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl ProductRepository for PostgresRepository {
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<VehicleRecord>> {
        let client = self.pool.get().await.map_err(|e| Error::unavailable("repository", e))?;
        let query = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = $1");
        let row = client
            .query_opt(&query, &[&id])
            .await
            .map_err(|e| Error::unavailable("repository", e))?;
        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn get_vehicles(&self, ids: &[Uuid]) -> Result<Vec<VehicleRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.pool.get().await.map_err(|e| Error::unavailable("repository", e))?;
        let query = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = ANY($1)");
        let rows = client
            .query(&query, &[&ids])
            .await
            .map_err(|e| Error::unavailable("repository", e))?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>> {
        let client = self.pool.get().await.map_err(|e| Error::unavailable("repository", e))?;
        let query = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY created_at");
        let rows = client
            .query(&query, &[])
            .await
            .map_err(|e| Error::unavailable("repository", e))?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn health_check(&self) -> bool {
        match self.pool.get().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                warn!(error = %e, "repository health check failed");
                false
            }
        }
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// HashMap-backed repository for tests and single-node demos.
#[derive(Default)]
pub struct MemoryRepository {
    vehicles: RwLock<HashMap<Uuid, VehicleRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: VehicleRecord) {
        self.vehicles.write().await.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.vehicles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProductRepository for MemoryRepository {
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<VehicleRecord>> {
        Ok(self.vehicles.read().await.get(&id).cloned())
    }

    async fn get_vehicles(&self, ids: &[Uuid]) -> Result<Vec<VehicleRecord>> {
        let vehicles = self.vehicles.read().await;
        Ok(ids.iter().filter_map(|id| vehicles.get(id).cloned()).collect())
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>> {
        let mut records: Vec<_> = self.vehicles.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: Uuid) -> VehicleRecord {
        VehicleRecord {
            id,
            brand: Some("Peugeot".to_string()),
            model: Some("208".to_string()),
            year: Some(2022),
            vehicle_type: Some("citadine".to_string()),
            transmission: Some("manual".to_string()),
            fuel_type: Some("essence".to_string()),
            seats: Some(5),
            luggage_capacity_l: Some(265.0),
            location: Some("Lyon".to_string()),
            daily_price: Some(39.0),
            available: true,
            average_rating: 4.1,
            rental_count: 8,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_returns_inserted_record() {
        let repo = MemoryRepository::new();
        let id = Uuid::new_v4();
        repo.insert(record(id)).await;

        let fetched = repo.get_vehicle(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.brand.as_deref(), Some("Peugeot"));
    }

    #[tokio::test]
    async fn missing_id_is_none_not_error() {
        let repo = MemoryRepository::new();
        assert!(repo.get_vehicle(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_fetch_skips_missing_ids() {
        let repo = MemoryRepository::new();
        let present = Uuid::new_v4();
        repo.insert(record(present)).await;

        let fetched = repo.get_vehicles(&[present, Uuid::new_v4()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, present);
    }

    #[tokio::test]
    async fn list_returns_every_record() {
        let repo = MemoryRepository::new();
        for _ in 0..3 {
            repo.insert(record(Uuid::new_v4())).await;
        }
        assert_eq!(repo.list_vehicles().await.unwrap().len(), 3);
    }
}
