use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Product families the recommendation core serves.
///
/// Deliberately narrowed to vehicles: couriers are ranked by the stateless
/// courier pipeline and have no product repository behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Vehicle,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle" => Ok(Self::Vehicle),
            other => Err(Error::validation(format!("unknown product type: {other}"))),
        }
    }
}

/// Rental vehicle record as returned by the product repository.
///
/// The recommendation core is a read-only consumer: records are created by
/// upstream ingest and mutated by the booking subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: Uuid,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vehicle_type: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub seats: Option<i32>,
    pub luggage_capacity_l: Option<f64>,
    pub location: Option<String>,
    pub daily_price: Option<f64>,
    pub available: bool,
    /// Average rating in [0, 5].
    pub average_rating: f64,
    pub rental_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleRecord {
    /// Deterministic textual description used as embedding input.
    ///
    /// Attribute order is stable so that re-vectorizing an unchanged record
    /// always yields the same text (and therefore the same vector).
    pub fn description(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(brand) = &self.brand {
            match &self.model {
                Some(model) => parts.push(format!("{brand} {model} vehicle")),
                None => parts.push(format!("{brand} vehicle")),
            }
        }
        if let Some(year) = self.year {
            parts.push(format!("from {year}"));
        }
        if let Some(vehicle_type) = &self.vehicle_type {
            parts.push(format!("type {vehicle_type}"));
        }

        let mut specs: Vec<String> = Vec::new();
        if let Some(seats) = self.seats {
            specs.push(format!("{seats} seats"));
        }
        if let Some(transmission) = &self.transmission {
            specs.push(format!("{transmission} transmission"));
        }
        if let Some(fuel) = &self.fuel_type {
            specs.push(format!("{fuel} fuel"));
        }
        if !specs.is_empty() {
            parts.push(format!("with {}", specs.join(", ")));
        }

        if let Some(luggage) = self.luggage_capacity_l {
            parts.push(format!("luggage capacity {luggage}L"));
        }
        if let Some(location) = &self.location {
            parts.push(format!("located in {location}"));
        }
        if self.available {
            parts.push("available for rental".to_string());
        } else {
            parts.push("currently unavailable".to_string());
        }
        if self.average_rating > 0.0 {
            parts.push(format!("rated {:.1}/5", self.average_rating));
        }

        parts.join(" ")
    }

    /// Denormalized hints attached to ranked products and index payloads.
    pub fn metadata(&self) -> HashMap<String, serde_json::Value> {
        let mut meta = HashMap::new();
        if let Some(brand) = &self.brand {
            meta.insert("brand".to_string(), serde_json::json!(brand));
        }
        if let Some(model) = &self.model {
            meta.insert("model".to_string(), serde_json::json!(model));
        }
        if let Some(year) = self.year {
            meta.insert("year".to_string(), serde_json::json!(year));
        }
        if let Some(price) = self.daily_price {
            meta.insert("daily_price".to_string(), serde_json::json!(price));
        }
        meta
    }
}

/// Narrow projection of a product consumed by the fusion ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: Uuid,
    pub product_type: ProductType,
    pub description: String,
    pub available: bool,
    /// Average rating in [0, 5].
    pub reputation: f64,
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProductDetails {
    pub fn from_vehicle(record: &VehicleRecord) -> Self {
        Self {
            product_id: record.id,
            product_type: ProductType::Vehicle,
            description: record.description(),
            available: record.available,
            reputation: record.average_rating,
            location: record.location.clone(),
            metadata: record.metadata(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> VehicleRecord {
        VehicleRecord {
            id: Uuid::new_v4(),
            brand: Some("Renault".to_string()),
            model: Some("Clio".to_string()),
            year: Some(2021),
            vehicle_type: Some("citadine".to_string()),
            transmission: Some("manual".to_string()),
            fuel_type: Some("essence".to_string()),
            seats: Some(5),
            luggage_capacity_l: Some(300.0),
            location: Some("Paris".to_string()),
            daily_price: Some(45.0),
            available: true,
            average_rating: 4.3,
            rental_count: 17,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn description_is_deterministic_and_ordered() {
        let record = sample_record();
        let first = record.description();
        let second = record.description();
        assert_eq!(first, second);
        // Brand appears before year, year before location.
        let brand_pos = first.find("Renault").unwrap();
        let year_pos = first.find("2021").unwrap();
        let loc_pos = first.find("Paris").unwrap();
        assert!(brand_pos < year_pos && year_pos < loc_pos);
    }

    #[test]
    fn description_skips_missing_fields() {
        let mut record = sample_record();
        record.year = None;
        record.location = None;
        let text = record.description();
        assert!(!text.contains("from"));
        assert!(!text.contains("located in"));
    }

    #[test]
    fn unavailable_vehicle_is_described_as_such() {
        let mut record = sample_record();
        record.available = false;
        assert!(record.description().contains("currently unavailable"));
    }

    #[test]
    fn product_type_round_trips_through_str() {
        assert_eq!("vehicle".parse::<ProductType>().unwrap(), ProductType::Vehicle);
        assert!("boat".parse::<ProductType>().is_err());
    }
}
