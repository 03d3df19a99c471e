use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use locarank_core::Error;

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(Error::validation("coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::validation(format!("latitude out of range: {}", self.latitude)));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::validation(format!("longitude out of range: {}", self.longitude)));
        }
        Ok(())
    }
}

/// Urgency class of a delivery announcement. Each class carries its own
/// default spatial tolerance and AHP comparison table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Standard,
    Express,
    Sameday,
}

impl Urgency {
    /// Default spatial tolerance in kilometres: the zone narrows as urgency
    /// rises.
    pub fn default_tolerance_km(&self) -> f64 {
        match self {
            Self::Standard => 2.5,
            Self::Express => 1.5,
            Self::Sameday => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Express => "express",
            Self::Sameday => "sameday",
        }
    }
}

/// Courier vehicle kind with its fixed capability score used as the fourth
/// TOPSIS criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Bike,
    Moto,
    Car,
    Truck,
}

impl VehicleKind {
    pub fn capability_score(&self) -> f64 {
        match self {
            Self::Bike => 0.1,
            Self::Moto => 0.3,
            Self::Car => 0.8,
            Self::Truck => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bike => "bike",
            Self::Moto => "moto",
            Self::Car => "car",
            Self::Truck => "truck",
        }
    }
}

/// Delivery announcement: the two ellipse foci plus the urgency class.
///
/// The marketplace edge speaks French field names; aliases keep the wire
/// contract while the code stays on the English ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(alias = "annonce_id")]
    pub announcement_id: String,
    #[serde(alias = "point_ramassage")]
    pub pickup: Point,
    #[serde(alias = "point_livraison")]
    pub dropoff: Point,
    #[serde(alias = "type_livraison")]
    pub urgency: Urgency,
    #[serde(default)]
    pub description: Option<String>,
}

/// A courier competing for an announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierCandidate {
    #[serde(alias = "livreur_id")]
    pub courier_id: String,
    #[serde(alias = "nom_commercial")]
    pub commercial_name: String,
    #[serde(alias = "position_actuelle")]
    pub position: Point,
    /// Reputation in [0, 10].
    pub reputation: f64,
    #[serde(alias = "nombre_livraisons")]
    pub delivery_count: u64,
    /// Success rate in [0, 1].
    #[serde(alias = "taux_reussite")]
    pub success_rate: f64,
    #[serde(alias = "type_vehicule")]
    pub vehicle: VehicleKind,
    #[serde(alias = "capacite_max_kg")]
    pub max_capacity_kg: f64,
    #[serde(default, alias = "rayon_action_km")]
    pub operating_radius_km: Option<f64>,
}

impl CourierCandidate {
    pub fn validate(&self) -> Result<(), Error> {
        self.position.validate()?;
        if !(0.0..=10.0).contains(&self.reputation) {
            return Err(Error::validation(format!(
                "courier {}: reputation out of [0, 10]",
                self.courier_id
            )));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(Error::validation(format!(
                "courier {}: success rate out of [0, 1]",
                self.courier_id
            )));
        }
        if !self.max_capacity_kg.is_finite() || self.max_capacity_kg <= 0.0 {
            return Err(Error::validation(format!(
                "courier {}: capacity must be positive",
                self.courier_id
            )));
        }
        Ok(())
    }
}

/// Per-request ranking knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingOptions {
    /// Truncate the ranking to the first k entries; all eligible couriers
    /// are returned when unset.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Overrides the urgency's default spatial tolerance.
    #[serde(default)]
    pub spatial_tolerance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRequest {
    #[serde(alias = "annonce")]
    pub announcement: Announcement,
    #[serde(alias = "livreurs_candidats")]
    pub candidates: Vec<CourierCandidate>,
    #[serde(default)]
    pub options: Option<RankingOptions>,
}

/// Criterion weights produced by the AHP pass, plus the consistency
/// diagnostic attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AhpWeights {
    pub proximity: f64,
    pub reputation: f64,
    pub capacity: f64,
    pub vehicle: f64,
    pub consistency_ratio: f64,
    pub consistent: bool,
}

/// A candidate excluded by the spatial filter, with the measured distance
/// that put it outside the ellipse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedCourier {
    pub courier_id: String,
    pub reason: String,
    pub total_distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStats {
    pub total_candidates: usize,
    pub eligible: usize,
    pub rejected: usize,
    pub rejected_detail: Vec<RejectedCourier>,
}

/// Raw, normalized, and weighted value of one criterion for one courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionDetail {
    pub raw: f64,
    pub normalized: f64,
    pub weighted: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub proximity: CriterionDetail,
    pub reputation: CriterionDetail,
    pub capacity: CriterionDetail,
    pub vehicle: CriterionDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdealDistances {
    pub positive: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCourier {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub courier_id: String,
    /// TOPSIS closeness in [0, 1].
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distances: Option<IdealDistances>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodsUsed {
    pub filtering: String,
    pub weighting: String,
    pub ranking: String,
}

impl Default for MethodsUsed {
    fn default() -> Self {
        Self {
            filtering: "spherical_ellipse".to_string(),
            weighting: "AHP".to_string(),
            ranking: "TOPSIS".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingMetadata {
    pub urgency: Urgency,
    pub spatial_tolerance_km: f64,
    pub filter_stats: FilterStats,
    /// Absent when no candidate survived the spatial filter.
    pub ahp_weights: Option<AhpWeights>,
    pub methods: MethodsUsed,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingResponse {
    pub status: String,
    pub announcement_id: String,
    pub timestamp: DateTime<Utc>,
    pub ranked: Vec<RankedCourier>,
    pub metadata: RankingMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}
