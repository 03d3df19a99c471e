//! Multi-criteria courier ranking: spherical-ellipse geofilter, AHP-derived
//! criterion weights, and TOPSIS scoring. Stateless and free of I/O.

pub mod ahp;
pub mod geo;
pub mod pipeline;
pub mod topsis;
pub mod types;

pub use pipeline::rank_couriers;
pub use types::{
    Announcement, CourierCandidate, Point, RankingOptions, RankingRequest, RankingResponse,
    Urgency, VehicleKind,
};
