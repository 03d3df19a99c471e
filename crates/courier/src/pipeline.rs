//! Three-phase courier ranking: spatial filter → AHP weights → TOPSIS.
//!
//! The pipeline is pure: no I/O, no shared state. The same call serves the
//! synchronous HTTP path and background workers.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use locarank_core::{Error, Result};

use crate::ahp;
use crate::geo;
use crate::topsis::{self, Polarity};
use crate::types::{
    CourierCandidate, CriterionDetail, FilterStats, IdealDistances, MethodsUsed, RankedCourier,
    RankingMetadata, RankingRequest, RankingResponse, RejectedCourier, ScoreBreakdown,
};

const CRITERIA_POLARITY: [Polarity; 4] = [
    Polarity::Cost,    // total distance
    Polarity::Benefit, // reputation
    Polarity::Benefit, // capacity
    Polarity::Benefit, // vehicle capability
];

/// Rank the candidate couriers for an announcement.
///
/// Returns all eligible candidates ordered by TOPSIS closeness; an empty
/// eligible set is a success with a warning, not an error.
pub fn rank_couriers(request: &RankingRequest, include_details: bool) -> Result<RankingResponse> {
    let started = Instant::now();
    let announcement = &request.announcement;

    if request.candidates.is_empty() {
        return Err(Error::validation("at least one courier candidate is required"));
    }
    announcement.pickup.validate()?;
    announcement.dropoff.validate()?;
    for candidate in &request.candidates {
        candidate.validate()?;
    }

    let options = request.options.clone().unwrap_or_default();
    if let Some(tolerance) = options.spatial_tolerance_km {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(Error::validation("spatial tolerance must be positive"));
        }
    }
    let tolerance_km = options
        .spatial_tolerance_km
        .unwrap_or_else(|| announcement.urgency.default_tolerance_km());

    info!(
        announcement_id = %announcement.announcement_id,
        urgency = announcement.urgency.as_str(),
        candidates = request.candidates.len(),
        tolerance_km,
        "courier ranking started"
    );

    // Phase 1: spatial filter.
    let focal_distance = geo::haversine(announcement.pickup, announcement.dropoff);
    let max_total = focal_distance + 2.0 * tolerance_km;

    let mut eligible: Vec<(&CourierCandidate, f64)> = Vec::new();
    let mut rejected: Vec<RejectedCourier> = Vec::new();
    for candidate in &request.candidates {
        let total = geo::haversine(candidate.position, announcement.pickup)
            + geo::haversine(candidate.position, announcement.dropoff);
        if total <= max_total {
            eligible.push((candidate, total));
        } else {
            rejected.push(RejectedCourier {
                courier_id: candidate.courier_id.clone(),
                reason: format!(
                    "outside delivery ellipse: total distance {total:.2} km exceeds {max_total:.2} km"
                ),
                total_distance_km: total,
            });
        }
    }
    debug!(
        eligible = eligible.len(),
        rejected = rejected.len(),
        "spatial filter complete"
    );

    let filter_stats = FilterStats {
        total_candidates: request.candidates.len(),
        eligible: eligible.len(),
        rejected: rejected.len(),
        rejected_detail: rejected,
    };

    if eligible.is_empty() {
        warn!(
            announcement_id = %announcement.announcement_id,
            "no eligible courier after spatial filtering"
        );
        return Ok(RankingResponse {
            status: "success".to_string(),
            announcement_id: announcement.announcement_id.clone(),
            timestamp: Utc::now(),
            ranked: Vec::new(),
            metadata: RankingMetadata {
                urgency: announcement.urgency,
                spatial_tolerance_km: tolerance_km,
                filter_stats,
                ahp_weights: None,
                methods: MethodsUsed::default(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            warnings: vec!["no eligible courier after spatial filtering".to_string()],
        });
    }

    // Phase 2: criterion weights from the urgency's preset matrix.
    let weights = ahp::courier_weights(announcement.urgency)?;
    let mut warnings = Vec::new();
    if !weights.consistent {
        warnings.push(format!(
            "AHP matrix is not consistent (CR={:.4} >= {}); ranking may be less reliable",
            weights.consistency_ratio,
            ahp::CONSISTENCY_THRESHOLD
        ));
    }

    // Phase 3: TOPSIS over (distance, reputation, capacity, vehicle score).
    let alternatives: Vec<(String, Vec<f64>)> = eligible
        .iter()
        .map(|(candidate, total_distance)| {
            (
                candidate.courier_id.clone(),
                vec![
                    *total_distance,
                    candidate.reputation,
                    candidate.max_capacity_kg,
                    candidate.vehicle.capability_score(),
                ],
            )
        })
        .collect();
    let weight_vec = [weights.proximity, weights.reputation, weights.capacity, weights.vehicle];

    let scores = topsis::rank(&alternatives, &weight_vec, &CRITERIA_POLARITY)?;

    let mut ranked: Vec<RankedCourier> = scores
        .into_iter()
        .map(|score| {
            let raw = alternatives
                .iter()
                .find(|(id, _)| *id == score.id)
                .map(|(_, row)| row.clone())
                .unwrap_or_default();
            let details = include_details.then(|| ScoreBreakdown {
                proximity: detail(&raw, &score.normalized, &score.weighted, 0),
                reputation: detail(&raw, &score.normalized, &score.weighted, 1),
                capacity: detail(&raw, &score.normalized, &score.weighted, 2),
                vehicle: detail(&raw, &score.normalized, &score.weighted, 3),
            });
            let distances = include_details.then(|| IdealDistances {
                positive: score.distance_positive,
                negative: score.distance_negative,
            });
            RankedCourier {
                rank: score.rank,
                courier_id: score.id,
                score: score.closeness,
                details,
                distances,
            }
        })
        .collect();

    if let Some(top_k) = options.top_k {
        ranked.truncate(top_k);
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        announcement_id = %announcement.announcement_id,
        ranked = ranked.len(),
        duration_ms,
        "courier ranking complete"
    );

    Ok(RankingResponse {
        status: "success".to_string(),
        announcement_id: announcement.announcement_id.clone(),
        timestamp: Utc::now(),
        ranked,
        metadata: RankingMetadata {
            urgency: announcement.urgency,
            spatial_tolerance_km: tolerance_km,
            filter_stats,
            ahp_weights: Some(weights),
            methods: MethodsUsed::default(),
            duration_ms,
        },
        warnings,
    })
}

fn detail(raw: &[f64], normalized: &[f64], weighted: &[f64], index: usize) -> CriterionDetail {
    CriterionDetail {
        raw: raw[index],
        normalized: normalized[index],
        weighted: weighted[index],
    }
}
