//! Great-circle distance and the spherical-ellipse eligibility predicate.

use crate::types::Point;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometres.
///
/// The `asin` argument is clamped to [0, 1] to tolerate floating-point
/// rounding for antipodal or identical points.
pub fn haversine(a: Point, b: Point) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

/// A candidate is inside the delivery ellipse when the sum of its distances
/// to both foci stays within the focal distance plus twice the tolerance.
pub fn ellipse_contains(candidate: Point, pickup: Point, dropoff: Point, tolerance_km: f64) -> bool {
    let total = haversine(candidate, pickup) + haversine(candidate, dropoff);
    total <= haversine(pickup, dropoff) + 2.0 * tolerance_km
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(latitude: f64, longitude: f64) -> Point {
        Point { latitude, longitude }
    }

    #[test]
    fn zero_distance_for_identical_points() {
        let paris = p(48.8566, 2.3522);
        assert!(haversine(paris, paris).abs() < 1e-9);
    }

    #[test]
    fn paris_to_lyon_is_about_392_km() {
        let paris = p(48.8566, 2.3522);
        let lyon = p(45.7640, 4.8357);
        let d = haversine(paris, lyon);
        assert!((d - 392.0).abs() < 5.0, "got {d} km");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = p(48.85, 2.35);
        let b = p(48.86, 2.34);
        assert!((haversine(a, b) - haversine(b, a)).abs() < 1e-12);
    }

    #[test]
    fn point_on_segment_is_always_inside_the_ellipse() {
        let pickup = p(48.8566, 2.3522);
        let dropoff = p(48.8606, 2.3376);
        // Midpoint-ish candidate: the focal-distance sum equals the focal
        // distance, so it is eligible even with zero tolerance.
        let mid = p(48.8586, 2.3449);
        assert!(ellipse_contains(mid, pickup, dropoff, 0.0));
    }

    #[test]
    fn faraway_candidate_is_rejected() {
        let pickup = p(48.8566, 2.3522);
        let dropoff = p(48.8606, 2.3376);
        let meaux = p(49.0, 3.0);
        assert!(!ellipse_contains(meaux, pickup, dropoff, 1.0));
    }

    #[test]
    fn eligibility_is_monotone_in_tolerance() {
        let pickup = p(48.8566, 2.3522);
        let dropoff = p(48.8606, 2.3376);
        let candidates = [
            p(48.8570, 2.3500),
            p(48.8700, 2.3300),
            p(48.9000, 2.3000),
            p(49.0, 3.0),
        ];
        for c in candidates {
            if ellipse_contains(c, pickup, dropoff, 1.0) {
                assert!(ellipse_contains(c, pickup, dropoff, 2.5));
            }
        }
    }
}
