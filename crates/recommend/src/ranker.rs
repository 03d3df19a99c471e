//! Fusion ranker: weighted combination of semantic similarity, availability,
//! and reputation.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use locarank_core::{Error, ProductDetails, ProductType, Result};
use locarank_index::SimilarProduct;

use crate::types::RankedProduct;

/// Weighted scorer. Weights are sum-normalized at construction so callers
/// can pass any positive proportions.
#[derive(Debug, Clone)]
pub struct Ranker {
    similarity_weight: f64,
    availability_weight: f64,
    reputation_weight: f64,
}

impl Ranker {
    pub fn new(similarity: f64, availability: f64, reputation: f64) -> Result<Self> {
        if similarity < 0.0 || availability < 0.0 || reputation < 0.0 {
            return Err(Error::validation("ranking weights must be non-negative"));
        }
        let total = similarity + availability + reputation;
        if total <= 0.0 {
            return Err(Error::validation("ranking weights must not all be zero"));
        }
        Ok(Self {
            similarity_weight: similarity / total,
            availability_weight: availability / total,
            reputation_weight: reputation / total,
        })
    }

    /// `final = α·similarity + β·availability + γ·(rating/5, clamped)`,
    /// rounded to 4 decimals so cached and recomputed scores compare equal.
    pub fn final_score(&self, similarity: f64, available: bool, reputation: f64) -> f64 {
        let availability_score = if available { 1.0 } else { 0.0 };
        let reputation_score = (reputation / 5.0).clamp(0.0, 1.0);

        let score = self.similarity_weight * similarity
            + self.availability_weight * availability_score
            + self.reputation_weight * reputation_score;
        round4(score)
    }

    /// Score and order candidates. Candidates without details are skipped.
    /// Ties break by similarity, then by id lexicographic order.
    pub fn rank(
        &self,
        similar: &[SimilarProduct],
        details: &HashMap<Uuid, ProductDetails>,
        product_type: ProductType,
    ) -> Vec<RankedProduct> {
        let mut ranked: Vec<RankedProduct> = similar
            .iter()
            .filter_map(|candidate| {
                let Some(detail) = details.get(&candidate.product_id) else {
                    warn!(product_id = %candidate.product_id, "no details for candidate; skipping");
                    return None;
                };
                let final_score =
                    self.final_score(candidate.similarity, detail.available, detail.reputation);
                Some(RankedProduct {
                    product_id: candidate.product_id,
                    product_type,
                    similarity_score: round4(candidate.similarity),
                    availability_score: if detail.available { 1.0 } else { 0.0 },
                    reputation_score: round4((detail.reputation / 5.0).clamp(0.0, 1.0)),
                    final_score,
                    rank: 0,
                    metadata: detail.metadata.clone(),
                })
            })
            .collect();

        sort_and_rank(&mut ranked);
        debug!(count = ranked.len(), "ranked candidates");
        ranked
    }

    /// Optional post-hook: additive boost for available products, capped at
    /// 1.0, followed by a re-rank.
    pub fn apply_availability_boost(&self, products: &mut Vec<RankedProduct>, boost: f64) {
        for product in products.iter_mut() {
            if product.availability_score == 1.0 {
                product.final_score = round4((product.final_score + boost).min(1.0));
            }
        }
        sort_and_rank(products);
    }

    /// Optional post-hook: drop products below `min_score` and re-rank the
    /// survivors.
    pub fn filter_by_minimum_score(&self, products: &mut Vec<RankedProduct>, min_score: f64) {
        products.retain(|p| p.final_score >= min_score);
        for (i, product) in products.iter_mut().enumerate() {
            product.rank = i + 1;
        }
    }
}

fn sort_and_rank(products: &mut [RankedProduct]) {
    products.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.similarity_score.total_cmp(&a.similarity_score))
            .then_with(|| a.product_id.to_string().cmp(&b.product_id.to_string()))
    });
    for (i, product) in products.iter_mut().enumerate() {
        product.rank = i + 1;
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker() -> Ranker {
        Ranker::new(0.6, 0.25, 0.15).unwrap()
    }

    fn details(id: Uuid, available: bool, rating: f64) -> ProductDetails {
        ProductDetails {
            product_id: id,
            product_type: ProductType::Vehicle,
            description: "test vehicle".to_string(),
            available,
            reputation: rating,
            location: None,
            metadata: HashMap::new(),
        }
    }

    fn similar(id: Uuid, similarity: f64) -> SimilarProduct {
        SimilarProduct { product_id: id, similarity, vector_id: id.to_string() }
    }

    #[test]
    fn weights_are_normalized() {
        // 6/2.5/1.5 and 0.6/0.25/0.15 are the same proportions.
        let a = Ranker::new(6.0, 2.5, 1.5).unwrap();
        let b = ranker();
        assert!((a.final_score(0.8, true, 4.0) - b.final_score(0.8, true, 4.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_are_rejected() {
        assert!(Ranker::new(0.0, 0.0, 0.0).is_err());
        assert!(Ranker::new(-1.0, 0.5, 0.5).is_err());
    }

    #[test]
    fn perfect_candidate_scores_one() {
        let score = ranker().final_score(1.0, true, 5.0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unavailable_low_rated_candidate_scores_low() {
        let score = ranker().final_score(0.5, false, 0.0);
        assert!((score - 0.3).abs() < 1e-9); // 0.6 * 0.5
    }

    #[test]
    fn final_scores_are_weakly_decreasing_by_rank() {
        let r = ranker();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let similars: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| similar(*id, 0.9 - 0.1 * i as f64))
            .collect();
        let detail_map: HashMap<_, _> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, details(*id, i % 2 == 0, 2.0 + i as f64)))
            .collect();

        let ranked = r.rank(&similars, &detail_map, ProductType::Vehicle);
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
        let ranks: Vec<_> = ranked.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn candidates_without_details_are_skipped() {
        let r = ranker();
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let detail_map = HashMap::from([(known, details(known, true, 4.0))]);

        let ranked = r.rank(
            &[similar(known, 0.8), similar(unknown, 0.95)],
            &detail_map,
            ProductType::Vehicle,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product_id, known);
    }

    #[test]
    fn equal_scores_tie_break_by_similarity_then_id() {
        let r = Ranker::new(1.0, 0.0, 0.0).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let detail_map =
            HashMap::from([(a, details(a, true, 3.0)), (b, details(b, true, 3.0))]);

        let ranked =
            r.rank(&[similar(a, 0.7), similar(b, 0.7)], &detail_map, ProductType::Vehicle);
        let expected_first = if a.to_string() < b.to_string() { a } else { b };
        assert_eq!(ranked[0].product_id, expected_first);
    }

    #[test]
    fn availability_boost_caps_at_one_and_reranks() {
        let r = ranker();
        let available = Uuid::new_v4();
        let unavailable = Uuid::new_v4();
        let detail_map = HashMap::from([
            (available, details(available, true, 5.0)),
            (unavailable, details(unavailable, false, 5.0)),
        ]);
        let mut ranked = r.rank(
            &[similar(available, 0.95), similar(unavailable, 0.99)],
            &detail_map,
            ProductType::Vehicle,
        );

        r.apply_availability_boost(&mut ranked, 0.1);
        assert_eq!(ranked[0].product_id, available);
        assert!(ranked[0].final_score <= 1.0);
    }

    #[test]
    fn minimum_score_filter_reranks_survivors() {
        let r = ranker();
        let good = Uuid::new_v4();
        let poor = Uuid::new_v4();
        let detail_map = HashMap::from([
            (good, details(good, true, 5.0)),
            (poor, details(poor, false, 0.0)),
        ]);
        let mut ranked = r.rank(
            &[similar(good, 0.9), similar(poor, 0.1)],
            &detail_map,
            ProductType::Vehicle,
        );

        r.filter_by_minimum_score(&mut ranked, 0.3);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product_id, good);
        assert_eq!(ranked[0].rank, 1);
    }
}
