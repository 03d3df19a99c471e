//! TOPSIS multi-criteria scoring: distance to the ideal positive and
//! negative solutions over a weighted, column-normalized decision matrix.

use locarank_core::{Error, Result};

/// Direction of a criterion: benefit columns are maximized, cost columns
/// minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Benefit,
    Cost,
}

/// Guard against a zero denominator in the closeness ratio.
const CLOSENESS_EPS: f64 = 1e-10;

/// One scored alternative, sorted position already assigned.
#[derive(Debug, Clone)]
pub struct TopsisScore {
    /// 1-based rank after the descending closeness sort.
    pub rank: usize,
    pub id: String,
    /// Closeness coefficient in [0, 1].
    pub closeness: f64,
    pub normalized: Vec<f64>,
    pub weighted: Vec<f64>,
    pub distance_positive: f64,
    pub distance_negative: f64,
}

/// Run TOPSIS over `alternatives` (id + criterion row). Ties in closeness
/// are broken by id lexicographic order so rankings are deterministic.
pub fn rank(
    alternatives: &[(String, Vec<f64>)],
    weights: &[f64],
    polarity: &[Polarity],
) -> Result<Vec<TopsisScore>> {
    if alternatives.is_empty() {
        return Err(Error::validation("TOPSIS requires at least one alternative"));
    }
    let n = weights.len();
    if polarity.len() != n {
        return Err(Error::validation("criterion weights and polarities must align"));
    }
    for (id, row) in alternatives {
        if row.len() != n {
            return Err(Error::validation(format!("alternative {id}: expected {n} criteria")));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::validation(format!("alternative {id}: non-finite criterion value")));
        }
    }

    // Column ℓ₂ norms; an identically-zero column gets divisor 1 so the
    // normalized column stays zero instead of producing NaNs.
    let mut norms = vec![0.0; n];
    for (_, row) in alternatives {
        for (j, &value) in row.iter().enumerate() {
            norms[j] += value * value;
        }
    }
    for norm in &mut norms {
        *norm = norm.sqrt();
        if *norm == 0.0 {
            *norm = 1.0;
        }
    }

    let normalized: Vec<Vec<f64>> = alternatives
        .iter()
        .map(|(_, row)| row.iter().zip(&norms).map(|(v, norm)| v / norm).collect())
        .collect();

    let weighted: Vec<Vec<f64>> = normalized
        .iter()
        .map(|row| row.iter().zip(weights).map(|(v, w)| v * w).collect())
        .collect();

    // Ideal solutions per column polarity.
    let mut ideal_positive = vec![0.0; n];
    let mut ideal_negative = vec![0.0; n];
    for j in 0..n {
        let column = weighted.iter().map(|row| row[j]);
        let max = column.clone().fold(f64::NEG_INFINITY, f64::max);
        let min = column.fold(f64::INFINITY, f64::min);
        match polarity[j] {
            Polarity::Benefit => {
                ideal_positive[j] = max;
                ideal_negative[j] = min;
            }
            Polarity::Cost => {
                ideal_positive[j] = min;
                ideal_negative[j] = max;
            }
        }
    }

    let mut scores: Vec<TopsisScore> = alternatives
        .iter()
        .enumerate()
        .map(|(i, (id, _))| {
            let row = &weighted[i];
            let d_pos = euclidean(row, &ideal_positive);
            let d_neg = euclidean(row, &ideal_negative);
            let denom = d_pos + d_neg;
            let closeness = if denom < CLOSENESS_EPS { 0.0 } else { d_neg / denom };
            TopsisScore {
                rank: 0,
                id: id.clone(),
                closeness,
                normalized: normalized[i].clone(),
                weighted: row.clone(),
                distance_positive: d_pos,
                distance_negative: d_neg,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.closeness
            .total_cmp(&a.closeness)
            .then_with(|| a.id.cmp(&b.id))
    });
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
    }

    Ok(scores)
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alt(id: &str, row: &[f64]) -> (String, Vec<f64>) {
        (id.to_string(), row.to_vec())
    }

    const BENEFIT3: [Polarity; 3] = [Polarity::Benefit, Polarity::Benefit, Polarity::Benefit];

    #[test]
    fn closeness_stays_in_unit_interval() {
        let alternatives = vec![
            alt("a", &[1.0, 5.0, 0.3]),
            alt("b", &[4.0, 2.0, 0.9]),
            alt("c", &[2.5, 3.5, 0.5]),
        ];
        let scores = rank(&alternatives, &[0.5, 0.3, 0.2], &BENEFIT3).unwrap();
        for s in scores {
            assert!((0.0..=1.0).contains(&s.closeness), "{}: {}", s.id, s.closeness);
        }
    }

    #[test]
    fn dominant_alternative_scores_strictly_higher() {
        let alternatives = vec![
            alt("weak", &[1.0, 1.0, 0.1]),
            alt("strong", &[2.0, 3.0, 0.9]),
        ];
        let scores = rank(&alternatives, &[0.4, 0.4, 0.2], &BENEFIT3).unwrap();
        let strong = scores.iter().find(|s| s.id == "strong").unwrap();
        let weak = scores.iter().find(|s| s.id == "weak").unwrap();
        assert!(strong.closeness > weak.closeness);
        assert_eq!(strong.rank, 1);
    }

    #[test]
    fn identical_rows_get_equal_scores_and_id_order() {
        let alternatives = vec![
            alt("beta", &[2.0, 4.0]),
            alt("alpha", &[2.0, 4.0]),
        ];
        let polarity = [Polarity::Benefit, Polarity::Cost];
        let scores = rank(&alternatives, &[0.6, 0.4], &polarity).unwrap();
        assert!((scores[0].closeness - scores[1].closeness).abs() < 1e-12);
        assert_eq!(scores[0].id, "alpha");
        assert_eq!(scores[1].id, "beta");
    }

    #[test]
    fn scaling_a_column_does_not_change_ordering() {
        let base = vec![
            alt("a", &[1.0, 9.0, 0.3]),
            alt("b", &[5.0, 4.0, 0.8]),
            alt("c", &[3.0, 6.0, 0.5]),
        ];
        let scaled: Vec<_> = base
            .iter()
            .map(|(id, row)| (id.clone(), vec![row[0] * 2.0, row[1], row[2]]))
            .collect();

        let weights = [0.5, 0.3, 0.2];
        let order = |scores: Vec<TopsisScore>| -> Vec<String> {
            scores.into_iter().map(|s| s.id).collect()
        };
        assert_eq!(
            order(rank(&base, &weights, &BENEFIT3).unwrap()),
            order(rank(&scaled, &weights, &BENEFIT3).unwrap())
        );
    }

    #[test]
    fn cost_criterion_prefers_smaller_values() {
        let alternatives = vec![
            alt("near", &[1.0, 5.0]),
            alt("far", &[10.0, 5.0]),
        ];
        let polarity = [Polarity::Cost, Polarity::Benefit];
        let scores = rank(&alternatives, &[0.7, 0.3], &polarity).unwrap();
        assert_eq!(scores[0].id, "near");
    }

    #[test]
    fn zero_column_yields_no_nans() {
        let alternatives = vec![
            alt("a", &[0.0, 3.0]),
            alt("b", &[0.0, 7.0]),
        ];
        let scores = rank(&alternatives, &[0.5, 0.5], &BENEFIT3[..2]).unwrap();
        for s in scores {
            assert!(s.closeness.is_finite());
            assert!(s.normalized.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn single_alternative_gets_zero_closeness_via_eps_guard() {
        // With one alternative the ideals coincide with its own row, so
        // both distances are zero and the ε-guard applies.
        let alternatives = vec![alt("only", &[2.0, 3.0])];
        let scores = rank(&alternatives, &[0.5, 0.5], &BENEFIT3[..2]).unwrap();
        assert_eq!(scores[0].closeness, 0.0);
        assert_eq!(scores[0].rank, 1);
    }

    #[test]
    fn nan_input_is_rejected() {
        let alternatives = vec![alt("bad", &[f64::NAN, 1.0])];
        assert!(rank(&alternatives, &[0.5, 0.5], &BENEFIT3[..2]).is_err());
    }
}
