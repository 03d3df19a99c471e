//! Analytic Hierarchy Process: pairwise comparison matrix → criterion
//! weights plus a consistency diagnostic.
//!
//! Weights use the column-averaging method: normalize each column by its
//! sum, then average across rows. λ_max is estimated as the mean of
//! (M·w)_i / w_i, giving CI = (λ_max − n)/(n − 1) and CR = CI/RI with RI
//! looked up by matrix order. CR ≥ 0.1 marks the matrix inconsistent; that
//! is a warning for callers, not an error.

use locarank_core::{Error, Result};

use crate::types::{AhpWeights, Urgency};

/// Saaty random index by matrix order (index 0 and 1 are placeholders; a
/// 1×1 or 2×2 matrix is always consistent).
const RANDOM_INDEX: [f64; 11] = [
    0.0, 0.0, 0.0, 0.58, 0.90, 1.12, 1.24, 1.32, 1.41, 1.45, 1.49,
];

/// CR below this threshold is considered consistent.
pub const CONSISTENCY_THRESHOLD: f64 = 0.1;

const RECIPROCITY_EPS: f64 = 1e-6;

/// Upper-triangle Saaty comparisons for the four courier criteria, in the
/// fixed order (proximity, reputation, capacity, vehicle).
#[derive(Debug, Clone, Copy)]
pub struct ComparisonTable {
    pub proximity_vs_reputation: f64,
    pub proximity_vs_capacity: f64,
    pub proximity_vs_vehicle: f64,
    pub reputation_vs_capacity: f64,
    pub reputation_vs_vehicle: f64,
    pub capacity_vs_vehicle: f64,
}

/// Per-urgency comparison presets. Proximity dominates more strongly as
/// urgency rises.
pub fn comparison_table(urgency: Urgency) -> ComparisonTable {
    match urgency {
        Urgency::Standard => ComparisonTable {
            proximity_vs_reputation: 2.0,
            proximity_vs_capacity: 3.0,
            proximity_vs_vehicle: 5.0,
            reputation_vs_capacity: 2.0,
            reputation_vs_vehicle: 3.0,
            capacity_vs_vehicle: 2.0,
        },
        Urgency::Express => ComparisonTable {
            proximity_vs_reputation: 4.0,
            proximity_vs_capacity: 5.0,
            proximity_vs_vehicle: 6.0,
            reputation_vs_capacity: 2.0,
            reputation_vs_vehicle: 3.0,
            capacity_vs_vehicle: 2.0,
        },
        Urgency::Sameday => ComparisonTable {
            proximity_vs_reputation: 6.0,
            proximity_vs_capacity: 7.0,
            proximity_vs_vehicle: 7.0,
            reputation_vs_capacity: 2.0,
            reputation_vs_vehicle: 2.0,
            capacity_vs_vehicle: 1.0,
        },
    }
}

/// Expand a comparison table into the full reciprocal 4×4 matrix.
pub fn build_matrix(table: ComparisonTable) -> Vec<Vec<f64>> {
    let mut m = vec![vec![1.0; 4]; 4];
    m[0][1] = table.proximity_vs_reputation;
    m[0][2] = table.proximity_vs_capacity;
    m[0][3] = table.proximity_vs_vehicle;
    m[1][2] = table.reputation_vs_capacity;
    m[1][3] = table.reputation_vs_vehicle;
    m[2][3] = table.capacity_vs_vehicle;
    for i in 0..4 {
        for j in (i + 1)..4 {
            m[j][i] = 1.0 / m[i][j];
        }
    }
    m
}

/// Full AHP outcome for an order-n matrix.
#[derive(Debug, Clone)]
pub struct AhpOutcome {
    pub weights: Vec<f64>,
    pub lambda_max: f64,
    pub consistency_index: f64,
    pub consistency_ratio: f64,
    pub consistent: bool,
}

fn validate_matrix(matrix: &[Vec<f64>]) -> Result<usize> {
    let n = matrix.len();
    if n == 0 || n > 10 {
        return Err(Error::validation(format!("AHP matrix order must be in [1, 10], got {n}")));
    }
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != n {
            return Err(Error::validation("AHP matrix must be square"));
        }
        if (row[i] - 1.0).abs() > RECIPROCITY_EPS || row[i] <= 0.0 {
            return Err(Error::validation(format!("AHP diagonal entry [{i}][{i}] must be 1")));
        }
        for (j, &value) in row.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::validation(format!(
                    "AHP entry [{i}][{j}] must be positive and finite"
                )));
            }
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if (matrix[i][j] * matrix[j][i] - 1.0).abs() > RECIPROCITY_EPS {
                return Err(Error::validation(format!(
                    "AHP matrix is not reciprocal at [{i}][{j}]"
                )));
            }
        }
    }
    Ok(n)
}

/// Compute weights and consistency for a reciprocal pairwise matrix.
pub fn evaluate(matrix: &[Vec<f64>]) -> Result<AhpOutcome> {
    let n = validate_matrix(matrix)?;

    let mut column_sums = vec![0.0; n];
    for row in matrix {
        for (j, &value) in row.iter().enumerate() {
            column_sums[j] += value;
        }
    }

    // Row means of the column-normalized matrix.
    let mut weights = vec![0.0; n];
    for (i, row) in matrix.iter().enumerate() {
        let mut acc = 0.0;
        for (j, &value) in row.iter().enumerate() {
            acc += value / column_sums[j];
        }
        weights[i] = acc / n as f64;
    }

    // Final renormalization so the weights sum to exactly 1.
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }

    // λ_max = mean of (M·w)_i / w_i.
    let lambda_max = matrix
        .iter()
        .zip(&weights)
        .map(|(row, &w)| {
            let dot: f64 = row.iter().zip(&weights).map(|(a, b)| a * b).sum();
            dot / w
        })
        .sum::<f64>()
        / n as f64;

    let (consistency_index, consistency_ratio) = if n > 2 {
        let ci = (lambda_max - n as f64) / (n as f64 - 1.0);
        (ci, ci / RANDOM_INDEX[n])
    } else {
        (0.0, 0.0)
    };

    Ok(AhpOutcome {
        weights,
        lambda_max,
        consistency_index,
        consistency_ratio,
        consistent: consistency_ratio < CONSISTENCY_THRESHOLD,
    })
}

/// Criterion weights for a delivery urgency, using its preset matrix.
pub fn courier_weights(urgency: Urgency) -> Result<AhpWeights> {
    let matrix = build_matrix(comparison_table(urgency));
    let outcome = evaluate(&matrix)?;

    if !outcome.consistent {
        tracing::warn!(
            urgency = urgency.as_str(),
            consistency_ratio = outcome.consistency_ratio,
            "AHP matrix is not consistent; ranking may be less reliable"
        );
    }

    Ok(AhpWeights {
        proximity: outcome.weights[0],
        reputation: outcome.weights[1],
        capacity: outcome.weights[2],
        vehicle: outcome.weights[3],
        consistency_ratio: outcome.consistency_ratio,
        consistent: outcome.consistent,
    })
}
