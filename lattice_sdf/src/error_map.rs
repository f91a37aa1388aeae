/////////////////////////////////////////////////////////////////////////////////////////////
//
// Attributes the residual of a solved least-squares system to its unknowns.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::equation::Triplet;

/// Per-unknown heatmap of how much each unknown takes part in unsatisfied equations.
///
/// The squared residual `(b - A x)²` of every equation is shared among the unknowns of the
/// equation in proportion to their squared coefficients. Equations whose coefficients are
/// all zero blame nobody. The heatmap has the length of `solution`.
///
/// Triplets are taken one by one, so duplicates of a `(row, col)` cell each contribute.
///
/// # Panics
/// If a triplet refers to a row outside `rhs` or a column outside `solution`.
pub fn generate_error_map(triplets: &[Triplet], solution: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut row_errors = rhs.to_vec();
    let mut sum_of_value_sq = vec![0.0f64; rhs.len()];

    for t in triplets {
        row_errors[t.row] -= solution[t.col] * t.value;
        sum_of_value_sq[t.row] += t.value * t.value;
    }

    for error in row_errors.iter_mut() {
        *error *= *error;
    }

    let mut heatmap = vec![0.0f64; solution.len()];
    for t in triplets {
        let row_sq = sum_of_value_sq[t.row];
        if row_sq != 0.0 {
            heatmap[t.col] += (t.value * t.value) / row_sq * row_errors[t.row];
        }
    }

    heatmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_solution_has_no_error() {
        // x0 + x1 = 3, x1 = 2
        let triplets = [
            Triplet::new(0, 0, 1.0),
            Triplet::new(0, 1, 1.0),
            Triplet::new(1, 1, 1.0),
        ];
        let heatmap = generate_error_map(&triplets, &[1.0, 2.0], &[3.0, 2.0]);
        assert_eq!(heatmap, vec![0.0, 0.0]);
    }

    #[test]
    fn blame_follows_squared_coefficients() {
        // 1 x0 + 2 x1 = 5 with x = 0 leaves a squared residual of 25.
        let triplets = [Triplet::new(0, 0, 1.0), Triplet::new(0, 1, 2.0)];
        let heatmap = generate_error_map(&triplets, &[0.0, 0.0, 0.0], &[5.0]);

        assert_eq!(heatmap.len(), 3);
        assert!((heatmap[0] - 5.0).abs() < 1e-12);
        assert!((heatmap[1] - 20.0).abs() < 1e-12);
        assert_eq!(heatmap[2], 0.0);
        assert!((heatmap.iter().sum::<f64>() - 25.0).abs() < 1e-12);
    }

    #[test]
    fn all_zero_row_blames_nobody() {
        let triplets = [Triplet::new(0, 0, 0.0), Triplet::new(1, 1, 1.0)];
        let heatmap = generate_error_map(&triplets, &[0.0, 1.0], &[7.0, 1.0]);
        assert_eq!(heatmap, vec![0.0, 0.0]);
    }

    #[test]
    fn rows_accumulate_per_unknown() {
        let triplets = [Triplet::new(0, 0, 1.0), Triplet::new(1, 0, 1.0)];
        let heatmap = generate_error_map(&triplets, &[1.0], &[2.0, 3.0]);
        assert!((heatmap[0] - 5.0).abs() < 1e-12);
    }
}
