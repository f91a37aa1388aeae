/////////////////////////////////////////////////////////////////////////////////////////////
//
// Adds sparse matrix storage, normal equation assembly, and direct least-squares solves.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # linalg
//!
//! Helper linear algebra functionality.
//!
//! Systems are stored row-compressed with duplicate entries summed, which is the shape both
//! the conjugate gradient iterations (`A x` and `Aᵀ y` products) and the tile extraction
//! need. Direct solves go through faer's sparse LU on the normal equations `AᵀA x = Aᵀb`.

use crate::equation::Triplet;
use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet as FaerTriplet};
use faer::{Mat, MatRef};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{error::Error, fmt};

/// Normal matrices whose estimated condition number exceeds this are treated as singular.
const MAX_NORMAL_CONDITION: f64 = 1e12;

/// Errors reported by the least-squares solvers.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// An input vector does not have the length implied by the system.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A triplet refers to a row or column outside the system.
    IndexOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    /// An unknown appears in no equation with a nonzero coefficient.
    Underdetermined { unknown: usize },
    /// The equations leave a combination of unknowns undetermined, so `AᵀA` is singular
    /// to working precision. Carries the estimated condition number of `AᵀA`.
    Singular { condition_estimate: f64 },
    /// The normal equations could not be factorised.
    Factorization(String),
    /// The solution contains a NaN or infinite value.
    NonFinite { index: usize },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what} has length {found}, expected {expected}"),
            SolveError::IndexOutOfBounds {
                row,
                col,
                nrows,
                ncols,
            } => write!(
                f,
                "entry ({row}, {col}) lies outside the {nrows}x{ncols} system"
            ),
            SolveError::Underdetermined { unknown } => {
                write!(f, "unknown {unknown} is not constrained by any equation")
            }
            SolveError::Singular { condition_estimate } => write!(
                f,
                "normal matrix is singular (condition estimate {condition_estimate:.3e})"
            ),
            SolveError::Factorization(msg) => write!(f, "sparse factorisation failed: {msg}"),
            SolveError::NonFinite { index } => {
                write!(f, "solution is not finite at unknown {index}")
            }
        }
    }
}

impl Error for SolveError {}

/// Row-compressed sparse matrix with summed duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Materialises the matrix of a triplet list, summing entries sharing a `(row, col)`.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[Triplet],
    ) -> Result<Self, SolveError> {
        let mut starts = vec![0usize; nrows + 1];
        for t in triplets {
            if t.row >= nrows || t.col >= ncols {
                return Err(SolveError::IndexOutOfBounds {
                    row: t.row,
                    col: t.col,
                    nrows,
                    ncols,
                });
            }
            starts[t.row + 1] += 1;
        }
        for r in 0..nrows {
            starts[r + 1] += starts[r];
        }

        let mut bucketed = vec![(0usize, 0.0f64); triplets.len()];
        let mut next = starts.clone();
        for t in triplets {
            bucketed[next[t.row]] = (t.col, t.value);
            next[t.row] += 1;
        }

        Ok(Self::from_row_buckets(nrows, ncols, &starts, &mut bucketed))
    }

    /// Sorts each row bucket by column and merges duplicates.
    fn from_row_buckets(
        nrows: usize,
        ncols: usize,
        starts: &[usize],
        bucketed: &mut [(usize, f64)],
    ) -> Self {
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::with_capacity(bucketed.len());
        let mut values = Vec::with_capacity(bucketed.len());
        row_ptr.push(0);

        for r in 0..nrows {
            let row = &mut bucketed[starts[r]..starts[r + 1]];
            row.sort_unstable_by_key(|&(c, _)| c);

            let row_start = col_idx.len();
            for &(c, v) in row.iter() {
                if col_idx.len() > row_start && col_idx.last() == Some(&c) {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                } else {
                    col_idx.push(c);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Returns `A x`.
    pub fn matvec(&self, x: MatRef<f64>) -> Mat<f64> {
        debug_assert_eq!(x.nrows(), self.ncols);
        Mat::from_fn(self.nrows, 1, |i, _| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals).map(|(&c, &v)| v * x[(c, 0)]).sum()
        })
    }

    /// Returns `Aᵀ y`.
    pub fn rmatvec(&self, y: MatRef<f64>) -> Mat<f64> {
        debug_assert_eq!(y.nrows(), self.nrows);
        let mut out = Mat::<f64>::zeros(self.ncols, 1);
        for i in 0..self.nrows {
            let yi = y[(i, 0)];
            if yi == 0.0 {
                continue;
            }
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                out[(c, 0)] += v * yi;
            }
        }
        out
    }

    /// Returns `Aᵀ`, whose rows list the equations touching each unknown.
    pub fn transpose(&self) -> SparseMatrix {
        let mut starts = vec![0usize; self.ncols + 1];
        for &c in &self.col_idx {
            starts[c + 1] += 1;
        }
        for c in 0..self.ncols {
            starts[c + 1] += starts[c];
        }

        let mut bucketed = vec![(0usize, 0.0f64); self.nnz()];
        let mut next = starts.clone();
        for r in 0..self.nrows {
            let (cols, vals) = self.row(r);
            for (&c, &v) in cols.iter().zip(vals) {
                bucketed[next[c]] = (r, v);
                next[c] += 1;
            }
        }

        Self::from_row_buckets(self.ncols, self.nrows, &starts, &mut bucketed)
    }

    /// Triplets of the normal matrix `AᵀA`, one per pair of entries sharing a row.
    /// Duplicates are left for the sparse constructor to sum.
    fn normal_triplets(&self) -> Vec<FaerTriplet<usize, usize, f64>> {
        let capacity: usize = (0..self.nrows)
            .map(|i| {
                let n = self.row_ptr[i + 1] - self.row_ptr[i];
                n * n
            })
            .sum();

        let mut triplets = Vec::with_capacity(capacity);
        for i in 0..self.nrows {
            let (cols, vals) = self.row(i);
            for (&ci, &vi) in cols.iter().zip(vals) {
                for (&cj, &vj) in cols.iter().zip(vals) {
                    triplets.push(FaerTriplet::new(ci, cj, vi * vj));
                }
            }
        }
        triplets
    }
}

/// Builds a column vector from a slice.
pub(crate) fn col_from_slice(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

/// Dot product of two column vectors.
#[inline]
pub(crate) fn dot(a: MatRef<f64>, b: MatRef<f64>) -> f64 {
    a.col(0)
        .iter()
        .zip(b.col(0).iter())
        .map(|(x, y)| x * y)
        .sum()
}

/// Solves `min ‖A x - b‖₂` through a sparse LU factorisation of `AᵀA`.
///
/// Fails if some unknown has no coefficient, if `AᵀA` is singular or cannot be
/// factorised, or if the solution is not finite.
///
/// Singularity is detected after factorising by solving `AᵀA y = z` for a fixed random
/// `z`. Then `max_j ‖A e_j‖² · ‖y‖ / ‖z‖` is a lower bound on the condition number of
/// `AᵀA`, and a null space direction makes it blow up to about `1 / ε`.
pub fn solve_normal_equations(a: &SparseMatrix, rhs: MatRef<f64>) -> Result<Mat<f64>, SolveError> {
    if rhs.nrows() != a.nrows() {
        return Err(SolveError::DimensionMismatch {
            what: "rhs",
            expected: a.nrows(),
            found: rhs.nrows(),
        });
    }

    let n = a.ncols();
    if n == 0 {
        return Ok(Mat::zeros(0, 1));
    }

    let mut col_norm_sq = vec![0.0f64; n];
    for (&c, &v) in a.col_idx.iter().zip(&a.values) {
        col_norm_sq[c] += v * v;
    }
    if let Some(unknown) = col_norm_sq.iter().position(|&sq| sq == 0.0) {
        return Err(SolveError::Underdetermined { unknown });
    }

    let ata = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &a.normal_triplets())
        .map_err(|e| SolveError::Factorization(format!("building normal matrix: {e:?}")))?;

    let lu = ata
        .sp_lu()
        .map_err(|e| SolveError::Factorization(format!("{e:?}")))?;

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let z: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
    let z = col_from_slice(&z);
    let y = lu.solve(z.as_ref());

    let diag_max = col_norm_sq.iter().copied().fold(0.0, f64::max);
    let condition_estimate = diag_max * y.norm_l2() / z.norm_l2();
    if !(condition_estimate <= MAX_NORMAL_CONDITION) {
        return Err(SolveError::Singular { condition_estimate });
    }

    let atb = a.rmatvec(rhs);
    let x = lu.solve(atb);

    if let Some(index) = (0..n).find(|&i| !x[(i, 0)].is_finite()) {
        return Err(SolveError::NonFinite { index });
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;
    use faer::utils::approx::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_triplets(nrows: usize, ncols: usize, count: usize, seed: u64) -> Vec<Triplet> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                Triplet::new(
                    rng.random_range(0..nrows),
                    rng.random_range(0..ncols),
                    rng.random_range(-1.0..1.0),
                )
            })
            .collect()
    }

    fn dense_from_triplets(nrows: usize, ncols: usize, triplets: &[Triplet]) -> Mat<f64> {
        let mut dense = Mat::<f64>::zeros(nrows, ncols);
        for t in triplets {
            dense[(t.row, t.col)] += t.value;
        }
        dense
    }

    #[test]
    fn duplicates_are_summed() {
        let triplets = [
            Triplet::new(0, 1, 1.0),
            Triplet::new(1, 0, 2.0),
            Triplet::new(0, 1, 0.5),
            Triplet::new(0, 0, -1.0),
        ];
        let a = SparseMatrix::from_triplets(2, 2, &triplets).expect("valid triplets");

        assert_eq!(a.nnz(), 3);
        assert_eq!(a.row(0), (&[0usize, 1][..], &[-1.0, 1.5][..]));
        assert_eq!(a.row(1), (&[0usize][..], &[2.0][..]));
    }

    #[test]
    fn single_unknown_duplicate_direct_solve() {
        let triplets = [Triplet::new(0, 0, 1.0), Triplet::new(0, 0, 1.0)];
        let a = SparseMatrix::from_triplets(1, 1, &triplets).expect("valid triplets");

        let x = solve_normal_equations(&a, col_from_slice(&[4.0]).as_ref()).expect("solvable");
        assert!((x[(0, 0)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_bounds_triplet_is_rejected() {
        let err = SparseMatrix::from_triplets(2, 2, &[Triplet::new(2, 0, 1.0)])
            .expect_err("row 2 is outside a 2x2 system");
        assert!(matches!(err, SolveError::IndexOutOfBounds { row: 2, .. }));
    }

    #[test]
    fn products_match_dense() {
        let (nrows, ncols) = (40, 25);
        let triplets = random_triplets(nrows, ncols, 200, 7);
        let a = SparseMatrix::from_triplets(nrows, ncols, &triplets).expect("valid triplets");
        let dense = dense_from_triplets(nrows, ncols, &triplets);

        let x = Mat::<f64>::from_fn(ncols, 1, |i, _| (i as f64).sin());
        let y = Mat::<f64>::from_fn(nrows, 1, |i, _| (i as f64).cos());

        let approx_eq = CwiseMat(ApproxEq::eps() * 128.0 * (nrows as f64));
        assert!(&a.matvec(x.as_ref()) ~ &(&dense * &x));
        assert!(&a.rmatvec(y.as_ref()) ~ &(dense.transpose() * &y));
        assert!(&a.transpose().matvec(y.as_ref()) ~ &a.rmatvec(y.as_ref()));
    }

    #[test]
    fn overdetermined_least_squares() {
        // Fit x0 + x1 * t to four points on the line 1 + 2t.
        let ts = [0.0, 1.0, 2.0, 3.0];
        let mut triplets = Vec::new();
        for (row, &t) in ts.iter().enumerate() {
            triplets.push(Triplet::new(row, 0, 1.0));
            triplets.push(Triplet::new(row, 1, t));
        }
        let rhs: Vec<f64> = ts.iter().map(|t| 1.0 + 2.0 * t).collect();
        let a = SparseMatrix::from_triplets(4, 2, &triplets).expect("valid triplets");

        let x = solve_normal_equations(&a, col_from_slice(&rhs).as_ref()).expect("solvable");
        assert!((x[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((x[(1, 0)] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn undetermined_unknown_fails() {
        let a = SparseMatrix::from_triplets(1, 2, &[Triplet::new(0, 0, 1.0)])
            .expect("valid triplets");
        let err = solve_normal_equations(&a, col_from_slice(&[1.0]).as_ref())
            .expect_err("x1 is free");
        assert_eq!(err, SolveError::Underdetermined { unknown: 1 });
    }

    /// Rows `scale * (x[i] - x[i + 1])` chaining `n` unknowns.
    fn difference_rows(n: usize, scale: f64) -> Vec<Triplet> {
        (0..n - 1)
            .flat_map(|i| [Triplet::new(i, i, -scale), Triplet::new(i, i + 1, scale)])
            .collect()
    }

    #[test]
    fn constant_null_space_is_singular() {
        // Differences only: any constant can be added to a solution.
        let triplets = difference_rows(35, 1.0);
        let a = SparseMatrix::from_triplets(34, 35, &triplets).expect("valid triplets");

        let err = solve_normal_equations(&a, Mat::<f64>::zeros(34, 1).as_ref())
            .expect_err("constants are free");
        assert!(matches!(err, SolveError::Singular { .. }), "{err:?}");
    }

    #[test]
    fn fewer_equations_than_unknowns_is_singular() {
        // Second differences plus one pin leave the slope free.
        let n = 10;
        let mut triplets: Vec<Triplet> = (0..n - 2)
            .flat_map(|i| {
                [
                    Triplet::new(i, i, 1.0),
                    Triplet::new(i, i + 1, -2.0),
                    Triplet::new(i, i + 2, 1.0),
                ]
            })
            .collect();
        triplets.push(Triplet::new(n - 2, 2, 0.7));
        triplets.push(Triplet::new(n - 2, 3, 0.3));
        let mut rhs = vec![0.0; n - 1];
        rhs[n - 2] = 2.3;
        let a = SparseMatrix::from_triplets(n - 1, n, &triplets).expect("valid triplets");

        let err = solve_normal_equations(&a, col_from_slice(&rhs).as_ref())
            .expect_err("slope is free");
        assert!(matches!(err, SolveError::Singular { .. }), "{err:?}");
    }

    #[test]
    fn pinned_differences_are_not_singular() {
        let n = 200;
        let mut triplets = difference_rows(n, 1.0);
        triplets.push(Triplet::new(n - 1, n / 2, 1e-2));
        let mut rhs = vec![0.0; n];
        rhs[n - 1] = 1e-2 * 4.0;
        let a = SparseMatrix::from_triplets(n, n, &triplets).expect("valid triplets");

        let x = solve_normal_equations(&a, col_from_slice(&rhs).as_ref()).expect("pinned");
        for i in 0..n {
            assert!((x[(i, 0)] - 4.0).abs() < 1e-6);
        }
    }
}
