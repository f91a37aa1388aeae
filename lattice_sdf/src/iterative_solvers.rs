/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements conjugate gradient least squares and the Schwarz sweep loop for lattice systems.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Iterative least-squares solvers.
//!
//! Both solvers track the max norm of the normal equation residual `Aᵀ(b - A x)`, which
//! vanishes at the least-squares minimiser even when `A x = b` has no exact solution.
//! CGLS can instead stop on an estimate of the solution error, see [`Stopping`].
//!
//! # References
//! 1.  C. C. Paige and M. A. Saunders. LSQR: An algorithm for sparse linear equations and
//!     sparse least squares. ACM Trans. Math. Softw., 8(1):43–71, 1982.
//! 2.  Å. Björck. Numerical Methods for Least Squares Problems. SIAM, 1996.
//! 3.  Y. Saad. Iterative Methods for Sparse Linear Systems, 2nd ed., §6.7.3. SIAM, 2003.

use crate::{
    linalg::dot,
    progress::{ProgressMsg, ProgressSink, progress_from_rel},
};
use faer::{Mat, MatRef};
use std::sync::Arc;

/// Final iterate of an iterative solve and how it got there.
#[derive(Debug, Clone)]
pub struct IterativeSolution {
    pub x: Mat<f64>,
    pub iterations: usize,
    /// Max norm of `Aᵀ(b - A x)` at `x`.
    pub residual: f64,
    pub converged: bool,
}

/// Stopping rule of [`cgls`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stopping {
    /// Stop once `max |Aᵀ(b - A x)|` drops to the tolerance.
    NormalResidual(f64),
    /// Stop once `‖Aᵀ(b - A x)‖₂ / θ` drops to the tolerance, where `θ` is the smallest
    /// Ritz value of `AᵀA` found so far. This estimates `‖x - x*‖₂` from above as `θ`
    /// approaches the smallest eigenvalue, so it holds when the smoothness terms make the
    /// normal residual a poor measure of the error.
    SolutionError(f64),
}

/// Lanczos tridiagonal of `AᵀA` recovered from the CG coefficients.
#[derive(Debug, Default)]
struct RitzTracker {
    diag: Vec<f64>,
    offdiag_sq: Vec<f64>,
    last: Option<(f64, f64)>,
}

impl RitzTracker {
    /// Records step coefficient `alpha`, then `beta` once the next residual is known.
    fn push(&mut self, alpha: f64, beta: f64) {
        match self.last {
            None => self.diag.push(1.0 / alpha),
            Some((alpha_prev, beta_prev)) => {
                self.diag.push(1.0 / alpha + beta_prev / alpha_prev);
                self.offdiag_sq.push(beta_prev / (alpha_prev * alpha_prev));
            }
        }
        self.last = Some((alpha, beta));
    }

    /// Number of eigenvalues below `x`, by Sturm sequence.
    fn count_below(&self, x: f64) -> usize {
        let mut count = 0;
        let mut q = 1.0;
        for (i, &d) in self.diag.iter().enumerate() {
            q = if i == 0 { d - x } else { d - x - self.offdiag_sq[i - 1] / q };
            if q == 0.0 {
                q = f64::EPSILON * d.abs().max(f64::MIN_POSITIVE);
            }
            if q < 0.0 {
                count += 1;
            }
        }
        count
    }

    /// Smallest Ritz value to about one percent, by bisection below the smallest diagonal.
    fn smallest(&self) -> f64 {
        let mut hi = self.diag.iter().copied().fold(f64::INFINITY, f64::min);
        let mut lo = 0.0;
        for _ in 0..100 {
            if hi - lo <= 1e-2 * hi {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if self.count_below(mid) > 0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo
    }
}

/// Conjugate gradients on the normal equations (CGLS).
///
/// Minimises `‖A x - b‖₂` without forming `AᵀA`, starting from `x0` (or zero) and stopping
/// on `stop` or once `max_iterations` is reached. The last iterate is returned either way.
///
/// # Parameters
/// - `matvec`: Operator function `A(x)`
/// - `rmatvec`: Transposed operator function `Aᵀ(y)`
/// - `rhs`: Right-hand side vector
/// - `x0`: Optional initial guess
/// - `max_iterations`: Iteration cap
/// - `stop`: Stopping rule
/// - `callback`: Optional progress sink
pub fn cgls<A, AT>(
    matvec: &A,
    rmatvec: &AT,
    rhs: MatRef<f64>,
    x0: Option<&Mat<f64>>,
    max_iterations: usize,
    stop: Stopping,
    callback: Option<Arc<dyn ProgressSink>>,
) -> IterativeSolution
where
    A: Fn(MatRef<f64>) -> Mat<f64>,
    AT: Fn(MatRef<f64>) -> Mat<f64>,
{
    let mut r = rhs.to_owned();
    let mut s = rmatvec(r.as_ref());
    let n = s.nrows();

    let mut x = match x0 {
        Some(guess) => {
            r = rhs - matvec(guess.as_ref());
            s = rmatvec(r.as_ref());
            guess.clone()
        }
        None => Mat::zeros(n, 1),
    };

    let mut p = s.clone();
    let mut gamma = dot(s.as_ref(), s.as_ref());

    let mut ritz = RitzTracker::default();
    let mut theta = f64::INFINITY;

    // The measure compared against `target`. Lowering `theta` only lowers the target.
    let measure = |s: &Mat<f64>, gamma: f64| match stop {
        Stopping::NormalResidual(_) => s.norm_max(),
        Stopping::SolutionError(_) => gamma.sqrt(),
    };
    let target = |theta: f64| match stop {
        Stopping::NormalResidual(tol) => tol,
        Stopping::SolutionError(tol) => tol * theta,
    };

    let start = measure(&s, gamma);
    let mut current = start;
    let mut converged = match stop {
        Stopping::NormalResidual(tol) => current <= tol,
        Stopping::SolutionError(_) => gamma == 0.0,
    };
    let mut iteration = 0usize;

    while !converged && iteration < max_iterations {
        let q = matvec(p.as_ref());
        let qq = dot(q.as_ref(), q.as_ref());
        if !(qq > 0.0 && qq.is_finite()) {
            break;
        }
        let alpha = gamma / qq;

        for i in 0..n {
            x[(i, 0)] += alpha * p[(i, 0)];
        }
        for i in 0..r.nrows() {
            r[(i, 0)] -= alpha * q[(i, 0)];
        }

        s = rmatvec(r.as_ref());
        let gamma_new = dot(s.as_ref(), s.as_ref());
        let beta = gamma_new / gamma;
        for i in 0..n {
            p[(i, 0)] = s[(i, 0)] + beta * p[(i, 0)];
        }
        gamma = gamma_new;
        ritz.push(alpha, beta);

        current = measure(&s, gamma);
        iteration += 1;

        if current <= target(theta) {
            if matches!(stop, Stopping::SolutionError(_)) {
                theta = ritz.smallest();
            }
            converged = current <= target(theta);
        }

        if let Some(sink) = &callback {
            let goal = target(theta.min(ritz.diag[0]));
            sink.emit(ProgressMsg::SolverIteration {
                iter: iteration,
                residual: s.norm_max(),
                progress: progress_from_rel(current, start, goal),
            });
        }
    }

    IterativeSolution {
        x,
        iterations: iteration,
        residual: s.norm_max(),
        converged,
    }
}

/// Outer loop of the multiplicative Schwarz solver.
///
/// Each call of `sweep` must update the iterate `x` and the residual `b - A x` in place.
/// Sweeps repeat until the normal residual max norm drops to `tolerance` or `max_sweeps`
/// sweeps have been made.
#[allow(clippy::too_many_arguments)]
pub fn schwarz_sweep_solver<A, AT, S>(
    matvec: &A,
    rmatvec: &AT,
    rhs: MatRef<f64>,
    x0: Mat<f64>,
    sweep: &S,
    max_sweeps: usize,
    tolerance: f64,
    level: usize,
    num_tiles: usize,
    callback: Option<Arc<dyn ProgressSink>>,
) -> IterativeSolution
where
    A: Fn(MatRef<f64>) -> Mat<f64>,
    AT: Fn(MatRef<f64>) -> Mat<f64>,
    S: Fn(&mut Mat<f64>, &mut Mat<f64>),
{
    let mut sg = x0;
    let mut rg = rhs - matvec(sg.as_ref());

    let mut res_norm = rmatvec(rg.as_ref()).norm_max();
    let mut iteration = 0usize;

    while res_norm > tolerance && iteration < max_sweeps {
        sweep(&mut sg, &mut rg);
        // Refresh the residual from scratch so rounding in the tile updates cannot drift.
        rg = rhs - matvec(sg.as_ref());
        res_norm = rmatvec(rg.as_ref()).norm_max();

        iteration += 1;

        if let Some(sink) = &callback {
            sink.emit(ProgressMsg::TileSweep {
                level,
                sweep: iteration,
                num_tiles,
                residual: res_norm,
            });
        }
    }

    IterativeSolution {
        x: sg,
        iterations: iteration,
        residual: res_norm,
        converged: res_norm <= tolerance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::Triplet;
    use crate::linalg::{SparseMatrix, col_from_slice, solve_normal_equations};
    use equator::assert;
    use faer::utils::approx::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSink {
        messages: Mutex<Vec<ProgressMsg>>,
    }

    impl ProgressSink for RecordingSink {
        fn emit(&self, msg: ProgressMsg) {
            if let Ok(mut guard) = self.messages.lock() {
                guard.push(msg);
            }
        }
    }

    /// Random tall system with a unit diagonal block so it has full column rank.
    fn random_full_rank_system(nrows: usize, ncols: usize, seed: u64) -> (SparseMatrix, Mat<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut triplets: Vec<Triplet> = (0..ncols).map(|i| Triplet::new(i, i, 1.0)).collect();
        for _ in 0..(3 * nrows) {
            triplets.push(Triplet::new(
                rng.random_range(0..nrows),
                rng.random_range(0..ncols),
                rng.random_range(-0.5..0.5),
            ));
        }
        let rhs: Vec<f64> = (0..nrows).map(|_| rng.random_range(-1.0..1.0)).collect();
        let a = SparseMatrix::from_triplets(nrows, ncols, &triplets).expect("valid triplets");
        (a, col_from_slice(&rhs))
    }

    #[test]
    fn cgls_matches_direct_solve() {
        let (a, b) = random_full_rank_system(60, 30, 3);
        let direct = solve_normal_equations(&a, b.as_ref()).expect("full rank");

        let solution = cgls(
            &|x: MatRef<f64>| a.matvec(x),
            &|y: MatRef<f64>| a.rmatvec(y),
            b.as_ref(),
            None,
            500,
            Stopping::NormalResidual(1e-12),
            None,
        );

        assert!(solution.converged);
        let approx_eq = CwiseMat(ApproxEq::eps() * 1e8);
        assert!(&solution.x ~ &direct);
    }

    #[test]
    fn cgls_warm_start_at_solution_does_not_iterate() {
        let (a, b) = random_full_rank_system(20, 10, 11);
        let direct = solve_normal_equations(&a, b.as_ref()).expect("full rank");

        let solution = cgls(
            &|x: MatRef<f64>| a.matvec(x),
            &|y: MatRef<f64>| a.rmatvec(y),
            b.as_ref(),
            Some(&direct),
            500,
            Stopping::NormalResidual(1e-6),
            None,
        );

        assert_eq!(solution.iterations, 0);
        assert!(solution.converged);
    }

    #[test]
    fn cgls_respects_iteration_cap_and_reports_progress() {
        let (a, b) = random_full_rank_system(80, 40, 5);
        let sink = Arc::new(RecordingSink::default());

        let solution = cgls(
            &|x: MatRef<f64>| a.matvec(x),
            &|y: MatRef<f64>| a.rmatvec(y),
            b.as_ref(),
            None,
            3,
            Stopping::NormalResidual(0.0),
            Some(sink.clone()),
        );

        assert_eq!(solution.iterations, 3);
        assert!(!solution.converged);
        let messages = sink.messages.lock().expect("lock");
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[2], ProgressMsg::SolverIteration { iter: 3, .. }));
    }

    #[test]
    fn ritz_values_bracket_the_spectrum() {
        // CG on diag(1, 4, 9) from a residual touching every eigenvector.
        let diag = [1.0, 4.0, 9.0];
        let triplets: Vec<Triplet> = diag
            .iter()
            .enumerate()
            .map(|(i, d)| Triplet::new(i, i, f64::sqrt(*d)))
            .collect();
        let a = SparseMatrix::from_triplets(3, 3, &triplets).expect("valid triplets");
        let b = col_from_slice(&[1.0, 1.0, 1.0]);

        let mut ritz = RitzTracker::default();
        let mut x = Mat::<f64>::zeros(3, 1);
        let mut r = b.clone();
        let mut s = a.rmatvec(r.as_ref());
        let mut p = s.clone();
        let mut gamma = dot(s.as_ref(), s.as_ref());
        for _ in 0..3 {
            let q = a.matvec(p.as_ref());
            let alpha = gamma / dot(q.as_ref(), q.as_ref());
            for i in 0..3 {
                x[(i, 0)] += alpha * p[(i, 0)];
                r[(i, 0)] -= alpha * q[(i, 0)];
            }
            s = a.rmatvec(r.as_ref());
            let gamma_new = dot(s.as_ref(), s.as_ref());
            let beta = gamma_new / gamma;
            for i in 0..3 {
                p[(i, 0)] = s[(i, 0)] + beta * p[(i, 0)];
            }
            gamma = gamma_new;
            ritz.push(alpha, beta);

            let smallest = ritz.smallest();
            assert!((0.98..=9.0).contains(&smallest), "Ritz value {smallest}");
        }
        assert!((ritz.smallest() - 1.0).abs() < 2e-2);
    }

    #[test]
    fn cgls_solution_error_rule_bounds_error() {
        // Second differences with weak pins: tiny normal residuals, large errors.
        let n = 60;
        let mut triplets = Vec::new();
        let mut rhs = Vec::new();
        for i in 0..n - 2 {
            triplets.push(Triplet::new(i, i, 1.0));
            triplets.push(Triplet::new(i, i + 1, -2.0));
            triplets.push(Triplet::new(i, i + 2, 1.0));
            rhs.push(0.0);
        }
        for (k, &(node, value)) in [(5usize, 1.0), (50usize, -1.0)].iter().enumerate() {
            triplets.push(Triplet::new(n - 2 + k, node, 0.05));
            rhs.push(0.05 * value);
        }
        let a = SparseMatrix::from_triplets(n, n, &triplets).expect("valid triplets");
        let b = col_from_slice(&rhs);
        let direct = solve_normal_equations(&a, b.as_ref()).expect("full rank");

        let tolerance = 1e-3;
        let solution = cgls(
            &|x: MatRef<f64>| a.matvec(x),
            &|y: MatRef<f64>| a.rmatvec(y),
            b.as_ref(),
            None,
            10_000,
            Stopping::SolutionError(tolerance),
            None,
        );

        assert!(solution.converged);
        let max_error = (0..n)
            .map(|i| (solution.x[(i, 0)] - direct[(i, 0)]).abs())
            .fold(0.0, f64::max);
        assert!(max_error < tolerance, "Error {max_error}");
    }

    #[test]
    fn schwarz_loop_with_exact_sweep_converges_in_one() {
        let (a, b) = random_full_rank_system(30, 12, 9);
        let direct = solve_normal_equations(&a, b.as_ref()).expect("full rank");

        let sweep = |x: &mut Mat<f64>, _r: &mut Mat<f64>| {
            *x = direct.clone();
        };

        let solution = schwarz_sweep_solver(
            &|x: MatRef<f64>| a.matvec(x),
            &|y: MatRef<f64>| a.rmatvec(y),
            b.as_ref(),
            Mat::zeros(12, 1),
            &sweep,
            10,
            1e-8,
            0,
            1,
            None,
        );

        assert_eq!(solution.iterations, 1);
        assert!(solution.converged);
    }
}
