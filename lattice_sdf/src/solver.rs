/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides the public least-squares entry points: direct, warm-started and multiresolution.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # solver
//!
//! Every entry point minimises `‖A x - b‖₂` for the matrix `A` described by a list of
//! [`Triplet`]s (duplicates summed) and the right-hand side `b`.
//!
//! - [`solve`] factorises the normal equations, or runs CGLS when the system is too large.
//! - [`solve_with_guess`] runs CGLS from a caller supplied starting point.
//! - [`solve_approximate`] treats the unknowns as a lattice. It solves a coarser lattice
//!   first and refines the prolonged result with tile sweeps or CGLS, see [`SolveOptions`].

use crate::{
    config::SolveOptions,
    equation::Triplet,
    iterative_solvers::{IterativeSolution, Stopping, cgls},
    lattice::Lattice,
    linalg::{SolveError, SparseMatrix, col_from_slice, solve_normal_equations},
    preconditioning::{coarse_level::CoarseLevel, schwarz::tiled_solve},
    progress::{ProgressMsg, ProgressSink},
};
use faer::{Mat, MatRef};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Largest system [`solve`] factorises directly.
pub const DIRECT_SOLVE_THRESHOLD: usize = 40_000;

/// Coarse lattices with fewer unknowns are not built.
pub const MIN_COARSE_UNKNOWNS: usize = 16;

const PLAIN_SOLVE_TOLERANCE: f64 = 1e-6;

/// Iteration cap of the CGLS solves that take no [`SolveOptions`].
#[inline]
pub fn default_iteration_cap(num_unknowns: usize) -> usize {
    (2 * num_unknowns).clamp(100, 20_000)
}

/// Solves the least-squares system with `num_unknowns` unknowns.
///
/// # Errors
/// If a triplet lies outside the system, some unknown is unconstrained, the equations
/// are singular or the solution is not finite.
///
/// # Example
/// ```
/// use lattice_sdf::{Triplet, solve};
///
/// // Two equal entries in the same cell sum to 2, so 2 x = 4.
/// let triplets = [Triplet::new(0, 0, 1.0), Triplet::new(0, 0, 1.0)];
/// let x = solve(1, &triplets, &[4.0]).unwrap();
/// assert!((x[0] - 2.0).abs() < 1e-12);
/// ```
#[instrument(skip_all, name = "solve", fields(num_unknowns = num_unknowns, num_equations = rhs.len()))]
pub fn solve(num_unknowns: usize, triplets: &[Triplet], rhs: &[f64]) -> Result<Vec<f64>, SolveError> {
    let a = SparseMatrix::from_triplets(rhs.len(), num_unknowns, triplets)?;
    let b = col_from_slice(rhs);

    if num_unknowns <= DIRECT_SOLVE_THRESHOLD {
        let x = solve_normal_equations(&a, b.as_ref())?;
        return finite_vec(x.as_ref());
    }

    debug!("system too large to factorise, using CGLS");
    let solution = run_cgls(
        &a,
        b.as_ref(),
        None,
        default_iteration_cap(num_unknowns),
        Stopping::NormalResidual(PLAIN_SOLVE_TOLERANCE),
        None,
    );
    finite_vec(solution.x.as_ref())
}

/// Refines `guess` with CGLS until the max norm of `Aᵀ(b - A x)` is below
/// `error_tolerance` or the iteration cap is reached.
///
/// The number of unknowns is `guess.len()`. The last iterate is returned whether or not
/// the tolerance was met.
///
/// # Errors
/// If a triplet lies outside the system or the iterate is not finite.
#[instrument(skip_all, name = "solve_with_guess", fields(num_unknowns = guess.len()))]
pub fn solve_with_guess(
    triplets: &[Triplet],
    rhs: &[f64],
    guess: &[f64],
    error_tolerance: f64,
) -> Result<Vec<f64>, SolveError> {
    let a = SparseMatrix::from_triplets(rhs.len(), guess.len(), triplets)?;
    let b = col_from_slice(rhs);
    let x0 = col_from_slice(guess);

    let solution = run_cgls(
        &a,
        b.as_ref(),
        Some(&x0),
        default_iteration_cap(guess.len()),
        Stopping::NormalResidual(error_tolerance),
        None,
    );
    finite_vec(solution.x.as_ref())
}

/// Approximate solve of a system whose unknowns are the nodes of a lattice with sizes
/// `full_sizes`.
///
/// See [`solve_approximate_with_progress`].
pub fn solve_approximate(
    triplets: &[Triplet],
    rhs: &[f64],
    full_sizes: &[usize],
    options: &SolveOptions,
) -> Result<Vec<f64>, SolveError> {
    solve_approximate_with_progress(triplets, rhs, full_sizes, options, None)
}

/// Approximate solve of a system whose unknowns are the nodes of a lattice with sizes
/// `full_sizes`, reporting progress to `callback`.
///
/// Each lattice level is solved in three steps.
/// 1. If `options.downscale_factor > 1` and the lattice can shrink, the same equations
///    are solved on the coarse lattice, and the multilinear upsampling of that result
///    becomes the starting point. Otherwise the start is zero.
/// 2. If `options.tile` is set and the lattice spans several tiles, overlapping tiles are
///    swept from the starting point until the tolerance or the sweep budget is reached.
/// 3. Otherwise CGLS refines the starting point when `options.cg` is set, until its
///    estimate of the solution error drops to `options.error_tolerance`. A direct solve
///    is used when `cg` is not set.
///
/// With `tile` and `cg` both unset the full lattice is solved directly, which gives the
/// same result as [`solve`].
///
/// # Errors
/// If a triplet lies outside the lattice, a direct solve fails or the result is not
/// finite. A failing coarse level is logged and replaced by a zero starting point.
///
/// # Panics
/// If `full_sizes` is not a valid lattice.
#[instrument(skip_all, name = "solve_approximate", fields(sizes = ?full_sizes))]
pub fn solve_approximate_with_progress(
    triplets: &[Triplet],
    rhs: &[f64],
    full_sizes: &[usize],
    options: &SolveOptions,
    callback: Option<Arc<dyn ProgressSink>>,
) -> Result<Vec<f64>, SolveError> {
    let lattice = Lattice::new(full_sizes);
    let a = SparseMatrix::from_triplets(rhs.len(), lattice.num_unknowns(), triplets)?;
    let b = col_from_slice(rhs);

    let x = solve_level(&a, b.as_ref(), &lattice, options, 0, &callback)?;
    finite_vec(x.as_ref())
}

fn solve_level(
    a: &SparseMatrix,
    b: MatRef<f64>,
    lattice: &Lattice,
    options: &SolveOptions,
    level: usize,
    callback: &Option<Arc<dyn ProgressSink>>,
) -> Result<Mat<f64>, SolveError> {
    let num_unknowns = lattice.num_unknowns();

    if !options.tile && !options.cg {
        let x = solve_normal_equations(a, b)?;
        level_solved(level, num_unknowns, callback);
        return Ok(x);
    }

    let guess = match CoarseLevel::new(lattice, options.downscale_factor, MIN_COARSE_UNKNOWNS) {
        Some(coarse) => {
            let restricted = coarse.restrict_system(a);
            let coarse_a =
                SparseMatrix::from_triplets(a.nrows(), coarse.lattice.num_unknowns(), &restricted)?;

            match solve_level(&coarse_a, b, &coarse.lattice, options, level + 1, callback) {
                Ok(y) => coarse.prolongate(y.as_ref()),
                Err(e) => {
                    warn!(level = level + 1, error = %e, "coarse level failed, starting from zero");
                    if let Some(sink) = callback {
                        sink.emit(ProgressMsg::Message {
                            message: format!(
                                "level {} failed ({e}), level {level} starts from zero",
                                level + 1
                            ),
                        });
                    }
                    Mat::zeros(num_unknowns, 1)
                }
            }
        }
        None => Mat::zeros(num_unknowns, 1),
    };

    let tiled = if options.tile {
        tiled_solve(a, b, lattice, guess.as_ref(), options, level, callback.clone())?
    } else {
        None
    };

    let x = match tiled {
        Some(solution) => {
            report_unconverged(&solution, level, "tile sweeps");
            solution.x
        }
        None if options.cg => {
            let solution = run_cgls(
                a,
                b,
                Some(&guess),
                options.max_iterations,
                Stopping::SolutionError(options.error_tolerance),
                callback.clone(),
            );
            report_unconverged(&solution, level, "CGLS");
            solution.x
        }
        None => solve_normal_equations(a, b)?,
    };

    level_solved(level, num_unknowns, callback);
    Ok(x)
}

fn run_cgls(
    a: &SparseMatrix,
    b: MatRef<f64>,
    x0: Option<&Mat<f64>>,
    max_iterations: usize,
    stop: Stopping,
    callback: Option<Arc<dyn ProgressSink>>,
) -> IterativeSolution {
    let solution = cgls(
        &|x: MatRef<f64>| a.matvec(x),
        &|y: MatRef<f64>| a.rmatvec(y),
        b,
        x0,
        max_iterations,
        stop,
        callback,
    );
    if !solution.converged {
        warn!(
            iterations = solution.iterations,
            residual = solution.residual,
            stop = ?stop,
            "CGLS stopped at its iteration cap"
        );
    }
    solution
}

fn report_unconverged(solution: &IterativeSolution, level: usize, method: &str) {
    if solution.converged {
        debug!(level, iterations = solution.iterations, residual = solution.residual, method, "level converged");
    } else {
        warn!(
            level,
            iterations = solution.iterations,
            residual = solution.residual,
            method,
            "level did not reach the error tolerance"
        );
    }
}

fn level_solved(level: usize, num_unknowns: usize, callback: &Option<Arc<dyn ProgressSink>>) {
    debug!(level, num_unknowns, "lattice level solved");
    if let Some(sink) = callback {
        sink.emit(ProgressMsg::LevelSolved {
            level,
            num_unknowns,
        });
    }
}

fn finite_vec(x: MatRef<f64>) -> Result<Vec<f64>, SolveError> {
    (0..x.nrows())
        .map(|i| {
            let v = x[(i, 0)];
            if v.is_finite() {
                Ok(v)
            } else {
                Err(SolveError::NonFinite { index: i })
            }
        })
        .collect()
}
