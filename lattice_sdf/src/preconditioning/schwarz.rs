/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements coloured multiplicative Schwarz sweeps over overlapping lattice tiles.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # schwarz
//!
//! Tiled least-squares solver for lattice systems.
//!
//! One sweep visits the tile colours in turn. The tiles of a colour are solved in parallel
//! against the current residual, each minimising the global objective over its own
//! (overlapping) nodes with every other node held fixed, and their full corrections are
//! added. Since same-colour tiles share no equations their corrections do not interfere,
//! and each colour step can only decrease `‖A x - b‖₂`. The overlap lets information cross
//! tile boundaries within a single sweep, and repeated sweeps reconcile the tiles.
//!
//! This is Multiplicative Schwarz between colours and Additive Schwarz within a colour,
//! i.e. block Gauss-Seidel on the normal equations with overlapping blocks.

use super::domain_decomposition::{Tile, TileDecomposition};
use crate::{
    config::SolveOptions,
    iterative_solvers::{IterativeSolution, Stopping, cgls, schwarz_sweep_solver},
    lattice::Lattice,
    linalg::{SolveError, SparseMatrix, solve_normal_equations},
    progress::ProgressSink,
};
use faer::{Mat, MatRef};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::sync::Arc;
use tracing::debug;

/// Solves `min ‖A x - b‖₂` on `lattice` with tile sweeps, starting from `x0`.
///
/// Returns `None` when the lattice fits in a single tile, so the caller can solve it whole.
pub fn tiled_solve(
    a: &SparseMatrix,
    rhs: MatRef<f64>,
    lattice: &Lattice,
    x0: MatRef<f64>,
    options: &SolveOptions,
    level: usize,
    callback: Option<Arc<dyn ProgressSink>>,
) -> Result<Option<IterativeSolution>, SolveError> {
    let decomposition = TileDecomposition::new(lattice, a, options.tile_size)?;
    if decomposition.num_tiles() < 2 {
        return Ok(None);
    }

    debug!(
        level,
        num_tiles = decomposition.num_tiles(),
        num_colours = decomposition.colours.len(),
        overlap = decomposition.overlap,
        "tiled lattice level"
    );

    let sweep = |x: &mut Mat<f64>, r: &mut Mat<f64>| {
        for colour in &decomposition.colours {
            let residual = r.as_ref();
            let corrections: Vec<(usize, Mat<f64>)> = colour
                .par_iter()
                .map(|&t| (t, solve_tile(&decomposition.tiles[t], residual, options)))
                .collect();

            for (t, delta) in corrections {
                let tile = &decomposition.tiles[t];
                for (k, &g) in tile.overlapping_indices.iter().enumerate() {
                    x[(g, 0)] += delta[(k, 0)];
                }
                let change = tile.local.matvec(delta.as_ref());
                for (k, &row) in tile.rows.iter().enumerate() {
                    r[(row, 0)] -= change[(k, 0)];
                }
            }
        }
    };

    let solution = schwarz_sweep_solver(
        &|x: MatRef<f64>| a.matvec(x),
        &|y: MatRef<f64>| a.rmatvec(y),
        rhs,
        x0.to_owned(),
        &sweep,
        options.max_sweeps(),
        options.error_tolerance,
        level,
        decomposition.num_tiles(),
        callback,
    );

    Ok(Some(solution))
}

/// Best correction of the tile's nodes for the current residual.
fn solve_tile(tile: &Tile, residual: MatRef<f64>, options: &SolveOptions) -> Mat<f64> {
    let local_rhs = Mat::from_fn(tile.rows.len(), 1, |k, _| residual[(tile.rows[k], 0)]);

    if !options.cg {
        if let Ok(delta) = solve_normal_equations(&tile.local, local_rhs.as_ref()) {
            return delta;
        }
    }

    // Also the fallback for tiles whose nodes are not all pinned down by their equations.
    cgls(
        &|x: MatRef<f64>| tile.local.matvec(x),
        &|y: MatRef<f64>| tile.local.rmatvec(y),
        local_rhs.as_ref(),
        None,
        options.max_iterations,
        Stopping::NormalResidual(0.5 * options.error_tolerance),
        None,
    )
    .x
}
