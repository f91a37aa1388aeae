/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds the overlapping, coloured tile decomposition of a lattice for Schwarz sweeps.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # domain_decomposition
//!
//! Splits a lattice into axis aligned tiles of `tile_size` nodes per axis and grows each
//! tile by an overlap margin into its neighbours. Every tile carries its local least-squares
//! problem: the columns of its (overlapping) nodes and every equation touching them.
//!
//! Tiles are coloured so that two tiles of the same colour never share an equation. Their
//! corrections are then independent and can be computed in parallel against the same
//! residual. The colour period along each axis is chosen from the widest stencil found in
//! the system, so the guarantee holds for any mix of constraints.

use rayon::prelude::*;

use crate::{
    equation::Triplet,
    lattice::Lattice,
    linalg::{SolveError, SparseMatrix},
};

/// A single overlapping tile.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Colour of the tile. Tiles of one colour share no equations.
    pub colour: usize,

    /// Lattice node indices of the tile including overlap, ascending.
    pub overlapping_indices: Vec<usize>,

    /// Rows of the global system touching any of the tile's nodes, ascending.
    pub rows: Vec<usize>,

    /// The global system restricted to `rows` and `overlapping_indices`.
    pub local: SparseMatrix,
}

/// Overlapping tiles covering a lattice, grouped by colour.
#[derive(Debug, Clone)]
pub struct TileDecomposition {
    /// Tiles ordered by their position on the grid of tiles, first axis fastest.
    pub tiles: Vec<Tile>,

    /// Tile indices of each colour. Empty colours are omitted.
    pub colours: Vec<Vec<usize>>,

    /// Number of nodes each tile extends into its neighbours.
    pub overlap: usize,
}

impl TileDecomposition {
    /// Decomposes `lattice` into tiles for the system `a`, whose columns are the lattice nodes.
    ///
    /// # Panics
    /// If `tile_size` is zero or `a` does not have one column per lattice node.
    pub fn new(lattice: &Lattice, a: &SparseMatrix, tile_size: usize) -> Result<Self, SolveError> {
        assert!(tile_size > 0, "tile_size must be at least 1");
        assert_eq!(a.ncols(), lattice.num_unknowns());

        let num_dims = lattice.num_dims();
        let overlap = (tile_size / 4).max(1);

        let tile_counts: Vec<usize> = lattice
            .sizes()
            .iter()
            .map(|&s| s.div_ceil(tile_size))
            .collect();
        let tile_grid = Lattice::new(&tile_counts);

        // Same-colour tiles are `period` tiles apart, leaving a gap of
        // `(period - 1) * tile_size - 2 * overlap` nodes between their extended regions.
        let span = max_row_span(lattice, a);
        let period = (1 + (span + 2 * overlap).div_ceil(tile_size)).max(2);

        let transpose = a.transpose();

        let tiles = (0..tile_grid.num_unknowns())
            .into_par_iter()
            .map(|t| -> Result<Tile, SolveError> {
                let tile_coord = tile_grid.coordinate_from_index(t);

                let mut colour = 0;
                let mut colour_stride = 1;
                for &tc in &tile_coord {
                    colour += (tc % period) * colour_stride;
                    colour_stride *= period;
                }

                let core_start: Vec<usize> = tile_coord.iter().map(|&tc| tc * tile_size).collect();
                let core_end: Vec<usize> = core_start
                    .iter()
                    .zip(lattice.sizes())
                    .map(|(&lo, &s)| (lo + tile_size).min(s))
                    .collect();

                let ext_start: Vec<usize> = core_start
                    .iter()
                    .map(|&lo| lo.saturating_sub(overlap))
                    .collect();
                let ext_end: Vec<usize> = core_end
                    .iter()
                    .zip(lattice.sizes())
                    .map(|(&hi, &s)| (hi + overlap).min(s))
                    .collect();

                let overlapping_indices = box_indices(lattice, &ext_start, &ext_end);

                let mut rows: Vec<usize> = overlapping_indices
                    .iter()
                    .flat_map(|&c| transpose.row(c).0.iter().copied())
                    .collect();
                rows.sort_unstable();
                rows.dedup();

                let mut local_triplets = Vec::new();
                for (local_row, &row) in rows.iter().enumerate() {
                    let (cols, vals) = a.row(row);
                    for (&c, &v) in cols.iter().zip(vals) {
                        if let Ok(local_col) = overlapping_indices.binary_search(&c) {
                            local_triplets.push(Triplet::new(local_row, local_col, v));
                        }
                    }
                }
                let local = SparseMatrix::from_triplets(
                    rows.len(),
                    overlapping_indices.len(),
                    &local_triplets,
                )?;

                Ok(Tile {
                    colour,
                    overlapping_indices,
                    rows,
                    local,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let num_colours = period.pow(num_dims as u32);
        let mut colours = vec![Vec::new(); num_colours];
        for (t, tile) in tiles.iter().enumerate() {
            colours[tile.colour].push(t);
        }
        colours.retain(|c| !c.is_empty());

        Ok(Self {
            tiles,
            colours,
            overlap,
        })
    }

    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }
}

/// Largest distance along any axis between two nodes sharing an equation.
fn max_row_span(lattice: &Lattice, a: &SparseMatrix) -> usize {
    let num_dims = lattice.num_dims();
    let mut coordinate = vec![0usize; num_dims];
    let mut lo = vec![0usize; num_dims];
    let mut hi = vec![0usize; num_dims];
    let mut span = 0;

    for row in 0..a.nrows() {
        let (cols, _) = a.row(row);
        for (k, &c) in cols.iter().enumerate() {
            lattice.coordinate_from_index_into(c, &mut coordinate);
            if k == 0 {
                lo.copy_from_slice(&coordinate);
                hi.copy_from_slice(&coordinate);
            } else {
                for d in 0..num_dims {
                    lo[d] = lo[d].min(coordinate[d]);
                    hi[d] = hi[d].max(coordinate[d]);
                }
            }
        }
        if !cols.is_empty() {
            span = (0..num_dims).map(|d| hi[d] - lo[d]).fold(span, usize::max);
        }
    }
    span
}

/// Ascending flat indices of all lattice nodes in the box `[start, end)`.
fn box_indices(lattice: &Lattice, start: &[usize], end: &[usize]) -> Vec<usize> {
    let extents: Vec<usize> = start.iter().zip(end).map(|(lo, hi)| hi - lo).collect();
    let block = Lattice::new(&extents);
    let mut coordinate = vec![0usize; lattice.num_dims()];

    (0..block.num_unknowns())
        .map(|i| {
            block.coordinate_from_index_into(i, &mut coordinate);
            for (c, lo) in coordinate.iter_mut().zip(start) {
                *c += lo;
            }
            lattice.index_from_coordinate(&coordinate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Weights, constraints::add_field_constraints, field::LatticeField};

    fn smoothness_system(sizes: &[usize]) -> (Lattice, SparseMatrix) {
        let mut field = LatticeField::new(sizes);
        let weights = Weights {
            model_0: 0.1,
            model_2: 1.0,
            ..Weights::default()
        };
        add_field_constraints(&mut field, &weights);
        let lattice = field.lattice().clone();
        let (triplets, rhs) = field.into_equation().into_parts();
        let a = SparseMatrix::from_triplets(rhs.len(), lattice.num_unknowns(), &triplets)
            .expect("valid triplets");
        (lattice, a)
    }

    fn run_core_partition_test(sizes: &[usize]) {
        let tile_size = 4;
        let (lattice, a) = smoothness_system(sizes);
        let decomposition = TileDecomposition::new(&lattice, &a, tile_size).expect("decomposition");

        let tile_counts: Vec<usize> = sizes.iter().map(|s| s.div_ceil(tile_size)).collect();
        let tile_grid = Lattice::new(&tile_counts);
        assert_eq!(decomposition.num_tiles(), tile_grid.num_unknowns());

        for index in 0..lattice.num_unknowns() {
            let coordinate = lattice.coordinate_from_index(index);
            let owner_coordinate: Vec<usize> = coordinate.iter().map(|c| c / tile_size).collect();
            let owner = &decomposition.tiles[tile_grid.index_from_coordinate(&owner_coordinate)];
            assert!(
                owner.overlapping_indices.binary_search(&index).is_ok(),
                "Node {index} is missing from the tile owning it"
            );
        }
    }

    #[test]
    fn core_partition_1d() {
        run_core_partition_test(&[19]);
    }

    #[test]
    fn core_partition_2d() {
        run_core_partition_test(&[10, 13]);
    }

    #[test]
    fn core_partition_3d() {
        run_core_partition_test(&[9, 6, 5]);
    }

    fn run_colour_independence_test(sizes: &[usize]) {
        let (lattice, a) = smoothness_system(sizes);
        let decomposition = TileDecomposition::new(&lattice, &a, 4).expect("decomposition");

        for colour in &decomposition.colours {
            for (i, &ti) in colour.iter().enumerate() {
                for &tj in &colour[i + 1..] {
                    let rows_i = &decomposition.tiles[ti].rows;
                    let shared = decomposition.tiles[tj]
                        .rows
                        .iter()
                        .any(|r| rows_i.binary_search(r).is_ok());
                    assert!(!shared, "Tiles {ti} and {tj} share a colour and an equation");
                }
            }
        }
    }

    #[test]
    fn colour_independence_1d() {
        run_colour_independence_test(&[30]);
    }

    #[test]
    fn colour_independence_2d() {
        run_colour_independence_test(&[17, 21]);
    }

    #[test]
    fn colour_independence_3d() {
        run_colour_independence_test(&[12, 9, 10]);
    }

    #[test]
    fn local_system_keeps_every_tile_entry() {
        let (lattice, a) = smoothness_system(&[11, 7]);
        let decomposition = TileDecomposition::new(&lattice, &a, 4).expect("decomposition");

        for tile in &decomposition.tiles {
            let local_nnz: usize = (0..tile.local.nrows()).map(|r| tile.local.row(r).0.len()).sum();
            let global_nnz: usize = tile
                .rows
                .iter()
                .map(|&r| {
                    a.row(r)
                        .0
                        .iter()
                        .filter(|c| tile.overlapping_indices.binary_search(c).is_ok())
                        .count()
                })
                .sum();
            assert_eq!(local_nnz, global_nnz);
            assert_eq!(tile.local.ncols(), tile.overlapping_indices.len());
        }
    }

    #[test]
    fn single_tile_when_lattice_is_small() {
        let (lattice, a) = smoothness_system(&[5, 5]);
        let decomposition = TileDecomposition::new(&lattice, &a, 16).expect("decomposition");
        assert_eq!(decomposition.num_tiles(), 1);
        assert_eq!(decomposition.tiles[0].overlapping_indices.len(), 25);
    }
}
