/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the regular N-dimensional lattice and its flat stride indexing scheme.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # lattice
//!
//! A regular grid of unknowns with one value per lattice node. Nodes are addressed either by
//! an integer coordinate per dimension or by a flat index, where dimension `0` varies fastest:
//!
//! ```text
//! index = c[0] * stride[0] + c[1] * stride[1] + ... ,  stride[0] = 1,  stride[d] = stride[d-1] * size[d-1]
//! ```

use serde::{Deserialize, Serialize};

/// Maximum number of lattice dimensions supported by the interpolation and
/// gradient kernels.
pub const MAX_DIM: usize = 4;

/// Sizes and derived strides of a regular N-dimensional lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lattice {
    sizes: Vec<usize>,
    strides: Vec<usize>,
}

impl Lattice {
    /// Creates a lattice with `sizes[d]` nodes along dimension `d`.
    ///
    /// # Panics
    /// If the number of dimensions is not in `1..=MAX_DIM`, or any size is zero.
    pub fn new(sizes: &[usize]) -> Self {
        assert!(
            (1..=MAX_DIM).contains(&sizes.len()),
            "Lattice must have between 1 and {MAX_DIM} dimensions, got {}",
            sizes.len()
        );
        assert!(
            sizes.iter().all(|&s| s > 0),
            "Lattice sizes must be positive, got {sizes:?}"
        );

        let mut strides = Vec::with_capacity(sizes.len());
        let mut stride = 1usize;
        for &size in sizes {
            strides.push(stride);
            stride *= size;
        }

        Self {
            sizes: sizes.to_vec(),
            strides,
        }
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn size(&self, dim: usize) -> usize {
        self.sizes[dim]
    }

    #[inline]
    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Total number of lattice nodes, i.e. the number of unknowns of the field.
    #[inline]
    pub fn num_unknowns(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Number of corners of a lattice cell, `2^N`.
    #[inline]
    pub fn num_cell_corners(&self) -> usize {
        1 << self.num_dims()
    }

    /// Recovers the integer coordinate of a flat node index.
    pub fn coordinate_from_index(&self, index: usize) -> Vec<usize> {
        let mut coordinate = vec![0; self.num_dims()];
        self.coordinate_from_index_into(index, &mut coordinate);
        coordinate
    }

    /// Same as [`Lattice::coordinate_from_index`], writing into a caller-owned buffer.
    pub fn coordinate_from_index_into(&self, mut index: usize, coordinate: &mut [usize]) {
        debug_assert_eq!(coordinate.len(), self.num_dims());
        for (c, &size) in coordinate.iter_mut().zip(self.sizes.iter()) {
            *c = index % size;
            index /= size;
        }
    }

    /// Flat node index of an integer coordinate.
    pub fn index_from_coordinate(&self, coordinate: &[usize]) -> usize {
        debug_assert_eq!(coordinate.len(), self.num_dims());
        coordinate
            .iter()
            .zip(self.strides.iter())
            .map(|(c, s)| c * s)
            .sum()
    }

    /// Returns `true` if the coordinate lies on the lattice.
    pub fn contains(&self, coordinate: &[usize]) -> bool {
        coordinate.len() == self.num_dims()
            && coordinate.iter().zip(self.sizes.iter()).all(|(c, s)| c < s)
    }

    /// Lattice whose nodes are every `factor`-th node of this one. The last coarse node
    /// always reaches or passes the last fine node, so the coarse lattice covers the
    /// full extent.
    ///
    /// # Panics
    /// If `factor` is zero.
    pub fn downscaled(&self, factor: usize) -> Lattice {
        assert!(factor > 0, "Downscale factor must be at least 1");
        let sizes: Vec<usize> = self
            .sizes
            .iter()
            .map(|&s| (s - 1).div_ceil(factor) + 1)
            .collect();
        Lattice::new(&sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_round_trip_test(sizes: &[usize]) {
        let lattice = Lattice::new(sizes);
        for index in 0..lattice.num_unknowns() {
            let coordinate = lattice.coordinate_from_index(index);
            assert!(lattice.contains(&coordinate));
            assert_eq!(
                lattice.index_from_coordinate(&coordinate),
                index,
                "Round trip failed for index {index} on lattice {sizes:?}"
            );
        }
    }

    #[test]
    fn round_trip_1d() {
        run_round_trip_test(&[7]);
    }

    #[test]
    fn round_trip_2d() {
        run_round_trip_test(&[5, 3]);
    }

    #[test]
    fn round_trip_3d() {
        run_round_trip_test(&[4, 1, 6]);
    }

    #[test]
    fn round_trip_4d() {
        run_round_trip_test(&[3, 4, 2, 5]);
    }

    #[test]
    fn strides_are_cumulative_products() {
        let lattice = Lattice::new(&[5, 3, 2]);
        assert_eq!(lattice.strides(), &[1, 5, 15]);
        assert_eq!(lattice.num_unknowns(), 30);
        assert_eq!(lattice.num_cell_corners(), 8);
    }

    #[test]
    fn coordinate_uses_dimension_zero_fastest() {
        let lattice = Lattice::new(&[4, 3]);
        assert_eq!(lattice.coordinate_from_index(1), vec![1, 0]);
        assert_eq!(lattice.coordinate_from_index(4), vec![0, 1]);
        assert_eq!(lattice.coordinate_from_index(11), vec![3, 2]);
    }

    #[test]
    fn downscaled_covers_extent() {
        let lattice = Lattice::new(&[9, 10, 1]);
        let coarse = lattice.downscaled(2);
        assert_eq!(coarse.sizes(), &[5, 6, 1]);
        for (&c, &f) in coarse.sizes().iter().zip(lattice.sizes()) {
            assert!((c - 1) * 2 >= f - 1);
        }
        assert_eq!(lattice.downscaled(1), lattice);
    }

    #[test]
    #[should_panic]
    fn too_many_dimensions_panics() {
        Lattice::new(&[2; MAX_DIM + 1]);
    }

    #[test]
    #[should_panic]
    fn zero_dimensions_panics() {
        Lattice::new(&[]);
    }
}
