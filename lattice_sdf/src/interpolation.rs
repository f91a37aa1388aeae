/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the multilinear interpolation kernel over the corners of a lattice cell.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # interpolation
//!
//! Multilinear interpolation of a lattice field at a real valued position given in lattice
//! coordinates. The `2^N` corners of the cell containing the position are blended with
//! weights `Π t[d]` on the high side and `Π (1 - t[d])` on the low side of each dimension.
//!
//! Corners falling outside the lattice are dropped and the remaining weights are **not**
//! renormalised, so samples near the boundary carry less than unit total weight.

use crate::lattice::{Lattice, MAX_DIM};

/// In-bounds cell corners and their interpolation weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationKernel {
    pub indices: Vec<usize>,
    pub weights: Vec<f64>,
}

impl InterpolationKernel {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Total weight actually carried by the in-bounds corners.
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Computes the multilinear interpolation kernel of `pos` on `lattice`.
///
/// A corner is kept when every coordinate satisfies `0 <= c` and `c + extra_bound < size[d]`.
/// A nonzero `extra_bound` reserves room for a forward difference from each kept corner.
/// Non-finite positions yield an empty kernel.
///
/// # Panics
/// If `pos` does not have one entry per lattice dimension.
pub fn multilerp(lattice: &Lattice, pos: &[f64], extra_bound: usize) -> InterpolationKernel {
    let num_dims = lattice.num_dims();
    assert!(
        pos.len() == num_dims && num_dims <= MAX_DIM,
        "Position has {} components, lattice has {} dimensions",
        pos.len(),
        num_dims
    );

    if pos.iter().any(|p| !p.is_finite()) {
        return InterpolationKernel::default();
    }

    // Bounds are checked in f64 so huge coordinates never reach an integer cast.
    let mut floor = [0.0f64; MAX_DIM];
    let mut t = [0.0f64; MAX_DIM];
    for d in 0..num_dims {
        floor[d] = pos[d].floor();
        t[d] = pos[d] - floor[d];
    }

    let num_corners = lattice.num_cell_corners();
    let mut kernel = InterpolationKernel {
        indices: Vec::with_capacity(num_corners),
        weights: Vec::with_capacity(num_corners),
    };

    'corners: for corner in 0..num_corners {
        let mut weight = 1.0;
        let mut index = 0usize;
        for d in 0..num_dims {
            let high = (corner >> d) & 1 == 1;
            let c = floor[d] + if high { 1.0 } else { 0.0 };
            if c < 0.0 || c + extra_bound as f64 >= lattice.size(d) as f64 {
                continue 'corners;
            }
            weight *= if high { t[d] } else { 1.0 - t[d] };
            index += c as usize * lattice.stride(d);
        }
        kernel.indices.push(index);
        kernel.weights.push(weight);
    }

    kernel
}
