/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds coarse lattice levels and the multilinear prolongation between lattice levels.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # coarse_level
//!
//! A coarse level keeps every `factor`-th node of a fine lattice. Fine values are expressed
//! through the prolongation `P`, the multilinear interpolation of the coarse nodes at each
//! fine node, so the coarse problem `min ‖A P y - b‖` has the same equations as the fine one
//! and `P y` is its best approximation in the coarse space.

use crate::{
    equation::Triplet,
    interpolation::{InterpolationKernel, multilerp},
    lattice::Lattice,
    linalg::SparseMatrix,
};
use faer::{Mat, MatRef};

/// A coarse lattice together with the prolongation onto its fine lattice.
#[derive(Debug, Clone)]
pub struct CoarseLevel {
    pub lattice: Lattice,

    /// Interpolation kernel of every fine node on the coarse lattice. Each row of `P`.
    pub prolongation: Vec<InterpolationKernel>,
}

impl CoarseLevel {
    /// Builds the level below `fine`, or `None` if downscaling would not shrink the lattice
    /// or would leave fewer than `min_unknowns` nodes.
    pub fn new(fine: &Lattice, factor: usize, min_unknowns: usize) -> Option<Self> {
        if factor < 2 {
            return None;
        }

        let lattice = fine.downscaled(factor);
        if lattice.num_unknowns() >= fine.num_unknowns() || lattice.num_unknowns() < min_unknowns {
            return None;
        }

        let mut coordinate = vec![0usize; fine.num_dims()];
        let mut position = vec![0.0f64; fine.num_dims()];

        let prolongation = (0..fine.num_unknowns())
            .map(|index| {
                fine.coordinate_from_index_into(index, &mut coordinate);
                for (p, &c) in position.iter_mut().zip(&coordinate) {
                    *p = c as f64 / factor as f64;
                }
                multilerp(&lattice, &position, 0)
            })
            .collect();

        Some(Self {
            lattice,
            prolongation,
        })
    }

    /// Triplets of `A P`, the fine system expressed in coarse unknowns.
    pub fn restrict_system(&self, a: &SparseMatrix) -> Vec<Triplet> {
        let mut triplets = Vec::with_capacity(a.nnz() * 2);
        for row in 0..a.nrows() {
            let (cols, vals) = a.row(row);
            for (&c, &v) in cols.iter().zip(vals) {
                triplets.extend(
                    self.prolongation[c]
                        .iter()
                        .map(|(coarse, w)| Triplet::new(row, coarse, v * w)),
                );
            }
        }
        triplets
    }

    /// Returns `P y`.
    pub fn prolongate(&self, coarse: MatRef<f64>) -> Mat<f64> {
        debug_assert_eq!(coarse.nrows(), self.lattice.num_unknowns());
        Mat::from_fn(self.prolongation.len(), 1, |i, _| {
            self.prolongation[i]
                .iter()
                .map(|(c, w)| w * coarse[(c, 0)])
                .sum()
        })
    }
}
