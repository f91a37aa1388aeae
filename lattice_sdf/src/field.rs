/////////////////////////////////////////////////////////////////////////////////////////////
//
// Assembles the least-squares system of a lattice field from scattered boundary samples.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # field
//!
//! [`LatticeField`] owns the equations of one reconstruction while they are being built.
//! [`sdf_from_points`] fills it from boundary samples, and [`generate_sdf`] runs the whole
//! pipeline from samples to solved field values.

use crate::{
    config::FieldSettings,
    config::Weights,
    constraints::{add_field_constraints, add_gradient_constraint, add_value_constraint},
    equation::LinearEquation,
    lattice::{Lattice, MAX_DIM},
    progress::ProgressSink,
    solver::{solve, solve_approximate_with_progress},
};
use faer::MatRef;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{error, info, instrument};

/// The lattice of unknowns and the equations constraining them.
#[derive(Debug, Clone)]
pub struct LatticeField {
    lattice: Lattice,
    equation: LinearEquation,
}

impl LatticeField {
    /// Creates a field with no equations on a lattice of the given sizes.
    ///
    /// # Panics
    /// If the number of dimensions is not in `1..=MAX_DIM`, or any size is zero.
    pub fn new(sizes: &[usize]) -> Self {
        Self {
            lattice: Lattice::new(sizes),
            equation: LinearEquation::new(),
        }
    }

    #[inline]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[inline]
    pub fn equation(&self) -> &LinearEquation {
        &self.equation
    }

    #[inline]
    pub(crate) fn equation_mut(&mut self) -> &mut LinearEquation {
        &mut self.equation
    }

    #[inline]
    pub fn num_unknowns(&self) -> usize {
        self.lattice.num_unknowns()
    }

    pub fn into_equation(self) -> LinearEquation {
        self.equation
    }
}

/// Builds the complete least-squares system for reconstructing a signed distance field
/// from boundary samples.
///
/// Smoothness equations are added for every lattice node first. Then every sample pins the
/// zero level at its position with weight `point_weight * weights.data_pos` and, if normals
/// are given, asks for the field gradient to equal its normal with weight
/// `point_weight * weights.data_gradient`. Missing point weights default to `1`.
///
/// `positions` and `normals` hold one sample per row in lattice coordinates.
///
/// # Panics
/// If `positions` does not have one column per lattice dimension, `normals` does not have
/// the same shape as `positions`, or `point_weights` does not have one entry per sample.
#[instrument(skip_all, name = "sdf_from_points", fields(num_points = positions.nrows()))]
pub fn sdf_from_points(
    sizes: &[usize],
    weights: &Weights,
    positions: MatRef<f64>,
    normals: Option<MatRef<f64>>,
    point_weights: Option<&[f64]>,
) -> LatticeField {
    let num_dims = sizes.len();
    let num_points = positions.nrows();
    assert_eq!(
        positions.ncols(),
        num_dims,
        "positions must have one column per lattice dimension"
    );
    if let Some(normals) = normals {
        assert_eq!(
            normals.shape(),
            positions.shape(),
            "normals must have the same shape as positions"
        );
    }
    if let Some(point_weights) = point_weights {
        assert_eq!(
            point_weights.len(),
            num_points,
            "point_weights must have one entry per point"
        );
    }

    let mut field = LatticeField::new(sizes);
    add_field_constraints(&mut field, weights);

    let mut pos = [0.0f64; MAX_DIM];
    let mut normal = [0.0f64; MAX_DIM];

    for i in 0..num_points {
        let point_weight = point_weights.map_or(1.0, |w| w[i]);
        for d in 0..num_dims {
            pos[d] = positions[(i, d)];
        }

        add_value_constraint(&mut field, &pos[..num_dims], 0.0, point_weight * weights.data_pos);

        if let Some(normals) = normals {
            for d in 0..num_dims {
                normal[d] = normals[(i, d)];
            }
            add_gradient_constraint(
                &mut field,
                &pos[..num_dims],
                &normal[..num_dims],
                point_weight * weights.data_gradient,
                weights.gradient_kernel,
            );
        }
    }

    field
}

/// Solver used by [`generate_sdf`].
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// Full resolution solve via [`solve`].
    #[default]
    Exact,

    /// Multiresolution and tiled solve via [`solve_approximate_with_progress`].
    Approximate,
}

/// Assembles and solves a signed distance field from boundary samples.
///
/// Returns one value per lattice node, indexed by the lattice stride convention. If the
/// system cannot be solved the failure is logged and an all-zero field is returned.
///
/// See [`sdf_from_points`] for the layout of the inputs.
pub fn generate_sdf(
    sizes: &[usize],
    settings: &FieldSettings,
    positions: MatRef<f64>,
    normals: Option<MatRef<f64>>,
    point_weights: Option<&[f64]>,
    mode: SolveMode,
) -> Vec<f64> {
    generate_sdf_with_progress(sizes, settings, positions, normals, point_weights, mode, None)
}

/// [`generate_sdf`] reporting the progress of approximate solves to `callback`.
pub fn generate_sdf_with_progress(
    sizes: &[usize],
    settings: &FieldSettings,
    positions: MatRef<f64>,
    normals: Option<MatRef<f64>>,
    point_weights: Option<&[f64]>,
    mode: SolveMode,
    callback: Option<Arc<dyn ProgressSink>>,
) -> Vec<f64> {
    let start = Instant::now();
    let field = sdf_from_points(sizes, &settings.weights, positions, normals, point_weights);
    let num_unknowns = field.num_unknowns();
    let (triplets, rhs) = field.into_equation().into_parts();

    info!(
        num_equations = rhs.len(),
        num_values = triplets.len(),
        num_unknowns,
        "assembled lattice field"
    );

    let result = match mode {
        SolveMode::Exact => solve(num_unknowns, &triplets, &rhs),
        SolveMode::Approximate => {
            solve_approximate_with_progress(&triplets, &rhs, sizes, &settings.solve_options, callback)
        }
    };

    match result {
        Ok(values) => {
            info!(elapsed_ms = start.elapsed().as_millis() as u64, "solved lattice field");
            values
        }
        Err(e) => {
            error!(error = %e, "Failed to find a solution");
            vec![0.0; num_unknowns]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradientKernel, SolveOptions};
    use faer::Mat;

    fn unit_circle_samples(num_points: usize, resolution: usize) -> (Mat<f64>, Mat<f64>) {
        let center = (resolution - 1) as f64 / 2.0;
        let radius = (resolution - 1) as f64 / 4.0;
        let angle = |i: usize| std::f64::consts::TAU * i as f64 / num_points as f64;
        let positions = Mat::<f64>::from_fn(num_points, 2, |i, j| {
            center + radius * if j == 0 { angle(i).cos() } else { angle(i).sin() }
        });
        let normals = Mat::<f64>::from_fn(num_points, 2, |i, j| {
            if j == 0 { angle(i).cos() } else { angle(i).sin() }
        });
        (positions, normals)
    }

    #[test]
    fn assembly_counts_rows() {
        let weights = Weights {
            model_2: 1.0,
            gradient_kernel: GradientKernel::NearestNeighbor,
            ..Weights::default()
        };
        let positions = Mat::<f64>::from_fn(3, 2, |i, _| 1.5 + i as f64);
        let normals = Mat::<f64>::from_fn(3, 2, |_, j| j as f64);

        let field = sdf_from_points(&[6, 6], &weights, positions.as_ref(), Some(normals.as_ref()), None);

        // model_2: 4 * 6 rows per axis; 3 value rows; 3 * 2 gradient rows.
        assert_eq!(field.equation().num_rows(), 48 + 3 + 6);
        assert!(field.equation().triplets().iter().all(|t| t.col < 36));
    }

    #[test]
    fn point_weights_scale_data_rows() {
        let weights = Weights {
            model_2: 0.0,
            data_pos: 2.0,
            ..Weights::default()
        };
        let positions = Mat::<f64>::from_fn(2, 1, |i, _| 1.0 + i as f64);

        let field = sdf_from_points(&[4], &weights, positions.as_ref(), None, Some(&[0.5, 0.0]));

        // The second point has zero weight and adds nothing.
        let eq = field.equation();
        assert_eq!(eq.num_rows(), 1);
        let total: f64 = eq.triplets().iter().map(|t| t.value).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_dimensional_pin_end_to_end() {
        let weights = Weights {
            data_pos: 1.0,
            data_gradient: 0.0,
            model_1: 1.0,
            model_2: 0.0,
            ..Weights::default()
        };
        let mut field = LatticeField::new(&[4]);
        add_field_constraints(&mut field, &weights);
        assert!(add_value_constraint(&mut field, &[1.5], 10.0, 1.0));

        let (triplets, rhs) = field.into_equation().into_parts();
        let x = solve(4, &triplets, &rhs).expect("solvable");

        assert_eq!(x.len(), 4);
        assert!((0.5 * x[1] + 0.5 * x[2] - 10.0).abs() < 1e-9);
        for pair in x.windows(2) {
            assert!((pair[1] - pair[0]).abs() < 1e-9);
        }
    }

    #[test]
    fn generated_circle_is_signed() {
        let resolution = 24;
        let (positions, normals) = unit_circle_samples(48, resolution);
        let settings = FieldSettings::default();

        let sdf = generate_sdf(
            &[resolution, resolution],
            &settings,
            positions.as_ref(),
            Some(normals.as_ref()),
            None,
            SolveMode::Exact,
        );

        let lattice = Lattice::new(&[resolution, resolution]);
        let center = lattice.index_from_coordinate(&[11, 11]);
        let corner = lattice.index_from_coordinate(&[0, 0]);
        assert!(sdf[center] < 0.0, "Inside value {} should be negative", sdf[center]);
        assert!(sdf[corner] > 0.0, "Outside value {} should be positive", sdf[corner]);
    }

    #[test]
    fn approximate_mode_agrees_in_sign() {
        let resolution = 40;
        let (positions, normals) = unit_circle_samples(96, resolution);
        let settings = FieldSettings {
            weights: Weights::default(),
            solve_options: SolveOptions::builder().tile_size(12).error_tolerance(1e-6).build(),
        };

        let sdf = generate_sdf(
            &[resolution, resolution],
            &settings,
            positions.as_ref(),
            Some(normals.as_ref()),
            None,
            SolveMode::Approximate,
        );

        let lattice = Lattice::new(&[resolution, resolution]);
        assert!(sdf[lattice.index_from_coordinate(&[19, 19])] < 0.0);
        assert!(sdf[lattice.index_from_coordinate(&[1, 38])] > 0.0);
    }

    #[test]
    fn unsolvable_field_falls_back_to_zeros() {
        // No smoothness and a single sample leaves most unknowns undetermined.
        let settings = FieldSettings {
            weights: Weights {
                model_2: 0.0,
                ..Weights::default()
            },
            solve_options: SolveOptions::default(),
        };
        let positions = Mat::<f64>::from_fn(1, 2, |_, _| 2.5);

        let sdf = generate_sdf(&[8, 8], &settings, positions.as_ref(), None, None, SolveMode::Exact);
        assert_eq!(sdf, vec![0.0; 64]);
    }

    #[test]
    #[should_panic]
    fn mismatched_normals_panic() {
        let positions = Mat::<f64>::zeros(3, 2);
        let normals = Mat::<f64>::zeros(2, 2);
        sdf_from_points(&[4, 4], &Weights::default(), positions.as_ref(), Some(normals.as_ref()), None);
    }
}
