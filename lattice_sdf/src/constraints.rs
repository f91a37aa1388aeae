/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the value, gradient, and smoothness constraint builders of a lattice field.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # constraints
//!
//! Builders appending equations to the system of a [`LatticeField`].
//!
//! Every builder is a no-op when its weight is zero, and value and gradient builders report
//! through their `bool` return whether any equation was added. Positions are given in
//! lattice coordinates, so node `c` along axis `d` sits at position `c`.
//!
//! The smoothness terms use the binomial finite difference coefficients
//! (see <https://en.wikipedia.org/wiki/Finite_difference_coefficient>), and the cell-edge
//! gradient follows the formulation of
//!
//! 1. F. Calakli and G. Taubin. SSD: Smooth Signed Distance Surface Reconstruction.
//!    Computer Graphics Forum, 30(7):1993–2002, 2011.

use crate::{
    config::{GradientKernel, Weights},
    equation::{Rhs, Weight},
    field::LatticeField,
    interpolation::multilerp,
    lattice::Lattice,
};

/// Forward difference stencils of derivative order `0..=4`.
const MODEL_STENCILS: [&[f64]; 5] = [
    &[1.0],
    &[-1.0, 1.0],
    &[1.0, -2.0, 1.0],
    &[1.0, -3.0, 3.0, -1.0],
    &[1.0, -4.0, 6.0, -4.0, 1.0],
];

/// Adds one equation pinning the multilinearly interpolated field at `pos` to `value`.
///
/// The right-hand side is scaled by the interpolation weight that actually landed on the
/// lattice, so samples whose cell is partly outside the lattice are not biased toward zero.
/// Returns `false` if the weight is zero or no cell corner lies on the lattice.
pub fn add_value_constraint(field: &mut LatticeField, pos: &[f64], value: f64, weight: f64) -> bool {
    if weight == 0.0 {
        return false;
    }

    let kernel = multilerp(field.lattice(), pos, 0);
    if kernel.is_empty() {
        return false;
    }

    let weight_sum = kernel.weight_sum() * weight;
    field
        .equation_mut()
        .add_row(kernel.iter().map(|(index, w)| (index, w * weight)), weight_sum * value);

    true
}

/// Flat index of the base corner of the cell containing `pos`, or `None` if the whole cell
/// does not lie on the lattice.
pub fn cell_index(lattice: &Lattice, pos: &[f64]) -> Option<usize> {
    debug_assert_eq!(pos.len(), lattice.num_dims());

    let mut index = 0;
    for (d, &p) in pos.iter().enumerate() {
        if !p.is_finite() {
            return None;
        }
        let floor = p.floor();
        if floor < 0.0 || floor + 1.0 >= lattice.size(d) as f64 {
            return None;
        }
        index += floor as usize * lattice.stride(d);
    }
    Some(index)
}

/// Adds one equation per axis requiring the field derivative at `pos` to equal `gradient`.
///
/// Returns `false` if the weight is zero or the cell around `pos` does not fit on the lattice.
///
/// # Panics
/// If `pos` or `gradient` does not have one entry per lattice dimension.
pub fn add_gradient_constraint(
    field: &mut LatticeField,
    pos: &[f64],
    gradient: &[f64],
    weight: f64,
    kernel: GradientKernel,
) -> bool {
    let num_dims = field.lattice().num_dims();
    assert!(
        pos.len() == num_dims && gradient.len() == num_dims,
        "Position and gradient must have {num_dims} components"
    );

    if weight == 0.0 {
        return false;
    }

    match kernel {
        GradientKernel::NearestNeighbor => {
            let Some(index) = cell_index(field.lattice(), pos) else {
                return false;
            };

            for (d, &g) in gradient.iter().enumerate() {
                let stride = field.lattice().stride(d);
                field.equation_mut().add_equation(
                    Weight(weight),
                    Rhs(g),
                    &[(index, -1.0), (index + stride, 1.0)],
                );
            }
            true
        }
        GradientKernel::CellEdges => {
            // With corners A B / C D of a 2D cell:
            //   ((B - A) + (D - C)) / 2 = dx
            //   ((C - A) + (D - B)) / 2 = dy
            let Some(index) = cell_index(field.lattice(), pos) else {
                return false;
            };

            let lattice = field.lattice();
            let num_corners = lattice.num_cell_corners();
            let term = 2.0 / num_corners as f64;

            let corners: Vec<usize> = (0..num_corners)
                .map(|corner| {
                    index
                        + (0..num_dims)
                            .filter(|oa| (corner >> oa) & 1 == 1)
                            .map(|oa| lattice.stride(oa))
                            .sum::<usize>()
                })
                .collect();

            let mut terms = Vec::with_capacity(num_corners);
            for (d, &g) in gradient.iter().enumerate() {
                terms.clear();
                terms.extend(corners.iter().enumerate().map(|(corner, &corner_index)| {
                    let sign = if (corner >> d) & 1 == 1 { 1.0 } else { -1.0 };
                    (corner_index, sign * term)
                }));
                field.equation_mut().add_equation(Weight(weight), Rhs(g), &terms);
            }
            true
        }
        GradientKernel::LinearInterpolation => {
            // A sample at 3.5 lands entirely on x[4] - x[3]; one at 3.0 is split
            // evenly between x[3] - x[2] and x[4] - x[3].
            let adjusted: Vec<f64> = pos.iter().map(|p| p - 0.5).collect();
            let samples = multilerp(field.lattice(), &adjusted, 1);
            if samples.is_empty() {
                return false;
            }

            let weight_sum = samples.weight_sum() * weight;
            for (d, &g) in gradient.iter().enumerate() {
                let stride = field.lattice().stride(d);
                let terms = samples.iter().flat_map(|(index, w)| {
                    [(index, -w * weight), (index + stride, w * weight)]
                });
                field.equation_mut().add_row(terms, weight_sum * g);
            }
            true
        }
    }
}

/// Adds the smoothness equations anchored at lattice node `index` with coordinate
/// `coordinate`, along axis `d`.
///
/// Each regulariser is skipped when its weight is not positive or its stencil does not fit
/// on the lattice starting at `coordinate`.
pub fn add_model_constraint(
    field: &mut LatticeField,
    weights: &Weights,
    coordinate: &[usize],
    index: usize,
    d: usize,
) {
    let size = field.lattice().size(d);
    let stride = field.lattice().stride(d);
    let c = coordinate[d];

    for (weight, stencil) in weights.model_orders().into_iter().zip(MODEL_STENCILS) {
        if weight <= 0.0 || c + stencil.len() > size {
            continue;
        }
        let terms: Vec<(usize, f64)> = stencil
            .iter()
            .enumerate()
            .map(|(k, &value)| (index + k * stride, value))
            .collect();
        field.equation_mut().add_equation(Weight(weight), Rhs(0.0), &terms);
    }

    if weights.gradient_smoothness > 0.0 && c + 1 < size {
        for o in (d + 1)..field.lattice().num_dims() {
            if coordinate[o] + 1 >= field.lattice().size(o) {
                continue;
            }
            let ortho = field.lattice().stride(o);
            field.equation_mut().add_equation(
                Weight(weights.gradient_smoothness),
                Rhs(0.0),
                &[
                    (index, -1.0),
                    (index + stride, 1.0),
                    (index + ortho, 1.0),
                    (index + ortho + stride, -1.0),
                ],
            );
        }
    }
}

/// Adds the smoothness equations of every lattice node along every axis.
pub fn add_field_constraints(field: &mut LatticeField, weights: &Weights) {
    let num_dims = field.lattice().num_dims();
    let mut coordinate = vec![0usize; num_dims];

    for index in 0..field.lattice().num_unknowns() {
        field.lattice().coordinate_from_index_into(index, &mut coordinate);
        for d in 0..num_dims {
            add_model_constraint(field, weights, &coordinate, index, d);
        }
    }
}
