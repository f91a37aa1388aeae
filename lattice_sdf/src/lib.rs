/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API and high-level documentation for lattice signed distance fields.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Signed distance fields on regular lattices by sparse least squares.
//!
//! A field is represented by one unknown value per node of a regular N-dimensional
//! lattice (`1 <= N <= 4`). Everything known about the field is written as weighted
//! linear equations in those unknowns:
//!
//! - **Data equations** pin the field to zero at boundary samples and ask its gradient
//!   to match the sample normals there. Off-node positions are handled with multilinear
//!   interpolation.
//! - **Model equations** ask every finite difference of a chosen order to vanish, so the
//!   field is smooth wherever the data says nothing.
//!
//! The overdetermined system is then solved for the values minimising the weighted sum
//! of squared equation errors. Small lattices are solved directly. Large lattices can be
//! solved approximately: a coarser lattice is solved first, and its upsampled solution is
//! refined with overlapping tile sweeps or conjugate gradients.
//!
//! # Features
//! - 1D to 4D lattices
//! - Three interchangeable gradient discretisations, see [`config::GradientKernel`]
//! - Direct, warm-started and multiresolution solvers built on
//!   [`faer`](https://docs.rs/faer/latest/faer/), with tiles solved in parallel by `rayon`
//! - A per-unknown heatmap of unsatisfied equations, see [`generate_error_map`]
//!
//! # Examples
//!
//! ```
//! use lattice_sdf::{
//!     Lattice, SolveMode, generate_sdf,
//!     config::FieldSettings,
//!     test_shapes::{Shape, sample_shapes},
//! };
//!
//! // Samples of a circle in the unit square, scaled onto a 24 x 24 lattice
//! let resolution = 24;
//! let samples = sample_shapes(&[Shape::default()], None).to_lattice(resolution);
//!
//! // Assemble and solve with the default weights
//! let sdf = generate_sdf(
//!     &[resolution, resolution],
//!     &FieldSettings::default(),
//!     samples.positions.as_ref(),
//!     Some(samples.normals.as_ref()),
//!     None,
//!     SolveMode::Exact,
//! );
//!
//! // Negative inside the circle, positive outside
//! let lattice = Lattice::new(&[resolution, resolution]);
//! assert!(sdf[lattice.index_from_coordinate(&[12, 12])] < 0.0);
//! assert!(sdf[lattice.index_from_coordinate(&[0, 0])] > 0.0);
//! ```
//!
//! # References
//! 1.  Å. Björck. Numerical Methods for Least Squares Problems. SIAM, 1996.
//! 2.  B. Smith, P. Bjørstad and W. Gropp. Domain Decomposition: Parallel Multilevel
//!     Methods for Elliptic Partial Differential Equations. Cambridge University Press, 1996.
pub mod config;

pub mod constraints;

mod equation;

mod error_map;

mod field;

mod interpolation;

mod iterative_solvers;

mod lattice;

mod linalg;

mod preconditioning;

pub mod progress;

mod solver;

pub mod test_shapes;

pub use {
    equation::{LinearEquation, Rhs, Triplet, Weight},
    error_map::generate_error_map,
    field::{LatticeField, SolveMode, generate_sdf, generate_sdf_with_progress, sdf_from_points},
    interpolation::{InterpolationKernel, multilerp},
    lattice::{Lattice, MAX_DIM},
    linalg::SolveError,
    solver::{
        DIRECT_SOLVE_THRESHOLD, MIN_COARSE_UNKNOWNS, default_iteration_cap, solve,
        solve_approximate, solve_approximate_with_progress, solve_with_guess,
    },
};
