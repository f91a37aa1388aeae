/////////////////////////////////////////////////////////////////////////////////////////////
//
// Generates synthetic 2D boundary samples of circles, squircles and holes.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # test_shapes
//!
//! Boundary samples of simple closed 2D shapes in the unit square, for demos and tests.
//!
//! Each [`Shape`] is a circle whose radius can be blended towards a square (`squareness`).
//! Samples are taken at equal parameter steps. Normals are the unit normals of the
//! parametric curve, pointing out of the shape, or into it for an `inverted` shape,
//! which describes a hole.

use faer::Mat;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A closed 2D shape in unit square coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Shape {
    /// Reverses the winding, so the shape is a hole.
    pub inverted: bool,
    pub num_points: usize,
    pub center: f64,
    pub radius: f64,
    /// `0` is a circle, `1` a square.
    pub squareness: f64,
    /// Rotation of the shape in radians.
    pub angle_offset: f64,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            inverted: false,
            num_points: 64,
            center: 0.5,
            radius: 0.35,
            squareness: 0.0,
            angle_offset: 0.0,
        }
    }
}

impl Shape {
    /// Signed area of the circle with the shape's radius. Negative for holes.
    pub fn expected_area(&self) -> f64 {
        let sign = if self.inverted { -1.0 } else { 1.0 };
        sign * PI * self.radius * self.radius
    }

    /// Position and unit normal of sample `i`.
    fn sample(&self, i: usize) -> ([f64; 2], [f64; 2]) {
        let sign = if self.inverted { -1.0 } else { 1.0 };
        let theta = sign * i as f64 * 2.0 * PI / self.num_points as f64;

        // Radius blended towards the square inscribed by the same circle, and its
        // derivative with respect to theta.
        let (c, s) = (theta.cos(), theta.sin());
        let (square_factor, square_factor_prime) = if c.abs() >= s.abs() {
            (1.0 / c.abs(), c.signum() * s / (c * c))
        } else {
            (1.0 / s.abs(), -s.signum() * c / (s * s))
        };
        let r = self.radius * (1.0 + (square_factor - 1.0) * self.squareness);
        let r_prime = self.radius * square_factor_prime * self.squareness;

        let angle = theta + self.angle_offset;
        let (ca, sa) = (angle.cos(), angle.sin());
        let x = self.center + r * ca;
        let y = self.center + r * sa;

        // Tangent along the sample parameter. The parameter runs against theta for holes.
        let dx = sign * (r_prime * ca - r * sa);
        let dy = sign * (r_prime * sa + r * ca);
        let norm = dx.hypot(dy);

        ([x, y], [dy / norm, -dx / norm])
    }
}

/// Gaussian perturbation of generated samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Noise {
    pub seed: u64,
    /// Standard deviation of each position coordinate, in unit square coordinates.
    pub position: f64,
    /// Standard deviation of the normal direction in radians.
    pub direction: f64,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            seed: 0,
            position: 0.005,
            direction: 0.05,
        }
    }
}

/// Boundary samples with one point per row.
#[derive(Debug, Clone)]
pub struct ShapeSamples {
    pub positions: Mat<f64>,
    pub normals: Mat<f64>,
}

impl ShapeSamples {
    #[inline]
    pub fn num_points(&self) -> usize {
        self.positions.nrows()
    }

    /// Scales unit square samples onto a square lattice with `resolution` nodes per axis.
    ///
    /// Normals are unchanged.
    pub fn to_lattice(&self, resolution: usize) -> ShapeSamples {
        let scale = resolution.saturating_sub(1) as f64;
        ShapeSamples {
            positions: Mat::from_fn(self.positions.nrows(), 2, |i, j| {
                self.positions[(i, j)] * scale
            }),
            normals: self.normals.clone(),
        }
    }
}

/// The default scene: a disc with a small hole in its middle.
pub fn default_shapes() -> Vec<Shape> {
    vec![
        Shape::default(),
        Shape {
            inverted: true,
            radius: 0.1,
            ..Shape::default()
        },
    ]
}

/// Samples every shape in turn, optionally perturbed by `noise`.
pub fn sample_shapes(shapes: &[Shape], noise: Option<&Noise>) -> ShapeSamples {
    let num_points: usize = shapes.iter().map(|s| s.num_points).sum();
    let mut positions = Mat::<f64>::zeros(num_points, 2);
    let mut normals = Mat::<f64>::zeros(num_points, 2);
    let mut rng = noise.map(|n| StdRng::seed_from_u64(n.seed));

    let mut row = 0;
    for shape in shapes {
        for i in 0..shape.num_points {
            let (mut position, mut normal) = shape.sample(i);

            if let (Some(noise), Some(rng)) = (noise, rng.as_mut()) {
                for p in position.iter_mut() {
                    let offset: f64 = rng.sample(StandardNormal);
                    *p += noise.position * offset;
                }
                let offset: f64 = rng.sample(StandardNormal);
                let angle = normal[1].atan2(normal[0]) + noise.direction * offset;
                normal = [angle.cos(), angle.sin()];
            }

            for d in 0..2 {
                positions[(row, d)] = position[d];
                normals[(row, d)] = normal[d];
            }
            row += 1;
        }
    }

    ShapeSamples { positions, normals }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radial(samples: &ShapeSamples, i: usize, center: f64) -> ([f64; 2], f64) {
        let v = [
            samples.positions[(i, 0)] - center,
            samples.positions[(i, 1)] - center,
        ];
        (v, v[0].hypot(v[1]))
    }

    #[test]
    fn circle_normals_point_outwards() {
        let shape = Shape::default();
        let samples = sample_shapes(&[shape], None);
        assert_eq!(samples.num_points(), 64);

        for i in 0..samples.num_points() {
            let (v, r) = radial(&samples, i, shape.center);
            assert!((r - shape.radius).abs() < 1e-12);
            let n = [samples.normals[(i, 0)], samples.normals[(i, 1)]];
            assert!((n[0].hypot(n[1]) - 1.0).abs() < 1e-12);
            assert!((n[0] * v[0] + n[1] * v[1] - r).abs() < 1e-12);
        }
    }

    #[test]
    fn hole_normals_point_inwards() {
        let shape = Shape {
            inverted: true,
            radius: 0.1,
            ..Shape::default()
        };
        let samples = sample_shapes(&[shape], None);

        for i in 0..samples.num_points() {
            let (v, r) = radial(&samples, i, shape.center);
            let n = [samples.normals[(i, 0)], samples.normals[(i, 1)]];
            assert!((n[0] * v[0] + n[1] * v[1] + r).abs() < 1e-12);
        }
        assert!(shape.expected_area() < 0.0);
    }

    #[test]
    fn square_samples_lie_on_square() {
        let shape = Shape {
            squareness: 1.0,
            num_points: 40,
            ..Shape::default()
        };
        let samples = sample_shapes(&[shape], None);

        for i in 0..samples.num_points() {
            let dx = (samples.positions[(i, 0)] - shape.center).abs();
            let dy = (samples.positions[(i, 1)] - shape.center).abs();
            assert!((dx.max(dy) - shape.radius).abs() < 1e-12);

            // Off the corners the normal is an axis direction.
            if (dx - dy).abs() > 1e-6 {
                let n = [samples.normals[(i, 0)].abs(), samples.normals[(i, 1)].abs()];
                let expected = if dx > dy { [1.0, 0.0] } else { [0.0, 1.0] };
                assert!((n[0] - expected[0]).abs() < 1e-9 && (n[1] - expected[1]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn noise_is_reproducible() {
        let noise = Noise::default();
        let a = sample_shapes(&default_shapes(), Some(&noise));
        let b = sample_shapes(&default_shapes(), Some(&noise));
        let clean = sample_shapes(&default_shapes(), None);

        assert_eq!(a.num_points(), 128);
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.normals, b.normals);
        assert!(a.positions != clean.positions);
    }

    #[test]
    fn lattice_scaling() {
        let samples = sample_shapes(&[Shape::default()], None);
        let on_lattice = samples.to_lattice(21);
        assert!((on_lattice.positions[(0, 0)] - 0.85 * 20.0).abs() < 1e-12);
        assert!((on_lattice.positions[(0, 1)] - 0.5 * 20.0).abs() < 1e-12);
        assert_eq!(on_lattice.normals, samples.normals);
    }
}
