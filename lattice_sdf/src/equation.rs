/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the append-only sparse equation accumulator shared by all constraint builders.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # equation
//!
//! Storage for an over-determined sparse linear system `A x ≈ b` in coordinate form.
//! Rows are only ever appended, so every triplet refers to a row that already has a
//! right-hand side entry. Duplicate `(row, col)` entries are allowed and are summed when
//! the matrix is materialised.

use std::fmt;

/// One nonzero entry of the sparse system matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

impl Triplet {
    #[inline]
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self { row, col, value }
    }
}

/// Trust weight applied to every term and the right-hand side of one equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight(pub f64);

/// Unweighted right-hand side value of one equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rhs(pub f64);

/// Sparse linear system accumulated one row at a time.
#[derive(Debug, Clone, Default)]
pub struct LinearEquation {
    triplets: Vec<Triplet>,
    rhs: Vec<f64>,
}

impl LinearEquation {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rhs.len()
    }

    #[inline]
    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    #[inline]
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    pub fn into_parts(self) -> (Vec<Triplet>, Vec<f64>) {
        (self.triplets, self.rhs)
    }

    /// Appends one row with already weighted terms and right-hand side.
    /// Returns the index of the new row.
    pub fn add_row<I>(&mut self, terms: I, rhs: f64) -> usize
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let row = self.rhs.len();
        self.triplets
            .extend(terms.into_iter().map(|(col, value)| Triplet::new(row, col, value)));
        self.rhs.push(rhs);
        row
    }

    /// Appends `weight * (Σ value_i x[col_i]) = weight * rhs`.
    ///
    /// Nothing is added when the weight is zero. Terms with a zero coefficient are dropped,
    /// and if no terms remain no row is created. Returns `true` if a row was added.
    pub fn add_equation(&mut self, weight: Weight, rhs: Rhs, terms: &[(usize, f64)]) -> bool {
        if weight.0 == 0.0 {
            return false;
        }

        let row = self.rhs.len();
        let start = self.triplets.len();
        self.triplets.extend(
            terms
                .iter()
                .filter(|(_, value)| *value != 0.0)
                .map(|&(col, value)| Triplet::new(row, col, value * weight.0)),
        );

        if self.triplets.len() == start {
            return false;
        }

        self.rhs.push(rhs.0 * weight.0);
        true
    }
}

impl fmt::Display for LinearEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.rhs.len()];
        for t in &self.triplets {
            rows[t.row].push((t.col, t.value));
        }

        for (rhs, terms) in self.rhs.iter().zip(rows.iter()) {
            write!(f, "{rhs} =")?;
            for (i, (col, value)) in terms.iter().enumerate() {
                if i > 0 {
                    write!(f, "  +")?;
                }
                write!(f, "  {value} * x{col}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
