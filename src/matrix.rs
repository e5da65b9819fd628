//! Flat row-major storage for square `f32` matrices.
//!
//! Element `(i, j)` of an `n × n` matrix lives at index `i * n + j`. Every
//! constructor enforces `data.len() == n * n`.

use std::ops::{Index, IndexMut};

use rand::Rng;

use crate::error::{dimension_mismatch, validation_error, Result};

/// Exclusive upper bound of the random integer values used to fill inputs.
pub const RANDOM_VALUE_BOUND: u32 = 100;

/// Calculates the 1D index for a 2D element in a row-major square matrix.
#[inline(always)]
pub(crate) fn at(i: usize, j: usize, n: usize) -> usize {
    i * n + j
}

/// Number of elements in an `n × n` matrix, or an error if it overflows.
pub fn element_count(dimension: usize) -> Result<usize> {
    dimension
        .checked_mul(dimension)
        .ok_or_else(|| validation_error(format!("dimension {dimension} overflows n*n")))
}

/// A dense `n × n` matrix of `f32` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    dimension: usize,
    data: Vec<f32>,
}

impl SquareMatrix {
    /// An all-zero matrix, used for outputs.
    pub fn zeros(dimension: usize) -> Result<Self> {
        let len = element_count(dimension)?;
        Ok(Self {
            dimension,
            data: vec![0.0; len],
        })
    }

    /// Wraps existing row-major data. Fails unless `data.len() == dimension²`.
    pub fn from_vec(dimension: usize, data: Vec<f32>) -> Result<Self> {
        let expected = element_count(dimension)?;
        if data.len() != expected {
            return Err(dimension_mismatch("matrix data", expected, data.len()));
        }
        Ok(Self { dimension, data })
    }

    /// Fills a matrix with integer values in `[0, 100)` drawn from `rng`.
    ///
    /// The same seeded generator state always yields the same matrix.
    pub fn random<R: Rng>(dimension: usize, rng: &mut R) -> Result<Self> {
        let len = element_count(dimension)?;
        let data = (0..len)
            .map(|_| rng.random_range(0..RANDOM_VALUE_BOUND) as f32)
            .collect();
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Element at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.dimension || col >= self.dimension {
            return None;
        }
        Some(self.data[at(row, col, self.dimension)])
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f32] {
        let start = at(i, 0, self.dimension);
        &self.data[start..start + self.dimension]
    }

    /// Fails fast unless `self` and `other` share a dimension.
    pub fn check_same_dimension(&self, other: &SquareMatrix, context: &str) -> Result<()> {
        if self.dimension != other.dimension {
            return Err(dimension_mismatch(
                context,
                self.len(),
                other.len(),
            ));
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for SquareMatrix {
    type Output = f32;

    fn index(&self, (row, col): (usize, usize)) -> &f32 {
        assert!(row < self.dimension && col < self.dimension);
        &self.data[at(row, col, self.dimension)]
    }
}

impl IndexMut<(usize, usize)> for SquareMatrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f32 {
        assert!(row < self.dimension && col < self.dimension);
        &mut self.data[at(row, col, self.dimension)]
    }
}
