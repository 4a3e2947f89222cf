//! PCA basis used to reduce weighted pose vectors for the KD-tree.
//!
//! Projection happens in weighted space: a vector `v` is first scaled by the
//! index's `weights_sqrt`, then centred on `mean`, then multiplied by the
//! `dimension × components` row-major `projection` matrix.

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaBasis {
    dimension: usize,
    components: usize,
    mean: Vec<f32>,
    projection: Vec<f32>,
}

impl PcaBasis {
    pub fn new(dimension: usize, components: usize, mean: Vec<f32>, projection: Vec<f32>) -> Result<Self> {
        if components == 0 || components > dimension {
            return Err(MatchError::InvalidIndex(format!(
                "PCA components must be in 1..={dimension}, got {components}"
            )));
        }
        if mean.len() != dimension {
            return Err(MatchError::DimensionMismatch {
                expected: dimension,
                actual: mean.len(),
            });
        }
        if projection.len() != dimension * components {
            return Err(MatchError::InvalidIndex(format!(
                "PCA projection has {} values, expected {dimension}x{components}",
                projection.len()
            )));
        }
        Ok(Self {
            dimension,
            components,
            mean,
            projection,
        })
    }

    /// Keeps the first `components` axes of the weighted space unchanged.
    ///
    /// With `components == dimension` PCA-space distance equals the weighted
    /// full-dimensional cost.
    pub fn truncated_identity(dimension: usize, components: usize) -> Result<Self> {
        let mut projection = vec![0.0; dimension * components];
        for axis in 0..components.min(dimension) {
            projection[axis * components + axis] = 1.0;
        }
        Self::new(dimension, components, vec![0.0; dimension], projection)
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub const fn components(&self) -> usize {
        self.components
    }

    /// Project `values` into PCA space, writing `components` floats into `out`.
    ///
    /// # Panics
    ///
    /// Panics if any buffer has the wrong length.
    pub fn project<'o>(&self, values: &[f32], weights_sqrt: &[f32], out: &'o mut [f32]) -> &'o [f32] {
        assert_eq!(values.len(), self.dimension, "query dimension mismatch");
        assert_eq!(weights_sqrt.len(), self.dimension, "weights dimension mismatch");
        assert_eq!(out.len(), self.components, "PCA scratch buffer must hold {} floats", self.components);

        out.fill(0.0);
        for (row, ((value, weight), mean)) in values.iter().zip(weights_sqrt).zip(&self.mean).enumerate() {
            let centered = value * weight - mean;
            let basis_row = &self.projection[row * self.components..(row + 1) * self.components];
            for (acc, basis) in out.iter_mut().zip(basis_row) {
                *acc += centered * basis;
            }
        }
        out
    }

    /// Map a PCA-space vector back to an unweighted full-dimensional vector.
    ///
    /// Dimensions with zero weight reconstruct to zero.
    ///
    /// # Panics
    ///
    /// Panics if any buffer has the wrong length.
    pub fn reconstruct<'o>(&self, pca_values: &[f32], weights_sqrt: &[f32], out: &'o mut [f32]) -> &'o [f32] {
        assert_eq!(pca_values.len(), self.components, "PCA vector dimension mismatch");
        assert_eq!(weights_sqrt.len(), self.dimension, "weights dimension mismatch");
        assert_eq!(out.len(), self.dimension, "reconstruction buffer must hold {} floats", self.dimension);

        for (row, (slot, (weight, mean))) in out.iter_mut().zip(weights_sqrt.iter().zip(&self.mean)).enumerate() {
            let basis_row = &self.projection[row * self.components..(row + 1) * self.components];
            let weighted: f32 = mean
                + pca_values
                    .iter()
                    .zip(basis_row)
                    .map(|(p, b)| p * b)
                    .sum::<f32>();
            *slot = if *weight > 0.0 { weighted / weight } else { 0.0 };
        }
        out
    }
}
