//! Layer Normalization
//!
//! Normalizes each position across the embedding axis, then applies a
//! learned scale (gamma) and shift (beta):
//!
//! ```text
//! 1. mean = sum(x) / N
//! 2. var  = sum((x - mean)²) / N
//! 3. x_norm = (x - mean) / √(var + ε)
//! 4. y = γ * x_norm + β
//! ```

use rayon::prelude::*;

use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Layer normalization with its own scale and shift parameters.
#[derive(Clone, Debug)]
pub struct LayerNorm {
    pub gamma: Tensor, // Scale parameter [embed_dim]
    pub beta: Tensor,  // Shift parameter [embed_dim]
    pub eps: f32,      // Small constant for numerical stability
}

impl LayerNorm {
    /// gamma = 1, beta = 0: a plain standardization.
    pub fn new(normalized_shape: usize, eps: f32) -> Self {
        Self {
            gamma: Tensor::full(vec![normalized_shape], 1.0),
            beta: Tensor::zeros(vec![normalized_shape]),
            eps,
        }
    }

    /// Wrap loaded parameters; both must be non-empty vectors of the same
    /// length, and `eps` must be positive and finite.
    pub fn from_weights(gamma: Tensor, beta: Tensor, eps: f32) -> Result<Self> {
        if gamma.shape.len() != 1 || gamma.data.is_empty() || beta.shape != gamma.shape {
            return Err(ModelError::shape("layer norm parameters", &gamma.shape, &beta.shape));
        }
        if !(eps > 0.0 && eps.is_finite()) {
            return Err(ModelError::Configuration(format!(
                "layer norm eps must be a positive finite value, got {eps}"
            )));
        }
        Ok(Self { gamma, beta, eps })
    }

    pub fn dim(&self) -> usize {
        self.gamma.data.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.data.len() + self.beta.data.len()
    }

    /// Normalize every row of a `[T, dim]` tensor independently.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dim = self.dim();
        x.expect_matrix("layer norm input", dim)?;

        let gamma = &self.gamma.data;
        let beta = &self.beta.data;
        let mut out = vec![0.0; x.data.len()];

        out.par_chunks_mut(dim)
            .zip(x.data.par_chunks(dim))
            .for_each(|(out_row, row)| {
                let mean = row.iter().sum::<f32>() / dim as f32;
                let variance = row
                    .iter()
                    .map(|&v| {
                        let diff = v - mean;
                        diff * diff
                    })
                    .sum::<f32>()
                    / dim as f32;
                let inv_std = 1.0 / (variance + self.eps).sqrt();

                for (j, slot) in out_row.iter_mut().enumerate() {
                    *slot = (row[j] - mean) * inv_std * gamma[j] + beta[j];
                }
            });

        Tensor::new(out, x.shape.clone())
    }
}
