//! Linear Layer (Fully Connected)
//!
//! Affine transformation applied independently to every position:
//!
//! ```text
//! Input:  x [seq_len, in_features]
//! Weight: W [in_features, out_features]
//! Bias:   b [out_features]
//! Output: y = x @ W + b [seq_len, out_features]
//! ```
//!
//! Weights are stored `[in, out]` (GPT-2 "Conv1D" layout), so checkpoint
//! tensors can be handed over without transposing.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Draw `size` values from N(0, std²).
///
/// GPT-2 initializes every projection and embedding this way with
/// `std = 0.02`.
pub fn normal_init<R: Rng + ?Sized>(rng: &mut R, size: usize, std: f32) -> Vec<f32> {
    (0..size)
        .map(|_| {
            let z: f32 = rng.sample(StandardNormal);
            z * std
        })
        .collect()
}

/// Linear layer: `y = x @ W + b`
#[derive(Clone, Debug)]
pub struct Linear {
    /// Weight matrix: [in_features, out_features]
    pub weight: Tensor,
    /// Bias vector: [out_features]
    pub bias: Tensor,
}

impl Linear {
    /// Random N(0, std²) weights, zero bias.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        std: f32,
        rng: &mut R,
    ) -> Self {
        let weight_data = normal_init(rng, in_features * out_features, std);
        Self {
            weight: Tensor {
                data: weight_data,
                shape: vec![in_features, out_features],
            },
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    /// All-zero layer. Its output is exactly zero for any input.
    pub fn zeros(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Tensor::zeros(vec![in_features, out_features]),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    /// Wrap externally supplied weights after checking they agree.
    pub fn from_weights(weight: Tensor, bias: Tensor) -> Result<Self> {
        if weight.shape.len() != 2 {
            return Err(ModelError::shape("linear weight", &[0, 0], &weight.shape));
        }
        let out_features = weight.shape[1];
        if bias.shape != [out_features] {
            return Err(ModelError::shape("linear bias", &[out_features], &bias.shape));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape[1]
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.data.len() + self.bias.data.len()
    }

    /// Forward pass: `[T, in] -> [T, out]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.expect_matrix("linear input", self.in_features())?;
        x.matmul(&self.weight)?.add(&self.bias)
    }
}
