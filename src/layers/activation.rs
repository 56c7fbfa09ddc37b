//! Activation Functions
//!
//! The feedforward nonlinearity. The choice is a model-wide configuration
//! constant: every position of every layer uses the same function.
//!
//! ## GELU (Gaussian Error Linear Unit)
//!
//! GPT-2 uses GELU with the tanh approximation:
//!
//! ```text
//! GELU(x) ≈ 0.5 × x × (1 + tanh(√(2/π) × (x + 0.044715 × x³)))
//! ```
//!
//! ## ReLU
//!
//! `max(0, x)`, kept for small experiments and for comparison.

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Nonlinearity applied between the two feedforward projections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// GELU, tanh approximation (GPT-2).
    #[default]
    Gelu,
    /// Rectified linear unit.
    Relu,
}

impl Activation {
    /// Apply to a single value.
    #[inline]
    pub fn apply_scalar(self, x: f32) -> f32 {
        match self {
            Activation::Gelu => gelu_scalar(x),
            Activation::Relu => x.max(0.0),
        }
    }

    /// Apply element-wise to a tensor (parallel via Rayon).
    pub fn apply(self, x: &Tensor) -> Tensor {
        x.map(move |v| self.apply_scalar(v))
    }
}

/// GELU, tanh approximation.
#[inline]
pub fn gelu_scalar(x: f32) -> f32 {
    let sqrt_2_over_pi = (2.0_f32 / std::f32::consts::PI).sqrt();
    let inner = sqrt_2_over_pi * (x + 0.044715 * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}
