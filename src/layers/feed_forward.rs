//! Feedforward Network
//!
//! Two-layer position-wise MLP applied after attention in every block:
//!
//! ```text
//! hidden = act(x @ W1 + b1)     [T, hidden_dim]
//! output = hidden @ W2 + b2     [T, embed_dim]
//! ```
//!
//! Positions never interact here; the matmul kernel splits rows across
//! Rayon workers.

use rand::Rng;

use super::activation::Activation;
use super::linear::Linear;
use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Position-wise feedforward block.
#[derive(Clone, Debug)]
pub struct FeedForward {
    /// Expansion: [embed_dim, hidden_dim]
    pub fc: Linear,
    /// Projection back: [hidden_dim, embed_dim]
    pub proj: Linear,
    pub activation: Activation,
}

impl FeedForward {
    pub fn new<R: Rng + ?Sized>(
        embed_dim: usize,
        hidden_dim: usize,
        activation: Activation,
        std: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            fc: Linear::new(embed_dim, hidden_dim, std, rng),
            proj: Linear::new(hidden_dim, embed_dim, std, rng),
            activation,
        }
    }

    /// Assemble from loaded projections.
    pub fn from_weights(fc: Linear, proj: Linear, activation: Activation) -> Result<Self> {
        if proj.in_features() != fc.out_features() || proj.out_features() != fc.in_features() {
            return Err(ModelError::shape(
                "feedforward projection",
                &[fc.out_features(), fc.in_features()],
                &proj.weight.shape,
            ));
        }
        Ok(Self {
            fc,
            proj,
            activation,
        })
    }

    pub fn embed_dim(&self) -> usize {
        self.fc.in_features()
    }

    pub fn hidden_dim(&self) -> usize {
        self.fc.out_features()
    }

    pub fn num_parameters(&self) -> usize {
        self.fc.num_parameters() + self.proj.num_parameters()
    }

    /// Forward pass: expand → activation → project
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.fc.forward(x)?;
        let h = self.activation.apply(&h);
        self.proj.forward(&h)
    }
}
