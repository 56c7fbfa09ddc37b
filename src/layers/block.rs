//! Transformer Layer
//!
//! Self-attention and feedforward sublayers, each wrapped in a pre-norm
//! residual connection (GPT-2 layout):
//!
//! ```text
//! x → LayerNorm → Attention → (+) → LayerNorm → FeedForward → (+) → output
//! │                            ↑  │                            ↑
//! └────────────────────────────┘  └────────────────────────────┘
//! ```
//!
//! A layer knows nothing about its index in the stack and accepts any
//! sequence length; the output always has the input's shape.

use rand::Rng;

use super::attention::MultiHeadSelfAttention;
use super::feed_forward::FeedForward;
use super::layer_norm::LayerNorm;
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// One transformer block.
#[derive(Clone, Debug)]
pub struct TransformerLayer {
    /// Layer norm before attention
    pub ln_1: LayerNorm,
    pub attn: MultiHeadSelfAttention,
    /// Layer norm before the feedforward network
    pub ln_2: LayerNorm,
    pub ff: FeedForward,
}

impl TransformerLayer {
    /// Randomly initialized layer sized from `config`.
    pub fn new<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Result<Self> {
        Ok(Self {
            ln_1: LayerNorm::new(config.embed_dim, config.layer_norm_eps),
            attn: MultiHeadSelfAttention::new(
                config.embed_dim,
                config.num_heads,
                config.init_std,
                rng,
            )?,
            ln_2: LayerNorm::new(config.embed_dim, config.layer_norm_eps),
            ff: FeedForward::new(
                config.embed_dim,
                config.hidden_dim,
                config.activation,
                config.init_std,
                rng,
            ),
        })
    }

    /// Assemble from loaded sublayers; all must agree on `embed_dim`.
    pub fn from_parts(
        ln_1: LayerNorm,
        attn: MultiHeadSelfAttention,
        ln_2: LayerNorm,
        ff: FeedForward,
    ) -> Result<Self> {
        let embed_dim = attn.embed_dim();
        for (context, dim) in [
            ("layer ln_1", ln_1.dim()),
            ("layer ln_2", ln_2.dim()),
            ("layer feedforward", ff.embed_dim()),
        ] {
            if dim != embed_dim {
                return Err(ModelError::shape(context, &[embed_dim], &[dim]));
            }
        }
        Ok(Self {
            ln_1,
            attn,
            ln_2,
            ff,
        })
    }

    pub fn embed_dim(&self) -> usize {
        self.attn.embed_dim()
    }

    pub fn num_parameters(&self) -> usize {
        self.ln_1.num_parameters()
            + self.attn.num_parameters()
            + self.ln_2.num_parameters()
            + self.ff.num_parameters()
    }

    /// Forward pass: `[T, embed_dim] -> [T, embed_dim]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.expect_matrix("transformer layer input", self.embed_dim())?;

        // Attention sublayer with residual connection
        let attn_out = self.attn.forward(&self.ln_1.forward(x)?)?;
        let residual = x.add(&attn_out)?;

        // Feedforward sublayer with residual connection
        let ff_out = self.ff.forward(&self.ln_2.forward(&residual)?)?;
        residual.add(&ff_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::linear::{normal_init, Linear};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> ModelConfig {
        let mut config = ModelConfig::new(16, 8, 8, 2, 1, 32);
        config.init_std = 0.3;
        config
    }

    fn input(rows: usize, seed: u64) -> Tensor {
        let data = normal_init(&mut StdRng::seed_from_u64(seed), rows * 8, 1.0);
        Tensor::new(data, vec![rows, 8]).unwrap()
    }

    #[test]
    fn test_shape_preserved_for_every_length() {
        let layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(0)).unwrap();
        for t in 1..=8 {
            let y = layer.forward(&input(t, t as u64)).unwrap();
            assert_eq!(y.shape, vec![t, 8]);
            assert!(y.data.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_zeroed_sublayers_pass_input_through() {
        let mut layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(1)).unwrap();
        layer.attn.output = Linear::zeros(8, 8);
        layer.ff.proj = Linear::zeros(32, 8);

        let x = input(5, 2);
        assert_eq!(layer.forward(&x).unwrap(), x);
    }

    #[test]
    fn test_residual_is_added_not_replaced() {
        let mut layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(3)).unwrap();
        layer.ff.proj = Linear::zeros(32, 8);
        let x = input(3, 4);

        let expected = x
            .add(&layer.attn.forward(&layer.ln_1.forward(&x).unwrap()).unwrap())
            .unwrap();
        assert_eq!(layer.forward(&x).unwrap(), expected);
    }

    #[test]
    fn test_later_positions_do_not_affect_earlier() {
        let layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(5)).unwrap();
        let x = input(4, 6);
        let mut y = x.clone();
        for v in &mut y.data[2 * 8..] {
            *v = -*v + 1.0;
        }

        let a = layer.forward(&x).unwrap();
        let b = layer.forward(&y).unwrap();
        assert_eq!(a.row(0), b.row(0));
        assert_eq!(a.row(1), b.row(1));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(matches!(
            layer.forward(&Tensor::zeros(vec![2, 4])),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_parts_checks_dims() {
        let layer = TransformerLayer::new(&config(), &mut StdRng::seed_from_u64(0)).unwrap();
        let err = TransformerLayer::from_parts(
            LayerNorm::new(4, 1e-5),
            layer.attn.clone(),
            layer.ln_2.clone(),
            layer.ff.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));

        let rebuilt = TransformerLayer::from_parts(layer.ln_1, layer.attn, layer.ln_2, layer.ff).unwrap();
        assert_eq!(rebuilt.embed_dim(), 8);
        assert_eq!(rebuilt.num_parameters(), 2 * 16 + (3 * 2 * (8 * 4 + 4) + 8 * 8 + 8) + (8 * 32 + 32 + 32 * 8 + 8));
    }
}
