//! GPT-2 Model
//!
//! Owns the embeddings and the ordered stack of transformer layers and runs
//! the full forward pass:
//!
//! ```text
//! token ids [T]
//!     ↓
//! Token Embedding [T, embed_dim]
//!     + Positional Encoding [T, embed_dim]
//!     ↓
//! Transformer Layer 1 .. N
//!     ↓
//! Final Layer Norm
//!     ↓
//! Token Embedding tableᵀ → logits
//! ```
//!
//! ## Output contract
//!
//! [`GPT2Model::forward`] returns the logits of the **last position only**,
//! a `Vec<f32>` of `vocab_size` scores. That is all a next-token sampler
//! needs and it skips a `[T, vocab_size]` projection. Callers that want every
//! position use [`GPT2Model::forward_all`].
//!
//! ## Weight tying
//!
//! The vocabulary projection reuses the token embedding table, transposed,
//! as GPT-2 does. There is no separate `lm_head`.
//!
//! ## Example
//!
//! ```rust
//! use gpt2_infer::{GPT2Model, ModelConfig};
//!
//! let config = ModelConfig::new(10, 4, 4, 2, 1, 8);
//! let model = GPT2Model::new(&config).unwrap();
//!
//! let logits = model.forward(&[1, 2, 3]).unwrap();
//! assert_eq!(logits.len(), 10);
//! ```

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ModelConfig, PositionalKind};
use crate::error::{ModelError, Result};
use crate::layers::{LayerNorm, PositionalEncoding, TokenEmbedding, TransformerLayer};
use crate::tensor::Tensor;

/// Unnormalized next-token scores, one per vocabulary entry.
pub type Logits = Vec<f32>;

/// Complete GPT-2 style model.
///
/// Weights are immutable once constructed, so one instance can serve
/// concurrent `forward` calls from many threads.
#[derive(Clone, Debug)]
pub struct GPT2Model {
    config: ModelConfig,
    token_embedding: TokenEmbedding,
    positional: PositionalEncoding,
    layers: Vec<TransformerLayer>,
    ln_f: LayerNorm,
}

impl GPT2Model {
    /// Create a model with random initialization
    ///
    /// Every projection and learned table is drawn from N(0, init_std²)
    /// using an RNG seeded from `config.seed`, so the same config always
    /// produces the same weights. Layer norms start at gamma = 1, beta = 0
    /// and biases at zero.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let token_embedding =
            TokenEmbedding::new(config.vocab_size, config.embed_dim, config.init_std, &mut rng);
        let positional = match config.positional {
            PositionalKind::Learned => PositionalEncoding::learned_random(
                config.max_seq_len,
                config.embed_dim,
                config.init_std,
                &mut rng,
            ),
            PositionalKind::Sinusoidal => {
                PositionalEncoding::sinusoidal(config.max_seq_len, config.embed_dim)
            }
        };
        let layers = (0..config.num_layers)
            .map(|_| TransformerLayer::new(config, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        let ln_f = LayerNorm::new(config.embed_dim, config.layer_norm_eps);

        let model = Self {
            config: config.clone(),
            token_embedding,
            positional,
            layers,
            ln_f,
        };
        model.log_construction();
        Ok(model)
    }

    /// Assemble a model from loaded components.
    ///
    /// This is the seam for weight loaders. Every component is checked
    /// against `config`, so a model with missing or mis-sized weights cannot
    /// be constructed.
    pub fn from_parts(
        config: ModelConfig,
        token_embedding: TokenEmbedding,
        positional: PositionalEncoding,
        layers: Vec<TransformerLayer>,
        ln_f: LayerNorm,
    ) -> Result<Self> {
        config.validate()?;
        let embed_dim = config.embed_dim;

        let embedding_shape = [config.vocab_size, embed_dim];
        if token_embedding.weight.shape != embedding_shape {
            return Err(ModelError::shape(
                "token embedding table",
                &embedding_shape,
                &token_embedding.weight.shape,
            ));
        }
        if positional.max_seq_len() != config.max_seq_len || positional.embed_dim() != embed_dim {
            return Err(ModelError::shape(
                "positional encoding",
                &[config.max_seq_len, embed_dim],
                &[positional.max_seq_len(), positional.embed_dim()],
            ));
        }
        if positional.kind() != config.positional {
            return Err(ModelError::Configuration(format!(
                "positional encoding is {:?} but config expects {:?}",
                positional.kind(),
                config.positional
            )));
        }
        if layers.len() != config.num_layers {
            return Err(ModelError::Configuration(format!(
                "expected {} layers, got {}",
                config.num_layers,
                layers.len()
            )));
        }
        for layer in &layers {
            if layer.embed_dim() != embed_dim
                || layer.attn.num_heads() != config.num_heads
                || layer.ff.hidden_dim() != config.hidden_dim
            {
                return Err(ModelError::shape(
                    "transformer layer",
                    &[embed_dim, config.num_heads, config.hidden_dim],
                    &[layer.embed_dim(), layer.attn.num_heads(), layer.ff.hidden_dim()],
                ));
            }
            if layer.ff.activation != config.activation {
                return Err(ModelError::Configuration(format!(
                    "layer activation {:?} differs from config {:?}",
                    layer.ff.activation, config.activation
                )));
            }
        }
        if ln_f.dim() != embed_dim {
            return Err(ModelError::shape("final layer norm", &[embed_dim], &[ln_f.dim()]));
        }
        let norms = layers
            .iter()
            .flat_map(|layer| [&layer.ln_1, &layer.ln_2])
            .chain([&ln_f]);
        for norm in norms {
            if norm.eps != config.layer_norm_eps {
                return Err(ModelError::Configuration(format!(
                    "layer norm eps {} differs from config {}",
                    norm.eps, config.layer_norm_eps
                )));
            }
        }

        let model = Self {
            config,
            token_embedding,
            positional,
            layers,
            ln_f,
        };
        model.log_construction();
        Ok(model)
    }

    fn log_construction(&self) {
        info!(
            "GPT2Model: vocab={} ctx={} embd={} heads={} layers={} hidden={} params={}",
            self.config.vocab_size,
            self.config.max_seq_len,
            self.config.embed_dim,
            self.config.num_heads,
            self.config.num_layers,
            self.config.hidden_dim,
            self.count_parameters()
        );
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn token_embedding(&self) -> &TokenEmbedding {
        &self.token_embedding
    }

    pub fn positional_encoding(&self) -> &PositionalEncoding {
        &self.positional
    }

    pub fn layers(&self) -> &[TransformerLayer] {
        &self.layers
    }

    pub fn final_norm(&self) -> &LayerNorm {
        &self.ln_f
    }

    /// Check length and every id before any computation.
    fn validate_tokens(&self, token_ids: &[usize]) -> Result<()> {
        let max = self.config.max_seq_len;
        if token_ids.is_empty() || token_ids.len() > max {
            return Err(ModelError::SequenceTooLong {
                len: token_ids.len(),
                max,
            });
        }
        if let Some(&token_id) = token_ids.iter().find(|&&id| id >= self.config.vocab_size) {
            return Err(ModelError::OutOfRange {
                token_id,
                vocab_size: self.config.vocab_size,
            });
        }
        Ok(())
    }

    /// Token embeddings plus positional encoding, `[T, embed_dim]`.
    pub fn embed(&self, token_ids: &[usize]) -> Result<Tensor> {
        self.validate_tokens(token_ids)?;
        let tokens = self.token_embedding.forward(token_ids)?;
        let positions = self.positional.get_encoding(token_ids.len())?;
        tokens.add(&positions)
    }

    /// The hidden state entering the stack followed by the output of every
    /// layer: `num_layers + 1` tensors of shape `[T, embed_dim]`.
    pub fn hidden_states(&self, token_ids: &[usize]) -> Result<Vec<Tensor>> {
        let mut states = Vec::with_capacity(self.layers.len() + 1);
        states.push(self.embed(token_ids)?);
        for (i, layer) in self.layers.iter().enumerate() {
            trace!("layer {i}: forward over {} positions", token_ids.len());
            let next = layer.forward(&states[i])?;
            states.push(next);
        }
        Ok(states)
    }

    /// Run the layer stack and the final norm, `[T, embed_dim]`.
    fn final_hidden(&self, token_ids: &[usize]) -> Result<Tensor> {
        let mut x = self.embed(token_ids)?;
        for (i, layer) in self.layers.iter().enumerate() {
            trace!("layer {i}: forward over {} positions", token_ids.len());
            x = layer.forward(&x)?;
        }
        self.ln_f.forward(&x)
    }

    /// Forward pass: token ids → logits for the last position
    ///
    /// Fails with `SequenceTooLong` unless `1 <= len <= max_seq_len`, and
    /// with `OutOfRange` for any id `>= vocab_size`.
    pub fn forward(&self, token_ids: &[usize]) -> Result<Logits> {
        debug!("forward: {} tokens", token_ids.len());
        let hidden = self.final_hidden(token_ids)?;
        self.token_embedding.project(hidden.row(hidden.rows() - 1))
    }

    /// Forward pass returning logits for every position, `[T, vocab_size]`.
    pub fn forward_all(&self, token_ids: &[usize]) -> Result<Tensor> {
        debug!("forward_all: {} tokens", token_ids.len());
        let hidden = self.final_hidden(token_ids)?;
        hidden.matmul(&self.token_embedding.weight.transpose()?)
    }

    /// Total number of learnable parameters
    ///
    /// The tied output projection is counted once, as part of the token
    /// embedding table.
    pub fn count_parameters(&self) -> usize {
        self.token_embedding.weight.data.len()
            + self.positional.num_parameters()
            + self.layers.iter().map(TransformerLayer::num_parameters).sum::<usize>()
            + self.ln_f.num_parameters()
    }
}
