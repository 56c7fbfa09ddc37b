//! # gpt2-infer
//!
//! Forward-pass inference for a GPT-2 style decoder-only transformer: token
//! ids in, next-token logits out.
//!
//! Tokenization, weight file formats, sampling and training live elsewhere;
//! this crate assumes the weights are already in memory (randomly
//! initialized, or handed over through [`GPT2Model::from_parts`]).
//!
//! # Modules
//!
//! - [`tensor`] - dense row-major `f32` buffer
//! - [`ops`] - causal mask, stable softmax, single-head attention
//! - [`layers`] - embedding, positional encoding, attention, feedforward, block
//! - [`model`] - the full model
//! - [`config`] - hyperparameters
//! - [`error`] - error kinds
//!
//! # Example
//!
//! ```rust
//! use gpt2_infer::{GPT2Model, ModelConfig};
//!
//! let config = ModelConfig::tiny(512);
//! let model = GPT2Model::new(&config)?;
//!
//! let logits = model.forward(&[12, 24, 36, 48])?;
//! assert_eq!(logits.len(), 512);
//! # Ok::<(), gpt2_infer::ModelError>(())
//! ```

pub mod config;
pub mod error;
pub mod layers;
pub mod model;
pub mod ops;
pub mod tensor;

// Re-export main types for convenience
pub use config::{ModelConfig, PositionalKind};
pub use error::{ModelError, Result};
pub use layers::{
    Activation, FeedForward, HeadProjection, LayerNorm, Linear, MultiHeadSelfAttention,
    PositionalEncoding, TokenEmbedding, TransformerLayer,
};
pub use model::{GPT2Model, Logits};
pub use tensor::Tensor;
