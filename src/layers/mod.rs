//! Neural Network Layers
//!
//! Every layer used by the forward pass. Each one owns its weights
//! exclusively and exposes the same shape of API:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn new(.., rng: &mut R) -> Self;              // seeded random init
//!     pub fn from_weights(..) -> Result<Self>;          // loaded weights, shape-checked
//!     pub fn forward(&self, x: &Tensor) -> Result<Tensor>;
//! }
//! ```
//!
//! ## Layers
//!
//! - **activation**: GELU / ReLU
//! - **linear**: affine projection `x @ W + b`
//! - **layer_norm**: per-position layer normalization
//! - **embedding**: token id lookup (and tied vocabulary projection)
//! - **positional**: sinusoidal or learned position vectors
//! - **attention**: causal multi-head self-attention
//! - **feed_forward**: position-wise MLP
//! - **block**: pre-norm transformer layer

pub mod activation;
pub mod attention;
pub mod block;
pub mod embedding;
pub mod feed_forward;
pub mod layer_norm;
pub mod linear;
pub mod positional;

// Re-export main types for convenience
pub use activation::Activation;
pub use attention::{HeadProjection, MultiHeadSelfAttention};
pub use block::TransformerLayer;
pub use embedding::TokenEmbedding;
pub use feed_forward::FeedForward;
pub use layer_norm::LayerNorm;
pub use linear::{normal_init, Linear};
pub use positional::PositionalEncoding;
