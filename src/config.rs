//! Model Configuration
//!
//! Architecture hyperparameters for a GPT-2 style model. The six core
//! dimensions mirror the construction interface
//! `(vocab_size, max_seq_len, embed_dim, num_heads, num_layers, hidden_dim)`;
//! the remaining fields fix choices that must never vary between layers
//! (activation, positional encoding kind, layer norm epsilon) and the seed
//! used for default initialization.
//!
//! ## Example
//!
//! ```rust
//! use gpt2_infer::ModelConfig;
//!
//! let config = ModelConfig::new(512, 64, 64, 4, 2, 256);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.head_dim(), 16);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::layers::activation::Activation;

/// How position information is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionalKind {
    /// Learned `[max_seq_len, embed_dim]` table (GPT-2's `wpe`).
    Learned,
    /// Closed-form sine/cosine encoding.
    Sinusoidal,
}

/// Model configuration
///
/// # Parameter Count Formula
///
/// ```text
/// embeddings ≈ vocab_size × embed_dim (+ max_seq_len × embed_dim if learned)
/// per_layer  ≈ 4 × embed_dim² + 2 × embed_dim × hidden_dim
/// total      ≈ embeddings + num_layers × per_layer
/// ```
///
/// The output projection is tied to the token embedding table and adds no
/// parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub max_seq_len: usize,
    pub embed_dim: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub hidden_dim: usize,
    #[serde(default = "default_activation")]
    pub activation: Activation,
    #[serde(default = "default_positional")]
    pub positional: PositionalKind,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
    #[serde(default = "default_init_std")]
    pub init_std: f32,
    #[serde(default)]
    pub seed: u64,
}

fn default_activation() -> Activation {
    Activation::Gelu
}

fn default_positional() -> PositionalKind {
    PositionalKind::Learned
}

fn default_layer_norm_eps() -> f32 {
    1e-5
}

fn default_init_std() -> f32 {
    0.02
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::gpt2_small(50257)
    }
}

impl ModelConfig {
    /// Create a config from the six core dimensions, with GPT-2 defaults for
    /// everything else.
    pub fn new(
        vocab_size: usize,
        max_seq_len: usize,
        embed_dim: usize,
        num_heads: usize,
        num_layers: usize,
        hidden_dim: usize,
    ) -> Self {
        Self {
            vocab_size,
            max_seq_len,
            embed_dim,
            num_heads,
            num_layers,
            hidden_dim,
            activation: default_activation(),
            positional: default_positional(),
            layer_norm_eps: default_layer_norm_eps(),
            init_std: default_init_std(),
            seed: 0,
        }
    }

    /// Tiny config for tests and quick experiments (~50K parameters with a
    /// small vocabulary).
    pub fn tiny(vocab_size: usize) -> Self {
        Self::new(vocab_size, 64, 64, 1, 2, 256)
    }

    /// Small config (~200K parameters with a small vocabulary).
    pub fn small(vocab_size: usize) -> Self {
        Self::new(vocab_size, 128, 128, 1, 3, 512)
    }

    /// Medium config with multi-head attention.
    pub fn medium(vocab_size: usize) -> Self {
        Self::new(vocab_size, 256, 256, 4, 4, 1024)
    }

    /// OpenAI GPT-2 Small: 768 wide, 12 layers, 12 heads, 1024 context.
    ///
    /// With the 50257-token vocabulary and a tied output head this is the
    /// familiar ~124M parameter model.
    pub fn gpt2_small(vocab_size: usize) -> Self {
        Self::new(vocab_size, 1024, 768, 12, 12, 3072)
    }

    /// Builder-style activation override.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Builder-style positional encoding override.
    pub fn with_positional(mut self, positional: PositionalKind) -> Self {
        self.positional = positional;
        self
    }

    /// Builder-style seed override.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Dimension of each attention head.
    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads.max(1)
    }

    /// Check every dimension is positive and heads divide the embedding.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("vocab_size", self.vocab_size),
            ("max_seq_len", self.max_seq_len),
            ("embed_dim", self.embed_dim),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("hidden_dim", self.hidden_dim),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(ModelError::Configuration(format!(
                    "{name} must be positive"
                )));
            }
        }
        if self.embed_dim % self.num_heads != 0 {
            return Err(ModelError::Configuration(format!(
                "embed_dim {} is not divisible by num_heads {}",
                self.embed_dim, self.num_heads
            )));
        }
        if !(self.layer_norm_eps > 0.0 && self.layer_norm_eps.is_finite()) {
            return Err(ModelError::Configuration(format!(
                "layer_norm_eps must be a positive finite value, got {}",
                self.layer_norm_eps
            )));
        }
        if !(self.init_std >= 0.0 && self.init_std.is_finite()) {
            return Err(ModelError::Configuration(format!(
                "init_std must be a non-negative finite value, got {}",
                self.init_std
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [
            ModelConfig::tiny(512),
            ModelConfig::small(512),
            ModelConfig::medium(512),
            ModelConfig::gpt2_small(50257),
            ModelConfig::default(),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
        assert_eq!(ModelConfig::gpt2_small(50257).head_dim(), 64);
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let err = ModelConfig::new(10, 4, 5, 2, 1, 8).validate().unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
        assert!(err.to_string().contains("divisible"));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = ModelConfig::new(10, 4, 4, 2, 0, 8).validate().unwrap_err();
        assert!(err.to_string().contains("num_layers"));

        let err = ModelConfig::new(10, 0, 4, 2, 1, 8).validate().unwrap_err();
        assert!(err.to_string().contains("max_seq_len"));
    }

    #[test]
    fn test_json_defaults_fill_optional_fields() {
        let json = r#"{
            "vocab_size": 10,
            "max_seq_len": 4,
            "embed_dim": 4,
            "num_heads": 2,
            "num_layers": 1,
            "hidden_dim": 8
        }"#;
        let config = ModelConfig::from_json_str(json).unwrap();
        assert_eq!(config, ModelConfig::new(10, 4, 4, 2, 1, 8));
        assert_eq!(config.activation, Activation::Gelu);
        assert_eq!(config.positional, PositionalKind::Learned);
    }

    #[test]
    fn test_json_round_trip_keeps_overrides() {
        let config = ModelConfig::tiny(100)
            .with_activation(Activation::Relu)
            .with_positional(PositionalKind::Sinusoidal)
            .with_seed(7);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"relu\""));
        assert!(json.contains("\"sinusoidal\""));
        assert_eq!(ModelConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_json_invalid_dims_rejected() {
        let json = r#"{"vocab_size": 10, "max_seq_len": 4, "embed_dim": 5,
                       "num_heads": 2, "num_layers": 1, "hidden_dim": 8}"#;
        assert!(matches!(
            ModelConfig::from_json_str(json),
            Err(ModelError::Configuration(_))
        ));
        assert!(matches!(
            ModelConfig::from_json_str("{not json"),
            Err(ModelError::Json(_))
        ));
    }

    #[test]
    fn test_json_file_load() {
        let config = ModelConfig::small(256).with_seed(3);
        let path = std::env::temp_dir().join(format!("gpt2-infer-config-{}.json", std::process::id()));
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = ModelConfig::from_json_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), config);
    }

    #[test]
    fn test_json_file_missing_is_io_error() {
        let path = std::env::temp_dir().join("gpt2-infer-no-such-dir").join("config.json");
        assert!(matches!(
            ModelConfig::from_json_file(path),
            Err(ModelError::Io(_))
        ));
    }
}
