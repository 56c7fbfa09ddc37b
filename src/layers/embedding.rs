//! Token Embedding
//!
//! A lookup table mapping token ids to dense vectors:
//!
//! ```text
//! table:  [vocab_size, embed_dim]
//! embed(id) = table[id]
//! ```
//!
//! The same table doubles as the output projection of the model (weight
//! tying), see [`TokenEmbedding::project`].

use rand::Rng;
use rayon::prelude::*;

use super::linear::normal_init;
use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Token id → embedding vector lookup.
#[derive(Clone, Debug)]
pub struct TokenEmbedding {
    /// Embedding weight matrix: [vocab_size, embed_dim]
    pub weight: Tensor,
}

impl TokenEmbedding {
    /// Random N(0, std²) table.
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, embed_dim: usize, std: f32, rng: &mut R) -> Self {
        Self {
            weight: Tensor {
                data: normal_init(rng, vocab_size * embed_dim, std),
                shape: vec![vocab_size, embed_dim],
            },
        }
    }

    /// Wrap a loaded `[vocab_size, embed_dim]` table.
    pub fn from_weights(weight: Tensor) -> Result<Self> {
        if weight.shape.len() != 2 || weight.shape[0] == 0 || weight.shape[1] == 0 {
            return Err(ModelError::shape("embedding table", &[1, 1], &weight.shape));
        }
        Ok(Self { weight })
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn embed_dim(&self) -> usize {
        self.weight.shape[1]
    }

    fn check_id(&self, token_id: usize) -> Result<()> {
        if token_id >= self.vocab_size() {
            return Err(ModelError::OutOfRange {
                token_id,
                vocab_size: self.vocab_size(),
            });
        }
        Ok(())
    }

    /// Embedding vector for one token.
    pub fn embed(&self, token_id: usize) -> Result<Vec<f32>> {
        self.check_id(token_id)?;
        Ok(self.weight.row(token_id).to_vec())
    }

    /// Gather `[T, embed_dim]` for a sequence. Every id is validated before
    /// anything is copied.
    pub fn forward(&self, token_ids: &[usize]) -> Result<Tensor> {
        for &token_id in token_ids {
            self.check_id(token_id)?;
        }

        let embed_dim = self.embed_dim();
        let mut output = Vec::with_capacity(token_ids.len() * embed_dim);
        for &token_id in token_ids {
            output.extend_from_slice(self.weight.row(token_id));
        }
        Tensor::new(output, vec![token_ids.len(), embed_dim])
    }

    /// Tied output projection: `h @ tableᵀ`, one score per vocabulary entry.
    pub fn project(&self, hidden: &[f32]) -> Result<Vec<f32>> {
        let embed_dim = self.embed_dim();
        if hidden.len() != embed_dim {
            return Err(ModelError::shape("vocabulary projection", &[embed_dim], &[hidden.len()]));
        }

        Ok(self
            .weight
            .data
            .par_chunks(embed_dim)
            .map(|row| row.iter().zip(hidden).map(|(&w, &h)| w * h).sum::<f32>())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table() -> TokenEmbedding {
        let data = (0..12).map(|i| i as f32).collect();
        TokenEmbedding::from_weights(Tensor::new(data, vec![4, 3]).unwrap()).unwrap()
    }

    #[test]
    fn test_embed_returns_row() {
        let emb = table();
        assert_eq!(emb.embed(2).unwrap(), vec![6.0, 7.0, 8.0]);
        assert_eq!(emb.embed(2).unwrap(), emb.embed(2).unwrap());
    }

    #[test]
    fn test_every_valid_id_has_embed_dim_values() {
        let emb = TokenEmbedding::new(50, 16, 0.02, &mut StdRng::seed_from_u64(1));
        for id in 0..50 {
            assert_eq!(emb.embed(id).unwrap().len(), 16);
        }
    }

    #[test]
    fn test_out_of_range_is_error() {
        let emb = table();
        let err = emb.embed(4).unwrap_err();
        assert!(matches!(
            err,
            ModelError::OutOfRange {
                token_id: 4,
                vocab_size: 4
            }
        ));
        assert!(emb.forward(&[0, 1, 9]).is_err());
    }

    #[test]
    fn test_forward_gathers_rows() {
        let emb = table();
        let out = emb.forward(&[3, 0, 3]).unwrap();
        assert_eq!(out.shape, vec![3, 3]);
        assert_eq!(out.data, vec![9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_project_is_transpose_matmul() {
        let emb = table();
        let scores = emb.project(&[1.0, 0.0, -1.0]).unwrap();
        assert_eq!(scores, vec![-2.0, -2.0, -2.0, -2.0]);
        let scores = emb.project(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(scores, vec![1.0, 4.0, 7.0, 10.0]);
        assert!(emb.project(&[1.0]).is_err());
    }
}
