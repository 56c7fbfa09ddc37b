//! Positional Encoding
//!
//! Per-position vectors added to the token embeddings so the model can tell
//! positions apart. The full `[max_seq_len, embed_dim]` matrix is built once
//! at construction; `get_encoding(seq_len)` returns its first `seq_len` rows,
//! so shorter requests are always a prefix of longer ones.
//!
//! ## Sinusoidal
//!
//! ```text
//! pe[p, 2i]   = sin(p / 10000^(2i / d))
//! pe[p, 2i+1] = cos(p / 10000^(2i / d))
//! ```
//!
//! ## Learned
//!
//! A trained table, as in GPT-2 (`wpe`).

use rand::Rng;

use super::linear::normal_init;
use crate::config::PositionalKind;
use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Precomputed positional matrix.
#[derive(Clone, Debug)]
pub struct PositionalEncoding {
    kind: PositionalKind,
    /// [max_seq_len, embed_dim]
    matrix: Tensor,
}

impl PositionalEncoding {
    /// Closed-form sine/cosine encoding.
    pub fn sinusoidal(max_seq_len: usize, embed_dim: usize) -> Self {
        let mut data = vec![0.0; max_seq_len * embed_dim];
        for pos in 0..max_seq_len {
            for i in (0..embed_dim).step_by(2) {
                let angle = pos as f64 / 10000f64.powf(i as f64 / embed_dim as f64);
                data[pos * embed_dim + i] = angle.sin() as f32;
                if i + 1 < embed_dim {
                    data[pos * embed_dim + i + 1] = angle.cos() as f32;
                }
            }
        }
        Self {
            kind: PositionalKind::Sinusoidal,
            matrix: Tensor {
                data,
                shape: vec![max_seq_len, embed_dim],
            },
        }
    }

    /// Random N(0, std²) learned table.
    pub fn learned_random<R: Rng + ?Sized>(
        max_seq_len: usize,
        embed_dim: usize,
        std: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            kind: PositionalKind::Learned,
            matrix: Tensor {
                data: normal_init(rng, max_seq_len * embed_dim, std),
                shape: vec![max_seq_len, embed_dim],
            },
        }
    }

    /// Wrap a loaded `[max_seq_len, embed_dim]` table.
    pub fn learned(table: Tensor) -> Result<Self> {
        if table.shape.len() != 2 || table.shape[0] == 0 || table.shape[1] == 0 {
            return Err(ModelError::shape("positional table", &[1, 1], &table.shape));
        }
        Ok(Self {
            kind: PositionalKind::Learned,
            matrix: table,
        })
    }

    pub fn kind(&self) -> PositionalKind {
        self.kind
    }

    pub fn max_seq_len(&self) -> usize {
        self.matrix.shape[0]
    }

    pub fn embed_dim(&self) -> usize {
        self.matrix.shape[1]
    }

    /// Parameters that count toward model size (zero when closed-form).
    pub fn num_parameters(&self) -> usize {
        match self.kind {
            PositionalKind::Learned => self.matrix.data.len(),
            PositionalKind::Sinusoidal => 0,
        }
    }

    /// First `seq_len` rows of the positional matrix, `[seq_len, embed_dim]`.
    pub fn get_encoding(&self, seq_len: usize) -> Result<Tensor> {
        let max = self.max_seq_len();
        if seq_len == 0 || seq_len > max {
            return Err(ModelError::SequenceTooLong { len: seq_len, max });
        }
        self.matrix.slice_rows(0..seq_len)
    }
}
