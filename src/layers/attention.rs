//! Multi-Head Self-Attention
//!
//! Each head projects the input into its own query/key/value subspace,
//! runs causal scaled dot-product attention, and the head outputs are
//! concatenated and merged by a final projection:
//!
//! ```text
//! Q_h, K_h, V_h = x @ Wq_h, x @ Wk_h, x @ Wv_h      [T, head_dim]
//! A_h   = softmax(mask(Q_h @ K_hᵀ / √head_dim))      [T, T]
//! O_h   = A_h @ V_h                                  [T, head_dim]
//! out   = concat(O_0 .. O_{H-1}) @ W_o + b_o         [T, embed_dim]
//! ```
//!
//! Heads only read shared weights and the input, so they run in parallel on
//! Rayon's pool and are stitched back together in head order.
//!
//! GPT-2 checkpoints store Q, K and V as one fused `[D, 3D]` projection
//! (`c_attn`); [`MultiHeadSelfAttention::from_fused`] slices it into the
//! per-head layout used here.

use rand::Rng;
use rayon::prelude::*;

use super::linear::Linear;
use crate::error::{ModelError, Result};
use crate::ops::causal_attention;
use crate::tensor::Tensor;

/// Query, key and value projections of a single head.
///
/// Each maps `[T, embed_dim] -> [T, head_dim]`.
#[derive(Clone, Debug)]
pub struct HeadProjection {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
}

impl HeadProjection {
    fn attend(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let q = self.query.forward(x)?;
        let k = self.key.forward(x)?;
        let v = self.value.forward(x)?;
        causal_attention(&q, &k, &v)
    }
}

/// Causally masked multi-head self-attention.
#[derive(Clone, Debug)]
pub struct MultiHeadSelfAttention {
    /// One projection triple per head
    pub heads: Vec<HeadProjection>,
    /// Output merge projection: [embed_dim, embed_dim]
    pub output: Linear,
    embed_dim: usize,
    head_dim: usize,
}

fn check_heads(embed_dim: usize, num_heads: usize) -> Result<usize> {
    if embed_dim == 0 || num_heads == 0 || embed_dim % num_heads != 0 {
        return Err(ModelError::Configuration(format!(
            "embed_dim {embed_dim} is not divisible by num_heads {num_heads}"
        )));
    }
    Ok(embed_dim / num_heads)
}

impl MultiHeadSelfAttention {
    /// Random N(0, std²) projections, zero biases.
    pub fn new<R: Rng + ?Sized>(
        embed_dim: usize,
        num_heads: usize,
        std: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let head_dim = check_heads(embed_dim, num_heads)?;
        let heads = (0..num_heads)
            .map(|_| HeadProjection {
                query: Linear::new(embed_dim, head_dim, std, rng),
                key: Linear::new(embed_dim, head_dim, std, rng),
                value: Linear::new(embed_dim, head_dim, std, rng),
            })
            .collect();
        let output = Linear::new(embed_dim, embed_dim, std, rng);

        Ok(Self {
            heads,
            output,
            embed_dim,
            head_dim,
        })
    }

    /// Assemble from explicit per-head projections and an output merge.
    pub fn from_heads(heads: Vec<HeadProjection>, output: Linear) -> Result<Self> {
        let embed_dim = output.in_features();
        let head_dim = check_heads(embed_dim, heads.len())?;

        if output.out_features() != embed_dim {
            return Err(ModelError::shape(
                "attention output projection",
                &[embed_dim, embed_dim],
                &output.weight.shape,
            ));
        }
        for head in &heads {
            for proj in [&head.query, &head.key, &head.value] {
                if proj.weight.shape != [embed_dim, head_dim] {
                    return Err(ModelError::shape(
                        "attention head projection",
                        &[embed_dim, head_dim],
                        &proj.weight.shape,
                    ));
                }
            }
        }

        Ok(Self {
            heads,
            output,
            embed_dim,
            head_dim,
        })
    }

    /// Split a fused `[D, 3D]` QKV projection (GPT-2 `c_attn`) into heads.
    ///
    /// Columns `[0, D)` are queries, `[D, 2D)` keys, `[2D, 3D)` values; inside
    /// each block head `h` owns columns `[h·head_dim, (h+1)·head_dim)`.
    pub fn from_fused(c_attn: &Linear, c_proj: Linear, num_heads: usize) -> Result<Self> {
        let embed_dim = c_attn.in_features();
        let head_dim = check_heads(embed_dim, num_heads)?;
        if c_attn.out_features() != 3 * embed_dim {
            return Err(ModelError::shape(
                "fused qkv projection",
                &[embed_dim, 3 * embed_dim],
                &c_attn.weight.shape,
            ));
        }

        let bias = Tensor::new(c_attn.bias.data.clone(), vec![1, 3 * embed_dim])?;
        let slice = |start: usize| -> Result<Linear> {
            let range = start..start + head_dim;
            let weight = c_attn.weight.slice_cols(range.clone())?;
            let bias = Tensor::from_vec(bias.slice_cols(range)?.data);
            Linear::from_weights(weight, bias)
        };

        let heads = (0..num_heads)
            .map(|h| {
                let offset = h * head_dim;
                Ok(HeadProjection {
                    query: slice(offset)?,
                    key: slice(embed_dim + offset)?,
                    value: slice(2 * embed_dim + offset)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_heads(heads, c_proj)
    }

    pub fn num_heads(&self) -> usize {
        self.heads.len()
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn num_parameters(&self) -> usize {
        let heads: usize = self
            .heads
            .iter()
            .map(|h| h.query.num_parameters() + h.key.num_parameters() + h.value.num_parameters())
            .sum();
        heads + self.output.num_parameters()
    }

    fn run_heads(&self, x: &Tensor) -> Result<Vec<(Tensor, Tensor)>> {
        x.expect_matrix("attention input", self.embed_dim)?;
        self.heads.par_iter().map(|head| head.attend(x)).collect()
    }

    /// Forward pass: `[T, embed_dim] -> [T, embed_dim]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let head_outputs: Vec<Tensor> = self
            .run_heads(x)?
            .into_iter()
            .map(|(out, _)| out)
            .collect();
        let merged = Tensor::concat_cols(&head_outputs)?;
        self.output.forward(&merged)
    }

    /// Attention weights `A_h` (`[T, T]`) of every head, in head order.
    pub fn attention_probs(&self, x: &Tensor) -> Result<Vec<Tensor>> {
        Ok(self
            .run_heads(x)?
            .into_iter()
            .map(|(_, weights)| weights)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_input(rows: usize, cols: usize, seed: u64) -> Tensor {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = crate::layers::linear::normal_init(&mut rng, rows * cols, 1.0);
        Tensor::new(data, vec![rows, cols]).unwrap()
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let err = MultiHeadSelfAttention::new(5, 2, 0.02, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_shape_preserved() {
        let attn = MultiHeadSelfAttention::new(8, 2, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(attn.head_dim(), 4);
        for t in 1..=6 {
            let y = attn.forward(&random_input(t, 8, t as u64)).unwrap();
            assert_eq!(y.shape, vec![t, 8]);
        }
    }

    #[test]
    fn test_malformed_input_rejected() {
        let attn = MultiHeadSelfAttention::new(8, 2, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        let err = attn.forward(&Tensor::zeros(vec![3, 7])).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
        assert!(attn.forward(&Tensor::zeros(vec![0, 8])).is_err());
        assert!(attn.forward(&Tensor::zeros(vec![8])).is_err());
    }

    #[test]
    fn test_attention_rows_are_distributions() {
        let attn = MultiHeadSelfAttention::new(8, 4, 0.5, &mut StdRng::seed_from_u64(2)).unwrap();
        let probs = attn.attention_probs(&random_input(5, 8, 3)).unwrap();
        assert_eq!(probs.len(), 4);
        for head in &probs {
            assert_eq!(head.shape, vec![5, 5]);
            for i in 0..5 {
                let row = head.row(i);
                assert!(row.iter().all(|&p| p >= 0.0));
                assert!(row[i + 1..].iter().all(|&p| p == 0.0));
                assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_single_position_weight_is_one() {
        let attn = MultiHeadSelfAttention::new(4, 2, 0.5, &mut StdRng::seed_from_u64(4)).unwrap();
        for head in attn.attention_probs(&random_input(1, 4, 5)).unwrap() {
            assert_eq!(head.data, vec![1.0]);
        }
    }

    #[test]
    fn test_future_positions_do_not_leak() {
        let attn = MultiHeadSelfAttention::new(8, 2, 0.5, &mut StdRng::seed_from_u64(6)).unwrap();
        let x = random_input(4, 8, 7);
        let mut perturbed = x.clone();
        for v in &mut perturbed.data[3 * 8..] {
            *v += 10.0;
        }

        let a = attn.forward(&x).unwrap();
        let b = attn.forward(&perturbed).unwrap();
        for i in 0..3 {
            assert_eq!(a.row(i), b.row(i));
        }
        assert_ne!(a.row(3), b.row(3));
    }

    #[test]
    fn test_zero_output_projection_silences_layer() {
        let mut attn = MultiHeadSelfAttention::new(4, 2, 0.5, &mut StdRng::seed_from_u64(8)).unwrap();
        attn.output = Linear::zeros(4, 4);
        let y = attn.forward(&random_input(3, 4, 9)).unwrap();
        assert!(y.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_fused_matches_per_head_layout() {
        let mut rng = StdRng::seed_from_u64(10);
        let (d, heads) = (4, 2);
        let mut c_attn = Linear::new(d, 3 * d, 0.5, &mut rng);
        c_attn.bias = Tensor::from_vec((0..3 * d).map(|i| i as f32 * 0.01).collect());
        let c_proj = Linear::new(d, d, 0.5, &mut rng);

        let attn = MultiHeadSelfAttention::from_fused(&c_attn, c_proj.clone(), heads).unwrap();
        assert_eq!(attn.num_heads(), 2);

        // Head 1's key projection owns fused columns [D + 2, D + 4).
        let key = &attn.heads[1].key;
        assert_eq!(key.weight, c_attn.weight.slice_cols(6..8).unwrap());
        assert_eq!(key.bias.data, vec![6.0 * 0.01, 7.0 * 0.01]);

        // Fused Q·x for head 0 equals the head's own query projection.
        let x = random_input(2, d, 11);
        let fused_q = c_attn.forward(&x).unwrap().slice_cols(0..2).unwrap();
        let head_q = attn.heads[0].query.forward(&x).unwrap();
        assert_eq!(fused_q, head_q);

        assert_eq!(attn.num_parameters(), c_attn.num_parameters() + c_proj.num_parameters());
    }

    #[test]
    fn test_from_heads_validates_shapes() {
        let head = HeadProjection {
            query: Linear::zeros(4, 2),
            key: Linear::zeros(4, 3),
            value: Linear::zeros(4, 2),
        };
        let err = MultiHeadSelfAttention::from_heads(vec![head.clone(), head], Linear::zeros(4, 4))
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
