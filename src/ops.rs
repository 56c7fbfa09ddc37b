//! Attention Numerics
//!
//! The pieces of scaled dot-product attention that are pure numeric
//! transforms over a `[T, T]` score matrix. They live outside the attention
//! layer so masking and normalization can be checked on their own.
//!
//! ```text
//! scores = Q @ K^T / √head_dim
//! scores[i][j] = -inf   for j > i        (causal_mask)
//! A = softmax(scores) per row            (softmax_rows)
//! out = A @ V
//! ```

use rayon::prelude::*;

use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Set every future position (`j > i`) of a square score matrix to `-inf`.
///
/// For seq_len=4 the surviving entries form a lower triangle:
/// ```text
/// [x - - -]  position 0 can only see itself
/// [x x - -]  position 1 can see 0,1
/// [x x x -]  position 2 can see 0,1,2
/// [x x x x]  position 3 can see all
/// ```
pub fn causal_mask(scores: &mut Tensor) -> Result<()> {
    let n = scores.rows();
    if scores.shape != [n, n] {
        return Err(ModelError::shape("causal mask", &[n, n], &scores.shape));
    }

    scores
        .data
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            for value in &mut row[i + 1..] {
                *value = f32::NEG_INFINITY;
            }
        });
    Ok(())
}

/// Numerically stable softmax over each row of a 2D tensor.
///
/// ```text
/// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
/// ```
///
/// A row that is entirely `-inf` has nothing to attend to and comes back as
/// zeros rather than NaN.
pub fn softmax_rows(x: &Tensor) -> Tensor {
    let cols = x.cols().max(1);

    let data: Vec<f32> = x
        .data
        .par_chunks(cols)
        .flat_map_iter(|row| {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let exp_values: Vec<f32> = if max == f32::NEG_INFINITY {
                vec![0.0; row.len()]
            } else {
                row.iter().map(|&v| (v - max).exp()).collect()
            };
            let sum: f32 = exp_values.iter().sum();
            let scale = if sum > 0.0 { 1.0 / sum } else { 0.0 };
            exp_values.into_iter().map(move |v| v * scale)
        })
        .collect();

    Tensor {
        data,
        shape: x.shape.clone(),
    }
}

/// Causal scaled dot-product attention for one head.
///
/// `q`, `k`, `v` are `[T, head_dim]`. Returns the head output `[T, head_dim]`
/// together with the attention weights `[T, T]`.
pub fn causal_attention(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<(Tensor, Tensor)> {
    let head_dim = q.cols();
    k.expect_matrix("attention keys", head_dim)?;
    v.expect_matrix("attention values", head_dim)?;
    if k.rows() != q.rows() || v.rows() != q.rows() {
        return Err(ModelError::shape("attention keys", &q.shape, &k.shape));
    }

    let scale = 1.0 / (head_dim as f32).sqrt();
    let mut scores = q.matmul(&k.transpose()?)?.mul_scalar(scale);
    causal_mask(&mut scores)?;
    let weights = softmax_rows(&scores);
    let out = weights.matmul(v)?;
    Ok((out, weights))
}
