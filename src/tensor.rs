//! Tensor Buffer
//!
//! A minimal dense tensor for the forward pass. Data lives in a flat
//! `Vec<f32>` in row-major order together with its `shape`.
//!
//! Inference only ever needs vectors and matrices, so every operation here is
//! defined for 1D and 2D tensors. A `[T, D]` tensor is how the crate
//! represents "an ordered sequence of T vectors, each of length D".
//!
//! ## Example
//!
//! ```rust
//! use gpt2_infer::Tensor;
//!
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]).unwrap();
//! let c = a.matmul(&b).unwrap();
//! assert_eq!(c.shape, vec![2, 2]);
//! assert_eq!(c.data, vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! ## Parallelism
//!
//! Large matrix multiplications and element-wise operations run on Rayon's
//! thread pool. Each worker writes a disjoint chunk of the output, so no
//! locking is involved.

use std::ops::Range;

use rayon::prelude::*;

use crate::error::{ModelError, Result};

/// Work threshold (m × n × k) above which matmul goes parallel.
const PARALLEL_MATMUL_THRESHOLD: usize = 1_000;

/// A dense row-major array of `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// Fails with `ShapeMismatch` if the product of the shape does not equal
    /// the data length.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(ModelError::shape("tensor data", &[expected_size], &[data.len()]));
        }

        Ok(Self { data, shape })
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let size: usize = shape.iter().product();
        Self {
            data: vec![value; size],
            shape,
        }
    }

    /// Create a 1D tensor from a vector
    pub fn from_vec(data: Vec<f32>) -> Self {
        let len = data.len();
        Self {
            data,
            shape: vec![len],
        }
    }

    /// Build a `[rows.len(), width]` matrix from a sequence of row vectors.
    ///
    /// Every row must have the same length; an empty input or a ragged row
    /// fails with `ShapeMismatch`.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let width = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| ModelError::shape("tensor rows", &[1], &[0]))?;

        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(ModelError::shape("tensor rows", &[width], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, vec![rows.len(), width])
    }

    /// Number of rows of a 2D tensor (1 for a vector).
    pub fn rows(&self) -> usize {
        match self.shape.len() {
            2 => self.shape[0],
            _ => 1,
        }
    }

    /// Length of the last dimension.
    pub fn cols(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Borrow row `i` of a 2D tensor.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds, like slice indexing.
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Copy out every row as its own vector.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.data.chunks(self.cols().max(1)).map(<[f32]>::to_vec).collect()
    }

    /// Require this tensor to be a `[_, cols]` matrix with at least one row
    /// whose storage holds exactly `rows * cols` values.
    pub fn expect_matrix(&self, context: &'static str, cols: usize) -> Result<()> {
        if self.shape.len() != 2 || self.shape[0] == 0 || self.shape[1] != cols {
            let rows = self.shape.first().copied().unwrap_or(0).max(1);
            return Err(ModelError::shape(context, &[rows, cols], &self.shape));
        }
        let expected = self.shape[0] * cols;
        if self.data.len() != expected {
            return Err(ModelError::shape(context, &[expected], &[self.data.len()]));
        }
        Ok(())
    }

    /// Copy of rows `range` of a 2D tensor.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Tensor> {
        if self.shape.len() != 2 || range.end > self.shape[0] || range.start > range.end {
            return Err(ModelError::shape(
                "row slice",
                &[range.end, self.cols()],
                &self.shape,
            ));
        }
        let cols = self.cols();
        let data = self.data[range.start * cols..range.end * cols].to_vec();
        Tensor::new(data, vec![range.len(), cols])
    }

    /// Copy of columns `range` of a 2D tensor.
    pub fn slice_cols(&self, range: Range<usize>) -> Result<Tensor> {
        if self.shape.len() != 2 || range.end > self.shape[1] || range.start > range.end {
            return Err(ModelError::shape(
                "column slice",
                &[self.rows(), range.end],
                &self.shape,
            ));
        }
        let width = range.len();
        let mut data = Vec::with_capacity(self.rows() * width);
        for i in 0..self.rows() {
            data.extend_from_slice(&self.row(i)[range.clone()]);
        }
        Tensor::new(data, vec![self.rows(), width])
    }

    /// Concatenate 2D tensors with equal row counts along the column axis.
    pub fn concat_cols(parts: &[Tensor]) -> Result<Tensor> {
        let rows = parts
            .first()
            .map(Tensor::rows)
            .ok_or_else(|| ModelError::shape("column concat", &[1], &[0]))?;
        for part in parts {
            if part.shape.len() != 2 || part.rows() != rows {
                return Err(ModelError::shape(
                    "column concat",
                    &[rows, part.cols()],
                    &part.shape,
                ));
            }
        }

        let width: usize = parts.iter().map(Tensor::cols).sum();
        let mut data = Vec::with_capacity(rows * width);
        for i in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(i));
            }
        }
        Tensor::new(data, vec![rows, width])
    }

    /// SIMD-friendly inner loop: `result[j] += a_val * b[j]`.
    #[inline(always)]
    fn matmul_inner_simd(a_val: f32, b: &[f32], result: &mut [f32]) {
        // Simple loop that LLVM can auto-vectorize
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication `[m, k] @ [k, n] -> [m, n]`
    ///
    /// Small products run sequentially; larger ones use the parallel
    /// cache-blocked kernel.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        if self.shape.len() != 2 || other.shape.len() != 2 || self.shape[1] != other.shape[0] {
            return Err(ModelError::shape(
                "matmul inner dimension",
                &[self.cols(), other.shape.last().copied().unwrap_or(0)],
                &other.shape,
            ));
        }

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        if m * n * k >= PARALLEL_MATMUL_THRESHOLD {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            let row = &mut result[i * n..(i + 1) * n];
            for l in 0..k {
                Self::matmul_inner_simd(self.data[i * k + l], &other.data[l * n..(l + 1) * n], row);
            }
        }
        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into blocks of `BLOCK_SIZE`; each Rayon worker
    /// owns one block, walking 8×8 tiles of the inner and column dimensions.
    fn matmul_parallel_blocked(
        &self,
        other: &Tensor,
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<Tensor> {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Element-wise addition
    ///
    /// Supports an exact shape match, or broadcasting a vector across the
    /// last dimension (`[T, n] + [n]`, e.g. adding a bias).
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(&a, &b)| a + b)
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        // Broadcast last dim: [*, n] op [n]
        let last_dim = self.cols();
        if other.shape.len() == 1 && other.data.len() == last_dim && last_dim > 0 {
            let result = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, &a)| a + other.data[i % last_dim])
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        Err(ModelError::shape("add", &self.shape, &other.shape))
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Apply `f` to every element in parallel.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        Tensor {
            data: self.data.par_iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Transpose a 2D matrix.
    pub fn transpose(&self) -> Result<Tensor> {
        if self.shape.len() != 2 {
            return Err(ModelError::shape("transpose", &[0, 0], &self.shape));
        }
        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut result = vec![0.0; rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }

        Tensor::new(result, vec![cols, rows])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = Tensor::from_rows(&rows).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));

        assert!(Tensor::from_rows(&[]).is_err());

        let t = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(t.shape, vec![2, 2]);
        assert_eq!(t.row(1), &[3.0, 4.0]);
        assert_eq!(t.to_rows(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_matmul_small() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let b = Tensor::new(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], vec![3, 2]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape, vec![2, 2]);
        assert_eq!(c.data, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_parallel_matches_sequential() {
        // 20 x 13 @ 13 x 11 crosses the parallel threshold and leaves
        // partial 8x8 blocks on every axis.
        let (m, k, n) = (20, 13, 11);
        let a_data: Vec<f32> = (0..m * k).map(|i| ((i % 7) as f32 - 3.0) * 0.5).collect();
        let b_data: Vec<f32> = (0..k * n).map(|i| ((i % 5) as f32 - 2.0) * 0.25).collect();
        let a = Tensor::new(a_data.clone(), vec![m, k]).unwrap();
        let b = Tensor::new(b_data.clone(), vec![k, n]).unwrap();

        let c = a.matmul(&b).unwrap();

        for i in 0..m {
            for j in 0..n {
                let expected: f32 = (0..k).map(|l| a_data[i * k + l] * b_data[l * n + j]).sum();
                assert!((c.data[i * n + j] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_matmul_rejects_mismatch() {
        let a = Tensor::zeros(vec![2, 3]);
        let b = Tensor::zeros(vec![2, 3]);
        assert!(matches!(
            a.matmul(&b),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_add_broadcasts_bias() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let bias = Tensor::from_vec(vec![10.0, 20.0]);
        assert_eq!(a.add(&bias).unwrap().data, vec![11.0, 22.0, 13.0, 24.0]);
        assert_eq!(a.add(&a).unwrap().data, vec![2.0, 4.0, 6.0, 8.0]);
        assert!(a.add(&Tensor::zeros(vec![3])).is_err());
    }

    #[test]
    fn test_transpose_and_slices() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let tt = t.transpose().unwrap();
        assert_eq!(tt.shape, vec![3, 2]);
        assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        assert_eq!(t.slice_rows(1..2).unwrap().data, vec![4.0, 5.0, 6.0]);
        assert_eq!(t.slice_cols(1..3).unwrap().data, vec![2.0, 3.0, 5.0, 6.0]);
        assert!(t.slice_rows(0..3).is_err());

        let parts = [t.slice_cols(0..1).unwrap(), t.slice_cols(1..3).unwrap()];
        assert_eq!(Tensor::concat_cols(&parts).unwrap(), t);
    }

    #[test]
    fn test_expect_matrix() {
        let t = Tensor::zeros(vec![3, 4]);
        assert!(t.expect_matrix("test", 4).is_ok());
        assert!(t.expect_matrix("test", 5).is_err());
        assert!(Tensor::zeros(vec![0, 4]).expect_matrix("test", 4).is_err());
        assert!(Tensor::zeros(vec![4]).expect_matrix("test", 4).is_err());
    }

    #[test]
    fn test_expect_matrix_rejects_short_storage() {
        let mut t = Tensor::zeros(vec![2, 3]);
        t.data.truncate(4);
        let err = t.expect_matrix("test", 3).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
