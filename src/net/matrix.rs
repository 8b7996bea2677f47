use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-major 2D matrix of f32 values.
///
/// The batch dimension is always the row dimension: a batch of feature
/// vectors is `[batch, features]`, predicted Q-values are `[batch, actions]`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub data: Vec<f32>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "data length must equal rows * cols");
        Self { data, rows, cols }
    }

    /// Normally distributed entries with the given standard deviation.
    pub fn randn(rows: usize, cols: usize, std_dev: f32) -> Self {
        let normal = Normal::new(0.0, std_dev).unwrap();
        let mut rng = rand::rng();
        let data = (0..rows * cols).map(|_| normal.sample(&mut rng)).collect();
        Self { data, rows, cols }
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// `self @ other`
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.cols, other.rows, "inner dimensions must agree");

        let mut out = Matrix::zeros(self.rows, other.cols);
        out.data
            .par_chunks_mut(other.cols)
            .enumerate()
            .for_each(|(i, out_row)| {
                for k in 0..self.cols {
                    let a = self.data[i * self.cols + k];
                    let b_row = &other.data[k * other.cols..(k + 1) * other.cols];
                    for (o, &b) in out_row.iter_mut().zip(b_row) {
                        *o += a * b;
                    }
                }
            });
        out
    }

    /// `self.T @ other`; both operands must have the same row count.
    pub fn t_matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.rows, other.rows, "row counts must agree");

        let mut out = Matrix::zeros(self.cols, other.cols);
        out.data
            .par_chunks_mut(other.cols)
            .enumerate()
            .for_each(|(i, out_row)| {
                for r in 0..self.rows {
                    let a = self.data[r * self.cols + i];
                    let b_row = &other.data[r * other.cols..(r + 1) * other.cols];
                    for (o, &b) in out_row.iter_mut().zip(b_row) {
                        *o += a * b;
                    }
                }
            });
        out
    }

    /// `self @ other.T`; both operands must have the same column count.
    pub fn matmul_t(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.cols, other.cols, "column counts must agree");

        let mut out = Matrix::zeros(self.rows, other.rows);
        out.data
            .par_chunks_mut(other.rows)
            .enumerate()
            .for_each(|(i, out_row)| {
                let a_row = &self.data[i * self.cols..(i + 1) * self.cols];
                for (j, o) in out_row.iter_mut().enumerate() {
                    let b_row = &other.data[j * other.cols..(j + 1) * other.cols];
                    *o = a_row.iter().zip(b_row).map(|(&a, &b)| a * b).sum();
                }
            });
        out
    }

    /// Sum over the row axis, producing a `1 x cols` matrix.
    pub fn column_sums(&self) -> Matrix {
        let sums = self
            .data
            .par_chunks(self.cols)
            .map(|row| row.to_vec())
            .reduce(
                || vec![0.0; self.cols],
                |mut acc, row| {
                    for (a, b) in acc.iter_mut().zip(&row) {
                        *a += b;
                    }
                    acc
                },
            );
        Matrix::from_vec(sums, 1, self.cols)
    }

    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = self.data.par_iter().map(|&x| f(x)).collect();
        Matrix::from_vec(data, self.rows, self.cols)
    }

    pub fn zip_map<F>(&self, other: &Matrix, f: F) -> Matrix
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        assert_eq!(self.rows, other.rows, "shapes must agree");
        assert_eq!(self.cols, other.cols, "shapes must agree");

        let data = self
            .data
            .par_iter()
            .zip(other.data.par_iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Matrix::from_vec(data, self.rows, self.cols)
    }

    /// Add a `1 x cols` row to every row of `self`.
    pub fn add_row(&mut self, row: &Matrix) {
        assert_eq!(row.rows, 1, "bias must be a single row");
        assert_eq!(row.cols, self.cols, "bias width must match");

        let cols = self.cols;
        self.data.par_chunks_mut(cols).for_each(|chunk| {
            for (c, &b) in chunk.iter_mut().zip(&row.data) {
                *c += b;
            }
        });
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_approx_eq(a: &[f32], b: &[f32]) {
        let tolerance = 1e-6;
        assert_eq!(a.len(), b.len(), "vectors have different lengths");
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() < tolerance, "mismatch at index {}: {} vs {}", i, x, y);
        }
    }

    fn reference_matmul(a: &Matrix, b: &Matrix) -> Vec<f32> {
        let mut result = vec![0.0; a.rows * b.cols];
        for i in 0..a.rows {
            for j in 0..b.cols {
                let mut sum = 0.0;
                for k in 0..a.cols {
                    sum += a.data[i * a.cols + k] * b.data[k * b.cols + j];
                }
                result[i * b.cols + j] = sum;
            }
        }
        result
    }

    fn transposed(m: &Matrix) -> Matrix {
        let mut out = Matrix::zeros(m.cols, m.rows);
        for i in 0..m.rows {
            for j in 0..m.cols {
                out.data[j * m.rows + i] = m.data[i * m.cols + j];
            }
        }
        out
    }

    #[test]
    fn test_zeros() {
        let m = Matrix::zeros(2, 3);
        assert_eq!(m.data, vec![0.0; 6]);
    }

    #[test]
    fn test_from_vec() {
        let m = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    #[should_panic]
    fn test_from_vec_wrong_length() {
        Matrix::from_vec(vec![1.0, 2.0, 3.0], 2, 2);
    }

    #[test]
    fn test_randn_shape() {
        let m = Matrix::randn(10, 20, 1.0);
        assert_eq!(m.data.len(), 200);
    }

    #[test]
    fn test_matmul_simple() {
        // A: [[1, 2, 3], [4, 5, 6]]
        let a = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        // B: [[7, 8], [9, 10], [11, 12]]
        let b = Matrix::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], 3, 2);

        let c = a.matmul(&b);

        assert_eq!((c.rows, c.cols), (2, 2));
        assert_eq!(c.data, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_against_reference() {
        let a = Matrix::randn(64, 32, 1.0);
        let b = Matrix::randn(32, 70, 1.0);

        let fast = a.matmul(&b);
        let slow = reference_matmul(&a, &b);

        assert_eq!((fast.rows, fast.cols), (64, 70));
        assert_vec_approx_eq(&fast.data, &slow);
    }

    #[test]
    fn test_t_matmul_against_reference() {
        let a = Matrix::randn(16, 5, 1.0);
        let b = Matrix::randn(16, 7, 1.0);

        let fast = a.t_matmul(&b);
        let slow = reference_matmul(&transposed(&a), &b);

        assert_eq!((fast.rows, fast.cols), (5, 7));
        assert_vec_approx_eq(&fast.data, &slow);
    }

    #[test]
    fn test_matmul_t_against_reference() {
        let a = Matrix::randn(9, 6, 1.0);
        let b = Matrix::randn(11, 6, 1.0);

        let fast = a.matmul_t(&b);
        let slow = reference_matmul(&a, &transposed(&b));

        assert_eq!((fast.rows, fast.cols), (9, 11));
        assert_vec_approx_eq(&fast.data, &slow);
    }

    #[test]
    fn test_column_sums() {
        let m = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        let s = m.column_sums();

        assert_eq!((s.rows, s.cols), (1, 3));
        assert_vec_approx_eq(&s.data, &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_map() {
        let m = Matrix::from_vec(vec![1.0, 2.0, -3.0], 1, 3);
        let doubled = m.map(|x| x * 2.0);
        assert_vec_approx_eq(&doubled.data, &[2.0, 4.0, -6.0]);
    }

    #[test]
    fn test_zip_map() {
        let a = Matrix::from_vec(vec![1.0, 2.0, 3.0], 1, 3);
        let b = Matrix::from_vec(vec![10.0, 20.0, 30.0], 1, 3);
        let sum = a.zip_map(&b, |x, y| x + y);
        assert_vec_approx_eq(&sum.data, &[11.0, 22.0, 33.0]);
    }

    #[test]
    #[should_panic]
    fn test_zip_map_shape_mismatch() {
        let a = Matrix::from_vec(vec![1.0, 2.0, 3.0], 1, 3);
        let b = Matrix::from_vec(vec![10.0, 20.0], 1, 2);
        a.zip_map(&b, |x, y| x + y);
    }

    #[test]
    fn test_add_row() {
        let mut m = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let bias = Matrix::from_vec(vec![10.0, 20.0], 1, 2);
        m.add_row(&bias);
        assert_vec_approx_eq(&m.data, &[11.0, 22.0, 13.0, 24.0]);
    }
}
