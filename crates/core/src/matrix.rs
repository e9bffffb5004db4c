use crate::math::RealNumber;
use crate::problem::CscMatrix;
use serde::{Deserialize, Serialize};

/// Row-major dense matrix used for the small per-block subproblems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub data: Vec<T>,
}

impl<T> DenseMatrix<T>
where
    T: RealNumber,
{
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![T::zero(); nrows * ncols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut matrix = Self::zeros(n, n);
        for i in 0..n {
            matrix.set(i, i, T::one());
        }
        matrix
    }

    pub fn from_rows(ncols: usize, rows: &[Vec<T>]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for row in rows {
            assert_eq!(row.len(), ncols, "ragged dense matrix rows");
            data.extend_from_slice(row);
        }
        Self {
            nrows: rows.len(),
            ncols,
            data,
        }
    }

    pub fn from_csc(matrix: &CscMatrix<T>) -> Self {
        let mut dense = Self::zeros(matrix.nrows, matrix.ncols);
        for col in 0..matrix.ncols {
            for idx in matrix.indptr[col]..matrix.indptr[col + 1] {
                let row = matrix.indices[idx];
                dense.add(row, col, matrix.data[idx]);
            }
        }
        dense
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.ncols + col] = value;
    }

    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.ncols + col] += value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn mul_vec(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "matrix-vector dimension mismatch");
        (0..self.nrows)
            .map(|row| {
                self.row(row)
                    .iter()
                    .zip(x.iter())
                    .fold(T::zero(), |acc, (a, b)| acc + (*a) * (*b))
            })
            .collect()
    }

    pub fn mul_transpose_vec(&self, y: &[T]) -> Vec<T> {
        assert_eq!(y.len(), self.nrows, "transpose-vector dimension mismatch");
        let mut out = vec![T::zero(); self.ncols];
        for (row, &weight) in y.iter().enumerate() {
            if weight == T::zero() {
                continue;
            }
            for (col, value) in self.row(row).iter().enumerate() {
                out[col] += *value * weight;
            }
        }
        out
    }

    /// `AᵀA`, an `ncols × ncols` matrix.
    pub fn gram(&self) -> Self {
        let mut out = Self::zeros(self.ncols, self.ncols);
        for row in 0..self.nrows {
            let r = self.row(row);
            for i in 0..self.ncols {
                if r[i] == T::zero() {
                    continue;
                }
                for j in 0..self.ncols {
                    out.data[i * self.ncols + j] += r[i] * r[j];
                }
            }
        }
        out
    }

    pub fn quadratic_form(&self, x: &[T]) -> T {
        let ax = self.mul_vec(x);
        x.iter()
            .zip(ax.iter())
            .fold(T::zero(), |acc, (a, b)| acc + (*a) * (*b))
    }

    /// `self += alpha * other`.
    pub fn add_scaled(&mut self, alpha: T, other: &Self) {
        assert_eq!(self.nrows, other.nrows);
        assert_eq!(self.ncols, other.ncols);
        for (lhs, rhs) in self.data.iter_mut().zip(other.data.iter()) {
            *lhs += alpha * (*rhs);
        }
    }

    pub fn add_diagonal(&mut self, value: T) {
        let n = self.nrows.min(self.ncols);
        for i in 0..n {
            self.add(i, i, value);
        }
    }

    pub fn block(&self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Self {
        let mut out = Self::zeros(rows.len(), cols.len());
        for (i, row) in rows.clone().enumerate() {
            for (j, col) in cols.clone().enumerate() {
                out.set(i, j, self.get(row, col));
            }
        }
        out
    }

    /// Horizontal concatenation `[self other]`.
    pub fn hstack(&self, other: &Self) -> Self {
        assert_eq!(self.nrows, other.nrows, "hstack row mismatch");
        let ncols = self.ncols + other.ncols;
        let mut data = Vec::with_capacity(self.nrows * ncols);
        for row in 0..self.nrows {
            data.extend_from_slice(self.row(row));
            data.extend_from_slice(other.row(row));
        }
        Self {
            nrows: self.nrows,
            ncols,
            data,
        }
    }

    /// Vertical concatenation of `self` on top of `other`.
    pub fn vstack(&self, other: &Self) -> Self {
        assert_eq!(self.ncols, other.ncols, "vstack column mismatch");
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Self {
            nrows: self.nrows + other.nrows,
            ncols: self.ncols,
            data,
        }
    }

    pub fn is_symmetric(&self, tol: T) -> bool {
        if self.nrows != self.ncols {
            return false;
        }
        for i in 0..self.nrows {
            for j in (i + 1)..self.ncols {
                let a = self.get(i, j);
                let b = self.get(j, i);
                if (a - b).abs() > tol * (T::one() + a.abs().max(b.abs())) {
                    return false;
                }
            }
        }
        true
    }
}
