use crate::dense::{DenseKktMatrix, DensePattern};
use anyhow::{anyhow, Result};
use num_traits::FromPrimitive;
use qadmm_core::math::{scalar, RealNumber};
use qadmm_core::traits::KktSolver;

/// LU factorisation with partial (row) pivoting.
///
/// Handles the indefinite saddle-point systems `[P Aᵀ; A 0]` that the
/// `LDLᵀ` backend cannot factor without pivoting. A pivot below the relative
/// threshold is reported as singular.
pub struct DenseLuSolver<T: RealNumber> {
    dimension: usize,
    lu: Vec<T>,
    permutation: Vec<usize>,
    factored: bool,
}

impl<T> DenseLuSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    pub fn new() -> Self {
        Self {
            dimension: 0,
            lu: Vec::new(),
            permutation: Vec::new(),
            factored: false,
        }
    }

    fn at(&self, row: usize, col: usize) -> T {
        self.lu[row * self.dimension + col]
    }
}

impl<T> Default for DenseLuSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KktSolver<T> for DenseLuSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    type Pattern = DensePattern;
    type Matrix = DenseKktMatrix<T>;

    fn analyze_pattern(&mut self, pattern: &Self::Pattern) -> Result<()> {
        self.dimension = pattern.dimension();
        self.lu = vec![T::zero(); self.dimension * self.dimension];
        self.permutation = (0..self.dimension).collect();
        self.factored = false;
        Ok(())
    }

    fn factor(&mut self, matrix: &Self::Matrix) -> Result<()> {
        if matrix.dimension != self.dimension {
            self.analyze_pattern(&DensePattern::new(matrix.dimension))?;
        }
        let n = self.dimension;
        self.lu.clone_from(&matrix.data);
        self.permutation = (0..n).collect();
        self.factored = false;

        let scale = matrix
            .data
            .iter()
            .fold(T::zero(), |acc, v| acc.max(v.abs()))
            .max(T::one());
        let threshold = scalar::<T>(1e-12) * scale;

        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_abs = self.at(k, k).abs();
            for row in (k + 1)..n {
                let candidate = self.at(row, k).abs();
                if candidate > pivot_abs {
                    pivot_abs = candidate;
                    pivot_row = row;
                }
            }
            if pivot_abs <= threshold {
                return Err(anyhow!("singular system: no usable pivot in column {k}"));
            }
            if pivot_row != k {
                for col in 0..n {
                    self.lu.swap(k * n + col, pivot_row * n + col);
                }
                self.permutation.swap(k, pivot_row);
            }
            let pivot = self.at(k, k);
            for row in (k + 1)..n {
                let factor = self.at(row, k) / pivot;
                self.lu[row * n + k] = factor;
                if factor == T::zero() {
                    continue;
                }
                for col in (k + 1)..n {
                    let update = factor * self.at(k, col);
                    self.lu[row * n + col] -= update;
                }
            }
        }
        self.factored = true;
        Ok(())
    }

    fn solve(&self, rhs: &mut [T]) -> Result<()> {
        if !self.factored {
            return Err(anyhow!("solve called before a successful factorisation"));
        }
        let n = self.dimension;
        if rhs.len() != n {
            return Err(anyhow!(
                "rhs length {} does not match dimension {}",
                rhs.len(),
                n
            ));
        }
        let mut y: Vec<T> = self.permutation.iter().map(|&p| rhs[p]).collect();
        for i in 0..n {
            for j in 0..i {
                let y_j = y[j];
                y[i] -= self.at(i, j) * y_j;
            }
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                let y_j = y[j];
                y[i] -= self.at(i, j) * y_j;
            }
            y[i] = y[i] / self.at(i, i);
        }
        rhs.copy_from_slice(&y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_saddle_point_system() {
        // [10 1; 1 0] [u; y] = [20; 2]
        let matrix = DenseKktMatrix::new(2, vec![10.0, 1.0, 1.0, 0.0]);
        let mut solver = DenseLuSolver::new();
        solver.factor(&matrix).unwrap();
        let mut rhs = vec![20.0f64, 2.0];
        solver.solve(&mut rhs).unwrap();
        assert!((rhs[0] - 2.0).abs() < 1e-12);
        assert!(rhs[1].abs() < 1e-12);
    }

    #[test]
    fn needs_pivoting() {
        let matrix = DenseKktMatrix::new(2, vec![0.0, 1.0, 1.0, 0.0]);
        let mut solver = DenseLuSolver::new();
        solver.factor(&matrix).unwrap();
        let mut rhs = vec![3.0f64, 4.0];
        solver.solve(&mut rhs).unwrap();
        assert_eq!(rhs, vec![4.0, 3.0]);
    }

    #[test]
    fn reports_singular_matrix() {
        let matrix = DenseKktMatrix::new(2, vec![1.0, 2.0, 2.0, 4.0]);
        let mut solver = DenseLuSolver::<f64>::new();
        assert!(solver.factor(&matrix).is_err());
        let mut rhs = vec![1.0, 1.0];
        assert!(solver.solve(&mut rhs).is_err());
    }
}
