use anyhow::{anyhow, Result};
use num_traits::FromPrimitive;
use qadmm_core::math::{scalar, RealNumber};
use qadmm_core::matrix::DenseMatrix;
use qadmm_core::traits::KktSolver;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct DensePattern {
    dimension: usize,
}

impl DensePattern {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Square system matrix handed to the dense factorisations, row-major.
#[derive(Debug, Clone)]
pub struct DenseKktMatrix<T: RealNumber> {
    pub dimension: usize,
    pub data: Vec<T>,
}

impl<T> DenseKktMatrix<T>
where
    T: RealNumber,
{
    pub fn new(dimension: usize, data: Vec<T>) -> Self {
        assert_eq!(dimension * dimension, data.len());
        Self { dimension, data }
    }

    pub fn from_dense(matrix: &DenseMatrix<T>) -> Self {
        assert_eq!(matrix.nrows, matrix.ncols, "system matrices must be square");
        Self::new(matrix.nrows, matrix.data.clone())
    }

    fn lower(&self, row: usize, col: usize) -> T {
        self.data[row * self.dimension + col]
    }
}

/// Offset of `(row, col)`, `col <= row`, in a row-packed lower triangle.
#[inline]
fn packed(row: usize, col: usize) -> usize {
    row * (row + 1) / 2 + col
}

/// Up-looking `LDLᵀ` of a symmetric positive definite matrix such as
/// `P + σI + ρAᵀA`. Only the lower triangle of the input is read.
///
/// `L` and `D` share one packed triangle: the strict lower part holds `L`,
/// the diagonal holds `D`. Pivots are not reordered, so a pivot at or below
/// `pivot_tolerance` times the largest input diagonal is an error.
pub struct DenseKktSolver<T: RealNumber> {
    dimension: usize,
    factor: Vec<T>,
    row: Vec<T>,
    pivot_tolerance: T,
    factored: bool,
    factorizations: usize,
}

impl<T> DenseKktSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    pub fn new() -> Self {
        Self {
            dimension: 0,
            factor: Vec::new(),
            row: Vec::new(),
            pivot_tolerance: scalar(1e-12),
            factored: false,
            factorizations: 0,
        }
    }

    pub fn factorizations(&self) -> usize {
        self.factorizations
    }
}

impl<T> Default for DenseKktSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KktSolver<T> for DenseKktSolver<T>
where
    T: RealNumber + FromPrimitive,
{
    type Pattern = DensePattern;
    type Matrix = DenseKktMatrix<T>;

    fn analyze_pattern(&mut self, pattern: &Self::Pattern) -> Result<()> {
        let n = pattern.dimension();
        self.dimension = n;
        self.factor = vec![T::zero(); n * (n + 1) / 2];
        self.row = vec![T::zero(); n];
        self.factored = false;
        Ok(())
    }

    fn factor(&mut self, matrix: &Self::Matrix) -> Result<()> {
        if matrix.dimension != self.dimension || self.row.len() != self.dimension {
            self.analyze_pattern(&DensePattern::new(matrix.dimension))?;
        }
        self.factored = false;
        let n = self.dimension;
        let scale = (0..n).fold(T::one(), |acc, i| acc.max(matrix.lower(i, i).abs()));
        let floor = self.pivot_tolerance * scale;

        for i in 0..n {
            // row[j] = L(i, j) · D(j), built left to right
            for j in 0..i {
                let mut value = matrix.lower(i, j);
                for k in 0..j {
                    value -= self.row[k] * self.factor[packed(j, k)];
                }
                self.row[j] = value;
            }
            let mut pivot = matrix.lower(i, i);
            for j in 0..i {
                let l_ij = self.row[j] / self.factor[packed(j, j)];
                pivot -= self.row[j] * l_ij;
                self.factor[packed(i, j)] = l_ij;
            }
            if pivot.is_nan() || pivot <= floor {
                return Err(anyhow!(
                    "matrix is not positive definite: pivot {:.3e} at row {} (floor {:.3e})",
                    pivot.to_f64().unwrap_or(f64::NAN),
                    i,
                    floor.to_f64().unwrap_or(f64::NAN)
                ));
            }
            self.factor[packed(i, i)] = pivot;
        }
        self.factored = true;
        self.factorizations += 1;
        trace!(dimension = n, count = self.factorizations, "packed LDLT factorisation");
        Ok(())
    }

    fn solve(&self, rhs: &mut [T]) -> Result<()> {
        if !self.factored {
            return Err(anyhow!("solve called before a successful factorisation"));
        }
        let n = self.dimension;
        if rhs.len() != n {
            return Err(anyhow!("rhs length {} does not match dimension {}", rhs.len(), n));
        }
        for i in 0..n {
            let start = packed(i, 0);
            let reduction = self.factor[start..start + i]
                .iter()
                .zip(rhs[..i].iter())
                .fold(T::zero(), |acc, (l, x)| acc + *l * *x);
            rhs[i] -= reduction;
        }
        for (i, value) in rhs.iter_mut().enumerate() {
            *value = *value / self.factor[packed(i, i)];
        }
        for i in (0..n).rev() {
            let mut value = rhs[i];
            for j in (i + 1)..n {
                value -= self.factor[packed(j, i)] * rhs[j];
            }
            rhs[i] = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn solves_spd_system() {
        let matrix = DenseKktMatrix::new(2, vec![4.0, 1.0, 1.0, 3.0]);
        let mut solver = DenseKktSolver::new();
        solver.analyze_pattern(&DensePattern::new(2)).unwrap();
        solver.factor(&matrix).unwrap();
        let mut rhs = vec![1.0f64, 2.0];
        solver.solve(&mut rhs).unwrap();
        assert_abs_diff_eq!(4.0 * rhs[0] + rhs[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rhs[0] + 3.0 * rhs[1], 2.0, epsilon = 1e-12);
        assert_eq!(solver.factorizations(), 1);
    }

    #[test]
    fn refactors_larger_system_in_place() {
        // tridiagonal [2 -1; -1 2 -1; -1 2] then the identity of the same size
        let tridiagonal = DenseKktMatrix::new(3, vec![2.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 2.0]);
        let mut solver = DenseKktSolver::new();
        solver.factor(&tridiagonal).unwrap();
        let mut rhs = vec![1.0f64, 0.0, 1.0];
        solver.solve(&mut rhs).unwrap();
        for value in &rhs {
            assert_abs_diff_eq!(*value, 1.0, epsilon = 1e-12);
        }

        let identity = DenseKktMatrix::new(3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        solver.factor(&identity).unwrap();
        let mut rhs = vec![3.0f64, -2.0, 5.0];
        solver.solve(&mut rhs).unwrap();
        assert_eq!(rhs, vec![3.0, -2.0, 5.0]);
        assert_eq!(solver.factorizations(), 2);
    }

    #[test]
    fn rejects_indefinite_matrix() {
        let matrix = DenseKktMatrix::new(2, vec![0.0, 1.0, 1.0, 0.0]);
        let mut solver = DenseKktSolver::<f64>::new();
        assert!(solver.factor(&matrix).is_err());
        let mut rhs = vec![1.0, 1.0];
        assert!(solver.solve(&mut rhs).is_err());
    }
}
