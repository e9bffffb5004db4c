use crate::math::{box_violation, is_binary, positive_part, scalar, RealNumber};
use crate::matrix::DenseMatrix;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
}

pub type ProblemResult<T> = Result<T, ProblemError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CscMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> CscMatrix<T>
where
    T: RealNumber,
{
    pub fn empty(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            indptr: vec![0; ncols + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Assembles a CSC matrix from `(row, col, value)` triplets. Duplicates are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, T)]) -> Self {
        let mut tri = TriMat::new((nrows, ncols));
        for &(row, col, value) in triplets {
            tri.add_triplet(row, col, value);
        }
        let csc: CsMat<T> = tri.to_csc();
        let mut indptr = Vec::with_capacity(ncols + 1);
        let mut indices = Vec::with_capacity(csc.nnz());
        let mut data = Vec::with_capacity(csc.nnz());
        indptr.push(0);
        for column in csc.outer_iterator() {
            for (row, value) in column.iter() {
                indices.push(row);
                data.push(*value);
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.indptr.len() != self.ncols + 1 {
            return Err(ProblemError::DimensionMismatch(format!(
                "indptr length {} != ncols + 1 ({})",
                self.indptr.len(),
                self.ncols + 1
            )));
        }
        if self.indices.len() != self.data.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "indices length {} != data length {}",
                self.indices.len(),
                self.data.len()
            )));
        }
        if self.indptr.windows(2).any(|w| w[0] > w[1])
            || self.indptr.last().copied().unwrap_or(0) != self.data.len()
        {
            return Err(ProblemError::InvalidStructure(
                "column pointers must be non-decreasing and end at nnz".into(),
            ));
        }
        if let Some(row) = self.indices.iter().find(|&&row| row >= self.nrows) {
            return Err(ProblemError::InvalidStructure(format!(
                "row index {row} out of range for {} rows",
                self.nrows
            )));
        }
        if self.data.iter().any(|v| !v.is_finite()) {
            return Err(ProblemError::InvalidStructure(
                "matrix entries must be finite".into(),
            ));
        }
        Ok(())
    }

    pub fn to_dense(&self) -> DenseMatrix<T> {
        DenseMatrix::from_csc(self)
    }

    pub fn mul_vec(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "csc matrix-vector dimension mismatch");
        let mut out = vec![T::zero(); self.nrows];
        for (col, &xc) in x.iter().enumerate() {
            for idx in self.indptr[col]..self.indptr[col + 1] {
                out[self.indices[idx]] += self.data[idx] * xc;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub lower: Vec<T>,
    pub upper: Vec<T>,
}

impl<T> Bounds<T>
where
    T: RealNumber,
{
    pub fn nonnegative(dim: usize) -> Self {
        Self {
            lower: vec![T::zero(); dim],
            upper: vec![T::infinity(); dim],
        }
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.lower.len() != self.upper.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "lower len {} != upper len {}",
                self.lower.len(),
                self.upper.len()
            )));
        }
        for (i, (lo, hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if lo > hi || lo.is_nan() || hi.is_nan() {
                return Err(ProblemError::InvalidStructure(format!(
                    "lower bound exceeds upper bound at index {i}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_rows<T: RealNumber>(
    label: &str,
    matrix: &CscMatrix<T>,
    rhs: &[T],
    nvars: usize,
) -> ProblemResult<()> {
    matrix.validate()?;
    if matrix.ncols != nvars {
        return Err(ProblemError::DimensionMismatch(format!(
            "{label} matrix columns {} != nvars {}",
            matrix.ncols, nvars
        )));
    }
    if matrix.nrows != rhs.len() {
        return Err(ProblemError::DimensionMismatch(format!(
            "{label} rows {} != rhs len {}",
            matrix.nrows,
            rhs.len()
        )));
    }
    if rhs.iter().any(|v| !v.is_finite()) {
        return Err(ProblemError::InvalidStructure(format!(
            "{label} right-hand side must be finite"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualityConstraints<T> {
    pub matrix: CscMatrix<T>,
    pub rhs: Vec<T>,
}

impl<T> EqualityConstraints<T>
where
    T: RealNumber,
{
    fn validate(&self, nvars: usize) -> ProblemResult<()> {
        validate_rows("equality", &self.matrix, &self.rhs, nvars)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InequalityConstraints<T> {
    pub matrix: CscMatrix<T>,
    pub rhs: Vec<T>,
}

impl<T> InequalityConstraints<T>
where
    T: RealNumber,
{
    fn validate(&self, nvars: usize) -> ProblemResult<()> {
        validate_rows("inequality", &self.matrix, &self.rhs, nvars)
    }
}

/// Joint rows `A2 x + A3 u <= b2` tying the binary and continuous blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingConstraints<T> {
    pub binary_matrix: CscMatrix<T>,
    pub continuous_matrix: CscMatrix<T>,
    pub rhs: Vec<T>,
}

impl<T> CouplingConstraints<T>
where
    T: RealNumber,
{
    fn validate(&self, n: usize, l: usize) -> ProblemResult<()> {
        validate_rows("coupling binary", &self.binary_matrix, &self.rhs, n)?;
        validate_rows("coupling continuous", &self.continuous_matrix, &self.rhs, l)
    }
}

/// Mixed-binary quadratic program.
///
/// Variables are ordered binaries first, then continuous ones. The objective is
/// `1/2 vᵀ Q v + aᵀ v + constant` over `v = (x, u)`; constraints are split by the
/// variable blocks they touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: RealNumber + Deserialize<'de>"))]
pub struct ProblemModel<T> {
    pub num_binary: usize,
    pub num_continuous: usize,
    pub quadratic: CscMatrix<T>,
    pub linear: Vec<T>,
    #[serde(default = "zero")]
    pub constant: T,
    #[serde(default)]
    pub equalities: Option<EqualityConstraints<T>>,
    #[serde(default)]
    pub binary_inequalities: Option<InequalityConstraints<T>>,
    #[serde(default)]
    pub coupling: Option<CouplingConstraints<T>>,
    #[serde(default)]
    pub continuous_inequalities: Option<InequalityConstraints<T>>,
    /// Defaults to `u >= 0` when absent.
    #[serde(default)]
    pub continuous_bounds: Option<Bounds<T>>,
}

fn zero<T: RealNumber>() -> T {
    T::zero()
}

impl<T> ProblemModel<T>
where
    T: RealNumber,
{
    pub fn nvars(&self) -> usize {
        self.num_binary + self.num_continuous
    }

    pub fn validate(&self) -> ProblemResult<()> {
        let n = self.num_binary;
        let l = self.num_continuous;
        let total = self.nvars();
        self.quadratic.validate()?;
        if self.quadratic.nrows != total || self.quadratic.ncols != total {
            return Err(ProblemError::DimensionMismatch(format!(
                "quadratic matrix is {}x{} but the model has {total} variables",
                self.quadratic.nrows, self.quadratic.ncols
            )));
        }
        if self.linear.len() != total {
            return Err(ProblemError::DimensionMismatch(format!(
                "linear term length {} != nvars {total}",
                self.linear.len()
            )));
        }
        if self.linear.iter().any(|v| !v.is_finite()) || !self.constant.is_finite() {
            return Err(ProblemError::InvalidStructure(
                "objective coefficients must be finite".into(),
            ));
        }
        let tol = scalar::<T>(1e-9);
        if !self.quadratic.to_dense().is_symmetric(tol) {
            return Err(ProblemError::InvalidStructure(
                "quadratic matrix must be symmetric".into(),
            ));
        }
        if let Some(eq) = &self.equalities {
            eq.validate(n)?;
        }
        if let Some(ineq) = &self.binary_inequalities {
            ineq.validate(n)?;
        }
        if let Some(coupling) = &self.coupling {
            coupling.validate(n, l)?;
        }
        if let Some(ineq) = &self.continuous_inequalities {
            ineq.validate(l)?;
        }
        if let Some(bounds) = &self.continuous_bounds {
            if bounds.lower.len() != l {
                return Err(ProblemError::DimensionMismatch(format!(
                    "bounds size {} != continuous count {l}",
                    bounds.lower.len()
                )));
            }
            bounds.validate()?;
        }
        Ok(())
    }

    pub fn bounds(&self) -> Bounds<T> {
        self.continuous_bounds
            .clone()
            .unwrap_or_else(|| Bounds::nonnegative(self.num_continuous))
    }

    fn stacked(&self, binary: &[T], continuous: &[T]) -> Vec<T> {
        let mut v = Vec::with_capacity(self.nvars());
        v.extend_from_slice(binary);
        v.extend_from_slice(continuous);
        v
    }

    /// Original, unpenalised objective.
    pub fn objective(&self, binary: &[T], continuous: &[T]) -> T {
        let v = self.stacked(binary, continuous);
        let qv = self.quadratic.mul_vec(&v);
        let half = T::from_f64(0.5).unwrap_or_else(T::nan);
        v.iter()
            .zip(qv.iter().zip(self.linear.iter()))
            .fold(self.constant, |acc, (vi, (qvi, ai))| {
                acc + half * (*vi) * (*qvi) + (*ai) * (*vi)
            })
    }

    pub fn violation(&self, binary: &[T], continuous: &[T]) -> ConstraintViolation<T> {
        let mut report = ConstraintViolation::default();
        if let Some(eq) = &self.equalities {
            report.equality = eq
                .matrix
                .mul_vec(binary)
                .iter()
                .zip(eq.rhs.iter())
                .fold(T::zero(), |acc, (lhs, rhs)| acc.max((*lhs - *rhs).abs()));
        }
        if let Some(ineq) = &self.binary_inequalities {
            report.binary_inequality = max_excess(&ineq.matrix.mul_vec(binary), &ineq.rhs);
        }
        if let Some(coupling) = &self.coupling {
            let mut lhs = coupling.binary_matrix.mul_vec(binary);
            for (acc, value) in lhs
                .iter_mut()
                .zip(coupling.continuous_matrix.mul_vec(continuous))
            {
                *acc += value;
            }
            report.coupling = max_excess(&lhs, &coupling.rhs);
        }
        if let Some(ineq) = &self.continuous_inequalities {
            report.continuous_inequality = max_excess(&ineq.matrix.mul_vec(continuous), &ineq.rhs);
        }
        let bounds = self.bounds();
        report.bounds = box_violation(continuous, &bounds.lower, &bounds.upper);
        report.integrality = if binary.iter().all(|v| is_binary(*v)) {
            T::zero()
        } else {
            T::one()
        };
        report
    }

    pub fn is_feasible(&self, binary: &[T], continuous: &[T], tol: T) -> bool {
        self.violation(binary, continuous).within(tol)
    }
}

fn max_excess<T: RealNumber>(lhs: &[T], rhs: &[T]) -> T {
    lhs.iter()
        .zip(rhs.iter())
        .fold(T::zero(), |acc, (l, r)| acc.max(positive_part(*l - *r)))
}

/// Largest violation per constraint block of the original model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation<T> {
    pub equality: T,
    pub binary_inequality: T,
    pub coupling: T,
    pub continuous_inequality: T,
    pub bounds: T,
    pub integrality: T,
}

impl<T> Default for ConstraintViolation<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            equality: T::zero(),
            binary_inequality: T::zero(),
            coupling: T::zero(),
            continuous_inequality: T::zero(),
            bounds: T::zero(),
            integrality: T::zero(),
        }
    }
}

impl<T> ConstraintViolation<T>
where
    T: RealNumber,
{
    pub fn max(&self) -> T {
        [
            self.equality,
            self.binary_inequality,
            self.coupling,
            self.continuous_inequality,
            self.bounds,
            self.integrality,
        ]
        .into_iter()
        .fold(T::zero(), T::max)
    }

    pub fn within(&self, tol: T) -> bool {
        self.max() <= tol
    }

    /// Violations that only the continuous block can repair once `x` is fixed.
    pub fn continuous_part(&self) -> T {
        self.coupling.max(self.continuous_inequality).max(self.bounds)
    }
}

/// Caller-supplied starting point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialGuess<T> {
    pub binary: Vec<T>,
    pub continuous: Vec<T>,
}

impl<T> InitialGuess<T>
where
    T: RealNumber,
{
    pub fn zeros(n: usize, l: usize) -> Self {
        Self {
            binary: vec![T::zero(); n],
            continuous: vec![T::zero(); l],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn example() -> ProblemModel<f64> {
        // x = (v, w, t), u: 5 (u - 2)^2 + t + v + w.
        ProblemModel {
            num_binary: 3,
            num_continuous: 1,
            quadratic: CscMatrix::from_triplets(4, 4, &[(3, 3, 10.0)]),
            linear: vec![1.0, 1.0, 1.0, -20.0],
            constant: 20.0,
            equalities: Some(EqualityConstraints {
                matrix: CscMatrix::from_triplets(1, 3, &[(0, 0, 1.0), (0, 1, 1.0)]),
                rhs: vec![1.0],
            }),
            binary_inequalities: Some(InequalityConstraints {
                matrix: CscMatrix::from_triplets(1, 3, &[(0, 0, -1.0), (0, 1, -1.0), (0, 2, -1.0)]),
                rhs: vec![-1.0],
            }),
            coupling: Some(CouplingConstraints {
                binary_matrix: CscMatrix::from_triplets(1, 3, &[(0, 0, 1.0), (0, 1, 2.0), (0, 2, 1.0)]),
                continuous_matrix: CscMatrix::from_triplets(1, 1, &[(0, 0, 1.0)]),
                rhs: vec![3.0],
            }),
            continuous_inequalities: None,
            continuous_bounds: None,
        }
    }

    #[test]
    fn model_validation_passes() {
        assert!(example().validate().is_ok());
    }

    #[test]
    fn detects_mismatched_coupling() {
        let mut model = example();
        if let Some(coupling) = model.coupling.as_mut() {
            coupling.rhs.push(1.0);
        }
        assert!(matches!(
            model.validate(),
            Err(ProblemError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn rejects_asymmetric_objective() {
        let mut model = example();
        model.quadratic = CscMatrix::from_triplets(4, 4, &[(0, 1, 1.0), (3, 3, 10.0)]);
        assert!(matches!(
            model.validate(),
            Err(ProblemError::InvalidStructure(_))
        ));
    }

    #[test]
    fn triplets_sum_duplicates() {
        let matrix = CscMatrix::from_triplets(2, 2, &[(1, 0, 1.0), (1, 0, 2.0), (0, 1, 4.0)]);
        assert!(matrix.validate().is_ok());
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.mul_vec(&[1.0, 1.0]), vec![4.0, 3.0]);
    }

    #[test]
    fn objective_and_violation() {
        let model = example();
        assert_abs_diff_eq!(model.objective(&[1.0, 0.0, 0.0], &[2.0]), 1.0, epsilon = 1e-12);
        assert!(model.is_feasible(&[1.0, 0.0, 0.0], &[2.0], 1e-9));

        let report = model.violation(&[0.0, 1.0, 1.0], &[2.0]);
        assert_abs_diff_eq!(report.equality, 0.0);
        assert_abs_diff_eq!(report.coupling, 2.0);
        assert_abs_diff_eq!(report.max(), 2.0);

        let report = model.violation(&[0.0, 0.0, 0.0], &[-1.0]);
        assert_abs_diff_eq!(report.equality, 1.0);
        assert_abs_diff_eq!(report.binary_inequality, 1.0);
        assert_abs_diff_eq!(report.bounds, 1.0);
    }

    #[test]
    fn missing_constant_deserializes_as_zero() {
        let json = r#"{
            "num_binary": 1,
            "num_continuous": 0,
            "quadratic": {"nrows": 1, "ncols": 1, "indptr": [0, 0], "indices": [], "data": []},
            "linear": [3.0]
        }"#;
        let model: ProblemModel<f64> = serde_json::from_str(json).unwrap();
        assert_eq!(model.constant, 0.0);
        assert!(model.equalities.is_none());
        assert!(model.validate().is_ok());
        assert_abs_diff_eq!(model.objective(&[1.0], &[]), 3.0);

        let text = serde_json::to_string(&example()).unwrap();
        let back: ProblemModel<f64> = serde_json::from_str(&text).unwrap();
        assert_eq!(back.constant, 20.0);
    }
}
