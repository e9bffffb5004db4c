use crate::math::{box_violation, dot, positive_part, scalar, RealNumber};
use crate::matrix::DenseMatrix;
use serde::{Deserialize, Serialize};

/// Binary quadratic objective `xᵀPx + qᵀx + c` over `x ∈ {0,1}ⁿ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuboProblem<T> {
    pub quadratic: DenseMatrix<T>,
    pub linear: Vec<T>,
    pub constant: T,
}

impl<T> QuboProblem<T>
where
    T: RealNumber,
{
    pub fn zeros(n: usize) -> Self {
        Self {
            quadratic: DenseMatrix::zeros(n, n),
            linear: vec![T::zero(); n],
            constant: T::zero(),
        }
    }

    pub fn dim(&self) -> usize {
        self.linear.len()
    }

    pub fn energy(&self, x: &[T]) -> T {
        self.quadratic.quadratic_form(x) + dot(&self.linear, x) + self.constant
    }

    /// Adds `weight * ||A x - d||²`.
    pub fn add_least_squares(&mut self, weight: T, a: &DenseMatrix<T>, d: &[T]) {
        let two = scalar::<T>(2.0);
        self.quadratic.add_scaled(weight, &a.gram());
        let atd = a.mul_transpose_vec(d);
        for (qi, v) in self.linear.iter_mut().zip(atd) {
            *qi -= two * weight * v;
        }
        self.constant += weight * dot(d, d);
    }

    /// Adds `weight * ||x - w||²`.
    pub fn add_proximal(&mut self, weight: T, w: &[T]) {
        let two = scalar::<T>(2.0);
        self.quadratic.add_diagonal(weight);
        for (qi, wi) in self.linear.iter_mut().zip(w.iter()) {
            *qi -= two * weight * (*wi);
        }
        self.constant += weight * dot(w, w);
    }

    /// Moves the diagonal into the linear term, valid because `x_i² = x_i`.
    pub fn fold_diagonal(&mut self) {
        for i in 0..self.dim() {
            let d = self.quadratic.get(i, i);
            self.linear[i] += d;
            self.quadratic.set(i, i, T::zero());
        }
    }
}

/// Linear rows `M y (<=|=) rhs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRows<T> {
    pub matrix: DenseMatrix<T>,
    pub rhs: Vec<T>,
}

impl<T> LinearRows<T>
where
    T: RealNumber,
{
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

/// Convex quadratic program `1/2 yᵀPy + qᵀy + c` with linear rows and a box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvexProblem<T> {
    pub quadratic: DenseMatrix<T>,
    pub linear: Vec<T>,
    pub constant: T,
    pub equalities: Option<LinearRows<T>>,
    pub inequalities: Option<LinearRows<T>>,
    pub lower: Vec<T>,
    pub upper: Vec<T>,
}

impl<T> ConvexProblem<T>
where
    T: RealNumber,
{
    pub fn unconstrained(n: usize) -> Self {
        Self {
            quadratic: DenseMatrix::zeros(n, n),
            linear: vec![T::zero(); n],
            constant: T::zero(),
            equalities: None,
            inequalities: None,
            lower: vec![T::neg_infinity(); n],
            upper: vec![T::infinity(); n],
        }
    }

    pub fn dim(&self) -> usize {
        self.linear.len()
    }

    pub fn objective(&self, y: &[T]) -> T {
        let half = scalar::<T>(0.5);
        half * self.quadratic.quadratic_form(y) + dot(&self.linear, y) + self.constant
    }

    /// Adds `weight * ||A y - d||²`.
    pub fn add_least_squares(&mut self, weight: T, a: &DenseMatrix<T>, d: &[T]) {
        let two = scalar::<T>(2.0);
        self.quadratic.add_scaled(two * weight, &a.gram());
        let atd = a.mul_transpose_vec(d);
        for (qi, v) in self.linear.iter_mut().zip(atd) {
            *qi -= two * weight * v;
        }
        self.constant += weight * dot(d, d);
    }

    pub fn push_inequalities(&mut self, matrix: DenseMatrix<T>, rhs: Vec<T>) {
        assert_eq!(matrix.ncols, self.dim(), "inequality column mismatch");
        assert_eq!(matrix.nrows, rhs.len(), "inequality row mismatch");
        if rhs.is_empty() {
            return;
        }
        self.inequalities = Some(match self.inequalities.take() {
            Some(existing) => {
                let mut stacked_rhs = existing.rhs;
                stacked_rhs.extend(rhs);
                LinearRows {
                    matrix: existing.matrix.vstack(&matrix),
                    rhs: stacked_rhs,
                }
            }
            None => LinearRows { matrix, rhs },
        });
    }

    pub fn push_equalities(&mut self, matrix: DenseMatrix<T>, rhs: Vec<T>) {
        assert_eq!(matrix.ncols, self.dim(), "equality column mismatch");
        assert_eq!(matrix.nrows, rhs.len(), "equality row mismatch");
        if rhs.is_empty() {
            return;
        }
        self.equalities = Some(match self.equalities.take() {
            Some(existing) => {
                let mut stacked_rhs = existing.rhs;
                stacked_rhs.extend(rhs);
                LinearRows {
                    matrix: existing.matrix.vstack(&matrix),
                    rhs: stacked_rhs,
                }
            }
            None => LinearRows { matrix, rhs },
        });
    }

    pub fn max_violation(&self, y: &[T]) -> T {
        let mut worst = box_violation(y, &self.lower, &self.upper);
        if let Some(eq) = &self.equalities {
            for (lhs, rhs) in eq.matrix.mul_vec(y).iter().zip(eq.rhs.iter()) {
                worst = worst.max((*lhs - *rhs).abs());
            }
        }
        if let Some(ineq) = &self.inequalities {
            for (lhs, rhs) in ineq.matrix.mul_vec(y).iter().zip(ineq.rhs.iter()) {
                worst = worst.max(positive_part(*lhs - *rhs));
            }
        }
        worst
    }

    pub fn validate(&self) -> Result<(), String> {
        let n = self.dim();
        if self.quadratic.nrows != n || self.quadratic.ncols != n {
            return Err(format!("quadratic term is not {n}x{n}"));
        }
        if self.lower.len() != n || self.upper.len() != n {
            return Err("box dimension mismatch".into());
        }
        for rows in [&self.equalities, &self.inequalities].into_iter().flatten() {
            if rows.matrix.ncols != n || rows.matrix.nrows != rows.rhs.len() {
                return Err("constraint rows dimension mismatch".into());
            }
        }
        Ok(())
    }
}
