use anyhow::Result;
use num_traits::FromPrimitive;
use qadmm_core::math::{norm_inf, project_box, scalar, RealNumber};
use qadmm_core::matrix::DenseMatrix;
use qadmm_core::subproblem::ConvexProblem;
use qadmm_core::traits::{ConvexOracle, KktSolver, OracleError};
use qadmm_linsys::dense::{DenseKktMatrix, DenseKktSolver, DensePattern};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmmQpSettings<T> {
    pub rho: T,
    pub sigma: T,
    pub tolerance: T,
    pub feasibility_tolerance: T,
    pub max_iterations: usize,
    pub adaptive_rho: bool,
}

impl<T> Default for AdmmQpSettings<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            rho: scalar(1.0),
            sigma: scalar(1e-6),
            tolerance: scalar(1e-8),
            feasibility_tolerance: scalar(1e-5),
            max_iterations: 20_000,
            adaptive_rho: true,
        }
    }
}

const RHO_UPDATE_INTERVAL: usize = 25;

/// Constraint rows stacked as `lower <= A y <= upper`.
struct QpWorkspace<T: RealNumber> {
    a: DenseMatrix<T>,
    lower: Vec<T>,
    upper: Vec<T>,
}

impl<T> QpWorkspace<T>
where
    T: RealNumber,
{
    fn new(problem: &ConvexProblem<T>) -> Self {
        let n = problem.dim();
        let mut a = DenseMatrix::zeros(0, n);
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        if let Some(eq) = &problem.equalities {
            a = a.vstack(&eq.matrix);
            lower.extend_from_slice(&eq.rhs);
            upper.extend_from_slice(&eq.rhs);
        }
        if let Some(ineq) = &problem.inequalities {
            a = a.vstack(&ineq.matrix);
            lower.extend(std::iter::repeat(T::neg_infinity()).take(ineq.len()));
            upper.extend_from_slice(&ineq.rhs);
        }
        let boxed: Vec<usize> = (0..n)
            .filter(|&i| problem.lower[i].is_finite() || problem.upper[i].is_finite())
            .collect();
        let mut rows = DenseMatrix::zeros(boxed.len(), n);
        for (row, &var) in boxed.iter().enumerate() {
            rows.set(row, var, T::one());
            lower.push(problem.lower[var]);
            upper.push(problem.upper[var]);
        }
        a = a.vstack(&rows);
        Self { a, lower, upper }
    }

    fn m(&self) -> usize {
        self.a.nrows
    }
}

/// `P + σI + ρAᵀA`, refactored only when `ρ` moves.
struct LinearSystem<T: RealNumber> {
    base: DenseMatrix<T>,
    ata: DenseMatrix<T>,
    solver: DenseKktSolver<T>,
    current_rho: Option<T>,
}

impl<T> LinearSystem<T>
where
    T: RealNumber + FromPrimitive,
{
    fn new(base: DenseMatrix<T>, ata: DenseMatrix<T>) -> Result<Self> {
        let mut solver = DenseKktSolver::new();
        solver.analyze_pattern(&DensePattern::new(base.nrows))?;
        Ok(Self {
            base,
            ata,
            solver,
            current_rho: None,
        })
    }

    fn factor(&mut self, rho: T) -> Result<()> {
        if self
            .current_rho
            .map(|prev| (prev - rho).abs() <= scalar::<T>(1e-12) * (T::one() + rho.abs()))
            .unwrap_or(false)
        {
            return Ok(());
        }
        let mut matrix = self.base.clone();
        matrix.add_scaled(rho, &self.ata);
        self.solver.factor(&DenseKktMatrix::from_dense(&matrix))?;
        self.current_rho = Some(rho);
        Ok(())
    }

    fn solve(&self, rhs: &mut [T]) -> Result<()> {
        self.solver.solve(rhs)
    }
}

/// Result of one operator-splitting QP solve.
#[derive(Debug, Clone)]
pub struct QpOutcome<T> {
    pub primal: Vec<T>,
    pub dual: Vec<T>,
    pub iterations: usize,
    pub converged: bool,
    pub max_violation: T,
}

/// Operator-splitting convex QP backend for larger continuous blocks.
#[derive(Debug, Clone)]
pub struct AdmmQp<T> {
    settings: AdmmQpSettings<T>,
}

impl<T> Default for AdmmQp<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            settings: AdmmQpSettings::default(),
        }
    }
}

impl<T> AdmmQp<T>
where
    T: RealNumber + FromPrimitive,
{
    pub fn new(settings: AdmmQpSettings<T>) -> Self {
        Self { settings }
    }

    pub fn solve_detailed(&self, problem: &ConvexProblem<T>) -> Result<QpOutcome<T>, OracleError> {
        problem.validate().map_err(OracleError::Solver)?;
        let n = problem.dim();
        let workspace = QpWorkspace::new(problem);
        let m = workspace.m();
        let mut base = problem.quadratic.clone();
        base.add_diagonal(self.settings.sigma);
        let mut lin_sys = LinearSystem::new(base, workspace.a.gram())
            .map_err(|err| OracleError::Solver(err.to_string()))?;

        let mut x = vec![T::zero(); n];
        let mut z = workspace.a.mul_vec(&x);
        project_box(&mut z, &workspace.lower, &workspace.upper);
        let mut y = vec![T::zero(); m];
        let mut rho = self.settings.rho;
        let tol = self.settings.tolerance;
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..self.settings.max_iterations {
            iterations = iter + 1;
            lin_sys
                .factor(rho)
                .map_err(|err| OracleError::Solver(err.to_string()))?;

            let shifted: Vec<T> = z.iter().zip(y.iter()).map(|(zi, yi)| rho * (*zi) - *yi).collect();
            let mut rhs = workspace.a.mul_transpose_vec(&shifted);
            for i in 0..n {
                rhs[i] += self.settings.sigma * x[i] - problem.linear[i];
            }
            lin_sys
                .solve(&mut rhs)
                .map_err(|err| OracleError::Solver(err.to_string()))?;
            x.copy_from_slice(&rhs);

            let ax = workspace.a.mul_vec(&x);
            let z_old = z.clone();
            for i in 0..m {
                z[i] = ax[i] + y[i] / rho;
            }
            project_box(&mut z, &workspace.lower, &workspace.upper);
            for i in 0..m {
                y[i] += rho * (ax[i] - z[i]);
            }

            let primal: Vec<T> = ax.iter().zip(z.iter()).map(|(a, b)| *a - *b).collect();
            let delta: Vec<T> = z_old.iter().zip(z.iter()).map(|(a, b)| rho * (*a - *b)).collect();
            let pr_norm = norm_inf(&primal);
            let du_norm = norm_inf(&workspace.a.mul_transpose_vec(&delta));
            trace!(iter, pr_norm = ?pr_norm.to_f64(), du_norm = ?du_norm.to_f64(), "qp iteration");

            if pr_norm <= tol && du_norm <= tol {
                converged = true;
                break;
            }

            if self.settings.adaptive_rho && iterations % RHO_UPDATE_INTERVAL == 0 {
                let ten = scalar::<T>(10.0);
                let two = scalar::<T>(2.0);
                if pr_norm > ten * du_norm {
                    rho *= two;
                } else if du_norm > ten * pr_norm {
                    rho = rho / two;
                }
            }
        }

        project_box(&mut x, &problem.lower, &problem.upper);
        let max_violation = problem.max_violation(&x);
        debug!(iterations, converged, violation = ?max_violation.to_f64(), "qp solve finished");
        Ok(QpOutcome {
            primal: x,
            dual: y,
            iterations,
            converged,
            max_violation,
        })
    }
}

impl<T> ConvexOracle<T> for AdmmQp<T>
where
    T: RealNumber + FromPrimitive,
{
    fn name(&self) -> &'static str {
        "admm-qp"
    }

    fn solve(&self, problem: &ConvexProblem<T>) -> Result<Vec<T>, OracleError> {
        if problem.dim() == 0 {
            return Ok(Vec::new());
        }
        let outcome = self.solve_detailed(problem)?;
        if outcome.max_violation > self.settings.feasibility_tolerance {
            return Err(OracleError::Infeasible(format!(
                "no feasible point after {} iterations (violation {:.3e})",
                outcome.iterations,
                outcome.max_violation.to_f64().unwrap_or(f64::NAN)
            )));
        }
        Ok(outcome.primal)
    }
}
