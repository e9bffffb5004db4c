use num_traits::FromPrimitive;
use qadmm_core::math::{dot, norm_inf, project_box, scalar, RealNumber};
use qadmm_core::subproblem::ConvexProblem;
use qadmm_core::traits::{ConvexOracle, KktSolver, OracleError};
use qadmm_linsys::dense::DenseKktMatrix;
use qadmm_linsys::lu::DenseLuSolver;
use tracing::trace;

/// Exact dense QP backend using a primal working-set method.
///
/// General rows and box sides share one working set, so the cost grows with
/// the number of working-set changes rather than with the number of rows.
/// A single elastic variable `t >= 0` relaxes every general and equality row,
/// which gives a feasible start and detects infeasibility: if `t` stays
/// positive after the penalty on it has been escalated, the problem is
/// reported infeasible. A small proximal term keeps every KKT system
/// nonsingular when the objective is only semidefinite. The result is then
/// polished by solving the KKT system of the rows that are active at the
/// proximal point.
#[derive(Debug, Clone)]
pub struct ActiveSetQp<T> {
    pub max_iterations: usize,
    pub max_proximal_steps: usize,
    pub proximal_weight: T,
    pub feasibility_tolerance: T,
    pub dual_tolerance: T,
}

impl<T> Default for ActiveSetQp<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            max_proximal_steps: 200,
            proximal_weight: scalar(1e-6),
            feasibility_tolerance: scalar(1e-9),
            dual_tolerance: scalar(1e-9),
        }
    }
}

const PENALTY_ESCALATIONS: usize = 5;

struct Row<T> {
    coefficients: Vec<T>,
    rhs: T,
}

impl<T> Row<T>
where
    T: RealNumber,
{
    fn slack(&self, point: &[T]) -> T {
        self.rhs - dot(&self.coefficients, point)
    }
}

/// Solves `[H Aᵀ; A 0] [p; λ] = [-g; 0]` for the rows in `working`.
fn equality_step<T: RealNumber>(
    hessian: &[T],
    dim: usize,
    rows: &[Row<T>],
    working: &[usize],
    gradient: &[T],
) -> Option<(Vec<T>, Vec<T>)> {
    let size = dim + working.len();
    let mut data = vec![T::zero(); size * size];
    let mut rhs = vec![T::zero(); size];
    for i in 0..dim {
        data[i * size..i * size + dim].copy_from_slice(&hessian[i * dim..(i + 1) * dim]);
        rhs[i] = -gradient[i];
    }
    for (offset, &idx) in working.iter().enumerate() {
        let r = dim + offset;
        for (j, &c) in rows[idx].coefficients.iter().enumerate() {
            data[r * size + j] = c;
            data[j * size + r] = c;
        }
    }
    let mut solver = DenseLuSolver::new();
    solver.factor(&DenseKktMatrix::new(size, data)).ok()?;
    solver.solve(&mut rhs).ok()?;
    let multipliers = rhs.split_off(dim);
    Some((rhs, multipliers))
}

impl<T> ActiveSetQp<T>
where
    T: RealNumber + FromPrimitive,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn inequality_rows(problem: &ConvexProblem<T>) -> Vec<Row<T>> {
        let n = problem.dim();
        let mut rows = Vec::new();
        if let Some(ineq) = &problem.inequalities {
            for (i, rhs) in ineq.rhs.iter().enumerate() {
                rows.push(Row {
                    coefficients: ineq.matrix.row(i).to_vec(),
                    rhs: *rhs,
                });
            }
        }
        for var in 0..n {
            if problem.upper[var].is_finite() {
                let mut coefficients = vec![T::zero(); n];
                coefficients[var] = T::one();
                rows.push(Row {
                    coefficients,
                    rhs: problem.upper[var],
                });
            }
            if problem.lower[var].is_finite() {
                let mut coefficients = vec![T::zero(); n];
                coefficients[var] = -T::one();
                rows.push(Row {
                    coefficients,
                    rhs: -problem.lower[var],
                });
            }
        }
        rows
    }

    /// Rows over `(y, t)`. General and equality rows are relaxed by `t`; box
    /// sides stay hard; the last row is `t >= 0`.
    fn elastic_rows(problem: &ConvexProblem<T>) -> Vec<Row<T>> {
        let n = problem.dim();
        let widen = |coefficients: &[T], elastic: T| {
            let mut wide = coefficients.to_vec();
            wide.push(elastic);
            wide
        };
        let general = problem.inequalities.as_ref().map_or(0, |rows| rows.len());
        let mut rows = Vec::new();
        for (i, row) in Self::inequality_rows(problem).into_iter().enumerate() {
            let elastic = if i < general { -T::one() } else { T::zero() };
            rows.push(Row {
                coefficients: widen(&row.coefficients, elastic),
                rhs: row.rhs,
            });
        }
        if let Some(eq) = &problem.equalities {
            for (i, rhs) in eq.rhs.iter().enumerate() {
                let coefficients = eq.matrix.row(i);
                let negated: Vec<T> = coefficients.iter().map(|c| -*c).collect();
                rows.push(Row {
                    coefficients: widen(coefficients, -T::one()),
                    rhs: *rhs,
                });
                rows.push(Row {
                    coefficients: widen(&negated, -T::one()),
                    rhs: -*rhs,
                });
            }
        }
        let mut nonnegative = vec![T::zero(); n + 1];
        nonnegative[n] = -T::one();
        rows.push(Row {
            coefficients: nonnegative,
            rhs: T::zero(),
        });
        rows
    }

    /// Minimises `1/2 wᵀHw + cᵀw` from the feasible point `w`, keeping
    /// `working` as the set of rows held at equality.
    fn working_set_solve(
        &self,
        hessian: &[T],
        linear: &[T],
        rows: &[Row<T>],
        w: &mut [T],
        working: &mut Vec<usize>,
    ) -> Result<(), OracleError> {
        let dim = w.len();
        let step_floor = scalar::<T>(1e-13);
        for _ in 0..self.max_iterations {
            let gradient: Vec<T> = (0..dim)
                .map(|i| dot(&hessian[i * dim..(i + 1) * dim], w) + linear[i])
                .collect();
            let (step, multipliers) = equality_step(hessian, dim, rows, working, &gradient)
                .ok_or_else(|| OracleError::Solver("singular working-set system".into()))?;

            if norm_inf(&step) <= step_floor * (T::one() + norm_inf(w)) {
                let floor = -self.dual_tolerance * (T::one() + norm_inf(&gradient));
                let weakest = multipliers
                    .iter()
                    .enumerate()
                    .filter(|(_, lambda)| **lambda < floor)
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
                match weakest {
                    Some((position, _)) => {
                        working.remove(position);
                        continue;
                    }
                    None => return Ok(()),
                }
            }

            let step_norm = norm_inf(&step);
            let mut alpha = T::one();
            let mut blocking = None;
            for (idx, row) in rows.iter().enumerate() {
                if working.contains(&idx) {
                    continue;
                }
                let rate = dot(&row.coefficients, &step);
                if rate <= step_floor * step_norm * (T::one() + norm_inf(&row.coefficients)) {
                    continue;
                }
                let ratio = row.slack(w).max(T::zero()) / rate;
                if ratio < alpha {
                    alpha = ratio;
                    blocking = Some(idx);
                }
            }
            for (wi, pi) in w.iter_mut().zip(step.iter()) {
                *wi += alpha * *pi;
            }
            if let Some(idx) = blocking {
                working.push(idx);
            }
        }
        Err(OracleError::Solver(format!(
            "working set did not settle within {} iterations",
            self.max_iterations
        )))
    }

    /// Solves the KKT system with `active` rows held at equality and returns
    /// the point if it is feasible with non-negative multipliers.
    fn kkt_point(&self, problem: &ConvexProblem<T>, rows: &[Row<T>], active: &[usize]) -> Option<Vec<T>> {
        let n = problem.dim();
        let mut constraint_rows: Vec<Row<T>> = problem
            .equalities
            .iter()
            .flat_map(|eq| {
                (0..eq.len()).map(move |i| Row {
                    coefficients: eq.matrix.row(i).to_vec(),
                    rhs: eq.rhs[i],
                })
            })
            .collect();
        let m_eq = constraint_rows.len();
        constraint_rows.extend(active.iter().map(|&idx| Row {
            coefficients: rows[idx].coefficients.clone(),
            rhs: rows[idx].rhs,
        }));
        let size = n + constraint_rows.len();
        let mut data = vec![T::zero(); size * size];
        let mut rhs = vec![T::zero(); size];
        for i in 0..n {
            for j in 0..n {
                data[i * size + j] = problem.quadratic.get(i, j);
            }
            rhs[i] = -problem.linear[i];
        }
        for (offset, row) in constraint_rows.iter().enumerate() {
            let r = n + offset;
            for (j, &c) in row.coefficients.iter().enumerate() {
                data[r * size + j] = c;
                data[j * size + r] = c;
            }
            rhs[r] = row.rhs;
        }
        let mut solver = DenseLuSolver::new();
        solver.factor(&DenseKktMatrix::new(size, data)).ok()?;
        solver.solve(&mut rhs).ok()?;
        let multipliers = rhs.split_off(n);

        let dual_floor = -self.dual_tolerance
            * (T::one() + problem.linear.iter().fold(T::zero(), |acc, v| acc.max(v.abs())));
        if multipliers[m_eq..].iter().any(|lambda| *lambda < dual_floor) {
            return None;
        }
        let within = |slack: T, rhs: T| slack >= -self.feasibility_tolerance * (T::one() + rhs.abs());
        let feasible = rows.iter().all(|row| within(row.slack(&rhs), row.rhs));
        let equalities_hold = constraint_rows[..m_eq]
            .iter()
            .all(|row| within(row.slack(&rhs), row.rhs) && within(-row.slack(&rhs), row.rhs));
        (feasible && equalities_hold).then_some(rhs)
    }

    fn polish(&self, problem: &ConvexProblem<T>, point: &[T]) -> Vec<T> {
        let rows = Self::inequality_rows(problem);
        let near = scalar::<T>(1e-8);
        let active: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.slack(point) <= near * (T::one() + row.rhs.abs()))
            .map(|(idx, _)| idx)
            .collect();
        match self.kkt_point(problem, &rows, &active) {
            Some(polished) => polished,
            None => {
                trace!(active = active.len(), "polish rejected, keeping proximal point");
                point.to_vec()
            }
        }
    }
}

impl<T> ConvexOracle<T> for ActiveSetQp<T>
where
    T: RealNumber + FromPrimitive,
{
    fn name(&self) -> &'static str {
        "active-set"
    }

    fn solve(&self, problem: &ConvexProblem<T>) -> Result<Vec<T>, OracleError> {
        problem.validate().map_err(OracleError::Solver)?;
        let n = problem.dim();
        if n == 0 {
            return Ok(Vec::new());
        }
        if problem.lower.iter().zip(problem.upper.iter()).any(|(lo, hi)| lo > hi) {
            return Err(OracleError::Infeasible("empty variable box".into()));
        }

        let rows = Self::elastic_rows(problem);
        let dim = n + 1;
        let curvature = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .fold(T::zero(), |acc, (i, j)| acc.max(problem.quadratic.get(i, j).abs()));
        let weight = self.proximal_weight * (T::one() + curvature);
        let mut hessian = vec![T::zero(); dim * dim];
        for i in 0..n {
            for j in 0..n {
                hessian[i * dim + j] = problem.quadratic.get(i, j);
            }
        }
        for i in 0..dim {
            hessian[i * dim + i] += weight;
        }

        let mut w = vec![T::zero(); dim];
        project_box(&mut w[..n], &problem.lower, &problem.upper);
        let violation = rows
            .iter()
            .map(|row| -row.slack(&w))
            .fold(T::zero(), |acc, v| acc.max(v));
        w[n] = violation;

        let mut penalty = scalar::<T>(1e4) * (T::one() + norm_inf(&problem.linear) + curvature);
        let mut working = Vec::new();
        let step_tolerance = scalar::<T>(1e-12);
        for _ in 0..=PENALTY_ESCALATIONS {
            let mut settled = false;
            for _ in 0..self.max_proximal_steps {
                let anchor = w.clone();
                let linear: Vec<T> = problem
                    .linear
                    .iter()
                    .copied()
                    .chain(std::iter::once(penalty))
                    .zip(anchor.iter())
                    .map(|(c, a)| c - weight * *a)
                    .collect();
                self.working_set_solve(&hessian, &linear, &rows, &mut w, &mut working)?;
                if w.iter().any(|v| !v.is_finite()) {
                    return Err(OracleError::Solver("iterate diverged".into()));
                }
                let moved = w
                    .iter()
                    .zip(anchor.iter())
                    .fold(T::zero(), |acc, (a, b)| acc.max((*a - *b).abs()));
                if moved <= step_tolerance * (T::one() + norm_inf(&w)) {
                    settled = true;
                    break;
                }
            }
            if !settled {
                return Err(OracleError::Solver(format!(
                    "proximal iterations did not settle within {} steps, objective may be unbounded",
                    self.max_proximal_steps
                )));
            }
            let scale = rows.iter().fold(T::one(), |acc, row| acc.max(row.rhs.abs()));
            if w[n] <= self.feasibility_tolerance * scale {
                trace!(working = working.len(), "working set settled");
                return Ok(self.polish(problem, &w[..n]));
            }
            penalty *= scalar::<T>(100.0);
        }
        Err(OracleError::Infeasible(format!(
            "constraints stay violated by {:?}",
            w[n].to_f64()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use qadmm_core::matrix::DenseMatrix;

    #[test]
    fn unconstrained_minimum_inside_box() {
        let mut problem = ConvexProblem::unconstrained(1);
        problem.quadratic.set(0, 0, 10.0);
        problem.linear[0] = -20.0;
        problem.lower[0] = 0.0;
        problem.push_inequalities(DenseMatrix::from_rows(1, &[vec![1.0]]), vec![2.0]);
        let u = ActiveSetQp::new().solve(&problem).unwrap();
        assert_abs_diff_eq!(u[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn active_bound_with_sign_check() {
        let mut problem = ConvexProblem::unconstrained(2);
        problem.quadratic = DenseMatrix::identity(2);
        problem.linear = vec![-3.0, 1.0];
        problem.lower = vec![0.0, 0.0];
        problem.upper = vec![1.0, 1.0];
        let y = ActiveSetQp::new().solve(&problem).unwrap();
        assert_abs_diff_eq!(y[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn linear_objective_lands_on_vertex() {
        let mut problem = ConvexProblem::unconstrained(2);
        problem.linear = vec![-1.0, -2.0];
        problem.lower = vec![0.0, 0.0];
        problem.push_inequalities(DenseMatrix::from_rows(2, &[vec![1.0, 1.0]]), vec![4.0]);
        let y = ActiveSetQp::new().solve(&problem).unwrap();
        assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y[1], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn equality_constrained() {
        let mut problem = ConvexProblem::unconstrained(2);
        problem.quadratic = DenseMatrix::identity(2);
        problem.push_equalities(DenseMatrix::from_rows(2, &[vec![1.0, 1.0]]), vec![2.0]);
        let y = ActiveSetQp::new().solve(&problem).unwrap();
        assert_abs_diff_eq!(y[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn reports_infeasibility() {
        let mut problem = ConvexProblem::unconstrained(1);
        problem.quadratic.set(0, 0, 1.0);
        problem.lower[0] = 0.0;
        problem.push_inequalities(DenseMatrix::from_rows(1, &[vec![1.0]]), vec![-1.0]);
        assert!(matches!(
            ActiveSetQp::new().solve(&problem),
            Err(OracleError::Infeasible(_))
        ));
    }

    #[test]
    fn reports_unbounded_objective() {
        let mut problem = ConvexProblem::unconstrained(1);
        problem.linear[0] = -1.0;
        assert!(matches!(
            ActiveSetQp::new().solve(&problem),
            Err(OracleError::Solver(_))
        ));
    }

    #[test]
    fn wide_box_with_coupling_row() {
        // 1/2 ||y - c||² over [0, 1]^30 with sum(y) <= 2
        let n = 30;
        let mut problem = ConvexProblem::unconstrained(n);
        problem.quadratic = DenseMatrix::identity(n);
        problem.linear = (0..n).map(|i| if i < 3 { -1.0 } else { 0.5 }).collect();
        problem.lower = vec![0.0; n];
        problem.upper = vec![1.0; n];
        problem.push_inequalities(DenseMatrix::from_rows(n, &[vec![1.0; n]]), vec![2.0]);
        let y = ActiveSetQp::new().solve(&problem).unwrap();
        for value in &y[..3] {
            assert_abs_diff_eq!(*value, 2.0 / 3.0, epsilon = 1e-9);
        }
        for value in &y[3..] {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-9);
        }
    }
}
