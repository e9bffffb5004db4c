use crate::error::AdmmError;
use crate::state::AdmmState;
use qadmm_core::math::{is_binary, positive_part, scalar, RealNumber};
use qadmm_core::matrix::DenseMatrix;
use qadmm_core::options::SweepOrder;
use qadmm_core::problem::ProblemModel;
use qadmm_core::stats::SolveStats;
use qadmm_core::subproblem::{ConvexProblem, QuboProblem};
use qadmm_core::traits::{ConvexOracle, OracleError, QuboOracle};
use tracing::{trace, warn};

/// Dense per-block view of a [`ProblemModel`], built once per solve.
#[derive(Debug, Clone)]
pub struct Blocks<T: RealNumber> {
    pub n: usize,
    pub l: usize,
    pub q_xx: DenseMatrix<T>,
    pub q_xu: DenseMatrix<T>,
    pub q_uu: DenseMatrix<T>,
    pub a_x: Vec<T>,
    pub a_u: Vec<T>,
    pub g: DenseMatrix<T>,
    pub b: Vec<T>,
    pub a1: DenseMatrix<T>,
    pub b1: Vec<T>,
    pub a2: DenseMatrix<T>,
    pub a3: DenseMatrix<T>,
    pub b2: Vec<T>,
    pub a4: DenseMatrix<T>,
    pub b4: Vec<T>,
    pub lower: Vec<T>,
    pub upper: Vec<T>,
}

impl<T> Blocks<T>
where
    T: RealNumber,
{
    pub fn new(model: &ProblemModel<T>) -> Self {
        let n = model.num_binary;
        let l = model.num_continuous;
        let q = model.quadratic.to_dense();
        let (g, b) = match &model.equalities {
            Some(eq) => (eq.matrix.to_dense(), eq.rhs.clone()),
            None => (DenseMatrix::zeros(0, n), Vec::new()),
        };
        let (a1, b1) = match &model.binary_inequalities {
            Some(ineq) => (ineq.matrix.to_dense(), ineq.rhs.clone()),
            None => (DenseMatrix::zeros(0, n), Vec::new()),
        };
        let (a2, a3, b2) = match &model.coupling {
            Some(c) => (
                c.binary_matrix.to_dense(),
                c.continuous_matrix.to_dense(),
                c.rhs.clone(),
            ),
            None => (DenseMatrix::zeros(0, n), DenseMatrix::zeros(0, l), Vec::new()),
        };
        let (a4, b4) = match &model.continuous_inequalities {
            Some(ineq) => (ineq.matrix.to_dense(), ineq.rhs.clone()),
            None => (DenseMatrix::zeros(0, l), Vec::new()),
        };
        let bounds = model.bounds();
        Self {
            n,
            l,
            q_xx: q.block(0..n, 0..n),
            q_xu: q.block(0..n, n..n + l),
            q_uu: q.block(n..n + l, n..n + l),
            a_x: model.linear[..n].to_vec(),
            a_u: model.linear[n..].to_vec(),
            g,
            b,
            a1,
            b1,
            a2,
            a3,
            b2,
            a4,
            b4,
            lower: bounds.lower,
            upper: bounds.upper,
        }
    }

    pub fn m_eq(&self) -> usize {
        self.b.len()
    }

    pub fn m1(&self) -> usize {
        self.b1.len()
    }

    pub fn m2(&self) -> usize {
        self.b2.len()
    }
}

/// Penalty weights in effect for one sweep.
#[derive(Debug, Clone, Copy)]
pub struct Penalties<T> {
    pub rho: T,
    pub beta: T,
    pub factor_c: T,
}

/// Output of one sweep over the primal blocks.
#[derive(Debug, Clone)]
pub struct BlockUpdate<T> {
    pub x: Vec<T>,
    pub z: Vec<T>,
    pub u: Vec<T>,
    pub s: Vec<T>,
    /// A convex block reported no feasible point; `z`/`u` kept their previous values.
    pub infeasible: bool,
}

/// Splits the model into QUBO, continuous and slack blocks for the current
/// state and drives the oracles over them.
#[derive(Debug, Clone)]
pub struct Decomposer<T: RealNumber> {
    blocks: Blocks<T>,
}

impl<T> Decomposer<T>
where
    T: RealNumber,
{
    pub fn new(model: &ProblemModel<T>) -> Self {
        Self {
            blocks: Blocks::new(model),
        }
    }

    pub fn blocks(&self) -> &Blocks<T> {
        &self.blocks
    }

    /// Binary block: original binary objective plus every penalty, folded into
    /// a single QUBO.
    ///
    /// Besides the quadratic penalty `factor_c‖Gx − b‖²`, the energy carries the
    /// linear multiplier term `λᵀ(Gx − b)` of the augmented Lagrangian.
    pub fn qubo(&self, state: &AdmmState<T>, penalties: Penalties<T>) -> QuboProblem<T> {
        let bl = &self.blocks;
        let half = scalar::<T>(0.5);
        let mut qubo = QuboProblem::zeros(bl.n);
        qubo.quadratic.add_scaled(half, &bl.q_xx);
        let cross = bl.q_xu.mul_vec(&state.u);
        for (qi, (ai, ci)) in qubo.linear.iter_mut().zip(bl.a_x.iter().zip(cross)) {
            *qi += *ai + ci;
        }

        if bl.m_eq() > 0 {
            // λᵀ(Gx - b) + c‖Gx - b‖²
            let g_lambda = bl.g.mul_transpose_vec(&state.lambda);
            for (qi, v) in qubo.linear.iter_mut().zip(g_lambda) {
                *qi += v;
            }
            qubo.constant -= state
                .lambda
                .iter()
                .zip(bl.b.iter())
                .fold(T::zero(), |acc, (l, b)| acc + (*l) * (*b));
            qubo.add_least_squares(penalties.factor_c, &bl.g, &bl.b);
        }

        // ρ/2‖x - z + μ/ρ‖²
        let target: Vec<T> = state
            .z
            .iter()
            .zip(state.mu.iter())
            .map(|(z, mu)| *z - *mu / penalties.rho)
            .collect();
        qubo.add_proximal(half * penalties.rho, &target);

        if bl.m1() > 0 {
            // β/2‖A1x - b1 + s + ν/β‖²
            let target: Vec<T> = bl
                .b1
                .iter()
                .zip(state.s.iter().zip(state.nu.iter()))
                .map(|(b1, (s, nu))| *b1 - *s - *nu / penalties.beta)
                .collect();
            qubo.add_least_squares(half * penalties.beta, &bl.a1, &target);
        }

        qubo.fold_diagonal();
        qubo
    }

    /// Continuous copy of the binaries: `ρ/2‖x - z + μ/ρ‖²` over `0 <= z <= 1`
    /// with the coupling rows relaxed onto `z` at the current `u`.
    pub fn z_block(&self, x: &[T], mu: &[T], u: &[T], rho: T) -> ConvexProblem<T> {
        let bl = &self.blocks;
        let mut problem = ConvexProblem::unconstrained(bl.n);
        let target: Vec<T> = x.iter().zip(mu.iter()).map(|(x, mu)| *x + *mu / rho).collect();
        let half = scalar::<T>(0.5);
        problem.add_least_squares(half * rho, &DenseMatrix::identity(bl.n), &target);
        problem.lower = vec![T::zero(); bl.n];
        problem.upper = vec![T::one(); bl.n];
        if bl.m2() > 0 {
            let rhs: Vec<T> = bl
                .b2
                .iter()
                .zip(bl.a3.mul_vec(u))
                .map(|(b2, a3u)| *b2 - a3u)
                .collect();
            problem.push_inequalities(bl.a2.clone(), rhs);
        }
        problem
    }

    /// Continuous variables with the binaries fixed at `x`.
    pub fn u_block(&self, x: &[T]) -> ConvexProblem<T> {
        let bl = &self.blocks;
        let mut problem = ConvexProblem::unconstrained(bl.l);
        problem.quadratic = bl.q_uu.clone();
        let cross = bl.q_xu.mul_transpose_vec(x);
        problem.linear = bl.a_u.iter().zip(cross).map(|(a, c)| *a + c).collect();
        problem.lower.clone_from(&bl.lower);
        problem.upper.clone_from(&bl.upper);
        if !bl.b4.is_empty() {
            problem.push_inequalities(bl.a4.clone(), bl.b4.clone());
        }
        if bl.m2() > 0 {
            let rhs: Vec<T> = bl
                .b2
                .iter()
                .zip(bl.a2.mul_vec(x))
                .map(|(b2, a2x)| *b2 - a2x)
                .collect();
            problem.push_inequalities(bl.a3.clone(), rhs);
        }
        problem
    }

    /// Two-block variant: `z` and `u` in one convex solve sharing the coupling rows.
    pub fn joint_block(&self, x: &[T], mu: &[T], rho: T) -> ConvexProblem<T> {
        let bl = &self.blocks;
        let dim = bl.n + bl.l;
        let z_part = self.z_block(x, mu, &vec![T::zero(); bl.l], rho);
        let u_part = self.u_block(x);
        let mut problem = ConvexProblem::unconstrained(dim);
        for i in 0..bl.n {
            for j in 0..bl.n {
                problem.quadratic.set(i, j, z_part.quadratic.get(i, j));
            }
        }
        for i in 0..bl.l {
            for j in 0..bl.l {
                problem.quadratic.set(bl.n + i, bl.n + j, u_part.quadratic.get(i, j));
            }
        }
        problem.linear = z_part.linear.iter().chain(u_part.linear.iter()).copied().collect();
        problem.constant = z_part.constant + u_part.constant;
        problem.lower = z_part.lower.iter().chain(u_part.lower.iter()).copied().collect();
        problem.upper = z_part.upper.iter().chain(u_part.upper.iter()).copied().collect();
        if bl.m2() > 0 {
            problem.push_inequalities(bl.a2.hstack(&bl.a3), bl.b2.clone());
        }
        if !bl.b4.is_empty() {
            problem.push_inequalities(DenseMatrix::zeros(bl.b4.len(), bl.n).hstack(&bl.a4), bl.b4.clone());
        }
        problem
    }

    /// Continuous relaxation of the whole model, `0 <= x <= 1`.
    pub fn relaxation(&self, model: &ProblemModel<T>) -> ConvexProblem<T> {
        let bl = &self.blocks;
        let dim = bl.n + bl.l;
        let mut problem = ConvexProblem::unconstrained(dim);
        problem.quadratic = model.quadratic.to_dense();
        problem.linear = model.linear.clone();
        problem.constant = model.constant;
        problem.lower = vec![T::zero(); bl.n].into_iter().chain(bl.lower.iter().copied()).collect();
        problem.upper = vec![T::one(); bl.n].into_iter().chain(bl.upper.iter().copied()).collect();
        if bl.m_eq() > 0 {
            problem.push_equalities(bl.g.hstack(&DenseMatrix::zeros(bl.m_eq(), bl.l)), bl.b.clone());
        }
        if bl.m1() > 0 {
            problem.push_inequalities(bl.a1.hstack(&DenseMatrix::zeros(bl.m1(), bl.l)), bl.b1.clone());
        }
        if bl.m2() > 0 {
            problem.push_inequalities(bl.a2.hstack(&bl.a3), bl.b2.clone());
        }
        if !bl.b4.is_empty() {
            problem.push_inequalities(DenseMatrix::zeros(bl.b4.len(), bl.n).hstack(&bl.a4), bl.b4.clone());
        }
        problem
    }

    /// Projection of the slack onto the non-negative orthant.
    pub fn slack(&self, x: &[T], nu: &[T], beta: T) -> Vec<T> {
        let bl = &self.blocks;
        bl.a1
            .mul_vec(x)
            .iter()
            .zip(bl.b1.iter().zip(nu.iter()))
            .map(|(a1x, (b1, nu))| positive_part(-(*a1x - *b1 + *nu / beta)))
            .collect()
    }

    pub fn solve_qubo<Q>(&self, oracle: &Q, problem: &QuboProblem<T>) -> Result<Vec<T>, AdmmError>
    where
        Q: QuboOracle<T> + ?Sized,
    {
        let n = self.blocks.n;
        let x = oracle
            .solve(problem)
            .map_err(|err| AdmmError::oracle(oracle.name(), err.to_string()))?;
        if x.len() != n {
            return Err(AdmmError::oracle(
                oracle.name(),
                format!("returned {} values for {n} binary variables", x.len()),
            ));
        }
        if let Some(idx) = x.iter().position(|v| !is_binary(*v)) {
            return Err(AdmmError::oracle(
                oracle.name(),
                format!("entry {idx} of the assignment is not 0 or 1"),
            ));
        }
        Ok(x)
    }

    /// Convex solve where infeasibility is a soft outcome (`Ok(None)`).
    pub fn solve_convex<C>(
        &self,
        oracle: &C,
        problem: &ConvexProblem<T>,
    ) -> Result<Option<Vec<T>>, AdmmError>
    where
        C: ConvexOracle<T> + ?Sized,
    {
        match oracle.solve(problem) {
            Ok(y) if y.len() == problem.dim() => Ok(Some(y)),
            Ok(y) => Err(AdmmError::oracle(
                oracle.name(),
                format!("returned {} values for {} variables", y.len(), problem.dim()),
            )),
            Err(OracleError::Infeasible(reason)) => {
                warn!(oracle = oracle.name(), %reason, "continuous subproblem infeasible");
                Ok(None)
            }
            Err(err) => Err(AdmmError::oracle(oracle.name(), err.to_string())),
        }
    }

    /// One sweep: binary block, continuous block(s), slack.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep<Q, C>(
        &self,
        state: &AdmmState<T>,
        penalties: Penalties<T>,
        three_block: bool,
        order: SweepOrder,
        qubo: &Q,
        convex: &C,
        stats: &mut SolveStats<T>,
    ) -> Result<BlockUpdate<T>, AdmmError>
    where
        Q: QuboOracle<T> + ?Sized,
        C: ConvexOracle<T> + ?Sized,
    {
        let bl = &self.blocks;
        let x = if bl.n > 0 {
            stats.qubo_calls += 1;
            self.solve_qubo(qubo, &self.qubo(state, penalties))?
        } else {
            Vec::new()
        };
        let x_ref = match order {
            SweepOrder::GaussSeidel => &x,
            SweepOrder::Jacobi => &state.x,
        };

        let mut z = state.z.clone();
        let mut u = state.u.clone();
        let mut infeasible = false;
        if three_block {
            if bl.n > 0 {
                stats.convex_calls += 1;
                match self.solve_convex(convex, &self.z_block(x_ref, &state.mu, &state.u, penalties.rho))? {
                    Some(next) => z = next,
                    None => infeasible = true,
                }
            }
            if bl.l > 0 {
                stats.convex_calls += 1;
                match self.solve_convex(convex, &self.u_block(x_ref))? {
                    Some(next) => u = next,
                    None => infeasible = true,
                }
            }
        } else if bl.n + bl.l > 0 {
            stats.convex_calls += 1;
            match self.solve_convex(convex, &self.joint_block(x_ref, &state.mu, penalties.rho))? {
                Some(next) => {
                    z = next[..bl.n].to_vec();
                    u = next[bl.n..].to_vec();
                }
                None => infeasible = true,
            }
        }
        if infeasible {
            stats.infeasible_subproblems += 1;
        }

        let s = self.slack(x_ref, &state.nu, penalties.beta);
        trace!(infeasible, "sweep finished");
        Ok(BlockUpdate {
            x,
            z,
            u,
            s,
            infeasible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use qadmm_core::math::dot;
    use qadmm_core::problem::{CscMatrix, CouplingConstraints, EqualityConstraints, InequalityConstraints};

    fn model() -> ProblemModel<f64> {
        ProblemModel {
            num_binary: 3,
            num_continuous: 1,
            quadratic: CscMatrix::from_triplets(
                4,
                4,
                &[(0, 1, 0.5), (1, 0, 0.5), (0, 3, 1.0), (3, 0, 1.0), (3, 3, 10.0)],
            ),
            linear: vec![1.0, -1.0, 1.0, -20.0],
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

    fn state() -> AdmmState<f64> {
        let mut state = AdmmState::zeros(3, 1, 1, 1, 2.0, 3.0);
        state.z = vec![0.25, 0.5, 1.0];
        state.u = vec![1.5];
        state.s = vec![0.5];
        state.lambda = vec![0.7];
        state.mu = vec![-0.3, 0.2, 0.1];
        state.nu = vec![0.4];
        state
    }

    #[test]
    fn qubo_energy_equals_augmented_lagrangian() {
        let model = model();
        let decomposer = Decomposer::new(&model);
        let bl = decomposer.blocks();
        let state = state();
        let penalties = Penalties {
            rho: state.rho,
            beta: state.beta,
            factor_c: 5.0,
        };
        let qubo = decomposer.qubo(&state, penalties);
        for i in 0..3 {
            assert_eq!(qubo.quadratic.get(i, i), 0.0);
        }
        for mask in 0..8u32 {
            let x: Vec<f64> = (0..3).map(|i| ((mask >> i) & 1) as f64).collect();
            let objective_x = 0.5 * bl.q_xx.quadratic_form(&x)
                + dot(&bl.a_x, &x)
                + dot(&bl.q_xu.mul_vec(&state.u), &x);
            let eq: Vec<f64> = bl.g.mul_vec(&x).iter().zip(&bl.b).map(|(a, b)| a - b).collect();
            let coupling: f64 = x
                .iter()
                .zip(state.z.iter().zip(&state.mu))
                .map(|(x, (z, mu))| (x - z + mu / state.rho).powi(2))
                .sum();
            let slack: f64 = bl
                .a1
                .mul_vec(&x)
                .iter()
                .zip(bl.b1.iter().zip(state.s.iter().zip(&state.nu)))
                .map(|(a, (b, (s, nu)))| (a - b + s + nu / state.beta).powi(2))
                .sum();
            let expected = objective_x
                + dot(&state.lambda, &eq)
                + 5.0 * dot(&eq, &eq)
                + state.rho / 2.0 * coupling
                + state.beta / 2.0 * slack;
            assert_abs_diff_eq!(qubo.energy(&x), expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn slack_is_projected() {
        let decomposer = Decomposer::new(&model());
        // A1 x - b1 = -2 + 1 = -1 ; with nu = 0.4, beta = 2 -> s = 1 - 0.2
        let s = decomposer.slack(&[1.0, 1.0, 0.0], &[0.4], 2.0);
        assert_abs_diff_eq!(s[0], 0.8, epsilon = 1e-12);
        let s = decomposer.slack(&[0.0, 0.0, 0.0], &[0.0], 2.0);
        assert_eq!(s, vec![0.0]);
    }

    #[test]
    fn continuous_blocks_carry_coupling_rows() {
        let decomposer = Decomposer::new(&model());
        let u_block = decomposer.u_block(&[1.0, 0.0, 0.0]);
        let rows = u_block.inequalities.as_ref().unwrap();
        assert_eq!(rows.rhs, vec![2.0]);
        assert_eq!(u_block.lower, vec![0.0]);
        // cross term Q_xu x shifts the linear coefficient
        assert_abs_diff_eq!(u_block.linear[0], -19.0);

        let z_block = decomposer.z_block(&[1.0, 0.0, 0.0], &[0.0; 3], &[2.0], 4.0);
        assert_eq!(z_block.inequalities.as_ref().unwrap().rhs, vec![1.0]);
        assert_eq!(z_block.upper, vec![1.0; 3]);

        let joint = decomposer.joint_block(&[1.0, 0.0, 0.0], &[0.0; 3], 4.0);
        assert_eq!(joint.dim(), 4);
        assert_eq!(joint.inequalities.as_ref().unwrap().matrix.row(0), &[1.0, 2.0, 1.0, 1.0]);
        // proximal part vanishes at its target; 5u² - 19u at u = 2
        assert_abs_diff_eq!(joint.objective(&[1.0, 0.0, 0.0, 2.0]), -18.0, epsilon = 1e-9);
    }
}
