use qadmm_core::math::{scalar, RealNumber};
use qadmm_core::subproblem::QuboProblem;
use qadmm_core::traits::{OracleError, QuboOracle};
use tracing::trace;

/// Exact QUBO backend enumerating all `2ⁿ` assignments in Gray-code order.
///
/// Each step flips one bit, so the energy is updated in `O(n)` from the local
/// fields. Ties are resolved in favour of the assignment met first.
#[derive(Debug, Clone)]
pub struct ExhaustiveQubo {
    pub max_variables: usize,
}

impl Default for ExhaustiveQubo {
    fn default() -> Self {
        Self { max_variables: 24 }
    }
}

impl ExhaustiveQubo {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Energy change when bit `i` moves by `delta` (+1 or -1), given the field
/// `h_i = Σ_{j≠i} P_ij x_j`.
#[inline]
pub(crate) fn flip_delta<T: RealNumber>(problem: &QuboProblem<T>, field: &[T], i: usize, delta: T) -> T {
    let two = scalar::<T>(2.0);
    delta * (problem.linear[i] + problem.quadratic.get(i, i) + two * field[i])
}

#[inline]
pub(crate) fn apply_flip<T: RealNumber>(problem: &QuboProblem<T>, field: &mut [T], i: usize, delta: T) {
    for (j, h) in field.iter_mut().enumerate() {
        if j != i {
            *h += delta * problem.quadratic.get(j, i);
        }
    }
}

impl<T: RealNumber> QuboOracle<T> for ExhaustiveQubo {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn solve(&self, problem: &QuboProblem<T>) -> Result<Vec<T>, OracleError> {
        let n = problem.dim();
        if problem.quadratic.nrows != n || problem.quadratic.ncols != n {
            return Err(OracleError::Solver(format!(
                "QUBO matrix is {}x{} for {n} variables",
                problem.quadratic.nrows, problem.quadratic.ncols
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        if n > self.max_variables {
            return Err(OracleError::Solver(format!(
                "{n} variables exceed the exhaustive limit of {}",
                self.max_variables
            )));
        }

        let tie = scalar::<T>(1e-10);
        let mut x = vec![T::zero(); n];
        let mut field = vec![T::zero(); n];
        let mut energy = problem.constant;
        let mut best = x.clone();
        let mut best_energy = energy;
        for step in 1u64..(1u64 << n) {
            let i = step.trailing_zeros() as usize;
            let delta = if x[i] == T::zero() { T::one() } else { -T::one() };
            energy += flip_delta(problem, &field, i, delta);
            apply_flip(problem, &mut field, i, delta);
            x[i] = x[i] + delta;
            if energy < best_energy - tie * (T::one() + best_energy.abs()) {
                best_energy = energy;
                best.clone_from(&x);
            }
        }
        trace!(n, energy = ?best_energy.to_f64(), "exhaustive QUBO solved");
        Ok(best)
    }
}
