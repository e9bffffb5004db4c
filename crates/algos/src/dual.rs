use crate::decomposer::{Blocks, Penalties};
use crate::state::AdmmState;
use itertools::izip;
use qadmm_core::math::RealNumber;

/// Ascent step on the unscaled multipliers after a sweep.
///
/// * `λ += c (Gx - b)`
/// * `μ += ρ (x - z)`
/// * `ν += β (A1x - b1 + s)`
pub fn update_multipliers<T: RealNumber>(state: &mut AdmmState<T>, blocks: &Blocks<T>, penalties: Penalties<T>) {
    if blocks.m_eq() > 0 {
        let gx = blocks.g.mul_vec(&state.x);
        for (lambda, gx, b) in izip!(state.lambda.iter_mut(), gx, blocks.b.iter()) {
            *lambda += penalties.factor_c * (gx - *b);
        }
    }
    for (mu, x, z) in izip!(state.mu.iter_mut(), state.x.iter(), state.z.iter()) {
        *mu += penalties.rho * (*x - *z);
    }
    if blocks.m1() > 0 {
        let a1x = blocks.a1.mul_vec(&state.x);
        for (nu, a1x, b1, s) in izip!(state.nu.iter_mut(), a1x, blocks.b1.iter(), state.s.iter()) {
            *nu += penalties.beta * (a1x - *b1 + *s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qadmm_core::problem::{CscMatrix, EqualityConstraints, InequalityConstraints, ProblemModel};

    #[test]
    fn multipliers_follow_residuals() {
        let model = ProblemModel::<f64> {
            num_binary: 2,
            num_continuous: 0,
            quadratic: CscMatrix::empty(2, 2),
            linear: vec![0.0; 2],
            constant: 0.0,
            equalities: Some(EqualityConstraints {
                matrix: CscMatrix::from_triplets(1, 2, &[(0, 0, 1.0), (0, 1, 1.0)]),
                rhs: vec![1.0],
            }),
            binary_inequalities: Some(InequalityConstraints {
                matrix: CscMatrix::from_triplets(1, 2, &[(0, 0, 1.0)]),
                rhs: vec![0.5],
            }),
            coupling: None,
            continuous_inequalities: None,
            continuous_bounds: None,
        };
        let blocks = Blocks::new(&model);
        let mut state = AdmmState::zeros(2, 0, 1, 1, 2.0, 3.0);
        state.x = vec![1.0, 1.0];
        state.z = vec![0.5, 1.0];
        state.s = vec![0.25];
        let penalties = Penalties {
            rho: 2.0,
            beta: 3.0,
            factor_c: 4.0,
        };
        update_multipliers(&mut state, &blocks, penalties);
        assert_eq!(state.lambda, vec![4.0]);
        assert_eq!(state.mu, vec![1.0, 0.0]);
        assert_eq!(state.nu, vec![3.0 * 0.75]);
    }
}
