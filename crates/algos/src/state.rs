use qadmm_core::math::RealNumber;
use qadmm_core::problem::{InitialGuess, ProblemModel};
use qadmm_core::stats::IterateSnapshot;

/// Primal and dual iterates carried between sweeps.
#[derive(Debug, Clone)]
pub struct AdmmState<T: RealNumber> {
    pub x: Vec<T>,
    pub u: Vec<T>,
    pub z: Vec<T>,
    pub s: Vec<T>,
    pub lambda: Vec<T>,
    pub mu: Vec<T>,
    pub nu: Vec<T>,
    pub rho: T,
    pub beta: T,
    pub iteration: usize,
}

impl<T> AdmmState<T>
where
    T: RealNumber,
{
    /// All-zero iterate for `n` binaries, `l` continuous variables, `m_eq`
    /// equality rows and `m1` binary inequality rows.
    pub fn zeros(n: usize, l: usize, m_eq: usize, m1: usize, rho: T, beta: T) -> Self {
        Self {
            x: vec![T::zero(); n],
            u: vec![T::zero(); l],
            z: vec![T::zero(); n],
            s: vec![T::zero(); m1],
            lambda: vec![T::zero(); m_eq],
            mu: vec![T::zero(); n],
            nu: vec![T::zero(); m1],
            rho,
            beta,
            iteration: 0,
        }
    }

    /// Starting iterate from a user guess: `z` copies the binary guess, the
    /// multipliers and slack start at zero.
    pub fn from_guess(model: &ProblemModel<T>, guess: &InitialGuess<T>, rho: T, beta: T) -> Self {
        let m_eq = model.equalities.as_ref().map_or(0, |eq| eq.rhs.len());
        let m1 = model.binary_inequalities.as_ref().map_or(0, |ineq| ineq.rhs.len());
        let mut state = Self::zeros(model.num_binary, model.num_continuous, m_eq, m1, rho, beta);
        state.x.clone_from(&guess.binary);
        state.z.clone_from(&guess.binary);
        state.u.clone_from(&guess.continuous);
        state
    }

    pub fn snapshot(&self) -> IterateSnapshot<T> {
        IterateSnapshot {
            x: self.x.clone(),
            u: self.u.clone(),
            z: self.z.clone(),
            s: self.s.clone(),
            lambda: self.lambda.clone(),
            mu: self.mu.clone(),
            nu: self.nu.clone(),
            rho: self.rho,
            beta: self.beta,
        }
    }
}

/// Best candidate seen so far, judged on the original model.
#[derive(Debug, Clone)]
pub struct Incumbent<T> {
    pub binary: Vec<T>,
    pub continuous: Vec<T>,
    pub objective: T,
    pub violation: T,
    pub feasible: bool,
    pub iteration: Option<usize>,
}

impl<T> Incumbent<T>
where
    T: RealNumber,
{
    pub fn evaluate(
        model: &ProblemModel<T>,
        binary: &[T],
        continuous: &[T],
        tolerance: T,
        iteration: Option<usize>,
    ) -> Self {
        let violation = model.violation(binary, continuous);
        Self {
            binary: binary.to_vec(),
            continuous: continuous.to_vec(),
            objective: model.objective(binary, continuous),
            violation: violation.max(),
            feasible: violation.within(tolerance),
            iteration,
        }
    }

    /// Feasible beats infeasible; among feasible the lower objective wins,
    /// among infeasible the smaller violation. Ties keep the incumbent.
    pub fn improves_on(&self, incumbent: &Self) -> bool {
        match (self.feasible, incumbent.feasible) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => self.objective < incumbent.objective,
            (false, false) => self.violation < incumbent.violation,
        }
    }
}
