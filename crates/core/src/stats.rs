use crate::math::RealNumber;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord<T: RealNumber> {
    pub iteration: usize,
    pub primal_residual: T,
    pub dual_residual: T,
    pub objective: T,
    pub feasible: bool,
    pub rho: T,
    pub beta: T,
    pub elapsed: Duration,
}

impl<T> IterationRecord<T>
where
    T: RealNumber,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        iteration: usize,
        primal_residual: T,
        dual_residual: T,
        objective: T,
        feasible: bool,
        rho: T,
        beta: T,
        elapsed: Duration,
    ) -> Self {
        Self {
            iteration,
            primal_residual,
            dual_residual,
            objective,
            feasible,
            rho,
            beta,
            elapsed,
        }
    }
}

/// Full iterate after one sweep, kept only when requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterateSnapshot<T> {
    pub x: Vec<T>,
    pub u: Vec<T>,
    pub z: Vec<T>,
    pub s: Vec<T>,
    pub lambda: Vec<T>,
    pub mu: Vec<T>,
    pub nu: Vec<T>,
    pub rho: T,
    pub beta: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveStats<T: RealNumber> {
    pub history: Vec<IterationRecord<T>>,
    pub iterates: Vec<IterateSnapshot<T>>,
    pub solve_time: Duration,
    pub qubo_calls: usize,
    pub convex_calls: usize,
    pub infeasible_subproblems: usize,
}

impl<T> SolveStats<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            iterates: Vec::new(),
            solve_time: Duration::ZERO,
            qubo_calls: 0,
            convex_calls: 0,
            infeasible_subproblems: 0,
        }
    }

    pub fn push(&mut self, record: IterationRecord<T>) {
        self.history.push(record);
    }
}

impl<T> Default for SolveStats<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}
