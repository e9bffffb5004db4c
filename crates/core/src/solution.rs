use crate::math::RealNumber;
use crate::stats::SolveStats;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxIterations,
    Timeout,
    SolverFailure,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminationReason::Converged => "converged",
            TerminationReason::MaxIterations => "max_iterations",
            TerminationReason::Timeout => "timeout",
            TerminationReason::SolverFailure => "solver_failure",
        };
        f.write_str(label)
    }
}

/// Best iterate found by a run, with its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmmResult<T: RealNumber> {
    pub binary: Vec<T>,
    pub continuous: Vec<T>,
    pub objective_value: T,
    pub feasible: bool,
    pub max_violation: T,
    /// Iteration at which the reported iterate was produced; `None` for the start point.
    pub found_at: Option<usize>,
    pub termination: TerminationReason,
    pub iterations: usize,
    pub failure: Option<String>,
    pub stats: SolveStats<T>,
}

impl<T> AdmmResult<T>
where
    T: RealNumber,
{
    /// Primal residual of the last recorded iteration.
    pub fn final_primal_residual(&self) -> Option<T> {
        self.stats.history.last().map(|record| record.primal_residual)
    }

    pub fn residual_pairs(&self) -> Vec<(T, T)> {
        self.stats
            .history
            .iter()
            .map(|record| (record.primal_residual, record.dual_residual))
            .collect()
    }
}
