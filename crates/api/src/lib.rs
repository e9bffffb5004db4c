#![forbid(unsafe_code)]

pub mod builder;

use qadmm_algos::{ActiveSetQp, AdmmHeuristic, AdmmQp, ExhaustiveQubo, SimulatedAnnealingQubo};
use qadmm_core::math::RealNumber;
use qadmm_core::problem::{InitialGuess, ProblemModel};
use qadmm_core::traits::{ConvexOracle, QuboOracle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use builder::{BuildError, BuiltModel, ModelBuilder, Sense, VarKind};
pub use qadmm_algos::AdmmError;
pub use qadmm_core::options::{AdmmParameters, PenaltySchedule, SweepOrder};
pub use qadmm_core::solution::{AdmmResult, TerminationReason};
pub use qadmm_core::stats::SolveStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuboBackend {
    #[default]
    Exhaustive,
    Annealing,
}

impl QuboBackend {
    pub fn oracle<T: RealNumber>(self, seed: u64) -> Box<dyn QuboOracle<T>> {
        match self {
            QuboBackend::Exhaustive => Box::new(ExhaustiveQubo::default()),
            QuboBackend::Annealing => Box::new(SimulatedAnnealingQubo::with_seed(seed)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvexBackend {
    #[default]
    ActiveSet,
    Admm,
}

impl ConvexBackend {
    pub fn oracle<T: RealNumber>(self) -> Box<dyn ConvexOracle<T>> {
        match self {
            ConvexBackend::ActiveSet => Box::new(ActiveSetQp::<T>::new()),
            ConvexBackend::Admm => Box::new(AdmmQp::<T>::default()),
        }
    }
}

/// Heuristic solver bundled with its subproblem oracles.
pub struct HeuristicSolver<T: RealNumber> {
    params: AdmmParameters<T>,
    qubo: Box<dyn QuboOracle<T>>,
    convex: Box<dyn ConvexOracle<T>>,
    initial_guess: Option<InitialGuess<T>>,
}

impl<T> HeuristicSolver<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self {
            params: AdmmParameters::default(),
            qubo: QuboBackend::default().oracle(0),
            convex: ConvexBackend::default().oracle(),
            initial_guess: None,
        }
    }

    pub fn params(mut self, params: AdmmParameters<T>) -> Self {
        self.params = params;
        self
    }

    pub fn qubo_backend(mut self, backend: QuboBackend, seed: u64) -> Self {
        self.qubo = backend.oracle(seed);
        self
    }

    pub fn convex_backend(mut self, backend: ConvexBackend) -> Self {
        self.convex = backend.oracle();
        self
    }

    /// Replaces the binary sub-solver, e.g. with an external device client.
    pub fn qubo_oracle(mut self, oracle: Box<dyn QuboOracle<T>>) -> Self {
        self.qubo = oracle;
        self
    }

    pub fn convex_oracle(mut self, oracle: Box<dyn ConvexOracle<T>>) -> Self {
        self.convex = oracle;
        self
    }

    pub fn initial_guess(mut self, guess: InitialGuess<T>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    pub fn parameters(&self) -> &AdmmParameters<T> {
        &self.params
    }

    pub fn solve(&self, model: &ProblemModel<T>) -> Result<AdmmResult<T>, AdmmError> {
        let mut heuristic = AdmmHeuristic::new(self.params.clone());
        if let Some(guess) = &self.initial_guess {
            heuristic = heuristic.with_initial_guess(guess.clone());
        }
        heuristic.solve(model, self.qubo.as_ref(), self.convex.as_ref())
    }

    /// Solves independent models in parallel. Every model gets its own
    /// controller state; only the oracles are shared.
    pub fn solve_batch(&self, models: &[ProblemModel<T>]) -> Vec<Result<AdmmResult<T>, AdmmError>> {
        info!(models = models.len(), "solving batch");
        models.par_iter().map(|model| self.solve(model)).collect()
    }
}

impl<T> Default for HeuristicSolver<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}

pub fn solve<T: RealNumber>(
    model: &ProblemModel<T>,
    params: AdmmParameters<T>,
) -> Result<AdmmResult<T>, AdmmError> {
    HeuristicSolver::new().params(params).solve(model)
}
