use crate::decomposer::{Decomposer, Penalties};
use crate::dual::update_multipliers;
use crate::error::AdmmError;
use crate::residual::{dual_residual, primal_residual, ResidualTracker};
use crate::state::{AdmmState, Incumbent};
use qadmm_core::math::{scalar, RealNumber, Timer};
use qadmm_core::options::AdmmParameters;
use qadmm_core::problem::{InitialGuess, ProblemModel};
use qadmm_core::solution::{AdmmResult, TerminationReason};
use qadmm_core::stats::{IterationRecord, SolveStats};
use qadmm_core::traits::{ConvexOracle, QuboOracle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    Iterating,
    Terminated(TerminationReason),
    Finalized,
}

/// Three-block ADMM heuristic for mixed-binary quadratic programs.
///
/// Each run owns its state; the controller itself is immutable, so one
/// instance can drive any number of independent solves.
#[derive(Debug, Clone)]
pub struct AdmmHeuristic<T: RealNumber> {
    params: AdmmParameters<T>,
    initial_guess: Option<InitialGuess<T>>,
}

impl<T> AdmmHeuristic<T>
where
    T: RealNumber,
{
    pub fn new(params: AdmmParameters<T>) -> Self {
        Self {
            params,
            initial_guess: None,
        }
    }

    pub fn with_initial_guess(mut self, guess: InitialGuess<T>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    pub fn params(&self) -> &AdmmParameters<T> {
        &self.params
    }

    /// Runs the heuristic to termination.
    ///
    /// Invalid parameters and model/guess inconsistencies are returned as
    /// errors before any oracle is called. An oracle failure during the run
    /// is not an error: the result carries [`TerminationReason::SolverFailure`],
    /// the message and the history recorded so far.
    pub fn solve<Q, C>(
        &self,
        model: &ProblemModel<T>,
        qubo: &Q,
        convex: &C,
    ) -> Result<AdmmResult<T>, AdmmError>
    where
        Q: QuboOracle<T> + ?Sized,
        C: ConvexOracle<T> + ?Sized,
    {
        self.params.validate().map_err(AdmmError::InvalidParameters)?;
        model.validate()?;
        if let Some(guess) = &self.initial_guess {
            if guess.binary.len() != model.num_binary || guess.continuous.len() != model.num_continuous {
                return Err(AdmmError::DimensionMismatch(format!(
                    "initial guess has {}+{} entries, model has {}+{} variables",
                    guess.binary.len(),
                    guess.continuous.len(),
                    model.num_binary,
                    model.num_continuous
                )));
            }
        }

        let params = &self.params;
        let timer = Timer::start();
        let decomposer = Decomposer::new(model);
        let mut stats = SolveStats::new();
        let mut state = self.initial_state(model, &decomposer, convex, &mut stats);
        let mut incumbent = Incumbent::evaluate(model, &state.x, &state.u, params.tolerance, None);
        let mut tracker = ResidualTracker::new();
        let mut last_primal: Option<T> = None;
        let mut failure: Option<String> = None;

        log_phase(Phase::Initialized);
        info!(
            binaries = model.num_binary,
            continuous = model.num_continuous,
            qubo = qubo.name(),
            convex = convex.name(),
            three_block = params.three_block,
            max_iterations = params.max_iterations,
            "starting ADMM heuristic"
        );
        log_phase(Phase::Iterating);

        let termination = loop {
            if let Some(reason) = tracker.termination(state.iteration, last_primal, timer.elapsed(), params) {
                break reason;
            }

            let penalties = Penalties {
                rho: state.rho,
                beta: state.beta,
                factor_c: params.factor_c,
            };
            let update = match decomposer.sweep(
                &state,
                penalties,
                params.three_block,
                params.sweep,
                qubo,
                convex,
                &mut stats,
            ) {
                Ok(update) => update,
                Err(err) => {
                    error!(iteration = state.iteration + 1, %err, "sweep aborted");
                    failure = Some(err.to_string());
                    break TerminationReason::SolverFailure;
                }
            };

            let z_prev = std::mem::replace(&mut state.z, update.z);
            state.x = update.x;
            state.u = update.u;
            state.s = update.s;
            update_multipliers(&mut state, decomposer.blocks(), penalties);
            state.iteration += 1;

            let (primal, dual) = if update.infeasible {
                (T::infinity(), T::infinity())
            } else {
                (
                    primal_residual(decomposer.blocks(), &state),
                    dual_residual(state.rho, &state.z, &z_prev),
                )
            };

            let candidate = match candidate(model, &decomposer, &state, convex, params.tolerance, &mut stats) {
                Ok(candidate) => candidate,
                Err(err) => {
                    error!(iteration = state.iteration, %err, "candidate evaluation aborted");
                    failure = Some(err.to_string());
                    break TerminationReason::SolverFailure;
                }
            };
            stats.push(IterationRecord::new(
                state.iteration,
                primal,
                dual,
                candidate.objective,
                candidate.feasible,
                state.rho,
                state.beta,
                timer.elapsed(),
            ));
            if params.record_iterates {
                stats.iterates.push(state.snapshot());
            }
            debug!(
                iteration = state.iteration,
                primal = ?primal.to_f64(),
                dual = ?dual.to_f64(),
                objective = ?candidate.objective.to_f64(),
                feasible = candidate.feasible,
                rho = ?state.rho.to_f64(),
                beta = ?state.beta.to_f64(),
                "admm iteration"
            );
            if candidate.improves_on(&incumbent) {
                incumbent = candidate;
            }

            let (rho, beta) = tracker.adapt(&params.penalty, state.iteration, primal, dual, state.rho, state.beta);
            state.rho = rho;
            state.beta = beta;
            last_primal = Some(primal);
        };

        log_phase(Phase::Terminated(termination));
        stats.solve_time = timer.elapsed();
        info!(
            %termination,
            iterations = state.iteration,
            objective = ?incumbent.objective.to_f64(),
            feasible = incumbent.feasible,
            elapsed = ?stats.solve_time,
            "ADMM heuristic finished"
        );
        log_phase(Phase::Finalized);

        Ok(AdmmResult {
            binary: incumbent.binary,
            continuous: incumbent.continuous,
            objective_value: incumbent.objective,
            feasible: incumbent.feasible,
            max_violation: incumbent.violation,
            found_at: incumbent.iteration,
            termination,
            iterations: state.iteration,
            failure,
            stats,
        })
    }

    fn initial_state<C>(
        &self,
        model: &ProblemModel<T>,
        decomposer: &Decomposer<T>,
        convex: &C,
        stats: &mut SolveStats<T>,
    ) -> AdmmState<T>
    where
        C: ConvexOracle<T> + ?Sized,
    {
        let rho = self.params.rho_initial;
        let beta = self.params.beta;
        let n = model.num_binary;
        let zeros = InitialGuess::zeros(n, model.num_continuous);
        if let Some(guess) = &self.initial_guess {
            if self.params.warm_start {
                debug!("explicit initial guess given, skipping warm start");
            }
            return AdmmState::from_guess(model, guess, rho, beta);
        }
        if !self.params.warm_start {
            return AdmmState::from_guess(model, &zeros, rho, beta);
        }

        stats.convex_calls += 1;
        match convex.solve(&decomposer.relaxation(model)) {
            Ok(relaxed) if relaxed.len() == model.nvars() => {
                let half = scalar::<T>(0.5);
                let guess = InitialGuess {
                    binary: relaxed[..n]
                        .iter()
                        .map(|v| if *v >= half { T::one() } else { T::zero() })
                        .collect(),
                    continuous: relaxed[n..].to_vec(),
                };
                let mut state = AdmmState::from_guess(model, &guess, rho, beta);
                state.z = relaxed[..n].to_vec();
                debug!(oracle = convex.name(), "warm start from continuous relaxation");
                state
            }
            Ok(relaxed) => {
                warn!(
                    oracle = convex.name(),
                    len = relaxed.len(),
                    "relaxation returned the wrong number of values, starting from zero"
                );
                AdmmState::from_guess(model, &zeros, rho, beta)
            }
            Err(err) => {
                warn!(oracle = convex.name(), %err, "warm start failed, starting from zero");
                AdmmState::from_guess(model, &zeros, rho, beta)
            }
        }
    }
}

fn log_phase(phase: Phase) {
    debug!(?phase, "controller phase");
}

/// Evaluates the current `(x, u)` on the original model. When `u` breaks a
/// continuous or coupling row it is re-optimised with `x` fixed first.
fn candidate<T, C>(
    model: &ProblemModel<T>,
    decomposer: &Decomposer<T>,
    state: &AdmmState<T>,
    convex: &C,
    tolerance: T,
    stats: &mut SolveStats<T>,
) -> Result<Incumbent<T>, AdmmError>
where
    T: RealNumber,
    C: ConvexOracle<T> + ?Sized,
{
    let iteration = Some(state.iteration);
    let violation = model.violation(&state.x, &state.u);
    if model.num_continuous == 0 || violation.continuous_part() <= tolerance {
        return Ok(Incumbent::evaluate(model, &state.x, &state.u, tolerance, iteration));
    }
    stats.convex_calls += 1;
    let polished = decomposer.solve_convex(convex, &decomposer.u_block(&state.x))?;
    let u = polished.as_deref().unwrap_or(&state.u);
    Ok(Incumbent::evaluate(model, &state.x, u, tolerance, iteration))
}
