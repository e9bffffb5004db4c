use crate::exhaustive::{apply_flip, flip_delta};
use qadmm_core::math::{scalar, RealNumber};
use qadmm_core::subproblem::QuboProblem;
use qadmm_core::traits::{OracleError, QuboOracle};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Single-flip simulated annealing with geometric cooling and restarts.
///
/// Temperatures are relative to the largest possible single-flip energy change
/// of the instance. The generator is re-seeded on every call, so identical
/// inputs give identical assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedAnnealingQubo {
    pub sweeps: usize,
    pub restarts: usize,
    pub initial_temperature: f64,
    pub final_temperature: f64,
    pub seed: u64,
}

impl Default for SimulatedAnnealingQubo {
    fn default() -> Self {
        Self {
            sweeps: 1_000,
            restarts: 8,
            initial_temperature: 1.0,
            final_temperature: 1e-3,
            seed: 42,
        }
    }
}

impl SimulatedAnnealingQubo {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    fn energy_scale<T: RealNumber>(problem: &QuboProblem<T>) -> f64 {
        let n = problem.dim();
        let mut scale = 0.0f64;
        for i in 0..n {
            let mut bound = (problem.linear[i] + problem.quadratic.get(i, i)).abs();
            for j in 0..n {
                if j != i {
                    bound += scalar::<T>(2.0) * problem.quadratic.get(i, j).abs();
                }
            }
            scale = scale.max(bound.to_f64().unwrap_or(0.0));
        }
        scale.max(f64::EPSILON)
    }

    fn temperature(&self, scale: f64, sweep: usize) -> f64 {
        if self.sweeps <= 1 {
            return scale * self.final_temperature;
        }
        let progress = sweep as f64 / (self.sweeps - 1) as f64;
        let ratio = self.final_temperature / self.initial_temperature;
        scale * self.initial_temperature * ratio.powf(progress)
    }
}

impl<T: RealNumber> QuboOracle<T> for SimulatedAnnealingQubo {
    fn name(&self) -> &'static str {
        "simulated-annealing"
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
        if !(self.initial_temperature > 0.0 && self.final_temperature > 0.0) {
            return Err(OracleError::Solver("temperatures must be positive".into()));
        }

        let scale = Self::energy_scale(problem);
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut best: Option<(Vec<T>, T)> = None;

        for restart in 0..self.restarts.max(1) {
            let mut x: Vec<T> = (0..n)
                .map(|_| if rng.gen_bool(0.5) { T::one() } else { T::zero() })
                .collect();
            let mut field: Vec<T> = (0..n)
                .map(|i| {
                    (0..n)
                        .filter(|&j| j != i)
                        .fold(T::zero(), |acc, j| acc + problem.quadratic.get(i, j) * x[j])
                })
                .collect();
            let mut energy = problem.energy(&x);
            let mut local_best = (x.clone(), energy);

            for sweep in 0..self.sweeps {
                let temperature = self.temperature(scale, sweep);
                for i in 0..n {
                    let delta = if x[i] == T::zero() { T::one() } else { -T::one() };
                    let change = flip_delta(problem, &field, i, delta);
                    let change_f = change.to_f64().unwrap_or(f64::INFINITY);
                    let accept = change_f <= 0.0 || rng.gen::<f64>() < (-change_f / temperature).exp();
                    if accept {
                        energy += change;
                        apply_flip(problem, &mut field, i, delta);
                        x[i] = x[i] + delta;
                        if energy < local_best.1 {
                            local_best = (x.clone(), energy);
                        }
                    }
                }
            }
            trace!(restart, energy = ?local_best.1.to_f64(), "annealing restart finished");
            let replace = best
                .as_ref()
                .map_or(true, |(_, incumbent)| local_best.1 < *incumbent);
            if replace {
                best = Some(local_best);
            }
        }

        best.map(|(x, _)| x)
            .ok_or_else(|| OracleError::Solver("annealing produced no assignment".into()))
    }
}
