use crate::math::{scalar, RealNumber};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the penalty parameters `rho` and `beta` evolve during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltySchedule<T> {
    Fixed,
    /// Every `frequency` iterations, scale `rho` and `beta` by `factor` when the
    /// best primal residual of the window did not improve on the previous one.
    OnStall { factor: T, frequency: usize },
    /// Keep primal and dual residuals within a factor `mu` of each other.
    ResidualBalancing {
        mu: T,
        tau_increase: T,
        tau_decrease: T,
    },
}

/// Order in which blocks see each other's updates within one sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SweepOrder {
    /// Each block sees the freshest binary iterate of the same sweep.
    #[default]
    GaussSeidel,
    /// Continuous and slack blocks read the binary iterate of the previous
    /// sweep. Convergence behaviour differs from the Gauss-Seidel order.
    Jacobi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmParameters<T: RealNumber> {
    pub rho_initial: T,
    pub beta: T,
    pub factor_c: T,
    pub max_iterations: usize,
    pub three_block: bool,
    pub tolerance: T,
    pub max_time: Option<Duration>,
    pub penalty: PenaltySchedule<T>,
    pub sweep: SweepOrder,
    pub warm_start: bool,
    pub record_iterates: bool,
}

impl<T> AdmmParameters<T>
where
    T: RealNumber,
{
    pub fn with_tolerance(tolerance: T) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    /// Rejects non-positive or non-finite penalties and malformed schedules.
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, value: T| {
            if value.is_finite() && value > T::zero() {
                Ok(())
            } else {
                Err(format!("{name} must be positive and finite"))
            }
        };
        positive("rho_initial", self.rho_initial)?;
        positive("beta", self.beta)?;
        positive("factor_c", self.factor_c)?;
        positive("tolerance", self.tolerance)?;
        match self.penalty {
            PenaltySchedule::Fixed => {}
            PenaltySchedule::OnStall { factor, frequency } => {
                if !(factor.is_finite() && factor > T::one()) {
                    return Err("stall factor must be finite and greater than one".into());
                }
                if frequency == 0 {
                    return Err("stall frequency must be at least one".into());
                }
            }
            PenaltySchedule::ResidualBalancing {
                mu,
                tau_increase,
                tau_decrease,
            } => {
                for (name, value) in [("mu", mu), ("tau_increase", tau_increase), ("tau_decrease", tau_decrease)] {
                    if !(value.is_finite() && value > T::one()) {
                        return Err(format!("{name} must be finite and greater than one"));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<T> Default for AdmmParameters<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            rho_initial: scalar(10_000.0),
            beta: scalar(1_000.0),
            factor_c: scalar(100_000.0),
            max_iterations: 10,
            three_block: true,
            tolerance: scalar(1e-4),
            max_time: None,
            penalty: PenaltySchedule::Fixed,
            sweep: SweepOrder::GaussSeidel,
            warm_start: false,
            record_iterates: false,
        }
    }
}
