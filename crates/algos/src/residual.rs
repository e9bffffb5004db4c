use crate::decomposer::Blocks;
use crate::state::AdmmState;
use qadmm_core::math::{distance2, norm2, positive_part, RealNumber};
use qadmm_core::options::{AdmmParameters, PenaltySchedule};
use qadmm_core::solution::TerminationReason;
use std::time::Duration;
use tracing::debug;

/// Euclidean norm of every constraint residual of the current iterate, stacked.
pub fn primal_residual<T: RealNumber>(blocks: &Blocks<T>, state: &AdmmState<T>) -> T {
    let mut stacked: Vec<T> = state.x.iter().zip(state.z.iter()).map(|(x, z)| *x - *z).collect();
    stacked.extend(
        blocks
            .g
            .mul_vec(&state.x)
            .iter()
            .zip(blocks.b.iter())
            .map(|(gx, b)| *gx - *b),
    );
    stacked.extend(
        blocks
            .a1
            .mul_vec(&state.x)
            .iter()
            .zip(blocks.b1.iter().zip(state.s.iter()))
            .map(|(a1x, (b1, s))| *a1x - *b1 + *s),
    );
    if blocks.m2() > 0 {
        let a2x = blocks.a2.mul_vec(&state.x);
        let a3u = blocks.a3.mul_vec(&state.u);
        stacked.extend(
            a2x.iter()
                .zip(a3u.iter())
                .zip(blocks.b2.iter())
                .map(|((a, b), rhs)| positive_part(*a + *b - *rhs)),
        );
    }
    if !blocks.b4.is_empty() {
        stacked.extend(
            blocks
                .a4
                .mul_vec(&state.u)
                .iter()
                .zip(blocks.b4.iter())
                .map(|(lhs, rhs)| positive_part(*lhs - *rhs)),
        );
    }
    stacked.extend(
        state
            .u
            .iter()
            .zip(blocks.lower.iter().zip(blocks.upper.iter()))
            .map(|(u, (lo, hi))| positive_part(*lo - *u).max(positive_part(*u - *hi))),
    );
    norm2(&stacked)
}

/// `ρ ‖z - z_prev‖`.
pub fn dual_residual<T: RealNumber>(rho: T, z: &[T], z_prev: &[T]) -> T {
    rho * distance2(z, z_prev)
}

/// Stopping rules and penalty adaptation over the residual history.
#[derive(Debug, Clone)]
pub struct ResidualTracker<T> {
    window_best: Option<T>,
    previous_window_best: Option<T>,
}

impl<T> Default for ResidualTracker<T> {
    fn default() -> Self {
        Self {
            window_best: None,
            previous_window_best: None,
        }
    }
}

impl<T> ResidualTracker<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Checked before each iteration, in order: convergence, iteration cap, time cap.
    pub fn termination(
        &self,
        iterations_done: usize,
        last_primal: Option<T>,
        elapsed: Duration,
        params: &AdmmParameters<T>,
    ) -> Option<TerminationReason> {
        if last_primal.is_some_and(|r| r < params.tolerance) {
            return Some(TerminationReason::Converged);
        }
        if iterations_done >= params.max_iterations {
            return Some(TerminationReason::MaxIterations);
        }
        if params.max_time.is_some_and(|limit| elapsed >= limit) {
            return Some(TerminationReason::Timeout);
        }
        None
    }

    /// Applies the configured schedule after iteration `iteration` (1-based)
    /// and returns the new `(rho, beta)`.
    pub fn adapt(
        &mut self,
        schedule: &PenaltySchedule<T>,
        iteration: usize,
        primal: T,
        dual: T,
        rho: T,
        beta: T,
    ) -> (T, T) {
        match *schedule {
            PenaltySchedule::Fixed => (rho, beta),
            PenaltySchedule::OnStall { factor, frequency } => {
                if primal.is_finite() {
                    self.window_best = Some(self.window_best.map_or(primal, |best| best.min(primal)));
                }
                if iteration % frequency != 0 {
                    return (rho, beta);
                }
                let stalled = match (self.window_best, self.previous_window_best) {
                    (Some(current), Some(previous)) => current >= previous,
                    (None, _) => true,
                    (Some(_), None) => false,
                };
                self.previous_window_best = self.window_best.take();
                if stalled {
                    debug!(iteration, "primal residual stalled, increasing penalties");
                    (rho * factor, beta * factor)
                } else {
                    (rho, beta)
                }
            }
            PenaltySchedule::ResidualBalancing {
                mu,
                tau_increase,
                tau_decrease,
            } => {
                if !(primal.is_finite() && dual.is_finite()) {
                    (rho, beta)
                } else if primal > mu * dual {
                    (rho * tau_increase, beta * tau_increase)
                } else if dual > mu * primal {
                    (rho / tau_decrease, beta / tau_decrease)
                } else {
                    (rho, beta)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_order() {
        let tracker = ResidualTracker::<f64>::new();
        let mut params = AdmmParameters::<f64>::with_tolerance(1e-3);
        params.max_iterations = 5;
        params.max_time = Some(Duration::ZERO);
        assert_eq!(
            tracker.termination(5, Some(1e-4), Duration::ZERO, &params),
            Some(TerminationReason::Converged)
        );
        assert_eq!(
            tracker.termination(5, Some(1.0), Duration::ZERO, &params),
            Some(TerminationReason::MaxIterations)
        );
        assert_eq!(
            tracker.termination(2, None, Duration::ZERO, &params),
            Some(TerminationReason::Timeout)
        );
        params.max_time = None;
        assert_eq!(tracker.termination(2, Some(f64::INFINITY), Duration::ZERO, &params), None);
    }

    #[test]
    fn stall_schedule_scales_both_penalties() {
        let mut tracker = ResidualTracker::new();
        let schedule = PenaltySchedule::OnStall {
            factor: 2.0,
            frequency: 2,
        };
        assert_eq!(tracker.adapt(&schedule, 1, 1.0, 0.0, 1.0, 3.0), (1.0, 3.0));
        // first full window only establishes the reference
        assert_eq!(tracker.adapt(&schedule, 2, 0.5, 0.0, 1.0, 3.0), (1.0, 3.0));
        assert_eq!(tracker.adapt(&schedule, 3, 0.7, 0.0, 1.0, 3.0), (1.0, 3.0));
        assert_eq!(tracker.adapt(&schedule, 4, 0.6, 0.0, 1.0, 3.0), (2.0, 6.0));
        assert_eq!(tracker.adapt(&schedule, 5, 0.1, 0.0, 2.0, 6.0), (2.0, 6.0));
        assert_eq!(tracker.adapt(&schedule, 6, 0.2, 0.0, 2.0, 6.0), (2.0, 6.0));
    }

    #[test]
    fn balancing_follows_residual_ratio() {
        let mut tracker = ResidualTracker::new();
        let schedule = PenaltySchedule::ResidualBalancing {
            mu: 10.0,
            tau_increase: 2.0,
            tau_decrease: 2.0,
        };
        assert_eq!(tracker.adapt(&schedule, 1, 100.0, 1.0, 4.0, 8.0), (8.0, 16.0));
        assert_eq!(tracker.adapt(&schedule, 2, 1.0, 100.0, 4.0, 8.0), (2.0, 4.0));
        assert_eq!(tracker.adapt(&schedule, 3, 1.0, 2.0, 4.0, 8.0), (4.0, 8.0));
    }

    #[test]
    fn dual_residual_scales_with_rho() {
        assert_eq!(dual_residual(2.0, &[3.0, 4.0], &[0.0, 0.0]), 10.0);
    }
}
