use crate::math::RealNumber;
use crate::subproblem::{ConvexProblem, QuboProblem};
use anyhow::Result;
use thiserror::Error;

/// Failure signalled by a subproblem oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("subproblem infeasible: {0}")]
    Infeasible(String),
    #[error("solver error: {0}")]
    Solver(String),
}

/// Binary quadratic sub-solver. Implementations must not keep state between
/// calls so one instance can serve concurrent, independent runs.
pub trait QuboOracle<T: RealNumber>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a 0/1 vector of length `problem.dim()`.
    fn solve(&self, problem: &QuboProblem<T>) -> Result<Vec<T>, OracleError>;
}

/// Convex continuous sub-solver.
pub trait ConvexOracle<T: RealNumber>: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &ConvexProblem<T>) -> Result<Vec<T>, OracleError>;
}

impl<T: RealNumber, O: QuboOracle<T> + ?Sized> QuboOracle<T> for Box<O> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve(&self, problem: &QuboProblem<T>) -> Result<Vec<T>, OracleError> {
        (**self).solve(problem)
    }
}

impl<T: RealNumber, O: ConvexOracle<T> + ?Sized> ConvexOracle<T> for Box<O> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve(&self, problem: &ConvexProblem<T>) -> Result<Vec<T>, OracleError> {
        (**self).solve(problem)
    }
}

/// Factorise-then-solve interface shared by the dense linear-system backends.
pub trait KktSolver<T: RealNumber>: Send {
    type Pattern;
    type Matrix;

    fn analyze_pattern(&mut self, pattern: &Self::Pattern) -> Result<()>;

    fn factor(&mut self, matrix: &Self::Matrix) -> Result<()>;

    fn solve(&self, rhs: &mut [T]) -> Result<()>;
}
