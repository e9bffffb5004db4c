#![forbid(unsafe_code)]

pub mod math;
pub mod matrix;
pub mod options;
pub mod problem;
pub mod solution;
pub mod stats;
pub mod subproblem;
pub mod traits;

pub use math::*;
pub use matrix::*;
pub use options::*;
pub use problem::*;
pub use solution::*;
pub use stats::*;
pub use subproblem::*;
pub use traits::*;
