#![forbid(unsafe_code)]

pub mod dense;
pub mod lu;

pub use dense::{DenseKktMatrix, DenseKktSolver, DensePattern};
pub use lu::DenseLuSolver;
