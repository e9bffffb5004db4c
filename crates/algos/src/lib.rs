#![forbid(unsafe_code)]

pub mod active_set;
pub mod admm_qp;
pub mod annealing;
pub mod controller;
pub mod decomposer;
pub mod dual;
pub mod error;
pub mod exhaustive;
pub mod residual;
pub mod state;

pub use active_set::ActiveSetQp;
pub use admm_qp::{AdmmQp, AdmmQpSettings};
pub use annealing::SimulatedAnnealingQubo;
pub use controller::AdmmHeuristic;
pub use decomposer::Decomposer;
pub use error::AdmmError;
pub use exhaustive::ExhaustiveQubo;
pub use state::{AdmmState, Incumbent};
