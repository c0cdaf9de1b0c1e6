//! The incremental simplex tableau on top of `cassowary-core`'s variable
//! and expression algebra.

mod constraint;
mod error;
mod solver;

pub use constraint::ConstraintRef;
pub use error::SolverError;
pub use solver::{Solver, Statistics};

pub use cassowary_core::{Relation, Strength, Variable};
