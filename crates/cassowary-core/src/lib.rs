//! Variable and expression algebra for the Cassowary constraint solver.
//!
//! This crate has no notion of a simplex tableau; it only provides the
//! atomic term types (`Variable`, `Expression`, `VariableSet`) and the
//! strength/relation vocabulary that `cassowary-solver` builds on.

mod builder;
mod expression;
mod strength;
mod variable;
mod variable_set;

pub use builder::ExpressionBuilder;
pub use expression::{near_zero, ChangeObserver, Expression, ExpressionIter, EPSILON};
pub use strength::{pack, Relation, Strength};
pub use variable::{Variable, VariableKind};
pub use variable_set::{VariableSet, VariableSetIter};
