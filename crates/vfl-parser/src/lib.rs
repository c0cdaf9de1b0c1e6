//! Visual Format Language scanner: turns `H:|-[a]-[b]-|`-style lines into
//! plain [`VflConstraint`] records, ready to be fed to a
//! `cassowary-solver::Solver` one at a time. Grounded in
//! `GtkConstraintVflParser` (`gtkconstraintvflparser.c`).

mod error;
mod lexer;
mod parser;
mod types;

pub use error::{ParseError, ParseErrorKind};
pub use parser::Parser;
pub use types::{Attribute, VflConstraint};
