//! Ergonomic construction of compound expressions.
//!
//! Mirrors `GtkConstraintExpressionBuilder`: `plus()`/`minus()`/
//! `multiply_by()`/`divide_by()` each arm a pending operator that the next
//! `term()` or `constant()` call consumes and then clears. A `term()` with
//! no pending operator replaces the expression built so far; a
//! `multiply_by()`/`divide_by()` pending operator only has an effect when
//! consumed by `constant()` — the same asymmetry as the GTK original,
//! where `multiply_by`/`divide_by` scale the whole expression and so only
//! make sense applied to a scalar.

use crate::expression::Expression;
use crate::variable::Variable;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    None,
    Plus,
    Minus,
    MultiplyBy,
    DivideBy,
}

/// A stateful builder for [`Expression`]s.
pub struct ExpressionBuilder {
    expression: Expression,
    op: PendingOp,
}

impl Default for ExpressionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self {
            expression: Expression::default(),
            op: PendingOp::None,
        }
    }

    /// Arm the `+` operator for the next `term()`/`constant()`.
    pub fn plus(&mut self) -> &mut Self {
        self.op = PendingOp::Plus;
        self
    }

    /// Arm the `-` operator for the next `term()`/`constant()`.
    pub fn minus(&mut self) -> &mut Self {
        self.op = PendingOp::Minus;
        self
    }

    /// Arm scalar multiplication for the next `constant()`.
    pub fn multiply_by(&mut self) -> &mut Self {
        self.op = PendingOp::MultiplyBy;
        self
    }

    /// Arm scalar division for the next `constant()`.
    pub fn divide_by(&mut self) -> &mut Self {
        self.op = PendingOp::DivideBy;
        self
    }

    /// Consume the pending operator against a variable term.
    ///
    /// With no pending operator, replaces the expression built so far;
    /// `Plus`/`Minus` add or subtract `variable` from it. `MultiplyBy`/
    /// `DivideBy` have no effect on a `term()` (they only apply to
    /// `constant()`), matching the GTK original.
    pub fn term(&mut self, variable: Variable) -> &mut Self {
        match self.op {
            PendingOp::None => {
                self.expression = Expression::from_variable(variable);
            }
            PendingOp::Plus => {
                let term = Expression::from_variable(variable);
                self.expression.add_expression(&term, 1.0, None, None);
            }
            PendingOp::Minus => {
                let term = Expression::from_variable(variable);
                self.expression.add_expression(&term, -1.0, None, None);
            }
            PendingOp::MultiplyBy | PendingOp::DivideBy => {}
        }
        self.op = PendingOp::None;
        self
    }

    /// Consume the pending operator against a constant value.
    pub fn constant(&mut self, value: f64) -> &mut Self {
        match self.op {
            PendingOp::None => self.expression.constant = value,
            PendingOp::Plus => self.expression.constant += value,
            PendingOp::Minus => self.expression.constant -= value,
            PendingOp::MultiplyBy => self.expression.multiply_by(value),
            PendingOp::DivideBy => self.expression.multiply_by(1.0 / value),
        }
        self.op = PendingOp::None;
        self
    }

    /// Take the built expression, resetting the builder to its initial
    /// (inert) state so it can be reused.
    pub fn finish(&mut self) -> Expression {
        self.op = PendingOp::None;
        std::mem::take(&mut self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_over_two_plus_left() {
        let width = Variable::new_regular(None, Some("width"), 200.0);
        let left = Variable::new_regular(None, Some("left"), 10.0);

        let mut builder = ExpressionBuilder::new();
        let expr = builder
            .term(width.clone())
            .divide_by()
            .constant(2.0)
            .plus()
            .term(left.clone())
            .finish();

        assert_eq!(expr.coefficient(&width), 0.5);
        assert!((expr.coefficient(&left) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_op_replaces_expression() {
        let a = Variable::new_regular(None, None, 0.0);
        let b = Variable::new_regular(None, None, 0.0);
        let mut builder = ExpressionBuilder::new();
        builder.term(a.clone());
        builder.term(b.clone()); // no pending op: replaces, doesn't add
        let expr = builder.finish();
        assert!(!expr.contains(&a));
        assert!(expr.contains(&b));
    }

    #[test]
    fn builder_is_reusable_after_finish() {
        let a = Variable::new_regular(None, None, 0.0);
        let mut builder = ExpressionBuilder::new();
        let _ = builder.term(a.clone()).finish();
        let second = builder.constant(5.0).finish();
        assert_eq!(second.constant, 5.0);
        assert!(second.is_constant());
    }
}
