//! Linear expressions: `constant + Σ(coefficient · variable)`.

use std::cell::Cell;

use indexmap::IndexMap;

use crate::variable::Variable;

/// Numeric tolerance for coefficient algebra (spec §4.1: ≈1e-3 in the
/// solver's hot path; the GTK source uses `G_APPROX_VALUE(x, 0, 0.001)`).
pub const EPSILON: f64 = 1e-3;

pub fn near_zero(value: f64) -> bool {
    value.abs() < EPSILON
}

/// Callback contract for a mutator that needs to track which variables
/// enter or leave an expression's column index (spec §4.1:
/// `Expression.add_expression`/`substitute_out`).
///
/// Implemented by the solver so it can keep its `columns` index in sync
/// as expressions are algebraically combined.
pub trait ChangeObserver {
    fn note_added_variable(&mut self, variable: &Variable, subject: Option<&Variable>);
    fn note_removed_variable(&mut self, variable: &Variable, subject: Option<&Variable>);
}

/// A linear expression: a constant plus an insertion-ordered sequence of
/// (variable, coefficient) terms.
///
/// Terms with a zero coefficient are eagerly removed (spec §3: "coefficient
/// == 0 terms are eagerly removed"). Every structural mutation bumps an
/// internal age counter that the expression's iterators check on each
/// step (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct Expression {
    pub constant: f64,
    terms: IndexMap<Variable, f64>,
    age: Cell<u64>,
}

impl Expression {
    pub fn from_constant(value: f64) -> Self {
        Self {
            constant: value,
            terms: IndexMap::new(),
            age: Cell::new(0),
        }
    }

    pub fn from_variable(variable: Variable) -> Self {
        let mut terms = IndexMap::new();
        terms.insert(variable, 1.0);
        Self {
            constant: 0.0,
            terms,
            age: Cell::new(0),
        }
    }

    fn bump_age(&self) {
        self.age.set(self.age.get().wrapping_add(1));
    }

    /// Insert, accumulate into, or remove (on a resulting near-zero
    /// coefficient) a term.
    pub fn add_term(&mut self, variable: Variable, coefficient: f64) {
        if near_zero(coefficient) {
            return;
        }
        self.bump_age();
        let entry = self.terms.entry(variable).or_insert(0.0);
        *entry += coefficient;
        self.drop_zero_terms();
    }

    /// Remove a term outright, regardless of its coefficient.
    pub fn remove_term(&mut self, variable: &Variable) -> Option<f64> {
        self.bump_age();
        self.terms.shift_remove(variable)
    }

    /// Replace (or insert, or remove if `coefficient` is ~0) a term's
    /// coefficient.
    pub fn set_variable(&mut self, variable: Variable, coefficient: f64) {
        self.bump_age();
        if near_zero(coefficient) {
            self.terms.shift_remove(&variable);
        } else {
            self.terms.insert(variable, coefficient);
        }
    }

    fn drop_zero_terms(&mut self) {
        self.terms.retain(|_, c| !near_zero(*c));
    }

    pub fn coefficient(&self, variable: &Variable) -> f64 {
        self.terms.get(variable).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, variable: &Variable) -> bool {
        self.terms.contains_key(variable)
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Add a `(coefficient * variable)` term, notifying `observer` if the
    /// term's presence in the expression changes as a result — either a
    /// brand new term, or one whose coefficient cancelled to zero.
    pub fn add_variable(
        &mut self,
        variable: Variable,
        coefficient: f64,
        subject: Option<&Variable>,
        observer: Option<&mut dyn ChangeObserver>,
    ) {
        let had_before = self.terms.contains_key(&variable);
        self.add_term(variable.clone(), coefficient);
        let has_after = self.terms.contains_key(&variable);
        if let Some(observer) = observer {
            if !had_before && has_after {
                observer.note_added_variable(&variable, subject);
            } else if had_before && !has_after {
                observer.note_removed_variable(&variable, subject);
            }
        }
    }

    /// `self += n · other`, notifying `observer` of any variable whose
    /// presence in `self` changes as a result (spec §4.1).
    pub fn add_expression(
        &mut self,
        other: &Expression,
        n: f64,
        subject: Option<&Variable>,
        mut observer: Option<&mut dyn ChangeObserver>,
    ) {
        self.constant += other.constant * n;
        for (variable, coeff) in other.terms.iter() {
            let had_before = self.terms.contains_key(variable);
            self.add_term(variable.clone(), coeff * n);
            let has_after = self.terms.contains_key(variable);
            if let Some(observer) = observer.as_deref_mut() {
                if !had_before && has_after {
                    observer.note_added_variable(variable, subject);
                } else if had_before && !has_after {
                    observer.note_removed_variable(variable, subject);
                }
            }
        }
    }

    /// Multiply every coefficient and the constant by `scalar`.
    pub fn multiply_by(&mut self, scalar: f64) {
        self.bump_age();
        self.constant *= scalar;
        for coeff in self.terms.values_mut() {
            *coeff *= scalar;
        }
        self.drop_zero_terms();
    }

    /// Replace every occurrence of `variable` with `replacement`,
    /// notifying `observer` of the resulting column changes.
    pub fn substitute_out(
        &mut self,
        variable: &Variable,
        replacement: &Expression,
        subject: Option<&Variable>,
        observer: Option<&mut dyn ChangeObserver>,
    ) {
        if let Some(coeff) = self.terms.shift_remove(variable) {
            self.bump_age();
            self.add_expression(replacement, coeff, subject, observer);
        }
    }

    /// Rearrange so `new_subject` becomes the subject, given that `self`
    /// already implicitly has `old_subject` as its subject (spec §4.1).
    ///
    /// Returns the reciprocal used, i.e. the coefficient `new_subject` had
    /// before this call.
    pub fn change_subject(&mut self, old_subject: Variable, new_subject: &Variable) -> f64 {
        let reciprocal = self.new_subject(new_subject);
        self.set_variable(old_subject, reciprocal);
        reciprocal
    }

    /// Solve `self = 0` for `subject`, discarding any prior subject.
    /// Returns the reciprocal (the coefficient `subject` had before the
    /// rearrangement).
    pub fn new_subject(&mut self, subject: &Variable) -> f64 {
        let coeff = self.terms.shift_remove(subject).unwrap_or(1.0);
        let reciprocal = 1.0 / coeff;
        self.multiply_by(-reciprocal);
        reciprocal
    }

    /// A restartable, age-checked forward iterator.
    pub fn iter(&self) -> ExpressionIter<'_> {
        ExpressionIter {
            expr: self,
            age_at_init: self.age.get(),
            front: 0,
            back: self.terms.len(),
        }
    }
}

/// Iterates an [`Expression`]'s terms in insertion order (or reverse, via
/// [`Iterator::rev`]); panics if the expression is structurally mutated
/// mid-iteration (spec §4.1: "fail loudly").
pub struct ExpressionIter<'a> {
    expr: &'a Expression,
    age_at_init: u64,
    front: usize,
    back: usize,
}

impl<'a> ExpressionIter<'a> {
    fn check_age(&self) {
        assert_eq!(
            self.expr.age.get(),
            self.age_at_init,
            "Expression mutated during iteration"
        );
    }
}

impl<'a> Iterator for ExpressionIter<'a> {
    type Item = (&'a Variable, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.check_age();
        if self.front >= self.back {
            return None;
        }
        let (variable, coeff) = self.expr.terms.get_index(self.front)?;
        self.front += 1;
        Some((variable, *coeff))
    }
}

impl<'a> DoubleEndedIterator for ExpressionIter<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.check_age();
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        let (variable, coeff) = self.expr.terms.get_index(self.back)?;
        Some((variable, *coeff))
    }
}
