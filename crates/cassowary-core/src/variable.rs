//! The atomic term type: a tagged, reference-counted numeric unknown.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The kind of a [`Variable`], fixed for its whole lifetime.
///
/// The kind determines the derived flags `is_external`, `is_pivotable`,
/// and `is_restricted` used throughout the solver (spec data model §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// A user-visible unknown created via [`Variable::new_regular`].
    Regular,
    /// A non-pivotable marker for required equalities.
    Dummy,
    /// Introduced to turn an inequality into an equality, or to carry error.
    Slack,
    /// The row subject of the objective function.
    Objective,
}

struct VariableData {
    id: u64,
    kind: VariableKind,
    prefix: Option<String>,
    name: Option<String>,
    value: Cell<f64>,
}

/// A shared handle to a numeric unknown.
///
/// Cloning a `Variable` is an `Rc` pointer copy; all clones refer to the
/// same underlying value cell. Equality and hashing are by id, not by
/// address, so a `Variable` can be used as a map key consistently even
/// across clones obtained at different times.
#[derive(Clone)]
pub struct Variable(Rc<VariableData>);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

impl Variable {
    /// Create a new external, non-pivotable, non-restricted variable.
    ///
    /// `prefix` and `name` are for debug display only.
    pub fn new_regular(prefix: Option<&str>, name: Option<&str>, initial_value: f64) -> Self {
        Self::with_kind(VariableKind::Regular, prefix, name, initial_value)
    }

    /// Create a non-external, non-pivotable, restricted dummy variable.
    ///
    /// Used as a marker for required equalities; a dummy must never enter
    /// the basis.
    pub fn new_dummy(name: Option<&str>) -> Self {
        Self::with_kind(VariableKind::Dummy, None, name, 0.0)
    }

    /// Create a non-external, pivotable, restricted slack variable.
    pub fn new_slack(name: Option<&str>) -> Self {
        Self::with_kind(VariableKind::Slack, None, name, 0.0)
    }

    /// Create a non-external, non-pivotable, non-restricted objective
    /// variable (the row subject of an objective function).
    pub fn new_objective(name: Option<&str>) -> Self {
        Self::with_kind(VariableKind::Objective, None, name, 0.0)
    }

    fn with_kind(kind: VariableKind, prefix: Option<&str>, name: Option<&str>, value: f64) -> Self {
        Variable(Rc::new(VariableData {
            id: next_id(),
            kind,
            prefix: prefix.map(str::to_owned),
            name: name.map(str::to_owned),
            value: Cell::new(value),
        }))
    }

    /// The variable's stable, monotonically increasing identity.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> VariableKind {
        self.0.kind
    }

    /// Whether this variable is a caller-visible external unknown.
    pub fn is_external(&self) -> bool {
        matches!(self.0.kind, VariableKind::Regular)
    }

    /// Whether this variable may be pivoted into the basis.
    pub fn is_pivotable(&self) -> bool {
        matches!(self.0.kind, VariableKind::Slack)
    }

    /// Whether this variable is restricted to non-negative values.
    pub fn is_restricted(&self) -> bool {
        matches!(self.0.kind, VariableKind::Dummy | VariableKind::Slack)
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.0.kind, VariableKind::Dummy)
    }

    /// The current numeric value, as last committed by the solver.
    pub fn value(&self) -> f64 {
        self.0.value.get()
    }

    /// Set the current numeric value. Called by the solver when committing
    /// a solution; callers must not mutate this directly (spec §5).
    pub fn set_value(&self, value: f64) {
        self.0.value.set(value);
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.0.prefix.as_deref()
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable(#{}", self.0.id)?;
        if let Some(prefix) = &self.0.prefix {
            write!(f, " {prefix}")?;
        }
        if let Some(name) = &self.0.name {
            write!(f, ".{name}")?;
        }
        write!(f, " = {:?})", self.0.value.get())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.prefix, &self.0.name) {
            (Some(prefix), Some(name)) => write!(f, "{prefix}.{name}"),
            (None, Some(name)) => write!(f, "{name}"),
            _ => write!(f, "v{}", self.0.id),
        }
    }
}
