//! Constraint strength: the soft/required weight hierarchy.

use std::fmt;

/// A packed constraint weight.
///
/// Custom strengths are any positive value up to [`Strength::REQUIRED`];
/// the four symbolic tiers are produced by [`pack`] so that the ordering
/// `required > strong > medium > weak` holds strictly regardless of how
/// many constraints exist at the lower tiers (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Strength(pub(crate) f64);

/// `pack(a, b, c, w) = clamp(a*w, 0, 1000)*1e6 + clamp(b*w, 0, 1000)*1e3 + clamp(c*w, 0, 1000)`
///
/// The positional-weight packing function from spec §3: each of the three
/// tiers gets its own decimal "digit group" with a base of 1000, so no sum
/// of lower-tier weights can ever reach into a higher tier's digit group.
pub fn pack(a: f64, b: f64, c: f64, w: f64) -> f64 {
    fn clamp(x: f64) -> f64 {
        x.clamp(0.0, 1000.0)
    }
    clamp(a * w) * 1_000_000.0 + clamp(b * w) * 1_000.0 + clamp(c * w)
}

impl Strength {
    pub const REQUIRED: Strength = Strength(1_001_001_000.0);
    pub const STRONG: Strength = Strength(1_000_000.0);
    pub const MEDIUM: Strength = Strength(1_000.0);
    pub const WEAK: Strength = Strength(1.0);

    /// A custom strength, clamped to at most [`Strength::REQUIRED`].
    pub fn custom(value: f64) -> Self {
        Strength(value.min(Self::REQUIRED.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_required(self) -> bool {
        self.0 >= Self::REQUIRED.0
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_required() {
            write!(f, "required")
        } else if *self == Self::STRONG {
            write!(f, "strong")
        } else if *self == Self::MEDIUM {
            write!(f, "medium")
        } else if *self == Self::WEAK {
            write!(f, "weak")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The relation of a constraint's normal form `expr <relation> 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::LessOrEqual => "<=",
            Relation::Equal => "==",
            Relation::GreaterOrEqual => ">=",
        })
    }
}
