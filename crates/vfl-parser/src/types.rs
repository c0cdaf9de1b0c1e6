use std::fmt;

use cassowary_core::{Relation, Strength};

/// A constrainable edge of a view, per spec.md §4.3's `attribute` grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Width,
    Height,
    CenterX,
    CenterY,
    Top,
    Bottom,
    Left,
    Right,
    Start,
    End,
    Baseline,
}

impl Attribute {
    /// Longest-name-first, matching `valid_attributes` in
    /// `gtkconstraintvflparser.c` (so `top` doesn't shadow a longer name
    /// sharing its prefix, though none currently do).
    pub(crate) const ALL: &'static [(&'static str, Attribute)] = &[
        ("baseline", Attribute::Baseline),
        ("centerX", Attribute::CenterX),
        ("centerY", Attribute::CenterY),
        ("bottom", Attribute::Bottom),
        ("height", Attribute::Height),
        ("right", Attribute::Right),
        ("start", Attribute::Start),
        ("width", Attribute::Width),
        ("left", Attribute::Left),
        ("top", Attribute::Top),
        ("end", Attribute::End),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Width => "width",
            Attribute::Height => "height",
            Attribute::CenterX => "centerX",
            Attribute::CenterY => "centerY",
            Attribute::Top => "top",
            Attribute::Bottom => "bottom",
            Attribute::Left => "left",
            Attribute::Right => "right",
            Attribute::Start => "start",
            Attribute::End => "end",
            Attribute::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted constraint record, per spec.md §4.3's `get_constraints` contract.
///
/// `view2`/`attr2` are `None` when the right-hand side is a bare constant.
/// The super-view is named literally `"super"`.
#[derive(Debug, Clone, PartialEq)]
pub struct VflConstraint {
    pub view1: String,
    pub attr1: Attribute,
    pub relation: Relation,
    pub view2: Option<String>,
    pub attr2: Option<Attribute>,
    pub constant: f64,
    pub multiplier: f64,
    pub strength: Strength,
}
