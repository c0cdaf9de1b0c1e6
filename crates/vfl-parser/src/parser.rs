use std::collections::{HashMap, HashSet};

use cassowary_core::{Relation, Strength};

use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{is_digit, is_ident_continue, is_ident_start, is_space, offset_to_any};
use crate::types::{Attribute, VflConstraint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    fn index(self) -> usize {
        match self {
            Orientation::Horizontal => 0,
            Orientation::Vertical => 1,
        }
    }

    fn default_attribute(self) -> Attribute {
        match self {
            Orientation::Horizontal => Attribute::Width,
            Orientation::Vertical => Attribute::Height,
        }
    }

    fn leading_edge(self) -> Attribute {
        match self {
            Orientation::Horizontal => Attribute::Start,
            Orientation::Vertical => Attribute::Top,
        }
    }

    fn trailing_edge(self) -> Attribute {
        match self {
            Orientation::Horizontal => Attribute::End,
            Orientation::Vertical => Attribute::Bottom,
        }
    }
}

#[derive(Debug, Clone)]
struct Predicate {
    relation: Relation,
    constant: f64,
    multiplier: f64,
    object: Option<String>,
    attr: Attribute,
    priority: Strength,
}

#[derive(Debug, Clone)]
enum Spacing {
    None,
    /// Bare `-` between two elements: the parser's configured default.
    Default,
    /// `-N-`: an explicit literal spacing.
    Explicit(f64),
    /// `-(predicate)-`: only the predicate's resolved constant survives
    /// into the emitted record (spec.md §4.3, SPEC_FULL.md supplement 4).
    Predicate(Predicate),
}

#[derive(Debug, Clone)]
struct ViewNode {
    name: String,
    orientation: Orientation,
    predicates: Vec<Predicate>,
    spacing: Spacing,
    next: Option<usize>,
}

/// Scans Visual Format Language lines into [`VflConstraint`] records.
///
/// Grounded on `GtkConstraintVflParser` (`gtkconstraintvflparser.c`): a
/// single-pass recursive-descent scanner over one line at a time, stateless
/// across calls to [`Parser::parse_line`].
pub struct Parser {
    default_spacing: [f64; 2],
    metrics: HashMap<String, f64>,
    views_set: HashSet<String>,

    views: Vec<ViewNode>,
    leading_super: Option<usize>,
    trailing_super: Option<usize>,
    current: Option<usize>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            default_spacing: [8.0, 8.0],
            metrics: HashMap::new(),
            views_set: HashSet::new(),
            views: Vec::new(),
            leading_super: None,
            trailing_super: None,
            current: None,
        }
    }

    /// Negative values leave that axis's default untouched (8), matching
    /// `gtk_constraint_vfl_parser_set_default_spacing`'s `< 0 ? 8 : spacing`.
    pub fn set_default_spacing(&mut self, horizontal: f64, vertical: f64) {
        if horizontal >= 0.0 {
            self.default_spacing[Orientation::Horizontal.index()] = horizontal;
        }
        if vertical >= 0.0 {
            self.default_spacing[Orientation::Vertical.index()] = vertical;
        }
    }

    pub fn set_metrics(&mut self, metrics: HashMap<String, f64>) {
        self.metrics = metrics;
    }

    /// The view-reference values themselves are never inspected by the
    /// parser (only presence is checked); callers resolve `view1`/`view2`
    /// names back to their own references after parsing.
    pub fn set_views(&mut self, views: impl IntoIterator<Item = String>) {
        self.views_set = views.into_iter().collect();
    }

    fn has_metric(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    fn has_view(&self, name: &str) -> bool {
        self.views_set.contains(name)
    }

    fn clear(&mut self) {
        self.views.clear();
        self.leading_super = None;
        self.trailing_super = None;
        self.current = None;
    }

    /// Parses a single VFL line, replacing any state left by a prior call.
    pub fn parse_line(&mut self, text: &str) -> Result<(), ParseError> {
        self.clear();

        let chars: Vec<char> = text.chars().collect();
        let mut cur = 0usize;

        while cur < chars.len() && is_space(chars[cur]) {
            cur += 1;
        }

        let mut orientation = Orientation::Horizontal;
        if cur < chars.len() && chars[cur] == 'H' {
            cur += 1;
            if chars.get(cur) != Some(&':') {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidSymbol,
                    cur,
                    0,
                    "Expected ':' after horizontal orientation",
                ));
            }
            cur += 1;
        } else if cur < chars.len() && chars[cur] == 'V' {
            orientation = Orientation::Vertical;
            cur += 1;
            if chars.get(cur) != Some(&':') {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidSymbol,
                    cur,
                    0,
                    "Expected ':' after vertical orientation",
                ));
            }
            cur += 1;
        }

        let result = loop {
            if cur >= chars.len() {
                break Ok(());
            }

            let step = match chars[cur] {
                '|' => self.parse_super(cur, orientation),
                '-' => self.parse_spacing(&chars, cur, orientation),
                '[' => self.parse_view(&chars, cur, orientation),
                _ => Ok(cur + 1),
            };

            match step {
                Ok(next) => cur = next,
                Err(err) => break Err(err),
            }

            if self.trailing_super.is_some() {
                break Ok(());
            }
        };

        match &result {
            Ok(()) => tracing::debug!(views = self.views.len(), "vfl line parsed"),
            Err(err) => tracing::debug!(kind = ?err.kind, offset = err.offset, "vfl parse failed: {}", err.message),
        }

        result
    }

    fn push_view(&mut self, node: ViewNode) -> usize {
        let index = self.views.len();
        if let Some(cur) = self.current {
            self.views[cur].next = Some(index);
        }
        self.views.push(node);
        self.current = Some(index);
        index
    }

    fn parse_super(&mut self, cur: usize, orientation: Orientation) -> Result<usize, ParseError> {
        if self.views.is_empty() && self.leading_super.is_none() {
            let index = self.push_view(ViewNode {
                name: "super".to_string(),
                orientation,
                predicates: Vec::new(),
                spacing: Spacing::None,
                next: None,
            });
            self.leading_super = Some(index);
        } else if self.trailing_super.is_none() {
            let index = self.push_view(ViewNode {
                name: "super".to_string(),
                orientation,
                predicates: Vec::new(),
                spacing: Spacing::None,
                next: None,
            });
            self.trailing_super = Some(index);
        } else {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSymbol,
                cur,
                0,
                "Super views can only appear at the beginning and end of the layout, and not multiple times",
            ));
        }

        Ok(cur + 1)
    }

    fn parse_spacing(
        &mut self,
        chars: &[char],
        cur: usize,
        orientation: Orientation,
    ) -> Result<usize, ParseError> {
        let next = chars.get(cur + 1).copied();
        if next.is_none() {
            return Err(ParseError::new(ParseErrorKind::InvalidSymbol, cur, 0, "Unterminated spacing"));
        }
        if self.current.is_none() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSymbol,
                cur,
                0,
                "Spacing cannot be set without a view",
            ));
        }
        let current = self.current.unwrap();

        match next.unwrap() {
            '|' | '[' => {
                self.views[current].spacing = Spacing::Default;
                Ok(cur + 1)
            }
            '(' => {
                let start = cur + 2;
                let (predicate, end) = self.parse_predicate(chars, start, orientation, false)?;
                if chars.get(end) != Some(&')') {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSymbol,
                        end,
                        0,
                        format!("Expected ')' at the end of a predicate, not '{:?}'", chars.get(end)),
                    ));
                }
                let after = end + 1;
                if chars.get(after) != Some(&'-') {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSymbol,
                        after,
                        0,
                        "Explicit spacing must be followed by '-'",
                    ));
                }
                self.views[current].spacing = Spacing::Predicate(predicate);
                Ok(after + 1)
            }
            c if is_digit(c) => {
                let start = cur + 1;
                let (value, end) = parse_number(chars, start).ok_or_else(|| {
                    ParseError::new(ParseErrorKind::InvalidSymbol, start, 0, "Spacing must be a number")
                })?;
                if chars.get(end) != Some(&'-') {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSymbol,
                        start,
                        end - start,
                        "Explicit spacing must be followed by '-'",
                    ));
                }
                self.views[current].spacing = Spacing::Explicit(value);
                Ok(end + 1)
            }
            _ => Err(ParseError::new(
                ParseErrorKind::InvalidSymbol,
                cur,
                0,
                "Spacing can either be '-' or a number",
            )),
        }
    }

    fn parse_view(
        &mut self,
        chars: &[char],
        cur: usize,
        orientation: Orientation,
    ) -> Result<usize, ParseError> {
        let mut end = cur + 1;
        if !chars.get(end).map(|&c| is_ident_start(c)).unwrap_or(false) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidView,
                end,
                0,
                "View identifiers must be valid identifiers",
            ));
        }
        while chars.get(end).map(|&c| is_ident_continue(c)).unwrap_or(false) {
            end += 1;
        }
        if end >= chars.len() {
            return Err(ParseError::new(ParseErrorKind::InvalidSymbol, end, 0, "A view must end with ']'"));
        }

        let name: String = chars[cur + 1..end].iter().collect();
        if !self.has_view(&name) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidView,
                cur + 1,
                end - cur - 1,
                format!("Unable to find view with name '{name}'"),
            ));
        }

        let mut predicates = Vec::new();

        if chars.get(end) == Some(&']') {
            self.push_view(ViewNode {
                name,
                orientation,
                predicates,
                spacing: Spacing::None,
                next: None,
            });
            return Ok(end + 1);
        }

        if chars.get(end) != Some(&'(') {
            return Err(ParseError::new(ParseErrorKind::InvalidSymbol, end, 0, "A predicate must follow a view name"));
        }
        end += 1;

        loop {
            match chars.get(end) {
                None | Some(']') => {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSymbol,
                        end,
                        0,
                        "A predicate on a view must end with ')'",
                    ));
                }
                _ => {}
            }

            let (predicate, next_end) = self.parse_predicate(chars, end, orientation, true)?;
            predicates.push(predicate);
            end = next_end;

            match chars.get(end) {
                Some(',') => {
                    end += 1;
                    continue;
                }
                Some(')') => {
                    end += 1;
                    break;
                }
                other => {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSymbol,
                        end,
                        0,
                        format!("Expected ')' at the end of a predicate, not {other:?}"),
                    ));
                }
            }
        }

        if chars.get(end) != Some(&']') {
            return Err(ParseError::new(ParseErrorKind::InvalidSymbol, end, 0, "Expected ']' at the end of a view"));
        }

        self.push_view(ViewNode {
            name,
            orientation,
            predicates,
            spacing: Spacing::None,
            next: None,
        });

        Ok(end + 1)
    }

    /// `has_subject` is false only for a spacing predicate: spec.md §4.3
    /// forbids a view name as a spacing operand ("we do not allow view
    /// names inside a spacing predicate" — gtkconstraintvflparser.c).
    fn parse_predicate(
        &self,
        chars: &[char],
        cursor: usize,
        orientation: Orientation,
        has_subject: bool,
    ) -> Result<(Predicate, usize), ParseError> {
        let mut end = cursor;

        let relation = if matches!(chars.get(end), Some('=') | Some('>') | Some('<')) {
            let (relation, next) = parse_relation(chars, end)?;
            end = next;
            relation
        } else {
            Relation::Equal
        };

        let mut object = None;
        let mut attr = orientation.default_attribute();
        let mut constant;

        if chars.get(end).map(|&c| is_digit(c)).unwrap_or(false) {
            let (value, next) = parse_number(chars, end).expect("leading digit guarantees a number");
            constant = value;
            end = next;
        } else if chars.get(end).map(|&c| is_ident_start(c)).unwrap_or(false) {
            let name_start = end;
            while chars.get(end).map(|&c| is_ident_continue(c)).unwrap_or(false) {
                end += 1;
            }
            let name: String = chars[name_start..end].iter().collect();

            if !has_subject {
                if !self.has_metric(&name) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidMetric,
                        name_start,
                        end - name_start,
                        format!("Unable to find metric with name '{name}'"),
                    ));
                }
                constant = self.metrics[&name];
            } else if self.has_metric(&name) {
                constant = self.metrics[&name];
            } else if self.has_view(&name) {
                object = Some(name);
                constant = 0.0;
            } else {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidView,
                    name_start,
                    end - name_start,
                    format!("Unable to find view with name '{name}'"),
                ));
            }
        } else {
            return Err(ParseError::new(
                ParseErrorKind::InvalidSymbol,
                end,
                0,
                "Expected constant, view name, or metric",
            ));
        }

        if object.is_some() && chars.get(end) == Some(&'.') {
            end += 1;
            let (parsed_attr, next) = parse_attribute(chars, end)?;
            attr = parsed_attr;
            end = next;
        }

        while chars.get(end).map(|&c| is_space(c)).unwrap_or(false) {
            end += 1;
        }

        let mut multiplier = 1.0;
        if matches!(chars.get(end), Some('*') | Some('/')) {
            let op = chars[end];
            end += 1;
            while chars.get(end).map(|&c| is_space(c)).unwrap_or(false) {
                end += 1;
            }
            let (value, next) = parse_number(chars, end).ok_or_else(|| {
                ParseError::new(ParseErrorKind::InvalidSymbol, end, 0, "Expected a positive number as a multiplier")
            })?;
            end = next;

            if object.is_some() {
                multiplier = if op == '*' { value } else { 1.0 / value };
            } else if op == '*' {
                constant *= value;
            } else {
                constant *= 1.0 / value;
            }
        }

        while chars.get(end).map(|&c| is_space(c)).unwrap_or(false) {
            end += 1;
        }

        if matches!(chars.get(end), Some('+') | Some('-')) {
            let op = chars[end];
            end += 1;
            while chars.get(end).map(|&c| is_space(c)).unwrap_or(false) {
                end += 1;
            }
            let (value, next) = parse_number(chars, end).ok_or_else(|| {
                ParseError::new(ParseErrorKind::InvalidSymbol, end, 0, "Expected positive number as a constant")
            })?;
            end = next;
            constant += if op == '+' { value } else { -value };
        }

        let priority = if chars.get(end) == Some(&'@') {
            end += 1;
            let rest: String = chars[end..].iter().collect();
            if chars.get(end).map(|&c| is_digit(c)).unwrap_or(false) {
                let (value, next) = parse_number(chars, end).expect("leading digit guarantees a number");
                end = next;
                Strength::custom(value)
            } else if rest.starts_with("weak") {
                end += 4;
                Strength::WEAK
            } else if rest.starts_with("medium") {
                end += 6;
                Strength::MEDIUM
            } else if rest.starts_with("strong") {
                end += 6;
                Strength::STRONG
            } else if rest.starts_with("required") {
                end += 8;
                Strength::REQUIRED
            } else {
                let range = offset_to_any(&chars[end..], ",)]").map(|i| i.saturating_sub(1)).unwrap_or(0);
                return Err(ParseError::new(
                    ParseErrorKind::InvalidPriority,
                    end,
                    range,
                    "Priority must be a positive number or one of 'weak', 'medium', 'strong', and 'required'",
                ));
            }
        } else {
            Strength::REQUIRED
        };

        Ok((
            Predicate {
                relation,
                constant,
                multiplier,
                object,
                attr,
                priority,
            },
            end,
        ))
    }

    /// Expands every parsed view/predicate/spacing into flat constraint
    /// records, per `gtk_constraint_vfl_parser_get_constraints`.
    pub fn get_constraints(&self) -> Vec<VflConstraint> {
        let mut out = Vec::new();

        let mut iter = if self.views.is_empty() { None } else { Some(0usize) };
        while let Some(i) = iter {
            let view = &self.views[i];

            for predicate in &view.predicates {
                out.push(VflConstraint {
                    view1: view.name.clone(),
                    attr1: view.orientation.default_attribute(),
                    relation: predicate.relation,
                    view2: predicate.object.clone(),
                    attr2: predicate.object.as_ref().map(|_| predicate.attr),
                    constant: predicate.constant,
                    multiplier: predicate.multiplier,
                    strength: predicate.priority,
                });
            }

            let is_leading = self.leading_super == Some(i);
            let is_before_trailing =
                view.next == self.trailing_super || self.trailing_super == Some(i);

            match &view.spacing {
                Spacing::None => {
                    if let Some(next) = view.next {
                        out.push(VflConstraint {
                            view1: view.name.clone(),
                            attr1: if is_leading { view.orientation.leading_edge() } else { view.orientation.trailing_edge() },
                            relation: Relation::Equal,
                            view2: Some(self.views[next].name.clone()),
                            attr2: Some(if view.next == self.trailing_super {
                                view.orientation.trailing_edge()
                            } else {
                                view.orientation.leading_edge()
                            }),
                            constant: 0.0,
                            multiplier: 1.0,
                            strength: Strength::REQUIRED,
                        });
                    }
                }
                spacing => {
                    let view2 = view.next.map(|n| self.views[n].name.clone()).unwrap_or_else(|| "super".to_string());
                    let attr2 = if is_before_trailing {
                        view.orientation.trailing_edge()
                    } else {
                        view.orientation.leading_edge()
                    };

                    let (constant, relation, strength) = match spacing {
                        Spacing::Predicate(p) => (-p.constant, p.relation, p.priority),
                        Spacing::Default => (-self.default_spacing[view.orientation.index()], Relation::Equal, Strength::REQUIRED),
                        Spacing::Explicit(n) => (-n, Relation::Equal, Strength::REQUIRED),
                        Spacing::None => unreachable!(),
                    };

                    out.push(VflConstraint {
                        view1: view.name.clone(),
                        attr1: if is_leading { view.orientation.leading_edge() } else { view.orientation.trailing_edge() },
                        relation,
                        view2: Some(view2),
                        attr2: Some(attr2),
                        constant,
                        multiplier: 1.0,
                        strength,
                    });
                }
            }

            iter = view.next;
        }

        out
    }
}

fn parse_relation(chars: &[char], cur: usize) -> Result<(Relation, usize), ParseError> {
    match chars.get(cur) {
        Some('=') if chars.get(cur + 1) == Some(&'=') => Ok((Relation::Equal, cur + 2)),
        Some('>') if chars.get(cur + 1) == Some(&'=') => Ok((Relation::GreaterOrEqual, cur + 2)),
        Some('<') if chars.get(cur + 1) == Some(&'=') => Ok((Relation::LessOrEqual, cur + 2)),
        _ => Err(ParseError::new(
            ParseErrorKind::InvalidRelation,
            cur,
            0,
            "Unknown relation; must be one of '==', '>=', or '<='",
        )),
    }
}

fn parse_attribute(chars: &[char], cur: usize) -> Result<(Attribute, usize), ParseError> {
    let rest: String = chars[cur..].iter().collect();
    for (name, attr) in Attribute::ALL {
        if rest.len() >= name.len() && rest[..name.len()].eq_ignore_ascii_case(name) {
            return Ok((*attr, cur + name.len()));
        }
    }

    let range = offset_to_any(&chars[cur..], "*/+-@,)]").map(|i| i.saturating_sub(1)).unwrap_or(0);
    Err(ParseError::new(
        ParseErrorKind::InvalidAttribute,
        cur,
        range,
        "Attribute must be one of 'width', 'height', 'centerX', 'centerY', 'top', \
         'bottom', 'left', 'right', 'start', 'end', 'baseline'",
    ))
}

fn parse_number(chars: &[char], start: usize) -> Option<(f64, usize)> {
    let mut end = start;
    if chars.get(end) == Some(&'-') {
        end += 1;
    }
    let digits_start = end;
    while chars.get(end).map(|&c| is_digit(c)).unwrap_or(false) {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    if chars.get(end) == Some(&'.') && chars.get(end + 1).map(|&c| is_digit(c)).unwrap_or(false) {
        end += 1;
        while chars.get(end).map(|&c| is_digit(c)).unwrap_or(false) {
            end += 1;
        }
    }
    let text: String = chars[start..end].iter().collect();
    text.parse().ok().map(|value| (value, end))
}
