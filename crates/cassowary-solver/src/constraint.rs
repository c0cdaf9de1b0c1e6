//! The constraint arena.
//!
//! `GtkConstraintSolver` hands callers a raw `GtkConstraintRef *` that stays
//! valid until `remove_constraint`. Spec §9 calls for an arena + generational
//! index instead of a raw pointer, so a stale or alien handle is a detectable
//! no-op rather than a dangling reference.

use cassowary_core::{Expression, Relation, Variable};

/// An opaque handle to a constraint installed in a [`crate::Solver`].
///
/// Valid until the matching `remove_constraint` call, at which point it
/// becomes stale: passing it to any `Solver` method (including the one that
/// removed it, or a different `Solver` entirely) is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintRef {
    index: u32,
    generation: u32,
}

/// The normalization inputs for a constraint, plus the bookkeeping the
/// solver needs for its lifecycle (spec §4.2.2–§4.2.9).
#[derive(Debug)]
pub(crate) struct ConstraintData {
    /// The stay/edit target variable; `None` for a plain `add_constraint`.
    pub variable: Option<Variable>,
    pub relation: Relation,
    /// The constraint's raw (un-normalized) expression, `expr` in `expr
    /// <relation> 0`.
    pub expression: Expression,
    pub weight: f64,
    pub is_stay: bool,
    pub is_edit: bool,
}

#[derive(Debug)]
pub(crate) struct EditInfo {
    pub constraint: ConstraintRef,
    pub eplus: Variable,
    pub eminus: Variable,
    pub prev_constant: f64,
}

#[derive(Debug)]
pub(crate) struct StayInfo {
    pub constraint: ConstraintRef,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<ConstraintData>,
}

/// A generational arena of [`ConstraintData`], addressed by [`ConstraintRef`].
#[derive(Debug, Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Arena {
    pub fn insert(&mut self, data: ConstraintData) -> ConstraintRef {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            self.len += 1;
            return ConstraintRef {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
        });
        self.len += 1;
        ConstraintRef { index, generation: 0 }
    }

    pub fn contains(&self, r: ConstraintRef) -> bool {
        self.slots
            .get(r.index as usize)
            .is_some_and(|slot| slot.generation == r.generation && slot.data.is_some())
    }

    pub fn get(&self, r: ConstraintRef) -> Option<&ConstraintData> {
        self.slots
            .get(r.index as usize)
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    pub fn remove(&mut self, r: ConstraintRef) -> Option<ConstraintData> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index);
        self.len -= 1;
        Some(data)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl std::ops::Index<ConstraintRef> for Arena {
    type Output = ConstraintData;

    fn index(&self, r: ConstraintRef) -> &ConstraintData {
        self.get(r).expect("invalid or stale ConstraintRef")
    }
}
