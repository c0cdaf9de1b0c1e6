//! The solver's one fallible public corner: `suggest_value` (spec §4.2.6,
//! §7 "Invalid edit/stay target"). Every other recoverable condition in
//! spec §4.2.11 is logged and absorbed, not propagated — see `SPEC_FULL.md`.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SolverError {
    #[error("suggest_value: solver is not in an edit phase")]
    NotInEditPhase,
    #[error("suggest_value: variable has no edit info (call add_edit_variable first)")]
    NotAnEditVariable,
}
