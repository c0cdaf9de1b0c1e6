//! Character-class helpers for the VFL scanner.
//!
//! VFL is an ASCII grammar (`gtkconstraintvflparser.c` scans with
//! `g_ascii_is*`, not the locale-aware `ctype.h` family); these mirror that
//! choice so a view or metric name can't silently pick up a non-ASCII letter.

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

pub fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// The byte offset of the nearest occurrence of any of `tokens` in `rest`,
/// used to size an error's `range` when scanning stops mid-token.
pub fn offset_to_any(rest: &[char], tokens: &str) -> Option<usize> {
    rest.iter().position(|c| tokens.contains(*c))
}
