use thiserror::Error;

/// The class of token the parser was expecting when it failed.
///
/// Mirrors `VflError` in `gtkconstraintvflparserprivate.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidSymbol,
    InvalidAttribute,
    InvalidView,
    InvalidMetric,
    InvalidPriority,
    InvalidRelation,
}

/// A VFL parse failure, with a byte offset and range into the failing line.
#[derive(Debug, Clone, Error)]
#[error("{message} (at offset {offset}, range {range})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub range: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, offset: usize, range: usize, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            offset,
            range,
            message: message.into(),
        }
    }
}
