//! Support for reading Lisp expressions from strings.

use std::io::ErrorKind;

use crate::data::{Storage, Value};

mod parse;
mod token;

pub use parse::{Reader, MAX_NESTING};
pub use token::{
    char_from_name, char_name, classifies_as_symbol, is_terminator, read_integer, reads_as_symbol,
};

/// Parse the string as a list of Lisp expressions (i.e. a body).
///
/// The list is not rooted.
pub fn parse_body(store: &Storage, input: &[u8]) -> ReadResult<Value> {
    Reader::new(store, input).read_all()
}

/// Parse the first expression in the string; `None` if there is none.
pub fn parse_first(store: &Storage, input: &[u8]) -> ReadResult<Option<Value>> {
    Reader::new(store, input).read()
}

/// Error type if a read does not complete.
///
/// A reader may experience a true tokenizing/parsing error, e.g. "())", that no additional input can fix.
/// This is distinct from a reader that gets an unexpected end-of-input, e.g. "(()":
/// it may be that more input will fix the issue.
///
/// If input is coming in interactively, this is a useful distinction;
/// in the first case, we'd want to indicate an error to the user,
/// while in the latter we'd like to prompt the user for more input.
///
/// Building values can also fail for reasons that have nothing to do with
/// the input (the heap is full); those arrive as `Fault`.
#[derive(Debug, Clone)]
pub enum ReadErr {
    Error(String),
    Incomplete(String),
    Fault(crate::error::Error),
}

impl std::fmt::Display for ReadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            ReadErr::Error(e) => write!(f, "error in input: {e}"),
            ReadErr::Incomplete(e) => write!(f, "incomplete input: {e}"),
            ReadErr::Fault(e) => write!(f, "{e}"),
        }
    }
}

impl ReadErr {
    /// Add additional context to an error.
    pub fn annotate(self, more: impl AsRef<str>) -> Self {
        match self {
            ReadErr::Error(e) => ReadErr::Error(format!("{}: {}", more.as_ref(), e)),
            ReadErr::Incomplete(e) => ReadErr::Incomplete(format!("{}: {}", more.as_ref(), e)),
            ReadErr::Fault(e) => ReadErr::Fault(e.annotate(more)),
        }
    }
}

/// The main result type for this module:
/// a T (token, expression, etc), or an error, or incomplete.
pub type ReadResult<T> = Result<T, ReadErr>;

impl From<crate::error::Error> for ReadErr {
    fn from(value: crate::error::Error) -> Self {
        ReadErr::Fault(value)
    }
}

impl From<ReadErr> for crate::error::Error {
    fn from(value: ReadErr) -> Self {
        match value {
            ReadErr::Error(s) => crate::error::Error::Syntax(s),
            ReadErr::Incomplete(s) => crate::error::Error::Syntax(format!("incomplete input: {s}")),
            ReadErr::Fault(e) => e,
        }
    }
}

impl From<ReadErr> for std::io::Error {
    fn from(value: ReadErr) -> Self {
        match value {
            ReadErr::Incomplete(s) => std::io::Error::new(ErrorKind::BrokenPipe, s),
            ReadErr::Error(s) => std::io::Error::new(ErrorKind::InvalidInput, s),
            ReadErr::Fault(e) => std::io::Error::new(ErrorKind::Other, e),
        }
    }
}
