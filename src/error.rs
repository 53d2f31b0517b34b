//! Errors raised by the runtime.
//!
//! Every failure the runtime can report falls in one of a small number of kinds,
//! so callers (and tests) can tell a malformed program from a runtime fault.
//! The reader keeps its own `ReadErr` so an interactive caller can distinguish
//! "bad input" from "more input needed"; it converts into `Error::Syntax`.

/// An error from reading, compiling, or running Lisp code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed input to the reader or compiler.
    Syntax(String),
    /// An operation was applied to a value with the wrong tag.
    Type(String),
    /// A function was invoked with the wrong number of arguments.
    Arity(String),
    /// Reference to an undefined variable or function.
    Unbound(String),
    /// Out-of-bounds container access.
    Index(String),
    /// The heap (or the call stack) cannot grow any further.
    OutOfMemory(String),
    /// A handle no longer refers to a live object of its type.
    HeapCorruption(String),
    /// Raised by the program itself, via `die`.
    User(String),
}

/// The broad category of an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Type,
    Arity,
    Unbound,
    Index,
    Resource,
    User,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::Type(_) => ErrorKind::Type,
            Error::Arity(_) => ErrorKind::Arity,
            Error::Unbound(_) => ErrorKind::Unbound,
            Error::Index(_) => ErrorKind::Index,
            Error::OutOfMemory(_) | Error::HeapCorruption(_) => ErrorKind::Resource,
            Error::User(_) => ErrorKind::User,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Syntax(m)
            | Error::Type(m)
            | Error::Arity(m)
            | Error::Unbound(m)
            | Error::Index(m)
            | Error::OutOfMemory(m)
            | Error::HeapCorruption(m)
            | Error::User(m) => m,
        }
    }

    /// Add additional context to an error.
    pub fn annotate(self, more: impl AsRef<str>) -> Self {
        let more = more.as_ref();
        match self {
            Error::Syntax(e) => Error::Syntax(format!("{more}: {e}")),
            Error::Type(e) => Error::Type(format!("{more}: {e}")),
            Error::Arity(e) => Error::Arity(format!("{more}: {e}")),
            Error::Unbound(e) => Error::Unbound(format!("{more}: {e}")),
            Error::Index(e) => Error::Index(format!("{more}: {e}")),
            Error::OutOfMemory(e) => Error::OutOfMemory(format!("{more}: {e}")),
            Error::HeapCorruption(e) => Error::HeapCorruption(format!("{more}: {e}")),
            Error::User(e) => Error::User(format!("{more}: {e}")),
        }
    }

    /// Errors after which the heap cannot be trusted; no caller should continue.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Resource
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            Error::Syntax(e) => write!(f, "syntax error: {e}"),
            Error::Type(e) => write!(f, "type error: {e}"),
            Error::Arity(e) => write!(f, "wrong number of arguments: {e}"),
            Error::Unbound(e) => write!(f, "unbound: {e}"),
            Error::Index(e) => write!(f, "index out of bounds: {e}"),
            Error::OutOfMemory(e) => write!(f, "out of memory: {e}"),
            Error::HeapCorruption(e) => write!(f, "heap corruption: {e}"),
            Error::User(e) => write!(f, "error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Convert a missing value into a type error, with a message.
///
/// Accessors return `Option` when the value has the wrong tag;
/// this turns that into something reportable.
pub trait OrTypeError<T> {
    fn or_type_error(self, message: impl AsRef<str>) -> Result<T>;
}

impl<T> OrTypeError<T> for Option<T> {
    fn or_type_error(self, message: impl AsRef<str>) -> Result<T> {
        self.ok_or_else(|| Error::Type(message.as_ref().to_owned()))
    }
}
