//! Tags for Lisp values and heap objects.
//!
//! Object headers store the raw `u8`; this module is the only place that
//! knows the numbering.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Tag {
    Nil = Self::NIL,
    Fixnum = Self::FIXNUM,
    Char = Self::CHAR,
    Unbound = Self::UNBOUND,

    Cons = Self::CONS,
    String = Self::STRING,
    Symbol = Self::SYMBOL,
    Vector = Self::VECTOR,
    Table = Self::TABLE,
    Function = Self::FUNCTION,
}

impl Tag {
    const NIL: u8 = 0;
    const FIXNUM: u8 = 1;
    const CHAR: u8 = 2;
    const UNBOUND: u8 = 3;

    const CONS: u8 = 8;
    const STRING: u8 = 9;
    const SYMBOL: u8 = 10;
    const VECTOR: u8 = 11;
    const TABLE: u8 = 12;
    const FUNCTION: u8 = 13;

    /// Whether values with this tag refer to a heap object.
    pub fn is_heap(self) -> bool {
        (self as u8) >= Self::CONS
    }

    /// Name used in type errors and in printed handles.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Fixnum => "fixnum",
            Tag::Char => "character",
            Tag::Unbound => "unbound",
            Tag::Cons => "cons",
            Tag::String => "string",
            Tag::Symbol => "symbol",
            Tag::Vector => "vector",
            Tag::Table => "hash-table",
            Tag::Function => "function",
        }
    }
}

impl From<Tag> for u8 {
    fn from(value: Tag) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Tag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            Self::NIL => Tag::Nil,
            Self::FIXNUM => Tag::Fixnum,
            Self::CHAR => Tag::Char,
            Self::UNBOUND => Tag::Unbound,
            Self::CONS => Tag::Cons,
            Self::STRING => Tag::String,
            Self::SYMBOL => Tag::Symbol,
            Self::VECTOR => Tag::Vector,
            Self::TABLE => Tag::Table,
            Self::FUNCTION => Tag::Function,
            v => return Err(Error::HeapCorruption(format!("invalid tag value {v}"))),
        })
    }
}
