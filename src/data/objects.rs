//! Lisp values and the objects they refer to.

use std::rc::Rc;

use super::containers::Buffer;
use super::table::Table;
use super::tag::Tag;
use crate::eval::{Builtin, Code};

pub type Fixnum = i64;

/// Index of an object in the heap arena.
///
/// A `Ptr` says nothing about liveness; `Storage` checks the slot on every access.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ptr(u32);

impl Ptr {
    pub(super) fn new(idx: u32) -> Self {
        Ptr(idx)
    }

    #[inline]
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

/// A Lisp value.
///
/// Fixnums and characters are immediate. Every other variant except
/// `Nil` and `Unbound` is a handle to a heap object; copying the handle
/// aliases the object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Value {
    #[default]
    Nil,
    Fixnum(Fixnum),
    Char(u8),
    /// Contents of a global box that has never been assigned.
    Unbound,
    Cons(Ptr),
    String(Ptr),
    Symbol(Ptr),
    Vector(Ptr),
    Table(Ptr),
    Function(Ptr),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Fixnum(_) => Tag::Fixnum,
            Value::Char(_) => Tag::Char,
            Value::Unbound => Tag::Unbound,
            Value::Cons(_) => Tag::Cons,
            Value::String(_) => Tag::String,
            Value::Symbol(_) => Tag::Symbol,
            Value::Vector(_) => Tag::Vector,
            Value::Table(_) => Tag::Table,
            Value::Function(_) => Tag::Function,
        }
    }

    /// The heap object this value refers to, if any.
    pub fn ptr(&self) -> Option<Ptr> {
        match *self {
            Value::Cons(p)
            | Value::String(p)
            | Value::Symbol(p)
            | Value::Vector(p)
            | Value::Table(p)
            | Value::Function(p) => Some(p),
            Value::Nil | Value::Fixnum(_) | Value::Char(_) | Value::Unbound => None,
        }
    }

    /// Rebuild a handle from a pointer and the tag of the object it points at.
    pub(super) fn from_parts(tag: Tag, ptr: Ptr) -> Option<Value> {
        Some(match tag {
            Tag::Cons => Value::Cons(ptr),
            Tag::String => Value::String(ptr),
            Tag::Symbol => Value::Symbol(ptr),
            Tag::Vector => Value::Vector(ptr),
            Tag::Table => Value::Table(ptr),
            Tag::Function => Value::Function(ptr),
            Tag::Nil | Tag::Unbound | Tag::Fixnum | Tag::Char => return None,
        })
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
    #[inline]
    pub fn is_cons(&self) -> bool {
        matches!(self, Value::Cons(_))
    }
    #[inline]
    pub fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_fixnum(&self) -> Option<Fixnum> {
        match self {
            Value::Fixnum(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u8> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    pub fn from_bool(b: bool, t: Value) -> Value {
        if b {
            t
        } else {
            Value::Nil
        }
    }
}

impl From<Fixnum> for Value {
    fn from(value: Fixnum) -> Self {
        Value::Fixnum(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Fixnum(n) => write!(f, "fix:{n}"),
            Value::Char(c) => write!(f, "chr:{c:#04x}"),
            Value::Unbound => write!(f, "unbound"),
            v => match v.ptr() {
                Some(p) => write!(f, "{}#{}", short_tag(v.tag()), p.idx()),
                None => write!(f, "???"),
            },
        }
    }
}

fn short_tag(tag: Tag) -> &'static str {
    match tag {
        Tag::Cons => "obj",
        Tag::String => "str",
        Tag::Symbol => "sym",
        Tag::Vector => "vec",
        Tag::Table => "tbl",
        Tag::Function => "fun",
        _ => "???",
    }
}

/// A cons cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cons {
    pub car: Value,
    pub cdr: Value,
}

impl Cons {
    pub fn cons(car: Value, cdr: Value) -> Cons {
        Cons { car, cdr }
    }
}

/// A symbol; its identity is its handle, its name a string object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: Value,
}

/// How many arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    /// At least this many; the rest arrive as a list (compiled code)
    /// or as extra arguments (builtins).
    AtLeast(usize),
    /// Between the two bounds, inclusive; builtins only.
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exactly(m) => n == m,
            Arity::AtLeast(m) => n >= m,
            Arity::Range(lo, hi) => lo <= n && n <= hi,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(lo, hi) => write!(f, "{lo} to {hi}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Builtin(Builtin),
    /// A closure: shared bytecode plus this closure's captured values.
    Compiled {
        code: Rc<Code>,
        captures: Vec<Value>,
    },
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Value,
    pub arity: Arity,
    pub body: FunctionBody,
}

/// A heap object's payload.
#[derive(Debug, Clone)]
pub enum Object {
    Cons(Cons),
    String(Buffer<u8>),
    Symbol(Symbol),
    Vector(Buffer<Value>),
    Table(Table),
    Function(Function),
}

impl Object {
    pub fn tag(&self) -> Tag {
        match self {
            Object::Cons(_) => Tag::Cons,
            Object::String(_) => Tag::String,
            Object::Symbol(_) => Tag::Symbol,
            Object::Vector(_) => Tag::Vector,
            Object::Table(_) => Tag::Table,
            Object::Function(_) => Tag::Function,
        }
    }

    /// Approximate bytes used by the object and the buffers it owns.
    pub fn footprint(&self) -> usize {
        use std::mem::size_of;
        size_of::<HeapCell>()
            + match self {
                Object::Cons(_) | Object::Symbol(_) => 0,
                Object::String(s) => s.capacity(),
                Object::Vector(v) => v.capacity() * size_of::<Value>(),
                Object::Table(t) => t.capacity() * size_of::<super::table::Slot>(),
                Object::Function(func) => match &func.body {
                    FunctionBody::Builtin(_) => 0,
                    FunctionBody::Compiled { code, captures } => {
                        captures.len() * size_of::<Value>()
                            + code.ops.len() * size_of::<crate::eval::Op>()
                            + code.constants.len() * size_of::<Value>()
                    }
                },
            }
    }

    /// Visit every value this object refers to.
    pub(crate) fn for_each_child(&self, mut f: impl FnMut(Value)) {
        match self {
            Object::Cons(Cons { car, cdr }) => {
                f(*car);
                f(*cdr);
            }
            Object::String(_) => (),
            Object::Symbol(Symbol { name }) => f(*name),
            Object::Vector(v) => v.as_slice().iter().copied().for_each(f),
            Object::Table(t) => t.entries().for_each(|(k, v)| {
                f(k);
                f(v);
            }),
            Object::Function(func) => {
                f(func.name);
                if let FunctionBody::Compiled { code, captures } = &func.body {
                    captures.iter().copied().for_each(&mut f);
                    code.for_each_value(&mut f);
                }
            }
        }
    }
}

impl From<Cons> for Object {
    fn from(value: Cons) -> Self {
        Object::Cons(value)
    }
}

impl From<Function> for Object {
    fn from(value: Function) -> Self {
        Object::Function(value)
    }
}

/// Collector state of a heap object.
///
/// Mark/sweep only uses White and Black (unmarked/marked).
/// The tri-color collector threads its gray queue through `Gray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    White,
    Gray(Option<Ptr>),
    Black,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub tag: u8,
    /// Next object in the all-objects list.
    pub next: Option<Ptr>,
    pub color: Color,
}

#[derive(Debug)]
pub(crate) struct HeapCell {
    pub header: Header,
    pub object: Object,
}
