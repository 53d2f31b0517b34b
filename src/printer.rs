//! Write Lisp values back out as text that the reader accepts.
//!
//! The walk keeps its own work stack, so deeply nested structures print
//! without deep native recursion. Circular lists print their first lap
//! followed by `...`. A list or vector that contains itself prints
//! `#<cycle>` where it recurs. Structures nested past `MAX_DEPTH` print
//! `...` in place of the deeper levels.

use std::collections::HashSet;

use crate::data::{Heap, Storage, Value};
use crate::error::Result;
use crate::reader::{char_name, classifies_as_symbol, is_terminator, reads_as_symbol};

/// Nesting deeper than this is elided.
pub const MAX_DEPTH: usize = 10_000;

enum Work {
    Value(Value, usize),
    Text(&'static str),
    /// Done printing this list or vector.
    Leave(Value),
    /// Print the car of `cell`, then carry on down the list.
    Elements {
        cell: Value,
        slow: Value,
        count: usize,
        depth: usize,
    },
    /// Continue a list whose last-printed element was followed by `tail`.
    Tail {
        tail: Value,
        slow: Value,
        count: usize,
        depth: usize,
    },
}

/// Append the printed form of `v` to `out`.
pub fn write(store: &Storage, v: Value, out: &mut Vec<u8>) -> Result<()> {
    let heap = store.heap();
    let mut work = vec![Work::Value(v, 0)];
    // Lists and vectors being printed, outermost to innermost.
    let mut open: HashSet<Value> = HashSet::new();
    while let Some(next) = work.pop() {
        match next {
            Work::Text(s) => out.extend_from_slice(s.as_bytes()),
            Work::Leave(v) => {
                open.remove(&v);
            }
            Work::Value(v, depth) => {
                if depth > MAX_DEPTH && v.ptr().is_some() {
                    out.extend_from_slice(b"...");
                    continue;
                }
                if matches!(v, Value::Cons(_) | Value::Vector(_)) && !open.insert(v) {
                    out.extend_from_slice(b"#<cycle>");
                    continue;
                }
                write_value(&heap, v, depth, out, &mut work)?
            }
            Work::Elements {
                cell,
                slow,
                count,
                depth,
            } => {
                let c = heap.cons(cell)?;
                work.push(Work::Tail {
                    tail: c.cdr,
                    slow,
                    count: count + 1,
                    depth,
                });
                work.push(Work::Value(c.car, depth + 1));
            }
            Work::Tail {
                tail,
                slow,
                count,
                depth,
            } => match tail {
                Value::Nil => out.push(b')'),
                Value::Cons(_) => {
                    // The slow cursor moves every other element; if the
                    // list is circular, the fast one catches up with it.
                    let slow = if count % 2 == 0 {
                        heap.cons(slow)?.cdr
                    } else {
                        slow
                    };
                    if tail == slow {
                        out.extend_from_slice(b" ...)");
                    } else {
                        out.push(b' ');
                        work.push(Work::Elements {
                            cell: tail,
                            slow,
                            count,
                            depth,
                        });
                    }
                }
                other => {
                    out.extend_from_slice(b" . ");
                    work.push(Work::Text(")"));
                    work.push(Work::Value(other, depth + 1));
                }
            },
        }
    }
    Ok(())
}

fn write_value(
    heap: &Heap,
    v: Value,
    depth: usize,
    out: &mut Vec<u8>,
    work: &mut Vec<Work>,
) -> Result<()> {
    match v {
        Value::Nil => out.extend_from_slice(b"nil"),
        Value::Fixnum(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::Char(c) => write_char(c, out),
        Value::Unbound => out.extend_from_slice(b"#<unbound>"),
        Value::String(_) => write_string(heap.string(v)?.as_slice(), out),
        Value::Symbol(_) => {
            let name = heap.symbol(v)?.name;
            write_symbol(heap.string(name)?.as_slice(), out)
        }
        Value::Cons(_) => {
            out.push(b'(');
            work.push(Work::Leave(v));
            work.push(Work::Elements {
                cell: v,
                slow: v,
                count: 0,
                depth,
            });
        }
        Value::Vector(_) => {
            out.extend_from_slice(b"#(");
            work.push(Work::Leave(v));
            work.push(Work::Text(")"));
            let items = heap.vector(v)?.as_slice();
            for (i, &item) in items.iter().enumerate().rev() {
                work.push(Work::Value(item, depth + 1));
                if i > 0 {
                    work.push(Work::Text(" "));
                }
            }
        }
        Value::Table(_) => {
            out.extend_from_slice(format!("#<hash-table {}>", heap.table(v)?.len()).as_bytes())
        }
        Value::Function(_) => {
            let name = heap.function(v)?.name;
            out.extend_from_slice(b"#<function ");
            match name {
                Value::Symbol(_) => {
                    let name = heap.symbol(name)?.name;
                    out.extend_from_slice(heap.string(name)?.as_slice());
                }
                _ => out.extend_from_slice(b"anonymous"),
            }
            out.push(b'>');
        }
    }
    Ok(())
}

fn write_char(c: u8, out: &mut Vec<u8>) {
    out.extend_from_slice(b"#\\");
    if let Some(name) = char_name(c) {
        out.extend_from_slice(name.as_bytes());
    } else if !(0x20..=0x7e).contains(&c) {
        out.extend_from_slice(format!("x{c:02x}").as_bytes());
    } else {
        out.push(c);
    }
}

fn write_string(s: &[u8], out: &mut Vec<u8>) {
    out.push(b'"');
    for &c in s {
        if c == b'"' || c == b'\\' {
            out.push(b'\\');
        }
        out.push(c);
    }
    out.push(b'"');
}

fn write_symbol(name: &[u8], out: &mut Vec<u8>) {
    if reads_as_symbol(name) {
        out.extend_from_slice(name);
        return;
    }
    let escape_first = !classifies_as_symbol(name);
    for (i, &c) in name.iter().enumerate() {
        // Escaping the first byte keeps the token from reading as a number.
        if (i == 0 && escape_first) || is_terminator(c) || c == b'\\' {
            out.push(b'\\');
        }
        out.push(c);
    }
}

/// The printed form of `v`.
///
/// Bytes that are not UTF-8 are replaced.
pub fn print_to_string(store: &Storage, v: Value) -> Result<String> {
    let mut out = Vec::new();
    write(store, v, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
