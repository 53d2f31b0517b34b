//! Native functions.
//!
//! Every builtin receives its arguments already evaluated; they sit on the
//! operand stack for the duration of the call, so they stay rooted while
//! the builtin allocates. Anything new a builtin allocates and then holds
//! across another allocation has to be rooted by the builtin itself.

use crate::data::{Arity, Fixnum, Value};
use crate::error::{Error, Result};
use crate::eval::{Builtin, EvalEnvironment};
use crate::reader::{parse_first, read_integer};

use Arity::{AtLeast, Exactly, Range};

/// The functions defined in every new environment.
pub const BUILTINS: &[(&str, Arity, Builtin)] = &[
    // Conses and lists.
    ("cons", Exactly(2), builtin_cons),
    ("car", Exactly(1), builtin_car),
    ("cdr", Exactly(1), builtin_cdr),
    ("setcar", Exactly(2), builtin_setcar),
    ("setcdr", Exactly(2), builtin_setcdr),
    ("list", AtLeast(0), builtin_list),
    // Arithmetic.
    ("+", AtLeast(0), builtin_add),
    ("-", AtLeast(1), builtin_sub),
    ("*", AtLeast(0), builtin_mul),
    ("quot", Exactly(2), builtin_quot),
    ("rem", Exactly(2), builtin_rem),
    ("logand", AtLeast(0), builtin_logand),
    ("logior", AtLeast(0), builtin_logior),
    ("logxor", AtLeast(0), builtin_logxor),
    ("lognot", Exactly(1), builtin_lognot),
    ("ash", Exactly(2), builtin_ash),
    ("=", AtLeast(1), builtin_num_eq),
    ("<", AtLeast(1), builtin_num_lt),
    (">", AtLeast(1), builtin_num_gt),
    ("<=", AtLeast(1), builtin_num_le),
    (">=", AtLeast(1), builtin_num_ge),
    // Identity, equality, and type predicates.
    ("eq", Exactly(2), builtin_eq),
    ("eql", Exactly(2), builtin_eql),
    ("equal", Exactly(2), builtin_equal),
    ("not", Exactly(1), builtin_not),
    ("null", Exactly(1), builtin_not),
    ("fixnump", Exactly(1), builtin_fixnump),
    ("characterp", Exactly(1), builtin_characterp),
    ("symbolp", Exactly(1), builtin_symbolp),
    ("consp", Exactly(1), builtin_consp),
    ("stringp", Exactly(1), builtin_stringp),
    ("vectorp", Exactly(1), builtin_vectorp),
    ("functionp", Exactly(1), builtin_functionp),
    ("hash-table-p", Exactly(1), builtin_hash_table_p),
    // Conversions.
    ("char-code", Exactly(1), builtin_char_code),
    ("code-char", Exactly(1), builtin_code_char),
    ("int->str", Range(1, 2), builtin_int_to_str),
    ("str->int", Exactly(1), builtin_str_to_int),
    ("symbol-name", Exactly(1), builtin_symbol_name),
    ("intern", Exactly(1), builtin_symbol),
    ("symbol", Exactly(1), builtin_symbol),
    ("string", Exactly(1), builtin_string),
    ("gensym", Range(0, 1), builtin_gensym),
    // Functions.
    ("get-function", Exactly(1), builtin_get_function),
    ("set-function", Exactly(2), builtin_set_function),
    ("get-function-name", Exactly(1), builtin_get_function_name),
    ("set-function-name", Exactly(2), builtin_set_function_name),
    ("apply", AtLeast(2), builtin_apply),
    ("eval", Exactly(1), builtin_eval),
    ("disassemble", Exactly(1), builtin_disassemble),
    // The system.
    ("gc", Exactly(0), builtin_gc),
    ("room", Exactly(0), builtin_room),
    ("objroom", Exactly(1), builtin_objroom),
    ("print", Exactly(1), builtin_print),
    ("prin1", Exactly(1), builtin_prin1),
    ("terpri", Exactly(0), builtin_terpri),
    ("read", Exactly(1), builtin_read),
    ("die", AtLeast(0), builtin_die),
    // Strings and vectors.
    ("make-string", Range(0, 2), builtin_make_string),
    ("make-vector", Range(0, 2), builtin_make_vector),
    ("vector", AtLeast(0), builtin_vector),
    ("strpush", Exactly(2), builtin_strpush),
    ("strpop", Exactly(1), builtin_strpop),
    ("vecpush", Exactly(2), builtin_vecpush),
    ("vecpop", Exactly(1), builtin_vecpop),
    ("char", Exactly(2), builtin_char),
    ("setchar", Exactly(3), builtin_setchar),
    ("vecelt", Exactly(2), builtin_vecelt),
    ("setvecelt", Exactly(3), builtin_setvecelt),
    ("fill-pointer", Exactly(1), builtin_fill_pointer),
    ("set-fill-pointer", Exactly(2), builtin_set_fill_pointer),
    ("length", Exactly(1), builtin_length),
    ("subseq", Range(2, 3), builtin_subseq),
    ("strcat", AtLeast(1), builtin_strcat),
    ("position", Exactly(2), builtin_position),
    ("search", Exactly(2), builtin_search),
    // Hash tables.
    ("make-hash-table", Exactly(0), builtin_make_hash_table),
    ("gethash", Range(2, 3), builtin_gethash),
    ("sethash", Exactly(3), builtin_sethash),
    ("remhash", Exactly(2), builtin_remhash),
    ("hash-table-count", Exactly(1), builtin_hash_table_count),
    ("sxhash", Exactly(1), builtin_sxhash),
];

fn type_error(eval: &EvalEnvironment, who: &str, what: &str, got: Value) -> Error {
    Error::Type(format!(
        "{who}: expected {what}, got {}",
        eval.store().display(got)
    ))
}

fn fixnum(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Fixnum> {
    v.as_fixnum()
        .ok_or_else(|| type_error(eval, who, "a fixnum", v))
}

fn character(eval: &EvalEnvironment, who: &str, v: Value) -> Result<u8> {
    v.as_char()
        .ok_or_else(|| type_error(eval, who, "a character", v))
}

/// A non-negative fixnum used as a position or length.
fn index(eval: &EvalEnvironment, who: &str, v: Value) -> Result<usize> {
    let n = fixnum(eval, who, v)?;
    usize::try_from(n).map_err(|_| Error::Index(format!("{who}: negative index {n}")))
}

fn string_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::String(_) => Ok(v),
        _ => Err(type_error(eval, who, "a string", v)),
    }
}

fn vector_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::Vector(_) => Ok(v),
        _ => Err(type_error(eval, who, "a vector", v)),
    }
}

fn table_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::Table(_) => Ok(v),
        _ => Err(type_error(eval, who, "a hash table", v)),
    }
}

fn symbol_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::Symbol(_) => Ok(v),
        _ => Err(type_error(eval, who, "a symbol", v)),
    }
}

fn function_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::Function(_) => Ok(v),
        _ => Err(type_error(eval, who, "a function", v)),
    }
}

fn boolean(eval: &EvalEnvironment, b: bool) -> Value {
    Value::from_bool(b, eval.t())
}

fn overflow() -> Error {
    Error::OutOfMemory("fixnum overflow".to_owned())
}

fn builtin_cons(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    eval.store().cons(args[0], args[1])
}

fn builtin_car(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    match args[0] {
        v @ (Value::Nil | Value::Cons(_)) => eval.store().car(v),
        v => Err(type_error(eval, "car", "a list", v)),
    }
}

fn builtin_cdr(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    match args[0] {
        v @ (Value::Nil | Value::Cons(_)) => eval.store().cdr(v),
        v => Err(type_error(eval, "cdr", "a list", v)),
    }
}

fn builtin_setcar(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    if !args[0].is_cons() {
        return Err(type_error(eval, "setcar", "a cons", args[0]));
    }
    eval.store().set_car(args[0], args[1])?;
    Ok(args[1])
}

fn builtin_setcdr(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    if !args[0].is_cons() {
        return Err(type_error(eval, "setcdr", "a cons", args[0]));
    }
    eval.store().set_cdr(args[0], args[1])?;
    Ok(args[1])
}

fn builtin_list(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    eval.store().list(args)
}

/// Fold fixnum arguments with a checked operation.
fn fold(
    eval: &EvalEnvironment,
    who: &str,
    init: Fixnum,
    args: &[Value],
    op: impl Fn(Fixnum, Fixnum) -> Option<Fixnum>,
) -> Result<Value> {
    let mut acc = init;
    for &arg in args {
        acc = op(acc, fixnum(eval, who, arg)?).ok_or_else(overflow)?;
    }
    Ok(Value::Fixnum(acc))
}

fn builtin_add(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    fold(eval, "+", 0, args, Fixnum::checked_add)
}

/// With one argument, negation; otherwise the first minus the rest.
fn builtin_sub(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let first = fixnum(eval, "-", args[0])?;
    match &args[1..] {
        [] => first.checked_neg().map(Value::Fixnum).ok_or_else(overflow),
        rest => fold(eval, "-", first, rest, Fixnum::checked_sub),
    }
}

fn builtin_mul(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    fold(eval, "*", 1, args, Fixnum::checked_mul)
}

fn divisor(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Fixnum> {
    match fixnum(eval, who, v)? {
        0 => Err(Error::Type(format!("{who}: division by zero"))),
        n => Ok(n),
    }
}

/// Quotient, truncated toward zero.
fn builtin_quot(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let a = fixnum(eval, "quot", args[0])?;
    let b = divisor(eval, "quot", args[1])?;
    a.checked_div(b).map(Value::Fixnum).ok_or_else(overflow)
}

/// Remainder; takes the sign of the dividend.
fn builtin_rem(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let a = fixnum(eval, "rem", args[0])?;
    let b = divisor(eval, "rem", args[1])?;
    a.checked_rem(b).map(Value::Fixnum).ok_or_else(overflow)
}

fn builtin_logand(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    fold(eval, "logand", -1, args, |a, b| Some(a & b))
}

fn builtin_logior(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    fold(eval, "logior", 0, args, |a, b| Some(a | b))
}

fn builtin_logxor(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    fold(eval, "logxor", 0, args, |a, b| Some(a ^ b))
}

fn builtin_lognot(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(Value::Fixnum(!fixnum(eval, "lognot", args[0])?))
}

/// Arithmetic shift: left for positive counts, right (sign-filling) for
/// negative ones.
fn builtin_ash(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let n = fixnum(eval, "ash", args[0])?;
    let count = fixnum(eval, "ash", args[1])?;
    let shifted = if count >= 0 {
        match u32::try_from(count) {
            Ok(c) if c < Fixnum::BITS => {
                let r = n << c;
                (r >> c == n).then_some(r)
            }
            _ => (n == 0).then_some(0),
        }
    } else {
        let c = count.unsigned_abs().min(u64::from(Fixnum::BITS - 1)) as u32;
        Some(n >> c)
    };
    shifted.map(Value::Fixnum).ok_or_else(overflow)
}

/// Whether every adjacent pair of fixnum arguments satisfies `ok`.
fn compare(
    eval: &EvalEnvironment,
    who: &str,
    args: &[Value],
    ok: impl Fn(Fixnum, Fixnum) -> bool,
) -> Result<Value> {
    let numbers = args
        .iter()
        .map(|&v| fixnum(eval, who, v))
        .collect::<Result<Vec<_>>>()?;
    Ok(boolean(eval, numbers.windows(2).all(|w| ok(w[0], w[1]))))
}

fn builtin_num_eq(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    compare(eval, "=", args, |a, b| a == b)
}

fn builtin_num_lt(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    compare(eval, "<", args, |a, b| a < b)
}

fn builtin_num_gt(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    compare(eval, ">", args, |a, b| a > b)
}

fn builtin_num_le(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    compare(eval, "<=", args, |a, b| a <= b)
}

fn builtin_num_ge(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    compare(eval, ">=", args, |a, b| a >= b)
}

/// Identity; immediates compare by value.
fn builtin_eq(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0] == args[1]))
}

fn builtin_eql(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, eval.store().eql(args[0], args[1])))
}

/// Structural equality of conses, strings, and vectors.
fn builtin_equal(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let same = eval.store().equal(args[0], args[1])?;
    Ok(boolean(eval, same))
}

fn builtin_not(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0].is_nil()))
}

fn builtin_fixnump(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, matches!(args[0], Value::Fixnum(_))))
}

fn builtin_characterp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, matches!(args[0], Value::Char(_))))
}

fn builtin_symbolp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0].is_symbol()))
}

fn builtin_consp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0].is_cons()))
}

fn builtin_stringp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0].is_string()))
}

fn builtin_vectorp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, matches!(args[0], Value::Vector(_))))
}

fn builtin_functionp(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, args[0].is_function()))
}

fn builtin_hash_table_p(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(boolean(eval, matches!(args[0], Value::Table(_))))
}

fn builtin_char_code(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(Value::Fixnum(Fixnum::from(character(eval, "char-code", args[0])?)))
}

fn builtin_code_char(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let code = fixnum(eval, "code-char", args[0])?;
    u8::try_from(code)
        .map(Value::Char)
        .map_err(|_| Error::Type(format!("code-char: {code} is not a character code")))
}

/// `(int->str n &optional radix)`
///
/// Radix 16, 8 and 2 print with the reader's `#x`, `#o` and `#b` prefix,
/// so the result reads back as the same number.
fn builtin_int_to_str(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let n = fixnum(eval, "int->str", args[0])?;
    let radix = match args.get(1) {
        Some(&r) => fixnum(eval, "int->str", r)?,
        None => 10,
    };
    let sign = if n < 0 { "-" } else { "" };
    let magnitude = n.unsigned_abs();
    let text = match radix {
        10 => n.to_string(),
        16 => format!("{sign}#x{magnitude:x}"),
        8 => format!("{sign}#o{magnitude:o}"),
        2 => format!("{sign}#b{magnitude:b}"),
        _ => return Err(Error::Type(format!("int->str: unsupported radix {radix}"))),
    };
    eval.store().put_string(text.as_bytes())
}

/// The number a string spells, in reader syntax; nil if it is not one.
fn builtin_str_to_int(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "str->int", args[0])?;
    let bytes = eval.store().string_bytes(s)?;
    Ok(read_integer(&bytes)?.map(Value::Fixnum).unwrap_or_default())
}

/// A fresh string holding the symbol's name.
fn builtin_symbol_name(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let sym = symbol_arg(eval, "symbol-name", args[0])?;
    let name = eval.store().symbol_bytes(sym)?;
    eval.store().put_string(&name)
}

/// The interned symbol named by a string; symbols are returned as they are.
fn builtin_symbol(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    match args[0] {
        v @ Value::Symbol(_) => Ok(v),
        v @ Value::String(_) => {
            let name = eval.store().string_bytes(v)?;
            eval.store().intern(&name)
        }
        v => Err(type_error(eval, "symbol", "a string or symbol", v)),
    }
}

/// A string from a string (itself), a character, or a symbol (its name).
fn builtin_string(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let store = eval.store();
    match args[0] {
        v @ Value::String(_) => Ok(v),
        Value::Char(c) => store.put_string(&[c]),
        v @ Value::Symbol(_) => {
            let name = store.symbol_bytes(v)?;
            store.put_string(&name)
        }
        v => Err(type_error(eval, "string", "a string, character, or symbol", v)),
    }
}

fn builtin_gensym(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let prefix = match args.first() {
        Some(&p) => {
            let p = string_arg(eval, "gensym", p)?;
            String::from_utf8_lossy(&eval.store().string_bytes(p)?).into_owned()
        }
        None => "g".to_owned(),
    };
    eval.store().gensym(&format!("%{prefix}:"))
}

/// The function bound to a symbol, or nil.
fn builtin_get_function(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let name = symbol_arg(eval, "get-function", args[0])?;
    match eval.function_binding(name)? {
        Value::Unbound => Ok(Value::Nil),
        f => Ok(f),
    }
}

/// Bind a function to a symbol. An anonymous function takes the name.
fn builtin_set_function(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let name = symbol_arg(eval, "set-function", args[0])?;
    let f = function_arg(eval, "set-function", args[1])?;
    if eval.store().function(f)?.name.is_nil() {
        eval.store().set_function_name(f, name)?;
    }
    eval.set_function(name, f)?;
    Ok(f)
}

fn builtin_get_function_name(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let f = function_arg(eval, "get-function-name", args[0])?;
    Ok(eval.store().function(f)?.name)
}

fn builtin_set_function_name(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let f = function_arg(eval, "set-function-name", args[0])?;
    eval.store().set_function_name(f, args[1])?;
    Ok(args[1])
}

/// `(apply f a b ... list)`: call `f` with `a b ...` followed by the
/// elements of `list`.
fn builtin_apply(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let (&last, fixed) = args
        .split_last()
        .ok_or_else(|| Error::Arity("apply: missing argument list".to_owned()))?;
    let mut call_args = fixed[1..].to_vec();
    call_args.extend(
        eval.store()
            .list_to_vec(last)
            .map_err(|_| type_error(eval, "apply", "a proper list", last))?,
    );
    eval.call(fixed[0], &call_args)
}

fn builtin_eval(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    eval.eval(args[0])
}

fn builtin_disassemble(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let f = function_arg(eval, "disassemble", args[0])?;
    let listing = eval.disassemble(f)?;
    eval.write_output(listing.as_bytes());
    Ok(Value::Nil)
}

fn builtin_gc(eval: &EvalEnvironment, _args: &[Value]) -> Result<Value> {
    eval.store().gc()?;
    Ok(Value::Nil)
}

/// Approximate bytes held by the heap.
fn builtin_room(eval: &EvalEnvironment, _args: &[Value]) -> Result<Value> {
    Fixnum::try_from(eval.store().room())
        .map(Value::Fixnum)
        .map_err(|_| overflow())
}

/// Approximate bytes held by one object; nil for immediates.
fn builtin_objroom(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    match eval.store().object_size(args[0])? {
        Some(n) => Fixnum::try_from(n).map(Value::Fixnum).map_err(|_| overflow()),
        None => Ok(Value::Nil),
    }
}

/// Write the printed form and a newline; returns the value.
fn builtin_print(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let mut out = Vec::new();
    crate::printer::write(eval.store(), args[0], &mut out)?;
    out.push(b'\n');
    eval.write_output(&out);
    Ok(args[0])
}

fn builtin_prin1(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let mut out = Vec::new();
    crate::printer::write(eval.store(), args[0], &mut out)?;
    eval.write_output(&out);
    Ok(args[0])
}

fn builtin_terpri(eval: &EvalEnvironment, _args: &[Value]) -> Result<Value> {
    eval.write_output(b"\n");
    Ok(Value::Nil)
}

/// The first form in a string; `+eof+` if there is none.
fn builtin_read(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "read", args[0])?;
    let text = eval.store().string_bytes(s)?;
    Ok(parse_first(eval.store(), &text)?.unwrap_or(eval.syms.eof))
}

/// Raise a user error whose message is the printed arguments.
fn builtin_die(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let message = args
        .iter()
        .map(|&v| match v {
            Value::String(_) => eval
                .store()
                .string_bytes(v)
                .map(|b| String::from_utf8_lossy(&b).into_owned()),
            _ => Ok(eval.store().display(v)),
        })
        .collect::<Result<Vec<_>>>()?
        .join(" ");
    Err(Error::User(message))
}

/// `(make-string &optional length fill)`; the fill defaults to a space.
fn builtin_make_string(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let length = match args.first() {
        Some(&n) => index(eval, "make-string", n)?,
        None => 0,
    };
    let fill = match args.get(1) {
        Some(&c) => character(eval, "make-string", c)?,
        None => b' ',
    };
    eval.store().make_string(length, fill)
}

/// `(make-vector &optional length fill)`; the fill defaults to nil.
fn builtin_make_vector(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let length = match args.first() {
        Some(&n) => index(eval, "make-vector", n)?,
        None => 0,
    };
    eval.store()
        .make_vector(length, args.get(1).copied().unwrap_or_default())
}

fn builtin_vector(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    eval.store().put_vector(args)
}

fn length_value(n: usize) -> Result<Value> {
    Fixnum::try_from(n).map(Value::Fixnum).map_err(|_| overflow())
}

/// Append a character; returns the new length.
fn builtin_strpush(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "strpush", args[0])?;
    let c = character(eval, "strpush", args[1])?;
    length_value(eval.store().string_push(s, c)?)
}

fn builtin_strpop(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "strpop", args[0])?;
    eval.store()
        .string_pop(s)?
        .map(Value::Char)
        .ok_or_else(|| Error::Index("strpop: string is empty".to_owned()))
}

/// Append a value; returns the new length.
fn builtin_vecpush(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let v = vector_arg(eval, "vecpush", args[0])?;
    length_value(eval.store().vector_push(v, args[1])?)
}

fn builtin_vecpop(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let v = vector_arg(eval, "vecpop", args[0])?;
    eval.store()
        .vector_pop(v)?
        .ok_or_else(|| Error::Index("vecpop: vector is empty".to_owned()))
}

fn builtin_char(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "char", args[0])?;
    let i = index(eval, "char", args[1])?;
    Ok(Value::Char(eval.store().string_get(s, i)?))
}

fn builtin_setchar(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "setchar", args[0])?;
    let i = index(eval, "setchar", args[1])?;
    let c = character(eval, "setchar", args[2])?;
    eval.store().string_set(s, i, c)?;
    Ok(args[2])
}

fn builtin_vecelt(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let v = vector_arg(eval, "vecelt", args[0])?;
    let i = index(eval, "vecelt", args[1])?;
    eval.store().vector_get(v, i)
}

fn builtin_setvecelt(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let v = vector_arg(eval, "setvecelt", args[0])?;
    let i = index(eval, "setvecelt", args[1])?;
    eval.store().vector_set(v, i, args[2])?;
    Ok(args[2])
}

fn sequence_arg(eval: &EvalEnvironment, who: &str, v: Value) -> Result<Value> {
    match v {
        Value::String(_) | Value::Vector(_) => Ok(v),
        _ => Err(type_error(eval, who, "a string or vector", v)),
    }
}

fn builtin_fill_pointer(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let seq = sequence_arg(eval, "fill-pointer", args[0])?;
    length_value(eval.store().fill_pointer(seq)?)
}

/// Move the fill pointer; returns the container.
fn builtin_set_fill_pointer(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let seq = sequence_arg(eval, "set-fill-pointer", args[0])?;
    let n = index(eval, "set-fill-pointer", args[1])?;
    eval.store().set_fill_pointer(seq, n)?;
    Ok(seq)
}

/// Length of a string, vector, or proper list.
fn builtin_length(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let store = eval.store();
    match args[0] {
        v @ (Value::String(_) | Value::Vector(_)) => length_value(store.fill_pointer(v)?),
        v @ (Value::Nil | Value::Cons(_)) => length_value(
            store
                .list_to_vec(v)
                .map_err(|_| type_error(eval, "length", "a proper list", v))?
                .len(),
        ),
        v => Err(type_error(eval, "length", "a sequence", v)),
    }
}

/// `(subseq seq start &optional end)`: a copy of part of a string or
/// vector. Bounds are clamped to the sequence.
fn builtin_subseq(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let store = eval.store();
    let seq = sequence_arg(eval, "subseq", args[0])?;
    let len = store.fill_pointer(seq)?;
    let start = fixnum(eval, "subseq", args[1])?.clamp(0, len as Fixnum) as usize;
    let end = match args.get(2) {
        Some(&e) => fixnum(eval, "subseq", e)?.clamp(0, len as Fixnum) as usize,
        None => len,
    }
    .max(start);
    match seq {
        Value::String(_) => store.put_string(&store.string_bytes(seq)?[start..end]),
        _ => store.put_vector(&store.vector_items(seq)?[start..end]),
    }
}

/// Append strings to the first one, in place; returns it.
fn builtin_strcat(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let s = string_arg(eval, "strcat", args[0])?;
    for &more in &args[1..] {
        let more = string_arg(eval, "strcat", more)?;
        let bytes = eval.store().string_bytes(more)?;
        eval.store().string_extend(s, &bytes)?;
    }
    Ok(s)
}

/// `(position seq item)`: index of the first element `eql` to `item`, or nil.
fn builtin_position(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let store = eval.store();
    let seq = sequence_arg(eval, "position", args[0])?;
    let found = match seq {
        Value::String(_) => {
            let c = character(eval, "position", args[1])?;
            store.string_bytes(seq)?.iter().position(|&b| b == c)
        }
        _ => store
            .vector_items(seq)?
            .iter()
            .position(|&v| store.eql(v, args[1])),
    };
    found.map(length_value).unwrap_or(Ok(Value::Nil))
}

/// `(search haystack needle)`: index of the first occurrence, or nil.
fn builtin_search(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let store = eval.store();
    let hay = store.string_bytes(string_arg(eval, "search", args[0])?)?;
    let needle = store.string_bytes(string_arg(eval, "search", args[1])?)?;
    let found = if needle.is_empty() {
        Some(0)
    } else {
        hay.windows(needle.len()).position(|w| w == needle.as_slice())
    };
    found.map(length_value).unwrap_or(Ok(Value::Nil))
}

fn builtin_make_hash_table(eval: &EvalEnvironment, _args: &[Value]) -> Result<Value> {
    eval.store().make_table()
}

/// `(gethash table key &optional default)`
fn builtin_gethash(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let table = table_arg(eval, "gethash", args[0])?;
    Ok(eval
        .store()
        .table_get(table, args[1])?
        .unwrap_or_else(|| args.get(2).copied().unwrap_or_default()))
}

/// `(sethash table key value)`; returns the value.
fn builtin_sethash(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let table = table_arg(eval, "sethash", args[0])?;
    eval.store().table_set(table, args[1], args[2])?;
    Ok(args[2])
}

/// `(remhash table key)`: t if the key was present.
fn builtin_remhash(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let table = table_arg(eval, "remhash", args[0])?;
    let removed = eval.store().table_remove(table, args[1])?;
    Ok(boolean(eval, removed.is_some()))
}

fn builtin_hash_table_count(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    let table = table_arg(eval, "hash-table-count", args[0])?;
    length_value(eval.store().table_count(table)?)
}

fn builtin_sxhash(eval: &EvalEnvironment, args: &[Value]) -> Result<Value> {
    Ok(Value::Fixnum(Fixnum::from(eval.store().hash(args[0])?)))
}
