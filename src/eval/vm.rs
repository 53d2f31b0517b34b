//! The bytecode interpreter.
//!
//! A call puts the callee and its arguments on the operand stack; the
//! arguments become the first local slots of the new frame, and the callee
//! stays just below them (keeping it rooted) until the call returns.

use std::rc::Rc;

use super::opcodes::{Code, Op};
use super::{Builtin, EvalEnvironment};
use crate::data::{Arity, Function, FunctionBody, Storage, Value};
use crate::error::{Error, Result};

/// Maximum depth of nested compiled calls.
pub const MAX_FRAMES: usize = 10_000;

#[derive(Debug)]
pub(super) struct Frame {
    function: Value,
    code: Rc<Code>,
    pc: usize,
    /// Operand-stack index of the first argument.
    base: usize,
}

enum Callee {
    Builtin(Builtin),
    Compiled(Rc<Code>),
}

/// Printable name of a function object.
fn function_name(store: &Storage, f: Value) -> String {
    match store.heap().function(f).map(|f| f.name) {
        Ok(name @ Value::Symbol(_)) => store.display(name),
        _ => "anonymous".to_owned(),
    }
}

/// Run the function under the top `nargs` stack values, leaving its result
/// in their place.
pub(super) fn call_on_stack(env: &EvalEnvironment, nargs: usize) -> Result<Value> {
    let store = env.store();
    let entry = env.frames.borrow().len();
    if entry == 0 {
        env.traceback.replace(None);
    }
    let callee_slot = store
        .stack_len()
        .checked_sub(nargs + 1)
        .ok_or_else(|| Error::HeapCorruption("operand stack underflow".to_owned()))?;

    let result = invoke(env, nargs).and_then(|()| run(env, entry));
    match result {
        Ok(()) => store.pop(),
        Err(e) => {
            record_traceback(env, None);
            env.frames.borrow_mut().truncate(entry);
            store.truncate(callee_slot);
            Err(e)
        }
    }
}

/// Note the active functions, unless a deeper error already did.
fn record_traceback(env: &EvalEnvironment, innermost: Option<String>) {
    if env.traceback.borrow().is_some() {
        return;
    }
    let functions: Vec<Value> = env.frames.borrow().iter().map(|f| f.function).collect();
    let mut names: Vec<String> = functions
        .into_iter()
        .map(|f| function_name(env.store(), f))
        .collect();
    names.extend(innermost);
    env.traceback.replace(Some(names));
}

/// Start a call. Builtins run to completion; compiled functions get a new
/// frame that `run` picks up.
fn invoke(env: &EvalEnvironment, nargs: usize) -> Result<()> {
    let store = env.store();
    let callee_slot = store
        .stack_len()
        .checked_sub(nargs + 1)
        .ok_or_else(|| Error::HeapCorruption("operand stack underflow".to_owned()))?;
    let f = store.stack_get(callee_slot)?;
    if !f.is_function() {
        return Err(Error::Type(format!(
            "{} is not a function",
            store.display(f)
        )));
    }
    let (arity, callee) = {
        let heap = store.heap();
        let function = heap.function(f)?;
        let callee = match &function.body {
            FunctionBody::Builtin(b) => Callee::Builtin(*b),
            FunctionBody::Compiled { code, .. } => Callee::Compiled(code.clone()),
        };
        (function.arity, callee)
    };
    if !arity.accepts(nargs) {
        return Err(Error::Arity(format!(
            "{}: expected {arity} arguments, got {nargs}",
            function_name(store, f)
        )));
    }

    match callee {
        Callee::Builtin(builtin) => {
            let args = store.stack_from(callee_slot + 1);
            let result = builtin(env, &args).map_err(|e| {
                record_traceback(env, Some(function_name(store, f)));
                e
            })?;
            store.truncate(callee_slot);
            store.push(result);
        }
        Callee::Compiled(code) => {
            if let Arity::AtLeast(fixed) = arity {
                let rest_from = callee_slot + 1 + fixed;
                let rest = store.list(&store.stack_from(rest_from))?;
                store.truncate(rest_from);
                store.push(rest);
            }
            let mut frames = env.frames.borrow_mut();
            if frames.len() >= MAX_FRAMES {
                return Err(Error::OutOfMemory("stack overflow".to_owned()));
            }
            frames.push(Frame {
                function: f,
                code,
                pc: 0,
                base: callee_slot + 1,
            });
        }
    }
    Ok(())
}

/// What the dispatch loop fetched: the op and the context it needs.
struct Fetched {
    op: Op,
    function: Value,
    base: usize,
    constant: Value,
}

fn fetch(env: &EvalEnvironment) -> Result<Fetched> {
    let mut frames = env.frames.borrow_mut();
    let frame = frames
        .last_mut()
        .ok_or_else(|| Error::HeapCorruption("no frame to run".to_owned()))?;
    let op = *frame
        .code
        .ops
        .get(frame.pc)
        .ok_or_else(|| Error::HeapCorruption("ran off the end of the code".to_owned()))?;
    frame.pc += 1;
    let constant = match op {
        Op::Const(i) | Op::Global(i) | Op::SetGlobal(i) | Op::Function(i) => frame
            .code
            .constants
            .get(i)
            .copied()
            .ok_or_else(|| Error::HeapCorruption(format!("no constant {i}")))?,
        _ => Value::Nil,
    };
    Ok(Fetched {
        op,
        function: frame.function,
        base: frame.base,
        constant,
    })
}

fn jump(env: &EvalEnvironment, target: usize) -> Result<()> {
    env.frames
        .borrow_mut()
        .last_mut()
        .ok_or_else(|| Error::HeapCorruption("no frame to jump in".to_owned()))?
        .pc = target;
    Ok(())
}

/// Contents of a namespace box, or an error naming the unbound symbol.
fn unbox(store: &Storage, cell: Value, what: &str) -> Result<Value> {
    match store.uncons(cell)? {
        (name, Value::Unbound) => Err(Error::Unbound(format!(
            "{what}: {}",
            store.display(name)
        ))),
        (_, v) => Ok(v),
    }
}

/// Dispatch until the frame stack is back down to `entry` frames.
fn run(env: &EvalEnvironment, entry: usize) -> Result<()> {
    let store = env.store();
    while env.frames.borrow().len() > entry {
        let Fetched {
            op,
            function,
            base,
            constant,
        } = fetch(env)?;
        match op {
            Op::Const(_) => store.push(constant),
            Op::Global(_) => store.push(unbox(store, constant, "loaded undefined")?),
            Op::SetGlobal(_) => store.set_cdr(constant, store.peek(0)?)?,
            Op::Function(_) => store.push(unbox(store, constant, "undefined function")?),
            Op::Local(slot) => store.push(store.stack_get(base + slot)?),
            Op::SetLocal(slot) => store.stack_set(base + slot, store.peek(0)?)?,
            Op::Capture(i) => store.push(store.capture(function, i)?),
            Op::SetCapture(i) => store.set_capture(function, i, store.peek(0)?)?,
            Op::Dup => store.push(store.peek(0)?),
            Op::Pop => {
                store.pop()?;
            }
            Op::Drop(n) => store.truncate(store.stack_len().saturating_sub(n)),
            Op::Shift(n) => {
                let top = store.pop()?;
                store.truncate(store.stack_len().saturating_sub(n));
                store.push(top);
            }
            Op::Jump(target) => jump(env, target)?,
            Op::JumpIfNil(target) => {
                if store.pop()?.is_nil() {
                    jump(env, target)?;
                }
            }
            Op::Closure { template, captures } => {
                let code = {
                    let frames = env.frames.borrow();
                    frames
                        .last()
                        .and_then(|f| f.code.templates.get(template))
                        .cloned()
                        .ok_or_else(|| Error::HeapCorruption(format!("no template {template}")))?
                };
                let from = store.stack_len().saturating_sub(captures);
                let closure = store.put_function(Function {
                    name: Value::Nil,
                    arity: code.arity,
                    body: FunctionBody::Compiled {
                        code,
                        captures: store.stack_from(from),
                    },
                })?;
                store.truncate(from);
                store.push(closure);
            }
            Op::Call(n) => invoke(env, n)?,
            Op::Return => {
                let result = store.pop()?;
                env.frames.borrow_mut().pop();
                store.truncate(base.saturating_sub(1));
                store.push(result);
            }
        }
    }
    Ok(())
}
