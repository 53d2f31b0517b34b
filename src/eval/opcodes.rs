//! Bytecode: the instruction set and compiled function templates.

use std::fmt::Write;
use std::rc::Rc;

use crate::data::{Arity, Storage, Value};

/// One VM instruction.
///
/// Stack slots named by `Local` are relative to the frame base, which is
/// the slot of the first argument. The function being run sits just
/// below the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Push a constant.
    Const(usize),
    /// Push the value in a global box (a constant); unbound is an error.
    Global(usize),
    /// Store the top of the stack into a global box, leaving it in place.
    SetGlobal(usize),
    /// Push the function in a function-namespace box (a constant).
    Function(usize),
    Local(usize),
    SetLocal(usize),
    /// Push a value captured by the running closure.
    Capture(usize),
    SetCapture(usize),
    Dup,
    Pop,
    /// Discard this many values from the top.
    Drop(usize),
    /// Discard this many values from under the top one.
    Shift(usize),
    Jump(usize),
    /// Pop; jump if it was nil.
    JumpIfNil(usize),
    /// Pop `captures` values and make a closure of template `template`
    /// that holds them.
    Closure { template: usize, captures: usize },
    /// Call the function under the top `n` values with those values as
    /// arguments, replacing all of them with the result.
    Call(usize),
    Return,
}

impl Op {
    /// Net change in stack depth.
    pub fn stack_effect(&self) -> isize {
        match *self {
            Op::Const(_)
            | Op::Global(_)
            | Op::Function(_)
            | Op::Local(_)
            | Op::Capture(_)
            | Op::Dup => 1,
            Op::SetGlobal(_) | Op::SetLocal(_) | Op::SetCapture(_) => 0,
            Op::Pop | Op::JumpIfNil(_) => -1,
            Op::Drop(n) | Op::Shift(n) | Op::Call(n) => -(n as isize),
            Op::Jump(_) | Op::Return => 0,
            Op::Closure { captures, .. } => 1 - captures as isize,
        }
    }
}

/// A compiled function body, shared by every closure made from it.
#[derive(Debug)]
pub struct Code {
    pub name: Value,
    pub arity: Arity,
    pub ops: Vec<Op>,
    pub constants: Vec<Value>,
    /// Bodies of the lambdas that appear in this one.
    pub templates: Vec<Rc<Code>>,
}

impl Code {
    /// Visit every heap value the code refers to, including nested templates.
    pub fn for_each_value(&self, f: &mut dyn FnMut(Value)) {
        let mut pending = vec![self];
        while let Some(code) = pending.pop() {
            f(code.name);
            code.constants.iter().copied().for_each(&mut *f);
            pending.extend(code.templates.iter().map(Rc::as_ref));
        }
    }

    /// Human-readable listing of the code and its nested templates.
    pub fn disassemble(&self, store: &Storage) -> String {
        let mut out = String::new();
        self.disassemble_into(store, &mut out, 0);
        out
    }

    fn disassemble_into(&self, store: &Storage, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        let _ = writeln!(
            out,
            "{pad}{} ({} arguments):",
            store.display(self.name),
            self.arity
        );
        for (pc, op) in self.ops.iter().enumerate() {
            let _ = write!(out, "{pad}{pc:5}  {op:?}");
            match *op {
                Op::Const(i) | Op::Global(i) | Op::SetGlobal(i) | Op::Function(i) => {
                    if let Some(&v) = self.constants.get(i) {
                        let _ = write!(out, "\t; {}", store.display(v));
                    }
                }
                _ => (),
            }
            out.push('\n');
        }
        for (i, template) in self.templates.iter().enumerate() {
            let _ = writeln!(out, "{pad}template {i}:");
            template.disassemble_into(store, out, indent + 4);
        }
    }
}
