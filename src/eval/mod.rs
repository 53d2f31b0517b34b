//! Lisp evaluator.
//!
//! This evaluator is based on bytecode. A top-level form is compiled into a
//! function of no arguments, then run by the VM. State lives in three places:
//!
//! -   The _operand stack_, kept in the `Storage` so everything on it is a root.
//!     Arguments and `let` bindings are slots in it.
//! -   The _frame stack_: one entry per active compiled call, holding the
//!     running function, its code, program counter, and operand-stack base.
//! -   The _namespaces_: two hash tables (variables and functions) mapping a
//!     symbol to a _box_, a cons `(symbol . value)`. Compiled code refers to
//!     the box, so a definition made later is seen by code compiled earlier.
//!     A box that was never assigned holds the unbound marker.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::data::{Arity, Function, FunctionBody, Pin, Storage, Value};
use crate::error::{Error, Result};

mod builtins;
mod compiler;
mod opcodes;
#[cfg(test)]
mod stdlib_test;
mod vm;

pub use opcodes::{Code, Op};

/// A Builtin is a native function; it receives its evaluated arguments.
pub type Builtin = fn(eval: &EvalEnvironment, args: &[Value]) -> Result<Value>;

/// Symbols the compiler and builtins look for.
pub(crate) struct Symbols {
    pub quote: Value,
    pub function: Value,
    pub lambda: Value,
    pub progn: Value,
    pub cond: Value,
    pub let_: Value,
    pub set: Value,
    pub tagbody: Value,
    pub go: Value,
    pub funcall: Value,
    pub t: Value,
    pub rest: Value,
    pub toplevel: Value,
    pub eof: Value,
}

impl Symbols {
    fn new(store: &Storage) -> Result<Self> {
        Ok(Symbols {
            quote: store.intern_str("quote")?,
            function: store.intern_str("function")?,
            lambda: store.intern_str("lambda")?,
            progn: store.intern_str("progn")?,
            cond: store.intern_str("cond")?,
            let_: store.intern_str("let")?,
            set: store.intern_str("set")?,
            tagbody: store.intern_str("tagbody")?,
            go: store.intern_str("go")?,
            funcall: store.intern_str("funcall")?,
            t: store.intern_str("t")?,
            rest: store.intern_str("&rest")?,
            toplevel: store.intern_str("*toplevel*")?,
            eof: store.intern_str("+eof+")?,
        })
    }
}

pub struct EvalEnvironment {
    store: Storage,
    globals: Pin,
    functions: Pin,
    pub(crate) syms: Symbols,
    frames: RefCell<Vec<vm::Frame>>,
    traceback: RefCell<Option<Vec<String>>>,
    output: RefCell<Vec<u8>>,
}

impl EvalEnvironment {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Create an environment with the builtins defined.
    pub fn with_config(config: Config) -> Result<Self> {
        let store = Storage::new(config);
        let globals = store.make_table()?;
        let globals = store.pin(globals);
        let functions = store.make_table()?;
        let functions = store.pin(functions);
        let syms = Symbols::new(&store)?;
        let env = EvalEnvironment {
            store,
            globals,
            functions,
            syms,
            frames: Default::default(),
            traceback: Default::default(),
            output: Default::default(),
        };
        for &(name, arity, builtin) in builtins::BUILTINS {
            let sym = env.store.intern_str(name)?;
            let f = env.store.put_function(Function {
                name: sym,
                arity,
                body: FunctionBody::Builtin(builtin),
            })?;
            let f = env.store.root(f);
            let cell = env.function_box(sym)?;
            env.store.set_cdr(cell, f.get())?;
        }
        let eof = env.global_box(env.syms.eof)?;
        env.store.set_cdr(eof, env.syms.eof)?;
        tracing::debug!(
            "environment ready with {} builtins, {} objects",
            builtins::BUILTINS.len(),
            env.store.current_stats().objects
        );
        Ok(env)
    }

    pub fn store(&self) -> &Storage {
        &self.store
    }

    /// The symbol `t`.
    pub fn t(&self) -> Value {
        self.syms.t
    }

    fn namespace_box(&self, namespace: Pin, name: Value) -> Result<Value> {
        let table = self.store.pinned(namespace);
        if let Some(cell) = self.store.table_get(table, name)? {
            return Ok(cell);
        }
        let cell = self.store.root(self.store.cons(name, Value::Unbound)?);
        self.store.table_set(table, name, cell.get())?;
        Ok(cell.get())
    }

    /// The value box of a global variable, created unbound if needed.
    pub(crate) fn global_box(&self, name: Value) -> Result<Value> {
        self.namespace_box(self.globals, name)
    }

    /// The box in the function namespace, created unbound if needed.
    pub(crate) fn function_box(&self, name: Value) -> Result<Value> {
        self.namespace_box(self.functions, name)
    }

    /// The value of a global variable, if it has one.
    pub fn global(&self, name: &str) -> Result<Option<Value>> {
        let sym = self.store.intern_str(name)?;
        let (_, v) = self.store.uncons(self.global_box(sym)?)?;
        Ok(Some(v).filter(|v| *v != Value::Unbound))
    }

    /// Define (or redefine) a function binding.
    pub fn set_function(&self, name: Value, f: Value) -> Result<()> {
        let f = self.store.root(f);
        let cell = self.function_box(name)?;
        self.store.set_cdr(cell, f.get())
    }

    /// The function bound to a symbol; `Unbound` if there is none.
    pub fn function_binding(&self, name: Value) -> Result<Value> {
        let (_, f) = self.store.uncons(self.function_box(name)?)?;
        Ok(f)
    }

    /// Read and evaluate every form in the input; returns the last result.
    pub fn eval_str(&self, input: &str) -> Result<Value> {
        let forms = self.store.root(crate::reader::parse_body(&self.store, input.as_bytes())?);
        let result = self.store.root(Value::Nil);
        for form in self.store.list_to_vec(forms.get())? {
            result.set(self.eval(form)?);
        }
        Ok(result.get())
    }

    /// Evaluate one form.
    pub fn eval(&self, form: Value) -> Result<Value> {
        let form = self.store.root(form);
        let code = compiler::compile_toplevel(self, form.get())?;
        tracing::debug!(
            "compiled {} into {} ops",
            self.store.display(form.get()),
            code.ops.len()
        );
        tracing::trace!("{}", code.disassemble(&self.store));
        let f = self.store.put_function(Function {
            name: self.syms.toplevel,
            arity: Arity::Exactly(0),
            body: FunctionBody::Compiled {
                code: Rc::new(code),
                captures: Vec::new(),
            },
        })?;
        self.call(f, &[])
    }

    /// Call a function with arguments.
    ///
    /// The arguments need not be rooted; they are pushed before anything
    /// allocates.
    pub fn call(&self, f: Value, args: &[Value]) -> Result<Value> {
        self.store.push(f);
        for &arg in args {
            self.store.push(arg);
        }
        vm::call_on_stack(self, args.len())
    }

    /// Names of the functions that were active when the last error was
    /// raised, innermost last. Clears the record.
    pub fn last_traceback(&self) -> Option<Vec<String>> {
        self.traceback.borrow_mut().take()
    }

    /// Output written by `print` and friends since the last call.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    pub(crate) fn write_output(&self, bytes: &[u8]) {
        self.output.borrow_mut().extend_from_slice(bytes);
    }

    /// Bytecode listing of a compiled function.
    pub fn disassemble(&self, f: Value) -> Result<String> {
        match self.store.function(f)?.body {
            FunctionBody::Compiled { code, .. } => Ok(code.disassemble(&self.store)),
            FunctionBody::Builtin(_) => Err(Error::Type(format!(
                "{} is a builtin",
                self.store.display(f)
            ))),
        }
    }
}
