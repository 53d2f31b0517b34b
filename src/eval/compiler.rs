//! Single-pass compiler from forms to bytecode.
//!
//! Special forms: `quote`, `function`, `lambda`, `progn`, `cond`, `let`,
//! `set`, `tagbody`, `go` and `funcall`. Anything else is a call.
//!
//! The form being compiled must stay rooted until the resulting code is
//! owned by a function object; the constants it collects are pieces of
//! the form, interned symbols, or global boxes, all reachable from there.

use std::rc::Rc;

use super::opcodes::{Code, Op};
use super::EvalEnvironment;
use crate::data::{Arity, Storage, Value};
use crate::error::{Error, Result};
use crate::reader::MAX_NESTING;

/// Where a variable lives, from the point of view of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarRef {
    Local(usize),
    Capture(usize),
    Global,
}

/// Tags of an enclosing `tagbody`.
struct TagBody {
    tags: Vec<(Value, usize)>,
    /// Stack depth at the start of the tagbody.
    depth: usize,
}

/// A function body under construction.
struct FunctionState {
    name: Value,
    arity: Arity,
    ops: Vec<Op>,
    constants: Vec<Value>,
    templates: Vec<Rc<Code>>,
    /// Lexical variables in scope, innermost last, with their stack slots.
    locals: Vec<(Value, usize)>,
    /// Outer variables this function captures, and where the enclosing
    /// function finds them.
    captures: Vec<(Value, VarRef)>,
    /// Values on the stack above the frame base.
    depth: usize,
    tagbodies: Vec<TagBody>,
    /// Label targets; `None` until placed.
    labels: Vec<Option<usize>>,
}

impl FunctionState {
    fn new(name: Value, params: &[Value], arity: Arity) -> Self {
        FunctionState {
            name,
            arity,
            ops: Vec::new(),
            constants: Vec::new(),
            templates: Vec::new(),
            locals: params.iter().copied().zip(0..).collect(),
            captures: Vec::new(),
            depth: params.len(),
            tagbodies: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Resolve label ids in jumps to code offsets.
    fn finish(self) -> Result<(Code, Vec<(Value, VarRef)>)> {
        let labels = self.labels;
        let resolve = |label: usize| {
            labels
                .get(label)
                .copied()
                .flatten()
                .ok_or_else(|| Error::Syntax(format!("label {label} was never placed")))
        };
        let ops = self
            .ops
            .into_iter()
            .map(|op| {
                Ok(match op {
                    Op::Jump(l) => Op::Jump(resolve(l)?),
                    Op::JumpIfNil(l) => Op::JumpIfNil(resolve(l)?),
                    op => op,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((
            Code {
                name: self.name,
                arity: self.arity,
                ops,
                constants: self.constants,
                templates: self.templates,
            },
            self.captures,
        ))
    }
}

pub(super) struct Compiler<'a> {
    env: &'a EvalEnvironment,
    store: &'a Storage,
    /// Functions being compiled, outermost first.
    functions: Vec<FunctionState>,
    /// Compound forms entered and not yet finished.
    nesting: usize,
}

/// Compile a top-level form into a function of no arguments.
pub(super) fn compile_toplevel(env: &EvalEnvironment, form: Value) -> Result<Code> {
    let mut compiler = Compiler {
        env,
        store: env.store(),
        functions: vec![FunctionState::new(
            env.syms.toplevel,
            &[],
            Arity::Exactly(0),
        )],
        nesting: 0,
    };
    compiler.compile_expr(form)?;
    compiler.emit(Op::Return);
    let state = compiler
        .functions
        .pop()
        .ok_or_else(|| Error::HeapCorruption("compiler lost its function".to_owned()))?;
    let (code, _) = state.finish()?;
    Ok(code)
}

impl Compiler<'_> {
    fn current(&mut self) -> Result<&mut FunctionState> {
        self.functions
            .last_mut()
            .ok_or_else(|| Error::HeapCorruption("compiling outside of any function".to_owned()))
    }

    fn emit(&mut self, op: Op) {
        if let Some(f) = self.functions.last_mut() {
            f.ops.push(op);
            f.depth = (f.depth as isize + op.stack_effect()).max(0) as usize;
        }
    }

    fn depth(&self) -> usize {
        self.functions.last().map(|f| f.depth).unwrap_or(0)
    }

    fn set_depth(&mut self, depth: usize) {
        if let Some(f) = self.functions.last_mut() {
            f.depth = depth;
        }
    }

    fn new_label(&mut self) -> Result<usize> {
        let f = self.current()?;
        f.labels.push(None);
        Ok(f.labels.len() - 1)
    }

    fn place_label(&mut self, label: usize) -> Result<()> {
        let f = self.current()?;
        let here = f.ops.len();
        *f.labels
            .get_mut(label)
            .ok_or_else(|| Error::Syntax(format!("no label {label}")))? = Some(here);
        Ok(())
    }

    fn constant(&mut self, v: Value) -> Result<usize> {
        let f = self.current()?;
        Ok(match f.constants.iter().position(|&c| c == v) {
            Some(i) => i,
            None => {
                f.constants.push(v);
                f.constants.len() - 1
            }
        })
    }

    fn emit_const(&mut self, v: Value) -> Result<()> {
        let i = self.constant(v)?;
        self.emit(Op::Const(i));
        Ok(())
    }

    /// The elements of a form that must be a proper list.
    fn elements(&self, form: Value, what: &str) -> Result<Vec<Value>> {
        self.store.list_to_vec(form).map_err(|_| {
            Error::Syntax(format!("malformed {what}: {}", self.store.display(form)))
        })
    }

    fn compile_expr(&mut self, form: Value) -> Result<()> {
        match form {
            Value::Symbol(_) if form == self.env.syms.t => self.emit_const(form),
            Value::Symbol(_) => self.compile_load(form),
            Value::Cons(_) => {
                if self.nesting >= MAX_NESTING {
                    return Err(Error::Syntax(format!(
                        "forms nested more than {MAX_NESTING} deep"
                    )));
                }
                self.nesting += 1;
                let result = self.compile_compound(form);
                self.nesting -= 1;
                result
            }
            _ => self.emit_const(form),
        }
    }

    fn compile_compound(&mut self, form: Value) -> Result<()> {
        let (head, _) = self.store.uncons(form)?;
        let env = self.env;
        let syms = &env.syms;
        let args = self.elements(form, "form")?;
        let args = &args[1..];
        match head {
            h if h == syms.quote => self.compile_quote(args),
            h if h == syms.function => self.compile_function(args),
            h if h == syms.lambda => self.compile_lambda(form),
            h if h == syms.progn => self.compile_body(args),
            h if h == syms.cond => self.compile_cond(args),
            h if h == syms.let_ => self.compile_let(args),
            h if h == syms.set => self.compile_set(args),
            h if h == syms.tagbody => self.compile_tagbody(args),
            h if h == syms.go => self.compile_go(args),
            h if h == syms.funcall => match args.split_first() {
                Some((&f, args)) => {
                    self.compile_expr(f)?;
                    self.compile_call(args)
                }
                None => Err(Error::Syntax("funcall needs a function".to_owned())),
            },
            Value::Symbol(_) => {
                match self.resolve(self.functions.len() - 1, head)? {
                    VarRef::Global => self.compile_function_ref(head)?,
                    local => self.emit_load(local, head)?,
                }
                self.compile_call(args)
            }
            Value::Cons(_) if self.store.uncons(head)?.0 == syms.lambda => {
                self.compile_lambda(head)?;
                self.compile_call(args)
            }
            _ => Err(Error::Syntax(format!(
                "cannot call {}",
                self.store.display(head)
            ))),
        }
    }

    /// Arguments, then the call; the callee is already on the stack.
    fn compile_call(&mut self, args: &[Value]) -> Result<()> {
        for &arg in args {
            self.compile_expr(arg)?;
        }
        self.emit(Op::Call(args.len()));
        Ok(())
    }

    fn compile_quote(&mut self, args: &[Value]) -> Result<()> {
        match args {
            [v] => self.emit_const(*v),
            _ => Err(Error::Syntax("quote takes exactly one form".to_owned())),
        }
    }

    fn compile_function(&mut self, args: &[Value]) -> Result<()> {
        match args {
            [name @ Value::Symbol(_)] => self.compile_function_ref(*name),
            [lambda @ Value::Cons(_)] if self.store.uncons(*lambda)?.0 == self.env.syms.lambda => {
                self.compile_lambda(*lambda)
            }
            _ => Err(Error::Syntax(
                "function takes a symbol or a lambda expression".to_owned(),
            )),
        }
    }

    fn compile_function_ref(&mut self, name: Value) -> Result<()> {
        let cell = self.env.function_box(name)?;
        let i = self.constant(cell)?;
        self.emit(Op::Function(i));
        Ok(())
    }

    /// A sequence; the value is that of the last form, or nil.
    fn compile_body(&mut self, forms: &[Value]) -> Result<()> {
        if forms.is_empty() {
            return self.emit_const(Value::Nil);
        }
        for (i, &form) in forms.iter().enumerate() {
            if i > 0 {
                self.emit(Op::Pop);
            }
            self.compile_expr(form)?;
        }
        Ok(())
    }

    fn compile_cond(&mut self, clauses: &[Value]) -> Result<()> {
        let end = self.new_label()?;
        let before = self.depth();
        for &clause in clauses {
            let parts = self.elements(clause, "cond clause")?;
            let Some((&test, body)) = parts.split_first() else {
                return Err(Error::Syntax("empty cond clause".to_owned()));
            };
            let next = self.new_label()?;
            self.compile_expr(test)?;
            if body.is_empty() {
                // The test's value is the clause's value.
                self.emit(Op::Dup);
                self.emit(Op::JumpIfNil(next));
                self.emit(Op::Jump(end));
                self.place_label(next)?;
                self.emit(Op::Pop);
            } else {
                self.emit(Op::JumpIfNil(next));
                self.compile_body(body)?;
                self.emit(Op::Jump(end));
                self.set_depth(before);
                self.place_label(next)?;
            }
        }
        self.emit_const(Value::Nil)?;
        self.place_label(end)
    }

    fn compile_let(&mut self, args: &[Value]) -> Result<()> {
        let Some((&bindings, body)) = args.split_first() else {
            return Err(Error::Syntax("let needs a binding list".to_owned()));
        };
        let mut names = Vec::new();
        for binding in self.elements(bindings, "let bindings")? {
            let (name, init) = match binding {
                Value::Symbol(_) => (binding, Value::Nil),
                Value::Cons(_) => match self.elements(binding, "let binding")?.as_slice() {
                    [name] => (*name, Value::Nil),
                    [name, init] => (*name, *init),
                    _ => {
                        return Err(Error::Syntax(format!(
                            "let expects (var expr) bindings, got {}",
                            self.store.display(binding)
                        )))
                    }
                },
                _ => {
                    return Err(Error::Syntax(format!(
                        "cannot bind {}",
                        self.store.display(binding)
                    )))
                }
            };
            self.check_variable(name)?;
            self.compile_expr(init)?;
            names.push((name, self.depth() - 1));
        }

        // Bindings are parallel: none is visible to the initializers.
        let f = self.current()?;
        let scope = f.locals.len();
        f.locals.extend(names.iter().copied());
        self.compile_body(body)?;
        self.current()?.locals.truncate(scope);
        if !names.is_empty() {
            self.emit(Op::Shift(names.len()));
        }
        Ok(())
    }

    fn check_variable(&self, name: Value) -> Result<()> {
        if !name.is_symbol() || name == self.env.syms.t {
            return Err(Error::Syntax(format!(
                "{} is not a variable name",
                self.store.display(name)
            )));
        }
        Ok(())
    }

    fn compile_set(&mut self, args: &[Value]) -> Result<()> {
        let [name, value] = args else {
            return Err(Error::Syntax("expected (set variable expr)".to_owned()));
        };
        self.check_variable(*name)?;
        self.compile_expr(*value)?;
        match self.resolve(self.functions.len() - 1, *name)? {
            VarRef::Local(slot) => self.emit(Op::SetLocal(slot)),
            VarRef::Capture(i) => self.emit(Op::SetCapture(i)),
            VarRef::Global => {
                let cell = self.env.global_box(*name)?;
                let i = self.constant(cell)?;
                self.emit(Op::SetGlobal(i));
            }
        }
        Ok(())
    }

    fn compile_load(&mut self, name: Value) -> Result<()> {
        let at = self.resolve(self.functions.len() - 1, name)?;
        self.emit_load(at, name)
    }

    fn emit_load(&mut self, at: VarRef, name: Value) -> Result<()> {
        match at {
            VarRef::Local(slot) => self.emit(Op::Local(slot)),
            VarRef::Capture(i) => self.emit(Op::Capture(i)),
            VarRef::Global => {
                let cell = self.env.global_box(name)?;
                let i = self.constant(cell)?;
                self.emit(Op::Global(i));
            }
        }
        Ok(())
    }

    /// Find `name` as seen from function `level`, adding captures to every
    /// function between its definition and `level`.
    fn resolve(&mut self, level: usize, name: Value) -> Result<VarRef> {
        let f = self
            .functions
            .get(level)
            .ok_or_else(|| Error::HeapCorruption(format!("no function at level {level}")))?;
        if let Some(&(_, slot)) = f.locals.iter().rev().find(|(n, _)| *n == name) {
            return Ok(VarRef::Local(slot));
        }
        if let Some(i) = f.captures.iter().position(|(n, _)| *n == name) {
            return Ok(VarRef::Capture(i));
        }
        if level == 0 {
            return Ok(VarRef::Global);
        }
        Ok(match self.resolve(level - 1, name)? {
            VarRef::Global => VarRef::Global,
            outer => {
                let captures = &mut self.functions[level].captures;
                captures.push((name, outer));
                VarRef::Capture(captures.len() - 1)
            }
        })
    }

    /// `(lambda (params... [&rest name]) body...)`
    fn compile_lambda(&mut self, form: Value) -> Result<()> {
        let parts = self.elements(form, "lambda")?;
        let [_, params, body @ ..] = parts.as_slice() else {
            return Err(Error::Syntax("lambda needs a parameter list".to_owned()));
        };
        let params = self.elements(*params, "lambda parameter list")?;
        let (names, arity) = match params.iter().position(|&p| p == self.env.syms.rest) {
            None => (params.clone(), Arity::Exactly(params.len())),
            Some(i) if i + 2 == params.len() => {
                let mut names = params[..i].to_vec();
                names.push(params[i + 1]);
                (names, Arity::AtLeast(i))
            }
            Some(_) => {
                return Err(Error::Syntax(
                    "&rest must be followed by exactly one name".to_owned(),
                ))
            }
        };
        for &name in &names {
            self.check_variable(name)?;
        }
        tracing::trace!("compiling lambda with {} parameters", names.len());

        self.functions
            .push(FunctionState::new(Value::Nil, &names, arity));
        let compiled = self.compile_body(body).map(|()| self.emit(Op::Return));
        let state = self
            .functions
            .pop()
            .ok_or_else(|| Error::HeapCorruption("compiler lost its function".to_owned()))?;
        compiled?;
        let (code, captures) = state.finish()?;

        for &(name, at) in &captures {
            self.emit_load(at, name)?;
        }
        let f = self.current()?;
        f.templates.push(Rc::new(code));
        let template = f.templates.len() - 1;
        self.emit(Op::Closure {
            template,
            captures: captures.len(),
        });
        Ok(())
    }

    fn compile_tagbody(&mut self, items: &[Value]) -> Result<()> {
        let mut tags: Vec<(Value, usize)> = Vec::new();
        for &item in items {
            if matches!(item, Value::Symbol(_) | Value::Fixnum(_)) {
                if tags.iter().any(|&(t, _)| t == item) {
                    return Err(Error::Syntax(format!(
                        "duplicate tag {} in tagbody",
                        self.store.display(item)
                    )));
                }
                tags.push((item, self.new_label()?));
            }
        }
        let depth = self.depth();
        self.current()?.tagbodies.push(TagBody {
            tags: tags.clone(),
            depth,
        });
        let compiled = self.tagbody_items(items, &tags);
        self.current()?.tagbodies.pop();
        compiled?;
        self.emit_const(Value::Nil)
    }

    fn tagbody_items(&mut self, items: &[Value], tags: &[(Value, usize)]) -> Result<()> {
        for &item in items {
            match tags.iter().find(|&&(t, _)| t == item) {
                Some(&(_, label)) => self.place_label(label)?,
                None => {
                    self.compile_expr(item)?;
                    self.emit(Op::Pop);
                }
            }
        }
        Ok(())
    }

    fn compile_go(&mut self, args: &[Value]) -> Result<()> {
        let [tag] = args else {
            return Err(Error::Syntax("expected (go tag)".to_owned()));
        };
        let f = self.current()?;
        let target = f
            .tagbodies
            .iter()
            .rev()
            .find_map(|tb| {
                tb.tags
                    .iter()
                    .find(|&&(t, _)| t == *tag)
                    .map(|&(_, label)| (label, tb.depth))
            });
        let Some((label, depth)) = target else {
            return Err(Error::Syntax(format!(
                "no tag {} in an enclosing tagbody",
                self.store.display(*tag)
            )));
        };
        let before = self.depth();
        if before < depth {
            return Err(Error::Syntax("jump up the stack too far".to_owned()));
        }
        if before > depth {
            self.emit(Op::Drop(before - depth));
        }
        self.emit(Op::Jump(label));
        // Never reached; keeps the form's value accounting uniform.
        self.set_depth(before);
        self.emit_const(Value::Nil)
    }
}
