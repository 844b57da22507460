//! The evaluation loop.
//!
//! [`Interpreter::evaluate`] runs an explicit loop over an
//! `(expression, environment)` pair. Closure application, macro expansion and
//! the tail positions of `if` and `begin` replace that pair and go around the
//! loop again instead of recursing, so tail calls run in constant native stack.
//! Everything else (operands, conditions, `define` values) is a nested
//! `evaluate` and counts against [`EvalConfig::max_eval_depth`].

pub mod environment;

use crate::ast::{Closure, Macro, Value};
use crate::builtinops::{self, NativeProc};
use crate::{ErrorKind, LispError, MAX_EVAL_DEPTH, STACK_GROW_SIZE, STACK_RED_ZONE};
use environment::Environment;
use log::{debug, trace};
use smallvec::SmallVec;
use std::io::{self, Write};
use std::rc::Rc;

/// Evaluated call arguments; most calls have only a few
pub type Args = SmallVec<[Value; 4]>;

/// Runtime limits of an [`Interpreter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Nested non-tail evaluations allowed before `StackOverflow`
    pub max_eval_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Result of a native procedure: either the final value or an expression the
/// evaluation loop should continue with.
#[derive(Debug)]
pub enum Trampoline {
    Return(Value),
    TailCall(Value, Environment),
}

/// Interpreter state: the root environment, limits and the `display` sink
pub struct Interpreter {
    root: Environment,
    config: EvalConfig,
    depth: usize,
    output: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter whose root environment holds every builtin and
    /// `nil`. `display` writes to stdout.
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        let root = Environment::root();
        builtinops::install(&root);
        Interpreter {
            root,
            config,
            depth: 0,
            output: Box::new(io::stdout()),
        }
    }

    /// Send `display` output to `output` instead of stdout
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn root(&self) -> &Environment {
        &self.root
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Register a host procedure in the root environment.
    ///
    /// # Example
    /// ```
    /// use lispcore::{Interpreter, LispError, Value};
    /// use lispcore::builtinops::{Arity, NativeProc};
    /// use lispcore::evaluator::{Trampoline, environment::Environment};
    ///
    /// fn answer(_: &mut Interpreter, _: &[Value], _: &Environment) -> Result<Trampoline, LispError> {
    ///     Ok(Trampoline::Return(Value::Int(42)))
    /// }
    ///
    /// let mut interp = Interpreter::new();
    /// interp.register_native(NativeProc::new("answer", Arity::Exact(0), answer));
    /// // Now (answer) can be called from evaluated expressions
    /// ```
    pub fn register_native(&mut self, native: NativeProc) {
        trace!("registering native procedure {}", native.name);
        self.root
            .set(native.name.clone(), Value::NativeProc(Rc::new(native)));
    }

    /// Evaluate `expr` in `env`
    pub fn evaluate(&mut self, expr: &Value, env: &Environment) -> Result<Value, LispError> {
        if self.depth >= self.config.max_eval_depth {
            debug!(
                "evaluation depth limit {} reached at {expr}",
                self.config.max_eval_depth
            );
            return Err(LispError::at(
                ErrorKind::StackOverflow,
                format!(
                    "Evaluation depth limit exceeded (max: {})",
                    self.config.max_eval_depth
                ),
                expr.location(),
            ));
        }

        // Nested evaluations may be deeper than the calling thread's stack
        // allows; grow it on demand so only the depth counter ends recursion.
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_loop(expr.clone(), env.clone())
        });
        self.depth -= 1;
        result
    }

    /// Evaluate each expression left to right
    pub fn evaluate_all(&mut self, exprs: &[Value], env: &Environment) -> Result<Args, LispError> {
        let mut args = Args::with_capacity(exprs.len());
        for expr in exprs {
            args.push(self.evaluate(expr, env)?);
        }
        Ok(args)
    }

    /// Read `source` and evaluate each top-level form in the root
    /// environment, returning the value of the last one
    #[cfg(feature = "reader")]
    pub fn eval_str(&mut self, source: &str, filename: &str) -> Result<Value, LispError> {
        let forms = crate::parser::read(source, filename)?;
        let root = self.root.clone();
        let mut result = Value::Nil;
        for form in &forms {
            result = self.evaluate(form, &root)?;
        }
        Ok(result)
    }

    fn eval_loop(&mut self, mut expr: Value, mut env: Environment) -> Result<Value, LispError> {
        loop {
            let (head, operands) = match expr {
                atom @ (Value::Nil
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Bigint(_)
                | Value::Float(_)
                | Value::Str(_)
                | Value::Closure(_)
                | Value::Macro(_)
                | Value::NativeProc(_)) => return Ok(atom),

                Value::Reference(ref reference) => {
                    return env.lookup(&reference.name).ok_or_else(|| {
                        LispError::undefined_name(&reference.name, reference.location.clone())
                    });
                }

                Value::Pair(ref cell) => match call_operands(&cell.cdr) {
                    Some(operands) => (cell.car.clone(), operands),
                    None => {
                        return Err(LispError::at(
                            ErrorKind::InternalShapeError,
                            format!("Cannot evaluate dotted form {expr}"),
                            expr.location(),
                        ));
                    }
                },
            };
            let location = expr.location();
            let at_call_site = |err: LispError| err.or_location(location.clone());

            match self.evaluate(&head, &env).map_err(at_call_site)? {
                Value::NativeProc(native) => {
                    match self
                        .apply_native(&native, &operands, &env)
                        .map_err(at_call_site)?
                    {
                        Trampoline::Return(value) => return Ok(value),
                        Trampoline::TailCall(next, next_env) => {
                            expr = next;
                            env = next_env;
                        }
                    }
                }

                Value::Closure(closure) => {
                    let args = self.evaluate_all(&operands, &env).map_err(at_call_site)?;
                    if args.len() != closure.params.len() {
                        return Err(at_call_site(LispError::arity(
                            closure.params.len(),
                            args.len(),
                        )));
                    }
                    env = Environment::new(&closure.params, args, &closure.env);
                    expr = closure.body.clone();
                }

                Value::Macro(mac) => {
                    if operands.len() != mac.params.len() {
                        return Err(at_call_site(LispError::arity(
                            mac.params.len(),
                            operands.len(),
                        )));
                    }
                    let args = self.evaluate_all(&operands, &env).map_err(at_call_site)?;
                    let bindings = Environment::new(&mac.params, args, &env);
                    let expansion = resolve_references(&mac.body, &mac.params, &bindings);
                    trace!("macro expanded to {expansion}");
                    expr = expansion;
                }

                other => {
                    return Err(LispError::at(
                        ErrorKind::NotCallable,
                        format!("Cannot apply {} {other}", other.type_name()),
                        location,
                    ));
                }
            }
        }
    }

    fn apply_native(
        &mut self,
        native: &NativeProc,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Trampoline, LispError> {
        native.arity.validate(operands.len())?;
        if native.evaluate_args {
            let args = self.evaluate_all(operands, env)?;
            (native.func)(self, &args, env)
        } else {
            (native.func)(self, operands, env)
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    // Globally defined closures capture the root scope they are stored in.
    fn drop(&mut self) {
        self.root.clear();
    }
}

/// Operand forms of a call, or `None` when the chain is dotted
fn call_operands(mut node: &Value) -> Option<Args> {
    let mut operands = Args::new();
    loop {
        match node {
            Value::Nil => return Some(operands),
            Value::Pair(cell) => {
                operands.push(cell.car.clone());
                node = &cell.cdr;
            }
            _ => return None,
        }
    }
}

/// Copy `body`, replacing every reference to one of `params` with its value
/// in `bindings`. Other references are left for the caller's environment.
/// Quoted sub-forms are not special: references inside them are replaced too.
fn resolve_references(body: &Value, params: &[Rc<str>], bindings: &Environment) -> Value {
    match body {
        Value::Reference(reference) => {
            if params.contains(&reference.name)
                && let Some(value) = bindings.get(&reference.name)
            {
                value
            } else {
                body.clone()
            }
        }
        Value::Pair(_) => {
            // Walk the spine iteratively, recursing only into the cars
            let mut cells = Vec::new();
            let mut node = body;
            while let Value::Pair(cell) = node {
                cells.push((
                    resolve_references(&cell.car, params, bindings),
                    cell.location.clone(),
                ));
                node = &cell.cdr;
            }
            let tail = resolve_references(node, params, bindings);
            cells
                .into_iter()
                .rev()
                .fold(tail, |cdr, (car, location)| Value::pair_at(car, cdr, location))
        }
        _ => body.clone(),
    }
}

fn parse_params(form: &str, params: &Value) -> Result<Vec<Rc<str>>, LispError> {
    let items = params.list_items().ok_or_else(|| {
        LispError::malformed(form, format!("parameters must be a list, got {params}"))
            .or_location(params.location())
    })?;

    let mut names: Vec<Rc<str>> = Vec::with_capacity(items.len());
    for item in &items {
        let Some(name) = item.reference_name() else {
            return Err(LispError::malformed(
                form,
                format!("parameters must be names, got {item}"),
            ));
        };
        if names.contains(name) {
            return Err(LispError::malformed(
                form,
                format!("duplicate parameter name {name}"),
            )
            .or_location(item.location()));
        }
        names.push(name.clone());
    }
    Ok(names)
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [expr] => Ok(Trampoline::Return(expr.clone())),
        _ => Err(LispError::arity(1, args.len())),
    }
}

/// Evaluate define special form
pub(crate) fn eval_define(
    interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [Value::Reference(reference), expr] => {
            let value = interp.evaluate(expr, env)?;
            debug!("define {} = {value}", reference.name);
            env.set(reference.name.clone(), value);
            Ok(Trampoline::Return(Value::Nil))
        }
        [other, _] => Err(LispError::malformed(
            "define",
            format!("expected a name, got {}", other.type_name()),
        )),
        _ => Err(LispError::arity(2, args.len())),
    }
}

/// Evaluate set! special form: rebinds the name in the scope that owns it
pub(crate) fn eval_set(
    interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [Value::Reference(reference), expr] => {
            let Some(owner) = env.find(&reference.name).cloned() else {
                return Err(LispError::undefined_name(
                    &reference.name,
                    reference.location.clone(),
                ));
            };
            let value = interp.evaluate(expr, env)?;
            owner.set(reference.name.clone(), value);
            Ok(Trampoline::Return(Value::Nil))
        }
        [other, _] => Err(LispError::malformed(
            "set!",
            format!("expected a name, got {}", other.type_name()),
        )),
        _ => Err(LispError::arity(2, args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    _interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [params, body] => {
            // Only fixed-arity parameter lists; no rest parameters.
            let params = parse_params("lambda", params)?;
            Ok(Trampoline::Return(Value::Closure(Rc::new(Closure {
                params,
                body: body.clone(),
                env: env.clone(),
            }))))
        }
        _ => Err(LispError::arity(2, args.len())),
    }
}

/// Evaluate create-macro special form
pub(crate) fn eval_create_macro(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [params, body] => {
            let params = parse_params("create-macro", params)?;
            Ok(Trampoline::Return(Value::Macro(Rc::new(Macro {
                params,
                body: body.clone(),
            }))))
        }
        _ => Err(LispError::arity(2, args.len())),
    }
}

/// Evaluate defmacro special form: `(defmacro name (params...) body)`
pub(crate) fn eval_defmacro(
    _interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [Value::Reference(reference), params, body] => {
            let params = parse_params("defmacro", params)?;
            debug!("defmacro {}", reference.name);
            env.set(
                reference.name.clone(),
                Value::Macro(Rc::new(Macro {
                    params,
                    body: body.clone(),
                })),
            );
            Ok(Trampoline::Return(Value::Nil))
        }
        [other, _, _] => Err(LispError::malformed(
            "defmacro",
            format!("expected a name, got {}", other.type_name()),
        )),
        _ => Err(LispError::arity(3, args.len())),
    }
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [] => Ok(Trampoline::Return(Value::Nil)),
        [effects @ .., last] => {
            for expr in effects {
                interp.evaluate(expr, env)?;
            }
            Ok(Trampoline::TailCall(last.clone(), env.clone()))
        }
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(
    interp: &mut Interpreter,
    args: &[Value],
    env: &Environment,
) -> Result<Trampoline, LispError> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            // No truthiness: the condition must be a boolean
            let branch = match interp.evaluate(condition_expr, env)? {
                Value::Bool(true) => then_expr,
                Value::Bool(false) => else_expr,
                other => {
                    return Err(LispError::type_mismatch(format!(
                        "if condition must be a bool, got {}",
                        other.type_name()
                    ))
                    .or_location(condition_expr.location()));
                }
            };
            Ok(Trampoline::TailCall(branch.clone(), env.clone()))
        }
        _ => Err(LispError::arity(3, args.len())),
    }
}
