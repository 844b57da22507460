//! Registry of native procedures.
//!
//! Every name bound in a fresh root environment comes from this table: the
//! arithmetic and comparison primitives, the list primitives, the output
//! procedures and the special forms.
//!
//! ```lisp
//! (+ 1 2)              ; 3
//! (< 1 2.5)            ; #t
//! (equal '(1 2) '(1 2)); #t
//! (car '(1 . 2))       ; 1
//! (display "n =" 42)   ; prints: n = 42
//! ```
//!
//! ## Functions vs Special Forms
//!
//! Both are [`NativeProc`]s and share one calling convention. The only
//! difference is the `evaluate_args` flag:
//!
//! - **Functions** receive their operands already evaluated, left to right
//! - **Special forms** (`quote`, `define`, `set!`, `lambda`, `create-macro`,
//!   `defmacro`, `begin`, `if`) receive the raw operand forms and decide what
//!   to evaluate themselves
//!
//! A native may finish with a value or hand an expression back to the
//! evaluation loop as a tail call, which is how `if` and `begin` keep their
//! last position off the native stack.
//!
//! ## Strictness
//!
//! - The arithmetic and comparison primitives are binary
//! - There is no truthiness: `if` requires `#t` or `#f`
//! - `car`/`cdr` accept only pairs; `(car nil)` is an error
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`NativeFn`] signature
//! 2. **Add to BUILTIN_OPS** with its name, arity and evaluation mode
//! 3. **Add tests** covering edge cases and error conditions
//!
//! Host programs can add procedures at runtime with
//! [`Interpreter::register_native`](crate::Interpreter::register_native).

use crate::ast::Value;
use crate::evaluator::environment::Environment;
use crate::evaluator::{
    Interpreter, Trampoline, eval_begin, eval_create_macro, eval_defmacro, eval_define, eval_if,
    eval_lambda, eval_quote, eval_set,
};
use crate::numeric::{self, ArithOp, Comparison};
use crate::{ErrorKind, LispError};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

/// Calling convention shared by every native procedure.
///
/// `args` holds evaluated values or raw forms depending on the procedure's
/// `evaluate_args` flag; `env` is the caller's environment.
pub type NativeFn =
    fn(&mut Interpreter, &[Value], &Environment) -> Result<Trampoline, LispError>;

/// Accepted operand counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    /// Check an operand count against this arity
    pub fn validate(self, count: usize) -> Result<(), LispError> {
        match self {
            Arity::Exact(n) if count != n => Err(LispError::arity(n, count)),
            Arity::AtLeast(n) if count < n => Err(LispError::arity(format!("at least {n}"), count)),
            _ => Ok(()),
        }
    }
}

/// A procedure implemented in Rust
pub struct NativeProc {
    pub name: Rc<str>,
    pub arity: Arity,
    /// When false the procedure receives its operands unevaluated
    pub evaluate_args: bool,
    pub func: NativeFn,
}

impl NativeProc {
    /// A procedure that receives evaluated arguments
    pub fn new(name: impl Into<Rc<str>>, arity: Arity, func: NativeFn) -> Self {
        NativeProc {
            name: name.into(),
            arity,
            evaluate_args: true,
            func,
        }
    }

    /// A procedure that receives its operand forms unevaluated
    pub fn special_form(name: impl Into<Rc<str>>, arity: Arity, func: NativeFn) -> Self {
        NativeProc {
            evaluate_args: false,
            ..NativeProc::new(name, arity, func)
        }
    }
}

impl fmt::Debug for NativeProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("evaluate_args", &self.evaluate_args)
            .finish_non_exhaustive()
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// The name bound in the root environment
    pub name: &'static str,
    pub arity: Arity,
    pub evaluate_args: bool,
    pub func: NativeFn,
}

impl BuiltinOp {
    /// Check if this operation is a special form
    pub fn is_special_form(&self) -> bool {
        !self.evaluate_args
    }

    pub fn to_native(&self) -> NativeProc {
        NativeProc {
            name: self.name.into(),
            arity: self.arity,
            evaluate_args: self.evaluate_args,
            func: self.func,
        }
    }
}

//
// Builtin Function Implementations
//

fn ret(value: Value) -> Result<Trampoline, LispError> {
    Ok(Trampoline::Return(value))
}

fn binary_operands<'a>(args: &'a [Value]) -> Result<(&'a Value, &'a Value), LispError> {
    match args {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(LispError::arity(2, args.len())),
    }
}

fn single_operand(args: &[Value]) -> Result<&Value, LispError> {
    match args {
        [value] => Ok(value),
        _ => Err(LispError::arity(1, args.len())),
    }
}

// Macro to generate the binary arithmetic primitives
macro_rules! arithmetic_op {
    ($name:ident, $op:expr) => {
        fn $name(
            _interp: &mut Interpreter,
            args: &[Value],
            _env: &Environment,
        ) -> Result<Trampoline, LispError> {
            let (lhs, rhs) = binary_operands(args)?;
            ret(numeric::arithmetic($op, lhs, rhs)?)
        }
    };
}

arithmetic_op!(builtin_add, ArithOp::Add);
arithmetic_op!(builtin_sub, ArithOp::Sub);
arithmetic_op!(builtin_mul, ArithOp::Mul);
arithmetic_op!(builtin_div, ArithOp::Div);

// Macro to generate numeric comparison functions
macro_rules! comparison_op {
    ($name:ident, $cmp:expr) => {
        fn $name(
            _interp: &mut Interpreter,
            args: &[Value],
            _env: &Environment,
        ) -> Result<Trampoline, LispError> {
            let (lhs, rhs) = binary_operands(args)?;
            let ordering = numeric::compare(lhs, rhs)?;
            ret(Value::Bool($cmp.holds(ordering)))
        }
    };
}

comparison_op!(builtin_lt, Comparison::Lt);
comparison_op!(builtin_gt, Comparison::Gt);
comparison_op!(builtin_le, Comparison::Le);
comparison_op!(builtin_ge, Comparison::Ge);
comparison_op!(builtin_num_eq, Comparison::Eq);

fn builtin_equal(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    let (lhs, rhs) = binary_operands(args)?;
    ret(Value::Bool(numeric::equal(lhs, rhs)?))
}

fn builtin_car(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    match single_operand(args)? {
        Value::Pair(cell) => ret(cell.car.clone()),
        other => Err(LispError::type_mismatch(format!(
            "Expected cons, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    match single_operand(args)? {
        Value::Pair(cell) => ret(cell.cdr.clone()),
        other => Err(LispError::type_mismatch(format!(
            "Expected cons, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cons(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    let (car, cdr) = binary_operands(args)?;
    ret(Value::pair_at(car.clone(), cdr.clone(), None))
}

fn builtin_list(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    ret(Value::list_from(args.iter().cloned()))
}

/// Write the arguments separated by spaces, then a newline. Strings are
/// written raw, everything else in source form.
fn builtin_display(
    interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    let line = args
        .iter()
        .map(|value| match value {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let output = interp.output();
    writeln!(output, "{line}")
        .and_then(|()| output.flush())
        .map_err(|err| LispError::new(ErrorKind::Io, format!("display failed: {err}")))?;
    ret(Value::Nil)
}

fn builtin_repr(
    _interp: &mut Interpreter,
    args: &[Value],
    _env: &Environment,
) -> Result<Trampoline, LispError> {
    ret(Value::Str(single_operand(args)?.to_string()))
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "+",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_add,
    },
    BuiltinOp {
        name: "-",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_sub,
    },
    BuiltinOp {
        name: "*",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_mul,
    },
    BuiltinOp {
        name: "/",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_div,
    },
    BuiltinOp {
        name: "<",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_lt,
    },
    BuiltinOp {
        name: ">",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_gt,
    },
    BuiltinOp {
        name: "<=",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_le,
    },
    BuiltinOp {
        name: ">=",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_ge,
    },
    BuiltinOp {
        name: "=",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_num_eq,
    },
    BuiltinOp {
        name: "equal",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_equal,
    },
    BuiltinOp {
        name: "car",
        arity: Arity::Exact(1),
        evaluate_args: true,
        func: builtin_car,
    },
    BuiltinOp {
        name: "cdr",
        arity: Arity::Exact(1),
        evaluate_args: true,
        func: builtin_cdr,
    },
    BuiltinOp {
        name: "cons",
        arity: Arity::Exact(2),
        evaluate_args: true,
        func: builtin_cons,
    },
    BuiltinOp {
        name: "list",
        arity: Arity::Any,
        evaluate_args: true,
        func: builtin_list,
    },
    BuiltinOp {
        name: "display",
        arity: Arity::Any,
        evaluate_args: true,
        func: builtin_display,
    },
    BuiltinOp {
        name: "repr",
        arity: Arity::Exact(1),
        evaluate_args: true,
        func: builtin_repr,
    },
    // Special forms
    BuiltinOp {
        name: "quote",
        arity: Arity::Exact(1),
        evaluate_args: false,
        func: eval_quote,
    },
    BuiltinOp {
        name: "define",
        arity: Arity::Exact(2),
        evaluate_args: false,
        func: eval_define,
    },
    BuiltinOp {
        name: "set!",
        arity: Arity::Exact(2),
        evaluate_args: false,
        func: eval_set,
    },
    BuiltinOp {
        name: "lambda",
        arity: Arity::Exact(2),
        evaluate_args: false,
        func: eval_lambda,
    },
    BuiltinOp {
        name: "create-macro",
        arity: Arity::Exact(2),
        evaluate_args: false,
        func: eval_create_macro,
    },
    BuiltinOp {
        name: "defmacro",
        arity: Arity::Exact(3),
        evaluate_args: false,
        func: eval_defmacro,
    },
    BuiltinOp {
        name: "begin",
        arity: Arity::Any,
        evaluate_args: false,
        func: eval_begin,
    },
    BuiltinOp {
        name: "if",
        arity: Arity::Exact(3),
        evaluate_args: false,
        func: eval_if,
    },
];

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}

/// Bind every builtin, plus `nil`, in `root`
pub(crate) fn install(root: &Environment) {
    for op in get_builtin_ops() {
        root.set(op.name, Value::NativeProc(Rc::new(op.to_native())));
    }
    root.set("nil", Value::Nil);
}
