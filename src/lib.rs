//! lispcore - a small Lisp runtime
//!
//! This crate reads Lisp source into an s-expression tree and evaluates it
//! against a chain of lexical scopes. The interesting part is the evaluator:
//!
//! ```lisp
//! (define count (lambda (n acc)
//!   (if (< n 1) acc (count (- n 1) (+ acc 1)))))  ; runs in constant stack
//! (+ 9223372036854775807 1)                       ; promotes to a bigint
//! (+ 2 3.5)                                       ; promotes to a float
//! ((create-macro (x) (+ x x)) (+ 1 2))            ; argument evaluated once
//! ```
//!
//! ## Semantics in brief
//!
//! - Tail positions (`begin`'s last form, `if` branches, closure bodies and
//!   macro expansions) are iterations of a loop, never recursion.
//! - Integers are machine words until an operation overflows, then they
//!   become arbitrary-precision. Any float operand makes the result a float.
//! - `if` requires an actual boolean; there is no truthiness.
//! - Macros do not capture an environment. Expansion substitutes the
//!   (once-evaluated) arguments for references to the macro's own
//!   parameters and leaves every other reference alone. This is not
//!   hygienic: an expansion can capture caller bindings.
//!
//! ## Modules
//!
//! - `ast`: the value model
//! - `numeric`: arithmetic and comparisons over the numeric tower
//! - `evaluator`: environments and the trampolined evaluation loop
//! - `builtinops`: the native procedure table, special forms included
//! - `lexer` / `parser`: source text to values (feature `reader`)

use std::fmt;
use std::rc::Rc;

/// Maximum list nesting accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 1024;

/// Default limit on nested non-tail evaluations
///
/// Tail calls do not count against this limit.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Remaining native stack below which recursive evaluation and parsing move
/// onto a freshly allocated segment
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;

/// Size of each additional stack segment
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// A position in source text. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub filename: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(filename: impl Into<Rc<str>>, line: u32, column: u32) -> Self {
        Location {
            filename: filename.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{}: line {}, column {}>",
            self.filename, self.line, self.column
        )
    }
}

/// Categorizes every failure the reader or evaluator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lookup or `set!` of a name with no binding in the scope chain
    UndefinedName,
    /// Procedure, macro or special form called with the wrong operand count
    WrongArity,
    /// Operand of the wrong kind (can't add, compare, take the car of, ...)
    TypeMismatch,
    DivisionByZero,
    /// A non-procedure value in call position
    NotCallable,
    /// A special form whose operands have the wrong shape
    MalformedSpecialForm,
    /// Nesting limit exceeded during evaluation or parsing
    StackOverflow,
    /// An expression the evaluator cannot dispatch (e.g. a dotted call form)
    InternalShapeError,
    UnclosedParenthesis,
    UnterminatedString,
    InvalidEscape,
    UnexpectedToken,
    /// Writing `display` output failed
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::UndefinedName => "UndefinedName",
            ErrorKind::WrongArity => "WrongArity",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::DivisionByZero => "DivisionByZero",
            ErrorKind::NotCallable => "NotCallable",
            ErrorKind::MalformedSpecialForm => "MalformedSpecialForm",
            ErrorKind::StackOverflow => "StackOverflow",
            ErrorKind::InternalShapeError => "InternalShapeError",
            ErrorKind::UnclosedParenthesis => "UnclosedParenthesis",
            ErrorKind::UnterminatedString => "UnterminatedString",
            ErrorKind::InvalidEscape => "InvalidEscape",
            ErrorKind::UnexpectedToken => "UnexpectedToken",
            ErrorKind::Io => "Io",
        };
        f.write_str(name)
    }
}

/// Error type for the reader and the interpreter
///
/// The location is attached by the innermost frame that knows one and is
/// never replaced afterwards, so the reported position is where the fault
/// originated rather than where it surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct LispError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl LispError {
    /// Create a LispError with no location yet
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        LispError {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Create a LispError blamed on a known location
    pub fn at(kind: ErrorKind, message: impl Into<String>, location: Option<Location>) -> Self {
        LispError {
            kind,
            message: message.into(),
            location,
        }
    }

    /// Attach `location` unless the error already carries one
    pub fn or_location(mut self, location: Option<Location>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    pub fn undefined_name(name: &str, location: Option<Location>) -> Self {
        Self::at(
            ErrorKind::UndefinedName,
            format!("Name \"{name}\" undefined"),
            location,
        )
    }

    pub fn arity(expected: impl fmt::Display, got: usize) -> Self {
        Self::new(
            ErrorKind::WrongArity,
            format!("Expected {expected} arguments, got {got}"),
        )
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn malformed(form: &str, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::MalformedSpecialForm,
            format!("Malformed {form}: {message}"),
        )
    }
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, "\n  At {location}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LispError {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod numeric;

#[cfg(feature = "reader")]
pub mod lexer;

#[cfg(feature = "reader")]
pub mod parser;

pub use ast::Value;
pub use evaluator::{EvalConfig, Interpreter, environment::Environment};
