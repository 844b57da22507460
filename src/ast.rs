//! This module defines [`Value`], the tagged representation of every runtime
//! entity: literals, references, cons cells and the three kinds of procedure.
//! Source code and data share this representation; the parser produces
//! `Value` trees and the evaluator consumes and returns them.
//!
//! Ergonomic helpers such as [`val`], [`sym`], [`nil`], [`cons`] and [`list`]
//! build trees in code and tests. Equality is structural and ignores source
//! locations, so a parsed `(1 2 3)` equals `list([1, 2, 3])`.

use crate::Location;
use crate::builtinops::NativeProc;
use crate::evaluator::environment::Environment;
use num::BigInt;
use std::fmt;
use std::rc::Rc;

/// Core value type of the interpreter
#[derive(Clone)]
pub enum Value {
    /// The empty list, also used as the "no value" result
    Nil,
    Bool(bool),
    /// Machine integer
    Int(i64),
    /// Arbitrary-precision integer, produced when `Int` arithmetic overflows
    Bigint(BigInt),
    Float(f64),
    Str(String),
    /// An identifier, resolved by scope lookup when evaluated
    Reference(Reference),
    /// Cons cell; proper lists are right-nested chains ending in `Nil`
    Pair(Rc<Pair>),
    Closure(Rc<Closure>),
    Macro(Rc<Macro>),
    NativeProc(Rc<NativeProc>),
}

/// An identifier occurrence and where it was written
#[derive(Debug, Clone)]
pub struct Reference {
    pub name: Rc<str>,
    pub location: Option<Location>,
}

/// A cons cell. The location is that of the opening parenthesis for parsed
/// lists.
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
    pub location: Option<Location>,
}

/// A user procedure: fixed parameter list, a single body expression and the
/// scope it was created in.
pub struct Closure {
    pub params: Vec<Rc<str>>,
    pub body: Value,
    pub env: Environment,
}

/// A syntactic macro. Unlike [`Closure`] it has no captured scope.
pub struct Macro {
    pub params: Vec<Rc<str>>,
    pub body: Value,
}

impl Drop for Pair {
    // Nested structure is released from a worklist instead of recursively,
    // so neither long cdr chains nor deep car nesting grow the native stack.
    fn drop(&mut self) {
        let mut pending: Vec<Value> = [
            std::mem::replace(&mut self.car, Value::Nil),
            std::mem::replace(&mut self.cdr, Value::Nil),
        ]
        .into_iter()
        .filter(|child| matches!(child, Value::Pair(_)))
        .collect();

        while let Some(value) = pending.pop() {
            if let Value::Pair(cell) = value
                && let Ok(mut pair) = Rc::try_unwrap(cell)
            {
                for child in [
                    std::mem::replace(&mut pair.car, Value::Nil),
                    std::mem::replace(&mut pair.cdr, Value::Nil),
                ] {
                    if matches!(child, Value::Pair(_)) {
                        pending.push(child);
                    }
                }
            }
        }
    }
}

impl Value {
    /// Build a reference that has no source location
    pub fn reference(name: impl Into<Rc<str>>) -> Self {
        Value::Reference(Reference {
            name: name.into(),
            location: None,
        })
    }

    /// Build a cons cell blamed on `location`
    pub fn pair_at(car: Value, cdr: Value, location: Option<Location>) -> Self {
        Value::Pair(Rc::new(Pair { car, cdr, location }))
    }

    /// Build a proper list from a sequence of values
    pub fn list_from<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, head| Value::pair_at(head, tail, None))
    }

    /// Elements of a `Nil`-terminated chain, or `None` for anything that is
    /// not a proper list (dotted chains included)
    pub fn list_items(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut node = self;
        loop {
            match node {
                Value::Nil => return Some(items),
                Value::Pair(cell) => {
                    items.push(cell.car.clone());
                    node = &cell.cdr;
                }
                _ => return None,
            }
        }
    }

    /// Check if a value is the empty list
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Name of a reference value
    pub fn reference_name(&self) -> Option<&Rc<str>> {
        match self {
            Value::Reference(reference) => Some(&reference.name),
            _ => None,
        }
    }

    /// Source location carried by this value, if any. A pair without its own
    /// location falls back to the location of its head.
    pub fn location(&self) -> Option<Location> {
        let mut value = self;
        loop {
            match value {
                Value::Reference(reference) => return reference.location.clone(),
                Value::Pair(cell) => match &cell.location {
                    Some(location) => return Some(location.clone()),
                    None => value = &cell.car,
                },
                _ => return None,
            }
        }
    }

    /// Human readable kind name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Bigint(_) => "bigint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Reference(_) => "reference",
            Value::Pair(_) => "cons",
            Value::Closure(_) => "closure",
            Value::Macro(_) => "macro",
            Value::NativeProc(_) => "native procedure",
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::Bigint(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(i64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list_from(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list_from(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating references - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::reference(name.as_ref())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::Nil
}

/// Helper function for a single (possibly dotted) cons cell
pub fn cons<A: Into<Value>, D: Into<Value>>(car: A, cdr: D) -> Value {
    Value::pair_at(car.into(), cdr.into(), None)
}

/// Helper function for a proper list
pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    Value::list_from(items)
}

/// Write a string literal in source form, escaping anything the parser
/// would not read back verbatim.
fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if (c as u32) < 0x20 || ('\u{7f}'..='\u{ff}').contains(&c) => {
                write!(f, "\\x{:02X}", c as u32)?
            }
            c if c.is_ascii() => write!(f, "{c}")?,
            c if (c as u32) <= 0xFFFF => write!(f, "\\u{:04X}", c as u32)?,
            c => write!(f, "\\U{:08X}", c as u32)?,
        }
    }
    f.write_str("\"")
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[Rc<str>]) -> fmt::Result {
    f.write_str("(")?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        f.write_str(param)?;
    }
    f.write_str(")")
}

/// Output still owed while printing nested values
enum Pending<'v> {
    Value(&'v Value),
    Text(&'static str),
}

/// Display is the source representation, as returned by `repr`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Compound values push their parts; nesting depth never reaches the
        // native stack.
        let mut pending = vec![Pending::Value(self)];
        while let Some(item) = pending.pop() {
            let value = match item {
                Pending::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Pending::Value(value) => value,
            };
            match value {
                Value::Nil => f.write_str("()")?,
                Value::Bool(b) => f.write_str(if *b { "#t" } else { "#f" })?,
                Value::Int(n) => write!(f, "{n}")?,
                Value::Bigint(n) => write!(f, "{n}")?,
                Value::Float(x) => write!(f, "{x:?}")?,
                Value::Str(s) => write_string_literal(f, s)?,
                Value::Reference(reference) => f.write_str(&reference.name)?,
                Value::Pair(cell) => {
                    let mut items = vec![&cell.car];
                    let mut tail = &cell.cdr;
                    while let Value::Pair(next) = tail {
                        items.push(&next.car);
                        tail = &next.cdr;
                    }

                    f.write_str("(")?;
                    pending.push(Pending::Text(")"));
                    if !tail.is_nil() {
                        pending.push(Pending::Value(tail));
                        pending.push(Pending::Text(" . "));
                    }
                    for (i, item) in items.into_iter().enumerate().rev() {
                        pending.push(Pending::Value(item));
                        if i > 0 {
                            pending.push(Pending::Text(" "));
                        }
                    }
                }
                Value::Closure(closure) => {
                    f.write_str("(lambda ")?;
                    write_params(f, &closure.params)?;
                    f.write_str(" ")?;
                    pending.push(Pending::Text(")"));
                    pending.push(Pending::Value(&closure.body));
                }
                Value::Macro(mac) => {
                    f.write_str("(create-macro ")?;
                    write_params(f, &mac.params)?;
                    f.write_str(" ")?;
                    pending.push(Pending::Text(")"));
                    pending.push(Pending::Value(&mac.body));
                }
                Value::NativeProc(proc) => f.write_str(&proc.name)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Bigint(n) => write!(f, "Bigint({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Reference(reference) => write!(f, "Reference({})", reference.name),
            Value::Pair(_) => write!(f, "Pair{self}"),
            Value::Closure(closure) => {
                write!(f, "Closure(params={:?}, body={:?})", closure.params, closure.body)
            }
            Value::Macro(mac) => write!(f, "Macro(params={:?}, body={:?})", mac.params, mac.body),
            Value::NativeProc(proc) => write!(f, "NativeProc({})", proc.name),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // Pairs are compared from an explicit worklist, car before cdr
        let mut pending = Vec::new();
        let (mut a, mut b) = (self, other);
        loop {
            let same = match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if !Rc::ptr_eq(x, y) {
                        pending.push((&x.cdr, &y.cdr));
                        pending.push((&x.car, &y.car));
                    }
                    true
                }
                _ => shallow_eq(a, b),
            };
            if !same {
                return false;
            }
            match pending.pop() {
                Some((next_a, next_b)) => (a, b) = (next_a, next_b),
                None => return true,
            }
        }
    }
}

/// Equality of everything except pair contents
fn shallow_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bigint(a), Value::Bigint(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Reference(a), Value::Reference(b)) => a.name == b.name,
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
        (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
        // Compare native procedures by name, not function pointer
        (Value::NativeProc(a), Value::NativeProc(b)) => a.name == b.name,
        _ => false,
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Int(42)),
            (val(-17), Value::Int(-17)),
            (val(255u8), Value::Int(255)),
            (val(4294967295u32), Value::Int(4294967295)),
            (val(i64::MIN), Value::Int(i64::MIN)),
            (val(2.5), Value::Float(2.5)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::Str("hello".to_owned())),
            (val(BigInt::from(7)), Value::Bigint(BigInt::from(7))),
            (sym("set!"), Value::reference("set!")),
            (nil(), Value::Nil),
            (
                val([1, 2]),
                cons(1, cons(2, Value::Nil)),
            ),
            (list(Vec::<Value>::new()), Value::Nil),
            (
                val(vec![sym("quote"), val("x")]),
                list([sym("quote"), val("x")]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_equality_ignores_locations_and_kinds_do_not_mix() {
        let located = Value::Reference(Reference {
            name: "x".into(),
            location: Some(Location::new("a.lisp", 3, 7)),
        });
        assert_eq!(located, sym("x"));
        assert_ne!(val(1), val(1.0));
        assert_ne!(val(1), Value::Bigint(BigInt::from(1)));
        assert_ne!(val([1, 2]), val([1, 2, 3]));
        assert_ne!(cons(1, 2), val([1, 2]));
    }

    #[test]
    fn test_list_items() {
        assert_eq!(nil().list_items(), Some(vec![]));
        assert_eq!(val([1, 2, 3]).list_items(), Some(vec![val(1), val(2), val(3)]));
        assert_eq!(cons(1, 2).list_items(), None);
        assert_eq!(cons(1, cons(2, 3)).list_items(), None);
        assert_eq!(val(5).list_items(), None);
    }

    #[test]
    fn test_display_source_representation() {
        let test_cases = vec![
            (nil(), "()"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val(-12), "-12"),
            (val(5.5), "5.5"),
            (val(2.0), "2.0"),
            (val("a\"b\\c\n"), r#""a\"b\\c\n""#),
            (val("\u{1}\u{e9}\u{3bb}\u{1F600}"), r#""\x01\xE9\u03BB\U0001F600""#),
            (sym("foo"), "foo"),
            (val([1, 2, 3]), "(1 2 3)"),
            (cons(1, 2), "(1 . 2)"),
            (cons(1, cons(2, 3)), "(1 2 . 3)"),
            (val([val([1]), nil()]), "((1) ())"),
            (
                Value::Macro(Rc::new(Macro {
                    params: vec!["x".into()],
                    body: val(vec![sym("+"), sym("x"), sym("x")]),
                })),
                "(create-macro (x) (+ x x))",
            ),
        ];

        for (value, expected) in test_cases {
            assert_eq!(format!("{value}"), expected);
        }
    }

    #[test]
    fn test_dropping_long_list_does_not_recurse() {
        let long = Value::list_from((0..1_000_000).map(Value::Int));
        drop(long);
    }

    /// `(((...)))` nested through the car, a million levels deep
    fn nested_in_car(depth: usize) -> Value {
        (0..depth).fold(Value::Nil, |inner, _| Value::pair_at(inner, Value::Nil, None))
    }

    #[test]
    fn test_deep_car_nesting_does_not_recurse() {
        let depth = 1_000_000;
        let deep = nested_in_car(depth);
        let twin = nested_in_car(depth);

        assert_eq!(deep, twin);
        assert_ne!(deep, nested_in_car(depth - 1));

        let printed = deep.to_string();
        assert_eq!(printed.len(), 2 * depth + 2);
        assert!(printed.starts_with("((((") && printed.ends_with("))))"));

        drop(deep);
        drop(twin);
    }

    #[test]
    fn test_location_falls_back_to_head() {
        let here = Location::new("f", 3, 7);
        let head = Value::Reference(Reference {
            name: "g".into(),
            location: Some(here.clone()),
        });
        let call = Value::pair_at(Value::pair_at(head, Value::Nil, None), Value::Nil, None);
        assert_eq!(call.location(), Some(here));
        assert_eq!(nested_in_car(100_000).location(), None);
    }
}
