//! Arithmetic and comparison across the numeric tower.
//!
//! Three representations take part: machine integers (`Int`), arbitrary
//! precision integers (`Bigint`) and doubles (`Float`). Every operation is a
//! total match over the 3×3 kind matrix:
//!
//! | lhs \ rhs | Int               | Bigint | Float |
//! |-----------|-------------------|--------|-------|
//! | Int       | Int, Bigint on overflow | Bigint | Float |
//! | Bigint    | Bigint            | Bigint | Float |
//! | Float     | Float             | Float  | Float |
//!
//! A `Bigint` result is never demoted back to `Int`, and a `Float` result is
//! never promoted. Integer division floors toward negative infinity. A zero
//! divisor of any kind is reported as `DivisionByZero`.

use crate::ast::Value;
use crate::{ErrorKind, LispError};
use num::{BigInt, Integer, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::rc::Rc;

/// The four binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn verb(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "subtract",
            ArithOp::Mul => "multiply",
            ArithOp::Div => "divide",
        }
    }
}

/// Ordering predicates exposed as builtins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl Comparison {
    /// Whether `ordering` satisfies this predicate. Unordered operands (NaN)
    /// satisfy none of them.
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (_, None) => false,
            (Comparison::Lt, Some(o)) => o == Ordering::Less,
            (Comparison::Gt, Some(o)) => o == Ordering::Greater,
            (Comparison::Le, Some(o)) => o != Ordering::Greater,
            (Comparison::Ge, Some(o)) => o != Ordering::Less,
            (Comparison::Eq, Some(o)) => o == Ordering::Equal,
        }
    }
}

/// Borrowed numeric view of a value
#[derive(Debug, Clone, Copy)]
enum Number<'a> {
    Int(i64),
    Big(&'a BigInt),
    Float(f64),
}

impl<'a> Number<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Bigint(n) => Some(Number::Big(n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Big(n) => bigint_to_f64(n),
            Number::Float(x) => x,
        }
    }
}

/// Best-effort conversion; magnitudes beyond `f64` saturate to infinity.
pub fn bigint_to_f64(n: &BigInt) -> f64 {
    n.to_f64().unwrap_or(if n.is_negative() {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    })
}

fn division_by_zero() -> LispError {
    LispError::new(ErrorKind::DivisionByZero, "Division by zero")
}

/// Apply `op` to two numeric values, widening as described in the module docs
pub fn arithmetic(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, LispError> {
    let (Some(a), Some(b)) = (Number::of(lhs), Number::of(rhs)) else {
        return Err(LispError::type_mismatch(format!(
            "Can't {} types {} and {}",
            op.verb(),
            lhs.type_name(),
            rhs.type_name()
        )));
    };

    match (a, b) {
        (Number::Int(a), Number::Int(b)) => int_arithmetic(op, a, b),
        (Number::Int(a), Number::Big(b)) => big_arithmetic(op, &BigInt::from(a), b),
        (Number::Big(a), Number::Int(b)) => big_arithmetic(op, a, &BigInt::from(b)),
        (Number::Big(a), Number::Big(b)) => big_arithmetic(op, a, b),
        (Number::Float(a), b) => float_arithmetic(op, a, b.to_f64()),
        (a, Number::Float(b)) => float_arithmetic(op, a.to_f64(), b),
    }
}

fn int_arithmetic(op: ArithOp, a: i64, b: i64) -> Result<Value, LispError> {
    let machine = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(division_by_zero());
            }
            // checked_div only fails for i64::MIN / -1 here
            a.checked_div(b).map(|_| Integer::div_floor(&a, &b))
        }
    };

    match machine {
        Some(n) => Ok(Value::Int(n)),
        None => big_arithmetic(op, &BigInt::from(a), &BigInt::from(b)),
    }
}

fn big_arithmetic(op: ArithOp, a: &BigInt, b: &BigInt) -> Result<Value, LispError> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b.is_zero() {
                return Err(division_by_zero());
            }
            Integer::div_floor(a, b)
        }
    };
    Ok(Value::Bigint(result))
}

fn float_arithmetic(op: ArithOp, a: f64, b: f64) -> Result<Value, LispError> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            a / b
        }
    };
    Ok(Value::Float(result))
}

/// Order two numeric values under the same widening rules as arithmetic.
/// `None` means the operands are unordered (a NaN is involved).
pub fn compare(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, LispError> {
    let (Some(a), Some(b)) = (Number::of(lhs), Number::of(rhs)) else {
        return Err(LispError::type_mismatch(format!(
            "Can't compare types {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    };

    Ok(match (a, b) {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (Number::Int(a), Number::Big(b)) => Some(BigInt::from(a).cmp(b)),
        (Number::Big(a), Number::Int(b)) => Some(a.cmp(&BigInt::from(b))),
        (Number::Big(a), Number::Big(b)) => Some(a.cmp(b)),
        (Number::Float(a), b) => a.partial_cmp(&b.to_f64()),
        (a, Number::Float(b)) => a.to_f64().partial_cmp(&b),
    })
}

/// Equality as seen by the `equal` builtin.
///
/// Numbers compare by value across kinds. Strings, booleans and references
/// compare within their own kind. `Nil` equals only `Nil`. Pair chains are
/// compared element by element and must terminate the same way. Any other
/// combination of kinds cannot be compared.
pub fn equal(lhs: &Value, rhs: &Value) -> Result<bool, LispError> {
    // Nested pairs are walked from a worklist, car before cdr. The flag marks
    // cdr positions, where a chain ending early is a difference, not an error.
    let mut pending = Vec::new();
    let (mut a, mut b, mut in_tail) = (lhs, rhs, false);
    loop {
        match (a, b) {
            (Value::Pair(x), Value::Pair(y)) => {
                if !Rc::ptr_eq(x, y) {
                    pending.push((&x.cdr, &y.cdr, true));
                    pending.push((&x.car, &y.car, false));
                }
            }
            (Value::Pair(_), _) | (_, Value::Pair(_)) if in_tail => return Ok(false),
            _ => {
                if !atoms_equal(a, b)? {
                    return Ok(false);
                }
            }
        }
        match pending.pop() {
            Some((next_a, next_b, tail)) => (a, b, in_tail) = (next_a, next_b, tail),
            None => return Ok(true),
        }
    }
}

fn atoms_equal(lhs: &Value, rhs: &Value) -> Result<bool, LispError> {
    match (lhs, rhs) {
        (Value::Nil, other) | (other, Value::Nil) => Ok(other.is_nil()),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Reference(a), Value::Reference(b)) => Ok(a.name == b.name),
        _ => match (Number::of(lhs), Number::of(rhs)) {
            (Some(_), Some(_)) => Ok(compare(lhs, rhs)? == Some(Ordering::Equal)),
            _ => Err(LispError::type_mismatch(format!(
                "Can't compare {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}
