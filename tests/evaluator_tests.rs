//! End-to-end behaviour of the interpreter through its public surface:
//! source text in, values and errors out.

#![cfg(feature = "reader")]
#![expect(clippy::unwrap_used)] // test code OK

use lispcore::ast::{cons, nil, sym, val};
use lispcore::{ErrorKind, Interpreter, LispError, Value};
use num::BigInt;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

fn interpreter() -> Interpreter {
    Interpreter::new().with_output(io::sink())
}

fn eval(source: &str) -> Result<Value, LispError> {
    interpreter().eval_str(source, "test")
}

fn error_kind(source: &str) -> ErrorKind {
    match eval(source) {
        Ok(value) => panic!("{source:?} should fail, got {value}"),
        Err(err) => err.kind,
    }
}

fn big(digits: &str) -> Value {
    Value::Bigint(digits.parse::<BigInt>().unwrap())
}

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_literals_evaluate_to_themselves() {
    let test_cases = vec![
        ("42", val(42)),
        ("-7", val(-7)),
        ("2.5", val(2.5)),
        ("#t", val(true)),
        ("#f", val(false)),
        ("\"text\"", val("text")),
        ("99999999999999999999", big("99999999999999999999")),
        ("nil", nil()),
        ("'()", nil()),
    ];
    for (source, expected) in test_cases {
        assert_eq!(eval(source).unwrap(), expected, "{source:?}");
    }
}

#[test]
fn test_program_value_is_last_form() {
    assert_eq!(eval("1 2 3").unwrap(), val(3));
    assert_eq!(eval("").unwrap(), nil());
    assert_eq!(eval("(define x 5) (define y (* x 2)) (+ x y)").unwrap(), val(15));
}

#[test]
fn test_tail_calls_run_in_constant_stack() {
    let mut interp = interpreter();
    interp
        .eval_str(
            "(define count-down (lambda (n acc) (if (= n 0) acc (count-down (- n 1) (+ acc 1)))))",
            "test",
        )
        .unwrap();
    assert_eq!(
        interp.eval_str("(count-down 1000000 0)", "test").unwrap(),
        val(1_000_000)
    );

    // Tail position through begin and nested ifs
    interp
        .eval_str(
            "(define spin (lambda (n) (begin 0 (if (< n 1) 'done (if #t (spin (- n 1)) 'never)))))",
            "test",
        )
        .unwrap();
    assert_eq!(interp.eval_str("(spin 200000)", "test").unwrap(), sym("done"));
}

#[test]
#[cfg_attr(debug_assertions, ignore = "ten million iterations; runs by default with --release")]
fn test_ten_million_iteration_tail_loop() {
    let mut interp = interpreter();
    interp
        .eval_str(
            "(define loop (lambda (n) (if (= n 0) 'finished (loop (- n 1)))))",
            "test",
        )
        .unwrap();
    assert_eq!(
        interp.eval_str("(loop 10000000)", "test").unwrap(),
        sym("finished")
    );
}

#[test]
fn test_deep_non_tail_recursion_is_a_stack_overflow_error() {
    let mut interp = interpreter();
    interp
        .eval_str(
            "(define sum-to (lambda (n) (if (= n 0) 0 (+ n (sum-to (- n 1))))))",
            "test",
        )
        .unwrap();
    let err = interp.eval_str("(sum-to 1000000)", "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);

    // The interpreter stays usable afterwards
    assert_eq!(interp.eval_str("(sum-to 100)", "test").unwrap(), val(5050));
}

#[test]
fn test_deeply_nested_data_is_compared_printed_and_dropped() {
    let mut interp = interpreter();
    interp
        .eval_str(
            "(define wrap (lambda (n acc) (if (< n 1) acc (wrap (- n 1) (list acc)))))
             (define deep (wrap 1000000 nil))",
            "test",
        )
        .unwrap();

    assert_eq!(
        interp.eval_str("(equal deep (wrap 1000000 nil))", "test").unwrap(),
        val(true)
    );
    assert_eq!(
        interp.eval_str("(equal deep (wrap 999999 nil))", "test").unwrap(),
        val(false)
    );

    let Value::Str(printed) = interp.eval_str("(repr deep)", "test").unwrap() else {
        panic!("repr should return a string");
    };
    assert_eq!(printed.len(), 2_000_002);
    assert!(printed.starts_with("((((") && printed.ends_with("))))"));

    // Rebinding releases the only reference to the structure
    assert_eq!(interp.eval_str("(set! deep nil) deep", "test").unwrap(), nil());
    drop(interp);
}

#[test]
fn test_if_evaluates_only_the_chosen_branch() {
    let buffer = SharedBuffer::default();
    let mut interp = Interpreter::new().with_output(buffer.clone());
    let result = interp
        .eval_str(
            "(if (< 1 2) (display \"then\") (display \"else\"))
             (if #f (undefined-name) 'skipped)",
            "test",
        )
        .unwrap();
    assert_eq!(result, sym("skipped"));
    assert_eq!(buffer.contents(), "then\n");

    assert_eq!(error_kind("(if 1 2 3)"), ErrorKind::TypeMismatch);
    assert_eq!(error_kind("(if nil 2 3)"), ErrorKind::TypeMismatch);
}

#[test]
fn test_integer_overflow_promotes_and_stays_exact() {
    let test_cases = vec![
        ("(+ 9223372036854775807 1)", big("9223372036854775808")),
        ("(- -9223372036854775808 1)", big("-9223372036854775809")),
        ("(* 4294967296 4294967296)", big("18446744073709551616")),
        ("(- (+ 9223372036854775807 1) 1)", big("9223372036854775807")),
        ("(/ -9223372036854775808 -1)", big("9223372036854775808")),
        ("(+ 9223372036854775806 1)", val(i64::MAX)),
        ("(= (+ 9223372036854775807 1) 9223372036854775808)", val(true)),
    ];
    for (source, expected) in test_cases {
        assert_eq!(eval(source).unwrap(), expected, "{source:?}");
    }
}

#[test]
fn test_mixed_arithmetic_is_commutative() {
    let pairs = [
        ("3", "0.5"),
        ("-2", "2.25"),
        ("99999999999999999999", "1.5"),
        ("99999999999999999999", "7"),
    ];
    for (a, b) in pairs {
        for op in ["+", "*"] {
            let forward = eval(&format!("({op} {a} {b})")).unwrap();
            let backward = eval(&format!("({op} {b} {a})")).unwrap();
            assert_eq!(forward, backward, "({op} {a} {b})");
        }
    }
    assert_eq!(eval("(+ 1 0.5)").unwrap(), val(1.5));
    assert_eq!(eval("(* 2 0.25)").unwrap(), val(0.5));
}

#[test]
fn test_division() {
    assert_eq!(eval("(/ 7 2)").unwrap(), val(3));
    assert_eq!(eval("(/ -7 2)").unwrap(), val(-4));
    assert_eq!(eval("(/ 7.0 2)").unwrap(), val(3.5));
    assert_eq!(error_kind("(/ 1 0)"), ErrorKind::DivisionByZero);
    assert_eq!(error_kind("(/ 1.0 0.0)"), ErrorKind::DivisionByZero);
    assert_eq!(error_kind("(/ 99999999999999999999 0)"), ErrorKind::DivisionByZero);
}

#[test]
fn test_equal_on_lists_and_mixed_numbers() {
    let test_cases = vec![
        ("(equal '(1 2 3) (list 1 2 3))", true),
        ("(equal '(1 (2 3)) '(1 (2 3)))", true),
        ("(equal '(1 2) '(1 2 3))", false),
        ("(equal '(1 . 2) (cons 1 2))", true),
        ("(equal 1 1.0)", true),
        ("(equal \"a\" \"a\")", true),
        ("(equal 'a 'a)", true),
        ("(equal 'a 'b)", false),
        ("(equal nil '())", true),
        ("(equal nil 0)", false),
    ];
    for (source, expected) in test_cases {
        assert_eq!(eval(source).unwrap(), val(expected), "{source:?}");
    }
}

#[test]
fn test_pairs_and_lists() {
    assert_eq!(eval("(car (cons 1 2))").unwrap(), val(1));
    assert_eq!(eval("(cdr (cons 1 2))").unwrap(), val(2));
    assert_eq!(eval("(cdr '(1 . (2 . 3)))").unwrap(), cons(2, 3));
    assert_eq!(eval("(cdr '(1))").unwrap(), nil());
    assert_eq!(eval("(list)").unwrap(), nil());
    assert_eq!(eval("(cons 1 (list 2 3))").unwrap(), val([1, 2, 3]));
    assert_eq!(error_kind("(car nil)"), ErrorKind::TypeMismatch);
    assert_eq!(error_kind("(cdr 5)"), ErrorKind::TypeMismatch);
}

#[test]
fn test_macro_argument_is_evaluated_once() {
    let buffer = SharedBuffer::default();
    let mut interp = Interpreter::new().with_output(buffer.clone());
    let result = interp
        .eval_str(
            "(defmacro triple (x) (+ x (+ x x)))
             (triple (begin (display \"side effect\") 4))",
            "test",
        )
        .unwrap();
    assert_eq!(result, val(12));
    assert_eq!(buffer.contents(), "side effect\n");
}

#[test]
fn test_set_requires_an_existing_binding() {
    let mut interp = interpreter();
    assert_eq!(
        interp.eval_str("(set! fresh 1)", "test").unwrap_err().kind,
        ErrorKind::UndefinedName
    );
    // The value is not evaluated when the name is missing
    let buffer = SharedBuffer::default();
    let mut watched = Interpreter::new().with_output(buffer.clone());
    assert!(watched.eval_str("(set! fresh (display 1))", "test").is_err());
    assert_eq!(buffer.contents(), "");

    // set! updates the scope that owns the binding
    let result = interp
        .eval_str(
            "(define total 0)
             (define add! (lambda (n) (set! total (+ total n))))
             (add! 3) (add! 4)
             total",
            "test",
        )
        .unwrap();
    assert_eq!(result, val(7));

    // A parameter shadows the global, so set! leaves the global alone
    let result = interp
        .eval_str("((lambda (total) (set! total 100)) 1) total", "test")
        .unwrap();
    assert_eq!(result, val(7));
}

#[test]
fn test_define_shadows_only_locally() {
    let result = eval(
        "(define x 1)
         (define f (lambda (y) (begin (define x y) x)))
         (list (f 2) x)",
    )
    .unwrap();
    assert_eq!(result, val([2, 1]));
}

#[test]
fn test_closures_capture_their_scope() {
    let result = eval(
        "(define make-acc (lambda (total) (lambda (n) (begin (set! total (+ total n)) total))))
         (define acc (make-acc 10))
         (acc 5)
         (acc 5)",
    )
    .unwrap();
    assert_eq!(result, val(20));
}

#[test]
fn test_reprs() {
    let test_cases = vec![
        ("(repr \"a\\nb\")", "\"\\\"a\\\\nb\\\"\""),
        ("(repr '(1 . 2))", "\"(1 . 2)\""),
        ("(repr '(a \"s\" 2.0))", "\"(a \\\"s\\\" 2.0)\""),
    ];
    for (source, expected) in test_cases {
        assert_eq!(eval(source).unwrap().to_string(), expected, "{source:?}");
    }

    assert_eq!(
        eval("(lambda (x y) (+ x y))").unwrap().to_string(),
        "(lambda (x y) (+ x y))"
    );
    assert_eq!(eval("car").unwrap().to_string(), "car");
}

#[test]
fn test_error_kinds() {
    let test_cases = vec![
        ("undefined", ErrorKind::UndefinedName),
        ("((lambda (x) x))", ErrorKind::WrongArity),
        ("(car 1 2)", ErrorKind::WrongArity),
        ("(+ 1 \"a\")", ErrorKind::TypeMismatch),
        ("(equal 1 \"1\")", ErrorKind::TypeMismatch),
        ("(1 2)", ErrorKind::NotCallable),
        ("(\"f\")", ErrorKind::NotCallable),
        ("(lambda x x)", ErrorKind::MalformedSpecialForm),
        ("(lambda (x x) x)", ErrorKind::MalformedSpecialForm),
        ("(define 5 1)", ErrorKind::MalformedSpecialForm),
        ("(+ 1 . 2)", ErrorKind::InternalShapeError),
        ("(+ 1", ErrorKind::UnclosedParenthesis),
        ("\"abc", ErrorKind::UnterminatedString),
        ("\"\\q\"", ErrorKind::InvalidEscape),
        (")", ErrorKind::UnexpectedToken),
    ];
    for (source, expected) in test_cases {
        assert_eq!(error_kind(source), expected, "{source:?}");
    }
}

#[test]
fn test_errors_render_with_location() {
    let err = interpreter()
        .eval_str("(define x 1)\n(+ x y)", "prog.lisp")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "UndefinedName: Name \"y\" undefined\n  At <prog.lisp: line 2, column 6>"
    );
}

#[test]
fn test_failed_form_keeps_earlier_definitions() {
    let mut interp = interpreter();
    assert!(interp.eval_str("(define a 1) (car a) (define b 2)", "test").is_err());
    assert_eq!(interp.eval_str("a", "test").unwrap(), val(1));
    assert_eq!(
        interp.eval_str("b", "test").unwrap_err().kind,
        ErrorKind::UndefinedName
    );
}
