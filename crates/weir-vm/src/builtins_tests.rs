use weir_core::{BuiltIn, RuntimeError, Value};

use super::builtins::{apply_builtin, apply_value};

fn pair(a: Value, b: Value) -> Value {
    Value::list(vec![a, b])
}

fn ints(ns: &[i64]) -> Value {
    Value::list(ns.iter().map(|n| Value::Int(*n)).collect())
}

#[test]
fn integer_arithmetic() {
    assert_eq!(
        apply_builtin(BuiltIn::Add, pair(Value::Int(3), Value::Int(4))).unwrap(),
        Value::Int(7)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Sub, pair(Value::Int(3), Value::Int(4))).unwrap(),
        Value::Int(-1)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Div, pair(Value::Int(7), Value::Int(2))).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Mod, pair(Value::Int(7), Value::Int(2))).unwrap(),
        Value::Int(1)
    );
}

#[test]
fn real_arithmetic() {
    assert_eq!(
        apply_builtin(BuiltIn::Add, pair(Value::Real(1.5), Value::Real(2.0))).unwrap(),
        Value::Real(3.5)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Divide, pair(Value::Real(1.0), Value::Real(4.0))).unwrap(),
        Value::Real(0.25)
    );
}

#[test]
fn division_by_zero_is_an_error() {
    assert_eq!(
        apply_builtin(BuiltIn::Div, pair(Value::Int(1), Value::Int(0))),
        Err(RuntimeError::DivisionByZero)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Mod, pair(Value::Int(1), Value::Int(0))),
        Err(RuntimeError::DivisionByZero)
    );
}

#[test]
fn comparisons() {
    assert_eq!(
        apply_builtin(BuiltIn::Lt, pair(Value::Int(1), Value::Int(2))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Ge, pair(Value::string("b"), Value::string("a"))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Eq, pair(ints(&[1, 2]), ints(&[1, 2]))).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn list_operations() {
    assert_eq!(
        apply_builtin(BuiltIn::Cons, pair(Value::Int(1), ints(&[2, 3]))).unwrap(),
        ints(&[1, 2, 3])
    );
    assert_eq!(
        apply_builtin(BuiltIn::Append, pair(ints(&[1]), ints(&[2]))).unwrap(),
        ints(&[1, 2])
    );
    assert_eq!(
        apply_builtin(BuiltIn::Elem, pair(Value::Int(2), ints(&[1, 2, 3]))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        apply_builtin(BuiltIn::Hd, ints(&[5, 6])).unwrap(),
        Value::Int(5)
    );
    assert_eq!(apply_builtin(BuiltIn::Tl, ints(&[5, 6])).unwrap(), ints(&[6]));
    assert_eq!(
        apply_builtin(BuiltIn::Hd, ints(&[])),
        Err(RuntimeError::EmptyList)
    );
    assert_eq!(
        apply_builtin(BuiltIn::ListRev, ints(&[1, 2, 3])).unwrap(),
        ints(&[3, 2, 1])
    );
}

#[test]
fn string_operations() {
    assert_eq!(
        apply_builtin(BuiltIn::StrSize, Value::string("hello")).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        apply_builtin(
            BuiltIn::Concat,
            pair(Value::string("ab"), Value::string("cd"))
        )
        .unwrap(),
        Value::string("abcd")
    );
    assert_eq!(
        apply_builtin(
            BuiltIn::Substring,
            Value::list(vec![Value::string("hello"), Value::Int(1), Value::Int(3)])
        )
        .unwrap(),
        Value::string("ell")
    );
    assert_eq!(
        apply_builtin(
            BuiltIn::Substring,
            Value::list(vec![Value::string("hi"), Value::Int(1), Value::Int(5)])
        ),
        Err(RuntimeError::Subscript)
    );
}

#[test]
fn aggregates() {
    assert_eq!(apply_builtin(BuiltIn::Sum, ints(&[1, 2, 3])).unwrap(), Value::Int(6));
    assert_eq!(apply_builtin(BuiltIn::Sum, ints(&[])).unwrap(), Value::Int(0));
    assert_eq!(apply_builtin(BuiltIn::Count, ints(&[4, 5])).unwrap(), Value::Int(2));
    assert_eq!(apply_builtin(BuiltIn::Min, ints(&[3, 1, 2])).unwrap(), Value::Int(1));
    assert_eq!(apply_builtin(BuiltIn::Max, ints(&[3, 1, 2])).unwrap(), Value::Int(3));
    assert_eq!(apply_builtin(BuiltIn::Avg, ints(&[1, 2, 3, 4])).unwrap(), Value::Int(2));
    assert_eq!(
        apply_builtin(BuiltIn::Min, ints(&[])),
        Err(RuntimeError::EmptyList)
    );
}

#[test]
fn constructor_application_tags_the_value() {
    let some = Value::con("SOME", None);
    assert_eq!(
        apply_value(&some, Value::Int(7)).unwrap(),
        Value::con("SOME", Some(Value::Int(7)))
    );
}
