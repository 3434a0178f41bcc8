//! Value semantics of the built-in basis.
//!
//! One implementation shared by the evaluator and the inliner's constant
//! folder. Binary built-ins take their arguments as a pair; `substring`
//! takes a triple. Overloaded built-ins dispatch on the value shape — the
//! type checker has already guaranteed the operands agree.

use std::rc::Rc;

use weir_core::{BuiltIn, RuntimeError, Value};

/// Apply any function value: a closure, a built-in, or a constructor
/// awaiting its argument.
pub fn apply_value(func: &Value, arg: Value) -> Result<Value, RuntimeError> {
    match func {
        Value::Closure(c) => c.apply(arg),
        Value::Builtin(b) => apply_builtin(*b, arg),
        Value::Con(name, None) => Ok(Value::Con(name.clone(), Some(Rc::new(arg)))),
        other => panic!("applied non-function {other:?} (type checker must reject this)"),
    }
}

/// Apply a built-in to its (possibly tupled) argument.
pub fn apply_builtin(b: BuiltIn, arg: Value) -> Result<Value, RuntimeError> {
    match b {
        BuiltIn::Add => arith(arg, i64::wrapping_add, |x, y| x + y),
        BuiltIn::Sub => arith(arg, i64::wrapping_sub, |x, y| x - y),
        BuiltIn::Mul => arith(arg, i64::wrapping_mul, |x, y| x * y),
        BuiltIn::Divide => {
            let (x, y) = pair(arg);
            match (x, y) {
                (Value::Real(x), Value::Real(y)) => Ok(Value::Real(x / y)),
                (Value::Int(x), Value::Int(y)) => {
                    if y == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(Value::Int(x / y))
                    }
                }
                other => panic!("bad operands for /: {other:?}"),
            }
        }
        BuiltIn::Div => {
            let (x, y) = int_pair(arg);
            if y == 0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                Ok(Value::Int(x.div_euclid(y)))
            }
        }
        BuiltIn::Mod => {
            let (x, y) = int_pair(arg);
            if y == 0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                Ok(Value::Int(x.rem_euclid(y)))
            }
        }
        BuiltIn::Negate => match arg {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Real(r) => Ok(Value::Real(-r)),
            other => panic!("bad operand for ~: {other:?}"),
        },
        BuiltIn::Abs => match arg {
            Value::Int(n) => Ok(Value::Int(n.abs())),
            Value::Real(r) => Ok(Value::Real(r.abs())),
            other => panic!("bad operand for abs: {other:?}"),
        },
        BuiltIn::Eq => {
            let (x, y) = pair(arg);
            Ok(Value::Bool(x == y))
        }
        BuiltIn::Ne => {
            let (x, y) = pair(arg);
            Ok(Value::Bool(x != y))
        }
        BuiltIn::Lt => compare(arg, |o| o.is_lt()),
        BuiltIn::Le => compare(arg, |o| o.is_le()),
        BuiltIn::Gt => compare(arg, |o| o.is_gt()),
        BuiltIn::Ge => compare(arg, |o| o.is_ge()),
        // Short-circuiting happens in the dedicated codes; these plain
        // forms serve the constant folder.
        BuiltIn::AndAlso => {
            let (x, y) = pair(arg);
            Ok(Value::Bool(x.ensure_bool() && y.ensure_bool()))
        }
        BuiltIn::OrElse => {
            let (x, y) = pair(arg);
            Ok(Value::Bool(x.ensure_bool() || y.ensure_bool()))
        }
        BuiltIn::Not => Ok(Value::Bool(!arg.ensure_bool())),
        BuiltIn::Cons => {
            let (head, tail) = pair(arg);
            let mut items = Vec::with_capacity(tail.ensure_list().len() + 1);
            items.push(head);
            items.extend(tail.ensure_list().iter().cloned());
            Ok(Value::list(items))
        }
        BuiltIn::Append => {
            let (xs, ys) = pair(arg);
            let mut items = xs.ensure_list().as_ref().clone();
            items.extend(ys.ensure_list().iter().cloned());
            Ok(Value::list(items))
        }
        BuiltIn::Elem => {
            let (x, xs) = pair(arg);
            Ok(Value::Bool(xs.ensure_list().contains(&x)))
        }
        BuiltIn::NotElem => {
            let (x, xs) = pair(arg);
            Ok(Value::Bool(!xs.ensure_list().contains(&x)))
        }
        BuiltIn::Hd => {
            let items = arg.ensure_list();
            items.first().cloned().ok_or(RuntimeError::EmptyList)
        }
        BuiltIn::Tl => {
            let items = arg.ensure_list();
            if items.is_empty() {
                Err(RuntimeError::EmptyList)
            } else {
                Ok(Value::list(items[1..].to_vec()))
            }
        }
        BuiltIn::ListLength => Ok(Value::Int(arg.ensure_list().len() as i64)),
        BuiltIn::ListRev => {
            let mut items = arg.ensure_list().as_ref().clone();
            items.reverse();
            Ok(Value::list(items))
        }
        BuiltIn::ListMap => {
            let (f, xs) = pair(arg);
            let mut out = Vec::with_capacity(xs.ensure_list().len());
            for item in xs.ensure_list().iter() {
                out.push(apply_value(&f, item.clone())?);
            }
            Ok(Value::list(out))
        }
        BuiltIn::ListFilter => {
            let (f, xs) = pair(arg);
            let mut out = Vec::new();
            for item in xs.ensure_list().iter() {
                if apply_value(&f, item.clone())?.ensure_bool() {
                    out.push(item.clone());
                }
            }
            Ok(Value::list(out))
        }
        BuiltIn::StrSize => match arg {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => panic!("bad operand for size: {other:?}"),
        },
        BuiltIn::Concat => {
            let (x, y) = pair(arg);
            match (x, y) {
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::string(format!("{a}{b}")))
                }
                other => panic!("bad operands for ^: {other:?}"),
            }
        }
        BuiltIn::Substring => {
            let items = arg.ensure_list();
            assert!(items.len() == 3, "substring takes a triple");
            let (s, i, n) = (&items[0], &items[1], &items[2]);
            let (i, n) = (i.ensure_int(), n.ensure_int());
            match s {
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    if i < 0 || n < 0 || (i + n) as usize > chars.len() {
                        return Err(RuntimeError::Subscript);
                    }
                    let out: String = chars[i as usize..(i + n) as usize].iter().collect();
                    Ok(Value::string(out))
                }
                other => panic!("bad operand for substring: {other:?}"),
            }
        }
        BuiltIn::Sum => fold_sum(arg),
        BuiltIn::Count => Ok(Value::Int(arg.ensure_list().len() as i64)),
        BuiltIn::Min => extremum(arg, |a, b| a < b),
        BuiltIn::Max => extremum(arg, |a, b| a > b),
        BuiltIn::Avg => {
            let items = arg.ensure_list();
            if items.is_empty() {
                return Err(RuntimeError::EmptyList);
            }
            let n = items.len() as i64;
            match fold_sum(Value::List(items.clone()))? {
                Value::Int(total) => Ok(Value::Int(total.div_euclid(n))),
                Value::Real(total) => Ok(Value::Real(total / n as f64)),
                other => panic!("bad sum for avg: {other:?}"),
            }
        }
    }
}

fn pair(arg: Value) -> (Value, Value) {
    let (a, b) = arg.ensure_pair();
    (a.clone(), b.clone())
}

fn int_pair(arg: Value) -> (i64, i64) {
    let (a, b) = arg.ensure_pair();
    (a.ensure_int(), b.ensure_int())
}

fn arith(
    arg: Value,
    int_op: fn(i64, i64) -> i64,
    real_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    let (x, y) = pair(arg);
    match (x, y) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(x, y))),
        (Value::Real(x), Value::Real(y)) => Ok(Value::Real(real_op(x, y))),
        other => panic!("bad operands for arithmetic: {other:?}"),
    }
}

fn compare(arg: Value, pick: fn(std::cmp::Ordering) -> bool) -> Result<Value, RuntimeError> {
    let (x, y) = pair(arg);
    if x.is_fn() || y.is_fn() {
        return Err(RuntimeError::Unordered);
    }
    Ok(Value::Bool(pick(x.cmp(&y))))
}

fn fold_sum(arg: Value) -> Result<Value, RuntimeError> {
    let items = arg.ensure_list();
    let mut iter = items.iter();
    match iter.next() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(first)) => {
            let mut total = *first;
            for item in iter {
                total = total.wrapping_add(item.ensure_int());
            }
            Ok(Value::Int(total))
        }
        Some(Value::Real(first)) => {
            let mut total = *first;
            for item in iter {
                match item {
                    Value::Real(r) => total += r,
                    other => panic!("mixed sum over {other:?}"),
                }
            }
            Ok(Value::Real(total))
        }
        Some(other) => panic!("bad element for sum: {other:?}"),
    }
}

fn extremum(arg: Value, better: fn(&Value, &Value) -> bool) -> Result<Value, RuntimeError> {
    let items = arg.ensure_list();
    let mut iter = items.iter();
    let mut best = iter.next().ok_or(RuntimeError::EmptyList)?.clone();
    for item in iter {
        if better(item, &best) {
            best = item.clone();
        }
    }
    Ok(best)
}
