//! Types for the built-in basis and construction of the initial
//! environment.

use std::rc::Rc;

use weir_core::{BuiltIn, Value};
use weir_ir::NamedPat;
use weir_types::Type;

use crate::env::{Binding, Environment};

/// The (possibly overloaded) type of a built-in.
pub fn builtin_type(b: BuiltIn) -> Rc<Type> {
    let int = Type::int;
    let real = Type::real;
    let bool_ = Type::bool;
    let string = Type::string;
    let char_ = Type::char;
    // A binary operator over one primitive: t * t -> r.
    let bin = |t: Rc<Type>, r: Rc<Type>| Type::func(Rc::new(Type::Tuple(vec![t.clone(), t])), r);

    match b {
        BuiltIn::Add | BuiltIn::Sub | BuiltIn::Mul | BuiltIn::Divide => Type::multi(vec![
            bin(int(), int()),
            bin(real(), real()),
        ]),
        BuiltIn::Div | BuiltIn::Mod => bin(int(), int()),
        BuiltIn::Negate | BuiltIn::Abs => Type::multi(vec![
            Type::func(int(), int()),
            Type::func(real(), real()),
        ]),
        BuiltIn::Eq | BuiltIn::Ne => Type::forall(1, bin(Type::var(0), bool_())),
        BuiltIn::Lt | BuiltIn::Le | BuiltIn::Gt | BuiltIn::Ge => Type::multi(vec![
            bin(int(), bool_()),
            bin(real(), bool_()),
            bin(string(), bool_()),
            bin(char_(), bool_()),
        ]),
        BuiltIn::AndAlso | BuiltIn::OrElse => bin(bool_(), bool_()),
        BuiltIn::Not => Type::func(bool_(), bool_()),
        BuiltIn::Cons => Type::forall(
            1,
            Type::func(
                Rc::new(Type::Tuple(vec![Type::var(0), Type::list(Type::var(0))])),
                Type::list(Type::var(0)),
            ),
        ),
        BuiltIn::Append => Type::forall(
            1,
            Type::func(
                Rc::new(Type::Tuple(vec![
                    Type::list(Type::var(0)),
                    Type::list(Type::var(0)),
                ])),
                Type::list(Type::var(0)),
            ),
        ),
        BuiltIn::Elem | BuiltIn::NotElem => Type::multi(vec![
            Type::forall(
                1,
                Type::func(
                    Rc::new(Type::Tuple(vec![Type::var(0), Type::list(Type::var(0))])),
                    bool_(),
                ),
            ),
            Type::forall(
                1,
                Type::func(
                    Rc::new(Type::Tuple(vec![Type::var(0), Type::bag(Type::var(0))])),
                    bool_(),
                ),
            ),
        ]),
        BuiltIn::Hd => Type::forall(1, Type::func(Type::list(Type::var(0)), Type::var(0))),
        BuiltIn::Tl => Type::forall(
            1,
            Type::func(Type::list(Type::var(0)), Type::list(Type::var(0))),
        ),
        BuiltIn::ListLength => Type::multi(vec![
            Type::forall(1, Type::func(Type::list(Type::var(0)), int())),
            Type::forall(1, Type::func(Type::bag(Type::var(0)), int())),
        ]),
        BuiltIn::ListRev => Type::forall(
            1,
            Type::func(Type::list(Type::var(0)), Type::list(Type::var(0))),
        ),
        BuiltIn::ListMap => Type::forall(
            2,
            Type::func(
                Rc::new(Type::Tuple(vec![
                    Type::func(Type::var(0), Type::var(1)),
                    Type::list(Type::var(0)),
                ])),
                Type::list(Type::var(1)),
            ),
        ),
        BuiltIn::ListFilter => Type::forall(
            1,
            Type::func(
                Rc::new(Type::Tuple(vec![
                    Type::func(Type::var(0), bool_()),
                    Type::list(Type::var(0)),
                ])),
                Type::list(Type::var(0)),
            ),
        ),
        BuiltIn::StrSize => Type::func(string(), int()),
        BuiltIn::Concat => bin(string(), string()),
        BuiltIn::Substring => Type::func(
            Rc::new(Type::Tuple(vec![string(), int(), int()])),
            string(),
        ),
        BuiltIn::Sum => collection_agg(&[(int(), int()), (real(), real())]),
        BuiltIn::Count => Type::multi(vec![
            Type::forall(1, Type::func(Type::list(Type::var(0)), int())),
            Type::forall(1, Type::func(Type::bag(Type::var(0)), int())),
        ]),
        BuiltIn::Min | BuiltIn::Max => collection_agg(&[
            (int(), int()),
            (real(), real()),
            (string(), string()),
        ]),
        BuiltIn::Avg => collection_agg(&[(int(), int()), (real(), real())]),
    }
}

/// An aggregate overloaded over list and bag inputs for each element/result
/// pair.
fn collection_agg(pairs: &[(Rc<Type>, Rc<Type>)]) -> Rc<Type> {
    let mut candidates = Vec::with_capacity(pairs.len() * 2);
    for (elem, result) in pairs {
        candidates.push(Type::func(Type::list(elem.clone()), result.clone()));
        candidates.push(Type::func(Type::bag(elem.clone()), result.clone()));
    }
    Type::multi(candidates)
}

/// The initial environment: every built-in bound as a plain value.
pub fn initial_environment() -> Environment {
    let mut env = Environment::empty();
    for b in BuiltIn::all() {
        env = env.bind(Binding::val(
            NamedPat::new(b.name(), 0, builtin_type(b)),
            Value::Builtin(b),
        ));
    }
    env
}
