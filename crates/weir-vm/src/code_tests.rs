use std::rc::Rc;

use weir_core::{BuiltIn, RuntimeError, Value};
use weir_ir::{NamedPat, Pat};
use weir_types::Type;

use super::builtins::apply_value;
use super::code::{Code, LinkCell, bind_pat};
use super::env::EvalEnv;

fn np(name: &str) -> NamedPat {
    NamedPat::new(name, 0, Type::int())
}

fn get(name: &str) -> Rc<Code> {
    Rc::new(Code::Get {
        name: name.into(),
        ordinal: 0,
    })
}

fn constant(v: Value) -> Rc<Code> {
    Rc::new(Code::Constant(v))
}

#[test]
fn constants_and_lookups() {
    let env = EvalEnv::empty().bind("x".into(), 0, Value::Int(42));
    assert_eq!(constant(Value::Int(1)).eval(&env).unwrap(), Value::Int(1));
    assert_eq!(get("x").eval(&env).unwrap(), Value::Int(42));
}

#[test]
fn ordinals_disambiguate_shadowed_names() {
    let env = EvalEnv::empty()
        .bind("x".into(), 0, Value::Int(1))
        .bind("x".into(), 1, Value::Int(2));
    assert_eq!(env.get("x", 0), Some(&Value::Int(1)));
    assert_eq!(env.get("x", 1), Some(&Value::Int(2)));
    assert_eq!(env.get_top("x"), Some(&Value::Int(2)));
}

#[test]
fn let_binds_patterns_in_sequence() {
    // let val c = 3 in c + 4 end
    let code = Code::Let {
        binds: vec![(Pat::Id(np("c")), constant(Value::Int(3)))],
        body: Rc::new(Code::ApplyBuiltin2 {
            builtin: BuiltIn::Add,
            arg0: get("c"),
            arg1: constant(Value::Int(4)),
        }),
    };
    assert_eq!(code.eval(&EvalEnv::empty()).unwrap(), Value::Int(7));
}

#[test]
fn let_bind_failure_is_a_runtime_error() {
    let code = Code::Let {
        binds: vec![(
            Pat::Literal {
                ty: Type::int(),
                value: Value::Int(1),
            },
            constant(Value::Int(2)),
        )],
        body: constant(Value::Unit),
    };
    assert!(matches!(
        code.eval(&EvalEnv::empty()),
        Err(RuntimeError::BindFailure { .. })
    ));
}

#[test]
fn case_selects_first_matching_arm() {
    let arms = Rc::new(vec![
        (
            Pat::Literal {
                ty: Type::int(),
                value: Value::Int(0),
            },
            constant(Value::string("zero")),
        ),
        (Pat::Id(np("n")), constant(Value::string("other"))),
        // Unreachable: the identifier above matches everything.
        (Pat::Wildcard(Type::int()), constant(Value::string("wild"))),
    ]);
    let case = |n: i64| Code::Case {
        scrutinee: constant(Value::Int(n)),
        arms: arms.clone(),
    };
    assert_eq!(case(0).eval(&EvalEnv::empty()).unwrap(), Value::string("zero"));
    assert_eq!(case(5).eval(&EvalEnv::empty()).unwrap(), Value::string("other"));
}

#[test]
fn closures_capture_their_environment() {
    // fn x => x + y  with y = 10 captured
    let arms = Rc::new(vec![(
        Pat::Id(np("x")),
        Rc::new(Code::ApplyBuiltin2 {
            builtin: BuiltIn::Add,
            arg0: get("x"),
            arg1: get("y"),
        }),
    )]);
    let closure = Code::Closure { arms };
    let env = EvalEnv::empty().bind("y".into(), 0, Value::Int(10));
    let f = closure.eval(&env).unwrap();
    assert_eq!(apply_value(&f, Value::Int(5)).unwrap(), Value::Int(15));
}

#[test]
fn short_circuit_logic() {
    // false andalso (1 div 0 = 0) must not evaluate the right side.
    let poison = Rc::new(Code::ApplyBuiltin2 {
        builtin: BuiltIn::Div,
        arg0: constant(Value::Int(1)),
        arg1: constant(Value::Int(0)),
    });
    let and = Code::AndAlso {
        left: constant(Value::Bool(false)),
        right: Rc::new(Code::ApplyBuiltin2 {
            builtin: BuiltIn::Eq,
            arg0: poison.clone(),
            arg1: constant(Value::Int(0)),
        }),
    };
    assert_eq!(and.eval(&EvalEnv::empty()).unwrap(), Value::Bool(false));

    let or = Code::OrElse {
        left: constant(Value::Bool(true)),
        right: Rc::new(Code::ApplyBuiltin2 {
            builtin: BuiltIn::Eq,
            arg0: poison,
            arg1: constant(Value::Int(0)),
        }),
    };
    assert_eq!(or.eval(&EvalEnv::empty()).unwrap(), Value::Bool(true));
}

#[test]
fn field_access_by_slot() {
    let record = constant(Value::list(vec![Value::Int(1), Value::string("a")]));
    let code = Code::Field {
        slot: 1,
        arg: record,
    };
    assert_eq!(code.eval(&EvalEnv::empty()).unwrap(), Value::string("a"));
}

#[test]
fn recursion_through_a_link() {
    // val rec len = fn [] => 0 | _ :: xs => 1 + len xs
    let int_list = Type::list(Type::int());
    let link = LinkCell::new();
    let arms = Rc::new(vec![
        (
            Pat::List {
                ty: int_list.clone(),
                args: vec![],
            },
            constant(Value::Int(0)),
        ),
        (
            Pat::Cons {
                ty: int_list.clone(),
                head: Box::new(Pat::Wildcard(Type::int())),
                tail: Box::new(Pat::Id(NamedPat::new("xs", 0, int_list.clone()))),
            },
            Rc::new(Code::ApplyBuiltin2 {
                builtin: BuiltIn::Add,
                arg0: constant(Value::Int(1)),
                arg1: Rc::new(Code::Apply {
                    func: Rc::new(Code::Link(link.clone())),
                    arg: get("xs"),
                }),
            }),
        ),
    ]);
    let closure_code = Rc::new(Code::Closure { arms });
    link.set(closure_code.clone());

    let len = closure_code.eval(&EvalEnv::empty()).unwrap();
    let arg = Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    assert_eq!(apply_value(&len, arg).unwrap(), Value::Int(3));
    assert_eq!(apply_value(&len, Value::list(vec![])).unwrap(), Value::Int(0));
}

#[test]
fn pattern_matching_shapes() {
    let env = EvalEnv::empty();
    let int = Type::int();

    // (a, b) against (1, 2)
    let tuple_pat = Pat::Tuple {
        ty: Rc::new(Type::Tuple(vec![int.clone(), int.clone()])),
        args: vec![Pat::Id(np("a")), Pat::Id(np("b"))],
    };
    let scope = bind_pat(
        &tuple_pat,
        &Value::list(vec![Value::Int(1), Value::Int(2)]),
        &env,
    )
    .expect("tuple matches");
    assert_eq!(scope.get("a", 0), Some(&Value::Int(1)));
    assert_eq!(scope.get("b", 0), Some(&Value::Int(2)));

    // SOME v against SOME 7 and NONE
    let opt_ty = Rc::new(Type::Data {
        name: "option".into(),
        args: vec![int.clone()],
    });
    let some_pat = Pat::Con {
        ty: opt_ty.clone(),
        name: "SOME".into(),
        arg: Box::new(Pat::Id(np("v"))),
    };
    let matched = bind_pat(&some_pat, &Value::con("SOME", Some(Value::Int(7))), &env)
        .expect("SOME matches");
    assert_eq!(matched.get("v", 0), Some(&Value::Int(7)));
    assert!(bind_pat(&some_pat, &Value::con("NONE", None), &env).is_none());

    // n as 3 :: rest
    let as_pat = Pat::As {
        name: NamedPat::new("whole", 0, Type::list(int.clone())),
        pat: Box::new(Pat::Cons {
            ty: Type::list(int.clone()),
            head: Box::new(Pat::Literal {
                ty: int.clone(),
                value: Value::Int(3),
            }),
            tail: Box::new(Pat::Wildcard(Type::list(int.clone()))),
        }),
    };
    let v = Value::list(vec![Value::Int(3), Value::Int(4)]);
    let scope = bind_pat(&as_pat, &v, &env).expect("as-pattern matches");
    assert_eq!(scope.get("whole", 0), Some(&v));
}
