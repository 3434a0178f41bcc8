use std::rc::Rc;

use weir_core::{BuiltIn, Value};
use weir_ir::builder::{apply2, id, int_literal};
use weir_ir::{Bind, Exp, MatchArm, NamedPat, Pat};
use weir_types::Type;

use super::env::Environment;
use super::inline::optimize;
use super::simplify::simplify;

fn np(name: &str) -> NamedPat {
    NamedPat::new(name, 0, Type::int())
}

fn opt(exp: &Rc<Exp>) -> Rc<Exp> {
    optimize(&Environment::empty(), exp, 5)
}

#[test]
fn let_of_constant_folds_to_literal() {
    // let val c = 3 in c + 4 end  ==>  7
    let exp = Rc::new(Exp::Let {
        rec: false,
        binds: vec![Bind {
            pat: Pat::Id(np("c")),
            exp: int_literal(3),
        }],
        body: apply2(Type::int(), BuiltIn::Add, id(np("c")), int_literal(4)),
    });
    let result = opt(&exp);
    assert_eq!(result.as_literal(), Some(&Value::Int(7)));
    assert_eq!(result.ty().to_string(), "int");
}

#[test]
fn dead_bindings_disappear() {
    let expensive = apply2(
        Type::int(),
        BuiltIn::Mul,
        id(np("unknown")),
        id(np("unknown")),
    );
    let exp = Rc::new(Exp::Let {
        rec: false,
        binds: vec![Bind {
            pat: Pat::Id(np("dead")),
            exp: expensive,
        }],
        body: int_literal(5),
    });
    assert_eq!(opt(&exp).as_literal(), Some(&Value::Int(5)));
}

#[test]
fn beta_reduction_turns_application_into_let() {
    // (fn x => x + 1) 41  ==>  42
    let f = Rc::new(Exp::Fn {
        ty: Type::func(Type::int(), Type::int()),
        arms: Rc::new(vec![MatchArm {
            pat: Pat::Id(np("x")),
            exp: apply2(Type::int(), BuiltIn::Add, id(np("x")), int_literal(1)),
        }]),
    });
    let exp = Rc::new(Exp::Apply {
        ty: Type::int(),
        func: f,
        arg: int_literal(41),
    });
    assert_eq!(opt(&exp).as_literal(), Some(&Value::Int(42)));
}

#[test]
fn selector_over_record_construction_folds() {
    // #2 (x, 7)  ==>  7 even though x is unknown.
    let pair_ty = Rc::new(Type::Tuple(vec![Type::int(), Type::int()]));
    let record = Rc::new(Exp::Tuple {
        ty: pair_ty.clone(),
        args: vec![id(np("x")), int_literal(7)],
    });
    let exp = Rc::new(Exp::Apply {
        ty: Type::int(),
        func: Rc::new(Exp::Select {
            ty: Type::func(pair_ty, Type::int()),
            field: "2".into(),
            slot: 1,
        }),
        arg: record,
    });
    assert_eq!(opt(&exp).as_literal(), Some(&Value::Int(7)));
}

#[test]
fn case_over_known_constructor_selects_its_arm() {
    let opt_ty = Rc::new(Type::Data {
        name: "option".into(),
        args: vec![Type::int()],
    });
    let exp = Rc::new(Exp::Case {
        ty: Type::int(),
        scrutinee: Rc::new(Exp::Literal {
            ty: opt_ty.clone(),
            value: Value::con("SOME", Some(Value::Int(9))),
        }),
        arms: Rc::new(vec![
            MatchArm {
                pat: Pat::Con0 {
                    ty: opt_ty.clone(),
                    name: "NONE".into(),
                },
                exp: int_literal(0),
            },
            MatchArm {
                pat: Pat::Con {
                    ty: opt_ty.clone(),
                    name: "SOME".into(),
                    arg: Box::new(Pat::Id(np("v"))),
                },
                exp: id(np("v")),
            },
        ]),
    });
    // The case disappears; what remains must not be a case.
    let result = opt(&exp);
    assert!(
        !matches!(result.as_ref(), Exp::Case { .. }),
        "case survived: {result}"
    );
}

#[test]
fn recursive_bindings_are_never_inlined() {
    let fn_ty = Type::func(Type::int(), Type::int());
    let body = Rc::new(Exp::Apply {
        ty: Type::int(),
        func: id(NamedPat::new("f", 0, fn_ty.clone())),
        arg: int_literal(1),
    });
    let f = Rc::new(Exp::Fn {
        ty: fn_ty.clone(),
        arms: Rc::new(vec![MatchArm {
            pat: Pat::Id(np("n")),
            exp: Rc::new(Exp::Apply {
                ty: Type::int(),
                func: id(NamedPat::new("f", 0, fn_ty.clone())),
                arg: id(np("n")),
            }),
        }]),
    });
    let exp = Rc::new(Exp::Let {
        rec: true,
        binds: vec![Bind {
            pat: Pat::Id(NamedPat::new("f", 0, fn_ty)),
            exp: f,
        }],
        body,
    });
    let result = opt(&exp);
    assert!(
        matches!(result.as_ref(), Exp::Let { rec: true, .. }),
        "recursive let must survive: {result}"
    );
}

#[test]
fn subtraction_identities() {
    let x = || id(np("x"));
    let y = || id(np("y"));
    let z = || id(np("z"));
    let add = |a, b| apply2(Type::int(), BuiltIn::Add, a, b);
    let sub = |a, b| apply2(Type::int(), BuiltIn::Sub, a, b);

    // (x + y) - x  ==>  y
    assert_eq!(simplify(&sub(add(x(), y()), x())), y());
    // (y + x) - x  ==>  y
    assert_eq!(simplify(&sub(add(y(), x()), x())), y());
    // (x + y) - (x + z)  ==>  y - z
    assert_eq!(simplify(&sub(add(x(), y()), add(x(), z()))), sub(y(), z()));
    // (x + 5) - 2  ==>  x + 3
    assert_eq!(
        simplify(&sub(add(x(), int_literal(5)), int_literal(2))),
        add(x(), int_literal(3))
    );
    // (x + 5) + 2  ==>  x + 7
    assert_eq!(
        simplify(&add(add(x(), int_literal(5)), int_literal(2))),
        add(x(), int_literal(7))
    );
}

#[test]
fn constant_folding_is_recursive() {
    // (1 + 2) * (10 - 4)  ==>  18
    let sum = apply2(Type::int(), BuiltIn::Add, int_literal(1), int_literal(2));
    let diff = apply2(Type::int(), BuiltIn::Sub, int_literal(10), int_literal(4));
    let product = apply2(Type::int(), BuiltIn::Mul, sum, diff);
    assert_eq!(simplify(&product).as_literal(), Some(&Value::Int(18)));
}

#[test]
fn division_is_not_folded() {
    // 1 div 0 must keep its runtime error site.
    let exp = apply2(Type::int(), BuiltIn::Div, int_literal(1), int_literal(0));
    assert!(matches!(simplify(&exp).as_ref(), Exp::Apply { .. }));
}

#[test]
fn once_used_binding_substitutes() {
    // let val t = unknown + 1 in t end  ==>  unknown + 1
    let bound = apply2(Type::int(), BuiltIn::Add, id(np("unknown")), int_literal(1));
    let exp = Rc::new(Exp::Let {
        rec: false,
        binds: vec![Bind {
            pat: Pat::Id(np("t")),
            exp: bound.clone(),
        }],
        body: id(np("t")),
    });
    assert_eq!(opt(&exp), bound);
}

#[test]
fn multiply_used_non_atomic_binding_stays() {
    // let val t = unknown + 1 in t + t end keeps the binding.
    let bound = apply2(Type::int(), BuiltIn::Add, id(np("unknown")), int_literal(1));
    let exp = Rc::new(Exp::Let {
        rec: false,
        binds: vec![Bind {
            pat: Pat::Id(np("t")),
            exp: bound,
        }],
        body: apply2(Type::int(), BuiltIn::Add, id(np("t")), id(np("t"))),
    });
    assert!(matches!(opt(&exp).as_ref(), Exp::Let { .. }));
}
