//! Algebraic simplification.
//!
//! Bottom-up rewriting of arithmetic identities:
//!
//! - `(x + y) - x ⇒ y` and `(y + x) - x ⇒ y`;
//! - `(a + b) - (c + d) ⇒` the difference of the unmatched operands when
//!   one operand is shared, in all four positions;
//! - `(x + c₁) - c₂ ⇒ x + (c₁ - c₂)` and `(x + c₁) + c₂ ⇒ x + (c₁ + c₂)`;
//! - constant folding for integer `+`, `-` and `*`.
//!
//! Operand equality is structural equality on the core IR, nothing less.
//! All rewrites preserve types; the fixed-point driver lives with the
//! inliner.

use std::rc::Rc;

use weir_core::{BuiltIn, Value};
use weir_ir::builder;
use weir_ir::{Bind, Exp, MatchArm};
use weir_vm::builtins::apply_builtin;

/// One bottom-up simplification pass.
pub fn simplify(exp: &Rc<Exp>) -> Rc<Exp> {
    match exp.as_ref() {
        Exp::Literal { .. } | Exp::Id(_) | Exp::Select { .. } | Exp::Extent { .. } => exp.clone(),
        Exp::Fn { ty, arms } => Rc::new(Exp::Fn {
            ty: ty.clone(),
            arms: Rc::new(simplify_arms(arms)),
        }),
        Exp::Apply { ty, func, arg } => {
            let func = simplify(func);
            let arg = simplify(arg);
            rewrite_apply(ty.clone(), func, arg)
        }
        Exp::Let { rec, binds, body } => Rc::new(Exp::Let {
            rec: *rec,
            binds: binds
                .iter()
                .map(|bind| Bind {
                    pat: bind.pat.clone(),
                    exp: simplify(&bind.exp),
                })
                .collect(),
            body: simplify(body),
        }),
        Exp::Tuple { ty, args } => Rc::new(Exp::Tuple {
            ty: ty.clone(),
            args: args.iter().map(simplify).collect(),
        }),
        Exp::Case {
            ty,
            scrutinee,
            arms,
        } => Rc::new(Exp::Case {
            ty: ty.clone(),
            scrutinee: simplify(scrutinee),
            arms: Rc::new(simplify_arms(arms)),
        }),
        Exp::From { ty, steps } => {
            let mut b = weir_ir::FromBuilder::new();
            for step in steps {
                crate::ground::rebuild_step(&mut b, step, &mut |e| simplify(e));
            }
            b.build(ty.clone())
        }
    }
}

fn simplify_arms(arms: &[MatchArm]) -> Vec<MatchArm> {
    arms.iter()
        .map(|arm| MatchArm {
            pat: arm.pat.clone(),
            exp: simplify(&arm.exp),
        })
        .collect()
}

fn rewrite_apply(ty: Rc<weir_types::Type>, func: Rc<Exp>, arg: Rc<Exp>) -> Rc<Exp> {
    let rebuilt = || {
        Rc::new(Exp::Apply {
            ty: ty.clone(),
            func: func.clone(),
            arg: arg.clone(),
        })
    };
    let Some(b) = func.as_builtin() else {
        return rebuilt();
    };
    let Exp::Tuple { args, .. } = arg.as_ref() else {
        return rebuilt();
    };
    if args.len() != 2 {
        return rebuilt();
    }
    let (a0, a1) = (&args[0], &args[1]);

    // Integer constant folding; division stays put so its error site
    // survives.
    if matches!(b, BuiltIn::Add | BuiltIn::Sub | BuiltIn::Mul) {
        if let (Some(Value::Int(_)), Some(Value::Int(_))) = (a0.as_literal(), a1.as_literal()) {
            let folded = apply_builtin(
                b,
                Value::list(vec![
                    a0.as_literal().expect("checked").clone(),
                    a1.as_literal().expect("checked").clone(),
                ]),
            )
            .expect("integer + - * cannot fail");
            return builder::literal(ty, folded);
        }
    }

    match b {
        BuiltIn::Sub => {
            if let Some((x, y)) = as_add(a0) {
                // (x + y) - x and (y + x) - x.
                if x == a1 {
                    return y.clone();
                }
                if y == a1 {
                    return x.clone();
                }
                // (a + b) - (c + d) with one shared operand.
                if let Some((c, d)) = as_add(a1) {
                    if x == c {
                        return builder::apply2(ty, BuiltIn::Sub, y.clone(), d.clone());
                    }
                    if x == d {
                        return builder::apply2(ty, BuiltIn::Sub, y.clone(), c.clone());
                    }
                    if y == c {
                        return builder::apply2(ty, BuiltIn::Sub, x.clone(), d.clone());
                    }
                    if y == d {
                        return builder::apply2(ty, BuiltIn::Sub, x.clone(), c.clone());
                    }
                }
                // (x + c1) - c2  ⇒  x + (c1 - c2).
                if let (Some(c1), Some(c2)) = (int_lit(y), int_lit(a1)) {
                    return builder::apply2(
                        ty,
                        BuiltIn::Add,
                        x.clone(),
                        builder::int_literal(c1.wrapping_sub(c2)),
                    );
                }
            }
        }
        BuiltIn::Add => {
            // (x + c1) + c2  ⇒  x + (c1 + c2).
            if let Some((x, y)) = as_add(a0) {
                if let (Some(c1), Some(c2)) = (int_lit(y), int_lit(a1)) {
                    return builder::apply2(
                        ty,
                        BuiltIn::Add,
                        x.clone(),
                        builder::int_literal(c1.wrapping_add(c2)),
                    );
                }
            }
        }
        _ => {}
    }
    rebuilt()
}

/// The operands of a `+` application.
fn as_add(exp: &Rc<Exp>) -> Option<(&Rc<Exp>, &Rc<Exp>)> {
    let Exp::Apply { func, arg, .. } = exp.as_ref() else {
        return None;
    };
    if func.as_builtin() != Some(BuiltIn::Add) {
        return None;
    }
    let Exp::Tuple { args, .. } = arg.as_ref() else {
        return None;
    };
    if args.len() != 2 {
        return None;
    }
    Some((&args[0], &args[1]))
}

fn int_lit(exp: &Rc<Exp>) -> Option<i64> {
    match exp.as_literal() {
        Some(Value::Int(n)) => Some(*n),
        _ => None,
    }
}
