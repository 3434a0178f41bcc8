//! Usage analysis and inlining.
//!
//! Each bound identifier classifies as `Dead` (never referenced), `Atomic`
//! (its bound expression is safe to duplicate), `OnceSafe` (one reference,
//! not under a binder that could evaluate repeatedly), or `MultiUnsafe`.
//! Dead bindings drop, atomic and once-safe bindings substitute into their
//! bodies, beta-redexes become lets, field selections over records fold,
//! and cases over known values reduce to the first matching arm.
//!
//! References to previously-compiled top-level bindings inline only when
//! the bound core expression is atomic or a closed non-recursive function;
//! recursive functions never inline.
//!
//! [`optimize`] alternates one inlining pass with one simplifier pass to a
//! fixed point, bounded by the session's pass budget. Progress is decided
//! by structural equality on the core IR.

use std::collections::HashMap;
use std::rc::Rc;

use weir_ir::{Bind, Exp, MatchArm, NamedPat, Pat, Step};
use weir_core::Value;

use crate::env::Environment;
use crate::simplify::simplify;

type VarKey = (Rc<str>, u32);

fn key(pat: &NamedPat) -> VarKey {
    (pat.name.clone(), pat.ordinal)
}

/// How a binding is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Dead,
    Atomic,
    OnceSafe,
    MultiUnsafe,
}

#[derive(Debug, Clone, Copy, Default)]
struct UseCount {
    count: usize,
    under_binder: bool,
}

/// Count identifier references, tracking whether any occur under a binder
/// (function bodies and query steps evaluate repeatedly).
pub(crate) fn count_uses(exp: &Rc<Exp>, counts: &mut HashMap<VarKey, UseCount>, under: bool) {
    match exp.as_ref() {
        Exp::Id(id) => {
            let entry = counts.entry(key(id)).or_default();
            entry.count += 1;
            entry.under_binder |= under;
        }
        Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => {}
        Exp::Fn { arms, .. } => {
            for arm in arms.iter() {
                count_uses(&arm.exp, counts, true);
            }
        }
        Exp::Apply { func, arg, .. } => {
            count_uses(func, counts, under);
            count_uses(arg, counts, under);
        }
        Exp::Let { binds, body, .. } => {
            for bind in binds {
                count_uses(&bind.exp, counts, under);
            }
            count_uses(body, counts, under);
        }
        Exp::Tuple { args, .. } => {
            for arg in args {
                count_uses(arg, counts, under);
            }
        }
        Exp::Case {
            scrutinee, arms, ..
        } => {
            count_uses(scrutinee, counts, under);
            for arm in arms.iter() {
                count_uses(&arm.exp, counts, under);
            }
        }
        Exp::From { steps, .. } => {
            for (i, step) in steps.iter().enumerate() {
                // The first scanned collection evaluates once; everything
                // downstream runs per row.
                let repeated = i > 0 || !matches!(step, Step::Scan { .. });
                for sub in crate::ground::step_exprs(step) {
                    count_uses(&sub, counts, under || repeated);
                }
            }
        }
    }
}

fn classify(bound: &Rc<Exp>, uses: Option<&UseCount>) -> Usage {
    let uses = uses.copied().unwrap_or_default();
    if uses.count == 0 {
        return Usage::Dead;
    }
    if bound.is_atomic() {
        return Usage::Atomic;
    }
    if uses.count == 1 && !uses.under_binder {
        return Usage::OnceSafe;
    }
    Usage::MultiUnsafe
}

/// One inlining pass over a core expression.
pub fn inline(env: &Environment, exp: &Rc<Exp>) -> Rc<Exp> {
    let mut inliner = Inliner {
        env,
        subst: HashMap::new(),
    };
    inliner.exp(exp)
}

/// Inline and simplify alternately until nothing changes, bounded by
/// `passes`.
pub fn optimize(env: &Environment, exp: &Rc<Exp>, passes: usize) -> Rc<Exp> {
    let mut current = exp.clone();
    for pass in 0..passes.max(1) {
        let next = simplify(&inline(env, &current));
        if next == current {
            tracing::debug!(pass, "optimizer reached fixed point");
            break;
        }
        current = next;
    }
    current
}

struct Inliner<'a> {
    env: &'a Environment,
    subst: HashMap<VarKey, Rc<Exp>>,
}

impl Inliner<'_> {
    fn exp(&mut self, exp: &Rc<Exp>) -> Rc<Exp> {
        match exp.as_ref() {
            Exp::Id(id) => {
                if let Some(replacement) = self.subst.get(&key(id)) {
                    return replacement.clone();
                }
                self.top_level(id).unwrap_or_else(|| exp.clone())
            }
            Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => exp.clone(),
            Exp::Fn { ty, arms } => Rc::new(Exp::Fn {
                ty: ty.clone(),
                arms: Rc::new(self.arms(arms)),
            }),
            Exp::Apply { ty, func, arg } => {
                let func = self.exp(func);
                let arg = self.exp(arg);
                // Beta: (fn x => e) a  ==>  let x = a in e.
                if let Exp::Fn { arms, .. } = func.as_ref() {
                    if arms.len() == 1 {
                        let arm = &arms[0];
                        return Rc::new(Exp::Let {
                            rec: false,
                            binds: vec![Bind {
                                pat: arm.pat.clone(),
                                exp: arg,
                            }],
                            body: arm.exp.clone(),
                        });
                    }
                }
                // #field over a record construction folds to the field.
                if let Exp::Select { slot, .. } = func.as_ref() {
                    if let Exp::Tuple { args, .. } = arg.as_ref() {
                        if args.iter().all(|a| a.is_atomic()) {
                            return args[*slot].clone();
                        }
                    }
                    if let Exp::Literal { value, ty: lit_ty } = arg.as_ref() {
                        if let Value::List(items) = value {
                            let field_ty = lit_ty
                                .field_types()
                                .map(|fs| fs[*slot].clone())
                                .unwrap_or_else(|| ty.clone());
                            return Rc::new(Exp::Literal {
                                ty: field_ty,
                                value: items[*slot].clone(),
                            });
                        }
                    }
                }
                Rc::new(Exp::Apply { ty: ty.clone(), func, arg })
            }
            Exp::Let {
                rec: false,
                binds,
                body,
            } => self.inline_let(binds, body),
            Exp::Let {
                rec: true,
                binds,
                body,
            } => {
                // Recursive bindings never inline.
                let binds = binds
                    .iter()
                    .map(|bind| Bind {
                        pat: bind.pat.clone(),
                        exp: self.exp(&bind.exp),
                    })
                    .collect();
                Rc::new(Exp::Let {
                    rec: true,
                    binds,
                    body: self.exp(body),
                })
            }
            Exp::Tuple { ty, args } => Rc::new(Exp::Tuple {
                ty: ty.clone(),
                args: args.iter().map(|a| self.exp(a)).collect(),
            }),
            Exp::Case {
                ty,
                scrutinee,
                arms,
            } => self.inline_case(ty, scrutinee, arms),
            Exp::From { ty, steps } => {
                let mut b = weir_ir::FromBuilder::new();
                for step in steps {
                    crate::ground::rebuild_step(&mut b, step, &mut |e| self.exp(e));
                }
                b.build(ty.clone())
            }
        }
    }

    fn arms(&mut self, arms: &[MatchArm]) -> Vec<MatchArm> {
        arms.iter()
            .map(|arm| MatchArm {
                pat: arm.pat.clone(),
                exp: self.exp(&arm.exp),
            })
            .collect()
    }

    /// A reference to a previously-compiled binding: inline atomic values
    /// and closed non-recursive functions.
    fn top_level(&self, id: &NamedPat) -> Option<Rc<Exp>> {
        let binding = self.env.get_ordinal(&id.name, id.ordinal)?;
        let core = binding.core_exp()?;
        if core.is_atomic() {
            return Some(core.clone());
        }
        if let Exp::Fn { arms, .. } = core.as_ref() {
            let mut free = Vec::new();
            free_vars(core, &mut Vec::new(), &mut free);
            let recursive = free.iter().any(|k| *k == key(id));
            if free.is_empty() && !recursive {
                let _ = arms;
                return Some(core.clone());
            }
        }
        None
    }

    fn inline_let(&mut self, binds: &[Bind], body: &Rc<Exp>) -> Rc<Exp> {
        let mut kept: Vec<Bind> = Vec::new();
        let mut local: Vec<VarKey> = Vec::new();
        for bind in binds {
            let bound = self.exp(&bind.exp);
            match &bind.pat {
                Pat::Id(id) => {
                    // Count uses in everything downstream of this binding.
                    let mut counts = HashMap::new();
                    for later in binds.iter().skip_while(|b2| !std::ptr::eq(*b2, bind)).skip(1)
                    {
                        count_uses(&later.exp, &mut counts, false);
                    }
                    count_uses(body, &mut counts, false);
                    match classify(&bound, counts.get(&key(id))) {
                        Usage::Dead => {}
                        Usage::Atomic | Usage::OnceSafe => {
                            let k = key(id);
                            self.subst.insert(k.clone(), bound);
                            local.push(k);
                        }
                        Usage::MultiUnsafe => kept.push(Bind {
                            pat: bind.pat.clone(),
                            exp: bound,
                        }),
                    }
                }
                _ => kept.push(Bind {
                    pat: bind.pat.clone(),
                    exp: bound,
                }),
            }
        }
        let body = self.exp(body);
        for k in &local {
            self.subst.remove(k);
        }
        if kept.is_empty() {
            body
        } else {
            Rc::new(Exp::Let {
                rec: false,
                binds: kept,
                body,
            })
        }
    }

    fn inline_case(
        &mut self,
        ty: &Rc<weir_types::Type>,
        scrutinee: &Rc<Exp>,
        arms: &[MatchArm],
    ) -> Rc<Exp> {
        let scrutinee = self.exp(scrutinee);
        let arms_out = self.arms(arms);

        // A known scrutinee selects its arm statically.
        if let Some(value) = scrutinee.as_literal() {
            for arm in &arms_out {
                match match_static(&arm.pat, value) {
                    Some(true) => {
                        return Rc::new(Exp::Let {
                            rec: false,
                            binds: vec![Bind {
                                pat: arm.pat.clone(),
                                exp: scrutinee.clone(),
                            }],
                            body: arm.exp.clone(),
                        });
                    }
                    Some(false) => continue,
                    None => break,
                }
            }
        }

        // A singleton match against an identifier is a let.
        if arms_out.len() == 1 {
            let arm = &arms_out[0];
            match &arm.pat {
                Pat::Id(_) | Pat::Wildcard(_) => {
                    return Rc::new(Exp::Let {
                        rec: false,
                        binds: vec![Bind {
                            pat: arm.pat.clone(),
                            exp: scrutinee,
                        }],
                        body: arm.exp.clone(),
                    });
                }
                Pat::Tuple { args: pat_args, .. } => {
                    // A tuple of identifiers against a tuple of atomic
                    // arguments substitutes directly.
                    if let Exp::Tuple { args, .. } = scrutinee.as_ref() {
                        let all_ids = pat_args.iter().all(|p| matches!(p, Pat::Id(_)));
                        if all_ids && args.iter().all(|a| a.is_atomic()) {
                            let binds = pat_args
                                .iter()
                                .zip(args)
                                .map(|(p, a)| Bind {
                                    pat: p.clone(),
                                    exp: a.clone(),
                                })
                                .collect();
                            return Rc::new(Exp::Let {
                                rec: false,
                                binds,
                                body: arm.exp.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        Rc::new(Exp::Case {
            ty: ty.clone(),
            scrutinee,
            arms: Rc::new(arms_out),
        })
    }
}

/// Can the pattern be decided against this value without running code?
fn match_static(pat: &Pat, value: &Value) -> Option<bool> {
    match pat {
        Pat::Wildcard(_) | Pat::Id(_) => Some(true),
        Pat::Literal { value: expected, .. } => Some(expected == value),
        Pat::Con0 { name, .. } => match value {
            Value::Con(tag, None) => Some(tag == name),
            _ => None,
        },
        Pat::Con { name, arg, .. } => match value {
            Value::Con(tag, Some(inner)) => {
                if tag != name {
                    Some(false)
                } else {
                    match_static(arg, inner)
                }
            }
            Value::Con(_, None) => Some(false),
            _ => None,
        },
        Pat::Tuple { args, .. } | Pat::Record { args, .. } => match value {
            Value::List(items) if items.len() == args.len() => {
                let mut all = true;
                for (p, v) in args.iter().zip(items.iter()) {
                    match match_static(p, v) {
                        Some(true) => {}
                        Some(false) => return Some(false),
                        None => all = false,
                    }
                }
                if all { Some(true) } else { None }
            }
            _ => None,
        },
        Pat::List { args, .. } => match value {
            Value::List(items) => {
                if items.len() != args.len() {
                    return Some(false);
                }
                let mut all = true;
                for (p, v) in args.iter().zip(items.iter()) {
                    match match_static(p, v) {
                        Some(true) => {}
                        Some(false) => return Some(false),
                        None => all = false,
                    }
                }
                if all { Some(true) } else { None }
            }
            _ => None,
        },
        Pat::Cons { head, tail, .. } => match value {
            Value::List(items) => match items.split_first() {
                None => Some(false),
                Some((first, rest)) => {
                    let h = match_static(head, first)?;
                    if !h {
                        return Some(false);
                    }
                    match_static(tail, &Value::list(rest.to_vec()))
                }
            },
            _ => None,
        },
        Pat::As { pat, .. } => match_static(pat, value),
    }
}

/// Free identifier references of a core expression.
pub(crate) fn free_vars(exp: &Rc<Exp>, bound: &mut Vec<VarKey>, out: &mut Vec<VarKey>) {
    match exp.as_ref() {
        Exp::Id(id) => {
            let k = key(id);
            if !bound.contains(&k) && !out.contains(&k) {
                out.push(k);
            }
        }
        Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => {}
        Exp::Fn { arms, .. } => {
            for arm in arms.iter() {
                scoped_arm(arm, bound, out);
            }
        }
        Exp::Apply { func, arg, .. } => {
            free_vars(func, bound, out);
            free_vars(arg, bound, out);
        }
        Exp::Let { rec, binds, body } => {
            let mark = bound.len();
            if *rec {
                for bind in binds {
                    push_bindings(&bind.pat, bound);
                }
            }
            for bind in binds {
                free_vars(&bind.exp, bound, out);
            }
            if !*rec {
                for bind in binds {
                    push_bindings(&bind.pat, bound);
                }
            }
            free_vars(body, bound, out);
            bound.truncate(mark);
        }
        Exp::Tuple { args, .. } => {
            for arg in args {
                free_vars(arg, bound, out);
            }
        }
        Exp::Case {
            scrutinee, arms, ..
        } => {
            free_vars(scrutinee, bound, out);
            for arm in arms.iter() {
                scoped_arm(arm, bound, out);
            }
        }
        Exp::From { steps, .. } => {
            let mark = bound.len();
            for step in steps {
                for sub in crate::ground::step_exprs(step) {
                    free_vars(&sub, bound, out);
                }
                for named in &step.env().bindings {
                    let k = key(named);
                    if !bound.contains(&k) {
                        bound.push(k);
                    }
                }
            }
            bound.truncate(mark);
        }
    }
}

fn scoped_arm(arm: &MatchArm, bound: &mut Vec<VarKey>, out: &mut Vec<VarKey>) {
    let mark = bound.len();
    push_bindings(&arm.pat, bound);
    free_vars(&arm.exp, bound, out);
    bound.truncate(mark);
}

fn push_bindings(pat: &Pat, bound: &mut Vec<VarKey>) {
    let mut named = Vec::new();
    pat.bindings(&mut named);
    bound.extend(named.iter().map(key));
}
