//! Lowering: typed AST → core IR.
//!
//! Runs after inference, so every node has a type and every name resolves;
//! failures here are checker bugs, not user errors. Lowering de-sugars
//! (`if` and the short-circuit operators become cases and built-in
//! applications, non-constant lists become cons chains), assigns each
//! binder a fresh (name, ordinal) identity, canonicalizes record field
//! order, and turns unbounded scans into scans over the implicit extent.

use std::rc::Rc;

use indexmap::IndexMap;

use weir_core::ast::{
    AggregateItem, Arm, Decl, Expr, ExprKind, Literal, Pat, PatKind, QueryStep, ValBind,
};
use weir_core::{BuiltIn, Value};
use weir_ir::builder::{self, FromBuilder};
use weir_ir::{Aggregate, Bind, Exp, MatchArm, NamedPat, RangeSet, SetOpKind};
use weir_types::embed::type_to_term;
use weir_types::unify::NullTracer;
use weir_types::{Actions, TermPair, Type, TypeSystem, Unified, VarSupply, unify};

use crate::env::{BindingKind, Environment};
use crate::infer::TypeMap;

/// The name unbounded `ordinal` references resolve to; the evaluator's
/// innermost scan publishes the row index under it. Spelled so it cannot
/// collide with a user identifier.
pub const ORDINAL_SLOT: &str = "$ordinal";

/// A lowered value declaration.
#[derive(Debug)]
pub struct Lowered {
    pub rec: bool,
    pub binds: Vec<Bind>,
}

pub fn lower_decl(
    ts: &mut TypeSystem,
    env: &Environment,
    types: &TypeMap,
    decl: &Decl,
) -> Lowered {
    let mut lowerer = Lowerer::new(ts, env, types);
    match decl {
        Decl::Val { rec, binds, .. } => {
            let binds = lowerer.lower_binds(*rec, binds);
            Lowered { rec: *rec, binds }
        }
        Decl::Over { .. } | Decl::Datatype { .. } | Decl::TypeAlias { .. } => Lowered {
            rec: false,
            binds: Vec::new(),
        },
    }
}

pub fn lower_expr(
    ts: &mut TypeSystem,
    env: &Environment,
    types: &TypeMap,
    exp: &Expr,
) -> Rc<Exp> {
    Lowerer::new(ts, env, types).lower_exp(exp)
}

struct ScopeEntry {
    name: String,
    pat: NamedPat,
    /// An overload instance: selected by type rather than by shadowing.
    inst: bool,
}

struct Lowerer<'a> {
    ts: &'a mut TypeSystem,
    env: &'a Environment,
    types: &'a TypeMap,
    scope: Vec<ScopeEntry>,
}

impl<'a> Lowerer<'a> {
    fn new(ts: &'a mut TypeSystem, env: &'a Environment, types: &'a TypeMap) -> Self {
        Self {
            ts,
            env,
            types,
            scope: Vec::new(),
        }
    }

    fn lower_binds(&mut self, rec: bool, binds: &[ValBind]) -> Vec<Bind> {
        if rec {
            // Recursive group: every pattern is in scope inside every
            // right-hand side.
            let pats: Vec<_> = binds
                .iter()
                .map(|bind| self.lower_pat(&bind.pat, true))
                .collect();
            binds
                .iter()
                .zip(pats)
                .map(|(bind, pat)| Bind {
                    pat,
                    exp: self.lower_exp(&bind.exp),
                })
                .collect()
        } else {
            // Simultaneous group: no right-hand side sees the new names.
            let exps: Vec<_> = binds
                .iter()
                .map(|bind| self.lower_exp(&bind.exp))
                .collect();
            binds
                .iter()
                .zip(exps)
                .map(|(bind, exp)| {
                    let pat = self.lower_pat(&bind.pat, true);
                    Bind { pat, exp }
                })
                .collect()
        }
    }

    fn ty(&self, exp: &Expr) -> Rc<Type> {
        self.types.ty(exp.id)
    }

    fn lower_exp(&mut self, exp: &Expr) -> Rc<Exp> {
        let ty = self.ty(exp);
        match &exp.kind {
            ExprKind::Literal(lit) => builder::literal(ty, literal_value(lit)),
            ExprKind::Id(name) => self.lower_id(name, &ty),
            ExprKind::Selector(field) => {
                let Type::Fn(param, _) = ty.as_ref() else {
                    panic!("selector #{field} has non-function type {ty} (checker bug)")
                };
                let labels = self
                    .ts
                    .expand(param)
                    .field_labels()
                    .unwrap_or_else(|| panic!("selector over non-record {param} (checker bug)"));
                let slot = labels
                    .iter()
                    .position(|l| l == field)
                    .unwrap_or_else(|| panic!("field {field} vanished from {param} (checker bug)"));
                Rc::new(Exp::Select {
                    ty,
                    field: field.as_str().into(),
                    slot,
                })
            }
            ExprKind::Tuple(items) => {
                let args = items.iter().map(|item| self.lower_exp(item)).collect();
                builder::tuple(ty, args)
            }
            ExprKind::Record(fields) => {
                let mut sorted: Vec<(&String, &Expr)> =
                    fields.iter().map(|(l, e)| (l, e)).collect();
                sorted.sort_by(|(a, _), (b, _)| weir_core::label::compare_labels(a, b));
                let args = sorted
                    .iter()
                    .map(|(_, field_exp)| self.lower_exp(field_exp))
                    .collect();
                builder::tuple(ty, args)
            }
            ExprKind::List(items) => {
                let lowered: Vec<Rc<Exp>> = items.iter().map(|i| self.lower_exp(i)).collect();
                self.lower_list(ty, lowered)
            }
            ExprKind::Apply { func, arg } => {
                let func = self.lower_exp(func);
                let arg = self.lower_exp(arg);
                builder::apply(ty, func, arg)
            }
            ExprKind::If { cond, then, els } => {
                let cond = self.lower_exp(cond);
                let then = self.lower_exp(then);
                let els = self.lower_exp(els);
                Rc::new(Exp::Case {
                    ty,
                    scrutinee: cond,
                    arms: Rc::new(vec![
                        MatchArm {
                            pat: weir_ir::Pat::Literal {
                                ty: Type::bool(),
                                value: Value::Bool(true),
                            },
                            exp: then,
                        },
                        MatchArm {
                            pat: weir_ir::Pat::Wildcard(Type::bool()),
                            exp: els,
                        },
                    ]),
                })
            }
            ExprKind::AndAlso(a, b) => {
                let a = self.lower_exp(a);
                let b = self.lower_exp(b);
                builder::apply2(ty, BuiltIn::AndAlso, a, b)
            }
            ExprKind::OrElse(a, b) => {
                let a = self.lower_exp(a);
                let b = self.lower_exp(b);
                builder::apply2(ty, BuiltIn::OrElse, a, b)
            }
            ExprKind::Case { scrutinee, arms } => {
                let scrutinee = self.lower_exp(scrutinee);
                let arms = self.lower_arms(arms);
                Rc::new(Exp::Case {
                    ty,
                    scrutinee,
                    arms: Rc::new(arms),
                })
            }
            ExprKind::Fn { arms } => {
                let arms = self.lower_arms(arms);
                Rc::new(Exp::Fn {
                    ty,
                    arms: Rc::new(arms),
                })
            }
            ExprKind::Let { decls, body } => {
                let watermark = self.scope.len();
                let mut groups: Vec<(bool, Vec<Bind>)> = Vec::new();
                for decl in decls {
                    match decl {
                        Decl::Val {
                            rec, inst, binds, ..
                        } => {
                            let lowered = self.lower_binds(*rec, binds);
                            if *inst {
                                for entry in self.scope.iter_mut().rev().take(binds.len()) {
                                    entry.inst = true;
                                }
                            }
                            groups.push((*rec, lowered));
                        }
                        // Type declarations were interned during inference;
                        // `over` is purely a resolution marker.
                        Decl::Over { .. } | Decl::Datatype { .. } | Decl::TypeAlias { .. } => {}
                    }
                }
                let mut result = self.lower_exp(body);
                for (rec, binds) in groups.into_iter().rev() {
                    if binds.is_empty() {
                        continue;
                    }
                    result = Rc::new(Exp::Let {
                        rec,
                        binds,
                        body: result,
                    });
                }
                self.scope.truncate(watermark);
                result
            }
            ExprKind::Annotated { exp: inner, .. } => self.lower_exp(inner),
            ExprKind::From { steps } => self.lower_from(ty, steps),
        }
    }

    fn lower_arms(&mut self, arms: &[Arm]) -> Vec<MatchArm> {
        arms.iter()
            .map(|arm| {
                let watermark = self.scope.len();
                let pat = self.lower_pat(&arm.pat, true);
                let exp = self.lower_exp(&arm.exp);
                self.scope.truncate(watermark);
                MatchArm { pat, exp }
            })
            .collect()
    }

    /// Constant lists embed as literals; anything else builds a cons chain.
    fn lower_list(&mut self, ty: Rc<Type>, items: Vec<Rc<Exp>>) -> Rc<Exp> {
        if items.iter().all(|i| i.as_literal().is_some()) {
            let values = items
                .iter()
                .map(|i| i.as_literal().expect("checked literal").clone())
                .collect();
            return builder::literal(ty, Value::List(Rc::new(values)));
        }
        let mut result = builder::literal(ty.clone(), Value::list(Vec::new()));
        for item in items.into_iter().rev() {
            result = builder::apply2(ty.clone(), BuiltIn::Cons, item, result);
        }
        result
    }

    fn lower_id(&mut self, name: &str, use_ty: &Rc<Type>) -> Rc<Exp> {
        // Local scope first: plain bindings shadow; instances select by
        // type.
        let mut inst_candidates: Vec<NamedPat> = Vec::new();
        for entry in self.scope.iter().rev() {
            if entry.name != name {
                continue;
            }
            if entry.inst {
                inst_candidates.push(entry.pat.clone());
            } else {
                return builder::id(entry.pat.clone());
            }
        }
        for candidate in &inst_candidates {
            if types_match(&candidate.ty, use_ty) {
                return builder::id(candidate.clone());
            }
        }

        if let Some(binding) = self.env.get(name) {
            let binding = match binding.kind {
                BindingKind::Over | BindingKind::Inst => {
                    let instances = self.env.instances(name);
                    instances
                        .into_iter()
                        .find(|b| types_match(&b.pat.ty, use_ty))
                        .unwrap_or_else(|| {
                            panic!("no instance of {name} matches {use_ty} (checker bug)")
                        })
                }
                BindingKind::Val => binding.clone(),
            };
            // Built-ins and other runtime constants embed directly; plain
            // value bindings stay as references the plan resolves.
            return match binding.runtime_value() {
                Some(value @ (Value::Builtin(_) | Value::Con(..))) => {
                    builder::literal(use_ty.clone(), value.clone())
                }
                _ => builder::id(NamedPat::new(
                    binding.pat.name.clone(),
                    binding.pat.ordinal,
                    use_ty.clone(),
                )),
            };
        }

        // A constructor used as an expression.
        if self.ts.constructor(name).is_some() {
            return builder::literal(use_ty.clone(), Value::con(name, None));
        }
        panic!("unbound {name} survived inference (checker bug)")
    }

    // ── Patterns ────────────────────────────────────────────────────────

    /// Lower a pattern, assigning ordinals; `bind_scope` pushes the bound
    /// names for the expressions that follow.
    fn lower_pat(&mut self, pat: &Pat, bind_scope: bool) -> weir_ir::Pat {
        let ty = self.types.ty(pat.id);
        match &pat.kind {
            PatKind::Wildcard => weir_ir::Pat::Wildcard(ty),
            PatKind::Id(name) => {
                if let Some((def, None)) = self.ts.constructor(name) {
                    if def.constructor(name).is_some() {
                        return weir_ir::Pat::Con0 {
                            ty,
                            name: name.as_str().into(),
                        };
                    }
                }
                let named = NamedPat::new(name.as_str(), self.ts.ordinal(name), ty);
                if bind_scope {
                    self.scope.push(ScopeEntry {
                        name: name.clone(),
                        pat: named.clone(),
                        inst: false,
                    });
                }
                weir_ir::Pat::Id(named)
            }
            PatKind::Literal(lit) => weir_ir::Pat::Literal {
                ty,
                value: literal_value(lit),
            },
            PatKind::Tuple(items) => weir_ir::Pat::Tuple {
                ty,
                args: items.iter().map(|i| self.lower_pat(i, bind_scope)).collect(),
            },
            PatKind::Record { fields, .. } => {
                // Expand to the record's full label set; unlisted fields
                // become wildcards.
                let expanded = self.ts.expand(&ty);
                let labels = expanded
                    .field_labels()
                    .unwrap_or_else(|| panic!("record pattern over {ty} (checker bug)"));
                let field_types = expanded.field_types().expect("labels imply fields");
                let args = labels
                    .iter()
                    .zip(&field_types)
                    .map(|(label, field_ty)| {
                        match fields.iter().find(|(l, _)| l == label) {
                            Some((_, field_pat)) => self.lower_pat(field_pat, bind_scope),
                            None => weir_ir::Pat::Wildcard(field_ty.clone()),
                        }
                    })
                    .collect();
                match expanded.as_ref() {
                    Type::Tuple(_) => weir_ir::Pat::Tuple { ty, args },
                    _ => weir_ir::Pat::Record { ty, args },
                }
            }
            PatKind::List(items) => weir_ir::Pat::List {
                ty,
                args: items.iter().map(|i| self.lower_pat(i, bind_scope)).collect(),
            },
            PatKind::Cons(head, tail) => weir_ir::Pat::Cons {
                ty,
                head: Box::new(self.lower_pat(head, bind_scope)),
                tail: Box::new(self.lower_pat(tail, bind_scope)),
            },
            PatKind::Con { name, arg } => match arg {
                None => weir_ir::Pat::Con0 {
                    ty,
                    name: name.as_str().into(),
                },
                Some(arg_pat) => weir_ir::Pat::Con {
                    ty,
                    name: name.as_str().into(),
                    arg: Box::new(self.lower_pat(arg_pat, bind_scope)),
                },
            },
            PatKind::As { name, pat: inner } => {
                let named = NamedPat::new(name.as_str(), self.ts.ordinal(name), ty);
                if bind_scope {
                    self.scope.push(ScopeEntry {
                        name: name.clone(),
                        pat: named.clone(),
                        inst: false,
                    });
                }
                weir_ir::Pat::As {
                    name: named,
                    pat: Box::new(self.lower_pat(inner, bind_scope)),
                }
            }
            PatKind::Annotated { pat: inner, .. } => self.lower_pat(inner, bind_scope),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    fn lower_from(&mut self, ty: Rc<Type>, steps: &[QueryStep]) -> Rc<Exp> {
        let watermark = self.scope.len();
        // `ordinal` references resolve to the evaluator's row-index slot.
        self.scope.push(ScopeEntry {
            name: crate::infer::query::ORDINAL_NAME.to_owned(),
            pat: NamedPat::new(ORDINAL_SLOT, 0, Type::int()),
            inst: false,
        });

        let mut b = FromBuilder::new();
        for step in steps {
            match step {
                QueryStep::Scan {
                    pat,
                    exp,
                    condition,
                } => {
                    let collection = match exp {
                        Some(collection_exp) => self.lower_exp(collection_exp),
                        None => {
                            let elem = self.types.ty(pat.id);
                            Rc::new(Exp::Extent {
                                ty: Type::list(elem),
                                ranges: RangeSet::full(),
                            })
                        }
                    };
                    let ir_pat = self.lower_pat(pat, true);
                    let condition = match condition {
                        Some(cond) => self.lower_exp(cond),
                        None => builder::bool_literal(true),
                    };
                    b.scan(ir_pat, collection, condition);
                }
                QueryStep::Where(cond) => {
                    let cond = self.lower_exp(cond);
                    b.where_(cond);
                }
                QueryStep::Skip(count) => {
                    let count = self.lower_exp(count);
                    b.skip(count);
                }
                QueryStep::Take(count) => {
                    let count = self.lower_exp(count);
                    b.take(count);
                }
                QueryStep::Distinct => {
                    b.distinct();
                }
                QueryStep::Order(items) => {
                    let items = items
                        .iter()
                        .map(|item| (self.lower_exp(&item.exp), item.dir))
                        .collect();
                    b.order(items);
                }
                QueryStep::Yield(exp) => {
                    let lowered = self.lower_exp(exp);
                    let rebinds = match self.ts.expand(&lowered.ty()).as_ref() {
                        Type::Record(fields) if matches!(exp.kind, ExprKind::Record(_)) => fields
                            .iter()
                            .map(|(label, field_ty)| {
                                NamedPat::new(
                                    label.as_str(),
                                    self.ts.ordinal(label),
                                    field_ty.clone(),
                                )
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    self.scope.truncate(watermark + 1);
                    for named in &rebinds {
                        self.scope.push(ScopeEntry {
                            name: named.name.to_string(),
                            pat: named.clone(),
                            inst: false,
                        });
                    }
                    b.yield_(lowered, rebinds);
                }
                QueryStep::Group { keys, aggregates } => {
                    let lowered_keys: Vec<(NamedPat, Rc<Exp>)> = keys
                        .iter()
                        .map(|(label, key_exp)| {
                            let exp = self.lower_exp(key_exp);
                            let named =
                                NamedPat::new(label.as_str(), self.ts.ordinal(label), exp.ty());
                            (named, exp)
                        })
                        .collect();
                    let lowered_aggs = self.lower_aggregates(aggregates);
                    self.scope.truncate(watermark + 1);
                    for (named, _) in &lowered_keys {
                        self.scope.push(ScopeEntry {
                            name: named.name.to_string(),
                            pat: named.clone(),
                            inst: false,
                        });
                    }
                    for agg in &lowered_aggs {
                        self.scope.push(ScopeEntry {
                            name: agg.label.name.to_string(),
                            pat: agg.label.clone(),
                            inst: false,
                        });
                    }
                    b.group(lowered_keys, lowered_aggs);
                }
                QueryStep::Compute(aggregates) => {
                    let lowered_aggs = self.lower_aggregates(aggregates);
                    self.scope.truncate(watermark + 1);
                    for agg in &lowered_aggs {
                        self.scope.push(ScopeEntry {
                            name: agg.label.name.to_string(),
                            pat: agg.label.clone(),
                            inst: false,
                        });
                    }
                    b.compute(lowered_aggs);
                }
                QueryStep::Union { distinct, args } => {
                    let args = args.iter().map(|a| self.lower_exp(a)).collect();
                    b.set_op(SetOpKind::Union, *distinct, args);
                }
                QueryStep::Except { distinct, args } => {
                    let args = args.iter().map(|a| self.lower_exp(a)).collect();
                    b.set_op(SetOpKind::Except, *distinct, args);
                }
                QueryStep::Intersect { distinct, args } => {
                    let args = args.iter().map(|a| self.lower_exp(a)).collect();
                    b.set_op(SetOpKind::Intersect, *distinct, args);
                }
            }
        }
        self.scope.truncate(watermark);
        b.build(ty)
    }

    fn lower_aggregates(&mut self, aggregates: &[AggregateItem]) -> Vec<Aggregate> {
        aggregates
            .iter()
            .map(|agg| {
                let func = self.lower_exp(&agg.aggregate);
                let result_ty = match func.ty().as_ref() {
                    Type::Fn(_, result) => result.clone(),
                    other => panic!("aggregate of non-function type {other} (checker bug)"),
                };
                let arg = agg.arg.as_ref().map(|a| self.lower_exp(a));
                Aggregate {
                    label: NamedPat::new(
                        agg.label.as_str(),
                        self.ts.ordinal(&agg.label),
                        result_ty,
                    ),
                    func,
                    arg,
                }
            })
            .collect()
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Unit => Value::Unit,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Char(c) => Value::Char(*c),
        Literal::Int(n) => Value::Int(*n),
        Literal::Real(r) => Value::Real(*r),
        Literal::String(s) => Value::string(s.as_str()),
    }
}

/// Would the instance type accept this use type? A throwaway unification
/// decides.
fn types_match(instance: &Type, use_ty: &Type) -> bool {
    let mut supply = VarSupply::new();
    let mut inst_map = IndexMap::new();
    let left = type_to_term(instance, &mut supply, &mut inst_map);
    let mut use_map = IndexMap::new();
    let right = type_to_term(use_ty, &mut supply, &mut use_map);
    matches!(
        unify(
            vec![TermPair::new(left, right, weir_core::Span::default())],
            &mut Actions::new(),
            &mut [],
            &mut NullTracer,
        ),
        Unified::Ok(_)
    )
}
