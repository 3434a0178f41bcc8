//! The type inferencer.
//!
//! Classic Hindley–Milner organized as term generation followed by
//! unification, with three twists the language needs:
//!
//! - **Overloads**: an identifier with several visible instances (a user
//!   `over` name, or a built-in with a multi-type) emits a disjunctive
//!   constraint rather than an equation; the unifier commits to whichever
//!   candidate survives. Built-in numeric bundles prefer their first
//!   (integer) candidate on retry; user overloads that never narrow are
//!   ambiguous and rejected.
//! - **Record selectors** install an action on the argument's variable;
//!   when the argument resolves to a record or tuple the action emits the
//!   field equation, and an argument that never resolves is a
//!   `FlexRecord` error.
//! - **Queries** are typed step by step; collection kinds (list vs bag)
//!   travel as an extra slot in collection terms and are decided by
//!   constraints (see `query`).
//!
//! Generation is deterministic, so the retry loop simply regenerates and
//! appends preference equations; it is bounded at two attempts.

pub(crate) mod query;

#[cfg(test)]
mod infer_tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use weir_core::Span;
use weir_core::ast::{
    Arm, AstId, Decl, Expr, ExprKind, Literal, Pat, PatKind, TypeExpr, TypeExprKind, ValBind,
};
use weir_types::embed::{collection, term_to_type, type_to_term};
use weir_types::term::{ATOM_LIST, OP_COLL, OP_FN, OP_TUPLE, RECORD_PREFIX};
use weir_types::{
    Actions, Constraint, Primitive, Substitution, Term, TermPair, TermVar, Type, TypeSystem,
    Unified, UnifyFailure, VarSupply, unify,
};

use crate::coverage::{Coverage, Exhaustiveness};
use crate::diagnostics::{Diagnostics, Stage};
use crate::env::{BindingKind, Environment};
use crate::error::{CompileError, CompileResult};
use crate::statement::CoverageLevel;

/// The node → type map produced by inference.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    map: HashMap<AstId, Rc<Type>>,
}

impl TypeMap {
    pub fn get(&self, id: AstId) -> Option<&Rc<Type>> {
        self.map.get(&id)
    }

    /// The type of a node that must have been visited; absence is a
    /// checker bug.
    pub fn ty(&self, id: AstId) -> Rc<Type> {
        self.map
            .get(&id)
            .unwrap_or_else(|| panic!("no type recorded for node {id:?} (checker bug)"))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A successfully typed declaration.
#[derive(Debug)]
pub struct Resolved {
    /// The declared top-level type, generalized.
    pub ty: Rc<Type>,
    pub type_map: TypeMap,
    /// Names the declaration introduces, with generalized types.
    pub bindings: Vec<(String, Rc<Type>)>,
    pub warnings: Diagnostics,
}

/// Infer a top-level declaration.
pub fn infer_decl(
    ts: &mut TypeSystem,
    env: &Environment,
    decl: &Decl,
    coverage: CoverageLevel,
) -> CompileResult<Resolved> {
    run(ts, env, coverage, |ck| ck.root_decl(decl))
}

/// Infer a bare expression (the `validateExpression` entry point).
pub fn infer_expr(
    ts: &mut TypeSystem,
    env: &Environment,
    exp: &Expr,
    coverage: CoverageLevel,
) -> CompileResult<Resolved> {
    run(ts, env, coverage, |ck| {
        let var = ck.deduce_expr(exp)?;
        Ok(Root {
            result: var,
            bindings: Vec::new(),
        })
    })
}

struct Root {
    result: TermVar,
    bindings: Vec<(String, TermVar)>,
}

fn run(
    ts: &mut TypeSystem,
    env: &Environment,
    coverage: CoverageLevel,
    generate: impl Fn(&mut Checker) -> CompileResult<Root>,
) -> CompileResult<Resolved> {
    let mut preferences: Vec<TermPair> = Vec::new();
    for attempt in 0..2 {
        let mut ck = Checker::new(ts, env, coverage);
        let root = generate(&mut ck)?;
        debug_assert!(ck.locals.is_empty(), "local scope leaked");

        let mut equations = ck.equations.clone();
        equations.extend(preferences.iter().cloned());
        let mut actions = std::mem::take(&mut ck.actions);
        let mut constraints = std::mem::take(&mut ck.constraints);

        tracing::debug!(attempt, equations = equations.len(), "unify");
        match unify(
            equations,
            &mut actions,
            &mut constraints,
            &mut weir_types::unify::LogTracer,
        ) {
            Unified::Ok(subst) => return ck.finalize(root, subst),
            Unified::Failure(failure) => return Err(ck.failure_error(failure)),
            Unified::Retry(partial) => {
                // Generation is deterministic, so variable numbering is
                // stable across attempts and first-attempt preferences
                // remain meaningful on the second run.
                if attempt == 0 {
                    preferences = preference_pairs(&constraints, &ck.preferable, &partial);
                    if preferences.is_empty() {
                        return Err(ambiguity_error(&constraints));
                    }
                } else {
                    return Err(ambiguity_error(&constraints));
                }
            }
        }
    }
    unreachable!("retry loop is bounded at two attempts")
}

/// For each still-open preferable constraint, its first surviving disjunct
/// (built-ins list the integer candidate first, so an unconstrained `+`
/// lands on `int * int -> int`).
fn preference_pairs(
    constraints: &[Constraint],
    preferable: &[usize],
    partial: &Substitution,
) -> Vec<TermPair> {
    let mut out = Vec::new();
    for index in preferable {
        let c = &constraints[*index];
        if c.committed().is_some() {
            continue;
        }
        if let Some(first) = c.surviving(partial).first() {
            for (v, t) in c.disjunct(*first) {
                out.push(TermPair::new(Term::Var(*v), t.clone(), c.span));
            }
        }
    }
    out
}

fn ambiguity_error(constraints: &[Constraint]) -> CompileError {
    let open = constraints
        .iter()
        .find(|c| c.committed().is_none())
        .expect("retry implies an open constraint");
    CompileError::TypeError {
        reason: format!("ambiguous use of {}", open.description),
        span: open.span,
    }
}

pub(crate) struct Checker<'a> {
    pub(crate) ts: &'a mut TypeSystem,
    env: &'a Environment,
    coverage_level: CoverageLevel,
    pub(crate) supply: VarSupply,
    pub(crate) equations: Vec<TermPair>,
    actions: Actions,
    pub(crate) constraints: Vec<Constraint>,
    /// Indices of constraints whose first disjunct is preferred on retry.
    pub(crate) preferable: Vec<usize>,
    node_vars: IndexMap<AstId, TermVar>,
    pub(crate) locals: Vec<LocalBinding>,
    /// Error detail recorded by a unifier action before it fails.
    deferred: Rc<RefCell<Option<CompileError>>>,
    /// Selector argument variables that must resolve, for `FlexRecord`.
    selectors: Vec<(TermVar, String, Span)>,
    /// Flex record patterns (`{...}`) that must resolve.
    flex_pats: Vec<(TermVar, Span)>,
    /// Case/fn sites to run the coverage checker over once types are known.
    match_sites: Vec<MatchSite>,
    /// Names of type variables in the current declaration's annotations.
    tyvars: IndexMap<String, TermVar>,
}

pub(crate) struct LocalBinding {
    pub(crate) name: String,
    pub(crate) kind: LocalKind,
}

pub(crate) enum LocalKind {
    Plain(TermVar),
    Over,
    Inst(TermVar),
}

struct MatchSite {
    pats: Vec<Pat>,
    scrutinee: TermVar,
    span: Span,
}

impl<'a> Checker<'a> {
    fn new(ts: &'a mut TypeSystem, env: &'a Environment, coverage_level: CoverageLevel) -> Self {
        Self {
            ts,
            env,
            coverage_level,
            supply: VarSupply::new(),
            equations: Vec::new(),
            actions: Actions::new(),
            constraints: Vec::new(),
            preferable: Vec::new(),
            node_vars: IndexMap::new(),
            locals: Vec::new(),
            deferred: Rc::new(RefCell::new(None)),
            selectors: Vec::new(),
            flex_pats: Vec::new(),
            match_sites: Vec::new(),
            tyvars: IndexMap::new(),
        }
    }

    pub(crate) fn fresh(&mut self) -> TermVar {
        self.supply.fresh()
    }

    /// The variable already allocated for a visited node.
    pub(crate) fn node_var(&self, id: AstId) -> TermVar {
        *self
            .node_vars
            .get(&id)
            .unwrap_or_else(|| panic!("no variable for node {id:?} (checker bug)"))
    }

    pub(crate) fn equate(&mut self, left: Term, right: Term, span: Span) {
        self.equations.push(TermPair::new(left, right, span));
    }

    fn atom_eq(&mut self, var: TermVar, atom: &'static str, span: Span) {
        self.equate(Term::Var(var), Term::atom(atom), span);
    }

    /// Embed a known type at a use site, instantiating its parameters
    /// fresh.
    pub(crate) fn embed(&mut self, ty: &Type) -> Term {
        let mut inst = IndexMap::new();
        type_to_term(ty, &mut self.supply, &mut inst)
    }

    // ── Declarations ────────────────────────────────────────────────────

    fn root_decl(&mut self, decl: &Decl) -> CompileResult<Root> {
        let span = decl.span();
        let bindings = self.deduce_decl(decl)?;
        // The declaration's own type: its last binding, or unit for
        // declarations that bind nothing (over, datatype).
        let result = match bindings.last() {
            Some((_, var)) => *var,
            None => {
                let v = self.fresh();
                self.atom_eq(v, "unit", span);
                v
            }
        };
        // Root bindings stay in scope conceptually; pop them so the scope
        // balance check holds.
        self.locals.clear();
        Ok(Root { result, bindings })
    }

    /// Type a declaration and bring its names into local scope. Returns
    /// the introduced (name, variable) pairs.
    pub(crate) fn deduce_decl(&mut self, decl: &Decl) -> CompileResult<Vec<(String, TermVar)>> {
        match decl {
            Decl::Val {
                rec, inst, binds, ..
            } => self.deduce_val(*rec, *inst, binds),
            Decl::Over { name, .. } => {
                self.locals.push(LocalBinding {
                    name: name.clone(),
                    kind: LocalKind::Over,
                });
                Ok(Vec::new())
            }
            Decl::Datatype { binds, .. } => {
                for bind in binds {
                    let params: IndexMap<String, u32> = bind
                        .params
                        .iter()
                        .enumerate()
                        .map(|(i, p)| (p.clone(), i as u32))
                        .collect();
                    let mut constructors = Vec::with_capacity(bind.constructors.len());
                    for (con, arg) in &bind.constructors {
                        let arg_ty = match arg {
                            Some(te) => Some(self.type_expr_to_type(te, &params)?),
                            None => None,
                        };
                        constructors.push((con.clone(), arg_ty));
                    }
                    self.ts.register_datatype(weir_types::DataTypeDef {
                        name: bind.name.as_str().into(),
                        arity: bind.params.len(),
                        constructors,
                    });
                }
                Ok(Vec::new())
            }
            Decl::TypeAlias {
                name, params, ty, ..
            } => {
                let params: IndexMap<String, u32> = params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.clone(), i as u32))
                    .collect();
                let target = self.type_expr_to_type(ty, &params)?;
                self.ts.register_alias(name.as_str(), params.len(), target);
                Ok(Vec::new())
            }
        }
    }

    fn deduce_val(
        &mut self,
        rec: bool,
        inst: bool,
        binds: &[ValBind],
    ) -> CompileResult<Vec<(String, TermVar)>> {
        let mut all_bindings: Vec<(String, TermVar)> = Vec::new();
        let mut pat_vars = Vec::with_capacity(binds.len());
        for bind in binds {
            let mut bindings = Vec::new();
            let pvar = self.deduce_pat(&bind.pat, &mut bindings)?;
            pat_vars.push(pvar);
            all_bindings.extend(bindings);
        }

        if rec {
            for (name, var) in &all_bindings {
                self.locals.push(LocalBinding {
                    name: name.clone(),
                    kind: LocalKind::Plain(*var),
                });
            }
        }

        for (bind, pvar) in binds.iter().zip(&pat_vars) {
            let evar = self.deduce_expr(&bind.exp)?;
            self.equate(Term::Var(*pvar), Term::Var(evar), bind.exp.span);
        }

        if !rec {
            for (name, var) in &all_bindings {
                let kind = if inst {
                    LocalKind::Inst(*var)
                } else {
                    LocalKind::Plain(*var)
                };
                self.locals.push(LocalBinding {
                    name: name.clone(),
                    kind,
                });
            }
        }

        if inst {
            for (bind, (name, _)) in binds.iter().zip(&all_bindings) {
                if !matches!(bind.pat.kind, PatKind::Id(_)) {
                    return Err(CompileError::TypeError {
                        reason: "an instance declaration must bind a plain name".to_owned(),
                        span: bind.pat.span,
                    });
                }
                if !self.over_in_scope(name) {
                    return Err(CompileError::TypeError {
                        reason: format!("instance of {name} without an over declaration"),
                        span: bind.pat.span,
                    });
                }
            }
        }
        Ok(all_bindings)
    }

    fn over_in_scope(&self, name: &str) -> bool {
        self.locals
            .iter()
            .any(|l| l.name == name && matches!(l.kind, LocalKind::Over))
            || self
                .env
                .get(name)
                .is_some_and(|b| b.kind == BindingKind::Over)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub(crate) fn deduce_expr(&mut self, exp: &Expr) -> CompileResult<TermVar> {
        let v = self.fresh();
        self.node_vars.insert(exp.id, v);
        let span = exp.span;
        match &exp.kind {
            ExprKind::Literal(lit) => {
                self.atom_eq(v, literal_prim(lit).name(), span);
            }
            ExprKind::Id(name) => self.resolve_name(name, v, span)?,
            ExprKind::Selector(field) => {
                let arg = self.fresh();
                let result = self.fresh();
                self.equate(
                    Term::Var(v),
                    Term::app(OP_FN, vec![Term::Var(arg), Term::Var(result)]),
                    span,
                );
                self.install_selector(arg, result, field.clone(), span);
            }
            ExprKind::Tuple(items) => {
                let mut vars = Vec::with_capacity(items.len());
                for item in items {
                    vars.push(Term::Var(self.deduce_expr(item)?));
                }
                self.equate(Term::Var(v), Term::app(OP_TUPLE, vars), span);
            }
            ExprKind::Record(fields) => {
                let mut sorted: Vec<(&String, &Expr)> =
                    fields.iter().map(|(l, e)| (l, e)).collect();
                sorted.sort_by(|(a, _), (b, _)| weir_core::label::compare_labels(a, b));
                for window in sorted.windows(2) {
                    if window[0].0 == window[1].0 {
                        return Err(CompileError::TypeError {
                            reason: format!("duplicate label {} in record", window[0].0),
                            span,
                        });
                    }
                }
                let labels: Vec<String> = sorted.iter().map(|(l, _)| (*l).clone()).collect();
                let mut vars = Vec::with_capacity(sorted.len());
                for (_, field_exp) in &sorted {
                    vars.push(Term::Var(self.deduce_expr(field_exp)?));
                }
                self.equate(Term::Var(v), record_term(&labels, vars), span);
            }
            ExprKind::List(items) => {
                let elem = self.fresh();
                for item in items {
                    let ivar = self.deduce_expr(item)?;
                    self.equate(Term::Var(ivar), Term::Var(elem), item.span);
                }
                self.equate(Term::Var(v), collection(ATOM_LIST, Term::Var(elem)), span);
            }
            ExprKind::Apply { func, arg } => {
                let f = self.deduce_expr(func)?;
                let a = self.deduce_expr(arg)?;
                self.equate(
                    Term::Var(f),
                    Term::app(OP_FN, vec![Term::Var(a), Term::Var(v)]),
                    span,
                );
            }
            ExprKind::If { cond, then, els } => {
                let c = self.deduce_expr(cond)?;
                self.atom_eq(c, "bool", cond.span);
                let t = self.deduce_expr(then)?;
                let e = self.deduce_expr(els)?;
                self.equate(Term::Var(t), Term::Var(v), then.span);
                self.equate(Term::Var(e), Term::Var(v), els.span);
            }
            ExprKind::AndAlso(a, b) | ExprKind::OrElse(a, b) => {
                let av = self.deduce_expr(a)?;
                let bv = self.deduce_expr(b)?;
                self.atom_eq(av, "bool", a.span);
                self.atom_eq(bv, "bool", b.span);
                self.atom_eq(v, "bool", span);
            }
            ExprKind::Case { scrutinee, arms } => {
                let s = self.deduce_expr(scrutinee)?;
                self.deduce_arms(arms, s, v)?;
                self.match_sites.push(MatchSite {
                    pats: arms.iter().map(|a| a.pat.clone()).collect(),
                    scrutinee: s,
                    span,
                });
            }
            ExprKind::Fn { arms } => {
                let param = self.fresh();
                let result = self.fresh();
                self.deduce_arms(arms, param, result)?;
                self.equate(
                    Term::Var(v),
                    Term::app(OP_FN, vec![Term::Var(param), Term::Var(result)]),
                    span,
                );
                self.match_sites.push(MatchSite {
                    pats: arms.iter().map(|a| a.pat.clone()).collect(),
                    scrutinee: param,
                    span,
                });
            }
            ExprKind::Let { decls, body } => {
                let watermark = self.locals.len();
                for decl in decls {
                    self.deduce_decl(decl)?;
                }
                let b = self.deduce_expr(body)?;
                self.equate(Term::Var(b), Term::Var(v), body.span);
                self.locals.truncate(watermark);
            }
            ExprKind::Annotated { exp: inner, ty } => {
                let ivar = self.deduce_expr(inner)?;
                let term = self.type_expr_term(ty)?;
                self.equate(Term::Var(ivar), term, ty.span);
                self.equate(Term::Var(v), Term::Var(ivar), span);
            }
            ExprKind::From { steps } => {
                query::deduce_from(self, steps, v, span)?;
            }
        }
        Ok(v)
    }

    fn deduce_arms(&mut self, arms: &[Arm], input: TermVar, output: TermVar) -> CompileResult<()> {
        for arm in arms {
            let watermark = self.locals.len();
            let mut bindings = Vec::new();
            let pvar = self.deduce_pat(&arm.pat, &mut bindings)?;
            self.equate(Term::Var(pvar), Term::Var(input), arm.pat.span);
            for (name, var) in bindings {
                self.locals.push(LocalBinding {
                    name,
                    kind: LocalKind::Plain(var),
                });
            }
            let body = self.deduce_expr(&arm.exp)?;
            self.equate(Term::Var(body), Term::Var(output), arm.exp.span);
            self.locals.truncate(watermark);
        }
        Ok(())
    }

    // ── Identifier resolution ───────────────────────────────────────────

    fn resolve_name(&mut self, name: &str, v: TermVar, span: Span) -> CompileResult<()> {
        // Local scope, innermost first. Decide without mutating, then act.
        enum Hit {
            Plain(TermVar),
            /// Local instances; `closed` when a local `over` header was
            /// reached (outer instances then stay out of the answer).
            Overload { insts: Vec<TermVar>, closed: bool },
        }
        let mut hit: Option<Hit> = None;
        for local in self.locals.iter().rev() {
            if local.name != name {
                continue;
            }
            match (&local.kind, &mut hit) {
                (LocalKind::Plain(var), None) => {
                    hit = Some(Hit::Plain(*var));
                    break;
                }
                (LocalKind::Plain(_), Some(_)) => {}
                (LocalKind::Inst(var), None) => {
                    hit = Some(Hit::Overload {
                        insts: vec![*var],
                        closed: false,
                    });
                }
                (LocalKind::Inst(var), Some(Hit::Overload { insts, .. })) => {
                    insts.push(*var);
                }
                (LocalKind::Over, None) => {
                    hit = Some(Hit::Overload {
                        insts: Vec::new(),
                        closed: true,
                    });
                    break;
                }
                (LocalKind::Over, Some(Hit::Overload { closed, .. })) => {
                    *closed = true;
                    break;
                }
                (_, Some(Hit::Plain(_))) => unreachable!("loop breaks on a plain hit"),
            }
        }

        match hit {
            Some(Hit::Plain(var)) => {
                self.equate(Term::Var(v), Term::Var(var), span);
                return Ok(());
            }
            Some(Hit::Overload { insts, closed }) => {
                // Instances declared against an outer `over` header pick up
                // the outer instances too.
                let outer: Vec<Rc<Type>> = if closed {
                    Vec::new()
                } else {
                    self.env
                        .instances(name)
                        .into_iter()
                        .map(|b| b.pat.ty.clone())
                        .collect()
                };
                return self.emit_overload(name, v, span, insts, outer);
            }
            None => {}
        }

        if let Some(binding) = self.env.get(name) {
            match binding.kind {
                // Whether the top match is the header or one of the
                // instances, the whole instance set is the candidate list.
                BindingKind::Over | BindingKind::Inst => {
                    let outer: Vec<Rc<Type>> = self
                        .env
                        .instances(name)
                        .into_iter()
                        .map(|b| b.pat.ty.clone())
                        .collect();
                    if outer.is_empty() {
                        return Err(CompileError::TypeError {
                            reason: format!("overloaded name {name} has no instances"),
                            span,
                        });
                    }
                    return self.emit_overload(name, v, span, Vec::new(), outer);
                }
                BindingKind::Val => {
                    let ty = binding.pat.ty.clone();
                    if let Type::Multi(cands) = ty.as_ref() {
                        let cands = cands.clone();
                        return self.emit_multi(name, v, span, &cands);
                    }
                    let term = self.embed(&ty);
                    self.equate(Term::Var(v), term, span);
                    return Ok(());
                }
            }
        }

        // A datatype constructor used as an expression.
        if let Some((def, arg)) = self.ts.constructor(name) {
            let data = Rc::new(Type::Data {
                name: def.name.clone(),
                args: (0..def.arity).map(|i| Type::var(i as u32)).collect(),
            });
            let ty = match arg {
                None => data,
                Some(arg_ty) => Type::func(arg_ty, data),
            };
            let term = self.embed(&ty);
            self.equate(Term::Var(v), term, span);
            return Ok(());
        }

        Err(CompileError::UnboundIdentifier {
            name: name.to_owned(),
            span,
        })
    }

    /// Constraint for a user overload: candidates are local instance
    /// variables plus outer instance types.
    fn emit_overload(
        &mut self,
        name: &str,
        v: TermVar,
        span: Span,
        local_insts: Vec<TermVar>,
        outer: Vec<Rc<Type>>,
    ) -> CompileResult<()> {
        let mut disjuncts: Vec<Vec<(TermVar, Term)>> = Vec::new();
        for var in local_insts {
            disjuncts.push(vec![(v, Term::Var(var))]);
        }
        for ty in &outer {
            let term = self.embed(ty);
            disjuncts.push(vec![(v, term)]);
        }
        match disjuncts.len() {
            0 => Err(CompileError::TypeError {
                reason: format!("overloaded name {name} has no instances"),
                span,
            }),
            1 => {
                let (var, term) = disjuncts.pop().expect("len checked").pop().expect("pair");
                self.equate(Term::Var(var), term, span);
                Ok(())
            }
            _ => {
                self.constraints.push(Constraint::new(
                    format!("overloaded name {name}"),
                    span,
                    disjuncts,
                ));
                Ok(())
            }
        }
    }

    /// Constraint for a built-in multi-type; the first (integer) candidate
    /// is preferred when nothing narrows the choice.
    fn emit_multi(
        &mut self,
        name: &str,
        v: TermVar,
        span: Span,
        candidates: &[Rc<Type>],
    ) -> CompileResult<()> {
        let mut disjuncts = Vec::with_capacity(candidates.len());
        for ty in candidates {
            let term = self.embed(ty);
            disjuncts.push(vec![(v, term)]);
        }
        self.preferable.push(self.constraints.len());
        self.constraints.push(Constraint::new(
            format!("overloaded operator {name}"),
            span,
            disjuncts,
        ));
        Ok(())
    }

    fn install_selector(&mut self, arg: TermVar, result: TermVar, field: String, span: Span) {
        self.selectors.push((arg, field.clone(), span));
        let deferred = self.deferred.clone();
        self.actions.register(
            arg,
            Box::new(move |term, _subst, extra| {
                match field_slot(term, &field) {
                    FieldSlot::Found(slot_term) => {
                        extra.push(TermPair::new(Term::Var(result), slot_term, span));
                        Ok(())
                    }
                    FieldSlot::Missing(ty) => {
                        *deferred.borrow_mut() = Some(CompileError::NoField {
                            field: field.clone(),
                            ty,
                            span,
                        });
                        Err(UnifyFailure::new(format!("no field {field}"), span))
                    }
                    FieldSlot::NotYet => Ok(()),
                }
            }),
        );
    }

    // ── Patterns ────────────────────────────────────────────────────────

    pub(crate) fn deduce_pat(
        &mut self,
        pat: &Pat,
        bindings: &mut Vec<(String, TermVar)>,
    ) -> CompileResult<TermVar> {
        let v = self.fresh();
        self.node_vars.insert(pat.id, v);
        let span = pat.span;
        match &pat.kind {
            PatKind::Wildcard => {}
            PatKind::Id(name) => {
                // A name that denotes a nullary constructor matches that
                // constructor, not a fresh binding.
                if let Some((def, None)) = self.ts.constructor(name) {
                    let data = Rc::new(Type::Data {
                        name: def.name.clone(),
                        args: (0..def.arity).map(|i| Type::var(i as u32)).collect(),
                    });
                    let term = self.embed(&data);
                    self.equate(Term::Var(v), term, span);
                } else {
                    bindings.push((name.clone(), v));
                }
            }
            PatKind::Literal(lit) => {
                self.atom_eq(v, literal_prim(lit).name(), span);
            }
            PatKind::Tuple(items) => {
                let mut vars = Vec::with_capacity(items.len());
                for item in items {
                    vars.push(Term::Var(self.deduce_pat(item, bindings)?));
                }
                self.equate(Term::Var(v), Term::app(OP_TUPLE, vars), span);
            }
            PatKind::Record { fields, ellipsis } => {
                let mut sorted: Vec<(&String, &Pat)> = fields.iter().map(|(l, p)| (l, p)).collect();
                sorted.sort_by(|(a, _), (b, _)| weir_core::label::compare_labels(a, b));
                let mut field_vars = Vec::with_capacity(sorted.len());
                for (label, field_pat) in &sorted {
                    let fv = self.deduce_pat(field_pat, bindings)?;
                    field_vars.push(((*label).clone(), fv));
                }
                if *ellipsis {
                    self.install_flex_record(v, field_vars, span);
                } else {
                    let labels: Vec<String> = field_vars.iter().map(|(l, _)| l.clone()).collect();
                    let vars = field_vars
                        .iter()
                        .map(|(_, fv)| Term::Var(*fv))
                        .collect();
                    self.equate(Term::Var(v), record_term(&labels, vars), span);
                }
            }
            PatKind::List(items) => {
                let elem = self.fresh();
                for item in items {
                    let ivar = self.deduce_pat(item, bindings)?;
                    self.equate(Term::Var(ivar), Term::Var(elem), item.span);
                }
                self.equate(Term::Var(v), collection(ATOM_LIST, Term::Var(elem)), span);
            }
            PatKind::Cons(head, tail) => {
                let h = self.deduce_pat(head, bindings)?;
                let t = self.deduce_pat(tail, bindings)?;
                self.equate(
                    Term::Var(t),
                    collection(ATOM_LIST, Term::Var(h)),
                    span,
                );
                self.equate(Term::Var(v), Term::Var(t), span);
            }
            PatKind::Con { name, arg } => {
                let Some((def, con_arg)) = self.ts.constructor(name) else {
                    return Err(CompileError::UnboundIdentifier {
                        name: name.clone(),
                        span,
                    });
                };
                let data = Rc::new(Type::Data {
                    name: def.name.clone(),
                    args: (0..def.arity).map(|i| Type::var(i as u32)).collect(),
                });
                match (arg, con_arg) {
                    (None, None) => {
                        let term = self.embed(&data);
                        self.equate(Term::Var(v), term, span);
                    }
                    (Some(arg_pat), Some(arg_ty)) => {
                        // One embedding so the argument and result share
                        // the instantiated parameters.
                        let fn_ty = Type::func(arg_ty, data);
                        let term = self.embed(&fn_ty);
                        let Term::App(_, parts) = term else {
                            unreachable!("embedding a fn type yields a fn term")
                        };
                        let [arg_term, data_term]: [Term; 2] =
                            parts.try_into().expect("fn term has two parts");
                        let av = self.deduce_pat(arg_pat, bindings)?;
                        self.equate(Term::Var(av), arg_term, arg_pat.span);
                        self.equate(Term::Var(v), data_term, span);
                    }
                    (None, Some(_)) => {
                        return Err(CompileError::TypeError {
                            reason: format!("constructor {name} needs an argument"),
                            span,
                        });
                    }
                    (Some(_), None) => {
                        return Err(CompileError::TypeError {
                            reason: format!("constructor {name} takes no argument"),
                            span,
                        });
                    }
                }
            }
            PatKind::As { name, pat: inner } => {
                let ivar = self.deduce_pat(inner, bindings)?;
                bindings.push((name.clone(), v));
                self.equate(Term::Var(v), Term::Var(ivar), span);
            }
            PatKind::Annotated { pat: inner, ty } => {
                let ivar = self.deduce_pat(inner, bindings)?;
                let term = self.type_expr_term(ty)?;
                self.equate(Term::Var(ivar), term, ty.span);
                self.equate(Term::Var(v), Term::Var(ivar), span);
            }
        }
        Ok(v)
    }

    fn install_flex_record(
        &mut self,
        pat_var: TermVar,
        field_vars: Vec<(String, TermVar)>,
        span: Span,
    ) {
        self.flex_pats.push((pat_var, span));
        let deferred = self.deferred.clone();
        self.actions.register(
            pat_var,
            Box::new(move |term, _subst, extra| {
                for (label, fv) in &field_vars {
                    match field_slot(term, label) {
                        FieldSlot::Found(slot_term) => {
                            extra.push(TermPair::new(Term::Var(*fv), slot_term, span));
                        }
                        FieldSlot::Missing(ty) => {
                            *deferred.borrow_mut() = Some(CompileError::NoField {
                                field: label.clone(),
                                ty,
                                span,
                            });
                            return Err(UnifyFailure::new(
                                format!("no field {label}"),
                                span,
                            ));
                        }
                        FieldSlot::NotYet => {}
                    }
                }
                Ok(())
            }),
        );
    }

    // ── Type annotations ────────────────────────────────────────────────

    fn type_expr_to_type(
        &mut self,
        te: &TypeExpr,
        params: &IndexMap<String, u32>,
    ) -> CompileResult<Rc<Type>> {
        match &te.kind {
            TypeExprKind::Var(name) => match params.get(name) {
                Some(i) => Ok(Type::var(*i)),
                None => Err(CompileError::TypeError {
                    reason: format!("unbound type variable {name}"),
                    span: te.span,
                }),
            },
            TypeExprKind::Con { name, args } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    arg_types.push(self.type_expr_to_type(arg, params)?);
                }
                self.named_type(name, arg_types, te.span)
            }
            TypeExprKind::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (label, fty) in fields {
                    out.push((label.clone(), self.type_expr_to_type(fty, params)?));
                }
                Ok(self.ts.record(out))
            }
            TypeExprKind::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.type_expr_to_type(item, params)?);
                }
                Ok(self.ts.tuple(out))
            }
            TypeExprKind::Fn(param, result) => Ok(Type::func(
                self.type_expr_to_type(param, params)?,
                self.type_expr_to_type(result, params)?,
            )),
        }
    }

    fn named_type(
        &mut self,
        name: &str,
        args: Vec<Rc<Type>>,
        span: Span,
    ) -> CompileResult<Rc<Type>> {
        if args.is_empty() {
            if let Some(p) = Primitive::by_name(name) {
                return Ok(Rc::new(Type::Primitive(p)));
            }
        }
        match name {
            "list" if args.len() == 1 => {
                return Ok(Type::list(args.into_iter().next().expect("len checked")));
            }
            "bag" if args.len() == 1 => {
                return Ok(Type::bag(args.into_iter().next().expect("len checked")));
            }
            _ => {}
        }
        if let Some(def) = self.ts.datatype(name) {
            if def.arity != args.len() {
                return Err(CompileError::TypeError {
                    reason: format!("{name} expects {} type arguments", def.arity),
                    span,
                });
            }
            return Ok(Rc::new(Type::Data {
                name: def.name.clone(),
                args,
            }));
        }
        if let Some((arity, target)) = self.ts.alias(name).cloned() {
            if arity != args.len() {
                return Err(CompileError::TypeError {
                    reason: format!("{name} expects {arity} type arguments"),
                    span,
                });
            }
            let expanded = self.ts.instantiate(&target, &args);
            return Ok(Rc::new(Type::Alias {
                name: name.into(),
                target: expanded,
            }));
        }
        Err(CompileError::TypeError {
            reason: format!("unknown type constructor {name}"),
            span,
        })
    }

    /// An annotation as a term; `'a`-style variables are consistent across
    /// the current declaration.
    fn type_expr_term(&mut self, te: &TypeExpr) -> CompileResult<Term> {
        match &te.kind {
            TypeExprKind::Var(name) => {
                let var = match self.tyvars.get(name) {
                    Some(v) => *v,
                    None => {
                        let v = self.fresh();
                        self.tyvars.insert(name.clone(), v);
                        v
                    }
                };
                Ok(Term::Var(var))
            }
            TypeExprKind::Con { name, args } => {
                let mut arg_terms = Vec::with_capacity(args.len());
                for arg in args {
                    arg_terms.push(self.type_expr_term(arg)?);
                }
                if arg_terms.is_empty() {
                    if let Some(p) = Primitive::by_name(name) {
                        return Ok(Term::atom(p.name()));
                    }
                }
                match name.as_str() {
                    "list" if arg_terms.len() == 1 => {
                        return Ok(collection(
                            ATOM_LIST,
                            arg_terms.pop().expect("len checked"),
                        ));
                    }
                    "bag" if arg_terms.len() == 1 => {
                        return Ok(collection(
                            weir_types::term::ATOM_BAG,
                            arg_terms.pop().expect("len checked"),
                        ));
                    }
                    _ => {}
                }
                if let Some(def) = self.ts.datatype(name) {
                    if def.arity != arg_terms.len() {
                        return Err(CompileError::TypeError {
                            reason: format!("{name} expects {} type arguments", def.arity),
                            span: te.span,
                        });
                    }
                    return Ok(Term::App(Term::data_op(&def.name), arg_terms));
                }
                if let Some((arity, target)) = self.ts.alias(name).cloned() {
                    if arity != arg_terms.len() {
                        return Err(CompileError::TypeError {
                            reason: format!("{name} expects {arity} type arguments"),
                            span: te.span,
                        });
                    }
                    let mut inst = IndexMap::new();
                    return Ok(weir_types::embed::type_to_term_with_args(
                        &target,
                        &arg_terms,
                        &mut self.supply,
                        &mut inst,
                    ));
                }
                Err(CompileError::TypeError {
                    reason: format!("unknown type constructor {name}"),
                    span: te.span,
                })
            }
            TypeExprKind::Record(fields) => {
                let mut sorted: Vec<(&String, &TypeExpr)> =
                    fields.iter().map(|(l, t)| (l, t)).collect();
                sorted.sort_by(|(a, _), (b, _)| weir_core::label::compare_labels(a, b));
                let labels: Vec<String> = sorted.iter().map(|(l, _)| (*l).clone()).collect();
                let mut terms = Vec::with_capacity(sorted.len());
                for (_, fty) in &sorted {
                    terms.push(self.type_expr_term(fty)?);
                }
                Ok(record_term(&labels, terms))
            }
            TypeExprKind::Tuple(items) => {
                let mut terms = Vec::with_capacity(items.len());
                for item in items {
                    terms.push(self.type_expr_term(item)?);
                }
                Ok(Term::app(OP_TUPLE, terms))
            }
            TypeExprKind::Fn(param, result) => Ok(Term::app(
                OP_FN,
                vec![self.type_expr_term(param)?, self.type_expr_term(result)?],
            )),
        }
    }

    // ── Finalization ────────────────────────────────────────────────────

    fn failure_error(&self, failure: UnifyFailure) -> CompileError {
        if let Some(deferred) = self.deferred.borrow_mut().take() {
            return deferred;
        }
        let reason = match &failure.terms {
            Some((left, right)) => {
                let mut vars = IndexMap::new();
                let l = term_to_type(left, &mut vars);
                let r = term_to_type(right, &mut vars);
                format!("cannot unify {l} with {r}")
            }
            None => failure.reason.clone(),
        };
        CompileError::TypeError {
            reason,
            span: failure.span,
        }
    }

    fn finalize(mut self, root: Root, subst: Substitution) -> CompileResult<Resolved> {
        // Selectors whose argument never resolved.
        for (var, field, span) in &self.selectors {
            if matches!(subst.resolve(&Term::Var(*var)), Term::Var(_)) {
                return Err(CompileError::FlexRecord {
                    field: field.clone(),
                    span: *span,
                });
            }
        }
        for (var, span) in &self.flex_pats {
            if matches!(subst.resolve(&Term::Var(*var)), Term::Var(_)) {
                return Err(CompileError::TypeError {
                    reason: "cannot determine the full record type of this pattern".to_owned(),
                    span: *span,
                });
            }
        }

        // Node types share one variable-naming map for deterministic
        // display.
        let mut shared_vars = IndexMap::new();
        let mut type_map = TypeMap::default();
        for (id, var) in &self.node_vars {
            let term = subst.resolve(&Term::Var(*var));
            type_map
                .map
                .insert(*id, term_to_type(&term, &mut shared_vars));
        }

        // Each top-level binding generalizes over its own unresolved
        // variables.
        let mut bindings = Vec::with_capacity(root.bindings.len());
        for (name, var) in &root.bindings {
            bindings.push((name.clone(), generalize(&subst, *var)));
        }
        let ty = generalize(&subst, root.result);

        let warnings = self.check_match_coverage(&subst, &type_map)?;

        Ok(Resolved {
            ty,
            type_map,
            bindings,
            warnings,
        })
    }

    fn check_match_coverage(
        &mut self,
        subst: &Substitution,
        _type_map: &TypeMap,
    ) -> CompileResult<Diagnostics> {
        let mut warnings = Diagnostics::new();
        if self.coverage_level == CoverageLevel::Ignore {
            return Ok(warnings);
        }
        let sites = std::mem::take(&mut self.match_sites);
        for site in &sites {
            let term = subst.resolve(&Term::Var(site.scrutinee));
            let mut vars = IndexMap::new();
            let scrut_ty = term_to_type(&term, &mut vars);
            let refs: Vec<&Pat> = site.pats.iter().collect();

            let mut coverage = Coverage::new(self.ts);
            for index in coverage.redundant_arms(&refs, &scrut_ty) {
                warnings
                    .warning("redundant match arm", site.pats[index].span)
                    .stage(Stage::Coverage)
                    .emit();
            }
            let mut coverage = Coverage::new(self.ts);
            if let Exhaustiveness::Missing(witness) = coverage.exhaustive(&refs, &scrut_ty) {
                match self.coverage_level {
                    CoverageLevel::Error => {
                        return Err(CompileError::NonExhaustiveMatch {
                            witness,
                            span: site.span,
                        });
                    }
                    _ => {
                        warnings
                            .warning(
                                format!("match is not exhaustive; {witness} is not matched"),
                                site.span,
                            )
                            .stage(Stage::Coverage)
                            .emit();
                    }
                }
            }
        }
        Ok(warnings)
    }
}

fn generalize(subst: &Substitution, var: TermVar) -> Rc<Type> {
    let term = subst.resolve(&Term::Var(var));
    let mut vars = IndexMap::new();
    let ty = term_to_type(&term, &mut vars);
    Type::forall(vars.len(), ty)
}

fn literal_prim(lit: &Literal) -> Primitive {
    match lit {
        Literal::Unit => Primitive::Unit,
        Literal::Bool(_) => Primitive::Bool,
        Literal::Char(_) => Primitive::Char,
        Literal::Int(_) => Primitive::Int,
        Literal::Real(_) => Primitive::Real,
        Literal::String(_) => Primitive::String,
    }
}

/// A record term for canonically sorted labels; tuple labels collapse to a
/// tuple term the way `TypeSystem::record` collapses the type.
pub(crate) fn record_term(labels: &[String], vars: Vec<Term>) -> Term {
    if labels.is_empty() {
        return Term::atom("unit");
    }
    if weir_core::label::are_tuple_labels(labels.iter().map(|l| l.as_str())) {
        return Term::app(OP_TUPLE, vars);
    }
    Term::App(Term::record_op(labels), vars)
}

enum FieldSlot {
    Found(Term),
    Missing(String),
    NotYet,
}

/// Locate `field` inside a resolved record or tuple term.
fn field_slot(term: &Term, field: &str) -> FieldSlot {
    match term {
        Term::App(op, args) if op.starts_with(RECORD_PREFIX) => {
            let labels: Vec<&str> = op[RECORD_PREFIX.len()..].split(':').collect();
            match labels.iter().position(|l| *l == field) {
                Some(index) => FieldSlot::Found(args[index].clone()),
                None => {
                    let mut vars = IndexMap::new();
                    FieldSlot::Missing(term_to_type(term, &mut vars).to_string())
                }
            }
        }
        Term::App(op, args) if op.as_ref() == OP_TUPLE => {
            match weir_core::label::numeric_label(field) {
                Some(n) if n >= 1 && (n as usize) <= args.len() => {
                    FieldSlot::Found(args[n as usize - 1].clone())
                }
                _ => {
                    let mut vars = IndexMap::new();
                    FieldSlot::Missing(term_to_type(term, &mut vars).to_string())
                }
            }
        }
        Term::App(op, _) if op.as_ref() == OP_COLL => {
            let mut vars = IndexMap::new();
            FieldSlot::Missing(term_to_type(term, &mut vars).to_string())
        }
        Term::Var(_) => FieldSlot::NotYet,
        _ => {
            let mut vars = IndexMap::new();
            FieldSlot::Missing(term_to_type(term, &mut vars).to_string())
        }
    }
}
