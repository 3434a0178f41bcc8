//! Query grounding: rewrite `from` pipelines so every variable ranges over
//! a finite generator.
//!
//! An unbounded scan (`from x where p x`) lowers to a scan over the
//! implicit extent of its type. This pass derives finite generators for
//! such patterns from the filter conjuncts:
//!
//! - `x elem e` yields the collection `e`;
//! - `x = e` yields the singleton `e` (a substitution, not a scan);
//! - `x < lit` and friends yield interval extents, enumerable only when
//!   they collapse to points;
//! - `andalso` intersects candidates, `orelse` unions them (wrapping the
//!   union in `distinct` since the sides may overlap);
//! - `(x, y) elem e` yields one tuple generator binding both patterns.
//!
//! Candidates per pattern are kept sorted by cardinality (EMPTY <
//! SINGLETON < FINITE < INFINITE) and tried best-first. Emission walks
//! dependencies depth-first with an IN_PROGRESS/DONE state per pattern;
//! hitting an IN_PROGRESS pattern signals a cycle and unwinds to the next
//! candidate. A pattern left with no finite candidate is an
//! `UngroundedPattern` error.
//!
//! Absorbed conjuncts (those that became the chosen generator) disappear;
//! everything else survives as a residual `where`, with substituted
//! patterns replaced by their defining expressions. When substitutions
//! rebind original patterns, a final `yield` projects the original row
//! shape back, and renamed join columns get equality filters plus a
//! `distinct` wrapper.

use std::collections::HashMap;
use std::rc::Rc;

use weir_core::{BuiltIn, Span, Value};
use weir_ir::builder::{self, FromBuilder};
use weir_ir::{
    Aggregate, Bind, Cardinality, Exp, MatchArm, NamedPat, Pat, RangeSet, Step,
};
use weir_types::{Type, TypeSystem};

use crate::error::{CompileError, CompileResult};

type VarKey = (Rc<str>, u32);

fn key(pat: &NamedPat) -> VarKey {
    (pat.name.clone(), pat.ordinal)
}

/// Ground every query inside the expression.
pub fn ground(ts: &mut TypeSystem, exp: &Rc<Exp>) -> CompileResult<Rc<Exp>> {
    match exp.as_ref() {
        Exp::Literal { .. } | Exp::Id(_) | Exp::Select { .. } => Ok(exp.clone()),
        Exp::Extent { .. } => Ok(exp.clone()),
        Exp::Fn { ty, arms } => Ok(Rc::new(Exp::Fn {
            ty: ty.clone(),
            arms: Rc::new(ground_arms(ts, arms)?),
        })),
        Exp::Apply { ty, func, arg } => Ok(Rc::new(Exp::Apply {
            ty: ty.clone(),
            func: ground(ts, func)?,
            arg: ground(ts, arg)?,
        })),
        Exp::Let { rec, binds, body } => {
            let mut new_binds = Vec::with_capacity(binds.len());
            for bind in binds {
                new_binds.push(Bind {
                    pat: bind.pat.clone(),
                    exp: ground(ts, &bind.exp)?,
                });
            }
            Ok(Rc::new(Exp::Let {
                rec: *rec,
                binds: new_binds,
                body: ground(ts, body)?,
            }))
        }
        Exp::Tuple { ty, args } => {
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                new_args.push(ground(ts, arg)?);
            }
            Ok(Rc::new(Exp::Tuple {
                ty: ty.clone(),
                args: new_args,
            }))
        }
        Exp::Case {
            ty,
            scrutinee,
            arms,
        } => Ok(Rc::new(Exp::Case {
            ty: ty.clone(),
            scrutinee: ground(ts, scrutinee)?,
            arms: Rc::new(ground_arms(ts, arms)?),
        })),
        Exp::From { ty, steps } => ground_from(ts, ty.clone(), steps),
    }
}

fn ground_arms(ts: &mut TypeSystem, arms: &[MatchArm]) -> CompileResult<Vec<MatchArm>> {
    arms.iter()
        .map(|arm| {
            Ok(MatchArm {
                pat: arm.pat.clone(),
                exp: ground(ts, &arm.exp)?,
            })
        })
        .collect()
}

/// One candidate generator for an unbounded pattern.
#[derive(Debug, Clone)]
struct Gen {
    kind: GenKind,
    /// Unbounded patterns the generator expression mentions; they must be
    /// emitted (or substituted) first.
    deps: Vec<VarKey>,
    /// The conjunct this generator absorbs, by identity.
    absorbs: Option<Rc<Exp>>,
    /// The generator may produce duplicates and needs a distinct wrapper.
    distinct: bool,
}

#[derive(Debug, Clone)]
enum GenKind {
    /// Scan a finite collection.
    Coll(Rc<Exp>),
    /// Scan a finite collection of tuples, binding several patterns.
    CollTuple { pats: Vec<NamedPat>, exp: Rc<Exp> },
    /// A single value: becomes a substitution, not a scan.
    Single(Rc<Exp>),
    /// An interval set; enumerable only when it collapses to points.
    Range(RangeSet),
}

impl Gen {
    fn cardinality(&self) -> Cardinality {
        match &self.kind {
            GenKind::Single(_) => Cardinality::Singleton,
            GenKind::Coll(_) | GenKind::CollTuple { .. } => Cardinality::Finite,
            GenKind::Range(ranges) => ranges.cardinality(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatState {
    Pending,
    InProgress,
    Done,
}

fn ground_from(ts: &mut TypeSystem, ty: Rc<Type>, steps: &[Step]) -> CompileResult<Rc<Exp>> {
    // Ground nested queries inside step expressions first.
    let steps = reground_steps(ts, steps)?;

    // The grounding window: scans and filters before the first shaping
    // step.
    let barrier = steps
        .iter()
        .position(|s| !matches!(s, Step::Scan { .. } | Step::Where { .. }))
        .unwrap_or(steps.len());
    let (prefix, suffix) = steps.split_at(barrier);

    let mut bounded: Vec<(&Pat, &Rc<Exp>, &Rc<Exp>)> = Vec::new();
    let mut unbounded: Vec<NamedPat> = Vec::new();
    let mut conjuncts: Vec<Rc<Exp>> = Vec::new();
    for step in prefix {
        match step {
            Step::Scan {
                pat,
                exp,
                condition,
                ..
            } => {
                if matches!(exp.as_ref(), Exp::Extent { .. }) {
                    let mut pats = Vec::new();
                    pat.bindings(&mut pats);
                    unbounded.extend(pats);
                    if !is_true(condition) {
                        split_conjuncts(condition, &mut conjuncts);
                    }
                } else {
                    bounded.push((pat, exp, condition));
                }
            }
            Step::Where { exp, .. } => split_conjuncts(exp, &mut conjuncts),
            _ => unreachable!("prefix holds only scans and filters"),
        }
    }

    if unbounded.is_empty() {
        // Nothing to ground; rebuild (sub-expressions may have changed).
        let mut b = FromBuilder::new();
        for step in &steps {
            push_step(&mut b, step, &HashMap::new());
        }
        return Ok(b.build(ty));
    }

    let unbounded_keys: Vec<VarKey> = unbounded.iter().map(key).collect();

    // Candidate generators per unbounded pattern, best first.
    let mut candidates: HashMap<VarKey, Vec<Gen>> = HashMap::new();
    for pat in &unbounded {
        let mut gens = Vec::new();
        for conjunct in &conjuncts {
            gens.extend(gens_for(pat, conjunct, &unbounded_keys));
        }
        gens.sort_by_key(Gen::cardinality);
        candidates.insert(key(pat), gens);
    }

    // Emit: bounded scans first, then generators in dependency order.
    let mut b = FromBuilder::new();
    let mut subst: HashMap<VarKey, Rc<Exp>> = HashMap::new();
    for (pat, exp, condition) in &bounded {
        b.scan((*pat).clone(), (*exp).clone(), (*condition).clone());
    }

    let mut states: HashMap<VarKey, PatState> =
        unbounded_keys.iter().map(|k| (k.clone(), PatState::Pending)).collect();
    let mut absorbed: Vec<Rc<Exp>> = Vec::new();
    let mut join_filters: Vec<Rc<Exp>> = Vec::new();
    let mut renamed = false;

    for pat in &unbounded {
        let emitted = emit_pattern(
            ts,
            pat,
            &unbounded,
            &candidates,
            &mut states,
            &mut b,
            &mut subst,
            &mut absorbed,
            &mut join_filters,
            &mut renamed,
        )?;
        if !emitted {
            return Err(CompileError::UngroundedPattern {
                name: pat.name.to_string(),
                span: Span::default(),
            });
        }
    }

    // Every pattern substituted away and nothing left to scan: drive the
    // pipeline with a single unit row.
    if !b.steps().iter().any(|s| matches!(s, Step::Scan { .. })) {
        b.scan(
            Pat::Wildcard(Type::unit()),
            builder::literal(Type::list(Type::unit()), Value::list(vec![Value::Unit])),
            builder::bool_literal(true),
        );
    }

    // Residual filters: everything not absorbed, with substitutions
    // applied.
    let mut residual: Vec<Rc<Exp>> = Vec::new();
    for conjunct in &conjuncts {
        if absorbed.iter().any(|a| Rc::ptr_eq(a, conjunct)) {
            continue;
        }
        residual.push(subst_exp(conjunct, &subst));
    }
    residual.extend(join_filters);
    if let Some(filter) = conjoin(residual) {
        b.where_(filter);
    }

    // Shaping steps pass through with substitution.
    let mut has_projection = false;
    for step in suffix {
        if matches!(
            step,
            Step::Yield { .. } | Step::Group { .. } | Step::Compute { .. }
        ) {
            has_projection = true;
        }
        push_step(&mut b, step, &subst);
    }

    // Restore the original row shape when patterns were substituted or
    // renamed away.
    if !has_projection && (!subst.is_empty() || renamed) {
        let all_pats: Vec<NamedPat> = prefix_row(prefix);
        if all_pats.len() == 1 {
            // A single binding projects as a scalar.
            let exp = match subst.get(&key(&all_pats[0])) {
                Some(replacement) => replacement.clone(),
                None => builder::id(all_pats[0].clone()),
            };
            b.yield_(exp, Vec::new());
        } else {
            let (exp, rebinds) = projection(ts, &all_pats, &subst);
            b.yield_(exp, rebinds);
            if renamed {
                b.distinct();
            }
        }
    }

    Ok(b.build(ty))
}

/// The row of the original pipeline prefix: every scan binding in order.
fn prefix_row(prefix: &[Step]) -> Vec<NamedPat> {
    let mut out = Vec::new();
    for step in prefix {
        if let Step::Scan { pat, .. } = step {
            pat.bindings(&mut out);
        }
    }
    out
}

/// A record restoring the original bindings (two or more), with
/// substituted patterns replaced by their definitions.
fn projection(
    ts: &mut TypeSystem,
    pats: &[NamedPat],
    subst: &HashMap<VarKey, Rc<Exp>>,
) -> (Rc<Exp>, Vec<NamedPat>) {
    let value_of = |pat: &NamedPat| -> Rc<Exp> {
        match subst.get(&key(pat)) {
            Some(exp) => exp.clone(),
            None => builder::id(pat.clone()),
        }
    };
    let mut sorted: Vec<&NamedPat> = pats.iter().collect();
    sorted.sort_by(|a, b| weir_core::label::compare_labels(&a.name, &b.name));
    let fields: Vec<(String, Rc<Type>)> = sorted
        .iter()
        .map(|p| (p.name.to_string(), p.ty.clone()))
        .collect();
    let row_ty = ts.record(fields);
    let args: Vec<Rc<Exp>> = sorted.iter().map(|p| value_of(p)).collect();
    let rebinds: Vec<NamedPat> = sorted
        .iter()
        .map(|p| NamedPat::new(p.name.clone(), ts.ordinal(&p.name), p.ty.clone()))
        .collect();
    (builder::tuple(row_ty, args), rebinds)
}

#[allow(clippy::too_many_arguments)]
fn emit_pattern(
    ts: &mut TypeSystem,
    pat: &NamedPat,
    unbounded: &[NamedPat],
    candidates: &HashMap<VarKey, Vec<Gen>>,
    states: &mut HashMap<VarKey, PatState>,
    b: &mut FromBuilder,
    subst: &mut HashMap<VarKey, Rc<Exp>>,
    absorbed: &mut Vec<Rc<Exp>>,
    join_filters: &mut Vec<Rc<Exp>>,
    renamed: &mut bool,
) -> CompileResult<bool> {
    let k = key(pat);
    match states.get(&k) {
        Some(PatState::Done) => return Ok(true),
        // A cycle: unwind so the caller can try its next candidate; the
        // pattern resolves once a lower dependency is done.
        Some(PatState::InProgress) => return Ok(false),
        _ => {}
    }
    states.insert(k.clone(), PatState::InProgress);

    let empty = Vec::new();
    let gens = candidates.get(&k).unwrap_or(&empty);

    'candidates: for r#gen in gens {
        if r#gen.cardinality() == Cardinality::Infinite {
            continue;
        }
        // Ground the dependencies first; one that cannot be grounded right
        // now rules this candidate out.
        for dep in &r#gen.deps {
            if *dep == k {
                continue 'candidates;
            }
            if states.get(dep) == Some(&PatState::Done) {
                continue;
            }
            let Some(dep_pat) = unbounded.iter().find(|p| key(p) == *dep) else {
                continue;
            };
            if !emit_pattern(
                ts,
                dep_pat,
                unbounded,
                candidates,
                states,
                b,
                subst,
                absorbed,
                join_filters,
                renamed,
            )? {
                continue 'candidates;
            }
        }

        apply_gen(ts, pat, r#gen, states, b, subst, absorbed, join_filters, renamed)?;
        states.insert(k, PatState::Done);
        return Ok(true);
    }

    states.insert(k, PatState::Pending);
    Ok(false)
}

#[allow(clippy::too_many_arguments)]
fn apply_gen(
    ts: &mut TypeSystem,
    pat: &NamedPat,
    r#gen: &Gen,
    states: &mut HashMap<VarKey, PatState>,
    b: &mut FromBuilder,
    subst: &mut HashMap<VarKey, Rc<Exp>>,
    absorbed: &mut Vec<Rc<Exp>>,
    join_filters: &mut Vec<Rc<Exp>>,
    renamed: &mut bool,
) -> CompileResult<()> {
    if let Some(conjunct) = &r#gen.absorbs {
        absorbed.push(conjunct.clone());
    }
    match &r#gen.kind {
        GenKind::Single(exp) => {
            let replacement = subst_exp(exp, subst);
            subst.insert(key(pat), replacement);
        }
        GenKind::Coll(exp) => {
            let exp = subst_exp(exp, subst);
            let exp = if r#gen.distinct {
                distinct_wrap(ts, &exp)
            } else {
                exp
            };
            b.scan(Pat::Id(pat.clone()), exp, builder::bool_literal(true));
        }
        GenKind::CollTuple { pats, exp } => {
            let exp = subst_exp(exp, subst);
            let mut scan_pats = Vec::with_capacity(pats.len());
            for p in pats {
                let pk = key(p);
                if states.get(&pk) == Some(&PatState::Done) || subst.contains_key(&pk) {
                    // Shared pattern: promote to a join column under a
                    // fresh name, filtered back to equality, projected
                    // away at the end.
                    let fresh = NamedPat::new(
                        p.name.clone(),
                        ts.ordinal(&p.name),
                        p.ty.clone(),
                    );
                    join_filters.push(builder::apply2(
                        Type::bool(),
                        BuiltIn::Eq,
                        subst
                            .get(&pk)
                            .cloned()
                            .unwrap_or_else(|| builder::id(p.clone())),
                        builder::id(fresh.clone()),
                    ));
                    *renamed = true;
                    scan_pats.push(Pat::Id(fresh));
                } else {
                    states.insert(pk, PatState::Done);
                    scan_pats.push(Pat::Id(p.clone()));
                }
            }
            let tuple_ty = Rc::new(Type::Tuple(
                pats.iter().map(|p| p.ty.clone()).collect(),
            ));
            let scan_pat = Pat::Tuple {
                ty: tuple_ty,
                args: scan_pats,
            };
            let exp = if r#gen.distinct {
                distinct_wrap(ts, &exp)
            } else {
                exp
            };
            b.scan(scan_pat, exp, builder::bool_literal(true));
        }
        GenKind::Range(ranges) => {
            let points = ranges
                .points()
                .expect("infinite range candidates are filtered out");
            let exp = builder::literal(Type::list(pat.ty.clone()), Value::list(points));
            let exp = if ranges.may_overlap() {
                distinct_wrap(ts, &exp)
            } else {
                exp
            };
            b.scan(Pat::Id(pat.clone()), exp, builder::bool_literal(true));
        }
    }
    Ok(())
}

/// Wrap a generator expression so duplicates collapse before scanning.
fn distinct_wrap(ts: &mut TypeSystem, exp: &Rc<Exp>) -> Rc<Exp> {
    let elem = match exp.ty().element() {
        Some(e) => e.clone(),
        None => return exp.clone(),
    };
    let v = NamedPat::new("$gen", ts.ordinal("$gen"), elem);
    let mut b = FromBuilder::new();
    b.scan(Pat::Id(v), exp.clone(), builder::bool_literal(true));
    b.distinct();
    b.build(exp.ty())
}

// ── Candidate discovery ─────────────────────────────────────────────────

/// Candidate generators for `pat` derivable from one conjunct.
fn gens_for(pat: &NamedPat, conjunct: &Rc<Exp>, unbounded: &[VarKey]) -> Vec<Gen> {
    let mut gens = gens_inner(pat, conjunct, unbounded);
    for r#gen in &mut gens {
        if r#gen.absorbs.is_some() {
            // Absorption refers to the whole conjunct as it appears in the
            // filter list.
            r#gen.absorbs = Some(conjunct.clone());
        }
    }
    gens
}

fn gens_inner(pat: &NamedPat, exp: &Rc<Exp>, unbounded: &[VarKey]) -> Vec<Gen> {
    let Some((b, args)) = builtin_apply(exp) else {
        return Vec::new();
    };
    match b {
        BuiltIn::AndAlso => {
            let mut gens = gens_inner(pat, &args[0], unbounded);
            gens.extend(gens_inner(pat, &args[1], unbounded));
            // Interval candidates in one conjunction intersect.
            let (ranges, mut rest): (Vec<Gen>, Vec<Gen>) = gens
                .into_iter()
                .partition(|g| matches!(g.kind, GenKind::Range(_)));
            if let Some(merged) = ranges.into_iter().reduce(|a, r#gen| {
                let (GenKind::Range(ra), GenKind::Range(rb)) = (&a.kind, &r#gen.kind) else {
                    unreachable!("partitioned on range kind")
                };
                Gen {
                    kind: GenKind::Range(ra.intersect(rb)),
                    deps: Vec::new(),
                    absorbs: None,
                    distinct: false,
                }
            }) {
                rest.push(merged);
            }
            rest
        }
        BuiltIn::OrElse => {
            let left = best_gen(gens_inner(pat, &args[0], unbounded));
            let right = best_gen(gens_inner(pat, &args[1], unbounded));
            match (left, right) {
                (Some(l), Some(r)) => union_gens(pat, l, r).into_iter().collect(),
                _ => Vec::new(),
            }
        }
        BuiltIn::Elem => {
            let lhs = &args[0];
            let rhs = &args[1];
            match lhs.as_ref() {
                Exp::Id(id) if key(id) == key(pat) => vec![Gen {
                    kind: GenKind::Coll(rhs.clone()),
                    deps: unbounded_refs(rhs, unbounded),
                    absorbs: Some(rhs.clone()),
                    distinct: false,
                }],
                Exp::Tuple { args: items, .. } => {
                    let mut pats = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_ref() {
                            Exp::Id(id) => pats.push(id.clone()),
                            _ => return Vec::new(),
                        }
                    }
                    if !pats.iter().any(|p| key(p) == key(pat)) {
                        return Vec::new();
                    }
                    vec![Gen {
                        kind: GenKind::CollTuple {
                            pats,
                            exp: rhs.clone(),
                        },
                        deps: unbounded_refs(rhs, unbounded),
                        absorbs: Some(rhs.clone()),
                        distinct: false,
                    }]
                }
                _ => Vec::new(),
            }
        }
        BuiltIn::Eq => {
            for (side, other) in [(&args[0], &args[1]), (&args[1], &args[0])] {
                if let Exp::Id(id) = side.as_ref() {
                    if key(id) == key(pat) && !mentions(other, &key(pat)) {
                        return vec![Gen {
                            kind: GenKind::Single(other.clone()),
                            deps: unbounded_refs(other, unbounded),
                            absorbs: Some(other.clone()),
                            distinct: false,
                        }];
                    }
                }
            }
            Vec::new()
        }
        BuiltIn::Lt | BuiltIn::Le | BuiltIn::Gt | BuiltIn::Ge | BuiltIn::Ne => {
            let range = match (args[0].as_ref(), args[1].as_ref()) {
                (Exp::Id(id), Exp::Literal { value, .. }) if key(id) == key(pat) => {
                    Some(range_of(b, value.clone(), false))
                }
                (Exp::Literal { value, .. }, Exp::Id(id)) if key(id) == key(pat) => {
                    Some(range_of(b, value.clone(), true))
                }
                _ => None,
            };
            match range {
                Some(ranges) => vec![Gen {
                    kind: GenKind::Range(ranges),
                    deps: Vec::new(),
                    absorbs: None,
                    distinct: false,
                }],
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn best_gen(mut gens: Vec<Gen>) -> Option<Gen> {
    gens.sort_by_key(Gen::cardinality);
    gens.into_iter().next()
}

/// The union of two generators; the value may come from either side.
fn union_gens(pat: &NamedPat, left: Gen, right: Gen) -> Option<Gen> {
    if let (GenKind::Range(a), GenKind::Range(b)) = (&left.kind, &right.kind) {
        return Some(Gen {
            kind: GenKind::Range(a.union(b)),
            deps: Vec::new(),
            absorbs: None,
            distinct: false,
        });
    }
    let l = as_collection(pat, &left)?;
    let r = as_collection(pat, &right)?;
    let ty = Type::list(pat.ty.clone());
    let both_absorb = left.absorbs.is_some() && right.absorbs.is_some();
    let mut deps = left.deps.clone();
    for d in &right.deps {
        if !deps.contains(d) {
            deps.push(d.clone());
        }
    }
    Some(Gen {
        kind: GenKind::Coll(builder::apply2(ty, BuiltIn::Append, l, r)),
        deps,
        // Overlapping sides would repeat values.
        distinct: true,
        absorbs: if both_absorb {
            // Marker; rewritten to the enclosing conjunct by `gens_for`.
            Some(right.absorbs.expect("checked"))
        } else {
            None
        },
    })
}

/// View a generator as a collection expression.
fn as_collection(pat: &NamedPat, r#gen: &Gen) -> Option<Rc<Exp>> {
    match &r#gen.kind {
        GenKind::Coll(exp) => Some(exp.clone()),
        GenKind::Single(exp) => {
            let ty = Type::list(pat.ty.clone());
            Some(match exp.as_literal() {
                Some(value) => builder::literal(ty, Value::list(vec![value.clone()])),
                None => builder::apply2(
                    ty.clone(),
                    BuiltIn::Cons,
                    exp.clone(),
                    builder::literal(ty, Value::list(Vec::new())),
                ),
            })
        }
        GenKind::Range(ranges) => {
            let points = ranges.points()?;
            Some(builder::literal(
                Type::list(pat.ty.clone()),
                Value::list(points),
            ))
        }
        GenKind::CollTuple { .. } => None,
    }
}

fn range_of(b: BuiltIn, value: Value, flipped: bool) -> RangeSet {
    // `lit op x` reads as `x flip(op) lit`.
    let op = if flipped {
        match b {
            BuiltIn::Lt => BuiltIn::Gt,
            BuiltIn::Le => BuiltIn::Ge,
            BuiltIn::Gt => BuiltIn::Lt,
            BuiltIn::Ge => BuiltIn::Le,
            other => other,
        }
    } else {
        b
    };
    match op {
        BuiltIn::Lt => RangeSet::less_than(value),
        BuiltIn::Le => RangeSet::at_most(value),
        BuiltIn::Gt => RangeSet::greater_than(value),
        BuiltIn::Ge => RangeSet::at_least(value),
        BuiltIn::Ne => RangeSet::not_equal(value),
        other => panic!("not an interval operator: {other}"),
    }
}

// ── Expression utilities ────────────────────────────────────────────────

fn builtin_apply(exp: &Rc<Exp>) -> Option<(BuiltIn, Vec<Rc<Exp>>)> {
    let Exp::Apply { func, arg, .. } = exp.as_ref() else {
        return None;
    };
    let b = func.as_builtin()?;
    let Exp::Tuple { args, .. } = arg.as_ref() else {
        return None;
    };
    Some((b, args.clone()))
}

fn is_true(exp: &Rc<Exp>) -> bool {
    matches!(exp.as_literal(), Some(Value::Bool(true)))
}

fn split_conjuncts(exp: &Rc<Exp>, out: &mut Vec<Rc<Exp>>) {
    if let Some((BuiltIn::AndAlso, args)) = builtin_apply(exp) {
        split_conjuncts(&args[0], out);
        split_conjuncts(&args[1], out);
        return;
    }
    out.push(exp.clone());
}

fn conjoin(mut exps: Vec<Rc<Exp>>) -> Option<Rc<Exp>> {
    let first = if exps.is_empty() {
        return None;
    } else {
        exps.remove(0)
    };
    Some(exps.into_iter().fold(first, |acc, e| {
        builder::apply2(Type::bool(), BuiltIn::AndAlso, acc, e)
    }))
}

fn mentions(exp: &Rc<Exp>, k: &VarKey) -> bool {
    !unbounded_refs(exp, std::slice::from_ref(k)).is_empty()
}

/// Which of `keys` the expression references.
fn unbounded_refs(exp: &Rc<Exp>, keys: &[VarKey]) -> Vec<VarKey> {
    let mut out = Vec::new();
    collect_refs(exp, keys, &mut out);
    out
}

fn collect_refs(exp: &Rc<Exp>, keys: &[VarKey], out: &mut Vec<VarKey>) {
    match exp.as_ref() {
        Exp::Id(id) => {
            let k = key(id);
            if keys.contains(&k) && !out.contains(&k) {
                out.push(k);
            }
        }
        Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => {}
        Exp::Fn { arms, .. } => {
            for arm in arms.iter() {
                collect_refs(&arm.exp, keys, out);
            }
        }
        Exp::Apply { func, arg, .. } => {
            collect_refs(func, keys, out);
            collect_refs(arg, keys, out);
        }
        Exp::Let { binds, body, .. } => {
            for bind in binds {
                collect_refs(&bind.exp, keys, out);
            }
            collect_refs(body, keys, out);
        }
        Exp::Tuple { args, .. } => {
            for arg in args {
                collect_refs(arg, keys, out);
            }
        }
        Exp::Case {
            scrutinee, arms, ..
        } => {
            collect_refs(scrutinee, keys, out);
            for arm in arms.iter() {
                collect_refs(&arm.exp, keys, out);
            }
        }
        Exp::From { steps, .. } => {
            for step in steps {
                for sub in step_exprs(step) {
                    collect_refs(&sub, keys, out);
                }
            }
        }
    }
}

pub(crate) fn step_exprs(step: &Step) -> Vec<Rc<Exp>> {
    match step {
        Step::Scan { exp, condition, .. } => vec![exp.clone(), condition.clone()],
        Step::Where { exp, .. }
        | Step::Skip { exp, .. }
        | Step::Take { exp, .. }
        | Step::Yield { exp, .. } => vec![exp.clone()],
        Step::Distinct { .. } => Vec::new(),
        Step::Order { items, .. } => items.iter().map(|(e, _)| e.clone()).collect(),
        Step::Group {
            keys, aggregates, ..
        } => {
            let mut out: Vec<Rc<Exp>> = keys.iter().map(|(_, e)| e.clone()).collect();
            for agg in aggregates {
                out.push(agg.func.clone());
                if let Some(arg) = &agg.arg {
                    out.push(arg.clone());
                }
            }
            out
        }
        Step::Compute { aggregates, .. } => {
            let mut out = Vec::new();
            for agg in aggregates {
                out.push(agg.func.clone());
                if let Some(arg) = &agg.arg {
                    out.push(arg.clone());
                }
            }
            out
        }
        Step::SetOp { args, .. } => args.clone(),
    }
}

/// Structural substitution of identifier references.
fn subst_exp(exp: &Rc<Exp>, subst: &HashMap<VarKey, Rc<Exp>>) -> Rc<Exp> {
    if subst.is_empty() {
        return exp.clone();
    }
    match exp.as_ref() {
        Exp::Id(id) => match subst.get(&key(id)) {
            Some(replacement) => replacement.clone(),
            None => exp.clone(),
        },
        Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => exp.clone(),
        Exp::Fn { ty, arms } => Rc::new(Exp::Fn {
            ty: ty.clone(),
            arms: Rc::new(subst_arms(arms, subst)),
        }),
        Exp::Apply { ty, func, arg } => Rc::new(Exp::Apply {
            ty: ty.clone(),
            func: subst_exp(func, subst),
            arg: subst_exp(arg, subst),
        }),
        Exp::Let { rec, binds, body } => Rc::new(Exp::Let {
            rec: *rec,
            binds: binds
                .iter()
                .map(|bind| Bind {
                    pat: bind.pat.clone(),
                    exp: subst_exp(&bind.exp, subst),
                })
                .collect(),
            body: subst_exp(body, subst),
        }),
        Exp::Tuple { ty, args } => Rc::new(Exp::Tuple {
            ty: ty.clone(),
            args: args.iter().map(|a| subst_exp(a, subst)).collect(),
        }),
        Exp::Case {
            ty,
            scrutinee,
            arms,
        } => Rc::new(Exp::Case {
            ty: ty.clone(),
            scrutinee: subst_exp(scrutinee, subst),
            arms: Rc::new(subst_arms(arms, subst)),
        }),
        Exp::From { ty, steps } => {
            let mut b = FromBuilder::new();
            for step in steps {
                push_step(&mut b, step, subst);
            }
            b.build(ty.clone())
        }
    }
}

fn subst_arms(arms: &[MatchArm], subst: &HashMap<VarKey, Rc<Exp>>) -> Vec<MatchArm> {
    arms.iter()
        .map(|arm| MatchArm {
            pat: arm.pat.clone(),
            exp: subst_exp(&arm.exp, subst),
        })
        .collect()
}

/// Re-append a step through the builder (recomputing environments), with
/// substitution applied to its expressions.
fn push_step(b: &mut FromBuilder, step: &Step, subst: &HashMap<VarKey, Rc<Exp>>) {
    match step {
        Step::Scan {
            pat,
            exp,
            condition,
            ..
        } => {
            b.scan(
                pat.clone(),
                subst_exp(exp, subst),
                subst_exp(condition, subst),
            );
        }
        Step::Where { exp, .. } => {
            b.where_(subst_exp(exp, subst));
        }
        Step::Skip { exp, .. } => {
            b.skip(subst_exp(exp, subst));
        }
        Step::Take { exp, .. } => {
            b.take(subst_exp(exp, subst));
        }
        Step::Distinct { .. } => {
            b.distinct();
        }
        Step::Yield { exp, env } => {
            b.yield_(subst_exp(exp, subst), env.bindings.clone());
        }
        Step::Order { items, .. } => {
            b.order(
                items
                    .iter()
                    .map(|(e, dir)| (subst_exp(e, subst), *dir))
                    .collect(),
            );
        }
        Step::Group {
            keys, aggregates, ..
        } => {
            b.group(
                keys.iter()
                    .map(|(pat, e)| (pat.clone(), subst_exp(e, subst)))
                    .collect(),
                subst_aggregates(aggregates, subst),
            );
        }
        Step::Compute { aggregates, .. } => {
            b.compute(subst_aggregates(aggregates, subst));
        }
        Step::SetOp {
            kind,
            distinct,
            args,
            ..
        } => {
            b.set_op(
                *kind,
                *distinct,
                args.iter().map(|a| subst_exp(a, subst)).collect(),
            );
        }
    }
}

fn subst_aggregates(aggregates: &[Aggregate], subst: &HashMap<VarKey, Rc<Exp>>) -> Vec<Aggregate> {
    aggregates
        .iter()
        .map(|agg| Aggregate {
            label: agg.label.clone(),
            func: subst_exp(&agg.func, subst),
            arg: agg.arg.as_ref().map(|a| subst_exp(a, subst)),
        })
        .collect()
}

/// Ground the sub-expressions of every step.
fn reground_steps(ts: &mut TypeSystem, steps: &[Step]) -> CompileResult<Vec<Step>> {
    let mut b = FromBuilder::new();
    for step in steps {
        match step {
            Step::Scan {
                pat,
                exp,
                condition,
                ..
            } => {
                b.scan(pat.clone(), ground(ts, exp)?, ground(ts, condition)?);
            }
            Step::Where { exp, .. } => {
                b.where_(ground(ts, exp)?);
            }
            Step::Skip { exp, .. } => {
                b.skip(ground(ts, exp)?);
            }
            Step::Take { exp, .. } => {
                b.take(ground(ts, exp)?);
            }
            Step::Distinct { .. } => {
                b.distinct();
            }
            Step::Yield { exp, env } => {
                b.yield_(ground(ts, exp)?, env.bindings.clone());
            }
            Step::Order { items, .. } => {
                let mut new_items = Vec::with_capacity(items.len());
                for (e, dir) in items {
                    new_items.push((ground(ts, e)?, *dir));
                }
                b.order(new_items);
            }
            Step::Group {
                keys, aggregates, ..
            } => {
                let mut new_keys = Vec::with_capacity(keys.len());
                for (pat, e) in keys {
                    new_keys.push((pat.clone(), ground(ts, e)?));
                }
                b.group(new_keys, ground_aggregates(ts, aggregates)?);
            }
            Step::Compute { aggregates, .. } => {
                let aggs = ground_aggregates(ts, aggregates)?;
                b.compute(aggs);
            }
            Step::SetOp {
                kind,
                distinct,
                args,
                ..
            } => {
                let mut new_args = Vec::with_capacity(args.len());
                for arg in args {
                    new_args.push(ground(ts, arg)?);
                }
                b.set_op(*kind, *distinct, new_args);
            }
        }
    }
    Ok(b.steps().to_vec())
}

fn ground_aggregates(ts: &mut TypeSystem, aggregates: &[Aggregate]) -> CompileResult<Vec<Aggregate>> {
    aggregates
        .iter()
        .map(|agg| {
            Ok(Aggregate {
                label: agg.label.clone(),
                func: ground(ts, &agg.func)?,
                arg: match &agg.arg {
                    Some(a) => Some(ground(ts, a)?),
                    None => None,
                },
            })
        })
        .collect()
}

/// Re-append a step through a builder with every sub-expression mapped by
/// `f`; environments recompute as the builder threads them.
pub(crate) fn rebuild_step(b: &mut FromBuilder, step: &Step, f: &mut dyn FnMut(&Rc<Exp>) -> Rc<Exp>) {
    match step {
        Step::Scan {
            pat,
            exp,
            condition,
            ..
        } => {
            b.scan(pat.clone(), f(exp), f(condition));
        }
        Step::Where { exp, .. } => {
            b.where_(f(exp));
        }
        Step::Skip { exp, .. } => {
            b.skip(f(exp));
        }
        Step::Take { exp, .. } => {
            b.take(f(exp));
        }
        Step::Distinct { .. } => {
            b.distinct();
        }
        Step::Yield { exp, env } => {
            b.yield_(f(exp), env.bindings.clone());
        }
        Step::Order { items, .. } => {
            b.order(items.iter().map(|(e, dir)| (f(e), *dir)).collect());
        }
        Step::Group {
            keys, aggregates, ..
        } => {
            b.group(
                keys.iter().map(|(pat, e)| (pat.clone(), f(e))).collect(),
                aggregates
                    .iter()
                    .map(|agg| Aggregate {
                        label: agg.label.clone(),
                        func: f(&agg.func),
                        arg: agg.arg.as_ref().map(|a| f(a)),
                    })
                    .collect(),
            );
        }
        Step::Compute { aggregates, .. } => {
            b.compute(
                aggregates
                    .iter()
                    .map(|agg| Aggregate {
                        label: agg.label.clone(),
                        func: f(&agg.func),
                        arg: agg.arg.as_ref().map(|a| f(a)),
                    })
                    .collect(),
            );
        }
        Step::SetOp {
            kind,
            distinct,
            args,
            ..
        } => {
            b.set_op(*kind, *distinct, args.iter().map(|a| f(a)).collect());
        }
    }
}
