//! Step-by-step typing of `from` pipelines.
//!
//! Each step receives an input (element type, collection kind) and
//! produces an output. Collection kinds — list versus bag — travel as the
//! first slot of `coll` terms, and the combination policies become
//! constraints:
//!
//! - scanning a bag degrades the pipeline to a bag; lists stay lists;
//!   mixed inputs degrade to bag;
//! - `yield`, `group` and `compute` preserve the incoming kind;
//! - `order` forces list;
//! - set operations produce a list iff every argument is a list.
//!
//! A kind constraint that nothing ever forces defaults to list via the
//! retry preference.

use indexmap::IndexMap;

use weir_core::Span;
use weir_core::ast::{AggregateItem, Expr, ExprKind, QueryStep};
use weir_types::embed::open_collection;
use weir_types::term::{ATOM_BAG, ATOM_LIST, OP_FN};
use weir_types::{Constraint, Term, TermVar};

use crate::error::{CompileError, CompileResult};

use super::{Checker, LocalBinding, LocalKind, record_term};

/// The name the current row index is visible under inside query steps.
pub const ORDINAL_NAME: &str = "ordinal";

/// What flows between steps.
enum Rows {
    /// Named bindings, in introduction order.
    Bindings(Vec<(String, TermVar)>),
    /// A scalar projection; only legal as the final step.
    Scalar(TermVar),
    /// A `compute` result; the whole query evaluates to this value.
    Computed(Term),
}

pub(super) fn deduce_from(
    ck: &mut Checker,
    steps: &[QueryStep],
    v: TermVar,
    span: Span,
) -> CompileResult<()> {
    if !matches!(steps.first(), Some(QueryStep::Scan { .. })) {
        return Err(CompileError::TypeError {
            reason: "a query must start with a scan".to_owned(),
            span,
        });
    }

    let watermark = ck.locals.len();
    // The implicit row index.
    let ordinal = ck.fresh();
    ck.equate(Term::Var(ordinal), Term::atom("int"), span);
    ck.locals.push(LocalBinding {
        name: ORDINAL_NAME.to_owned(),
        kind: LocalKind::Plain(ordinal),
    });

    let mut kind: Option<TermVar> = None;
    let mut rows = Rows::Bindings(Vec::new());

    for (index, step) in steps.iter().enumerate() {
        let last = index + 1 == steps.len();
        match &rows {
            Rows::Scalar(_) => {
                return Err(CompileError::TypeError {
                    reason: "no step may follow a scalar yield".to_owned(),
                    span,
                });
            }
            Rows::Computed(_) => {
                return Err(CompileError::TypeError {
                    reason: "no step may follow compute".to_owned(),
                    span,
                });
            }
            Rows::Bindings(_) => {}
        }
        match step {
            QueryStep::Scan {
                pat,
                exp,
                condition,
            } => {
                let mut bindings = Vec::new();
                let pvar = ck.deduce_pat(pat, &mut bindings)?;
                let input_kind = ck.fresh();
                match exp {
                    Some(collection_exp) => {
                        let evar = ck.deduce_expr(collection_exp)?;
                        ck.equate(
                            Term::Var(evar),
                            open_collection(input_kind, Term::Var(pvar)),
                            collection_exp.span,
                        );
                    }
                    None => {
                        // An unbounded scan ranges over the implicit extent
                        // of its type; grounding later replaces it with
                        // finite list generators.
                        ck.equate(Term::Var(input_kind), Term::atom(ATOM_LIST), pat.span);
                    }
                }
                kind = Some(match kind {
                    None => input_kind,
                    Some(current) => combine_kinds(ck, current, input_kind, pat.span),
                });
                for (name, var) in &bindings {
                    ck.locals.push(LocalBinding {
                        name: name.clone(),
                        kind: LocalKind::Plain(*var),
                    });
                }
                if let Rows::Bindings(row_bindings) = &mut rows {
                    row_bindings.extend(bindings);
                }
                if let Some(cond) = condition {
                    let cvar = ck.deduce_expr(cond)?;
                    ck.equate(Term::Var(cvar), Term::atom("bool"), cond.span);
                }
            }
            QueryStep::Where(cond) => {
                let cvar = ck.deduce_expr(cond)?;
                ck.equate(Term::Var(cvar), Term::atom("bool"), cond.span);
            }
            QueryStep::Skip(count) | QueryStep::Take(count) => {
                let nvar = ck.deduce_expr(count)?;
                ck.equate(Term::Var(nvar), Term::atom("int"), count.span);
            }
            QueryStep::Distinct => {}
            QueryStep::Order(items) => {
                for item in items {
                    ck.deduce_expr(&item.exp)?;
                }
                // Sorting imposes an order: the output is a list no matter
                // what came in.
                let forced = ck.fresh();
                ck.equate(Term::Var(forced), Term::atom(ATOM_LIST), span);
                kind = Some(forced);
            }
            QueryStep::Yield(exp) => {
                let yvar = ck.deduce_expr(exp)?;
                if let ExprKind::Record(fields) = &exp.kind {
                    // Record projection: the fields become the new row
                    // bindings downstream.
                    let mut new_bindings = Vec::with_capacity(fields.len());
                    for (label, field_exp) in fields {
                        let fvar = ck.node_var(field_exp.id);
                        new_bindings.push((label.clone(), fvar));
                    }
                    rows = Rows::Bindings(new_bindings.clone());
                    set_pipeline_scope(ck, watermark, &new_bindings);
                } else if last {
                    rows = Rows::Scalar(yvar);
                } else {
                    return Err(CompileError::TypeError {
                        reason: "a non-record yield must be the final step".to_owned(),
                        span: exp.span,
                    });
                }
            }
            QueryStep::Group { keys, aggregates } => {
                check_group_labels(keys, aggregates, span)?;
                let current_kind = kind.expect("scan precedes group");
                let mut new_bindings = Vec::with_capacity(keys.len() + aggregates.len());
                for (label, key_exp) in keys {
                    let kvar = ck.deduce_expr(key_exp)?;
                    new_bindings.push((label.clone(), kvar));
                }
                for agg in aggregates {
                    let rvar = deduce_aggregate(ck, agg, current_kind)?;
                    new_bindings.push((agg.label.clone(), rvar));
                }
                rows = Rows::Bindings(new_bindings.clone());
                set_pipeline_scope(ck, watermark, &new_bindings);
            }
            QueryStep::Compute(aggregates) => {
                if !last {
                    return Err(CompileError::TypeError {
                        reason: "compute must be the final step".to_owned(),
                        span,
                    });
                }
                check_group_labels(&[], aggregates, span)?;
                let current_kind = kind.expect("scan precedes compute");
                let mut results = Vec::with_capacity(aggregates.len());
                for agg in aggregates {
                    let rvar = deduce_aggregate(ck, agg, current_kind)?;
                    results.push((agg.label.clone(), rvar));
                }
                let result_term = if results.len() == 1 {
                    Term::Var(results[0].1)
                } else {
                    sorted_record_term(&results)
                };
                rows = Rows::Computed(result_term);
            }
            QueryStep::Union { args, .. }
            | QueryStep::Except { args, .. }
            | QueryStep::Intersect { args, .. } => {
                let row = row_term(&rows);
                let current = kind.expect("scan precedes set operations");
                let mut combined = current;
                for arg in args {
                    let avar = ck.deduce_expr(arg)?;
                    let arg_kind = ck.fresh();
                    ck.equate(
                        Term::Var(avar),
                        open_collection(arg_kind, row.clone()),
                        arg.span,
                    );
                    combined = combine_kinds(ck, combined, arg_kind, arg.span);
                }
                kind = Some(combined);
            }
        }
    }

    match &rows {
        Rows::Computed(term) => {
            ck.equate(Term::Var(v), term.clone(), span);
        }
        _ => {
            let row = row_term(&rows);
            let kind = kind.expect("a query has at least one scan");
            ck.equate(Term::Var(v), open_collection(kind, row), span);
        }
    }

    ck.locals.truncate(watermark);
    Ok(())
}

/// The element type of the pipeline as a term: the single binding, or a
/// record over the bindings in canonical label order.
fn row_term(rows: &Rows) -> Term {
    match rows {
        Rows::Scalar(var) => Term::Var(*var),
        Rows::Computed(term) => term.clone(),
        Rows::Bindings(bindings) => match bindings.len() {
            0 => Term::atom("unit"),
            1 => Term::Var(bindings[0].1),
            _ => sorted_record_term(bindings),
        },
    }
}

fn sorted_record_term(bindings: &[(String, TermVar)]) -> Term {
    let mut sorted: Vec<(&String, TermVar)> = bindings.iter().map(|(l, v)| (l, *v)).collect();
    sorted.sort_by(|(a, _), (b, _)| weir_core::label::compare_labels(a, b));
    let labels: Vec<String> = sorted.iter().map(|(l, _)| (*l).clone()).collect();
    let vars: Vec<Term> = sorted.iter().map(|(_, v)| Term::Var(*v)).collect();
    record_term(&labels, vars)
}

/// Replace the pipeline's bindings in the local scope (the ordinal binding
/// at the watermark stays).
fn set_pipeline_scope(ck: &mut Checker, watermark: usize, bindings: &[(String, TermVar)]) {
    ck.locals.truncate(watermark + 1);
    for (name, var) in bindings {
        ck.locals.push(LocalBinding {
            name: name.clone(),
            kind: LocalKind::Plain(*var),
        });
    }
}

fn check_group_labels(
    keys: &[(String, Expr)],
    aggregates: &[AggregateItem],
    span: Span,
) -> CompileResult<()> {
    let mut seen: IndexMap<&str, ()> = IndexMap::new();
    for label in keys
        .iter()
        .map(|(l, _)| l.as_str())
        .chain(aggregates.iter().map(|a| a.label.as_str()))
    {
        if seen.insert(label, ()).is_some() {
            return Err(CompileError::DuplicateFieldInGroup {
                label: label.to_owned(),
                span,
            });
        }
    }
    Ok(())
}

/// Type one aggregate: its function takes a collection (of the pipeline's
/// kind) of the argument values and produces the result. Without an
/// argument the aggregate ranges over unit markers, one per row.
fn deduce_aggregate(
    ck: &mut Checker,
    agg: &AggregateItem,
    pipeline_kind: TermVar,
) -> CompileResult<TermVar> {
    let fvar = ck.deduce_expr(&agg.aggregate)?;
    let arg_var = match &agg.arg {
        Some(arg_exp) => ck.deduce_expr(arg_exp)?,
        None => {
            let u = ck.fresh();
            ck.equate(Term::Var(u), Term::atom("unit"), agg.aggregate.span);
            u
        }
    };
    let agg_kind = ck.fresh();
    ck.equate(
        Term::Var(agg_kind),
        Term::Var(pipeline_kind),
        agg.aggregate.span,
    );
    let result = ck.fresh();
    ck.equate(
        Term::Var(fvar),
        Term::app(
            OP_FN,
            vec![
                open_collection(agg_kind, Term::Var(arg_var)),
                Term::Var(result),
            ],
        ),
        agg.aggregate.span,
    );
    Ok(result)
}

/// The output kind of joining two inputs: list only when both are lists.
/// Preferred toward list when nothing decides.
fn combine_kinds(ck: &mut Checker, current: TermVar, input: TermVar, span: Span) -> TermVar {
    let out = ck.fresh();
    let list = || Term::atom(ATOM_LIST);
    let bag = || Term::atom(ATOM_BAG);
    let disjuncts = vec![
        vec![(current, list()), (input, list()), (out, list())],
        vec![(current, list()), (input, bag()), (out, bag())],
        vec![(current, bag()), (input, list()), (out, bag())],
        vec![(current, bag()), (input, bag()), (out, bag())],
    ];
    ck.preferable.push(ck.constraints.len());
    ck.constraints
        .push(Constraint::new("query collection kind", span, disjuncts));
    out
}
