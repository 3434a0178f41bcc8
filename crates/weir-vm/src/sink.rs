//! Row sinks: streaming execution of query pipelines.
//!
//! A pipeline is a right-folded chain — each step's sink wraps the next and
//! the terminal sink collects results. Rows are environments; a sink
//! receives one, does its work, and forwards zero or more downstream.
//! `accept` returns `false` when nothing further upstream can matter
//! (a `take` that is satisfied), letting scans stop early.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use weir_core::{RuntimeError, Value};
use weir_ir::SetOpKind;

use crate::builtins::apply_value;
use crate::code::{AggSpec, Code, FromPlan, ORDINAL_BINDING, SinkStep, Terminal, bind_pat};
use crate::env::EvalEnv;

pub trait RowSink {
    /// Accept one row. Returns `false` once no further rows are wanted.
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError>;

    /// No more rows are coming; flush buffered work downstream.
    fn finish(&mut self) -> Result<(), RuntimeError>;
}

/// Execute a compiled pipeline and build its result value.
pub fn run(plan: &FromPlan, env: &EvalEnv) -> Result<Value, RuntimeError> {
    let mut collected: Vec<Value> = Vec::new();
    {
        let project = match &plan.terminal {
            Terminal::Collect { project } | Terminal::Single { project } => project.clone(),
        };
        let mut sink: Box<dyn RowSink + '_> = Box::new(CollectSink {
            project,
            out: &mut collected,
        });
        for step in plan.steps.iter().rev() {
            sink = make_sink(step, sink, env)?;
        }
        sink.accept(env)?;
        sink.finish()?;
    }
    match &plan.terminal {
        Terminal::Collect { .. } => Ok(Value::list(collected)),
        Terminal::Single { .. } => {
            debug_assert_eq!(collected.len(), 1, "compute must produce one row");
            Ok(collected.pop().expect("compute produced a row"))
        }
    }
}

fn make_sink<'a>(
    step: &'a SinkStep,
    down: Box<dyn RowSink + 'a>,
    env: &EvalEnv,
) -> Result<Box<dyn RowSink + 'a>, RuntimeError> {
    Ok(match step {
        SinkStep::Scan {
            pat,
            code,
            condition,
            bind_ordinal,
        } => Box::new(ScanSink {
            pat,
            code: code.clone(),
            condition: condition.clone(),
            bind_ordinal: *bind_ordinal,
            produced: 0,
            down,
        }),
        SinkStep::Where { condition } => Box::new(WhereSink {
            condition: condition.clone(),
            down,
        }),
        SinkStep::Skip { count } => Box::new(SkipSink {
            remaining: count.eval(env)?.ensure_int(),
            down,
        }),
        SinkStep::Take { count } => Box::new(TakeSink {
            remaining: count.eval(env)?.ensure_int(),
            down,
        }),
        SinkStep::Distinct { keys } => Box::new(DistinctSink {
            keys,
            seen: HashMap::new(),
            down,
        }),
        SinkStep::Yield { code, rebinds } => Box::new(YieldSink {
            code: code.clone(),
            rebinds,
            down,
        }),
        SinkStep::Order { items } => Box::new(OrderSink {
            items,
            rows: Vec::new(),
            down,
        }),
        SinkStep::Group { keys, aggregates } => Box::new(GroupSink {
            keys,
            aggregates,
            groups: IndexMap::new(),
            base: env.clone(),
            down,
        }),
        SinkStep::Compute { aggregates } => Box::new(ComputeSink {
            aggregates,
            rows: Vec::new(),
            base: env.clone(),
            down,
        }),
        SinkStep::SetOp {
            kind,
            distinct,
            args,
            row,
            rebind,
        } => {
            let mut others = Vec::with_capacity(args.len());
            for arg in args {
                others.push(arg.eval(env)?.ensure_list().as_ref().clone());
            }
            Box::new(SetOpSink {
                kind: *kind,
                distinct: *distinct,
                others,
                row: row.clone(),
                rebind,
                rows: Vec::new(),
                base: env.clone(),
                down,
            })
        }
    })
}

struct CollectSink<'a> {
    project: Rc<Code>,
    out: &'a mut Vec<Value>,
}

impl RowSink for CollectSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        self.out.push(self.project.eval(env)?);
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct ScanSink<'a> {
    pat: &'a weir_ir::Pat,
    code: Rc<Code>,
    condition: Rc<Code>,
    bind_ordinal: bool,
    produced: i64,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for ScanSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        let collection = self.code.eval(env)?;
        for item in collection.ensure_list().iter() {
            // A non-matching pattern filters the element out.
            let Some(mut scope) = bind_pat(self.pat, item, env) else {
                continue;
            };
            if !self.condition.eval(&scope)?.ensure_bool() {
                continue;
            }
            if self.bind_ordinal {
                scope = scope.bind(ORDINAL_BINDING.into(), 0, Value::Int(self.produced));
            }
            self.produced += 1;
            if !self.down.accept(&scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

struct WhereSink<'a> {
    condition: Rc<Code>,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for WhereSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        if self.condition.eval(env)?.ensure_bool() {
            self.down.accept(env)
        } else {
            Ok(true)
        }
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

struct SkipSink<'a> {
    remaining: i64,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for SkipSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        if self.remaining > 0 {
            self.remaining -= 1;
            Ok(true)
        } else {
            self.down.accept(env)
        }
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

struct TakeSink<'a> {
    remaining: i64,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for TakeSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        if self.remaining <= 0 {
            return Ok(false);
        }
        self.remaining -= 1;
        let more = self.down.accept(env)?;
        Ok(more && self.remaining > 0)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

struct DistinctSink<'a> {
    keys: &'a [(Rc<str>, u32)],
    seen: HashMap<Value, ()>,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for DistinctSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        let key = row_key(self.keys, env);
        if self.seen.insert(key, ()).is_some() {
            return Ok(true);
        }
        self.down.accept(env)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

fn row_key(keys: &[(Rc<str>, u32)], env: &EvalEnv) -> Value {
    Value::list(
        keys.iter()
            .map(|(name, ordinal)| {
                env.get(name, *ordinal)
                    .unwrap_or_else(|| panic!("row binding {name} missing (plan builder bug)"))
                    .clone()
            })
            .collect(),
    )
}

struct YieldSink<'a> {
    code: Rc<Code>,
    rebinds: &'a [(Rc<str>, u32)],
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for YieldSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        let row = self.code.eval(env)?;
        let fields = row.ensure_list();
        debug_assert_eq!(fields.len(), self.rebinds.len(), "projection shape");
        let mut scope = env.clone();
        for ((name, ordinal), value) in self.rebinds.iter().zip(fields.iter()) {
            scope = scope.bind(name.clone(), *ordinal, value.clone());
        }
        self.down.accept(&scope)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        self.down.finish()
    }
}

struct OrderSink<'a> {
    items: &'a [(Rc<Code>, weir_core::ast::Direction)],
    rows: Vec<(Vec<Value>, EvalEnv)>,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for OrderSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        let mut keys = Vec::with_capacity(self.items.len());
        for (code, _) in self.items {
            keys.push(code.eval(env)?);
        }
        self.rows.push((keys, env.clone()));
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        let items = self.items;
        self.rows.sort_by(|(a, _), (b, _)| {
            for (i, (_, dir)) in items.iter().enumerate() {
                let ord = a[i].cmp(&b[i]);
                let ord = match dir {
                    weir_core::ast::Direction::Asc => ord,
                    weir_core::ast::Direction::Desc => ord.reverse(),
                };
                if !ord.is_eq() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        for (_, env) in std::mem::take(&mut self.rows) {
            if !self.down.accept(&env)? {
                break;
            }
        }
        self.down.finish()
    }
}

struct GroupSink<'a> {
    keys: &'a [(Rc<str>, u32, Rc<Code>)],
    aggregates: &'a [AggSpec],
    /// Key tuple → per-aggregate argument lists, in first-seen order.
    groups: IndexMap<Value, Vec<Vec<Value>>>,
    base: EvalEnv,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for GroupSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        let mut key = Vec::with_capacity(self.keys.len());
        for (_, _, code) in self.keys {
            key.push(code.eval(env)?);
        }
        let mut args = Vec::with_capacity(self.aggregates.len());
        for agg in self.aggregates {
            args.push(match &agg.arg {
                Some(code) => code.eval(env)?,
                None => Value::Unit,
            });
        }
        let bucket = self
            .groups
            .entry(Value::list(key))
            .or_insert_with(|| vec![Vec::new(); args.len()]);
        for (list, arg) in bucket.iter_mut().zip(args) {
            list.push(arg);
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        for (key, buckets) in std::mem::take(&mut self.groups) {
            let key_values = key.ensure_list();
            let mut scope = self.base.clone();
            for ((name, ordinal, _), value) in self.keys.iter().zip(key_values.iter()) {
                scope = scope.bind(name.clone(), *ordinal, value.clone());
            }
            scope = bind_aggregates(self.aggregates, &buckets, scope, &self.base)?;
            if !self.down.accept(&scope)? {
                break;
            }
        }
        self.down.finish()
    }
}

struct ComputeSink<'a> {
    aggregates: &'a [AggSpec],
    /// Per-aggregate argument lists across all rows.
    rows: Vec<Vec<Value>>,
    base: EvalEnv,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for ComputeSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        if self.rows.is_empty() {
            self.rows = vec![Vec::new(); self.aggregates.len()];
        }
        for (agg, bucket) in self.aggregates.iter().zip(self.rows.iter_mut()) {
            bucket.push(match &agg.arg {
                Some(code) => code.eval(env)?,
                None => Value::Unit,
            });
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        if self.rows.is_empty() {
            self.rows = vec![Vec::new(); self.aggregates.len()];
        }
        let scope = bind_aggregates(
            self.aggregates,
            &std::mem::take(&mut self.rows),
            self.base.clone(),
            &self.base,
        )?;
        self.down.accept(&scope)?;
        self.down.finish()
    }
}

fn bind_aggregates(
    aggregates: &[AggSpec],
    buckets: &[Vec<Value>],
    mut scope: EvalEnv,
    base: &EvalEnv,
) -> Result<EvalEnv, RuntimeError> {
    for (agg, bucket) in aggregates.iter().zip(buckets) {
        let func = agg.func.eval(base)?;
        let result = apply_value(&func, Value::list(bucket.clone()))?;
        scope = scope.bind(agg.name.clone(), agg.ordinal, result);
    }
    Ok(scope)
}

struct SetOpSink<'a> {
    kind: SetOpKind,
    distinct: bool,
    others: Vec<Vec<Value>>,
    row: Rc<Code>,
    rebind: &'a weir_ir::Pat,
    rows: Vec<Value>,
    base: EvalEnv,
    down: Box<dyn RowSink + 'a>,
}

impl RowSink for SetOpSink<'_> {
    fn accept(&mut self, env: &EvalEnv) -> Result<bool, RuntimeError> {
        self.rows.push(self.row.eval(env)?);
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), RuntimeError> {
        let mut result: Vec<Value> = std::mem::take(&mut self.rows);
        match self.kind {
            SetOpKind::Union => {
                for other in &self.others {
                    result.extend(other.iter().cloned());
                }
            }
            SetOpKind::Except => {
                // Multiset difference: each occurrence in an argument
                // removes one occurrence from the left side.
                let mut remove: HashMap<Value, usize> = HashMap::new();
                for other in &self.others {
                    for value in other {
                        *remove.entry(value.clone()).or_insert(0) += 1;
                    }
                }
                result.retain(|value| match remove.get_mut(value) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        false
                    }
                    _ => true,
                });
            }
            SetOpKind::Intersect => {
                // Keep each row only while every argument still has an
                // occurrence to pair it with.
                let mut counts: Vec<HashMap<&Value, usize>> = self
                    .others
                    .iter()
                    .map(|other| {
                        let mut m: HashMap<&Value, usize> = HashMap::new();
                        for value in other {
                            *m.entry(value).or_insert(0) += 1;
                        }
                        m
                    })
                    .collect();
                result.retain(|value| {
                    counts.iter_mut().all(|m| match m.get_mut(value) {
                        Some(n) if *n > 0 => {
                            *n -= 1;
                            true
                        }
                        _ => false,
                    })
                });
            }
        }
        if self.distinct {
            let mut seen: HashMap<Value, ()> = HashMap::new();
            result.retain(|value| seen.insert(value.clone(), ()).is_none());
        }
        for value in result {
            let scope = bind_pat(self.rebind, &value, &self.base).ok_or_else(|| {
                RuntimeError::BindFailure {
                    pattern: self.rebind.to_string(),
                }
            })?;
            if !self.down.accept(&scope)? {
                break;
            }
        }
        self.down.finish()
    }
}
