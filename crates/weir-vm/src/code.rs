//! Executable codes.
//!
//! The plan builder lowers each core expression to one of these; evaluation
//! walks the tree against a persistent environment. Codes are immutable and
//! shared — except [`LinkCell`], the one mutable knot: recursive bindings
//! compile to a link emitted before the right-hand side and set exactly
//! once afterwards.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weir_core::ast::Direction;
use weir_core::{ApplyClosure, BuiltIn, RuntimeError, Value};
use weir_ir::{Pat, SetOpKind};

use crate::builtins::{apply_builtin, apply_value};
use crate::env::EvalEnv;
use crate::sink;

/// The binding the current query row index is published under; `ordinal`
/// references compile to a lookup of this name.
pub const ORDINAL_BINDING: &str = "$ordinal";

#[derive(Debug)]
pub enum Code {
    Constant(Value),
    Get {
        name: Rc<str>,
        ordinal: u32,
    },
    Tuple(Vec<Rc<Code>>),
    Apply {
        func: Rc<Code>,
        arg: Rc<Code>,
    },
    /// Application of a known unary built-in, skipping the function value.
    ApplyBuiltin1 {
        builtin: BuiltIn,
        arg: Rc<Code>,
    },
    /// Application of a known binary built-in, skipping the argument pair.
    ApplyBuiltin2 {
        builtin: BuiltIn,
        arg0: Rc<Code>,
        arg1: Rc<Code>,
    },
    /// Application of a known ternary built-in, skipping the triple.
    ApplyBuiltin3 {
        builtin: BuiltIn,
        arg0: Rc<Code>,
        arg1: Rc<Code>,
        arg2: Rc<Code>,
    },
    AndAlso {
        left: Rc<Code>,
        right: Rc<Code>,
    },
    OrElse {
        left: Rc<Code>,
        right: Rc<Code>,
    },
    /// Record field access by slot, the compiled form of `#field record`.
    Field {
        slot: usize,
        arg: Rc<Code>,
    },
    Let {
        binds: Vec<(Pat, Rc<Code>)>,
        body: Rc<Code>,
    },
    Case {
        scrutinee: Rc<Code>,
        arms: Rc<Vec<(Pat, Rc<Code>)>>,
    },
    /// A function literal: closes over the environment at evaluation time.
    Closure {
        arms: Rc<Vec<(Pat, Rc<Code>)>>,
    },
    /// Deferred reference for recursive bindings.
    Link(Rc<LinkCell>),
    From(Rc<FromPlan>),
}

impl Code {
    pub fn eval(&self, env: &EvalEnv) -> Result<Value, RuntimeError> {
        match self {
            Code::Constant(value) => Ok(value.clone()),
            Code::Get { name, ordinal } => match env.get(name, *ordinal) {
                Some(value) => Ok(value.clone()),
                None => panic!("unbound {name}/{ordinal} at evaluation (plan builder bug)"),
            },
            Code::Tuple(args) => {
                let mut items = Vec::with_capacity(args.len());
                for arg in args {
                    items.push(arg.eval(env)?);
                }
                Ok(Value::list(items))
            }
            Code::Apply { func, arg } => {
                let func = func.eval(env)?;
                let arg = arg.eval(env)?;
                apply_value(&func, arg)
            }
            Code::ApplyBuiltin1 { builtin, arg } => apply_builtin(*builtin, arg.eval(env)?),
            Code::ApplyBuiltin2 { builtin, arg0, arg1 } => apply_builtin(
                *builtin,
                Value::list(vec![arg0.eval(env)?, arg1.eval(env)?]),
            ),
            Code::ApplyBuiltin3 {
                builtin,
                arg0,
                arg1,
                arg2,
            } => apply_builtin(
                *builtin,
                Value::list(vec![arg0.eval(env)?, arg1.eval(env)?, arg2.eval(env)?]),
            ),
            Code::AndAlso { left, right } => {
                if left.eval(env)?.ensure_bool() {
                    right.eval(env)
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Code::OrElse { left, right } => {
                if left.eval(env)?.ensure_bool() {
                    Ok(Value::Bool(true))
                } else {
                    right.eval(env)
                }
            }
            Code::Field { slot, arg } => {
                let record = arg.eval(env)?;
                Ok(record.ensure_list()[*slot].clone())
            }
            Code::Let { binds, body } => {
                let mut scope = env.clone();
                for (pat, code) in binds {
                    let value = code.eval(&scope)?;
                    scope = bind_pat(pat, &value, &scope).ok_or_else(|| {
                        RuntimeError::BindFailure {
                            pattern: pat.to_string(),
                        }
                    })?;
                }
                body.eval(&scope)
            }
            Code::Case { scrutinee, arms } => {
                let value = scrutinee.eval(env)?;
                for (pat, code) in arms.iter() {
                    if let Some(scope) = bind_pat(pat, &value, env) {
                        return code.eval(&scope);
                    }
                }
                Err(RuntimeError::NoMatch)
            }
            Code::Closure { arms } => Ok(Value::Closure(Rc::new(ClosureValue {
                arms: arms.clone(),
                env: env.clone(),
            }))),
            Code::Link(cell) => cell.get().eval(env),
            Code::From(plan) => sink::run(plan, env),
        }
    }
}

/// A single-assignment cell resolving a recursive reference.
///
/// Emitted as a placeholder before a recursive right-hand side is compiled;
/// the target is set once afterwards. An unset link at evaluation time is a
/// plan-builder bug.
pub struct LinkCell {
    target: RefCell<Option<Rc<Code>>>,
}

impl LinkCell {
    pub fn new() -> Rc<LinkCell> {
        Rc::new(LinkCell {
            target: RefCell::new(None),
        })
    }

    pub fn set(&self, code: Rc<Code>) {
        let mut target = self.target.borrow_mut();
        debug_assert!(target.is_none(), "link target set twice");
        *target = Some(code);
    }

    pub fn get(&self) -> Rc<Code> {
        self.target
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("link target never set (plan builder bug)"))
    }
}

impl fmt::Debug for LinkCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the target: a recursive closure's link points back
        // into itself.
        let state = if self.target.borrow().is_some() {
            "set"
        } else {
            "unset"
        };
        write!(f, "LinkCell({state})")
    }
}

/// A compiled function value: the match arms plus the captured environment.
#[derive(Debug)]
pub struct ClosureValue {
    pub arms: Rc<Vec<(Pat, Rc<Code>)>>,
    pub env: EvalEnv,
}

impl ApplyClosure for ClosureValue {
    fn apply(&self, arg: Value) -> Result<Value, RuntimeError> {
        for (pat, code) in self.arms.iter() {
            if let Some(scope) = bind_pat(pat, &arg, &self.env) {
                return code.eval(&scope);
            }
        }
        Err(RuntimeError::NoMatch)
    }
}

/// Match `value` against `pat`, extending `env` with the pattern's
/// bindings. `None` means the value does not match.
pub fn bind_pat(pat: &Pat, value: &Value, env: &EvalEnv) -> Option<EvalEnv> {
    match pat {
        Pat::Wildcard(_) => Some(env.clone()),
        Pat::Id(np) => Some(env.bind(np.name.clone(), np.ordinal, value.clone())),
        Pat::Literal { value: expected, .. } => (expected == value).then(|| env.clone()),
        Pat::Tuple { args, .. } | Pat::Record { args, .. } => {
            let items = value.ensure_list();
            debug_assert_eq!(items.len(), args.len(), "shape mismatch in {pat}");
            let mut scope = env.clone();
            for (arg, item) in args.iter().zip(items.iter()) {
                scope = bind_pat(arg, item, &scope)?;
            }
            Some(scope)
        }
        Pat::Con0 { name, .. } => match value {
            Value::Con(tag, None) if tag == name => Some(env.clone()),
            _ => None,
        },
        Pat::Con { name, arg, .. } => match value {
            Value::Con(tag, Some(inner)) if tag == name => bind_pat(arg, inner, env),
            _ => None,
        },
        Pat::Cons { head, tail, .. } => {
            let items = value.ensure_list();
            let first = items.first()?;
            let scope = bind_pat(head, first, env)?;
            bind_pat(tail, &Value::list(items[1..].to_vec()), &scope)
        }
        Pat::List { args, .. } => {
            let items = value.ensure_list();
            if items.len() != args.len() {
                return None;
            }
            let mut scope = env.clone();
            for (arg, item) in args.iter().zip(items.iter()) {
                scope = bind_pat(arg, item, &scope)?;
            }
            Some(scope)
        }
        Pat::As { name, pat } => {
            let scope = env.bind(name.name.clone(), name.ordinal, value.clone());
            bind_pat(pat, value, &scope)
        }
    }
}

/// The compiled form of a `from` pipeline: one sink step per core step,
/// plus the terminal that shapes the result.
#[derive(Debug)]
pub struct FromPlan {
    pub steps: Vec<SinkStep>,
    pub terminal: Terminal,
}

#[derive(Debug)]
pub enum Terminal {
    /// Collect projected rows into the result collection.
    Collect { project: Rc<Code> },
    /// A `compute` pipeline: exactly one row, projected to a scalar or
    /// record.
    Single { project: Rc<Code> },
}

/// One query step, ready for execution.
#[derive(Debug)]
pub enum SinkStep {
    Scan {
        pat: Pat,
        code: Rc<Code>,
        condition: Rc<Code>,
        /// Publish the row index under [`ORDINAL_BINDING`]; set on the
        /// innermost scan when any step mentions `ordinal`.
        bind_ordinal: bool,
    },
    Where {
        condition: Rc<Code>,
    },
    Skip {
        count: Rc<Code>,
    },
    Take {
        count: Rc<Code>,
    },
    Distinct {
        /// The (name, ordinal) bindings that identify a row.
        keys: Vec<(Rc<str>, u32)>,
    },
    /// Record projection: evaluate, then rebind each field for downstream
    /// steps. Fields in label order.
    Yield {
        code: Rc<Code>,
        rebinds: Vec<(Rc<str>, u32)>,
    },
    Order {
        items: Vec<(Rc<Code>, Direction)>,
    },
    Group {
        keys: Vec<(Rc<str>, u32, Rc<Code>)>,
        aggregates: Vec<AggSpec>,
    },
    Compute {
        aggregates: Vec<AggSpec>,
    },
    SetOp {
        kind: SetOpKind,
        distinct: bool,
        args: Vec<Rc<Code>>,
        /// The current row as a value, for comparison with `args` elements.
        row: Rc<Code>,
        /// Pattern rebinding a surviving row value for downstream steps.
        rebind: Pat,
    },
}

/// One aggregate of a `group`/`compute` step.
#[derive(Debug)]
pub struct AggSpec {
    pub name: Rc<str>,
    pub ordinal: u32,
    pub func: Rc<Code>,
    /// Per-row argument; `None` ranges over the rows themselves.
    pub arg: Option<Rc<Code>>,
}
