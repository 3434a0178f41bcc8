//! Construction helpers for core expressions.
//!
//! [`FromBuilder`] appends query steps in order and threads the output
//! environment each step leaves for the ones downstream; the free functions
//! cover the expression shapes every pass builds.

use std::rc::Rc;

use weir_core::ast::Direction;
use weir_core::{BuiltIn, Value};
use weir_types::Type;

use crate::exp::{Aggregate, Exp, NamedPat, Pat, SetOpKind, Step, StepEnv};

pub fn literal(ty: Rc<Type>, value: Value) -> Rc<Exp> {
    Rc::new(Exp::Literal { ty, value })
}

pub fn int_literal(n: i64) -> Rc<Exp> {
    literal(Type::int(), Value::Int(n))
}

pub fn bool_literal(b: bool) -> Rc<Exp> {
    literal(Type::bool(), Value::Bool(b))
}

pub fn unit_literal() -> Rc<Exp> {
    literal(Type::unit(), Value::Unit)
}

pub fn id(pat: NamedPat) -> Rc<Exp> {
    Rc::new(Exp::Id(pat))
}

pub fn apply(ty: Rc<Type>, func: Rc<Exp>, arg: Rc<Exp>) -> Rc<Exp> {
    Rc::new(Exp::Apply { ty, func, arg })
}

/// A built-in as a function value, with its use-site type.
pub fn builtin(b: BuiltIn, ty: Rc<Type>) -> Rc<Exp> {
    literal(ty, Value::Builtin(b))
}

/// `b (a0, a1)` — the usual shape of a binary built-in application.
pub fn apply2(ty: Rc<Type>, b: BuiltIn, a0: Rc<Exp>, a1: Rc<Exp>) -> Rc<Exp> {
    let pair_ty = Rc::new(Type::Tuple(vec![a0.ty(), a1.ty()]));
    let fn_ty = Type::func(pair_ty.clone(), ty.clone());
    let arg = Rc::new(Exp::Tuple {
        ty: pair_ty,
        args: vec![a0, a1],
    });
    apply(ty, builtin(b, fn_ty), arg)
}

pub fn tuple(ty: Rc<Type>, args: Vec<Rc<Exp>>) -> Rc<Exp> {
    Rc::new(Exp::Tuple { ty, args })
}

/// Build an ordered `from` pipeline, threading each step's output
/// environment.
#[derive(Debug, Default)]
pub struct FromBuilder {
    steps: Vec<Step>,
    env: StepEnv,
}

impl FromBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(&self) -> &StepEnv {
        &self.env
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn scan(&mut self, pat: Pat, exp: Rc<Exp>, condition: Rc<Exp>) -> &mut Self {
        let mut bound = Vec::new();
        pat.bindings(&mut bound);
        self.env = self.env.extended(&bound);
        self.steps.push(Step::Scan {
            pat,
            exp,
            condition,
            env: self.env.clone(),
        });
        self
    }

    pub fn where_(&mut self, exp: Rc<Exp>) -> &mut Self {
        self.steps.push(Step::Where {
            exp,
            env: self.env.clone(),
        });
        self
    }

    pub fn skip(&mut self, exp: Rc<Exp>) -> &mut Self {
        self.steps.push(Step::Skip {
            exp,
            env: self.env.clone(),
        });
        self
    }

    pub fn take(&mut self, exp: Rc<Exp>) -> &mut Self {
        self.steps.push(Step::Take {
            exp,
            env: self.env.clone(),
        });
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.steps.push(Step::Distinct {
            env: self.env.clone(),
        });
        self
    }

    /// A projection. `rebinds` is the downstream environment: the fields of
    /// a record projection, or empty for a scalar projection (which must be
    /// the final step).
    pub fn yield_(&mut self, exp: Rc<Exp>, rebinds: Vec<NamedPat>) -> &mut Self {
        self.env = StepEnv::new(rebinds);
        self.steps.push(Step::Yield {
            exp,
            env: self.env.clone(),
        });
        self
    }

    pub fn order(&mut self, items: Vec<(Rc<Exp>, Direction)>) -> &mut Self {
        self.steps.push(Step::Order {
            items,
            env: self.env.clone(),
        });
        self
    }

    pub fn group(&mut self, keys: Vec<(NamedPat, Rc<Exp>)>, aggregates: Vec<Aggregate>) -> &mut Self {
        let mut bindings: Vec<NamedPat> = keys.iter().map(|(pat, _)| pat.clone()).collect();
        bindings.extend(aggregates.iter().map(|agg| agg.label.clone()));
        self.env = StepEnv::new(bindings);
        self.steps.push(Step::Group {
            keys,
            aggregates,
            env: self.env.clone(),
        });
        self
    }

    pub fn compute(&mut self, aggregates: Vec<Aggregate>) -> &mut Self {
        self.env = StepEnv::new(aggregates.iter().map(|agg| agg.label.clone()).collect());
        self.steps.push(Step::Compute {
            aggregates,
            env: self.env.clone(),
        });
        self
    }

    pub fn set_op(&mut self, kind: SetOpKind, distinct: bool, args: Vec<Rc<Exp>>) -> &mut Self {
        self.steps.push(Step::SetOp {
            kind,
            distinct,
            args,
            env: self.env.clone(),
        });
        self
    }

    pub fn build(self, ty: Rc<Type>) -> Rc<Exp> {
        Rc::new(Exp::From {
            ty,
            steps: self.steps,
        })
    }
}
