//! Core expressions, patterns, and query steps.

use std::rc::Rc;

use weir_core::Value;
use weir_core::ast::Direction;
use weir_types::Type;

use crate::range::RangeSet;

/// An identifier binding: name, disambiguating ordinal, and type.
///
/// Within one environment scope identifiers are unique by (name, ordinal);
/// the type system issues fresh ordinals at binder sites.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPat {
    pub name: Rc<str>,
    pub ordinal: u32,
    pub ty: Rc<Type>,
}

impl NamedPat {
    pub fn new(name: impl Into<Rc<str>>, ordinal: u32, ty: Rc<Type>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            ty,
        }
    }
}

/// A core expression. Immutable, shared via `Rc`, structurally comparable.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    /// A constant: primitive or embedded runtime value (constant lists,
    /// built-in functions, constructor values).
    Literal { ty: Rc<Type>, value: Value },
    Id(NamedPat),
    /// A function literal: one implicit parameter matched against the arm
    /// patterns in order.
    Fn {
        ty: Rc<Type>,
        arms: Rc<Vec<MatchArm>>,
    },
    Apply {
        ty: Rc<Type>,
        func: Rc<Exp>,
        arg: Rc<Exp>,
    },
    Let {
        rec: bool,
        binds: Vec<Bind>,
        body: Rc<Exp>,
    },
    /// Tuples and records alike; for records the type carries the labels
    /// and `args` holds the fields in label order.
    Tuple { ty: Rc<Type>, args: Vec<Rc<Exp>> },
    /// The record selector `#field` as a function value; `slot` is the
    /// field's index in label order.
    Select {
        ty: Rc<Type>,
        field: Rc<str>,
        slot: usize,
    },
    Case {
        ty: Rc<Type>,
        scrutinee: Rc<Exp>,
        arms: Rc<Vec<MatchArm>>,
    },
    From { ty: Rc<Type>, steps: Vec<Step> },
    /// The implicit extent of a type: every value the enclosed ranges
    /// admit. Scans over infinite extents must be rewritten away by the
    /// grounding pass before planning.
    Extent { ty: Rc<Type>, ranges: RangeSet },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pat: Pat,
    pub exp: Rc<Exp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub pat: Pat,
    pub exp: Rc<Exp>,
}

impl Exp {
    pub fn ty(&self) -> Rc<Type> {
        match self {
            Exp::Literal { ty, .. }
            | Exp::Fn { ty, .. }
            | Exp::Apply { ty, .. }
            | Exp::Tuple { ty, .. }
            | Exp::Select { ty, .. }
            | Exp::Case { ty, .. }
            | Exp::From { ty, .. }
            | Exp::Extent { ty, .. } => ty.clone(),
            Exp::Id(pat) => pat.ty.clone(),
            Exp::Let { body, .. } => body.ty(),
        }
    }

    /// Literals and identifier references: cheap and effect-free to
    /// duplicate.
    pub fn is_atomic(&self) -> bool {
        matches!(self, Exp::Literal { .. } | Exp::Id(_) | Exp::Select { .. })
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Exp::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The built-in at the head of this expression, if it is one.
    pub fn as_builtin(&self) -> Option<weir_core::BuiltIn> {
        match self {
            Exp::Literal {
                value: Value::Builtin(b),
                ..
            } => Some(*b),
            _ => None,
        }
    }
}

/// A core pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    Wildcard(Rc<Type>),
    Id(NamedPat),
    Literal { ty: Rc<Type>, value: Value },
    Tuple { ty: Rc<Type>, args: Vec<Pat> },
    /// Fields in label order; labels live in the type.
    Record { ty: Rc<Type>, args: Vec<Pat> },
    /// A nullary constructor.
    Con0 { ty: Rc<Type>, name: Rc<str> },
    /// A constructor applied to an argument pattern.
    Con {
        ty: Rc<Type>,
        name: Rc<str>,
        arg: Box<Pat>,
    },
    Cons {
        ty: Rc<Type>,
        head: Box<Pat>,
        tail: Box<Pat>,
    },
    List { ty: Rc<Type>, args: Vec<Pat> },
    As { name: NamedPat, pat: Box<Pat> },
}

impl Pat {
    pub fn ty(&self) -> Rc<Type> {
        match self {
            Pat::Wildcard(ty) => ty.clone(),
            Pat::Id(pat) => pat.ty.clone(),
            Pat::Literal { ty, .. }
            | Pat::Tuple { ty, .. }
            | Pat::Record { ty, .. }
            | Pat::Con0 { ty, .. }
            | Pat::Con { ty, .. }
            | Pat::Cons { ty, .. }
            | Pat::List { ty, .. } => ty.clone(),
            Pat::As { name, .. } => name.ty.clone(),
        }
    }

    /// Collect the identifiers this pattern binds, in left-to-right order.
    pub fn bindings(&self, out: &mut Vec<NamedPat>) {
        match self {
            Pat::Wildcard(_) | Pat::Literal { .. } | Pat::Con0 { .. } => {}
            Pat::Id(pat) => out.push(pat.clone()),
            Pat::Tuple { args, .. } | Pat::Record { args, .. } | Pat::List { args, .. } => {
                for arg in args {
                    arg.bindings(out);
                }
            }
            Pat::Con { arg, .. } => arg.bindings(out),
            Pat::Cons { head, tail, .. } => {
                head.bindings(out);
                tail.bindings(out);
            }
            Pat::As { name, pat } => {
                out.push(name.clone());
                pat.bindings(out);
            }
        }
    }
}

/// The bindings a query step leaves in scope downstream, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepEnv {
    pub bindings: Vec<NamedPat>,
}

impl StepEnv {
    pub fn new(bindings: Vec<NamedPat>) -> Self {
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&NamedPat> {
        self.bindings.iter().find(|b| b.name.as_ref() == name)
    }

    pub fn extended(&self, extra: &[NamedPat]) -> StepEnv {
        let mut bindings = self.bindings.clone();
        for pat in extra {
            bindings.retain(|b| !(b.name == pat.name && b.ordinal == pat.ordinal));
            bindings.push(pat.clone());
        }
        StepEnv { bindings }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Except,
    Intersect,
}

/// An aggregate in a `group` or `compute` step: output label (with its
/// result type), the aggregate function, and the per-row argument. Without
/// an argument the aggregate ranges over the rows themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub label: NamedPat,
    pub func: Rc<Exp>,
    pub arg: Option<Rc<Exp>>,
}

/// One stage of a core `from` pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Iterate `exp`, bind `pat`, keep rows satisfying `condition`.
    Scan {
        pat: Pat,
        exp: Rc<Exp>,
        condition: Rc<Exp>,
        env: StepEnv,
    },
    Where { exp: Rc<Exp>, env: StepEnv },
    Skip { exp: Rc<Exp>, env: StepEnv },
    Take { exp: Rc<Exp>, env: StepEnv },
    Distinct { env: StepEnv },
    /// Project each row. A record projection rebinds its fields as the
    /// downstream environment; a scalar projection must be the final step.
    Yield { exp: Rc<Exp>, env: StepEnv },
    Order {
        items: Vec<(Rc<Exp>, Direction)>,
        env: StepEnv,
    },
    Group {
        keys: Vec<(NamedPat, Rc<Exp>)>,
        aggregates: Vec<Aggregate>,
        env: StepEnv,
    },
    Compute { aggregates: Vec<Aggregate>, env: StepEnv },
    SetOp {
        kind: SetOpKind,
        distinct: bool,
        args: Vec<Rc<Exp>>,
        env: StepEnv,
    },
}

impl Step {
    pub fn env(&self) -> &StepEnv {
        match self {
            Step::Scan { env, .. }
            | Step::Where { env, .. }
            | Step::Skip { env, .. }
            | Step::Take { env, .. }
            | Step::Distinct { env }
            | Step::Yield { env, .. }
            | Step::Order { env, .. }
            | Step::Group { env, .. }
            | Step::Compute { env, .. }
            | Step::SetOp { env, .. } => env,
        }
    }
}
