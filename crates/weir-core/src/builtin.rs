//! The built-in basis library.
//!
//! One enum shared by the whole pipeline: the type checker assigns each
//! member its (possibly overloaded) type, the inliner's constant folder and
//! the evaluator share a single implementation of its value semantics, and
//! the plan builder specializes application sites where the callee is a
//! known member of fixed arity.

use std::fmt;

/// A built-in function or operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltIn {
    // Arithmetic. `+ - * / abs` are overloaded over int and real.
    Add,
    Sub,
    Mul,
    Divide,
    Div,
    Mod,
    Negate,
    Abs,
    // Comparison. `= <>` are polymorphic; the rest are overloaded over the
    // ordered primitives.
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logic. `andalso`/`orelse` short-circuit and get dedicated codes; they
    // still appear here so the inliner can fold them over constants.
    AndAlso,
    OrElse,
    Not,
    // Lists.
    Cons,
    Append,
    Elem,
    NotElem,
    Hd,
    Tl,
    ListLength,
    ListRev,
    ListMap,
    ListFilter,
    // Strings.
    StrSize,
    Concat,
    Substring,
    // Aggregates, usable in `group`/`compute` and as ordinary functions over
    // collections.
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl BuiltIn {
    /// The surface name this built-in is bound to in the initial environment.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltIn::Add => "+",
            BuiltIn::Sub => "-",
            BuiltIn::Mul => "*",
            BuiltIn::Divide => "/",
            BuiltIn::Div => "div",
            BuiltIn::Mod => "mod",
            BuiltIn::Negate => "~",
            BuiltIn::Abs => "abs",
            BuiltIn::Eq => "=",
            BuiltIn::Ne => "<>",
            BuiltIn::Lt => "<",
            BuiltIn::Le => "<=",
            BuiltIn::Gt => ">",
            BuiltIn::Ge => ">=",
            BuiltIn::AndAlso => "andalso",
            BuiltIn::OrElse => "orelse",
            BuiltIn::Not => "not",
            BuiltIn::Cons => "::",
            BuiltIn::Append => "@",
            BuiltIn::Elem => "elem",
            BuiltIn::NotElem => "notelem",
            BuiltIn::Hd => "hd",
            BuiltIn::Tl => "tl",
            BuiltIn::ListLength => "length",
            BuiltIn::ListRev => "rev",
            BuiltIn::ListMap => "map",
            BuiltIn::ListFilter => "filter",
            BuiltIn::StrSize => "size",
            BuiltIn::Concat => "^",
            BuiltIn::Substring => "substring",
            BuiltIn::Sum => "sum",
            BuiltIn::Count => "count",
            BuiltIn::Min => "min",
            BuiltIn::Max => "max",
            BuiltIn::Avg => "avg",
        }
    }

    /// Number of arguments, counting a tuple argument by its components.
    /// Binary operators take a pair.
    pub fn arity(&self) -> usize {
        match self {
            BuiltIn::Negate
            | BuiltIn::Abs
            | BuiltIn::Not
            | BuiltIn::Hd
            | BuiltIn::Tl
            | BuiltIn::ListLength
            | BuiltIn::ListRev
            | BuiltIn::StrSize
            | BuiltIn::Sum
            | BuiltIn::Count
            | BuiltIn::Min
            | BuiltIn::Max
            | BuiltIn::Avg => 1,
            BuiltIn::Substring => 3,
            _ => 2,
        }
    }

    /// True for operators rendered infix by the unparser.
    pub fn is_infix(&self) -> bool {
        matches!(
            self,
            BuiltIn::Add
                | BuiltIn::Sub
                | BuiltIn::Mul
                | BuiltIn::Divide
                | BuiltIn::Div
                | BuiltIn::Mod
                | BuiltIn::Eq
                | BuiltIn::Ne
                | BuiltIn::Lt
                | BuiltIn::Le
                | BuiltIn::Gt
                | BuiltIn::Ge
                | BuiltIn::AndAlso
                | BuiltIn::OrElse
                | BuiltIn::Cons
                | BuiltIn::Append
                | BuiltIn::Elem
                | BuiltIn::NotElem
                | BuiltIn::Concat
        )
    }

    /// All members, for seeding the initial environment.
    pub fn all() -> impl Iterator<Item = BuiltIn> {
        [
            BuiltIn::Add,
            BuiltIn::Sub,
            BuiltIn::Mul,
            BuiltIn::Divide,
            BuiltIn::Div,
            BuiltIn::Mod,
            BuiltIn::Negate,
            BuiltIn::Abs,
            BuiltIn::Eq,
            BuiltIn::Ne,
            BuiltIn::Lt,
            BuiltIn::Le,
            BuiltIn::Gt,
            BuiltIn::Ge,
            BuiltIn::AndAlso,
            BuiltIn::OrElse,
            BuiltIn::Not,
            BuiltIn::Cons,
            BuiltIn::Append,
            BuiltIn::Elem,
            BuiltIn::NotElem,
            BuiltIn::Hd,
            BuiltIn::Tl,
            BuiltIn::ListLength,
            BuiltIn::ListRev,
            BuiltIn::ListMap,
            BuiltIn::ListFilter,
            BuiltIn::StrSize,
            BuiltIn::Concat,
            BuiltIn::Substring,
            BuiltIn::Sum,
            BuiltIn::Count,
            BuiltIn::Min,
            BuiltIn::Max,
            BuiltIn::Avg,
        ]
        .into_iter()
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
