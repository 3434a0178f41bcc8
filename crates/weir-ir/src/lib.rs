#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! The core intermediate representation.
//!
//! After type inference the AST lowers into this typed, de-sugared form:
//! expressions, patterns, and the ordered steps of `from` pipelines. Nodes
//! are immutable and shared via `Rc`; equality is structural, which the
//! simplifier relies on for its algebraic identities.
//!
//! Every query step records the *output environment* it produces — the
//! bindings in scope downstream — so later passes (grounding, the plan
//! builder) never re-derive scoping. [`FromBuilder`] threads that
//! environment while steps are appended.
//!
//! This crate contains only type definitions, construction helpers, the
//! interval machinery for extents, and the unparser. Transformation passes
//! and execution live elsewhere.

pub mod builder;
pub mod display;
pub mod exp;
pub mod range;


pub use builder::FromBuilder;
pub use exp::{
    Aggregate, Bind, Exp, MatchArm, NamedPat, Pat, SetOpKind, Step, StepEnv,
};
pub use range::{Bound, Cardinality, RangeSet, ValueRange};
