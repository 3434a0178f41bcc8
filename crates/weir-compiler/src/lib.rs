#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! The Weir compiler.
//!
//! Takes parsed declarations (built through `weir_core::ast`) through the
//! full pipeline:
//!
//! 1. **Type inference** (`infer`): Hindley–Milner with overload
//!    resolution, record-selector actions, and per-step query typing,
//!    over the unifier in `weir_types`.
//! 2. **Pattern coverage** (`coverage`): exhaustiveness and redundancy by
//!    propositional satisfiability, surfaced per the session's coverage
//!    level.
//! 3. **Lowering** (`lower`): typed AST → core IR, de-sugared and with
//!    every binder given a fresh (name, ordinal) identity.
//! 4. **Grounding** (`ground`): every query variable rewritten to range
//!    over a finite generator derived from the filters.
//! 5. **Inlining and simplification** (`inline`, `simplify`): usage-driven
//!    substitution and algebraic identities to a fixed point.
//! 6. **Plan building** (`plan`): core IR → `weir_vm` codes and row-sink
//!    pipelines, packaged as a [`CompiledStatement`].
//!
//! Entry points live in [`statement`]: [`prepare_statement`] for the full
//! pipeline, [`validate_expression`] for type-only checking.

pub mod builtin_env;
pub mod coverage;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod ground;
pub mod infer;
pub mod inline;
pub mod lower;
pub mod plan;
pub mod simplify;
pub mod statement;

#[cfg(test)]
mod env_tests;
#[cfg(test)]
mod inline_tests;
#[cfg(test)]
mod statement_tests;

pub use builtin_env::initial_environment;
pub use env::{Binding, BindingKind, BoundValue, Environment};
pub use error::{CompileError, CompileResult};
pub use infer::{Resolved, TypeMap};
pub use statement::{
    BackendHint, CompiledStatement, CoverageLevel, ForeignValue, Session, prepare_statement,
    validate_expression,
};
