#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Type representation and unification for the Weir compiler.
//!
//! Two vocabularies live here, bridged by [`embed`]:
//! - [`ty::Type`] — the user-facing type language, with a session-scoped
//!   [`ty::TypeSystem`] that interns datatype definitions, expands aliases,
//!   and issues fresh binding ordinals.
//! - [`term::Term`] — the unifier's working vocabulary of variables, atoms
//!   and applications. The inferencer translates types to terms, runs
//!   [`unify::unify`] over the accumulated equations, and translates the
//!   resulting substitution back to types.
//!
//! The unifier is Martelli–Montanari with two extension points the
//! inferencer relies on: *actions* (callbacks fired when a variable is
//! bound, used for record-selector expansion) and *constraints* (disjunctive
//! restrictions used for overload resolution, committed as unification
//! narrows the candidates).

pub mod embed;
pub mod subst;
pub mod term;
pub mod ty;
pub mod unify;

#[cfg(test)]
mod unify_tests;

pub use subst::Substitution;
pub use term::{Term, TermVar, VarSupply};
pub use ty::{DataTypeDef, Primitive, Type, TypeSystem};
pub use unify::{Actions, Constraint, TermPair, Tracer, Unified, UnifyFailure, unify};
