#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Shared data structures for the Weir language.
//!
//! Weir is a strongly-typed polymorphic functional language with first-class
//! relational query (`from`) expressions. This crate holds the vocabulary the
//! compiler and the evaluator exchange:
//! - **Spans** (`Span`): byte ranges into the session source, the unit all
//!   diagnostics are reported in.
//! - **AST** (`ast`): the parsed form of declarations and expressions. The
//!   parser itself lives outside this workspace; tests and embedders build
//!   trees through [`ast::AstBuilder`], which issues the node identities the
//!   type inferencer keys its node→type map on.
//! - **Runtime values** (`Value`): the dynamic representation query pipelines
//!   and compiled closures operate on.
//! - **Built-ins** (`BuiltIn`): the fixed basis library shared by the type
//!   checker, the inliner's constant folder, and the evaluator.

pub mod ast;
pub mod builtin;
pub mod label;
pub mod span;
pub mod value;

mod error;

#[cfg(test)]
mod label_tests;

pub use builtin::BuiltIn;
pub use error::RuntimeError;
pub use span::Span;
pub use value::{ApplyClosure, Value};
