#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! The evaluator.
//!
//! The plan builder lowers core declarations into [`code::Code`] trees;
//! this crate executes them. Evaluation is synchronous and single-threaded:
//! a code evaluates against a persistent [`env::EvalEnv`] chain and either
//! produces a [`weir_core::Value`] or a [`weir_core::RuntimeError`].
//!
//! Query pipelines run as chains of [`sink::RowSink`]s, each step wrapping
//! the next; rows flow through one at a time in the deterministic order
//! established by scans and `order` steps, and the terminal sink collects
//! the result collection.

pub mod builtins;
pub mod code;
pub mod env;
pub mod pretty;
pub mod sink;

#[cfg(test)]
mod builtins_tests;
#[cfg(test)]
mod code_tests;
#[cfg(test)]
mod pretty_tests;
#[cfg(test)]
mod sink_tests;

pub use code::{AggSpec, Code, FromPlan, LinkCell, SinkStep, Terminal};
pub use env::EvalEnv;
pub use pretty::PrettyConfig;
