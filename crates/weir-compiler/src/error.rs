//! Compile-time errors.
//!
//! Every kind carries the span of the offending node; nothing is swallowed
//! inside the pipeline — errors surface from the entry points in
//! `statement`.

use weir_core::Span;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("unbound identifier {name}")]
    UnboundIdentifier { name: String, span: Span },

    #[error("type error: {reason}")]
    TypeError { reason: String, span: Span },

    /// A record selector whose argument type never resolved.
    #[error("cannot determine the record type for #{field}")]
    FlexRecord { field: String, span: Span },

    /// A selector naming a field the resolved record does not have.
    #[error("no field {field} in type {ty}")]
    NoField {
        field: String,
        ty: String,
        span: Span,
    },

    /// Only an error when the session's coverage level says so; otherwise a
    /// warning in the diagnostics.
    #[error("match is not exhaustive; {witness} is not matched")]
    NonExhaustiveMatch { witness: String, span: Span },

    #[error("redundant match arm")]
    RedundantMatch { span: Span },

    /// A query variable for which no finite generator could be derived.
    #[error("cannot derive a finite extent for {name}")]
    UngroundedPattern { name: String, span: Span },

    #[error("duplicate label {label} in group")]
    DuplicateFieldInGroup { label: String, span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnboundIdentifier { span, .. }
            | CompileError::TypeError { span, .. }
            | CompileError::FlexRecord { span, .. }
            | CompileError::NoField { span, .. }
            | CompileError::NonExhaustiveMatch { span, .. }
            | CompileError::RedundantMatch { span }
            | CompileError::UngroundedPattern { span, .. }
            | CompileError::DuplicateFieldInGroup { span, .. } => *span,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
