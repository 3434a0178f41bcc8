//! Errors that can occur while evaluating compiled code.

/// A runtime failure during `eval`.
///
/// These are handed to the session handler, formatted, and appended to the
/// output lines; they never unwind through the compiler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A pattern in a `let` or query step did not match the value produced
    /// at evaluation time.
    #[error("bind failed: value does not match pattern {pattern}")]
    BindFailure { pattern: String },

    /// A `case` or `fn` fell through every arm.
    #[error("no matching case")]
    NoMatch,

    #[error("division by zero")]
    DivisionByZero,

    /// `hd`/`tl` on the empty list, or an aggregate over no rows.
    #[error("empty list")]
    EmptyList,

    /// `substring` outside the bounds of its string.
    #[error("subscript out of bounds")]
    Subscript,

    /// Ordering was requested on values with no order (functions).
    #[error("values cannot be compared")]
    Unordered,
}
