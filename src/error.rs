//! Error kinds surfaced by flow graph construction.
//!
//! All errors are reported synchronously from the entry points; a failed
//! build never returns a partial `FlowProgram`.

/// Errors that can occur while building a flow program.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The input is not a structurally valid program (not an object, missing
    /// a `type` tag, or the top-level node is not `Program`).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A statement or expression tag the dispatcher does not know.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// A `break` or `continue` with no resolvable target, or a `continue`
    /// referring to a non-iteration label.
    #[error("illegal jump target: {0}")]
    IllegalJumpTarget(String),

    /// Statement nesting exceeded the recursion budget.
    #[error("input nesting exceeds the supported depth of {0}")]
    InputTooDeep(usize),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;
