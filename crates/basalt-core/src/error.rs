//! Fatal internal errors.
//!
//! Basalt distinguishes two error classes. User-diagnosable problems go
//! through the [`Diagnostics`](crate::Diagnostics) collection and compilation
//! continues in best-effort mode. The errors in this module are the other
//! class: internal invariant violations that indicate a bug in the compiler
//! or a malformed assumption from the front-end. They abort the compilation
//! immediately and are never downgraded to diagnostics.

use thiserror::Error;

use crate::Span;

/// A non-recoverable internal invariant violation.
///
/// Raising one of these means the compiler state can no longer be trusted;
/// callers propagate it to the entry point with `?` and stop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InternalError {
    /// Two templates were registered under the same mangled name.
    #[error("duplicate template registration '{name}'")]
    DuplicateTemplate {
        /// The mangled name that collided.
        name: String,
    },

    /// A template was instantiated with the wrong number of type arguments.
    ///
    /// The front-end validates arity before hand-off, so reaching this is a
    /// front-end contract violation, not a user diagnostic.
    #[error("template '{name}' expects {expected} type argument(s), got {got}")]
    TemplateArity {
        /// The template name.
        name: String,
        /// Declared type-parameter count.
        expected: usize,
        /// Provided argument count.
        got: usize,
    },

    /// A constructor parameter marked as a property does not match the
    /// property declared at the same position.
    #[error("constructor parameter '{param}' of '{class}' does not match property '{property}'")]
    ConstructorPropertyMismatch {
        /// The owning class.
        class: String,
        /// The parameter name.
        param: String,
        /// The property name found at that position.
        property: String,
    },

    /// An intrinsic was applied to an operand type outside its supported set.
    #[error("unsupported operation: '{name}' on type '{operand}'")]
    UnsupportedOperation {
        /// The intrinsic name.
        name: String,
        /// Display name of the offending operand type.
        operand: String,
    },

    /// A patched implementation omits a method the declaration requires.
    #[error("implementation '{class}' is missing required method '{method}'")]
    MissingMethod {
        /// The implementation class.
        class: String,
        /// The missing method name.
        method: String,
    },

    /// A type resolved to a kind the caller cannot accept.
    #[error("at {span}: resolved '{name}' to an unexpected kind ({found})")]
    UnexpectedTypeKind {
        /// The name that was resolved.
        name: String,
        /// What it resolved to.
        found: &'static str,
        /// Where the resolution was requested.
        span: Span,
    },

    /// Generic instantiation recursed past the depth cap.
    #[error("template instantiation depth exceeded while resolving '{name}'")]
    TemplateRecursion {
        /// The template being resolved when the cap was hit.
        name: String,
    },

    /// A template was patched after the lowering pass had begun.
    #[error("template '{name}' patched after lowering started")]
    PatchAfterLowering {
        /// The declaration template's name.
        name: String,
    },

    /// A static array was requested with a length outside `[0, 2^31 - 1]`.
    #[error("static array length {len} out of range")]
    ArrayLengthOutOfRange {
        /// The requested element count.
        len: i64,
    },

    /// Catch-all for invariants with no dedicated variant.
    #[error("internal error: {message}")]
    Other {
        /// What went wrong.
        message: String,
    },
}

impl InternalError {
    /// Shorthand for [`InternalError::Other`].
    pub fn msg(message: impl Into<String>) -> Self {
        InternalError::Other {
            message: message.into(),
        }
    }
}
