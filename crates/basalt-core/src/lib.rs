//! Shared leaf types for the basalt compiler.
//!
//! This crate holds everything the boundary crates and the compiler agree
//! on: source spans, the two error classes (fatal internal errors vs.
//! collected user diagnostics), compile-time constant values, and the target
//! configuration that fixes the pointer width.

mod diagnostics;
mod error;
mod span;
mod target;
mod value;

pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticKind, Diagnostics};
pub use error::InternalError;
pub use span::Span;
pub use target::{pages_for, TargetWidth, PAGE_SIZE};
pub use value::ConstValue;
