//! Basalt: a whole-program compiler from a statically-typed, sized-numeric
//! scripting dialect to a portable linear-memory stack-machine module.
//!
//! This crate re-exports the public surface of the workspace:
//!
//! - [`ast`]: the consumed front-end boundary (arena-allocated, symbol-
//!   resolved syntax trees).
//! - [`module`]: the produced boundary (structured instructions and the
//!   module builder).
//! - [`compiler`]: the semantic pipeline between the two.
//!
//! ## Example
//!
//! ```ignore
//! use basalt::{compile, CompilerOptions};
//! use basalt::ast::Module;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let module = build_front_end_tree(&arena);
//! let result = compile(&module, CompilerOptions::default())?;
//! if !result.is_success() {
//!     eprintln!("{}", result.diagnostics);
//! }
//! ```

pub use basalt_ast as ast;
pub use basalt_compiler as compiler;
pub use basalt_module as module;

pub use basalt_compiler::{compile, CompilationResult, CompilerOptions};
pub use basalt_core::{
    ConstValue, Diagnostic, DiagnosticCode, DiagnosticKind, Diagnostics, InternalError, Span,
    TargetWidth,
};
