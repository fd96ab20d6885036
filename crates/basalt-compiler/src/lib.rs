//! The basalt compiler.
//!
//! A whole-program compiler that lowers a statically-typed, sized-numeric
//! scripting dialect into a linear-memory, stack-based instruction module.
//! The front-end hands over a fully parsed, symbol-resolved tree
//! ([`basalt_ast`]); the output goes through the injected module builder
//! ([`basalt_module`]).
//!
//! ## Pipeline
//!
//! - **Initialization pass**: register class/function templates, enums, and
//!   globals in file order.
//! - **Lowering pass**: instantiate templates on demand, compile function
//!   bodies to structured instructions, defer non-inlinable global
//!   initializers into a synthesized start routine, and place constant data
//!   in static memory.
//!
//! User-level problems accumulate in the returned [`Diagnostics`] while
//! lowering continues best-effort; a compilation with error diagnostics
//! must not be trusted even though it produced a module. Internal invariant
//! violations surface as [`InternalError`] and abort immediately.

pub mod builtins;
pub mod context;
pub mod conversion;
pub mod expr;
pub mod literal;
pub mod memory;
pub mod options;
pub mod passes;
pub mod program;
pub mod runtime;
pub mod stmt;
pub mod template;
pub mod types;

pub use context::{Lowerer, LoweringCtx};
pub use memory::{MemorySegment, StaticAllocator, STATIC_BASE};
pub use options::CompilerOptions;
pub use program::{Class, ClassId, Function, FunctionId, Program};
pub use types::{Ty, TypeKind};

use basalt_core::{Diagnostics, InternalError};
use basalt_ast as ast;
use basalt_module::{Module, ModuleBuilder};

/// The result of one compilation.
pub struct CompilationResult {
    /// The assembled module. Only trustworthy when [`is_success`] holds.
    ///
    /// [`is_success`]: CompilationResult::is_success
    pub module: Module,
    /// Everything reported through the diagnostics boundary.
    pub diagnostics: Diagnostics,
}

impl CompilationResult {
    /// Whether compilation finished without error diagnostics.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Compile a parsed module.
pub fn compile<'ast>(
    module: &'ast ast::Module<'ast>,
    options: CompilerOptions,
) -> Result<CompilationResult, InternalError> {
    let mut program = Program::new();
    let mut diagnostics = Diagnostics::new();
    let mut alloc = StaticAllocator::new(options.target);
    let mut builder = ModuleBuilder::new();

    passes::initialization::run(&mut program, module, &options, &mut diagnostics)?;
    passes::lowering::run(
        &mut program,
        &mut alloc,
        module,
        &options,
        &mut diagnostics,
        &mut builder,
    )?;

    Ok(CompilationResult {
        module: builder.finish(),
        diagnostics,
    })
}
