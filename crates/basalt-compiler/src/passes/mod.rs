//! The two compilation passes.
//!
//! Initialization registers every declaration in file order; lowering then
//! compiles function bodies, defers non-inlinable global initializers into
//! the synthesized start routine, and hands everything to the module
//! builder. The program is sealed between the passes, which is what rejects
//! late template patching.

pub mod initialization;
pub mod lowering;
