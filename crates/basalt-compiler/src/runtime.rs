//! The runtime-link boundary.
//!
//! A fixed whitelist of externally linked support routines the compiler
//! references by exact name but does not implement. Referenced names are
//! imported from the `rt` namespace; `CompilerOptions::export_runtime`
//! decides whether they stay externally visible as exports.

use basalt_module::{ModuleBuilder, SigId, ValType};
use basalt_core::TargetWidth;

/// Heap allocation.
pub const ALLOCATE: &str = "rt.allocate";
/// Heap reallocation.
pub const REALLOCATE: &str = "rt.reallocate";
/// Heap release.
pub const FREE: &str = "rt.free";
/// Raw memory fill.
pub const MEMORY_SET: &str = "rt.memset";
/// Raw memory comparison.
pub const MEMORY_COMPARE: &str = "rt.memcmp";
/// Raw memory copy.
pub const MEMORY_COPY: &str = "rt.memcpy";
/// Collector pause.
pub const GC_PAUSE: &str = "rt.gc.pause";
/// Collector resume.
pub const GC_RESUME: &str = "rt.gc.resume";
/// Full collection.
pub const GC_COLLECT: &str = "rt.gc.collect";
/// Collector-tracked allocation.
pub const GC_ALLOC: &str = "rt.gc.alloc";
/// Reference retain.
pub const GC_RETAIN: &str = "rt.gc.retain";
/// Reference release.
pub const GC_RELEASE: &str = "rt.gc.release";
/// Module initialization hook.
pub const MODULE_INIT: &str = "rt.init";

/// Every whitelisted support-routine name.
pub const RUNTIME_NAMES: &[&str] = &[
    ALLOCATE,
    REALLOCATE,
    FREE,
    MEMORY_SET,
    MEMORY_COMPARE,
    MEMORY_COPY,
    GC_PAUSE,
    GC_RESUME,
    GC_COLLECT,
    GC_ALLOC,
    GC_RETAIN,
    GC_RELEASE,
    MODULE_INIT,
];

/// The signature of a support routine on the given target.
pub fn runtime_sig(builder: &mut ModuleBuilder, name: &str, target: TargetWidth) -> SigId {
    let ptr = if target.is_wide() {
        ValType::I64
    } else {
        ValType::I32
    };
    match name {
        ALLOCATE | GC_ALLOC => builder.intern_sig(vec![ptr], Some(ptr)),
        REALLOCATE => builder.intern_sig(vec![ptr, ptr], Some(ptr)),
        FREE | GC_RETAIN | GC_RELEASE => builder.intern_sig(vec![ptr], None),
        MEMORY_SET => builder.intern_sig(vec![ptr, ValType::I32, ptr], None),
        MEMORY_COMPARE => builder.intern_sig(vec![ptr, ptr, ptr], Some(ValType::I32)),
        MEMORY_COPY => builder.intern_sig(vec![ptr, ptr, ptr], None),
        _ => builder.intern_sig(vec![], None),
    }
}

/// Register an import for a referenced support routine (idempotent).
pub fn ensure_runtime(builder: &mut ModuleBuilder, name: &str, target: TargetWidth) {
    if builder.has_function(name) {
        return;
    }
    let sig = runtime_sig(builder, name, target);
    let field = name.strip_prefix("rt.").unwrap_or(name);
    builder.add_function_import(name, "rt", field, sig);
}
