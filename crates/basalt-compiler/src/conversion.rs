//! The numeric conversion engine.
//!
//! [`maybe_convert`] wraps an already-lowered expression in whatever
//! conversion instructions carry it from its actual type to the contextual
//! type. Lossy conversions (float narrowing, float to int, pointer-width
//! integer to pointer, wide to narrow integers) demand an explicit cast;
//! when the cast marker is missing a diagnostic is appended and lowering
//! proceeds as if it were present, so one run collects every diagnostic.

use basalt_core::{DiagnosticCode, Diagnostics, Span, TargetWidth};
use basalt_module::{BinOp, Instr, UnOp};

use crate::program::Program;
use crate::types::{Ty, TypeKind};

/// Convert `expr` from `from` to `to`, reporting casts and portability
/// hazards through the diagnostics boundary.
pub fn maybe_convert(
    program: &Program<'_>,
    expr: Instr,
    from: Ty,
    to: Ty,
    explicit: bool,
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    if from == to {
        return expr;
    }

    // Class-backed pointers must agree on the underlying class.
    if from.is_reference() || to.is_reference() {
        return convert_reference(program, expr, from, to, diags, span);
    }

    if from.is_void() || to.is_void() {
        if to.is_void() {
            return Instr::Drop {
                value: Box::new(expr),
            };
        }
        diags.report(
            span,
            DiagnosticCode::InvalidOperation,
            &["conversion", "void"],
        );
        return expr;
    }

    // Pointer/integer traffic gets its own width rules.
    if from.kind == TypeKind::Ptr || to.kind == TypeKind::Ptr {
        return convert_pointer(program, expr, from, to, explicit, target, diags, span);
    }

    if from.is_any_float() {
        if to.is_any_float() {
            return convert_float_width(expr, from, to, explicit, program, diags, span);
        }
        // Float to integer always truncates and always needs the marker.
        return convert_float_to_int(program, expr, from, to, explicit, target, diags, span);
    }

    if to.is_any_float() {
        return int_to_float(expr, from, to);
    }

    convert_int_to_int(program, expr, from, to, explicit, diags, span)
}

fn require_explicit(
    program: &Program<'_>,
    explicit: bool,
    from: Ty,
    to: Ty,
    diags: &mut Diagnostics,
    span: Span,
) {
    if !explicit {
        diags.report(
            span,
            DiagnosticCode::ConversionRequiresCast,
            &[&program.type_name(from), &program.type_name(to)],
        );
    }
}

fn convert_reference(
    program: &Program<'_>,
    expr: Instr,
    from: Ty,
    to: Ty,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    match (from.class, to.class) {
        (Some(from_class), Some(to_class)) => {
            if !program.derives_from(from_class, to_class)
                && !program.derives_from(to_class, from_class)
            {
                diags.report(
                    span,
                    DiagnosticCode::IncompatibleClasses,
                    &[&program.type_name(from), &program.type_name(to)],
                );
            }
            expr
        }
        // Reference to raw pointer (or back) keeps the representation.
        _ => {
            if from.size == to.size {
                expr
            } else {
                widen_or_wrap(expr, from, to)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_pointer(
    program: &Program<'_>,
    expr: Instr,
    from: Ty,
    to: Ty,
    explicit: bool,
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    // Same-width pointer/integer conversions are free, but an integer that
    // shares the selected pointer width becomes target-dependent: flag the
    // cast requirement the way a narrowing would be flagged.
    if to.kind == TypeKind::Ptr {
        let lossy = (from.is_int() && !target.is_wide()) || (from.is_long() && target.is_wide());
        if lossy {
            require_explicit(program, explicit, from, to, diags, span);
        }
    }
    if from.size != to.size {
        diags.report(
            span,
            DiagnosticCode::PortablePointerConversion,
            &[&program.type_name(from), &program.type_name(to)],
        );
        return widen_or_wrap(expr, from, to);
    }
    expr
}

fn convert_float_width(
    expr: Instr,
    from: Ty,
    to: Ty,
    explicit: bool,
    program: &Program<'_>,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    if from.kind == TypeKind::F32 && to.kind == TypeKind::F64 {
        return Instr::Unary {
            op: UnOp::PromoteF32,
            value: Box::new(expr),
        };
    }
    // f64 -> f32 narrows.
    require_explicit(program, explicit, from, to, diags, span);
    Instr::Unary {
        op: UnOp::DemoteF64,
        value: Box::new(expr),
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_float_to_int(
    program: &Program<'_>,
    expr: Instr,
    from: Ty,
    to: Ty,
    explicit: bool,
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    require_explicit(program, explicit, from, to, diags, span);

    let signed = to.is_signed();
    let wide = to.is_long();
    let op = match (from.kind, wide, signed) {
        (TypeKind::F32, false, true) => UnOp::TruncF32ToI32S,
        (TypeKind::F32, false, false) => UnOp::TruncF32ToI32U,
        (TypeKind::F32, true, true) => UnOp::TruncF32ToI64S,
        (TypeKind::F32, true, false) => UnOp::TruncF32ToI64U,
        (TypeKind::F64, false, true) => UnOp::TruncF64ToI32S,
        (TypeKind::F64, false, false) => UnOp::TruncF64ToI32U,
        (TypeKind::F64, true, true) => UnOp::TruncF64ToI64S,
        (TypeKind::F64, true, false) => UnOp::TruncF64ToI64U,
        _ => UnOp::TruncF64ToI32S,
    };
    let truncated = Instr::Unary {
        op,
        value: Box::new(expr),
    };

    // A sub-32-bit integer target narrows in a second step.
    if to.is_small_int() {
        let intermediate = if to.is_signed() { Ty::I32 } else { Ty::U32 };
        return maybe_convert(program, truncated, intermediate, to, true, target, diags, span);
    }
    truncated
}

fn int_to_float(expr: Instr, from: Ty, to: Ty) -> Instr {
    let signed = from.is_signed();
    let wide_source = from.is_long();
    let op = match (to.kind, wide_source, signed) {
        (TypeKind::F32, false, true) => UnOp::ConvertI32SToF32,
        (TypeKind::F32, false, false) => UnOp::ConvertI32UToF32,
        (TypeKind::F32, true, true) => UnOp::ConvertI64SToF32,
        (TypeKind::F32, true, false) => UnOp::ConvertI64UToF32,
        (TypeKind::F64, false, true) => UnOp::ConvertI32SToF64,
        (TypeKind::F64, false, false) => UnOp::ConvertI32UToF64,
        (TypeKind::F64, true, true) => UnOp::ConvertI64SToF64,
        (TypeKind::F64, true, false) => UnOp::ConvertI64UToF64,
        _ => UnOp::ConvertI32SToF64,
    };
    Instr::Unary {
        op,
        value: Box::new(expr),
    }
}

fn convert_int_to_int(
    program: &Program<'_>,
    expr: Instr,
    from: Ty,
    to: Ty,
    explicit: bool,
    diags: &mut Diagnostics,
    span: Span,
) -> Instr {
    if to.size > from.size && to.is_long() {
        // Crossing the 32/64 boundary: extension follows the source's sign.
        return Instr::Unary {
            op: if from.is_signed() {
                UnOp::ExtendI32S
            } else {
                UnOp::ExtendI32U
            },
            value: Box::new(expr),
        };
    }

    if to.size < from.size {
        require_explicit(program, explicit, from, to, diags, span);
        let mut narrowed = expr;
        if from.is_long() {
            narrowed = Instr::Unary {
                op: UnOp::WrapI64,
                value: Box::new(narrowed),
            };
        }
        return mask_to_width(narrowed, to);
    }

    // Same storage width (sign reinterpretation or bool widening): free.
    expr
}

/// Narrow a 32-bit lane to a sub-32-bit width: bitmask for unsigned
/// targets, a shift pair for signed ones (shift 24 for 8-bit, 16 for
/// 16-bit).
pub fn mask_to_width(expr: Instr, to: Ty) -> Instr {
    if !to.is_small_int() {
        return expr;
    }
    if to.is_signed() {
        let shift = if to.size == 1 { 24 } else { 16 };
        let shifted = Instr::Binary {
            op: BinOp::ShlI32,
            left: Box::new(expr),
            right: Box::new(Instr::I32Const(shift)),
        };
        Instr::Binary {
            op: BinOp::ShrSI32,
            left: Box::new(shifted),
            right: Box::new(Instr::I32Const(shift)),
        }
    } else {
        let mask = if to.size == 1 { 0xff } else { 0xffff };
        Instr::Binary {
            op: BinOp::AndI32,
            left: Box::new(expr),
            right: Box::new(Instr::I32Const(mask)),
        }
    }
}

fn widen_or_wrap(expr: Instr, from: Ty, to: Ty) -> Instr {
    if to.size == 8 && from.size < 8 {
        return Instr::Unary {
            op: if from.is_signed() {
                UnOp::ExtendI32S
            } else {
                UnOp::ExtendI32U
            },
            value: Box::new(expr),
        };
    }
    let mut narrowed = expr;
    if from.size == 8 && to.size < 8 {
        narrowed = Instr::Unary {
            op: UnOp::WrapI64,
            value: Box::new(narrowed),
        };
    }
    mask_to_width(narrowed, to)
}
