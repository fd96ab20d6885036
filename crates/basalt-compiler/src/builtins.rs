//! The builtin intrinsics dispatcher.
//!
//! A closed, name-keyed set of special-cased calls lowered directly to
//! primitive instructions instead of real calls. A name is only recognized
//! when the callee's declaration originates from the trusted library source
//! and matches exactly, ignoring any generic-argument suffix. Operand types
//! outside an intrinsic's supported set are internal-invariant failures:
//! the front-end's declared builtin signatures should have constrained them
//! already.

use basalt_core::{DiagnosticCode, InternalError, Span};
use basalt_ast as ast;
use basalt_module::{BinOp, Instr, UnOp, ValType};

use crate::context::{Lowerer, LoweringCtx};
use crate::conversion::maybe_convert;
use crate::literal::const_eval;
use crate::template::resolve_type;
use crate::types::{Ty, TypeKind};

/// Whether a qualified name (sans generic suffix) is a recognized intrinsic.
pub fn is_intrinsic(name: &str) -> bool {
    matches!(
        strip_generic(name),
        "rotl"
            | "rotr"
            | "clz"
            | "ctz"
            | "popcnt"
            | "abs"
            | "ceil"
            | "floor"
            | "sqrt"
            | "trunc"
            | "nearest"
            | "min"
            | "max"
            | "copysign"
            | "reinterpret"
            | "load"
            | "store"
            | "sizeof"
            | "changetype"
            | "unreachable"
            | "isNaN"
            | "isFinite"
            | "fmod"
            | "memory.size"
            | "memory.grow"
    )
}

fn strip_generic(name: &str) -> &str {
    name.split('<').next().unwrap_or(name)
}

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower a recognized intrinsic call.
    pub(crate) fn lower_intrinsic(
        &mut self,
        name: &str,
        call: &'ast ast::CallExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let name = strip_generic(name);
        let span = call.span;

        let ambient = self.ctx.type_args.clone();
        let mut type_args = Vec::with_capacity(call.type_args.len());
        for expr in call.type_args {
            type_args.push(resolve_type(
                self.program,
                expr,
                Some(&ambient),
                self.target(),
                self.diags,
            )?);
        }

        match name {
            "abs" | "ceil" | "floor" | "sqrt" | "trunc" | "nearest" => {
                let (value, ty) = self.intrinsic_arg(call, 0, None)?;
                let op = float_unop(name, ty)
                    .ok_or_else(|| unsupported(name, ty, self.program))?;
                Ok((
                    Instr::Unary {
                        op,
                        value: Box::new(value),
                    },
                    ty,
                ))
            }
            "min" | "max" | "copysign" => {
                let (left, ty) = self.intrinsic_arg(call, 0, None)?;
                if !ty.is_any_float() {
                    return Err(unsupported(name, ty, self.program));
                }
                let (right, right_ty) = self.intrinsic_arg(call, 1, Some(ty))?;
                let right = maybe_convert(
                    self.program,
                    right,
                    right_ty,
                    ty,
                    false,
                    self.target(),
                    self.diags,
                    span,
                );
                let wide = ty.kind == TypeKind::F64;
                let op = match (name, wide) {
                    ("min", false) => BinOp::MinF32,
                    ("min", true) => BinOp::MinF64,
                    ("max", false) => BinOp::MaxF32,
                    ("max", true) => BinOp::MaxF64,
                    (_, false) => BinOp::CopysignF32,
                    (_, true) => BinOp::CopysignF64,
                };
                Ok((
                    Instr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty,
                ))
            }
            "rotl" | "rotr" => {
                let (left, ty) = self.intrinsic_arg(call, 0, type_args.first().copied())?;
                if !ty.is_integer() || ty.size < 4 {
                    return Err(unsupported(name, ty, self.program));
                }
                let (right, right_ty) = self.intrinsic_arg(call, 1, Some(ty))?;
                let right = maybe_convert(
                    self.program,
                    right,
                    right_ty,
                    ty,
                    false,
                    self.target(),
                    self.diags,
                    span,
                );
                let wide = ty.size == 8;
                let op = match (name, wide) {
                    ("rotl", false) => BinOp::RotlI32,
                    ("rotl", true) => BinOp::RotlI64,
                    (_, false) => BinOp::RotrI32,
                    (_, true) => BinOp::RotrI64,
                };
                Ok((
                    Instr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty,
                ))
            }
            "clz" | "ctz" | "popcnt" => {
                let (value, ty) = self.intrinsic_arg(call, 0, type_args.first().copied())?;
                if !ty.is_integer() || ty.size < 4 {
                    return Err(unsupported(name, ty, self.program));
                }
                let wide = ty.size == 8;
                let op = match (name, wide) {
                    ("clz", false) => UnOp::ClzI32,
                    ("clz", true) => UnOp::ClzI64,
                    ("ctz", false) => UnOp::CtzI32,
                    ("ctz", true) => UnOp::CtzI64,
                    (_, false) => UnOp::PopcntI32,
                    (_, true) => UnOp::PopcntI64,
                };
                Ok((
                    Instr::Unary {
                        op,
                        value: Box::new(value),
                    },
                    ty,
                ))
            }
            "reinterpret" => {
                let Some(&to) = type_args.first() else {
                    return Err(InternalError::UnsupportedOperation {
                        name: name.to_string(),
                        operand: "<missing type argument>".to_string(),
                    });
                };
                let (value, from) = self.intrinsic_arg(call, 0, None)?;
                let op = match (from.kind, to.kind) {
                    (TypeKind::F32, _) if to.is_integer() && to.size == 4 => UnOp::ReinterpretF32,
                    (TypeKind::F64, _) if to.is_integer() && to.size == 8 => UnOp::ReinterpretF64,
                    (_, TypeKind::F32) if from.is_integer() && from.size == 4 => {
                        UnOp::ReinterpretI32
                    }
                    (_, TypeKind::F64) if from.is_integer() && from.size == 8 => {
                        UnOp::ReinterpretI64
                    }
                    _ => return Err(unsupported(name, from, self.program)),
                };
                Ok((
                    Instr::Unary {
                        op,
                        value: Box::new(value),
                    },
                    to,
                ))
            }
            "load" => {
                let Some(&ty) = type_args.first() else {
                    return Err(InternalError::UnsupportedOperation {
                        name: name.to_string(),
                        operand: "<missing type argument>".to_string(),
                    });
                };
                if !ty.is_numeric() {
                    return Err(unsupported(name, ty, self.program));
                }
                let ptr = self.intrinsic_ptr_arg(call, 0)?;
                let offset = self.const_offset_arg(call, 1, span);
                Ok((
                    Instr::Load {
                        bytes: ty.size as u8,
                        signed: ty.is_signed(),
                        offset,
                        ptr: Box::new(ptr),
                        ty: ty.val_type().unwrap_or(ValType::I32),
                    },
                    ty,
                ))
            }
            "store" => {
                let Some(&ty) = type_args.first() else {
                    return Err(InternalError::UnsupportedOperation {
                        name: name.to_string(),
                        operand: "<missing type argument>".to_string(),
                    });
                };
                if !ty.is_numeric() {
                    return Err(unsupported(name, ty, self.program));
                }
                let ptr = self.intrinsic_ptr_arg(call, 0)?;
                let (value, value_ty) = self.intrinsic_arg(call, 1, Some(ty))?;
                let value = maybe_convert(
                    self.program,
                    value,
                    value_ty,
                    ty,
                    false,
                    self.target(),
                    self.diags,
                    span,
                );
                let offset = self.const_offset_arg(call, 2, span);
                Ok((
                    Instr::Store {
                        bytes: ty.size as u8,
                        offset,
                        ptr: Box::new(ptr),
                        value: Box::new(value),
                    },
                    Ty::VOID,
                ))
            }
            "sizeof" => {
                let Some(&ty) = type_args.first() else {
                    return Err(InternalError::UnsupportedOperation {
                        name: name.to_string(),
                        operand: "<missing type argument>".to_string(),
                    });
                };
                let ptr_ty = Ty::ptr(self.ptr_size());
                Ok((
                    Instr::const_int(self.ptr_val_type(), i64::from(ty.size)),
                    ptr_ty,
                ))
            }
            "changetype" => {
                let Some(&to) = type_args.first() else {
                    return Err(InternalError::UnsupportedOperation {
                        name: name.to_string(),
                        operand: "<missing type argument>".to_string(),
                    });
                };
                let (value, from) = self.intrinsic_arg(call, 0, None)?;
                if from.val_type() != to.val_type() {
                    return Err(unsupported(name, from, self.program));
                }
                Ok((value, to))
            }
            "memory.size" => Ok((Instr::MemorySize, Ty::I32)),
            "memory.grow" => {
                let (delta, delta_ty) = self.intrinsic_arg(call, 0, Some(Ty::I32))?;
                let delta = maybe_convert(
                    self.program,
                    delta,
                    delta_ty,
                    Ty::I32,
                    false,
                    self.target(),
                    self.diags,
                    span,
                );
                Ok((
                    Instr::MemoryGrow {
                        delta: Box::new(delta),
                    },
                    Ty::I32,
                ))
            }
            "unreachable" => Ok((Instr::Unreachable, ctx_ty.unwrap_or(Ty::VOID))),
            "isNaN" | "isFinite" => self.lower_float_predicate(name, call),
            "fmod" => {
                let (left, ty) = self.intrinsic_arg(call, 0, Some(Ty::F64))?;
                if !ty.is_any_float() {
                    return Err(unsupported(name, ty, self.program));
                }
                let (right, right_ty) = self.intrinsic_arg(call, 1, Some(ty))?;
                let right = maybe_convert(
                    self.program,
                    right,
                    right_ty,
                    ty,
                    false,
                    self.target(),
                    self.diags,
                    span,
                );
                Ok((expand_fmod(&mut self.ctx, left, right, ty), ty))
            }
            _ => Err(InternalError::UnsupportedOperation {
                name: name.to_string(),
                operand: "<unknown intrinsic>".to_string(),
            }),
        }
    }

    /// NaN/finite predicates evaluate their operand exactly once even
    /// though the comparison reads it twice.
    fn lower_float_predicate(
        &mut self,
        name: &str,
        call: &'ast ast::CallExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let (value, ty) = self.intrinsic_arg(call, 0, None)?;
        if !ty.is_any_float() {
            return Err(unsupported(name, ty, self.program));
        }
        let vt = ty.val_type().unwrap_or(ValType::F64);
        let wide = ty.kind == TypeKind::F64;
        let (first, reuse) = self.ctx.materialize(value, vt);

        let instr = if name == "isNaN" {
            // NaN is the only value unequal to itself.
            Instr::Binary {
                op: if wide { BinOp::NeF64 } else { BinOp::NeF32 },
                left: Box::new(first),
                right: Box::new(reuse),
            }
        } else {
            // x - x is zero for every finite x, NaN otherwise.
            let diff = Instr::Binary {
                op: if wide { BinOp::SubF64 } else { BinOp::SubF32 },
                left: Box::new(first),
                right: Box::new(reuse),
            };
            Instr::Binary {
                op: if wide { BinOp::EqF64 } else { BinOp::EqF32 },
                left: Box::new(diff),
                right: Box::new(Instr::zero(vt)),
            }
        };
        Ok((instr, Ty::BOOL))
    }

    fn intrinsic_arg(
        &mut self,
        call: &'ast ast::CallExpr<'ast>,
        index: usize,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        match call.args.get(index).copied() {
            Some(arg) => self.lower_expr(arg, ctx_ty),
            None => {
                self.diags.report(
                    call.span,
                    DiagnosticCode::ArgumentCountMismatch,
                    &["intrinsic", &(index + 1).to_string(), &call.args.len().to_string()],
                );
                Ok((
                    Instr::zero(
                        ctx_ty
                            .and_then(|t| t.val_type())
                            .unwrap_or(ValType::I32),
                    ),
                    ctx_ty.unwrap_or(Ty::I32),
                ))
            }
        }
    }

    fn intrinsic_ptr_arg(
        &mut self,
        call: &'ast ast::CallExpr<'ast>,
        index: usize,
    ) -> Result<Instr, InternalError> {
        let ptr_ty = Ty::ptr(self.ptr_size());
        let (instr, actual) = self.intrinsic_arg(call, index, Some(ptr_ty))?;
        Ok(maybe_convert(
            self.program,
            instr,
            actual,
            ptr_ty,
            true,
            self.target(),
            self.diags,
            call.span,
        ))
    }

    /// A trailing compile-time-constant byte offset argument.
    fn const_offset_arg(
        &mut self,
        call: &'ast ast::CallExpr<'ast>,
        index: usize,
        span: Span,
    ) -> u32 {
        match call.args.get(index).copied() {
            None => 0,
            Some(arg) => match const_eval(arg, Ty::U32).and_then(|v| v.as_i64()) {
                Some(value) if value >= 0 => value as u32,
                _ => {
                    self.diags.report(
                        span,
                        DiagnosticCode::InvalidOperation,
                        &["offset", "non-constant expression"],
                    );
                    0
                }
            },
        }
    }
}

/// Expand the internal floating-point remainder helper:
/// `a - trunc(a / b) * b`, with both operands materialized so their side
/// effects run exactly once.
pub(crate) fn expand_fmod(ctx: &mut LoweringCtx, a: Instr, b: Instr, ty: Ty) -> Instr {
    let wide = ty.kind == TypeKind::F64;
    let vt = if wide { ValType::F64 } else { ValType::F32 };
    let (a_first, a_reuse) = ctx.materialize(a, vt);
    let (b_first, b_reuse) = ctx.materialize(b, vt);

    let quotient = Instr::Binary {
        op: if wide { BinOp::DivF64 } else { BinOp::DivF32 },
        left: Box::new(a_reuse),
        right: Box::new(b_first),
    };
    let truncated = Instr::Unary {
        op: if wide { UnOp::TruncF64 } else { UnOp::TruncF32 },
        value: Box::new(quotient),
    };
    let product = Instr::Binary {
        op: if wide { BinOp::MulF64 } else { BinOp::MulF32 },
        left: Box::new(truncated),
        right: Box::new(b_reuse),
    };
    Instr::Binary {
        op: if wide { BinOp::SubF64 } else { BinOp::SubF32 },
        left: Box::new(a_first),
        right: Box::new(product),
    }
}

fn unsupported(name: &str, ty: Ty, program: &crate::program::Program<'_>) -> InternalError {
    InternalError::UnsupportedOperation {
        name: name.to_string(),
        operand: program.type_name(ty),
    }
}

fn float_unop(name: &str, ty: Ty) -> Option<UnOp> {
    let wide = match ty.kind {
        TypeKind::F32 => false,
        TypeKind::F64 => true,
        _ => return None,
    };
    Some(match (name, wide) {
        ("abs", false) => UnOp::AbsF32,
        ("abs", true) => UnOp::AbsF64,
        ("ceil", false) => UnOp::CeilF32,
        ("ceil", true) => UnOp::CeilF64,
        ("floor", false) => UnOp::FloorF32,
        ("floor", true) => UnOp::FloorF64,
        ("sqrt", false) => UnOp::SqrtF32,
        ("sqrt", true) => UnOp::SqrtF64,
        ("trunc", false) => UnOp::TruncF32,
        ("trunc", true) => UnOp::TruncF64,
        (_, false) => UnOp::NearestF32,
        (_, true) => UnOp::NearestF64,
    })
}
