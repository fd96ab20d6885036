//! Expression lowering.
//!
//! Every lowering operation takes the AST node and the contextual type the
//! surrounding expression expects, and returns the IR instruction together
//! with the expression's actual type (read by ancestor nodes and by
//! diagnostics). Contextual types are pushed top-down; nothing is inferred
//! bottom-up across statements.
//!
//! User-level problems report through the diagnostics boundary and lower to
//! a trap (or fall back to the contextual type) so one run can collect all
//! diagnostics; only compiler-invariant violations abort.

mod access;
mod calls;
mod literals;

pub use access::Place;

use basalt_core::{ConstValue, DiagnosticCode, InternalError, Span, TargetWidth};
use basalt_ast::{self as ast, BinaryOp, Expr, PostfixOp, UnaryOp};
use basalt_module::{BinOp, Instr, UnOp, ValType};

use crate::builtins;
use crate::context::Lowerer;
use crate::conversion::{mask_to_width, maybe_convert};
use crate::literal::parse_literal;
use crate::types::{Ty, TypeKind};

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower an expression against an optional contextual type.
    pub fn lower_expr(
        &mut self,
        expr: &'ast Expr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        match *expr {
            Expr::Literal(lit) => self.lower_literal(&lit.kind, false, ctx_ty, lit.span),
            Expr::Ident(ident) => self.lower_ident(&ident),
            Expr::Member(member) => self.lower_member_read(member, ctx_ty),
            Expr::Index(index) => self.lower_index_read(index),
            Expr::Binary(binary) => self.lower_binary(binary, ctx_ty),
            Expr::Unary(unary) => self.lower_unary(unary, ctx_ty),
            Expr::Postfix(postfix) => self.lower_postfix(postfix),
            Expr::Assign(assign) => self.lower_assign(assign, true),
            Expr::Ternary(ternary) => self.lower_ternary(ternary, ctx_ty),
            Expr::Call(call) => self.lower_call(call, ctx_ty),
            Expr::New(new) => self.lower_new(new, ctx_ty),
            Expr::Cast(cast) => self.lower_cast(cast),
            Expr::ArrayLit(array) => self.lower_array_literal(&array, ctx_ty),
            Expr::Paren(paren) => self.lower_expr(paren.expr, ctx_ty),
            Expr::Super(sup) => {
                self.diags.report(
                    sup.span,
                    DiagnosticCode::UnsupportedConstruct,
                    &["'super' outside a constructor call"],
                );
                Ok(self.trap(ctx_ty))
            }
        }
    }

    /// The best-effort fallback for an unresolvable expression: a trap with
    /// the contextual type.
    pub(crate) fn trap(&self, ctx_ty: Option<Ty>) -> (Instr, Ty) {
        (Instr::Unreachable, ctx_ty.unwrap_or(Ty::I32))
    }

    /// The selected pointer width in bytes.
    pub(crate) fn ptr_size(&self) -> u32 {
        self.options.target.ptr_size()
    }

    /// The pointer value category for the selected width.
    pub(crate) fn ptr_val_type(&self) -> ValType {
        if self.options.target.is_wide() {
            ValType::I64
        } else {
            ValType::I32
        }
    }

    /// Target width shorthand.
    pub(crate) fn target(&self) -> TargetWidth {
        self.options.target
    }

    /// Lower a literal token against the contextual type.
    pub(crate) fn lower_literal(
        &mut self,
        kind: &ast::LiteralKind<'ast>,
        negative: bool,
        ctx_ty: Option<Ty>,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        // String literals always take the static-segment path.
        if let ast::LiteralKind::Str(text) = kind {
            return self.lower_string_literal(text, span);
        }

        let ty = ctx_ty.unwrap_or(match kind {
            ast::LiteralKind::Float(_) => Ty::F64,
            ast::LiteralKind::Bool(_) => Ty::BOOL,
            ast::LiteralKind::Null => Ty::ptr(self.ptr_size()),
            _ => Ty::I32,
        });

        match parse_literal(kind, negative, ty) {
            Some(value) => Ok((self.const_instr(&value, ty)?, ty)),
            None => {
                let text = kind.text().unwrap_or("literal");
                self.diags.report(
                    span,
                    DiagnosticCode::LiteralOutOfContext,
                    &[text, &self.program.type_name(ty)],
                );
                Ok((Instr::zero(ty.val_type().unwrap_or(ValType::I32)), ty))
            }
        }
    }

    /// Turn a parsed constant into a const instruction.
    pub(crate) fn const_instr(
        &mut self,
        value: &ConstValue,
        ty: Ty,
    ) -> Result<Instr, InternalError> {
        Ok(match value {
            ConstValue::I32(v) => Instr::I32Const(*v),
            ConstValue::I64(v) => Instr::I64Const(*v),
            ConstValue::F32(v) => Instr::F32Const(*v),
            ConstValue::F64(v) => Instr::F64Const(*v),
            ConstValue::Null => Instr::zero(ty.val_type().unwrap_or(ValType::I32)),
            ConstValue::Str(text) => {
                let offset = self.alloc.create_string(text, self.options.intern_strings)?;
                Instr::const_int(
                    if self.target().is_wide() {
                        ValType::I64
                    } else {
                        ValType::I32
                    },
                    i64::from(offset),
                )
            }
            ConstValue::Array(_) => {
                return Err(InternalError::msg(
                    "array constants lower through the static allocator",
                ));
            }
        })
    }

    // ==========================================================================
    // Operators
    // ==========================================================================

    fn lower_binary(
        &mut self,
        binary: &'ast ast::BinaryExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let op = binary.op;

        if op.is_logical() {
            return self.lower_logical(binary);
        }

        if op.is_comparison() {
            let (left, left_ty) = self.lower_expr(binary.left, None)?;
            let (right, right_ty) = self.lower_expr(binary.right, Some(left_ty))?;
            let right = maybe_convert(
                self.program,
                right,
                right_ty,
                left_ty,
                false,
                self.target(),
                self.diags,
                binary.span,
            );
            let instr = Instr::Binary {
                op: compare_op(op, left_ty),
                left: Box::new(left),
                right: Box::new(right),
            };
            return Ok((instr, Ty::BOOL));
        }

        // Arithmetic and bitwise: the contextual type drives both operands.
        let (left, left_ty) = self.lower_expr(binary.left, ctx_ty.filter(|t| t.is_numeric()))?;
        let ty = ctx_ty.filter(|t| t.is_numeric()).unwrap_or(left_ty);
        let left = maybe_convert(
            self.program,
            left,
            left_ty,
            ty,
            false,
            self.target(),
            self.diags,
            binary.span,
        );
        let (right, right_ty) = self.lower_expr(binary.right, Some(ty))?;
        let right = maybe_convert(
            self.program,
            right,
            right_ty,
            ty,
            false,
            self.target(),
            self.diags,
            binary.span,
        );

        if !ty.is_numeric() {
            self.diags.report(
                binary.span,
                DiagnosticCode::InvalidOperation,
                &[binary_op_name(op), &self.program.type_name(ty)],
            );
            return Ok(self.trap(Some(ty)));
        }

        // Float remainder expands to the internal fmod helper.
        if op == BinaryOp::Rem && ty.is_any_float() {
            let instr = builtins::expand_fmod(&mut self.ctx, left, right, ty);
            return Ok((instr, ty));
        }

        let instr = Instr::Binary {
            op: arith_op(op, ty),
            left: Box::new(left),
            right: Box::new(right),
        };
        // Sub-32-bit results re-normalize so stored lanes stay canonical.
        let instr = if ty.is_small_int() && produces_overflow(op) {
            mask_to_width(instr, ty)
        } else {
            instr
        };
        Ok((instr, ty))
    }

    fn lower_logical(
        &mut self,
        binary: &'ast ast::BinaryExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let left = self.lower_condition(binary.left)?;
        let right = self.lower_condition(binary.right)?;
        let instr = match binary.op {
            BinaryOp::And => Instr::If {
                condition: Box::new(left),
                then_body: Box::new(right),
                else_body: Some(Box::new(Instr::I32Const(0))),
                result: Some(ValType::I32),
            },
            _ => Instr::If {
                condition: Box::new(left),
                then_body: Box::new(Instr::I32Const(1)),
                else_body: Some(Box::new(right)),
                result: Some(ValType::I32),
            },
        };
        Ok((instr, Ty::BOOL))
    }

    fn lower_unary(
        &mut self,
        unary: &'ast ast::UnaryExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        match unary.op {
            UnaryOp::Neg => {
                // A negated literal folds in the literal parser so the sign
                // participates in truncation.
                if let Expr::Literal(lit) = unary.operand {
                    return self.lower_literal(&lit.kind, true, ctx_ty, unary.span);
                }
                let (value, ty) = self.lower_expr(unary.operand, ctx_ty)?;
                let instr = if ty.is_any_float() {
                    Instr::Unary {
                        op: if ty.kind == TypeKind::F32 {
                            UnOp::NegF32
                        } else {
                            UnOp::NegF64
                        },
                        value: Box::new(value),
                    }
                } else {
                    let vt = ty.val_type().unwrap_or(ValType::I32);
                    Instr::Binary {
                        op: if vt == ValType::I64 {
                            BinOp::SubI64
                        } else {
                            BinOp::SubI32
                        },
                        left: Box::new(Instr::zero(vt)),
                        right: Box::new(value),
                    }
                };
                Ok((instr, ty))
            }
            UnaryOp::Plus => self.lower_expr(unary.operand, ctx_ty),
            UnaryOp::Not => {
                let condition = self.lower_condition(unary.operand)?;
                Ok((
                    Instr::Unary {
                        op: UnOp::EqzI32,
                        value: Box::new(condition),
                    },
                    Ty::BOOL,
                ))
            }
            UnaryOp::BitNot => {
                let (value, ty) = self.lower_expr(unary.operand, ctx_ty)?;
                let vt = ty.val_type().unwrap_or(ValType::I32);
                let instr = Instr::Binary {
                    op: if vt == ValType::I64 {
                        BinOp::XorI64
                    } else {
                        BinOp::XorI32
                    },
                    left: Box::new(value),
                    right: Box::new(Instr::const_int(vt, -1)),
                };
                Ok((mask_small(instr, ty), ty))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let negative = unary.op == UnaryOp::PreDec;
                self.lower_increment(unary.operand, negative, true, unary.span)
            }
        }
    }

    fn lower_postfix(
        &mut self,
        postfix: &'ast ast::PostfixExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let negative = postfix.op == PostfixOp::Dec;
        self.lower_increment_postfix(postfix.operand, negative, postfix.span)
    }

    fn lower_ternary(
        &mut self,
        ternary: &'ast ast::TernaryExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let condition = self.lower_condition(ternary.condition)?;
        let (then_value, then_ty) = self.lower_expr(ternary.then_value, ctx_ty)?;
        let ty = ctx_ty.unwrap_or(then_ty);
        let then_value = maybe_convert(
            self.program,
            then_value,
            then_ty,
            ty,
            false,
            self.target(),
            self.diags,
            ternary.span,
        );
        let (else_value, else_ty) = self.lower_expr(ternary.else_value, Some(ty))?;
        let else_value = maybe_convert(
            self.program,
            else_value,
            else_ty,
            ty,
            false,
            self.target(),
            self.diags,
            ternary.span,
        );
        Ok((
            Instr::If {
                condition: Box::new(condition),
                then_body: Box::new(then_value),
                else_body: Some(Box::new(else_value)),
                result: ty.val_type(),
            },
            ty,
        ))
    }

    fn lower_cast(
        &mut self,
        cast: &'ast ast::CastExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let to = crate::template::resolve_type(
            self.program,
            &cast.ty,
            Some(&self.ctx.type_args.clone()),
            self.target(),
            self.diags,
        )?;
        let (value, from) = self.lower_expr(cast.expr, None)?;
        let converted = maybe_convert(
            self.program,
            value,
            from,
            to,
            true,
            self.target(),
            self.diags,
            cast.span,
        );
        Ok((converted, to))
    }

    /// Lower an expression into an i32 truth value.
    pub(crate) fn lower_condition(
        &mut self,
        expr: &'ast Expr<'ast>,
    ) -> Result<Instr, InternalError> {
        let (value, ty) = self.lower_expr(expr, None)?;
        Ok(match ty.val_type() {
            None | Some(ValType::I32) => value,
            Some(ValType::I64) => Instr::Binary {
                op: BinOp::NeI64,
                left: Box::new(value),
                right: Box::new(Instr::I64Const(0)),
            },
            Some(ValType::F32) => Instr::Binary {
                op: BinOp::NeF32,
                left: Box::new(value),
                right: Box::new(Instr::F32Const(0.0)),
            },
            Some(ValType::F64) => Instr::Binary {
                op: BinOp::NeF64,
                left: Box::new(value),
                right: Box::new(Instr::F64Const(0.0)),
            },
        })
    }
}

fn mask_small(instr: Instr, ty: Ty) -> Instr {
    if ty.is_small_int() {
        mask_to_width(instr, ty)
    } else {
        instr
    }
}

/// Whether an arithmetic result can leave the sub-32-bit range.
fn produces_overflow(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Shl
    )
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::ShrU => ">>>",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

/// The equality instruction for an operand type.
pub(crate) fn eq_op(ty: Ty) -> BinOp {
    compare_op(BinaryOp::Eq, ty)
}

/// Select the comparison instruction for an operand type.
fn compare_op(op: BinaryOp, ty: Ty) -> BinOp {
    use BinaryOp::*;
    let signed = ty.is_signed();
    match ty.val_type().unwrap_or(ValType::I32) {
        ValType::I32 => match (op, signed) {
            (Eq, _) => BinOp::EqI32,
            (Ne, _) => BinOp::NeI32,
            (Lt, true) => BinOp::LtSI32,
            (Lt, false) => BinOp::LtUI32,
            (Le, true) => BinOp::LeSI32,
            (Le, false) => BinOp::LeUI32,
            (Gt, true) => BinOp::GtSI32,
            (Gt, false) => BinOp::GtUI32,
            (Ge, true) => BinOp::GeSI32,
            (Ge, false) => BinOp::GeUI32,
            _ => BinOp::EqI32,
        },
        ValType::I64 => match (op, signed) {
            (Eq, _) => BinOp::EqI64,
            (Ne, _) => BinOp::NeI64,
            (Lt, true) => BinOp::LtSI64,
            (Lt, false) => BinOp::LtUI64,
            (Le, true) => BinOp::LeSI64,
            (Le, false) => BinOp::LeUI64,
            (Gt, true) => BinOp::GtSI64,
            (Gt, false) => BinOp::GtUI64,
            (Ge, true) => BinOp::GeSI64,
            (Ge, false) => BinOp::GeUI64,
            _ => BinOp::EqI64,
        },
        ValType::F32 => match op {
            Eq => BinOp::EqF32,
            Ne => BinOp::NeF32,
            Lt => BinOp::LtF32,
            Le => BinOp::LeF32,
            Gt => BinOp::GtF32,
            Ge => BinOp::GeF32,
            _ => BinOp::EqF32,
        },
        ValType::F64 => match op {
            Eq => BinOp::EqF64,
            Ne => BinOp::NeF64,
            Lt => BinOp::LtF64,
            Le => BinOp::LeF64,
            Gt => BinOp::GtF64,
            Ge => BinOp::GeF64,
            _ => BinOp::EqF64,
        },
    }
}

/// Select the arithmetic/bitwise instruction for an operand type.
fn arith_op(op: BinaryOp, ty: Ty) -> BinOp {
    use BinaryOp::*;
    let signed = ty.is_signed();
    match ty.val_type().unwrap_or(ValType::I32) {
        ValType::I32 => match (op, signed) {
            (Add, _) => BinOp::AddI32,
            (Sub, _) => BinOp::SubI32,
            (Mul, _) => BinOp::MulI32,
            (Div, true) => BinOp::DivSI32,
            (Div, false) => BinOp::DivUI32,
            (Rem, true) => BinOp::RemSI32,
            (Rem, false) => BinOp::RemUI32,
            (BitAnd, _) => BinOp::AndI32,
            (BitOr, _) => BinOp::OrI32,
            (BitXor, _) => BinOp::XorI32,
            (Shl, _) => BinOp::ShlI32,
            (Shr, true) => BinOp::ShrSI32,
            (Shr, false) => BinOp::ShrUI32,
            (ShrU, _) => BinOp::ShrUI32,
            _ => BinOp::AddI32,
        },
        ValType::I64 => match (op, signed) {
            (Add, _) => BinOp::AddI64,
            (Sub, _) => BinOp::SubI64,
            (Mul, _) => BinOp::MulI64,
            (Div, true) => BinOp::DivSI64,
            (Div, false) => BinOp::DivUI64,
            (Rem, true) => BinOp::RemSI64,
            (Rem, false) => BinOp::RemUI64,
            (BitAnd, _) => BinOp::AndI64,
            (BitOr, _) => BinOp::OrI64,
            (BitXor, _) => BinOp::XorI64,
            (Shl, _) => BinOp::ShlI64,
            (Shr, true) => BinOp::ShrSI64,
            (Shr, false) => BinOp::ShrUI64,
            (ShrU, _) => BinOp::ShrUI64,
            _ => BinOp::AddI64,
        },
        ValType::F32 => match op {
            Add => BinOp::AddF32,
            Sub => BinOp::SubF32,
            Mul => BinOp::MulF32,
            Div => BinOp::DivF32,
            _ => BinOp::AddF32,
        },
        ValType::F64 => match op {
            Add => BinOp::AddF64,
            Sub => BinOp::SubF64,
            Mul => BinOp::MulF64,
            Div => BinOp::DivF64,
            _ => BinOp::AddF64,
        },
    }
}
