//! Variable declaration lowering.
//!
//! An immutable numeric declaration whose initializer is a literal
//! (optionally negated) inlines as a constant: no storage slot is ever
//! allocated and every read lowers to the value. Everything else takes a
//! local slot plus an initializer store.

use basalt_core::{DiagnosticCode, InternalError};
use basalt_ast as ast;
use basalt_module::Instr;

use crate::context::Lowerer;
use crate::conversion::maybe_convert;
use crate::literal::{const_eval, literal_default_ty};
use crate::template::resolve_type;
use crate::types::Ty;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower a local variable declaration.
    pub(crate) fn lower_var_decl(
        &mut self,
        decl: &ast::VarDeclStmt<'ast>,
    ) -> Result<Instr, InternalError> {
        let annotated = match &decl.ty {
            Some(expr) => {
                let ambient = self.ctx.type_args.clone();
                Some(resolve_type(
                    self.program,
                    expr,
                    Some(&ambient),
                    self.target(),
                    self.diags,
                )?)
            }
            None => None,
        };

        // Constant inlining path.
        if !decl.mutable
            && let Some(init) = decl.init
        {
            let ty = annotated.or_else(|| literal_default_ty(init));
            if let Some(ty) = ty
                && ty.is_numeric()
                && let Some(value) = const_eval(init, ty)
            {
                self.ctx
                    .declare_const(decl.name.name, ty, value, decl.span);
                return Ok(Instr::Nop);
            }
        }

        // Storage path.
        let (init, ty) = match (annotated, decl.init) {
            (Some(ty), Some(init)) => {
                let (instr, actual) = self.lower_expr(init, Some(ty))?;
                let instr = maybe_convert(
                    self.program,
                    instr,
                    actual,
                    ty,
                    false,
                    self.target(),
                    self.diags,
                    init.span(),
                );
                (Some(instr), ty)
            }
            (Some(ty), None) => (None, ty),
            (None, Some(init)) => {
                let (instr, actual) = self.lower_expr(init, None)?;
                (Some(instr), actual)
            }
            (None, None) => {
                self.diags.report(
                    decl.span,
                    DiagnosticCode::MissingTypeAnnotation,
                    &[decl.name.name],
                );
                (None, Ty::I32)
            }
        };

        let slot = self.ctx.declare(decl.name.name, ty, decl.mutable, decl.span);
        Ok(match init {
            Some(value) => Instr::LocalSet {
                index: slot,
                value: Box::new(value),
            },
            None => Instr::Nop,
        })
    }
}
