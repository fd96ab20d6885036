//! Array and string literal lowering.
//!
//! Literal-only arrays pre-evaluate into a constant memory segment through
//! the static allocator; a single element that fails constant evaluation
//! sends the whole literal down the runtime allocation-and-store path.
//! String literals always live in static memory, interned by text when the
//! options ask for reuse.

use basalt_core::{DiagnosticCode, InternalError, Span};
use basalt_ast as ast;
use basalt_module::{Instr, ValType};

use crate::context::Lowerer;
use crate::conversion::maybe_convert;
use crate::literal::parse_array_literal;
use crate::template::resolve_class;
use crate::types::Ty;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower a string literal to its static segment's offset.
    pub(crate) fn lower_string_literal(
        &mut self,
        text: &str,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        let offset = self.alloc.create_string(text, self.options.intern_strings)?;
        let vt = self.ptr_val_type();
        let instr = Instr::const_int(vt, i64::from(offset));

        let ty = match self.program.find_class_template("String") {
            Some(template) => {
                let class = resolve_class(
                    self.program,
                    template,
                    &[],
                    self.target(),
                    self.diags,
                    span,
                )?;
                self.program.class(class).ty
            }
            None => {
                self.diags
                    .report(span, DiagnosticCode::UnresolvedType, &["String"]);
                Ty::ptr(self.ptr_size())
            }
        };
        Ok((instr, ty))
    }

    /// Lower an array literal.
    pub(crate) fn lower_array_literal(
        &mut self,
        array: &ast::ArrayLitExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let ctx_elem = ctx_ty
            .and_then(|t| t.class)
            .and_then(|c| self.program.element_type(c));
        let elem_ty = match ctx_elem {
            Some(elem) => elem,
            None => {
                self.diags
                    .report(array.span, DiagnosticCode::MissingTypeAnnotation, &["[]"]);
                Ty::I32
            }
        };

        let array_ty = match ctx_ty.filter(|t| t.class.is_some()) {
            Some(ty) => ty,
            None => self.array_class_ty(elem_ty, array.span)?,
        };

        // Constant path: every element evaluates at compile time.
        if let Some(basalt_core::ConstValue::Array(values)) =
            parse_array_literal(array.elements, elem_ty)
        {
            let offset = self.alloc.create_array(&values, elem_ty)?;
            let instr = Instr::const_int(self.ptr_val_type(), i64::from(offset));
            return Ok((instr, array_ty));
        }

        self.lower_array_runtime(array, elem_ty, array_ty)
    }

    /// The `Array<elem>` pointer type.
    fn array_class_ty(&mut self, elem_ty: Ty, span: Span) -> Result<Ty, InternalError> {
        match self.program.find_class_template("Array") {
            Some(template) => {
                let class = resolve_class(
                    self.program,
                    template,
                    &[elem_ty],
                    self.target(),
                    self.diags,
                    span,
                )?;
                Ok(self.program.class(class).ty)
            }
            None => {
                self.diags
                    .report(span, DiagnosticCode::UnresolvedType, &["Array"]);
                Ok(Ty::ptr(self.ptr_size()))
            }
        }
    }

    /// Runtime path: allocate, write the header, store every element.
    fn lower_array_runtime(
        &mut self,
        array: &ast::ArrayLitExpr<'ast>,
        elem_ty: Ty,
        array_ty: Ty,
    ) -> Result<(Instr, Ty), InternalError> {
        let header = self.alloc.header_size();
        let length = array.elements.len() as u32;
        let total = header + elem_ty.size * length;

        let vt = self.ptr_val_type();
        let temp = self.ctx.temp(vt);
        let allocation = self.allocate(total);

        let mut children = vec![Instr::LocalSet {
            index: temp,
            value: Box::new(allocation),
        }];
        let this = |ctx_temp: u32| Instr::LocalGet {
            index: ctx_temp,
            ty: vt,
        };
        // capacity, length, data pointer
        children.push(Instr::Store {
            bytes: 4,
            offset: 0,
            ptr: Box::new(this(temp)),
            value: Box::new(Instr::I32Const(length as i32)),
        });
        children.push(Instr::Store {
            bytes: 4,
            offset: 4,
            ptr: Box::new(this(temp)),
            value: Box::new(Instr::I32Const(length as i32)),
        });
        let data_ptr = Instr::Binary {
            op: if vt == ValType::I64 {
                basalt_module::BinOp::AddI64
            } else {
                basalt_module::BinOp::AddI32
            },
            left: Box::new(this(temp)),
            right: Box::new(Instr::const_int(vt, i64::from(header))),
        };
        children.push(Instr::Store {
            bytes: self.ptr_size() as u8,
            offset: 8,
            ptr: Box::new(this(temp)),
            value: Box::new(data_ptr),
        });

        for (i, element) in array.elements.iter().copied().enumerate() {
            let value = match element {
                Some(expr) => {
                    let (instr, actual) = self.lower_expr(expr, Some(elem_ty))?;
                    maybe_convert(
                        self.program,
                        instr,
                        actual,
                        elem_ty,
                        false,
                        self.target(),
                        self.diags,
                        expr.span(),
                    )
                }
                None => Instr::zero(elem_ty.val_type().unwrap_or(ValType::I32)),
            };
            children.push(Instr::Store {
                bytes: elem_ty.size as u8,
                offset: header + i as u32 * elem_ty.size,
                ptr: Box::new(this(temp)),
                value: Box::new(value),
            });
        }

        children.push(this(temp));
        self.ctx.release_temp(vt, temp);
        Ok((
            Instr::Block {
                label: None,
                children,
                result: Some(vt),
            },
            array_ty,
        ))
    }
}
