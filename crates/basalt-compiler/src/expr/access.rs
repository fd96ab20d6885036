//! Identifier, member, and element access, plus assignment.
//!
//! Compound assignments and increments need both a load and a store against
//! the same location. The base address is bound to a single-use temporary
//! (through the shared materialize helper) so the base expression is
//! evaluated exactly once; the "store then reload" result semantics reload
//! through that temporary, never through a second evaluation.

use basalt_core::{DiagnosticCode, InternalError, Span};
use basalt_ast::{self as ast, Expr};
use basalt_module::{BinOp, Instr, ValType};

use crate::builtins;
use crate::context::Lowerer;
use crate::conversion::{mask_to_width, maybe_convert};
use crate::program::FunctionId;
use crate::types::{Ty, TypeKind};

/// A resolved assignment target.
pub enum Place {
    /// A stored local.
    Local {
        /// Slot index.
        slot: u32,
        /// Declared type.
        ty: Ty,
        /// Whether stores are legal.
        mutable: bool,
    },
    /// A module global (including class statics).
    Global {
        /// Global name.
        name: String,
        /// Declared type.
        ty: Ty,
        /// Whether stores are legal.
        mutable: bool,
    },
    /// A field or element in linear memory; the address is materialized.
    Memory {
        /// First use of the address (performs the bind).
        addr_first: Instr,
        /// Re-use of the bound address.
        addr_reuse: Instr,
        /// Constant byte offset.
        offset: u32,
        /// Element/field type.
        ty: Ty,
    },
    /// A getter/setter pair; the receiver is materialized.
    Accessor {
        /// First use of the receiver (performs the bind).
        base_first: Instr,
        /// Re-use of the bound receiver.
        base_reuse: Instr,
        /// The resolved getter, if any.
        getter: Option<FunctionId>,
        /// The resolved setter, if any.
        setter: Option<FunctionId>,
        /// Property type.
        ty: Ty,
    },
    /// An unresolvable target; a diagnostic was already reported.
    Invalid {
        /// Fallback type.
        ty: Ty,
    },
}

impl Place {
    fn ty(&self) -> Ty {
        match self {
            Place::Local { ty, .. }
            | Place::Global { ty, .. }
            | Place::Memory { ty, .. }
            | Place::Accessor { ty, .. }
            | Place::Invalid { ty } => *ty,
        }
    }
}

impl<'a, 'ast> Lowerer<'a, 'ast> {
    // ==========================================================================
    // Reads
    // ==========================================================================

    /// Lower an identifier read: local scope first, then globals.
    pub(crate) fn lower_ident(
        &mut self,
        ident: &ast::IdentExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let name = ident.ident.name;

        if name == "this" {
            if let Some(class) = self.ctx.this_class {
                let ty = self.program.class(class).ty;
                return Ok((
                    Instr::LocalGet {
                        index: 0,
                        ty: self.ptr_val_type(),
                    },
                    ty,
                ));
            }
            self.diags.report(
                ident.span,
                DiagnosticCode::UnsupportedConstruct,
                &["'this' outside an instance member"],
            );
            return Ok(self.trap(None));
        }

        if let Some(var) = self.ctx.get(name) {
            let ty = var.ty;
            if let Some(constant) = var.constant.clone() {
                // Inlined constant: no storage slot exists.
                return Ok((self.const_instr(&constant, ty)?, ty));
            }
            return Ok((
                Instr::LocalGet {
                    index: var.slot,
                    ty: ty.val_type().unwrap_or(ValType::I32),
                },
                ty,
            ));
        }

        if let Some(id) = self.program.find_global(name) {
            let var = self.program.global(id);
            let ty = var.ty;
            if let Some(constant) = var.constant.clone() {
                return Ok((self.const_instr(&constant, ty)?, ty));
            }
            return Ok((
                Instr::GlobalGet {
                    name: name.to_string(),
                    ty: ty.val_type().unwrap_or(ValType::I32),
                },
                ty,
            ));
        }

        self.diags
            .report(ident.span, DiagnosticCode::UnresolvedIdentifier, &[name]);
        Ok(self.trap(None))
    }

    /// Lower a member read: enum constant, class static, or instance field.
    pub(crate) fn lower_member_read(
        &mut self,
        member: &'ast ast::MemberExpr<'ast>,
        _ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        // Enum member: the front-end's constant query.
        if let Some(value) = self.enum_member_value(member) {
            return Ok((Instr::I32Const(value), Ty::I32));
        }

        // Class static: lowers to a global read.
        if let Some((name, ty)) = self.static_global(member)? {
            return Ok((
                Instr::GlobalGet {
                    name,
                    ty: ty.val_type().unwrap_or(ValType::I32),
                },
                ty,
            ));
        }

        let (base, base_ty) = self.lower_expr(member.base, None)?;
        let Some(class) = base_ty.class else {
            self.diags.report(
                member.span,
                DiagnosticCode::UnresolvedMember,
                &[member.member.name, &self.program.type_name(base_ty)],
            );
            return Ok(self.trap(None));
        };

        if let Some(prop) = self.program.lookup_property(class, member.member.name) {
            let (ty, offset) = (prop.ty, prop.offset);
            return Ok((load_value(base, ty, offset), ty));
        }

        if let Some(getter) = self.program.lookup_getter(class, member.member.name) {
            let ty = self.program.function(getter).return_ty;
            let call = self.call_function(getter, Some(base), Vec::new());
            return Ok((call, ty));
        }

        // Arrays and strings expose their length header field.
        if member.member.name == "length" && self.program.element_type(class).is_some() {
            return Ok((load_value(base, Ty::I32, 4), Ty::I32));
        }

        self.diags.report(
            member.span,
            DiagnosticCode::UnresolvedMember,
            &[member.member.name, &self.program.type_name(base_ty)],
        );
        Ok(self.trap(None))
    }

    /// Lower an element read from an array-backed class.
    pub(crate) fn lower_index_read(
        &mut self,
        index: &'ast ast::IndexExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let (addr, elem_ty) = self.element_address(index)?;
        match elem_ty {
            Some(ty) => Ok((load_value(addr, ty, 0), ty)),
            None => Ok(self.trap(None)),
        }
    }

    /// Compute the address of an indexed element.
    ///
    /// Returns the address instruction and the element type; `None` element
    /// type means the base was not indexable (already diagnosed).
    pub(crate) fn element_address(
        &mut self,
        index: &'ast ast::IndexExpr<'ast>,
    ) -> Result<(Instr, Option<Ty>), InternalError> {
        let (base, base_ty) = self.lower_expr(index.base, None)?;
        let elem_ty = base_ty.class.and_then(|c| self.program.element_type(c));
        let Some(elem_ty) = elem_ty else {
            self.diags.report(
                index.span,
                DiagnosticCode::InvalidOperation,
                &["[]", &self.program.type_name(base_ty)],
            );
            return Ok((Instr::Unreachable, None));
        };

        let ptr_ty = Ty::ptr(self.ptr_size());
        let (idx, idx_ty) = self.lower_expr(index.index, Some(ptr_ty))?;
        let idx = maybe_convert(
            self.program,
            idx,
            idx_ty,
            ptr_ty,
            false,
            self.target(),
            self.diags,
            index.span,
        );

        let vt = self.ptr_val_type();
        let data_ptr = Instr::Load {
            bytes: self.ptr_size() as u8,
            signed: false,
            offset: 8,
            ptr: Box::new(base),
            ty: vt,
        };
        let scaled = Instr::Binary {
            op: if vt == ValType::I64 {
                BinOp::MulI64
            } else {
                BinOp::MulI32
            },
            left: Box::new(idx),
            right: Box::new(Instr::const_int(vt, i64::from(elem_ty.size))),
        };
        let addr = Instr::Binary {
            op: if vt == ValType::I64 {
                BinOp::AddI64
            } else {
                BinOp::AddI32
            },
            left: Box::new(data_ptr),
            right: Box::new(scaled),
        };
        Ok((addr, Some(elem_ty)))
    }

    // ==========================================================================
    // Places
    // ==========================================================================

    /// Resolve an expression into an assignable place.
    pub(crate) fn resolve_place(
        &mut self,
        expr: &'ast Expr<'ast>,
    ) -> Result<Place, InternalError> {
        match *expr {
            Expr::Paren(paren) => self.resolve_place(paren.expr),
            Expr::Ident(ident) => {
                let name = ident.ident.name;
                if let Some(var) = self.ctx.get(name) {
                    if var.constant.is_some() {
                        self.diags
                            .report(ident.span, DiagnosticCode::NotAssignable, &[]);
                        return Ok(Place::Invalid { ty: var.ty });
                    }
                    return Ok(Place::Local {
                        slot: var.slot,
                        ty: var.ty,
                        mutable: var.mutable,
                    });
                }
                if let Some(id) = self.program.find_global(name) {
                    let var = self.program.global(id);
                    if var.constant.is_some() {
                        self.diags
                            .report(ident.span, DiagnosticCode::NotAssignable, &[]);
                        return Ok(Place::Invalid { ty: var.ty });
                    }
                    return Ok(Place::Global {
                        name: name.to_string(),
                        ty: var.ty,
                        mutable: var.mutable,
                    });
                }
                self.diags
                    .report(ident.span, DiagnosticCode::UnresolvedIdentifier, &[name]);
                Ok(Place::Invalid { ty: Ty::I32 })
            }
            Expr::Member(member) => {
                if self.enum_member_value(member).is_some() {
                    self.diags
                        .report(member.span, DiagnosticCode::NotAssignable, &[]);
                    return Ok(Place::Invalid { ty: Ty::I32 });
                }
                if let Some((name, ty)) = self.static_global(member)? {
                    return Ok(Place::Global {
                        name,
                        ty,
                        mutable: true,
                    });
                }

                let (base, base_ty) = self.lower_expr(member.base, None)?;
                let Some(class) = base_ty.class else {
                    self.diags.report(
                        member.span,
                        DiagnosticCode::UnresolvedMember,
                        &[member.member.name, &self.program.type_name(base_ty)],
                    );
                    return Ok(Place::Invalid { ty: Ty::I32 });
                };

                let vt = self.ptr_val_type();
                if let Some(prop) = self.program.lookup_property(class, member.member.name) {
                    let (ty, offset) = (prop.ty, prop.offset);
                    let (addr_first, addr_reuse) = self.ctx.materialize(base, vt);
                    return Ok(Place::Memory {
                        addr_first,
                        addr_reuse,
                        offset,
                        ty,
                    });
                }

                let getter = self.program.lookup_getter(class, member.member.name);
                let setter = self.program.lookup_setter(class, member.member.name);
                if getter.is_some() || setter.is_some() {
                    let ty = getter
                        .map(|g| self.program.function(g).return_ty)
                        .or_else(|| {
                            setter.and_then(|s| {
                                self.program.function(s).params.first().map(|(_, t)| *t)
                            })
                        })
                        .unwrap_or(Ty::I32);
                    let (base_first, base_reuse) = self.ctx.materialize(base, vt);
                    return Ok(Place::Accessor {
                        base_first,
                        base_reuse,
                        getter,
                        setter,
                        ty,
                    });
                }

                self.diags.report(
                    member.span,
                    DiagnosticCode::UnresolvedMember,
                    &[member.member.name, &self.program.type_name(base_ty)],
                );
                Ok(Place::Invalid { ty: Ty::I32 })
            }
            Expr::Index(index) => {
                let (addr, elem_ty) = self.element_address(index)?;
                let Some(ty) = elem_ty else {
                    return Ok(Place::Invalid { ty: Ty::I32 });
                };
                let vt = self.ptr_val_type();
                let (addr_first, addr_reuse) = self.ctx.materialize(addr, vt);
                Ok(Place::Memory {
                    addr_first,
                    addr_reuse,
                    offset: 0,
                    ty,
                })
            }
            _ => {
                self.diags
                    .report(expr.span(), DiagnosticCode::NotAssignable, &[]);
                Ok(Place::Invalid { ty: Ty::I32 })
            }
        }
    }

    // ==========================================================================
    // Assignment
    // ==========================================================================

    /// Lower a plain or compound assignment.
    pub(crate) fn lower_assign(
        &mut self,
        assign: &'ast ast::AssignExpr<'ast>,
        need_value: bool,
    ) -> Result<(Instr, Ty), InternalError> {
        let place = self.resolve_place(assign.target)?;
        let ty = place.ty();
        let span = assign.span;

        let (value, value_ty) = self.lower_expr(assign.value, Some(ty))?;
        let mut value = maybe_convert(
            self.program,
            value,
            value_ty,
            ty,
            false,
            self.target(),
            self.diags,
            span,
        );

        if let Some(op) = assign.op.binary_op() {
            let old = self.place_load_first(&place);
            value = self.combine(old, value, op, ty);
            return self.place_store_reused(place, value, need_value, span);
        }
        self.place_store_first(place, value, need_value, span)
    }

    /// Lower a prefix increment/decrement (result is the new value).
    pub(crate) fn lower_increment(
        &mut self,
        operand: &'ast Expr<'ast>,
        negative: bool,
        _want_new: bool,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        let place = self.resolve_place(operand)?;
        let ty = place.ty();
        let old = self.place_load_first(&place);
        let one = one_of(ty);
        let op = if negative {
            ast::BinaryOp::Sub
        } else {
            ast::BinaryOp::Add
        };
        let new = self.combine(old, one, op, ty);
        self.place_store_reused(place, new, true, span)
    }

    /// Lower a postfix increment/decrement (result is the old value).
    ///
    /// The old value is always written to a temporary before the store so
    /// the operand's side effects run exactly once.
    pub(crate) fn lower_increment_postfix(
        &mut self,
        operand: &'ast Expr<'ast>,
        negative: bool,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        let place = self.resolve_place(operand)?;
        let ty = place.ty();
        let vt = ty.val_type().unwrap_or(ValType::I32);
        let temp = self.ctx.temp(vt);

        let old_first = self.place_load_first(&place);
        let save_old = Instr::LocalSet {
            index: temp,
            value: Box::new(old_first),
        };
        let one = one_of(ty);
        let op = if negative {
            ast::BinaryOp::Sub
        } else {
            ast::BinaryOp::Add
        };
        let new = self.combine(Instr::LocalGet { index: temp, ty: vt }, one, op, ty);
        let (store, _) = self.place_store_reused(place, new, false, span)?;

        self.ctx.release_temp(vt, temp);
        Ok((
            Instr::Block {
                label: None,
                children: vec![save_old, store, Instr::LocalGet { index: temp, ty: vt }],
                result: Some(vt),
            },
            ty,
        ))
    }

    fn combine(&mut self, old: Instr, value: Instr, op: ast::BinaryOp, ty: Ty) -> Instr {
        if op == ast::BinaryOp::Rem && ty.is_any_float() {
            return builtins::expand_fmod(&mut self.ctx, old, value, ty);
        }
        let combined = Instr::Binary {
            op: super::arith_op(op, ty),
            left: Box::new(old),
            right: Box::new(value),
        };
        if ty.is_small_int() {
            mask_to_width(combined, ty)
        } else {
            combined
        }
    }

    /// Load a place's current value, performing the address bind if needed.
    fn place_load_first(&mut self, place: &Place) -> Instr {
        match place {
            Place::Local { slot, ty, .. } => Instr::LocalGet {
                index: *slot,
                ty: ty.val_type().unwrap_or(ValType::I32),
            },
            Place::Global { name, ty, .. } => Instr::GlobalGet {
                name: name.clone(),
                ty: ty.val_type().unwrap_or(ValType::I32),
            },
            Place::Memory {
                addr_first,
                offset,
                ty,
                ..
            } => load_value(addr_first.clone(), *ty, *offset),
            Place::Accessor {
                base_first, getter, ..
            } => match getter {
                Some(getter) => self.call_function(*getter, Some(base_first.clone()), Vec::new()),
                None => Instr::Unreachable,
            },
            Place::Invalid { .. } => Instr::Unreachable,
        }
    }

    /// Store into a place whose address bind already ran (compound path).
    fn place_store_reused(
        &mut self,
        place: Place,
        value: Instr,
        need_value: bool,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        let reused = match place {
            Place::Memory {
                addr_reuse,
                offset,
                ty,
                ..
            } => Place::Memory {
                addr_first: addr_reuse.clone(),
                addr_reuse,
                offset,
                ty,
            },
            Place::Accessor {
                base_reuse,
                getter,
                setter,
                ty,
                ..
            } => Place::Accessor {
                base_first: base_reuse.clone(),
                base_reuse,
                getter,
                setter,
                ty,
            },
            other => other,
        };
        self.place_store_first(reused, value, need_value, span)
    }

    /// Store into a place, performing the address bind if it has not run.
    fn place_store_first(
        &mut self,
        place: Place,
        value: Instr,
        need_value: bool,
        span: Span,
    ) -> Result<(Instr, Ty), InternalError> {
        match place {
            Place::Local { slot, ty, mutable } => {
                if !mutable {
                    self.diags.report(span, DiagnosticCode::NotAssignable, &[]);
                }
                let vt = ty.val_type().unwrap_or(ValType::I32);
                let instr = if need_value {
                    Instr::LocalTee {
                        index: slot,
                        value: Box::new(value),
                        ty: vt,
                    }
                } else {
                    Instr::LocalSet {
                        index: slot,
                        value: Box::new(value),
                    }
                };
                Ok((instr, ty))
            }
            Place::Global { name, ty, mutable } => {
                if !mutable {
                    self.diags.report(span, DiagnosticCode::NotAssignable, &[]);
                }
                let vt = ty.val_type().unwrap_or(ValType::I32);
                if need_value {
                    let temp = self.ctx.temp(vt);
                    let set = Instr::GlobalSet {
                        name,
                        value: Box::new(Instr::LocalTee {
                            index: temp,
                            value: Box::new(value),
                            ty: vt,
                        }),
                    };
                    let result = Instr::LocalGet { index: temp, ty: vt };
                    self.ctx.release_temp(vt, temp);
                    Ok((
                        Instr::Block {
                            label: None,
                            children: vec![set, result],
                            result: Some(vt),
                        },
                        ty,
                    ))
                } else {
                    Ok((
                        Instr::GlobalSet {
                            name,
                            value: Box::new(value),
                        },
                        ty,
                    ))
                }
            }
            Place::Memory {
                addr_first,
                addr_reuse,
                offset,
                ty,
            } => {
                let store = Instr::Store {
                    bytes: ty.size as u8,
                    offset,
                    ptr: Box::new(addr_first),
                    value: Box::new(value),
                };
                if need_value {
                    // Store-then-reload through the bound address.
                    let reload = load_value(addr_reuse, ty, offset);
                    Ok((
                        Instr::Block {
                            label: None,
                            children: vec![store, reload],
                            result: ty.val_type(),
                        },
                        ty,
                    ))
                } else {
                    Ok((store, ty))
                }
            }
            Place::Accessor {
                base_first,
                setter,
                ty,
                ..
            } => {
                let Some(setter) = setter else {
                    self.diags.report(span, DiagnosticCode::NotAssignable, &[]);
                    return Ok((Instr::Drop { value: Box::new(value) }, ty));
                };
                let vt = ty.val_type().unwrap_or(ValType::I32);
                if need_value {
                    let temp = self.ctx.temp(vt);
                    let set = self.call_function(
                        setter,
                        Some(base_first),
                        vec![Instr::LocalTee {
                            index: temp,
                            value: Box::new(value),
                            ty: vt,
                        }],
                    );
                    let result = Instr::LocalGet { index: temp, ty: vt };
                    self.ctx.release_temp(vt, temp);
                    Ok((
                        Instr::Block {
                            label: None,
                            children: vec![set, result],
                            result: Some(vt),
                        },
                        ty,
                    ))
                } else {
                    let set = self.call_function(setter, Some(base_first), vec![value]);
                    Ok((set, ty))
                }
            }
            Place::Invalid { ty } => Ok((
                Instr::Drop {
                    value: Box::new(value),
                },
                ty,
            )),
        }
    }

    // ==========================================================================
    // Symbol helpers
    // ==========================================================================

    /// Constant value of an enum member access, if the base names an enum.
    pub(crate) fn enum_member_value(&mut self, member: &ast::MemberExpr<'ast>) -> Option<i32> {
        let Expr::Ident(base) = member.base else {
            return None;
        };
        // Locals shadow enum names.
        if self.ctx.get(base.ident.name).is_some() {
            return None;
        }
        let def = self.program.find_enum(base.ident.name)?;
        match def.value_of(member.member.name) {
            Some(value) => Some(value),
            None => {
                self.diags.report(
                    member.span,
                    DiagnosticCode::UnresolvedMember,
                    &[member.member.name, base.ident.name],
                );
                Some(0)
            }
        }
    }

    /// Static-property global for a `ClassName.prop` access, if the base
    /// names a class.
    pub(crate) fn static_global(
        &mut self,
        member: &ast::MemberExpr<'ast>,
    ) -> Result<Option<(String, Ty)>, InternalError> {
        let Expr::Ident(base) = member.base else {
            return Ok(None);
        };
        if self.ctx.get(base.ident.name).is_some() {
            return Ok(None);
        }
        let Some(template) = self.program.find_class_template(base.ident.name) else {
            return Ok(None);
        };
        if self.program.class_templates[template.0 as usize].is_generic() {
            return Ok(None);
        }
        let class = crate::template::resolve_class(
            self.program,
            template,
            &[],
            self.target(),
            self.diags,
            member.span,
        )?;
        let name = format!("{}.{}", self.program.class(class).name, member.member.name);
        match self.program.find_global(&name) {
            Some(id) => {
                let ty = self.program.global(id).ty;
                Ok(Some((name, ty)))
            }
            None => Ok(None),
        }
    }
}

/// Load a typed value from memory, extending sub-width integers by their
/// signedness.
pub(crate) fn load_value(ptr: Instr, ty: Ty, offset: u32) -> Instr {
    Instr::Load {
        bytes: ty.size as u8,
        signed: ty.is_signed(),
        offset,
        ptr: Box::new(ptr),
        ty: ty.val_type().unwrap_or(ValType::I32),
    }
}

fn one_of(ty: Ty) -> Instr {
    match ty.kind {
        TypeKind::F32 => Instr::F32Const(1.0),
        TypeKind::F64 => Instr::F64Const(1.0),
        _ => Instr::const_int(ty.val_type().unwrap_or(ValType::I32), 1),
    }
}
