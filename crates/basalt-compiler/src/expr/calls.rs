//! Call and new-expression lowering.
//!
//! Four call forms are distinguished by the callee shape: free functions,
//! static methods (`ClassName.method`), instance methods (`expr.method`),
//! and super-constructor calls. Builtin intrinsics short-circuit before
//! normal resolution when the callee's qualified name comes from the
//! trusted library source.

use basalt_core::{DiagnosticCode, InternalError, Span};
use basalt_ast::{self as ast, Expr};
use basalt_module::Instr;

use crate::builtins;
use crate::context::Lowerer;
use crate::conversion::maybe_convert;
use crate::program::{ClassFlags, ClassId, FunctionId, FunctionTemplateId, MemberKind};
use crate::runtime;
use crate::template::{member_key, resolve_class, resolve_function, resolve_type};
use crate::types::Ty;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Build a call instruction to a resolved function instance.
    pub(crate) fn call_function(
        &mut self,
        id: FunctionId,
        this: Option<Instr>,
        args: Vec<Instr>,
    ) -> Instr {
        let f = self.program.function(id);
        let mut operands = Vec::with_capacity(args.len() + 1);
        if let Some(this) = this {
            operands.push(this);
        }
        operands.extend(args);
        Instr::Call {
            target: f.name.clone(),
            operands,
            result: f.return_ty.val_type(),
        }
    }

    /// Lower any call expression.
    pub(crate) fn lower_call(
        &mut self,
        call: &'ast ast::CallExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        match *unwrap_parens(call.callee) {
            Expr::Super(_) => self.lower_super_call(call),
            Expr::Ident(ident) => self.lower_free_call(&ident, call, ctx_ty),
            Expr::Member(member) => self.lower_member_call(member, call, ctx_ty),
            other => {
                self.diags.report(
                    other.span(),
                    DiagnosticCode::UnsupportedConstruct,
                    &["indirect call"],
                );
                Ok(self.trap(ctx_ty))
            }
        }
    }

    fn lower_free_call(
        &mut self,
        ident: &ast::IdentExpr<'ast>,
        call: &'ast ast::CallExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let name = ident.ident.name;
        let Some(template) = self.program.find_function_template(name) else {
            self.diags
                .report(call.span, DiagnosticCode::UnresolvedIdentifier, &[name]);
            return Ok(self.trap(ctx_ty));
        };

        let decl = self.program.function_templates[template.0 as usize].decl;
        if decl.is_stdlib && builtins::is_intrinsic(name) {
            return self.lower_intrinsic(name, call, ctx_ty);
        }

        let type_args = self.call_type_args(template, call.type_args, call.span)?;
        let function = resolve_function(
            self.program,
            template,
            &type_args,
            None,
            self.target(),
            self.diags,
            call.span,
        )?;
        self.finish_call(function, None, call)
    }

    fn lower_member_call(
        &mut self,
        member: &'ast ast::MemberExpr<'ast>,
        call: &'ast ast::CallExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        // Static form: the base names a class, not a value.
        if let Expr::Ident(base) = unwrap_parens(member.base)
            && self.ctx.get(base.ident.name).is_none()
            && let Some(class_template) = self.program.find_class_template(base.ident.name)
        {
            let class_decl = self.program.class_templates[class_template.0 as usize].decl;
            let qualified = format!("{}.{}", base.ident.name, member.member.name);
            if class_decl.attrs.is_stdlib && builtins::is_intrinsic(&qualified) {
                return self.lower_intrinsic(&qualified, call, ctx_ty);
            }

            if !class_decl.type_params.is_empty() {
                self.diags.report(
                    call.span,
                    DiagnosticCode::UnsupportedConstruct,
                    &["static call on an uninstantiated generic class"],
                );
                return Ok(self.trap(ctx_ty));
            }
            let class = resolve_class(
                self.program,
                class_template,
                &[],
                self.target(),
                self.diags,
                call.span,
            )?;
            let key = member_key(base.ident.name, MemberKind::Method, member.member.name);
            let Some(template) = self.program.find_function_template(&key) else {
                self.diags.report(
                    call.span,
                    DiagnosticCode::UnresolvedMember,
                    &[member.member.name, base.ident.name],
                );
                return Ok(self.trap(ctx_ty));
            };
            let type_args = self.call_type_args(template, call.type_args, call.span)?;
            let function = resolve_function(
                self.program,
                template,
                &type_args,
                Some(class),
                self.target(),
                self.diags,
                call.span,
            )?;
            return self.finish_call(function, None, call);
        }

        // Instance form.
        let (base_instr, base_ty) = self.lower_expr(member.base, None)?;
        let Some(class) = base_ty.class else {
            self.diags.report(
                call.span,
                DiagnosticCode::UnresolvedMember,
                &[member.member.name, &self.program.type_name(base_ty)],
            );
            return Ok(self.trap(ctx_ty));
        };

        let function = self.resolve_instance_method(class, member.member.name, call)?;
        match function {
            Some(function) => self.finish_call(function, Some(base_instr), call),
            None => {
                self.diags.report(
                    call.span,
                    DiagnosticCode::UnresolvedMember,
                    &[member.member.name, &self.program.type_name(base_ty)],
                );
                Ok(self.trap(ctx_ty))
            }
        }
    }

    /// Find an instance method: already-resolved entries first, then the
    /// declaring template for generic methods.
    fn resolve_instance_method(
        &mut self,
        class: ClassId,
        name: &str,
        call: &'ast ast::CallExpr<'ast>,
    ) -> Result<Option<FunctionId>, InternalError> {
        if call.type_args.is_empty()
            && let Some(function) = self.program.lookup_method(class, name)
        {
            return Ok(Some(function));
        }

        // Walk the base chain for the declaring template.
        let mut current = Some(class);
        while let Some(class_id) = current {
            let template_name = {
                let c = self.program.class(class_id);
                self.program.class_templates[c.template.0 as usize]
                    .name
                    .clone()
            };
            let key = member_key(&template_name, MemberKind::Method, name);
            if let Some(template) = self.program.find_function_template(&key) {
                let type_args = self.call_type_args(template, call.type_args, call.span)?;
                let function = resolve_function(
                    self.program,
                    template,
                    &type_args,
                    Some(class_id),
                    self.target(),
                    self.diags,
                    call.span,
                )?;
                return Ok(Some(function));
            }
            current = self.program.class(class_id).base;
        }
        Ok(None)
    }

    /// Super-constructor call: walks the base chain for the nearest
    /// constructor with a body; none reachable lowers to a no-op.
    fn lower_super_call(
        &mut self,
        call: &'ast ast::CallExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let Some(this_class) = self.ctx.this_class else {
            self.diags.report(
                call.span,
                DiagnosticCode::UnsupportedConstruct,
                &["'super' outside a constructor"],
            );
            return Ok(self.trap(None));
        };
        let Some(base) = self.program.class(this_class).base else {
            return Ok((Instr::Nop, Ty::VOID));
        };
        let Some(ctor) = self.program.find_constructor(base) else {
            return Ok((Instr::Nop, Ty::VOID));
        };

        let this_arg = Instr::LocalGet {
            index: 0,
            ty: self.ptr_val_type(),
        };
        let args = self.lower_args(ctor, call)?;
        let instr = self.call_function(ctor, Some(this_arg), args);
        Ok((
            Instr::Drop {
                value: Box::new(instr),
            },
            Ty::VOID,
        ))
    }

    /// Resolve call-site type arguments for a function template.
    ///
    /// Explicit arguments win; otherwise the enclosing function's and
    /// class's bindings are inherited by parameter name.
    fn call_type_args(
        &mut self,
        template: FunctionTemplateId,
        explicit: &'ast [ast::TypeExpr<'ast>],
        span: Span,
    ) -> Result<Vec<Ty>, InternalError> {
        let decl = self.program.function_templates[template.0 as usize].decl;
        if decl.type_params.is_empty() {
            return Ok(Vec::new());
        }
        if !explicit.is_empty() {
            let ambient = self.ctx.type_args.clone();
            let mut args = Vec::with_capacity(explicit.len());
            for expr in explicit {
                args.push(resolve_type(
                    self.program,
                    expr,
                    Some(&ambient),
                    self.target(),
                    self.diags,
                )?);
            }
            return Ok(args);
        }
        let mut args = Vec::with_capacity(decl.type_params.len());
        for param in decl.type_params {
            match self.ctx.type_args.get(param.name) {
                Some(&ty) => args.push(ty),
                None => {
                    self.diags
                        .report(span, DiagnosticCode::UnresolvedType, &[param.name]);
                    args.push(Ty::I32);
                }
            }
        }
        Ok(args)
    }

    /// Lower a call's arguments against the callee's parameter types.
    fn lower_args(
        &mut self,
        function: FunctionId,
        call: &'ast ast::CallExpr<'ast>,
    ) -> Result<Vec<Instr>, InternalError> {
        let (params, fn_name) = {
            let f = self.program.function(function);
            (f.params.clone(), f.name.clone())
        };
        if call.args.len() != params.len() {
            self.diags.report(
                call.span,
                DiagnosticCode::ArgumentCountMismatch,
                &[
                    &fn_name,
                    &params.len().to_string(),
                    &call.args.len().to_string(),
                ],
            );
        }
        let mut lowered = Vec::with_capacity(params.len());
        for (i, (_, param_ty)) in params.iter().enumerate() {
            match call.args.get(i).copied() {
                Some(arg) => {
                    let (instr, actual) = self.lower_expr(arg, Some(*param_ty))?;
                    lowered.push(maybe_convert(
                        self.program,
                        instr,
                        actual,
                        *param_ty,
                        false,
                        self.target(),
                        self.diags,
                        arg.span(),
                    ));
                }
                None => lowered.push(Instr::zero(
                    param_ty.val_type().unwrap_or(basalt_module::ValType::I32),
                )),
            }
        }
        Ok(lowered)
    }

    fn finish_call(
        &mut self,
        function: FunctionId,
        this: Option<Instr>,
        call: &'ast ast::CallExpr<'ast>,
    ) -> Result<(Instr, Ty), InternalError> {
        let args = self.lower_args(function, call)?;
        let return_ty = self.program.function(function).return_ty;
        let instr = self.call_function(function, this, args);
        Ok((instr, return_ty))
    }

    // ==========================================================================
    // New expressions
    // ==========================================================================

    /// Lower a `new` expression.
    pub(crate) fn lower_new(
        &mut self,
        new: &'ast ast::NewExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<(Instr, Ty), InternalError> {
        let Some(template) = self.program.find_class_template(new.class.name) else {
            self.diags
                .report(new.span, DiagnosticCode::UnresolvedType, &[new.class.name]);
            return Ok(self.trap(ctx_ty));
        };

        let type_args = self.new_type_args(template, new, ctx_ty)?;
        let class = resolve_class(
            self.program,
            template,
            &type_args,
            self.target(),
            self.diags,
            new.span,
        )?;
        let class_ty = self.program.class(class).ty;
        let size = self.program.class(class).size;
        let implicit_malloc = self.program.class(class).flags.contains(ClassFlags::IMPLICIT_MALLOC);

        let ctor = self.program.find_constructor(class);
        match ctor {
            Some(ctor) => {
                // The constructor receives freshly allocated storage, or a
                // null pointer when the class manages its own allocation.
                let this_arg = if implicit_malloc {
                    self.allocate(size)
                } else {
                    Instr::zero(self.ptr_val_type())
                };
                let args = self.lower_new_args(ctor, new)?;
                let instr = self.call_function(ctor, Some(this_arg), args);
                Ok((instr, class_ty))
            }
            None => {
                // Bare allocation, with field initializers applied inline.
                let allocation = self.allocate(size);
                let instr = self.init_fields_inline(class, allocation)?;
                Ok((instr, class_ty))
            }
        }
    }

    fn new_type_args(
        &mut self,
        template: crate::program::ClassTemplateId,
        new: &'ast ast::NewExpr<'ast>,
        ctx_ty: Option<Ty>,
    ) -> Result<Vec<Ty>, InternalError> {
        let decl = self.program.class_templates[template.0 as usize].decl;
        if decl.type_params.is_empty() {
            return Ok(Vec::new());
        }
        if !new.type_args.is_empty() {
            let ambient = self.ctx.type_args.clone();
            let mut args = Vec::with_capacity(new.type_args.len());
            for expr in new.type_args {
                args.push(resolve_type(
                    self.program,
                    expr,
                    Some(&ambient),
                    self.target(),
                    self.diags,
                )?);
            }
            return Ok(args);
        }

        // No explicit arguments: inherit from the contextual type when it is
        // an instance of the same template.
        if let Some(ctx_ty) = ctx_ty
            && let Some(ctx_class) = ctx_ty.class
        {
            let ctx_class_ref = self.program.class(ctx_class);
            if ctx_class_ref.template == template {
                let args: Vec<Ty> = decl
                    .type_params
                    .iter()
                    .filter_map(|p| ctx_class_ref.type_args.get(p.name).copied())
                    .collect();
                if args.len() == decl.type_params.len() {
                    return Ok(args);
                }
            }
        }

        // Fall back to the enclosing bindings.
        let mut args = Vec::with_capacity(decl.type_params.len());
        for param in decl.type_params {
            match self.ctx.type_args.get(param.name) {
                Some(&ty) => args.push(ty),
                None => {
                    self.diags
                        .report(new.span, DiagnosticCode::UnresolvedType, &[param.name]);
                    args.push(Ty::I32);
                }
            }
        }
        Ok(args)
    }

    fn lower_new_args(
        &mut self,
        ctor: FunctionId,
        new: &'ast ast::NewExpr<'ast>,
    ) -> Result<Vec<Instr>, InternalError> {
        let params = self.program.function(ctor).params.clone();
        if new.args.len() != params.len() {
            let name = self.program.function(ctor).name.clone();
            self.diags.report(
                new.span,
                DiagnosticCode::ArgumentCountMismatch,
                &[&name, &params.len().to_string(), &new.args.len().to_string()],
            );
        }
        let mut lowered = Vec::with_capacity(params.len());
        for (i, (_, param_ty)) in params.iter().enumerate() {
            match new.args.get(i).copied() {
                Some(arg) => {
                    let (instr, actual) = self.lower_expr(arg, Some(*param_ty))?;
                    lowered.push(maybe_convert(
                        self.program,
                        instr,
                        actual,
                        *param_ty,
                        false,
                        self.target(),
                        self.diags,
                        arg.span(),
                    ));
                }
                None => lowered.push(Instr::zero(
                    param_ty.val_type().unwrap_or(basalt_module::ValType::I32),
                )),
            }
        }
        Ok(lowered)
    }

    /// Emit a runtime allocation of `size` bytes.
    pub(crate) fn allocate(&mut self, size: u32) -> Instr {
        self.runtime_used.insert(runtime::ALLOCATE.to_string());
        let vt = self.ptr_val_type();
        Instr::Call {
            target: runtime::ALLOCATE.to_string(),
            operands: vec![Instr::const_int(vt, i64::from(size))],
            result: Some(vt),
        }
    }

    /// Apply property initializers to freshly allocated storage and yield
    /// the pointer.
    fn init_fields_inline(
        &mut self,
        class: ClassId,
        allocation: Instr,
    ) -> Result<Instr, InternalError> {
        // Gather initialized properties from the whole chain (no
        // constructor anywhere, so nothing else will run them).
        let mut inits: Vec<(u32, Ty, &'ast ast::Expr<'ast>)> = Vec::new();
        let mut current = Some(class);
        while let Some(class_id) = current {
            let base = {
                let c = self.program.class(class_id);
                for name in &c.prop_order {
                    if let Some(prop) = c.properties.get(name)
                        && let Some(init) = prop.init
                    {
                        inits.push((prop.offset, prop.ty, init));
                    }
                }
                c.base
            };
            current = base;
        }
        if inits.is_empty() {
            return Ok(allocation);
        }

        let vt = self.ptr_val_type();
        let temp = self.ctx.temp(vt);
        let mut children = vec![Instr::LocalSet {
            index: temp,
            value: Box::new(allocation),
        }];
        for (offset, ty, init) in inits {
            let (value, actual) = self.lower_expr(init, Some(ty))?;
            let value = maybe_convert(
                self.program,
                value,
                actual,
                ty,
                false,
                self.target(),
                self.diags,
                init.span(),
            );
            children.push(Instr::Store {
                bytes: ty.size as u8,
                offset,
                ptr: Box::new(Instr::LocalGet { index: temp, ty: vt }),
                value: Box::new(value),
            });
        }
        children.push(Instr::LocalGet { index: temp, ty: vt });
        self.ctx.release_temp(vt, temp);
        Ok(Instr::Block {
            label: None,
            children,
            result: Some(vt),
        })
    }
}

fn unwrap_parens<'ast>(expr: &'ast Expr<'ast>) -> &'ast Expr<'ast> {
    match expr {
        Expr::Paren(paren) => unwrap_parens(paren.expr),
        other => other,
    }
}
