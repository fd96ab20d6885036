//! Template resolution.
//!
//! Instantiates generic class and function templates against concrete type
//! arguments. Instances are keyed by a canonical mangled name
//! (`Base<T1,T2>` shape), so structurally identical instantiations resolve
//! to the same instance. Classes are constructed in two phases: the
//! instance identity and its self-referential pointer type are registered
//! before any member resolves, so in-progress lookups of the class's own
//! type terminate instead of recursing.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

use basalt_core::{DiagnosticCode, Diagnostics, InternalError, Span, TargetWidth};
use basalt_ast as ast;

use crate::program::{
    Class, ClassFlags, ClassId, ClassTemplateId, FnFlags, Function, FunctionId,
    FunctionTemplateId, MemberKind, Program, Property, Variable,
};
use crate::types::Ty;

/// Hard cap on live instantiation depth; exceeding it means a generic type
/// is instantiating itself without converging.
const MAX_INSTANTIATION_DEPTH: u32 = 64;

/// Hash a mangled name into a cache key.
pub fn mangle_hash(name: &str) -> u64 {
    xxh64(name.as_bytes(), 0)
}

/// Build the canonical instance name from a base name and type arguments.
pub fn mangle(program: &Program<'_>, base: &str, args: &[Ty]) -> String {
    if args.is_empty() {
        return base.to_string();
    }
    let rendered: Vec<String> = args.iter().map(|&ty| program.type_name(ty)).collect();
    format!("{}<{}>", base, rendered.join(","))
}

/// Qualified template key for a class member.
pub fn member_key(class: &str, kind: MemberKind, name: &str) -> String {
    match kind {
        MemberKind::Free => name.to_string(),
        MemberKind::Method => format!("{class}.{name}"),
        MemberKind::Getter => format!("{class}.get:{name}"),
        MemberKind::Setter => format!("{class}.set:{name}"),
        MemberKind::Constructor => format!("{class}.constructor"),
    }
}

/// Resolve a written type against an optional ambient type-argument map.
///
/// Unresolved names are user diagnostics; the resolution falls back to i32
/// so lowering can continue best-effort.
pub fn resolve_type<'ast>(
    program: &mut Program<'ast>,
    expr: &ast::TypeExpr<'ast>,
    map: Option<&FxHashMap<String, Ty>>,
    target: TargetWidth,
    diags: &mut Diagnostics,
) -> Result<Ty, InternalError> {
    let name = expr.name.name;

    // Ambient type-argument bindings shadow everything else.
    if let Some(map) = map
        && let Some(&bound) = map.get(name)
    {
        return Ok(apply_nullable(bound, expr, diags));
    }

    if let Some(prim) = primitive_by_name(name, target) {
        if expr.nullable {
            diags.report(expr.span, DiagnosticCode::InvalidOperation, &["| null", name]);
        }
        return Ok(prim);
    }

    // Enum names denote their 32-bit value type.
    if program.find_enum(name).is_some() {
        return Ok(Ty::I32);
    }

    if let Some(template) = program.find_class_template(name) {
        let mut args = Vec::with_capacity(expr.type_args.len());
        for arg in expr.type_args {
            args.push(resolve_type(program, arg, map, target, diags)?);
        }
        let class = resolve_class(program, template, &args, target, diags, expr.span)?;
        let ty = program.class(class).ty;
        return Ok(apply_nullable(ty, expr, diags));
    }

    diags.report(expr.span, DiagnosticCode::UnresolvedType, &[name]);
    Ok(Ty::I32)
}

fn apply_nullable(ty: Ty, expr: &ast::TypeExpr<'_>, diags: &mut Diagnostics) -> Ty {
    if !expr.nullable {
        return ty;
    }
    match ty.as_nullable() {
        Some(nullable) => nullable,
        None => {
            diags.report(
                expr.span,
                DiagnosticCode::InvalidOperation,
                &["| null", expr.name.name],
            );
            ty
        }
    }
}

fn primitive_by_name(name: &str, target: TargetWidth) -> Option<Ty> {
    Some(match name {
        "i8" => Ty::I8,
        "u8" => Ty::U8,
        "i16" => Ty::I16,
        "u16" => Ty::U16,
        "i32" => Ty::I32,
        "u32" => Ty::U32,
        "i64" => Ty::I64,
        "u64" => Ty::U64,
        "f32" => Ty::F32,
        "f64" => Ty::F64,
        "bool" => Ty::BOOL,
        "void" => Ty::VOID,
        "usize" => Ty::ptr(target.ptr_size()),
        "isize" => {
            if target.is_wide() {
                Ty::I64
            } else {
                Ty::I32
            }
        }
        _ => return None,
    })
}

/// Resolve a class template against concrete type arguments.
///
/// Returns the cached instance when one exists for the mangled name.
pub fn resolve_class<'ast>(
    program: &mut Program<'ast>,
    template_id: ClassTemplateId,
    type_args: &[Ty],
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Result<ClassId, InternalError> {
    program.instantiation_depth += 1;
    let result = resolve_class_inner(program, template_id, type_args, target, diags, span);
    program.instantiation_depth -= 1;
    result
}

fn resolve_class_inner<'ast>(
    program: &mut Program<'ast>,
    template_id: ClassTemplateId,
    type_args: &[Ty],
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Result<ClassId, InternalError> {
    let template = &program.class_templates[template_id.0 as usize];
    let template_name = template.name.clone();
    let decl = template.decl;
    let base_override = template.base_override;

    // Arity was validated by the front-end; a mismatch here is a contract
    // violation, not a user diagnostic.
    if decl.type_params.len() != type_args.len() {
        return Err(InternalError::TemplateArity {
            name: template_name,
            expected: decl.type_params.len(),
            got: type_args.len(),
        });
    }

    let mangled = mangle(program, &template_name, type_args);
    let key = mangle_hash(&mangled);
    if let Some(&cached) = program.class_templates[template_id.0 as usize].instances.get(&key) {
        return Ok(cached);
    }

    if program.instantiation_depth > MAX_INSTANTIATION_DEPTH {
        return Err(InternalError::TemplateRecursion {
            name: mangled,
        });
    }

    // Phase one: register the identity and its self-referential type before
    // any member resolves.
    let id = ClassId(program.classes.len() as u32);
    let self_ty = Ty::ptr(target.ptr_size()).as_class(id);
    let mut arg_map = FxHashMap::default();
    for (param, &arg) in decl.type_params.iter().zip(type_args) {
        arg_map.insert(param.name.to_string(), arg);
    }
    let mut flags = ClassFlags::default();
    if decl.attrs.is_array {
        flags |= ClassFlags::ARRAY;
    }
    if decl.attrs.is_string {
        flags |= ClassFlags::STRING;
    }
    if decl.attrs.implicit_malloc {
        flags |= ClassFlags::IMPLICIT_MALLOC;
    }
    if decl.attrs.is_declare {
        flags |= ClassFlags::DECLARE;
    }
    if decl.attrs.is_stdlib {
        flags |= ClassFlags::STDLIB;
    }
    program.classes.push(Class {
        name: mangled.clone(),
        template: template_id,
        type_args: arg_map.clone(),
        base: None,
        properties: FxHashMap::default(),
        prop_order: Vec::new(),
        methods: FxHashMap::default(),
        getters: FxHashMap::default(),
        setters: FxHashMap::default(),
        constructor: None,
        size: 0,
        flags,
        ty: self_ty,
    });
    program.class_templates[template_id.0 as usize]
        .instances
        .insert(key, id);

    // Phase two: base, then fields, then members.
    let base = match base_override {
        Some(impl_template) => Some(resolve_class(
            program,
            impl_template,
            type_args,
            target,
            diags,
            span,
        )?),
        None => match &decl.extends {
            Some(extends) => {
                let base_ty = resolve_type(program, extends, Some(&arg_map), target, diags)?;
                match base_ty.class {
                    Some(base_id) => Some(base_id),
                    None => {
                        return Err(InternalError::UnexpectedTypeKind {
                            name: extends.name.name.to_string(),
                            found: base_ty.prim_name(),
                            span: extends.span,
                        });
                    }
                }
            }
            None => None,
        },
    };
    let mut size = base.map(|b| program.class(b).size).unwrap_or(0);
    program.class_mut(id).base = base;

    // Declared fields append at the current cumulative size, densely.
    for member in decl.members {
        if let ast::ClassMember::Field(field) = member {
            if field.is_static {
                let ty = resolve_type(program, &field.ty, Some(&arg_map), target, diags)?;
                let static_name = format!("{mangled}.{}", field.name.name);
                if program.find_global(&static_name).is_none() {
                    program.register_global(Variable {
                        name: static_name,
                        ty,
                        mutable: true,
                        constant: None,
                        init: field.init,
                        exported: false,
                        span: field.span,
                    });
                }
                continue;
            }
            let ty = resolve_type(program, &field.ty, Some(&arg_map), target, diags)?;
            let property = Property {
                name: field.name.name.to_string(),
                ty,
                offset: size,
                init: field.init,
                is_static: false,
            };
            size += ty.size;
            let class = program.class_mut(id);
            class.prop_order.push(property.name.clone());
            class.properties.insert(property.name.clone(), property);
        }
    }

    // Methods, accessors, and the constructor.
    for member in decl.members {
        let (fn_decl, kind) = match member {
            ast::ClassMember::Method(decl) => (decl, MemberKind::Method),
            ast::ClassMember::Getter(decl) => (decl, MemberKind::Getter),
            ast::ClassMember::Setter(decl) => (decl, MemberKind::Setter),
            ast::ClassMember::Constructor(decl) => (decl, MemberKind::Constructor),
            ast::ClassMember::Field(_) => continue,
        };
        let key = member_key(&template_name, kind, fn_decl.name.name);
        let Some(fn_template) = program.find_function_template(&key) else {
            // Member templates are registered during initialization; a miss
            // means the front-end handed over an inconsistent tree.
            return Err(InternalError::msg(format!(
                "member template '{key}' was never registered"
            )));
        };
        // Generic methods wait for call-site arguments.
        if !fn_decl.type_params.is_empty() {
            continue;
        }
        let function = resolve_function(program, fn_template, &[], Some(id), target, diags, span)?;
        let class = program.class_mut(id);
        let member_name = fn_decl.name.name.to_string();
        match kind {
            MemberKind::Method => {
                class.methods.insert(member_name, function);
            }
            MemberKind::Getter => {
                class.getters.insert(member_name, function);
            }
            MemberKind::Setter => {
                class.setters.insert(member_name, function);
            }
            MemberKind::Constructor => {
                class.constructor = Some(function);
            }
            MemberKind::Free => {}
        }
        if kind == MemberKind::Constructor {
            // Parameter properties appear at the current offset, in
            // parameter order.
            let params: Vec<(String, Ty, Span)> = {
                let f = program.function(function);
                fn_decl
                    .params
                    .iter()
                    .zip(&f.params)
                    .filter(|(p, _)| p.is_property)
                    .map(|(p, (name, ty))| (name.clone(), *ty, p.span))
                    .collect()
            };
            for (name, ty, _pspan) in params {
                if let Some(existing) = program.class(id).properties.get(&name) {
                    return Err(InternalError::ConstructorPropertyMismatch {
                        class: mangled,
                        param: name,
                        property: existing.name.clone(),
                    });
                }
                let property = Property {
                    name: name.clone(),
                    ty,
                    offset: size,
                    init: None,
                    is_static: false,
                };
                size += ty.size;
                let class = program.class_mut(id);
                class.prop_order.push(name.clone());
                class.properties.insert(name, property);
            }
        }
    }

    program.class_mut(id).size = size;
    Ok(id)
}

/// Resolve a function template against concrete type arguments.
///
/// Mirrors class resolution with flat parameter/return signatures. The
/// owner's type-argument bindings are inherited before the template's own
/// parameters bind.
pub fn resolve_function<'ast>(
    program: &mut Program<'ast>,
    template_id: FunctionTemplateId,
    type_args: &[Ty],
    owner: Option<ClassId>,
    target: TargetWidth,
    diags: &mut Diagnostics,
    span: Span,
) -> Result<FunctionId, InternalError> {
    let template = &program.function_templates[template_id.0 as usize];
    let template_name = template.name.clone();
    let decl = template.decl;

    if decl.type_params.len() != type_args.len() {
        return Err(InternalError::TemplateArity {
            name: template_name,
            expected: decl.type_params.len(),
            got: type_args.len(),
        });
    }

    let base_name = match owner {
        Some(class) => format!("{}.{}", program.class(class).name, decl.name.name),
        None => decl.name.name.to_string(),
    };
    let mangled = mangle(program, &base_name, type_args);
    let key = mangle_hash(&mangled);
    if let Some(&cached) = program.function_templates[template_id.0 as usize]
        .instances
        .get(&key)
    {
        return Ok(cached);
    }

    let mut arg_map = owner
        .map(|class| program.class(class).type_args.clone())
        .unwrap_or_default();
    for (param, &arg) in decl.type_params.iter().zip(type_args) {
        arg_map.insert(param.name.to_string(), arg);
    }

    let mut params = Vec::with_capacity(decl.params.len());
    for param in decl.params {
        let ty = resolve_type(program, &param.ty, Some(&arg_map), target, diags)?;
        params.push((param.name.name.to_string(), ty));
    }
    let kind = program.function_templates[template_id.0 as usize].kind;
    let return_ty = match (&decl.return_type, kind, owner) {
        // Constructors yield the instance they initialized.
        (_, MemberKind::Constructor, Some(class)) => program.class(class).ty,
        (Some(expr), _, _) => resolve_type(program, expr, Some(&arg_map), target, diags)?,
        (None, _, _) => Ty::VOID,
    };

    let mut flags = FnFlags::default();
    if decl.is_import {
        flags |= FnFlags::IMPORT;
    }
    if decl.is_stdlib {
        flags |= FnFlags::STDLIB;
    }
    if decl.is_static {
        flags |= FnFlags::STATIC;
    }
    if decl.is_exported {
        flags |= FnFlags::EXPORTED;
    }

    let id = FunctionId(program.functions.len() as u32);
    program.functions.push(Function {
        name: mangled,
        template: template_id,
        owner,
        params,
        return_ty,
        type_args: arg_map,
        body: decl.body,
        flags,
        span,
    });
    program.function_templates[template_id.0 as usize]
        .instances
        .insert(key, id);
    Ok(id)
}

/// Patch a library declaration to delegate to its implementation.
///
/// The declaration template's base is redirected to the implementation
/// template, and every already-created instance of the declaration is
/// retrofitted: its base becomes the corresponding implementation instance
/// and each already-initialized method entry is replaced by the
/// implementation's resolved method. An implementation that omits a
/// required method is a fatal error, as is patching after lowering began.
pub fn patch_template<'ast>(
    program: &mut Program<'ast>,
    decl_template: ClassTemplateId,
    impl_template: ClassTemplateId,
    target: TargetWidth,
    diags: &mut Diagnostics,
) -> Result<(), InternalError> {
    if program.is_sealed() {
        return Err(InternalError::PatchAfterLowering {
            name: program.class_templates[decl_template.0 as usize].name.clone(),
        });
    }

    // Swap base pointers: the declaration now extends the implementation,
    // and the implementation takes over the declaration's prior base.
    let prior_base = program.class_templates[decl_template.0 as usize].base_override;
    program.class_templates[impl_template.0 as usize].base_override = prior_base;
    program.class_templates[decl_template.0 as usize].base_override = Some(impl_template);

    // Retrofit already-created instances.
    let decl_params = program.class_templates[decl_template.0 as usize]
        .decl
        .type_params;
    let instances: Vec<ClassId> = program.class_templates[decl_template.0 as usize]
        .instances
        .values()
        .copied()
        .collect();

    for instance in instances {
        let args: Vec<Ty> = {
            let class = program.class(instance);
            decl_params
                .iter()
                .filter_map(|p| class.type_args.get(p.name).copied())
                .collect()
        };
        let span = Span::default();
        let impl_instance =
            resolve_class(program, impl_template, &args, target, diags, span)?;
        program.class_mut(instance).base = Some(impl_instance);

        let method_names: Vec<String> =
            program.class(instance).methods.keys().cloned().collect();
        for name in method_names {
            let Some(replacement) = program.lookup_method(impl_instance, &name) else {
                return Err(InternalError::MissingMethod {
                    class: program.class(impl_instance).name.clone(),
                    method: name,
                });
            };
            program
                .class_mut(instance)
                .methods
                .insert(name, replacement);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_ast::{ClassAttrs, ClassDecl, ClassMember, FieldDecl, Ident, TypeExpr};
    use bumpalo::Bump;

    fn ident(arena: &Bump, name: &str) -> Ident<'_> {
        Ident::new(arena.alloc_str(name), Span::default())
    }

    fn field<'a>(arena: &'a Bump, name: &str, ty: &str) -> ClassMember<'a> {
        ClassMember::Field(FieldDecl {
            name: ident(arena, name),
            ty: TypeExpr::simple(ident(arena, ty)),
            init: None,
            is_static: false,
            span: Span::default(),
        })
    }

    fn generic_box(arena: &Bump) -> ClassDecl<'_> {
        let type_params = arena.alloc_slice_copy(&[ident(arena, "T")]);
        let members = arena.alloc_slice_copy(&[ClassMember::Field(FieldDecl {
            name: ident(arena, "v"),
            ty: TypeExpr::simple(ident(arena, "T")),
            init: None,
            is_static: false,
            span: Span::default(),
        })]);
        ClassDecl {
            name: ident(arena, "Box"),
            type_params,
            extends: None,
            members,
            attrs: ClassAttrs::default(),
            is_exported: false,
            span: Span::default(),
        }
    }

    #[test]
    fn mangled_names_encode_arguments() {
        let program = Program::new();
        assert_eq!(mangle(&program, "Box", &[Ty::I32]), "Box<i32>");
        assert_eq!(mangle(&program, "Map", &[Ty::U8, Ty::F64]), "Map<u8,f64>");
        assert_eq!(mangle(&program, "plain", &[]), "plain");
    }

    #[test]
    fn same_arguments_share_an_instance() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let tid = program.register_class_template(generic_box(&arena)).unwrap();

        let a = resolve_class(
            &mut program,
            tid,
            &[Ty::U8],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap();
        let b = resolve_class(
            &mut program,
            tid,
            &[Ty::U8],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap();
        let c = resolve_class(
            &mut program,
            tid,
            &[Ty::I32],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(program.class(a).size, 1);
        assert_eq!(program.class(c).size, 4);
        assert_eq!(program.class(a).name, "Box<u8>");
        assert_eq!(program.class(c).name, "Box<i32>");
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let tid = program.register_class_template(generic_box(&arena)).unwrap();

        let err = resolve_class(
            &mut program,
            tid,
            &[Ty::I32, Ty::I32],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InternalError::TemplateArity { .. }));
    }

    #[test]
    fn derived_fields_start_at_base_size() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();

        let base_members =
            arena.alloc_slice_copy(&[field(&arena, "a", "i32"), field(&arena, "b", "u8")]);
        let base_decl = ClassDecl {
            name: ident(&arena, "Base"),
            type_params: &[],
            extends: None,
            members: base_members,
            attrs: ClassAttrs::default(),
            is_exported: false,
            span: Span::default(),
        };
        program.register_class_template(base_decl).unwrap();

        let derived_members = arena.alloc_slice_copy(&[field(&arena, "c", "i64")]);
        let derived_decl = ClassDecl {
            name: ident(&arena, "Derived"),
            type_params: &[],
            extends: Some(TypeExpr::simple(ident(&arena, "Base"))),
            members: derived_members,
            attrs: ClassAttrs::default(),
            is_exported: false,
            span: Span::default(),
        };
        let derived_tid = program.register_class_template(derived_decl).unwrap();

        let derived = resolve_class(
            &mut program,
            derived_tid,
            &[],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap();

        // Dense layout: base is 4 + 1 = 5 bytes, derived field starts there.
        let base_id = program.class(derived).base.unwrap();
        assert_eq!(program.class(base_id).size, 5);
        assert_eq!(program.lookup_property(derived, "a").unwrap().offset, 0);
        assert_eq!(program.lookup_property(derived, "b").unwrap().offset, 4);
        assert_eq!(program.lookup_property(derived, "c").unwrap().offset, 5);
        assert_eq!(program.class(derived).size, 13);
    }

    fn stub_class<'a>(arena: &'a Bump, name: &str, declare: bool) -> ClassDecl<'a> {
        ClassDecl {
            name: ident(arena, name),
            type_params: &[],
            extends: None,
            members: &[],
            attrs: ClassAttrs {
                is_declare: declare,
                is_stdlib: declare,
                ..ClassAttrs::default()
            },
            is_exported: false,
            span: Span::default(),
        }
    }

    fn method_decl<'a>(arena: &'a Bump, name: &str, with_body: bool) -> ClassMember<'a> {
        ClassMember::Method(basalt_ast::FunctionDecl {
            name: ident(arena, name),
            type_params: &[],
            params: &[],
            return_type: None,
            body: with_body.then(|| basalt_ast::Block {
                stmts: &[],
                span: Span::default(),
            }),
            is_static: false,
            is_stdlib: false,
            is_import: false,
            is_exported: false,
            span: Span::default(),
        })
    }

    #[test]
    fn patching_retrofits_existing_instances() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let span = Span::default();

        // A library declaration stub with one method, already instantiated.
        let mut decl = stub_class(&arena, "Lib", true);
        decl.members = arena.alloc_slice_copy(&[method_decl(&arena, "m", false)]);
        let decl_tid = program.register_class_template(decl).unwrap();
        let m = match decl.members[0] {
            ClassMember::Method(m) => m,
            _ => unreachable!(),
        };
        program
            .register_function_template(
                member_key("Lib", MemberKind::Method, "m"),
                m,
                Some(decl_tid),
                MemberKind::Method,
            )
            .unwrap();
        let instance =
            resolve_class(&mut program, decl_tid, &[], TargetWidth::W32, &mut diags, span)
                .unwrap();
        let stub_method = program.lookup_method(instance, "m").unwrap();

        // The implementation arrives later under its own template key.
        let mut impl_decl = stub_class(&arena, "Lib", false);
        impl_decl.members = arena.alloc_slice_copy(&[method_decl(&arena, "m", true)]);
        let impl_tid = program.register_class_template_as(impl_decl, "Lib~impl".to_string());
        let impl_m = match impl_decl.members[0] {
            ClassMember::Method(m) => m,
            _ => unreachable!(),
        };
        program
            .register_function_template(
                member_key("Lib~impl", MemberKind::Method, "m"),
                impl_m,
                Some(impl_tid),
                MemberKind::Method,
            )
            .unwrap();

        patch_template(&mut program, decl_tid, impl_tid, TargetWidth::W32, &mut diags).unwrap();

        // The already-created instance now defers to the implementation.
        let base = program.class(instance).base.unwrap();
        assert_eq!(program.class(base).name, "Lib~impl");
        let patched_method = program.class(instance).methods["m"];
        assert_ne!(patched_method, stub_method);
        assert!(program.function(patched_method).has_body());
    }

    #[test]
    fn patch_missing_method_is_fatal() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let span = Span::default();

        let mut decl = stub_class(&arena, "Lib", true);
        decl.members = arena.alloc_slice_copy(&[method_decl(&arena, "m", false)]);
        let decl_tid = program.register_class_template(decl).unwrap();
        let m = match decl.members[0] {
            ClassMember::Method(m) => m,
            _ => unreachable!(),
        };
        program
            .register_function_template(
                member_key("Lib", MemberKind::Method, "m"),
                m,
                Some(decl_tid),
                MemberKind::Method,
            )
            .unwrap();
        resolve_class(&mut program, decl_tid, &[], TargetWidth::W32, &mut diags, span).unwrap();

        // The implementation omits the required method.
        let impl_decl = stub_class(&arena, "Lib", false);
        let impl_tid = program.register_class_template_as(impl_decl, "Lib~impl".to_string());

        let err =
            patch_template(&mut program, decl_tid, impl_tid, TargetWidth::W32, &mut diags)
                .unwrap_err();
        assert!(matches!(err, InternalError::MissingMethod { .. }));
    }

    #[test]
    fn patch_after_seal_is_fatal() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();

        let decl_tid = program
            .register_class_template(stub_class(&arena, "Lib", true))
            .unwrap();
        let impl_tid =
            program.register_class_template_as(stub_class(&arena, "Impl", false), "Impl".into());

        program.seal();
        let err =
            patch_template(&mut program, decl_tid, impl_tid, TargetWidth::W32, &mut diags)
                .unwrap_err();
        assert!(matches!(err, InternalError::PatchAfterLowering { .. }));
    }

    #[test]
    fn self_referential_class_terminates() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();

        // class Node { next: Node | null; }
        let next_ty = TypeExpr {
            name: ident(&arena, "Node"),
            type_args: &[],
            nullable: true,
            span: Span::default(),
        };
        let members = arena.alloc_slice_copy(&[ClassMember::Field(FieldDecl {
            name: ident(&arena, "next"),
            ty: next_ty,
            init: None,
            is_static: false,
            span: Span::default(),
        })]);
        let decl = ClassDecl {
            name: ident(&arena, "Node"),
            type_params: &[],
            extends: None,
            members,
            attrs: ClassAttrs::default(),
            is_exported: false,
            span: Span::default(),
        };
        let tid = program.register_class_template(decl).unwrap();
        let id = resolve_class(
            &mut program,
            tid,
            &[],
            TargetWidth::W32,
            &mut diags,
            Span::default(),
        )
        .unwrap();

        let next = program.lookup_property(id, "next").unwrap();
        assert_eq!(next.ty.class, Some(id));
        assert!(next.ty.nullable);
        assert_eq!(program.class(id).size, 4);
    }
}
