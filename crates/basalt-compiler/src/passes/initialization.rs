//! The initialization pass.
//!
//! Walks the module's declarations in file order. Templates are registered
//! first (so forward references resolve), then non-generic free functions
//! are instantiated and globals registered. A class implementation arriving
//! for an earlier library declaration stub triggers the patch machinery.

use rustc_hash::FxHashMap;

use basalt_core::{ConstValue, DiagnosticCode, Diagnostics, InternalError};
use basalt_ast::{self as ast, ClassMember, Item};

use crate::literal::{const_eval, literal_default_ty};
use crate::options::CompilerOptions;
use crate::program::{ClassTemplateId, EnumDef, MemberKind, Program, Variable};
use crate::template::{member_key, patch_template, resolve_function, resolve_type};
use crate::types::Ty;

/// Run the initialization pass.
pub fn run<'ast>(
    program: &mut Program<'ast>,
    module: &'ast ast::Module<'ast>,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
) -> Result<(), InternalError> {
    // First sweep: templates and enums, in file order.
    for item in module.items {
        match item {
            Item::Class(decl) => register_class(program, *decl, options, diags)?,
            Item::Function(decl) => {
                program.register_function_template(
                    decl.name.name.to_string(),
                    *decl,
                    None,
                    MemberKind::Free,
                )?;
            }
            Item::Enum(decl) => register_enum(program, decl, diags),
            Item::Global(_) => {}
        }
    }

    // Second sweep: instances and globals, once every name is known.
    for item in module.items {
        match item {
            Item::Function(decl) if decl.type_params.is_empty() => {
                let template = program
                    .find_function_template(decl.name.name)
                    .ok_or_else(|| {
                        InternalError::msg(format!("template '{}' vanished", decl.name.name))
                    })?;
                resolve_function(
                    program,
                    template,
                    &[],
                    None,
                    options.target,
                    diags,
                    decl.span,
                )?;
            }
            Item::Global(decl) => register_global(program, decl, options, diags)?,
            _ => {}
        }
    }
    Ok(())
}

fn register_class<'ast>(
    program: &mut Program<'ast>,
    decl: ast::ClassDecl<'ast>,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
) -> Result<(), InternalError> {
    let name = decl.name.name;

    if let Some(existing) = program.find_class_template(name) {
        let existing_is_stub = program.class_templates[existing.0 as usize]
            .decl
            .attrs
            .is_declare;
        if existing_is_stub && !decl.attrs.is_declare {
            // A library declaration is now bound to its implementation.
            let impl_name = format!("{name}~impl");
            let impl_template = program.register_class_template_as(decl, impl_name.clone());
            register_members(program, &impl_name, impl_template, &decl)?;
            patch_template(program, existing, impl_template, options.target, diags)?;
            return Ok(());
        }
        return Err(InternalError::DuplicateTemplate {
            name: name.to_string(),
        });
    }

    let template = program.register_class_template(decl)?;
    register_members(program, name, template, &decl)
}

fn register_members<'ast>(
    program: &mut Program<'ast>,
    class_name: &str,
    template: ClassTemplateId,
    decl: &ast::ClassDecl<'ast>,
) -> Result<(), InternalError> {
    for member in decl.members {
        let (fn_decl, kind) = match member {
            ClassMember::Method(decl) => (decl, MemberKind::Method),
            ClassMember::Getter(decl) => (decl, MemberKind::Getter),
            ClassMember::Setter(decl) => (decl, MemberKind::Setter),
            ClassMember::Constructor(decl) => (decl, MemberKind::Constructor),
            ClassMember::Field(_) => continue,
        };
        program.register_function_template(
            member_key(class_name, kind, fn_decl.name.name),
            *fn_decl,
            Some(template),
            kind,
        )?;
    }
    Ok(())
}

fn register_enum<'ast>(
    program: &mut Program<'ast>,
    decl: &ast::EnumDecl<'ast>,
    diags: &mut Diagnostics,
) {
    let mut values = Vec::with_capacity(decl.members.len());
    let mut index = FxHashMap::default();
    let mut next = 0i32;
    for member in decl.members {
        let value = match member.init {
            Some(expr) => match const_eval(expr, Ty::I32).and_then(|v| v.as_i64()) {
                Some(value) => value as i32,
                None => {
                    diags.report(
                        member.span,
                        DiagnosticCode::InvalidOperation,
                        &["enum initializer", "non-constant expression"],
                    );
                    next
                }
            },
            None => next,
        };
        next = value.wrapping_add(1);
        values.push((member.name.name.to_string(), value));
        index.insert(member.name.name.to_string(), value);
    }
    program.register_enum(EnumDef {
        name: decl.name.name.to_string(),
        values,
        index,
        exported: decl.is_exported,
    });
}

fn register_global<'ast>(
    program: &mut Program<'ast>,
    decl: &ast::GlobalDecl<'ast>,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
) -> Result<(), InternalError> {
    let annotated = match &decl.ty {
        Some(expr) => Some(resolve_type(program, expr, None, options.target, diags)?),
        None => None,
    };

    // Inlined constant: immutable with a (possibly negated) literal
    // initializer. Reads fold to the value and storage is elided.
    let mut constant: Option<ConstValue> = None;
    let mut ty = annotated;
    if !decl.mutable
        && let Some(init) = decl.init
    {
        let candidate = annotated.or_else(|| literal_default_ty(init));
        if let Some(candidate_ty) = candidate
            && candidate_ty.is_numeric()
            && let Some(value) = const_eval(init, candidate_ty)
        {
            constant = Some(value);
            ty = Some(candidate_ty);
        }
    }

    let ty = match ty.or_else(|| decl.init.and_then(literal_default_ty)) {
        Some(ty) => ty,
        None => {
            diags.report(
                decl.span,
                DiagnosticCode::MissingTypeAnnotation,
                &[decl.name.name],
            );
            Ty::I32
        }
    };

    let stored_init = if constant.is_some() { None } else { decl.init };
    program.register_global(Variable {
        name: decl.name.name.to_string(),
        ty,
        mutable: decl.mutable,
        constant,
        init: stored_init,
        exported: decl.is_exported,
        span: decl.span,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_ast::{EnumMember, Ident, Module};
    use basalt_core::Span;
    use bumpalo::Bump;

    fn ident(arena: &Bump, name: &str) -> Ident<'_> {
        Ident::new(arena.alloc_str(name), Span::default())
    }

    #[test]
    fn enum_members_auto_increment() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();

        let five = arena.alloc(ast::Expr::Literal(ast::LiteralExpr {
            kind: ast::LiteralKind::Int("5"),
            span: Span::default(),
        }));
        let members = arena.alloc_slice_copy(&[
            EnumMember {
                name: ident(&arena, "A"),
                init: None,
                span: Span::default(),
            },
            EnumMember {
                name: ident(&arena, "B"),
                init: Some(five),
                span: Span::default(),
            },
            EnumMember {
                name: ident(&arena, "C"),
                init: None,
                span: Span::default(),
            },
        ]);
        let decl = ast::EnumDecl {
            name: ident(&arena, "Color"),
            members,
            is_exported: false,
            span: Span::default(),
        };
        register_enum(&mut program, &decl, &mut diags);

        let def = program.find_enum("Color").unwrap();
        assert_eq!(def.value_of("A"), Some(0));
        assert_eq!(def.value_of("B"), Some(5));
        assert_eq!(def.value_of("C"), Some(6));
    }

    #[test]
    fn const_global_inlines() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let options = CompilerOptions::default();

        let init = arena.alloc(ast::Expr::Literal(ast::LiteralExpr {
            kind: ast::LiteralKind::Int("300"),
            span: Span::default(),
        }));
        let decl = ast::GlobalDecl {
            name: ident(&arena, "MASK"),
            ty: Some(ast::TypeExpr::simple(ident(&arena, "u8"))),
            init: Some(init),
            mutable: false,
            is_exported: false,
            span: Span::default(),
        };
        register_global(&mut program, &decl, &options, &mut diags).unwrap();

        let id = program.find_global("MASK").unwrap();
        let var = program.global(id);
        // 300 & 0xff per the u8 truncation policy, inlined.
        assert_eq!(var.constant, Some(ConstValue::I32(44)));
        assert!(var.init.is_none());
    }

    #[test]
    fn declarations_register_in_file_order() {
        let arena = Bump::new();
        let mut program = Program::new();
        let mut diags = Diagnostics::new();
        let options = CompilerOptions::default();

        let f = ast::FunctionDecl {
            name: ident(&arena, "main"),
            type_params: &[],
            params: &[],
            return_type: None,
            body: Some(ast::Block {
                stmts: &[],
                span: Span::default(),
            }),
            is_static: false,
            is_stdlib: false,
            is_import: false,
            is_exported: false,
            span: Span::default(),
        };
        let items = arena.alloc_slice_copy(&[Item::Function(f)]);
        let module = Module {
            items,
            statements: &[],
        };
        run(&mut program, arena.alloc(module), &options, &mut diags).unwrap();

        assert!(program.find_function_template("main").is_some());
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
    }
}
