//! The lowering pass.
//!
//! Compiles every function instance with a body (the worklist grows as
//! lowering instantiates more templates), synthesizes the start routine
//! from deferred global initializers and top-level statements, registers
//! referenced runtime imports, and hands globals, exports, and static
//! segments to the module builder.

use rustc_hash::{FxHashMap, FxHashSet};

use basalt_core::{DiagnosticCode, Diagnostics, InternalError};
use basalt_ast as ast;
use basalt_module::{ExportKind, Instr, ModuleBuilder, ValType};

use crate::context::{Lowerer, LoweringCtx};
use crate::conversion::maybe_convert;
use crate::memory::StaticAllocator;
use crate::options::CompilerOptions;
use crate::program::{FnFlags, FunctionId, MemberKind, Program};
use crate::runtime;
use crate::types::Ty;

/// Run the lowering pass.
pub fn run<'ast>(
    program: &mut Program<'ast>,
    alloc: &mut StaticAllocator,
    module: &'ast ast::Module<'ast>,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
    builder: &mut ModuleBuilder,
) -> Result<(), InternalError> {
    program.seal();
    let mut runtime_used = FxHashSet::default();

    compile_worklist(program, alloc, options, diags, builder, &mut runtime_used)?;

    // The synthesized start routine: deferred global initializers in
    // declaration-encounter order, then top-level statements in source
    // order.
    let mut start_children = Vec::new();
    let start_locals;
    {
        let ctx = LoweringCtx::new(&[], None, Ty::VOID, FxHashMap::default());
        let mut lowerer = Lowerer {
            program: &mut *program,
            alloc: &mut *alloc,
            diags: &mut *diags,
            options,
            runtime_used: &mut runtime_used,
            ctx,
        };
        let resumed = lower_global_inits(&mut lowerer, 0, &mut start_children)?;
        for stmt in module.statements {
            start_children.push(lowerer.lower_stmt(stmt)?);
        }
        // Statements may have instantiated classes whose statics carry
        // their own deferred initializers.
        lower_global_inits(&mut lowerer, resumed, &mut start_children)?;
        start_locals = lowerer.ctx.locals();
    }
    if !start_children.is_empty() {
        let sig = builder.intern_sig(Vec::new(), None);
        builder.add_function(
            &options.start_name,
            sig,
            start_locals,
            Instr::Block {
                label: None,
                children: start_children,
                result: None,
            },
        );
        builder.set_start(&options.start_name);
    }

    // Start lowering may have instantiated more templates.
    compile_worklist(program, alloc, options, diags, builder, &mut runtime_used)?;

    // Referenced runtime support routines become imports.
    let mut used: Vec<&String> = runtime_used.iter().collect();
    used.sort();
    for name in &used {
        runtime::ensure_runtime(builder, name, options.target);
    }

    // Stored globals (inlined constants have no storage).
    for var in &program.globals {
        if var.constant.is_some() {
            continue;
        }
        let vt = var.ty.val_type().unwrap_or(ValType::I32);
        builder.add_global(&var.name, vt, var.mutable, Instr::zero(vt));
    }

    // Export surface.
    for id in 0..program.functions.len() {
        let f = &program.functions[id];
        if !f.flags.contains(FnFlags::EXPORTED) || f.owner.is_some() {
            continue;
        }
        let export_name = program.function_templates[f.template.0 as usize]
            .decl
            .name
            .name;
        if !builder.add_export(export_name, ExportKind::Function, &f.name) {
            diags.report(f.span, DiagnosticCode::DuplicateExport, &[export_name]);
        }
    }
    for var in &program.globals {
        if !var.exported || var.constant.is_some() {
            continue;
        }
        if !builder.add_export(&var.name, ExportKind::Global, &var.name) {
            diags.report(var.span, DiagnosticCode::DuplicateExport, &[&var.name]);
        }
    }
    builder.add_export(&options.memory_export, ExportKind::Memory, "memory");
    if options.export_runtime {
        for name in &used {
            builder.add_export(name, ExportKind::Function, name);
        }
    }

    // Static memory.
    for segment in alloc.segments() {
        builder.add_data_segment(segment.offset, segment.bytes.clone());
    }
    builder.reserve_static(alloc.total_size());
    Ok(())
}

/// Lower deferred global initializers starting at `from`, returning the
/// index reached. Registration order is preserved.
fn lower_global_inits<'a, 'ast>(
    lowerer: &mut Lowerer<'a, 'ast>,
    from: usize,
    children: &mut Vec<Instr>,
) -> Result<usize, InternalError> {
    let mut index = from;
    while index < lowerer.program.globals.len() {
        let (name, ty, init) = {
            let var = &lowerer.program.globals[index];
            (var.name.clone(), var.ty, var.init)
        };
        if let Some(init) = init {
            let (instr, actual) = lowerer.lower_expr(init, Some(ty))?;
            let value = maybe_convert(
                lowerer.program,
                instr,
                actual,
                ty,
                false,
                lowerer.target(),
                lowerer.diags,
                init.span(),
            );
            children.push(Instr::GlobalSet {
                name,
                value: Box::new(value),
            });
        }
        index += 1;
    }
    Ok(index)
}

/// Compile every not-yet-compiled function instance; the list grows while
/// we walk it as lowering instantiates more templates.
fn compile_worklist<'ast>(
    program: &mut Program<'ast>,
    alloc: &mut StaticAllocator,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
    builder: &mut ModuleBuilder,
    runtime_used: &mut FxHashSet<String>,
) -> Result<(), InternalError> {
    let mut index = 0;
    while index < program.functions.len() {
        let id = FunctionId(index as u32);
        index += 1;

        let (compiled, has_body, is_import) = {
            let f = program.function(id);
            (
                f.flags.contains(FnFlags::COMPILED),
                f.has_body(),
                f.flags.contains(FnFlags::IMPORT),
            )
        };
        if compiled {
            continue;
        }
        if is_import {
            register_import(program, builder, id);
            program.function_mut(id).flags |= FnFlags::COMPILED;
            continue;
        }
        if !has_body {
            // Bodyless library declarations are intrinsic carriers or
            // patched away; nothing to emit.
            program.function_mut(id).flags |= FnFlags::COMPILED;
            continue;
        }
        compile_function(program, alloc, options, diags, builder, runtime_used, id)?;
    }
    Ok(())
}

fn register_import(program: &Program<'_>, builder: &mut ModuleBuilder, id: FunctionId) {
    let f = program.function(id);
    let mut params: Vec<ValType> = Vec::with_capacity(f.params.len());
    for (_, ty) in &f.params {
        params.push(ty.val_type().unwrap_or(ValType::I32));
    }
    let result = f.return_ty.val_type();
    let field = program.function_templates[f.template.0 as usize]
        .decl
        .name
        .name;
    let sig = builder.intern_sig(params, result);
    builder.add_function_import(&f.name, "env", field, sig);
}

fn compile_function<'ast>(
    program: &mut Program<'ast>,
    alloc: &mut StaticAllocator,
    options: &CompilerOptions,
    diags: &mut Diagnostics,
    builder: &mut ModuleBuilder,
    runtime_used: &mut FxHashSet<String>,
    id: FunctionId,
) -> Result<(), InternalError> {
    let (name, params, owner, return_ty, type_args, body, kind, is_instance) = {
        let f = program.function(id);
        let kind = program.function_templates[f.template.0 as usize].kind;
        (
            f.name.clone(),
            f.params.clone(),
            f.owner,
            f.return_ty,
            f.type_args.clone(),
            f.body.ok_or_else(|| InternalError::msg("compiling a bodyless function"))?,
            kind,
            f.is_instance(),
        )
    };

    let this_class = if is_instance { owner } else { None };
    let ctx = LoweringCtx::new(&params, this_class, return_ty, type_args);
    let mut lowerer = Lowerer {
        program: &mut *program,
        alloc: &mut *alloc,
        diags: &mut *diags,
        options,
        runtime_used: &mut *runtime_used,
        ctx,
    };

    let mut children = Vec::new();
    if kind == MemberKind::Constructor
        && let Some(class) = owner
    {
        constructor_prologue(&mut lowerer, class, id, &mut children)?;
    }
    for stmt in body.stmts {
        children.push(lowerer.lower_stmt(stmt)?);
    }
    if kind == MemberKind::Constructor {
        // Constructors yield the instance they initialized.
        children.push(Instr::Return {
            value: Some(Box::new(Instr::LocalGet {
                index: 0,
                ty: lowerer.ptr_val_type(),
            })),
        });
    }

    let locals = lowerer.ctx.locals();
    let mut param_vts = Vec::with_capacity(params.len() + 1);
    if is_instance {
        param_vts.push(lowerer.ptr_val_type());
    }
    for (_, ty) in &params {
        param_vts.push(ty.val_type().unwrap_or(ValType::I32));
    }
    let result = return_ty.val_type();

    let sig = builder.intern_sig(param_vts, result);
    builder.add_function(
        &name,
        sig,
        locals,
        Instr::Block {
            label: None,
            children,
            result: None,
        },
    );
    program.function_mut(id).flags |= FnFlags::COMPILED;
    Ok(())
}

/// Constructor prologue: the declaring class's own field initializers, then
/// parameter-property stores, all against `this` in slot 0.
fn constructor_prologue<'a, 'ast>(
    lowerer: &mut Lowerer<'a, 'ast>,
    class: crate::program::ClassId,
    ctor: FunctionId,
    children: &mut Vec<Instr>,
) -> Result<(), InternalError> {
    let vt = lowerer.ptr_val_type();
    let this = Instr::LocalGet { index: 0, ty: vt };

    let inits: Vec<(u32, Ty, &'ast ast::Expr<'ast>)> = {
        let c = lowerer.program.class(class);
        c.prop_order
            .iter()
            .filter_map(|name| {
                c.properties
                    .get(name)
                    .and_then(|p| p.init.map(|init| (p.offset, p.ty, init)))
            })
            .collect()
    };
    for (offset, ty, init) in inits {
        let (instr, actual) = lowerer.lower_expr(init, Some(ty))?;
        let value = maybe_convert(
            lowerer.program,
            instr,
            actual,
            ty,
            false,
            lowerer.target(),
            lowerer.diags,
            init.span(),
        );
        children.push(Instr::Store {
            bytes: ty.size as u8,
            offset,
            ptr: Box::new(this.clone()),
            value: Box::new(value),
        });
    }

    // Parameter properties: `constructor(v: T as property)` stores the
    // parameter into its synthesized field.
    let param_props: Vec<(u32, Ty, u32)> = {
        let f = lowerer.program.function(ctor);
        let decl = lowerer.program.function_templates[f.template.0 as usize].decl;
        let c = lowerer.program.class(class);
        decl.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_property)
            .filter_map(|(i, p)| {
                c.properties
                    .get(p.name.name)
                    .map(|prop| (prop.offset, prop.ty, i as u32 + 1))
            })
            .collect()
    };
    for (offset, ty, slot) in param_props {
        children.push(Instr::Store {
            bytes: ty.size as u8,
            offset,
            ptr: Box::new(this.clone()),
            value: Box::new(Instr::LocalGet {
                index: slot,
                ty: ty.val_type().unwrap_or(ValType::I32),
            }),
        });
    }
    Ok(())
}
