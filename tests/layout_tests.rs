//! Template instantiation, memory layout, and static data tests.

mod common;

use bumpalo::Bump;

use basalt::compiler::template::{resolve_class, resolve_function};
use basalt::compiler::{CompilerOptions, Program};
use basalt::module::Instr;
use basalt::{compile, Diagnostics, TargetWidth};
use common::Ast;

#[test]
fn generic_class_instances_are_identity_cached() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);
    let mut program = Program::new();
    let mut diags = Diagnostics::new();

    // class Box<T> { v: T; }
    let decl = match ast.class("Box", &["T"], &[ast.field("v", ast.ty("T"))]) {
        basalt::ast::Item::Class(decl) => decl,
        _ => unreachable!(),
    };
    let template = program.register_class_template(decl).unwrap();

    let span = basalt::Span::default();
    let u8_box = resolve_class(
        &mut program,
        template,
        &[basalt::compiler::Ty::U8],
        TargetWidth::W32,
        &mut diags,
        span,
    )
    .unwrap();
    let u8_box_again = resolve_class(
        &mut program,
        template,
        &[basalt::compiler::Ty::U8],
        TargetWidth::W32,
        &mut diags,
        span,
    )
    .unwrap();
    let i32_box = resolve_class(
        &mut program,
        template,
        &[basalt::compiler::Ty::I32],
        TargetWidth::W32,
        &mut diags,
        span,
    )
    .unwrap();

    // Identity equality for equal arguments, distinct otherwise.
    assert_eq!(u8_box, u8_box_again);
    assert_ne!(u8_box, i32_box);

    // Sizes computed from the bound argument; names differ only in the
    // type-argument suffix.
    assert_eq!(program.class(u8_box).size, 1);
    assert_eq!(program.class(i32_box).size, 4);
    assert_eq!(program.class(u8_box).name, "Box<u8>");
    assert_eq!(program.class(i32_box).name, "Box<i32>");
    assert!(diags.is_empty());
}

#[test]
fn derived_layout_is_dense_and_monotonic() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);
    let mut program = Program::new();
    let mut diags = Diagnostics::new();

    let base = match ast.class(
        "Base",
        &[],
        &[ast.field("a", ast.ty("u8")), ast.field("b", ast.ty("i32"))],
    ) {
        basalt::ast::Item::Class(decl) => decl,
        _ => unreachable!(),
    };
    program.register_class_template(base).unwrap();

    let derived_members = [ast.field("c", ast.ty("u16")), ast.field("d", ast.ty("f64"))];
    let derived_decl = basalt::ast::ClassDecl {
        name: ast.ident("Derived"),
        type_params: &[],
        extends: Some(ast.ty("Base")),
        members: arena.alloc_slice_copy(&derived_members),
        attrs: basalt::ast::ClassAttrs::default(),
        is_exported: false,
        span: basalt::Span::default(),
    };
    let derived_template = program.register_class_template(derived_decl).unwrap();

    let derived = resolve_class(
        &mut program,
        derived_template,
        &[],
        TargetWidth::W32,
        &mut diags,
        basalt::Span::default(),
    )
    .unwrap();

    // Inherited offsets match the base exactly; new fields start at the
    // base's total size and pack densely.
    assert_eq!(program.lookup_property(derived, "a").unwrap().offset, 0);
    assert_eq!(program.lookup_property(derived, "b").unwrap().offset, 1);
    assert_eq!(program.lookup_property(derived, "c").unwrap().offset, 5);
    assert_eq!(program.lookup_property(derived, "d").unwrap().offset, 7);
    assert_eq!(program.class(derived).size, 15);
}

#[test]
fn generic_function_instances_mangle_like_classes() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);
    let mut program = Program::new();
    let mut diags = Diagnostics::new();

    // fn id<T>(v: T): T { return v; }
    let params = [basalt::ast::Param {
        name: ast.ident("v"),
        ty: ast.ty("T"),
        is_property: false,
        span: basalt::Span::default(),
    }];
    let ret_v = ast.ret(Some(ast.name("v")));
    let decl = basalt::ast::FunctionDecl {
        name: ast.ident("id"),
        type_params: arena.alloc_slice_copy(&[ast.ident("T")]),
        params: arena.alloc_slice_copy(&params),
        return_type: Some(ast.ty("T")),
        body: Some(ast.block(&[ret_v])),
        is_static: false,
        is_stdlib: false,
        is_import: false,
        is_exported: false,
        span: basalt::Span::default(),
    };
    let template = program
        .register_function_template(
            "id".to_string(),
            decl,
            None,
            basalt::compiler::program::MemberKind::Free,
        )
        .unwrap();

    let span = basalt::Span::default();
    let id_i64 = resolve_function(
        &mut program,
        template,
        &[basalt::compiler::Ty::I64],
        None,
        TargetWidth::W32,
        &mut diags,
        span,
    )
    .unwrap();
    let id_i64_again = resolve_function(
        &mut program,
        template,
        &[basalt::compiler::Ty::I64],
        None,
        TargetWidth::W32,
        &mut diags,
        span,
    )
    .unwrap();

    assert_eq!(id_i64, id_i64_again);
    assert_eq!(program.function(id_i64).name, "id<i64>");
    assert_eq!(program.function(id_i64).return_ty, basalt::compiler::Ty::I64);
}

#[test]
fn constant_array_global_lowers_to_one_segment() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // const data: Array<i32> = [1, 2, 3];
    let elems = [
        Some(ast.int("1")),
        Some(ast.int("2")),
        Some(ast.int("3")),
    ];
    let array_ty = ast.generic_ty("Array", &[ast.ty("i32")]);
    let module = ast.module(
        &[
            ast.array_class(),
            ast.global("data", Some(array_ty), ast.array(&elems), false),
        ],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    // One static segment: {capacity: 3, length: 3, dataPtr} then the
    // little-endian elements — no runtime stores.
    assert_eq!(result.module.segments.len(), 1);
    let segment = &result.module.segments[0];
    assert_eq!(&segment.bytes[0..4], &3u32.to_le_bytes());
    assert_eq!(&segment.bytes[4..8], &3u32.to_le_bytes());
    let data_ptr = u32::from_le_bytes(segment.bytes[8..12].try_into().unwrap());
    assert_eq!(data_ptr, segment.offset + 12);
    assert_eq!(&segment.bytes[12..16], &1u32.to_le_bytes());
    assert_eq!(&segment.bytes[16..20], &2u32.to_le_bytes());
    assert_eq!(&segment.bytes[20..24], &3u32.to_le_bytes());

    // The global is initialized to the segment's offset in the start
    // routine rather than via per-element stores.
    let start = result.module.function("~start").unwrap();
    assert_eq!(
        start.body.count(|i| matches!(
            i,
            Instr::GlobalSet { name, value } if name == "data"
                && **value == Instr::I32Const(segment.offset as i32)
        )),
        1
    );
    assert_eq!(start.body.count(|i| matches!(i, Instr::Store { .. })), 0);
    assert_eq!(result.module.start.as_deref(), Some("~start"));
}

#[test]
fn static_memory_drives_initial_pages() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    let module = ast.module(
        &[
            ast.string_class(),
            ast.function(
                "main",
                &[ast.let_stmt("s", Some(ast.ty("String")), ast.str_lit("x"))],
            ),
        ],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);
    assert_eq!(result.module.memory_pages, 1);
    assert!(result.module.export("memory").is_some());
}

#[test]
fn sixty_four_bit_target_widens_pointers() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // const data: Array<i64> = [7];
    let elems = [Some(ast.int("7"))];
    let array_ty = ast.generic_ty("Array", &[ast.ty("i64")]);
    let module = ast.module(
        &[
            ast.array_class(),
            ast.global("data", Some(array_ty), ast.array(&elems), false),
        ],
        &[],
    );
    let options = CompilerOptions {
        target: TargetWidth::W64,
        ..CompilerOptions::default()
    };
    let result = compile(module, options).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let segment = &result.module.segments[0];
    // Wide header: 4 + 4 + 8 pointer bytes, then one i64 element.
    assert_eq!(segment.bytes.len(), 24);
    let data_ptr = u64::from_le_bytes(segment.bytes[8..16].try_into().unwrap());
    assert_eq!(data_ptr, u64::from(segment.offset) + 16);
    assert_eq!(&segment.bytes[16..24], &7u64.to_le_bytes());

    // The global initializer is a 64-bit pointer constant.
    let start = result.module.function("~start").unwrap();
    assert_eq!(
        start.body.count(|i| matches!(
            i,
            Instr::GlobalSet { name, value } if name == "data"
                && **value == Instr::I64Const(i64::from(segment.offset))
        )),
        1
    );
}
