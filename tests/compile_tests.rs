//! End-to-end compilation tests: AST in, module out.

mod common;

use bumpalo::Bump;

use basalt::ast::BinaryOp;
use basalt::module::{BinOp, Instr, UnOp};
use basalt::{compile, CompilerOptions, DiagnosticKind};
use common::Ast;

fn body_of<'m>(module: &'m basalt::module::Module, name: &str) -> &'m Instr {
    &module
        .function(name)
        .unwrap_or_else(|| panic!("function '{name}' missing"))
        .body
}

#[test]
fn const_declaration_inlines_and_allocates_no_slot() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { const x: i32 = 5; let y: i32 = x; }
    let module = ast.module(
        &[ast.function(
            "main",
            &[
                ast.const_stmt("x", Some(ast.ty("i32")), ast.int("5")),
                ast.let_stmt("y", Some(ast.ty("i32")), ast.name("x")),
            ],
        )],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let main = result.module.function("main").unwrap();
    // Only `y` occupies a slot; reading `x` folded to the constant.
    assert_eq!(main.locals.len(), 1);
    assert_eq!(main.body.count(|i| *i == Instr::I32Const(5)), 1);
    assert_eq!(main.body.count(|i| matches!(i, Instr::LocalGet { .. })), 0);
}

#[test]
fn u8_literal_truncates_without_diagnostic() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { let y: u8 = 300; }
    let module = ast.module(
        &[ast.function(
            "main",
            &[ast.let_stmt("y", Some(ast.ty("u8")), ast.int("300"))],
        )],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();

    assert!(result.diagnostics.is_empty(), "{}", result.diagnostics);
    let body = body_of(&result.module, "main");
    assert_eq!(body.count(|i| *i == Instr::I32Const(44)), 1);
}

#[test]
fn implicit_float_to_int_narrows_and_reports() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { let d: f64 = 1.5; let i: i32 = d; }
    let module = ast.module(
        &[ast.function(
            "main",
            &[
                ast.let_stmt("d", Some(ast.ty("f64")), ast.float("1.5")),
                ast.let_stmt("i", Some(ast.ty("i32")), ast.name("d")),
            ],
        )],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();

    // Best-effort: the truncating conversion is still emitted, plus an
    // error diagnostic.
    assert!(result.diagnostics.has_errors());
    let body = body_of(&result.module, "main");
    assert_eq!(
        body.count(|i| matches!(
            i,
            Instr::Unary {
                op: UnOp::TruncF64ToI32S,
                ..
            }
        )),
        1
    );
}

#[test]
fn switch_evaluates_discriminant_once() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // switch (x) { case 1: break; case 2: ; case 3: break; default: ; }
    let stmts = [
        ast.let_stmt("x", Some(ast.ty("i32")), ast.int("42")),
        ast.switch(
            ast.name("x"),
            &[
                ast.case(Some(ast.int("1")), &[ast.break_stmt()]),
                ast.case(Some(ast.int("2")), &[]),
                ast.case(Some(ast.int("3")), &[ast.break_stmt()]),
                ast.case(None, &[]),
            ],
        ),
    ];
    let module = ast.module(&[ast.function("main", &stmts)], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let body = body_of(&result.module, "main");
    // One dispatch table over the case labels, with the no-match default
    // going to the default clause via the index chain.
    assert_eq!(body.count(|i| matches!(i, Instr::BrTable { .. })), 1);
    body.for_each(&mut |i| {
        if let Instr::BrTable { labels, default, .. } = i {
            assert_eq!(labels.len(), 4);
            assert_eq!(default, "break$1");
        }
    });
    // The discriminant lands in exactly one temporary; case tests read the
    // temporary instead of re-evaluating.
    let disc_sets = body.count(|i| matches!(i, Instr::LocalSet { .. }));
    assert_eq!(disc_sets, 2); // `x` initializer + the switch temporary
    // Three equality tests chained through selects.
    assert_eq!(body.count(|i| matches!(i, Instr::Select { .. })), 3);
    assert_eq!(
        body.count(|i| matches!(i, Instr::Binary { op: BinOp::EqI32, .. })),
        3
    );
}

#[test]
fn is_nan_evaluates_side_effects_once() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // declare fn f(): f64 (import); stdlib fn isNaN(value: f64): bool
    let f = basalt::ast::Item::Function(basalt::ast::FunctionDecl {
        name: ast.ident("f"),
        type_params: &[],
        params: &[],
        return_type: Some(ast.ty("f64")),
        body: None,
        is_static: false,
        is_stdlib: false,
        is_import: true,
        is_exported: false,
        span: basalt::Span::default(),
    });
    let is_nan = ast.stdlib_function("isNaN", &[("value", ast.ty("f64"))], Some(ast.ty("bool")));

    // fn main() { isNaN(f()); }
    let call = ast.call(ast.name("isNaN"), &[ast.call(ast.name("f"), &[])]);
    let module = ast.module(
        &[f, is_nan, ast.function("main", &[ast.expr_stmt(call)])],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let body = body_of(&result.module, "main");
    // f() is invoked exactly once; the comparison reads a temporary twice.
    assert_eq!(
        body.count(|i| matches!(i, Instr::Call { target, .. } if target == "f")),
        1
    );
    assert_eq!(
        body.count(|i| matches!(i, Instr::Binary { op: BinOp::NeF64, .. })),
        1
    );
    assert_eq!(body.count(|i| matches!(i, Instr::LocalTee { .. })), 1);
    // And it really was imported, not compiled.
    assert!(result.module.imports.iter().any(|i| i.name == "f"));
}

#[test]
fn string_literals_intern_by_text() {
    fn build<'a>(ast: &Ast<'a>) -> &'a basalt::ast::Module<'a> {
        let stmts = [
            ast.let_stmt("a", Some(ast.ty("String")), ast.str_lit("hello")),
            ast.let_stmt("b", Some(ast.ty("String")), ast.str_lit("hello")),
        ];
        ast.module(&[ast.string_class(), ast.function("main", &stmts)], &[])
    }

    let arena = Bump::new();
    let ast = Ast::new(&arena);
    let module = build(&ast);
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);
    assert_eq!(result.module.segments.len(), 1);

    let arena2 = Bump::new();
    let ast2 = Ast::new(&arena2);
    let module2 = build(&ast2);
    let options = CompilerOptions {
        intern_strings: false,
        ..CompilerOptions::default()
    };
    let result2 = compile(module2, options).unwrap();
    assert_eq!(result2.module.segments.len(), 2);
}

#[test]
fn endless_for_warns_but_still_lowers() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { let x: i32 = 0; for (;;) x++; }
    let stmts = [
        ast.let_stmt("x", Some(ast.ty("i32")), ast.int("0")),
        ast.endless_for(ast.expr_stmt(ast.post_inc(ast.name("x")))),
    ];
    let module = ast.module(&[ast.function("main", &stmts)], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();

    assert!(!result.diagnostics.has_errors());
    assert!(result.diagnostics.has_warnings());

    let body = body_of(&result.module, "main");
    assert_eq!(body.count(|i| matches!(i, Instr::Loop { .. })), 1);
    body.for_each(&mut |i| {
        if let Instr::Loop { label, .. } = i {
            assert_eq!(label, "loop$1");
        }
    });
}

#[test]
fn compound_element_assignment_computes_address_once() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { let a: Array<i32> = [1,2,3]; a[0] += 1; }
    let array_ty = ast.generic_ty("Array", &[ast.ty("i32")]);
    let elems = [
        Some(ast.int("1")),
        Some(ast.int("2")),
        Some(ast.int("3")),
    ];
    let compound = arena.alloc(basalt::ast::Expr::Assign(arena.alloc(
        basalt::ast::AssignExpr {
            target: ast.index(ast.name("a"), ast.int("0")),
            op: basalt::ast::AssignOp::Add,
            value: ast.int("1"),
            span: basalt::Span::default(),
        },
    )));
    let stmts = [
        ast.let_stmt("a", Some(array_ty), ast.array(&elems)),
        ast.expr_stmt(compound),
    ];
    let module = ast.module(
        &[ast.array_class(), ast.function("main", &stmts)],
        &[],
    );
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let body = body_of(&result.module, "main");
    // The data-pointer header read (offset 8) happens once: the element
    // address is bound to a temporary shared by the load and the store.
    assert_eq!(
        body.count(|i| matches!(i, Instr::Load { offset: 8, .. })),
        1
    );
    assert_eq!(body.count(|i| matches!(i, Instr::Store { .. })), 1);
}

#[test]
fn logical_operators_short_circuit() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { let a: i32 = 1; let b: i32 = 2; let c: bool = a < 1 && b < 2; }
    let cmp_a = ast.binary(ast.name("a"), BinaryOp::Lt, ast.int("1"));
    let cmp_b = ast.binary(ast.name("b"), BinaryOp::Lt, ast.int("2"));
    let and = ast.binary(cmp_a, BinaryOp::And, cmp_b);
    let stmts = [
        ast.let_stmt("a", Some(ast.ty("i32")), ast.int("1")),
        ast.let_stmt("b", Some(ast.ty("i32")), ast.int("2")),
        ast.let_stmt("c", Some(ast.ty("bool")), and),
    ];
    let module = ast.module(&[ast.function("main", &stmts)], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let body = body_of(&result.module, "main");
    // && lowers to a conditional whose else-arm is the constant false.
    assert_eq!(
        body.count(|i| matches!(
            i,
            Instr::If {
                else_body: Some(e),
                ..
            } if **e == Instr::I32Const(0)
        )),
        1
    );
}

#[test]
fn duplicate_export_is_reported() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    let global = basalt::ast::Item::Global(basalt::ast::GlobalDecl {
        name: ast.ident("main"),
        ty: Some(ast.ty("i32")),
        init: Some(ast.int("0")),
        mutable: true,
        is_exported: true,
        span: basalt::Span::default(),
    });
    let module = ast.module(&[ast.function("main", &[]), global], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();

    assert!(result.diagnostics.has_errors());
    let duplicate = result
        .diagnostics
        .errors()
        .any(|d| d.message.contains("duplicate export 'main'"));
    assert!(duplicate, "{}", result.diagnostics);
}

#[test]
fn while_break_targets_composed_label() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    // fn main() { while (1) { break; } }
    let body = basalt::ast::Stmt::While(arena.alloc(basalt::ast::WhileStmt {
        condition: ast.int("1"),
        body: arena.alloc(basalt::ast::Stmt::Block(ast.block(&[ast.break_stmt()]))),
        span: basalt::Span::default(),
    }));
    let module = ast.module(&[ast.function("main", &[body])], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();
    assert!(result.is_success(), "{}", result.diagnostics);

    let body = body_of(&result.module, "main");
    assert_eq!(
        body.count(|i| matches!(
            i,
            Instr::Block {
                label: Some(l),
                ..
            } if l == "break$1"
        )),
        1
    );
    assert_eq!(
        body.count(|i| matches!(
            i,
            Instr::Br { label, condition: None } if label == "break$1"
        )),
        1
    );
    assert_eq!(
        body.count(|i| matches!(i, Instr::Loop { label, .. } if label == "continue$1")),
        1
    );
}

#[test]
fn warnings_do_not_fail_compilation() {
    let arena = Bump::new();
    let ast = Ast::new(&arena);

    let stmts = [
        ast.let_stmt("x", Some(ast.ty("i32")), ast.int("0")),
        ast.endless_for(ast.expr_stmt(ast.post_inc(ast.name("x")))),
    ];
    let module = ast.module(&[ast.function("main", &stmts)], &[]);
    let result = compile(module, CompilerOptions::default()).unwrap();

    assert!(result.is_success());
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Warning)
            .count(),
        1
    );
}
