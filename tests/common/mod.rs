//! Arena-backed AST construction helpers for the integration tests.
//!
//! The front-end is external to basalt, so tests play its role: they build
//! symbol-resolved trees directly in a `Bump` arena and hand them to the
//! compiler.

use bumpalo::Bump;

use basalt::ast::{
    ArrayLitExpr, AssignExpr, AssignOp, Block, ClassAttrs, ClassDecl, ClassMember, Expr,
    FieldDecl, ForStmt, FunctionDecl, GlobalDecl, Ident, IdentExpr, IndexExpr, Item,
    LiteralExpr, LiteralKind, Module, PostfixExpr, PostfixOp, Stmt, SwitchCase, SwitchStmt,
    TypeExpr, VarDeclStmt,
};
use basalt::Span;

/// AST factory over an arena.
pub struct Ast<'a> {
    pub arena: &'a Bump,
}

#[allow(dead_code)]
impl<'a> Ast<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self { arena }
    }

    pub fn ident(&self, name: &str) -> Ident<'a> {
        Ident::new(self.arena.alloc_str(name), Span::default())
    }

    pub fn ty(&self, name: &str) -> TypeExpr<'a> {
        TypeExpr::simple(self.ident(name))
    }

    pub fn generic_ty(&self, name: &str, args: &[TypeExpr<'a>]) -> TypeExpr<'a> {
        TypeExpr {
            name: self.ident(name),
            type_args: self.arena.alloc_slice_copy(args),
            nullable: false,
            span: Span::default(),
        }
    }

    pub fn int(&self, text: &str) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Literal(LiteralExpr {
            kind: LiteralKind::Int(self.arena.alloc_str(text)),
            span: Span::default(),
        }))
    }

    pub fn float(&self, text: &str) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Literal(LiteralExpr {
            kind: LiteralKind::Float(self.arena.alloc_str(text)),
            span: Span::default(),
        }))
    }

    pub fn str_lit(&self, text: &str) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Literal(LiteralExpr {
            kind: LiteralKind::Str(self.arena.alloc_str(text)),
            span: Span::default(),
        }))
    }

    pub fn name(&self, name: &str) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Ident(IdentExpr {
            ident: self.ident(name),
            type_args: &[],
            span: Span::default(),
        }))
    }

    pub fn array(&self, elements: &[Option<&'a Expr<'a>>]) -> &'a Expr<'a> {
        self.arena.alloc(Expr::ArrayLit(ArrayLitExpr {
            elements: self.arena.alloc_slice_copy(elements),
            span: Span::default(),
        }))
    }

    pub fn index(&self, base: &'a Expr<'a>, idx: &'a Expr<'a>) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Index(self.arena.alloc(IndexExpr {
            base,
            index: idx,
            span: Span::default(),
        })))
    }

    pub fn binary(
        &self,
        left: &'a Expr<'a>,
        op: basalt::ast::BinaryOp,
        right: &'a Expr<'a>,
    ) -> &'a Expr<'a> {
        self.arena
            .alloc(Expr::Binary(self.arena.alloc(basalt::ast::BinaryExpr {
                left,
                op,
                right,
                span: Span::default(),
            })))
    }

    pub fn assign(&self, target: &'a Expr<'a>, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.arena
            .alloc(Expr::Assign(self.arena.alloc(AssignExpr {
                target,
                op: AssignOp::Assign,
                value,
                span: Span::default(),
            })))
    }

    pub fn post_inc(&self, operand: &'a Expr<'a>) -> &'a Expr<'a> {
        self.arena
            .alloc(Expr::Postfix(self.arena.alloc(PostfixExpr {
                operand,
                op: PostfixOp::Inc,
                span: Span::default(),
            })))
    }

    pub fn call(&self, callee: &'a Expr<'a>, args: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        self.arena.alloc(Expr::Call(self.arena.alloc(basalt::ast::CallExpr {
            callee,
            type_args: &[],
            args: self.arena.alloc_slice_copy(args),
            span: Span::default(),
        })))
    }

    pub fn expr_stmt(&self, expr: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::Expr(basalt::ast::ExprStmt {
            expr,
            span: Span::default(),
        })
    }

    pub fn let_stmt(&self, name: &str, ty: Option<TypeExpr<'a>>, init: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::VarDecl(VarDeclStmt {
            name: self.ident(name),
            ty,
            init: Some(init),
            mutable: true,
            span: Span::default(),
        })
    }

    pub fn const_stmt(
        &self,
        name: &str,
        ty: Option<TypeExpr<'a>>,
        init: &'a Expr<'a>,
    ) -> Stmt<'a> {
        Stmt::VarDecl(VarDeclStmt {
            name: self.ident(name),
            ty,
            init: Some(init),
            mutable: false,
            span: Span::default(),
        })
    }

    pub fn ret(&self, value: Option<&'a Expr<'a>>) -> Stmt<'a> {
        Stmt::Return(basalt::ast::ReturnStmt {
            value,
            span: Span::default(),
        })
    }

    pub fn block(&self, stmts: &[Stmt<'a>]) -> Block<'a> {
        Block {
            stmts: self.arena.alloc_slice_copy(stmts),
            span: Span::default(),
        }
    }

    pub fn endless_for(&self, body: Stmt<'a>) -> Stmt<'a> {
        Stmt::For(self.arena.alloc(ForStmt {
            init: None,
            condition: None,
            update: None,
            body: self.arena.alloc(body),
            span: Span::default(),
        }))
    }

    pub fn switch(&self, discriminant: &'a Expr<'a>, cases: &[SwitchCase<'a>]) -> Stmt<'a> {
        Stmt::Switch(self.arena.alloc(SwitchStmt {
            discriminant,
            cases: self.arena.alloc_slice_copy(cases),
            span: Span::default(),
        }))
    }

    pub fn case(&self, test: Option<&'a Expr<'a>>, stmts: &[Stmt<'a>]) -> SwitchCase<'a> {
        SwitchCase {
            test,
            stmts: self.arena.alloc_slice_copy(stmts),
            span: Span::default(),
        }
    }

    pub fn break_stmt(&self) -> Stmt<'a> {
        Stmt::Break(basalt::ast::BreakStmt {
            span: Span::default(),
        })
    }

    /// A plain exported function with a body.
    pub fn function(&self, name: &str, body: &[Stmt<'a>]) -> Item<'a> {
        Item::Function(FunctionDecl {
            name: self.ident(name),
            type_params: &[],
            params: &[],
            return_type: None,
            body: Some(self.block(body)),
            is_static: false,
            is_stdlib: false,
            is_import: false,
            is_exported: true,
            span: Span::default(),
        })
    }

    /// A stdlib-flagged bodyless function (intrinsic carrier).
    pub fn stdlib_function(
        &self,
        name: &str,
        params: &[(&str, TypeExpr<'a>)],
        return_type: Option<TypeExpr<'a>>,
    ) -> Item<'a> {
        let params: Vec<basalt::ast::Param<'a>> = params
            .iter()
            .map(|(name, ty)| basalt::ast::Param {
                name: self.ident(name),
                ty: *ty,
                is_property: false,
                span: Span::default(),
            })
            .collect();
        Item::Function(FunctionDecl {
            name: self.ident(name),
            type_params: &[],
            params: self.arena.alloc_slice_copy(&params),
            return_type,
            body: None,
            is_static: false,
            is_stdlib: true,
            is_import: false,
            is_exported: false,
            span: Span::default(),
        })
    }

    /// The minimal trusted-library `Array<T>` declaration.
    pub fn array_class(&self) -> Item<'a> {
        let type_params = self.arena.alloc_slice_copy(&[self.ident("T")]);
        Item::Class(ClassDecl {
            name: self.ident("Array"),
            type_params,
            extends: None,
            members: &[],
            attrs: ClassAttrs {
                is_stdlib: true,
                is_array: true,
                is_string: false,
                implicit_malloc: true,
                is_declare: false,
            },
            is_exported: false,
            span: Span::default(),
        })
    }

    /// The minimal trusted-library `String` declaration.
    pub fn string_class(&self) -> Item<'a> {
        Item::Class(ClassDecl {
            name: self.ident("String"),
            type_params: &[],
            extends: None,
            members: &[],
            attrs: ClassAttrs {
                is_stdlib: true,
                is_array: false,
                is_string: true,
                implicit_malloc: true,
                is_declare: false,
            },
            is_exported: false,
            span: Span::default(),
        })
    }

    pub fn field(&self, name: &str, ty: TypeExpr<'a>) -> ClassMember<'a> {
        ClassMember::Field(FieldDecl {
            name: self.ident(name),
            ty,
            init: None,
            is_static: false,
            span: Span::default(),
        })
    }

    pub fn class(
        &self,
        name: &str,
        type_params: &[&str],
        members: &[ClassMember<'a>],
    ) -> Item<'a> {
        let type_params: Vec<Ident<'a>> =
            type_params.iter().map(|p| self.ident(p)).collect();
        Item::Class(ClassDecl {
            name: self.ident(name),
            type_params: self.arena.alloc_slice_copy(&type_params),
            extends: None,
            members: self.arena.alloc_slice_copy(members),
            attrs: ClassAttrs::default(),
            is_exported: false,
            span: Span::default(),
        })
    }

    pub fn global(
        &self,
        name: &str,
        ty: Option<TypeExpr<'a>>,
        init: &'a Expr<'a>,
        mutable: bool,
    ) -> Item<'a> {
        Item::Global(GlobalDecl {
            name: self.ident(name),
            ty,
            init: Some(init),
            mutable,
            is_exported: false,
            span: Span::default(),
        })
    }

    pub fn module(&self, items: &[Item<'a>], statements: &[Stmt<'a>]) -> &'a Module<'a> {
        self.arena.alloc(Module {
            items: self.arena.alloc_slice_copy(items),
            statements: self.arena.alloc_slice_copy(statements),
        })
    }
}
