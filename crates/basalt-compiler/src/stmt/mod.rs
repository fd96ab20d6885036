//! Statement lowering.
//!
//! Statements lower to structured instructions. Loops and switches manage
//! the per-function break context; `break` and `continue` resolve to the
//! innermost active label pair.

mod loops;
mod switch_stmt;
mod var_decl;

use basalt_core::{DiagnosticCode, InternalError};
use basalt_ast::{self as ast, Stmt};
use basalt_module::Instr;

use crate::context::Lowerer;
use crate::conversion::maybe_convert;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower one statement.
    pub fn lower_stmt(&mut self, stmt: &'ast Stmt<'ast>) -> Result<Instr, InternalError> {
        match *stmt {
            Stmt::Expr(expr_stmt) => {
                // Statement-position assignments never need their value.
                if let ast::Expr::Assign(assign) = *expr_stmt.expr {
                    let (instr, _) = self.lower_assign(assign, false)?;
                    return Ok(instr);
                }
                let (instr, ty) = self.lower_expr(expr_stmt.expr, None)?;
                Ok(if ty.is_void() {
                    instr
                } else {
                    Instr::Drop {
                        value: Box::new(instr),
                    }
                })
            }
            Stmt::VarDecl(decl) => self.lower_var_decl(&decl),
            Stmt::Return(ret) => {
                let value = match ret.value {
                    Some(expr) => {
                        let return_ty = self.ctx.return_ty;
                        let (instr, actual) = self.lower_expr(expr, Some(return_ty))?;
                        Some(Box::new(maybe_convert(
                            self.program,
                            instr,
                            actual,
                            return_ty,
                            false,
                            self.target(),
                            self.diags,
                            ret.span,
                        )))
                    }
                    None => None,
                };
                Ok(Instr::Return { value })
            }
            Stmt::Break(brk) => {
                if !self.ctx.in_breakable() {
                    self.diags.report(
                        brk.span,
                        DiagnosticCode::UnsupportedConstruct,
                        &["'break' outside a loop or switch"],
                    );
                    return Ok(Instr::Nop);
                }
                Ok(Instr::Br {
                    label: self.ctx.break_label(),
                    condition: None,
                })
            }
            Stmt::Continue(cont) => {
                if !self.ctx.in_loop() {
                    self.diags.report(
                        cont.span,
                        DiagnosticCode::UnsupportedConstruct,
                        &["'continue' outside a loop"],
                    );
                    return Ok(Instr::Nop);
                }
                Ok(Instr::Br {
                    label: self.ctx.continue_label(),
                    condition: None,
                })
            }
            Stmt::Block(block) => self.lower_block(&block),
            Stmt::If(if_stmt) => {
                let condition = self.lower_condition(if_stmt.condition)?;
                let then_body = self.lower_stmt(if_stmt.then_branch)?;
                let else_body = match if_stmt.else_branch {
                    Some(branch) => Some(Box::new(self.lower_stmt(branch)?)),
                    None => None,
                };
                Ok(Instr::If {
                    condition: Box::new(condition),
                    then_body: Box::new(then_body),
                    else_body,
                    result: None,
                })
            }
            Stmt::While(while_stmt) => self.lower_while(while_stmt),
            Stmt::DoWhile(do_stmt) => self.lower_do_while(do_stmt),
            Stmt::For(for_stmt) => self.lower_for(for_stmt),
            Stmt::Switch(switch) => self.lower_switch(switch),
            Stmt::Empty(_) => Ok(Instr::Nop),
        }
    }

    /// Lower a statement block with its own variable scope.
    pub fn lower_block(&mut self, block: &ast::Block<'ast>) -> Result<Instr, InternalError> {
        self.ctx.push_scope();
        let mut children = Vec::with_capacity(block.stmts.len());
        for stmt in block.stmts {
            children.push(self.lower_stmt(stmt)?);
        }
        self.ctx.pop_scope();
        Ok(Instr::Block {
            label: None,
            children,
            result: None,
        })
    }
}
