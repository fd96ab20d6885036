//! Loop lowering.
//!
//! Every loop form lowers to a labeled loop wrapped in a labeled block:
//! `break` branches to the block, `continue` to its own target. Pre-checked
//! loops test before the body; `do` tests after. Loops whose continue point
//! is not the loop head (`do`, `for` with an update) restart through an
//! internal label so `continue` cannot skip the update or re-run the body.

use basalt_core::{DiagnosticCode, InternalError};
use basalt_ast as ast;
use basalt_module::{Instr, UnOp};

use crate::context::Lowerer;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower a while loop.
    ///
    /// ```text
    /// block break$n {
    ///   loop continue$n {
    ///     br_if break$n (!cond)
    ///     body
    ///     br continue$n
    ///   }
    /// }
    /// ```
    pub(crate) fn lower_while(
        &mut self,
        stmt: &'ast ast::WhileStmt<'ast>,
    ) -> Result<Instr, InternalError> {
        self.ctx.enter_loop();
        let break_label = self.ctx.break_label();
        let continue_label = self.ctx.continue_label();

        let condition = self.lower_condition(stmt.condition)?;
        let exit = Instr::Br {
            label: break_label.clone(),
            condition: Some(Box::new(Instr::Unary {
                op: UnOp::EqzI32,
                value: Box::new(condition),
            })),
        };
        let body = self.lower_stmt(stmt.body)?;
        let repeat = Instr::Br {
            label: continue_label.clone(),
            condition: None,
        };

        self.ctx.exit_loop();
        Ok(Instr::Block {
            label: Some(break_label),
            children: vec![Instr::Loop {
                label: continue_label,
                body: Box::new(Instr::Block {
                    label: None,
                    children: vec![exit, body, repeat],
                    result: None,
                }),
            }],
            result: None,
        })
    }

    /// Lower a do-while loop.
    ///
    /// ```text
    /// block break$n {
    ///   loop loop$n {
    ///     block continue$n { body }
    ///     br_if loop$n (cond)
    ///   }
    /// }
    /// ```
    pub(crate) fn lower_do_while(
        &mut self,
        stmt: &'ast ast::DoWhileStmt<'ast>,
    ) -> Result<Instr, InternalError> {
        self.ctx.enter_loop();
        let break_label = self.ctx.break_label();
        let continue_label = self.ctx.continue_label();
        let loop_label = self.ctx.loop_label();

        let body = self.lower_stmt(stmt.body)?;
        let condition = self.lower_condition(stmt.condition)?;
        let repeat = Instr::Br {
            label: loop_label.clone(),
            condition: Some(Box::new(condition)),
        };

        self.ctx.exit_loop();
        Ok(Instr::Block {
            label: Some(break_label),
            children: vec![Instr::Loop {
                label: loop_label,
                body: Box::new(Instr::Block {
                    label: None,
                    children: vec![
                        Instr::Block {
                            label: Some(continue_label),
                            children: vec![body],
                            result: None,
                        },
                        repeat,
                    ],
                    result: None,
                }),
            }],
            result: None,
        })
    }

    /// Lower a for loop.
    ///
    /// ```text
    /// block break$n {
    ///   init
    ///   loop loop$n {
    ///     br_if break$n (!cond)        ; when a condition exists
    ///     block continue$n { body }
    ///     update
    ///     br loop$n
    ///   }
    /// }
    /// ```
    pub(crate) fn lower_for(
        &mut self,
        stmt: &'ast ast::ForStmt<'ast>,
    ) -> Result<Instr, InternalError> {
        // The initializer's declarations scope over the whole loop.
        self.ctx.push_scope();
        let init = match stmt.init {
            Some(init) => Some(self.lower_stmt(init)?),
            None => None,
        };

        self.ctx.enter_loop();
        let break_label = self.ctx.break_label();
        let continue_label = self.ctx.continue_label();
        let loop_label = self.ctx.loop_label();

        if stmt.condition.is_none() && !stmt.body.terminates() {
            self.diags
                .report(stmt.span, DiagnosticCode::UnconditionalLoop, &[]);
        }

        let mut children = Vec::new();
        if let Some(condition) = stmt.condition {
            let condition = self.lower_condition(condition)?;
            children.push(Instr::Br {
                label: break_label.clone(),
                condition: Some(Box::new(Instr::Unary {
                    op: UnOp::EqzI32,
                    value: Box::new(condition),
                })),
            });
        }
        let body = self.lower_stmt(stmt.body)?;
        children.push(Instr::Block {
            label: Some(continue_label),
            children: vec![body],
            result: None,
        });
        if let Some(update) = stmt.update {
            let (instr, ty) = self.lower_expr(update, None)?;
            children.push(if ty.is_void() {
                instr
            } else {
                Instr::Drop {
                    value: Box::new(instr),
                }
            });
        }
        children.push(Instr::Br {
            label: loop_label.clone(),
            condition: None,
        });

        self.ctx.exit_loop();
        self.ctx.pop_scope();

        let mut outer = Vec::new();
        if let Some(init) = init {
            outer.push(init);
        }
        outer.push(Instr::Loop {
            label: loop_label,
            body: Box::new(Instr::Block {
                label: None,
                children,
                result: None,
            }),
        });
        Ok(Instr::Block {
            label: Some(break_label),
            children: outer,
            result: None,
        })
    }
}
