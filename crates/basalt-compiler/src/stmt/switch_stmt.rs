//! Switch lowering.
//!
//! The discriminant is evaluated exactly once into a temporary. A
//! priority-ordered chain of equality tests (first declared case wins)
//! computes a zero-based case index, which drives a branch table into
//! nested fallthrough blocks built innermost-case-first: later cases'
//! statements naturally fall through unless a `break` exits the construct.
//!
//! ```text
//! block break$n {                 ; also the no-default target
//!   block case1$n {
//!     block case0$n {
//!       t = discriminant
//!       br_table [case0$n case1$n] break$n (index-chain over t)
//!     }
//!     case 0 statements           ; falls into case 1
//!   }
//!   case 1 statements
//! }
//! ```

use basalt_core::InternalError;
use basalt_ast as ast;
use basalt_module::{Instr, ValType};

use crate::context::Lowerer;
use crate::conversion::maybe_convert;

impl<'a, 'ast> Lowerer<'a, 'ast> {
    /// Lower a switch statement.
    pub(crate) fn lower_switch(
        &mut self,
        switch: &'ast ast::SwitchStmt<'ast>,
    ) -> Result<Instr, InternalError> {
        let (disc, disc_ty) = self.lower_expr(switch.discriminant, None)?;

        // No clauses at all: the discriminant still runs for its effects.
        if switch.cases.is_empty() {
            return Ok(if disc_ty.is_void() {
                disc
            } else {
                Instr::Drop {
                    value: Box::new(disc),
                }
            });
        }

        let suffix = self.ctx.enter_switch();
        let break_label = self.ctx.break_label();
        let vt = disc_ty.val_type().unwrap_or(ValType::I32);
        let temp = self.ctx.temp(vt);

        // Case index: a chain of "is this case's value equal" selections,
        // most specific (first declared) case decided first. Out-of-chain
        // values land on the default clause's index, or past the end.
        let default_index = switch
            .cases
            .iter()
            .position(|case| case.is_default())
            .unwrap_or(switch.cases.len());
        let mut index = Instr::I32Const(default_index as i32);
        for (i, case) in switch.cases.iter().enumerate().rev() {
            let Some(test) = case.test else { continue };
            let (test_instr, test_ty) = self.lower_expr(test, Some(disc_ty))?;
            let test_instr = maybe_convert(
                self.program,
                test_instr,
                test_ty,
                disc_ty,
                false,
                self.target(),
                self.diags,
                test.span(),
            );
            let equal = Instr::Binary {
                op: crate::expr::eq_op(disc_ty),
                left: Box::new(Instr::LocalGet { index: temp, ty: vt }),
                right: Box::new(test_instr),
            };
            index = Instr::Select {
                condition: Box::new(equal),
                if_true: Box::new(Instr::I32Const(i as i32)),
                if_false: Box::new(index),
                ty: ValType::I32,
            };
        }

        let case_label = |i: usize| format!("case{i}${suffix}");
        let labels: Vec<String> = (0..switch.cases.len()).map(case_label).collect();
        let dispatch = Instr::BrTable {
            labels,
            default: break_label.clone(),
            index: Box::new(index),
        };

        // Innermost-first nesting; each close is followed by that case's
        // statements so execution falls through into the next case.
        let mut inner = Instr::Block {
            label: Some(case_label(0)),
            children: vec![
                Instr::LocalSet {
                    index: temp,
                    value: Box::new(disc),
                },
                dispatch,
            ],
            result: None,
        };
        self.ctx.push_scope();
        for (i, case) in switch.cases.iter().enumerate() {
            let mut children = vec![inner];
            for stmt in case.stmts {
                children.push(self.lower_stmt(stmt)?);
            }
            let label = if i + 1 < switch.cases.len() {
                case_label(i + 1)
            } else {
                break_label.clone()
            };
            inner = Instr::Block {
                label: Some(label),
                children,
                result: None,
            };
        }
        self.ctx.pop_scope();

        self.ctx.release_temp(vt, temp);
        self.ctx.exit_switch();
        Ok(inner)
    }
}
