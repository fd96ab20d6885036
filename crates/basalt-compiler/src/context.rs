//! The lowering context.
//!
//! All per-function mutable state — the local scope, the break-context
//! stack, and temporary locals — lives in [`LoweringCtx`], threaded
//! explicitly through the expression and statement lowering calls instead
//! of being mutated on a shared singleton. [`Lowerer`] bundles the context
//! with the compilation-wide registries for the duration of one function.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use basalt_core::{ConstValue, Diagnostics, Span};
use basalt_module::{Instr, ValType};

use crate::memory::StaticAllocator;
use crate::options::CompilerOptions;
use crate::program::{ClassId, Program};
use crate::types::Ty;

/// A local variable in the current function.
#[derive(Debug, Clone)]
pub struct LocalVar {
    /// Variable name.
    pub name: String,
    /// Declared type.
    pub ty: Ty,
    /// Stack slot; unused when the variable is an inlined constant.
    pub slot: u32,
    /// Scope depth where declared.
    pub depth: u32,
    /// Whether the binding is mutable.
    pub mutable: bool,
    /// Inlined constant replacing all reads; such variables have no slot.
    pub constant: Option<ConstValue>,
    /// Declaration site.
    pub span: Span,
}

/// Per-function lowering state.
#[derive(Debug)]
pub struct LoweringCtx {
    /// The function's return type.
    pub return_ty: Ty,
    /// Owning class instance for methods (`this` is slot 0).
    pub this_class: Option<ClassId>,
    /// Type-argument bindings of the enclosing function and class.
    pub type_args: FxHashMap<String, Ty>,

    variables: FxHashMap<String, LocalVar>,
    shadowed: Vec<(u32, String, LocalVar)>,
    scope_depth: u32,
    param_count: u32,
    next_slot: u32,
    local_types: Vec<ValType>,
    free_temps: FxHashMap<ValType, Vec<u32>>,

    break_depth: u32,
    loop_depth: u32,
    next_suffix: u32,
    suffix: u32,
}

impl LoweringCtx {
    /// Create the context for one function body.
    ///
    /// `params` excludes `this`; when `this_class` is set, slot 0 carries
    /// the instance pointer and named parameters start at slot 1.
    pub fn new(
        params: &[(String, Ty)],
        this_class: Option<ClassId>,
        return_ty: Ty,
        type_args: FxHashMap<String, Ty>,
    ) -> Self {
        let mut ctx = Self {
            return_ty,
            this_class,
            type_args,
            variables: FxHashMap::default(),
            shadowed: Vec::new(),
            scope_depth: 0,
            param_count: 0,
            next_slot: 0,
            local_types: Vec::new(),
            free_temps: FxHashMap::default(),
            break_depth: 0,
            loop_depth: 0,
            next_suffix: 0,
            suffix: 0,
        };
        if this_class.is_some() {
            ctx.next_slot = 1;
        }
        for (name, ty) in params {
            let slot = ctx.next_slot;
            ctx.next_slot += 1;
            ctx.variables.insert(
                name.clone(),
                LocalVar {
                    name: name.clone(),
                    ty: *ty,
                    slot,
                    depth: 0,
                    mutable: true,
                    constant: None,
                    span: Span::default(),
                },
            );
        }
        ctx.param_count = ctx.next_slot;
        ctx
    }

    // ==========================================================================
    // Scopes and variables
    // ==========================================================================

    /// Enter a block scope.
    pub fn push_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Leave a block scope, dropping its variables and restoring shadowed
    /// ones.
    pub fn pop_scope(&mut self) {
        self.variables.retain(|_, var| var.depth < self.scope_depth);
        while let Some(&(depth, _, _)) = self.shadowed.last() {
            if depth != self.scope_depth {
                break;
            }
            let (_, name, var) = self.shadowed.pop().expect("checked non-empty");
            self.variables.insert(name, var);
        }
        self.scope_depth -= 1;
    }

    /// Declare a stored local, allocating a slot.
    pub fn declare(&mut self, name: &str, ty: Ty, mutable: bool, span: Span) -> u32 {
        let slot = self.alloc_slot(ty.val_type().unwrap_or(ValType::I32));
        self.insert_var(LocalVar {
            name: name.to_string(),
            ty,
            slot,
            depth: self.scope_depth,
            mutable,
            constant: None,
            span,
        });
        slot
    }

    /// Declare an inlined constant; no slot is allocated and every read
    /// lowers directly to the value.
    pub fn declare_const(&mut self, name: &str, ty: Ty, value: ConstValue, span: Span) {
        self.insert_var(LocalVar {
            name: name.to_string(),
            ty,
            slot: 0,
            depth: self.scope_depth,
            mutable: false,
            constant: Some(value),
            span,
        });
    }

    fn insert_var(&mut self, var: LocalVar) {
        if let Some(existing) = self.variables.get(&var.name) {
            // Shadowing: remember the outer binding for scope exit.
            self.shadowed
                .push((self.scope_depth, var.name.clone(), existing.clone()));
        }
        self.variables.insert(var.name.clone(), var);
    }

    /// Look up a local by name.
    pub fn get(&self, name: &str) -> Option<&LocalVar> {
        self.variables.get(name)
    }

    /// Allocate a raw slot of the given category.
    pub fn alloc_slot(&mut self, ty: ValType) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.local_types.push(ty);
        slot
    }

    /// Declared local categories beyond the parameters, in slot order.
    pub fn locals(&self) -> Vec<ValType> {
        self.local_types.clone()
    }

    // ==========================================================================
    // Temporaries
    // ==========================================================================

    /// Acquire a temporary local of the given category.
    pub fn temp(&mut self, ty: ValType) -> u32 {
        if let Some(slot) = self.free_temps.entry(ty).or_default().pop() {
            return slot;
        }
        self.alloc_slot(ty)
    }

    /// Return a temporary to the pool.
    pub fn release_temp(&mut self, ty: ValType, slot: u32) {
        self.free_temps.entry(ty).or_default().push(slot);
    }

    /// Materialize a value for multiple reads.
    ///
    /// Trivial values (bare local reads and constants) are duplicated as an
    /// optimization; everything else is written to a fresh temporary once
    /// and re-read, guaranteeing single evaluation of side effects. Returns
    /// the first use (which performs the store) and the re-use.
    pub fn materialize(&mut self, value: Instr, ty: ValType) -> (Instr, Instr) {
        match &value {
            Instr::LocalGet { .. }
            | Instr::I32Const(_)
            | Instr::I64Const(_)
            | Instr::F32Const(_)
            | Instr::F64Const(_) => {
                let reuse = value.clone();
                (value, reuse)
            }
            _ => {
                let slot = self.temp(ty);
                (
                    Instr::LocalTee {
                        index: slot,
                        value: Box::new(value),
                        ty,
                    },
                    Instr::LocalGet { index: slot, ty },
                )
            }
        }
    }

    // ==========================================================================
    // Break context
    // ==========================================================================

    /// Enter a loop; allocates the label suffix when entering from depth 0.
    pub fn enter_loop(&mut self) -> u32 {
        self.loop_depth += 1;
        self.enter_breakable()
    }

    /// Leave a loop.
    pub fn exit_loop(&mut self) {
        self.loop_depth -= 1;
        self.exit_breakable();
    }

    /// Enter a switch (breakable, not continuable).
    pub fn enter_switch(&mut self) -> u32 {
        self.enter_breakable()
    }

    /// Leave a switch.
    pub fn exit_switch(&mut self) {
        self.exit_breakable();
    }

    fn enter_breakable(&mut self) -> u32 {
        self.break_depth += 1;
        if self.break_depth == 1 {
            self.next_suffix += 1;
            self.suffix = self.next_suffix;
        }
        self.suffix
    }

    fn exit_breakable(&mut self) {
        self.break_depth -= 1;
    }

    /// Whether a `break` has a target.
    pub fn in_breakable(&self) -> bool {
        self.break_depth > 0
    }

    /// Whether a `continue` has a target.
    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    /// The innermost break label.
    pub fn break_label(&self) -> String {
        format!("break${}", self.suffix)
    }

    /// The innermost continue label.
    pub fn continue_label(&self) -> String {
        format!("continue${}", self.suffix)
    }

    /// The internal restart label for loops whose continue point is not the
    /// loop head.
    pub fn loop_label(&self) -> String {
        format!("loop${}", self.suffix)
    }
}

/// Everything expression and statement lowering needs for one function.
pub struct Lowerer<'a, 'ast> {
    /// The program registries.
    pub program: &'a mut Program<'ast>,
    /// The static memory allocator.
    pub alloc: &'a mut StaticAllocator,
    /// The diagnostics collection.
    pub diags: &'a mut Diagnostics,
    /// Compiler options.
    pub options: &'a CompilerOptions,
    /// Runtime support routines referenced so far.
    pub runtime_used: &'a mut FxHashSet<String>,
    /// The per-function state.
    pub ctx: LoweringCtx,
}
