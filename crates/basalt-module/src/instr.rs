//! The structured instruction tree.
//!
//! The compiler's output is a tree of [`Instr`] nodes per function: a
//! stack-machine instruction set with structured control flow (blocks,
//! loops, labeled branches, a multi-way branch table) over four numeric
//! value categories. Arithmetic is split per category the way the target
//! splits it; a downstream encoder flattens the tree into the final module
//! format.

use crate::ValType;

/// Unary operations, grouped by operand category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    // =========================================================================
    // Integer bit counting (i32)
    // =========================================================================
    /// Count leading zeros of an i32.
    ClzI32,
    /// Count trailing zeros of an i32.
    CtzI32,
    /// Count set bits of an i32.
    PopcntI32,
    /// Compare an i32 against zero, producing i32 0/1.
    EqzI32,

    // =========================================================================
    // Integer bit counting (i64)
    // =========================================================================
    /// Count leading zeros of an i64.
    ClzI64,
    /// Count trailing zeros of an i64.
    CtzI64,
    /// Count set bits of an i64.
    PopcntI64,
    /// Compare an i64 against zero, producing i32 0/1.
    EqzI64,

    // =========================================================================
    // Float math (f32)
    // =========================================================================
    /// Absolute value of an f32.
    AbsF32,
    /// Negation of an f32.
    NegF32,
    /// Round an f32 up to an integer.
    CeilF32,
    /// Round an f32 down to an integer.
    FloorF32,
    /// Round an f32 toward zero.
    TruncF32,
    /// Round an f32 to the nearest integer, ties to even.
    NearestF32,
    /// Square root of an f32.
    SqrtF32,

    // =========================================================================
    // Float math (f64)
    // =========================================================================
    /// Absolute value of an f64.
    AbsF64,
    /// Negation of an f64.
    NegF64,
    /// Round an f64 up to an integer.
    CeilF64,
    /// Round an f64 down to an integer.
    FloorF64,
    /// Round an f64 toward zero.
    TruncF64,
    /// Round an f64 to the nearest integer, ties to even.
    NearestF64,
    /// Square root of an f64.
    SqrtF64,

    // =========================================================================
    // Integer width conversions
    // =========================================================================
    /// Wrap an i64 to i32 (discard high bits).
    WrapI64,
    /// Sign-extend an i32 to i64.
    ExtendI32S,
    /// Zero-extend an i32 to i64.
    ExtendI32U,

    // =========================================================================
    // Float-to-integer truncation
    // =========================================================================
    /// Truncate an f32 to signed i32.
    TruncF32ToI32S,
    /// Truncate an f32 to unsigned i32.
    TruncF32ToI32U,
    /// Truncate an f32 to signed i64.
    TruncF32ToI64S,
    /// Truncate an f32 to unsigned i64.
    TruncF32ToI64U,
    /// Truncate an f64 to signed i32.
    TruncF64ToI32S,
    /// Truncate an f64 to unsigned i32.
    TruncF64ToI32U,
    /// Truncate an f64 to signed i64.
    TruncF64ToI64S,
    /// Truncate an f64 to unsigned i64.
    TruncF64ToI64U,

    // =========================================================================
    // Integer-to-float conversion
    // =========================================================================
    /// Convert a signed i32 to f32.
    ConvertI32SToF32,
    /// Convert an unsigned i32 to f32.
    ConvertI32UToF32,
    /// Convert a signed i64 to f32.
    ConvertI64SToF32,
    /// Convert an unsigned i64 to f32.
    ConvertI64UToF32,
    /// Convert a signed i32 to f64.
    ConvertI32SToF64,
    /// Convert an unsigned i32 to f64.
    ConvertI32UToF64,
    /// Convert a signed i64 to f64.
    ConvertI64SToF64,
    /// Convert an unsigned i64 to f64.
    ConvertI64UToF64,

    // =========================================================================
    // Float width conversions
    // =========================================================================
    /// Promote an f32 to f64.
    PromoteF32,
    /// Demote an f64 to f32.
    DemoteF64,

    // =========================================================================
    // Raw reinterpretation (same width)
    // =========================================================================
    /// Reinterpret f32 bits as i32.
    ReinterpretF32,
    /// Reinterpret f64 bits as i64.
    ReinterpretF64,
    /// Reinterpret i32 bits as f32.
    ReinterpretI32,
    /// Reinterpret i64 bits as f64.
    ReinterpretI64,
}

impl UnOp {
    /// The value category this operation produces.
    pub fn result_ty(self) -> ValType {
        use UnOp::*;
        match self {
            ClzI32 | CtzI32 | PopcntI32 | EqzI32 | EqzI64 | WrapI64 | TruncF32ToI32S
            | TruncF32ToI32U | TruncF64ToI32S | TruncF64ToI32U | ReinterpretF32 => ValType::I32,
            ClzI64 | CtzI64 | PopcntI64 | ExtendI32S | ExtendI32U | TruncF32ToI64S
            | TruncF32ToI64U | TruncF64ToI64S | TruncF64ToI64U | ReinterpretF64 => ValType::I64,
            AbsF32 | NegF32 | CeilF32 | FloorF32 | TruncF32 | NearestF32 | SqrtF32
            | ConvertI32SToF32 | ConvertI32UToF32 | ConvertI64SToF32 | ConvertI64UToF32
            | DemoteF64 | ReinterpretI32 => ValType::F32,
            AbsF64 | NegF64 | CeilF64 | FloorF64 | TruncF64 | NearestF64 | SqrtF64
            | ConvertI32SToF64 | ConvertI32UToF64 | ConvertI64SToF64 | ConvertI64UToF64
            | PromoteF32 | ReinterpretI64 => ValType::F64,
        }
    }
}

/// Binary operations, grouped by operand category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // =========================================================================
    // Arithmetic (i32)
    // =========================================================================
    /// Add two i32 values.
    AddI32,
    /// Subtract two i32 values.
    SubI32,
    /// Multiply two i32 values.
    MulI32,
    /// Signed i32 division.
    DivSI32,
    /// Unsigned i32 division.
    DivUI32,
    /// Signed i32 remainder.
    RemSI32,
    /// Unsigned i32 remainder.
    RemUI32,
    /// Bitwise AND of two i32 values.
    AndI32,
    /// Bitwise OR of two i32 values.
    OrI32,
    /// Bitwise XOR of two i32 values.
    XorI32,
    /// Shift an i32 left.
    ShlI32,
    /// Arithmetic shift an i32 right.
    ShrSI32,
    /// Logical shift an i32 right.
    ShrUI32,
    /// Rotate an i32 left.
    RotlI32,
    /// Rotate an i32 right.
    RotrI32,

    // =========================================================================
    // Arithmetic (i64)
    // =========================================================================
    /// Add two i64 values.
    AddI64,
    /// Subtract two i64 values.
    SubI64,
    /// Multiply two i64 values.
    MulI64,
    /// Signed i64 division.
    DivSI64,
    /// Unsigned i64 division.
    DivUI64,
    /// Signed i64 remainder.
    RemSI64,
    /// Unsigned i64 remainder.
    RemUI64,
    /// Bitwise AND of two i64 values.
    AndI64,
    /// Bitwise OR of two i64 values.
    OrI64,
    /// Bitwise XOR of two i64 values.
    XorI64,
    /// Shift an i64 left.
    ShlI64,
    /// Arithmetic shift an i64 right.
    ShrSI64,
    /// Logical shift an i64 right.
    ShrUI64,
    /// Rotate an i64 left.
    RotlI64,
    /// Rotate an i64 right.
    RotrI64,

    // =========================================================================
    // Arithmetic (f32)
    // =========================================================================
    /// Add two f32 values.
    AddF32,
    /// Subtract two f32 values.
    SubF32,
    /// Multiply two f32 values.
    MulF32,
    /// Divide two f32 values.
    DivF32,
    /// Minimum of two f32 values.
    MinF32,
    /// Maximum of two f32 values.
    MaxF32,
    /// Copy the sign of one f32 onto another.
    CopysignF32,

    // =========================================================================
    // Arithmetic (f64)
    // =========================================================================
    /// Add two f64 values.
    AddF64,
    /// Subtract two f64 values.
    SubF64,
    /// Multiply two f64 values.
    MulF64,
    /// Divide two f64 values.
    DivF64,
    /// Minimum of two f64 values.
    MinF64,
    /// Maximum of two f64 values.
    MaxF64,
    /// Copy the sign of one f64 onto another.
    CopysignF64,

    // =========================================================================
    // Comparison (i32)
    // =========================================================================
    /// i32 equality.
    EqI32,
    /// i32 inequality.
    NeI32,
    /// Signed i32 less-than.
    LtSI32,
    /// Unsigned i32 less-than.
    LtUI32,
    /// Signed i32 less-or-equal.
    LeSI32,
    /// Unsigned i32 less-or-equal.
    LeUI32,
    /// Signed i32 greater-than.
    GtSI32,
    /// Unsigned i32 greater-than.
    GtUI32,
    /// Signed i32 greater-or-equal.
    GeSI32,
    /// Unsigned i32 greater-or-equal.
    GeUI32,

    // =========================================================================
    // Comparison (i64)
    // =========================================================================
    /// i64 equality.
    EqI64,
    /// i64 inequality.
    NeI64,
    /// Signed i64 less-than.
    LtSI64,
    /// Unsigned i64 less-than.
    LtUI64,
    /// Signed i64 less-or-equal.
    LeSI64,
    /// Unsigned i64 less-or-equal.
    LeUI64,
    /// Signed i64 greater-than.
    GtSI64,
    /// Unsigned i64 greater-than.
    GtUI64,
    /// Signed i64 greater-or-equal.
    GeSI64,
    /// Unsigned i64 greater-or-equal.
    GeUI64,

    // =========================================================================
    // Comparison (f32)
    // =========================================================================
    /// f32 equality.
    EqF32,
    /// f32 inequality.
    NeF32,
    /// f32 less-than.
    LtF32,
    /// f32 less-or-equal.
    LeF32,
    /// f32 greater-than.
    GtF32,
    /// f32 greater-or-equal.
    GeF32,

    // =========================================================================
    // Comparison (f64)
    // =========================================================================
    /// f64 equality.
    EqF64,
    /// f64 inequality.
    NeF64,
    /// f64 less-than.
    LtF64,
    /// f64 less-or-equal.
    LeF64,
    /// f64 greater-than.
    GtF64,
    /// f64 greater-or-equal.
    GeF64,
}

impl BinOp {
    /// Whether this operation produces an i32 boolean result.
    pub fn is_comparison(self) -> bool {
        use BinOp::*;
        matches!(
            self,
            EqI32 | NeI32
                | LtSI32
                | LtUI32
                | LeSI32
                | LeUI32
                | GtSI32
                | GtUI32
                | GeSI32
                | GeUI32
                | EqI64
                | NeI64
                | LtSI64
                | LtUI64
                | LeSI64
                | LeUI64
                | GtSI64
                | GtUI64
                | GeSI64
                | GeUI64
                | EqF32
                | NeF32
                | LtF32
                | LeF32
                | GtF32
                | GeF32
                | EqF64
                | NeF64
                | LtF64
                | LeF64
                | GtF64
                | GeF64
        )
    }

    /// The value category this operation produces.
    pub fn result_ty(self) -> ValType {
        use BinOp::*;
        if self.is_comparison() {
            return ValType::I32;
        }
        match self {
            AddI32 | SubI32 | MulI32 | DivSI32 | DivUI32 | RemSI32 | RemUI32 | AndI32 | OrI32
            | XorI32 | ShlI32 | ShrSI32 | ShrUI32 | RotlI32 | RotrI32 => ValType::I32,
            AddI64 | SubI64 | MulI64 | DivSI64 | DivUI64 | RemSI64 | RemUI64 | AndI64 | OrI64
            | XorI64 | ShlI64 | ShrSI64 | ShrUI64 | RotlI64 | RotrI64 => ValType::I64,
            AddF32 | SubF32 | MulF32 | DivF32 | MinF32 | MaxF32 | CopysignF32 => ValType::F32,
            AddF64 | SubF64 | MulF64 | DivF64 | MinF64 | MaxF64 | CopysignF64 => ValType::F64,
            _ => unreachable!("comparison handled above"),
        }
    }
}

/// A structured instruction.
///
/// Control flow is label-based: [`Instr::Br`] and [`Instr::BrTable`] name
/// the enclosing [`Instr::Block`] or [`Instr::Loop`] they target. Branching
/// to a block exits it; branching to a loop restarts it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Do nothing.
    Nop,
    /// Trap unconditionally.
    Unreachable,

    // =========================================================================
    // Constants
    // =========================================================================
    /// Push an i32 constant.
    I32Const(i32),
    /// Push an i64 constant.
    I64Const(i64),
    /// Push an f32 constant.
    F32Const(f32),
    /// Push an f64 constant.
    F64Const(f64),

    // =========================================================================
    // Locals and globals
    // =========================================================================
    /// Read a local.
    LocalGet {
        /// Local index (params first, then declared locals).
        index: u32,
        /// The local's category.
        ty: ValType,
    },
    /// Write a local, consuming the value.
    LocalSet {
        /// Local index.
        index: u32,
        /// The stored value.
        value: Box<Instr>,
    },
    /// Write a local and keep the value on the stack.
    LocalTee {
        /// Local index.
        index: u32,
        /// The stored value.
        value: Box<Instr>,
        /// The local's category.
        ty: ValType,
    },
    /// Read a global by name.
    GlobalGet {
        /// Global name.
        name: String,
        /// The global's category.
        ty: ValType,
    },
    /// Write a global by name.
    GlobalSet {
        /// Global name.
        name: String,
        /// The stored value.
        value: Box<Instr>,
    },

    // =========================================================================
    // Linear memory
    // =========================================================================
    /// Load from linear memory at `ptr + offset`.
    Load {
        /// Access width in bytes (1, 2, 4, or 8).
        bytes: u8,
        /// Sign-extend sub-width integer loads.
        signed: bool,
        /// Constant byte offset added to the address.
        offset: u32,
        /// Address operand.
        ptr: Box<Instr>,
        /// The loaded value's category.
        ty: ValType,
    },
    /// Store to linear memory at `ptr + offset`.
    Store {
        /// Access width in bytes (1, 2, 4, or 8).
        bytes: u8,
        /// Constant byte offset added to the address.
        offset: u32,
        /// Address operand.
        ptr: Box<Instr>,
        /// The stored value.
        value: Box<Instr>,
    },
    /// Current linear-memory size in pages.
    MemorySize,
    /// Grow linear memory by a page delta, returning the old size or -1.
    MemoryGrow {
        /// Number of pages to add.
        delta: Box<Instr>,
    },

    // =========================================================================
    // Operations
    // =========================================================================
    /// A unary operation.
    Unary {
        /// The operation.
        op: UnOp,
        /// The operand.
        value: Box<Instr>,
    },
    /// A binary operation.
    Binary {
        /// The operation.
        op: BinOp,
        /// Left operand.
        left: Box<Instr>,
        /// Right operand.
        right: Box<Instr>,
    },
    /// Choose between two values without branching.
    Select {
        /// i32 condition (nonzero selects `if_true`).
        condition: Box<Instr>,
        /// Value when nonzero.
        if_true: Box<Instr>,
        /// Value when zero.
        if_false: Box<Instr>,
        /// The result category.
        ty: ValType,
    },
    /// Evaluate a value for its side effects and discard it.
    Drop {
        /// The discarded value.
        value: Box<Instr>,
    },

    // =========================================================================
    // Control flow
    // =========================================================================
    /// A sequence of instructions; branching to its label exits it.
    Block {
        /// Branch-target label, if any branch names this block.
        label: Option<String>,
        /// The instructions, in order.
        children: Vec<Instr>,
        /// Result category when the block yields a value.
        result: Option<ValType>,
    },
    /// A loop; branching to its label restarts the body.
    Loop {
        /// Branch-target label.
        label: String,
        /// The loop body.
        body: Box<Instr>,
    },
    /// A two-way conditional.
    If {
        /// i32 condition.
        condition: Box<Instr>,
        /// Taken when nonzero.
        then_body: Box<Instr>,
        /// Taken when zero.
        else_body: Option<Box<Instr>>,
        /// Result category when both arms yield a value.
        result: Option<ValType>,
    },
    /// Branch to a label, optionally conditional.
    Br {
        /// The target label.
        label: String,
        /// Branch only when this i32 is nonzero.
        condition: Option<Box<Instr>>,
    },
    /// Multi-way branch: `labels[index]`, or `default` when out of range.
    BrTable {
        /// In-range targets, by index.
        labels: Vec<String>,
        /// Out-of-range target.
        default: String,
        /// The zero-based index operand.
        index: Box<Instr>,
    },
    /// Call a function by name.
    Call {
        /// The callee's module-unique name.
        target: String,
        /// Arguments, in order.
        operands: Vec<Instr>,
        /// The callee's result category.
        result: Option<ValType>,
    },
    /// Return from the current function.
    Return {
        /// Optional return value.
        value: Option<Box<Instr>>,
    },
}

impl Instr {
    /// Shorthand for a constant of the given category holding an i64 payload.
    pub fn const_int(ty: ValType, value: i64) -> Instr {
        match ty {
            ValType::I32 => Instr::I32Const(value as i32),
            ValType::I64 => Instr::I64Const(value),
            ValType::F32 => Instr::F32Const(value as f32),
            ValType::F64 => Instr::F64Const(value as f64),
        }
    }

    /// The zero value of a category.
    pub fn zero(ty: ValType) -> Instr {
        Instr::const_int(ty, 0)
    }

    /// Whether this instruction is a bare constant.
    pub fn is_const(&self) -> bool {
        matches!(
            self,
            Instr::I32Const(_) | Instr::I64Const(_) | Instr::F32Const(_) | Instr::F64Const(_)
        )
    }

    /// Visit this instruction and every descendant, pre-order.
    pub fn for_each(&self, f: &mut impl FnMut(&Instr)) {
        f(self);
        match self {
            Instr::LocalSet { value, .. }
            | Instr::LocalTee { value, .. }
            | Instr::GlobalSet { value, .. }
            | Instr::Unary { value, .. }
            | Instr::Drop { value }
            | Instr::MemoryGrow { delta: value } => value.for_each(f),
            Instr::Load { ptr, .. } => ptr.for_each(f),
            Instr::Store { ptr, value, .. } => {
                ptr.for_each(f);
                value.for_each(f);
            }
            Instr::Binary { left, right, .. } => {
                left.for_each(f);
                right.for_each(f);
            }
            Instr::Select {
                condition,
                if_true,
                if_false,
                ..
            } => {
                condition.for_each(f);
                if_true.for_each(f);
                if_false.for_each(f);
            }
            Instr::Block { children, .. } => {
                for child in children {
                    child.for_each(f);
                }
            }
            Instr::Loop { body, .. } => body.for_each(f),
            Instr::If {
                condition,
                then_body,
                else_body,
                ..
            } => {
                condition.for_each(f);
                then_body.for_each(f);
                if let Some(else_body) = else_body {
                    else_body.for_each(f);
                }
            }
            Instr::Br { condition, .. } => {
                if let Some(condition) = condition {
                    condition.for_each(f);
                }
            }
            Instr::BrTable { index, .. } => index.for_each(f),
            Instr::Call { operands, .. } => {
                for operand in operands {
                    operand.for_each(f);
                }
            }
            Instr::Return { value } => {
                if let Some(value) = value {
                    value.for_each(f);
                }
            }
            _ => {}
        }
    }

    /// Count descendants (including self) matching a predicate.
    pub fn count(&self, pred: impl Fn(&Instr) -> bool) -> usize {
        let mut n = 0;
        self.for_each(&mut |instr| {
            if pred(instr) {
                n += 1;
            }
        });
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unop_result_types() {
        assert_eq!(UnOp::ClzI32.result_ty(), ValType::I32);
        assert_eq!(UnOp::ExtendI32S.result_ty(), ValType::I64);
        assert_eq!(UnOp::DemoteF64.result_ty(), ValType::F32);
        assert_eq!(UnOp::PromoteF32.result_ty(), ValType::F64);
        assert_eq!(UnOp::ReinterpretF64.result_ty(), ValType::I64);
    }

    #[test]
    fn binop_result_types() {
        assert_eq!(BinOp::AddI64.result_ty(), ValType::I64);
        assert_eq!(BinOp::CopysignF64.result_ty(), ValType::F64);
        // Comparisons always produce i32 booleans.
        assert_eq!(BinOp::LtF64.result_ty(), ValType::I32);
        assert!(BinOp::EqI64.is_comparison());
        assert!(!BinOp::RotlI32.is_comparison());
    }

    #[test]
    fn const_helpers() {
        assert_eq!(Instr::zero(ValType::I32), Instr::I32Const(0));
        assert_eq!(Instr::const_int(ValType::I64, 7), Instr::I64Const(7));
        assert!(Instr::zero(ValType::F64).is_const());
    }
}
