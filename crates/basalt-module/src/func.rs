//! Function signatures and bodies.

use crate::{Instr, ValType};

/// An interned function-type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigId(pub u32);

/// A function type: parameter categories plus an optional result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncSig {
    /// Parameter categories, in order.
    pub params: Vec<ValType>,
    /// Result category; `None` for void.
    pub result: Option<ValType>,
}

impl FuncSig {
    /// Create a new signature.
    pub fn new(params: Vec<ValType>, result: Option<ValType>) -> Self {
        Self { params, result }
    }
}

/// A compiled function registered with the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    /// Module-unique name.
    pub name: String,
    /// Interned signature.
    pub sig: SigId,
    /// Declared locals beyond the parameters.
    pub locals: Vec<ValType>,
    /// The body tree.
    pub body: Instr,
}

/// An imported function.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncImport {
    /// Module-unique name used at call sites.
    pub name: String,
    /// Import namespace.
    pub module: String,
    /// Import field name.
    pub field: String,
    /// Interned signature.
    pub sig: SigId,
}

/// A module global.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    /// Module-unique name.
    pub name: String,
    /// Value category.
    pub ty: ValType,
    /// Whether the global is mutable.
    pub mutable: bool,
    /// Constant initializer.
    pub init: Instr,
}

/// What an export points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A function export.
    Function,
    /// A global export.
    Global,
    /// The linear memory.
    Memory,
}

/// A module export.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    /// Externally visible name.
    pub name: String,
    /// What kind of item is exported.
    pub kind: ExportKind,
    /// The internal name of the exported item.
    pub target: String,
}

/// A static data segment placed in linear memory before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    /// Byte offset in linear memory.
    pub offset: u32,
    /// The segment contents, never mutated after creation.
    pub bytes: Vec<u8>,
}
