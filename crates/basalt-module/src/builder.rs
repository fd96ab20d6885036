//! The module builder.
//!
//! [`ModuleBuilder`] is the injected boundary the compiler emits through:
//! function/import/export/global/data-segment registration plus
//! function-type interning. [`ModuleBuilder::finish`] assembles the final
//! [`Module`], computing the initial linear-memory size from the highest
//! static offset rounded up to page granularity.

use rustc_hash::FxHashMap;

use basalt_core::pages_for;

use crate::func::{
    DataSegment, Export, ExportKind, FuncDef, FuncImport, FuncSig, GlobalDef, SigId,
};
use crate::{Instr, ValType};

/// An assembled module.
#[derive(Debug, Default)]
pub struct Module {
    /// Interned function types, indexed by [`SigId`].
    pub sigs: Vec<FuncSig>,
    /// Imported functions.
    pub imports: Vec<FuncImport>,
    /// Compiled functions.
    pub functions: Vec<FuncDef>,
    /// Module globals.
    pub globals: Vec<GlobalDef>,
    /// Exports.
    pub exports: Vec<Export>,
    /// Static data segments, in allocation order.
    pub segments: Vec<DataSegment>,
    /// Initial linear-memory size in pages.
    pub memory_pages: u32,
    /// Name of the start function, run once at module load.
    pub start: Option<String>,
}

impl Module {
    /// Look up a compiled function by name.
    pub fn function(&self, name: &str) -> Option<&FuncDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<&GlobalDef> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Look up an export by its external name.
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }
}

/// Collects module pieces during compilation.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    sigs: Vec<FuncSig>,
    sig_index: FxHashMap<FuncSig, SigId>,
    imports: Vec<FuncImport>,
    functions: Vec<FuncDef>,
    function_index: FxHashMap<String, usize>,
    globals: Vec<GlobalDef>,
    global_index: FxHashMap<String, usize>,
    exports: Vec<Export>,
    export_index: FxHashMap<String, usize>,
    segments: Vec<DataSegment>,
    static_size: u32,
    start: Option<String>,
}

impl ModuleBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a function type, returning a stable id.
    ///
    /// Structurally equal signatures share one id.
    pub fn intern_sig(&mut self, params: Vec<ValType>, result: Option<ValType>) -> SigId {
        let sig = FuncSig::new(params, result);
        if let Some(&id) = self.sig_index.get(&sig) {
            return id;
        }
        let id = SigId(self.sigs.len() as u32);
        self.sigs.push(sig.clone());
        self.sig_index.insert(sig, id);
        id
    }

    /// Register a compiled function. Re-registering a name replaces the body.
    pub fn add_function(&mut self, name: &str, sig: SigId, locals: Vec<ValType>, body: Instr) {
        let def = FuncDef {
            name: name.to_string(),
            sig,
            locals,
            body,
        };
        if let Some(&i) = self.function_index.get(name) {
            self.functions[i] = def;
        } else {
            self.function_index.insert(name.to_string(), self.functions.len());
            self.functions.push(def);
        }
    }

    /// Register an imported function.
    pub fn add_function_import(&mut self, name: &str, module: &str, field: &str, sig: SigId) {
        self.imports.push(FuncImport {
            name: name.to_string(),
            module: module.to_string(),
            field: field.to_string(),
            sig,
        });
    }

    /// Register a global.
    pub fn add_global(&mut self, name: &str, ty: ValType, mutable: bool, init: Instr) {
        let def = GlobalDef {
            name: name.to_string(),
            ty,
            mutable,
            init,
        };
        if let Some(&i) = self.global_index.get(name) {
            self.globals[i] = def;
        } else {
            self.global_index.insert(name.to_string(), self.globals.len());
            self.globals.push(def);
        }
    }

    /// Register an export.
    ///
    /// Returns `false` when the external name is already taken; the caller
    /// reports the duplicate as a user diagnostic.
    pub fn add_export(&mut self, name: &str, kind: ExportKind, target: &str) -> bool {
        if self.export_index.contains_key(name) {
            return false;
        }
        self.export_index.insert(name.to_string(), self.exports.len());
        self.exports.push(Export {
            name: name.to_string(),
            kind,
            target: target.to_string(),
        });
        true
    }

    /// Append a static data segment.
    pub fn add_data_segment(&mut self, offset: u32, bytes: Vec<u8>) {
        let end = offset + bytes.len() as u32;
        if end > self.static_size {
            self.static_size = end;
        }
        self.segments.push(DataSegment { offset, bytes });
    }

    /// Raise the static-memory high-water mark without adding a segment.
    pub fn reserve_static(&mut self, end: u32) {
        if end > self.static_size {
            self.static_size = end;
        }
    }

    /// Set the start function, run once at module load.
    pub fn set_start(&mut self, name: &str) {
        self.start = Some(name.to_string());
    }

    /// Whether a function with this name has been registered.
    pub fn has_function(&self, name: &str) -> bool {
        self.function_index.contains_key(name) || self.imports.iter().any(|i| i.name == name)
    }

    /// Assemble the final module.
    pub fn finish(self) -> Module {
        Module {
            sigs: self.sigs,
            imports: self.imports,
            functions: self.functions,
            globals: self.globals,
            exports: self.exports,
            segments: self.segments,
            memory_pages: pages_for(self.static_size).max(1),
            start: self.start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sig_interning_dedups() {
        let mut builder = ModuleBuilder::new();
        let a = builder.intern_sig(vec![ValType::I32], Some(ValType::I32));
        let b = builder.intern_sig(vec![ValType::I32], Some(ValType::I32));
        let c = builder.intern_sig(vec![ValType::I64], Some(ValType::I32));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn duplicate_export_rejected() {
        let mut builder = ModuleBuilder::new();
        assert!(builder.add_export("main", ExportKind::Function, "main"));
        assert!(!builder.add_export("main", ExportKind::Function, "other"));
    }

    #[test]
    fn memory_pages_from_static_size() {
        let mut builder = ModuleBuilder::new();
        builder.add_data_segment(8, vec![0u8; 16]);
        let module = builder.finish();
        assert_eq!(module.memory_pages, 1);

        let mut builder = ModuleBuilder::new();
        builder.add_data_segment(0x10000, vec![1, 2, 3]);
        let module = builder.finish();
        assert_eq!(module.memory_pages, 2);
    }

    #[test]
    fn empty_module_still_has_one_page() {
        let module = ModuleBuilder::new().finish();
        assert_eq!(module.memory_pages, 1);
    }

    #[test]
    fn function_replacement_keeps_index() {
        let mut builder = ModuleBuilder::new();
        let sig = builder.intern_sig(vec![], None);
        builder.add_function("f", sig, vec![], Instr::Nop);
        builder.add_function("f", sig, vec![], Instr::Unreachable);

        let module = builder.finish();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.function("f").unwrap().body, Instr::Unreachable);
    }
}
