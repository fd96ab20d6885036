//! Program registries.
//!
//! Templates are created once per declaration during the initialization
//! pass; classes and functions are template instances created on demand and
//! cached for the compilation's lifetime. Instances live in `Vec` arenas
//! addressed by newtype ids, so identity comparison is id equality — the
//! template engine guarantees one instance per mangled name.
//!
//! Inherited members are never copied: a lookup that misses on a derived
//! instance's own dictionary falls back to its base instance, so a late
//! patch to a base remains visible to derived instances that have not
//! overridden the same key.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use basalt_core::{ConstValue, InternalError, Span};
use basalt_ast as ast;

use crate::types::Ty;

/// Index of a class instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Index of a class template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassTemplateId(pub u32);

/// Index of a function instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Index of a function template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionTemplateId(pub u32);

/// Index of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

bitflags! {
    /// Structural flags on a class instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassFlags: u8 {
        /// The array backing class.
        const ARRAY = 1 << 0;
        /// The string backing class.
        const STRING = 1 << 1;
        /// Constructing allocates backing storage automatically.
        const IMPLICIT_MALLOC = 1 << 2;
        /// A library declaration stub awaiting its implementation.
        const DECLARE = 1 << 3;
        /// Declared in the trusted library source.
        const STDLIB = 1 << 4;
    }
}

bitflags! {
    /// Status flags on a function instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FnFlags: u8 {
        /// Imported from the host.
        const IMPORT = 1 << 0;
        /// Declared in the trusted library source.
        const STDLIB = 1 << 1;
        /// A static member.
        const STATIC = 1 << 2;
        /// Externally exported.
        const EXPORTED = 1 << 3;
        /// Body lowering has completed.
        const COMPILED = 1 << 4;
    }
}

/// What role a function template plays on its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A free function.
    Free,
    /// An instance or static method.
    Method,
    /// A property getter.
    Getter,
    /// A property setter.
    Setter,
    /// A constructor.
    Constructor,
}

/// One class declaration; owns its uninstantiated members via the AST.
#[derive(Debug)]
pub struct ClassTemplate<'ast> {
    /// Declared name.
    pub name: String,
    /// The declaration node (members in declaration order).
    pub decl: ast::ClassDecl<'ast>,
    /// Redirected base after patching, overriding `decl.extends`.
    pub base_override: Option<ClassTemplateId>,
    /// Instance cache keyed by mangled-name hash.
    pub instances: FxHashMap<u64, ClassId>,
}

impl ClassTemplate<'_> {
    /// Whether this template declares type parameters.
    pub fn is_generic(&self) -> bool {
        !self.decl.type_params.is_empty()
    }
}

/// A resolved property.
#[derive(Debug, Clone)]
pub struct Property<'ast> {
    /// Property name.
    pub name: String,
    /// Declared type, resolved against the instance's type arguments.
    pub ty: Ty,
    /// Byte offset within the owning class.
    pub offset: u32,
    /// Optional initializer expression.
    pub init: Option<&'ast ast::Expr<'ast>>,
    /// Static properties lower to globals instead of field accesses.
    pub is_static: bool,
}

/// A class template instance with computed memory layout.
#[derive(Debug)]
pub struct Class<'ast> {
    /// Mangled display name (`Base<T1,T2>` shape for generics).
    pub name: String,
    /// The owning template.
    pub template: ClassTemplateId,
    /// Concrete type-argument bindings.
    pub type_args: FxHashMap<String, Ty>,
    /// Base instance; member lookups fall back here on miss.
    pub base: Option<ClassId>,
    /// Own properties by name (inherited ones live on the base).
    pub properties: FxHashMap<String, Property<'ast>>,
    /// Own property declaration order.
    pub prop_order: Vec<String>,
    /// Own resolved methods.
    pub methods: FxHashMap<String, FunctionId>,
    /// Own resolved getters.
    pub getters: FxHashMap<String, FunctionId>,
    /// Own resolved setters.
    pub setters: FxHashMap<String, FunctionId>,
    /// Own constructor, if declared.
    pub constructor: Option<FunctionId>,
    /// Cumulative byte size including inherited fields.
    pub size: u32,
    /// Structural flags.
    pub flags: ClassFlags,
    /// The self-referential pointer type, interned before members resolve.
    pub ty: Ty,
}

/// One function declaration.
#[derive(Debug)]
pub struct FunctionTemplate<'ast> {
    /// Qualified name (`name` or `Class.name`).
    pub name: String,
    /// The declaration node.
    pub decl: ast::FunctionDecl<'ast>,
    /// Owning class template for members.
    pub owner: Option<ClassTemplateId>,
    /// Member role.
    pub kind: MemberKind,
    /// Instance cache keyed by mangled-name hash.
    pub instances: FxHashMap<u64, FunctionId>,
}

impl FunctionTemplate<'_> {
    /// Whether this template declares type parameters.
    pub fn is_generic(&self) -> bool {
        !self.decl.type_params.is_empty()
    }
}

/// A function template instance.
#[derive(Debug)]
pub struct Function<'ast> {
    /// Mangled, module-unique name.
    pub name: String,
    /// The owning template.
    pub template: FunctionTemplateId,
    /// Owning class instance for methods.
    pub owner: Option<ClassId>,
    /// Parameters (name, resolved type), excluding `this`.
    pub params: Vec<(String, Ty)>,
    /// Resolved return type.
    pub return_ty: Ty,
    /// Type-argument bindings, including the owner's.
    pub type_args: FxHashMap<String, Ty>,
    /// The body, if the declaration has one.
    pub body: Option<ast::Block<'ast>>,
    /// Status flags.
    pub flags: FnFlags,
    /// Declaration site.
    pub span: Span,
}

impl Function<'_> {
    /// Whether this function has a compilable body.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Whether this is an instance member (takes `this`).
    pub fn is_instance(&self) -> bool {
        self.owner.is_some() && !self.flags.contains(FnFlags::STATIC)
    }
}

/// A global (or inlined constant) variable.
#[derive(Debug)]
pub struct Variable<'ast> {
    /// Variable name.
    pub name: String,
    /// Resolved type.
    pub ty: Ty,
    /// Whether the binding is mutable.
    pub mutable: bool,
    /// Inlined constant replacing all reads; storage is elided when set.
    pub constant: Option<ConstValue>,
    /// Deferred initializer for stored globals.
    pub init: Option<&'ast ast::Expr<'ast>>,
    /// Whether the global is exported.
    pub exported: bool,
    /// Declaration site.
    pub span: Span,
}

/// A name-to-integer-constant enum.
#[derive(Debug)]
pub struct EnumDef {
    /// Enum name.
    pub name: String,
    /// Members in declaration order.
    pub values: Vec<(String, i32)>,
    /// Member lookup.
    pub index: FxHashMap<String, i32>,
    /// Whether the enum is exported.
    pub exported: bool,
}

impl EnumDef {
    /// Constant value of a member.
    pub fn value_of(&self, member: &str) -> Option<i32> {
        self.index.get(member).copied()
    }
}

/// All registries for one compilation.
#[derive(Debug, Default)]
pub struct Program<'ast> {
    /// Class templates in declaration order.
    pub class_templates: Vec<ClassTemplate<'ast>>,
    class_template_index: FxHashMap<String, ClassTemplateId>,
    /// Class instances in creation order.
    pub classes: Vec<Class<'ast>>,
    /// Function templates in declaration order.
    pub function_templates: Vec<FunctionTemplate<'ast>>,
    function_template_index: FxHashMap<String, FunctionTemplateId>,
    /// Function instances in creation order.
    pub functions: Vec<Function<'ast>>,
    /// Global variables in declaration order.
    pub globals: Vec<Variable<'ast>>,
    global_index: FxHashMap<String, GlobalId>,
    /// Enums in declaration order.
    pub enums: Vec<EnumDef>,
    enum_index: FxHashMap<String, usize>,
    /// Live instantiation depth, bounded against runaway recursion.
    pub instantiation_depth: u32,
    sealed: bool,
}

impl<'ast> Program<'ast> {
    /// Create empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Sealing
    // ==========================================================================

    /// Mark the start of the lowering pass; template patching is rejected
    /// from here on.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether lowering has begun.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ==========================================================================
    // Templates
    // ==========================================================================

    /// Register a class template.
    ///
    /// Registering a second template under an existing name is fatal unless
    /// the existing one is a library declaration stub, in which case the
    /// caller is expected to patch it.
    pub fn register_class_template(
        &mut self,
        decl: ast::ClassDecl<'ast>,
    ) -> Result<ClassTemplateId, InternalError> {
        let name = decl.name.name.to_string();
        if self.class_template_index.contains_key(&name) {
            return Err(InternalError::DuplicateTemplate { name });
        }
        let id = ClassTemplateId(self.class_templates.len() as u32);
        self.class_templates.push(ClassTemplate {
            name: name.clone(),
            decl,
            base_override: None,
            instances: FxHashMap::default(),
        });
        self.class_template_index.insert(name, id);
        Ok(id)
    }

    /// Register a class template under an alternate name (used when an
    /// implementation replaces a declaration stub).
    pub fn register_class_template_as(
        &mut self,
        decl: ast::ClassDecl<'ast>,
        name: String,
    ) -> ClassTemplateId {
        let id = ClassTemplateId(self.class_templates.len() as u32);
        self.class_templates.push(ClassTemplate {
            name: name.clone(),
            decl,
            base_override: None,
            instances: FxHashMap::default(),
        });
        self.class_template_index.insert(name, id);
        id
    }

    /// Look up a class template by name.
    pub fn find_class_template(&self, name: &str) -> Option<ClassTemplateId> {
        self.class_template_index.get(name).copied()
    }

    /// Register a function template.
    pub fn register_function_template(
        &mut self,
        name: String,
        decl: ast::FunctionDecl<'ast>,
        owner: Option<ClassTemplateId>,
        kind: MemberKind,
    ) -> Result<FunctionTemplateId, InternalError> {
        if self.function_template_index.contains_key(&name) {
            return Err(InternalError::DuplicateTemplate { name });
        }
        let id = FunctionTemplateId(self.function_templates.len() as u32);
        self.function_templates.push(FunctionTemplate {
            name: name.clone(),
            decl,
            owner,
            kind,
            instances: FxHashMap::default(),
        });
        self.function_template_index.insert(name, id);
        Ok(id)
    }

    /// Look up a function template by qualified name.
    pub fn find_function_template(&self, name: &str) -> Option<FunctionTemplateId> {
        self.function_template_index.get(name).copied()
    }

    // ==========================================================================
    // Instances
    // ==========================================================================

    /// A class instance by id.
    pub fn class(&self, id: ClassId) -> &Class<'ast> {
        &self.classes[id.0 as usize]
    }

    /// A mutable class instance by id.
    pub fn class_mut(&mut self, id: ClassId) -> &mut Class<'ast> {
        &mut self.classes[id.0 as usize]
    }

    /// A function instance by id.
    pub fn function(&self, id: FunctionId) -> &Function<'ast> {
        &self.functions[id.0 as usize]
    }

    /// A mutable function instance by id.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function<'ast> {
        &mut self.functions[id.0 as usize]
    }

    // ==========================================================================
    // Fallback-chained member lookup
    // ==========================================================================

    /// Find a property, deferring to the base instance on miss.
    pub fn lookup_property(&self, mut class: ClassId, name: &str) -> Option<&Property<'ast>> {
        loop {
            let c = self.class(class);
            if let Some(prop) = c.properties.get(name) {
                return Some(prop);
            }
            class = c.base?;
        }
    }

    /// Find a method, deferring to the base instance on miss.
    pub fn lookup_method(&self, mut class: ClassId, name: &str) -> Option<FunctionId> {
        loop {
            let c = self.class(class);
            if let Some(&method) = c.methods.get(name) {
                return Some(method);
            }
            class = c.base?;
        }
    }

    /// Find a getter, deferring to the base instance on miss.
    pub fn lookup_getter(&self, mut class: ClassId, name: &str) -> Option<FunctionId> {
        loop {
            let c = self.class(class);
            if let Some(&getter) = c.getters.get(name) {
                return Some(getter);
            }
            class = c.base?;
        }
    }

    /// Find a setter, deferring to the base instance on miss.
    pub fn lookup_setter(&self, mut class: ClassId, name: &str) -> Option<FunctionId> {
        loop {
            let c = self.class(class);
            if let Some(&setter) = c.setters.get(name) {
                return Some(setter);
            }
            class = c.base?;
        }
    }

    /// Walk the base chain for the nearest constructor with a body.
    pub fn find_constructor(&self, mut class: ClassId) -> Option<FunctionId> {
        loop {
            let c = self.class(class);
            if let Some(ctor) = c.constructor
                && self.function(ctor).has_body()
            {
                return Some(ctor);
            }
            class = c.base?;
        }
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn derives_from(&self, mut class: ClassId, ancestor: ClassId) -> bool {
        loop {
            if class == ancestor {
                return true;
            }
            match self.class(class).base {
                Some(base) => class = base,
                None => return false,
            }
        }
    }

    /// Element type of an array- or string-backed class instance.
    pub fn element_type(&self, class: ClassId) -> Option<Ty> {
        let c = self.class(class);
        if c.flags.contains(ClassFlags::STRING) {
            return Some(Ty::U16);
        }
        if !c.flags.contains(ClassFlags::ARRAY) {
            return c.base.and_then(|b| self.element_type(b));
        }
        let template = &self.class_templates[c.template.0 as usize];
        let first = template.decl.type_params.first()?;
        c.type_args.get(first.name).copied()
    }

    // ==========================================================================
    // Globals and enums
    // ==========================================================================

    /// Register a global variable.
    pub fn register_global(&mut self, var: Variable<'ast>) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.global_index.insert(var.name.clone(), id);
        self.globals.push(var);
        id
    }

    /// Look up a global by name.
    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    /// A global by id.
    pub fn global(&self, id: GlobalId) -> &Variable<'ast> {
        &self.globals[id.0 as usize]
    }

    /// Register an enum.
    pub fn register_enum(&mut self, def: EnumDef) {
        self.enum_index.insert(def.name.clone(), self.enums.len());
        self.enums.push(def);
    }

    /// Look up an enum by name.
    pub fn find_enum(&self, name: &str) -> Option<&EnumDef> {
        self.enum_index.get(name).map(|&i| &self.enums[i])
    }

    // ==========================================================================
    // Display
    // ==========================================================================

    /// Display name of a type, naming the class for class-backed pointers.
    pub fn type_name(&self, ty: Ty) -> String {
        match ty.class {
            Some(class) => {
                let name = &self.class(class).name;
                if ty.nullable {
                    format!("{name} | null")
                } else {
                    name.clone()
                }
            }
            None => ty.prim_name().to_string(),
        }
    }
}
