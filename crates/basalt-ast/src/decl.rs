//! Declaration AST nodes.
//!
//! A [`Module`] is the root the front-end hands over: declarations in file
//! order plus the top-level statements that feed the synthesized start
//! routine.

use basalt_core::Span;

use crate::expr::Expr;
use crate::stmt::{Block, Stmt};
use crate::types::TypeExpr;
use crate::Ident;

/// A parsed compilation unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Module<'ast> {
    /// Declarations, in file order (load-bearing for layout and init order).
    pub items: &'ast [Item<'ast>],
    /// Top-level statements, in source order.
    pub statements: &'ast [Stmt<'ast>],
}

/// A top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Item<'ast> {
    /// Class declaration
    Class(ClassDecl<'ast>),
    /// Function declaration
    Function(FunctionDecl<'ast>),
    /// Enum declaration
    Enum(EnumDecl<'ast>),
    /// Global variable declaration
    Global(GlobalDecl<'ast>),
}

impl<'ast> Item<'ast> {
    /// Get the span of this item.
    pub fn span(&self) -> Span {
        match self {
            Self::Class(d) => d.span,
            Self::Function(d) => d.span,
            Self::Enum(d) => d.span,
            Self::Global(d) => d.span,
        }
    }
}

/// Structural attributes the front-end resolved for a class declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassAttrs {
    /// Declared in the trusted library source.
    pub is_stdlib: bool,
    /// This is the array backing class.
    pub is_array: bool,
    /// This is the string backing class.
    pub is_string: bool,
    /// Constructing an instance allocates backing storage automatically;
    /// when false the constructor manages allocation itself.
    pub implicit_malloc: bool,
    /// A library declaration stub whose implementation is patched in later.
    pub is_declare: bool,
}

/// A class declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDecl<'ast> {
    /// Class name.
    pub name: Ident<'ast>,
    /// Type parameters; non-empty makes this a generic template.
    pub type_params: &'ast [Ident<'ast>],
    /// Base class reference, possibly generic.
    pub extends: Option<TypeExpr<'ast>>,
    /// Members in declaration order (load-bearing for field offsets).
    pub members: &'ast [ClassMember<'ast>],
    /// Resolved structural attributes.
    pub attrs: ClassAttrs,
    /// Whether the class is exported.
    pub is_exported: bool,
    /// Source location.
    pub span: Span,
}

/// A class member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassMember<'ast> {
    /// Instance or static field
    Field(FieldDecl<'ast>),
    /// Method
    Method(FunctionDecl<'ast>),
    /// Property getter
    Getter(FunctionDecl<'ast>),
    /// Property setter
    Setter(FunctionDecl<'ast>),
    /// Constructor
    Constructor(FunctionDecl<'ast>),
}

/// A field declaration in a class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDecl<'ast> {
    /// Field name.
    pub name: Ident<'ast>,
    /// Field type.
    pub ty: TypeExpr<'ast>,
    /// Optional initializer.
    pub init: Option<&'ast Expr<'ast>>,
    /// Whether this is a static field (lowers to a global).
    pub is_static: bool,
    /// Source location.
    pub span: Span,
}

/// A function, method, or accessor declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionDecl<'ast> {
    /// Function name.
    pub name: Ident<'ast>,
    /// Type parameters; non-empty makes this a generic template.
    pub type_params: &'ast [Ident<'ast>],
    /// Parameters, in order.
    pub params: &'ast [Param<'ast>],
    /// Return type; `None` means void.
    pub return_type: Option<TypeExpr<'ast>>,
    /// Body; `None` for imported/declared functions.
    pub body: Option<Block<'ast>>,
    /// Whether this is a static member.
    pub is_static: bool,
    /// Declared in the trusted library source (intrinsic candidates).
    pub is_stdlib: bool,
    /// Imported from the host (no body by definition).
    pub is_import: bool,
    /// Whether the function is exported.
    pub is_exported: bool,
    /// Source location.
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    /// Parameter name.
    pub name: Ident<'ast>,
    /// Parameter type.
    pub ty: TypeExpr<'ast>,
    /// Constructor shorthand: this parameter also declares a property.
    pub is_property: bool,
    /// Source location.
    pub span: Span,
}

/// An enum declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumDecl<'ast> {
    /// Enum name.
    pub name: Ident<'ast>,
    /// Members in declaration order.
    pub members: &'ast [EnumMember<'ast>],
    /// Whether the enum is exported.
    pub is_exported: bool,
    /// Source location.
    pub span: Span,
}

/// A single enum member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumMember<'ast> {
    /// Member name.
    pub name: Ident<'ast>,
    /// Explicit initializer; `None` auto-increments from the previous member.
    pub init: Option<&'ast Expr<'ast>>,
    /// Source location.
    pub span: Span,
}

/// A global variable declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalDecl<'ast> {
    /// Variable name.
    pub name: Ident<'ast>,
    /// Declared type; `None` takes the initializer's type.
    pub ty: Option<TypeExpr<'ast>>,
    /// Optional initializer.
    pub init: Option<&'ast Expr<'ast>>,
    /// Whether the binding is mutable.
    pub mutable: bool,
    /// Whether the global is exported.
    pub is_exported: bool,
    /// Source location.
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_spans() {
        let decl = Item::Enum(EnumDecl {
            name: Ident::new("Color", Span::new(3, 6, 5)),
            members: &[],
            is_exported: false,
            span: Span::new(3, 1, 20),
        });
        assert_eq!(decl.span(), Span::new(3, 1, 20));
    }

    #[test]
    fn class_attrs_default_plain() {
        let attrs = ClassAttrs::default();
        assert!(!attrs.is_stdlib);
        assert!(!attrs.is_array);
        assert!(!attrs.implicit_malloc);
    }
}
