//! Type expression AST nodes.

use basalt_core::Span;

use crate::Ident;

/// A type as written in source: a name plus optional type arguments and an
/// optional nullability suffix.
///
/// Examples: `i32`, `Array<u8>`, `Map<K,V>`, `String | null`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeExpr<'ast> {
    /// The type name (primitive name, class name, or type parameter).
    pub name: Ident<'ast>,
    /// Type arguments for generic references.
    pub type_args: &'ast [TypeExpr<'ast>],
    /// Whether `| null` was written.
    pub nullable: bool,
    /// Source location.
    pub span: Span,
}

impl<'ast> TypeExpr<'ast> {
    /// A plain, non-generic, non-nullable type reference.
    pub fn simple(name: Ident<'ast>) -> Self {
        Self {
            name,
            type_args: &[],
            nullable: false,
            span: name.span,
        }
    }

    /// Whether this reference carries type arguments.
    pub fn is_generic(&self) -> bool {
        !self.type_args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_reference() {
        let ty = TypeExpr::simple(Ident::new("i32", Span::new(1, 1, 3)));
        assert!(!ty.is_generic());
        assert!(!ty.nullable);
        assert_eq!(ty.name.name, "i32");
    }
}
