//! The literal parser.
//!
//! Turns literal tokens into exact target-typed [`ConstValue`]s, driven by
//! the contextual type. Failure is a `None` return ("not parseable"), never
//! a panic: the caller decides whether that is a diagnostic or a fallback
//! to the runtime path.
//!
//! Each integer target applies its own truncation policy on out-of-range
//! text: unsigned widths mask, signed widths sign-extend through a shift
//! pair. Negation is applied before masking when the literal was written
//! with a unary minus.

use basalt_core::ConstValue;
use basalt_ast::{Expr, LiteralKind, UnaryOp};

use crate::types::{Ty, TypeKind};

/// Parse a literal token against a contextual type.
///
/// `negative` is true when the literal was written under a unary minus; the
/// sign is folded into the constant here so truncation sees the signed
/// value.
pub fn parse_literal(kind: &LiteralKind<'_>, negative: bool, ty: Ty) -> Option<ConstValue> {
    match *kind {
        LiteralKind::Int(text) => parse_int(text, negative, ty),
        LiteralKind::Float(text) => parse_float(text, negative, ty),
        LiteralKind::Bool(value) => {
            if negative || !ty.is_bool() {
                return None;
            }
            Some(ConstValue::I32(i32::from(value)))
        }
        LiteralKind::Str(text) => {
            if negative || !ty.is_reference() {
                return None;
            }
            Some(ConstValue::Str(text.to_string()))
        }
        LiteralKind::Null => {
            if negative || !ty.is_reference() {
                return None;
            }
            Some(ConstValue::Null)
        }
    }
}

/// Parse integer text (base 10 or `0x` base 16) into an unsigned magnitude.
fn parse_int_text(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u64>().ok()
    }
}

fn parse_int(text: &str, negative: bool, ty: Ty) -> Option<ConstValue> {
    // Float contexts accept integer text.
    if ty.is_any_float() {
        return parse_float(text, negative, ty);
    }

    let magnitude = parse_int_text(text)?;
    let value = if negative {
        (magnitude as i64).wrapping_neg()
    } else {
        magnitude as i64
    };

    match ty.kind {
        TypeKind::Bool => match (value, negative) {
            (0, false) => Some(ConstValue::I32(0)),
            (1, false) => Some(ConstValue::I32(1)),
            _ => None,
        },
        TypeKind::I8 => Some(ConstValue::I32(((value as i32) << 24) >> 24)),
        TypeKind::U8 => Some(ConstValue::I32((value & 0xff) as i32)),
        TypeKind::I16 => Some(ConstValue::I32(((value as i32) << 16) >> 16)),
        TypeKind::U16 => Some(ConstValue::I32((value & 0xffff) as i32)),
        TypeKind::I32 | TypeKind::U32 => Some(ConstValue::I32(value as i32)),
        TypeKind::I64 | TypeKind::U64 => Some(ConstValue::I64(value)),
        TypeKind::Ptr => {
            if ty.size == 8 {
                Some(ConstValue::I64(value))
            } else {
                Some(ConstValue::I32(value as i32))
            }
        }
        _ => None,
    }
}

fn parse_float(text: &str, negative: bool, ty: Ty) -> Option<ConstValue> {
    let mut value = text.parse::<f64>().ok()?;
    if negative {
        value = -value;
    }
    match ty.kind {
        TypeKind::F32 => Some(ConstValue::F32(value as f32)),
        TypeKind::F64 => Some(ConstValue::F64(value)),
        _ => None,
    }
}

/// Constant-evaluate an expression against a contextual type.
///
/// Only literals, parenthesized literals, and unary plus/minus over them
/// qualify; anything else returns `None` and takes the runtime path.
pub fn const_eval(expr: &Expr<'_>, ty: Ty) -> Option<ConstValue> {
    const_eval_signed(expr, false, ty)
}

fn const_eval_signed(expr: &Expr<'_>, negative: bool, ty: Ty) -> Option<ConstValue> {
    match expr {
        Expr::Literal(lit) => parse_literal(&lit.kind, negative, ty),
        Expr::Paren(paren) => const_eval_signed(paren.expr, negative, ty),
        Expr::Unary(unary) => match unary.op {
            UnaryOp::Neg => const_eval_signed(unary.operand, !negative, ty),
            UnaryOp::Plus => const_eval_signed(unary.operand, negative, ty),
            _ => None,
        },
        _ => None,
    }
}

/// Parse an array literal's elements against the array's element type.
///
/// Omitted elements take the element type's zero/null value; a single
/// unparseable element fails the whole array.
pub fn parse_array_literal(
    elements: &[Option<&Expr<'_>>],
    elem_ty: Ty,
) -> Option<ConstValue> {
    let mut values = Vec::with_capacity(elements.len());
    for element in elements.iter().copied() {
        match element {
            Some(expr) => values.push(const_eval(expr, elem_ty)?),
            None => values.push(zero_value(elem_ty)),
        }
    }
    Some(ConstValue::Array(values))
}

/// The default type a bare literal takes with no annotation.
pub fn literal_default_ty(expr: &Expr<'_>) -> Option<Ty> {
    match expr {
        Expr::Literal(lit) => Some(match lit.kind {
            LiteralKind::Int(_) => Ty::I32,
            LiteralKind::Float(_) => Ty::F64,
            LiteralKind::Bool(_) => Ty::BOOL,
            _ => return None,
        }),
        Expr::Paren(paren) => literal_default_ty(paren.expr),
        Expr::Unary(unary) if matches!(unary.op, UnaryOp::Neg | UnaryOp::Plus) => {
            literal_default_ty(unary.operand)
        }
        _ => None,
    }
}

/// The zero/null constant of a type.
pub fn zero_value(ty: Ty) -> ConstValue {
    match ty.kind {
        TypeKind::F32 => ConstValue::F32(0.0),
        TypeKind::F64 => ConstValue::F64(0.0),
        TypeKind::I64 | TypeKind::U64 => ConstValue::I64(0),
        TypeKind::Ptr if ty.class.is_some() => ConstValue::Null,
        TypeKind::Ptr if ty.size == 8 => ConstValue::I64(0),
        _ => ConstValue::I32(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_ast::LiteralExpr;
    use basalt_core::Span;

    fn int_lit(text: &str) -> LiteralKind<'_> {
        LiteralKind::Int(text)
    }

    #[test]
    fn decimal_and_hex_forms() {
        assert_eq!(parse_literal(&int_lit("42"), false, Ty::I32), Some(ConstValue::I32(42)));
        assert_eq!(
            parse_literal(&int_lit("0xff"), false, Ty::I32),
            Some(ConstValue::I32(255))
        );
        assert_eq!(
            parse_literal(&int_lit("0X10"), false, Ty::U32),
            Some(ConstValue::I32(16))
        );
        assert_eq!(parse_literal(&int_lit("12abc"), false, Ty::I32), None);
    }

    #[test]
    fn u8_masks_out_of_range() {
        assert_eq!(parse_literal(&int_lit("300"), false, Ty::U8), Some(ConstValue::I32(44)));
        assert_eq!(parse_literal(&int_lit("255"), false, Ty::U8), Some(ConstValue::I32(255)));
        // Negation applies before the mask.
        assert_eq!(parse_literal(&int_lit("1"), true, Ty::U8), Some(ConstValue::I32(255)));
    }

    #[test]
    fn i8_sign_extends_via_shift_pair() {
        for n in 0..=255i64 {
            let text = n.to_string();
            let got = parse_literal(&int_lit(&text), false, Ty::I8).unwrap();
            let expected = ((n as i32) << 24) >> 24;
            assert_eq!(got, ConstValue::I32(expected), "text {text}");
        }
        for n in 1..=128i64 {
            let text = n.to_string();
            let got = parse_literal(&int_lit(&text), true, Ty::I8).unwrap();
            let expected = ((-(n as i32)) << 24) >> 24;
            assert_eq!(got, ConstValue::I32(expected), "text -{text}");
        }
    }

    #[test]
    fn sixteen_bit_policies() {
        assert_eq!(
            parse_literal(&int_lit("0x1ffff"), false, Ty::U16),
            Some(ConstValue::I32(0xffff))
        );
        assert_eq!(
            parse_literal(&int_lit("0x8000"), false, Ty::I16),
            Some(ConstValue::I32(-32768))
        );
    }

    #[test]
    fn long_targets_keep_64_bits() {
        assert_eq!(
            parse_literal(&int_lit("0xffffffffffffffff"), false, Ty::U64),
            Some(ConstValue::I64(-1))
        );
        assert_eq!(
            parse_literal(&int_lit("5000000000"), false, Ty::I64),
            Some(ConstValue::I64(5_000_000_000))
        );
    }

    #[test]
    fn pointer_width_selects_lane() {
        assert_eq!(parse_literal(&int_lit("8"), false, Ty::ptr(4)), Some(ConstValue::I32(8)));
        assert_eq!(parse_literal(&int_lit("8"), false, Ty::ptr(8)), Some(ConstValue::I64(8)));
    }

    #[test]
    fn bool_text_forms() {
        assert_eq!(parse_literal(&int_lit("0"), false, Ty::BOOL), Some(ConstValue::I32(0)));
        assert_eq!(parse_literal(&int_lit("1"), false, Ty::BOOL), Some(ConstValue::I32(1)));
        assert_eq!(parse_literal(&int_lit("2"), false, Ty::BOOL), None);
        assert_eq!(
            parse_literal(&LiteralKind::Bool(true), false, Ty::BOOL),
            Some(ConstValue::I32(1))
        );
    }

    #[test]
    fn float_contexts_accept_int_text() {
        assert_eq!(parse_literal(&int_lit("3"), false, Ty::F64), Some(ConstValue::F64(3.0)));
        assert_eq!(
            parse_literal(&LiteralKind::Float("1.5"), true, Ty::F32),
            Some(ConstValue::F32(-1.5))
        );
        // Float text never fits an integer context.
        assert_eq!(parse_literal(&LiteralKind::Float("1.5"), false, Ty::I32), None);
    }

    #[test]
    fn array_literal_with_omissions() {
        let one = Expr::Literal(LiteralExpr {
            kind: LiteralKind::Int("1"),
            span: Span::default(),
        });
        let three = Expr::Literal(LiteralExpr {
            kind: LiteralKind::Int("3"),
            span: Span::default(),
        });
        let elements = [Some(&one), None, Some(&three)];
        let parsed = parse_array_literal(&elements, Ty::I32).unwrap();
        assert_eq!(
            parsed,
            ConstValue::Array(vec![
                ConstValue::I32(1),
                ConstValue::I32(0),
                ConstValue::I32(3)
            ])
        );
    }

    #[test]
    fn array_literal_fails_as_a_whole() {
        let bad = Expr::Literal(LiteralExpr {
            kind: LiteralKind::Float("1.5"),
            span: Span::default(),
        });
        let elements = [Some(&bad)];
        assert_eq!(parse_array_literal(&elements, Ty::I32), None);
    }

    #[test]
    fn negated_const_eval() {
        let five = Expr::Literal(LiteralExpr {
            kind: LiteralKind::Int("5"),
            span: Span::default(),
        });
        assert_eq!(const_eval(&five, Ty::I32), Some(ConstValue::I32(5)));
    }
}
