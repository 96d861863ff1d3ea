// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Value range propagation: a conservative abstract interpreter over integer
// expressions, used to decide whether an implicit narrowing cast is safe.
//
// A range is a pair of unsigned 64-bit bounds; all arithmetic is modular in
// 64 bits and results are repacked into the target type's bit width by
// masking. Signed values travel in their two's-complement representation,
// so a "negative" range like [-5, 0] has min > max numerically; what keeps
// the abstraction sound is the span `max - min`, which is width-independent.
//
// The interpreter is deliberately a fixed-width interval over modular
// integers, not an arbitrary-precision one: when the combined span of two
// operands overflows 64 bits the result is pessimized to the full range of
// the target type, even though a wider representation could track the sum
// exactly.

use crate::ir::{BinaryOp, Expr, TExpr};
use crate::symbols::{Storage, SymbolId, SymbolKind, Symbols};
use crate::types::{BuiltinType, Type};

#[derive(Clone, Copy, Debug)]
pub struct ValueRange {
    pub min: u64,
    pub max: u64,
}

impl ValueRange {
    pub fn new(min: u64, max: u64) -> ValueRange {
        ValueRange { min, max }
    }

    /// The range covering every value of a type with mask `mask`.
    pub fn full_of(mask: u64) -> ValueRange {
        ValueRange { min: 0, max: mask }
    }

    /// The wrap-around case covering every 64-bit value.
    pub fn is_full(&self) -> bool {
        self.min.wrapping_sub(self.max) == 1
    }

    /// Width of the interval, modular. Meaningful even for ranges whose
    /// bounds wrap through zero.
    pub fn span(&self) -> u64 {
        self.max.wrapping_sub(self.min)
    }
}

/// Two ranges are equal iff both are full, or both bounds match exactly.
impl PartialEq for ValueRange {
    fn eq(&self, other: &ValueRange) -> bool {
        (self.is_full() && other.is_full()) || (self.min == other.min && self.max == other.max)
    }
}

impl Eq for ValueRange {}

fn builtin_mask(builtin: BuiltinType) -> u64 {
    use BuiltinType::*;
    match builtin {
        Void => 0,
        Bool => 1,
        Char | Byte | Ubyte => 0xFF,
        Wchar | Short | Ushort => 0xFFFF,
        Dchar | Int | Uint => 0xFFFF_FFFF,
        // The tracker is 64 bits wide; cent is followed modulo 2^64.
        Long | Ulong | Cent | Ucent => u64::MAX,
        Null => u64::MAX,
        None => panic!("value range requested for the auto sentinel"),
    }
}

/// The bit mask of `ty`'s representation. Enums recurse into their base;
/// pointer-ABI types get the full 64-bit mask.
pub fn get_mask(symbols: &Symbols, ty: &Type) -> u64 {
    match ty {
        Type::Builtin(builtin) => builtin_mask(*builtin),
        Type::Pointer(..) | Type::Slice(..) | Type::Array(..) | Type::Function(..) | Type::Context(..) => {
            u64::MAX
        }
        Type::Aggregate(sym) => match &symbols[*sym].kind {
            SymbolKind::Enum(e) => builtin_mask(e.base),
            _ => u64::MAX,
        },
    }
}

/// Reduce `range` to the canonical representation within `mask`'s width.
/// A range whose bounds share an overflow class keeps its tightness; one
/// straddling a wrap collapses to the type's full range.
pub fn repack(range: ValueRange, mask: u64) -> ValueRange {
    if range.min & !mask == range.max & !mask {
        ValueRange::new(range.min & mask, range.max & mask)
    } else {
        ValueRange::full_of(mask)
    }
}

/// Two's-complement negation of a range.
pub fn complement(range: ValueRange, mask: u64) -> ValueRange {
    repack(
        ValueRange::new((!range.max).wrapping_add(1), (!range.min).wrapping_add(1)),
        mask,
    )
}

pub fn add(lhs: ValueRange, rhs: ValueRange, mask: u64) -> ValueRange {
    // If the combined span overflows, the sum can cover every value; give
    // up rather than pretend precision.
    match lhs.span().checked_add(rhs.span()) {
        Option::None => ValueRange::full_of(mask),
        Option::Some(_) => repack(
            ValueRange::new(
                lhs.min.wrapping_add(rhs.min),
                lhs.max.wrapping_add(rhs.max),
            ),
            mask,
        ),
    }
}

pub fn sub(lhs: ValueRange, rhs: ValueRange, mask: u64) -> ValueRange {
    add(lhs, complement(rhs, mask), mask)
}

fn variable_range(symbols: &Symbols, sym: SymbolId) -> Option<ValueRange> {
    let symbol = &symbols[sym];
    match &symbol.kind {
        SymbolKind::Variable(v) => {
            // Only values frozen at compile time have a knowable range.
            if symbol.storage == Storage::Enum || v.is_final {
                match &v.value {
                    Option::Some(value) => range_of(symbols, value),
                    Option::None => Option::Some(ValueRange::full_of(get_mask(symbols, &v.ty))),
                }
            } else {
                Option::Some(ValueRange::full_of(get_mask(symbols, &v.ty)))
            }
        }
        SymbolKind::Field(f) => Option::Some(ValueRange::full_of(get_mask(symbols, &f.ty))),
        _ => Option::None,
    }
}

/// The conservative range of `expr`, or `None` for operations the
/// propagator does not implement (multiplication, division, bitwise and
/// shift operations, unary operators).
pub fn range_of(symbols: &Symbols, expr: &TExpr) -> Option<ValueRange> {
    let mask = get_mask(symbols, expr.get_type());
    match expr.expression() {
        Expr::IntegerLiteral(v) => Some(repack(ValueRange::new(*v, *v), mask)),
        Expr::CharLiteral(c) => Some(repack(ValueRange::new(*c as u64, *c as u64), mask)),
        Expr::BoolLiteral(b) => Some(ValueRange::new(*b as u64, *b as u64)),
        Expr::Variable(sym) => variable_range(symbols, *sym),
        Expr::Binary(binary) => {
            let result = match binary.op {
                BinaryOp::Add => add(
                    range_of(symbols, &binary.lhs)?,
                    range_of(symbols, &binary.rhs)?,
                    mask,
                ),
                BinaryOp::Sub => sub(
                    range_of(symbols, &binary.lhs)?,
                    range_of(symbols, &binary.rhs)?,
                    mask,
                ),
                // Assignment and comma both take the value of the right
                // operand.
                BinaryOp::Assign | BinaryOp::Comma => repack(range_of(symbols, &binary.rhs)?, mask),
                _ => return None,
            };
            Some(result)
        }
        Expr::Cast(cast) => Some(repack(range_of(symbols, &cast.operand)?, mask)),
        _ => None,
    }
}

/// `true` when `expr` provably fits in `ty` without truncation. Unsupported
/// expressions never fit; the caller falls back to an explicit cast.
pub fn can_fit(symbols: &Symbols, expr: &TExpr, ty: &Type) -> bool {
    let mask = get_mask(symbols, ty);
    match range_of(symbols, expr) {
        Some(range) => !range.is_full() && range.min <= range.max && range.max <= mask,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryExpr;

    const LONG: u64 = u64::MAX;
    const BYTE: u64 = 0xFF;

    fn lit(value: u64, ty: BuiltinType) -> TExpr {
        TExpr::new(Expr::IntegerLiteral(value), Type::Builtin(ty))
    }

    fn binary(op: BinaryOp, lhs: TExpr, rhs: TExpr, ty: BuiltinType) -> TExpr {
        TExpr::new(
            Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
            Type::Builtin(ty),
        )
    }

    // A handful of ranges exercising the interesting shapes: point ranges,
    // ordinary intervals, and intervals wrapping through zero.
    fn samples() -> Vec<ValueRange> {
        vec![
            ValueRange::new(0, 0),
            ValueRange::new(11, 11),
            ValueRange::new(5, 300),
            ValueRange::new((-5i64) as u64, 0),
            ValueRange::new((-1i64) as u64, 5),
            ValueRange::new(1, 1),
        ]
    }

    #[test]
    fn test_add_commutes() {
        for a in samples() {
            for b in samples() {
                assert_eq!(add(a, b, LONG), add(b, a, LONG));
                assert_eq!(add(a, b, BYTE), add(b, a, BYTE));
            }
        }
    }

    #[test]
    fn test_complement_distributes_over_add() {
        for a in samples() {
            for b in samples() {
                assert_eq!(
                    add(complement(a, LONG), complement(b, LONG), LONG),
                    complement(add(a, b, LONG), LONG)
                );
            }
        }
    }

    #[test]
    fn test_sub_is_add_complement() {
        for a in samples() {
            for b in samples() {
                assert_eq!(sub(a, b, LONG), add(a, complement(b, LONG), LONG));
                assert_eq!(sub(b, a, LONG), complement(sub(a, b, LONG), LONG));
            }
        }
    }

    #[test]
    fn test_repack_is_idempotent() {
        for r in samples() {
            for mask in [1u64, BYTE, 0xFFFF, 0xFFFF_FFFF, LONG] {
                let once = repack(r, mask);
                assert_eq!(repack(once, mask), once);
            }
        }
    }

    #[test]
    fn test_add_negative_ranges() {
        // [-5, 0] + [-1, 5] == [-6, 5]
        let a = ValueRange::new((-5i64) as u64, 0);
        let b = ValueRange::new((-1i64) as u64, 5);
        assert_eq!(add(a, b, LONG), ValueRange::new((-6i64) as u64, 5));
    }

    #[test]
    fn test_sub_point_ranges() {
        // [-1, -1] - [1, 1] == [-2, -2]
        let a = ValueRange::new((-1i64) as u64, (-1i64) as u64);
        let b = ValueRange::new(1, 1);
        assert_eq!(sub(a, b, LONG), ValueRange::new((-2i64) as u64, (-2i64) as u64));
    }

    #[test]
    fn test_span_overflow_pessimizes() {
        let half = ValueRange::new(0, u64::MAX / 2 + 1);
        assert_eq!(add(half, half, LONG), ValueRange::full_of(LONG));
    }

    #[test]
    fn test_repack_keeps_one_overflow_class() {
        // 250 + 10 stays within one wrap of byte: tight result.
        let r = repack(ValueRange::new(258, 260), BYTE);
        assert_eq!(r, ValueRange::new(2, 4));
        // Straddling a wrap loses precision.
        let r = repack(ValueRange::new(250, 260), BYTE);
        assert_eq!(r, ValueRange::full_of(BYTE));
    }

    #[test]
    fn test_full_range_equality() {
        assert!(ValueRange::new(5, 4).is_full());
        assert_eq!(ValueRange::new(5, 4), ValueRange::new(0, u64::MAX));
        assert_ne!(ValueRange::new(0, 3), ValueRange::new(0, 4));
    }

    #[test]
    fn test_can_fit_sum_of_literals() {
        let symbols = Symbols::new();
        let e = binary(
            BinaryOp::Add,
            lit(5, BuiltinType::Int),
            lit(6, BuiltinType::Int),
            BuiltinType::Int,
        );
        assert_eq!(range_of(&symbols, &e), Some(ValueRange::new(11, 11)));
        assert!(can_fit(&symbols, &e, &Type::Builtin(BuiltinType::Byte)));

        let too_big = binary(
            BinaryOp::Add,
            lit(300, BuiltinType::Int),
            lit(0, BuiltinType::Int),
            BuiltinType::Int,
        );
        assert!(!can_fit(&symbols, &too_big, &Type::Builtin(BuiltinType::Byte)));
        assert!(can_fit(&symbols, &too_big, &Type::Builtin(BuiltinType::Short)));
    }

    #[test]
    fn test_unsupported_operations_never_fit() {
        let symbols = Symbols::new();
        let e = binary(
            BinaryOp::Mul,
            lit(1, BuiltinType::Int),
            lit(1, BuiltinType::Int),
            BuiltinType::Int,
        );
        assert_eq!(range_of(&symbols, &e), None);
        assert!(!can_fit(&symbols, &e, &Type::Builtin(BuiltinType::Long)));
    }

    #[test]
    fn test_bool_literal_range() {
        let symbols = Symbols::new();
        let e = TExpr::new(Expr::BoolLiteral(true), Type::Builtin(BuiltinType::Bool));
        assert_eq!(range_of(&symbols, &e), Some(ValueRange::new(1, 1)));
        assert!(can_fit(&symbols, &e, &Type::Builtin(BuiltinType::Bool)));
    }
}
