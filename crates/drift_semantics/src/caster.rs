// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Implicit conversion. `cast_kind` is the type-only judgment; `implicit_cast`
// is the expression-aware entry point that additionally lets a narrowing
// through when value range propagation proves the value fits. Override
// matching uses `param_cast_exact`, which accepts nothing short of `Exact`.

use drift_source_file::Span;

use crate::context::Context;
use crate::ir::{CastExpr, CastKind, TExpr};
use crate::semantic_error::{Result, SemanticError, SemanticErrorKind};
use crate::symbols::{SymbolKind, Symbols};
use crate::types::{BuiltinType, ParamType, Type};
use crate::value_range;

fn builtin_cast_kind(from: BuiltinType, to: BuiltinType) -> CastKind {
    use BuiltinType::*;
    if from == to {
        return CastKind::Exact;
    }
    if from == None || to == None || from == Void || to == Void {
        return CastKind::Invalid;
    }
    if !from.is_arithmetic() || !to.is_arithmetic() {
        return CastKind::Invalid;
    }
    if to == Bool {
        // Nothing narrows to bool implicitly; the value range gate may
        // still allow a provably 0/1 expression through.
        return CastKind::Trunc;
    }
    if from == Bool {
        return CastKind::Pad;
    }
    match to.bits().cmp(&from.bits()) {
        std::cmp::Ordering::Greater => CastKind::Pad,
        std::cmp::Ordering::Equal => CastKind::Bit,
        std::cmp::Ordering::Less => CastKind::Trunc,
    }
}

fn class_upcast(symbols: &Symbols, from: crate::symbols::SymbolId, to: crate::symbols::SymbolId) -> bool {
    let mut current = from;
    loop {
        if current == to {
            return true;
        }
        match &symbols[current].kind {
            SymbolKind::Class(c) => match c.base {
                Some(base) if base != current => current = base,
                _ => return false,
            },
            _ => return false,
        }
    }
}

/// The closest conversion from `from` to `to`, considering types alone.
pub fn cast_kind(symbols: &Symbols, from: &Type, to: &Type) -> CastKind {
    use Type::*;
    if from == to {
        return CastKind::Exact;
    }
    match (from, to) {
        (Builtin(a), Builtin(b)) => builtin_cast_kind(*a, *b),
        // null converts to anything with a pointer representation.
        (Builtin(BuiltinType::Null), Pointer(..) | Slice(..) | Function(..)) => CastKind::Bit,
        (Builtin(BuiltinType::Null), Aggregate(sym)) => {
            match &symbols[*sym].kind {
                SymbolKind::Class(_) | SymbolKind::Interface(_) => CastKind::Bit,
                _ => CastKind::Invalid,
            }
        }
        // An enum reaches exactly what its base reaches, but never closer
        // than a representation change.
        (Aggregate(sym), _) if matches!(symbols[*sym].kind, SymbolKind::Enum(_)) => {
            let base = match &symbols[*sym].kind {
                SymbolKind::Enum(e) => Type::Builtin(e.base),
                _ => unreachable!(),
            };
            std::cmp::min(CastKind::Bit, cast_kind(symbols, &base, to))
        }
        (Aggregate(a), Aggregate(b)) => {
            if class_upcast(symbols, *a, *b) {
                CastKind::Bit
            } else {
                CastKind::Invalid
            }
        }
        (Pointer(p1, q1), Pointer(p2, q2)) => {
            if p1 == p2 && q1.convertible_to(*q2) {
                CastKind::Qual
            } else {
                CastKind::Invalid
            }
        }
        (Slice(e1), Slice(e2)) if e1 == e2 => CastKind::Exact,
        _ => CastKind::Invalid,
    }
}

/// `true` when `from` matches `to` exactly, ref-ness included. This is the
/// comparison override resolution uses.
pub fn param_cast_exact(symbols: &Symbols, from: &ParamType, to: &ParamType) -> bool {
    from.is_ref == to.is_ref && cast_kind(symbols, &from.ty, &to.ty) == CastKind::Exact
}

/// Human-readable type name for diagnostics.
pub fn type_name(symbols: &Symbols, context: &Context, ty: &Type) -> String {
    match ty {
        Type::Builtin(b) => format!("{b:?}").to_lowercase(),
        Type::Pointer(p, _) => format!("{}*", type_name(symbols, context, p)),
        Type::Slice(e) => format!("{}[]", type_name(symbols, context, e)),
        Type::Array(e, n) => format!("{}[{n}]", type_name(symbols, context, e)),
        Type::Function(_) => "function".to_string(),
        Type::Aggregate(sym) => context.name_str(symbols[*sym].name).to_string(),
        Type::Context(_) => "context".to_string(),
    }
}

/// Convert `expr` to `to`, inserting a cast node when the representation or
/// type changes. Narrowing is permitted only when the propagated value
/// range proves it lossless; otherwise the conversion is a `TypeMismatch`.
pub fn implicit_cast(
    symbols: &Symbols,
    context: &Context,
    expr: TExpr,
    to: &Type,
    location: Span,
) -> Result<TExpr> {
    let kind = cast_kind(symbols, expr.get_type(), to);
    match kind {
        CastKind::Exact | CastKind::Qual | CastKind::Bit | CastKind::Pad => {
            Ok(CastExpr::build(kind, to.clone(), expr))
        }
        CastKind::Trunc | CastKind::Invalid => {
            let from_arith = expr
                .get_type()
                .unqual_builtin(symbols)
                .is_some_and(|b| b.is_arithmetic());
            let to_arith = matches!(to, Type::Builtin(b) if b.is_arithmetic());
            if from_arith && to_arith && value_range::can_fit(symbols, &expr, to) {
                return Ok(CastExpr::build(CastKind::Trunc, to.clone(), expr));
            }
            Err(SemanticError::new(
                SemanticErrorKind::TypeMismatch {
                    from: type_name(symbols, context, expr.get_type()),
                    to: type_name(symbols, context, to),
                },
                location,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_cast_kinds() {
        use BuiltinType::*;
        assert_eq!(builtin_cast_kind(Int, Int), CastKind::Exact);
        assert_eq!(builtin_cast_kind(Int, Long), CastKind::Pad);
        assert_eq!(builtin_cast_kind(Int, Uint), CastKind::Bit);
        assert_eq!(builtin_cast_kind(Long, Int), CastKind::Trunc);
        assert_eq!(builtin_cast_kind(Bool, Int), CastKind::Pad);
        assert_eq!(builtin_cast_kind(Int, Bool), CastKind::Trunc);
        assert_eq!(builtin_cast_kind(Void, Int), CastKind::Invalid);
    }

    #[test]
    fn test_null_to_pointer() {
        let symbols = Symbols::new();
        let null = Type::Builtin(BuiltinType::Null);
        let ptr = Type::Pointer(
            Box::new(Type::Builtin(BuiltinType::Int)),
            crate::types::Qualifier::Mutable,
        );
        assert_eq!(cast_kind(&symbols, &null, &ptr), CastKind::Bit);
        assert_eq!(cast_kind(&symbols, &ptr, &null), CastKind::Invalid);
    }

    #[test]
    fn test_qualifier_widening() {
        use crate::types::Qualifier;
        let symbols = Symbols::new();
        let int = Box::new(Type::Builtin(BuiltinType::Int));
        let mutable = Type::Pointer(int.clone(), Qualifier::Mutable);
        let constant = Type::Pointer(int.clone(), Qualifier::Const);
        let immutable = Type::Pointer(int, Qualifier::Immutable);
        assert_eq!(cast_kind(&symbols, &mutable, &constant), CastKind::Qual);
        assert_eq!(cast_kind(&symbols, &immutable, &constant), CastKind::Qual);
        assert_eq!(cast_kind(&symbols, &constant, &mutable), CastKind::Invalid);
    }
}
