// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The semantic type model. This file should include all code that
// manipulates types in isolation; in particular integer promotion lives
// here. Casting is not implemented here because it involves not only the
// types but the typed IR as well — see caster.rs.

use boolenum::BoolEnum;

use drift_ast as ast;

use crate::symbols::{Linkage, SymbolId, SymbolKind, Symbols};

#[derive(BoolEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IsRef {
    True,
    False,
}

#[derive(BoolEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IsFinal {
    True,
    False,
}

#[derive(BoolEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IsVariadic {
    True,
    False,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Void,
    /// Sentinel for `auto` before inference has produced a real type.
    None,
    Bool,
    Char,
    Wchar,
    Dchar,
    Byte,
    Ubyte,
    Short,
    Ushort,
    Int,
    Uint,
    Long,
    Ulong,
    Cent,
    Ucent,
    /// The type of the `null` literal.
    Null,
}

impl BuiltinType {
    pub fn from_ast(kind: ast::BuiltinKind) -> BuiltinType {
        use ast::BuiltinKind as K;
        match kind {
            K::Void => BuiltinType::Void,
            K::Bool => BuiltinType::Bool,
            K::Char => BuiltinType::Char,
            K::Wchar => BuiltinType::Wchar,
            K::Dchar => BuiltinType::Dchar,
            K::Byte => BuiltinType::Byte,
            K::Ubyte => BuiltinType::Ubyte,
            K::Short => BuiltinType::Short,
            K::Ushort => BuiltinType::Ushort,
            K::Int => BuiltinType::Int,
            K::Uint => BuiltinType::Uint,
            K::Long => BuiltinType::Long,
            K::Ulong => BuiltinType::Ulong,
            K::Cent => BuiltinType::Cent,
            K::Ucent => BuiltinType::Ucent,
        }
    }

    pub fn is_integral(self) -> bool {
        use BuiltinType::*;
        matches!(
            self,
            Byte | Ubyte | Short | Ushort | Int | Uint | Long | Ulong | Cent | Ucent
        )
    }

    pub fn is_signed(self) -> bool {
        use BuiltinType::*;
        matches!(self, Byte | Short | Int | Long | Cent)
    }

    pub fn is_char(self) -> bool {
        use BuiltinType::*;
        matches!(self, Char | Wchar | Dchar)
    }

    /// Integrals, chars, and bool: everything integer arithmetic and value
    /// range propagation understand.
    pub fn is_arithmetic(self) -> bool {
        self.is_integral() || self.is_char() || self == BuiltinType::Bool
    }

    /// The unsigned builtin of the same width. Identity for non-integrals.
    pub fn unsigned(self) -> BuiltinType {
        use BuiltinType::*;
        match self {
            Byte => Ubyte,
            Short => Ushort,
            Int => Uint,
            Long => Ulong,
            Cent => Ucent,
            other => other,
        }
    }

    /// Bit width. `None` and `Null` have no width; `Void` is zero-sized.
    pub fn bits(self) -> u32 {
        use BuiltinType::*;
        match self {
            Void => 0,
            Bool => 1,
            Byte | Ubyte | Char => 8,
            Short | Ushort | Wchar => 16,
            Int | Uint | Dchar => 32,
            Long | Ulong => 64,
            Cent | Ucent => 128,
            None | Null => panic!("type has no bit width: {self:?}"),
        }
    }

    /// Integer conversion rank, used for promotion. Chars rank with the
    /// unsigned integer of their width; bool ranks below everything.
    fn rank(self) -> u32 {
        use BuiltinType::*;
        match self {
            Bool => 0,
            Byte | Ubyte | Char => 1,
            Short | Ushort | Wchar => 2,
            Int | Uint | Dchar => 3,
            Long | Ulong => 4,
            Cent | Ucent => 5,
            _ => panic!("no conversion rank for {self:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Mutable,
    Const,
    Immutable,
}

impl Qualifier {
    pub fn from_ast(qualifier: ast::Qualifier) -> Qualifier {
        match qualifier {
            ast::Qualifier::Mutable => Qualifier::Mutable,
            ast::Qualifier::Const => Qualifier::Const,
            ast::Qualifier::Immutable => Qualifier::Immutable,
        }
    }

    /// `true` if a value qualified `self` may be handed out as `other`
    /// without a cast. Both mutable and immutable data may be viewed as
    /// const.
    pub fn convertible_to(self, other: Qualifier) -> bool {
        self == other || other == Qualifier::Const
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(BuiltinType),
    Pointer(Box<Type>, Qualifier),
    Slice(Box<Type>),
    Array(Box<Type>, u64),
    Function(Box<FunctionType>),
    /// A struct, union, class, interface, enum, or template instance.
    Aggregate(SymbolId),
    /// The captured frame of a function, as seen by its closures.
    Context(SymbolId),
}

impl Type {
    /// The not-yet-inferred `auto` sentinel.
    pub fn auto() -> Type {
        Type::Builtin(BuiltinType::None)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Type::Builtin(BuiltinType::None))
    }

    pub fn builtin(&self) -> Option<BuiltinType> {
        match self {
            Type::Builtin(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Builtin(b) if b.is_integral())
    }

    /// `true` for types passed around as a single machine pointer.
    pub fn is_pointer_abi(&self, symbols: &Symbols) -> bool {
        match self {
            Type::Pointer(..) | Type::Function(..) | Type::Context(..) => true,
            Type::Builtin(BuiltinType::Null) => true,
            Type::Aggregate(sym) => matches!(
                symbols[*sym].kind,
                SymbolKind::Class(_) | SymbolKind::Interface(_)
            ),
            _ => false,
        }
    }

    /// The underlying builtin of an enum type, walking through nested
    /// enums. Identity for everything else.
    pub fn unqual_builtin(&self, symbols: &Symbols) -> Option<BuiltinType> {
        match self {
            Type::Builtin(b) => Some(*b),
            Type::Aggregate(sym) => match &symbols[*sym].kind {
                SymbolKind::Enum(e) => Some(e.base),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A parameter or return slot: a type plus passing convention.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub ty: Type,
    pub is_ref: IsRef,
    pub is_final: IsFinal,
}

impl ParamType {
    pub fn value(ty: Type) -> ParamType {
        ParamType {
            ty,
            is_ref: IsRef::False,
            is_final: IsFinal::False,
        }
    }

    pub fn by_ref(ty: Type) -> ParamType {
        ParamType {
            ty,
            is_ref: IsRef::True,
            is_final: IsFinal::False,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub linkage: Linkage,
    pub return_type: ParamType,
    pub params: Vec<ParamType>,
    pub is_variadic: IsVariadic,
}

//
// Promotion
//

/// The common type of two integral builtins for arithmetic, or `None` when
/// the pair does not promote. Operands below `int` are first widened to
/// `int`; mixed signedness at equal rank goes unsigned.
pub fn promote_builtin(lhs: BuiltinType, rhs: BuiltinType) -> Option<BuiltinType> {
    use BuiltinType::*;
    // Everything narrower than int fits in int; dchar does not.
    let widen = |b: BuiltinType| match b {
        Bool | Byte | Ubyte | Char | Short | Ushort | Wchar => Int,
        Dchar => Uint,
        other => other,
    };
    let arithmetic = |b: BuiltinType| b.is_integral() || b == Bool || b.is_char();
    if !arithmetic(lhs) || !arithmetic(rhs) {
        return Option::None;
    }
    let lhs = widen(lhs);
    let rhs = widen(rhs);
    let promoted = if lhs.rank() > rhs.rank() {
        lhs
    } else if rhs.rank() > lhs.rank() {
        rhs
    } else if lhs.is_signed() == rhs.is_signed() {
        lhs
    } else {
        lhs.unsigned()
    };
    Some(promoted)
}

/// The common type of two semantic types, used for `auto` return inference
/// and arithmetic. Enums promote through their base type.
pub fn promote_types(symbols: &Symbols, lhs: &Type, rhs: &Type) -> Option<Type> {
    if lhs == rhs {
        return Some(lhs.clone());
    }
    match (lhs.unqual_builtin(symbols), rhs.unqual_builtin(symbols)) {
        (Some(a), Some(b)) => promote_builtin(a, b).map(Type::Builtin),
        _ => None,
    }
}

#[test]
fn test_builtin_predicates() {
    use BuiltinType::*;
    assert!(Byte.is_signed());
    assert!(!Ubyte.is_signed());
    assert!(Char.is_char());
    assert!(!Char.is_integral());
    assert_eq!(Long.bits(), 64);
    assert_eq!(Int.unsigned(), Uint);
}

#[test]
fn test_promotion() {
    use BuiltinType::*;
    // Everything below int goes to int first.
    assert_eq!(promote_builtin(Byte, Ubyte), Some(Int));
    assert_eq!(promote_builtin(Short, Short), Some(Int));
    // Equal rank, mixed signedness goes unsigned.
    assert_eq!(promote_builtin(Int, Uint), Some(Uint));
    assert_eq!(promote_builtin(Long, Int), Some(Long));
    assert_eq!(promote_builtin(Ulong, Long), Some(Ulong));
}

#[test]
fn test_auto_sentinel() {
    let t = Type::auto();
    assert!(t.is_auto());
    assert!(!t.is_integral());
}
