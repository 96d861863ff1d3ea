// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The resolved IR the analyzer produces. Identifiers are symbol ids,
// expressions are tagged with their semantic type, and implicit conversions
// appear as explicit cast nodes.
//
// Typed expressions are implemented by tagging an `Expr` with a `Type`; the
// untyped tree in `drift_ast` and this one never mix.

pub use drift_ast::ast::{BinaryOp, UnaryOp};

use crate::symbols::SymbolId;
use crate::types::Type;

/// How one type reaches another. Higher is closer: `Exact` means no
/// conversion at all, `Invalid` means none exists. Override matching only
/// accepts `Exact`; the implicit caster accepts anything down to `Trunc`
/// when value range propagation proves the narrowing safe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CastKind {
    Invalid,
    /// Narrowing; implicit only when provably in range.
    Trunc,
    /// Widening: the value is padded to a larger width.
    Pad,
    /// Same representation, different type (enum to base, class upcast,
    /// null to pointer, same-width sign change).
    Bit,
    /// Qualifier-only change.
    Qual,
    Exact,
}

/// Typed expression: an `Expr` tagged with its semantic `Type`.
#[derive(Clone, Debug, PartialEq)]
pub struct TExpr {
    expression: Expr,
    ty: Type,
}

impl TExpr {
    pub fn new(expression: Expr, ty: Type) -> TExpr {
        TExpr { expression, ty }
    }

    pub fn get_type(&self) -> &Type {
        &self.ty
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Retag the expression with a new type, leaving the tree untouched.
    /// Used when an enum entry's folded value takes the enum type.
    pub fn retype(self, ty: Type) -> TExpr {
        TExpr {
            expression: self.expression,
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntegerLiteral(u64),
    BoolLiteral(bool),
    CharLiteral(char),
    StringLiteral(String),
    NullLiteral,
    /// A variable, field, parameter, or enum entry reference.
    Variable(SymbolId),
    /// A direct function reference.
    Function(SymbolId),
    /// The enclosing frame of a closure.
    Context(SymbolId),
    Binary(Box<BinaryExpr>),
    Unary(Box<UnaryExpr>),
    Call(Box<CallExpr>),
    FieldAccess(Box<FieldAccess>),
    Cast(Box<CastExpr>),
    /// Compile-time tuple of field defaults; the value of a struct `init`.
    Tuple(Vec<TExpr>),
    /// The all-bits-uninitialized value of a union.
    VoidInit,
    /// Default value of a type with no interesting structure.
    DefaultInit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: TExpr,
    pub rhs: TExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: TExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    pub callee: TExpr,
    pub args: Vec<TExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    pub base: TExpr,
    pub field: SymbolId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CastExpr {
    pub kind: CastKind,
    pub operand: TExpr,
}

impl CastExpr {
    /// Wrap `operand` in a cast to `ty`, collapsing the no-op case.
    pub fn build(kind: CastKind, ty: Type, operand: TExpr) -> TExpr {
        if kind == CastKind::Exact && operand.get_type() == &ty {
            return operand;
        }
        TExpr::new(Expr::Cast(Box::new(CastExpr { kind, operand })), ty)
    }
}

//
// Statements
//

#[derive(Clone, Debug, PartialEq, Default)]
pub struct TBlock {
    pub stmts: Vec<TStmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TStmt {
    Expr(TExpr),
    /// A local variable declaration; the symbol holds type and initializer.
    Variable(SymbolId),
    /// A nested declaration advanced through the scheduler.
    Declaration(SymbolId),
    Return(Option<TExpr>),
    Block(TBlock),
    If(Box<TIf>),
    While(Box<TWhile>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TIf {
    pub condition: TExpr,
    pub then_branch: TStmt,
    pub else_branch: Option<TStmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TWhile {
    pub condition: TExpr,
    pub body: TStmt,
}
