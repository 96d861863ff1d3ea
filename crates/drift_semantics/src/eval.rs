// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The compile-time collaborators of the semantic pass: constant folding and
// data layout. Both are consumed through traits so a driver can supply its
// own back-end; the implementations here cover what the pass itself needs
// (enum chains, `static if` conditions, array extents, global initializers).

use crate::ir::{BinaryOp, Expr, TExpr, UnaryOp};
use crate::symbols::{Storage, SymbolKind, Symbols};
use crate::types::{BuiltinType, Type};
use crate::value_range;

/// Why a compile-time evaluation failed. Converted to a location-tagged
/// semantic error by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> EvalError {
        EvalError {
            message: message.into(),
        }
    }
}

/// Compile-time constant folder. `evaluate` reduces an expression to a
/// literal of the same type.
pub trait Evaluator {
    fn evaluate(&mut self, expr: &TExpr, symbols: &Symbols) -> Result<TExpr, EvalError>;

    fn eval_integral(&mut self, expr: &TExpr, symbols: &Symbols) -> Result<u64, EvalError> {
        let folded = self.evaluate(expr, symbols)?;
        match folded.expression() {
            Expr::IntegerLiteral(v) => Ok(*v),
            Expr::BoolLiteral(b) => Ok(*b as u64),
            Expr::CharLiteral(c) => Ok(*c as u64),
            _ => Err(EvalError::new("expression is not an integral constant")),
        }
    }

    fn eval_string(&mut self, expr: &TExpr, symbols: &Symbols) -> Result<String, EvalError> {
        let folded = self.evaluate(expr, symbols)?;
        match folded.expression() {
            Expr::StringLiteral(s) => Ok(s.clone()),
            _ => Err(EvalError::new("expression is not a string constant")),
        }
    }
}

/// Type sizing, as the code generator will see it.
pub trait DataLayout {
    fn size_of(&self, ty: &Type, symbols: &Symbols) -> u64;
    fn align_of(&self, ty: &Type, symbols: &Symbols) -> u64;
}

//
// Default implementations
//

/// A small recursive folder over the typed IR. No function evaluation; a
/// call in constant position is an error.
#[derive(Default)]
pub struct FoldEvaluator;

impl FoldEvaluator {
    pub fn new() -> FoldEvaluator {
        FoldEvaluator
    }
}

fn literal_value(expr: &TExpr) -> Option<u64> {
    match expr.expression() {
        Expr::IntegerLiteral(v) => Some(*v),
        Expr::BoolLiteral(b) => Some(*b as u64),
        Expr::CharLiteral(c) => Some(*c as u64),
        _ => None,
    }
}

/// `value` sign-extended from the width of `ty`, for signed comparison.
fn signed_value(symbols: &Symbols, value: u64, ty: &Type) -> i64 {
    let mask = value_range::get_mask(symbols, ty);
    let sign_bit = mask ^ (mask >> 1);
    if value & sign_bit != 0 {
        (value | !mask) as i64
    } else {
        value as i64
    }
}

fn is_signed_type(symbols: &Symbols, ty: &Type) -> bool {
    ty.unqual_builtin(symbols).is_some_and(BuiltinType::is_signed)
}

impl Evaluator for FoldEvaluator {
    fn evaluate(&mut self, expr: &TExpr, symbols: &Symbols) -> Result<TExpr, EvalError> {
        let ty = expr.get_type().clone();
        match expr.expression() {
            Expr::IntegerLiteral(_)
            | Expr::BoolLiteral(_)
            | Expr::CharLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::NullLiteral
            | Expr::VoidInit
            | Expr::DefaultInit => Ok(expr.clone()),
            Expr::Tuple(elements) => {
                let folded = elements
                    .iter()
                    .map(|element| self.evaluate(element, symbols))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TExpr::new(Expr::Tuple(folded), ty))
            }
            Expr::Variable(sym) => {
                let symbol = &symbols[*sym];
                match &symbol.kind {
                    SymbolKind::Variable(v) if symbol.storage == Storage::Enum || v.is_final => {
                        match &v.value {
                            Some(value) => Ok(self.evaluate(value, symbols)?.retype(ty)),
                            None => Err(EvalError::new("constant read before its value was set")),
                        }
                    }
                    SymbolKind::ValueAlias(alias) => match &alias.value {
                        Some(value) => Ok(self.evaluate(value, symbols)?.retype(ty)),
                        None => Err(EvalError::new("alias read before its value was set")),
                    },
                    _ => Err(EvalError::new("identifier is not a compile-time constant")),
                }
            }
            Expr::Cast(cast) => {
                let operand = self.evaluate(&cast.operand, symbols)?;
                match literal_value(&operand) {
                    Some(v) => {
                        let mask = value_range::get_mask(symbols, &ty);
                        Ok(TExpr::new(Expr::IntegerLiteral(v & mask), ty))
                    }
                    None => Ok(operand.retype(ty)),
                }
            }
            Expr::Unary(unary) => {
                let operand = self.evaluate(&unary.operand, symbols)?;
                let v = literal_value(&operand)
                    .ok_or_else(|| EvalError::new("operand is not a constant"))?;
                let mask = value_range::get_mask(symbols, &ty);
                let result = match unary.op {
                    UnaryOp::Minus => v.wrapping_neg() & mask,
                    UnaryOp::Complement => !v & mask,
                    UnaryOp::Not => (v == 0) as u64,
                    _ => return Err(EvalError::new("operator is not constant-foldable")),
                };
                if unary.op == UnaryOp::Not {
                    Ok(TExpr::new(Expr::BoolLiteral(result != 0), ty))
                } else {
                    Ok(TExpr::new(Expr::IntegerLiteral(result), ty))
                }
            }
            Expr::Binary(binary) => {
                use BinaryOp::*;
                if binary.op == Comma {
                    self.evaluate(&binary.lhs, symbols)?;
                    return self.evaluate(&binary.rhs, symbols);
                }
                let lhs = self.evaluate(&binary.lhs, symbols)?;
                let rhs = self.evaluate(&binary.rhs, symbols)?;
                let (a, b) = match (literal_value(&lhs), literal_value(&rhs)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(EvalError::new("operand is not a constant")),
                };
                let mask = value_range::get_mask(symbols, &ty);
                let signed = is_signed_type(symbols, binary.lhs.get_type());
                let compare = |ordering: std::cmp::Ordering| -> bool {
                    if signed {
                        let (sa, sb) = (
                            signed_value(symbols, a, binary.lhs.get_type()),
                            signed_value(symbols, b, binary.rhs.get_type()),
                        );
                        sa.cmp(&sb) == ordering
                    } else {
                        a.cmp(&b) == ordering
                    }
                };
                let int = |v: u64| Ok(TExpr::new(Expr::IntegerLiteral(v & mask), ty.clone()));
                let boolean = |v: bool| Ok(TExpr::new(Expr::BoolLiteral(v), ty.clone()));
                match binary.op {
                    Add => int(a.wrapping_add(b)),
                    Sub => int(a.wrapping_sub(b)),
                    Mul => int(a.wrapping_mul(b)),
                    Div => {
                        if b == 0 {
                            return Err(EvalError::new("division by zero"));
                        }
                        if signed {
                            let (sa, sb) = (
                                signed_value(symbols, a, binary.lhs.get_type()),
                                signed_value(symbols, b, binary.rhs.get_type()),
                            );
                            int(sa.wrapping_div(sb) as u64)
                        } else {
                            int(a / b)
                        }
                    }
                    Mod => {
                        if b == 0 {
                            return Err(EvalError::new("division by zero"));
                        }
                        int(a % b)
                    }
                    BitAnd => int(a & b),
                    BitOr => int(a | b),
                    BitXor => int(a ^ b),
                    LeftShift => int(a.wrapping_shl(b as u32)),
                    RightShift => int(a.wrapping_shr(b as u32)),
                    Equal => boolean(a == b),
                    NotEqual => boolean(a != b),
                    Less => boolean(compare(std::cmp::Ordering::Less)),
                    Greater => boolean(compare(std::cmp::Ordering::Greater)),
                    LessEqual => boolean(!compare(std::cmp::Ordering::Greater)),
                    GreaterEqual => boolean(!compare(std::cmp::Ordering::Less)),
                    LogicalAnd => boolean(a != 0 && b != 0),
                    LogicalOr => boolean(a != 0 || b != 0),
                    Assign | Comma => Err(EvalError::new("operator is not constant-foldable")),
                }
            }
            Expr::Call(_) | Expr::FieldAccess(_) | Expr::Function(_) | Expr::Context(_) => {
                Err(EvalError::new("expression is not a compile-time constant"))
            }
        }
    }
}

/// The LP64 x86-64 layout the default target uses.
#[derive(Default)]
pub struct Amd64Layout;

impl Amd64Layout {
    pub fn new() -> Amd64Layout {
        Amd64Layout
    }
}

const POINTER_SIZE: u64 = 8;

impl DataLayout for Amd64Layout {
    fn size_of(&self, ty: &Type, symbols: &Symbols) -> u64 {
        match ty {
            Type::Builtin(b) => match b {
                BuiltinType::Void => 0,
                BuiltinType::Null => POINTER_SIZE,
                BuiltinType::None => panic!("auto sentinel has no size"),
                other => u64::from(other.bits().max(8)) / 8,
            },
            Type::Pointer(..) | Type::Function(..) | Type::Context(..) => POINTER_SIZE,
            Type::Slice(..) => 2 * POINTER_SIZE,
            Type::Array(element, n) => self.size_of(element, symbols) * n,
            Type::Aggregate(sym) => match &symbols[*sym].kind {
                SymbolKind::Class(_) | SymbolKind::Interface(_) => POINTER_SIZE,
                SymbolKind::Enum(e) => self.size_of(&Type::Builtin(e.base), symbols),
                SymbolKind::Struct(s) | SymbolKind::Union(s) => {
                    let mut size = 0u64;
                    let mut align = 1u64;
                    for field in &s.fields {
                        if let SymbolKind::Field(f) = &symbols[*field].kind {
                            let field_size = self.size_of(&f.ty, symbols);
                            let field_align = self.align_of(&f.ty, symbols);
                            align = align.max(field_align);
                            if matches!(symbols[*sym].kind, SymbolKind::Union(_)) {
                                size = size.max(field_size);
                            } else {
                                size = size.div_ceil(field_align) * field_align + field_size;
                            }
                        }
                    }
                    size.div_ceil(align).max(1) * align
                }
                _ => POINTER_SIZE,
            },
        }
    }

    fn align_of(&self, ty: &Type, symbols: &Symbols) -> u64 {
        match ty {
            Type::Array(element, _) => self.align_of(element, symbols),
            Type::Slice(..) => POINTER_SIZE,
            Type::Aggregate(sym) => match &symbols[*sym].kind {
                SymbolKind::Struct(s) | SymbolKind::Union(s) => {
                    let mut align = 1;
                    for field in &s.fields {
                        if let SymbolKind::Field(f) = &symbols[*field].kind {
                            align = align.max(self.align_of(&f.ty, symbols));
                        }
                    }
                    align
                }
                SymbolKind::Enum(e) => self.size_of(&Type::Builtin(e.base), symbols).max(1),
                _ => POINTER_SIZE,
            },
            other => self.size_of(other, symbols).clamp(1, POINTER_SIZE),
        }
    }
}
