// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Expression and statement analysis: the bridge from untyped syntax to the
// typed IR. Identifier resolution, implicit conversion insertion, overload
// selection, template instantiation, and closure capture marking all live
// here; the staged symbol routines in analyzer.rs call in for types,
// initializers, and bodies.

use drift_ast as ast;
use drift_source_file::Span;

use crate::caster;
use crate::context::Name;
use crate::ir::{
    BinaryExpr, CallExpr, CastExpr, CastKind, Expr, FieldAccess, TBlock, TExpr, TIf, TStmt,
    TWhile, UnaryExpr,
};
use crate::mangler::{mangle_component, TypeMangler};
use crate::semantic_error::{Result, SemanticErrorKind};
use crate::symbols::{
    InstanceSymbol, ScopeId, ScopeKind, Step, Storage, Symbol, SymbolAliasSymbol, SymbolId,
    SymbolKind, TypeAliasSymbol, ValueAliasSymbol, VariableSymbol,
};
use crate::types::{promote_types, BuiltinType, Qualifier, Type};

use crate::pass::SemanticPass;

/// A template argument after resolution against the caller's scope.
#[derive(Clone, Debug)]
pub(crate) enum ResolvedArg {
    Type(Type),
    Value(TExpr),
    Symbol(SymbolId),
}

impl SemanticPass {
    //
    // Types
    //

    pub(crate) fn resolve_type(&mut self, ty: &ast::TypeExpr) -> Result<Type> {
        match ty {
            ast::TypeExpr::Builtin(kind) => Ok(Type::Builtin(BuiltinType::from_ast(*kind))),
            ast::TypeExpr::Pointer(pointee) => Ok(Type::Pointer(
                Box::new(self.resolve_type(pointee)?),
                Qualifier::Mutable,
            )),
            ast::TypeExpr::Qualified(qualifier, inner) => {
                let inner = self.resolve_type(inner)?;
                match inner {
                    Type::Pointer(pointee, _) => {
                        Ok(Type::Pointer(pointee, Qualifier::from_ast(*qualifier)))
                    }
                    other => {
                        // Only pointers carry a qualifier in this model;
                        // value types are freely copyable anyway.
                        Ok(other)
                    }
                }
            }
            ast::TypeExpr::Slice(element) => {
                Ok(Type::Slice(Box::new(self.resolve_type(element)?)))
            }
            ast::TypeExpr::Array(element, extent) => {
                let element = self.resolve_type(element)?;
                let analyzed = self.analyze_expr(extent)?;
                let extent_value = self.evaluate_integral(&analyzed, extent.span())?;
                Ok(Type::Array(Box::new(element), extent_value))
            }
            ast::TypeExpr::Function(f) => {
                let mut params = Vec::new();
                for p in &f.params {
                    let ty = self.resolve_type(&p.ty)?;
                    params.push(crate::types::ParamType {
                        ty,
                        is_ref: crate::types::IsRef::from(p.is_ref),
                        is_final: crate::types::IsFinal::False,
                    });
                }
                let return_type = crate::types::ParamType::value(self.resolve_type(&f.return_type)?);
                Ok(Type::Function(Box::new(crate::types::FunctionType {
                    linkage: crate::symbols::Linkage::from_ast(f.linkage),
                    return_type,
                    params,
                    is_variadic: crate::types::IsVariadic::from(f.is_variadic),
                })))
            }
            ast::TypeExpr::Named(named) => self.resolve_named_type(named),
        }
    }

    fn resolve_named_type(&mut self, named: &ast::NamedType) -> Result<Type> {
        let sym = self.resolve_path(&named.path, named.span)?;
        if let Some(args) = &named.args {
            let instance = self.instantiate(sym, &args.clone(), named.span)?;
            self.require(instance, Step::Populated)?;
            // `S!(int)` where the template declares an eponymous aggregate
            // means that aggregate, not the instance shell.
            let last = named.path.last().expect("paths are non-empty");
            let last = self.context.get_name(last);
            let scope = self.symbols[instance].owned_scope().unwrap();
            if let Some(member) = self.symbols.lookup_local(scope, last) {
                if self.is_type_symbol(member) {
                    return Ok(Type::Aggregate(member));
                }
            }
            return Ok(Type::Aggregate(instance));
        }
        let mut sym = sym;
        loop {
            match &self.symbols[sym].kind {
                SymbolKind::Struct(_)
                | SymbolKind::Union(_)
                | SymbolKind::Class(_)
                | SymbolKind::Interface(_)
                | SymbolKind::Enum(_)
                | SymbolKind::TemplateInstance(_) => return Ok(Type::Aggregate(sym)),
                SymbolKind::TypeAlias(_) => {
                    self.require(sym, Step::Signed)?;
                    match &self.symbols[sym].kind {
                        SymbolKind::TypeAlias(TypeAliasSymbol { ty: Some(ty) }) => {
                            return Ok(ty.clone())
                        }
                        _ => unreachable!(),
                    }
                }
                SymbolKind::SymbolAlias(_) => {
                    self.require(sym, Step::Populated)?;
                    match &self.symbols[sym].kind {
                        SymbolKind::SymbolAlias(SymbolAliasSymbol {
                            target: Some(target),
                        }) => sym = *target,
                        _ => unreachable!(),
                    }
                }
                _ => {
                    let name = self.symbol_name(sym);
                    return Err(self.error(
                        SemanticErrorKind::UnsupportedConstruct(format!(
                            "'{name}' is not a type"
                        )),
                        named.span,
                    ));
                }
            }
        }
    }

    fn is_type_symbol(&self, sym: SymbolId) -> bool {
        matches!(
            self.symbols[sym].kind,
            SymbolKind::Struct(_)
                | SymbolKind::Union(_)
                | SymbolKind::Class(_)
                | SymbolKind::Interface(_)
                | SymbolKind::Enum(_)
                | SymbolKind::TypeAlias(_)
        )
    }

    //
    // Identifiers
    //

    /// Walk the scope chain for `name`, returning the symbol and the scope
    /// it was found in.
    fn lookup_with_scope(&self, name: Name) -> Option<(SymbolId, ScopeId)> {
        let mut scope = self.state.scope;
        loop {
            if let Some(sym) = self.symbols.lookup_local(scope, name) {
                return Some((sym, scope));
            }
            scope = self.symbols.scope(scope).parent?;
        }
    }

    pub(crate) fn resolve_identifier(
        &mut self,
        name: &str,
        location: Span,
    ) -> Result<(SymbolId, ScopeId)> {
        let interned = self.context.get_name(name);
        self.lookup_with_scope(interned).ok_or_else(|| {
            self.error(
                SemanticErrorKind::UnresolvedIdentifier(name.to_string()),
                location,
            )
        })
    }

    /// Resolve a dotted symbol path: the head through the scope chain, the
    /// rest through member scopes.
    pub(crate) fn resolve_path(&mut self, path: &[String], location: Span) -> Result<SymbolId> {
        let (mut sym, _) = self.resolve_identifier(&path[0], location)?;
        for component in &path[1..] {
            sym = self.member_lookup(sym, component, location)?;
        }
        Ok(sym)
    }

    pub(crate) fn member_lookup(
        &mut self,
        sym: SymbolId,
        name: &str,
        location: Span,
    ) -> Result<SymbolId> {
        let sym = self.follow_alias(sym)?;
        self.require(sym, Step::Populated)?;
        let scope = self.symbols[sym].owned_scope().ok_or_else(|| {
            self.error(
                SemanticErrorKind::UnresolvedIdentifier(name.to_string()),
                location,
            )
        })?;
        let interned = self.context.get_name(name);
        self.symbols.lookup_local(scope, interned).ok_or_else(|| {
            self.error(
                SemanticErrorKind::UnresolvedIdentifier(name.to_string()),
                location,
            )
        })
    }

    pub(crate) fn follow_alias(&mut self, mut sym: SymbolId) -> Result<SymbolId> {
        while matches!(self.symbols[sym].kind, SymbolKind::SymbolAlias(_)) {
            self.require(sym, Step::Populated)?;
            sym = match &self.symbols[sym].kind {
                SymbolKind::SymbolAlias(SymbolAliasSymbol {
                    target: Some(target),
                }) => *target,
                _ => unreachable!(),
            };
        }
        Ok(sym)
    }

    /// A local of an enclosing function referenced from a nested one is
    /// captured: its storage moves to `Capture` and it joins the owning
    /// function's closure set.
    fn mark_capture(&mut self, sym: SymbolId, defining_scope: ScopeId) {
        if self.symbols[sym].storage != Storage::Local {
            return;
        }
        if !matches!(self.symbols[sym].kind, SymbolKind::Variable(_)) {
            return;
        }
        let owner = self.symbols.scope(defining_scope).owner;
        if self.symbols[owner].function().is_none() {
            return;
        }
        if self.state.function == Some(owner) {
            return;
        }
        self.symbols[sym].storage = Storage::Capture;
        if let Some(func) = self.symbols[owner].function_mut() {
            if !func.closure.contains(&sym) {
                func.closure.push(sym);
            }
        }
    }

    /// The typed value of a name: variables read, functions reference,
    /// value aliases substitute.
    fn symbol_value_expr(&mut self, sym: SymbolId, location: Span) -> Result<TExpr> {
        let sym = self.follow_alias(sym)?;
        match &self.symbols[sym].kind {
            SymbolKind::Variable(_) => {
                self.require(sym, Step::Signed)?;
                let ty = match &self.symbols[sym].kind {
                    SymbolKind::Variable(v) => v.ty.clone(),
                    _ => unreachable!(),
                };
                Ok(TExpr::new(Expr::Variable(sym), ty))
            }
            SymbolKind::Field(_) => {
                self.require(sym, Step::Signed)?;
                let ty = match &self.symbols[sym].kind {
                    SymbolKind::Field(f) => f.ty.clone(),
                    _ => unreachable!(),
                };
                // An unqualified field read inside a method body; the code
                // generator routes it through the hidden receiver.
                Ok(TExpr::new(Expr::Variable(sym), ty))
            }
            SymbolKind::Function(_) | SymbolKind::Method(_) => {
                self.require(sym, Step::Signed)?;
                let ty = self.symbols[sym].function().unwrap().ty.clone().unwrap();
                Ok(TExpr::new(Expr::Function(sym), Type::Function(Box::new(ty))))
            }
            SymbolKind::ValueAlias(_) => {
                self.require(sym, Step::Signed)?;
                match &self.symbols[sym].kind {
                    SymbolKind::ValueAlias(ValueAliasSymbol { value: Some(value) }) => {
                        Ok(value.clone())
                    }
                    _ => unreachable!(),
                }
            }
            SymbolKind::OverloadSet(set) => {
                if set.set.len() == 1 {
                    let only = set.set[0];
                    self.symbol_value_expr(only, location)
                } else {
                    let name = self.symbol_name(sym);
                    Err(self.error(
                        SemanticErrorKind::UnsupportedConstruct(format!(
                            "ambiguous reference to overloaded '{name}'"
                        )),
                        location,
                    ))
                }
            }
            _ => {
                let name = self.symbol_name(sym);
                Err(self.error(
                    SemanticErrorKind::UnsupportedConstruct(format!(
                        "'{name}' cannot be used as a value"
                    )),
                    location,
                ))
            }
        }
    }

    //
    // Expressions
    //

    pub(crate) fn analyze_expr(&mut self, expr: &ast::Expr) -> Result<TExpr> {
        match expr {
            ast::Expr::IntegerLiteral(lit) => {
                let ty = if lit.is_long || lit.value > i32::MAX as u64 {
                    BuiltinType::Long
                } else {
                    BuiltinType::Int
                };
                Ok(TExpr::new(Expr::IntegerLiteral(lit.value), Type::Builtin(ty)))
            }
            ast::Expr::BoolLiteral(lit) => Ok(TExpr::new(
                Expr::BoolLiteral(lit.value),
                Type::Builtin(BuiltinType::Bool),
            )),
            ast::Expr::CharLiteral(lit) => Ok(TExpr::new(
                Expr::CharLiteral(lit.value),
                Type::Builtin(BuiltinType::Char),
            )),
            ast::Expr::StringLiteral(lit) => Ok(TExpr::new(
                Expr::StringLiteral(lit.value.clone()),
                Type::Slice(Box::new(Type::Builtin(BuiltinType::Char))),
            )),
            ast::Expr::NullLiteral(_) => Ok(TExpr::new(
                Expr::NullLiteral,
                Type::Builtin(BuiltinType::Null),
            )),
            ast::Expr::Identifier(id) => {
                let (sym, scope) = self.resolve_identifier(&id.name, id.span)?;
                self.mark_capture(sym, scope);
                self.symbol_value_expr(sym, id.span)
            }
            ast::Expr::Binary(binary) => self.analyze_binary(binary),
            ast::Expr::Unary(unary) => self.analyze_unary(unary),
            ast::Expr::Call(call) => self.analyze_call(call),
            ast::Expr::Field(field) => self.analyze_field(field),
            ast::Expr::Cast(cast) => self.analyze_cast(cast),
            ast::Expr::Instantiate(inst) => {
                let instance = self.instantiate_from_expr(inst)?;
                let last = inst.path.last().expect("paths are non-empty").clone();
                let member = self.member_lookup(instance, &last, inst.span)?;
                self.symbol_value_expr(member, inst.span)
            }
        }
    }

    fn analyze_binary(&mut self, binary: &ast::BinaryExpr) -> Result<TExpr> {
        use ast::BinaryOp::*;
        let op = binary.op;
        match op {
            Assign => {
                let lhs = self.analyze_expr(&binary.lhs)?;
                if !matches!(lhs.expression(), Expr::Variable(_) | Expr::FieldAccess(_)) {
                    return Err(self.error(
                        SemanticErrorKind::UnsupportedConstruct(
                            "left side of assignment is not an lvalue".to_string(),
                        ),
                        binary.span,
                    ));
                }
                let rhs = self.analyze_expr(&binary.rhs)?;
                let ty = lhs.get_type().clone();
                let rhs =
                    caster::implicit_cast(&self.symbols, &self.context, rhs, &ty, binary.span)?;
                Ok(TExpr::new(
                    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
                    ty,
                ))
            }
            Comma => {
                let lhs = self.analyze_expr(&binary.lhs)?;
                let rhs = self.analyze_expr(&binary.rhs)?;
                let ty = rhs.get_type().clone();
                Ok(TExpr::new(
                    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
                    ty,
                ))
            }
            LogicalAnd | LogicalOr => {
                let bool_ty = Type::Builtin(BuiltinType::Bool);
                let lhs = self.analyze_expr(&binary.lhs)?;
                let lhs =
                    caster::implicit_cast(&self.symbols, &self.context, lhs, &bool_ty, binary.span)?;
                let rhs = self.analyze_expr(&binary.rhs)?;
                let rhs =
                    caster::implicit_cast(&self.symbols, &self.context, rhs, &bool_ty, binary.span)?;
                Ok(TExpr::new(
                    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
                    bool_ty,
                ))
            }
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => {
                let lhs = self.analyze_expr(&binary.lhs)?;
                let rhs = self.analyze_expr(&binary.rhs)?;
                let operand_ty = self.common_type(&lhs, &rhs, binary.span)?;
                let lhs = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    lhs,
                    &operand_ty,
                    binary.span,
                )?;
                let rhs = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    rhs,
                    &operand_ty,
                    binary.span,
                )?;
                Ok(TExpr::new(
                    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
                    Type::Builtin(BuiltinType::Bool),
                ))
            }
            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | LeftShift | RightShift => {
                let lhs = self.analyze_expr(&binary.lhs)?;
                let rhs = self.analyze_expr(&binary.rhs)?;
                let ty = self.common_type(&lhs, &rhs, binary.span)?;
                let lhs =
                    caster::implicit_cast(&self.symbols, &self.context, lhs, &ty, binary.span)?;
                let rhs =
                    caster::implicit_cast(&self.symbols, &self.context, rhs, &ty, binary.span)?;
                Ok(TExpr::new(
                    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs })),
                    ty,
                ))
            }
        }
    }

    fn common_type(&self, lhs: &TExpr, rhs: &TExpr, span: Span) -> Result<Type> {
        if lhs.get_type() == rhs.get_type() && !lhs.get_type().is_auto() {
            return Ok(lhs.get_type().clone());
        }
        promote_types(&self.symbols, lhs.get_type(), rhs.get_type()).ok_or_else(|| {
            self.error(
                SemanticErrorKind::TypeMismatch {
                    from: caster::type_name(&self.symbols, &self.context, lhs.get_type()),
                    to: caster::type_name(&self.symbols, &self.context, rhs.get_type()),
                },
                span,
            )
        })
    }

    fn analyze_unary(&mut self, unary: &ast::UnaryExpr) -> Result<TExpr> {
        use ast::UnaryOp::*;
        let operand = self.analyze_expr(&unary.operand)?;
        match unary.op {
            Minus | Complement => {
                let ty = promote_types(&self.symbols, operand.get_type(), operand.get_type())
                    .ok_or_else(|| {
                        self.error(
                            SemanticErrorKind::TypeMismatch {
                                from: caster::type_name(
                                    &self.symbols,
                                    &self.context,
                                    operand.get_type(),
                                ),
                                to: "an integral type".to_string(),
                            },
                            unary.span,
                        )
                    })?;
                let operand =
                    caster::implicit_cast(&self.symbols, &self.context, operand, &ty, unary.span)?;
                Ok(TExpr::new(
                    Expr::Unary(Box::new(UnaryExpr {
                        op: unary.op,
                        operand,
                    })),
                    ty,
                ))
            }
            Not => {
                let bool_ty = Type::Builtin(BuiltinType::Bool);
                let operand = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    operand,
                    &bool_ty,
                    unary.span,
                )?;
                Ok(TExpr::new(
                    Expr::Unary(Box::new(UnaryExpr {
                        op: unary.op,
                        operand,
                    })),
                    bool_ty,
                ))
            }
            AddressOf => {
                let ty = Type::Pointer(Box::new(operand.get_type().clone()), Qualifier::Mutable);
                Ok(TExpr::new(
                    Expr::Unary(Box::new(UnaryExpr {
                        op: unary.op,
                        operand,
                    })),
                    ty,
                ))
            }
            Dereference => match operand.get_type().clone() {
                Type::Pointer(pointee, _) => Ok(TExpr::new(
                    Expr::Unary(Box::new(UnaryExpr {
                        op: unary.op,
                        operand,
                    })),
                    *pointee,
                )),
                other => Err(self.error(
                    SemanticErrorKind::TypeMismatch {
                        from: caster::type_name(&self.symbols, &self.context, &other),
                        to: "a pointer type".to_string(),
                    },
                    unary.span,
                )),
            },
        }
    }

    fn analyze_cast(&mut self, cast: &ast::CastExpr) -> Result<TExpr> {
        let ty = self.resolve_type(&cast.ty)?;
        let operand = self.analyze_expr(&cast.operand)?;
        let kind = caster::cast_kind(&self.symbols, operand.get_type(), &ty);
        let from_arith = operand
            .get_type()
            .unqual_builtin(&self.symbols)
            .is_some_and(|b| b.is_arithmetic());
        let to_arith = ty
            .unqual_builtin(&self.symbols)
            .is_some_and(|b| b.is_arithmetic());
        match kind {
            CastKind::Invalid if !(from_arith && to_arith) => Err(self.error(
                SemanticErrorKind::TypeMismatch {
                    from: caster::type_name(&self.symbols, &self.context, operand.get_type()),
                    to: caster::type_name(&self.symbols, &self.context, &ty),
                },
                cast.span,
            )),
            // An explicit cast may truncate.
            CastKind::Invalid => Ok(CastExpr::build(CastKind::Trunc, ty, operand)),
            kind => Ok(CastExpr::build(kind, ty, operand)),
        }
    }

    //
    // Calls
    //

    fn analyze_call(&mut self, call: &ast::CallExpr) -> Result<TExpr> {
        let mut args = Vec::new();
        for arg in &call.args {
            args.push(self.analyze_expr(arg)?);
        }

        let callee_sym = match &call.callee {
            ast::Expr::Identifier(id) => {
                let (sym, scope) = self.resolve_identifier(&id.name, id.span)?;
                self.mark_capture(sym, scope);
                Some(sym)
            }
            ast::Expr::Field(field) => {
                if let ast::Expr::Identifier(base) = &field.base {
                    let (base_sym, _) = self.resolve_identifier(&base.name, base.span)?;
                    let base_sym = self.follow_alias(base_sym)?;
                    if self.symbols[base_sym].owned_scope().is_some() {
                        Some(self.member_lookup(base_sym, &field.name, field.span)?)
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            ast::Expr::Instantiate(inst) => {
                let instance = self.instantiate_from_expr(inst)?;
                let last = inst.path.last().expect("paths are non-empty").clone();
                Some(self.member_lookup(instance, &last, inst.span)?)
            }
            _ => None,
        };

        match callee_sym {
            Some(sym) => self.call_symbol(sym, args, call.span),
            None => {
                let callee = self.analyze_expr(&call.callee)?;
                self.call_indirect(callee, args, call.span)
            }
        }
    }

    fn call_symbol(&mut self, sym: SymbolId, args: Vec<TExpr>, span: Span) -> Result<TExpr> {
        let sym = self.follow_alias(sym)?;
        let candidates: Vec<SymbolId> = match &self.symbols[sym].kind {
            SymbolKind::Function(_) | SymbolKind::Method(_) => vec![sym],
            SymbolKind::OverloadSet(set) => set.set.clone(),
            SymbolKind::Template(_) => {
                let function = self.ifti_call(sym, &args, span)?;
                vec![function]
            }
            SymbolKind::Variable(_) | SymbolKind::Field(_) | SymbolKind::ValueAlias(_) => {
                let callee = self.symbol_value_expr(sym, span)?;
                return self.call_indirect(callee, args, span);
            }
            _ => {
                let name = self.symbol_name(sym);
                return Err(self.error(
                    SemanticErrorKind::UnsupportedConstruct(format!("'{name}' is not callable")),
                    span,
                ));
            }
        };

        // Templates inside an overload set take part through IFTI.
        let mut functions = Vec::new();
        for candidate in candidates {
            match &self.symbols[candidate].kind {
                SymbolKind::Template(_) => {
                    if let Ok(function) = self.ifti_call(candidate, &args, span) {
                        functions.push(function);
                    }
                }
                _ => functions.push(candidate),
            }
        }

        let chosen = self.select_overload(&functions, &args, span)?;
        self.build_call(chosen, args, span)
    }

    /// Rank candidates by their worst per-argument conversion; the closest
    /// match wins and ties are ambiguous.
    fn select_overload(
        &mut self,
        candidates: &[SymbolId],
        args: &[TExpr],
        span: Span,
    ) -> Result<SymbolId> {
        let mut best: Option<(CastKind, SymbolId)> = None;
        let mut ambiguous = false;
        let mut arity_match: Option<SymbolId> = None;
        let mut arity_matches = 0usize;
        for candidate in candidates {
            self.require(*candidate, Step::Signed)?;
            let ty = match self.symbols[*candidate].function().and_then(|f| f.ty.clone()) {
                Some(ty) => ty,
                None => continue,
            };
            let visible: Vec<_> = ty
                .params
                .iter()
                .filter(|p| !matches!(p.ty, Type::Context(_)))
                .collect();
            if visible.len() != args.len() {
                continue;
            }
            arity_matches += 1;
            arity_match = Some(*candidate);
            let mut worst = CastKind::Exact;
            for (arg, param) in args.iter().zip(visible.iter()) {
                let kind = caster::cast_kind(&self.symbols, arg.get_type(), &param.ty);
                worst = std::cmp::min(worst, kind);
            }
            if worst <= CastKind::Trunc {
                continue;
            }
            match best {
                None => best = Some((worst, *candidate)),
                Some((best_kind, _)) if worst > best_kind => {
                    best = Some((worst, *candidate));
                    ambiguous = false;
                }
                Some((best_kind, _)) if worst == best_kind => ambiguous = true,
                Some(_) => {}
            }
        }
        if let Some((_, chosen)) = best {
            if ambiguous {
                return Err(self.error(
                    SemanticErrorKind::UnsupportedConstruct("ambiguous call".to_string()),
                    span,
                ));
            }
            return Ok(chosen);
        }
        // No candidate converts cleanly. With a single arity match, let the
        // caster have the final word: value range propagation may still
        // prove a narrowing argument safe.
        if arity_matches == 1 {
            if let Some(only) = arity_match {
                return Ok(only);
            }
        }
        Err(self.error(
            SemanticErrorKind::UnsupportedConstruct("no matching overload".to_string()),
            span,
        ))
    }

    fn build_call(&mut self, function: SymbolId, args: Vec<TExpr>, span: Span) -> Result<TExpr> {
        self.require(function, Step::Signed)?;
        let ty = self.symbols[function]
            .function()
            .and_then(|f| f.ty.clone())
            .expect("signed function without a type");
        let visible: Vec<_> = ty
            .params
            .iter()
            .filter(|p| !matches!(p.ty, Type::Context(_)))
            .cloned()
            .collect();
        if visible.len() != args.len() {
            return Err(self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "wrong number of arguments".to_string(),
                ),
                span,
            ));
        }
        let mut cast_args = Vec::new();
        for (arg, param) in args.into_iter().zip(visible.iter()) {
            cast_args.push(caster::implicit_cast(
                &self.symbols,
                &self.context,
                arg,
                &param.ty,
                span,
            )?);
        }
        let return_ty = ty.return_type.ty.clone();
        let callee = TExpr::new(Expr::Function(function), Type::Function(Box::new(ty)));
        Ok(TExpr::new(
            Expr::Call(Box::new(CallExpr {
                callee,
                args: cast_args,
            })),
            return_ty,
        ))
    }

    fn call_indirect(&mut self, callee: TExpr, args: Vec<TExpr>, span: Span) -> Result<TExpr> {
        let ty = match callee.get_type() {
            Type::Function(ty) => ty.as_ref().clone(),
            other => {
                return Err(self.error(
                    SemanticErrorKind::TypeMismatch {
                        from: caster::type_name(&self.symbols, &self.context, other),
                        to: "a callable type".to_string(),
                    },
                    span,
                ))
            }
        };
        if ty.params.len() != args.len() {
            return Err(self.error(
                SemanticErrorKind::UnsupportedConstruct("wrong number of arguments".to_string()),
                span,
            ));
        }
        let mut cast_args = Vec::new();
        for (arg, param) in args.into_iter().zip(ty.params.iter()) {
            cast_args.push(caster::implicit_cast(
                &self.symbols,
                &self.context,
                arg,
                &param.ty,
                span,
            )?);
        }
        let return_ty = ty.return_type.ty.clone();
        Ok(TExpr::new(
            Expr::Call(Box::new(CallExpr {
                callee,
                args: cast_args,
            })),
            return_ty,
        ))
    }

    //
    // Member access
    //

    fn analyze_field(&mut self, field: &ast::FieldExpr) -> Result<TExpr> {
        // `Scope.name` where the base names a module, aggregate, enum, or
        // instance resolves statically.
        if let ast::Expr::Identifier(base) = &field.base {
            let (base_sym, _) = self.resolve_identifier(&base.name, base.span)?;
            let base_sym = self.follow_alias(base_sym)?;
            if self.symbols[base_sym].owned_scope().is_some()
                && self.symbols[base_sym].function().is_none()
            {
                let member = self.member_lookup(base_sym, &field.name, field.span)?;
                return self.symbol_value_expr(member, field.span);
            }
        }

        let base = self.analyze_expr(&field.base)?;
        let aggregate = match base.get_type() {
            Type::Aggregate(sym) => *sym,
            other => {
                return Err(self.error(
                    SemanticErrorKind::TypeMismatch {
                        from: caster::type_name(&self.symbols, &self.context, other),
                        to: "an aggregate type".to_string(),
                    },
                    field.span,
                ))
            }
        };
        let member = self.member_lookup(aggregate, &field.name, field.span)?;
        match &self.symbols[member].kind {
            SymbolKind::Field(_) => {
                self.require(member, Step::Signed)?;
                let ty = match &self.symbols[member].kind {
                    SymbolKind::Field(f) => f.ty.clone(),
                    _ => unreachable!(),
                };
                Ok(TExpr::new(
                    Expr::FieldAccess(Box::new(FieldAccess {
                        base,
                        field: member,
                    })),
                    ty,
                ))
            }
            _ => self.symbol_value_expr(member, field.span),
        }
    }

    //
    // Template instantiation
    //

    fn instantiate_from_expr(&mut self, inst: &ast::InstantiateExpr) -> Result<SymbolId> {
        let template = self.resolve_path(&inst.path, inst.span)?;
        self.instantiate(template, &inst.args, inst.span)
    }

    /// Resolve explicit template arguments against the caller's scope and
    /// instantiate.
    pub(crate) fn instantiate(
        &mut self,
        template: SymbolId,
        args: &[ast::TemplateArg],
        span: Span,
    ) -> Result<SymbolId> {
        let template = self.follow_alias(template)?;
        if !matches!(self.symbols[template].kind, SymbolKind::Template(_)) {
            let name = self.symbol_name(template);
            return Err(self.error(
                SemanticErrorKind::UnsupportedConstruct(format!("'{name}' is not a template")),
                span,
            ));
        }
        self.require(template, Step::Populated)?;
        let params = match &self.symbols[template].kind {
            SymbolKind::Template(t) => t.params.clone(),
            _ => unreachable!(),
        };
        if params.len() != args.len() {
            return Err(self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "wrong number of template arguments".to_string(),
                ),
                span,
            ));
        }
        let mut resolved = Vec::new();
        for (param, arg) in params.iter().zip(args.iter()) {
            let is_alias = matches!(
                self.symbols[*param].kind,
                SymbolKind::AliasParameter(_) | SymbolKind::TypedAliasParameter(_)
            );
            let value = match arg {
                ast::TemplateArg::Type(ty) => ResolvedArg::Type(self.resolve_type(&ty.clone())?),
                ast::TemplateArg::Value(expr) => {
                    if is_alias {
                        match expr {
                            ast::Expr::Identifier(id) => {
                                let (sym, _) = self.resolve_identifier(&id.name, id.span)?;
                                ResolvedArg::Symbol(sym)
                            }
                            _ => {
                                return Err(self.error(
                                    SemanticErrorKind::UnsupportedConstruct(
                                        "alias argument must be a symbol".to_string(),
                                    ),
                                    span,
                                ))
                            }
                        }
                    } else {
                        let analyzed = self.analyze_expr(&expr.clone())?;
                        let folded = self.evaluate(&analyzed, span)?;
                        ResolvedArg::Value(folded)
                    }
                }
            };
            resolved.push(value);
        }
        self.instantiate_resolved(template, resolved, span)
    }

    pub(crate) fn instantiate_resolved(
        &mut self,
        template: SymbolId,
        args: Vec<ResolvedArg>,
        span: Span,
    ) -> Result<SymbolId> {
        self.require(template, Step::Populated)?;
        let (params, template_scope, parent_prefix) = match &self.symbols[template].kind {
            SymbolKind::Template(t) => (t.params.clone(), t.scope, t.mangle_prefix.clone()),
            _ => unreachable!(),
        };
        assert_eq!(params.len(), args.len(), "argument matcher missed a slot");

        let mut key = String::new();
        for arg in &args {
            match arg {
                ResolvedArg::Type(ty) => {
                    key.push_str(&TypeMangler::new(&self.symbols, &self.context).mangle(ty));
                }
                ResolvedArg::Value(value) => match value.expression() {
                    Expr::IntegerLiteral(v) => key.push_str(&format!("V{v}")),
                    Expr::BoolLiteral(b) => key.push_str(&format!("V{}", *b as u8)),
                    _ => {
                        return Err(self.error(
                            SemanticErrorKind::UnsupportedConstruct(
                                "unsupported template value argument".to_string(),
                            ),
                            span,
                        ))
                    }
                },
                ResolvedArg::Symbol(sym) => {
                    key.push('S');
                    mangle_component(&mut key, &self.symbol_name(*sym));
                }
            }
        }

        if let SymbolKind::Template(t) = &self.symbols[template].kind {
            if let Some(existing) = t.instances.get(&key) {
                return Ok(*existing);
            }
        }

        let template_name = self.symbols[template].name;
        let template_name_str = self.symbol_name(template);
        let mut mangle = parent_prefix;
        mangle.push_str("__T");
        mangle_component(&mut mangle, &template_name_str);
        mangle.push_str(&key);
        mangle.push('Z');

        let (instance, instance_scope) = self.symbols.new_symbol_and_scope(
            span,
            template_name,
            Some(template_scope),
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::TemplateInstance(InstanceSymbol {
                    scope,
                    template,
                    arguments: Vec::new(),
                    members: Vec::new(),
                    ctx: None,
                })
            },
        );
        self.symbols[instance].mangle = Some(self.context.get_name(&mangle));

        // Pre-populate the instance scope with the argument symbols the
        // member declarations will resolve against.
        let mut argument_syms = Vec::new();
        for (param, arg) in params.iter().zip(args.into_iter()) {
            let name = self.symbols[*param].name;
            let location = self.symbols[*param].location;
            let kind = match arg {
                ResolvedArg::Type(ty) => SymbolKind::TypeAlias(TypeAliasSymbol { ty: Some(ty) }),
                ResolvedArg::Value(value) => {
                    SymbolKind::ValueAlias(ValueAliasSymbol { value: Some(value) })
                }
                ResolvedArg::Symbol(target) => {
                    SymbolKind::SymbolAlias(SymbolAliasSymbol {
                        target: Some(target),
                    })
                }
            };
            let mut symbol = Symbol::new(location, name, kind);
            symbol.set_step(Step::Processed);
            let arg_sym = self.symbols.new_symbol(symbol);
            self.symbols
                .add_symbol(instance_scope, name, arg_sym)
                .expect("fresh instance scope cannot collide");
            argument_syms.push(arg_sym);
        }

        // Members that close over a function frame make the whole instance
        // local to it.
        let ctx = self.state.ctx_sym;
        if let SymbolKind::TemplateInstance(i) = &mut self.symbols[instance].kind {
            i.arguments = argument_syms;
            i.ctx = ctx;
        }
        if ctx.is_some() {
            self.symbols[instance].storage = Storage::Local;
            self.symbols[instance].has_context = true;
        }

        if let SymbolKind::Template(t) = &mut self.symbols[template].kind {
            t.instances.insert(key, instance);
        }

        let state = crate::pass::State::for_instance(instance_scope, mangle, &self.state);
        self.scheduler.schedule_stateless(state, instance);
        Ok(instance)
    }

    /// Implicit function template instantiation: deduce the template
    /// arguments from the call arguments using the cached matching shape,
    /// instantiate, and return the eponymous function.
    fn ifti_call(&mut self, template: SymbolId, args: &[TExpr], span: Span) -> Result<SymbolId> {
        self.require(template, Step::Populated)?;
        let (shape, params) = match &self.symbols[template].kind {
            SymbolKind::Template(t) => (t.ifti.clone(), t.params.clone()),
            _ => unreachable!(),
        };
        let shape = shape.ok_or_else(|| {
            self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "cannot deduce template arguments".to_string(),
                ),
                span,
            )
        })?;
        if shape.len() != args.len() {
            return Err(self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "wrong number of arguments for template function".to_string(),
                ),
                span,
            ));
        }
        let mut deduced: Vec<Option<ResolvedArg>> = vec![None; params.len()];
        for (slot, arg) in shape.iter().zip(args.iter()) {
            if let crate::symbols::IftiParam::Deduce(index) = slot {
                let ty = arg.get_type().clone();
                match &deduced[*index] {
                    None => deduced[*index] = Some(ResolvedArg::Type(ty)),
                    Some(ResolvedArg::Type(previous)) if *previous == ty => {}
                    Some(_) => {
                        return Err(self.error(
                            SemanticErrorKind::UnsupportedConstruct(
                                "conflicting deduced template arguments".to_string(),
                            ),
                            span,
                        ))
                    }
                }
            }
        }
        let resolved: Vec<ResolvedArg> = deduced
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                self.error(
                    SemanticErrorKind::UnsupportedConstruct(
                        "cannot deduce template arguments".to_string(),
                    ),
                    span,
                )
            })?;
        let instance = self.instantiate_resolved(template, resolved, span)?;
        self.require(instance, Step::Populated)?;
        let name = self.symbol_name(template);
        let function = self.member_lookup(instance, &name, span)?;
        match &self.symbols[function].kind {
            SymbolKind::Function(_) | SymbolKind::Method(_) => Ok(function),
            SymbolKind::OverloadSet(set) if set.set.len() == 1 => Ok(set.set[0]),
            _ => Err(self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "template does not define a matching function".to_string(),
                ),
                span,
            )),
        }
    }

    //
    // Statements
    //

    pub(crate) fn analyze_block(&mut self, block: &ast::Block) -> Result<TBlock> {
        let owner = self.symbols.scope(self.state.scope).owner;
        let scope = self
            .symbols
            .new_scope(Some(self.state.scope), owner, ScopeKind::Symbol);
        let saved = self.state.scope;
        self.state.scope = scope;
        let mut stmts = Vec::new();
        let mut failed = None;
        for stmt in &block.stmts {
            match self.analyze_stmt(stmt) {
                Ok(analyzed) => stmts.push(analyzed),
                Err(error) => {
                    failed = Some(error);
                    break;
                }
            }
        }
        self.state.scope = saved;
        match failed {
            Some(error) => Err(error),
            None => Ok(TBlock { stmts }),
        }
    }

    fn analyze_stmt(&mut self, stmt: &ast::Stmt) -> Result<TStmt> {
        match stmt {
            ast::Stmt::Block(block) => Ok(TStmt::Block(self.analyze_block(block)?)),
            ast::Stmt::Expr(expr) => Ok(TStmt::Expr(self.analyze_expr(expr)?)),
            ast::Stmt::Variable(d) => self.analyze_local_variable(d),
            ast::Stmt::Return(ret) => self.analyze_return(ret),
            ast::Stmt::If(if_stmt) => {
                let bool_ty = Type::Builtin(BuiltinType::Bool);
                let condition = self.analyze_expr(&if_stmt.condition)?;
                let condition = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    condition,
                    &bool_ty,
                    if_stmt.span,
                )?;
                let then_branch = self.analyze_stmt(&if_stmt.then_branch)?;
                let else_branch = match &if_stmt.else_branch {
                    Some(stmt) => Some(self.analyze_stmt(stmt)?),
                    None => None,
                };
                Ok(TStmt::If(Box::new(TIf {
                    condition,
                    then_branch,
                    else_branch,
                })))
            }
            ast::Stmt::While(while_stmt) => {
                let bool_ty = Type::Builtin(BuiltinType::Bool);
                let condition = self.analyze_expr(&while_stmt.condition)?;
                let condition = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    condition,
                    &bool_ty,
                    while_stmt.span,
                )?;
                let body = self.analyze_stmt(&while_stmt.body)?;
                Ok(TStmt::While(Box::new(TWhile { condition, body })))
            }
            ast::Stmt::Declaration(decl) => {
                let mut created = Vec::new();
                self.flatten_decl(decl, &mut created)?;
                match created.as_slice() {
                    [single] => Ok(TStmt::Declaration(*single)),
                    many => Ok(TStmt::Block(TBlock {
                        stmts: many.iter().map(|sym| TStmt::Declaration(*sym)).collect(),
                    })),
                }
            }
        }
    }

    fn analyze_local_variable(&mut self, d: &ast::VariableDecl) -> Result<TStmt> {
        let declared = match &d.ty {
            Some(ty) => Some(self.resolve_type(ty)?),
            None => None,
        };
        let init = match &d.init {
            Some(expr) => Some(self.analyze_expr(expr)?),
            None => None,
        };
        let (ty, value) = match declared {
            None => {
                let init = init.ok_or_else(|| {
                    self.error(
                        SemanticErrorKind::UnsupportedConstruct(
                            "cannot infer a type without an initializer".to_string(),
                        ),
                        d.span,
                    )
                })?;
                (init.get_type().clone(), init)
            }
            Some(ty) => {
                let value = match init {
                    Some(expr) => self.cast_to_declared(expr, &ty, d.span)?,
                    None => self.default_init(&ty, d.span)?,
                };
                (ty, value)
            }
        };
        let value = if d.storage.is_enum {
            self.evaluate(&value, d.span)?
        } else {
            value
        };

        let name = self.context.get_name(&d.name);
        let mut symbol = Symbol::new(
            d.span,
            name,
            SymbolKind::Variable(VariableSymbol {
                ty,
                value: Some(value),
                is_final: d.storage.is_final,
            }),
        );
        symbol.storage = if d.storage.is_enum {
            Storage::Enum
        } else if d.storage.is_static {
            Storage::Static
        } else {
            Storage::Local
        };
        symbol.set_step(Step::Processed);
        let sym = self.symbols.new_symbol(symbol);
        self.symbols
            .add_symbol(self.state.scope, name, sym)
            .map_err(|_| {
                self.error(SemanticErrorKind::DuplicateSymbol(d.name.clone()), d.span)
            })?;
        Ok(TStmt::Variable(sym))
    }

    fn analyze_return(&mut self, ret: &ast::ReturnStmt) -> Result<TStmt> {
        let value = match &ret.value {
            Some(expr) => Some(self.analyze_expr(expr)?),
            None => None,
        };
        match self.state.return_type.clone() {
            Some(expected) => {
                let void = Type::Builtin(BuiltinType::Void);
                if expected.ty == void {
                    match value {
                        None => Ok(TStmt::Return(None)),
                        Some(v) if v.get_type() == &void => Ok(TStmt::Return(Some(v))),
                        Some(v) => Err(self.error(
                            SemanticErrorKind::TypeMismatch {
                                from: caster::type_name(&self.symbols, &self.context, v.get_type()),
                                to: "void".to_string(),
                            },
                            ret.span,
                        )),
                    }
                } else {
                    let v = value.ok_or_else(|| {
                        self.error(
                            SemanticErrorKind::TypeMismatch {
                                from: "void".to_string(),
                                to: caster::type_name(&self.symbols, &self.context, &expected.ty),
                            },
                            ret.span,
                        )
                    })?;
                    let v = caster::implicit_cast(
                        &self.symbols,
                        &self.context,
                        v,
                        &expected.ty,
                        ret.span,
                    )?;
                    Ok(TStmt::Return(Some(v)))
                }
            }
            None => {
                // `auto` function: remember the type for inference.
                let ty = value
                    .as_ref()
                    .map(|v| v.get_type().clone())
                    .unwrap_or(Type::Builtin(BuiltinType::Void));
                self.state.inferred_returns.push(ty);
                Ok(TStmt::Return(value))
            }
        }
    }

    //
    // Default construction
    //

    /// The default value of `ty`: what a variable without an initializer
    /// holds. Char types default to their invalid-codepoint sentinels, as
    /// the language requires.
    pub(crate) fn default_init(&mut self, ty: &Type, location: Span) -> Result<TExpr> {
        match ty {
            Type::Builtin(builtin) => {
                use BuiltinType::*;
                let expr = match builtin {
                    Bool => Expr::BoolLiteral(false),
                    Char => Expr::IntegerLiteral(0xFF),
                    Wchar => Expr::IntegerLiteral(0xFFFF),
                    Dchar => Expr::IntegerLiteral(0xFFFF),
                    Null => Expr::NullLiteral,
                    Void | None => {
                        return Err(self.error(
                            SemanticErrorKind::UnsupportedConstruct(
                                "cannot default-construct void".to_string(),
                            ),
                            location,
                        ))
                    }
                    _ => Expr::IntegerLiteral(0),
                };
                Ok(TExpr::new(expr, ty.clone()))
            }
            Type::Pointer(..) | Type::Function(..) => {
                Ok(TExpr::new(Expr::NullLiteral, ty.clone()))
            }
            Type::Slice(..) => Ok(TExpr::new(Expr::NullLiteral, ty.clone())),
            Type::Array(..) | Type::Context(..) => {
                Ok(TExpr::new(Expr::DefaultInit, ty.clone()))
            }
            Type::Aggregate(sym) => {
                let sym = *sym;
                match &self.symbols[sym].kind {
                    SymbolKind::Struct(_) => {
                        self.require(sym, Step::Signed)?;
                        let init = match &self.symbols[sym].kind {
                            SymbolKind::Struct(a) => a.init.expect("signed struct has an init"),
                            _ => unreachable!(),
                        };
                        Ok(TExpr::new(Expr::Variable(init), ty.clone()))
                    }
                    SymbolKind::Union(_) => Ok(TExpr::new(Expr::VoidInit, ty.clone())),
                    SymbolKind::Class(_) | SymbolKind::Interface(_) => {
                        Ok(TExpr::new(Expr::NullLiteral, ty.clone()))
                    }
                    SymbolKind::Enum(_) => {
                        self.require(sym, Step::Signed)?;
                        let first = match &self.symbols[sym].kind {
                            SymbolKind::Enum(e) => e.entries.first().copied(),
                            _ => unreachable!(),
                        };
                        match first {
                            Some(entry) => Ok(TExpr::new(Expr::Variable(entry), ty.clone())),
                            Option::None => {
                                Ok(TExpr::new(Expr::IntegerLiteral(0), ty.clone()))
                            }
                        }
                    }
                    _ => Ok(TExpr::new(Expr::DefaultInit, ty.clone())),
                }
            }
        }
    }
}
