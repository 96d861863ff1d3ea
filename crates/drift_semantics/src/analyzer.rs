// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The symbol analyzer: one routine per (declaration kind, stage).
//
// `require` is the scheduler contract: it returns only after the symbol has
// published the requested stage, advancing it on the caller's stack when
// necessary. Intermediate stages publish as soon as they are reached, which
// is what lets mutually recursive declarations converge instead of
// deadlocking; a genuine cycle (two symbols each demanding a strictly
// higher stage of the other) surfaces as a `Cycle` error.
//
// Every stage runs under the ambient state its task captured at scheduling
// time; `run_stage` swaps that state in and restores the caller's state on
// every exit path.

use std::rc::Rc;

use drift_ast as ast;
use drift_source_file::Span;

use crate::caster;
use crate::ir::{CastExpr, CastKind, Expr, TExpr};
use crate::mangler::{mangle_component, TypeMangler};
use crate::semantic_error::{Result, SemanticErrorKind};
use crate::symbols::{
    AliasParameterSymbol, FieldSymbol, IftiParam, ScopeKind, Step, Storage, Symbol, SymbolId,
    SymbolKind, TypeParameterSymbol, TypedAliasParameterSymbol, ValueParameterSymbol,
    VariableSymbol,
};
use crate::types::{promote_types, BuiltinType, FunctionType, IsFinal, IsRef, ParamType, Type};

use crate::pass::SemanticPass;

impl SemanticPass {
    /// Return only after `sym.step >= target`.
    pub fn require(&mut self, sym: SymbolId, target: Step) -> Result<()> {
        while self.symbols[sym].step() < target {
            if self.scheduler.is_in_flight(sym) {
                let name = self.symbol_name(sym);
                return Err(self.error(SemanticErrorKind::Cycle(name), self.symbols[sym].location));
            }
            self.advance(sym)?;
        }
        Ok(())
    }

    /// Run one stage of `sym`'s task.
    fn advance(&mut self, sym: SymbolId) -> Result<()> {
        let next = self.symbols[sym].step().next();
        let began = self.scheduler.begin(sym, next);
        assert!(began, "advance raced with an in-flight stage");
        let result = self.run_stage(sym, next);
        self.scheduler.finish(sym);
        result
    }

    fn run_stage(&mut self, sym: SymbolId, step: Step) -> Result<()> {
        let task = match self.scheduler.task(sym) {
            Some(task) => task,
            None => {
                // Symbols built whole by their creator (parameters, init
                // variables, overload sets) have nothing left to compute.
                self.symbols[sym].set_step(step);
                return Ok(());
            }
        };
        let saved = std::mem::replace(&mut self.state, task.state.clone());
        let result = match &task.decl {
            Some(decl) => self.dispatch(sym, &decl.clone(), step),
            None => self.dispatch_stateless(sym, step),
        };
        self.state = saved;
        result
    }

    fn dispatch(&mut self, sym: SymbolId, decl: &Rc<ast::Decl>, step: Step) -> Result<()> {
        match &**decl {
            ast::Decl::Function(d) => match step {
                Step::Populated => self.function_populate(sym, d),
                Step::Signed => self.function_sign(sym, d),
                Step::Processed => self.function_process(sym, d),
                Step::Parsed => unreachable!(),
            },
            ast::Decl::Variable(d) => match step {
                Step::Populated => {
                    self.symbols[sym].set_step(Step::Populated);
                    Ok(())
                }
                Step::Signed => self.variable_sign(sym, d),
                Step::Processed => self.variable_process(sym, d),
                Step::Parsed => unreachable!(),
            },
            ast::Decl::Struct(d) | ast::Decl::Union(d) => match step {
                Step::Populated => self.aggregate_populate(sym, d),
                Step::Signed => self.aggregate_sign(sym, d),
                Step::Processed => self.aggregate_process(sym),
                Step::Parsed => unreachable!(),
            },
            ast::Decl::Class(d) => match step {
                Step::Populated => self.class_populate(sym, d),
                Step::Signed => self.class_sign(sym),
                Step::Processed => self.class_process(sym),
                Step::Parsed => unreachable!(),
            },
            ast::Decl::Interface(d) => match step {
                Step::Populated => self.interface_populate(sym, d),
                _ => {
                    self.symbols[sym].set_step(step);
                    Ok(())
                }
            },
            ast::Decl::Enum(d) => match step {
                Step::Populated => self.enum_populate(sym, d),
                Step::Signed => self.enum_sign(sym),
                Step::Processed => self.enum_process(sym),
                Step::Parsed => unreachable!(),
            },
            ast::Decl::Template(d) => match step {
                Step::Populated => self.template_populate(sym, d),
                _ => {
                    self.symbols[sym].set_step(step);
                    Ok(())
                }
            },
            ast::Decl::Alias(d) => self.alias_stage(sym, d, step),
            _ => panic!("declaration kind does not schedule a task"),
        }
    }

    fn dispatch_stateless(&mut self, sym: SymbolId, step: Step) -> Result<()> {
        match &self.symbols[sym].kind {
            SymbolKind::Module(_) => self.module_stage(sym, step),
            SymbolKind::TemplateInstance(_) => self.instance_stage(sym, step),
            _ => {
                self.symbols[sym].set_step(step);
                Ok(())
            }
        }
    }

    //
    // Module
    //

    fn module_stage(&mut self, sym: SymbolId, step: Step) -> Result<()> {
        match step {
            Step::Populated => {
                // Every module starts with an implicit import of the
                // builtin object module.
                if sym != self.object.module {
                    let object_module = self.object.module;
                    self.symbols
                        .scope_mut(self.state.scope)
                        .imports
                        .push(object_module);
                }
                let module = self
                    .module_asts
                    .get(&sym)
                    .expect("module scheduled without its AST")
                    .clone();
                let mut members = Vec::new();
                self.flatten_decls(&module.decls, &mut members)?;
                if let SymbolKind::Module(m) = &mut self.symbols[sym].kind {
                    m.members = members;
                }
                self.symbols[sym].set_step(Step::Populated);
                Ok(())
            }
            Step::Signed => {
                self.symbols[sym].set_step(Step::Signed);
                Ok(())
            }
            Step::Processed => {
                let members = match &self.symbols[sym].kind {
                    SymbolKind::Module(m) => m.members.clone(),
                    _ => unreachable!(),
                };
                for member in members {
                    self.require(member, Step::Processed)?;
                }
                self.symbols[sym].set_step(Step::Processed);
                Ok(())
            }
            Step::Parsed => unreachable!(),
        }
    }

    //
    // Functions and methods
    //

    fn function_populate(&mut self, sym: SymbolId, d: &ast::FunctionDecl) -> Result<()> {
        let has_context = self.symbols[sym].has_context;
        let scope_kind = if has_context {
            ScopeKind::Closure
        } else {
            ScopeKind::Symbol
        };
        let scope = self.symbols.new_scope(Some(self.state.scope), sym, scope_kind);
        self.state.scope = scope;

        let mut param_ids = Vec::new();
        let mut param_types = Vec::new();

        if has_context {
            let ctx = self.state.ctx_sym.ok_or_else(|| {
                self.error(
                    SemanticErrorKind::UnsupportedConstruct(
                        "closure without an enclosing function".to_string(),
                    ),
                    d.span,
                )
            })?;
            let ty = Type::Context(ctx);
            let param = self.make_param(d.span, "__ctx", ty.clone(), None)?;
            param_ids.push(param);
            param_types.push(ParamType::value(ty));
        }

        let is_ctor = d.name == "this";
        if is_ctor {
            let this_ty = self.state.this_type.clone().ok_or_else(|| {
                self.error(
                    SemanticErrorKind::UnsupportedConstruct(
                        "constructor outside an aggregate".to_string(),
                    ),
                    d.span,
                )
            })?;
            let by_ref = self.ctor_takes_ref_this(&this_ty);
            let param = self.make_param(d.span, "this", this_ty.clone(), None)?;
            param_ids.push(param);
            param_types.push(ParamType {
                ty: this_ty,
                is_ref: IsRef::from(by_ref),
                is_final: IsFinal::False,
            });
        }

        for p in &d.params {
            let ty = self.resolve_type(&p.ty)?;
            let default = match &p.default {
                Some(expr) => {
                    let analyzed = self.analyze_expr(expr)?;
                    Some(caster::implicit_cast(
                        &self.symbols,
                        &self.context,
                        analyzed,
                        &ty,
                        p.span,
                    )?)
                }
                None => None,
            };
            let param = self.make_param(p.span, &p.name, ty.clone(), default)?;
            param_ids.push(param);
            param_types.push(ParamType {
                ty,
                is_ref: IsRef::from(p.is_ref),
                is_final: IsFinal::from(p.is_final),
            });
        }

        let mut prefix = self.state.mangle_prefix.clone();
        mangle_component(&mut prefix, if is_ctor { "__ctor" } else { &d.name });
        let func = self.symbols[sym]
            .function_mut()
            .expect("function declaration bound to a non-function symbol");
        func.scope = Some(scope);
        func.params = param_ids;
        func.param_types = param_types;
        func.mangle_prefix = prefix;
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    /// Struct and union constructors build in place through a ref `this`;
    /// class constructors receive the reference by value.
    fn ctor_takes_ref_this(&self, this_ty: &Type) -> bool {
        match this_ty {
            Type::Aggregate(s) => matches!(
                self.symbols[*s].kind,
                SymbolKind::Struct(_) | SymbolKind::Union(_)
            ),
            _ => false,
        }
    }

    fn make_param(
        &mut self,
        span: Span,
        name: &str,
        ty: Type,
        default: Option<TExpr>,
    ) -> Result<SymbolId> {
        let interned = self.context.get_name(name);
        let mut symbol = Symbol::new(
            span,
            interned,
            SymbolKind::Variable(VariableSymbol {
                ty,
                value: default,
                is_final: false,
            }),
        );
        symbol.storage = Storage::Local;
        symbol.set_step(Step::Processed);
        let sym = self.symbols.new_symbol(symbol);
        self.symbols
            .add_symbol(self.state.scope, interned, sym)
            .map_err(|_| {
                self.error(SemanticErrorKind::DuplicateSymbol(name.to_string()), span)
            })?;
        Ok(sym)
    }

    fn function_sign(&mut self, sym: SymbolId, d: &ast::FunctionDecl) -> Result<()> {
        let is_ctor = d.name == "this";
        let return_type = if is_ctor {
            let this_ty = self.state.this_type.clone().expect("checked at populate");
            let by_ref = self.ctor_takes_ref_this(&this_ty);
            ParamType {
                ty: this_ty,
                is_ref: IsRef::from(by_ref),
                is_final: IsFinal::False,
            }
        } else {
            match &d.return_type {
                Some(ty) => {
                    let ty = self.resolve_type(ty)?;
                    ParamType {
                        ty,
                        is_ref: IsRef::from(d.is_ref_return),
                        is_final: IsFinal::False,
                    }
                }
                None => {
                    // `auto`: the signature comes out of the body.
                    self.function_analyze_body(sym, d)?;
                    let mut inferred: Option<Type> = None;
                    for ty in self.state.inferred_returns.clone() {
                        inferred = match inferred {
                            None => Some(ty),
                            Some(prev) => {
                                Some(promote_types(&self.symbols, &prev, &ty).ok_or_else(|| {
                                    self.error(
                                        SemanticErrorKind::TypeMismatch {
                                            from: caster::type_name(
                                                &self.symbols,
                                                &self.context,
                                                &ty,
                                            ),
                                            to: caster::type_name(
                                                &self.symbols,
                                                &self.context,
                                                &prev,
                                            ),
                                        },
                                        d.span,
                                    )
                                })?)
                            }
                        };
                    }
                    ParamType {
                        ty: inferred.unwrap_or(Type::Builtin(BuiltinType::Void)),
                        is_ref: IsRef::from(d.is_ref_return),
                        is_final: IsFinal::False,
                    }
                }
            }
        };

        let (param_types, prefix) = {
            let func = self.symbols[sym].function().expect("populated function");
            (func.param_types.clone(), func.mangle_prefix.clone())
        };
        let linkage = self.symbols[sym].linkage;
        let fn_ty = FunctionType {
            linkage,
            return_type,
            params: param_types,
            is_variadic: crate::types::IsVariadic::from(d.is_variadic),
        };
        let mangle = match linkage {
            crate::symbols::Linkage::D => {
                let ty_mangle =
                    TypeMangler::new(&self.symbols, &self.context).mangle_function(&fn_ty);
                format!("_D{prefix}{ty_mangle}")
            }
            // C linkage mangles to the bare unqualified name.
            crate::symbols::Linkage::C => d.name.clone(),
        };
        let mangle = self.context.get_name(&mangle);
        let symbol = &mut self.symbols[sym];
        symbol.mangle = Some(mangle);
        symbol.function_mut().unwrap().ty = Some(fn_ty);
        symbol.set_step(Step::Signed);
        Ok(())
    }

    fn function_process(&mut self, sym: SymbolId, d: &ast::FunctionDecl) -> Result<()> {
        let analyzed = self.symbols[sym].function().unwrap().body_analyzed;
        if d.body.is_some() && !analyzed {
            self.function_analyze_body(sym, d)?;
        }
        self.symbols[sym].set_step(Step::Processed);
        Ok(())
    }

    fn function_analyze_body(&mut self, sym: SymbolId, d: &ast::FunctionDecl) -> Result<()> {
        let body = match &d.body {
            Some(body) => body,
            None => return Ok(()),
        };
        let func = self.symbols[sym].function().unwrap();
        self.state.scope = func.scope.expect("body analysis before populate");
        self.state.function = Some(sym);
        self.state.ctx_sym = Some(sym);
        self.state.return_type = match &d.return_type {
            Some(ty) => {
                let ty = self.resolve_type(&ty.clone())?;
                Some(ParamType::value(ty))
            }
            None if d.name == "this" => self
                .state
                .this_type
                .clone()
                .map(ParamType::value),
            None => None,
        };
        self.state.inferred_returns.clear();
        let block = self.analyze_block(body)?;
        let func = self.symbols[sym].function_mut().unwrap();
        func.body = Some(block);
        func.body_analyzed = true;
        Ok(())
    }

    //
    // Variables and fields
    //

    fn variable_sign(&mut self, sym: SymbolId, d: &ast::VariableDecl) -> Result<()> {
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

        // Enum-storage values are part of the type's definition; they must
        // be constants by the time the symbol is signed.
        let value = if self.symbols[sym].storage == Storage::Enum {
            self.evaluate(&value, d.span)?
        } else {
            value
        };

        if self.symbols[sym].storage == Storage::Static
            && matches!(self.symbols[sym].kind, SymbolKind::Variable(_))
        {
            let mangle = match self.symbols[sym].linkage {
                crate::symbols::Linkage::D => {
                    let mut prefix = self.state.mangle_prefix.clone();
                    mangle_component(&mut prefix, &d.name);
                    let ty_mangle = TypeMangler::new(&self.symbols, &self.context).mangle(&ty);
                    format!("_D{prefix}{ty_mangle}")
                }
                crate::symbols::Linkage::C => d.name.clone(),
            };
            let mangle = self.context.get_name(&mangle);
            self.symbols[sym].mangle = Some(mangle);
        }

        match &mut self.symbols[sym].kind {
            SymbolKind::Variable(v) => {
                v.ty = ty;
                v.value = Some(value);
            }
            SymbolKind::Field(f) => {
                f.ty = ty;
                f.value = Some(value);
            }
            _ => panic!("variable declaration bound to a non-variable symbol"),
        }
        self.symbols[sym].set_step(Step::Signed);
        Ok(())
    }

    /// Cast an initializer to the declared type. Initializing an enum-typed
    /// variable goes through the enum's base type and comes back with a
    /// representation-preserving cast, which is what makes `previous + 1`
    /// entry chains work.
    pub(crate) fn cast_to_declared(&mut self, expr: TExpr, ty: &Type, span: Span) -> Result<TExpr> {
        if expr.get_type() == ty {
            return Ok(expr);
        }
        let enum_base = match ty {
            Type::Aggregate(s) => match &self.symbols[*s].kind {
                SymbolKind::Enum(e) => Some(e.base),
                _ => None,
            },
            _ => None,
        };
        match enum_base {
            Some(base) => {
                let widened = caster::implicit_cast(
                    &self.symbols,
                    &self.context,
                    expr,
                    &Type::Builtin(base),
                    span,
                )?;
                Ok(CastExpr::build(CastKind::Bit, ty.clone(), widened))
            }
            None => caster::implicit_cast(&self.symbols, &self.context, expr, ty, span),
        }
    }

    fn variable_process(&mut self, sym: SymbolId, d: &ast::VariableDecl) -> Result<()> {
        // Globals are compile-time evaluated; everything else keeps its
        // (possibly default-init) expression for the code generator.
        if self.symbols[sym].storage == Storage::Static
            && matches!(self.symbols[sym].kind, SymbolKind::Variable(_))
        {
            let value = match &self.symbols[sym].kind {
                SymbolKind::Variable(v) => v.value.clone(),
                _ => unreachable!(),
            };
            if let Some(value) = value {
                let folded = self.evaluate(&value, d.span)?;
                if let SymbolKind::Variable(v) = &mut self.symbols[sym].kind {
                    v.value = Some(folded);
                }
            }
        }
        self.symbols[sym].set_step(Step::Processed);
        Ok(())
    }

    //
    // Structs and unions
    //

    fn aggregate_populate(&mut self, sym: SymbolId, d: &ast::AggregateDecl) -> Result<()> {
        let scope = self.symbols[sym].owned_scope().unwrap();
        mangle_component(&mut self.state.mangle_prefix, &d.name);
        let mangle = format!("S{}", self.state.mangle_prefix);
        let mangle = self.context.get_name(&mangle);
        self.symbols[sym].mangle = Some(mangle);

        self.state.scope = scope;
        self.state.aggregate = Some(sym);
        self.state.this_type = Some(Type::Aggregate(sym));
        self.state.field_index = 0;
        self.state.method_index = 0;

        let mut members = Vec::new();
        if self.symbols[sym].has_context {
            let ctx_field = self.synthesize_ctx_field(sym)?;
            members.push(ctx_field);
            self.state.field_index = 1;
        }
        self.flatten_decls(&d.members.clone(), &mut members)?;

        let fields: Vec<SymbolId> = members
            .iter()
            .copied()
            .filter(|m| matches!(self.symbols[*m].kind, SymbolKind::Field(_)))
            .collect();
        match &mut self.symbols[sym].kind {
            SymbolKind::Struct(a) | SymbolKind::Union(a) => {
                a.fields = fields;
                a.members = members;
            }
            _ => unreachable!(),
        }
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    /// The implicit first field of an aggregate declared inside a function.
    fn synthesize_ctx_field(&mut self, aggregate: SymbolId) -> Result<SymbolId> {
        let ctx = self.state.ctx_sym.ok_or_else(|| {
            self.error(
                SemanticErrorKind::UnsupportedConstruct(
                    "nested aggregate without an enclosing function".to_string(),
                ),
                self.symbols[aggregate].location,
            )
        })?;
        let name = self.context.get_name("__ctx");
        let mut field = Symbol::new(
            self.symbols[aggregate].location,
            name,
            SymbolKind::Field(FieldSymbol {
                ty: Type::Context(ctx),
                value: None,
                index: 0,
            }),
        );
        field.set_step(Step::Processed);
        let field = self.symbols.new_symbol(field);
        self.symbols
            .add_symbol(self.state.scope, name, field)
            .expect("fresh aggregate scope cannot collide on __ctx");
        Ok(field)
    }

    fn aggregate_sign(&mut self, sym: SymbolId, d: &ast::AggregateDecl) -> Result<()> {
        let (fields, members) = match &self.symbols[sym].kind {
            SymbolKind::Struct(a) | SymbolKind::Union(a) => (a.fields.clone(), a.members.clone()),
            _ => unreachable!(),
        };
        for field in &fields {
            self.require(*field, Step::Signed)?;
        }
        // Sizing below reads through every aggregate a field embeds by
        // value; enforce those dependencies instead of relying on
        // analysis order.
        for field in &fields {
            let ty = match &self.symbols[*field].kind {
                SymbolKind::Field(f) => f.ty.clone(),
                _ => unreachable!(),
            };
            self.require_sized(&ty)?;
        }

        // The aggregate's compile-time default: a tuple of field defaults
        // for a struct, an uninitialized blob for a union.
        let is_union = matches!(self.symbols[sym].kind, SymbolKind::Union(_));
        let init_value = if is_union {
            TExpr::new(Expr::VoidInit, Type::Aggregate(sym))
        } else {
            let defaults = fields
                .iter()
                .map(|f| match &self.symbols[*f].kind {
                    SymbolKind::Field(field) => field
                        .value
                        .clone()
                        .unwrap_or(TExpr::new(Expr::DefaultInit, field.ty.clone())),
                    _ => unreachable!(),
                })
                .collect();
            TExpr::new(Expr::Tuple(defaults), Type::Aggregate(sym))
        };
        let init_name = self.context.get_name("init");
        let mut init_symbol = Symbol::new(
            d.span,
            init_name,
            SymbolKind::Variable(VariableSymbol {
                ty: Type::Aggregate(sym),
                value: Some(init_value),
                is_final: true,
            }),
        );
        let mut init_mangle = String::from("_D");
        init_mangle.push_str(&self.state.mangle_prefix);
        mangle_component(&mut init_mangle, "init");
        init_symbol.mangle = Some(self.context.get_name(&init_mangle));
        init_symbol.set_step(Step::Processed);
        let init = self.symbols.new_symbol(init_symbol);
        let scope = self.symbols[sym].owned_scope().unwrap();
        self.symbols
            .add_symbol(scope, init_name, init)
            .map_err(|_| {
                self.error(
                    SemanticErrorKind::DuplicateSymbol("init".to_string()),
                    d.span,
                )
            })?;

        let others: Vec<SymbolId> = members
            .iter()
            .copied()
            .filter(|m| !matches!(self.symbols[*m].kind, SymbolKind::Field(_)))
            .collect();
        let size = self.layout.size_of(&Type::Aggregate(sym), &self.symbols);
        match &mut self.symbols[sym].kind {
            SymbolKind::Struct(a) | SymbolKind::Union(a) => {
                a.init = Some(init);
                a.size = Some(size);
                let mut ordered = vec![init];
                ordered.extend(a.fields.iter().copied());
                ordered.extend(others);
                a.members = ordered;
            }
            _ => unreachable!(),
        }
        self.symbols[sym].set_step(Step::Signed);
        Ok(())
    }

    /// Computing an aggregate's size reads the field lists of every struct
    /// or union its fields embed by value. Drive those to `Signed` first,
    /// so the cached size never sees a half-built layout. Pointer-sized
    /// references stop the walk, which is what keeps self-referential
    /// types cycle-free; by-value mutual containment lands on the
    /// scheduler's cycle detector, as an infinite type must.
    fn require_sized(&mut self, ty: &Type) -> Result<()> {
        match ty {
            Type::Aggregate(inner) => {
                let inner = *inner;
                match &self.symbols[inner].kind {
                    SymbolKind::Struct(_) | SymbolKind::Union(_) => {
                        self.require(inner, Step::Signed)
                    }
                    // Enum sizing only reads the base type, fixed at
                    // populate.
                    SymbolKind::Enum(_) => self.require(inner, Step::Populated),
                    _ => Ok(()),
                }
            }
            Type::Array(element, _) => self.require_sized(element),
            _ => Ok(()),
        }
    }

    fn aggregate_process(&mut self, sym: SymbolId) -> Result<()> {
        let (fields, members) = match &self.symbols[sym].kind {
            SymbolKind::Struct(a) | SymbolKind::Union(a) => (a.fields.clone(), a.members.clone()),
            _ => unreachable!(),
        };
        // Fields first: methods may reference field types and values
        // without cycling on the aggregate itself.
        for field in fields {
            self.require(field, Step::Processed)?;
        }
        for member in members {
            self.require(member, Step::Processed)?;
        }
        self.symbols[sym].set_step(Step::Processed);
        Ok(())
    }

    //
    // Classes
    //

    fn class_populate(&mut self, sym: SymbolId, d: &ast::ClassDecl) -> Result<()> {
        let scope = self.symbols[sym].owned_scope().unwrap();
        mangle_component(&mut self.state.mangle_prefix, &d.name);
        let mangle = format!("C{}", self.state.mangle_prefix);
        let mangle = self.context.get_name(&mangle);
        self.symbols[sym].mangle = Some(mangle);

        self.state.scope = scope;
        self.state.aggregate = Some(sym);
        self.state.this_type = Some(Type::Aggregate(sym));

        // Base resolution. A class without an explicit base inherits from
        // the builtin Object; Object itself is its own base.
        let base = if sym == self.object.class {
            sym
        } else if d.bases.is_empty() {
            self.object.class
        } else {
            let base_ty = self.resolve_type(&d.bases[0].clone())?;
            match base_ty {
                Type::Aggregate(base) if matches!(self.symbols[base].kind, SymbolKind::Class(_)) => {
                    base
                }
                _ => {
                    return Err(self.error(
                        SemanticErrorKind::UnsupportedConstruct(
                            "base must be a class".to_string(),
                        ),
                        d.span,
                    ))
                }
            }
        };

        let mut members = Vec::new();
        let mut base_fields = Vec::new();
        let mut candidates = Vec::new();
        if base == sym {
            // Root Object: slot 0 is the vtable pointer; method slot 0 is
            // reserved alongside it.
            let vtbl_name = self.context.get_name("__vtbl");
            let mut vtbl = Symbol::new(
                d.span,
                vtbl_name,
                SymbolKind::Field(FieldSymbol {
                    ty: Type::Pointer(
                        Box::new(Type::Builtin(BuiltinType::Void)),
                        crate::types::Qualifier::Mutable,
                    ),
                    value: None,
                    index: 0,
                }),
            );
            vtbl.set_step(Step::Processed);
            let vtbl = self.symbols.new_symbol(vtbl);
            self.symbols
                .add_symbol(scope, vtbl_name, vtbl)
                .expect("fresh class scope cannot collide on __vtbl");
            base_fields.push(vtbl);
            self.state.field_index = 1;
            self.state.method_index = 1;
        } else {
            self.require(base, Step::Processed)?;
            let (fields, methods) = match &self.symbols[base].kind {
                SymbolKind::Class(c) => (c.fields.clone(), c.methods.clone()),
                _ => unreachable!(),
            };
            let max_field = fields
                .iter()
                .filter_map(|f| match &self.symbols[*f].kind {
                    SymbolKind::Field(field) => Some(field.index),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            let max_method = methods
                .iter()
                .filter_map(|m| match &self.symbols[*m].kind {
                    SymbolKind::Method(method) => Some(method.index),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            self.state.field_index = max_field + 1;
            self.state.method_index = max_method + 1;
            // Inherited methods join the derived overload sets so lookup
            // and override resolution both see them.
            for method in &methods {
                let name = self.symbols[*method].name;
                let _ = self.symbols.add_overloadable_symbol(scope, name, *method);
            }
            self.symbols.scope_mut(scope).imports.push(base);
            base_fields = fields;
            candidates = methods.into_iter().map(Some).collect();
        }

        self.flatten_decls(&d.members.clone(), &mut members)?;

        let new_fields: Vec<SymbolId> = members
            .iter()
            .copied()
            .filter(|m| matches!(self.symbols[*m].kind, SymbolKind::Field(_)))
            .collect();
        let base_field_count = base_fields.len();
        match &mut self.symbols[sym].kind {
            SymbolKind::Class(c) => {
                c.base = Some(base);
                c.fields = base_fields;
                c.fields.extend(new_fields);
                c.members = members;
                c.candidates = candidates;
                c.base_field_count = base_field_count;
            }
            _ => unreachable!(),
        }
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    fn class_sign(&mut self, sym: SymbolId) -> Result<()> {
        let fields = match &self.symbols[sym].kind {
            SymbolKind::Class(c) => c.fields.clone(),
            _ => unreachable!(),
        };
        for field in fields {
            self.require(field, Step::Signed)?;
        }
        self.symbols[sym].set_step(Step::Signed);
        Ok(())
    }

    fn class_process(&mut self, sym: SymbolId) -> Result<()> {
        let (scope, members, mut candidates) = match &self.symbols[sym].kind {
            SymbolKind::Class(c) => (c.scope, c.members.clone(), c.candidates.clone()),
            _ => unreachable!(),
        };

        let new_methods: Vec<SymbolId> = members
            .iter()
            .copied()
            .filter(|m| matches!(self.symbols[*m].kind, SymbolKind::Method(_)))
            .collect();

        for method in &new_methods {
            self.require(*method, Step::Signed)?;
            self.resolve_override(scope, *method, &mut candidates)?;
        }

        // Compact: surviving base methods keep their relative order, new
        // members follow.
        let surviving: Vec<SymbolId> = candidates.iter().copied().flatten().collect();
        let mut methods = surviving.clone();
        methods.extend(new_methods);
        let (fields, base_field_count) = match &mut self.symbols[sym].kind {
            SymbolKind::Class(c) => {
                c.methods = methods;
                c.candidates = Vec::new();
                (c.fields.clone(), c.base_field_count)
            }
            _ => unreachable!(),
        };
        let mut ordered: Vec<SymbolId> = fields[..base_field_count].to_vec();
        ordered.extend(surviving);
        ordered.extend(members.iter().copied());
        if let SymbolKind::Class(c) = &mut self.symbols[sym].kind {
            c.members = ordered.clone();
        }

        for field in fields {
            self.require(field, Step::Processed)?;
        }
        for member in ordered {
            self.require(member, Step::Processed)?;
        }
        self.symbols[sym].set_step(Step::Processed);
        Ok(())
    }

    /// Match one new method against the open base slots. On a match the
    /// method adopts the base vtable index and the slot closes; the scope's
    /// overload set is rebuilt without the overridden base method.
    fn resolve_override(
        &mut self,
        scope: crate::symbols::ScopeId,
        method: SymbolId,
        candidates: &mut [Option<SymbolId>],
    ) -> Result<()> {
        let (name, index, is_override, ty) = match &self.symbols[method].kind {
            SymbolKind::Method(m) => (
                self.symbols[method].name,
                m.index,
                m.is_override,
                m.func.ty.clone().expect("method signed before matching"),
            ),
            _ => unreachable!(),
        };

        let mut matched: Option<usize> = None;
        for (slot, candidate) in candidates.iter().enumerate() {
            let candidate = match candidate {
                Some(candidate) => *candidate,
                None => continue,
            };
            if self.symbols[candidate].name != name {
                continue;
            }
            let candidate_ty = match self.symbols[candidate].function() {
                Some(f) => f.ty.clone().expect("base methods are signed"),
                None => continue,
            };
            if ty.is_variadic != candidate_ty.is_variadic {
                continue;
            }
            if ty.params.len() != candidate_ty.params.len() {
                continue;
            }
            if !caster::param_cast_exact(&self.symbols, &ty.return_type, &candidate_ty.return_type)
            {
                continue;
            }
            let params_match = ty
                .params
                .iter()
                .zip(candidate_ty.params.iter())
                .all(|(p, c)| caster::param_cast_exact(&self.symbols, p, c));
            if !params_match {
                continue;
            }
            matched = Some(slot);
            break;
        }

        let method_name = self.context.name_str(name).to_string();
        match matched {
            Some(slot) => {
                if !is_override {
                    return Err(self.error(
                        SemanticErrorKind::MissingOverrideKeyword(method_name),
                        self.symbols[method].location,
                    ));
                }
                let base_method = candidates[slot].take().unwrap();
                let base_index = match &self.symbols[base_method].kind {
                    SymbolKind::Method(m) => m.index,
                    _ => unreachable!(),
                };
                if let SymbolKind::Method(m) = &mut self.symbols[method].kind {
                    m.index = base_index;
                }
                self.remove_overload_candidate(scope, name, base_method);
                Ok(())
            }
            None => {
                if index == 0 {
                    return Err(self.error(
                        SemanticErrorKind::OverrideNotFound(method_name),
                        self.symbols[method].location,
                    ));
                }
                Ok(())
            }
        }
    }

    fn remove_overload_candidate(
        &mut self,
        scope: crate::symbols::ScopeId,
        name: crate::context::Name,
        removed: SymbolId,
    ) {
        let entry = match self.symbols.get_direct(scope, name) {
            Some(entry) => entry,
            None => return,
        };
        if let SymbolKind::OverloadSet(set) = &self.symbols[entry].kind {
            let rebuilt: Vec<SymbolId> =
                set.set.iter().copied().filter(|s| *s != removed).collect();
            self.symbols.replace_overload_set(scope, name, rebuilt);
        }
    }

    //
    // Interfaces
    //

    /// Interfaces are deliberately minimal for now: they exist, they
    /// mangle, and they can be named; member and inheritance analysis is
    /// reserved.
    fn interface_populate(&mut self, sym: SymbolId, d: &ast::ClassDecl) -> Result<()> {
        mangle_component(&mut self.state.mangle_prefix, &d.name);
        let mangle = format!("I{}", self.state.mangle_prefix);
        let mangle = self.context.get_name(&mangle);
        self.symbols[sym].mangle = Some(mangle);
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    //
    // Enums
    //

    fn enum_populate(&mut self, sym: SymbolId, d: &ast::EnumDecl) -> Result<()> {
        let scope = self.symbols[sym].owned_scope().unwrap();
        let base = match &d.base {
            Some(ty) => {
                let resolved = self.resolve_type(&ty.clone())?;
                match resolved.builtin() {
                    Some(builtin)
                        if builtin.is_integral() || builtin == BuiltinType::Bool =>
                    {
                        builtin
                    }
                    _ => {
                        return Err(self.error(
                            SemanticErrorKind::UnsupportedConstruct(
                                "enum base must be an integral or bool type".to_string(),
                            ),
                            d.span,
                        ))
                    }
                }
            }
            None => BuiltinType::Int,
        };

        mangle_component(&mut self.state.mangle_prefix, &d.name);
        let mangle = format!("E{}", self.state.mangle_prefix);
        let mangle = self.context.get_name(&mangle);
        self.symbols[sym].mangle = Some(mangle);

        self.state.scope = scope;
        let enum_type = ast::TypeExpr::Named(ast::NamedType {
            span: d.span,
            path: vec![d.name.clone()],
            args: None,
        });

        let mut entries = Vec::new();
        let mut previous: Option<String> = None;
        for entry in &d.entries {
            // The chain rule: an entry without a value is `previous + 1`,
            // and the first defaults to zero.
            let init = match &entry.value {
                Some(value) => value.clone(),
                None => match &previous {
                    None => ast::Expr::IntegerLiteral(ast::IntegerLiteral {
                        span: entry.span,
                        value: 0,
                        is_long: false,
                    }),
                    Some(prev) => ast::Expr::Binary(Box::new(ast::BinaryExpr {
                        span: entry.span,
                        op: ast::BinaryOp::Add,
                        lhs: ast::Expr::Identifier(ast::Identifier {
                            span: entry.span,
                            name: prev.clone(),
                        }),
                        rhs: ast::Expr::IntegerLiteral(ast::IntegerLiteral {
                            span: entry.span,
                            value: 1,
                            is_long: false,
                        }),
                    })),
                },
            };
            let decl = Rc::new(ast::Decl::Variable(ast::VariableDecl {
                span: entry.span,
                name: entry.name.clone(),
                ty: Some(enum_type.clone()),
                init: Some(init),
                storage: ast::StorageClass {
                    is_enum: true,
                    ..ast::StorageClass::default()
                },
            }));
            self.flatten_decl(&decl, &mut entries)?;
            previous = Some(entry.name.clone());
        }

        if let SymbolKind::Enum(e) = &mut self.symbols[sym].kind {
            e.base = base;
            e.entries = entries;
        }
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    fn enum_sign(&mut self, sym: SymbolId) -> Result<()> {
        let entries = match &self.symbols[sym].kind {
            SymbolKind::Enum(e) => e.entries.clone(),
            _ => unreachable!(),
        };
        for entry in entries {
            self.require(entry, Step::Signed)?;
        }
        self.symbols[sym].set_step(Step::Signed);
        Ok(())
    }

    fn enum_process(&mut self, sym: SymbolId) -> Result<()> {
        let entries = match &self.symbols[sym].kind {
            SymbolKind::Enum(e) => e.entries.clone(),
            _ => unreachable!(),
        };
        for entry in entries {
            self.require(entry, Step::Processed)?;
        }
        self.symbols[sym].set_step(Step::Processed);
        Ok(())
    }

    //
    // Templates
    //

    fn template_populate(&mut self, sym: SymbolId, d: &ast::TemplateDecl) -> Result<()> {
        let scope = self.symbols[sym].owned_scope().unwrap();
        let parent_prefix = self.state.mangle_prefix.clone();
        self.state.scope = scope;

        let mut params = Vec::new();
        for (index, p) in d.params.iter().enumerate() {
            let kind = match &p.kind {
                ast::TemplateParamKind::Type => {
                    SymbolKind::TypeParameter(TypeParameterSymbol { index })
                }
                ast::TemplateParamKind::Value(ty) => {
                    let ty = self.resolve_type(&ty.clone())?;
                    SymbolKind::ValueParameter(ValueParameterSymbol { index, ty })
                }
                ast::TemplateParamKind::Alias => {
                    SymbolKind::AliasParameter(AliasParameterSymbol { index })
                }
                ast::TemplateParamKind::TypedAlias(ty) => {
                    let ty = self.resolve_type(&ty.clone())?;
                    SymbolKind::TypedAliasParameter(TypedAliasParameterSymbol { index, ty })
                }
            };
            let name = self.context.get_name(&p.name);
            let mut symbol = Symbol::new(p.span, name, kind);
            symbol.set_step(Step::Processed);
            let param = self.symbols.new_symbol(symbol);
            self.symbols.add_symbol(scope, name, param).map_err(|_| {
                self.error(SemanticErrorKind::DuplicateSymbol(p.name.clone()), p.span)
            })?;
            params.push(param);
        }

        let ifti = self.compute_ifti_hint(d);
        if let SymbolKind::Template(t) = &mut self.symbols[sym].kind {
            t.params = params;
            t.ifti = ifti;
            t.mangle_prefix = parent_prefix;
        }
        self.symbols[sym].set_step(Step::Populated);
        Ok(())
    }

    /// The matching shape for implicit instantiation: the parameter list of
    /// the first member function named like the template, with parameters
    /// typed by a template type parameter marked for deduction.
    fn compute_ifti_hint(&mut self, d: &ast::TemplateDecl) -> Option<Vec<IftiParam>> {
        let eponymous = d.members.iter().find_map(|member| match &**member {
            ast::Decl::Function(f) if f.name == d.name => Some(f),
            _ => None,
        })?;
        let mut shape = Vec::new();
        for param in &eponymous.params {
            if let ast::TypeExpr::Named(named) = &param.ty {
                if named.path.len() == 1 && named.args.is_none() {
                    if let Some(index) = d.params.iter().position(|tp| {
                        tp.name == named.path[0]
                            && matches!(tp.kind, ast::TemplateParamKind::Type)
                    }) {
                        shape.push(IftiParam::Deduce(index));
                        continue;
                    }
                }
            }
            match self.resolve_type(&param.ty.clone()) {
                Ok(ty) => shape.push(IftiParam::Concrete(ParamType::value(ty))),
                // A parameter type the template scope cannot resolve makes
                // the shape unusable.
                Err(_) => return None,
            }
        }
        Some(shape)
    }

    fn instance_stage(&mut self, sym: SymbolId, step: Step) -> Result<()> {
        match step {
            Step::Populated => {
                let (template, scope) = match &self.symbols[sym].kind {
                    SymbolKind::TemplateInstance(i) => (i.template, i.scope),
                    _ => unreachable!(),
                };
                let decls = match &self.symbols[template].kind {
                    SymbolKind::Template(t) => t.decls.clone(),
                    _ => unreachable!(),
                };
                self.state.scope = scope;
                let mut members = Vec::new();
                self.flatten_decls(&decls, &mut members)?;
                if let SymbolKind::TemplateInstance(i) = &mut self.symbols[sym].kind {
                    i.members = members;
                }
                self.symbols[sym].set_step(Step::Populated);
                Ok(())
            }
            Step::Signed => {
                self.symbols[sym].set_step(Step::Signed);
                Ok(())
            }
            Step::Processed => {
                let members = match &self.symbols[sym].kind {
                    SymbolKind::TemplateInstance(i) => i.members.clone(),
                    _ => unreachable!(),
                };
                for member in members {
                    self.require(member, Step::Processed)?;
                }
                self.symbols[sym].set_step(Step::Processed);
                Ok(())
            }
            Step::Parsed => unreachable!(),
        }
    }

    //
    // Aliases
    //

    fn alias_stage(&mut self, sym: SymbolId, d: &ast::AliasDecl, step: Step) -> Result<()> {
        match (&d.target, step) {
            (ast::AliasTarget::Symbol(path), Step::Populated) => {
                let target = self.resolve_path(&path.clone(), d.span)?;
                self.require(target, Step::Populated)?;
                if self.symbols[target].mangle.is_none() {
                    // Functions only mangle once signed.
                    self.require(target, Step::Signed)?;
                }
                self.symbols[sym].mangle = self.symbols[target].mangle;
                if let SymbolKind::SymbolAlias(a) = &mut self.symbols[sym].kind {
                    a.target = Some(target);
                }
                self.symbols[sym].set_step(Step::Populated);
                Ok(())
            }
            (ast::AliasTarget::Symbol(_), Step::Signed) => {
                let target = match &self.symbols[sym].kind {
                    SymbolKind::SymbolAlias(a) => a.target.expect("populated alias"),
                    _ => unreachable!(),
                };
                self.require(target, Step::Signed)?;
                self.symbols[sym].has_context = self.symbols[target].has_context;
                self.symbols[sym].set_step(Step::Signed);
                Ok(())
            }
            (ast::AliasTarget::Type(ty), Step::Signed) => {
                let resolved = self.resolve_type(&ty.clone())?;
                let mangle = TypeMangler::new(&self.symbols, &self.context).mangle(&resolved);
                self.symbols[sym].mangle = Some(self.context.get_name(&mangle));
                if let SymbolKind::TypeAlias(a) = &mut self.symbols[sym].kind {
                    a.ty = Some(resolved);
                }
                self.symbols[sym].set_step(Step::Signed);
                Ok(())
            }
            (ast::AliasTarget::Value(expr), Step::Signed) => {
                let analyzed = self.analyze_expr(&expr.clone())?;
                let folded = self.evaluate(&analyzed, d.span)?;
                // A value alias mangles its type and value together.
                let ty_mangle =
                    TypeMangler::new(&self.symbols, &self.context).mangle(folded.get_type());
                let value_part = match folded.expression() {
                    Expr::IntegerLiteral(v) => format!("V{v}"),
                    Expr::BoolLiteral(b) => format!("V{}", *b as u8),
                    _ => "V0".to_string(),
                };
                self.symbols[sym].mangle =
                    Some(self.context.get_name(&format!("{ty_mangle}{value_part}")));
                if let SymbolKind::ValueAlias(a) = &mut self.symbols[sym].kind {
                    a.value = Some(folded);
                }
                self.symbols[sym].set_step(Step::Signed);
                Ok(())
            }
            (_, step) => {
                self.symbols[sym].set_step(step);
                Ok(())
            }
        }
    }
}
