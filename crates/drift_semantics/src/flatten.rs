// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The declaration flattener: the first contact between syntax and symbols.
//
// Conditional compilation (`static if`, `version`) and mixins are expanded
// here, before any stub exists; everything that survives becomes a stub
// symbol at `Parsed`, registered in the current scope and scheduled for the
// analyzer. Field and method indices are assigned in source order from the
// counters the enclosing aggregate's analyzer seeded.

use std::rc::Rc;

use drift_ast as ast;

use crate::semantic_error::{Result, SemanticErrorKind};
use crate::symbols::{
    AggregateSymbol, ClassSymbol, EnumSymbol, FieldSymbol, FunctionSymbol, InterfaceSymbol,
    Linkage, MethodSymbol, ScopeKind, Storage, Symbol, SymbolAliasSymbol, SymbolId, SymbolKind,
    TemplateSymbol, TypeAliasSymbol, ValueAliasSymbol, VariableSymbol, Visibility,
};
use crate::types::{BuiltinType, Type};

use crate::pass::SemanticPass;

impl SemanticPass {
    /// Flatten `decls` into the current scope, appending the created
    /// symbols to `members` in source order.
    pub(crate) fn flatten_decls(
        &mut self,
        decls: &[Rc<ast::Decl>],
        members: &mut Vec<SymbolId>,
    ) -> Result<()> {
        for decl in decls {
            self.flatten_decl(decl, members)?;
        }
        Ok(())
    }

    pub(crate) fn flatten_decl(
        &mut self,
        decl: &Rc<ast::Decl>,
        members: &mut Vec<SymbolId>,
    ) -> Result<()> {
        match &**decl {
            ast::Decl::StaticIf(d) => {
                let condition = self.analyze_expr(&d.condition)?;
                let taken = self.evaluate_integral(&condition, d.span)? != 0;
                let branch = if taken { &d.then_decls } else { &d.else_decls };
                self.flatten_decls(&branch.clone(), members)
            }
            ast::Decl::Version(d) => {
                let branch = if self.context.has_version(&d.ident) {
                    &d.then_decls
                } else {
                    &d.else_decls
                };
                self.flatten_decls(&branch.clone(), members)
            }
            ast::Decl::Mixin(d) => {
                let text = self.analyze_expr(&d.text)?;
                let source = self.evaluate_string(&text, d.span)?;
                let parsed = self.parser.parse_mixin(&source).map_err(|detail| {
                    self.error(SemanticErrorKind::SyntaxUpstream(detail), d.span)
                })?;
                let parsed: Vec<Rc<ast::Decl>> = parsed.into_iter().map(Rc::new).collect();
                self.flatten_decls(&parsed, members)
            }
            ast::Decl::TemplateMixin(d) => {
                let template = self.resolve_path(&d.name, d.span)?;
                let instance = self.instantiate(template, &d.args, d.span)?;
                // Mixed-in members are reached through the scope's import
                // list, like an anonymous local import.
                self.symbols
                    .scope_mut(self.state.scope)
                    .imports
                    .push(instance);
                members.push(instance);
                Ok(())
            }
            ast::Decl::Import(d) => {
                let module = self.resolve_import(&d.module.clone(), d.span)?;
                self.symbols
                    .scope_mut(self.state.scope)
                    .imports
                    .push(module);
                Ok(())
            }
            ast::Decl::Function(d) => {
                let sym = self.stub_function(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Variable(d) => {
                let sym = self.stub_variable(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Struct(d) => {
                let sym = self.stub_aggregate(d, /* is_union= */ false)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Union(d) => {
                let sym = self.stub_aggregate(d, /* is_union= */ true)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Class(d) => {
                let sym = self.stub_class(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Interface(d) => {
                let sym = self.stub_interface(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Enum(d) => {
                let sym = self.stub_enum(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Template(d) => {
                let sym = self.stub_template(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
            ast::Decl::Alias(d) => {
                let sym = self.stub_alias(d)?;
                members.push(sym);
                self.schedule(decl, sym);
                Ok(())
            }
        }
    }

    fn schedule(&mut self, decl: &Rc<ast::Decl>, sym: SymbolId) {
        self.scheduler
            .schedule(decl.clone(), self.state.clone(), sym);
    }

    /// Symbols declared under an enclosing function frame close over it.
    fn in_closure(&self) -> bool {
        self.state.ctx_sym.is_some()
    }

    fn apply_storage(&mut self, sym: SymbolId, storage: &ast::StorageClass) {
        let symbol = &mut self.symbols[sym];
        if let Some(linkage) = storage.linkage {
            symbol.linkage = Linkage::from_ast(linkage);
        }
        symbol.visibility = Visibility::from_ast(storage.visibility);
    }

    fn add_plain(&mut self, d_span: drift_source_file::Span, name: &str, sym: SymbolId) -> Result<()> {
        let interned = self.context.get_name(name);
        self.symbols
            .add_symbol(self.state.scope, interned, sym)
            .map_err(|_| {
                self.error(SemanticErrorKind::DuplicateSymbol(name.to_string()), d_span)
            })
    }

    fn add_overloadable(
        &mut self,
        d_span: drift_source_file::Span,
        name: &str,
        sym: SymbolId,
    ) -> Result<()> {
        let interned = self.context.get_name(name);
        self.symbols
            .add_overloadable_symbol(self.state.scope, interned, sym)
            .map_err(|_| {
                self.error(SemanticErrorKind::DuplicateSymbol(name.to_string()), d_span)
            })
    }

    /// `true` when the current aggregate dispatches its methods through a
    /// vtable.
    fn in_virtual_aggregate(&self) -> bool {
        self.state.aggregate.is_some_and(|aggregate| {
            matches!(
                self.symbols[aggregate].kind,
                SymbolKind::Class(_) | SymbolKind::Interface(_)
            )
        })
    }

    fn stub_function(&mut self, d: &ast::FunctionDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let func = FunctionSymbol::default();
        let kind = if self.in_virtual_aggregate() && !d.storage.is_static {
            // Override candidates start at slot zero and must find a base
            // method to adopt; everything else takes a fresh slot.
            let index = if d.storage.is_override {
                0
            } else {
                let index = self.state.method_index;
                self.state.method_index += 1;
                index
            };
            SymbolKind::Method(MethodSymbol {
                func,
                index,
                is_override: d.storage.is_override,
            })
        } else {
            SymbolKind::Function(func)
        };
        let mut symbol = Symbol::new(d.span, name, kind);
        symbol.has_context = self.in_closure();
        if symbol.has_context {
            symbol.storage = Storage::Local;
        }
        let sym = self.symbols.new_symbol(symbol);
        self.apply_storage(sym, &d.storage);
        self.add_overloadable(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_variable(&mut self, d: &ast::VariableDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let variable = VariableSymbol {
            ty: Type::auto(),
            value: None,
            is_final: d.storage.is_final,
        };
        let in_aggregate = self.state.aggregate.is_some();
        let kind = if in_aggregate && !d.storage.is_static && !d.storage.is_enum {
            let index = self.state.field_index;
            self.state.field_index += 1;
            SymbolKind::Field(FieldSymbol {
                ty: Type::auto(),
                value: None,
                index,
            })
        } else {
            SymbolKind::Variable(variable)
        };
        let mut symbol = Symbol::new(d.span, name, kind);
        symbol.storage = if d.storage.is_enum {
            Storage::Enum
        } else {
            Storage::Static
        };
        let sym = self.symbols.new_symbol(symbol);
        self.apply_storage(sym, &d.storage);
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_aggregate(&mut self, d: &ast::AggregateDecl, is_union: bool) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let parent = self.state.scope;
        let (sym, _scope) = self.symbols.new_symbol_and_scope(
            d.span,
            name,
            Some(parent),
            ScopeKind::Symbol,
            |scope| {
                let aggregate = AggregateSymbol {
                    scope,
                    fields: Vec::new(),
                    members: Vec::new(),
                    init: None,
                    size: None,
                };
                if is_union {
                    SymbolKind::Union(aggregate)
                } else {
                    SymbolKind::Struct(aggregate)
                }
            },
        );
        self.symbols[sym].has_context = self.in_closure();
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_class(&mut self, d: &ast::ClassDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let parent = self.state.scope;
        let (sym, _scope) = self.symbols.new_symbol_and_scope(
            d.span,
            name,
            Some(parent),
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::Class(ClassSymbol {
                    scope,
                    base: None,
                    fields: Vec::new(),
                    methods: Vec::new(),
                    members: Vec::new(),
                    candidates: Vec::new(),
                    base_field_count: 0,
                })
            },
        );
        self.symbols[sym].has_context = self.in_closure();
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_interface(&mut self, d: &ast::ClassDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let parent = self.state.scope;
        let (sym, _scope) = self.symbols.new_symbol_and_scope(
            d.span,
            name,
            Some(parent),
            ScopeKind::Symbol,
            |scope| SymbolKind::Interface(InterfaceSymbol { scope }),
        );
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_enum(&mut self, d: &ast::EnumDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let parent = self.state.scope;
        let (sym, _scope) = self.symbols.new_symbol_and_scope(
            d.span,
            name,
            Some(parent),
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::Enum(EnumSymbol {
                    scope,
                    base: BuiltinType::Int,
                    entries: Vec::new(),
                })
            },
        );
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_template(&mut self, d: &ast::TemplateDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let parent = self.state.scope;
        let (sym, _scope) = self.symbols.new_symbol_and_scope(
            d.span,
            name,
            Some(parent),
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::Template(TemplateSymbol {
                    scope,
                    params: Vec::new(),
                    decls: d.members.clone(),
                    instances: hashbrown::HashMap::new(),
                    ifti: None,
                    mangle_prefix: String::new(),
                })
            },
        );
        self.symbols[sym].has_context = self.in_closure();
        self.add_overloadable(d.span, &d.name, sym)?;
        Ok(sym)
    }

    fn stub_alias(&mut self, d: &ast::AliasDecl) -> Result<SymbolId> {
        let name = self.context.get_name(&d.name);
        let kind = match &d.target {
            ast::AliasTarget::Type(_) => SymbolKind::TypeAlias(TypeAliasSymbol { ty: None }),
            ast::AliasTarget::Value(_) => SymbolKind::ValueAlias(ValueAliasSymbol { value: None }),
            ast::AliasTarget::Symbol(_) => {
                SymbolKind::SymbolAlias(SymbolAliasSymbol { target: None })
            }
        };
        let sym = self.symbols.new_symbol(Symbol::new(d.span, name, kind));
        self.add_plain(d.span, &d.name, sym)?;
        Ok(sym)
    }
}
