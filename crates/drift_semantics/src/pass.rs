// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The semantic pass: the public entry points and the ambient analysis state.
//
// The ambient state is deliberately not process-global. It is a value that
// each analysis routine swaps in on entry and restores on every exit path;
// scheduled tasks capture it so a demand-driven advance runs under the
// environment its declaration was flattened in.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use hashbrown::HashMap;

use drift_ast as ast;
use drift_source_file::Span;

use crate::context::Context;
use crate::eval::{DataLayout, Evaluator};
use crate::ir::{CallExpr, Expr, TBlock, TExpr, TStmt};
use crate::mangler::mangle_component;
use crate::scheduler::Scheduler;
use crate::semantic_error::{Result, SemanticError, SemanticErrorKind};
use crate::symbols::{
    FunctionSymbol, Linkage, ModuleSymbol, ScopeId, ScopeKind, Step, Symbol, SymbolId, SymbolKind,
    Symbols,
};
use crate::types::{BuiltinType, FunctionType, IsVariadic, ParamType, Type};

/// The parser is an external collaborator; the pass only ever sees its
/// output.
pub trait Parser {
    /// Parse the module for `file`, declared under `packages`.
    fn parse(&mut self, file: &Path, packages: &[String]) -> std::result::Result<ast::Module, String>;

    /// Parse the contents of a string mixin into declarations.
    fn parse_mixin(&mut self, source: &str) -> std::result::Result<Vec<ast::Decl>, String> {
        let _ = source;
        Err("this parser does not support string mixins".to_string())
    }
}

/// Handle to the root `Object` class every base-less class inherits from.
#[derive(Clone, Copy, Debug)]
pub struct ObjectReference {
    pub module: SymbolId,
    pub class: SymbolId,
}

/// The ambient analysis state. Cheap to clone; captured by every scheduled
/// task.
#[derive(Clone)]
pub struct State {
    pub(crate) scope: ScopeId,
    pub(crate) mangle_prefix: String,
    pub(crate) this_type: Option<Type>,
    pub(crate) return_type: Option<ParamType>,
    pub(crate) ctx_sym: Option<SymbolId>,
    pub(crate) function: Option<SymbolId>,
    pub(crate) aggregate: Option<SymbolId>,
    pub(crate) field_index: u32,
    pub(crate) method_index: u32,
    pub(crate) inferred_returns: Vec<Type>,
}

impl State {
    fn for_module(scope: ScopeId, mangle_prefix: String) -> State {
        State {
            scope,
            mangle_prefix,
            this_type: None,
            return_type: None,
            ctx_sym: None,
            function: None,
            aggregate: None,
            field_index: 0,
            method_index: 0,
            inferred_returns: Vec::new(),
        }
    }

    /// The environment a template instance's members are analyzed under:
    /// its own scope and mangle prefix, with the instantiation site's
    /// context carried along for closure-carrying members.
    pub(crate) fn for_instance(scope: ScopeId, mangle_prefix: String, site: &State) -> State {
        State {
            scope,
            mangle_prefix,
            this_type: None,
            return_type: None,
            ctx_sym: site.ctx_sym,
            function: site.function,
            aggregate: None,
            field_index: 0,
            method_index: 0,
            inferred_returns: Vec::new(),
        }
    }
}

pub struct SemanticPass {
    pub context: Context,
    pub symbols: Symbols,
    pub(crate) scheduler: Scheduler,
    pub(crate) parser: Box<dyn Parser>,
    pub(crate) evaluator: Box<dyn Evaluator>,
    pub(crate) layout: Box<dyn DataLayout>,
    pub(crate) include_paths: Vec<PathBuf>,
    /// Loaded modules by dotted qualified name.
    modules: HashMap<String, SymbolId>,
    pub(crate) module_asts: HashMap<SymbolId, Rc<ast::Module>>,
    pub(crate) object: ObjectReference,
    pub(crate) state: State,
}

impl SemanticPass {
    pub fn new(
        parser: Box<dyn Parser>,
        evaluator: Box<dyn Evaluator>,
        layout: Box<dyn DataLayout>,
        include_paths: Vec<PathBuf>,
    ) -> Result<SemanticPass> {
        let mut context = Context::new();
        let mut symbols = Symbols::new();

        // The builtin `object` module is synthesized rather than read from
        // disk; every other module imports it implicitly.
        let object_ast = Rc::new(builtin_object_module());
        let module_name = context.get_name("object");
        let mut prefix = String::new();
        mangle_component(&mut prefix, "object");
        let (module_sym, module_scope) = symbols.new_symbol_and_scope(
            Span::none(),
            module_name,
            None,
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::Module(ModuleSymbol {
                    scope,
                    members: Vec::new(),
                })
            },
        );
        symbols[module_sym].mangle = Some(context.get_name(&prefix));

        let state = State::for_module(module_scope, prefix);
        let mut pass = SemanticPass {
            context,
            symbols,
            scheduler: Scheduler::new(),
            parser,
            evaluator,
            layout,
            include_paths,
            modules: HashMap::new(),
            module_asts: HashMap::new(),
            // Placeholder until the object module is populated.
            object: ObjectReference {
                module: module_sym,
                class: module_sym,
            },
            state: state.clone(),
        };
        pass.modules.insert("object".to_string(), module_sym);
        pass.module_asts.insert(module_sym, object_ast);
        pass.scheduler.schedule_stateless(state, module_sym);

        pass.require(module_sym, Step::Populated)?;
        let object_name = pass.context.get_name("Object");
        let class = pass
            .symbols
            .lookup_local(module_scope, object_name)
            .expect("builtin object module must define Object");
        pass.object = ObjectReference {
            module: module_sym,
            class,
        };
        Ok(pass)
    }

    /// Begin analysis of a source file. The returned module advances to
    /// `Processed` during `terminate`.
    pub fn add(&mut self, filename: &str, packages: &[String]) -> Result<SymbolId> {
        let module = self
            .parser
            .parse(Path::new(filename), packages)
            .map_err(|detail| {
                SemanticError::new(SemanticErrorKind::SyntaxUpstream(detail), Span::none())
            })?;
        let sym = self.register_module(Rc::new(module))?;
        self.require(sym, Step::Populated)?;
        Ok(sym)
    }

    /// Register a parsed module, reusing an already-loaded one with the
    /// same qualified name.
    pub(crate) fn register_module(&mut self, module: Rc<ast::Module>) -> Result<SymbolId> {
        let qualified = module.qualified_name();
        if let Some(existing) = self.modules.get(&qualified) {
            return Ok(*existing);
        }
        let name = self.context.get_name(&module.name);
        let mut prefix = String::new();
        for package in &module.packages {
            mangle_component(&mut prefix, package);
        }
        mangle_component(&mut prefix, &module.name);
        let (sym, scope) = self.symbols.new_symbol_and_scope(
            module.span,
            name,
            None,
            ScopeKind::Symbol,
            |scope| {
                SymbolKind::Module(ModuleSymbol {
                    scope,
                    members: Vec::new(),
                })
            },
        );
        self.symbols[sym].mangle = Some(self.context.get_name(&prefix));
        self.modules.insert(qualified, sym);
        self.module_asts.insert(sym, module);
        self.scheduler
            .schedule_stateless(State::for_module(scope, prefix), sym);
        Ok(sym)
    }

    /// Resolve `import a.b;` to a module symbol, loading and parsing the
    /// file through the include paths when it is not in memory yet.
    pub(crate) fn resolve_import(&mut self, path: &[String], location: Span) -> Result<SymbolId> {
        let qualified = path.join(".");
        if let Some(existing) = self.modules.get(&qualified) {
            return Ok(*existing);
        }
        let mut relative = PathBuf::new();
        for component in path {
            relative.push(component);
        }
        relative.set_extension("dr");
        let packages = &path[..path.len() - 1];
        for include in self.include_paths.clone() {
            let candidate = include.join(&relative);
            if candidate.exists() {
                let module = self
                    .parser
                    .parse(&candidate, packages)
                    .map_err(|detail| {
                        SemanticError::new(SemanticErrorKind::SyntaxUpstream(detail), location)
                    })?;
                return self.register_module(Rc::new(module));
            }
        }
        Err(SemanticError::new(
            SemanticErrorKind::UnresolvedIdentifier(qualified),
            location,
        ))
    }

    /// Drive every scheduled symbol to `Processed`. Analysis of one symbol
    /// may schedule more (template instances, mixins); the loop runs until
    /// the ledger is empty.
    pub fn terminate(&mut self) -> Result<()> {
        while self.scheduler.has_pending() {
            for sym in self.scheduler.take_pending() {
                self.require(sym, Step::Processed)?;
            }
        }
        Ok(())
    }

    /// Locate the unique top-level `main` among `modules` and wrap it in a
    /// C-linkage `_Dmain` bootstrap returning `int`.
    pub fn build_main(&mut self, modules: &[SymbolId]) -> Result<SymbolId> {
        let main_name = self.context.get_name("main");
        let mut found: Option<(SymbolId, SymbolId)> = None;
        for module in modules {
            let scope = match &self.symbols[*module].kind {
                SymbolKind::Module(m) => m.scope,
                _ => panic!("build_main expects module symbols"),
            };
            let candidate = match self.symbols.lookup_local(scope, main_name) {
                Some(sym) => sym,
                None => continue,
            };
            if matches!(self.symbols[candidate].kind, SymbolKind::OverloadSet(_)) {
                return Err(SemanticError::new(
                    SemanticErrorKind::DuplicateSymbol("main".to_string()),
                    self.symbols[candidate].location,
                ));
            }
            if found.is_some() {
                return Err(SemanticError::new(
                    SemanticErrorKind::DuplicateSymbol("main".to_string()),
                    self.symbols[candidate].location,
                ));
            }
            found = Some((*module, candidate));
        }
        let (module, main) = found.ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnresolvedIdentifier("main".to_string()),
                Span::none(),
            )
        })?;
        self.require(main, Step::Signed)?;

        let main_ty = match self.symbols[main].function().and_then(|f| f.ty.clone()) {
            Some(ty) => ty,
            None => {
                return Err(SemanticError::new(
                    SemanticErrorKind::UnsupportedConstruct(
                        "main must be a function".to_string(),
                    ),
                    self.symbols[main].location,
                ))
            }
        };
        let int = Type::Builtin(BuiltinType::Int);
        let void = Type::Builtin(BuiltinType::Void);
        let call = TExpr::new(
            Expr::Call(Box::new(CallExpr {
                callee: TExpr::new(
                    Expr::Function(main),
                    Type::Function(Box::new(main_ty.clone())),
                ),
                args: Vec::new(),
            })),
            main_ty.return_type.ty.clone(),
        );
        let stmts = if main_ty.return_type.ty == void {
            vec![
                TStmt::Expr(call),
                TStmt::Return(Some(TExpr::new(Expr::IntegerLiteral(0), int.clone()))),
            ]
        } else if main_ty.return_type.ty == int {
            vec![TStmt::Return(Some(call))]
        } else {
            return Err(SemanticError::new(
                SemanticErrorKind::TypeMismatch {
                    from: "main return type".to_string(),
                    to: "void or int".to_string(),
                },
                self.symbols[main].location,
            ));
        };

        let bootstrap_ty = FunctionType {
            linkage: Linkage::C,
            return_type: ParamType::value(int),
            params: Vec::new(),
            is_variadic: IsVariadic::False,
        };
        let name = self.context.get_name("_Dmain");
        let mut symbol = Symbol::new(
            Span::none(),
            name,
            SymbolKind::Function(FunctionSymbol {
                ty: Some(bootstrap_ty),
                body: Some(TBlock { stmts }),
                body_analyzed: true,
                ..FunctionSymbol::default()
            }),
        );
        symbol.linkage = Linkage::C;
        // C linkage mangles to the unqualified name.
        symbol.mangle = Some(name);
        symbol.set_step(Step::Processed);
        let sym = self.symbols.new_symbol(symbol);

        let module_scope = match &self.symbols[module].kind {
            SymbolKind::Module(m) => m.scope,
            _ => unreachable!(),
        };
        self.symbols
            .add_overloadable_symbol(module_scope, name, sym)
            .map_err(|_| {
                SemanticError::new(
                    SemanticErrorKind::DuplicateSymbol("_Dmain".to_string()),
                    Span::none(),
                )
            })?;
        if let SymbolKind::Module(m) = &mut self.symbols[module].kind {
            m.members.push(sym);
        }
        Ok(sym)
    }

    //
    // Small shared helpers used across the analyzer files.
    //

    pub(crate) fn error(&self, kind: SemanticErrorKind, location: Span) -> SemanticError {
        SemanticError::new(kind, location)
    }

    pub(crate) fn symbol_name(&self, sym: SymbolId) -> String {
        self.context.name_str(self.symbols[sym].name).to_string()
    }

    /// Constant-fold through the evaluator, converting its failure into a
    /// location-tagged diagnostic.
    pub(crate) fn evaluate(&mut self, expr: &TExpr, location: Span) -> Result<TExpr> {
        self.evaluator.evaluate(expr, &self.symbols).map_err(|e| {
            SemanticError::new(SemanticErrorKind::CompileTimeEvaluation(e.message), location)
        })
    }

    pub(crate) fn evaluate_integral(&mut self, expr: &TExpr, location: Span) -> Result<u64> {
        self.evaluator
            .eval_integral(expr, &self.symbols)
            .map_err(|e| {
                SemanticError::new(SemanticErrorKind::CompileTimeEvaluation(e.message), location)
            })
    }

    pub(crate) fn evaluate_string(&mut self, expr: &TExpr, location: Span) -> Result<String> {
        self.evaluator
            .eval_string(expr, &self.symbols)
            .map_err(|e| {
                SemanticError::new(SemanticErrorKind::CompileTimeEvaluation(e.message), location)
            })
    }
}

/// The AST of the builtin `object` module. `Object` is the root of every
/// class hierarchy; its first slot is the vtable field the analyzer
/// synthesizes.
fn builtin_object_module() -> ast::Module {
    ast::Module {
        span: Span::none(),
        packages: Vec::new(),
        name: "object".to_string(),
        decls: vec![Rc::new(ast::Decl::Class(ast::ClassDecl {
            span: Span::none(),
            name: "Object".to_string(),
            bases: Vec::new(),
            members: Vec::new(),
        }))],
    }
}
