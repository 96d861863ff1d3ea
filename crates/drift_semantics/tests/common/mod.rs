// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Shared scaffolding for the analyzer tests: a stub parser serving
// pre-built modules, a pass wired with the default collaborators, and a
// handful of AST constructors so tests stay readable.

// Each test binary uses a different slice of this module.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use drift_ast as ast;
use drift_semantics::context::Name;
use drift_semantics::eval::{Amd64Layout, FoldEvaluator};
use drift_semantics::pass::{Parser, SemanticPass};
use drift_semantics::symbols::{ScopeId, SymbolId, SymbolKind};
use drift_semantics::Span;

#[derive(Default)]
pub struct StubParser {
    modules: HashMap<String, ast::Module>,
}

impl StubParser {
    pub fn with_module(module: ast::Module) -> StubParser {
        let mut parser = StubParser::default();
        parser.modules.insert(format!("{}.dr", module.name), module);
        parser
    }
}

impl Parser for StubParser {
    fn parse(&mut self, file: &Path, _packages: &[String]) -> Result<ast::Module, String> {
        let key = file.to_string_lossy().to_string();
        self.modules
            .get(&key)
            .cloned()
            .ok_or_else(|| format!("no such file: {key}"))
    }
}

pub fn new_pass(parser: StubParser) -> SemanticPass {
    SemanticPass::new(
        Box::new(parser),
        Box::new(FoldEvaluator::new()),
        Box::new(Amd64Layout::new()),
        Vec::new(),
    )
    .expect("the builtin object module must analyze")
}

/// Run a module's declarations through a fresh pass to completion.
pub fn analyze(decls: Vec<ast::Decl>) -> (SemanticPass, SymbolId) {
    try_analyze(decls).expect("analysis should succeed")
}

/// Like `analyze`, but hand the error back instead of unwrapping. Errors
/// can surface while the module flattens (inside `add`) or while the
/// scheduler drains (inside `terminate`).
pub fn try_analyze(
    decls: Vec<ast::Decl>,
) -> Result<(SemanticPass, SymbolId), drift_semantics::semantic_error::SemanticError> {
    let module = ast::Module {
        span: Span::none(),
        packages: Vec::new(),
        name: "test".to_string(),
        decls: decls.into_iter().map(Rc::new).collect(),
    };
    let mut pass = new_pass(StubParser::with_module(module));
    let module = pass.add("test.dr", &[])?;
    pass.terminate()?;
    Ok((pass, module))
}

pub fn module_scope(pass: &SemanticPass, module: SymbolId) -> ScopeId {
    match &pass.symbols[module].kind {
        SymbolKind::Module(m) => m.scope,
        _ => unreachable!(),
    }
}

pub fn intern(pass: &mut SemanticPass, name: &str) -> Name {
    pass.context.get_name(name)
}

/// Look a name up directly in a scope, panicking when absent.
pub fn find(pass: &mut SemanticPass, scope: ScopeId, name: &str) -> SymbolId {
    let interned = intern(pass, name);
    pass.symbols
        .lookup_local(scope, interned)
        .unwrap_or_else(|| panic!("'{name}' not found"))
}

pub fn mangle_of(pass: &SemanticPass, sym: SymbolId) -> String {
    let mangle = pass.symbols[sym].mangle.expect("symbol has a mangle");
    pass.context.name_str(mangle).to_string()
}

//
// AST constructors
//

pub fn int_lit(value: u64) -> ast::Expr {
    ast::Expr::IntegerLiteral(ast::IntegerLiteral {
        span: Span::none(),
        value,
        is_long: false,
    })
}

pub fn bool_lit(value: bool) -> ast::Expr {
    ast::Expr::BoolLiteral(ast::BoolLiteral {
        span: Span::none(),
        value,
    })
}

pub fn ident(name: &str) -> ast::Expr {
    ast::Expr::Identifier(ast::Identifier {
        span: Span::none(),
        name: name.to_string(),
    })
}

pub fn binary(op: ast::BinaryOp, lhs: ast::Expr, rhs: ast::Expr) -> ast::Expr {
    ast::Expr::Binary(Box::new(ast::BinaryExpr {
        span: Span::none(),
        op,
        lhs,
        rhs,
    }))
}

pub fn call(callee: ast::Expr, args: Vec<ast::Expr>) -> ast::Expr {
    ast::Expr::Call(Box::new(ast::CallExpr {
        span: Span::none(),
        callee,
        args,
    }))
}

pub fn builtin(kind: ast::BuiltinKind) -> ast::TypeExpr {
    ast::TypeExpr::Builtin(kind)
}

pub fn named(name: &str) -> ast::TypeExpr {
    ast::TypeExpr::Named(ast::NamedType {
        span: Span::none(),
        path: vec![name.to_string()],
        args: None,
    })
}

pub fn pointer(pointee: ast::TypeExpr) -> ast::TypeExpr {
    ast::TypeExpr::Pointer(Box::new(pointee))
}

pub fn var(name: &str, ty: Option<ast::TypeExpr>, init: Option<ast::Expr>) -> ast::Decl {
    ast::Decl::Variable(var_decl(name, ty, init, ast::StorageClass::default()))
}

pub fn var_decl(
    name: &str,
    ty: Option<ast::TypeExpr>,
    init: Option<ast::Expr>,
    storage: ast::StorageClass,
) -> ast::VariableDecl {
    ast::VariableDecl {
        span: Span::none(),
        name: name.to_string(),
        ty,
        init,
        storage,
    }
}

pub fn param(name: &str, ty: ast::TypeExpr) -> ast::ParamDecl {
    ast::ParamDecl {
        span: Span::none(),
        name: name.to_string(),
        ty,
        is_ref: false,
        is_final: false,
        default: None,
    }
}

pub fn block(stmts: Vec<ast::Stmt>) -> ast::Block {
    ast::Block {
        span: Span::none(),
        stmts,
    }
}

pub fn ret(value: Option<ast::Expr>) -> ast::Stmt {
    ast::Stmt::Return(ast::ReturnStmt {
        span: Span::none(),
        value,
    })
}

pub fn func(
    name: &str,
    params: Vec<ast::ParamDecl>,
    return_type: Option<ast::TypeExpr>,
    body: Option<ast::Block>,
) -> ast::Decl {
    ast::Decl::Function(func_decl(name, params, return_type, body, false))
}

pub fn func_decl(
    name: &str,
    params: Vec<ast::ParamDecl>,
    return_type: Option<ast::TypeExpr>,
    body: Option<ast::Block>,
    is_override: bool,
) -> ast::FunctionDecl {
    ast::FunctionDecl {
        span: Span::none(),
        name: name.to_string(),
        params,
        return_type,
        is_ref_return: false,
        is_variadic: false,
        body,
        storage: ast::StorageClass {
            is_override,
            ..ast::StorageClass::default()
        },
    }
}

pub fn enum_decl(name: &str, entries: Vec<(&str, Option<ast::Expr>)>) -> ast::Decl {
    ast::Decl::Enum(ast::EnumDecl {
        span: Span::none(),
        name: name.to_string(),
        base: None,
        entries: entries
            .into_iter()
            .map(|(entry, value)| ast::EnumEntryDecl {
                span: Span::none(),
                name: entry.to_string(),
                value,
            })
            .collect(),
    })
}

pub fn struct_decl(name: &str, members: Vec<ast::Decl>) -> ast::Decl {
    ast::Decl::Struct(ast::AggregateDecl {
        span: Span::none(),
        name: name.to_string(),
        members: members.into_iter().map(Rc::new).collect(),
    })
}

pub fn class_decl(name: &str, bases: Vec<ast::TypeExpr>, members: Vec<ast::Decl>) -> ast::Decl {
    ast::Decl::Class(ast::ClassDecl {
        span: Span::none(),
        name: name.to_string(),
        bases,
        members: members.into_iter().map(Rc::new).collect(),
    })
}
