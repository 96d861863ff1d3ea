// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

//! Run the semantic pass over a small hand-built module and dump what came
//! out: every module member with its kind, stage, and mangled name.
//!
//! There is no parser wired in here; the module AST is built by hand, the
//! same way a front-end would hand it to the pass.

use std::path::Path;
use std::rc::Rc;

use drift_ast as ast;
use drift_semantics::eval::{Amd64Layout, FoldEvaluator};
use drift_semantics::pass::{Parser, SemanticPass};
use drift_semantics::symbols::SymbolKind;
use drift_semantics::Span;

struct MemParser {
    module: Option<ast::Module>,
}

impl Parser for MemParser {
    fn parse(&mut self, _file: &Path, _packages: &[String]) -> Result<ast::Module, String> {
        self.module.take().ok_or_else(|| "module already taken".to_string())
    }
}

fn int_type() -> ast::TypeExpr {
    ast::TypeExpr::Builtin(ast::BuiltinKind::Int)
}

fn demo_module() -> ast::Module {
    // enum Color { Red, Green, Blue = 5 }
    let color = ast::Decl::Enum(ast::EnumDecl {
        span: Span::none(),
        name: "Color".to_string(),
        base: None,
        entries: vec![
            ast::EnumEntryDecl {
                span: Span::none(),
                name: "Red".to_string(),
                value: None,
            },
            ast::EnumEntryDecl {
                span: Span::none(),
                name: "Green".to_string(),
                value: None,
            },
            ast::EnumEntryDecl {
                span: Span::none(),
                name: "Blue".to_string(),
                value: Some(ast::Expr::IntegerLiteral(ast::IntegerLiteral {
                    span: Span::none(),
                    value: 5,
                    is_long: false,
                })),
            },
        ],
    });

    // struct Point { int x; int y; }
    let point = ast::Decl::Struct(ast::AggregateDecl {
        span: Span::none(),
        name: "Point".to_string(),
        members: vec![
            Rc::new(ast::Decl::Variable(ast::VariableDecl {
                span: Span::none(),
                name: "x".to_string(),
                ty: Some(int_type()),
                init: None,
                storage: ast::StorageClass::default(),
            })),
            Rc::new(ast::Decl::Variable(ast::VariableDecl {
                span: Span::none(),
                name: "y".to_string(),
                ty: Some(int_type()),
                init: None,
                storage: ast::StorageClass::default(),
            })),
        ],
    });

    // int twice(int x) { return x + x; }
    let twice = ast::Decl::Function(ast::FunctionDecl {
        span: Span::none(),
        name: "twice".to_string(),
        params: vec![ast::ParamDecl {
            span: Span::none(),
            name: "x".to_string(),
            ty: int_type(),
            is_ref: false,
            is_final: false,
            default: None,
        }],
        return_type: Some(int_type()),
        is_ref_return: false,
        is_variadic: false,
        body: Some(ast::Block {
            span: Span::none(),
            stmts: vec![ast::Stmt::Return(ast::ReturnStmt {
                span: Span::none(),
                value: Some(ast::Expr::Binary(Box::new(ast::BinaryExpr {
                    span: Span::none(),
                    op: ast::BinaryOp::Add,
                    lhs: ast::Expr::Identifier(ast::Identifier {
                        span: Span::none(),
                        name: "x".to_string(),
                    }),
                    rhs: ast::Expr::Identifier(ast::Identifier {
                        span: Span::none(),
                        name: "x".to_string(),
                    }),
                }))),
            })],
        }),
        storage: ast::StorageClass::default(),
    });

    ast::Module {
        span: Span::none(),
        packages: Vec::new(),
        name: "demo".to_string(),
        decls: vec![Rc::new(color), Rc::new(point), Rc::new(twice)],
    }
}

fn main() {
    let parser = MemParser {
        module: Some(demo_module()),
    };
    let mut pass = SemanticPass::new(
        Box::new(parser),
        Box::new(FoldEvaluator::new()),
        Box::new(Amd64Layout::new()),
        Vec::new(),
    )
    .expect("builtin module analyzes");

    let module = pass.add("demo.dr", &[]).expect("demo module analyzes");
    if let Err(error) = pass.terminate() {
        error.report(&pass.context.sources);
        std::process::exit(1);
    }

    let members = match &pass.symbols[module].kind {
        SymbolKind::Module(m) => m.members.clone(),
        _ => unreachable!(),
    };
    println!("module demo: {} members", members.len());
    for member in members {
        let symbol = &pass.symbols[member];
        let name = pass.context.name_str(symbol.name);
        let mangle = symbol
            .mangle
            .map(|m| pass.context.name_str(m).to_string())
            .unwrap_or_else(|| "<none>".to_string());
        println!(
            "  {:<10} {:<8} step={:?} mangle={}",
            name,
            symbol.kind_name(),
            symbol.step(),
            mangle
        );
    }
}
