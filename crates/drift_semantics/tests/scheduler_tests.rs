// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::*;
use drift_ast as ast;
use drift_semantics::symbols::Step;

#[test]
fn test_require_reaches_the_requested_stage() {
    let module = ast::Module {
        span: drift_semantics::Span::none(),
        packages: Vec::new(),
        name: "test".to_string(),
        decls: vec![std::rc::Rc::new(var(
            "x",
            Some(builtin(ast::BuiltinKind::Int)),
            Some(int_lit(1)),
        ))],
    };
    let mut pass = new_pass(StubParser::with_module(module));
    let module = pass.add("test.dr", &[]).unwrap();

    // `add` populates the module eagerly but goes no further.
    assert_eq!(pass.symbols[module].step(), Step::Populated);
    let scope = module_scope(&pass, module);
    let x = find(&mut pass, scope, "x");
    assert_eq!(pass.symbols[x].step(), Step::Parsed);

    // Requiring a high stage implies every lower one.
    pass.require(x, Step::Signed).unwrap();
    assert!(pass.symbols[x].step() >= Step::Signed);
    assert!(pass.symbols[x].step() >= Step::Populated);

    // Requiring an already-published stage is a no-op.
    pass.require(x, Step::Populated).unwrap();
    assert!(pass.symbols[x].step() >= Step::Signed);

    pass.terminate().unwrap();
    assert_eq!(pass.symbols[x].step(), Step::Processed);
    assert_eq!(pass.symbols[module].step(), Step::Processed);
}

#[test]
fn test_terminate_drives_everything_scheduled_later() {
    // A template instantiated from another symbol's analysis appears in
    // the ledger mid-terminate and is still driven to completion.
    let template = ast::Decl::Template(ast::TemplateDecl {
        span: drift_semantics::Span::none(),
        name: "Box".to_string(),
        params: vec![ast::TemplateParamDecl {
            span: drift_semantics::Span::none(),
            name: "T".to_string(),
            kind: ast::TemplateParamKind::Type,
        }],
        members: vec![std::rc::Rc::new(struct_decl(
            "Box",
            vec![var("value", Some(named("T")), None)],
        ))],
    });
    let alias = ast::Decl::Alias(ast::AliasDecl {
        span: drift_semantics::Span::none(),
        name: "IntBox".to_string(),
        target: ast::AliasTarget::Type(ast::TypeExpr::Named(ast::NamedType {
            span: drift_semantics::Span::none(),
            path: vec!["Box".to_string()],
            args: Some(vec![ast::TemplateArg::Type(builtin(ast::BuiltinKind::Int))]),
        })),
    });
    let (mut pass, module) = analyze(vec![template, alias]);
    let scope = module_scope(&pass, module);
    let alias_sym = find(&mut pass, scope, "IntBox");
    let instance = match &pass.symbols[alias_sym].kind {
        drift_semantics::symbols::SymbolKind::TypeAlias(a) => match a.ty.clone().unwrap() {
            drift_semantics::types::Type::Aggregate(sym) => sym,
            _ => panic!("expected an aggregate"),
        },
        _ => panic!("expected a type alias"),
    };
    assert_eq!(pass.symbols[instance].step(), Step::Processed);
}

#[test]
fn test_mutual_recursion_between_types_converges() {
    // struct A { B* b; }  struct B { A* a; }
    let (mut pass, module) = analyze(vec![
        struct_decl("A", vec![var("b", Some(pointer(named("B"))), None)]),
        struct_decl("B", vec![var("a", Some(pointer(named("A"))), None)]),
    ]);
    let scope = module_scope(&pass, module);
    let a = find(&mut pass, scope, "A");
    let b = find(&mut pass, scope, "B");
    assert_eq!(pass.symbols[a].step(), Step::Processed);
    assert_eq!(pass.symbols[b].step(), Step::Processed);
}

#[test]
fn test_mutual_containment_is_a_cycle() {
    // struct A { B b; }  struct B { A a; } has infinite size; the
    // scheduler reports the cycle instead of recursing forever.
    let result = try_analyze(vec![
        struct_decl("A", vec![var("b", Some(named("B")), None)]),
        struct_decl("B", vec![var("a", Some(named("A")), None)]),
    ]);
    let error = result.err().expect("mutual containment must fail");
    assert!(matches!(
        error.kind(),
        drift_semantics::semantic_error::SemanticErrorKind::Cycle(_)
    ));
}
