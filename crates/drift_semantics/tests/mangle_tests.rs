// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::*;
use drift_ast as ast;
use drift_semantics::symbols::SymbolKind;
use expect_test::expect;

#[test]
fn test_aggregate_mangles() {
    let (mut pass, module) = analyze(vec![
        struct_decl("S", vec![]),
        class_decl("C", vec![], vec![]),
        enum_decl("E", vec![("A", None)]),
    ]);
    let scope = module_scope(&pass, module);
    let s = find(&mut pass, scope, "S");
    let c = find(&mut pass, scope, "C");
    let e = find(&mut pass, scope, "E");
    expect!["S4test1S"].assert_eq(&mangle_of(&pass, s));
    expect!["C4test1C"].assert_eq(&mangle_of(&pass, c));
    expect!["E4test1E"].assert_eq(&mangle_of(&pass, e));
}

#[test]
fn test_nested_aggregate_mangle_carries_prefix() {
    let (mut pass, module) = analyze(vec![struct_decl(
        "Outer",
        vec![struct_decl("Inner", vec![])],
    )]);
    let scope = module_scope(&pass, module);
    let outer = find(&mut pass, scope, "Outer");
    let outer_scope = match &pass.symbols[outer].kind {
        SymbolKind::Struct(a) => a.scope,
        _ => unreachable!(),
    };
    let inner = find(&mut pass, outer_scope, "Inner");
    expect!["S4test5Outer5Inner"].assert_eq(&mangle_of(&pass, inner));
}

#[test]
fn test_function_mangle_encodes_signature() {
    let (mut pass, module) = analyze(vec![func(
        "foo",
        vec![
            param("x", builtin(ast::BuiltinKind::Long)),
            param("p", pointer(builtin(ast::BuiltinKind::Byte))),
        ],
        Some(builtin(ast::BuiltinKind::Int)),
        Some(block(vec![ret(Some(int_lit(0)))])),
    )]);
    let scope = module_scope(&pass, module);
    let foo = find(&mut pass, scope, "foo");
    let mangle = mangle_of(&pass, foo);
    expect!["_D4test3fooFlPgZi"].assert_eq(&mangle);
    // D linkage: `_D`, then the enclosing prefix verbatim.
    assert!(mangle.starts_with("_D"));
    assert!(mangle.contains("4test"));
}

#[test]
fn test_c_linkage_mangles_to_bare_name() {
    let mut storage = ast::StorageClass::default();
    storage.linkage = Some(ast::Linkage::C);
    let decl = ast::Decl::Function(ast::FunctionDecl {
        span: drift_semantics::Span::none(),
        name: "write".to_string(),
        params: vec![param("fd", builtin(ast::BuiltinKind::Int))],
        return_type: Some(builtin(ast::BuiltinKind::Int)),
        is_ref_return: false,
        is_variadic: false,
        body: None,
        storage,
    });
    let (mut pass, module) = analyze(vec![decl]);
    let scope = module_scope(&pass, module);
    let write = find(&mut pass, scope, "write");
    expect!["write"].assert_eq(&mangle_of(&pass, write));
}

#[test]
fn test_global_variable_mangle() {
    let (mut pass, module) = analyze(vec![var(
        "counter",
        Some(builtin(ast::BuiltinKind::Long)),
        Some(int_lit(0)),
    )]);
    let scope = module_scope(&pass, module);
    let counter = find(&mut pass, scope, "counter");
    expect!["_D4test7counterl"].assert_eq(&mangle_of(&pass, counter));
}

#[test]
fn test_structurally_identical_types_mangle_equal() {
    // Two aliases of the same pointer type mangle identically; an alias of
    // a different type does not.
    let alias = |name: &str, ty: ast::TypeExpr| {
        ast::Decl::Alias(ast::AliasDecl {
            span: drift_semantics::Span::none(),
            name: name.to_string(),
            target: ast::AliasTarget::Type(ty),
        })
    };
    let (mut pass, module) = analyze(vec![
        alias("P1", pointer(builtin(ast::BuiltinKind::Int))),
        alias("P2", pointer(builtin(ast::BuiltinKind::Int))),
        alias("P3", pointer(builtin(ast::BuiltinKind::Uint))),
    ]);
    let scope = module_scope(&pass, module);
    let p1 = find(&mut pass, scope, "P1");
    let p2 = find(&mut pass, scope, "P2");
    let p3 = find(&mut pass, scope, "P3");
    assert_eq!(mangle_of(&pass, p1), mangle_of(&pass, p2));
    assert_ne!(mangle_of(&pass, p1), mangle_of(&pass, p3));
    expect!["Pi"].assert_eq(&mangle_of(&pass, p1));
}

#[test]
fn test_template_instance_mangle() {
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
    let int_box = find(&mut pass, scope, "IntBox");
    // The eponymous struct inside the instance carries the instantiation
    // in its prefix.
    expect!["S4test__T3BoxiZ3Box"].assert_eq(&mangle_of(&pass, int_box));
}
