// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::*;
use drift_ast as ast;
use drift_ast::BinaryOp;
use drift_semantics::ir::Expr;
use drift_semantics::semantic_error::SemanticErrorKind;
use drift_semantics::symbols::{Step, Storage, SymbolKind};
use drift_semantics::types::{BuiltinType, Type};

fn entry_value(pass: &drift_semantics::SemanticPass, sym: drift_semantics::symbols::SymbolId) -> u64 {
    match &pass.symbols[sym].kind {
        SymbolKind::Variable(v) => match v.value.as_ref().map(|value| value.expression()) {
            Some(Expr::IntegerLiteral(value)) => *value,
            other => panic!("entry is not a folded integer: {other:?}"),
        },
        _ => panic!("entry is not a variable"),
    }
}

#[test]
fn test_enum_chain_values() {
    let (mut pass, module) = analyze(vec![enum_decl(
        "E",
        vec![("A", None), ("B", None), ("C", Some(int_lit(5))), ("D", None)],
    )]);
    let scope = module_scope(&pass, module);
    let e = find(&mut pass, scope, "E");
    assert_eq!(pass.symbols[e].step(), Step::Processed);

    let (base, entries) = match &pass.symbols[e].kind {
        SymbolKind::Enum(en) => (en.base, en.entries.clone()),
        _ => panic!("expected an enum"),
    };
    assert_eq!(base, BuiltinType::Int);
    let values: Vec<u64> = entries.iter().map(|entry| entry_value(&pass, *entry)).collect();
    assert_eq!(values, vec![0, 1, 5, 6]);
    for entry in &entries {
        assert_eq!(pass.symbols[*entry].storage, Storage::Enum);
    }

    // Entries carry the enum type, not the base type.
    let first = match &pass.symbols[entries[0]].kind {
        SymbolKind::Variable(v) => v.ty.clone(),
        _ => unreachable!(),
    };
    assert_eq!(first, Type::Aggregate(e));

    let mangle = mangle_of(&pass, e);
    assert!(mangle.starts_with('E'));
    assert!(mangle.ends_with('E'));
}

#[test]
fn test_narrowing_allowed_when_range_fits() {
    // byte b = 5 + 6; is fine: the propagated range is [11, 11].
    let (mut pass, module) = analyze(vec![var(
        "b",
        Some(builtin(ast::BuiltinKind::Byte)),
        Some(binary(BinaryOp::Add, int_lit(5), int_lit(6))),
    )]);
    let scope = module_scope(&pass, module);
    let b = find(&mut pass, scope, "b");
    match &pass.symbols[b].kind {
        SymbolKind::Variable(v) => {
            assert_eq!(v.ty, Type::Builtin(BuiltinType::Byte));
            // The global was evaluated at compile time.
            assert!(matches!(
                v.value.as_ref().unwrap().expression(),
                Expr::IntegerLiteral(11)
            ));
        }
        _ => panic!("expected a variable"),
    }
}

#[test]
fn test_narrowing_rejected_when_range_overflows() {
    let result = try_analyze(vec![var(
        "b",
        Some(builtin(ast::BuiltinKind::Byte)),
        Some(binary(BinaryOp::Add, int_lit(300), int_lit(0))),
    )]);
    let error = result.err().expect("narrowing 300 into byte must fail");
    assert!(matches!(
        error.kind(),
        SemanticErrorKind::TypeMismatch { .. }
    ));
}

#[test]
fn test_narrowing_through_final_variable() {
    // A final variable's initializer range flows through reads of it.
    let (pass, _) = analyze(vec![
        ast::Decl::Variable(var_decl(
            "f",
            Some(builtin(ast::BuiltinKind::Long)),
            Some(int_lit(5)),
            ast::StorageClass {
                is_final: true,
                ..ast::StorageClass::default()
            },
        )),
        var(
            "g",
            Some(builtin(ast::BuiltinKind::Byte)),
            Some(binary(BinaryOp::Add, ident("f"), int_lit(1))),
        ),
    ]);
    drop(pass);
}

#[test]
fn test_mutable_variable_does_not_narrow() {
    let result = try_analyze(vec![
        var("x", Some(builtin(ast::BuiltinKind::Int)), Some(int_lit(5))),
        var("b", Some(builtin(ast::BuiltinKind::Byte)), Some(ident("x"))),
    ]);
    assert!(result.is_err());
}

#[test]
fn test_override_adopts_base_vtable_index() {
    let body = || Some(block(vec![ret(Some(ident("x")))]));
    let (mut pass, module) = analyze(vec![
        class_decl(
            "A",
            vec![],
            vec![func(
                "foo",
                vec![param("x", builtin(ast::BuiltinKind::Int))],
                Some(builtin(ast::BuiltinKind::Int)),
                body(),
            )],
        ),
        class_decl(
            "B",
            vec![named("A")],
            vec![ast::Decl::Function(func_decl(
                "foo",
                vec![param("x", builtin(ast::BuiltinKind::Int))],
                Some(builtin(ast::BuiltinKind::Int)),
                body(),
                /* is_override= */ true,
            ))],
        ),
    ]);
    let scope = module_scope(&pass, module);
    let a = find(&mut pass, scope, "A");
    let b = find(&mut pass, scope, "B");

    let a_scope = match &pass.symbols[a].kind {
        SymbolKind::Class(c) => c.scope,
        _ => panic!("expected a class"),
    };
    let b_scope = match &pass.symbols[b].kind {
        SymbolKind::Class(c) => {
            assert_eq!(c.base, Some(a));
            c.scope
        }
        _ => panic!("expected a class"),
    };

    let a_foo = find(&mut pass, a_scope, "foo");
    let foo_name = intern(&mut pass, "foo");
    let b_foo = pass
        .symbols
        .get_direct(b_scope, foo_name)
        .expect("foo bound in B");
    assert_ne!(a_foo, b_foo);

    let a_index = match &pass.symbols[a_foo].kind {
        SymbolKind::Method(m) => m.index,
        _ => panic!("expected a method"),
    };
    let b_index = match &pass.symbols[b_foo].kind {
        SymbolKind::Method(m) => m.index,
        _ => panic!("expected a method, found {}", pass.symbols[b_foo].kind_name()),
    };
    assert_eq!(a_index, b_index);

    // The overridden base method is gone from B's overload set: the name
    // now binds the derived method directly.
    assert!(!matches!(
        pass.symbols[b_foo].kind,
        SymbolKind::OverloadSet(_)
    ));

    // B's methods no longer carry A.foo.
    match &pass.symbols[b].kind {
        SymbolKind::Class(c) => {
            assert!(c.methods.contains(&b_foo));
            assert!(!c.methods.contains(&a_foo));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_override_without_marker_is_rejected() {
    let body = || Some(block(vec![ret(Some(int_lit(1)))]));
    let result = try_analyze(vec![
        class_decl(
            "A",
            vec![],
            vec![func("foo", vec![], Some(builtin(ast::BuiltinKind::Int)), body())],
        ),
        class_decl(
            "B",
            vec![named("A")],
            vec![func("foo", vec![], Some(builtin(ast::BuiltinKind::Int)), body())],
        ),
    ]);
    let error = result.err().expect("unmarked override must fail");
    assert!(matches!(
        error.kind(),
        SemanticErrorKind::MissingOverrideKeyword(_)
    ));
}

#[test]
fn test_override_without_base_candidate_is_rejected() {
    let body = || Some(block(vec![ret(Some(int_lit(1)))]));
    let result = try_analyze(vec![
        class_decl("A", vec![], vec![]),
        class_decl(
            "B",
            vec![named("A")],
            vec![ast::Decl::Function(func_decl(
                "bar",
                vec![],
                Some(builtin(ast::BuiltinKind::Int)),
                body(),
                /* is_override= */ true,
            ))],
        ),
    ]);
    let error = result.err().expect("override without a base slot must fail");
    assert!(matches!(
        error.kind(),
        SemanticErrorKind::OverrideNotFound(_)
    ));
}

#[test]
fn test_class_field_indices_exceed_base() {
    let (mut pass, module) = analyze(vec![
        class_decl(
            "A",
            vec![],
            vec![var("a", Some(builtin(ast::BuiltinKind::Int)), None)],
        ),
        class_decl(
            "B",
            vec![named("A")],
            vec![var("b", Some(builtin(ast::BuiltinKind::Long)), None)],
        ),
    ]);
    let scope = module_scope(&pass, module);
    let b = find(&mut pass, scope, "B");
    let fields = match &pass.symbols[b].kind {
        SymbolKind::Class(c) => c.fields.clone(),
        _ => panic!("expected a class"),
    };
    let indices: Vec<u32> = fields
        .iter()
        .map(|f| match &pass.symbols[*f].kind {
            SymbolKind::Field(field) => field.index,
            _ => panic!("expected a field"),
        })
        .collect();
    // __vtbl at 0, A.a above it, B.b above that.
    assert_eq!(indices, vec![0, 1, 2]);
    let new_field_index = *indices.last().unwrap();
    for inherited in &indices[..indices.len() - 1] {
        assert!(new_field_index > *inherited);
    }
}

#[test]
fn test_root_object_has_vtable_slot() {
    let (mut pass, module) = analyze(vec![class_decl("C", vec![], vec![])]);
    let scope = module_scope(&pass, module);
    let c = find(&mut pass, scope, "C");
    let fields = match &pass.symbols[c].kind {
        SymbolKind::Class(cls) => cls.fields.clone(),
        _ => unreachable!(),
    };
    // C inherits Object's layout; slot 0 is the vtable field.
    let first = fields.first().expect("Object contributes its vtable field");
    assert_eq!(pass.context.name_str(pass.symbols[*first].name), "__vtbl");
    match &pass.symbols[*first].kind {
        SymbolKind::Field(f) => assert_eq!(f.index, 0),
        _ => panic!("expected a field"),
    }
}

#[test]
fn test_self_referential_struct_converges() {
    // struct S { S* next; } must analyze without deadlock.
    let (mut pass, module) = analyze(vec![struct_decl(
        "S",
        vec![var("next", Some(pointer(named("S"))), None)],
    )]);
    let scope = module_scope(&pass, module);
    let s = find(&mut pass, scope, "S");
    assert_eq!(pass.symbols[s].step(), Step::Processed);
    let fields = match &pass.symbols[s].kind {
        SymbolKind::Struct(a) => a.fields.clone(),
        _ => unreachable!(),
    };
    assert_eq!(fields.len(), 1);
    match &pass.symbols[fields[0]].kind {
        SymbolKind::Field(f) => {
            assert_eq!(f.ty, Type::Pointer(Box::new(Type::Aggregate(s)), drift_semantics::types::Qualifier::Mutable));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_alias_cycle_is_detected() {
    let alias = |name: &str, target: &str| {
        ast::Decl::Alias(ast::AliasDecl {
            span: drift_semantics::Span::none(),
            name: name.to_string(),
            target: ast::AliasTarget::Type(named(target)),
        })
    };
    let result = try_analyze(vec![alias("A", "B"), alias("B", "A")]);
    let error = result.err().expect("mutually recursive aliases must fail");
    assert!(matches!(error.kind(), SemanticErrorKind::Cycle(_)));
}

#[test]
fn test_struct_init_is_a_tuple_of_field_defaults() {
    let (mut pass, module) = analyze(vec![struct_decl(
        "P",
        vec![
            var("x", Some(builtin(ast::BuiltinKind::Int)), None),
            var("flag", Some(builtin(ast::BuiltinKind::Bool)), None),
        ],
    )]);
    let scope = module_scope(&pass, module);
    let p = find(&mut pass, scope, "P");
    let (init, members, size) = match &pass.symbols[p].kind {
        SymbolKind::Struct(a) => (a.init.unwrap(), a.members.clone(), a.size),
        _ => unreachable!(),
    };
    // Member order: init, fields, others.
    assert_eq!(members[0], init);
    match &pass.symbols[init].kind {
        SymbolKind::Variable(v) => match v.value.as_ref().unwrap().expression() {
            Expr::Tuple(defaults) => {
                assert_eq!(defaults.len(), 2);
                assert!(matches!(defaults[0].expression(), Expr::IntegerLiteral(0)));
                assert!(matches!(defaults[1].expression(), Expr::BoolLiteral(false)));
            }
            other => panic!("init is not a tuple: {other:?}"),
        },
        _ => unreachable!(),
    }
    assert_eq!(size, Some(8));
}

#[test]
fn test_embedded_aggregate_is_sized_before_caching() {
    // Holder signs first in registration order; its size must still be
    // computed against Pair's finished layout, even though the explicit
    // initializer means nothing else forces Pair along.
    let (mut pass, module) = analyze(vec![
        struct_decl(
            "Holder",
            vec![var("p", Some(named("Pair")), Some(call(ident("makePair"), vec![])))],
        ),
        struct_decl(
            "Pair",
            vec![
                var("a", Some(builtin(ast::BuiltinKind::Int)), None),
                var("b", Some(builtin(ast::BuiltinKind::Int)), None),
            ],
        ),
        func("makePair", vec![], Some(named("Pair")), None),
    ]);
    let scope = module_scope(&pass, module);
    let holder = find(&mut pass, scope, "Holder");
    let pair = find(&mut pass, scope, "Pair");
    let size_of = |pass: &drift_semantics::SemanticPass, sym| match &pass.symbols[sym].kind {
        SymbolKind::Struct(a) => a.size,
        _ => panic!("expected a struct"),
    };
    assert_eq!(size_of(&pass, pair), Some(8));
    assert_eq!(size_of(&pass, holder), Some(8));
}

#[test]
fn test_auto_return_is_inferred() {
    let (mut pass, module) = analyze(vec![func(
        "add1",
        vec![param("x", builtin(ast::BuiltinKind::Int))],
        None,
        Some(block(vec![ret(Some(binary(
            BinaryOp::Add,
            ident("x"),
            int_lit(1),
        )))])),
    )]);
    let scope = module_scope(&pass, module);
    let f = find(&mut pass, scope, "add1");
    let ty = pass.symbols[f].function().unwrap().ty.clone().unwrap();
    assert_eq!(ty.return_type.ty, Type::Builtin(BuiltinType::Int));
}

#[test]
fn test_auto_function_without_return_is_void() {
    let (mut pass, module) = analyze(vec![func("noop", vec![], None, Some(block(vec![])))]);
    let scope = module_scope(&pass, module);
    let f = find(&mut pass, scope, "noop");
    let ty = pass.symbols[f].function().unwrap().ty.clone().unwrap();
    assert_eq!(ty.return_type.ty, Type::Builtin(BuiltinType::Void));
}

#[test]
fn test_duplicate_symbol_is_rejected() {
    let result = try_analyze(vec![
        var("x", Some(builtin(ast::BuiltinKind::Int)), Some(int_lit(0))),
        var("x", Some(builtin(ast::BuiltinKind::Long)), Some(int_lit(0))),
    ]);
    let error = result.err().expect("redeclaration must fail");
    assert!(matches!(error.kind(), SemanticErrorKind::DuplicateSymbol(_)));
}

#[test]
fn test_unresolved_identifier_is_rejected() {
    let result = try_analyze(vec![var(
        "x",
        Some(builtin(ast::BuiltinKind::Int)),
        Some(ident("missing")),
    )]);
    let error = result.err().expect("unknown name must fail");
    assert!(matches!(
        error.kind(),
        SemanticErrorKind::UnresolvedIdentifier(name) if name == "missing"
    ));
}

#[test]
fn test_static_if_selects_branch() {
    let decl = ast::Decl::StaticIf(ast::StaticIfDecl {
        span: drift_semantics::Span::none(),
        condition: bool_lit(true),
        then_decls: vec![std::rc::Rc::new(var(
            "yes",
            Some(builtin(ast::BuiltinKind::Int)),
            Some(int_lit(1)),
        ))],
        else_decls: vec![std::rc::Rc::new(var(
            "no",
            Some(builtin(ast::BuiltinKind::Int)),
            Some(int_lit(2)),
        ))],
    });
    let (mut pass, module) = analyze(vec![decl]);
    let scope = module_scope(&pass, module);
    let yes = intern(&mut pass, "yes");
    let no = intern(&mut pass, "no");
    assert!(pass.symbols.lookup_local(scope, yes).is_some());
    assert!(pass.symbols.lookup_local(scope, no).is_none());
}

#[test]
fn test_version_block_uses_default_set() {
    let decl = ast::Decl::Version(ast::VersionDecl {
        span: drift_semantics::Span::none(),
        ident: "D_LP64".to_string(),
        then_decls: vec![std::rc::Rc::new(var(
            "wide",
            Some(builtin(ast::BuiltinKind::Long)),
            Some(int_lit(1)),
        ))],
        else_decls: vec![],
    });
    let (mut pass, module) = analyze(vec![decl]);
    let scope = module_scope(&pass, module);
    let wide = intern(&mut pass, "wide");
    assert!(pass.symbols.lookup_local(scope, wide).is_some());
}

#[test]
fn test_build_main_wraps_void_main() {
    let (mut pass, module) = analyze(vec![func(
        "main",
        vec![],
        Some(builtin(ast::BuiltinKind::Void)),
        Some(block(vec![])),
    )]);
    let bootstrap = pass.build_main(&[module]).expect("main exists");
    assert_eq!(mangle_of(&pass, bootstrap), "_Dmain");
    let func = pass.symbols[bootstrap].function().unwrap();
    let ty = func.ty.clone().unwrap();
    assert_eq!(ty.return_type.ty, Type::Builtin(BuiltinType::Int));
    // void main is called, then 0 is returned.
    let body = func.body.clone().unwrap();
    assert_eq!(body.stmts.len(), 2);
}

#[test]
fn test_build_main_returns_int_main_directly() {
    let (mut pass, module) = analyze(vec![func(
        "main",
        vec![],
        Some(builtin(ast::BuiltinKind::Int)),
        Some(block(vec![ret(Some(int_lit(0)))])),
    )]);
    let bootstrap = pass.build_main(&[module]).expect("main exists");
    let body = pass.symbols[bootstrap]
        .function()
        .unwrap()
        .body
        .clone()
        .unwrap();
    assert_eq!(body.stmts.len(), 1);
}

#[test]
fn test_build_main_requires_a_main() {
    let (mut pass, module) = analyze(vec![]);
    let result = pass.build_main(&[module]);
    assert!(result.is_err());
}

#[test]
fn test_nested_function_captures_local() {
    // void outer() { int x = 0; int inner() { return x; } }
    let inner = ast::Stmt::Declaration(std::rc::Rc::new(func(
        "inner",
        vec![],
        Some(builtin(ast::BuiltinKind::Int)),
        Some(block(vec![ret(Some(ident("x")))])),
    )));
    let body = block(vec![
        ast::Stmt::Variable(var_decl(
            "x",
            Some(builtin(ast::BuiltinKind::Int)),
            Some(int_lit(0)),
            ast::StorageClass::default(),
        )),
        inner,
    ]);
    let (mut pass, module) = analyze(vec![func(
        "outer",
        vec![],
        Some(builtin(ast::BuiltinKind::Void)),
        Some(body),
    )]);
    let scope = module_scope(&pass, module);
    let outer = find(&mut pass, scope, "outer");
    let closure = pass.symbols[outer].function().unwrap().closure.clone();
    assert_eq!(closure.len(), 1, "outer captures exactly one local");
    assert_eq!(pass.context.name_str(pass.symbols[closure[0]].name), "x");
    assert_eq!(pass.symbols[closure[0]].storage, Storage::Capture);
}

#[test]
fn test_template_instantiation_caches_by_arguments() {
    // template Box(T) { struct Box { T value; } }
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
    let alias = |name: &str| {
        ast::Decl::Alias(ast::AliasDecl {
            span: drift_semantics::Span::none(),
            name: name.to_string(),
            target: ast::AliasTarget::Type(ast::TypeExpr::Named(ast::NamedType {
                span: drift_semantics::Span::none(),
                path: vec!["Box".to_string()],
                args: Some(vec![ast::TemplateArg::Type(builtin(ast::BuiltinKind::Int))]),
            })),
        })
    };
    let (mut pass, module) = analyze(vec![template, alias("First"), alias("Second")]);
    let scope = module_scope(&pass, module);
    let first = find(&mut pass, scope, "First");
    let second = find(&mut pass, scope, "Second");
    let ty_of = |pass: &drift_semantics::SemanticPass, sym| match &pass.symbols[sym].kind {
        SymbolKind::TypeAlias(a) => a.ty.clone().unwrap(),
        _ => panic!("expected a type alias"),
    };
    // Same arguments, same instance: the cache is keyed on the mangled
    // argument string.
    assert_eq!(ty_of(&pass, first), ty_of(&pass, second));

    let boxed = match ty_of(&pass, first) {
        Type::Aggregate(sym) => sym,
        other => panic!("expected an aggregate, found {other:?}"),
    };
    let fields = match &pass.symbols[boxed].kind {
        SymbolKind::Struct(a) => a.fields.clone(),
        _ => panic!("expected the eponymous struct"),
    };
    match &pass.symbols[fields[0]].kind {
        SymbolKind::Field(f) => assert_eq!(f.ty, Type::Builtin(BuiltinType::Int)),
        _ => unreachable!(),
    }
}

#[test]
fn test_ifti_deduces_from_call_arguments() {
    // template identity(T) { T identity(T x) { return x; } }
    // int user() { return identity(5); }
    let template = ast::Decl::Template(ast::TemplateDecl {
        span: drift_semantics::Span::none(),
        name: "identity".to_string(),
        params: vec![ast::TemplateParamDecl {
            span: drift_semantics::Span::none(),
            name: "T".to_string(),
            kind: ast::TemplateParamKind::Type,
        }],
        members: vec![std::rc::Rc::new(func(
            "identity",
            vec![param("x", named("T"))],
            Some(named("T")),
            Some(block(vec![ret(Some(ident("x")))])),
        ))],
    });
    let user = func(
        "user",
        vec![],
        Some(builtin(ast::BuiltinKind::Int)),
        Some(block(vec![ret(Some(call(ident("identity"), vec![int_lit(5)])))])),
    );
    let (mut pass, module) = analyze(vec![template, user]);
    let scope = module_scope(&pass, module);
    let template_sym = find(&mut pass, scope, "identity");
    match &pass.symbols[template_sym].kind {
        SymbolKind::Template(t) => {
            assert_eq!(t.instances.len(), 1, "one deduced instantiation");
        }
        _ => panic!("expected a template"),
    }
}

#[test]
fn test_methods_of_struct_see_fields_without_cycling() {
    // struct S { int x; int get() { return x; } }
    let (mut pass, module) = analyze(vec![struct_decl(
        "S",
        vec![
            var("x", Some(builtin(ast::BuiltinKind::Int)), None),
            func(
                "get",
                vec![],
                Some(builtin(ast::BuiltinKind::Int)),
                Some(block(vec![ret(Some(ident("x")))])),
            ),
        ],
    )]);
    let scope = module_scope(&pass, module);
    let s = find(&mut pass, scope, "S");
    assert_eq!(pass.symbols[s].step(), Step::Processed);
}
