// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Deterministic external-ABI name encoding.
//
// The scheme follows the D mangling conventions: qualified names are
// sequences of length-prefixed identifiers, D-linkage symbols carry a `_D`
// prefix followed by their qualified name and type, and aggregates are
// tagged `S`/`C`/`I`/`E`. Two types mangle to the same string iff they are
// structurally identical, which is what makes the mangle usable as an
// instantiation cache key.

use crate::context::Context;
use crate::symbols::{Linkage, Symbols};
use crate::types::{BuiltinType, FunctionType, IsRef, IsVariadic, ParamType, Qualifier, Type};

/// Append `<len><name>` to `out`.
pub fn mangle_component(out: &mut String, name: &str) {
    out.push_str(&name.len().to_string());
    out.push_str(name);
}

fn builtin_char(builtin: BuiltinType) -> &'static str {
    use BuiltinType::*;
    match builtin {
        Void => "v",
        Bool => "b",
        Char => "a",
        Wchar => "u",
        Dchar => "w",
        Byte => "g",
        Ubyte => "h",
        Short => "s",
        Ushort => "t",
        Int => "i",
        Uint => "k",
        Long => "l",
        Ulong => "m",
        Cent => "zi",
        Ucent => "zk",
        Null => "n",
        None => panic!("cannot mangle the auto sentinel"),
    }
}

/// A visitor producing the structural encoding of types. The output is
/// appended to an internal buffer so nested types mangle without
/// intermediate allocations.
pub struct TypeMangler<'a> {
    symbols: &'a Symbols,
    context: &'a Context,
    out: String,
}

impl<'a> TypeMangler<'a> {
    pub fn new(symbols: &'a Symbols, context: &'a Context) -> TypeMangler<'a> {
        TypeMangler {
            symbols,
            context,
            out: String::new(),
        }
    }

    pub fn mangle(mut self, ty: &Type) -> String {
        self.visit(ty);
        self.out
    }

    pub fn mangle_function(mut self, ty: &FunctionType) -> String {
        self.visit_function(ty);
        self.out
    }

    fn visit(&mut self, ty: &Type) {
        match ty {
            Type::Builtin(builtin) => self.out.push_str(builtin_char(*builtin)),
            Type::Pointer(pointee, qualifier) => {
                match qualifier {
                    Qualifier::Mutable => {}
                    Qualifier::Const => self.out.push('x'),
                    Qualifier::Immutable => self.out.push('y'),
                }
                self.out.push('P');
                self.visit(pointee);
            }
            Type::Slice(element) => {
                self.out.push('A');
                self.visit(element);
            }
            Type::Array(element, size) => {
                self.out.push('G');
                self.out.push_str(&size.to_string());
                self.visit(element);
            }
            Type::Function(function) => {
                self.out.push('P');
                self.visit_function(function);
            }
            Type::Aggregate(sym) => {
                // Aggregates mangle their tag and qualified name once, at
                // populate time; reuse it here.
                let symbol = &self.symbols[*sym];
                let mangle = symbol
                    .mangle
                    .unwrap_or_else(|| panic!("aggregate mangled before it was populated"));
                self.out.push_str(self.context.name_str(mangle));
            }
            Type::Context(_) => panic!("context types never reach the ABI"),
        }
    }

    fn visit_param(&mut self, param: &ParamType) {
        if param.is_ref == IsRef::True {
            self.out.push('K');
        }
        self.visit(&param.ty);
    }

    fn visit_function(&mut self, ty: &FunctionType) {
        match ty.linkage {
            Linkage::D => self.out.push('F'),
            Linkage::C => self.out.push('U'),
        }
        for param in &ty.params {
            self.visit_param(param);
        }
        if ty.is_variadic == IsVariadic::True {
            self.out.push('X');
        }
        self.out.push('Z');
        self.visit_param(&ty.return_type);
    }
}
