// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Symbols, scopes, and the arena they live in.
//
// Every declaration materializes as exactly one `Symbol`, created as a stub
// by the flattener and advanced through its stages by the analyzer. Symbols
// are never destroyed during a compilation; scopes outlive their contents.
// The `step` field is the only cross-task synchronization point: it advances
// monotonically and readers wait on stages, never on completion.

use hashbrown::HashMap;

use drift_ast as ast;
use drift_source_file::Span;

use crate::context::Name;
use crate::ir::{TBlock, TExpr};
use crate::types::{BuiltinType, FunctionType, ParamType, Type};
use std::rc::Rc;

/// A unique label for instances of `Symbol`, and an index into the arena.
/// Cloning a `SymbolId` is no more expensive than a reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

/// Index of a scope in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// Monotonic analysis progress of a symbol.
///
/// A symbol never regresses; a reader that needs stage S either finds the
/// symbol already there or drives it there through the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Parsed,
    Populated,
    Signed,
    Processed,
}

impl Step {
    pub fn next(self) -> Step {
        match self {
            Step::Parsed => Step::Populated,
            Step::Populated => Step::Signed,
            Step::Signed => Step::Processed,
            Step::Processed => panic!("no stage after Processed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    D,
    C,
}

impl Linkage {
    pub fn from_ast(linkage: ast::Linkage) -> Linkage {
        match linkage {
            ast::Linkage::D => Linkage::D,
            ast::Linkage::C => Linkage::C,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Package,
}

impl Visibility {
    pub fn from_ast(visibility: ast::Visibility) -> Visibility {
        match visibility {
            ast::Visibility::Public => Visibility::Public,
            ast::Visibility::Protected => Visibility::Protected,
            ast::Visibility::Private => Visibility::Private,
            ast::Visibility::Package => Visibility::Package,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    Local,
    Capture,
    Static,
    Enum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub location: Span,
    pub name: Name,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub storage: Storage,
    /// The interned external name; assigned no later than `Signed`.
    pub mangle: Option<Name>,
    step: Step,
    /// Whether this symbol closes over an enclosing function or aggregate.
    pub has_context: bool,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(location: Span, name: Name, kind: SymbolKind) -> Symbol {
        Symbol {
            location,
            name,
            linkage: Linkage::D,
            visibility: Visibility::Public,
            storage: Storage::Static,
            mangle: None,
            step: Step::Parsed,
            has_context: false,
            kind,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Publish a stage. Steps only ever move forward; a regression is a
    /// compiler bug.
    pub fn set_step(&mut self, step: Step) {
        assert!(
            step >= self.step,
            "symbol step regression: {:?} -> {:?}",
            self.step,
            step
        );
        self.step = step;
    }

    /// The scope owned by this symbol, if its kind has one.
    pub fn owned_scope(&self) -> Option<ScopeId> {
        match &self.kind {
            SymbolKind::Module(s) => Some(s.scope),
            SymbolKind::Function(f) | SymbolKind::Method(MethodSymbol { func: f, .. }) => f.scope,
            SymbolKind::Struct(s) | SymbolKind::Union(s) => Some(s.scope),
            SymbolKind::Class(c) => Some(c.scope),
            SymbolKind::Interface(i) => Some(i.scope),
            SymbolKind::Enum(e) => Some(e.scope),
            SymbolKind::Template(t) => Some(t.scope),
            SymbolKind::TemplateInstance(i) => Some(i.scope),
            _ => None,
        }
    }

    /// The function payload shared by plain functions and methods.
    pub fn function(&self) -> Option<&FunctionSymbol> {
        match &self.kind {
            SymbolKind::Function(f) => Some(f),
            SymbolKind::Method(m) => Some(&m.func),
            _ => None,
        }
    }

    pub fn function_mut(&mut self) -> Option<&mut FunctionSymbol> {
        match &mut self.kind {
            SymbolKind::Function(f) => Some(f),
            SymbolKind::Method(m) => Some(&mut m.func),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SymbolKind::Module(_) => "module",
            SymbolKind::Function(_) => "function",
            SymbolKind::Method(_) => "method",
            SymbolKind::Variable(_) => "variable",
            SymbolKind::Field(_) => "field",
            SymbolKind::Struct(_) => "struct",
            SymbolKind::Union(_) => "union",
            SymbolKind::Class(_) => "class",
            SymbolKind::Interface(_) => "interface",
            SymbolKind::Enum(_) => "enum",
            SymbolKind::Template(_) => "template",
            SymbolKind::TemplateInstance(_) => "template instance",
            SymbolKind::TypeAlias(_) => "type alias",
            SymbolKind::ValueAlias(_) => "value alias",
            SymbolKind::SymbolAlias(_) => "alias",
            SymbolKind::OverloadSet(_) => "overload set",
            SymbolKind::TypeParameter(_) => "type parameter",
            SymbolKind::ValueParameter(_) => "value parameter",
            SymbolKind::AliasParameter(_) => "alias parameter",
            SymbolKind::TypedAliasParameter(_) => "typed alias parameter",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolKind {
    Module(ModuleSymbol),
    Function(FunctionSymbol),
    Method(MethodSymbol),
    Variable(VariableSymbol),
    Field(FieldSymbol),
    Struct(AggregateSymbol),
    Union(AggregateSymbol),
    Class(ClassSymbol),
    Interface(InterfaceSymbol),
    Enum(EnumSymbol),
    Template(TemplateSymbol),
    TemplateInstance(InstanceSymbol),
    TypeAlias(TypeAliasSymbol),
    ValueAlias(ValueAliasSymbol),
    SymbolAlias(SymbolAliasSymbol),
    OverloadSet(OverloadSetSymbol),
    TypeParameter(TypeParameterSymbol),
    ValueParameter(ValueParameterSymbol),
    AliasParameter(AliasParameterSymbol),
    TypedAliasParameter(TypedAliasParameterSymbol),
}

impl SymbolKind {
    /// Functions, methods, and templates may share a name; everything else
    /// collides.
    pub fn is_overloadable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function(_) | SymbolKind::Method(_) | SymbolKind::Template(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleSymbol {
    pub scope: ScopeId,
    pub members: Vec<SymbolId>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct FunctionSymbol {
    pub ty: Option<FunctionType>,
    pub params: Vec<SymbolId>,
    /// Parameter passing conventions, synthesized entries (`__ctx`, the
    /// constructor `this`) included; built at populate, consumed at sign.
    pub param_types: Vec<ParamType>,
    pub scope: Option<ScopeId>,
    pub body: Option<TBlock>,
    /// Locals of this function captured by nested closures.
    pub closure: Vec<SymbolId>,
    /// Qualified mangle prefix including this function's own name,
    /// persisted between the populate and sign stages.
    pub mangle_prefix: String,
    /// Set when an `auto` function signs itself off its own body, so the
    /// process stage does not analyze the body twice.
    pub body_analyzed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodSymbol {
    pub func: FunctionSymbol,
    /// Vtable slot. An overriding method adopts its base method's index.
    pub index: u32,
    pub is_override: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableSymbol {
    pub ty: Type,
    pub value: Option<TExpr>,
    pub is_final: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSymbol {
    pub ty: Type,
    pub value: Option<TExpr>,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateSymbol {
    pub scope: ScopeId,
    pub fields: Vec<SymbolId>,
    /// Final member order: `init`, fields, then everything else.
    pub members: Vec<SymbolId>,
    /// The compile-time default value of the aggregate.
    pub init: Option<SymbolId>,
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassSymbol {
    pub scope: ScopeId,
    pub base: Option<SymbolId>,
    /// Inherited fields first; each new field index strictly exceeds all
    /// inherited ones.
    pub fields: Vec<SymbolId>,
    pub methods: Vec<SymbolId>,
    pub members: Vec<SymbolId>,
    /// Base method slots still open for overriding; filled at populate,
    /// consumed by override resolution, then compacted into `methods`.
    pub candidates: Vec<Option<SymbolId>>,
    /// How many leading entries of `fields` were inherited.
    pub base_field_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceSymbol {
    pub scope: ScopeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumSymbol {
    pub scope: ScopeId,
    pub base: BuiltinType,
    /// Entries in declaration order; enum-storage variables.
    pub entries: Vec<SymbolId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateSymbol {
    pub scope: ScopeId,
    pub params: Vec<SymbolId>,
    pub decls: Vec<Rc<ast::Decl>>,
    /// Instantiation cache keyed by the mangled argument string.
    pub instances: HashMap<String, SymbolId>,
    /// Matching shape for implicit function template instantiation, taken
    /// from the first member function sharing the template's name.
    pub ifti: Option<Vec<IftiParam>>,
    pub mangle_prefix: String,
}

/// One slot of a template's IFTI matching shape.
#[derive(Clone, Debug, PartialEq)]
pub enum IftiParam {
    /// Fully concrete parameter type.
    Concrete(ParamType),
    /// The parameter is typed by the template type parameter at this index
    /// and is deduced from the corresponding call argument.
    Deduce(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstanceSymbol {
    pub scope: ScopeId,
    pub template: SymbolId,
    pub arguments: Vec<SymbolId>,
    pub members: Vec<SymbolId>,
    /// The enclosing context symbol, when any member closes over one.
    pub ctx: Option<SymbolId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAliasSymbol {
    pub ty: Option<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueAliasSymbol {
    pub value: Option<TExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SymbolAliasSymbol {
    pub target: Option<SymbolId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverloadSetSymbol {
    pub set: Vec<SymbolId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParameterSymbol {
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueParameterSymbol {
    pub index: usize,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasParameterSymbol {
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedAliasParameterSymbol {
    pub index: usize,
    pub ty: Type,
}

//
// Scopes
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// A plain scope owned by a symbol.
    Symbol,
    /// Additionally marks that symbols declared inside may close over the
    /// owner's frame.
    Closure,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub owner: SymbolId,
    pub kind: ScopeKind,
    symbols: HashMap<Name, SymbolId>,
    /// Scopes consulted after a direct miss: imported modules, class bases,
    /// mixed-in template instances.
    pub imports: Vec<SymbolId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolError {
    AlreadyBound,
    MissingBinding,
}

/// The arena of all symbols and scopes in a compilation.
#[derive(Default)]
pub struct Symbols {
    all_symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl Symbols {
    pub fn new() -> Symbols {
        Symbols {
            all_symbols: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn new_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.all_symbols.len() as u32);
        self.all_symbols.push(symbol);
        id
    }

    /// Create a symbol together with the scope it owns. The two reference
    /// each other, so both ids are allocated before either record is built.
    pub fn new_symbol_and_scope(
        &mut self,
        location: Span,
        name: Name,
        parent: Option<ScopeId>,
        kind: ScopeKind,
        make: impl FnOnce(ScopeId) -> SymbolKind,
    ) -> (SymbolId, ScopeId) {
        let sym_id = SymbolId(self.all_symbols.len() as u32);
        let scope_id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            owner: sym_id,
            kind,
            symbols: HashMap::new(),
            imports: Vec::new(),
        });
        self.all_symbols.push(Symbol::new(location, name, make(scope_id)));
        (sym_id, scope_id)
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, owner: SymbolId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            owner,
            kind,
            symbols: HashMap::new(),
            imports: Vec::new(),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// Bind `name` in `scope`, rejecting collisions.
    pub fn add_symbol(&mut self, scope: ScopeId, name: Name, sym: SymbolId) -> Result<(), SymbolError> {
        let scope = self.scope_mut(scope);
        if scope.symbols.contains_key(&name) {
            return Err(SymbolError::AlreadyBound);
        }
        scope.symbols.insert(name, sym);
        Ok(())
    }

    /// Bind `name` in `scope`, merging into an overload set when the name is
    /// already taken by another overloadable symbol.
    pub fn add_overloadable_symbol(
        &mut self,
        scope: ScopeId,
        name: Name,
        sym: SymbolId,
    ) -> Result<(), SymbolError> {
        let existing = match self.scope(scope).symbols.get(&name) {
            Some(existing) => *existing,
            None => {
                self.scope_mut(scope).symbols.insert(name, sym);
                return Ok(());
            }
        };
        if let SymbolKind::OverloadSet(set) = &mut self[existing].kind {
            set.set.push(sym);
            return Ok(());
        }
        if !self[existing].kind.is_overloadable() || !self[sym].kind.is_overloadable() {
            return Err(SymbolError::AlreadyBound);
        }
        let location = self[sym].location;
        let mut set = Symbol::new(
            location,
            name,
            SymbolKind::OverloadSet(OverloadSetSymbol {
                set: vec![existing, sym],
            }),
        );
        // Overload sets are pure scope entries; they have no analysis of
        // their own.
        set.set_step(Step::Processed);
        let set_id = self.new_symbol(set);
        self.scope_mut(scope).symbols.insert(name, set_id);
        Ok(())
    }

    /// The binding for `name` in `scope`'s own map, ignoring imports and
    /// parents.
    pub fn get_direct(&self, scope: ScopeId, name: Name) -> Option<SymbolId> {
        self.scope(scope).symbols.get(&name).copied()
    }

    /// Look `name` up in `scope` alone, without walking parents. Imports
    /// registered on the scope are consulted after a direct miss.
    pub fn lookup_local(&self, scope: ScopeId, name: Name) -> Option<SymbolId> {
        let scope = self.scope(scope);
        if let Some(sym) = scope.symbols.get(&name) {
            return Some(*sym);
        }
        for import in &scope.imports {
            if let Some(imported_scope) = self[*import].owned_scope() {
                if let Some(sym) = self.scope(imported_scope).symbols.get(&name) {
                    return Some(*sym);
                }
            }
        }
        None
    }

    /// Look `name` up walking the scope chain.
    pub fn lookup(&self, mut scope: ScopeId, name: Name) -> Result<SymbolId, SymbolError> {
        loop {
            if let Some(sym) = self.lookup_local(scope, name) {
                return Ok(sym);
            }
            match self.scope(scope).parent {
                Some(parent) => scope = parent,
                None => return Err(SymbolError::MissingBinding),
            }
        }
    }

    /// Rebind `name` in `scope` to a freshly built overload set, leaving the
    /// previous set untouched. Used by override resolution, which shrinks
    /// sets rather than growing them.
    pub fn replace_overload_set(&mut self, scope: ScopeId, name: Name, set: Vec<SymbolId>) {
        let location = self
            .scope(scope)
            .symbols
            .get(&name)
            .map(|sym| self[*sym].location)
            .unwrap_or_else(Span::none);
        if set.len() == 1 {
            self.scope_mut(scope).symbols.insert(name, set[0]);
            return;
        }
        let mut symbol = Symbol::new(location, name, SymbolKind::OverloadSet(OverloadSetSymbol { set }));
        symbol.set_step(Step::Processed);
        let set_id = self.new_symbol(symbol);
        self.scope_mut(scope).symbols.insert(name, set_id);
    }

    pub fn len(&self) -> usize {
        self.all_symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_symbols.is_empty()
    }
}

impl std::ops::Index<SymbolId> for Symbols {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        &self.all_symbols[id.0 as usize]
    }
}

impl std::ops::IndexMut<SymbolId> for Symbols {
    fn index_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.all_symbols[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn test_scope_lookup_walks_parents() {
        let mut context = Context::new();
        let mut symbols = Symbols::new();
        let name_x = context.get_name("x");
        let name_y = context.get_name("y");

        let owner = symbols.new_symbol(Symbol::new(
            Span::none(),
            name_x,
            SymbolKind::Variable(VariableSymbol {
                ty: Type::auto(),
                value: None,
                is_final: false,
            }),
        ));
        let outer = symbols.new_scope(None, owner, ScopeKind::Symbol);
        let inner = symbols.new_scope(Some(outer), owner, ScopeKind::Symbol);

        symbols.add_symbol(outer, name_x, owner).unwrap();
        assert_eq!(symbols.lookup(inner, name_x), Ok(owner));
        assert_eq!(symbols.lookup(inner, name_y), Err(SymbolError::MissingBinding));
        // Rebinding in the same scope collides.
        assert_eq!(
            symbols.add_symbol(outer, name_x, owner),
            Err(SymbolError::AlreadyBound)
        );
    }

    #[test]
    fn test_step_is_monotonic() {
        let mut context = Context::new();
        let mut symbol = Symbol::new(
            Span::none(),
            context.get_name("a"),
            SymbolKind::TypeAlias(TypeAliasSymbol { ty: None }),
        );
        assert_eq!(symbol.step(), Step::Parsed);
        symbol.set_step(Step::Signed);
        assert_eq!(symbol.step(), Step::Signed);
        // Re-publishing the same stage is fine.
        symbol.set_step(Step::Signed);
    }

    #[test]
    #[should_panic(expected = "regression")]
    fn test_step_regression_panics() {
        let mut context = Context::new();
        let mut symbol = Symbol::new(
            Span::none(),
            context.get_name("a"),
            SymbolKind::TypeAlias(TypeAliasSymbol { ty: None }),
        );
        symbol.set_step(Step::Processed);
        symbol.set_step(Step::Populated);
    }
}
