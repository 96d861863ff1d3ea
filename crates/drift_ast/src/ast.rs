// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Variants have the form Xxx(XxxDecl) / Xxx(XxxExpr): the outer name is the
// variant, the inner name is the struct expressing the node's structure.
// Making a struct for every variant is mildly annoying but gives every node
// a nameable type, which the analyzer dispatch relies on.

use std::rc::Rc;

use drift_source_file::Span;

/// A parsed source file. `packages` is the package path the module was
/// declared under (`module a.b.c;` gives packages `["a", "b"]`, name `"c"`).
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub span: Span,
    pub packages: Vec<String>,
    pub name: String,
    pub decls: Vec<Rc<Decl>>,
}

impl Module {
    /// The dotted fully-qualified module name.
    pub fn qualified_name(&self) -> String {
        let mut out = String::new();
        for package in &self.packages {
            out.push_str(package);
            out.push('.');
        }
        out.push_str(&self.name);
        out
    }
}

//
// Declarations
//

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Function(FunctionDecl),
    Variable(VariableDecl),
    Struct(AggregateDecl),
    Union(AggregateDecl),
    Class(ClassDecl),
    Interface(ClassDecl),
    Enum(EnumDecl),
    Template(TemplateDecl),
    Alias(AliasDecl),
    Import(ImportDecl),
    StaticIf(StaticIfDecl),
    Version(VersionDecl),
    Mixin(MixinDecl),
    TemplateMixin(TemplateMixinDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Function(d) => d.span,
            Decl::Variable(d) => d.span,
            Decl::Struct(d) | Decl::Union(d) => d.span,
            Decl::Class(d) | Decl::Interface(d) => d.span,
            Decl::Enum(d) => d.span,
            Decl::Template(d) => d.span,
            Decl::Alias(d) => d.span,
            Decl::Import(d) => d.span,
            Decl::StaticIf(d) => d.span,
            Decl::Version(d) => d.span,
            Decl::Mixin(d) => d.span,
            Decl::TemplateMixin(d) => d.span,
        }
    }

    /// The declared name, if this declaration introduces one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Function(d) => Some(&d.name),
            Decl::Variable(d) => Some(&d.name),
            Decl::Struct(d) | Decl::Union(d) => Some(&d.name),
            Decl::Class(d) | Decl::Interface(d) => Some(&d.name),
            Decl::Enum(d) => Some(&d.name),
            Decl::Template(d) => Some(&d.name),
            Decl::Alias(d) => Some(&d.name),
            _ => None,
        }
    }
}

/// External linkage of a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    D,
    C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Package,
}

/// Storage classes and markers attached to a declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageClass {
    pub is_static: bool,
    /// `enum x = ...;` manifest constant.
    pub is_enum: bool,
    pub is_final: bool,
    pub is_override: bool,
    pub linkage: Option<Linkage>,
    pub visibility: Visibility,
}

impl Default for StorageClass {
    fn default() -> StorageClass {
        StorageClass {
            is_static: false,
            is_enum: false,
            is_final: false,
            is_override: false,
            linkage: None,
            visibility: Visibility::Public,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub span: Span,
    pub name: String,
    pub params: Vec<ParamDecl>,
    /// `None` means `auto`: the return type is inferred from the body.
    pub return_type: Option<TypeExpr>,
    pub is_ref_return: bool,
    pub is_variadic: bool,
    pub body: Option<Block>,
    pub storage: StorageClass,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamDecl {
    pub span: Span,
    pub name: String,
    pub ty: TypeExpr,
    pub is_ref: bool,
    pub is_final: bool,
    pub default: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDecl {
    pub span: Span,
    pub name: String,
    /// `None` means `auto`: the type is inferred from the initializer.
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub storage: StorageClass,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateDecl {
    pub span: Span,
    pub name: String,
    pub members: Vec<Rc<Decl>>,
}

/// Classes and interfaces share a shape; interfaces simply reject members
/// the language does not allow there.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub span: Span,
    pub name: String,
    pub bases: Vec<TypeExpr>,
    pub members: Vec<Rc<Decl>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDecl {
    pub span: Span,
    pub name: String,
    /// Underlying type; defaults to `int` when absent.
    pub base: Option<TypeExpr>,
    pub entries: Vec<EnumEntryDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumEntryDecl {
    pub span: Span,
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateDecl {
    pub span: Span,
    pub name: String,
    pub params: Vec<TemplateParamDecl>,
    pub members: Vec<Rc<Decl>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateParamDecl {
    pub span: Span,
    pub name: String,
    pub kind: TemplateParamKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateParamKind {
    Type,
    Value(TypeExpr),
    Alias,
    TypedAlias(TypeExpr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasDecl {
    pub span: Span,
    pub name: String,
    pub target: AliasTarget,
}

/// What an `alias` resolves to. The parser can distinguish the three by
/// syntax alone: a type expression, a value expression, or a bare symbol
/// path.
#[derive(Clone, Debug, PartialEq)]
pub enum AliasTarget {
    Type(TypeExpr),
    Value(Expr),
    Symbol(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportDecl {
    pub span: Span,
    /// Full dotted module path, last component included.
    pub module: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StaticIfDecl {
    pub span: Span,
    pub condition: Expr,
    pub then_decls: Vec<Rc<Decl>>,
    pub else_decls: Vec<Rc<Decl>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VersionDecl {
    pub span: Span,
    pub ident: String,
    pub then_decls: Vec<Rc<Decl>>,
    pub else_decls: Vec<Rc<Decl>>,
}

/// `mixin("...")` at declaration level; the string is parsed into
/// declarations at analysis time.
#[derive(Clone, Debug, PartialEq)]
pub struct MixinDecl {
    pub span: Span,
    pub text: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateMixinDecl {
    pub span: Span,
    pub name: Vec<String>,
    pub args: Vec<TemplateArg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateArg {
    Type(TypeExpr),
    Value(Expr),
}

//
// Types, as spelled in source
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Void,
    Bool,
    Char,
    Wchar,
    Dchar,
    Byte,
    Ubyte,
    Short,
    Ushort,
    Int,
    Uint,
    Long,
    Ulong,
    Cent,
    Ucent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Mutable,
    Const,
    Immutable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Builtin(BuiltinKind),
    Named(NamedType),
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    /// `T[n]`; the extent is a compile-time expression.
    Array(Box<TypeExpr>, Box<Expr>),
    Qualified(Qualifier, Box<TypeExpr>),
    Function(Box<FunctionTypeExpr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedType {
    pub span: Span,
    pub path: Vec<String>,
    /// Template instantiation arguments, `S!(int)`.
    pub args: Option<Vec<TemplateArg>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionTypeExpr {
    pub linkage: Linkage,
    pub params: Vec<ParamDecl>,
    pub return_type: Box<TypeExpr>,
    pub is_variadic: bool,
}

//
// Expressions
//

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntegerLiteral(IntegerLiteral),
    BoolLiteral(BoolLiteral),
    CharLiteral(CharLiteral),
    StringLiteral(StringLiteral),
    NullLiteral(Span),
    Identifier(Identifier),
    Binary(Box<BinaryExpr>),
    Unary(Box<UnaryExpr>),
    Call(Box<CallExpr>),
    Field(Box<FieldExpr>),
    Cast(Box<CastExpr>),
    Instantiate(Box<InstantiateExpr>),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntegerLiteral(e) => e.span,
            Expr::BoolLiteral(e) => e.span,
            Expr::CharLiteral(e) => e.span,
            Expr::StringLiteral(e) => e.span,
            Expr::NullLiteral(span) => *span,
            Expr::Identifier(e) => e.span,
            Expr::Binary(e) => e.span,
            Expr::Unary(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Field(e) => e.span,
            Expr::Cast(e) => e.span,
            Expr::Instantiate(e) => e.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntegerLiteral {
    pub span: Span,
    pub value: u64,
    /// `true` for literals written with an `L` suffix.
    pub is_long: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoolLiteral {
    pub span: Span,
    pub value: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CharLiteral {
    pub span: Span,
    pub value: char,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StringLiteral {
    pub span: Span,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub span: Span,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Comma,
    Assign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    LeftShift,
    RightShift,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpr {
    pub span: Span,
    pub op: BinaryOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Not,
    Complement,
    AddressOf,
    Dereference,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpr {
    pub span: Span,
    pub op: UnaryOp,
    pub operand: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    pub span: Span,
    pub callee: Expr,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldExpr {
    pub span: Span,
    pub base: Expr,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CastExpr {
    pub span: Span,
    pub ty: TypeExpr,
    pub operand: Expr,
}

/// Explicit template instantiation, `Tpl!(int, 3)`.
#[derive(Clone, Debug, PartialEq)]
pub struct InstantiateExpr {
    pub span: Span,
    pub path: Vec<String>,
    pub args: Vec<TemplateArg>,
}

//
// Statements
//

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Block(Block),
    Expr(Expr),
    Variable(VariableDecl),
    Return(ReturnStmt),
    If(Box<IfStmt>),
    While(Box<WhileStmt>),
    /// A nested declaration (function, aggregate, template, ...) inside a
    /// function body.
    Declaration(Rc<Decl>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub condition: Expr,
    pub then_branch: Stmt,
    pub else_branch: Option<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub condition: Expr,
    pub body: Stmt,
}
