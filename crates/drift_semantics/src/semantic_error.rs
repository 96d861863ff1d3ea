// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Semantic errors are fatal: the pass reports the first one and stops.
// Everything here is a user error; violated internal invariants are compiler
// bugs and assert instead.

use std::fmt;

use drift_source_file::{ErrorTrait, SourceMap, Span};

pub type Result<T> = std::result::Result<T, SemanticError>;

#[derive(Clone, Debug, PartialEq)]
pub enum SemanticErrorKind {
    /// Surfaced from the parser; analysis never starts.
    SyntaxUpstream(String),
    UnresolvedIdentifier(String),
    TypeMismatch { from: String, to: String },
    /// A method demands a base slot that does not exist.
    OverrideNotFound(String),
    /// A base method was matched but the override marker is absent.
    MissingOverrideKeyword(String),
    UnsupportedConstruct(String),
    DuplicateSymbol(String),
    /// The scheduler found a true cyclic dependency.
    Cycle(String),
    CompileTimeEvaluation(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SemanticError {
    kind: SemanticErrorKind,
    location: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, location: Span) -> SemanticError {
        SemanticError { kind, location }
    }

    pub fn kind(&self) -> &SemanticErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Span {
        self.location
    }

    pub fn message(&self) -> String {
        use SemanticErrorKind::*;
        match &self.kind {
            SyntaxUpstream(detail) => format!("syntax error: {detail}"),
            UnresolvedIdentifier(name) => format!("undefined identifier '{name}'"),
            TypeMismatch { from, to } => {
                format!("cannot implicitly convert from '{from}' to '{to}'")
            }
            OverrideNotFound(name) => format!("override not found for '{name}'"),
            MissingOverrideKeyword(name) => {
                format!("'{name}' overrides a base method but is not marked override")
            }
            UnsupportedConstruct(detail) => format!("unsupported: {detail}"),
            DuplicateSymbol(name) => format!("'{name}' is already defined"),
            Cycle(name) => format!("cyclic dependency while analyzing '{name}'"),
            CompileTimeEvaluation(detail) => {
                format!("cannot evaluate at compile time: {detail}")
            }
        }
    }

    /// Render this error against the registered sources.
    pub fn report(&self, sources: &SourceMap) {
        drift_source_file::report_error(&self.message(), self.location, sources);
    }
}

impl ErrorTrait for SemanticError {
    fn message(&self) -> String {
        self.message()
    }

    fn span(&self) -> Span {
        self.location
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SemanticError {}
