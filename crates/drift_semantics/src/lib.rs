// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

//! Semantic analysis for the drift language.
//!
//! This crate takes the syntactic AST produced by a parser (`drift_ast`) and
//! lowers it to a resolved IR in which every identifier is bound to a symbol,
//! every expression carries a type, every external name is mangled, and
//! inheritance, overriding, template instantiation, and enum chains are all
//! settled.
//!
//! The two load-bearing pieces are the staged, cycle-tolerant scheduler
//! (`scheduler`, driven from `analyzer`) and the value range propagator
//! (`value_range`) used to validate implicit narrowing casts. Everything
//! else — the symbol and type model, the declaration flattener, the name
//! mangler, the caster — exists in their service.
//!
//! Organization of API: one level of hierarchy via file structure. A
//! consumer that only wants to walk an analyzed module needs `symbols`,
//! `types`, and `ir`; running an analysis goes through `pass::SemanticPass`.

pub mod analyzer;
pub mod caster;
pub mod context;
pub mod eval;
pub mod flatten;
pub mod ir;
pub mod mangler;
pub mod pass;
pub mod scheduler;
pub mod semantic_error;
pub mod symbols;
pub mod typecheck;
pub mod types;
pub mod value_range;

pub use drift_source_file::Span;
pub use pass::SemanticPass;
