// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

//! Source registration and error reporting for the drift compiler front-end.
//!
//! The semantic pass does not read files itself; everything it knows about
//! source text goes through the [`SourceMap`] registered here. Diagnostics
//! carry a [`Span`] into a registered file and are rendered with `ariadne`.

pub mod error_report;
pub mod source_file;

pub use error_report::report_error;
pub use source_file::{FileId, SourceMap, Span};

/// Implemented by anything that can be printed as a compiler diagnostic.
pub trait ErrorTrait {
    fn message(&self) -> String;
    fn span(&self) -> Span;
}

/// Print a batch of diagnostics against the registered sources.
pub fn print_compiler_errors<T: ErrorTrait>(errors: &[T], sources: &SourceMap) {
    for error in errors {
        report_error(&error.message(), error.span(), sources);
    }
}
