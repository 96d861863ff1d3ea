// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

use ariadne::{ColorGenerator, Config, Label, Report, ReportKind, Source};

use crate::source_file::{SourceMap, Span};

/// Render a single diagnostic against the registered sources.
pub fn report_error(message: &str, span: Span, sources: &SourceMap) {
    if span.is_none() {
        // Synthesized constructs have no source text to point at.
        eprintln!("error: {message}");
        return;
    }
    let mut colors = ColorGenerator::new();
    let a = colors.next();
    let file_path = sources.path(span.file()).display().to_string();
    let source = sources.text(span.file());
    // `offset` is a zero-indexed character offset from beginning of file.
    let offset = span.start() as usize;
    let range = offset..span.end() as usize;
    Report::build(ReportKind::Error, file_path.as_str(), offset)
        .with_message(message)
        .with_config(Config::default().with_compact(true))
        .with_label(
            Label::new((file_path.as_str(), range))
                .with_message("Near this point")
                .with_color(a),
        )
        .finish()
        .print((file_path.as_str(), Source::from(source)))
        .unwrap();
}
