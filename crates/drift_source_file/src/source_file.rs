// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// Files are registered once and addressed by `FileId` thereafter. A `Span`
// is a pair of byte offsets into a registered file. Registration is
// monotonic: ids are never reused and entries are never removed, so a span
// taken early in a compilation stays valid for its whole lifetime.

use std::io;
use std::path::{Path, PathBuf};

/// Index of a registered source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(u32);

/// A byte range into a registered source file.
///
/// `Span::none()` is the span of synthesized constructs (implicit `__ctx`
/// parameters, compiler-generated entry points, ...) that have no source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    file: FileId,
    start: u32,
    end: u32,
}

const NO_FILE: FileId = FileId(u32::MAX);

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Span {
        Span { file, start, end }
    }

    /// The span of a construct that was synthesized rather than parsed.
    pub fn none() -> Span {
        Span {
            file: NO_FILE,
            start: 0,
            end: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.file == NO_FILE
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }
}

struct SourceEntry {
    path: PathBuf,
    text: String,
}

/// All source text known to a compilation.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceEntry>,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap { files: Vec::new() }
    }

    /// Read `path` and register its contents.
    pub fn register_file(&mut self, path: &Path) -> io::Result<FileId> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.register_source(path.to_path_buf(), text))
    }

    /// Register source text that did not come from a file, for example a
    /// string mixin or a synthesized builtin module. The fake path is used
    /// only for diagnostics.
    pub fn register_source(&mut self, path: PathBuf, text: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceEntry { path, text });
        id
    }

    pub fn path(&self, file: FileId) -> &Path {
        &self.files[file.0 as usize].path
    }

    pub fn text(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].text
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[test]
fn test_register_source() {
    let mut map = SourceMap::new();
    let id = map.register_source("demo.dr".into(), "module demo;".to_string());
    assert_eq!(map.text(id), "module demo;");
    let span = Span::new(id, 0, 6);
    assert!(!span.is_none());
    assert_eq!(span.end(), 6);
    assert!(Span::none().is_none());
}
