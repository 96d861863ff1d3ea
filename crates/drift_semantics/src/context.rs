// Copyright contributors to the drift-lang project
// SPDX-License-Identifier: Apache-2.0

// The compilation context: the name interner, the source map, and the
// version predicate set. All three are read-mostly; interning is idempotent,
// so every part of the pass can hold a `Name` without caring who created it.

use hashbrown::HashMap;

use drift_source_file::SourceMap;

/// An interned identifier.
///
/// This wrapped `u32` is no more expensive to copy than a reference, and two
/// `Name`s compare equal iff their underlying strings do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Name(u32);

pub struct Context {
    names: Vec<String>,
    lookup: HashMap<String, Name>,
    versions: Vec<String>,
    pub sources: SourceMap,
}

/// Version identifiers every compilation starts with. Host-OS tags are
/// appended in `Context::new`.
const DEFAULT_VERSIONS: &[&str] = &["SDC", "D_LP64", "X86_64", "Posix"];

impl Context {
    pub fn new() -> Context {
        let mut context = Context {
            names: Vec::new(),
            lookup: HashMap::new(),
            versions: DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect(),
            sources: SourceMap::new(),
        };
        if cfg!(target_os = "linux") {
            context.versions.push("linux".to_string());
        } else if cfg!(target_os = "macos") {
            context.versions.push("OSX".to_string());
        } else if cfg!(windows) {
            context.versions.push("Windows".to_string());
        }
        context
    }

    /// Intern `name`, returning the same `Name` for the same bytes every
    /// time.
    pub fn get_name(&mut self, name: &str) -> Name {
        if let Some(interned) = self.lookup.get(name) {
            return *interned;
        }
        let interned = Name(self.names.len() as u32);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), interned);
        interned
    }

    pub fn name_str(&self, name: Name) -> &str {
        &self.names[name.0 as usize]
    }

    pub fn has_version(&self, ident: &str) -> bool {
        self.versions.iter().any(|v| v == ident)
    }

    pub fn set_version(&mut self, ident: &str) {
        if !self.has_version(ident) {
            self.versions.push(ident.to_string());
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn test_interning_is_idempotent() {
    let mut context = Context::new();
    let a = context.get_name("foo");
    let b = context.get_name("foo");
    let c = context.get_name("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(context.name_str(a), "foo");
}

#[test]
fn test_default_versions() {
    let context = Context::new();
    assert!(context.has_version("SDC"));
    assert!(context.has_version("X86_64"));
    assert!(!context.has_version("BigEndian"));
}
