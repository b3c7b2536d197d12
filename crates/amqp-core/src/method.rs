//! Method signatures and the signature → schema table.

use std::collections::HashMap;
use std::fmt;

/// Identifies a protocol method: `(class_id, method_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSig {
    pub class_id: u16,
    pub method_id: u16,
}

impl MethodSig {
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.class_id, self.method_id)
    }
}

impl From<(u16, u16)> for MethodSig {
    fn from((class_id, method_id): (u16, u16)) -> Self {
        Self::new(class_id, method_id)
    }
}

/// Argument layout of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    /// Dotted name, e.g. `basic.deliver`. Used for logging only.
    pub name: &'static str,
    /// Argument format string understood by [`crate::loads`]/[`crate::dumps`].
    pub args: &'static str,
    /// Whether a content header and body follow the method frame.
    pub content: bool,
}

impl MethodSpec {
    pub const fn new(name: &'static str, args: &'static str) -> Self {
        Self {
            name,
            args,
            content: false,
        }
    }

    pub const fn with_content(name: &'static str, args: &'static str) -> Self {
        Self {
            name,
            args,
            content: true,
        }
    }
}

/// Lookup table from [`MethodSig`] to [`MethodSpec`].
///
/// Inbound methods whose signature is missing here are rejected by dispatch
/// as unimplemented.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: HashMap<MethodSig, MethodSpec>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a method. Returns `self` for chaining.
    pub fn with(mut self, sig: impl Into<MethodSig>, spec: MethodSpec) -> Self {
        self.insert(sig, spec);
        self
    }

    pub fn insert(&mut self, sig: impl Into<MethodSig>, spec: MethodSpec) -> Option<MethodSpec> {
        self.methods.insert(sig.into(), spec)
    }

    pub fn resolve(&self, sig: MethodSig) -> Option<&MethodSpec> {
        self.methods.get(&sig)
    }

    /// True if the method is known and carries content.
    pub fn carries_content(&self, sig: MethodSig) -> bool {
        self.resolve(sig).is_some_and(|spec| spec.content)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
