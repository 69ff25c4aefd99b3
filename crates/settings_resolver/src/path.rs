//! Settings paths and namespaces.
//!
//! A [`SettingsPath`] identifies a node's position in the document tree
//! (`document.fleets[2]:fleet.name`) and is the stable key for defaults
//! scoping, the defaulted-field record, and every error message. Paths are
//! unique per traversal and ordered so that a parent path is a strict
//! prefix of all of its descendants, so subtree skipping is a prefix scan.
//!
//! A [`Namespace`] is the dotted id-scoping prefix inherited from the
//! nearest ancestor namespace-designated field.

use serde::Serialize;

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;

/// Dotted path identifying one node in a settings tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SettingsPath(String);

impl SettingsPath {
    /// The path of a document root of the given type.
    pub fn root(type_name: &str) -> Self {
        Self(type_name.to_string())
    }

    /// The path of a named field under this node.
    pub fn child(&self, field: &str) -> Self {
        Self(format!("{}.{}", self.0, field))
    }

    /// The path of a nested object stored in this field, qualified by its
    /// actual type.
    pub fn typed(&self, type_name: &str) -> Self {
        Self(format!("{}:{}", self.0, type_name))
    }

    /// The path of a list element stored in this field, indexed and
    /// type-qualified (`fleets[2]:fleet`).
    pub fn element(&self, index: usize, type_name: &str) -> Self {
        Self(format!("{}[{}]:{}", self.0, index, type_name))
    }

    /// Whether this path is equal to `prefix` or lies in its subtree.
    pub fn starts_with(&self, prefix: &SettingsPath) -> bool {
        if !self.0.starts_with(&prefix.0) {
            return false;
        }
        // "a.bc" must not count as a descendant of "a.b".
        match self.0.as_bytes().get(prefix.0.len()) {
            None => true,
            Some(b'.') | Some(b'[') | Some(b':') => true,
            Some(_) => false,
        }
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SettingsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dotted id-scoping prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Namespace(String);

impl Namespace {
    /// The global (empty) namespace.
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Extends the namespace with one segment.
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}.{}", self.0, segment))
        }
    }

    /// Qualifies an id with this namespace.
    pub fn qualify(&self, id: &str) -> String {
        if self.0.is_empty() {
            id.to_string()
        } else {
            format!("{}.{}", self.0, id)
        }
    }

    /// Whether this is the global namespace.
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// The namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Enclosing namespaces from most to least specific, ending with the
    /// global namespace. Used for scoped variable lookup.
    pub fn scopes(&self) -> Vec<Namespace> {
        let mut scopes = Vec::new();
        let mut current = self.0.as_str();
        loop {
            scopes.push(Namespace(current.to_string()));
            match current.rfind('.') {
                Some(pos) => current = &current[..pos],
                None => break,
            }
        }
        if !self.0.is_empty() {
            scopes.push(Namespace::global());
        }
        scopes
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
