//! The raw settings tree.
//!
//! The raw tree is the loosely typed object graph as deserialized: every
//! scalar is text, references are wildcard strings, nesting is explicit.
//! Objects live in an arena indexed by [`RawId`]; object-valued fields
//! store ids rather than owning pointers.

use crate::errors::{SettingsError, SettingsResult};
use crate::schema::TypeSchema;

#[cfg(test)]
#[path = "raw_tree_tests.rs"]
mod tests;

/// Arena index of a raw settings object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawId(pub usize);

/// One raw field value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// No value.
    Null,
    /// A scalar or reference value in textual form.
    Text(String),
    /// A list of textual scalar values.
    TextList(Vec<String>),
    /// A nested settings object.
    Object(RawId),
    /// A list of nested settings objects.
    ObjectList(Vec<RawId>),
}

impl RawValue {
    /// Whether this value is unset.
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// The textual payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// One raw settings object: an actual type name plus field values parallel
/// to the type's descriptor order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub type_name: String,
    pub fields: Vec<RawValue>,
}

impl RawObject {
    /// Creates an all-null object shaped after a type schema.
    pub fn empty(schema: &TypeSchema) -> Self {
        Self {
            type_name: schema.name.clone(),
            fields: vec![RawValue::Null; schema.fields.len()],
        }
    }
}

/// Arena of raw settings objects.
#[derive(Debug, Default, Clone)]
pub struct RawTree {
    nodes: Vec<RawObject>,
}

impl RawTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object and returns its id.
    pub fn insert(&mut self, object: RawObject) -> RawId {
        let id = RawId(self.nodes.len());
        self.nodes.push(object);
        id
    }

    /// Borrows an object.
    pub fn node(&self, id: RawId) -> &RawObject {
        &self.nodes[id.0]
    }

    /// Mutably borrows an object.
    pub fn node_mut(&mut self, id: RawId) -> &mut RawObject {
        &mut self.nodes[id.0]
    }

    /// Borrows one field value.
    pub fn field(&self, id: RawId, index: usize) -> &RawValue {
        &self.nodes[id.0].fields[index]
    }

    /// Replaces one field value.
    pub fn set_field(&mut self, id: RawId, index: usize, value: RawValue) {
        self.nodes[id.0].fields[index] = value;
    }

    /// Number of objects in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no objects.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deep-copies a value within this tree, duplicating any objects it
    /// transitively refers to. Used when a defaults template subtree is
    /// copied onto a target.
    pub fn clone_value(&mut self, value: &RawValue) -> RawValue {
        match value {
            RawValue::Null => RawValue::Null,
            RawValue::Text(text) => RawValue::Text(text.clone()),
            RawValue::TextList(items) => RawValue::TextList(items.clone()),
            RawValue::Object(id) => RawValue::Object(self.clone_object(*id)),
            RawValue::ObjectList(ids) => {
                let ids = ids.clone();
                RawValue::ObjectList(ids.iter().map(|id| self.clone_object(*id)).collect())
            }
        }
    }

    fn clone_object(&mut self, id: RawId) -> RawId {
        let source = self.node(id).clone();
        let mut fields = Vec::with_capacity(source.fields.len());
        for value in &source.fields {
            fields.push(self.clone_value(value));
        }
        self.insert(RawObject {
            type_name: source.type_name,
            fields,
        })
    }

    /// Copies an object subtree from another tree into this one, returning
    /// the id of the copied root. Used when a sub-document is merged into
    /// the including document.
    pub fn graft(&mut self, other: &RawTree, root: RawId) -> RawId {
        let source = other.node(root);
        let mut fields = Vec::with_capacity(source.fields.len());
        for value in &source.fields {
            fields.push(self.graft_value(other, value));
        }
        self.insert(RawObject {
            type_name: source.type_name.clone(),
            fields,
        })
    }

    fn graft_value(&mut self, other: &RawTree, value: &RawValue) -> RawValue {
        match value {
            RawValue::Null => RawValue::Null,
            RawValue::Text(text) => RawValue::Text(text.clone()),
            RawValue::TextList(items) => RawValue::TextList(items.clone()),
            RawValue::Object(id) => RawValue::Object(self.graft(other, *id)),
            RawValue::ObjectList(ids) => {
                RawValue::ObjectList(ids.iter().map(|id| self.graft(other, *id)).collect())
            }
        }
    }

    /// Compares two subtrees for structural value equality, following
    /// object ids through both arenas.
    pub fn value_equal(&self, a: &RawValue, other: &RawTree, b: &RawValue) -> bool {
        match (a, b) {
            (RawValue::Null, RawValue::Null) => true,
            (RawValue::Text(x), RawValue::Text(y)) => x == y,
            (RawValue::TextList(x), RawValue::TextList(y)) => x == y,
            (RawValue::Object(x), RawValue::Object(y)) => self.object_equal(*x, other, *y),
            (RawValue::ObjectList(x), RawValue::ObjectList(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|(x, y)| self.object_equal(*x, other, *y))
            }
            _ => false,
        }
    }

    /// Compares two objects for structural value equality.
    pub fn object_equal(&self, a: RawId, other: &RawTree, b: RawId) -> bool {
        let left = self.node(a);
        let right = other.node(b);
        left.type_name == right.type_name
            && left.fields.len() == right.fields.len()
            && left
                .fields
                .iter()
                .zip(right.fields.iter())
                .all(|(x, y)| self.value_equal(x, other, y))
    }
}

/// A raw tree together with its root object.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub tree: RawTree,
    pub root: RawId,
}

impl RawDocument {
    /// Wraps a tree and root id.
    pub fn new(tree: RawTree, root: RawId) -> Self {
        Self { tree, root }
    }

    /// Borrows the root object.
    pub fn root_object(&self) -> &RawObject {
        self.tree.node(self.root)
    }

    /// Structural value equality of two documents.
    pub fn value_equal(&self, other: &RawDocument) -> bool {
        self.tree.object_equal(self.root, &other.tree, other.root)
    }

    /// The root object's type name, checked against an expectation.
    pub fn expect_type(&self, expected: &str, at_path: &str) -> SettingsResult<()> {
        let actual = &self.root_object().type_name;
        if actual != expected {
            return Err(SettingsError::SubDocumentType {
                path: at_path.to_string(),
                expected: expected.to_string(),
                actual: actual.clone(),
            });
        }
        Ok(())
    }
}
