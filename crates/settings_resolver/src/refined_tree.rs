//! The refined settings tree and the twin map.
//!
//! The refined tree is the strongly typed graph returned to callers.
//! Objects live in an arena indexed by [`RefinedId`]; reference fields
//! store target ids rather than owning pointers, so reference cycles in the
//! configured graph never become ownership cycles. Only the arena owns
//! objects.
//!
//! The [`TwinMap`] maintains the 1:1 correspondence between raw and refined
//! objects for the duration of a single load/save call.

use std::collections::HashMap;

use crate::raw_tree::RawId;
use crate::schema::TypeSchema;
use crate::value::ScalarValue;

#[cfg(test)]
#[path = "refined_tree_tests.rs"]
mod tests;

/// Arena index of a refined settings object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefinedId(pub usize);

/// One refined field value.
#[derive(Debug, Clone, PartialEq)]
pub enum RefinedValue {
    /// No value.
    Null,
    /// A typed scalar.
    Scalar(ScalarValue),
    /// A list of typed scalars.
    ScalarList(Vec<ScalarValue>),
    /// A nested settings object.
    Object(RefinedId),
    /// A list of nested settings objects.
    ObjectList(Vec<RefinedId>),
    /// A resolved singular reference; `None` is the explicit null target.
    Ref(Option<RefinedId>),
    /// A resolved reference list.
    RefList(Vec<RefinedId>),
    /// Wildcard reference text awaiting resolution.
    UnresolvedRef(String),
}

impl RefinedValue {
    /// Whether this value is unset.
    pub fn is_null(&self) -> bool {
        matches!(self, RefinedValue::Null)
    }

    /// The scalar payload, if any.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            RefinedValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// The resolved singular reference target, if any.
    pub fn as_ref_target(&self) -> Option<RefinedId> {
        match self {
            RefinedValue::Ref(Some(id)) => Some(*id),
            _ => None,
        }
    }
}

/// One refined settings object.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedObject {
    pub type_name: String,
    pub fields: Vec<RefinedValue>,
}

impl RefinedObject {
    /// Creates an all-null object shaped after a type schema but carrying
    /// the actual (possibly subtype) name.
    pub fn empty(type_name: impl Into<String>, schema: &TypeSchema) -> Self {
        Self {
            type_name: type_name.into(),
            fields: vec![RefinedValue::Null; schema.fields.len()],
        }
    }
}

/// Arena of refined settings objects.
#[derive(Debug, Default, Clone)]
pub struct RefinedTree {
    nodes: Vec<RefinedObject>,
}

impl RefinedTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object and returns its id.
    pub fn insert(&mut self, object: RefinedObject) -> RefinedId {
        let id = RefinedId(self.nodes.len());
        self.nodes.push(object);
        id
    }

    /// Borrows an object.
    pub fn node(&self, id: RefinedId) -> &RefinedObject {
        &self.nodes[id.0]
    }

    /// Mutably borrows an object.
    pub fn node_mut(&mut self, id: RefinedId) -> &mut RefinedObject {
        &mut self.nodes[id.0]
    }

    /// Borrows one field value.
    pub fn field(&self, id: RefinedId, index: usize) -> &RefinedValue {
        &self.nodes[id.0].fields[index]
    }

    /// Replaces one field value.
    pub fn set_field(&mut self, id: RefinedId, index: usize, value: RefinedValue) {
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
}

/// Bidirectional raw/refined object correspondence.
///
/// Scoped to one load/save call and discarded afterward.
#[derive(Debug, Default)]
pub struct TwinMap {
    raw_to_refined: HashMap<RawId, RefinedId>,
    refined_to_raw: HashMap<RefinedId, RawId>,
}

impl TwinMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a twin pair.
    pub fn insert(&mut self, raw: RawId, refined: RefinedId) {
        self.raw_to_refined.insert(raw, refined);
        self.refined_to_raw.insert(refined, raw);
    }

    /// The refined twin of a raw object.
    pub fn refined_of(&self, raw: RawId) -> Option<RefinedId> {
        self.raw_to_refined.get(&raw).copied()
    }

    /// The raw twin of a refined object.
    pub fn raw_of(&self, refined: RefinedId) -> Option<RawId> {
        self.refined_to_raw.get(&refined).copied()
    }

    /// Number of twin pairs.
    pub fn len(&self) -> usize {
        self.raw_to_refined.len()
    }

    /// Whether no pairs are recorded.
    pub fn is_empty(&self) -> bool {
        self.raw_to_refined.is_empty()
    }
}
