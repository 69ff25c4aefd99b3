//! Tests for the refined tree arena and twin map.

use super::*;
use crate::schema::{FieldDescriptor, TypeSchema};
use crate::value::{ScalarKind, ScalarValue};

fn node_schema() -> TypeSchema {
    TypeSchema::new("node")
        .field(FieldDescriptor::scalar("name", ScalarKind::Text))
        .field(FieldDescriptor::reference("next", "node"))
}

#[test]
fn test_empty_object_carries_actual_type_name() {
    let object = RefinedObject::empty("subtype", &node_schema());
    assert_eq!(object.type_name, "subtype");
    assert_eq!(object.fields.len(), 2);
    assert!(object.fields.iter().all(RefinedValue::is_null));
}

#[test]
fn test_reference_cycle_is_representable() {
    let schema = node_schema();
    let mut tree = RefinedTree::new();
    let a = tree.insert(RefinedObject::empty("node", &schema));
    let b = tree.insert(RefinedObject::empty("node", &schema));

    // a -> b -> a, stored as ids; the arena owns both objects.
    tree.set_field(a, 1, RefinedValue::Ref(Some(b)));
    tree.set_field(b, 1, RefinedValue::Ref(Some(a)));

    assert_eq!(tree.field(a, 1).as_ref_target(), Some(b));
    assert_eq!(tree.field(b, 1).as_ref_target(), Some(a));
}

#[test]
fn test_scalar_access() {
    let schema = node_schema();
    let mut tree = RefinedTree::new();
    let id = tree.insert(RefinedObject::empty("node", &schema));
    tree.set_field(id, 0, RefinedValue::Scalar(ScalarValue::Text("n1".to_string())));
    assert_eq!(
        tree.field(id, 0).as_scalar(),
        Some(&ScalarValue::Text("n1".to_string()))
    );
}

#[test]
fn test_twin_map_is_bidirectional() {
    let mut twins = TwinMap::new();
    twins.insert(crate::raw_tree::RawId(3), RefinedId(7));
    assert_eq!(twins.refined_of(crate::raw_tree::RawId(3)), Some(RefinedId(7)));
    assert_eq!(twins.raw_of(RefinedId(7)), Some(crate::raw_tree::RawId(3)));
    assert_eq!(twins.refined_of(crate::raw_tree::RawId(9)), None);
    assert_eq!(twins.len(), 1);
}

#[test]
fn test_unresolved_ref_holds_wildcard_text() {
    let value = RefinedValue::UnresolvedRef("*:node".to_string());
    assert!(!value.is_null());
    assert_eq!(value.as_ref_target(), None);
}
