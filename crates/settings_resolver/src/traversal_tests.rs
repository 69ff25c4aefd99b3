//! Tests for twin-tree flattening.

use serde_json::json;

use super::*;
use crate::document;
use crate::schema::{FieldDescriptor, TypeSchema};
use crate::value::ScalarKind;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TypeSchema::new("document")
                .field(FieldDescriptor::scalar("title", ScalarKind::Text))
                .field(FieldDescriptor::settings("zone", "zone"))
                .field(FieldDescriptor::reference("flagship", "fleet")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("zone")
                .field(FieldDescriptor::scalar("region", ScalarKind::Text).namespace_designator())
                .field(FieldDescriptor::settings_list("fleets", "fleet"))
                .field(FieldDescriptor::scalar("motd", ScalarKind::Text))
                .field(FieldDescriptor::reference("leader", "fleet")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("fleet")
                .field(FieldDescriptor::scalar("id", ScalarKind::Text).id_designator()),
        )
        .unwrap();
    registry
}

fn sample() -> (SchemaRegistry, crate::raw_tree::RawDocument) {
    let registry = registry();
    let document = document::from_json(
        &registry,
        "document",
        &json!({
            "title": "ops",
            "zone": {
                "region": "eu",
                "fleets": [ { "id": "a" }, { "id": "b" } ]
            },
            "flagship": "a"
        }),
    )
    .unwrap();
    (registry, document)
}

#[test]
fn test_flatten_is_depth_first_pre_order() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    let paths: Vec<&str> = flat.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "document",
            "document.title",
            "document.zone",
            "document.zone:zone",
            "document.zone:zone.region",
            "document.zone:zone.fleets",
            "document.zone:zone.fleets[0]:fleet",
            "document.zone:zone.fleets[0]:fleet.id",
            "document.zone:zone.fleets[1]:fleet",
            "document.zone:zone.fleets[1]:fleet.id",
            "document.zone:zone.motd",
            "document.zone:zone.leader",
            "document.flagship",
        ]
    );
}

#[test]
fn test_parent_paths_prefix_all_descendants() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    let mut stack: Vec<SettingsPath> = Vec::new();
    for node in &flat {
        while let Some(top) = stack.last() {
            if node.path.starts_with(top) {
                break;
            }
            stack.pop();
        }
        if let Some(top) = stack.last() {
            assert!(node.path.starts_with(top));
        }
        stack.push(node.path.clone());
    }
}

#[test]
fn test_paths_are_unique_per_traversal() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    let mut paths: Vec<&str> = flat.iter().map(|n| n.path.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), flat.len());
}

#[test]
fn test_namespace_extends_inside_designated_subtree() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    let namespace_of = |path: &str| -> String {
        flat.iter()
            .find(|n| n.path.as_str() == path)
            .map(|n| n.namespace.as_str().to_string())
            .unwrap()
    };
    assert_eq!(namespace_of("document"), "");
    assert_eq!(namespace_of("document.zone:zone"), "eu");
    assert_eq!(namespace_of("document.zone:zone.fleets[0]:fleet"), "eu");
    assert_eq!(namespace_of("document.zone:zone.fleets"), "eu");
    assert_eq!(namespace_of("document.zone:zone.leader"), "eu");
    // Scalar fields, the designator among them, read in the outer
    // namespace.
    assert_eq!(namespace_of("document.zone:zone.region"), "");
    assert_eq!(namespace_of("document.zone:zone.motd"), "");
}

#[test]
fn test_reference_fields_are_not_descended() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    // The flagship reference yields exactly one field entry and no subtree.
    let entries: Vec<_> = flat
        .iter()
        .filter(|n| n.path.as_str().starts_with("document.flagship"))
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].is_object());
}

#[test]
fn test_branch_skip_suppresses_list_descent() {
    let (registry, document) = sample();
    let skip_lists: BranchSkip<'_> = &|descriptor: &FieldDescriptor| descriptor.kind.is_list();
    let flat =
        flatten_raw(&registry, &document.tree, document.root, Some(skip_lists)).unwrap();
    let paths: Vec<&str> = flat.iter().map(|n| n.path.as_str()).collect();
    assert!(paths.contains(&"document.zone:zone.fleets"));
    assert!(!paths.iter().any(|p| p.contains("fleets[0]")));
}

#[test]
fn test_object_entries_carry_field_none() {
    let (registry, document) = sample();
    let flat = flatten_raw(&registry, &document.tree, document.root, None).unwrap();
    assert!(flat[0].is_object());
    assert_eq!(flat[1].field, Some(0));
}
