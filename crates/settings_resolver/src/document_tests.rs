//! Tests for raw-document intake and emission.

use serde_json::json;

use super::*;
use crate::errors::SettingsError;
use crate::schema::{FieldDescriptor, SchemaRegistry, TypeSchema};
use crate::value::ScalarKind;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TypeSchema::new("document")
                .field(FieldDescriptor::scalar("title", ScalarKind::Text))
                .field(FieldDescriptor::settings("engine", "engine"))
                .field(FieldDescriptor::settings_list("fleets", "fleet"))
                .field(FieldDescriptor::reference("flagship", "fleet"))
                .field(FieldDescriptor::scalar_list("tags", ScalarKind::Text))
                .field(FieldDescriptor::scalar("internal", ScalarKind::Text).hidden()),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("engine").field(FieldDescriptor::scalar("power", ScalarKind::Integer)),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("turbo_engine")
                .with_parent("engine")
                .field(FieldDescriptor::scalar("power", ScalarKind::Integer))
                .field(FieldDescriptor::scalar("boost", ScalarKind::Float)),
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

#[test]
fn test_from_json_builds_schema_shaped_tree() {
    let registry = registry();
    let document = from_json(
        &registry,
        "document",
        &json!({
            "title": "ops",
            "engine": { "power": 5 },
            "fleets": [ { "id": "a" }, { "id": "b" } ],
            "flagship": "a",
            "tags": ["x", "y"]
        }),
    )
    .unwrap();

    let root = document.root_object();
    assert_eq!(root.type_name, "document");
    assert_eq!(root.fields[0].as_text(), Some("ops"));
    assert!(matches!(root.fields[1], crate::raw_tree::RawValue::Object(_)));
    assert_eq!(root.fields[3].as_text(), Some("a"));
}

#[test]
fn test_numbers_and_booleans_become_text() {
    let registry = registry();
    let document = from_json(
        &registry,
        "document",
        &json!({ "engine": { "power": 42 } }),
    )
    .unwrap();
    let crate::raw_tree::RawValue::Object(engine) = &document.root_object().fields[1] else {
        panic!("expected engine object");
    };
    assert_eq!(document.tree.field(*engine, 0).as_text(), Some("42"));
}

#[test]
fn test_unknown_field_is_a_schema_mismatch() {
    let registry = registry();
    let error = from_json(&registry, "document", &json!({ "bogus": 1 })).unwrap_err();
    assert!(matches!(error, SettingsError::SchemaMismatch { .. }));
}

#[test]
fn test_polymorphic_type_key_selects_subtype() {
    let registry = registry();
    let document = from_json(
        &registry,
        "document",
        &json!({ "engine": { "_type": "turbo_engine", "power": 1, "boost": 1.5 } }),
    )
    .unwrap();
    let crate::raw_tree::RawValue::Object(engine) = &document.root_object().fields[1] else {
        panic!("expected engine object");
    };
    assert_eq!(document.tree.node(*engine).type_name, "turbo_engine");
}

#[test]
fn test_round_trip_preserves_values_and_emits_type_key() {
    let registry = registry();
    let input = json!({
        "title": "ops",
        "engine": { "_type": "turbo_engine", "power": "1", "boost": "1.5" },
        "tags": ["x"]
    });
    let document = from_json(&registry, "document", &input).unwrap();
    let output = to_json(&registry, &document).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_hidden_fields_are_not_emitted() {
    let registry = registry();
    let document = from_json(
        &registry,
        "document",
        &json!({ "title": "t", "internal": "secret" }),
    )
    .unwrap();
    let output = to_json(&registry, &document).unwrap();
    assert_eq!(output, json!({ "title": "t" }));
}

#[test]
fn test_from_toml_str() {
    let registry = registry();
    let document = from_toml_str(
        &registry,
        "document",
        r#"
            title = "ops"
            tags = ["a", "b"]

            [engine]
            power = 3
        "#,
    )
    .unwrap();
    assert_eq!(document.root_object().fields[0].as_text(), Some("ops"));
}

#[test]
fn test_invalid_json_text_is_rejected() {
    let registry = registry();
    assert!(from_json_str(&registry, "document", "{ nope").is_err());
}
