//! End-to-end tests for the resolution engine.

use std::collections::HashMap;

use serde_json::json;

use super::*;
use crate::document;
use crate::refined_tree::{RefinedObject, RefinedValue};
use crate::schema::{FieldDescriptor, SchemaRegistry, TypeRole, TypeSchema};
use crate::value::{ScalarKind, ScalarValue};
use crate::variables::EnvironmentSource;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TypeSchema::new("document")
                .field(FieldDescriptor::scalar_list("include", ScalarKind::Text).include())
                .field(FieldDescriptor::settings_list("vars", "variable"))
                .field(FieldDescriptor::settings_list("defaults", "fleet_defaults"))
                .field(FieldDescriptor::settings_list("overrides", "fleet_overrides"))
                .field(FieldDescriptor::scalar("title", ScalarKind::Text))
                .field(FieldDescriptor::scalar("motd", ScalarKind::Text))
                .field(FieldDescriptor::settings_list("fleets", "fleet"))
                .field(FieldDescriptor::settings_list("ships", "ship"))
                .field(FieldDescriptor::settings_list("zones", "zone"))
                .field(FieldDescriptor::reference("flagship", "ship").weak()),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("zone")
                .field(
                    FieldDescriptor::scalar("name", ScalarKind::Text).namespace_designator(),
                )
                .field(FieldDescriptor::settings_list("fleets", "fleet")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("fleet")
                .field(FieldDescriptor::scalar("id", ScalarKind::Text).id_designator())
                .field(FieldDescriptor::scalar("speed", ScalarKind::Integer).required())
                .field(FieldDescriptor::scalar("motd", ScalarKind::Text))
                .field(FieldDescriptor::reference("leader", "ship"))
                .field(FieldDescriptor::reference_list("escorts", "ship")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("ship")
                .field(FieldDescriptor::scalar("id", ScalarKind::Text).id_designator())
                .field(FieldDescriptor::scalar("host", ScalarKind::Text))
                .field(FieldDescriptor::scalar("port", ScalarKind::Integer))
                .field(FieldDescriptor::scalar("endpoint", ScalarKind::Text)),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("variable")
                .with_role(TypeRole::Variable)
                .field(FieldDescriptor::scalar("name", ScalarKind::Text))
                .field(FieldDescriptor::scalar("value", ScalarKind::Text)),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("fleet_defaults")
                .with_role(TypeRole::DefaultSpec)
                .field(FieldDescriptor::reference_list("targets", "fleet"))
                .field(FieldDescriptor::settings("values", "fleet")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("fleet_overrides")
                .with_role(TypeRole::OverrideSpec)
                .field(FieldDescriptor::reference_list("targets", "fleet"))
                .field(FieldDescriptor::settings("values", "fleet"))
                .field(FieldDescriptor::settings_list("edits", "edit")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("edit")
                .with_role(TypeRole::ListEdit)
                .field(FieldDescriptor::scalar("field", ScalarKind::Text))
                .field(FieldDescriptor::scalar("op", ScalarKind::Text))
                .field(FieldDescriptor::scalar("item", ScalarKind::Text))
                .field(FieldDescriptor::scalar("anchor", ScalarKind::Text)),
        )
        .unwrap();
    registry
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn load(schema: &SchemaRegistry, body: &serde_json::Value) -> SettingsResult<ResolvedSettings> {
    let document = document::from_json(schema, "document", body)?;
    SettingsResolver::new(schema).load(document)
}

fn object_field<'r>(
    schema: &SchemaRegistry,
    object: &'r RefinedObject,
    field: &str,
) -> &'r RefinedValue {
    let index = schema
        .get(&object.type_name)
        .unwrap()
        .field_index(field)
        .unwrap();
    &object.fields[index]
}

fn field_of<'r>(
    schema: &SchemaRegistry,
    resolved: &'r ResolvedSettings,
    id: &str,
    field: &str,
) -> &'r RefinedValue {
    object_field(schema, resolved.by_id(id).unwrap(), field)
}

#[test]
fn test_load_resolves_full_document() {
    init_logging();
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({
            "vars": [ { "name": "greeting", "value": "hello" } ],
            "title": "${greeting} fleet ops",
            "fleets": [
                { "id": "alpha", "speed": "9", "leader": "hera", "escorts": "s*: ship" }
            ],
            "ships": [
                { "id": "hera", "host": "db.local", "port": "5432", "endpoint": "@{host}:@{port}" },
                { "id": "s1" },
                { "id": "s2" }
            ]
        }),
    )
    .unwrap();

    assert_eq!(
        object_field(&schema, resolved.root_object(), "title").as_scalar(),
        Some(&ScalarValue::Text("hello fleet ops".to_string()))
    );
    assert_eq!(
        field_of(&schema, &resolved, "alpha", "speed").as_scalar(),
        Some(&ScalarValue::Integer(9))
    );
    assert_eq!(
        field_of(&schema, &resolved, "alpha", "leader").as_ref_target(),
        resolved.ids.get("hera")
    );
    assert_eq!(
        field_of(&schema, &resolved, "alpha", "escorts"),
        &RefinedValue::RefList(vec![
            resolved.ids.get("s1").unwrap(),
            resolved.ids.get("s2").unwrap()
        ])
    );
    assert_eq!(
        field_of(&schema, &resolved, "hera", "endpoint").as_scalar(),
        Some(&ScalarValue::Text("db.local:5432".to_string()))
    );
}

#[test]
fn test_zone_namespaces_ids_and_scoped_lookup() {
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({
            "zones": [
                {
                    "name": "eu",
                    "fleets": [ { "id": "alpha", "speed": "5", "leader": "hera" } ]
                }
            ],
            "ships": [ { "id": "hera" } ]
        }),
    )
    .unwrap();

    // The fleet is addressable under its zone namespace and its reference
    // falls back to the global id space.
    assert!(resolved.by_id("eu.alpha").is_some());
    assert!(resolved.by_id("alpha").is_none());
    assert_eq!(
        field_of(&schema, &resolved, "eu.alpha", "leader").as_ref_target(),
        resolved.ids.get("hera")
    );
}

#[test]
fn test_defaults_fill_null_fields_and_record() {
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({
            "defaults": [
                { "values": { "speed": "7", "motd": "fly safe" } }
            ],
            "fleets": [
                { "id": "a", "motd": "custom" },
                { "id": "b" }
            ]
        }),
    )
    .unwrap();

    // Authored values win; nulls are filled and recorded in order.
    assert_eq!(
        field_of(&schema, &resolved, "a", "motd").as_scalar(),
        Some(&ScalarValue::Text("custom".to_string()))
    );
    assert_eq!(
        field_of(&schema, &resolved, "a", "speed").as_scalar(),
        Some(&ScalarValue::Integer(7))
    );
    assert_eq!(
        field_of(&schema, &resolved, "b", "motd").as_scalar(),
        Some(&ScalarValue::Text("fly safe".to_string()))
    );
    let defaulted: Vec<&str> = resolved.defaulted.iter().map(|p| p.as_str()).collect();
    assert!(defaulted.contains(&"document.fleets[0]:fleet.speed"));
    assert!(defaulted.contains(&"document.fleets[1]:fleet.speed"));
    assert!(defaulted.contains(&"document.fleets[1]:fleet.motd"));
    assert!(!defaulted.contains(&"document.fleets[0]:fleet.motd"));
}

#[test]
fn test_overrides_overwrite_and_edit_reference_lists() {
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({
            "overrides": [
                {
                    "values": { "motd": "new orders" },
                    "edits": [ { "field": "escorts", "op": "add-back", "item": "s3" } ]
                }
            ],
            "fleets": [
                { "id": "a", "speed": "2", "motd": "old", "escorts": "s1, s2" }
            ],
            "ships": [ { "id": "s1" }, { "id": "s2" }, { "id": "s3" } ]
        }),
    )
    .unwrap();

    assert_eq!(
        field_of(&schema, &resolved, "a", "motd").as_scalar(),
        Some(&ScalarValue::Text("new orders".to_string()))
    );
    assert_eq!(
        field_of(&schema, &resolved, "a", "escorts"),
        &RefinedValue::RefList(vec![
            resolved.ids.get("s1").unwrap(),
            resolved.ids.get("s2").unwrap(),
            resolved.ids.get("s3").unwrap()
        ])
    );
}

#[test]
fn test_explicit_spec_targets_confine_application() {
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({
            "defaults": [
                { "targets": "a", "values": { "motd": "only a" } }
            ],
            "fleets": [
                { "id": "a", "speed": "1" },
                { "id": "b", "speed": "1" }
            ]
        }),
    )
    .unwrap();

    assert_eq!(
        field_of(&schema, &resolved, "a", "motd").as_scalar(),
        Some(&ScalarValue::Text("only a".to_string()))
    );
    assert!(field_of(&schema, &resolved, "b", "motd").is_null());
}

#[test]
fn test_spec_templates_are_exempt_from_checks() {
    let schema = registry();
    // The template leaves the required speed field null and carries no
    // target filter; resolution must not complain about the template
    // itself.
    let resolved = load(
        &schema,
        &json!({
            "defaults": [ { "values": { "motd": "hi" } } ],
            "fleets": [ { "id": "a", "speed": "4" } ]
        }),
    )
    .unwrap();
    assert_eq!(
        field_of(&schema, &resolved, "a", "motd").as_scalar(),
        Some(&ScalarValue::Text("hi".to_string()))
    );
}

#[test]
fn test_required_field_missing_fails() {
    let schema = registry();
    let error = load(&schema, &json!({ "fleets": [ { "id": "a" } ] })).unwrap_err();
    assert!(matches!(
        error,
        SettingsError::RequiredFieldMissing { ref path } if path.contains("speed")
    ));
}

#[test]
fn test_duplicate_id_fails() {
    let schema = registry();
    let error = load(
        &schema,
        &json!({
            "fleets": [
                { "id": "alpha", "speed": "1" },
                { "id": "alpha", "speed": "2" }
            ]
        }),
    )
    .unwrap_err();
    assert!(matches!(error, SettingsError::DuplicateId { ref id, .. } if id == "alpha"));
}

#[test]
fn test_unresolved_reference_fails() {
    let schema = registry();
    let error = load(
        &schema,
        &json!({ "fleets": [ { "id": "a", "speed": "1", "leader": "ghost" } ] }),
    )
    .unwrap_err();
    assert!(matches!(
        error,
        SettingsError::UnresolvedReference { ref wildcard, .. } if wildcard == "ghost"
    ));
}

#[test]
fn test_ambiguous_reference_fails() {
    let schema = registry();
    let error = load(
        &schema,
        &json!({
            "fleets": [ { "id": "a", "speed": "1", "leader": "s*" } ],
            "ships": [ { "id": "s1" }, { "id": "s2" } ]
        }),
    )
    .unwrap_err();
    assert!(matches!(error, SettingsError::AmbiguousReference { .. }));
}

#[test]
fn test_weak_reference_tolerates_no_match() {
    let schema = registry();
    let resolved = load(&schema, &json!({ "flagship": "ghost" })).unwrap();
    assert_eq!(
        object_field(&schema, resolved.root_object(), "flagship"),
        &RefinedValue::Ref(None)
    );
}

#[test]
fn test_null_token_selects_empty_target() {
    let schema = registry();
    let resolved = load(
        &schema,
        &json!({ "fleets": [ { "id": "a", "speed": "1", "leader": "null" } ] }),
    )
    .unwrap();
    assert_eq!(
        field_of(&schema, &resolved, "a", "leader"),
        &RefinedValue::Ref(None)
    );
}

#[test]
fn test_undefined_variable_fails_by_default() {
    let schema = registry();
    let error = load(&schema, &json!({ "title": "${nobody}" })).unwrap_err();
    assert!(matches!(error, SettingsError::Expansion { .. }));
}

#[test]
fn test_undefined_variable_expands_empty_under_policy() {
    let schema = registry();
    let document =
        document::from_json(&schema, "document", &json!({ "title": "x${nobody}y" })).unwrap();
    let resolved = SettingsResolver::new(&schema)
        .with_policy(ResolvePolicy {
            allow_undefined_variables: true,
            ..ResolvePolicy::default()
        })
        .load(document)
        .unwrap();
    assert_eq!(
        object_field(&schema, resolved.root_object(), "title").as_scalar(),
        Some(&ScalarValue::Text("xy".to_string()))
    );
}

#[test]
fn test_environment_tokens_expand() {
    let schema = registry();
    std::env::set_var("FLEET_OPS_IT_REGION", "eu-west");
    let resolved = load(
        &schema,
        &json!({ "motd": "region ${env:FLEET_OPS_IT_REGION}" }),
    )
    .unwrap();
    assert_eq!(
        object_field(&schema, resolved.root_object(), "motd").as_scalar(),
        Some(&ScalarValue::Text("region eu-west".to_string()))
    );
}

struct MemoryLoader<'s> {
    schema: &'s SchemaRegistry,
    files: HashMap<String, serde_json::Value>,
}

impl SubDocumentLoader for MemoryLoader<'_> {
    fn load(&self, file: &str) -> SettingsResult<RawDocument> {
        let body = self
            .files
            .get(file)
            .ok_or_else(|| SettingsError::SubDocumentLoad {
                path: String::new(),
                file: file.to_string(),
                reason: "file not found".to_string(),
            })?;
        document::from_json(self.schema, "document", body)
    }
}

#[test]
fn test_included_sub_document_merges_and_resolves() {
    let schema = registry();
    let loader = MemoryLoader {
        schema: &schema,
        files: HashMap::from([(
            "base.json".to_string(),
            json!({
                "motd": "welcome",
                "ships": [ { "id": "tug" } ]
            }),
        )]),
    };
    let document = document::from_json(
        &schema,
        "document",
        &json!({
            "include": ["base.json"],
            "fleets": [ { "id": "a", "speed": "1", "leader": "tug" } ]
        }),
    )
    .unwrap();
    let resolved = SettingsResolver::new(&schema)
        .with_loader(&loader)
        .load(document)
        .unwrap();

    // Included content fills null fields and its objects are addressable.
    assert_eq!(
        object_field(&schema, resolved.root_object(), "motd").as_scalar(),
        Some(&ScalarValue::Text("welcome".to_string()))
    );
    assert_eq!(
        field_of(&schema, &resolved, "a", "leader").as_ref_target(),
        resolved.ids.get("tug")
    );
}

#[test]
fn test_include_file_names_may_use_environment_tokens() {
    let schema = registry();
    std::env::set_var("FLEET_OPS_IT_PROFILE", "base");
    let loader = MemoryLoader {
        schema: &schema,
        files: HashMap::from([("base.json".to_string(), json!({ "motd": "welcome" }))]),
    };
    let document = document::from_json(
        &schema,
        "document",
        &json!({ "include": ["${env:FLEET_OPS_IT_PROFILE}.json"] }),
    )
    .unwrap();
    let resolved = SettingsResolver::new(&schema)
        .with_loader(&loader)
        .load(document)
        .unwrap();
    assert_eq!(
        object_field(&schema, resolved.root_object(), "motd").as_scalar(),
        Some(&ScalarValue::Text("welcome".to_string()))
    );
}

#[test]
fn test_provider_sourced_variables_expand() {
    let schema = registry();
    std::env::set_var("FLEET_OPS_IT_CALLSIGN", "osprey");
    let document = document::from_json(
        &schema,
        "document",
        &json!({ "title": "${FLEET_OPS_IT_CALLSIGN}" }),
    )
    .unwrap();
    let resolved = SettingsResolver::new(&schema)
        .with_provider_source(Box::new(EnvironmentSource::new(["FLEET_OPS_IT_CALLSIGN"])))
        .load(document)
        .unwrap();
    assert_eq!(
        object_field(&schema, resolved.root_object(), "title").as_scalar(),
        Some(&ScalarValue::Text("osprey".to_string()))
    );
}

#[test]
fn test_reversible_round_trip_preserves_document() {
    let schema = registry();
    let body = json!({
        "vars": [ { "name": "greeting", "value": "hello" } ],
        "title": "${greeting} ops",
        "defaults": [ { "values": { "motd": "fly safe" } } ],
        "fleets": [ { "id": "a", "speed": "3", "escorts": "s*" } ],
        "ships": [ { "id": "s1" }, { "id": "s2" } ]
    });
    let original = document::from_json(&schema, "document", &body).unwrap();
    let resolver = SettingsResolver::new(&schema).with_policy(ResolvePolicy {
        reversible_only: true,
        ..ResolvePolicy::default()
    });
    let resolved = resolver.load(original.clone()).unwrap();

    // The typed view still resolves references, but the raw form comes
    // back exactly as authored.
    assert_eq!(
        field_of(&schema, &resolved, "a", "escorts"),
        &RefinedValue::RefList(vec![
            resolved.ids.get("s1").unwrap(),
            resolved.ids.get("s2").unwrap()
        ])
    );
    let saved = resolver.save(&resolved).unwrap();
    assert!(saved.value_equal(&original));
}

#[test]
fn test_save_carries_applied_resolution() {
    let schema = registry();
    let body = json!({
        "defaults": [ { "values": { "speed": "7" } } ],
        "fleets": [ { "id": "a" } ]
    });
    let document = document::from_json(&schema, "document", &body).unwrap();
    let resolver = SettingsResolver::new(&schema);
    let resolved = resolver.load(document).unwrap();
    let saved = resolver.save(&resolved).unwrap();
    let emitted = document::to_json(&schema, &saved).unwrap();
    assert_eq!(emitted["fleets"][0]["speed"], json!("7"));
}

#[test]
fn test_toml_document_loads() {
    let schema = registry();
    let text = r#"
        title = "ops"

        [[fleets]]
        id = "a"
        speed = 3
        leader = "hera"

        [[ships]]
        id = "hera"
    "#;
    let document = document::from_toml_str(&schema, "document", text).unwrap();
    let resolved = SettingsResolver::new(&schema).load(document).unwrap();
    assert_eq!(
        field_of(&schema, &resolved, "a", "speed").as_scalar(),
        Some(&ScalarValue::Integer(3))
    );
    assert_eq!(
        field_of(&schema, &resolved, "a", "leader").as_ref_target(),
        resolved.ids.get("hera")
    );
}
