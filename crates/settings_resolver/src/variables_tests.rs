//! Tests for the field-default, variable, and environment passes.

use serde_json::json;

use super::*;
use crate::context::{ResolveContext, ResolvePolicy};
use crate::document;
use crate::schema::{FieldDescriptor, SchemaRegistry, TypeSchema};
use crate::traversal::flatten_raw;
use crate::value::ScalarKind;
use crate::visitor::run_pass;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TypeSchema::new("document")
                .field(FieldDescriptor::scalar("greeting", ScalarKind::Text))
                .field(
                    FieldDescriptor::scalar("mode", ScalarKind::Text).with_default("normal"),
                )
                .field(FieldDescriptor::scalar("frozen", ScalarKind::Text).sealed())
                .field(FieldDescriptor::scalar_list("tags", ScalarKind::Text))
                .field(FieldDescriptor::settings_list("vars", "variable"))
                .field(FieldDescriptor::settings("zone", "zone")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("zone")
                .field(
                    FieldDescriptor::scalar("region", ScalarKind::Text).namespace_designator(),
                )
                .field(FieldDescriptor::scalar("motd", ScalarKind::Text))
                .field(FieldDescriptor::settings_list("vars", "variable"))
                .field(FieldDescriptor::settings("leaf", "leaf")),
        )
        .unwrap();
    registry
        .register(
            TypeSchema::new("leaf")
                .field(FieldDescriptor::scalar("motd", ScalarKind::Text)),
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
}

fn context<'s>(
    registry: &'s SchemaRegistry,
    body: &serde_json::Value,
    policy: ResolvePolicy,
) -> ResolveContext<'s> {
    let document = document::from_json(registry, "document", body).unwrap();
    ResolveContext::new(registry, document, policy)
}

fn run_variable_passes(cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
    let flat = flatten_raw(cx.schema, &cx.raw, cx.root, None)?;
    run_pass(cx, &flat, &mut FieldDefaultsVisitor::new())?;
    run_pass(cx, &flat, &mut VariableInitVisitor::new())?;
    let mut expander = VariableExpandVisitor::new();
    run_pass(cx, &flat, &mut expander)?;
    expander.finish(cx)
}

fn field_text(cx: &ResolveContext<'_>, index: usize) -> Option<String> {
    cx.raw.field(cx.root, index).as_text().map(str::to_string)
}

#[test]
fn test_static_defaults_fill_null_fields_only() {
    let registry = registry();
    let mut cx = context(&registry, &json!({}), ResolvePolicy::default());
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 1).as_deref(), Some("normal"));

    let mut cx = context(&registry, &json!({ "mode": "turbo" }), ResolvePolicy::default());
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 1).as_deref(), Some("turbo"));
}

#[test]
fn test_declared_variables_expand_in_text_and_lists() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({
            "vars": [ { "name": "who", "value": "world" } ],
            "greeting": "hello ${who}",
            "tags": ["${who}", "fixed"]
        }),
        ResolvePolicy::default(),
    );
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some("hello world"));
    assert_eq!(
        cx.raw.field(cx.root, 3),
        &crate::raw_tree::RawValue::TextList(vec!["world".to_string(), "fixed".to_string()])
    );
}

fn zone_of(cx: &ResolveContext<'_>) -> crate::raw_tree::RawId {
    match cx.raw.field(cx.root, 5) {
        crate::raw_tree::RawValue::Object(id) => *id,
        other => panic!("expected zone object, got {other:?}"),
    }
}

fn leaf_of(cx: &ResolveContext<'_>) -> crate::raw_tree::RawId {
    match cx.raw.field(zone_of(cx), 3) {
        crate::raw_tree::RawValue::Object(id) => *id,
        other => panic!("expected leaf object, got {other:?}"),
    }
}

#[test]
fn test_namespaced_variable_shadows_global_for_descendants() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({
            "vars": [ { "name": "motto", "value": "global" } ],
            "greeting": "${motto}",
            "zone": {
                "region": "eu",
                "vars": [ { "name": "motto", "value": "local" } ],
                "motd": "${motto}",
                "leaf": { "motd": "${motto}" }
            }
        }),
        ResolvePolicy::default(),
    );
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some("global"));
    // The zone's own scalar fields read in the outer namespace; its
    // descendant objects read in the namespace it designates.
    assert_eq!(cx.raw.field(zone_of(&cx), 1).as_text(), Some("global"));
    assert_eq!(cx.raw.field(leaf_of(&cx), 0).as_text(), Some("local"));
}

#[test]
fn test_outer_scope_resolves_when_inner_lacks_definition() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({
            "vars": [ { "name": "motto", "value": "global" } ],
            "zone": { "region": "eu", "leaf": { "motd": "${motto}" } }
        }),
        ResolvePolicy::default(),
    );
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(cx.raw.field(leaf_of(&cx), 0).as_text(), Some("global"));
}

#[test]
fn test_sealed_fields_are_never_expanded() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({
            "vars": [ { "name": "who", "value": "world" } ],
            "frozen": "${who}"
        }),
        ResolvePolicy::default(),
    );
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 2).as_deref(), Some("${who}"));
}

#[test]
fn test_undefined_variable_fails_at_finish() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({ "greeting": "${nobody}" }),
        ResolvePolicy::default(),
    );
    let error = run_variable_passes(&mut cx).unwrap_err();
    assert!(matches!(error, SettingsError::Expansion { .. }));
}

#[test]
fn test_undefined_variable_tolerated_by_policy() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({ "greeting": "x${nobody}y" }),
        ResolvePolicy {
            allow_undefined_variables: true,
            ..ResolvePolicy::default()
        },
    );
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some("xy"));
}

#[test]
fn test_invalid_variable_name_is_rejected() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({ "vars": [ { "name": "not a name", "value": "x" } ] }),
        ResolvePolicy::default(),
    );
    let error = run_variable_passes(&mut cx).unwrap_err();
    assert!(matches!(error, SettingsError::Expansion { .. }));
}

#[test]
fn test_provider_sourced_variable_expands() {
    struct Fixed;
    impl VariableProviderSource for Fixed {
        fn providers(&self) -> Vec<(String, ValueProvider)> {
            vec![(
                "answer".to_string(),
                ValueProvider::Literal("42".to_string()),
            )]
        }
    }
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({ "greeting": "${answer}" }),
        ResolvePolicy::default(),
    );
    let sources: Vec<Box<dyn VariableProviderSource>> = vec![Box::new(Fixed)];
    install_providers(&mut cx, &sources).unwrap();
    run_variable_passes(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some("42"));
}

#[test]
fn test_environment_tokens_expand_from_process_env() {
    let registry = registry();
    std::env::set_var("SETTINGS_RESOLVER_TEST_REGION", "eu-west");
    let mut cx = context(
        &registry,
        &json!({ "greeting": "in ${env:SETTINGS_RESOLVER_TEST_REGION}" }),
        ResolvePolicy::default(),
    );
    let flat = flatten_raw(cx.schema, &cx.raw, cx.root, None).unwrap();
    let mut env = EnvironmentVisitor::new();
    run_pass(&mut cx, &flat, &mut env).unwrap();
    env.finish(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some("in eu-west"));
}

#[test]
fn test_missing_environment_variable_honors_policy() {
    let registry = registry();
    let body = json!({ "greeting": "${env:SETTINGS_RESOLVER_TEST_UNSET}" });

    let mut cx = context(&registry, &body, ResolvePolicy::default());
    let flat = flatten_raw(cx.schema, &cx.raw, cx.root, None).unwrap();
    let mut env = EnvironmentVisitor::new();
    run_pass(&mut cx, &flat, &mut env).unwrap();
    let error = env.finish(&mut cx).unwrap_err();
    assert!(matches!(
        error,
        SettingsError::UndefinedEnvironmentVariable { ref name, .. }
            if name == "SETTINGS_RESOLVER_TEST_UNSET"
    ));

    let mut cx = context(
        &registry,
        &body,
        ResolvePolicy {
            allow_undefined_variables: true,
            ..ResolvePolicy::default()
        },
    );
    let flat = flatten_raw(cx.schema, &cx.raw, cx.root, None).unwrap();
    let mut env = EnvironmentVisitor::new();
    run_pass(&mut cx, &flat, &mut env).unwrap();
    env.finish(&mut cx).unwrap();
    assert_eq!(field_text(&cx, 0).as_deref(), Some(""));
}

#[test]
fn test_sealed_fields_keep_env_tokens_under_tolerant_policy() {
    let registry = registry();
    let mut cx = context(
        &registry,
        &json!({ "frozen": "${env:SETTINGS_RESOLVER_TEST_UNSET}" }),
        ResolvePolicy {
            allow_undefined_variables: true,
            ..ResolvePolicy::default()
        },
    );
    let flat = flatten_raw(cx.schema, &cx.raw, cx.root, None).unwrap();
    let mut env = EnvironmentVisitor::new();
    run_pass(&mut cx, &flat, &mut env).unwrap();
    env.finish(&mut cx).unwrap();
    assert_eq!(
        field_text(&cx, 2).as_deref(),
        Some("${env:SETTINGS_RESOLVER_TEST_UNSET}")
    );
}
