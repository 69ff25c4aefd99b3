//! Tests for sibling field-reference expansion.

use serde_json::json;

use super::*;
use crate::context::{ResolveContext, ResolvePolicy};
use crate::document;
use crate::refine;
use crate::schema::{FieldDescriptor, SchemaRegistry, TypeSchema};
use crate::traversal::flatten_twin;
use crate::value::{ScalarKind, ScalarValue};
use crate::visitor::run_pass;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TypeSchema::new("server")
                .field(FieldDescriptor::scalar("host", ScalarKind::Text))
                .field(FieldDescriptor::scalar("port", ScalarKind::Integer))
                .field(FieldDescriptor::scalar("endpoint", ScalarKind::Text))
                .field(FieldDescriptor::scalar("alias", ScalarKind::Text)),
        )
        .unwrap();
    registry
}

fn resolve<'s>(
    registry: &'s SchemaRegistry,
    body: &serde_json::Value,
) -> SettingsResult<ResolveContext<'s>> {
    let document = document::from_json(registry, "server", body).unwrap();
    let mut cx = ResolveContext::new(registry, document, ResolvePolicy::default());
    refine::build(&mut cx)?;
    let flat = flatten_twin(registry, &cx.raw, &cx.twins, cx.root, None)?;
    run_pass(&mut cx, &flat, &mut FieldRefsVisitor::new())?;
    Ok(cx)
}

#[test]
fn test_sibling_value_is_substituted_and_refined() {
    let registry = registry();
    let cx = resolve(
        &registry,
        &json!({ "host": "db.local", "port": "5432", "endpoint": "@{host}:@{port}" }),
    )
    .unwrap();
    assert_eq!(cx.raw.field(cx.root, 2).as_text(), Some("db.local:5432"));
    let refined = cx.twins.refined_of(cx.root).unwrap();
    assert_eq!(
        cx.refined.node(refined).fields[2].as_scalar(),
        Some(&ScalarValue::Text("db.local:5432".to_string()))
    );
}

#[test]
fn test_deferred_coercion_completes_after_expansion() {
    let registry = registry();
    let cx = resolve(&registry, &json!({ "host": "8080", "port": "@{host}" })).unwrap();
    let refined = cx.twins.refined_of(cx.root).unwrap();
    assert_eq!(
        cx.refined.node(refined).fields[1].as_scalar(),
        Some(&ScalarValue::Integer(8080))
    );
}

#[test]
fn test_unknown_sibling_fails() {
    let registry = registry();
    let error = resolve(&registry, &json!({ "endpoint": "@{nothing}" })).unwrap_err();
    assert!(matches!(error, SettingsError::Expansion { .. }));
}

#[test]
fn test_chained_reference_fails() {
    let registry = registry();
    // The referenced sibling still contains a reference of its own when
    // the earlier field is visited.
    let error = resolve(
        &registry,
        &json!({ "host": "h", "endpoint": "@{alias}", "alias": "@{host}" }),
    )
    .unwrap_err();
    assert!(matches!(error, SettingsError::Expansion { .. }));
}
