//! Raw-document intake and emission.
//!
//! Wire formats are the serializer collaborator's concern; this module is
//! the boundary where an already-parsed generic value tree (JSON, or TOML
//! converted through JSON values) becomes a schema-shaped [`RawDocument`]
//! and back. Nested objects may select a polymorphic subtype with a
//! `_type` entry.

use serde_json::Value;

use crate::errors::{SettingsError, SettingsResult};
use crate::raw_tree::{RawDocument, RawId, RawObject, RawTree, RawValue};
use crate::schema::{FieldKind, SchemaRegistry};

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

/// Key selecting a polymorphic subtype inside an object value.
const TYPE_KEY: &str = "_type";

/// Builds a raw document from a parsed JSON value.
pub fn from_json(
    schema: &SchemaRegistry,
    type_name: &str,
    value: &Value,
) -> SettingsResult<RawDocument> {
    let mut tree = RawTree::new();
    let root = object_from_json(schema, &mut tree, type_name, value, type_name)?;
    Ok(RawDocument::new(tree, root))
}

/// Builds a raw document from JSON text.
pub fn from_json_str(
    schema: &SchemaRegistry,
    type_name: &str,
    text: &str,
) -> SettingsResult<RawDocument> {
    let value: Value = serde_json::from_str(text).map_err(|e| SettingsError::SchemaMismatch {
        path: type_name.to_string(),
        reason: format!("invalid JSON document: {}", e),
    })?;
    from_json(schema, type_name, &value)
}

/// Builds a raw document from TOML text.
pub fn from_toml_str(
    schema: &SchemaRegistry,
    type_name: &str,
    text: &str,
) -> SettingsResult<RawDocument> {
    let value: toml::Value = toml::from_str(text).map_err(|e| SettingsError::SchemaMismatch {
        path: type_name.to_string(),
        reason: format!("invalid TOML document: {}", e),
    })?;
    let value = serde_json::to_value(&value).map_err(|e| SettingsError::SchemaMismatch {
        path: type_name.to_string(),
        reason: format!("TOML value not representable: {}", e),
    })?;
    from_json(schema, type_name, &value)
}

/// Renders a raw document back to a JSON value.
///
/// Hidden fields and null fields are omitted; nested objects whose actual
/// type differs from the field's declared type carry a `_type` entry.
pub fn to_json(schema: &SchemaRegistry, document: &RawDocument) -> SettingsResult<Value> {
    object_to_json(schema, &document.tree, document.root, None)
}

fn scalar_to_text(value: &Value, path: &str) -> SettingsResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(SettingsError::SchemaMismatch {
            path: path.to_string(),
            reason: "expected a scalar value".to_string(),
        }),
    }
}

fn object_from_json(
    schema: &SchemaRegistry,
    tree: &mut RawTree,
    declared_type: &str,
    value: &Value,
    path: &str,
) -> SettingsResult<RawId> {
    let Value::Object(map) = value else {
        return Err(SettingsError::SchemaMismatch {
            path: path.to_string(),
            reason: "expected an object".to_string(),
        });
    };

    let actual_type = match map.get(TYPE_KEY) {
        Some(Value::String(name)) => name.as_str(),
        Some(_) => {
            return Err(SettingsError::SchemaMismatch {
                path: path.to_string(),
                reason: format!("'{}' must be a string", TYPE_KEY),
            })
        }
        None => declared_type,
    };
    let type_schema = schema.get(actual_type)?.clone();
    let mut object = RawObject::empty(&type_schema);
    object.type_name = actual_type.to_string();

    for (key, entry) in map {
        if key == TYPE_KEY {
            continue;
        }
        let field_path = format!("{}.{}", path, key);
        let index = type_schema
            .field_index(key)
            .ok_or_else(|| SettingsError::SchemaMismatch {
                path: field_path.clone(),
                reason: format!("type '{}' has no field '{}'", actual_type, key),
            })?;
        let descriptor = &type_schema.fields[index];
        let raw = match (&descriptor.kind, entry) {
            (_, Value::Null) => RawValue::Null,
            (FieldKind::Scalar(_) | FieldKind::Reference | FieldKind::ReferenceList, value) => {
                RawValue::Text(scalar_to_text(value, &field_path)?)
            }
            (FieldKind::ScalarList(_), Value::Array(items)) => {
                let mut texts = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    texts.push(scalar_to_text(item, &format!("{}[{}]", field_path, i))?);
                }
                RawValue::TextList(texts)
            }
            (FieldKind::Settings, value) => {
                let declared = descriptor.type_name.as_deref().unwrap_or(actual_type);
                RawValue::Object(object_from_json(schema, tree, declared, value, &field_path)?)
            }
            (FieldKind::SettingsList, Value::Array(items)) => {
                let declared = descriptor
                    .type_name
                    .clone()
                    .unwrap_or_else(|| actual_type.to_string());
                let mut ids = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    ids.push(object_from_json(
                        schema,
                        tree,
                        &declared,
                        item,
                        &format!("{}[{}]", field_path, i),
                    )?);
                }
                RawValue::ObjectList(ids)
            }
            (kind, _) => {
                return Err(SettingsError::SchemaMismatch {
                    path: field_path,
                    reason: format!("value does not fit declared kind {:?}", kind),
                })
            }
        };
        object.fields[index] = raw;
    }

    Ok(tree.insert(object))
}

fn object_to_json(
    schema: &SchemaRegistry,
    tree: &RawTree,
    id: RawId,
    declared_type: Option<&str>,
) -> SettingsResult<Value> {
    let object = tree.node(id);
    let type_schema = schema.get(&object.type_name)?;
    let mut map = serde_json::Map::new();

    if let Some(declared) = declared_type {
        if declared != object.type_name {
            map.insert(TYPE_KEY.to_string(), Value::String(object.type_name.clone()));
        }
    }

    for (descriptor, value) in type_schema.fields.iter().zip(object.fields.iter()) {
        if descriptor.hidden || value.is_null() {
            continue;
        }
        let rendered = match value {
            RawValue::Null => continue,
            RawValue::Text(text) => Value::String(text.clone()),
            RawValue::TextList(items) => {
                Value::Array(items.iter().map(|t| Value::String(t.clone())).collect())
            }
            RawValue::Object(child) => {
                object_to_json(schema, tree, *child, descriptor.type_name.as_deref())?
            }
            RawValue::ObjectList(children) => {
                let declared = descriptor.type_name.as_deref();
                let mut items = Vec::with_capacity(children.len());
                for child in children {
                    items.push(object_to_json(schema, tree, *child, declared)?);
                }
                Value::Array(items)
            }
        };
        map.insert(descriptor.name.clone(), rendered);
    }

    Ok(Value::Object(map))
}
