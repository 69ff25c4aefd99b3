//! Construction of the refined tree from the raw tree.
//!
//! Refinement walks the raw tree after the raw-phase passes have run,
//! creating the structurally identical refined twin of every object and
//! recording the pairs in the twin map. Scalars are coerced through their
//! declared [`ScalarKind`](crate::value::ScalarKind); reference fields keep
//! their wildcard text as [`RefinedValue::UnresolvedRef`] until the
//! reference pass resolves them.
//!
//! A scalar whose text still contains an `@{field}` reference cannot be
//! coerced yet; it stays null and is re-refined by the field-reference
//! pass once the raw text is final.

use expansion_engine::contains_field_ref;

use crate::context::ResolveContext;
use crate::errors::{SettingsError, SettingsResult};
use crate::path::SettingsPath;
use crate::raw_tree::{RawId, RawValue};
use crate::refined_tree::{RefinedId, RefinedObject, RefinedValue};
use crate::schema::{FieldDescriptor, FieldKind};
use crate::value::{ScalarKind, ScalarValue};

#[cfg(test)]
#[path = "refine_tests.rs"]
mod tests;

/// Builds the refined twin of the whole raw tree.
pub fn build(cx: &mut ResolveContext<'_>) -> SettingsResult<RefinedId> {
    let root = cx.root;
    let root_path = SettingsPath::root(&cx.raw.node(root).type_name.clone());
    refine_object(cx, root, &root_path)
}

fn refine_object(
    cx: &mut ResolveContext<'_>,
    raw_id: RawId,
    path: &SettingsPath,
) -> SettingsResult<RefinedId> {
    let type_name = cx.raw.node(raw_id).type_name.clone();
    let type_schema = cx.schema.get(&type_name)?.clone();
    let refined_id = cx
        .refined
        .insert(RefinedObject::empty(&type_name, &type_schema));
    cx.twins.insert(raw_id, refined_id);

    for (index, descriptor) in type_schema.fields.iter().enumerate() {
        let field_path = path.child(&descriptor.name);
        refine_field_value(cx, raw_id, refined_id, index, descriptor, &field_path)?;
    }
    Ok(refined_id)
}

/// Re-derives one refined field from its raw twin.
///
/// Used by the field-reference pass and by the defaults/overrides
/// processors to mirror raw mutations onto the refined tree.
pub fn refine_field(
    cx: &mut ResolveContext<'_>,
    raw_id: RawId,
    refined_id: RefinedId,
    index: usize,
    field_path: &SettingsPath,
) -> SettingsResult<()> {
    let type_name = cx.raw.node(raw_id).type_name.clone();
    let descriptor = cx.schema.get(&type_name)?.fields[index].clone();
    refine_field_value(cx, raw_id, refined_id, index, &descriptor, field_path)
}

fn coerce_scalar(
    kind: ScalarKind,
    text: &str,
    path: &SettingsPath,
) -> SettingsResult<ScalarValue> {
    kind.parse(text).ok_or_else(|| SettingsError::ScalarCoercion {
        path: path.to_string(),
        expected: kind.describe().to_string(),
        value: text.to_string(),
    })
}

fn check_nested_type(
    cx: &ResolveContext<'_>,
    descriptor: &FieldDescriptor,
    actual: &str,
    path: &SettingsPath,
) -> SettingsResult<()> {
    let declared = descriptor.type_name.as_deref().unwrap_or(actual);
    let compatible = if descriptor.polymorphic {
        cx.schema.is_assignable(actual, declared)
    } else {
        actual == declared
    };
    if !compatible {
        return Err(SettingsError::SchemaMismatch {
            path: path.to_string(),
            reason: format!(
                "object of type '{}' does not fit field declared as '{}'",
                actual, declared
            ),
        });
    }
    Ok(())
}

fn refine_field_value(
    cx: &mut ResolveContext<'_>,
    raw_id: RawId,
    refined_id: RefinedId,
    index: usize,
    descriptor: &FieldDescriptor,
    field_path: &SettingsPath,
) -> SettingsResult<()> {
    let raw_value = cx.raw.field(raw_id, index).clone();
    let refined_value = match (&descriptor.kind, raw_value) {
        (_, RawValue::Null) => RefinedValue::Null,
        (FieldKind::Scalar(kind), RawValue::Text(text)) => {
            if contains_field_ref(&text) {
                RefinedValue::Null
            } else {
                RefinedValue::Scalar(coerce_scalar(*kind, &text, field_path)?)
            }
        }
        (FieldKind::ScalarList(kind), RawValue::TextList(items)) => {
            if items.iter().any(|item| contains_field_ref(item)) {
                RefinedValue::Null
            } else {
                let mut values = Vec::with_capacity(items.len());
                for item in &items {
                    values.push(coerce_scalar(*kind, item, field_path)?);
                }
                RefinedValue::ScalarList(values)
            }
        }
        (FieldKind::Settings, RawValue::Object(child)) => {
            let child_type = cx.raw.node(child).type_name.clone();
            check_nested_type(cx, descriptor, &child_type, field_path)?;
            let child_path = field_path.typed(&child_type);
            RefinedValue::Object(refine_object(cx, child, &child_path)?)
        }
        (FieldKind::SettingsList, RawValue::ObjectList(children)) => {
            let mut ids = Vec::with_capacity(children.len());
            for (i, child) in children.iter().enumerate() {
                let child_type = cx.raw.node(*child).type_name.clone();
                check_nested_type(cx, descriptor, &child_type, field_path)?;
                let child_path = field_path.element(i, &child_type);
                ids.push(refine_object(cx, *child, &child_path)?);
            }
            RefinedValue::ObjectList(ids)
        }
        (FieldKind::Reference | FieldKind::ReferenceList, RawValue::Text(text)) => {
            if contains_field_ref(&text) {
                RefinedValue::Null
            } else {
                RefinedValue::UnresolvedRef(text)
            }
        }
        (kind, _) => {
            return Err(SettingsError::SchemaMismatch {
                path: field_path.to_string(),
                reason: format!("raw value does not fit declared kind {:?}", kind),
            })
        }
    };
    cx.refined.set_field(refined_id, index, refined_value);
    Ok(())
}
