//! The overrides pass and reference-list edit commands.
//!
//! An overrides specification ([`TypeRole::OverrideSpec`]) carries an
//! optional target filter, a value template, and a list of reference-list
//! edit commands. Unlike defaults, the template overwrites target leaf
//! fields unconditionally; only sealed fields and id designators are left
//! alone.
//!
//! Edit commands manipulate a target's reference-list field positionally
//! (add-front, add-back, insert-before, insert-after, replace, remove).
//! Their item and anchor wildcards can only be resolved once references
//! are, so the pass emits [`PendingEdit`]s that the resolver applies to the
//! refined lists after the reference pass has run.

use tracing::{debug, instrument, trace};

use crate::context::ResolveContext;
use crate::defaults::{collect_targets, spec_layout, SpecSite};
use crate::errors::{SettingsError, SettingsResult};
use crate::path::{Namespace, SettingsPath};
use crate::raw_tree::{RawId, RawValue};
use crate::reference::resolve_wildcard;
use crate::refine;
use crate::refined_tree::{RefinedId, RefinedValue};
use crate::schema::{FieldKind, TypeRole};
use crate::traversal::FlatNode;
use crate::visitor::SettingsVisitor;

#[cfg(test)]
#[path = "overrides_tests.rs"]
mod tests;

/// A reference-list edit operation.
///
/// Anchored operations carry their anchor wildcard, so an op without the
/// anchor it needs cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEditOp {
    AddFront,
    AddBack,
    InsertBefore { anchor: String },
    InsertAfter { anchor: String },
    Replace { anchor: String },
    Remove,
}

impl ListEditOp {
    fn parse(
        text: &str,
        anchor: Option<String>,
        path: &SettingsPath,
    ) -> SettingsResult<Self> {
        let anchored = |anchor: Option<String>| {
            anchor.ok_or_else(|| SettingsError::ListEditInvalid {
                path: path.to_string(),
                reason: format!("op '{}' requires an anchor", text),
            })
        };
        match text {
            "add-front" => Ok(ListEditOp::AddFront),
            "add-back" => Ok(ListEditOp::AddBack),
            "insert-before" => Ok(ListEditOp::InsertBefore {
                anchor: anchored(anchor)?,
            }),
            "insert-after" => Ok(ListEditOp::InsertAfter {
                anchor: anchored(anchor)?,
            }),
            "replace" => Ok(ListEditOp::Replace {
                anchor: anchored(anchor)?,
            }),
            "remove" => Ok(ListEditOp::Remove),
            other => Err(SettingsError::ListEditInvalid {
                path: path.to_string(),
                reason: format!(
                    "unknown op '{}' (expected add-front, add-back, insert-before, \
                     insert-after, replace, or remove)",
                    other
                ),
            }),
        }
    }
}

/// One edit awaiting application after reference resolution.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    target: RefinedId,
    field_index: usize,
    path: SettingsPath,
    namespace: Namespace,
    op: ListEditOp,
    item: String,
}

/// Collects and applies overrides specifications.
#[derive(Default)]
pub struct OverridesVisitor {
    specs: Vec<SpecSite>,
    pending: Vec<PendingEdit>,
}

impl OverridesVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands the collected edits to the resolver.
    pub fn take_pending_edits(&mut self) -> Vec<PendingEdit> {
        std::mem::take(&mut self.pending)
    }
}

impl SettingsVisitor for OverridesVisitor {
    fn name(&self) -> &'static str {
        "overrides"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        if cx.schema.get(&cx.raw.node(node.raw).type_name)?.role == TypeRole::OverrideSpec {
            self.specs.push(SpecSite::at(node)?);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(specs = self.specs.len()))]
    fn finish(&mut self, cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
        let specs = std::mem::take(&mut self.specs);
        for spec in &specs {
            let (template_index, filter) = spec_layout(cx, spec)?;
            let edits = collect_edits(cx, spec)?;
            let edited_fields: Vec<String> = edits.iter().map(|e| e.field.clone()).collect();

            let template_raw = match cx.raw.field(spec.raw, template_index) {
                RawValue::Object(id) => Some(*id),
                RawValue::Null => None,
                other => {
                    return Err(SettingsError::SchemaMismatch {
                        path: spec.path.to_string(),
                        reason: format!("value template is not an object: {:?}", other),
                    })
                }
            };
            let template_type = match template_raw {
                Some(id) => cx.raw.node(id).type_name.clone(),
                // Without a template the edits alone drive targeting; the
                // spec's declared template type bounds the implicit search.
                None => {
                    let type_schema = cx.schema.get(&cx.raw.node(spec.raw).type_name)?;
                    type_schema.fields[template_index]
                        .type_name
                        .clone()
                        .unwrap_or_default()
                }
            };
            let filter = filter.as_ref().map(|(i, name)| (*i, name.as_str()));
            let targets = collect_targets(cx, spec, &template_type, filter)?;
            debug!(spec = %spec.path, targets = targets.len(), "applying overrides specification");

            for target in &targets {
                if let Some(template_raw) = template_raw {
                    let target_raw = cx.twins.raw_of(*target).ok_or_else(|| {
                        SettingsError::SchemaMismatch {
                            path: spec.path.to_string(),
                            reason: "overrides target has no raw twin".to_string(),
                        }
                    })?;
                    let target_path = cx
                        .ids
                        .id_of(*target)
                        .and_then(|id| cx.ids.path_of(id))
                        .cloned()
                        .unwrap_or_else(|| {
                            SettingsPath::root(&cx.refined.node(*target).type_name)
                        });
                    overwrite_fields(
                        cx,
                        template_raw,
                        target_raw,
                        *target,
                        &target_path,
                        &edited_fields,
                    )?;
                }
                for edit in &edits {
                    self.pending.push(edit.bind(cx, *target)?);
                }
            }
        }
        Ok(())
    }
}

/// One edit command as written on the specification, not yet bound to a
/// target.
struct EditCommand {
    field: String,
    op: ListEditOp,
    item: String,
    namespace: Namespace,
    path: SettingsPath,
}

impl EditCommand {
    fn bind(&self, cx: &ResolveContext<'_>, target: RefinedId) -> SettingsResult<PendingEdit> {
        let target_schema = cx.schema.get(&cx.refined.node(target).type_name)?;
        let field_index = target_schema.field_index(&self.field).ok_or_else(|| {
            SettingsError::ListEditInvalid {
                path: self.path.to_string(),
                reason: format!("target type has no field '{}'", self.field),
            }
        })?;
        if target_schema.fields[field_index].kind != FieldKind::ReferenceList {
            return Err(SettingsError::ListEditInvalid {
                path: self.path.to_string(),
                reason: format!("field '{}' is not a reference list", self.field),
            });
        }
        Ok(PendingEdit {
            target,
            field_index,
            path: self.path.clone(),
            namespace: self.namespace.clone(),
            op: self.op.clone(),
            item: self.item.clone(),
        })
    }
}

fn collect_edits(cx: &ResolveContext<'_>, spec: &SpecSite) -> SettingsResult<Vec<EditCommand>> {
    let type_schema = cx.schema.get(&cx.raw.node(spec.raw).type_name)?;
    let edits_index = type_schema.fields.iter().position(|f| {
        f.kind == FieldKind::SettingsList
            && f.type_name
                .as_deref()
                .and_then(|t| cx.schema.try_get(t))
                .is_some_and(|t| t.role == TypeRole::ListEdit)
    });
    let edits_index = match edits_index {
        Some(index) => index,
        None => return Ok(Vec::new()),
    };
    let edit_ids: Vec<RawId> = match cx.raw.field(spec.raw, edits_index) {
        RawValue::ObjectList(ids) => ids.clone(),
        RawValue::Null => Vec::new(),
        other => {
            return Err(SettingsError::SchemaMismatch {
                path: spec.path.to_string(),
                reason: format!("edit commands are not an object list: {:?}", other),
            })
        }
    };

    let mut commands = Vec::with_capacity(edit_ids.len());
    for (i, edit_raw) in edit_ids.iter().enumerate() {
        let edit_schema = cx.schema.get(&cx.raw.node(*edit_raw).type_name)?;
        let edit_path = spec
            .path
            .child(&type_schema.fields[edits_index].name)
            .element(i, &edit_schema.name);
        let text_of = |field: &str| -> Option<String> {
            edit_schema
                .field_index(field)
                .and_then(|index| cx.raw.field(*edit_raw, index).as_text())
                .map(str::to_string)
        };
        let field = text_of("field").filter(|f| !f.is_empty()).ok_or_else(|| {
            SettingsError::ListEditInvalid {
                path: edit_path.to_string(),
                reason: "missing 'field'".to_string(),
            }
        })?;
        let op_text = text_of("op").filter(|o| !o.is_empty()).ok_or_else(|| {
            SettingsError::ListEditInvalid {
                path: edit_path.to_string(),
                reason: "missing 'op'".to_string(),
            }
        })?;
        let anchor = text_of("anchor").filter(|a| !a.is_empty());
        let op = ListEditOp::parse(&op_text, anchor, &edit_path)?;
        let item = text_of("item").filter(|i| !i.is_empty()).ok_or_else(|| {
            SettingsError::ListEditInvalid {
                path: edit_path.to_string(),
                reason: "missing 'item'".to_string(),
            }
        })?;
        commands.push(EditCommand {
            field,
            op,
            item,
            namespace: spec.namespace.clone(),
            path: edit_path,
        });
    }
    Ok(commands)
}

/// Overwrites target leaves with non-null template values.
fn overwrite_fields(
    cx: &mut ResolveContext<'_>,
    template_raw: RawId,
    target_raw: RawId,
    target_refined: RefinedId,
    target_path: &SettingsPath,
    edited_fields: &[String],
) -> SettingsResult<()> {
    let template_schema = cx.schema.get(&cx.raw.node(template_raw).type_name)?.clone();
    let target_schema = cx.schema.get(&cx.raw.node(target_raw).type_name)?.clone();

    for (template_index, template_field) in template_schema.fields.iter().enumerate() {
        let template_value = cx.raw.field(template_raw, template_index).clone();
        if template_value.is_null() {
            continue;
        }
        let target_index = match target_schema.field_index(&template_field.name) {
            Some(index) => index,
            None => continue,
        };
        let target_field = &target_schema.fields[target_index];
        if target_field.sealed || target_field.id_designator {
            continue;
        }
        if target_field.kind == FieldKind::ReferenceList
            && edited_fields.contains(&target_field.name)
        {
            // Positional edits supersede a wholesale overwrite.
            continue;
        }
        let field_path = target_path.child(&target_field.name);
        let target_value = cx.raw.field(target_raw, target_index).clone();
        match (&template_value, &target_value) {
            (RawValue::Object(template_child), RawValue::Object(target_child)) => {
                let child_refined = match cx.refined.field(target_refined, target_index) {
                    RefinedValue::Object(id) => *id,
                    other => {
                        return Err(SettingsError::SchemaMismatch {
                            path: field_path.to_string(),
                            reason: format!("raw/refined shape disagreement: {:?}", other),
                        })
                    }
                };
                let child_type = cx.raw.node(*target_child).type_name.clone();
                let child_path = field_path.typed(&child_type);
                overwrite_fields(
                    cx,
                    *template_child,
                    *target_child,
                    child_refined,
                    &child_path,
                    edited_fields,
                )?;
            }
            (RawValue::Object(_) | RawValue::ObjectList(_), _) => {
                // Only leaf paths are overridden; a settings subtree the
                // target does not carry is left absent.
                trace!(path = %field_path, "skipping settings-valued template field");
            }
            _ => {
                trace!(path = %field_path, "overriding field");
                let copied = cx.raw.clone_value(&template_value);
                cx.raw.set_field(target_raw, target_index, copied);
                refine::refine_field(cx, target_raw, target_refined, target_index, &field_path)?;
            }
        }
    }
    Ok(())
}

fn resolve_single(
    cx: &ResolveContext<'_>,
    wildcard: &str,
    edit: &PendingEdit,
    field_name: &str,
) -> SettingsResult<RefinedId> {
    let matches = resolve_wildcard(cx, wildcard, &edit.namespace, field_name, &edit.path)?;
    match matches.nodes.as_slice() {
        [] => Err(SettingsError::UnresolvedReference {
            path: edit.path.to_string(),
            wildcard: wildcard.to_string(),
        }),
        [node] => Ok(*node),
        _ => Err(SettingsError::AmbiguousReference {
            path: edit.path.to_string(),
            wildcard: wildcard.to_string(),
            matches: matches.ids,
        }),
    }
}

/// Applies the collected edits to the refined reference lists.
///
/// Runs after the reference pass so item and anchor wildcards resolve
/// against the finished id registry.
pub fn apply_ref_list_edits(
    cx: &mut ResolveContext<'_>,
    edits: Vec<PendingEdit>,
) -> SettingsResult<()> {
    for edit in edits {
        let field_name = cx.schema.get(&cx.refined.node(edit.target).type_name)?.fields
            [edit.field_index]
            .name
            .clone();
        let declared = cx
            .schema
            .get(&cx.refined.node(edit.target).type_name)?
            .fields[edit.field_index]
            .type_name
            .clone()
            .unwrap_or_default();
        let item = resolve_single(cx, &edit.item, &edit, &field_name)?;
        let actual = cx.refined.node(item).type_name.clone();
        if !cx.schema.is_assignable(&actual, &declared) {
            return Err(SettingsError::IncompatibleReference {
                path: edit.path.to_string(),
                target_id: edit.item.clone(),
                expected_type: declared,
                actual_type: actual,
            });
        }
        let mut list = match cx.refined.field(edit.target, edit.field_index) {
            RefinedValue::RefList(items) => items.clone(),
            RefinedValue::Null => Vec::new(),
            other => {
                return Err(SettingsError::ListEditInvalid {
                    path: edit.path.to_string(),
                    reason: format!("field holds {:?}, not a resolved reference list", other),
                })
            }
        };
        let position_of = |list: &[RefinedId], needle: RefinedId, wildcard: &str| {
            list.iter().position(|&id| id == needle).ok_or_else(|| {
                SettingsError::ListEditTargetMissing {
                    path: edit.path.to_string(),
                    wildcard: wildcard.to_string(),
                }
            })
        };
        match &edit.op {
            ListEditOp::AddFront => list.insert(0, item),
            ListEditOp::AddBack => list.push(item),
            ListEditOp::InsertBefore { anchor } => {
                let target = resolve_single(cx, anchor, &edit, &field_name)?;
                let position = position_of(&list, target, anchor)?;
                list.insert(position, item);
            }
            ListEditOp::InsertAfter { anchor } => {
                let target = resolve_single(cx, anchor, &edit, &field_name)?;
                let position = position_of(&list, target, anchor)?;
                list.insert(position + 1, item);
            }
            ListEditOp::Replace { anchor } => {
                let target = resolve_single(cx, anchor, &edit, &field_name)?;
                let position = position_of(&list, target, anchor)?;
                list[position] = item;
            }
            ListEditOp::Remove => {
                let position = position_of(&list, item, &edit.item)?;
                list.remove(position);
            }
        }
        trace!(path = %edit.path, "applied reference-list edit");
        cx.refined
            .set_field(edit.target, edit.field_index, RefinedValue::RefList(list));
    }
    Ok(())
}
