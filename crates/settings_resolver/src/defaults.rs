//! The defaults pass.
//!
//! A defaults specification is an object whose type carries
//! [`TypeRole::DefaultSpec`]: an optional reference-list target filter plus
//! a nested value template. During the sweep the pass only collects the
//! specifications; in `finish` each one is applied in document order to its
//! targets.
//!
//! Application is raw-first and null-boundary: a template field is copied
//! only where the target field is still null, whole lists and subtrees are
//! copied atomically, and each copied field is mirrored onto the refined
//! twin and recorded on the context. A field that an earlier specification
//! already defaulted is the double-default violation when a later one
//! supplies it again; fields the document author set are simply left alone.

use tracing::{debug, instrument};

use crate::context::ResolveContext;
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
#[path = "defaults_tests.rs"]
mod tests;

/// Where a defaults or overrides specification was found.
#[derive(Debug, Clone)]
pub(crate) struct SpecSite {
    pub raw: RawId,
    pub refined: RefinedId,
    pub path: SettingsPath,
    pub namespace: Namespace,
}

impl SpecSite {
    pub(crate) fn at(node: &FlatNode) -> SettingsResult<Self> {
        let refined = node.refined.ok_or_else(|| SettingsError::SchemaMismatch {
            path: node.path.to_string(),
            reason: "specification has no refined twin".to_string(),
        })?;
        Ok(Self {
            raw: node.raw,
            refined,
            path: node.path.clone(),
            namespace: node.namespace.clone(),
        })
    }
}

/// The targets a specification applies to, in registry order.
///
/// An explicit filter (the spec's reference-list field, still unresolved
/// wildcard text at this stage) selects targets directly; without one,
/// every registered object in the specification's namespace subtree whose
/// type fits the template is a target.
pub(crate) fn collect_targets(
    cx: &ResolveContext<'_>,
    spec: &SpecSite,
    template_type: &str,
    filter: Option<(usize, &str)>,
) -> SettingsResult<Vec<RefinedId>> {
    if let Some((index, field_name)) = filter {
        if let RefinedValue::UnresolvedRef(text) = cx.refined.field(spec.refined, index) {
            if !text.trim().is_empty() {
                let text = text.clone();
                let matches =
                    resolve_wildcard(cx, &text, &spec.namespace, field_name, &spec.path)?;
                if matches.nodes.is_empty() && !matches.matched_null {
                    return Err(SettingsError::UnresolvedReference {
                        path: spec.path.to_string(),
                        wildcard: text,
                    });
                }
                return Ok(matches.nodes);
            }
        }
    }

    let prefix = spec.namespace.as_str();
    let targets = cx
        .ids
        .iter()
        .filter(|(id, node)| {
            let in_scope = prefix.is_empty()
                || *id == prefix
                || id.starts_with(&format!("{}.", prefix));
            in_scope
                && cx
                    .schema
                    .is_assignable(&cx.refined.node(*node).type_name, template_type)
        })
        .map(|(_, node)| node)
        .collect();
    Ok(targets)
}

/// Finds the spec's template field (first nested-settings field) and
/// target-filter field (first reference-list field).
pub(crate) fn spec_layout(
    cx: &ResolveContext<'_>,
    spec: &SpecSite,
) -> SettingsResult<(usize, Option<(usize, String)>)> {
    let type_schema = cx.schema.get(&cx.raw.node(spec.raw).type_name)?;
    let template = type_schema
        .fields
        .iter()
        .position(|f| f.kind == FieldKind::Settings)
        .ok_or_else(|| SettingsError::SchemaMismatch {
            path: spec.path.to_string(),
            reason: "specification type lacks a value template field".to_string(),
        })?;
    let filter = type_schema
        .fields
        .iter()
        .position(|f| f.kind == FieldKind::ReferenceList)
        .map(|i| (i, type_schema.fields[i].name.clone()));
    Ok((template, filter))
}

/// Collects and applies defaults specifications.
#[derive(Default)]
pub struct DefaultsVisitor {
    specs: Vec<SpecSite>,
}

impl DefaultsVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for DefaultsVisitor {
    fn name(&self) -> &'static str {
        "defaults"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        if cx.schema.get(&cx.raw.node(node.raw).type_name)?.role == TypeRole::DefaultSpec {
            self.specs.push(SpecSite::at(node)?);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(specs = self.specs.len()))]
    fn finish(&mut self, cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
        let specs = std::mem::take(&mut self.specs);
        for spec in &specs {
            let (template_index, filter) = spec_layout(cx, spec)?;
            let template_raw = match cx.raw.field(spec.raw, template_index) {
                RawValue::Object(id) => *id,
                RawValue::Null => continue,
                other => {
                    return Err(SettingsError::SchemaMismatch {
                        path: spec.path.to_string(),
                        reason: format!("value template is not an object: {:?}", other),
                    })
                }
            };
            let template_type = cx.raw.node(template_raw).type_name.clone();
            let filter = filter.as_ref().map(|(i, name)| (*i, name.as_str()));
            let targets = collect_targets(cx, spec, &template_type, filter)?;
            debug!(spec = %spec.path, targets = targets.len(), "applying defaults specification");
            for target in targets {
                let target_raw =
                    cx.twins
                        .raw_of(target)
                        .ok_or_else(|| SettingsError::SchemaMismatch {
                            path: spec.path.to_string(),
                            reason: "defaults target has no raw twin".to_string(),
                        })?;
                let target_path = cx
                    .ids
                    .id_of(target)
                    .and_then(|id| cx.ids.path_of(id))
                    .cloned()
                    .unwrap_or_else(|| SettingsPath::root(&cx.refined.node(target).type_name));
                apply_template(cx, template_raw, target_raw, target, &target_path)?;
            }
        }
        Ok(())
    }
}

/// Copies template fields onto one target at the null boundary.
pub(crate) fn apply_template(
    cx: &mut ResolveContext<'_>,
    template_raw: RawId,
    target_raw: RawId,
    target_refined: RefinedId,
    target_path: &SettingsPath,
) -> SettingsResult<()> {
    let template_schema = cx.schema.get(&cx.raw.node(template_raw).type_name)?.clone();
    let target_schema = cx.schema.get(&cx.raw.node(target_raw).type_name)?.clone();

    for (template_index, template_field) in template_schema.fields.iter().enumerate() {
        let template_value = cx.raw.field(template_raw, template_index).clone();
        if template_value.is_null() {
            continue;
        }
        // Fields are paired by name so subtypes with differing layouts work.
        let target_index = match target_schema.field_index(&template_field.name) {
            Some(index) => index,
            None => continue,
        };
        let target_field = &target_schema.fields[target_index];
        if target_field.sealed || target_field.id_designator {
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
                apply_template(cx, *template_child, *target_child, child_refined, &child_path)?;
            }
            (_, RawValue::Null) => {
                let copied = cx.raw.clone_value(&template_value);
                cx.raw.set_field(target_raw, target_index, copied);
                cx.record_default(field_path.clone())?;
                refine::refine_field(cx, target_raw, target_refined, target_index, &field_path)?;
            }
            _ => {
                // A later specification supplying a field that an earlier
                // one already defaulted is a conflict; an author-set value
                // is simply kept.
                if cx.was_defaulted(&field_path) {
                    return Err(SettingsError::DoubleDefault {
                        path: field_path.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}
