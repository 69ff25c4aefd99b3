//! The `@{field}` sibling-reference pass.
//!
//! Runs on the twin traversal after the refined tree exists. A raw text
//! value containing `@{name}` is rewritten with the named sibling field's
//! current raw text and the field is then re-refined, which also performs
//! the scalar coercion that refinement deferred for such fields.

use expansion_engine::{contains_field_ref, expand_field_refs};
use tracing::trace;

use crate::context::ResolveContext;
use crate::errors::{SettingsError, SettingsResult};
use crate::raw_tree::RawValue;
use crate::refine;
use crate::traversal::FlatNode;
use crate::visitor::{SettingsVisitor, SpecSubtreeSkip};

#[cfg(test)]
#[path = "field_refs_tests.rs"]
mod tests;

/// Expands `@{field}` references against sibling fields.
#[derive(Default)]
pub struct FieldRefsVisitor {
    spec_skip: SpecSubtreeSkip,
}

impl FieldRefsVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for FieldRefsVisitor {
    fn name(&self) -> &'static str {
        "field_refs"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        self.spec_skip.observe_object(cx, node)
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        if self.spec_skip.is_skipped(&node.path) {
            return Ok(());
        }
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if descriptor.sealed {
            return Ok(());
        }
        let index = node.field.unwrap_or_default();
        let value = cx.raw.field(node.raw, index).clone();
        let needs_expansion = match &value {
            RawValue::Text(text) => contains_field_ref(text),
            RawValue::TextList(items) => items.iter().any(|i| contains_field_ref(i)),
            _ => false,
        };
        if !needs_expansion {
            return Ok(());
        }

        // Sibling lookup over the owning object's current raw texts.
        let type_schema = cx.schema.get(&cx.raw.node(node.raw).type_name)?;
        let siblings: Vec<(String, Option<String>)> = type_schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, d)| {
                (
                    d.name.clone(),
                    cx.raw.field(node.raw, i).as_text().map(str::to_string),
                )
            })
            .collect();
        let lookup = |name: &str| -> Option<String> {
            siblings
                .iter()
                .find(|(sibling, _)| sibling == name)
                .and_then(|(_, text)| text.clone())
        };

        let expansion_error = |source| SettingsError::Expansion {
            path: node.path.to_string(),
            source,
        };
        let rewritten = match value {
            RawValue::Text(text) => {
                RawValue::Text(expand_field_refs(&text, lookup).map_err(expansion_error)?)
            }
            RawValue::TextList(items) => {
                let mut expanded = Vec::with_capacity(items.len());
                for item in &items {
                    expanded.push(expand_field_refs(item, &lookup).map_err(expansion_error)?);
                }
                RawValue::TextList(expanded)
            }
            _ => unreachable!("only text values reach expansion"),
        };
        trace!(path = %node.path, "expanded field references");
        cx.raw.set_field(node.raw, index, rewritten);

        let refined = node.refined.ok_or_else(|| SettingsError::SchemaMismatch {
            path: node.path.to_string(),
            reason: "field has no refined twin".to_string(),
        })?;
        refine::refine_field(cx, node.raw, refined, index, &node.path)
    }
}
