//! The id registration pass.
//!
//! Runs over the refined twin traversal and registers every plain settings
//! object under its namespaced id: the value of the id-designated field
//! when one is set, otherwise the object's settings path. Objects whose
//! type plays a document-level role (variables, defaults and overrides
//! specifications, list edits) are not addressable, and neither is
//! anything beneath them.

use tracing::trace;

use crate::context::{ResolveContext, NULL_ID};
use crate::errors::{SettingsError, SettingsResult};
use crate::traversal::FlatNode;
use crate::visitor::{SettingsVisitor, SpecSubtreeSkip};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// Registers object ids in traversal order.
#[derive(Default)]
pub struct IdRegistryVisitor {
    spec_skip: SpecSubtreeSkip,
}

impl IdRegistryVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for IdRegistryVisitor {
    fn name(&self) -> &'static str {
        "id_registry"
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        self.spec_skip.observe_object(cx, node)?;
        if self.spec_skip.is_skipped(&node.path) {
            return Ok(());
        }

        let type_schema = cx.schema.get(&cx.raw.node(node.raw).type_name)?;
        let id = match type_schema
            .id_field()
            .and_then(|index| cx.raw.field(node.raw, index).as_text())
        {
            Some(text) if !text.is_empty() => {
                if text == NULL_ID {
                    return Err(SettingsError::ReservedId {
                        path: node.path.to_string(),
                        id: text.to_string(),
                    });
                }
                text.to_string()
            }
            _ => node.path.as_str().to_string(),
        };
        let qualified = node.namespace.qualify(&id);
        trace!(id = %qualified, path = %node.path, "registering id");

        let refined = node.refined.ok_or_else(|| SettingsError::SchemaMismatch {
            path: node.path.to_string(),
            reason: "object has no refined twin".to_string(),
        })?;
        cx.ids.insert(qualified, refined, &node.path)
    }
}
