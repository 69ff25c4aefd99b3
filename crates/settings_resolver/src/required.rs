//! The required-field check, last pass of the pipeline.

use crate::context::ResolveContext;
use crate::errors::{SettingsError, SettingsResult};
use crate::traversal::FlatNode;
use crate::visitor::{SettingsVisitor, SpecSubtreeSkip};

#[cfg(test)]
#[path = "required_tests.rs"]
mod tests;

/// Fails on any required field that is still null after defaults and
/// overrides have been accounted for.
///
/// Instruction material (variables, specifications, edit commands) is
/// exempt; its templates legitimately leave fields null.
#[derive(Default)]
pub struct RequiredVisitor {
    spec_skip: SpecSubtreeSkip,
}

impl RequiredVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for RequiredVisitor {
    fn name(&self) -> &'static str {
        "required"
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
        if !descriptor.required {
            return Ok(());
        }
        let refined = node.refined.ok_or_else(|| SettingsError::SchemaMismatch {
            path: node.path.to_string(),
            reason: "field has no refined twin".to_string(),
        })?;
        let index = node.field.unwrap_or_default();
        if cx.refined.field(refined, index).is_null() {
            return Err(SettingsError::RequiredFieldMissing {
                path: node.path.to_string(),
            });
        }
        Ok(())
    }
}
