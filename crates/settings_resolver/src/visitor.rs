//! The visitor seam and pass runner.
//!
//! A resolution pass is a [`SettingsVisitor`]: a named, single-purpose
//! transformation invoked per object and per field over the flattened
//! traversal. Passes run in a fixed, dependency-ordered sequence; a pass
//! that cannot resolve everything during its sweep performs deferred
//! finalization in [`SettingsVisitor::finish`], invoked once after the
//! owning phase completes. At that point unresolved lookups become hard
//! failures unless policy tolerates them.

use tracing::debug;

use crate::context::ResolveContext;
use crate::errors::SettingsResult;
use crate::path::SettingsPath;
use crate::schema::TypeRole;
use crate::traversal::FlatNode;

#[cfg(test)]
#[path = "visitor_tests.rs"]
mod tests;

/// One resolution pass.
///
/// The default callback implementations do nothing, so a pass implements
/// only the callbacks it needs.
pub trait SettingsVisitor {
    /// Stable pass name, matched against per-field skip annotations.
    fn name(&self) -> &'static str;

    /// Whether a later pass could undo this pass's effect on the raw tree.
    ///
    /// Non-reversible passes are skipped when a caller round-trips a
    /// document (see [`ResolvePolicy::reversible_only`](crate::context::ResolvePolicy)).
    fn is_reversible(&self) -> bool {
        true
    }

    /// Called for every settings object, parent before children.
    fn visit_object(
        &mut self,
        _cx: &mut ResolveContext<'_>,
        _node: &FlatNode,
    ) -> SettingsResult<()> {
        Ok(())
    }

    /// Called for every declared field, before its subtree.
    fn visit_field(
        &mut self,
        _cx: &mut ResolveContext<'_>,
        _node: &FlatNode,
    ) -> SettingsResult<()> {
        Ok(())
    }

    /// Deferred finalization, invoked once after the owning phase.
    fn finish(&mut self, _cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
        Ok(())
    }
}

/// Tracks whether the traversal is inside a document-level construct.
///
/// Several passes must leave variables, defaults/overrides specifications,
/// and edit commands alone: their subtrees are instruction material, not
/// configuration. A visitor feeds every object entry through
/// [`SpecSubtreeSkip::observe_object`] and consults
/// [`SpecSubtreeSkip::is_skipped`] before touching a field.
#[derive(Default)]
pub(crate) struct SpecSubtreeSkip {
    prefix: Option<SettingsPath>,
}

impl SpecSubtreeSkip {
    pub(crate) fn observe_object(
        &mut self,
        cx: &ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        if let Some(prefix) = &self.prefix {
            if node.path.starts_with(prefix) {
                return Ok(());
            }
            self.prefix = None;
        }
        if cx.schema.get(&cx.raw.node(node.raw).type_name)?.role != TypeRole::Plain {
            self.prefix = Some(node.path.clone());
        }
        Ok(())
    }

    pub(crate) fn is_skipped(&self, path: &SettingsPath) -> bool {
        self.prefix.as_ref().is_some_and(|p| path.starts_with(p))
    }
}

/// Replays the flattened node list through one visitor.
///
/// Honors per-field skip annotations: when a field's descriptor names this
/// visitor in its skip set, the field callback is suppressed and the whole
/// subtree rooted at that field is skipped by scanning forward while paths
/// keep the field's path as a prefix.
pub fn run_pass(
    cx: &mut ResolveContext<'_>,
    flat: &[FlatNode],
    visitor: &mut dyn SettingsVisitor,
) -> SettingsResult<()> {
    debug!(pass = visitor.name(), nodes = flat.len(), "running pass");
    let mut index = 0;
    while index < flat.len() {
        let node = &flat[index];
        match node.field {
            Some(field_index) => {
                let skipped = {
                    let schema = cx.schema;
                    let type_name = &cx.raw.node(node.raw).type_name;
                    schema.get(type_name)?.fields[field_index]
                        .skip_for
                        .contains(visitor.name())
                };
                if skipped {
                    let prefix = node.path.clone();
                    index += 1;
                    while index < flat.len() && flat[index].path.starts_with(&prefix) {
                        index += 1;
                    }
                    continue;
                }
                visitor.visit_field(cx, node)?;
            }
            None => visitor.visit_object(cx, node)?,
        }
        index += 1;
    }
    Ok(())
}
