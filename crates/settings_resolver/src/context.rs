//! Per-call resolution state.
//!
//! Everything a load/save call mutates (the two trees, the twin map, the
//! id registry, the variable map, the defaulted-field record) lives on one
//! [`ResolveContext`] that is passed by reference through the pass
//! pipeline. Nothing here is process-global: concurrent or repeated
//! resolutions each build their own context and discard it afterward.

use std::collections::HashMap;

use expansion_engine::VariableMap;
use tracing::debug;

use crate::errors::{SettingsError, SettingsResult};
use crate::path::SettingsPath;
use crate::raw_tree::{RawDocument, RawId, RawTree};
use crate::refined_tree::{RefinedId, RefinedTree, TwinMap};
use crate::schema::SchemaRegistry;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// The reserved id naming the explicit null reference target.
pub const NULL_ID: &str = "null";

/// Engine policy for one resolution call.
#[derive(Debug, Clone, Default)]
pub struct ResolvePolicy {
    /// When `true`, a variable that is still undefined on the final pass
    /// expands to empty text instead of failing. The same policy governs
    /// `${env:NAME}` tokens.
    pub allow_undefined_variables: bool,
    /// When `true`, passes that cannot be undone on save (variable and
    /// environment expansion, includes, defaults, overrides) are skipped,
    /// so that `save(load(doc))` is value-equal to `doc`.
    pub reversible_only: bool,
}

/// Mapping from fully namespaced id to refined object.
///
/// Keys are unique; insertion order is preserved so wildcard matches are
/// deterministic. The reverse direction (object to id) serves raw
/// re-emission on save.
#[derive(Debug, Default)]
pub struct IdRegistry {
    order: Vec<String>,
    by_id: HashMap<String, RefinedId>,
    declared_at: HashMap<String, SettingsPath>,
    id_of: HashMap<RefinedId, String>,
}

impl IdRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object under its namespaced id.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::ReservedId`] when the id is the null
    /// sentinel and [`SettingsError::DuplicateId`] when the id is taken.
    pub fn insert(
        &mut self,
        id: String,
        node: RefinedId,
        path: &SettingsPath,
    ) -> SettingsResult<()> {
        if id == NULL_ID {
            return Err(SettingsError::ReservedId {
                path: path.to_string(),
                id,
            });
        }
        if let Some(first) = self.declared_at.get(&id) {
            return Err(SettingsError::DuplicateId {
                id,
                first_path: first.to_string(),
                second_path: path.to_string(),
            });
        }
        self.order.push(id.clone());
        self.by_id.insert(id.clone(), node);
        self.declared_at.insert(id.clone(), path.clone());
        self.id_of.insert(node, id);
        Ok(())
    }

    /// Looks up an object by namespaced id.
    pub fn get(&self, id: &str) -> Option<RefinedId> {
        self.by_id.get(id).copied()
    }

    /// The namespaced id of a registered object.
    pub fn id_of(&self, node: RefinedId) -> Option<&str> {
        self.id_of.get(&node).map(String::as_str)
    }

    /// The path at which an id was declared.
    pub fn path_of(&self, id: &str) -> Option<&SettingsPath> {
        self.declared_at.get(id)
    }

    /// Iterates ids and objects in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, RefinedId)> {
        self.order
            .iter()
            .map(move |id| (id.as_str(), self.by_id[id]))
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// All mutable state of one load/save call.
#[derive(Debug)]
pub struct ResolveContext<'s> {
    /// The immutable schema table shared by every pass.
    pub schema: &'s SchemaRegistry,
    /// The raw tree being resolved.
    pub raw: RawTree,
    /// Root of the raw tree.
    pub root: RawId,
    /// The refined tree under construction.
    pub refined: RefinedTree,
    /// Raw/refined correspondence.
    pub twins: TwinMap,
    /// Namespaced id registry.
    pub ids: IdRegistry,
    /// Declared and provider-sourced variables.
    pub variables: VariableMap,
    /// Paths defaulted by defaults specifications, in application order.
    defaulted: Vec<SettingsPath>,
    /// Engine policy.
    pub policy: ResolvePolicy,
}

impl<'s> ResolveContext<'s> {
    /// Creates a fresh context for one document.
    pub fn new(schema: &'s SchemaRegistry, document: RawDocument, policy: ResolvePolicy) -> Self {
        Self {
            schema,
            raw: document.tree,
            root: document.root,
            refined: RefinedTree::new(),
            twins: TwinMap::new(),
            ids: IdRegistry::new(),
            variables: VariableMap::new(),
            defaulted: Vec::new(),
            policy,
        }
    }

    /// Records that a field was defaulted, failing when it already was.
    ///
    /// This is the observable defaulting event stream: consumers read the
    /// accumulated record, and a second default of the same path is the
    /// double-default violation.
    pub fn record_default(&mut self, path: SettingsPath) -> SettingsResult<()> {
        if self.defaulted.contains(&path) {
            return Err(SettingsError::DoubleDefault {
                path: path.to_string(),
            });
        }
        debug!(path = %path, "field defaulted");
        self.defaulted.push(path);
        Ok(())
    }

    /// Whether a field was defaulted earlier in this call.
    pub fn was_defaulted(&self, path: &SettingsPath) -> bool {
        self.defaulted.contains(path)
    }

    /// The defaulted paths in application order.
    pub fn defaulted_paths(&self) -> &[SettingsPath] {
        &self.defaulted
    }

    /// Consumes the context, yielding both trees and the bookkeeping the
    /// caller keeps after the call.
    pub fn into_parts(self) -> (RawDocument, RefinedTree, IdRegistry, Vec<SettingsPath>) {
        (
            RawDocument::new(self.raw, self.root),
            self.refined,
            self.ids,
            self.defaulted,
        )
    }
}
