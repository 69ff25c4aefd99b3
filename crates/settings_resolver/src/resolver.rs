//! The resolution engine entry point.
//!
//! [`SettingsResolver`] owns the call-independent configuration (schema,
//! sub-document loader, variable provider sources, policy) and runs the
//! fixed pass pipeline over one document per [`SettingsResolver::load`]
//! call. Resolution maintains the raw and refined trees in parallel; the
//! returned [`ResolvedSettings`] keeps both, so [`SettingsResolver::save`]
//! is a plain re-emission of the raw twin.
//!
//! Pipeline order, raw phase first:
//!
//! 1. static field defaults
//! 2. variable harvesting
//! 3. `${name}` expansion (tolerant sweep)
//! 4. `${env:NAME}` expansion, so include file names may carry env tokens
//! 5. sub-document inclusion, then a second sweep of both expansions over
//!    merged content
//! 6. deferred expansion finalization under the undefined-variable policy
//!
//! then the refined phase:
//!
//! 7. refinement (typed twin construction)
//! 8. id registration
//! 9. defaults, then overrides (collect during sweep, apply in finish)
//! 10. `@{field}` expansion over the re-flattened twin
//! 11. wildcard reference resolution
//! 12. reference-list edits
//! 13. required-field check
//!
//! Under [`ResolvePolicy::reversible_only`] every pass that mutates the
//! raw tree is skipped, which makes `save(load(doc))` value-equal to
//! `doc`.

use tracing::{debug, instrument};

use crate::context::{IdRegistry, ResolveContext, ResolvePolicy};
use crate::defaults::DefaultsVisitor;
use crate::errors::{SettingsError, SettingsResult};
use crate::field_refs::FieldRefsVisitor;
use crate::include::{IncludeVisitor, SubDocumentLoader};
use crate::overrides::{apply_ref_list_edits, OverridesVisitor};
use crate::path::SettingsPath;
use crate::raw_tree::RawDocument;
use crate::reference::ReferenceVisitor;
use crate::refine;
use crate::refined_tree::{RefinedId, RefinedObject, RefinedTree};
use crate::registry::IdRegistryVisitor;
use crate::required::RequiredVisitor;
use crate::schema::SchemaRegistry;
use crate::traversal::{flatten_raw, flatten_twin, FlatNode};
use crate::variables::{
    install_providers, EnvironmentVisitor, FieldDefaultsVisitor, VariableExpandVisitor,
    VariableInitVisitor, VariableProviderSource,
};
use crate::visitor::{run_pass, SettingsVisitor};

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;

/// The outcome of one load call.
#[derive(Debug)]
pub struct ResolvedSettings {
    /// The raw twin after all raw-phase passes, re-emitted by save.
    pub raw: RawDocument,
    /// The typed object graph.
    pub refined: RefinedTree,
    /// Root of the refined tree.
    pub root: RefinedId,
    /// All addressable objects by namespaced id.
    pub ids: IdRegistry,
    /// Fields initialized by defaults specifications, in application order.
    pub defaulted: Vec<SettingsPath>,
}

impl ResolvedSettings {
    /// Borrows the refined root object.
    pub fn root_object(&self) -> &RefinedObject {
        self.refined.node(self.root)
    }

    /// Looks up a refined object by namespaced id.
    pub fn by_id(&self, id: &str) -> Option<&RefinedObject> {
        self.ids.get(id).map(|node| self.refined.node(node))
    }
}

/// The resolution engine.
pub struct SettingsResolver<'a> {
    schema: &'a SchemaRegistry,
    loader: Option<&'a dyn SubDocumentLoader>,
    provider_sources: Vec<Box<dyn VariableProviderSource>>,
    policy: ResolvePolicy,
}

impl<'a> SettingsResolver<'a> {
    /// Creates a resolver over a schema registry.
    pub fn new(schema: &'a SchemaRegistry) -> Self {
        Self {
            schema,
            loader: None,
            provider_sources: Vec::new(),
            policy: ResolvePolicy::default(),
        }
    }

    /// Supplies the sub-document loader consulted by include fields.
    pub fn with_loader(mut self, loader: &'a dyn SubDocumentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Adds a dynamic variable provider source.
    pub fn with_provider_source(mut self, source: Box<dyn VariableProviderSource>) -> Self {
        self.provider_sources.push(source);
        self
    }

    /// Sets the engine policy.
    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn run(
        &self,
        cx: &mut ResolveContext<'_>,
        flat: &[FlatNode],
        visitor: &mut dyn SettingsVisitor,
    ) -> SettingsResult<()> {
        if cx.policy.reversible_only && !visitor.is_reversible() {
            debug!(pass = visitor.name(), "skipping non-reversible pass");
            return Ok(());
        }
        run_pass(cx, flat, visitor)
    }

    fn finish(
        &self,
        cx: &mut ResolveContext<'_>,
        visitor: &mut dyn SettingsVisitor,
    ) -> SettingsResult<()> {
        if cx.policy.reversible_only && !visitor.is_reversible() {
            return Ok(());
        }
        visitor.finish(cx)
    }

    /// Resolves one raw document into its refined object graph.
    #[instrument(skip_all, err)]
    pub fn load(&self, document: RawDocument) -> SettingsResult<ResolvedSettings> {
        let mut cx = ResolveContext::new(self.schema, document, self.policy.clone());
        install_providers(&mut cx, &self.provider_sources)?;

        // Raw phase.
        let mut expander = VariableExpandVisitor::new();
        let mut environment = EnvironmentVisitor::new();
        let mut include = IncludeVisitor::new(self.loader);

        let flat = flatten_raw(self.schema, &cx.raw, cx.root, None)?;
        self.run(&mut cx, &flat, &mut FieldDefaultsVisitor::new())?;
        self.run(&mut cx, &flat, &mut VariableInitVisitor::new())?;
        self.run(&mut cx, &flat, &mut expander)?;
        self.run(&mut cx, &flat, &mut environment)?;
        self.run(&mut cx, &flat, &mut include)?;

        let flat = if include.merged_any() {
            let flat = flatten_raw(self.schema, &cx.raw, cx.root, None)?;
            // Merged content gets the same expansion treatment.
            self.run(&mut cx, &flat, &mut expander)?;
            self.run(&mut cx, &flat, &mut environment)?;
            flat
        } else {
            flat
        };
        self.finish(&mut cx, &mut expander)?;
        self.finish(&mut cx, &mut environment)?;

        // Refined phase.
        refine::build(&mut cx)?;
        let flat = flatten_twin(self.schema, &cx.raw, &cx.twins, cx.root, None)?;
        self.run(&mut cx, &flat, &mut IdRegistryVisitor::new())?;

        let mut defaults = DefaultsVisitor::new();
        self.run(&mut cx, &flat, &mut defaults)?;
        self.finish(&mut cx, &mut defaults)?;
        let mut overrides = OverridesVisitor::new();
        self.run(&mut cx, &flat, &mut overrides)?;
        self.finish(&mut cx, &mut overrides)?;

        // Defaults and overrides may have grown subtrees.
        let flat = flatten_twin(self.schema, &cx.raw, &cx.twins, cx.root, None)?;
        self.run(&mut cx, &flat, &mut FieldRefsVisitor::new())?;
        self.run(&mut cx, &flat, &mut ReferenceVisitor::new())?;
        apply_ref_list_edits(&mut cx, overrides.take_pending_edits())?;

        // A round-trip load must not reject documents that rely on the
        // defaulting it skipped.
        if !cx.policy.reversible_only {
            self.run(&mut cx, &flat, &mut RequiredVisitor::new())?;
        }

        let root = cx
            .twins
            .refined_of(cx.root)
            .ok_or_else(|| SettingsError::SchemaMismatch {
                path: cx.raw.node(cx.root).type_name.clone(),
                reason: "document root has no refined twin".to_string(),
            })?;
        let (raw, refined, ids, defaulted) = cx.into_parts();
        debug!(
            objects = refined.len(),
            ids = ids.len(),
            defaulted = defaulted.len(),
            "document resolved"
        );
        Ok(ResolvedSettings {
            raw,
            refined,
            root,
            ids,
            defaulted,
        })
    }

    /// Writes a resolved document back to its raw form.
    ///
    /// The raw twin is maintained through every pass, so saving is a plain
    /// re-emission. Under [`ResolvePolicy::reversible_only`] the result is
    /// value-equal to the originally loaded document; otherwise it carries
    /// the expansions, defaults, and overrides applied during load.
    pub fn save(&self, resolved: &ResolvedSettings) -> SettingsResult<RawDocument> {
        Ok(resolved.raw.clone())
    }
}
