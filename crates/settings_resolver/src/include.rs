//! Sub-document inclusion.
//!
//! A field whose descriptor carries the include flag names one or more
//! sub-document files. The pass asks the caller-supplied
//! [`SubDocumentLoader`] for each file, checks that the sub-document's root
//! type fits the including object, grafts the loaded tree into the main
//! arena, primes it (static field defaults, variable declarations under
//! the including object's namespace, nested includes), and merges it into
//! the including object: null fields are filled from the sub-document,
//! list fields are appended, and fields the including document already set
//! win otherwise.

use tracing::debug;

use crate::context::ResolveContext;
use crate::errors::{SettingsError, SettingsResult};
use crate::path::Namespace;
use crate::raw_tree::{RawDocument, RawId, RawValue};
use crate::traversal::{flatten_raw_scoped, FlatNode};
use crate::variables::{FieldDefaultsVisitor, VariableInitVisitor};
use crate::visitor::{run_pass, SettingsVisitor};

#[cfg(test)]
#[path = "include_tests.rs"]
mod tests;

/// Nesting bound for recursive includes; exceeding it means a cycle.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Supplies raw sub-documents to the include pass.
///
/// The loader owns file access and deserialization; the engine never
/// touches the filesystem itself.
pub trait SubDocumentLoader {
    /// Loads and deserializes one sub-document.
    fn load(&self, file: &str) -> SettingsResult<RawDocument>;
}

/// Merges included sub-documents into their including objects.
pub struct IncludeVisitor<'l> {
    loader: Option<&'l dyn SubDocumentLoader>,
    depth: usize,
    merged: bool,
}

impl<'l> IncludeVisitor<'l> {
    /// Creates the pass.
    pub fn new(loader: Option<&'l dyn SubDocumentLoader>) -> Self {
        Self {
            loader,
            depth: 0,
            merged: false,
        }
    }

    fn nested(&self) -> Self {
        Self {
            loader: self.loader,
            depth: self.depth + 1,
            merged: false,
        }
    }

    /// Whether any sub-document was merged during the sweep.
    pub fn merged_any(&self) -> bool {
        self.merged
    }

    fn include_one(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
        file: &str,
    ) -> SettingsResult<()> {
        let loader = self.loader.ok_or_else(|| SettingsError::SubDocumentLoad {
            path: node.path.to_string(),
            file: file.to_string(),
            reason: "no sub-document loader configured".to_string(),
        })?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(SettingsError::SubDocumentLoad {
                path: node.path.to_string(),
                file: file.to_string(),
                reason: "include nesting too deep (include cycle?)".to_string(),
            });
        }
        let sub = loader.load(file)?;

        let owner_type = cx.raw.node(node.raw).type_name.clone();
        let sub_type = sub.root_object().type_name.clone();
        if !cx.schema.is_assignable(&sub_type, &owner_type) {
            return Err(SettingsError::SubDocumentType {
                path: node.path.to_string(),
                expected: owner_type,
                actual: sub_type,
            });
        }
        debug!(path = %node.path, file = %file, "merging sub-document");

        // The include field itself reads in the outer namespace; the merged
        // content becomes children of the owner and is primed under the
        // namespace the owner designates.
        let owner_schema = cx.schema.get(&owner_type)?;
        let namespace = match owner_schema.namespace_field() {
            Some(index) => match cx.raw.field(node.raw, index).as_text() {
                Some(segment) if !segment.is_empty() => node.namespace.child(segment),
                _ => node.namespace.clone(),
            },
            None => node.namespace.clone(),
        };

        let sub_root = cx.raw.graft(&sub.tree, sub.root);
        self.prime(cx, sub_root, &namespace)?;
        merge_object(cx, node.raw, sub_root)?;
        self.merged = true;
        Ok(())
    }

    /// Runs the raw init passes over a freshly grafted subtree.
    fn prime(
        &self,
        cx: &mut ResolveContext<'_>,
        sub_root: RawId,
        namespace: &Namespace,
    ) -> SettingsResult<()> {
        let flat = flatten_raw_scoped(cx.schema, &cx.raw, sub_root, namespace, None)?;
        run_pass(cx, &flat, &mut FieldDefaultsVisitor::new())?;
        run_pass(cx, &flat, &mut VariableInitVisitor::new())?;
        let mut nested = self.nested();
        run_pass(cx, &flat, &mut nested)
    }
}

impl SettingsVisitor for IncludeVisitor<'_> {
    fn name(&self) -> &'static str {
        "include"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if !descriptor.include {
            return Ok(());
        }
        let index = node.field.unwrap_or_default();
        let files: Vec<String> = match cx.raw.field(node.raw, index) {
            RawValue::Text(file) if !file.is_empty() => vec![file.clone()],
            RawValue::TextList(files) => files.clone(),
            _ => return Ok(()),
        };
        for file in &files {
            self.include_one(cx, node, file)?;
        }
        Ok(())
    }
}

/// Merges a primed sub-document root into its including object.
fn merge_object(cx: &mut ResolveContext<'_>, owner: RawId, sub: RawId) -> SettingsResult<()> {
    let owner_schema = cx.schema.get(&cx.raw.node(owner).type_name)?.clone();
    let sub_schema = cx.schema.get(&cx.raw.node(sub).type_name)?.clone();

    for (sub_index, sub_field) in sub_schema.fields.iter().enumerate() {
        if sub_field.include {
            continue; // the sub-document's own include lists are spent
        }
        let sub_value = cx.raw.field(sub, sub_index).clone();
        if sub_value.is_null() {
            continue;
        }
        let owner_index = match owner_schema.field_index(&sub_field.name) {
            Some(index) => index,
            None => continue,
        };
        let merged = match (cx.raw.field(owner, owner_index).clone(), sub_value) {
            (RawValue::Null, value) => Some(value),
            (RawValue::TextList(mut items), RawValue::TextList(extra)) => {
                items.extend(extra);
                Some(RawValue::TextList(items))
            }
            (RawValue::ObjectList(mut items), RawValue::ObjectList(extra)) => {
                items.extend(extra);
                Some(RawValue::ObjectList(items))
            }
            // The including document wins for set scalars and objects.
            _ => None,
        };
        if let Some(value) = merged {
            cx.raw.set_field(owner, owner_index, value);
        }
    }
    Ok(())
}
