//! Twin-tree traversal and flattening.
//!
//! The engine walks a raw tree (or a raw/refined twin pair) depth-first,
//! pre-order: each object before its fields, each field before its
//! subtree, fields in declaration order. One flattening pass dumps the
//! whole traversal into an ordered [`FlatNode`] list per load; every
//! resolution pass replays that list instead of re-walking the tree.
//! Because parents precede descendants and parent paths are strict
//! prefixes of descendant paths, skipping a field's subtree is a forward
//! scan while `path.starts_with(skipped)`.

use tracing::trace;

use crate::errors::SettingsResult;
use crate::path::{Namespace, SettingsPath};
use crate::raw_tree::{RawId, RawTree, RawValue};
use crate::refined_tree::{RefinedId, TwinMap};
use crate::schema::{FieldDescriptor, SchemaRegistry};

#[cfg(test)]
#[path = "traversal_tests.rs"]
mod tests;

/// One entry of the flattened traversal.
///
/// An object entry (`field == None`) carries the object's own ids; a field
/// entry carries the owning object's ids plus the field's descriptor index.
#[derive(Debug, Clone)]
pub struct FlatNode {
    /// The node's settings path, unique within one traversal.
    pub path: SettingsPath,
    /// The active namespace at this node.
    pub namespace: Namespace,
    /// The (owning) raw object.
    pub raw: RawId,
    /// The (owning) refined twin, when flattening a twin pair.
    pub refined: Option<RefinedId>,
    /// Descriptor index for field entries, `None` for object entries.
    pub field: Option<usize>,
}

impl FlatNode {
    /// Whether this entry describes an object rather than a field.
    pub fn is_object(&self) -> bool {
        self.field.is_none()
    }

    /// The field descriptor of a field entry, `None` for object entries.
    ///
    /// The returned borrow is tied to the schema registry, not the context,
    /// so callers may keep it across context mutations.
    pub fn descriptor<'s>(
        &self,
        cx: &crate::context::ResolveContext<'s>,
    ) -> SettingsResult<Option<&'s FieldDescriptor>> {
        let index = match self.field {
            Some(index) => index,
            None => return Ok(None),
        };
        let schema: &'s SchemaRegistry = cx.schema;
        let type_name = &cx.raw.node(self.raw).type_name;
        Ok(Some(&schema.get(type_name)?.fields[index]))
    }
}

/// Predicate suppressing descent into selected field branches.
pub type BranchSkip<'a> = &'a dyn Fn(&FieldDescriptor) -> bool;

/// Flattens a raw tree.
pub fn flatten_raw(
    schema: &SchemaRegistry,
    raw: &RawTree,
    root: RawId,
    branch_skip: Option<BranchSkip<'_>>,
) -> SettingsResult<Vec<FlatNode>> {
    flatten(schema, raw, None, root, branch_skip)
}

/// Flattens a raw subtree with a given base namespace.
///
/// Used when a grafted sub-document is primed: its nodes must see the
/// namespace of the object that included them.
pub fn flatten_raw_scoped(
    schema: &SchemaRegistry,
    raw: &RawTree,
    root: RawId,
    namespace: &Namespace,
    branch_skip: Option<BranchSkip<'_>>,
) -> SettingsResult<Vec<FlatNode>> {
    let mut nodes = Vec::new();
    let root_path = SettingsPath::root(&raw.node(root).type_name);
    visit(
        schema, raw, None, root, &root_path, namespace, branch_skip, &mut nodes,
    )?;
    Ok(nodes)
}

/// Flattens a raw tree together with its refined twins.
pub fn flatten_twin(
    schema: &SchemaRegistry,
    raw: &RawTree,
    twins: &TwinMap,
    root: RawId,
    branch_skip: Option<BranchSkip<'_>>,
) -> SettingsResult<Vec<FlatNode>> {
    flatten(schema, raw, Some(twins), root, branch_skip)
}

fn flatten(
    schema: &SchemaRegistry,
    raw: &RawTree,
    twins: Option<&TwinMap>,
    root: RawId,
    branch_skip: Option<BranchSkip<'_>>,
) -> SettingsResult<Vec<FlatNode>> {
    let mut nodes = Vec::new();
    let root_path = SettingsPath::root(&raw.node(root).type_name);
    visit(
        schema,
        raw,
        twins,
        root,
        &root_path,
        &Namespace::global(),
        branch_skip,
        &mut nodes,
    )?;
    trace!(nodes = nodes.len(), "flattened settings tree");
    Ok(nodes)
}

#[allow(clippy::too_many_arguments)]
fn visit(
    schema: &SchemaRegistry,
    raw: &RawTree,
    twins: Option<&TwinMap>,
    id: RawId,
    path: &SettingsPath,
    outer: &Namespace,
    branch_skip: Option<BranchSkip<'_>>,
    out: &mut Vec<FlatNode>,
) -> SettingsResult<()> {
    let object = raw.node(id);
    let type_schema = schema.get(&object.type_name)?;
    let refined = twins.and_then(|t| t.refined_of(id));

    // The namespace-designated field, if present and set, extends the
    // namespace for this object and its whole subtree.
    let composed = match type_schema.namespace_field() {
        Some(index) => match raw.field(id, index).as_text() {
            Some(segment) if !segment.is_empty() => outer.child(segment),
            _ => outer.clone(),
        },
        None => outer.clone(),
    };

    out.push(FlatNode {
        path: path.clone(),
        namespace: composed.clone(),
        raw: id,
        refined,
        field: None,
    });

    for (index, descriptor) in type_schema.fields.iter().enumerate() {
        let field_path = path.child(&descriptor.name);
        // Scalar fields, the designator included, read in the unchanged
        // outer namespace; settings and reference fields see the namespace
        // the object designates.
        let field_namespace = if descriptor.kind.is_scalar() {
            outer.clone()
        } else {
            composed.clone()
        };
        out.push(FlatNode {
            path: field_path.clone(),
            namespace: field_namespace,
            raw: id,
            refined,
            field: Some(index),
        });

        if descriptor.kind.is_reference() {
            continue;
        }
        if let Some(skip) = branch_skip {
            if skip(descriptor) {
                continue;
            }
        }
        match raw.field(id, index) {
            RawValue::Object(child) => {
                let child_type = raw.node(*child).type_name.clone();
                let child_path = field_path.typed(&child_type);
                visit(
                    schema, raw, twins, *child, &child_path, &composed, branch_skip, out,
                )?;
            }
            RawValue::ObjectList(children) => {
                for (i, child) in children.iter().enumerate() {
                    let child_type = raw.node(*child).type_name.clone();
                    let child_path = field_path.element(i, &child_type);
                    visit(
                        schema, raw, twins, *child, &child_path, &composed, branch_skip, out,
                    )?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}
