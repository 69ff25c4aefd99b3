//! Ahead-of-time settings schema descriptors.
//!
//! The resolution engine never inspects types at runtime. Instead, every
//! settings type is described once by a [`TypeSchema`], an ordered table of
//! [`FieldDescriptor`]s plus the capability flags the passes consume, and
//! all descriptors are collected in a [`SchemaRegistry`] built before any
//! document is loaded. The hot traversal path reads this as plain data.
//!
//! Descriptors are produced through a small builder API; an application
//! would typically generate these calls from its own declarative metadata.

use std::collections::HashSet;

use crate::errors::{SettingsError, SettingsResult};
use crate::value::ScalarKind;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// The declared value kind of a settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single textual/numeric/boolean value.
    Scalar(ScalarKind),
    /// A list of scalar values.
    ScalarList(ScalarKind),
    /// A nested settings object.
    Settings,
    /// A list of nested settings objects.
    SettingsList,
    /// A cross-reference to another settings object, written as a wildcard
    /// reference string in the raw form.
    Reference,
    /// A cross-reference to zero or more settings objects.
    ReferenceList,
}

impl FieldKind {
    /// Whether the field holds scalar data (single or list).
    pub fn is_scalar(&self) -> bool {
        matches!(self, FieldKind::Scalar(_) | FieldKind::ScalarList(_))
    }

    /// Whether the field is a cross-reference (single or list).
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Reference | FieldKind::ReferenceList)
    }

    /// Whether the field nests settings objects (single or list).
    pub fn is_settings(&self) -> bool {
        matches!(self, FieldKind::Settings | FieldKind::SettingsList)
    }

    /// Whether the field is list-valued.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            FieldKind::ScalarList(_) | FieldKind::SettingsList | FieldKind::ReferenceList
        )
    }
}

/// Static description of one settings field.
///
/// Produced once per type from declarative metadata and shared by all
/// instances; the engine treats descriptors as immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// The field name as written in documents.
    pub name: String,
    /// The declared value kind.
    pub kind: FieldKind,
    /// Declared settings type for settings and reference kinds.
    pub type_name: Option<String>,
    /// The field must have a value once resolution completes.
    pub required: bool,
    /// The field is exempt from variable, environment, and field-reference
    /// expansion, and from defaults/overrides.
    pub sealed: bool,
    /// Nested objects may be any subtype of the declared type.
    pub polymorphic: bool,
    /// Serialization hint: the field is written inline by serializers.
    pub inline: bool,
    /// The field is omitted when a refined tree is written back to raw form.
    pub hidden: bool,
    /// Reference fields only: zero matches is acceptable.
    pub weak: bool,
    /// The field's text value names a sub-document to include.
    pub include: bool,
    /// The field's value extends the namespace for the owning object's
    /// subtree.
    pub namespace_designator: bool,
    /// The field's value is the owning object's id.
    pub id_designator: bool,
    /// Static default applied to null raw fields before expansion.
    pub default: Option<String>,
    /// Visitor names whose callbacks are suppressed for this field and its
    /// entire subtree.
    pub skip_for: HashSet<String>,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, kind: FieldKind, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name,
            required: false,
            sealed: false,
            polymorphic: false,
            inline: false,
            hidden: false,
            weak: false,
            include: false,
            namespace_designator: false,
            id_designator: false,
            default: None,
            skip_for: HashSet::new(),
        }
    }

    /// Creates a scalar field descriptor.
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(name, FieldKind::Scalar(kind), None)
    }

    /// Creates a scalar-list field descriptor.
    pub fn scalar_list(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(name, FieldKind::ScalarList(kind), None)
    }

    /// Creates a nested-settings field descriptor.
    pub fn settings(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Settings, Some(type_name.into()))
    }

    /// Creates a settings-list field descriptor.
    pub fn settings_list(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::SettingsList, Some(type_name.into()))
    }

    /// Creates a singular reference field descriptor.
    pub fn reference(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reference, Some(type_name.into()))
    }

    /// Creates a reference-list field descriptor.
    pub fn reference_list(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ReferenceList, Some(type_name.into()))
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as sealed against expansion and defaulting.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Allows nested objects of any subtype of the declared type.
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// Marks the field as inline-serialized.
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Excludes the field from raw re-emission.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Allows a reference field to resolve to nothing.
    pub fn weak(mut self) -> Self {
        self.weak = true;
        self
    }

    /// Marks the field's value as a sub-document path.
    pub fn include(mut self) -> Self {
        self.include = true;
        self
    }

    /// Marks the field's value as a namespace segment for the subtree.
    pub fn namespace_designator(mut self) -> Self {
        self.namespace_designator = true;
        self
    }

    /// Marks the field's value as the owning object's id.
    pub fn id_designator(mut self) -> Self {
        self.id_designator = true;
        self
    }

    /// Sets the static default applied to null raw fields.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Suppresses the named visitor for this field and its subtree.
    pub fn skip_for(mut self, visitor: impl Into<String>) -> Self {
        self.skip_for.insert(visitor.into());
        self
    }
}

/// The role a settings type plays in a document.
///
/// Most types are plain configuration objects; a few well-known roles mark
/// the document-level constructs the resolution passes harvest (variables,
/// defaults/overrides specifications, reference-list edit commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeRole {
    #[default]
    Plain,
    /// A `variable { name, value }` element.
    Variable,
    /// A defaults specification: optional target filter plus value template.
    DefaultSpec,
    /// An overrides specification: optional target filter, value template,
    /// and reference-list edit commands.
    OverrideSpec,
    /// A reference-list edit command element.
    ListEdit,
}

/// Static description of one settings type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    /// The type name as written in documents.
    pub name: String,
    /// Parent settings type for assignability checks.
    pub parent: Option<String>,
    /// The role this type plays in documents.
    pub role: TypeRole,
    /// Field descriptors in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl TypeSchema {
    /// Creates a schema for a plain settings type with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            role: TypeRole::Plain,
            fields: Vec::new(),
        }
    }

    /// Sets the parent type.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the type role.
    pub fn with_role(mut self, role: TypeRole) -> Self {
        self.role = role;
        self
    }

    /// Appends a field descriptor.
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    /// Finds a field's index by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Finds a field descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of the namespace-designated field, if any.
    pub fn namespace_field(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.namespace_designator)
    }

    /// Index of the id-designated field, if any.
    pub fn id_field(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.id_designator)
    }
}

/// Registry of all settings type schemas.
///
/// Built once ahead of resolution and shared immutably by every pass.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: std::collections::HashMap<String, TypeSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type schema.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::SchemaMismatch`] when the type name is
    /// already registered.
    pub fn register(&mut self, schema: TypeSchema) -> SettingsResult<()> {
        if self.types.contains_key(&schema.name) {
            return Err(SettingsError::SchemaMismatch {
                path: schema.name.clone(),
                reason: "type registered twice".to_string(),
            });
        }
        self.types.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Looks up a type schema.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownType`] for unregistered names.
    pub fn get(&self, name: &str) -> SettingsResult<&TypeSchema> {
        self.types.get(name).ok_or_else(|| SettingsError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Looks up a type schema without failing.
    pub fn try_get(&self, name: &str) -> Option<&TypeSchema> {
        self.types.get(name)
    }

    /// The ancestor chain of a type, starting with the type itself.
    pub fn ancestors(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.types.get(name);
        while let Some(schema) = current {
            if chain.contains(&schema.name.as_str()) {
                break; // malformed parent cycle; stop rather than loop
            }
            chain.push(schema.name.as_str());
            current = schema.parent.as_deref().and_then(|p| self.types.get(p));
        }
        chain
    }

    /// Whether an object of type `actual` can be assigned where `expected`
    /// is declared.
    pub fn is_assignable(&self, actual: &str, expected: &str) -> bool {
        self.ancestors(actual).contains(&expected)
    }
}
