//! Declarative resolution of typed settings documents.
//!
//! A settings document is a tree of typed objects described by a
//! [`SchemaRegistry`]. Loading a document builds two parallel trees, the
//! raw text-valued tree as authored and the refined typed object graph,
//! and runs a fixed pipeline of passes over them: static field defaults,
//! variable and environment expansion, sub-document inclusion, typed
//! refinement, id registration, defaults and overrides specifications,
//! sibling field references, wildcard reference resolution, reference-list
//! edits, and the required-field check. The raw twin is maintained through
//! every pass, so saving a resolved document is a plain re-emission.
//!
//! [`SettingsResolver`] is the entry point; [`document`] converts between
//! raw documents and JSON or TOML text.

// Document model
pub mod path;
pub mod raw_tree;
pub mod refined_tree;
pub mod schema;
pub mod value;

// Serialization
pub mod document;

// Resolution state and the pass seam
pub mod context;
pub mod errors;
pub mod traversal;
pub mod visitor;

// Passes, in pipeline order
pub mod variables;

pub mod include;

pub mod refine;
pub mod registry;

pub mod defaults;
pub mod overrides;

pub mod field_refs;
pub mod reference;
pub mod required;

// The engine
pub mod resolver;

// Re-export for convenient access
pub use context::{IdRegistry, ResolveContext, ResolvePolicy, NULL_ID};
pub use errors::{SettingsError, SettingsResult};
pub use field_refs::FieldRefsVisitor;
pub use include::{IncludeVisitor, SubDocumentLoader};
pub use path::{Namespace, SettingsPath};
pub use raw_tree::{RawDocument, RawId, RawObject, RawTree, RawValue};
pub use reference::{resolve_wildcard, ReferenceVisitor, WildcardMatches};
pub use refined_tree::{RefinedId, RefinedObject, RefinedTree, RefinedValue, TwinMap};
pub use resolver::{ResolvedSettings, SettingsResolver};
pub use schema::{FieldDescriptor, FieldKind, SchemaRegistry, TypeRole, TypeSchema};
pub use value::{ScalarKind, ScalarValue};
pub use variables::{EnvironmentSource, VariableProviderSource};
pub use visitor::{run_pass, SettingsVisitor};
