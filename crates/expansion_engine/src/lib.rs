//! String expansion engine for settings documents.
//!
//! This crate implements the two textual substitution mechanisms used by the
//! settings resolver:
//!
//! - **Configuration variables**: `${name}` references resolved against a
//!   [`VariableMap`], iteratively and with circular-dependency detection.
//! - **Field references**: `@{fieldName}` references resolved against
//!   sibling fields of the same object, single-pass only.
//!
//! The crate is purely string-level; it knows nothing about settings trees.
//! The resolver decides which fields participate (sealed fields are skipped
//! there) and supplies the lookup context.

pub mod errors;
pub mod expand;
pub mod field_refs;
pub mod variable_map;

pub use errors::{Error, ExpansionResult};
pub use expand::{contains_variable_ref, expand, Expansion, UndefinedPolicy};
pub use field_refs::{contains_field_ref, expand_field_refs};
pub use variable_map::{ValueProvider, VariableMap, VariableSource};
