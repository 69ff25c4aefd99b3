//! Settings resolution error types.
//!
//! Every failure of the resolution engine is a `SettingsError`: a single
//! configuration-error kind with a descriptive, path-bearing message. All
//! variants are fatal: the first violation aborts the current load or save
//! call, and the engine produces no partial result.

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Settings resolution errors.
///
/// These errors occur while resolving a raw settings document into its
/// refined object graph: schema violations (duplicate ids, missing required
/// fields, bad references), expansion violations (variables and field
/// references), defaults/overrides violations, and structural violations
/// from sub-document loading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// Two settings objects produced the same namespaced id.
    #[error("Duplicate settings id '{id}': declared at {first_path} and again at {second_path}")]
    DuplicateId {
        id: String,
        first_path: String,
        second_path: String,
    },

    /// A settings object declared the reserved null-sentinel id.
    #[error("Settings object at {path} declares the reserved id '{id}'")]
    ReservedId { path: String, id: String },

    /// A required field was still unset after defaults and overrides were
    /// accounted for.
    #[error("Required field {path} has no value")]
    RequiredFieldMissing { path: String },

    /// A singular reference wildcard matched more than one object.
    #[error("Reference '{wildcard}' at {path} is ambiguous: matches {matches:?}. Expected exactly one.")]
    AmbiguousReference {
        path: String,
        wildcard: String,
        matches: Vec<String>,
    },

    /// A required reference wildcard matched no object.
    #[error("Reference '{wildcard}' at {path} does not match any settings object")]
    UnresolvedReference { path: String, wildcard: String },

    /// A reference resolved to an object whose type cannot be assigned to
    /// the referencing field.
    #[error("Reference at {path} resolves to '{target_id}' of type '{actual_type}', which is not assignable to '{expected_type}'")]
    IncompatibleReference {
        path: String,
        target_id: String,
        expected_type: String,
        actual_type: String,
    },

    /// Variable or field-reference expansion failed.
    #[error("Expansion failed at {path}: {source}")]
    Expansion {
        path: String,
        #[source]
        source: expansion_engine::Error,
    },

    /// An `${env:NAME}` token referenced an environment variable that is
    /// not set, and the policy does not allow undefined variables.
    #[error("Undefined environment variable '{name}' referenced at {path}")]
    UndefinedEnvironmentVariable { path: String, name: String },

    /// Two defaults specifications initialized the same field.
    #[error("Field {path} was defaulted twice")]
    DoubleDefault { path: String },

    /// A reference-list edit command was malformed.
    #[error("Invalid reference-list edit at {path}: {reason}")]
    ListEditInvalid { path: String, reason: String },

    /// A reference-list edit named an element that is not in the list.
    #[error("Reference-list edit at {path}: '{wildcard}' is not an element of the current list")]
    ListEditTargetMissing { path: String, wildcard: String },

    /// A sub-document deserialized to an unexpected root type.
    #[error("Sub-document included at {path} has root type '{actual}', expected '{expected}'")]
    SubDocumentType {
        path: String,
        expected: String,
        actual: String,
    },

    /// A sub-document could not be loaded.
    #[error("Failed to load sub-document '{file}' included at {path}: {reason}")]
    SubDocumentLoad {
        path: String,
        file: String,
        reason: String,
    },

    /// A raw text value could not be converted to the field's scalar kind.
    #[error("Value '{value}' at {path} is not a valid {expected}")]
    ScalarCoercion {
        path: String,
        expected: String,
        value: String,
    },

    /// A settings type name is not registered in the schema.
    #[error("Unknown settings type '{name}'")]
    UnknownType { name: String },

    /// A raw value did not match the shape the schema declares.
    #[error("Schema mismatch at {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },
}

/// Result type alias for settings resolution operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
