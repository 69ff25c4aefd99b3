//! Scalar value kinds and explicit fallible coercion.
//!
//! Raw trees carry every scalar as text; the refined tree carries the
//! strongly typed value. Conversion between the two is modeled as an
//! explicit fallible operation; the resolver aggregates failures into
//! [`SettingsError::ScalarCoercion`](crate::errors::SettingsError) at the
//! point where a path is known.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;

/// The scalar kinds a settings field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Text,
    Integer,
    Float,
    Boolean,
}

impl ScalarKind {
    /// Human-readable kind name used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            ScalarKind::Text => "text",
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Boolean => "boolean",
        }
    }

    /// Converts raw text to a typed scalar value.
    ///
    /// Returns `None` when the text is not valid for this kind; the caller
    /// attaches path context and raises the configuration error.
    pub fn parse(&self, text: &str) -> Option<ScalarValue> {
        match self {
            ScalarKind::Text => Some(ScalarValue::Text(text.to_string())),
            ScalarKind::Integer => text.trim().parse::<i64>().ok().map(ScalarValue::Integer),
            ScalarKind::Float => text.trim().parse::<f64>().ok().map(ScalarValue::Float),
            ScalarKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(ScalarValue::Boolean(true)),
                "false" => Some(ScalarValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

/// A strongly typed scalar value in the refined tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl ScalarValue {
    /// The kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Text(_) => ScalarKind::Text,
            ScalarValue::Integer(_) => ScalarKind::Integer,
            ScalarValue::Float(_) => ScalarKind::Float,
            ScalarValue::Boolean(_) => ScalarKind::Boolean,
        }
    }

    /// Renders the value back to its raw textual form.
    pub fn to_text(&self) -> String {
        match self {
            ScalarValue::Text(value) => value.clone(),
            ScalarValue::Integer(value) => value.to_string(),
            ScalarValue::Float(value) => value.to_string(),
            ScalarValue::Boolean(value) => value.to_string(),
        }
    }

    /// Returns the textual payload for text values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}
