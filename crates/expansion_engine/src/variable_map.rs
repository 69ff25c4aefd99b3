//! Variable map with lazily evaluated value providers.
//!
//! This module provides the `VariableMap` type which associates variable
//! names with value providers. A provider is either a literal string (from a
//! declared `variable` element) or a lazy closure (from a dynamic provider
//! source such as the process environment). Lazy providers are evaluated at
//! most once; the produced value is memoized for the lifetime of the map.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{Error, ExpansionResult};

#[cfg(test)]
#[path = "variable_map_tests.rs"]
mod tests;

/// Source of variable values for expansion.
///
/// [`VariableMap`] is the canonical implementation; callers that need
/// scoped lookup (namespace fallback and similar) wrap a map in their own
/// implementation.
pub trait VariableSource {
    /// Resolves a variable name to its value, or `None` when undefined.
    fn resolve_variable(&self, name: &str) -> Option<ExpansionResult<String>>;
}

/// A value provider for a single variable.
///
/// Literal providers come from declared variables; lazy providers are
/// supplied by dynamic sources and are only invoked when the variable is
/// actually referenced.
pub enum ValueProvider {
    /// An eagerly known literal value.
    Literal(String),
    /// A deferred computation producing the value on first use.
    ///
    /// The closure returns `Err(reason)` when the value cannot be produced;
    /// the failure is surfaced as [`Error::ProviderFailed`].
    Lazy(Box<dyn Fn() -> Result<String, String>>),
}

impl ValueProvider {
    /// Creates a lazy provider from a closure.
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Result<String, String> + 'static,
    {
        ValueProvider::Lazy(Box::new(f))
    }
}

impl std::fmt::Debug for ValueProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueProvider::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            ValueProvider::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

struct Entry {
    provider: ValueProvider,
    cached: RefCell<Option<String>>,
}

/// Mapping from variable name to value provider.
///
/// Names must be unique and are restricted to word characters; both rules
/// are enforced on insertion. The map is scoped to a single resolution call
/// and discarded afterward.
///
/// # Examples
///
/// ```rust
/// use expansion_engine::VariableMap;
///
/// let mut map = VariableMap::new();
/// map.insert_literal("host", "example.com").unwrap();
/// assert_eq!(map.resolve("host").unwrap().unwrap(), "example.com");
/// assert!(map.resolve("missing").is_none());
/// ```
#[derive(Default)]
pub struct VariableMap {
    entries: HashMap<String, Entry>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Bare names are word characters only; the optional dotted segments are
    // namespace qualification added by the resolver.
    PATTERN.get_or_init(|| Regex::new(r"^\w+(?:\.\w+)*$").expect("variable name pattern is valid"))
}

impl VariableMap {
    /// Creates an empty variable map.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Defines a variable with a literal value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVariableName`] if the name contains anything
    /// other than word characters, and [`Error::DuplicateVariable`] if the
    /// name is already defined.
    pub fn insert_literal(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> ExpansionResult<()> {
        self.insert(name.into(), ValueProvider::Literal(value.into()))
    }

    /// Defines a variable backed by a value provider.
    ///
    /// Same uniqueness and naming rules as [`VariableMap::insert_literal`].
    pub fn insert(&mut self, name: String, provider: ValueProvider) -> ExpansionResult<()> {
        if !name_pattern().is_match(&name) {
            return Err(Error::InvalidVariableName { name });
        }
        if self.entries.contains_key(&name) {
            return Err(Error::DuplicateVariable { name });
        }
        self.entries.insert(
            name,
            Entry {
                provider,
                cached: RefCell::new(None),
            },
        );
        Ok(())
    }

    /// Checks whether a variable is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolves a variable to its value.
    ///
    /// Returns `None` for undefined names. Lazy providers are evaluated on
    /// first resolution and their value memoized; a provider failure is
    /// reported as [`Error::ProviderFailed`] on every resolution attempt.
    pub fn resolve(&self, name: &str) -> Option<ExpansionResult<String>> {
        let entry = self.entries.get(name)?;
        if let Some(cached) = entry.cached.borrow().as_ref() {
            return Some(Ok(cached.clone()));
        }
        let value = match &entry.provider {
            ValueProvider::Literal(value) => value.clone(),
            ValueProvider::Lazy(f) => match f() {
                Ok(value) => value,
                Err(reason) => {
                    return Some(Err(Error::ProviderFailed {
                        name: name.to_string(),
                        reason,
                    }))
                }
            },
        };
        *entry.cached.borrow_mut() = Some(value.clone());
        Some(Ok(value))
    }

    /// Returns the number of defined variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the map has no definitions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the defined variable names in unspecified order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl VariableSource for VariableMap {
    fn resolve_variable(&self, name: &str) -> Option<ExpansionResult<String>> {
        self.resolve(name)
    }
}

impl std::fmt::Debug for VariableMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableMap")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
