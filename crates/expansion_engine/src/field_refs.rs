//! `@{fieldName}` sibling-field reference expansion.
//!
//! Field references are resolved against the fields of the same object only,
//! through a lookup closure supplied by the caller. Unlike variable
//! expansion this is a single-pass mechanism: a referenced field's value may
//! not itself contain a field reference.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{Error, ExpansionResult};

#[cfg(test)]
#[path = "field_refs_tests.rs"]
mod tests;

fn field_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@\{(\w+)\}").expect("field reference pattern is valid"))
}

/// Checks whether a string contains at least one `@{field}` reference.
pub fn contains_field_ref(text: &str) -> bool {
    field_ref_pattern().is_match(text)
}

/// Expands every `@{fieldName}` reference in `text`.
///
/// `lookup` maps a field name to its textual value on the owning object,
/// returning `None` for unknown or non-textual fields.
///
/// # Errors
///
/// Returns [`Error::UndefinedFieldReference`] when `lookup` does not know
/// the name, and [`Error::ChainedFieldReference`] when the referenced value
/// itself contains an `@{...}` reference.
pub fn expand_field_refs<F>(text: &str, lookup: F) -> ExpansionResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = field_ref_pattern();
    let mut result = String::with_capacity(text.len());
    let mut last = 0;

    for captures in pattern.captures_iter(text) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = &captures[1];
        let value = lookup(name).ok_or_else(|| Error::UndefinedFieldReference {
            name: name.to_string(),
        })?;
        if contains_field_ref(&value) {
            return Err(Error::ChainedFieldReference {
                name: name.to_string(),
            });
        }
        result.push_str(&text[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Ok(result)
}
