//! Iterative `${name}` variable expansion.
//!
//! Expansion replaces every currently resolvable `${name}` reference in a
//! string. When a substituted value itself contains further references they
//! are expanded in the next inner iteration; the set of names already
//! expanded within the string is tracked so that a reappearing name is
//! rejected as a circular dependency.
//!
//! Undefined names are handled according to an [`UndefinedPolicy`]: during
//! early passes the caller defers them (additional variables may still be
//! loaded from included sub-documents); on the final pass they either become
//! empty text or a hard error.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::errors::{Error, ExpansionResult};
use crate::variable_map::VariableSource;

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;

/// Behavior when a `${name}` reference cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedPolicy {
    /// Leave the reference in place for a later expansion pass.
    Defer,
    /// Replace the reference with empty text.
    Empty,
    /// Fail with [`Error::UndefinedVariable`].
    Error,
}

/// Outcome of expanding a single string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// The (possibly partially) expanded text.
    pub text: String,
    /// Whether any substitution was performed.
    pub substituted: bool,
    /// Names that could not be resolved and were deferred.
    ///
    /// Only populated under [`UndefinedPolicy::Defer`].
    pub deferred: Vec<String>,
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Deliberately restricted to word characters so that tokens such as
    // `${env:NAME}` are left for the environment pass.
    PATTERN.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("variable pattern is valid"))
}

/// Checks whether a string contains at least one `${name}` reference.
pub fn contains_variable_ref(text: &str) -> bool {
    variable_pattern().is_match(text)
}

/// Expands all `${name}` references in `text` against `source`.
///
/// # Errors
///
/// Returns [`Error::CircularVariable`] when a variable reference reappears
/// after that variable was already expanded within this string, and
/// [`Error::UndefinedVariable`] for unresolvable names under
/// [`UndefinedPolicy::Error`]. Provider failures propagate as
/// [`Error::ProviderFailed`].
pub fn expand(
    text: &str,
    source: &dyn VariableSource,
    policy: UndefinedPolicy,
) -> ExpansionResult<Expansion> {
    let pattern = variable_pattern();
    let mut current = text.to_string();
    let mut expanded_names: HashSet<String> = HashSet::new();
    let mut deferred: Vec<String> = Vec::new();
    let mut substituted = false;

    loop {
        let names: Vec<String> = {
            let mut seen_here = HashSet::new();
            pattern
                .captures_iter(&current)
                .map(|c| c[1].to_string())
                .filter(|n| seen_here.insert(n.clone()))
                .collect()
        };
        if names.is_empty() {
            break;
        }

        let mut progressed = false;
        for name in names {
            if expanded_names.contains(&name) {
                return Err(Error::CircularVariable {
                    name,
                    text: text.to_string(),
                });
            }
            match source.resolve_variable(&name) {
                Some(value) => {
                    let value = value?;
                    trace!(variable = %name, "substituting variable reference");
                    current = current.replace(&format!("${{{}}}", name), &value);
                    expanded_names.insert(name);
                    substituted = true;
                    progressed = true;
                }
                None => match policy {
                    UndefinedPolicy::Defer => {
                        if !deferred.contains(&name) {
                            deferred.push(name);
                        }
                    }
                    UndefinedPolicy::Empty => {
                        current = current.replace(&format!("${{{}}}", name), "");
                        substituted = true;
                        progressed = true;
                    }
                    UndefinedPolicy::Error => {
                        return Err(Error::UndefinedVariable {
                            name,
                            text: text.to_string(),
                        });
                    }
                },
            }
        }

        if !progressed {
            // Every remaining reference was deferred; nothing further can
            // resolve in this pass.
            break;
        }
    }

    Ok(Expansion {
        text: current,
        substituted,
        deferred,
    })
}
