use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Error types that can occur during variable and field-reference expansion.
///
/// This enum represents all failure conditions of the string expansion
/// engine: malformed variable definitions, unresolvable references, and
/// circular dependencies. Every error is fatal for the expansion that
/// produced it; the engine never returns partially expanded text alongside
/// an error.
///
/// # Examples
///
/// ```rust,ignore
/// use expansion_engine::Error;
///
/// match expand_something() {
///     Ok(text) => println!("Expanded: {}", text),
///     Err(Error::UndefinedVariable { name, .. }) => {
///         eprintln!("Unknown variable: {}", name);
///     }
///     Err(e) => eprintln!("Expansion failed: {}", e),
/// }
/// # fn expand_something() -> Result<String, Error> { Ok(String::new()) }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A variable was defined with a name that is not restricted to word
    /// characters (`[A-Za-z0-9_]`).
    #[error("Invalid variable name '{name}': names may only contain word characters")]
    InvalidVariableName {
        /// The rejected variable name.
        name: String,
    },

    /// Two variable definitions used the same name.
    ///
    /// Variable names must be unique across the declared variables and all
    /// dynamic provider sources merged into the map.
    #[error("Duplicate variable definition: '{name}'")]
    DuplicateVariable {
        /// The name that was defined more than once.
        name: String,
    },

    /// Expanding a string required a variable whose own value (directly or
    /// transitively) refers back to that variable.
    #[error("Circular variable dependency on '{name}' while expanding \"{text}\"")]
    CircularVariable {
        /// The variable whose reference reappeared after it was expanded.
        name: String,
        /// The string being expanded when the cycle was detected.
        text: String,
    },

    /// A `${name}` reference named a variable that is not in the map, and
    /// the active policy does not tolerate undefined variables.
    #[error("Undefined variable '{name}' referenced in \"{text}\"")]
    UndefinedVariable {
        /// The unresolvable variable name.
        name: String,
        /// The string that referenced it.
        text: String,
    },

    /// A lazily evaluated variable provider failed to produce a value.
    #[error("Evaluation of variable '{name}' failed: {reason}")]
    ProviderFailed {
        /// The variable whose provider failed.
        name: String,
        /// Description of the provider failure.
        reason: String,
    },

    /// An `@{field}` reference named a field the owning object does not
    /// have, or whose value is not textual.
    #[error("Undefined field reference '@{{{name}}}'")]
    UndefinedFieldReference {
        /// The referenced field name.
        name: String,
    },

    /// An `@{field}` reference resolved to a value that itself contains a
    /// field reference. Chained field references are not supported.
    #[error("Field reference '@{{{name}}}' resolves to text containing another field reference")]
    ChainedFieldReference {
        /// The field whose value contained the nested reference.
        name: String,
    },
}

/// Result type alias for expansion operations.
pub type ExpansionResult<T> = Result<T, Error>;
