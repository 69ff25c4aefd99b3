//! Static field defaults, variable harvesting, and text expansion passes.
//!
//! Four raw-phase passes live here, in pipeline order:
//!
//! 1. [`FieldDefaultsVisitor`] writes descriptor-declared defaults into
//!    null raw fields so subsequent expansion sees them.
//! 2. [`VariableInitVisitor`] harvests `variable { name, value }` elements
//!    into the context's variable map under namespace-qualified names.
//! 3. [`VariableExpandVisitor`] substitutes `${name}` references in raw
//!    text. During the sweep, undefined names are tolerated because
//!    included sub-documents may still contribute definitions; the
//!    deferred strings are re-expanded in [`finish`](crate::visitor::SettingsVisitor::finish)
//!    under the call's undefined-variable policy.
//! 4. [`EnvironmentVisitor`] substitutes `${env:NAME}` tokens from the
//!    process environment, with the same deferred finalization.
//!
//! Variable lookup is namespace-scoped: a reference written in namespace
//! `a.b` tries `a.b.name`, then `a.name`, then the global `name`.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use expansion_engine::{
    contains_variable_ref, expand, ExpansionResult, UndefinedPolicy, ValueProvider, VariableMap,
    VariableSource,
};

use crate::context::ResolveContext;
use crate::errors::{SettingsError, SettingsResult};
use crate::path::{Namespace, SettingsPath};
use crate::raw_tree::{RawId, RawValue};
use crate::schema::TypeRole;
use crate::traversal::FlatNode;
use crate::visitor::SettingsVisitor;

#[cfg(test)]
#[path = "variables_tests.rs"]
mod tests;

/// A source of dynamically provided variables, consulted once per load.
///
/// Implementations supply named value providers that are merged into the
/// variable map before any document-declared variable is harvested;
/// declaring a document variable with a provider-supplied name is then the
/// usual duplicate-variable violation.
pub trait VariableProviderSource {
    /// The providers this source contributes.
    fn providers(&self) -> Vec<(String, ValueProvider)>;
}

/// Exposes a fixed set of process environment variables as lazily read
/// variables.
pub struct EnvironmentSource {
    names: Vec<String>,
}

impl EnvironmentSource {
    /// Creates a source for the given environment variable names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl VariableProviderSource for EnvironmentSource {
    fn providers(&self) -> Vec<(String, ValueProvider)> {
        self.names
            .iter()
            .map(|name| {
                let key = name.clone();
                let provider = ValueProvider::lazy(move || {
                    std::env::var(&key)
                        .map_err(|_| format!("environment variable '{}' is not set", key))
                });
                (name.clone(), provider)
            })
            .collect()
    }
}

/// Namespace-scoped view over the context's variable map.
struct ScopedVariables<'a> {
    variables: &'a VariableMap,
    namespace: &'a Namespace,
}

impl VariableSource for ScopedVariables<'_> {
    fn resolve_variable(&self, name: &str) -> Option<ExpansionResult<String>> {
        for scope in self.namespace.scopes() {
            if let Some(value) = self.variables.resolve(&scope.qualify(name)) {
                return Some(value);
            }
        }
        None
    }
}

fn expansion_error(path: &SettingsPath, source: expansion_engine::Error) -> SettingsError {
    SettingsError::Expansion {
        path: path.to_string(),
        source,
    }
}

/// Writes descriptor-declared static defaults into null raw fields.
#[derive(Default)]
pub struct FieldDefaultsVisitor;

impl FieldDefaultsVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }
}

impl SettingsVisitor for FieldDefaultsVisitor {
    fn name(&self) -> &'static str {
        "field_defaults"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if let Some(default) = &descriptor.default {
            let index = node.field.unwrap_or_default();
            if cx.raw.field(node.raw, index).is_null() {
                trace!(path = %node.path, value = %default, "applying static field default");
                cx.raw
                    .set_field(node.raw, index, RawValue::Text(default.clone()));
            }
        }
        Ok(())
    }
}

/// Harvests declared `variable` elements into the variable map.
#[derive(Default)]
pub struct VariableInitVisitor;

impl VariableInitVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }
}

impl SettingsVisitor for VariableInitVisitor {
    fn name(&self) -> &'static str {
        "variable_init"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        let type_schema = cx.schema.get(&cx.raw.node(node.raw).type_name)?;
        if type_schema.role != TypeRole::Variable {
            return Ok(());
        }
        let text_of = |field: &str| -> SettingsResult<String> {
            let index = type_schema.field_index(field).ok_or_else(|| {
                SettingsError::SchemaMismatch {
                    path: node.path.to_string(),
                    reason: format!("variable type '{}' lacks a '{}' field", type_schema.name, field),
                }
            })?;
            Ok(cx
                .raw
                .field(node.raw, index)
                .as_text()
                .unwrap_or_default()
                .to_string())
        };
        let name = text_of("name")?;
        let value = text_of("value")?;

        // The bare name must be a plain word; dots are reserved for the
        // namespace qualification added below.
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(expansion_error(
                &node.path,
                expansion_engine::Error::InvalidVariableName { name },
            ));
        }
        let qualified = node.namespace.qualify(&name);
        debug!(variable = %qualified, "declaring document variable");
        cx.variables
            .insert_literal(qualified, value)
            .map_err(|source| expansion_error(&node.path, source))
    }
}

/// One raw text field whose expansion was deferred.
struct DeferredText {
    path: SettingsPath,
    namespace: Namespace,
    raw: RawId,
    index: usize,
}

fn expand_in_place(
    cx: &mut ResolveContext<'_>,
    path: &SettingsPath,
    namespace: &Namespace,
    raw: RawId,
    index: usize,
    policy: UndefinedPolicy,
) -> SettingsResult<bool> {
    let value = cx.raw.field(raw, index).clone();
    let mut any_deferred = false;
    let expanded = match value {
        RawValue::Text(text) if contains_variable_ref(&text) => {
            let source = ScopedVariables {
                variables: &cx.variables,
                namespace,
            };
            let outcome =
                expand(&text, &source, policy).map_err(|e| expansion_error(path, e))?;
            any_deferred = !outcome.deferred.is_empty();
            outcome.substituted.then(|| RawValue::Text(outcome.text))
        }
        RawValue::TextList(items) if items.iter().any(|i| contains_variable_ref(i)) => {
            let source = ScopedVariables {
                variables: &cx.variables,
                namespace,
            };
            let mut expanded = Vec::with_capacity(items.len());
            let mut substituted = false;
            for item in &items {
                let outcome =
                    expand(item, &source, policy).map_err(|e| expansion_error(path, e))?;
                any_deferred |= !outcome.deferred.is_empty();
                substituted |= outcome.substituted;
                expanded.push(outcome.text);
            }
            substituted.then(|| RawValue::TextList(expanded))
        }
        _ => None,
    };
    if let Some(value) = expanded {
        cx.raw.set_field(raw, index, value);
    }
    Ok(any_deferred)
}

/// Substitutes `${name}` references throughout the raw tree.
#[derive(Default)]
pub struct VariableExpandVisitor {
    deferred: Vec<DeferredText>,
}

impl VariableExpandVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for VariableExpandVisitor {
    fn name(&self) -> &'static str {
        "variables"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if descriptor.sealed {
            return Ok(());
        }
        let index = node.field.unwrap_or_default();
        let deferred = expand_in_place(
            cx,
            &node.path,
            &node.namespace,
            node.raw,
            index,
            UndefinedPolicy::Defer,
        )?;
        if deferred && !self.deferred.iter().any(|d| d.path == node.path) {
            self.deferred.push(DeferredText {
                path: node.path.clone(),
                namespace: node.namespace.clone(),
                raw: node.raw,
                index,
            });
        }
        Ok(())
    }

    fn finish(&mut self, cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
        let policy = if cx.policy.allow_undefined_variables {
            UndefinedPolicy::Empty
        } else {
            UndefinedPolicy::Error
        };
        for entry in self.deferred.drain(..) {
            expand_in_place(cx, &entry.path, &entry.namespace, entry.raw, entry.index, policy)?;
        }
        Ok(())
    }
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").expect("env token pattern is valid")
    })
}

fn expand_env_text(
    text: &str,
    pending: &mut Vec<String>,
    tolerate_undefined: bool,
) -> Option<String> {
    if !env_pattern().is_match(text) {
        return None;
    }
    let replaced = env_pattern().replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) if tolerate_undefined => String::new(),
            Err(_) => {
                if !pending.contains(&name.to_string()) {
                    pending.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    Some(replaced.into_owned())
}

/// One raw text field holding env tokens that did not resolve during the
/// sweep.
struct DeferredEnv {
    path: SettingsPath,
    raw: RawId,
    index: usize,
    names: Vec<String>,
}

/// Substitutes `${env:NAME}` tokens from the process environment.
#[derive(Default)]
pub struct EnvironmentVisitor {
    deferred: Vec<DeferredEnv>,
}

impl EnvironmentVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for EnvironmentVisitor {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn is_reversible(&self) -> bool {
        false
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if descriptor.sealed {
            return Ok(());
        }
        let index = node.field.unwrap_or_default();
        let mut missing = Vec::new();
        let replaced = match cx.raw.field(node.raw, index) {
            RawValue::Text(text) => expand_env_text(text, &mut missing, false).map(RawValue::Text),
            RawValue::TextList(items) => {
                let mut changed = false;
                let expanded: Vec<String> = items
                    .iter()
                    .map(|item| match expand_env_text(item, &mut missing, false) {
                        Some(text) => {
                            changed = true;
                            text
                        }
                        None => item.clone(),
                    })
                    .collect();
                changed.then_some(RawValue::TextList(expanded))
            }
            _ => None,
        };
        if let Some(value) = replaced {
            cx.raw.set_field(node.raw, index, value);
        }
        if !missing.is_empty() && !self.deferred.iter().any(|d| d.path == node.path) {
            self.deferred.push(DeferredEnv {
                path: node.path.clone(),
                raw: node.raw,
                index,
                names: missing,
            });
        }
        Ok(())
    }

    fn finish(&mut self, cx: &mut ResolveContext<'_>) -> SettingsResult<()> {
        // Only fields the sweep actually deferred are touched here, so the
        // sealed exemption enforced per field carries over to finalization.
        for entry in self.deferred.drain(..) {
            if !cx.policy.allow_undefined_variables {
                // The environment cannot gain definitions mid-call, but the
                // policy is checked here so both expansion passes share one
                // failure point.
                if let Some(name) = entry.names.iter().find(|n| std::env::var(n).is_err()) {
                    return Err(SettingsError::UndefinedEnvironmentVariable {
                        path: entry.path.to_string(),
                        name: name.clone(),
                    });
                }
            }
            let replaced = match cx.raw.field(entry.raw, entry.index) {
                RawValue::Text(text) => {
                    expand_env_text(text, &mut Vec::new(), true).map(RawValue::Text)
                }
                RawValue::TextList(items) => {
                    let mut changed = false;
                    let expanded: Vec<String> = items
                        .iter()
                        .map(|item| match expand_env_text(item, &mut Vec::new(), true) {
                            Some(text) => {
                                changed = true;
                                text
                            }
                            None => item.clone(),
                        })
                        .collect();
                    changed.then_some(RawValue::TextList(expanded))
                }
                _ => None,
            };
            if let Some(value) = replaced {
                cx.raw.set_field(entry.raw, entry.index, value);
            }
        }
        Ok(())
    }
}

/// Merges provider-sourced variables into the context's map.
///
/// Called by the resolver before the variable passes run.
pub fn install_providers(
    cx: &mut ResolveContext<'_>,
    sources: &[Box<dyn VariableProviderSource>],
) -> SettingsResult<()> {
    for provider_source in sources {
        for (name, provider) in provider_source.providers() {
            cx.variables
                .insert(name, provider)
                .map_err(|source| SettingsError::Expansion {
                    path: "<providers>".to_string(),
                    source,
                })?;
        }
    }
    Ok(())
}
