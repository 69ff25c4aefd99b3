//! Wildcard reference grammar and the reference resolution pass.
//!
//! A reference field's raw value is a wildcard expression over namespaced
//! ids:
//!
//! * comma-separated groups are a union of matches;
//! * within a group, `|` separates fallback alternatives tried left to
//!   right, the first alternative with at least one match supplying the
//!   group's matches;
//! * an atom is `<id-glob>[:<type-pattern>]`. The id glob is matched per
//!   namespace scope, most specific first, unless it starts with `.` which
//!   pins it to the global id space;
//! * a type pattern restricts matches to objects whose type (or any
//!   ancestor type) equals the pattern, or contains it as a substring when
//!   prefixed with `~`;
//! * `$` in the type pattern is replaced by the referencing field's name;
//!   in the id glob it stays literal;
//! * the literal token `null` is the explicit empty target. It never
//!   matches through a glob; only the exact token selects it.
//!
//! Glob matching treats the namespace dot as a separator, so `*` matches
//! within one namespace level and never across.

use glob::{MatchOptions, Pattern};
use tracing::trace;

use crate::context::{ResolveContext, NULL_ID};
use crate::errors::{SettingsError, SettingsResult};
use crate::path::{Namespace, SettingsPath};
use crate::refined_tree::{RefinedId, RefinedValue};
use crate::schema::FieldKind;
use crate::traversal::FlatNode;
use crate::visitor::{SettingsVisitor, SpecSubtreeSkip};

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypePattern {
    text: String,
    substring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Atom {
    id_pattern: String,
    global: bool,
    type_pattern: Option<TypePattern>,
}

impl Atom {
    fn is_null_sentinel(&self) -> bool {
        !self.global && self.type_pattern.is_none() && self.id_pattern == NULL_ID
    }
}

fn parse_atom(text: &str, field_name: &str) -> Atom {
    let (id_part, type_part) = match text.split_once(':') {
        Some((id, ty)) => (id.trim(), Some(ty.trim())),
        None => (text, None),
    };
    let (global, id_pattern) = match id_part.strip_prefix('.') {
        Some(rest) => (true, rest),
        None => (false, id_part),
    };
    let id_pattern = if id_pattern.is_empty() {
        "*".to_string()
    } else {
        id_pattern.to_string()
    };
    // The `$` shorthand is confined to the type pattern.
    let type_pattern = type_part
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('$', field_name))
        .map(|t| match t.strip_prefix('~') {
            Some(rest) => TypePattern {
                text: rest.to_string(),
                substring: true,
            },
            None => TypePattern {
                text: t,
                substring: false,
            },
        });
    Atom {
        id_pattern,
        global,
        type_pattern,
    }
}

/// Parsed wildcard: union groups of fallback alternatives.
fn parse_wildcard(text: &str, field_name: &str) -> Vec<Vec<Atom>> {
    text.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| {
            group
                .split('|')
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .map(|alt| parse_atom(alt, field_name))
                .collect()
        })
        .collect()
}

/// The outcome of matching one wildcard expression.
#[derive(Debug, Default)]
pub struct WildcardMatches {
    /// Matched namespaced ids, in registry order per group.
    pub ids: Vec<String>,
    /// The matched objects, parallel to `ids`.
    pub nodes: Vec<RefinedId>,
    /// Whether the explicit `null` token was selected.
    pub matched_null: bool,
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        // Namespace dots are separators; `*` must not cross them.
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn compile(pattern: &str, at: &SettingsPath) -> SettingsResult<Pattern> {
    Pattern::new(&pattern.replace('.', "/")).map_err(|e| SettingsError::SchemaMismatch {
        path: at.to_string(),
        reason: format!("invalid reference pattern '{}': {}", pattern, e),
    })
}

fn type_accepts(
    cx: &ResolveContext<'_>,
    pattern: &Option<TypePattern>,
    node: RefinedId,
) -> bool {
    let pattern = match pattern {
        Some(pattern) => pattern,
        None => return true,
    };
    let ancestors = cx.schema.ancestors(&cx.refined.node(node).type_name);
    if pattern.substring {
        ancestors.iter().any(|a| a.contains(&pattern.text))
    } else {
        ancestors.contains(&pattern.text.as_str())
    }
}

fn atom_matches(
    cx: &ResolveContext<'_>,
    atom: &Atom,
    namespace: &Namespace,
    at: &SettingsPath,
) -> SettingsResult<Vec<(String, RefinedId)>> {
    let scopes = if atom.global {
        vec![Namespace::global()]
    } else {
        namespace.scopes()
    };
    for scope in scopes {
        let qualified = scope.qualify(&atom.id_pattern);
        let pattern = compile(&qualified, at)?;
        let matched: Vec<(String, RefinedId)> = cx
            .ids
            .iter()
            .filter(|(id, node)| {
                // The null sentinel is unreachable through globs, and the
                // registry refuses the id outright; nothing to exclude here.
                pattern.matches_with(&id.replace('.', "/"), match_options())
                    && type_accepts(cx, &atom.type_pattern, *node)
            })
            .map(|(id, node)| (id.to_string(), node))
            .collect();
        if !matched.is_empty() {
            return Ok(matched);
        }
    }
    Ok(Vec::new())
}

/// Resolves one wildcard expression against the id registry.
pub fn resolve_wildcard(
    cx: &ResolveContext<'_>,
    wildcard: &str,
    namespace: &Namespace,
    field_name: &str,
    at: &SettingsPath,
) -> SettingsResult<WildcardMatches> {
    let mut result = WildcardMatches::default();
    for group in parse_wildcard(wildcard, field_name) {
        for atom in &group {
            if atom.is_null_sentinel() {
                result.matched_null = true;
                break;
            }
            let matched = atom_matches(cx, atom, namespace, at)?;
            if matched.is_empty() {
                continue;
            }
            for (id, node) in matched {
                if !result.nodes.contains(&node) {
                    result.ids.push(id);
                    result.nodes.push(node);
                }
            }
            break; // first alternative with matches wins the group
        }
    }
    trace!(wildcard = %wildcard, matches = result.nodes.len(), "resolved wildcard reference");
    Ok(result)
}

fn check_assignable(
    cx: &ResolveContext<'_>,
    target_id: &str,
    target: RefinedId,
    expected: &str,
    at: &SettingsPath,
) -> SettingsResult<()> {
    let actual = &cx.refined.node(target).type_name;
    if !cx.schema.is_assignable(actual, expected) {
        return Err(SettingsError::IncompatibleReference {
            path: at.to_string(),
            target_id: target_id.to_string(),
            expected_type: expected.to_string(),
            actual_type: actual.clone(),
        });
    }
    Ok(())
}

/// Resolves every reference field of the refined tree.
///
/// Wildcards inside variables, specifications, and edit commands are left
/// untouched; the defaults and overrides passes resolve those themselves.
#[derive(Default)]
pub struct ReferenceVisitor {
    spec_skip: SpecSubtreeSkip,
}

impl ReferenceVisitor {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsVisitor for ReferenceVisitor {
    fn name(&self) -> &'static str {
        "references"
    }

    fn visit_object(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        self.spec_skip.observe_object(cx, node)
    }

    fn visit_field(
        &mut self,
        cx: &mut ResolveContext<'_>,
        node: &FlatNode,
    ) -> SettingsResult<()> {
        if self.spec_skip.is_skipped(&node.path) {
            return Ok(());
        }
        let descriptor = match node.descriptor(cx)? {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if !descriptor.kind.is_reference() {
            return Ok(());
        }
        let refined = node.refined.ok_or_else(|| SettingsError::SchemaMismatch {
            path: node.path.to_string(),
            reason: "reference field has no refined twin".to_string(),
        })?;
        let index = node.field.unwrap_or_default();
        let text = match cx.refined.field(refined, index) {
            RefinedValue::UnresolvedRef(text) => text.clone(),
            _ => return Ok(()),
        };
        let matches = resolve_wildcard(cx, &text, &node.namespace, &descriptor.name, &node.path)?;
        let expected = descriptor.type_name.as_deref().unwrap_or_default();

        let resolved = match descriptor.kind {
            FieldKind::Reference => match matches.nodes.as_slice() {
                [] if matches.matched_null || descriptor.weak => RefinedValue::Ref(None),
                [] => {
                    return Err(SettingsError::UnresolvedReference {
                        path: node.path.to_string(),
                        wildcard: text,
                    })
                }
                [target] => {
                    check_assignable(cx, &matches.ids[0], *target, expected, &node.path)?;
                    RefinedValue::Ref(Some(*target))
                }
                _ => {
                    return Err(SettingsError::AmbiguousReference {
                        path: node.path.to_string(),
                        wildcard: text,
                        matches: matches.ids,
                    })
                }
            },
            FieldKind::ReferenceList => {
                if matches.nodes.is_empty()
                    && !matches.matched_null
                    && !descriptor.weak
                    && !text.trim().is_empty()
                {
                    return Err(SettingsError::UnresolvedReference {
                        path: node.path.to_string(),
                        wildcard: text,
                    });
                }
                for (id, target) in matches.ids.iter().zip(matches.nodes.iter()) {
                    check_assignable(cx, id, *target, expected, &node.path)?;
                }
                RefinedValue::RefList(matches.nodes)
            }
            _ => unreachable!("only reference kinds reach resolution"),
        };
        cx.refined.set_field(refined, index, resolved);
        Ok(())
    }
}
