// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Path resolution against the live model.
//!
//! All string-addressed lookups go through [`resolve`]: it never panics, has no side effects and
//! reports malformed, absent, ambiguous and wrong-kind paths as typed errors.

use std::fmt;

use super::flowsheet::{ComponentRef, Flowsheet};
use super::ids::{ConstraintId, VarId};
use super::path::{ComponentPath, PathError};

const MAX_CANDIDATES: usize = 10;
const MAX_SUGGESTIONS: usize = 3;
const SUGGESTION_MIN_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Variable,
    Constraint,
    Block,
    Any,
}

impl ComponentKind {
    pub fn of(component: ComponentRef) -> Self {
        match component {
            ComponentRef::Variable(_) => Self::Variable,
            ComponentRef::Constraint(_) => Self::Constraint,
            ComponentRef::Block(_) => Self::Block,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Constraint => "constraint",
            Self::Block => "block",
            Self::Any => "any",
        }
    }

    fn accepts(self, component: ComponentRef) -> bool {
        self == Self::Any || self == Self::of(component)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    Malformed { path: String, source: PathError },
    NotFound { path: String, suggestions: Vec<String> },
    Ambiguous { path: String, candidates: Vec<String> },
    WrongKind { path: String, expected: ComponentKind, found: ComponentKind },
}

impl ResolveError {
    pub fn path(&self) -> &str {
        match self {
            Self::Malformed { path, .. }
            | Self::NotFound { path, .. }
            | Self::Ambiguous { path, .. }
            | Self::WrongKind { path, .. } => path,
        }
    }

    /// Malformed and absent paths are both "not found" from the caller's point of view.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::NotFound { .. })
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { path, source } => write!(f, "malformed path '{path}': {source}"),
            Self::NotFound { path, suggestions } if suggestions.is_empty() => {
                write!(f, "component '{path}' not found")
            }
            Self::NotFound { path, suggestions } => write!(
                f,
                "component '{path}' not found (did you mean: {})",
                suggestions.join(", ")
            ),
            Self::Ambiguous { path, candidates } => write!(
                f,
                "path '{path}' is ambiguous ({} indexed elements, e.g. {})",
                candidates.len(),
                candidates.first().map(String::as_str).unwrap_or("")
            ),
            Self::WrongKind { path, expected, found } => write!(
                f,
                "'{path}' is a {}, expected a {}",
                found.label(),
                expected.label()
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Maps a caller-supplied path to a live component handle.
///
/// A leading root alias (`m.`) is optional. An unindexed path that names an indexed component
/// resolves to its single element, or fails as ambiguous when there are several.
pub fn resolve(
    model: &Flowsheet,
    raw: &str,
    kind: ComponentKind,
) -> Result<ComponentRef, ResolveError> {
    let parsed = raw
        .parse::<ComponentPath>()
        .map_err(|source| ResolveError::Malformed { path: raw.to_owned(), source })?;

    let mut candidates = vec![parsed.clone()];
    if let Some(stripped) = parsed.strip_root(model.root_alias()) {
        candidates.push(stripped);
    }

    for candidate in &candidates {
        if let Some(component) = model.lookup(candidate) {
            return check_kind(raw, component, kind);
        }
    }

    for candidate in &candidates {
        if candidate.last().is_indexed() {
            continue;
        }
        let elements = model.elements_of(candidate);
        match elements.as_slice() {
            [] => continue,
            [(_, component)] => return check_kind(raw, *component, kind),
            many => {
                return Err(ResolveError::Ambiguous {
                    path: raw.to_owned(),
                    candidates: many
                        .iter()
                        .take(MAX_CANDIDATES)
                        .map(|(path, _)| path.to_string())
                        .collect(),
                })
            }
        }
    }

    let wanted = candidates.last().map(ToString::to_string).unwrap_or_default();
    Err(ResolveError::NotFound { path: raw.to_owned(), suggestions: suggest(model, &wanted) })
}

pub fn resolve_variable(model: &Flowsheet, raw: &str) -> Result<VarId, ResolveError> {
    match resolve(model, raw, ComponentKind::Variable)? {
        ComponentRef::Variable(id) => Ok(id),
        other => Err(wrong_kind(raw, ComponentKind::Variable, other)),
    }
}

pub fn resolve_constraint(model: &Flowsheet, raw: &str) -> Result<ConstraintId, ResolveError> {
    match resolve(model, raw, ComponentKind::Constraint)? {
        ComponentRef::Constraint(id) => Ok(id),
        other => Err(wrong_kind(raw, ComponentKind::Constraint, other)),
    }
}

fn check_kind(
    raw: &str,
    component: ComponentRef,
    kind: ComponentKind,
) -> Result<ComponentRef, ResolveError> {
    if kind.accepts(component) {
        Ok(component)
    } else {
        Err(wrong_kind(raw, kind, component))
    }
}

fn wrong_kind(raw: &str, expected: ComponentKind, found: ComponentRef) -> ResolveError {
    ResolveError::WrongKind { path: raw.to_owned(), expected, found: ComponentKind::of(found) }
}

fn suggest(model: &Flowsheet, wanted: &str) -> Vec<String> {
    if wanted.is_empty() {
        return Vec::new();
    }
    let mut scored = model
        .component_paths()
        .map(|path| {
            let rendered = path.to_string();
            let ratio = rapidfuzz::fuzz::ratio(wanted.chars(), rendered.chars());
            (ratio, rendered)
        })
        .filter(|(ratio, _)| *ratio >= SUGGESTION_MIN_RATIO)
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expr, VariableSpec};

    fn model() -> Flowsheet {
        let mut model = Flowsheet::default();
        let flow = model.add_variable("fs.valve.flow_mol[0.0]", VariableSpec::fixed(10.0)).unwrap();
        model.add_variable("fs.valve.valve_opening", VariableSpec::fixed(0.5)).unwrap();
        model.add_variable("fs.sep.split[0.0,a]", VariableSpec::free(0.5)).unwrap();
        model.add_variable("fs.sep.split[0.0,b]", VariableSpec::free(0.5)).unwrap();
        model.add_equality("fs.valve.balance[0.0]", Expr::var(flow)).unwrap();
        model
    }

    #[test]
    fn resolves_exact_and_root_prefixed_paths_identically() {
        let model = model();
        let plain = resolve(&model, "fs.valve.valve_opening", ComponentKind::Any).unwrap();
        let prefixed = resolve(&model, "m.fs.valve.valve_opening", ComponentKind::Any).unwrap();
        assert_eq!(plain, prefixed);
        assert!(matches!(plain, ComponentRef::Variable(_)));
    }

    #[test]
    fn unindexed_path_resolves_single_element_and_flags_ambiguity() {
        let model = model();
        let flow = resolve_variable(&model, "fs.valve.flow_mol").unwrap();
        assert_eq!(model.variable(flow).path().to_string(), "fs.valve.flow_mol[0.0]");
        assert_eq!(resolve_variable(&model, "fs.valve.flow_mol[0]").unwrap(), flow);

        let err = resolve_variable(&model, "fs.sep.split").unwrap_err();
        let ResolveError::Ambiguous { candidates, .. } = err else {
            panic!("expected ambiguity, got {err:?}");
        };
        assert_eq!(candidates, vec!["fs.sep.split[0.0,a]", "fs.sep.split[0.0,b]"]);
    }

    #[test]
    fn reports_missing_malformed_and_wrong_kind() {
        let model = model();

        let err = resolve_variable(&model, "fs.valve.valve_openin").unwrap_err();
        assert!(err.is_not_found());
        let ResolveError::NotFound { suggestions, .. } = &err else {
            panic!("expected not found");
        };
        assert_eq!(suggestions.first().map(String::as_str), Some("fs.valve.valve_opening"));

        let err = resolve(&model, "fs.valve[", ComponentKind::Any).unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));
        assert!(err.is_not_found());

        let err = resolve_constraint(&model, "fs.valve.valve_opening").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::WrongKind {
                expected: ComponentKind::Constraint,
                found: ComponentKind::Variable,
                ..
            }
        ));
        assert!(!err.is_not_found());
    }

    #[test]
    fn resolves_blocks_for_any_kind() {
        let model = model();
        let block = resolve(&model, "m.fs.valve", ComponentKind::Any).unwrap();
        assert!(matches!(block, ComponentRef::Block(_)));
    }
}
