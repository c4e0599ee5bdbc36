// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistent mutation batches.
//!
//! A batch is applied category by category in a fixed order (unfix, fix, activate, deactivate,
//! bounds). Items fail independently: a missing path or a rejected value is recorded against that
//! item and the rest of the batch, including later categories, is still attempted. There is no
//! rollback.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{
    resolve, resolve_variable, ComponentKind, ComponentRef, Flowsheet, ResolveError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Unfix,
    Fix,
    Activate,
    Deactivate,
    Bounds,
}

impl Category {
    pub const ORDER: [Category; 5] =
        [Self::Unfix, Self::Fix, Self::Activate, Self::Deactivate, Self::Bounds];

    pub fn label(self) -> &'static str {
        match self {
            Self::Unfix => "unfix",
            Self::Fix => "fix",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Bounds => "bounds",
        }
    }
}

/// New bounds for a variable; a `None` side is left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundsChange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub unfix: Vec<String>,
    pub fix: BTreeMap<String, f64>,
    pub activate: Vec<String>,
    pub deactivate: Vec<String>,
    pub bounds: BTreeMap<String, BoundsChange>,
}

impl MutationBatch {
    pub fn unfix<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { unfix: paths.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.unfix.is_empty()
            && self.fix.is_empty()
            && self.activate.is_empty()
            && self.deactivate.is_empty()
            && self.bounds.is_empty()
    }

    /// Checks request shape only; nothing here looks at the model.
    pub fn validate(&self) -> Result<(), BatchError> {
        for (path, change) in &self.bounds {
            if change.lower.is_none() && change.upper.is_none() {
                return Err(BatchError::EmptyBounds { path: path.clone() });
            }
        }
        Ok(())
    }
}

/// Whole-batch rejection: nothing was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    EmptyBounds { path: String },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBounds { path } => {
                write!(f, "bounds for '{path}' must set at least one of lower/upper")
            }
        }
    }
}

impl std::error::Error for BatchError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryOutcome {
    pub applied: Vec<String>,
    pub not_found: Vec<String>,
    /// Per-path failure message for items that resolved badly or were refused by the model.
    pub errors: BTreeMap<String, String>,
}

impl CategoryOutcome {
    pub fn is_clean(&self) -> bool {
        self.not_found.is_empty() && self.errors.is_empty()
    }

    fn record_applied(&mut self, category: Category, path: &str) {
        tracing::debug!(category = category.label(), path, "mutation applied");
        self.applied.push(path.to_owned());
    }

    fn record_resolve_error(&mut self, category: Category, err: ResolveError) {
        tracing::warn!(category = category.label(), path = err.path(), error = %err, "mutation skipped");
        let path = err.path().to_owned();
        if err.is_not_found() {
            self.not_found.push(path);
        } else {
            self.errors.insert(path, err.to_string());
        }
    }

    fn record_rejected(&mut self, category: Category, path: &str, message: String) {
        tracing::warn!(category = category.label(), path, error = %message, "mutation rejected");
        self.errors.insert(path.to_owned(), message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Every item was applied.
    Applied,
    /// Some items were not found or rejected; the others remain in effect.
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub unfix: CategoryOutcome,
    pub fix: CategoryOutcome,
    pub activate: CategoryOutcome,
    pub deactivate: CategoryOutcome,
    pub bounds: CategoryOutcome,
    /// Degrees of freedom of the post-mutation state.
    pub dof: i64,
}

impl ApplyOutcome {
    pub fn category(&self, category: Category) -> &CategoryOutcome {
        match category {
            Category::Unfix => &self.unfix,
            Category::Fix => &self.fix,
            Category::Activate => &self.activate,
            Category::Deactivate => &self.deactivate,
            Category::Bounds => &self.bounds,
        }
    }

    pub fn status(&self) -> ApplyStatus {
        if Category::ORDER.iter().all(|category| self.category(*category).is_clean()) {
            ApplyStatus::Applied
        } else {
            ApplyStatus::Partial
        }
    }

    pub fn applied_count(&self) -> usize {
        Category::ORDER.iter().map(|category| self.category(*category).applied.len()).sum()
    }
}

pub fn apply(model: &mut Flowsheet, batch: &MutationBatch) -> Result<ApplyOutcome, BatchError> {
    batch.validate()?;

    let mut outcome = ApplyOutcome::default();

    for path in &batch.unfix {
        match resolve_variable(model, path) {
            Ok(id) => {
                model.unfix(id);
                outcome.unfix.record_applied(Category::Unfix, path);
            }
            Err(err) => outcome.unfix.record_resolve_error(Category::Unfix, err),
        }
    }

    for (path, value) in &batch.fix {
        match resolve_variable(model, path) {
            Ok(id) => match model.fix(id, Some(*value)) {
                Ok(()) => outcome.fix.record_applied(Category::Fix, path),
                Err(err) => outcome.fix.record_rejected(Category::Fix, path, err.to_string()),
            },
            Err(err) => outcome.fix.record_resolve_error(Category::Fix, err),
        }
    }

    for path in &batch.activate {
        set_active(model, path, true, Category::Activate, &mut outcome.activate);
    }
    for path in &batch.deactivate {
        set_active(model, path, false, Category::Deactivate, &mut outcome.deactivate);
    }

    for (path, change) in &batch.bounds {
        match resolve_variable(model, path) {
            Ok(id) => match model.set_bounds(id, change.lower, change.upper) {
                Ok(()) => outcome.bounds.record_applied(Category::Bounds, path),
                Err(err) => outcome.bounds.record_rejected(Category::Bounds, path, err.to_string()),
            },
            Err(err) => outcome.bounds.record_resolve_error(Category::Bounds, err),
        }
    }

    outcome.dof = model.degrees_of_freedom();
    tracing::info!(
        applied = outcome.applied_count(),
        status = ?outcome.status(),
        dof = outcome.dof,
        "mutation batch applied"
    );
    Ok(outcome)
}

/// Constraints and blocks can be (de)activated; variables cannot.
fn set_active(
    model: &mut Flowsheet,
    path: &str,
    active: bool,
    category: Category,
    outcome: &mut CategoryOutcome,
) {
    match resolve(model, path, ComponentKind::Any) {
        Ok(ComponentRef::Constraint(id)) => {
            model.set_constraint_active(id, active);
            outcome.record_applied(category, path);
        }
        Ok(ComponentRef::Block(id)) => {
            model.set_block_active(id, active);
            outcome.record_applied(category, path);
        }
        Ok(ComponentRef::Variable(_)) => outcome.record_rejected(
            category,
            path,
            format!("'{path}' is a variable; only constraints and blocks can be {}d", category.label()),
        ),
        Err(err) => outcome.record_resolve_error(category, err),
    }
}

#[cfg(test)]
mod tests;
