// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Structural and numerical model diagnostics.
//!
//! Structural checks only need the equation/variable graph. Numerical checks read current values
//! and are only meaningful once a solve has left a (partial) solution in the model; they still run
//! before that, the caller decides the sequencing.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::model::jacobian::{self, Jacobian};
use crate::model::{ConstraintId, Flowsheet, VarId};

mod kinds;
mod partition;

pub use kinds::{DisplayKind, DisplayKindError};
pub use partition::{partition, Partition};

const RULE_WIDTH: usize = 84;

#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub residual: f64,
    pub bounds_absolute: f64,
    pub bounds_relative: f64,
    pub bounds_violation: f64,
    pub extreme_large: f64,
    pub extreme_small: f64,
    pub zero: f64,
    pub jacobian_large_warning: f64,
    pub jacobian_small_warning: f64,
    pub jacobian_large_caution: f64,
    pub jacobian_small_caution: f64,
    /// Maximum `1 - |cos|` between two Jacobian rows/columns considered parallel.
    pub parallel: f64,
    /// A sum whose magnitude is below this fraction of its largest term is canceling.
    pub cancellation: f64,
    /// Largest-to-smallest term magnitude ratio considered mismatched.
    pub mismatch: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            residual: 1e-5,
            bounds_absolute: 1e-4,
            bounds_relative: 1e-4,
            bounds_violation: 0.0,
            extreme_large: 1e4,
            extreme_small: 1e-4,
            zero: 1e-8,
            jacobian_large_warning: 1e8,
            jacobian_small_warning: 1e-8,
            jacobian_large_caution: 1e4,
            jacobian_small_caution: 1e-4,
            parallel: 1e-8,
            cancellation: 1e-4,
            mismatch: 1e6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub path: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayReport {
    pub kind: DisplayKind,
    pub findings: Vec<Finding>,
    /// Set when the check itself could not run (e.g. the Jacobian is not evaluable).
    pub error: Option<String>,
}

impl DisplayReport {
    pub fn render(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(text, "{} ({}):", title_of(self.kind), self.findings.len());
        text.push('\n');
        if let Some(error) = &self.error {
            let _ = writeln!(text, "    check failed: {error}");
        } else if self.findings.is_empty() {
            text.push_str("    None\n");
        }
        for finding in &self.findings {
            let _ = writeln!(text, "    {}: {}", finding.path, finding.detail);
        }
        text.push('\n');
        text.push_str(&"=".repeat(RULE_WIDTH));
        text
    }
}

fn title_of(kind: DisplayKind) -> &'static str {
    match kind {
        DisplayKind::LargeResiduals => "Constraints with large residuals",
        DisplayKind::CancelingTerms => "Constraints with canceling terms",
        DisplayKind::MismatchedTerms => "Constraints with mismatched terms",
        DisplayKind::InconsistentUnits => "Components with inconsistent units",
        DisplayKind::PotentialEvaluationErrors => "Constraints with potential evaluation errors",
        DisplayKind::ExternalVariables => "Variables in deactivated blocks used by active constraints",
        DisplayKind::UnusedVariables => "Variables not appearing in any active constraint",
        DisplayKind::NoFreeVariables => "Active constraints with no free variables",
        DisplayKind::NearParallelConstraints => "Near-parallel constraints",
        DisplayKind::NearParallelVariables => "Near-parallel variables",
        DisplayKind::VariablesAtBounds => "Variables at or outside bounds",
        DisplayKind::VariablesNearBounds => "Variables near bounds",
        DisplayKind::VariablesFixedToZero => "Variables fixed to zero",
        DisplayKind::VariablesExtremeValues => "Variables with extreme values",
        DisplayKind::VariablesNoneValue => "Variables with no value",
        DisplayKind::VariablesNearZero => "Variables near zero",
        DisplayKind::ExtremeJacobianConstraints => "Constraints with extreme Jacobian rows",
        DisplayKind::ExtremeJacobianVariables => "Variables with extreme Jacobian columns",
        DisplayKind::ExtremeJacobianEntries => "Extreme Jacobian entries",
    }
}

/// A rendered diagnostics report: statistics, warnings, cautions and suggested next steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub statistics: Vec<String>,
    pub warnings: Vec<String>,
    pub cautions: Vec<String>,
    pub next_steps: Vec<String>,
}

impl Report {
    pub fn headline(&self) -> String {
        format!("{} WARNINGS, {} Cautions", self.warnings.len(), self.cautions.len())
    }

    pub fn render(&self, title: &str) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let thin = "-".repeat(RULE_WIDTH);
        let mut text = String::new();
        let _ = writeln!(text, "{rule}\n{title}\n");
        for line in &self.statistics {
            let _ = writeln!(text, "    {line}");
        }
        let _ = writeln!(text, "\n{thin}\n{} WARNINGS\n", self.warnings.len());
        if self.warnings.is_empty() {
            text.push_str("    No warnings found!\n");
        }
        for line in &self.warnings {
            let _ = writeln!(text, "    WARNING: {line}");
        }
        let _ = writeln!(text, "\n{thin}\n{} Cautions\n", self.cautions.len());
        if self.cautions.is_empty() {
            text.push_str("    No cautions found!\n");
        }
        for line in &self.cautions {
            let _ = writeln!(text, "    Caution: {line}");
        }
        let _ = writeln!(text, "\n{thin}\nSuggested next steps:\n");
        if self.next_steps.is_empty() {
            text.push_str("    No next steps suggested.\n");
        }
        for line in &self.next_steps {
            let _ = writeln!(text, "    {line}");
        }
        text.push('\n');
        text.push_str(&rule);
        text
    }
}

/// Read-only analysis over the live model.
pub struct Toolbox<'a> {
    model: &'a Flowsheet,
    thresholds: Thresholds,
}

impl<'a> Toolbox<'a> {
    pub fn new(model: &'a Flowsheet, thresholds: Thresholds) -> Self {
        Self { model, thresholds }
    }

    pub fn display(&self, kind: DisplayKind) -> DisplayReport {
        let findings = match kind {
            DisplayKind::LargeResiduals => Ok(self.large_residuals()),
            DisplayKind::CancelingTerms => Ok(self.canceling_terms()),
            DisplayKind::MismatchedTerms => Ok(self.mismatched_terms()),
            DisplayKind::InconsistentUnits => Ok(self.inconsistent_units()),
            DisplayKind::PotentialEvaluationErrors => Ok(self.potential_evaluation_errors()),
            DisplayKind::ExternalVariables => Ok(self.external_variables()),
            DisplayKind::UnusedVariables => Ok(self.unused_variables()),
            DisplayKind::NoFreeVariables => Ok(self.no_free_variables()),
            DisplayKind::NearParallelConstraints => self.near_parallel_constraints(),
            DisplayKind::NearParallelVariables => self.near_parallel_variables(),
            DisplayKind::VariablesAtBounds => Ok(self.variables_at_bounds()),
            DisplayKind::VariablesNearBounds => Ok(self.variables_near_bounds()),
            DisplayKind::VariablesFixedToZero => Ok(self.variables_fixed_to_zero()),
            DisplayKind::VariablesExtremeValues => Ok(self.variables_extreme_values()),
            DisplayKind::VariablesNoneValue => Ok(self.variables_none_value()),
            DisplayKind::VariablesNearZero => Ok(self.variables_near_zero()),
            DisplayKind::ExtremeJacobianConstraints => self.extreme_jacobian_constraints(),
            DisplayKind::ExtremeJacobianVariables => self.extreme_jacobian_variables(),
            DisplayKind::ExtremeJacobianEntries => self.extreme_jacobian_entries(),
        };
        match findings {
            Ok(findings) => DisplayReport { kind, findings, error: None },
            Err(id) => DisplayReport {
                kind,
                findings: Vec::new(),
                error: Some(self.unevaluable(id)),
            },
        }
    }

    pub fn partition(&self) -> Partition {
        partition(self.model)
    }

    pub fn structural_report(&self) -> Report {
        let model = self.model;
        let used = self.variables_in_active_constraints();
        let (fixed, free): (Vec<VarId>, Vec<VarId>) =
            used.iter().copied().partition(|id| model.variable(*id).is_fixed());
        let external = |ids: &[VarId]| {
            ids.iter().filter(|id| model.is_variable_in_inactive_block(**id)).count()
        };
        let bounded = |lower: bool, upper: bool| {
            free.iter()
                .filter(|id| {
                    let variable = model.variable(**id);
                    variable.lower().is_some() == lower && variable.upper().is_some() == upper
                })
                .count()
        };

        let active_blocks = model.block_ids().filter(|id| model.is_block_active(*id)).count();
        let active = model.active_constraints();
        let equalities = active.iter().filter(|id| model.constraint(**id).is_equality()).count();
        let all_equalities =
            model.constraint_ids().filter(|id| model.constraint(*id).is_equality()).count();

        let mut report = Report {
            statistics: vec![
                format!(
                    "Activated Blocks: {active_blocks} (Deactivated: {})",
                    model.block_count() - active_blocks
                ),
                format!(
                    "Free Variables in Activated Constraints: {} (External: {})",
                    free.len(),
                    external(&free)
                ),
                format!("    Free Variables with only lower bounds: {}", bounded(true, false)),
                format!("    Free Variables with only upper bounds: {}", bounded(false, true)),
                format!("    Free Variables with upper and lower bounds: {}", bounded(true, true)),
                format!(
                    "Fixed Variables in Activated Constraints: {} (External: {})",
                    fixed.len(),
                    external(&fixed)
                ),
                format!(
                    "Activated Equality Constraints: {equalities} (Deactivated: {})",
                    all_equalities - equalities
                ),
                format!(
                    "Activated Inequality Constraints: {} (Deactivated: {})",
                    active.len() - equalities,
                    (model.constraint_count() - all_equalities) - (active.len() - equalities)
                ),
            ],
            ..Report::default()
        };

        let dof = model.degrees_of_freedom();
        if dof != 0 {
            report.warnings.push(format!("{dof} Degrees of Freedom"));
        }
        let units = self.inconsistent_units().len();
        if units > 0 {
            report.warnings.push(format!("{units} Component(s) with inconsistent units"));
        }
        let partition = self.partition();
        if !partition.is_structurally_sound() {
            report.warnings.push(format!(
                "Structural singularity found (Under-Constrained Set: {} variables, {} \
                 constraints; Over-Constrained Set: {} variables, {} constraints)",
                partition.under_variables.len(),
                partition.under_constraints.len(),
                partition.over_variables.len(),
                partition.over_constraints.len()
            ));
        }

        let evaluation = self.potential_evaluation_errors().len();
        if evaluation > 0 {
            report.cautions.push(format!("{evaluation} potential evaluation error(s)"));
        }
        let unused = self.unused_variables();
        if !unused.is_empty() {
            let unused_fixed = unused.iter().filter(|finding| finding.detail == "fixed").count();
            report.cautions.push(format!(
                "{} unused variable(s) ({unused_fixed} fixed)",
                unused.len()
            ));
        }
        let external = self.external_variables().len();
        if external > 0 {
            report
                .cautions
                .push(format!("{external} variable(s) in deactivated blocks used by active constraints"));
        }
        let no_free = self.no_free_variables().len();
        if no_free > 0 {
            report.cautions.push(format!("{no_free} active constraint(s) with no free variables"));
        }

        if dof != 0 || !partition.is_structurally_sound() {
            report.next_steps.push(
                "Review which variables are fixed: diagnostics.partition lists the under- and \
                 over-constrained sets"
                    .to_owned(),
            );
        }
        if units > 0 {
            report.next_steps.push(display_hint(DisplayKind::InconsistentUnits));
        }
        if report.warnings.is_empty() {
            report
                .next_steps
                .push("Try to solve the model, then run the numerical diagnostics".to_owned());
        }
        report
    }

    pub fn numerical_report(&self) -> Report {
        let mut report = Report::default();

        match self.jacobian() {
            Ok(jacobian) => report.statistics.push(condition_number(&jacobian)),
            Err(id) => report.warnings.push(self.unevaluable(id)),
        }

        let checks: [(DisplayKind, bool, &str); 14] = [
            (DisplayKind::LargeResiduals, true, "Constraint(s) with large residuals"),
            (DisplayKind::VariablesAtBounds, true, "Variable(s) at or outside bounds"),
            (DisplayKind::ExtremeJacobianVariables, true, "Variable(s) with extreme Jacobian values"),
            (DisplayKind::ExtremeJacobianConstraints, true, "Constraint(s) with extreme Jacobian values"),
            (DisplayKind::NearParallelConstraints, true, "pair(s) of near-parallel constraints"),
            (DisplayKind::NearParallelVariables, true, "pair(s) of near-parallel variables"),
            (DisplayKind::VariablesNoneValue, false, "Variable(s) with None value"),
            (DisplayKind::VariablesNearZero, false, "Variable(s) with value close to zero"),
            (DisplayKind::VariablesExtremeValues, false, "Variable(s) with extreme values"),
            (DisplayKind::VariablesNearBounds, false, "Variable(s) close to their bounds"),
            (DisplayKind::VariablesFixedToZero, false, "Variable(s) fixed to zero"),
            (DisplayKind::ExtremeJacobianEntries, false, "extreme Jacobian entries"),
            (DisplayKind::CancelingTerms, false, "Constraint(s) with canceling terms"),
            (DisplayKind::MismatchedTerms, false, "Constraint(s) with mismatched terms"),
        ];
        for (kind, warning, label) in checks {
            let display = self.display(kind);
            if display.error.is_some() || display.findings.is_empty() {
                continue;
            }
            let line = format!("{} {label}", display.findings.len());
            if warning {
                report.warnings.push(line);
                report.next_steps.push(display_hint(kind));
            } else {
                report.cautions.push(line);
            }
        }
        if report.warnings.is_empty() {
            report.next_steps.push("No numerical warnings; review cautions if any".to_owned());
        }
        report
    }

    fn variables_in_active_constraints(&self) -> BTreeSet<VarId> {
        self.model
            .active_constraints()
            .into_iter()
            .flat_map(|id| self.model.constraint(id).variables().to_vec())
            .collect()
    }

    /// Jacobian of all active constraints over their unfixed variables.
    fn jacobian(&self) -> Result<Jacobian, ConstraintId> {
        let rows = self.model.active_constraints();
        let cols = self
            .variables_in_active_constraints()
            .into_iter()
            .filter(|id| !self.model.variable(*id).is_fixed())
            .collect::<Vec<_>>();
        jacobian::at_current_point(self.model, &rows, &cols)
    }

    fn unevaluable(&self, id: ConstraintId) -> String {
        format!(
            "Jacobian could not be evaluated: constraint '{}' is undefined at the current point",
            self.model.constraint(id).path()
        )
    }

    fn constraint_finding(&self, id: ConstraintId, detail: String) -> Finding {
        Finding { path: self.model.constraint(id).path().to_string(), detail }
    }

    fn variable_finding(&self, id: VarId, detail: String) -> Finding {
        Finding { path: self.model.variable(id).path().to_string(), detail }
    }
}

fn display_hint(kind: DisplayKind) -> String {
    format!("diagnostics.display kind={kind}")
}

fn condition_number(jacobian: &Jacobian) -> String {
    if jacobian.matrix.is_empty() {
        return "Jacobian Condition Number: Undefined (empty Jacobian)".to_owned();
    }
    let singular = jacobian.matrix.clone().singular_values();
    let largest = singular.max();
    let smallest = singular.min();
    if smallest <= 0.0 {
        "Jacobian Condition Number: Undefined (Jacobian is singular)".to_owned()
    } else {
        format!("Jacobian Condition Number: {:.3e}", largest / smallest)
    }
}

#[cfg(test)]
mod tests;
