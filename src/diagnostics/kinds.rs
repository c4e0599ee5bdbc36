// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::model::{ConstraintId, Expr, Flowsheet, VarId};

use super::{Finding, Toolbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DisplayKind {
    LargeResiduals,
    CancelingTerms,
    MismatchedTerms,
    InconsistentUnits,
    PotentialEvaluationErrors,
    ExternalVariables,
    UnusedVariables,
    NoFreeVariables,
    NearParallelConstraints,
    NearParallelVariables,
    VariablesAtBounds,
    VariablesNearBounds,
    VariablesFixedToZero,
    VariablesExtremeValues,
    VariablesNoneValue,
    VariablesNearZero,
    ExtremeJacobianConstraints,
    ExtremeJacobianVariables,
    ExtremeJacobianEntries,
}

impl DisplayKind {
    pub const ALL: [DisplayKind; 19] = [
        Self::LargeResiduals,
        Self::CancelingTerms,
        Self::MismatchedTerms,
        Self::InconsistentUnits,
        Self::PotentialEvaluationErrors,
        Self::ExternalVariables,
        Self::UnusedVariables,
        Self::NoFreeVariables,
        Self::NearParallelConstraints,
        Self::NearParallelVariables,
        Self::VariablesAtBounds,
        Self::VariablesNearBounds,
        Self::VariablesFixedToZero,
        Self::VariablesExtremeValues,
        Self::VariablesNoneValue,
        Self::VariablesNearZero,
        Self::ExtremeJacobianConstraints,
        Self::ExtremeJacobianVariables,
        Self::ExtremeJacobianEntries,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LargeResiduals => "large_residuals",
            Self::CancelingTerms => "canceling_terms",
            Self::MismatchedTerms => "mismatched_terms",
            Self::InconsistentUnits => "inconsistent_units",
            Self::PotentialEvaluationErrors => "potential_evaluation_errors",
            Self::ExternalVariables => "external_variables",
            Self::UnusedVariables => "unused_variables",
            Self::NoFreeVariables => "no_free_variables",
            Self::NearParallelConstraints => "near_parallel_constraints",
            Self::NearParallelVariables => "near_parallel_variables",
            Self::VariablesAtBounds => "variables_at_bounds",
            Self::VariablesNearBounds => "variables_near_bounds",
            Self::VariablesFixedToZero => "variables_fixed_to_zero",
            Self::VariablesExtremeValues => "variables_extreme_values",
            Self::VariablesNoneValue => "variables_none_value",
            Self::VariablesNearZero => "variables_near_zero",
            Self::ExtremeJacobianConstraints => "extreme_jacobian_constraints",
            Self::ExtremeJacobianVariables => "extreme_jacobian_variables",
            Self::ExtremeJacobianEntries => "extreme_jacobian_entries",
        }
    }

    /// Whether the check reads current values (and so depends on a prior solve).
    pub fn is_numerical(self) -> bool {
        !matches!(
            self,
            Self::InconsistentUnits
                | Self::PotentialEvaluationErrors
                | Self::ExternalVariables
                | Self::UnusedVariables
                | Self::NoFreeVariables
        )
    }
}

impl fmt::Display for DisplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayKindError {
    pub kind: String,
}

impl fmt::Display for DisplayKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown display kind '{}'", self.kind)
    }
}

impl std::error::Error for DisplayKindError {}

impl FromStr for DisplayKind {
    type Err = DisplayKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| DisplayKindError { kind: s.to_owned() })
    }
}

fn fmt_value(value: f64) -> String {
    format!("{value:.5e}")
}

impl Toolbox<'_> {
    pub(super) fn large_residuals(&self) -> Vec<Finding> {
        self.model
            .active_constraints()
            .into_iter()
            .filter_map(|id| {
                let residual = self.model.residual(id)?;
                (residual > self.thresholds.residual)
                    .then(|| self.constraint_finding(id, format!("residual {}", fmt_value(residual))))
            })
            .collect()
    }

    /// Sum sub-expressions whose terms nearly cancel. The top-level sum of an equality is expected
    /// to cancel at a solution and is skipped.
    pub(super) fn canceling_terms(&self) -> Vec<Finding> {
        let value_of = |var: VarId| self.model.value(var);
        let mut findings = Vec::new();
        for id in self.model.active_constraints() {
            let constraint = self.model.constraint(id);
            let mut at_root = true;
            let mut hit = None;
            constraint.body().visit(&mut |node| {
                let is_root = std::mem::replace(&mut at_root, false);
                if hit.is_some() || (is_root && constraint.is_equality()) {
                    return;
                }
                let Some(values) = term_values(node, &value_of) else {
                    return;
                };
                let largest = values.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
                let sum = values.iter().sum::<f64>();
                if largest > self.thresholds.zero
                    && sum.abs() <= self.thresholds.cancellation * largest
                {
                    hit = Some(format!(
                        "{} terms of magnitude up to {} sum to {}",
                        values.len(),
                        fmt_value(largest),
                        fmt_value(sum)
                    ));
                }
            });
            if let Some(detail) = hit {
                findings.push(self.constraint_finding(id, detail));
            }
        }
        findings
    }

    pub(super) fn mismatched_terms(&self) -> Vec<Finding> {
        let value_of = |var: VarId| self.model.value(var);
        let mut findings = Vec::new();
        for id in self.model.active_constraints() {
            let mut hit = None;
            self.model.constraint(id).body().visit(&mut |node| {
                if hit.is_some() {
                    return;
                }
                let Some(values) = term_values(node, &value_of) else {
                    return;
                };
                let magnitudes = values
                    .iter()
                    .map(|value| value.abs())
                    .filter(|value| *value > self.thresholds.zero)
                    .collect::<Vec<_>>();
                let largest = magnitudes.iter().copied().fold(f64::MIN, f64::max);
                let smallest = magnitudes.iter().copied().fold(f64::MAX, f64::min);
                if magnitudes.len() >= 2 && largest / smallest > self.thresholds.mismatch {
                    hit = Some(format!(
                        "term magnitudes range from {} to {}",
                        fmt_value(smallest),
                        fmt_value(largest)
                    ));
                }
            });
            if let Some(detail) = hit {
                findings.push(self.constraint_finding(id, detail));
            }
        }
        findings
    }

    pub(super) fn inconsistent_units(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for id in self.model.active_constraints() {
            let mut hit = None;
            self.model.constraint(id).body().visit(&mut |node| {
                if hit.is_some() {
                    return;
                }
                let Some(terms) = node.additive_terms() else {
                    return;
                };
                let units = terms
                    .iter()
                    .filter_map(|(_, term)| units_of(self.model, term))
                    .collect::<BTreeSet<_>>();
                if units.len() > 1 {
                    hit = Some(format!(
                        "sum mixes {}",
                        units.into_iter().collect::<Vec<_>>().join(", ")
                    ));
                }
            });
            if let Some(detail) = hit {
                findings.push(self.constraint_finding(id, detail));
            }
        }
        findings
    }

    pub(super) fn potential_evaluation_errors(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for id in self.model.active_constraints() {
            let mut problems = Vec::new();
            self.model.constraint(id).body().visit(&mut |node| {
                let problem = match node {
                    Expr::Div(_, denominator) => self
                        .bounds_of(denominator)
                        .filter(|(lower, upper)| {
                            lower.map_or(true, |l| l <= 0.0) && upper.map_or(true, |u| u >= 0.0)
                        })
                        .map(|_| "division by a variable that may be zero"),
                    Expr::Log(inner) => self
                        .bounds_of(inner)
                        .filter(|(lower, _)| lower.map_or(true, |l| l <= 0.0))
                        .map(|_| "log of a variable that may be non-positive"),
                    Expr::Sqrt(inner) => self
                        .bounds_of(inner)
                        .filter(|(lower, _)| lower.map_or(true, |l| l < 0.0))
                        .map(|_| "sqrt of a variable that may be negative"),
                    Expr::Pow(base, exponent) if exponent.fract() != 0.0 => self
                        .bounds_of(base)
                        .filter(|(lower, _)| lower.map_or(true, |l| l < 0.0))
                        .map(|_| "fractional power of a variable that may be negative"),
                    _ => None,
                };
                if let Some(problem) = problem {
                    problems.push(problem);
                }
            });
            if !problems.is_empty() {
                findings.push(self.constraint_finding(id, problems.join("; ")));
            }
        }
        findings
    }

    /// Bounds of a bare unfixed variable node; anything else is not checked.
    fn bounds_of(&self, expr: &Expr) -> Option<(Option<f64>, Option<f64>)> {
        let Expr::Var(id) = expr else {
            return None;
        };
        let variable = self.model.variable(*id);
        (!variable.is_fixed()).then(|| (variable.lower(), variable.upper()))
    }

    pub(super) fn external_variables(&self) -> Vec<Finding> {
        self.variables_in_active_constraints()
            .into_iter()
            .filter(|id| self.model.is_variable_in_inactive_block(*id))
            .map(|id| self.variable_finding(id, "lies in a deactivated block".to_owned()))
            .collect()
    }

    pub(super) fn unused_variables(&self) -> Vec<Finding> {
        let used = self.variables_in_active_constraints();
        self.model
            .variable_ids()
            .filter(|id| !used.contains(id))
            .map(|id| {
                let state = if self.model.variable(id).is_fixed() { "fixed" } else { "free" };
                self.variable_finding(id, state.to_owned())
            })
            .collect()
    }

    pub(super) fn no_free_variables(&self) -> Vec<Finding> {
        self.model
            .active_constraints()
            .into_iter()
            .filter(|id| {
                let constraint = self.model.constraint(*id);
                constraint.variables().iter().all(|var| self.model.variable(*var).is_fixed())
            })
            .map(|id| self.constraint_finding(id, "all variables are fixed".to_owned()))
            .collect()
    }

    pub(super) fn near_parallel_constraints(&self) -> Result<Vec<Finding>, ConstraintId> {
        let jacobian = self.jacobian()?;
        let rows = (0..jacobian.matrix.nrows())
            .map(|row| jacobian.matrix.row(row).transpose())
            .collect::<Vec<_>>();
        Ok(self
            .parallel_pairs(&rows)
            .into_iter()
            .map(|(a, b)| {
                let other = self.model.constraint(jacobian.rows[b]).path().to_string();
                self.constraint_finding(jacobian.rows[a], format!("parallel to {other}"))
            })
            .collect())
    }

    pub(super) fn near_parallel_variables(&self) -> Result<Vec<Finding>, ConstraintId> {
        let jacobian = self.jacobian()?;
        let cols = (0..jacobian.matrix.ncols())
            .map(|col| jacobian.matrix.column(col).into_owned())
            .collect::<Vec<_>>();
        Ok(self
            .parallel_pairs(&cols)
            .into_iter()
            .map(|(a, b)| {
                let other = self.model.variable(jacobian.cols[b]).path().to_string();
                self.variable_finding(jacobian.cols[a], format!("parallel to {other}"))
            })
            .collect())
    }

    fn parallel_pairs(&self, vectors: &[nalgebra::DVector<f64>]) -> Vec<(usize, usize)> {
        let norms = vectors.iter().map(|vector| vector.norm()).collect::<Vec<_>>();
        let mut pairs = Vec::new();
        for a in 0..vectors.len() {
            for b in (a + 1)..vectors.len() {
                if norms[a] <= self.thresholds.zero || norms[b] <= self.thresholds.zero {
                    continue;
                }
                let cosine = vectors[a].dot(&vectors[b]).abs() / (norms[a] * norms[b]);
                if 1.0 - cosine < self.thresholds.parallel {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    pub(super) fn variables_at_bounds(&self) -> Vec<Finding> {
        let violation = self.thresholds.bounds_violation;
        self.valued_variables()
            .filter_map(|(id, value)| {
                let variable = self.model.variable(id);
                let at_lower = variable.lower().filter(|lower| value <= lower + violation);
                let at_upper = variable.upper().filter(|upper| value >= upper - violation);
                let bound = at_lower.or(at_upper)?;
                Some(self.variable_finding(
                    id,
                    format!("value {} at or beyond bound {}", fmt_value(value), fmt_value(bound)),
                ))
            })
            .collect()
    }

    pub(super) fn variables_near_bounds(&self) -> Vec<Finding> {
        let near = |value: f64, bound: f64| {
            (value - bound).abs()
                <= self.thresholds.bounds_absolute.max(self.thresholds.bounds_relative * bound.abs())
        };
        self.valued_variables()
            .filter(|(id, _)| !self.model.variable(*id).is_fixed())
            .filter_map(|(id, value)| {
                let variable = self.model.variable(id);
                let bound = variable
                    .lower()
                    .filter(|lower| near(value, *lower))
                    .or_else(|| variable.upper().filter(|upper| near(value, *upper)))?;
                Some(self.variable_finding(
                    id,
                    format!("value {} near bound {}", fmt_value(value), fmt_value(bound)),
                ))
            })
            .collect()
    }

    pub(super) fn variables_fixed_to_zero(&self) -> Vec<Finding> {
        self.valued_variables()
            .filter(|(id, value)| {
                self.model.variable(*id).is_fixed() && value.abs() < self.thresholds.zero
            })
            .map(|(id, value)| self.variable_finding(id, format!("fixed to {}", fmt_value(value))))
            .collect()
    }

    pub(super) fn variables_extreme_values(&self) -> Vec<Finding> {
        let thresholds = &self.thresholds;
        self.valued_variables()
            .filter(|(_, value)| {
                let magnitude = value.abs();
                magnitude > thresholds.extreme_large
                    || (magnitude >= thresholds.zero && magnitude < thresholds.extreme_small)
            })
            .map(|(id, value)| self.variable_finding(id, fmt_value(value)))
            .collect()
    }

    pub(super) fn variables_none_value(&self) -> Vec<Finding> {
        self.variables_in_active_constraints()
            .into_iter()
            .filter(|id| self.model.value(*id).is_none())
            .map(|id| self.variable_finding(id, "no value".to_owned()))
            .collect()
    }

    pub(super) fn variables_near_zero(&self) -> Vec<Finding> {
        self.valued_variables()
            .filter(|(_, value)| value.abs() < self.thresholds.zero)
            .map(|(id, value)| self.variable_finding(id, fmt_value(value)))
            .collect()
    }

    pub(super) fn extreme_jacobian_constraints(&self) -> Result<Vec<Finding>, ConstraintId> {
        let jacobian = self.jacobian()?;
        Ok((0..jacobian.matrix.nrows())
            .filter_map(|row| {
                let norm = jacobian.matrix.row(row).norm();
                self.is_extreme_warning(norm).then(|| {
                    self.constraint_finding(jacobian.rows[row], format!("row norm {}", fmt_value(norm)))
                })
            })
            .collect())
    }

    pub(super) fn extreme_jacobian_variables(&self) -> Result<Vec<Finding>, ConstraintId> {
        let jacobian = self.jacobian()?;
        Ok((0..jacobian.matrix.ncols())
            .filter_map(|col| {
                let norm = jacobian.matrix.column(col).norm();
                self.is_extreme_warning(norm).then(|| {
                    self.variable_finding(jacobian.cols[col], format!("column norm {}", fmt_value(norm)))
                })
            })
            .collect())
    }

    pub(super) fn extreme_jacobian_entries(&self) -> Result<Vec<Finding>, ConstraintId> {
        let jacobian = self.jacobian()?;
        let thresholds = &self.thresholds;
        let mut findings = Vec::new();
        for row in 0..jacobian.matrix.nrows() {
            for col in 0..jacobian.matrix.ncols() {
                let magnitude = jacobian.matrix[(row, col)].abs();
                if magnitude == 0.0 {
                    continue;
                }
                if magnitude > thresholds.jacobian_large_caution
                    || magnitude < thresholds.jacobian_small_caution
                {
                    let var = self.model.variable(jacobian.cols[col]).path().to_string();
                    findings.push(self.constraint_finding(
                        jacobian.rows[row],
                        format!("d/d {var} = {}", fmt_value(jacobian.matrix[(row, col)])),
                    ));
                }
            }
        }
        Ok(findings)
    }

    fn is_extreme_warning(&self, norm: f64) -> bool {
        norm > self.thresholds.jacobian_large_warning || norm < self.thresholds.jacobian_small_warning
    }

    fn valued_variables(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.variables_in_active_constraints()
            .into_iter()
            .filter_map(move |id| self.model.value(id).map(|value| (id, value)))
    }
}

fn term_values(node: &Expr, value_of: &dyn Fn(VarId) -> Option<f64>) -> Option<Vec<f64>> {
    let terms = node.additive_terms()?;
    terms
        .iter()
        .map(|(sign, term)| term.eval(value_of).map(|value| sign * value))
        .collect()
}

/// Units of a term when they can be read off directly; products and functions are not analysed.
fn units_of(model: &Flowsheet, expr: &Expr) -> Option<String> {
    match expr {
        Expr::Var(id) => {
            Some(model.variable(*id).units().unwrap_or("dimensionless").to_owned())
        }
        Expr::Neg(inner) => units_of(model, inner),
        Expr::Add(_) | Expr::Sub(_, _) => {
            let terms = expr.additive_terms()?;
            let units = terms
                .iter()
                .filter_map(|(_, term)| units_of(model, term))
                .collect::<BTreeSet<_>>();
            if units.len() == 1 {
                units.into_iter().next()
            } else {
                None
            }
        }
        _ => None,
    }
}
