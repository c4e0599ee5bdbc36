// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::model::jacobian;
use crate::model::{ConstraintId, Flowsheet, VarId};

use super::{SolveReport, Solver, SolverError, SolverOptions, Termination};

const SVD_EPS: f64 = 1e-12;
const MIN_STEP: f64 = 1e-9;
const ARMIJO: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearStep {
    /// LU for square systems, SVD least squares otherwise or when LU is singular.
    Lu,
    /// Always SVD least squares (minimum-norm step).
    Svd,
}

/// Damped Newton iteration on the active equality constraints with backtracking line search and
/// bound projection.
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    name: &'static str,
    linear: LinearStep,
}

impl NewtonSolver {
    pub fn newton() -> Self {
        Self { name: "newton", linear: LinearStep::Lu }
    }

    pub fn least_squares() -> Self {
        Self { name: "least_squares", linear: LinearStep::Svd }
    }

    fn step(&self, jacobian: &DMatrix<f64>, residual: &DVector<f64>) -> Option<DVector<f64>> {
        let rhs = -residual;
        if self.linear == LinearStep::Lu && jacobian.is_square() {
            if let Some(step) = jacobian.clone().lu().solve(&rhs) {
                if step.iter().all(|value| value.is_finite()) {
                    return Some(step);
                }
            }
        }
        let step = jacobian.clone().svd(true, true).solve(&rhs, SVD_EPS).ok()?;
        step.iter().all(|value| value.is_finite()).then_some(step)
    }
}

struct System<'a> {
    model: &'a Flowsheet,
    rows: Vec<ConstraintId>,
    cols: Vec<VarId>,
    targets: DVector<f64>,
    lower: Vec<Option<f64>>,
    upper: Vec<Option<f64>>,
}

impl<'a> System<'a> {
    fn new(model: &'a Flowsheet) -> Self {
        let rows = model.active_equalities();
        let cols = model.free_variables_in_equalities().into_iter().collect::<Vec<_>>();
        let targets = DVector::from_iterator(
            rows.len(),
            rows.iter().map(|id| model.constraint(*id).lower().unwrap_or(0.0)),
        );
        let lower = cols.iter().map(|id| model.variable(*id).lower()).collect();
        let upper = cols.iter().map(|id| model.variable(*id).upper()).collect();
        Self { model, rows, cols, targets, lower, upper }
    }

    fn start(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.cols.len(),
            self.cols.iter().map(|id| self.model.value(*id).unwrap_or(0.0)),
        )
        .map_with_location(|row, _, value| self.clamp(row, value))
    }

    fn clamp(&self, col: usize, value: f64) -> f64 {
        let value = self.lower[col].map_or(value, |lower| value.max(lower));
        self.upper[col].map_or(value, |upper| value.min(upper))
    }

    fn project(&self, point: DVector<f64>) -> DVector<f64> {
        point.map_with_location(|row, _, value| self.clamp(row, value))
    }

    fn residual(
        &self,
        point: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), ConstraintId> {
        let (values, jacobian) = jacobian::evaluate(self.model, &self.rows, &self.cols, point)?;
        Ok((values - &self.targets, jacobian.matrix))
    }
}

fn max_abs(vector: &DVector<f64>) -> f64 {
    vector.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
}

fn write_back(model: &mut Flowsheet, cols: &[VarId], point: &DVector<f64>) {
    for (col, id) in cols.iter().enumerate() {
        model.set_value(*id, Some(point[col]));
    }
}

impl Solver for NewtonSolver {
    fn name(&self) -> &str {
        self.name
    }

    fn solve(
        &self,
        model: &mut Flowsheet,
        options: &SolverOptions,
    ) -> Result<SolveReport, SolverError> {
        let started = Instant::now();

        for id in model.active_equalities() {
            for var in model.constraint(id).variables() {
                let variable = model.variable(*var);
                if variable.is_fixed() && variable.value().is_none() {
                    return Err(SolverError::MissingFixedValue { path: variable.path().to_string() });
                }
            }
        }

        let (cols, mut report, point) = {
            let system = System::new(model);
            let (report, point) = self.iterate(&system, options, started);
            (system.cols, report, point)
        };
        write_back(model, &cols, &point);

        if report.termination == Termination::Optimal {
            let violated = model
                .active_constraints()
                .into_iter()
                .filter(|id| !model.constraint(*id).is_equality())
                .filter(|id| model.residual(*id).is_some_and(|residual| residual > options.tolerance))
                .count();
            if violated > 0 {
                report.termination = Termination::Infeasible;
                report.message = format!(
                    "equalities converged but {violated} inequality constraint(s) are violated"
                );
            }
        }

        Ok(report)
    }
}

impl NewtonSolver {
    fn iterate(
        &self,
        system: &System<'_>,
        options: &SolverOptions,
        started: Instant,
    ) -> (SolveReport, DVector<f64>) {
        let mut point = system.start();
        let mut trace = Vec::new();
        let finish = |termination, iterations, message: String, trace| SolveReport {
            termination,
            iterations,
            message,
            trace,
        };

        if system.rows.is_empty() {
            let message = "no active equality constraints".to_owned();
            return (finish(Termination::Optimal, 0, message, trace), point);
        }

        let unevaluable = |id: ConstraintId| {
            format!(
                "constraint '{}' could not be evaluated at the current point",
                system.model.constraint(id).path()
            )
        };

        let (mut residual, mut jacobian) = match system.residual(&point) {
            Ok(evaluated) => evaluated,
            Err(id) => {
                return (finish(Termination::NumericalError, 0, unevaluable(id), trace), point)
            }
        };

        for iteration in 0..options.max_iter {
            let norm = max_abs(&residual);
            if norm <= options.tolerance {
                let message = format!("converged in {iteration} iterations (max residual {norm:.3e})");
                return (finish(Termination::Optimal, iteration, message, trace), point);
            }
            if started.elapsed() > options.max_cpu_time {
                let message = format!("time limit reached after {iteration} iterations");
                return (finish(Termination::MaxTimeLimit, iteration, message, trace), point);
            }

            let Some(step) = self.step(&jacobian, &residual) else {
                let message = "linear system could not be solved".to_owned();
                return (finish(Termination::NumericalError, iteration, message, trace), point);
            };

            let merit = residual.norm_squared();
            let mut alpha = 1.0;
            let accepted = loop {
                let candidate = system.project(&point + &step * alpha);
                if let Ok((next_residual, next_jacobian)) = system.residual(&candidate) {
                    if next_residual.norm_squared() <= (1.0 - ARMIJO * alpha) * merit {
                        break Some((candidate, next_residual, next_jacobian));
                    }
                }
                alpha *= 0.5;
                if alpha < MIN_STEP {
                    break None;
                }
            };

            let Some((next_point, next_residual, next_jacobian)) = accepted else {
                let message = format!(
                    "line search failed after {iteration} iterations (max residual {norm:.3e}); the \
                     problem may be locally infeasible"
                );
                return (finish(Termination::Infeasible, iteration, message, trace), point);
            };

            point = next_point;
            residual = next_residual;
            jacobian = next_jacobian;

            let line = format!(
                "iter {:>4}  max|r| {:.6e}  step {:.3e}",
                iteration + 1,
                max_abs(&residual),
                alpha
            );
            tracing::debug!(backend = self.name, "{line}");
            if options.tee {
                trace.push(line);
            }
        }

        let norm = max_abs(&residual);
        if norm <= options.tolerance {
            let message = format!(
                "converged in {} iterations (max residual {norm:.3e})",
                options.max_iter
            );
            (finish(Termination::Optimal, options.max_iter, message, trace), point)
        } else {
            let message = format!(
                "maximum number of iterations ({}) exceeded (max residual {norm:.3e})",
                options.max_iter
            );
            (finish(Termination::MaxIterations, options.max_iter, message, trace), point)
        }
    }
}
