// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Exploratory evaluations: single test points, Cartesian sweeps and step-by-step solves.
//!
//! Test-point inputs are fixed only for the duration of one evaluation and are restored
//! afterwards. Everything else a point test does (the `unfix_first` relaxation, solver iterates
//! written into unfixed variables) persists.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::model::{
    resolve, resolve_variable, ComponentKind, ComponentRef, ConstraintId, Flowsheet,
    MutationError, ResolveError, VarId,
};
use crate::ops::{self, BatchError, MutationBatch};
use crate::solve::{run_solve, EvaluationOutcome, Solver, SolverOptions, Termination};

mod restore;

pub(crate) use restore::{RestoreGuard, Snapshot};

pub const DEFAULT_MAX_SAMPLES: usize = 10_000;
pub const DEFAULT_MAX_STEPS: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ExploreError {
    UnknownInput { source: ResolveError },
    NonFiniteInput { path: String },
    NoInputs,
    SampleSizeMismatch { inputs: usize, sample_sizes: usize },
    ZeroSamples { path: String },
    InvalidRange { path: String, lower: f64, upper: f64 },
    TooManySamples { max: usize },
    UnknownTrackedPath { source: ResolveError },
    ZeroSteps,
    TooManySteps { max: usize },
    Rejected { source: MutationError },
    Batch { source: BatchError },
}

impl fmt::Display for ExploreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInput { source } => write!(f, "invalid input: {source}"),
            Self::NonFiniteInput { path } => write!(f, "input value for '{path}' must be finite"),
            Self::NoInputs => f.write_str("at least one input is required"),
            Self::SampleSizeMismatch { inputs, sample_sizes } => write!(
                f,
                "inputs and sample_size must have the same length (inputs={inputs}, \
                 sample_size={sample_sizes})"
            ),
            Self::ZeroSamples { path } => write!(f, "sample size for '{path}' must be at least 1"),
            Self::InvalidRange { path, lower, upper } => {
                write!(f, "invalid range for '{path}': lower={lower}, upper={upper}")
            }
            Self::TooManySamples { max } => write!(f, "sweep exceeds the maximum of {max} samples"),
            Self::UnknownTrackedPath { source } => write!(f, "invalid tracked path: {source}"),
            Self::ZeroSteps => f.write_str("max_steps must be at least 1"),
            Self::TooManySteps { max } => write!(f, "max_steps exceeds the maximum of {max}"),
            Self::Rejected { source } => write!(f, "input rejected: {source}"),
            Self::Batch { source } => write!(f, "unfix_first rejected: {source}"),
        }
    }
}

impl std::error::Error for ExploreError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointTest {
    pub inputs: BTreeMap<String, f64>,
    /// Persistently unfixed before the test; not restored.
    pub unfix_first: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointTestOutcome {
    pub evaluation: EvaluationOutcome,
    /// After `unfix_first`, before the inputs are fixed.
    pub dof_before: i64,
    /// With the inputs fixed.
    pub dof_after: i64,
    pub unfix_not_found: Vec<String>,
    pub unfix_errors: BTreeMap<String, String>,
}

fn resolve_inputs<'p>(
    model: &Flowsheet,
    inputs: impl IntoIterator<Item = (&'p str, f64)>,
) -> Result<Vec<(VarId, f64)>, ExploreError> {
    inputs
        .into_iter()
        .map(|(path, value)| {
            if !value.is_finite() {
                return Err(ExploreError::NonFiniteInput { path: path.to_owned() });
            }
            let id = resolve_variable(model, path)
                .map_err(|source| ExploreError::UnknownInput { source })?;
            Ok((id, value))
        })
        .collect()
}

pub fn point_test(
    model: &mut Flowsheet,
    solver: &dyn Solver,
    options: &SolverOptions,
    test: &PointTest,
) -> Result<PointTestOutcome, ExploreError> {
    // validated before anything is mutated
    let inputs =
        resolve_inputs(model, test.inputs.iter().map(|(path, value)| (path.as_str(), *value)))?;

    let (unfix_not_found, unfix_errors) = if test.unfix_first.is_empty() {
        (Vec::new(), BTreeMap::new())
    } else {
        let batch = MutationBatch::unfix(test.unfix_first.iter().cloned());
        let outcome = ops::apply(model, &batch).map_err(|source| ExploreError::Batch { source })?;
        (outcome.unfix.not_found, outcome.unfix.errors)
    };

    let (evaluation, dof_before, dof_after) = evaluate_point(model, solver, options, &inputs)?;
    Ok(PointTestOutcome { evaluation, dof_before, dof_after, unfix_not_found, unfix_errors })
}

/// Fixes `inputs`, evaluates and restores them. Returns the outcome and DOF before/after fixing.
fn evaluate_point(
    model: &mut Flowsheet,
    solver: &dyn Solver,
    options: &SolverOptions,
    inputs: &[(VarId, f64)],
) -> Result<(EvaluationOutcome, i64, i64), ExploreError> {
    let dof_before = model.degrees_of_freedom();
    let ids = inputs.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    let mut guard = RestoreGuard::capture(model, &ids);

    for (id, value) in inputs {
        guard.fix(*id, Some(*value)).map_err(|source| ExploreError::Rejected { source })?;
    }

    let dof_after = guard.degrees_of_freedom();
    let evaluation = if dof_after < 0 {
        tracing::warn!(dof = dof_after, "point test over-specified; solve skipped");
        EvaluationOutcome::not_attempted(format!(
            "model is over-specified with the test inputs fixed (degrees of freedom {dof_after}); \
             solve skipped"
        ))
    } else {
        run_solve(solver, &mut guard, options)
    };

    Ok((evaluation, dof_before, dof_after))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepInput {
    pub path: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    pub inputs: Vec<SweepInput>,
    pub sample_size: Vec<usize>,
    /// Start each sample from the previous sample's solution (`true`) or from the pre-sweep
    /// values of all unfixed variables (`false`).
    pub warm_start: bool,
    pub max_samples: usize,
}

impl SweepRequest {
    pub fn new(inputs: Vec<SweepInput>, sample_size: Vec<usize>) -> Self {
        Self { inputs, sample_size, warm_start: true, max_samples: DEFAULT_MAX_SAMPLES }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub index: usize,
    pub values: Vec<(String, f64)>,
    pub evaluation: EvaluationOutcome,
    pub dof: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub samples: Vec<SampleRecord>,
    pub total: usize,
    pub success_count: usize,
}

/// Evenly spaced samples over `[lower, upper]`; a single sample is `lower`.
pub fn linspace(lower: f64, upper: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![lower],
        _ => {
            let last = (count - 1) as f64;
            (0..count).map(|i| lower + (upper - lower) * (i as f64) / last).collect()
        }
    }
}

pub fn sweep(
    model: &mut Flowsheet,
    solver: &dyn Solver,
    options: &SolverOptions,
    request: &SweepRequest,
) -> Result<SweepOutcome, ExploreError> {
    if request.inputs.len() != request.sample_size.len() {
        return Err(ExploreError::SampleSizeMismatch {
            inputs: request.inputs.len(),
            sample_sizes: request.sample_size.len(),
        });
    }
    if request.inputs.is_empty() {
        return Err(ExploreError::NoInputs);
    }

    let mut axes = Vec::with_capacity(request.inputs.len());
    let mut total = 1_usize;
    for (input, count) in request.inputs.iter().zip(&request.sample_size) {
        if *count == 0 {
            return Err(ExploreError::ZeroSamples { path: input.path.clone() });
        }
        if !input.lower.is_finite() || !input.upper.is_finite() || input.lower > input.upper {
            return Err(ExploreError::InvalidRange {
                path: input.path.clone(),
                lower: input.lower,
                upper: input.upper,
            });
        }
        let id = resolve_variable(model, &input.path)
            .map_err(|source| ExploreError::UnknownInput { source })?;
        total = total
            .checked_mul(*count)
            .filter(|total| *total <= request.max_samples)
            .ok_or(ExploreError::TooManySamples { max: request.max_samples })?;
        axes.push((id, linspace(input.lower, input.upper, *count)));
    }

    let baseline = if request.warm_start {
        None
    } else {
        let unfixed = model
            .variable_ids()
            .filter(|id| !model.variable(*id).is_fixed())
            .collect::<Vec<_>>();
        Some(Snapshot::capture(model, unfixed))
    };

    tracing::info!(total, warm_start = request.warm_start, "sweep started");
    let mut samples = Vec::with_capacity(total);
    for index in 0..total {
        let point = grid_point(&axes, index);
        if let Some(baseline) = &baseline {
            baseline.restore(model);
        }

        let values = request
            .inputs
            .iter()
            .zip(&point)
            .map(|(input, (_, value))| (input.path.clone(), *value))
            .collect::<Vec<_>>();
        let (evaluation, dof) = match evaluate_point(model, solver, options, &point) {
            Ok((evaluation, _, dof_after)) => (evaluation, dof_after),
            Err(err) => (EvaluationOutcome::not_attempted(err.to_string()), model.degrees_of_freedom()),
        };
        tracing::debug!(
            index,
            success = evaluation.success,
            termination = %evaluation.termination,
            iterations = evaluation.iterations,
            "sweep sample"
        );
        samples.push(SampleRecord { index, values, evaluation, dof });
    }

    let success_count = samples.iter().filter(|sample| sample.evaluation.success).count();
    tracing::info!(total, success_count, "sweep finished");
    Ok(SweepOutcome { samples, total, success_count })
}

/// Mixed-radix decode of `index`; the first axis varies slowest.
fn grid_point(axes: &[(VarId, Vec<f64>)], index: usize) -> Vec<(VarId, f64)> {
    let mut rest = index;
    let mut point = axes
        .iter()
        .rev()
        .map(|(id, samples)| {
            let value = samples[rest % samples.len()];
            rest /= samples.len();
            (*id, value)
        })
        .collect::<Vec<_>>();
    point.reverse();
    point
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked {
    Variable(VarId),
    Residual(ConstraintId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSeries {
    pub path: String,
    /// One entry per step; constraints report their residual.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSolveOutcome {
    pub steps: usize,
    pub series: Vec<TrackedSeries>,
    /// Outcome of the last step.
    pub last: EvaluationOutcome,
}

/// Runs the solver one iteration at a time from the current point, recording tracked values after
/// every step, until it stops hitting the iteration limit or `max_steps` is reached.
///
/// `options.max_cpu_time` bounds the whole call; each step gets what is left of it.
pub fn step_solve(
    model: &mut Flowsheet,
    solver: &dyn Solver,
    options: &SolverOptions,
    max_steps: usize,
    track: &[String],
) -> Result<StepSolveOutcome, ExploreError> {
    if max_steps == 0 {
        return Err(ExploreError::ZeroSteps);
    }
    let started = Instant::now();
    let tracked = track
        .iter()
        .map(|path| match resolve(model, path, ComponentKind::Any) {
            Ok(ComponentRef::Variable(id)) => Ok(Tracked::Variable(id)),
            Ok(ComponentRef::Constraint(id)) => Ok(Tracked::Residual(id)),
            Ok(ComponentRef::Block(_)) => Err(ExploreError::UnknownTrackedPath {
                source: ResolveError::WrongKind {
                    path: path.clone(),
                    expected: ComponentKind::Variable,
                    found: ComponentKind::Block,
                },
            }),
            Err(source) => Err(ExploreError::UnknownTrackedPath { source }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut series = track
        .iter()
        .map(|path| TrackedSeries { path: path.clone(), values: Vec::new() })
        .collect::<Vec<_>>();
    let mut last = EvaluationOutcome::not_attempted("no steps taken");
    let mut steps = 0;

    while steps < max_steps {
        let remaining = options.max_cpu_time.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::warn!(steps, "step solve ran out of time");
            last = EvaluationOutcome {
                termination: Termination::MaxTimeLimit,
                wall_time: started.elapsed(),
                ..EvaluationOutcome::not_attempted(format!(
                    "time limit of {:?} reached after {steps} step(s)",
                    options.max_cpu_time
                ))
            };
            break;
        }
        let single = SolverOptions { max_iter: 1, max_cpu_time: remaining, ..options.clone() };
        let outcome = run_solve(solver, model, &single);
        steps += 1;
        for (entry, item) in series.iter_mut().zip(&tracked) {
            entry.values.push(match item {
                Tracked::Variable(id) => model.value(*id),
                Tracked::Residual(id) => model.residual(*id),
            });
        }
        let done = outcome.termination != Termination::MaxIterations;
        last = outcome;
        if done {
            break;
        }
    }

    tracing::info!(steps, termination = %last.termination, "step solve finished");
    Ok(StepSolveOutcome { steps, series, last })
}

#[cfg(test)]
mod tests;
