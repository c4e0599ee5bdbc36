// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Evaluation runner.
//!
//! Backends implement [`Solver`] and are looked up by id in a [`SolverRegistry`]. [`run_solve`] is
//! the only place a backend is invoked: it converts returned errors and panics into a failed
//! [`EvaluationOutcome`] so a crashing backend never escapes the orchestration layer.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::Flowsheet;

mod newton;

pub use newton::{LinearStep, NewtonSolver};

pub const DEFAULT_BACKEND: &str = "newton";
pub const DEFAULT_MAX_ITER: usize = 100;
pub const DEFAULT_MAX_CPU_TIME: Duration = Duration::from_secs(60);
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub max_iter: usize,
    pub max_cpu_time: Duration,
    /// Convergence threshold on the largest absolute equality residual.
    pub tolerance: f64,
    /// Collect a per-iteration trace into the outcome.
    pub tee: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            max_cpu_time: DEFAULT_MAX_CPU_TIME,
            tolerance: DEFAULT_TOLERANCE,
            tee: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    Optimal,
    MaxIterations,
    MaxTimeLimit,
    Infeasible,
    NumericalError,
    Error,
    /// No solve was attempted (e.g. the model is over-specified).
    NotAttempted,
}

impl Termination {
    pub fn label(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::MaxIterations => "max_iterations",
            Self::MaxTimeLimit => "max_time_limit",
            Self::Infeasible => "infeasible",
            Self::NumericalError => "numerical_error",
            Self::Error => "error",
            Self::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a backend reports after running to its natural end.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub termination: Termination,
    pub iterations: usize,
    pub message: String,
    pub trace: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    MissingFixedValue { path: String },
    Backend { message: String },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFixedValue { path } => {
                write!(f, "fixed variable '{path}' has no value")
            }
            Self::Backend { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for SolverError {}

pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    /// Solves the active equality system starting from the model's current values, writing
    /// iterates back into the model.
    fn solve(&self, model: &mut Flowsheet, options: &SolverOptions)
        -> Result<SolveReport, SolverError>;
}

#[derive(Clone)]
pub struct SolverRegistry {
    backends: BTreeMap<String, Arc<dyn Solver>>,
}

impl fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverRegistry").field("backends", &self.names()).finish()
    }
}

impl Default for SolverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NewtonSolver::newton()));
        registry.register(Arc::new(NewtonSolver::least_squares()));
        registry
    }
}

impl SolverRegistry {
    pub fn empty() -> Self {
        Self { backends: BTreeMap::new() }
    }

    pub fn register(&mut self, solver: Arc<dyn Solver>) {
        self.backends.insert(solver.name().to_owned(), solver);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Solver>> {
        self.backends.get(id).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

/// Normalized result of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub success: bool,
    pub termination: Termination,
    pub message: String,
    /// Set when the backend returned an error or panicked.
    pub exception: Option<String>,
    pub iterations: usize,
    pub wall_time: Duration,
    pub trace: Vec<String>,
}

impl EvaluationOutcome {
    pub fn not_attempted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            termination: Termination::NotAttempted,
            message: message.into(),
            exception: None,
            iterations: 0,
            wall_time: Duration::ZERO,
            trace: Vec::new(),
        }
    }

    fn failed(exception: String, wall_time: Duration) -> Self {
        Self {
            success: false,
            termination: Termination::Error,
            message: exception.clone(),
            exception: Some(exception),
            iterations: 0,
            wall_time,
            trace: Vec::new(),
        }
    }

    pub fn numerical_issue(&self) -> bool {
        self.termination == Termination::NumericalError
    }
}

pub fn run_solve(
    solver: &dyn Solver,
    model: &mut Flowsheet,
    options: &SolverOptions,
) -> EvaluationOutcome {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| solver.solve(model, options)));
    let wall_time = started.elapsed();

    let outcome = match result {
        Ok(Ok(report)) => EvaluationOutcome {
            success: report.termination == Termination::Optimal,
            termination: report.termination,
            message: report.message,
            exception: None,
            iterations: report.iterations,
            wall_time,
            trace: if options.tee { report.trace } else { Vec::new() },
        },
        Ok(Err(err)) => EvaluationOutcome::failed(err.to_string(), wall_time),
        Err(payload) => {
            let text = panic_text(payload.as_ref());
            tracing::error!(backend = solver.name(), error = %text, "solver panicked");
            EvaluationOutcome::failed(text, wall_time)
        }
    };

    if outcome.success {
        tracing::info!(
            backend = solver.name(),
            termination = %outcome.termination,
            iterations = outcome.iterations,
            "solve finished"
        );
    } else {
        tracing::warn!(
            backend = solver.name(),
            termination = %outcome.termination,
            iterations = outcome.iterations,
            message = %outcome.message,
            "solve did not converge"
        );
    }
    outcome
}

pub(crate) fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "solver panicked".to_owned()
    }
}

#[cfg(test)]
mod tests;
