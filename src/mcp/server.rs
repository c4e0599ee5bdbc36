// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use tokio::sync::Mutex;

use crate::diagnostics::{
    partition, DisplayKind, DisplayReport, Partition, Report, Thresholds, Toolbox,
};
use crate::explore::{self, ExploreError, PointTest, SweepInput, SweepRequest};
use crate::model::{
    resolve, BlockId, ComponentKind, ComponentPath, ComponentRef, ConstraintId, Flowsheet,
    ResolveError, VarId,
};
use crate::ops::{
    self, ApplyOutcome, ApplyStatus, BatchError, BoundsChange, CategoryOutcome, MutationBatch,
};
use crate::solve::{
    panic_text, run_solve, EvaluationOutcome, Solver, SolverOptions, SolverRegistry, Termination,
    DEFAULT_BACKEND, DEFAULT_MAX_CPU_TIME, DEFAULT_MAX_ITER, DEFAULT_TOLERANCE,
};

use super::types::*;

const MAX_PAGE: u64 = 500;
const DEFAULT_LIST_LIMIT: u64 = 200;
const DEFAULT_TOP_RESIDUALS: u64 = 50;
const DEFAULT_APPLY_TOP_RESIDUALS: u64 = 10;
const DEFAULT_MAX_STEPS: u64 = 20;
const FLOWSHEET_BLOCK: &str = "fs";

/// Server-wide defaults applied when a tool call leaves a setting out.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub default_backend: String,
    pub max_iter: usize,
    pub max_cpu_time: Duration,
    pub max_sweep_samples: usize,
    /// Upper limit for `model.step_solve` `max_steps`.
    pub max_step_solve_steps: usize,
    /// Residual above which diagnostics report a constraint.
    pub residual_tolerance: f64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_backend: DEFAULT_BACKEND.to_owned(),
            max_iter: DEFAULT_MAX_ITER,
            max_cpu_time: DEFAULT_MAX_CPU_TIME,
            max_sweep_samples: explore::DEFAULT_MAX_SAMPLES,
            max_step_solve_steps: explore::DEFAULT_MAX_STEPS,
            residual_tolerance: Thresholds::default().residual,
        }
    }
}

#[derive(Debug)]
struct McpState {
    model: Flowsheet,
    evaluations: u64,
}

#[derive(Clone)]
pub struct FlowsheetMcp {
    state: Arc<Mutex<McpState>>,
    solvers: Arc<SolverRegistry>,
    settings: Arc<ServerSettings>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FlowsheetMcp {
    pub fn new(model: Flowsheet, settings: ServerSettings) -> Self {
        Self::with_solvers(model, settings, SolverRegistry::default())
    }

    pub fn with_solvers(model: Flowsheet, settings: ServerSettings, solvers: SolverRegistry) -> Self {
        Self {
            state: Arc::new(Mutex::new(McpState { model, evaluations: 0 })),
            solvers: Arc::new(solvers),
            settings: Arc::new(settings),
            tool_router: Self::tool_router(),
        }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    /// Runs `work` on a blocking thread while holding the model lock for its whole duration.
    async fn with_state_blocking<T, F>(&self, work: F) -> Result<T, ErrorData>
    where
        F: FnOnce(&mut McpState) -> Result<T, ErrorData> + Send + 'static,
        T: Send + 'static,
    {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        tokio::task::spawn_blocking(move || work(&mut state)).await.map_err(|err| {
            ErrorData::internal_error(format!("evaluation task failed: {err}"), None)
        })?
    }

    fn solver_setup(
        &self,
        params: Option<&SolverParams>,
    ) -> Result<(Arc<dyn Solver>, SolverOptions), ErrorData> {
        let defaults = SolverParams::default();
        let params = params.unwrap_or(&defaults);
        let backend = params.backend.as_deref().unwrap_or(self.settings.default_backend.as_str());
        let solver = self.solvers.get(backend).ok_or_else(|| {
            ErrorData::invalid_params(
                format!("unknown solver backend '{backend}'"),
                Some(serde_json::json!({
                    "backend": backend,
                    "available": self.solvers.names(),
                })),
            )
        })?;

        let max_iter = match params.max_iter {
            None => self.settings.max_iter,
            Some(0) => return Err(ErrorData::invalid_params("max_iter must be at least 1", None)),
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let max_cpu_time = match params.max_cpu_time {
            None => self.settings.max_cpu_time,
            Some(seconds) => Duration::try_from_secs_f64(seconds)
                .ok()
                .filter(|limit| !limit.is_zero())
                .ok_or_else(|| {
                    ErrorData::invalid_params(
                        "max_cpu_time must be a positive number of seconds",
                        Some(serde_json::json!({ "max_cpu_time": seconds })),
                    )
                })?,
        };

        let options = SolverOptions {
            max_iter,
            max_cpu_time,
            tolerance: DEFAULT_TOLERANCE,
            tee: params.tee.unwrap_or(false),
        };
        Ok((solver, options))
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds { residual: self.settings.residual_tolerance, ..Thresholds::default() }
    }

    /// Applies `batch` persistently, optionally solving afterwards.
    async fn apply_batch(
        &self,
        batch: MutationBatch,
        solve: Option<(Arc<dyn Solver>, SolverOptions)>,
        top_n: u64,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        batch.validate().map_err(map_batch_error)?;
        let response = self
            .with_state_blocking(move |state| {
                let outcome = ops::apply(&mut state.model, &batch).map_err(map_batch_error)?;
                let (evaluation, top) = match solve {
                    Some((solver, options)) => {
                        let evaluation = run_solve(solver.as_ref(), &mut state.model, &options);
                        state.evaluations += 1;
                        let (top, _) = top_residuals(&state.model, top_n, None);
                        (Some(evaluation_response(&evaluation)), Some(top))
                    }
                    None => (None, None),
                };
                let mut response = apply_response(&outcome);
                response.solve = evaluation;
                response.top_residuals = top;
                Ok(response)
            })
            .await?;
        Ok(Json(response))
    }

    /// Counts of variables, constraints and blocks plus the current degrees of freedom.
    #[tool(name = "model.summary")]
    async fn model_summary(&self) -> Result<Json<ModelSummaryResponse>, ErrorData> {
        let state = self.state.lock().await;
        let model = &state.model;
        let n_fixed = model.variable_ids().filter(|id| model.variable(*id).is_fixed()).count();

        Ok(Json(ModelSummaryResponse {
            root_alias: model.root_alias().to_owned(),
            degrees_of_freedom: model.degrees_of_freedom(),
            n_variables: model.variable_count() as u64,
            n_fixed_variables: n_fixed as u64,
            n_constraints: model.constraint_count() as u64,
            n_active_constraints: model.active_constraints().len() as u64,
            n_active_equalities: model.active_equalities().len() as u64,
            n_blocks: model.block_count() as u64,
            evaluations: state.evaluations,
        }))
    }

    /// List variables sorted by path with value, bounds and fixed flag; filter by substring and
    /// fixed state, paginate with `limit`/`offset`.
    #[tool(name = "model.list_variables")]
    async fn model_list_variables(
        &self,
        params: Parameters<ListVariablesParams>,
    ) -> Result<Json<ListVariablesResponse>, ErrorData> {
        let ListVariablesParams { pattern, only_fixed, only_unfixed, limit, offset } = params.0;
        let (only_fixed, only_unfixed) = (only_fixed.unwrap_or(false), only_unfixed.unwrap_or(false));
        if only_fixed && only_unfixed {
            return Err(ErrorData::invalid_params(
                "only_fixed and only_unfixed cannot both be true",
                None,
            ));
        }

        let state = self.state.lock().await;
        let model = &state.model;
        let mut rows = model
            .variable_ids()
            .filter(|id| {
                let fixed = model.variable(*id).is_fixed();
                !(only_fixed && !fixed) && !(only_unfixed && fixed)
            })
            .map(|id| variable_item(model, id))
            .filter(|item| matches_pattern(&item.path, pattern.as_deref()))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.path.cmp(&b.path));

        let page = Page::new(limit, offset, rows.len());
        let items = page.slice(rows);
        Ok(Json(ListVariablesResponse {
            count: items.len() as u64,
            items,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }))
    }

    /// List constraints sorted by path with effective activity, bounds, body value and residual.
    #[tool(name = "model.list_constraints")]
    async fn model_list_constraints(
        &self,
        params: Parameters<ListConstraintsParams>,
    ) -> Result<Json<ListConstraintsResponse>, ErrorData> {
        let ListConstraintsParams { pattern, limit, offset } = params.0;
        let state = self.state.lock().await;
        let model = &state.model;
        let mut rows = model
            .constraint_ids()
            .map(|id| constraint_item(model, id))
            .filter(|item| matches_pattern(&item.path, pattern.as_deref()))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.path.cmp(&b.path));

        let page = Page::new(limit, offset, rows.len());
        let items = page.slice(rows);
        Ok(Json(ListConstraintsResponse {
            count: items.len() as u64,
            items,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }))
    }

    /// Largest constraint residuals (bound violation magnitude), descending; use for feasibility
    /// triage after a failed solve.
    #[tool(name = "model.top_residuals")]
    async fn model_top_residuals(
        &self,
        params: Parameters<TopResidualsParams>,
    ) -> Result<Json<TopResidualsResponse>, ErrorData> {
        let TopResidualsParams { n, pattern } = params.0;
        let n = clamp_page(n, DEFAULT_TOP_RESIDUALS);
        let state = self.state.lock().await;
        let (items, total) = top_residuals(&state.model, n, pattern.as_deref());
        Ok(Json(TopResidualsResponse { count: items.len() as u64, items, total: total as u64 }))
    }

    /// Resolve one component path (root alias optional) to its canonical path, kind and state.
    #[tool(name = "model.resolve")]
    async fn model_resolve(
        &self,
        params: Parameters<ResolveParams>,
    ) -> Result<Json<ResolveResponse>, ErrorData> {
        let ResolveParams { path, kind } = params.0;
        let kind = parse_component_kind(kind.as_deref())?;
        let state = self.state.lock().await;
        let model = &state.model;

        let mut response = ResolveResponse {
            path: path.clone(),
            status: "resolved".to_owned(),
            canonical_path: None,
            kind: None,
            variable: None,
            constraint: None,
            block: None,
            message: None,
            suggestions: Vec::new(),
            candidates: Vec::new(),
        };
        match resolve(model, &path, kind) {
            Ok(component) => {
                response.canonical_path = Some(model.path_of(component).to_string());
                response.kind = Some(ComponentKind::of(component).label().to_owned());
                match component {
                    ComponentRef::Variable(id) => response.variable = Some(variable_item(model, id)),
                    ComponentRef::Constraint(id) => {
                        response.constraint = Some(constraint_item(model, id))
                    }
                    ComponentRef::Block(id) => response.block = Some(block_item(model, id)),
                }
            }
            Err(err) => {
                response.message = Some(err.to_string());
                response.status = match &err {
                    ResolveError::Malformed { .. } => "malformed",
                    ResolveError::NotFound { .. } => "not_found",
                    ResolveError::Ambiguous { .. } => "ambiguous",
                    ResolveError::WrongKind { .. } => "wrong_kind",
                }
                .to_owned();
                match err {
                    ResolveError::NotFound { suggestions, .. } => response.suggestions = suggestions,
                    ResolveError::Ambiguous { candidates, .. } => response.candidates = candidates,
                    ResolveError::WrongKind { found, .. } => {
                        response.kind = Some(found.label().to_owned())
                    }
                    ResolveError::Malformed { .. } => {}
                }
            }
        }
        Ok(Json(response))
    }

    /// Apply a persistent mutation batch in fixed order (unfix, fix, activate, deactivate, bounds);
    /// per-item failures are reported without aborting the batch. Optionally solve afterwards.
    #[tool(name = "model.apply")]
    async fn model_apply(
        &self,
        params: Parameters<ApplyParams>,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        let ApplyParams {
            unfix_variable_paths,
            fix_variable_values,
            activate_paths,
            deactivate_paths,
            set_bounds,
            solve,
            solver,
            top_n,
        } = params.0;
        let solve = if solve.unwrap_or(false) {
            Some(self.solver_setup(solver.as_ref())?)
        } else {
            None
        };
        let batch = MutationBatch {
            unfix: unfix_variable_paths.unwrap_or_default(),
            fix: fix_variable_values.unwrap_or_default(),
            activate: activate_paths.unwrap_or_default(),
            deactivate: deactivate_paths.unwrap_or_default(),
            bounds: set_bounds
                .unwrap_or_default()
                .into_iter()
                .map(|(path, bounds)| {
                    (path, BoundsChange { lower: bounds.lower, upper: bounds.upper })
                })
                .collect(),
        };
        tracing::debug!(solve = solve.is_some(), "model.apply");
        self.apply_batch(batch, solve, clamp_page(top_n, DEFAULT_APPLY_TOP_RESIDUALS)).await
    }

    /// Fix variables to the given values (persistent).
    #[tool(name = "model.fix")]
    async fn model_fix(&self, params: Parameters<FixParams>) -> Result<Json<ApplyResponse>, ErrorData> {
        let batch = MutationBatch { fix: params.0.values, ..MutationBatch::default() };
        self.apply_batch(batch, None, DEFAULT_APPLY_TOP_RESIDUALS).await
    }

    /// Unfix variables (persistent).
    #[tool(name = "model.unfix")]
    async fn model_unfix(
        &self,
        params: Parameters<PathsParams>,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        self.apply_batch(MutationBatch::unfix(params.0.paths), None, DEFAULT_APPLY_TOP_RESIDUALS)
            .await
    }

    /// Activate constraints or blocks (persistent).
    #[tool(name = "model.activate")]
    async fn model_activate(
        &self,
        params: Parameters<PathsParams>,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        let batch = MutationBatch { activate: params.0.paths, ..MutationBatch::default() };
        self.apply_batch(batch, None, DEFAULT_APPLY_TOP_RESIDUALS).await
    }

    /// Deactivate constraints or blocks (persistent).
    #[tool(name = "model.deactivate")]
    async fn model_deactivate(
        &self,
        params: Parameters<PathsParams>,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        let batch = MutationBatch { deactivate: params.0.paths, ..MutationBatch::default() };
        self.apply_batch(batch, None, DEFAULT_APPLY_TOP_RESIDUALS).await
    }

    /// Set variable bounds (persistent); an omitted side keeps its current bound.
    #[tool(name = "model.set_bounds")]
    async fn model_set_bounds(
        &self,
        params: Parameters<SetBoundsParams>,
    ) -> Result<Json<ApplyResponse>, ErrorData> {
        let bounds = params
            .0
            .bounds
            .into_iter()
            .map(|(path, bounds)| (path, BoundsChange { lower: bounds.lower, upper: bounds.upper }))
            .collect();
        let batch = MutationBatch { bounds, ..MutationBatch::default() };
        self.apply_batch(batch, None, DEFAULT_APPLY_TOP_RESIDUALS).await
    }

    /// Solve the model from its current point; the solution stays in the model. Solver failures
    /// and crashes are reported in the outcome, never as tool errors.
    #[tool(name = "model.solve")]
    async fn model_solve(
        &self,
        params: Parameters<SolverParams>,
    ) -> Result<Json<SolveResponse>, ErrorData> {
        let (solver, options) = self.solver_setup(Some(&params.0))?;
        tracing::debug!(backend = solver.name(), "model.solve");
        let response = self
            .with_state_blocking(move |state| {
                let evaluation = run_solve(solver.as_ref(), &mut state.model, &options);
                state.evaluations += 1;
                Ok(SolveResponse {
                    evaluation: evaluation_response(&evaluation),
                    degrees_of_freedom: state.model.degrees_of_freedom(),
                })
            })
            .await?;
        Ok(Json(response))
    }

    /// Solve one iteration at a time, recording tracked variable values (or constraint
    /// residuals) after every step; stops once the solver terminates for any reason other than
    /// the iteration limit. `max_cpu_time` bounds the whole call.
    #[tool(name = "model.step_solve")]
    async fn model_step_solve(
        &self,
        params: Parameters<StepSolveParams>,
    ) -> Result<Json<StepSolveResponse>, ErrorData> {
        let StepSolveParams { track, max_steps, solver } = params.0;
        let (solver, options) = self.solver_setup(solver.as_ref())?;
        let max_steps = usize::try_from(max_steps.unwrap_or(DEFAULT_MAX_STEPS)).unwrap_or(usize::MAX);
        let max = self.settings.max_step_solve_steps;
        if max_steps > max {
            return Err(map_explore_error(ExploreError::TooManySteps { max }));
        }
        let response = self
            .with_state_blocking(move |state| {
                let outcome =
                    explore::step_solve(&mut state.model, solver.as_ref(), &options, max_steps, &track)
                        .map_err(map_explore_error)?;
                state.evaluations += outcome.steps as u64;
                Ok(StepSolveResponse {
                    steps: outcome.steps as u64,
                    series: outcome
                        .series
                        .into_iter()
                        .map(|series| TrackedSeriesItem { path: series.path, values: series.values })
                        .collect(),
                    last: evaluation_response(&outcome.last),
                })
            })
            .await?;
        Ok(Json(response))
    }

    /// Structural diagnostics report with under/over-constrained sets; set `include_numerical`
    /// after a solve to add the solution-dependent checks.
    #[tool(name = "diagnostics.run")]
    async fn diagnostics_run(
        &self,
        params: Parameters<DiagnosticsRunParams>,
    ) -> Result<Json<DiagnosticsRunResponse>, ErrorData> {
        let include_numerical = params.0.include_numerical.unwrap_or(false);
        let thresholds = self.thresholds();
        let response = self
            .with_state_blocking(move |state| {
                let toolbox = Toolbox::new(&state.model, thresholds);
                let (structural, partition) = guarded("structural diagnostics", || {
                    (toolbox.structural_report(), toolbox.partition())
                })
                .map_err(|message| ErrorData::internal_error(message, None))?;
                let mut report_text = structural.render("Structural Diagnostics");
                report_text.push_str("\n\n");
                report_text.push_str(&render_partition(&partition));

                let mut caveat = None;
                let numerical = if include_numerical {
                    if state.evaluations == 0 {
                        caveat = Some(
                            "no evaluation has run yet; numerical results describe the initial point"
                                .to_owned(),
                        );
                    }
                    match guarded("numerical diagnostics", || toolbox.numerical_report()) {
                        Ok(report) => {
                            report_text.push_str("\n\n");
                            report_text.push_str(&report.render("Numerical Diagnostics"));
                            Some(report)
                        }
                        Err(message) => {
                            caveat = Some(message);
                            None
                        }
                    }
                } else {
                    None
                };

                let headline = match &numerical {
                    Some(numerical) => format!(
                        "structural: {}; numerical: {}",
                        structural.headline(),
                        numerical.headline()
                    ),
                    None => format!("structural: {}", structural.headline()),
                };

                Ok(DiagnosticsRunResponse {
                    headline,
                    report_text,
                    numerical_included: numerical.is_some(),
                    caveat,
                    structural: report_sections(&structural),
                    numerical: numerical.as_ref().map(report_sections),
                    partition: partition_response(partition),
                })
            })
            .await?;
        Ok(Json(response))
    }

    /// Run one targeted diagnostic view; `kind` is one of the fixed display kinds
    /// (large_residuals, variables_at_bounds, extreme_jacobian_entries, ...).
    #[tool(name = "diagnostics.display")]
    async fn diagnostics_display(
        &self,
        params: Parameters<DiagnosticsDisplayParams>,
    ) -> Result<Json<DiagnosticsDisplayResponse>, ErrorData> {
        let kind = DisplayKind::from_str(&params.0.kind).map_err(|err| {
            ErrorData::invalid_params(
                err.to_string(),
                Some(serde_json::json!({
                    "kind": err.kind,
                    "allowed": DisplayKind::ALL.iter().map(|kind| kind.as_str()).collect::<Vec<_>>(),
                })),
            )
        })?;

        let thresholds = self.thresholds();
        let report = self
            .with_state_blocking(move |state| {
                let toolbox = Toolbox::new(&state.model, thresholds);
                Ok(guarded(kind.as_str(), || toolbox.display(kind)).unwrap_or_else(|message| {
                    DisplayReport { kind, findings: Vec::new(), error: Some(message) }
                }))
            })
            .await?;
        Ok(Json(DiagnosticsDisplayResponse {
            kind: kind.as_str().to_owned(),
            count: report.findings.len() as u64,
            report_text: report.render(),
            findings: report
                .findings
                .into_iter()
                .map(|finding| FindingItem { path: finding.path, detail: finding.detail })
                .collect(),
            error: report.error,
        }))
    }

    /// Dulmage-Mendelsohn partition: under- and over-constrained variables and constraints as
    /// plain path lists.
    #[tool(name = "diagnostics.partition")]
    async fn diagnostics_partition(&self) -> Result<Json<PartitionResponse>, ErrorData> {
        let partition = self
            .with_state_blocking(|state| {
                guarded("partition", || partition(&state.model))
                    .map_err(|message| ErrorData::internal_error(message, None))
            })
            .await?;
        Ok(Json(partition_response(partition)))
    }

    /// Per-unit variable tables for every block directly under the flowsheet block `fs`.
    #[tool(name = "flowsheet.report")]
    async fn flowsheet_report(&self) -> Result<Json<FlowsheetReportResponse>, ErrorData> {
        let state = self.state.lock().await;
        Ok(Json(flowsheet_report(&state.model)))
    }

    /// Evaluate one operating point: `unfix_first` is applied persistently, `inputs` are fixed
    /// only for this evaluation and restored afterwards whatever the outcome.
    #[tool(name = "explore.point_test")]
    async fn explore_point_test(
        &self,
        params: Parameters<PointTestParams>,
    ) -> Result<Json<PointTestResponse>, ErrorData> {
        let PointTestParams { inputs, unfix_first, solver } = params.0;
        let (solver, options) = self.solver_setup(solver.as_ref())?;
        let test = PointTest { inputs, unfix_first: unfix_first.unwrap_or_default() };
        let response = self
            .with_state_blocking(move |state| {
                let outcome =
                    explore::point_test(&mut state.model, solver.as_ref(), &options, &test)
                        .map_err(map_explore_error)?;
                if outcome.evaluation.termination != Termination::NotAttempted {
                    state.evaluations += 1;
                }
                Ok(PointTestResponse {
                    evaluation: evaluation_response(&outcome.evaluation),
                    dof_before: outcome.dof_before,
                    dof_after: outcome.dof_after,
                    unfix_not_found: outcome.unfix_not_found,
                    unfix_errors: outcome.unfix_errors,
                })
            })
            .await?;
        Ok(Json(response))
    }

    /// Sequential sweep over the Cartesian grid of evenly spaced input samples; each sample is
    /// a point test without `unfix_first`, and failing samples never abort the sweep.
    #[tool(name = "explore.sweep")]
    async fn explore_sweep(
        &self,
        params: Parameters<SweepParams>,
    ) -> Result<Json<SweepResponse>, ErrorData> {
        let SweepParams { inputs, sample_size, warm_start, solver } = params.0;
        let (solver, options) = self.solver_setup(solver.as_ref())?;
        let request = SweepRequest {
            inputs: inputs
                .into_iter()
                .map(|input| SweepInput { path: input.path, lower: input.lower, upper: input.upper })
                .collect(),
            sample_size: sample_size
                .into_iter()
                .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
                .collect(),
            warm_start: warm_start.unwrap_or(true),
            max_samples: self.settings.max_sweep_samples,
        };
        let response = self
            .with_state_blocking(move |state| {
                let outcome = explore::sweep(&mut state.model, solver.as_ref(), &options, &request)
                    .map_err(map_explore_error)?;
                state.evaluations += outcome
                    .samples
                    .iter()
                    .filter(|sample| sample.evaluation.termination != Termination::NotAttempted)
                    .count() as u64;
                Ok(sweep_response(outcome))
            })
            .await?;
        Ok(Json(response))
    }
}

#[tool_handler]
impl ServerHandler for FlowsheetMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Flowsheet model server (tools: model.summary, model.list_variables, model.list_constraints, model.top_residuals, model.resolve, model.apply, model.fix, model.unfix, model.activate, model.deactivate, model.set_bounds, model.solve, model.step_solve, diagnostics.run, diagnostics.display, diagnostics.partition, flowsheet.report, explore.point_test, explore.sweep). Mutations persist; explore.* restores its test inputs."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// Response mapping and formatting helpers for MCP tool handlers.
include!("server/helpers.rs");
