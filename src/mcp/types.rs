// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VariableItem {
    pub path: String,
    pub value: Option<f64>,
    pub fixed: bool,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConstraintItem {
    pub path: String,
    /// Effective activity: the constraint and every enclosing block are active.
    pub active: bool,
    pub equality: bool,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub body: Option<f64>,
    pub residual: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlockItem {
    pub path: String,
    pub unit: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelSummaryResponse {
    pub root_alias: String,
    pub degrees_of_freedom: i64,
    pub n_variables: u64,
    pub n_fixed_variables: u64,
    pub n_constraints: u64,
    pub n_active_constraints: u64,
    pub n_active_equalities: u64,
    pub n_blocks: u64,
    /// Evaluations run so far, exploratory ones included.
    pub evaluations: u64,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListVariablesParams {
    /// Case-insensitive substring filter on the path.
    pub pattern: Option<String>,
    pub only_fixed: Option<bool>,
    pub only_unfixed: Option<bool>,
    /// Page size, clamped to [1, 500] (default 200).
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListVariablesResponse {
    pub items: Vec<VariableItem>,
    pub count: u64,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListConstraintsParams {
    pub pattern: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListConstraintsResponse {
    pub items: Vec<ConstraintItem>,
    pub count: u64,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TopResidualsParams {
    /// Number of rows, clamped to [1, 500] (default 50).
    pub n: Option<u64>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResidualItem {
    pub path: String,
    pub residual: f64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopResidualsResponse {
    pub items: Vec<ResidualItem>,
    pub count: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResolveParams {
    pub path: String,
    /// One of `variable`, `constraint`, `block`, `any` (default).
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveResponse {
    pub path: String,
    /// `resolved`, `not_found`, `ambiguous`, `malformed` or `wrong_kind`.
    pub status: String,
    pub canonical_path: Option<String>,
    pub kind: Option<String>,
    pub variable: Option<VariableItem>,
    pub constraint: Option<ConstraintItem>,
    pub block: Option<BlockItem>,
    pub message: Option<String>,
    pub suggestions: Vec<String>,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SolverParams {
    /// Solver backend id (default from server settings).
    pub backend: Option<String>,
    /// Return the per-iteration trace.
    pub tee: Option<bool>,
    pub max_iter: Option<u64>,
    /// Seconds.
    pub max_cpu_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationResponse {
    pub success: bool,
    pub termination: String,
    pub message: String,
    pub exception: Option<String>,
    pub iterations: u64,
    pub wall_time_ms: f64,
    pub numerical_issue: bool,
    pub trace: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct BoundsParams {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ApplyParams {
    pub unfix_variable_paths: Option<Vec<String>>,
    pub fix_variable_values: Option<BTreeMap<String, f64>>,
    /// Constraint or block paths.
    pub activate_paths: Option<Vec<String>>,
    pub deactivate_paths: Option<Vec<String>>,
    /// An omitted side keeps its current bound.
    pub set_bounds: Option<BTreeMap<String, BoundsParams>>,
    /// Solve after applying and report the top residuals.
    pub solve: Option<bool>,
    pub solver: Option<SolverParams>,
    pub top_n: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryResult {
    pub applied: Vec<String>,
    pub not_found: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApplyResponse {
    /// `applied` or `partial`.
    pub status: String,
    pub unfix: CategoryResult,
    pub fix: CategoryResult,
    pub activate: CategoryResult,
    pub deactivate: CategoryResult,
    pub bounds: CategoryResult,
    pub degrees_of_freedom: i64,
    pub solve: Option<EvaluationResponse>,
    pub top_residuals: Option<Vec<ResidualItem>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FixParams {
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PathsParams {
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetBoundsParams {
    pub bounds: BTreeMap<String, BoundsParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SolveResponse {
    pub evaluation: EvaluationResponse,
    pub degrees_of_freedom: i64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StepSolveParams {
    /// Variable paths (value) or constraint paths (residual) recorded after every step.
    pub track: Vec<String>,
    /// Default 20.
    pub max_steps: Option<u64>,
    pub solver: Option<SolverParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrackedSeriesItem {
    pub path: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepSolveResponse {
    pub steps: u64,
    pub series: Vec<TrackedSeriesItem>,
    pub last: EvaluationResponse,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DiagnosticsRunParams {
    pub include_numerical: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportSections {
    pub statistics: Vec<String>,
    pub warnings: Vec<String>,
    pub cautions: Vec<String>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionResponse {
    pub under_constrained_variables: Vec<String>,
    pub under_constrained_constraints: Vec<String>,
    pub over_constrained_variables: Vec<String>,
    pub over_constrained_constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsRunResponse {
    pub headline: String,
    pub report_text: String,
    pub numerical_included: bool,
    /// Set when numerical results were requested before any evaluation.
    pub caveat: Option<String>,
    pub structural: ReportSections,
    pub numerical: Option<ReportSections>,
    pub partition: PartitionResponse,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagnosticsDisplayParams {
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindingItem {
    pub path: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsDisplayResponse {
    pub kind: String,
    pub findings: Vec<FindingItem>,
    pub count: u64,
    pub error: Option<String>,
    pub report_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UnitReport {
    pub path: String,
    pub unit: Option<String>,
    pub active: bool,
    pub variables: Vec<VariableItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FlowsheetReportResponse {
    pub report_text: Option<String>,
    pub units: Vec<UnitReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PointTestParams {
    /// Variables fixed to these values for this evaluation only.
    pub inputs: BTreeMap<String, f64>,
    /// Variables unfixed persistently before the evaluation.
    pub unfix_first: Option<Vec<String>>,
    pub solver: Option<SolverParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PointTestResponse {
    pub evaluation: EvaluationResponse,
    pub dof_before: i64,
    pub dof_after: i64,
    pub unfix_not_found: Vec<String>,
    pub unfix_errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SweepInputParams {
    pub path: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SweepParams {
    pub inputs: Vec<SweepInputParams>,
    /// Samples per input, same length as `inputs`; a size of 1 samples only `lower`.
    pub sample_size: Vec<u64>,
    /// Start each sample from the previous sample's solution (default true).
    pub warm_start: Option<bool>,
    pub solver: Option<SolverParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SampleInputValue {
    pub path: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SampleItem {
    pub index: u64,
    pub inputs: Vec<SampleInputValue>,
    pub success: bool,
    pub termination: String,
    pub iterations: u64,
    pub wall_time_ms: f64,
    pub numerical_issue: bool,
    /// Solver message or error text for unsuccessful samples.
    pub error: Option<String>,
    pub degrees_of_freedom: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SweepResponse {
    pub samples: Vec<SampleItem>,
    pub total: u64,
    pub success_count: u64,
}
