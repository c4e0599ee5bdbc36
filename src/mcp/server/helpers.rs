// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// MCP server helper functions:
/// pagination, model-to-response mapping, error mapping, and text reports.
fn clamp_page(requested: Option<u64>, default: u64) -> u64 {
    requested.unwrap_or(default).clamp(1, MAX_PAGE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    limit: u64,
    offset: u64,
    total: u64,
}

impl Page {
    fn new(limit: Option<u64>, offset: Option<u64>, total: usize) -> Self {
        Self {
            limit: clamp_page(limit, DEFAULT_LIST_LIMIT),
            offset: offset.unwrap_or(0),
            total: total as u64,
        }
    }

    fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

fn matches_pattern(path: &str, pattern: Option<&str>) -> bool {
    match pattern {
        None | Some("") => true,
        Some(pattern) => path.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

fn parse_component_kind(raw: Option<&str>) -> Result<ComponentKind, ErrorData> {
    match raw.map(str::trim) {
        None | Some("any") => Ok(ComponentKind::Any),
        Some("variable") => Ok(ComponentKind::Variable),
        Some("constraint") => Ok(ComponentKind::Constraint),
        Some("block") => Ok(ComponentKind::Block),
        Some(other) => Err(ErrorData::invalid_params(
            format!("unknown component kind '{other}'"),
            Some(serde_json::json!({
                "kind": other,
                "allowed": ["variable", "constraint", "block", "any"],
            })),
        )),
    }
}

fn variable_item(model: &Flowsheet, id: VarId) -> VariableItem {
    let variable = model.variable(id);
    VariableItem {
        path: variable.path().to_string(),
        value: finite(variable.value()),
        fixed: variable.is_fixed(),
        lower: finite(variable.lower()),
        upper: finite(variable.upper()),
        units: variable.units().map(ToOwned::to_owned),
    }
}

fn constraint_item(model: &Flowsheet, id: ConstraintId) -> ConstraintItem {
    let constraint = model.constraint(id);
    ConstraintItem {
        path: constraint.path().to_string(),
        active: model.is_constraint_active(id),
        equality: constraint.is_equality(),
        lower: finite(constraint.lower()),
        upper: finite(constraint.upper()),
        body: finite(model.body_value(id)),
        residual: finite(model.residual(id)),
    }
}

fn block_item(model: &Flowsheet, id: BlockId) -> BlockItem {
    let block = model.block(id);
    BlockItem {
        path: block.path().to_string(),
        unit: block.unit().map(ToOwned::to_owned),
        active: model.is_block_active(id),
    }
}

/// Largest residuals first; constraints whose body cannot be evaluated are skipped.
/// Returns at most `n` rows and the number of rows considered.
fn top_residuals(model: &Flowsheet, n: u64, pattern: Option<&str>) -> (Vec<ResidualItem>, usize) {
    let mut rows = model
        .constraint_ids()
        .filter_map(|id| {
            let path = model.constraint(id).path().to_string();
            if !matches_pattern(&path, pattern) {
                return None;
            }
            let residual = finite(model.residual(id))?;
            Some(ResidualItem { path, residual, active: model.is_constraint_active(id) })
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| b.residual.total_cmp(&a.residual).then_with(|| a.path.cmp(&b.path)));
    let total = rows.len();
    rows.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    (rows, total)
}

/// Runs one diagnostic check, turning a panic into an error message.
fn guarded<T>(check: &str, work: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(work)).map_err(|payload| {
        let text = panic_text(payload.as_ref());
        tracing::error!(check, error = %text, "diagnostics panicked");
        format!("{check} failed to evaluate: {text}")
    })
}

fn evaluation_response(outcome: &EvaluationOutcome) -> EvaluationResponse {
    EvaluationResponse {
        success: outcome.success,
        termination: outcome.termination.label().to_owned(),
        message: outcome.message.clone(),
        exception: outcome.exception.clone(),
        iterations: outcome.iterations as u64,
        wall_time_ms: outcome.wall_time.as_secs_f64() * 1000.0,
        numerical_issue: outcome.numerical_issue(),
        trace: outcome.trace.clone(),
    }
}

fn category_result(outcome: &CategoryOutcome) -> CategoryResult {
    CategoryResult {
        applied: outcome.applied.clone(),
        not_found: outcome.not_found.clone(),
        errors: outcome.errors.clone(),
    }
}

fn apply_response(outcome: &ApplyOutcome) -> ApplyResponse {
    ApplyResponse {
        status: match outcome.status() {
            ApplyStatus::Applied => "applied",
            ApplyStatus::Partial => "partial",
        }
        .to_owned(),
        unfix: category_result(&outcome.unfix),
        fix: category_result(&outcome.fix),
        activate: category_result(&outcome.activate),
        deactivate: category_result(&outcome.deactivate),
        bounds: category_result(&outcome.bounds),
        degrees_of_freedom: outcome.dof,
        solve: None,
        top_residuals: None,
    }
}

fn map_batch_error(err: BatchError) -> ErrorData {
    let data = match &err {
        BatchError::EmptyBounds { path } => serde_json::json!({ "path": path }),
    };
    ErrorData::invalid_params(err.to_string(), Some(data))
}

fn map_explore_error(err: ExploreError) -> ErrorData {
    let data = match &err {
        ExploreError::UnknownInput { source } | ExploreError::UnknownTrackedPath { source } => {
            serde_json::json!({ "path": source.path() })
        }
        ExploreError::SampleSizeMismatch { inputs, sample_sizes } => {
            serde_json::json!({ "inputs": inputs, "sample_size": sample_sizes })
        }
        ExploreError::NonFiniteInput { path }
        | ExploreError::ZeroSamples { path }
        | ExploreError::InvalidRange { path, .. } => serde_json::json!({ "path": path }),
        ExploreError::TooManySamples { max } => serde_json::json!({ "max_samples": max }),
        ExploreError::TooManySteps { max } => serde_json::json!({ "max_steps": max }),
        ExploreError::NoInputs
        | ExploreError::ZeroSteps
        | ExploreError::Rejected { .. }
        | ExploreError::Batch { .. } => serde_json::Value::Null,
    };
    ErrorData::invalid_params(err.to_string(), (!data.is_null()).then_some(data))
}

fn report_sections(report: &Report) -> ReportSections {
    ReportSections {
        statistics: report.statistics.clone(),
        warnings: report.warnings.clone(),
        cautions: report.cautions.clone(),
        next_steps: report.next_steps.clone(),
    }
}

fn partition_response(partition: Partition) -> PartitionResponse {
    PartitionResponse {
        under_constrained_variables: partition.under_variables,
        under_constrained_constraints: partition.under_constraints,
        over_constrained_variables: partition.over_variables,
        over_constrained_constraints: partition.over_constraints,
    }
}

fn render_partition(partition: &Partition) -> String {
    let mut text = String::new();
    let sections = [
        ("Under-Constrained Set", &partition.under_variables, &partition.under_constraints),
        ("Over-Constrained Set", &partition.over_variables, &partition.over_constraints),
    ];
    for (title, variables, constraints) in sections {
        text.push_str(&"=".repeat(RULE_WIDTH));
        text.push('\n');
        text.push_str(title);
        text.push_str(":\n\n");
        if variables.is_empty() && constraints.is_empty() {
            text.push_str("    None\n\n");
            continue;
        }
        text.push_str(&format!("    Variables ({}):\n", variables.len()));
        for path in variables {
            text.push_str(&format!("        {path}\n"));
        }
        text.push_str(&format!("    Constraints ({}):\n", constraints.len()));
        for path in constraints {
            text.push_str(&format!("        {path}\n"));
        }
        text.push('\n');
    }
    text.push_str(&"=".repeat(RULE_WIDTH));
    text
}

const RULE_WIDTH: usize = 78;

fn flowsheet_report(model: &Flowsheet) -> FlowsheetReportResponse {
    let root = ComponentPath::from_str(FLOWSHEET_BLOCK).ok();
    let Some((root, ComponentRef::Block(_))) =
        root.and_then(|root| model.lookup(&root).map(|component| (root, component)))
    else {
        return FlowsheetReportResponse {
            report_text: None,
            units: Vec::new(),
            error: Some(format!("No flowsheet block found at {FLOWSHEET_BLOCK}")),
        };
    };

    // only blocks labelled with a unit model produce a report
    let units = model
        .child_blocks(Some(&root))
        .into_iter()
        .filter(|id| model.block(*id).unit().is_some())
        .map(|id| {
            let block = model.block(id);
            UnitReport {
                path: block.path().to_string(),
                unit: block.unit().map(ToOwned::to_owned),
                active: model.is_block_active(id),
                variables: model
                    .variables_under(block.path())
                    .into_iter()
                    .map(|var| variable_item(model, var))
                    .collect(),
            }
        })
        .collect::<Vec<_>>();

    let report_text = if units.is_empty() {
        "Flowsheet report produced no output.".to_owned()
    } else {
        units.iter().map(render_unit).collect::<Vec<_>>().join("\n\n")
    };
    FlowsheetReportResponse { report_text: Some(report_text), units, error: None }
}

fn render_unit(unit: &UnitReport) -> String {
    let number =
        |value: Option<f64>| value.map_or_else(|| "-".to_owned(), |value| format!("{value:.6e}"));
    let mut text = String::new();
    text.push_str(&"=".repeat(RULE_WIDTH));
    text.push('\n');
    text.push_str(&format!(
        "Unit : {}{}{}\n",
        unit.path,
        unit.unit.as_deref().map(|label| format!(" ({label})")).unwrap_or_default(),
        if unit.active { "" } else { " [deactivated]" },
    ));
    text.push_str(&"-".repeat(RULE_WIDTH));
    text.push('\n');
    text.push_str(&format!(
        "    {:<34} {:>13} {:>5} {:>13} {:>13}\n",
        "Variable", "Value", "Fixed", "Lower", "Upper"
    ));
    let prefix = format!("{}.", unit.path);
    for variable in &unit.variables {
        let name = variable.path.strip_prefix(&prefix).unwrap_or(&variable.path);
        text.push_str(&format!(
            "    {:<34} {:>13} {:>5} {:>13} {:>13}\n",
            name,
            number(variable.value),
            if variable.fixed { "yes" } else { "no" },
            number(variable.lower),
            number(variable.upper),
        ));
    }
    text.push_str(&"=".repeat(RULE_WIDTH));
    text
}

fn sweep_response(outcome: explore::SweepOutcome) -> SweepResponse {
    let samples = outcome
        .samples
        .into_iter()
        .map(|sample| {
            let evaluation = &sample.evaluation;
            SampleItem {
                index: sample.index as u64,
                inputs: sample
                    .values
                    .iter()
                    .map(|(path, value)| SampleInputValue { path: path.clone(), value: *value })
                    .collect(),
                success: evaluation.success,
                termination: evaluation.termination.label().to_owned(),
                iterations: evaluation.iterations as u64,
                wall_time_ms: evaluation.wall_time.as_secs_f64() * 1000.0,
                numerical_issue: evaluation.numerical_issue(),
                error: (!evaluation.success).then(|| {
                    evaluation.exception.clone().unwrap_or_else(|| evaluation.message.clone())
                }),
                degrees_of_freedom: sample.dof,
            }
        })
        .collect();
    SweepResponse {
        samples,
        total: outcome.total as u64,
        success_count: outcome.success_count as u64,
    }
}
