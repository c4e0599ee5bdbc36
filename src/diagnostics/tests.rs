// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::{fixture, rstest};

use crate::model::{fixtures, resolve_variable, Expr, Flowsheet, VariableSpec};
use crate::solve::{run_solve, NewtonSolver, SolverOptions};

use super::{partition, DisplayKind, Thresholds, Toolbox};

#[fixture]
fn valve() -> Flowsheet {
    fixtures::valve().expect("valve fixture")
}

fn paths(kind: DisplayKind, model: &Flowsheet) -> Vec<String> {
    let report = Toolbox::new(model, Thresholds::default()).display(kind);
    assert!(report.error.is_none(), "{:?}", report.error);
    report.findings.into_iter().map(|finding| finding.path).collect()
}

#[rstest]
#[case("large_residuals", DisplayKind::LargeResiduals)]
#[case("near_parallel_variables", DisplayKind::NearParallelVariables)]
#[case(" extreme_jacobian_entries ", DisplayKind::ExtremeJacobianEntries)]
fn display_kinds_parse_from_their_names(#[case] raw: &str, #[case] expected: DisplayKind) {
    assert_eq!(raw.parse::<DisplayKind>(), Ok(expected));
}

#[test]
fn every_display_kind_round_trips_and_unknown_kinds_are_rejected() {
    for kind in DisplayKind::ALL {
        assert_eq!(kind.as_str().parse::<DisplayKind>(), Ok(kind));
    }
    let err = "largest_residuals".parse::<DisplayKind>().unwrap_err();
    assert_eq!(err.to_string(), "unknown display kind 'largest_residuals'");
}

#[rstest]
fn every_display_kind_runs_on_the_demo(valve: Flowsheet) {
    let toolbox = Toolbox::new(&valve, Thresholds::default());
    for kind in DisplayKind::ALL {
        let report = toolbox.display(kind);
        assert_eq!(report.kind, kind);
        assert!(report.error.is_none(), "{kind}: {:?}", report.error);
        assert!(report.render().contains(&format!("({}):", report.findings.len())));
    }
}

#[rstest]
fn square_demo_is_structurally_clean(valve: Flowsheet) {
    let report = Toolbox::new(&valve, Thresholds::default()).structural_report();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(report.cautions.is_empty(), "{:?}", report.cautions);
    assert_eq!(report.headline(), "0 WARNINGS, 0 Cautions");
    assert!(report
        .statistics
        .contains(&"Activated Equality Constraints: 4 (Deactivated: 0)".to_owned()));
    assert!(report.render("Model Statistics").contains("No warnings found!"));
    assert!(partition(&valve).is_structurally_sound());
}

#[rstest]
fn freed_specification_shows_up_as_under_constrained(mut valve: Flowsheet) {
    let opening = resolve_variable(&valve, "fs.valve.valve_opening[0.0]").expect("opening");
    valve.unfix(opening);

    let split = partition(&valve);
    assert_eq!(
        split.under_variables,
        vec![
            "fs.valve.deltaP[0.0]",
            "fs.valve.outlet.pressure[0.0]",
            "fs.valve.valve_opening[0.0]",
        ]
    );
    assert_eq!(
        split.under_constraints,
        vec!["fs.valve.pressure_balance[0.0]", "fs.valve.pressure_flow_equation[0.0]"]
    );
    assert!(split.over_variables.is_empty());
    assert!(split.over_constraints.is_empty());

    let report = Toolbox::new(&valve, Thresholds::default()).structural_report();
    assert_eq!(report.warnings[0], "1 Degrees of Freedom");
    assert!(report.warnings[1].starts_with("Structural singularity found"));
}

#[rstest]
fn extra_specification_shows_up_as_over_constrained(mut valve: Flowsheet) {
    let outlet = resolve_variable(&valve, "fs.valve.outlet.pressure[0.0]").expect("outlet");
    valve.fix(outlet, Some(120_000.0)).expect("fix");

    let split = partition(&valve);
    assert!(split.under_variables.is_empty());
    assert_eq!(split.over_variables, vec!["fs.valve.deltaP[0.0]", "fs.valve.outlet.flow_mol[0.0]"]);
    assert_eq!(
        split.over_constraints,
        vec![
            "fs.valve.material_balance[0.0]",
            "fs.valve.pressure_balance[0.0]",
            "fs.valve.pressure_flow_equation[0.0]",
        ]
    );

    // paths stay usable after the model changes again
    valve.unfix(outlet);
    assert_eq!(split.over_variables.len(), 2);
}

#[rstest]
fn large_residuals_disappear_after_a_solve(mut valve: Flowsheet) {
    assert_eq!(
        paths(DisplayKind::LargeResiduals, &valve),
        vec![
            "fs.valve.pressure_balance[0.0]",
            "fs.valve.isothermal[0.0]",
            "fs.valve.pressure_flow_equation[0.0]",
        ]
    );

    let outcome = run_solve(&NewtonSolver::newton(), &mut valve, &SolverOptions::default());
    assert!(outcome.success);
    assert!(paths(DisplayKind::LargeResiduals, &valve).is_empty());

    let report = Toolbox::new(&valve, Thresholds::default()).numerical_report();
    assert!(report.statistics[0].starts_with("Jacobian Condition Number: "));
    assert!(!report.warnings.iter().any(|line| line.contains("large residuals")));
}

#[rstest]
fn extreme_values_flag_pressures(valve: Flowsheet) {
    let flagged = paths(DisplayKind::VariablesExtremeValues, &valve);
    assert!(flagged.contains(&"fs.valve.inlet.pressure[0.0]".to_owned()));
    assert!(!flagged.contains(&"fs.valve.valve_opening[0.0]".to_owned()));
}

#[test]
fn term_checks_flag_cancellation_mismatch_and_units() {
    let mut model = Flowsheet::default();
    let a = model.add_variable("a", VariableSpec::fixed(1e5).with_units("Pa")).expect("a");
    let b = model.add_variable("b", VariableSpec::fixed(1e5).with_units("Pa")).expect("b");
    let z = model.add_variable("z", VariableSpec::free(0.0).with_units("Pa")).expect("z");
    let t = model.add_variable("t", VariableSpec::free(1e-3).with_units("K")).expect("t");
    model
        .add_equality(
            "cancel",
            Expr::sub(Expr::var(z), Expr::sub(Expr::var(a), Expr::var(b))),
        )
        .expect("cancel");
    model
        .add_equality("mixed", Expr::add(vec![Expr::var(a), Expr::var(t)]))
        .expect("mixed");

    assert_eq!(paths(DisplayKind::CancelingTerms, &model), vec!["cancel"]);
    assert_eq!(paths(DisplayKind::MismatchedTerms, &model), vec!["mixed"]);
    assert_eq!(paths(DisplayKind::InconsistentUnits, &model), vec!["mixed"]);
}

#[test]
fn evaluation_hazards_respect_bounds() {
    let mut model = Flowsheet::default();
    let x = model.add_variable("x", VariableSpec::free(2.0)).expect("x");
    let y = model
        .add_variable("y", VariableSpec::free(2.0).bounded(Some(1.0), None))
        .expect("y");
    model.add_equality("log_x", Expr::log(Expr::var(x))).expect("log_x");
    model.add_equality("log_y", Expr::log(Expr::var(y))).expect("log_y");
    model
        .add_equality("ratio", Expr::div(Expr::constant(1.0), Expr::var(x)))
        .expect("ratio");

    let report = Toolbox::new(&model, Thresholds::default()).display(
        DisplayKind::PotentialEvaluationErrors,
    );
    let flagged = report.findings.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
    assert_eq!(flagged, vec!["log_x", "ratio"]);
    assert!(report.findings[1].detail.contains("division"));
}

#[test]
fn parallel_rows_and_unused_variables_are_reported() {
    let mut model = Flowsheet::default();
    let x = model.add_variable("x", VariableSpec::free(1.0)).expect("x");
    let y = model.add_variable("y", VariableSpec::free(1.0)).expect("y");
    model.add_variable("spare", VariableSpec::fixed(3.0)).expect("spare");
    model
        .add_equality("first", Expr::add(vec![Expr::var(x), Expr::var(y)]))
        .expect("first");
    model
        .add_equality(
            "second",
            Expr::add(vec![
                Expr::mul(vec![Expr::constant(2.0), Expr::var(x)]),
                Expr::mul(vec![Expr::constant(2.0), Expr::var(y)]),
            ]),
        )
        .expect("second");

    let toolbox = Toolbox::new(&model, Thresholds::default());
    let parallel = toolbox.display(DisplayKind::NearParallelConstraints);
    assert_eq!(parallel.findings.len(), 1);
    assert_eq!(parallel.findings[0].path, "first");
    assert_eq!(parallel.findings[0].detail, "parallel to second");

    let unused = toolbox.display(DisplayKind::UnusedVariables);
    assert_eq!(unused.findings.len(), 1);
    assert_eq!(unused.findings[0].path, "spare");
    assert_eq!(unused.findings[0].detail, "fixed");
}

#[test]
fn unevaluable_jacobian_is_reported_not_raised() {
    let mut model = Flowsheet::default();
    let x = model.add_variable("x", VariableSpec::free(0.0)).expect("x");
    model.add_equality("log_x", Expr::log(Expr::var(x))).expect("log_x");

    let toolbox = Toolbox::new(&model, Thresholds::default());
    let report = toolbox.display(DisplayKind::ExtremeJacobianEntries);
    assert!(report.findings.is_empty());
    assert!(report.error.as_deref().is_some_and(|error| error.contains("log_x")));

    let numerical = toolbox.numerical_report();
    assert!(numerical.warnings[0].contains("could not be evaluated"));
}
