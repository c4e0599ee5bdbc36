// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::rstest;

use crate::model::{fixtures, resolve_variable, Expr, Flowsheet, VariableSpec};

use super::{
    run_solve, NewtonSolver, SolveReport, Solver, SolverError, SolverOptions, SolverRegistry,
    Termination,
};

struct Panicking;

impl Solver for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn solve(&self, _: &mut Flowsheet, _: &SolverOptions) -> Result<SolveReport, SolverError> {
        panic!("license server unreachable");
    }
}

fn value_of(model: &Flowsheet, path: &str) -> f64 {
    let id = resolve_variable(model, path).expect("variable");
    model.value(id).expect("value")
}

#[rstest]
#[case::newton(NewtonSolver::newton())]
#[case::least_squares(NewtonSolver::least_squares())]
fn solves_the_valve(#[case] solver: NewtonSolver) {
    let mut model = fixtures::valve().expect("valve");
    let outcome = run_solve(&solver, &mut model, &SolverOptions::default());

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.termination, Termination::Optimal);
    assert!(outcome.exception.is_none());
    assert!((value_of(&model, "fs.valve.deltaP[0.0]") + 160_000.0).abs() < 1e-3);
    assert!((value_of(&model, "fs.valve.outlet.pressure[0.0]") - 41_325.0).abs() < 1e-3);
    assert!((value_of(&model, "fs.valve.outlet.temperature[0.0]") - 423.15).abs() < 1e-6);
}

#[test]
fn solves_the_heater_and_keeps_the_solution_in_the_model() {
    let mut model = fixtures::heater().expect("heater");
    let outcome = run_solve(&NewtonSolver::newton(), &mut model, &SolverOptions::default());

    assert!(outcome.success, "{outcome:?}");
    assert!((value_of(&model, "fs.mixer.outlet.temperature[0.0]") - 318.75).abs() < 1e-6);
    assert!((value_of(&model, "fs.heater.heat_duty[0.0]") - 48_945.0).abs() < 1e-3);
}

#[test]
fn iteration_limit_is_a_failed_outcome_not_an_error() {
    let mut model = fixtures::heater().expect("heater");
    let options = SolverOptions { max_iter: 1, ..SolverOptions::default() };
    let outcome = run_solve(&NewtonSolver::newton(), &mut model, &options);

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::MaxIterations);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.exception.is_none());
}

#[test]
fn trace_is_returned_only_with_tee() {
    let mut model = fixtures::valve().expect("valve");
    let quiet = run_solve(&NewtonSolver::newton(), &mut model, &SolverOptions::default());
    assert!(quiet.trace.is_empty());

    let mut model = fixtures::valve().expect("valve");
    let options = SolverOptions { tee: true, ..SolverOptions::default() };
    let loud = run_solve(&NewtonSolver::newton(), &mut model, &options);
    assert_eq!(loud.trace.len(), loud.iterations);
    assert!(loud.trace[0].starts_with("iter"));
}

#[test]
fn panicking_backend_becomes_a_failed_outcome() {
    let mut model = fixtures::valve().expect("valve");
    let outcome = run_solve(&Panicking, &mut model, &SolverOptions::default());

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::Error);
    assert_eq!(outcome.message, "license server unreachable");
    assert_eq!(outcome.exception.as_deref(), Some("license server unreachable"));
}

#[test]
fn fixed_variable_without_value_is_reported_as_an_error() {
    let mut model = Flowsheet::default();
    let x = model
        .add_variable("x", VariableSpec { fixed: true, ..VariableSpec::default() })
        .expect("x");
    let y = model.add_variable("y", VariableSpec::free(1.0)).expect("y");
    model.add_equality("c", Expr::sub(Expr::var(y), Expr::var(x))).expect("c");

    let outcome = run_solve(&NewtonSolver::newton(), &mut model, &SolverOptions::default());
    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::Error);
    assert!(outcome.message.contains("'x' has no value"));
}

#[test]
fn violated_inequality_is_infeasible() {
    let mut model = fixtures::heater().expect("heater");
    let outlet = resolve_variable(&model, "fs.heater.outlet.temperature[0.0]").expect("T");
    model.fix(outlet, Some(650.0)).expect("fix");
    let feed = resolve_variable(&model, "fs.feed_1.flow_mol[0.0]").expect("feed");
    model.fix(feed, Some(5_000.0)).expect("fix");

    let outcome = run_solve(&NewtonSolver::newton(), &mut model, &SolverOptions::default());
    assert_eq!(outcome.termination, Termination::Infeasible, "{outcome:?}");
    assert!(!outcome.success);
    assert!(outcome.message.contains("inequality"));
}

#[test]
fn default_registry_knows_both_backends() {
    let registry = SolverRegistry::default();
    assert_eq!(registry.names(), vec!["least_squares", "newton"]);
    assert!(registry.get("newton").is_some());
    assert!(registry.get("ipopt").is_none());
}
