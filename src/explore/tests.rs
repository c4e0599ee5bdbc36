// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rstest::rstest;

use crate::model::{fixtures, resolve_variable, Flowsheet};
use crate::ops::{apply, MutationBatch};
use crate::solve::{
    NewtonSolver, SolveReport, Solver, SolverError, SolverOptions, Termination,
};

use super::{
    linspace, point_test, step_solve, sweep, ExploreError, PointTest, SweepInput, SweepRequest,
};

const OUTLET_T: &str = "fs.heater.outlet.temperature[0.0]";
const MIXED_T: &str = "fs.mixer.outlet.temperature[0.0]";

struct Panicking;

impl Solver for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn solve(&self, _: &mut Flowsheet, _: &SolverOptions) -> Result<SolveReport, SolverError> {
        panic!("solver crashed");
    }
}

/// Records the starting value of one variable, then scribbles over it.
struct Recording {
    seen: Mutex<Vec<Option<f64>>>,
}

impl Solver for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn solve(&self, model: &mut Flowsheet, _: &SolverOptions) -> Result<SolveReport, SolverError> {
        let id = resolve_variable(model, MIXED_T).expect("mixed temperature");
        self.seen.lock().expect("lock").push(model.value(id));
        model.set_value(id, Some(999.0));
        Ok(SolveReport {
            termination: Termination::Optimal,
            iterations: 1,
            message: "recorded".to_owned(),
            trace: Vec::new(),
        })
    }
}

fn heater() -> Flowsheet {
    fixtures::heater().expect("heater fixture")
}

fn state(model: &Flowsheet, path: &str) -> (Option<f64>, bool) {
    let id = resolve_variable(model, path).expect("variable");
    (model.value(id), model.variable(id).is_fixed())
}

fn newton() -> NewtonSolver {
    NewtonSolver::newton()
}

#[test]
fn point_test_does_not_overwrite_a_persistent_fix() {
    let mut model = heater();
    let batch = MutationBatch {
        fix: BTreeMap::from([(OUTLET_T.to_owned(), 410.0)]),
        ..MutationBatch::default()
    };
    apply(&mut model, &batch).expect("persistent fix");

    let test = PointTest {
        inputs: BTreeMap::from([(OUTLET_T.to_owned(), 420.0)]),
        ..PointTest::default()
    };
    let outcome =
        point_test(&mut model, &newton(), &SolverOptions::default(), &test).expect("point test");

    assert!(outcome.evaluation.success, "{:?}", outcome.evaluation);
    assert_eq!(outcome.dof_before, 0);
    assert_eq!(outcome.dof_after, 0);
    assert_eq!(state(&model, OUTLET_T), (Some(410.0), true));
}

#[test]
fn unfix_first_persists_while_inputs_are_restored() {
    let mut model = fixtures::valve().expect("valve");
    let opening = "fs.valve.valve_opening[0.0]";
    let outlet = "fs.valve.outlet.pressure[0.0]";
    let before = state(&model, outlet);

    let test = PointTest {
        inputs: BTreeMap::from([(outlet.to_owned(), 100_000.0)]),
        unfix_first: vec![opening.to_owned(), "fs.valve.nope".to_owned()],
    };
    let outcome =
        point_test(&mut model, &newton(), &SolverOptions::default(), &test).expect("point test");

    assert!(outcome.evaluation.success, "{:?}", outcome.evaluation);
    assert_eq!(outcome.dof_before, 1);
    assert_eq!(outcome.dof_after, 0);
    assert_eq!(outcome.unfix_not_found, vec!["fs.valve.nope"]);

    assert_eq!(state(&model, outlet), before);
    let (opening_value, opening_fixed) = state(&model, opening);
    assert!(!opening_fixed);
    // solved opening for a 100 kPa outlet is left in place
    let expected = (100.0_f64 / (0.05 * 0.05 * 101_325.0)).sqrt();
    assert!((opening_value.expect("value") - expected).abs() < 1e-6);
}

#[test]
fn over_specified_point_skips_the_solve_and_still_restores() {
    let mut model = heater();
    let before = state(&model, MIXED_T);
    let test = PointTest {
        inputs: BTreeMap::from([(MIXED_T.to_owned(), 330.0)]),
        ..PointTest::default()
    };

    let outcome =
        point_test(&mut model, &newton(), &SolverOptions::default(), &test).expect("point test");
    assert_eq!(outcome.dof_after, -1);
    assert_eq!(outcome.evaluation.termination, Termination::NotAttempted);
    assert!(!outcome.evaluation.success);
    assert_eq!(state(&model, MIXED_T), before);
}

#[test]
fn inputs_are_restored_when_the_solver_panics() {
    let mut model = heater();
    let test = PointTest {
        inputs: BTreeMap::from([(OUTLET_T.to_owned(), 450.0)]),
        ..PointTest::default()
    };

    let outcome =
        point_test(&mut model, &Panicking, &SolverOptions::default(), &test).expect("point test");
    assert_eq!(outcome.evaluation.termination, Termination::Error);
    assert_eq!(outcome.evaluation.message, "solver crashed");
    assert_eq!(state(&model, OUTLET_T), (Some(400.0), true));
}

#[test]
fn unknown_input_rejects_the_call_before_unfixing_anything() {
    let mut model = heater();
    let original = model.clone();
    let test = PointTest {
        inputs: BTreeMap::from([("fs.heater.missing".to_owned(), 1.0)]),
        unfix_first: vec![OUTLET_T.to_owned()],
    };

    let err = point_test(&mut model, &newton(), &SolverOptions::default(), &test).unwrap_err();
    assert!(matches!(err, ExploreError::UnknownInput { .. }));
    assert_eq!(model, original);
}

#[test]
fn sweep_arity_mismatch_is_rejected_without_sampling() {
    let mut model = heater();
    let original = model.clone();
    let request = SweepRequest::new(
        vec![
            SweepInput { path: OUTLET_T.to_owned(), lower: 380.0, upper: 420.0 },
            SweepInput { path: "fs.feed_1.flow_mol[0.0]".to_owned(), lower: 4.0, upper: 6.0 },
        ],
        vec![3],
    );

    let err = sweep(&mut model, &newton(), &SolverOptions::default(), &request).unwrap_err();
    assert_eq!(err, ExploreError::SampleSizeMismatch { inputs: 2, sample_sizes: 1 });
    assert_eq!(model, original);
}

#[test]
fn sweep_walks_the_cartesian_grid_first_input_slowest() {
    let mut model = heater();
    let request = SweepRequest::new(
        vec![
            SweepInput { path: "fs.feed_1.flow_mol[0.0]".to_owned(), lower: 4.0, upper: 6.0 },
            SweepInput { path: "fs.feed_2.temperature[0.0]".to_owned(), lower: 340.0, upper: 360.0 },
        ],
        vec![2, 3],
    );

    let outcome = sweep(&mut model, &newton(), &SolverOptions::default(), &request).expect("sweep");
    assert_eq!(outcome.total, 6);
    assert_eq!(outcome.samples.len(), 6);
    assert_eq!(outcome.success_count, 6);
    assert_eq!(
        outcome.samples[1].values,
        vec![
            ("fs.feed_1.flow_mol[0.0]".to_owned(), 4.0),
            ("fs.feed_2.temperature[0.0]".to_owned(), 350.0),
        ]
    );
    assert_eq!(outcome.samples[3].values[0].1, 6.0);
    assert!(outcome.samples.iter().enumerate().all(|(i, sample)| sample.index == i));

    assert_eq!(state(&model, "fs.feed_1.flow_mol[0.0]"), (Some(5.0), true));
    assert_eq!(state(&model, "fs.feed_2.temperature[0.0]"), (Some(350.0), true));
}

#[test]
fn failing_sample_does_not_shrink_the_sweep() {
    let mut model = heater();
    let request = SweepRequest::new(
        vec![SweepInput { path: "fs.feed_1.flow_mol[0.0]".to_owned(), lower: 5.0, upper: 5_000.0 }],
        vec![2],
    );

    let outcome = sweep(&mut model, &newton(), &SolverOptions::default(), &request).expect("sweep");
    assert_eq!(outcome.samples.len(), 2);
    assert_eq!(outcome.success_count, 1);
    assert!(outcome.samples[0].evaluation.success);
    assert_eq!(outcome.samples[1].evaluation.termination, Termination::Infeasible);
}

#[rstest]
#[case::warm(true, vec![Some(300.0), Some(999.0)])]
#[case::cold(false, vec![Some(300.0), Some(300.0)])]
fn warm_start_controls_the_starting_point(
    #[case] warm_start: bool,
    #[case] expected: Vec<Option<f64>>,
) {
    let mut model = heater();
    let recording = Recording { seen: Mutex::new(Vec::new()) };
    let mut request = SweepRequest::new(
        vec![SweepInput { path: OUTLET_T.to_owned(), lower: 390.0, upper: 410.0 }],
        vec![2],
    );
    request.warm_start = warm_start;

    sweep(&mut model, &recording, &SolverOptions::default(), &request).expect("sweep");
    assert_eq!(*recording.seen.lock().expect("lock"), expected);
}

#[test]
fn sweep_rejects_oversized_and_degenerate_requests() {
    let mut model = heater();
    let input = |lower, upper| SweepInput { path: OUTLET_T.to_owned(), lower, upper };

    let mut request = SweepRequest::new(vec![input(390.0, 410.0), input(390.0, 410.0)], vec![200, 200]);
    let err = sweep(&mut model, &newton(), &SolverOptions::default(), &request).unwrap_err();
    assert_eq!(err, ExploreError::TooManySamples { max: 10_000 });

    request = SweepRequest::new(vec![input(390.0, 410.0)], vec![0]);
    let err = sweep(&mut model, &newton(), &SolverOptions::default(), &request).unwrap_err();
    assert!(matches!(err, ExploreError::ZeroSamples { .. }));

    request = SweepRequest::new(vec![input(410.0, 390.0)], vec![2]);
    let err = sweep(&mut model, &newton(), &SolverOptions::default(), &request).unwrap_err();
    assert!(matches!(err, ExploreError::InvalidRange { .. }));
}

#[test]
fn linspace_includes_both_ends_and_single_sample_is_lower() {
    assert_eq!(linspace(2.0, 4.0, 1), vec![2.0]);
    assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
}

#[test]
fn step_solve_tracks_values_until_convergence() {
    let mut model = fixtures::valve().expect("valve");
    let track = vec![
        "fs.valve.outlet.pressure[0.0]".to_owned(),
        "m.fs.valve.pressure_flow_equation[0.0]".to_owned(),
    ];

    let outcome = step_solve(&mut model, &newton(), &SolverOptions::default(), 20, &track)
        .expect("step solve");
    assert!(outcome.last.success, "{:?}", outcome.last);
    assert!(outcome.steps >= 1);
    assert_eq!(outcome.series[0].values.len(), outcome.steps);
    assert_eq!(outcome.series[1].path, "m.fs.valve.pressure_flow_equation[0.0]");

    let final_pressure = outcome.series[0].values.last().copied().flatten().expect("value");
    assert!((final_pressure - 41_325.0).abs() < 1e-3);
    let final_residual = outcome.series[1].values.last().copied().flatten().expect("residual");
    assert!(final_residual < 1e-6);
}

#[test]
fn step_solve_stops_at_max_steps() {
    let mut model = heater();
    let outcome =
        step_solve(&mut model, &newton(), &SolverOptions::default(), 1, &[MIXED_T.to_owned()])
            .expect("step solve");
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.last.termination, Termination::MaxIterations);
    assert_eq!(outcome.series[0].values.len(), 1);
}

/// Never converges and takes a while per iteration.
struct Slow;

impl Solver for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn solve(&self, _: &mut Flowsheet, _: &SolverOptions) -> Result<SolveReport, SolverError> {
        thread::sleep(Duration::from_millis(20));
        Ok(SolveReport {
            termination: Termination::MaxIterations,
            iterations: 1,
            message: "iteration limit".to_owned(),
            trace: Vec::new(),
        })
    }
}

#[test]
fn step_solve_time_limit_bounds_the_whole_call() {
    let mut model = heater();
    let options = SolverOptions { max_cpu_time: Duration::from_millis(30), ..SolverOptions::default() };

    let outcome = step_solve(&mut model, &Slow, &options, 100, &[MIXED_T.to_owned()])
        .expect("step solve");
    assert!(outcome.steps >= 1 && outcome.steps < 100, "steps = {}", outcome.steps);
    assert_eq!(outcome.last.termination, Termination::MaxTimeLimit);
    assert!(!outcome.last.success);
    assert_eq!(outcome.series[0].values.len(), outcome.steps);
}

#[test]
fn step_solve_rejects_bad_requests() {
    let mut model = heater();
    let options = SolverOptions::default();

    let err = step_solve(&mut model, &newton(), &options, 0, &[]).unwrap_err();
    assert_eq!(err, ExploreError::ZeroSteps);

    let err = step_solve(&mut model, &newton(), &options, 5, &["fs.nope".to_owned()]).unwrap_err();
    assert!(matches!(err, ExploreError::UnknownTrackedPath { .. }));

    let err = step_solve(&mut model, &newton(), &options, 5, &["fs.heater".to_owned()]).unwrap_err();
    assert!(matches!(err, ExploreError::UnknownTrackedPath { .. }));
}
