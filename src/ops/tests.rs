// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use crate::model::{fixtures, resolve_constraint, resolve_variable, Flowsheet};

use super::{apply, ApplyStatus, BatchError, BoundsChange, MutationBatch};

fn valve() -> Flowsheet {
    fixtures::valve().expect("valve fixture")
}

#[test]
fn missing_unfix_path_does_not_stop_fix_category() {
    let mut model = valve();
    let batch = MutationBatch {
        unfix: vec!["X".to_owned()],
        fix: BTreeMap::from([("fs.valve.valve_opening[0.0]".to_owned(), 0.7)]),
        ..MutationBatch::default()
    };

    let outcome = apply(&mut model, &batch).expect("apply");
    assert_eq!(outcome.unfix.not_found, vec!["X"]);
    assert!(outcome.unfix.applied.is_empty());
    assert_eq!(outcome.fix.applied, vec!["fs.valve.valve_opening[0.0]"]);
    assert_eq!(outcome.status(), ApplyStatus::Partial);

    let opening = resolve_variable(&model, "fs.valve.valve_opening[0.0]").expect("opening");
    assert_eq!(model.value(opening), Some(0.7));
    assert!(model.variable(opening).is_fixed());
}

#[test]
fn unfix_runs_before_fix_so_a_batch_can_swap_specifications() {
    let mut model = valve();
    let batch = MutationBatch {
        unfix: vec!["fs.valve.valve_opening[0.0]".to_owned()],
        fix: BTreeMap::from([
            ("fs.valve.valve_opening[0.0]".to_owned(), 0.6),
            ("fs.valve.outlet.pressure[0.0]".to_owned(), 120_000.0),
        ]),
        ..MutationBatch::default()
    };

    let outcome = apply(&mut model, &batch).expect("apply");
    assert_eq!(outcome.status(), ApplyStatus::Applied);
    let opening = resolve_variable(&model, "fs.valve.valve_opening[0.0]").expect("opening");
    assert!(model.variable(opening).is_fixed());
    assert_eq!(outcome.dof, -1);
}

#[test]
fn activate_runs_before_deactivate() {
    let mut model = valve();
    let path = "fs.valve.isothermal[0.0]";
    let batch = MutationBatch {
        activate: vec![path.to_owned()],
        deactivate: vec![path.to_owned()],
        ..MutationBatch::default()
    };

    apply(&mut model, &batch).expect("apply");
    let id = resolve_constraint(&model, path).expect("constraint");
    assert!(!model.is_constraint_active(id));
}

#[test]
fn dof_reflects_post_mutation_state() {
    let mut model = valve();
    let batch = MutationBatch {
        unfix: vec!["m.fs.valve.valve_opening[0.0]".to_owned()],
        deactivate: vec!["fs.valve.isothermal[0.0]".to_owned()],
        ..MutationBatch::default()
    };

    let outcome = apply(&mut model, &batch).expect("apply");
    assert_eq!(outcome.dof, model.degrees_of_freedom());
    // opening freed (+1), isothermal gone (-1 equation, outlet temperature leaves the system)
    assert_eq!(outcome.dof, 1);
}

#[test]
fn rejected_bounds_are_recorded_and_later_items_still_apply() {
    let mut model = valve();
    let batch = MutationBatch {
        deactivate: vec!["fs.valve.outlet.pressure[0.0]".to_owned()],
        bounds: BTreeMap::from([
            (
                "fs.valve.valve_opening[0.0]".to_owned(),
                BoundsChange { lower: Some(0.9), upper: Some(0.1) },
            ),
            (
                "fs.valve.outlet.pressure[0.0]".to_owned(),
                BoundsChange { lower: Some(5e4), upper: None },
            ),
        ]),
        ..MutationBatch::default()
    };

    let outcome = apply(&mut model, &batch).expect("apply");
    assert!(outcome.deactivate.errors.contains_key("fs.valve.outlet.pressure[0.0]"));
    assert!(outcome.bounds.errors.contains_key("fs.valve.valve_opening[0.0]"));
    assert_eq!(outcome.bounds.applied, vec!["fs.valve.outlet.pressure[0.0]"]);

    let pressure = resolve_variable(&model, "fs.valve.outlet.pressure[0.0]").expect("pressure");
    assert_eq!(model.variable(pressure).lower(), Some(5e4));
    assert_eq!(model.variable(pressure).upper(), Some(3e7));
}

#[test]
fn empty_bounds_reject_the_whole_batch() {
    let mut model = valve();
    let before = model.clone();
    let batch = MutationBatch {
        unfix: vec!["fs.valve.valve_opening[0.0]".to_owned()],
        bounds: BTreeMap::from([("fs.valve.Cv".to_owned(), BoundsChange::default())]),
        ..MutationBatch::default()
    };

    let err = apply(&mut model, &batch).unwrap_err();
    assert_eq!(err, BatchError::EmptyBounds { path: "fs.valve.Cv".to_owned() });
    assert_eq!(model, before);
}

#[test]
fn deactivating_a_block_is_supported() {
    let mut model = valve();
    let outcome = apply(
        &mut model,
        &MutationBatch { deactivate: vec!["fs.valve".to_owned()], ..MutationBatch::default() },
    )
    .expect("apply");
    assert_eq!(outcome.deactivate.applied, vec!["fs.valve"]);
    assert!(model.active_constraints().is_empty());
    assert_eq!(outcome.dof, 0);
}

#[test]
fn ambiguous_paths_are_errors_not_missing() {
    let mut model = Flowsheet::default();
    model.add_variable("fs.split[a]", crate::model::VariableSpec::free(0.5)).expect("a");
    model.add_variable("fs.split[b]", crate::model::VariableSpec::free(0.5)).expect("b");

    let outcome = apply(&mut model, &MutationBatch::unfix(["fs.split"])).expect("apply");
    assert!(outcome.unfix.not_found.is_empty());
    assert!(outcome.unfix.errors["fs.split"].contains("ambiguous"));
}
