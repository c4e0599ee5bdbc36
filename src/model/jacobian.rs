// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use super::flowsheet::Flowsheet;
use super::ids::{ConstraintId, VarId};

const RELATIVE_STEP: f64 = 1e-7;

/// Dense Jacobian of constraint bodies with respect to a chosen set of variables.
#[derive(Debug, Clone)]
pub struct Jacobian {
    pub rows: Vec<ConstraintId>,
    pub cols: Vec<VarId>,
    pub matrix: DMatrix<f64>,
}

/// Body values and forward-difference derivatives evaluated at `point`.
///
/// `point` overrides the model's stored values for the variables in `cols`; every other variable
/// is read from the model. Returns `None` for the first row whose body cannot be evaluated.
pub fn evaluate(
    model: &Flowsheet,
    rows: &[ConstraintId],
    cols: &[VarId],
    point: &DVector<f64>,
) -> Result<(DVector<f64>, Jacobian), ConstraintId> {
    let column_of = cols.iter().enumerate().map(|(col, var)| (*var, col)).collect::<HashMap<_, _>>();
    let mut values = DVector::zeros(rows.len());
    let mut matrix = DMatrix::zeros(rows.len(), cols.len());

    for (row, constraint_id) in rows.iter().enumerate() {
        let constraint = model.constraint(*constraint_id);
        let at = |var: VarId, shifted: Option<(usize, f64)>| -> Option<f64> {
            match column_of.get(&var) {
                Some(col) => match shifted {
                    Some((shifted_col, value)) if shifted_col == *col => Some(value),
                    _ => Some(point[*col]),
                },
                None => model.value(var),
            }
        };
        let base = constraint.body().eval(&|var| at(var, None)).ok_or(*constraint_id)?;
        values[row] = base;

        for var in constraint.variables() {
            let Some(col) = column_of.get(var).copied() else {
                continue;
            };
            let step = RELATIVE_STEP * point[col].abs().max(1.0);
            let shifted_value = point[col] + step;
            let shifted = constraint
                .body()
                .eval(&|other| at(other, Some((col, shifted_value))))
                .ok_or(*constraint_id)?;
            matrix[(row, col)] = (shifted - base) / step;
        }
    }

    Ok((values, Jacobian { rows: rows.to_vec(), cols: cols.to_vec(), matrix }))
}

/// Jacobian at the model's current values; variables without a value are evaluated at zero.
pub fn at_current_point(
    model: &Flowsheet,
    rows: &[ConstraintId],
    cols: &[VarId],
) -> Result<Jacobian, ConstraintId> {
    let point = DVector::from_iterator(
        cols.len(),
        cols.iter().map(|var| model.value(*var).unwrap_or(0.0)),
    );
    evaluate(model, rows, cols, &point).map(|(_, jacobian)| jacobian)
}
