// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Dulmage–Mendelsohn partition of the active equality system.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::model::{ConstraintId, Flowsheet, VarId};

/// Under- and over-constrained subsystems as plain paths (stable across later mutations).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub under_variables: Vec<String>,
    pub under_constraints: Vec<String>,
    pub over_variables: Vec<String>,
    pub over_constraints: Vec<String>,
}

impl Partition {
    pub fn is_structurally_sound(&self) -> bool {
        self.under_variables.is_empty()
            && self.under_constraints.is_empty()
            && self.over_variables.is_empty()
            && self.over_constraints.is_empty()
    }
}

/// Bipartite incidence between active equalities (rows) and their unfixed variables (cols).
struct Incidence {
    rows: Vec<ConstraintId>,
    cols: Vec<VarId>,
    row_adj: Vec<Vec<usize>>,
    col_adj: Vec<Vec<usize>>,
}

impl Incidence {
    fn new(model: &Flowsheet) -> Self {
        let rows = model.active_equalities();
        let cols = model.free_variables_in_equalities().into_iter().collect::<Vec<_>>();
        let col_of = cols.iter().enumerate().map(|(col, id)| (*id, col)).collect::<HashMap<_, _>>();

        let mut row_adj = vec![Vec::new(); rows.len()];
        let mut col_adj = vec![Vec::new(); cols.len()];
        for (row, id) in rows.iter().enumerate() {
            for var in model.constraint(*id).variables() {
                if let Some(col) = col_of.get(var) {
                    row_adj[row].push(*col);
                    col_adj[*col].push(row);
                }
            }
        }
        Self { rows, cols, row_adj, col_adj }
    }
}

struct Matching {
    row_to_col: Vec<Option<usize>>,
    col_to_row: Vec<Option<usize>>,
}

fn maximum_matching(incidence: &Incidence) -> Matching {
    let mut matching = Matching {
        row_to_col: vec![None; incidence.rows.len()],
        col_to_row: vec![None; incidence.cols.len()],
    };
    for row in 0..incidence.rows.len() {
        let mut visited = vec![false; incidence.cols.len()];
        augment(row, incidence, &mut visited, &mut matching);
    }
    matching
}

fn augment(row: usize, incidence: &Incidence, visited: &mut [bool], matching: &mut Matching) -> bool {
    for &col in &incidence.row_adj[row] {
        if visited[col] {
            continue;
        }
        visited[col] = true;
        let free = match matching.col_to_row[col] {
            None => true,
            Some(other) => augment(other, incidence, visited, matching),
        };
        if free {
            matching.col_to_row[col] = Some(row);
            matching.row_to_col[row] = Some(col);
            return true;
        }
    }
    false
}

/// Everything reachable by alternating paths from unmatched vertices of one side.
fn alternating_reach(
    starts: impl Iterator<Item = usize>,
    forward: &[Vec<usize>],
    matched: &[Option<usize>],
) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let mut near = BTreeSet::new();
    let mut far = BTreeSet::new();
    let mut queue = starts.collect::<VecDeque<_>>();
    near.extend(queue.iter().copied());

    while let Some(vertex) = queue.pop_front() {
        for &other in &forward[vertex] {
            if !far.insert(other) {
                continue;
            }
            if let Some(next) = matched[other] {
                if near.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    (near, far)
}

pub fn partition(model: &Flowsheet) -> Partition {
    let incidence = Incidence::new(model);
    let matching = maximum_matching(&incidence);

    let var_path = |col: usize| model.variable(incidence.cols[col]).path().to_string();
    let con_path = |row: usize| model.constraint(incidence.rows[row]).path().to_string();
    let sorted = |mut paths: Vec<String>| {
        paths.sort();
        paths
    };

    let unmatched_cols = (0..incidence.cols.len()).filter(|col| matching.col_to_row[*col].is_none());
    let (under_cols, under_rows) =
        alternating_reach(unmatched_cols, &incidence.col_adj, &matching.row_to_col);

    let unmatched_rows = (0..incidence.rows.len()).filter(|row| matching.row_to_col[*row].is_none());
    let (over_rows, over_cols) =
        alternating_reach(unmatched_rows, &incidence.row_adj, &matching.col_to_row);

    Partition {
        under_variables: sorted(under_cols.into_iter().map(var_path).collect()),
        under_constraints: sorted(under_rows.into_iter().map(con_path).collect()),
        over_variables: sorted(over_cols.into_iter().map(var_path).collect()),
        over_constraints: sorted(over_rows.into_iter().map(con_path).collect()),
    }
}
