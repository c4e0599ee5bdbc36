// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::ops::{Deref, DerefMut};

use crate::model::{Flowsheet, VarId};

/// `(value, fixed)` of a set of variables at capture time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    entries: Vec<(VarId, Option<f64>, bool)>,
}

impl Snapshot {
    pub(crate) fn capture(model: &Flowsheet, vars: impl IntoIterator<Item = VarId>) -> Self {
        let entries = vars
            .into_iter()
            .map(|id| {
                let variable = model.variable(id);
                (id, variable.value(), variable.is_fixed())
            })
            .collect();
        Self { entries }
    }

    /// Reapplies entries last-to-first so a variable captured twice ends in its earliest state.
    pub(crate) fn restore(&self, model: &mut Flowsheet) {
        for (id, value, fixed) in self.entries.iter().rev() {
            model.set_value(*id, *value);
            model.set_fixed(*id, *fixed);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Exclusive access to the model that puts the captured variables back when dropped, including
/// on early return and unwinding.
pub(crate) struct RestoreGuard<'a> {
    model: &'a mut Flowsheet,
    snapshot: Snapshot,
}

impl<'a> RestoreGuard<'a> {
    pub(crate) fn capture(model: &'a mut Flowsheet, vars: &[VarId]) -> Self {
        let snapshot = Snapshot::capture(model, vars.iter().copied());
        Self { model, snapshot }
    }
}

impl Deref for RestoreGuard<'_> {
    type Target = Flowsheet;

    fn deref(&self) -> &Flowsheet {
        self.model
    }
}

impl DerefMut for RestoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut Flowsheet {
        self.model
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.snapshot.restore(self.model);
        tracing::debug!(restored = self.snapshot.len(), "point-test inputs restored");
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::model::VariableSpec;

    #[test]
    fn guard_restores_on_drop_and_on_unwind() {
        let mut model = Flowsheet::default();
        let x = model.add_variable("x", VariableSpec::fixed(10.0)).expect("x");

        {
            let mut guard = RestoreGuard::capture(&mut model, &[x]);
            guard.fix(x, Some(20.0)).expect("fix");
            assert_eq!(guard.value(x), Some(20.0));
        }
        assert_eq!(model.value(x), Some(10.0));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut guard = RestoreGuard::capture(&mut model, &[x]);
            guard.unfix(x);
            guard.set_value(x, None);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(model.value(x), Some(10.0));
        assert!(model.variable(x).is_fixed());
    }

    #[test]
    fn duplicate_capture_restores_the_original_state() {
        let mut model = Flowsheet::default();
        let x = model.add_variable("x", VariableSpec::free(1.0)).expect("x");
        let snapshot = Snapshot::capture(&model, [x, x]);
        model.fix(x, Some(5.0)).expect("fix");
        snapshot.restore(&mut model);
        assert_eq!(model.value(x), Some(1.0));
        assert!(!model.variable(x).is_fixed());
    }
}
