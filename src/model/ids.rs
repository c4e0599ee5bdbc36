// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::marker::PhantomData;

/// A dense, typed index into one of the component tables of a [`super::Flowsheet`].
///
/// Handles are plain indices: they stay valid for the lifetime of the model because the
/// component structure is fixed once loaded (only values, flags and bounds mutate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Idx<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Idx<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self { index, _marker: PhantomData }
    }

    pub fn index(self) -> usize {
        self.index
    }
}

impl<T> fmt::Display for Idx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarTag {}
pub type VarId = Idx<VarTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintTag {}
pub type ConstraintId = Idx<ConstraintTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockTag {}
pub type BlockId = Idx<BlockTag>;

#[cfg(test)]
mod tests {
    use super::{ConstraintId, VarId};

    #[test]
    fn ids_order_by_index() {
        assert!(VarId::new(1) < VarId::new(2));
        assert_eq!(ConstraintId::new(7).index(), 7);
        assert_eq!(VarId::new(3).to_string(), "#3");
    }
}
