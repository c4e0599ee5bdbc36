// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use smol_str::SmolStr;

use super::expr::Expr;
use super::ids::{BlockId, ConstraintId, VarId};
use super::path::{ComponentPath, PathError};

/// Default name under which callers may prefix paths (`m.fs.unit.x`).
pub const DEFAULT_ROOT_ALIAS: &str = "m";

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    path: ComponentPath,
    value: Option<f64>,
    lower: Option<f64>,
    upper: Option<f64>,
    fixed: bool,
    units: Option<SmolStr>,
    blocks: Vec<BlockId>,
}

impl Variable {
    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn lower(&self) -> Option<f64> {
        self.lower
    }

    pub fn upper(&self) -> Option<f64> {
        self.upper
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    path: ComponentPath,
    body: Expr,
    lower: Option<f64>,
    upper: Option<f64>,
    active: bool,
    variables: Vec<VarId>,
    blocks: Vec<BlockId>,
}

impl Constraint {
    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn lower(&self) -> Option<f64> {
        self.lower
    }

    pub fn upper(&self) -> Option<f64> {
        self.upper
    }

    pub fn is_equality(&self) -> bool {
        bounds_coincide(self.lower, self.upper)
    }

    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    path: ComponentPath,
    unit: Option<SmolStr>,
    active: bool,
}

impl Block {
    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    /// Unit model label (e.g. `Valve`, `Heater`) for blocks representing unit operations.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentRef {
    Variable(VarId),
    Constraint(ConstraintId),
    Block(BlockId),
}

/// Initial state for a new variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSpec {
    pub value: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub fixed: bool,
    pub units: Option<String>,
}

impl VariableSpec {
    pub fn free(value: f64) -> Self {
        Self { value: Some(value), ..Self::default() }
    }

    pub fn fixed(value: f64) -> Self {
        Self { value: Some(value), fixed: true, ..Self::default() }
    }

    pub fn bounded(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_owned());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    InvalidPath { path: String, source: PathError },
    Duplicate { path: String },
    NotABlock { path: String },
    UnknownVariable { constraint: String, var: VarId },
    InvalidBounds { path: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath { path, source } => write!(f, "invalid path '{path}': {source}"),
            Self::Duplicate { path } => write!(f, "component '{path}' already exists"),
            Self::NotABlock { path } => {
                write!(f, "'{path}' is a variable or constraint and cannot contain components")
            }
            Self::UnknownVariable { constraint, var } => {
                write!(f, "constraint '{constraint}' references unknown variable {var}")
            }
            Self::InvalidBounds { path } => write!(f, "invalid bounds for '{path}'"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Reasons the model refuses a primitive mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationError {
    NonFiniteValue { path: String },
    NonFiniteBound { path: String },
    CrossedBounds { path: String, lower: f64, upper: f64 },
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteValue { path } => write!(f, "value for '{path}' must be finite"),
            Self::NonFiniteBound { path } => write!(f, "bounds for '{path}' must be finite"),
            Self::CrossedBounds { path, lower, upper } => {
                write!(f, "lower bound {lower} exceeds upper bound {upper} for '{path}'")
            }
        }
    }
}

impl std::error::Error for MutationError {}

/// The live model instance: a containment tree of blocks holding variables and constraints.
///
/// Structure is fixed after construction; values, fixed flags, bounds and activation states are
/// the only mutable parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Flowsheet {
    root_alias: SmolStr,
    blocks: Vec<Block>,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    by_path: BTreeMap<ComponentPath, ComponentRef>,
}

impl Default for Flowsheet {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_ALIAS)
    }
}

impl Flowsheet {
    pub fn new(root_alias: &str) -> Self {
        Self {
            root_alias: SmolStr::new(root_alias),
            blocks: Vec::new(),
            variables: Vec::new(),
            constraints: Vec::new(),
            by_path: BTreeMap::new(),
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn set_root_alias(&mut self, alias: &str) {
        self.root_alias = SmolStr::new(alias);
    }

    fn parse_new_path(&self, raw: &str) -> Result<ComponentPath, BuildError> {
        let path = raw
            .parse::<ComponentPath>()
            .map_err(|source| BuildError::InvalidPath { path: raw.to_owned(), source })?;
        if self.by_path.contains_key(&path) {
            return Err(BuildError::Duplicate { path: path.to_string() });
        }
        Ok(path)
    }

    fn ensure_ancestor_blocks(&mut self, path: &ComponentPath) -> Result<Vec<BlockId>, BuildError> {
        let mut ids = Vec::new();
        for ancestor in path.ancestors() {
            match self.by_path.get(&ancestor) {
                Some(ComponentRef::Block(id)) => ids.push(*id),
                Some(_) => return Err(BuildError::NotABlock { path: ancestor.to_string() }),
                None => {
                    let id = BlockId::new(self.blocks.len());
                    self.blocks.push(Block { path: ancestor.clone(), unit: None, active: true });
                    self.by_path.insert(ancestor, ComponentRef::Block(id));
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Adds a block, or labels an implicitly created one with its unit model name.
    pub fn add_block(&mut self, raw: &str, unit: Option<&str>) -> Result<BlockId, BuildError> {
        let path = raw
            .parse::<ComponentPath>()
            .map_err(|source| BuildError::InvalidPath { path: raw.to_owned(), source })?;
        match self.by_path.get(&path) {
            Some(ComponentRef::Block(id)) => {
                let id = *id;
                if unit.is_some() {
                    self.blocks[id.index()].unit = unit.map(SmolStr::new);
                }
                return Ok(id);
            }
            Some(_) => return Err(BuildError::Duplicate { path: path.to_string() }),
            None => {}
        }
        self.ensure_ancestor_blocks(&path)?;
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block { path: path.clone(), unit: unit.map(SmolStr::new), active: true });
        self.by_path.insert(path, ComponentRef::Block(id));
        Ok(id)
    }

    pub fn add_variable(&mut self, raw: &str, spec: VariableSpec) -> Result<VarId, BuildError> {
        let path = self.parse_new_path(raw)?;
        let finite = |bound: Option<f64>| bound.map_or(true, f64::is_finite);
        let crossed = matches!((spec.lower, spec.upper), (Some(lower), Some(upper)) if lower > upper);
        if !finite(spec.lower) || !finite(spec.upper) || !finite(spec.value) || crossed {
            return Err(BuildError::InvalidBounds { path: path.to_string() });
        }
        let blocks = self.ensure_ancestor_blocks(&path)?;
        let id = VarId::new(self.variables.len());
        self.variables.push(Variable {
            path: path.clone(),
            value: spec.value,
            lower: spec.lower,
            upper: spec.upper,
            fixed: spec.fixed,
            units: spec.units.as_deref().map(SmolStr::new),
            blocks,
        });
        self.by_path.insert(path, ComponentRef::Variable(id));
        Ok(id)
    }

    pub fn add_constraint(
        &mut self,
        raw: &str,
        body: Expr,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<ConstraintId, BuildError> {
        let path = self.parse_new_path(raw)?;
        let variables = body.variables().into_iter().collect::<Vec<_>>();
        if let Some(var) = variables.iter().find(|var| var.index() >= self.variables.len()) {
            return Err(BuildError::UnknownVariable { constraint: path.to_string(), var: *var });
        }
        let blocks = self.ensure_ancestor_blocks(&path)?;
        let id = ConstraintId::new(self.constraints.len());
        self.constraints.push(Constraint {
            path: path.clone(),
            body,
            lower,
            upper,
            active: true,
            variables,
            blocks,
        });
        self.by_path.insert(path, ComponentRef::Constraint(id));
        Ok(id)
    }

    /// Adds `body == 0`.
    pub fn add_equality(&mut self, raw: &str, body: Expr) -> Result<ConstraintId, BuildError> {
        self.add_constraint(raw, body, Some(0.0), Some(0.0))
    }

    pub fn lookup(&self, path: &ComponentPath) -> Option<ComponentRef> {
        self.by_path.get(path).copied()
    }

    /// All indexed elements of an unindexed component path, in path order.
    pub fn elements_of(&self, unindexed: &ComponentPath) -> Vec<(&ComponentPath, ComponentRef)> {
        self.by_path
            .iter()
            .filter(|(path, _)| path.is_element_of(unindexed))
            .map(|(path, component)| (path, *component))
            .collect()
    }

    pub fn component_paths(&self) -> impl Iterator<Item = &ComponentPath> {
        self.by_path.keys()
    }

    pub fn path_of(&self, component: ComponentRef) -> &ComponentPath {
        match component {
            ComponentRef::Variable(id) => self.variable(id).path(),
            ComponentRef::Constraint(id) => self.constraint(id).path(),
            ComponentRef::Block(id) => self.block(id).path(),
        }
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.variables.len()).map(VarId::new)
    }

    pub fn constraint_ids(&self) -> impl Iterator<Item = ConstraintId> {
        (0..self.constraints.len()).map(ConstraintId::new)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::new)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn value(&self, id: VarId) -> Option<f64> {
        self.variables[id.index()].value
    }

    pub fn is_block_active(&self, id: BlockId) -> bool {
        let block = self.block(id);
        block.active
            && block.path.ancestors().all(|ancestor| match self.by_path.get(&ancestor) {
                Some(ComponentRef::Block(parent)) => self.blocks[parent.index()].active,
                _ => true,
            })
    }

    /// A constraint counts as active only if it and every enclosing block are active.
    pub fn is_constraint_active(&self, id: ConstraintId) -> bool {
        let constraint = self.constraint(id);
        constraint.active && constraint.blocks.iter().all(|block| self.blocks[block.index()].active)
    }

    /// True if any block enclosing the variable is deactivated.
    pub fn is_variable_in_inactive_block(&self, id: VarId) -> bool {
        self.variable(id).blocks.iter().any(|block| !self.blocks[block.index()].active)
    }

    pub fn active_constraints(&self) -> Vec<ConstraintId> {
        self.constraint_ids().filter(|id| self.is_constraint_active(*id)).collect()
    }

    pub fn active_equalities(&self) -> Vec<ConstraintId> {
        self.constraint_ids()
            .filter(|id| self.is_constraint_active(*id) && self.constraint(*id).is_equality())
            .collect()
    }

    /// Unfixed variables appearing in at least one active equality constraint.
    pub fn free_variables_in_equalities(&self) -> BTreeSet<VarId> {
        self.active_equalities()
            .into_iter()
            .flat_map(|id| self.constraint(id).variables.iter().copied())
            .filter(|var| !self.variable(*var).fixed)
            .collect()
    }

    /// Unfixed variables in active equalities minus the number of active equalities.
    pub fn degrees_of_freedom(&self) -> i64 {
        let equalities = self.active_equalities().len() as i64;
        self.free_variables_in_equalities().len() as i64 - equalities
    }

    pub fn body_value(&self, id: ConstraintId) -> Option<f64> {
        self.constraint(id).body.eval(&|var| self.value(var))
    }

    /// Bound violation magnitude; equalities report `|body - bound|`.
    pub fn residual(&self, id: ConstraintId) -> Option<f64> {
        let constraint = self.constraint(id);
        let body = self.body_value(id)?;
        Some(residual_of(body, constraint.lower, constraint.upper))
    }

    pub fn fix(&mut self, id: VarId, value: Option<f64>) -> Result<(), MutationError> {
        if let Some(value) = value {
            if !value.is_finite() {
                return Err(MutationError::NonFiniteValue {
                    path: self.variable(id).path.to_string(),
                });
            }
        }
        let variable = &mut self.variables[id.index()];
        if value.is_some() {
            variable.value = value;
        }
        variable.fixed = true;
        Ok(())
    }

    pub fn unfix(&mut self, id: VarId) {
        self.variables[id.index()].fixed = false;
    }

    pub fn set_value(&mut self, id: VarId, value: Option<f64>) {
        self.variables[id.index()].value = value;
    }

    pub fn set_fixed(&mut self, id: VarId, fixed: bool) {
        self.variables[id.index()].fixed = fixed;
    }

    /// Replaces the given bounds; `None` leaves that side unchanged.
    pub fn set_bounds(
        &mut self,
        id: VarId,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<(), MutationError> {
        let variable = &self.variables[id.index()];
        if lower.is_some_and(|bound| !bound.is_finite())
            || upper.is_some_and(|bound| !bound.is_finite())
        {
            return Err(MutationError::NonFiniteBound { path: variable.path.to_string() });
        }
        let new_lower = lower.or(variable.lower);
        let new_upper = upper.or(variable.upper);
        if let (Some(lower), Some(upper)) = (new_lower, new_upper) {
            if lower > upper {
                return Err(MutationError::CrossedBounds {
                    path: variable.path.to_string(),
                    lower,
                    upper,
                });
            }
        }
        let variable = &mut self.variables[id.index()];
        variable.lower = new_lower;
        variable.upper = new_upper;
        Ok(())
    }

    pub fn set_constraint_active(&mut self, id: ConstraintId, active: bool) {
        self.constraints[id.index()].active = active;
    }

    pub fn set_block_active(&mut self, id: BlockId, active: bool) {
        self.blocks[id.index()].active = active;
    }

    /// Direct children of a block path (or of the root when `parent` is `None`).
    pub fn child_blocks(&self, parent: Option<&ComponentPath>) -> Vec<BlockId> {
        self.block_ids()
            .filter(|id| {
                let path = self.block(*id).path();
                match parent {
                    None => path.len() == 1,
                    Some(parent) => path.len() == parent.len() + 1 && path.starts_with(parent),
                }
            })
            .collect()
    }

    pub fn variables_under(&self, block: &ComponentPath) -> Vec<VarId> {
        self.variable_ids().filter(|id| self.variable(*id).path.starts_with(block)).collect()
    }
}

/// Bounds closer than this make a constraint an equality.
const EQUALITY_TOLERANCE: f64 = 1e-12;

fn bounds_coincide(lower: Option<f64>, upper: Option<f64>) -> bool {
    matches!((lower, upper), (Some(lower), Some(upper)) if (lower - upper).abs() <= EQUALITY_TOLERANCE)
}

pub(crate) fn residual_of(body: f64, lower: Option<f64>, upper: Option<f64>) -> f64 {
    if let (Some(lower), true) = (lower, bounds_coincide(lower, upper)) {
        return (body - lower).abs();
    }
    if let Some(lower) = lower {
        if body < lower {
            return lower - body;
        }
    }
    if let Some(upper) = upper {
        if body > upper {
            return body - upper;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_model() -> (Flowsheet, VarId, VarId) {
        let mut model = Flowsheet::default();
        let a = model.add_variable("fs.unit.a", VariableSpec::free(1.0)).expect("a");
        let b = model.add_variable("fs.unit.b", VariableSpec::fixed(2.0)).expect("b");
        model
            .add_equality("fs.unit.sum", Expr::sub(Expr::var(a), Expr::var(b)))
            .expect("constraint");
        (model, a, b)
    }

    #[test]
    fn add_variable_creates_ancestor_blocks() {
        let (model, _, _) = two_var_model();
        let fs = model.lookup(&"fs".parse().expect("path"));
        let unit = model.lookup(&"fs.unit".parse().expect("path"));
        assert!(matches!(fs, Some(ComponentRef::Block(_))));
        assert!(matches!(unit, Some(ComponentRef::Block(_))));
        assert_eq!(model.block_count(), 2);
    }

    #[test]
    fn rejects_duplicates_and_nesting_under_variables() {
        let (mut model, _, _) = two_var_model();
        let duplicate = model.add_variable("fs.unit.a", VariableSpec::default());
        assert!(matches!(duplicate, Err(BuildError::Duplicate { .. })));
        let nested = model.add_variable("fs.unit.a.inner", VariableSpec::default());
        assert!(matches!(nested, Err(BuildError::NotABlock { .. })));
    }

    #[test]
    fn dof_counts_free_variables_in_active_equalities() {
        let (mut model, a, b) = two_var_model();
        assert_eq!(model.degrees_of_freedom(), 0);

        model.unfix(b);
        assert_eq!(model.degrees_of_freedom(), 1);

        model.fix(a, Some(3.0)).expect("fix");
        assert_eq!(model.degrees_of_freedom(), 0);

        let constraint = model.active_equalities()[0];
        model.set_constraint_active(constraint, false);
        assert_eq!(model.degrees_of_freedom(), 0);
        assert!(model.active_equalities().is_empty());
    }

    #[test]
    fn deactivating_a_block_deactivates_its_constraints() {
        let (mut model, a, _) = two_var_model();
        let Some(ComponentRef::Block(unit)) = model.lookup(&"fs.unit".parse().expect("path"))
        else {
            panic!("expected block");
        };
        model.set_block_active(unit, false);
        assert!(model.active_constraints().is_empty());
        assert!(model.is_variable_in_inactive_block(a));
        model.set_block_active(unit, true);
        assert_eq!(model.active_constraints().len(), 1);
    }

    #[test]
    fn set_bounds_keeps_unspecified_side_and_rejects_crossing() {
        let (mut model, a, _) = two_var_model();
        model.set_bounds(a, Some(0.0), Some(10.0)).expect("bounds");
        model.set_bounds(a, None, Some(5.0)).expect("upper only");
        assert_eq!(model.variable(a).lower(), Some(0.0));
        assert_eq!(model.variable(a).upper(), Some(5.0));

        let err = model.set_bounds(a, Some(6.0), None).unwrap_err();
        assert!(matches!(err, MutationError::CrossedBounds { .. }));
        assert_eq!(model.variable(a).lower(), Some(0.0));

        let err = model.set_bounds(a, Some(f64::NAN), None).unwrap_err();
        assert!(matches!(err, MutationError::NonFiniteBound { .. }));
    }

    #[test]
    fn residual_measures_bound_violation() {
        assert_eq!(residual_of(3.0, Some(1.0), Some(1.0)), 2.0);
        assert_eq!(residual_of(0.5, Some(1.0), None), 0.5);
        assert_eq!(residual_of(4.0, None, Some(1.0)), 3.0);
        assert_eq!(residual_of(0.5, Some(0.0), Some(1.0)), 0.0);
    }

    #[test]
    fn nearly_equal_bounds_are_an_equality_for_dof_and_residual() {
        let (mut model, a, _) = two_var_model();
        let c = model.add_variable("fs.unit.c", VariableSpec::free(4.0)).expect("c");
        let id = model
            .add_constraint("fs.unit.pin", Expr::var(c), Some(1.0), Some(1.0 + 1e-13))
            .expect("constraint");

        assert!(model.constraint(id).is_equality());
        assert_eq!(model.active_equalities().len(), 2);
        assert_eq!(model.degrees_of_freedom(), 0);
        assert_eq!(model.residual(id), Some(3.0));

        let loose = model
            .add_constraint("fs.unit.range", Expr::var(a), Some(0.0), Some(1e-9))
            .expect("constraint");
        assert!(!model.constraint(loose).is_equality());
        assert_eq!(model.active_equalities().len(), 2);
    }
}
