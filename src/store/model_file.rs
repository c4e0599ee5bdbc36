// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::{
    resolve, resolve_variable, BuildError, ComponentKind, ComponentRef, Expr, Flowsheet,
    ResolveError, VariableSpec, DEFAULT_ROOT_ALIAS,
};

/// On-disk flowsheet definition.
///
/// Variables are declared before constraints; constraint bodies reference variables by path
/// (`{"var": "fs.valve.Cv"}`), bare numbers are constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinition {
    #[serde(default)]
    pub root_alias: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDef {
    pub path: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDef {
    pub path: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintDef {
    pub path: String,
    pub body: ExprDef,
    /// Shorthand for `lower == upper`.
    #[serde(default)]
    pub equals: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExprDef {
    Number(f64),
    Node(ExprNode),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprNode {
    Var(String),
    Add(Vec<ExprDef>),
    Sub(Box<ExprDef>, Box<ExprDef>),
    Mul(Vec<ExprDef>),
    Div(Box<ExprDef>, Box<ExprDef>),
    Neg(Box<ExprDef>),
    Pow(Box<ExprDef>, f64),
    Exp(Box<ExprDef>),
    Log(Box<ExprDef>),
    Sqrt(Box<ExprDef>),
}

fn default_true() -> bool {
    true
}

#[derive(Debug)]
pub enum ModelFileError {
    Io { path: PathBuf, source: io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    Build { source: BuildError },
    UnknownVariable { constraint: String, source: ResolveError },
    ConflictingBounds { constraint: String },
    NotABlock { path: String },
}

impl fmt::Display for ModelFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error at {path:?}: {source}"),
            Self::Json { path, source } => write!(f, "json error at {path:?}: {source}"),
            Self::Build { source } => write!(f, "invalid model: {source}"),
            Self::UnknownVariable { constraint, source } => {
                write!(f, "constraint '{constraint}' references an unknown variable: {source}")
            }
            Self::ConflictingBounds { constraint } => write!(
                f,
                "constraint '{constraint}' combines 'equals' with 'lower'/'upper'"
            ),
            Self::NotABlock { path } => write!(f, "'{path}' is declared as a block but is not one"),
        }
    }
}

impl std::error::Error for ModelFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Build { source } => Some(source),
            Self::UnknownVariable { source, .. } => Some(source),
            Self::ConflictingBounds { .. } | Self::NotABlock { .. } => None,
        }
    }
}

impl From<BuildError> for ModelFileError {
    fn from(source: BuildError) -> Self {
        Self::Build { source }
    }
}

pub fn load_model(path: &Path) -> Result<Flowsheet, ModelFileError> {
    let text = fs::read_to_string(path)
        .map_err(|source| ModelFileError::Io { path: path.to_path_buf(), source })?;
    let definition: ModelDefinition = serde_json::from_str(&text)
        .map_err(|source| ModelFileError::Json { path: path.to_path_buf(), source })?;
    let model = definition.build()?;
    tracing::info!(
        path = %path.display(),
        variables = model.variable_count(),
        constraints = model.constraint_count(),
        "model loaded"
    );
    Ok(model)
}

impl ModelDefinition {
    pub fn build(&self) -> Result<Flowsheet, ModelFileError> {
        let mut model = Flowsheet::new(self.root_alias.as_deref().unwrap_or(DEFAULT_ROOT_ALIAS));

        for block in &self.blocks {
            model.add_block(&block.path, block.unit.as_deref())?;
        }
        for variable in &self.variables {
            let spec = VariableSpec {
                value: variable.value,
                lower: variable.lower,
                upper: variable.upper,
                fixed: variable.fixed,
                units: variable.units.clone(),
            };
            model.add_variable(&variable.path, spec)?;
        }
        for constraint in &self.constraints {
            let body = constraint.body.to_expr(&model, &constraint.path)?;
            let (lower, upper) = match (constraint.equals, constraint.lower, constraint.upper) {
                (Some(value), None, None) => (Some(value), Some(value)),
                (Some(_), _, _) => {
                    return Err(ModelFileError::ConflictingBounds {
                        constraint: constraint.path.clone(),
                    })
                }
                (None, lower, upper) => (lower, upper),
            };
            let id = model.add_constraint(&constraint.path, body, lower, upper)?;
            if !constraint.active {
                model.set_constraint_active(id, false);
            }
        }

        // deactivation is applied last so implicitly created blocks exist
        for block in self.blocks.iter().filter(|block| !block.active) {
            match resolve(&model, &block.path, ComponentKind::Block) {
                Ok(ComponentRef::Block(id)) => model.set_block_active(id, false),
                _ => return Err(ModelFileError::NotABlock { path: block.path.clone() }),
            }
        }

        Ok(model)
    }
}

impl ExprDef {
    fn to_expr(&self, model: &Flowsheet, constraint: &str) -> Result<Expr, ModelFileError> {
        let node = match self {
            Self::Number(value) => return Ok(Expr::constant(*value)),
            Self::Node(node) => node,
        };
        let one = |inner: &ExprDef| inner.to_expr(model, constraint);
        let many = |items: &[ExprDef]| items.iter().map(|item| one(item)).collect::<Result<_, _>>();

        Ok(match node {
            ExprNode::Var(path) => {
                let id = resolve_variable(model, path).map_err(|source| {
                    ModelFileError::UnknownVariable { constraint: constraint.to_owned(), source }
                })?;
                Expr::var(id)
            }
            ExprNode::Add(terms) => Expr::add(many(terms)?),
            ExprNode::Sub(lhs, rhs) => Expr::sub(one(lhs)?, one(rhs)?),
            ExprNode::Mul(factors) => Expr::mul(many(factors)?),
            ExprNode::Div(numerator, denominator) => Expr::div(one(numerator)?, one(denominator)?),
            ExprNode::Neg(inner) => Expr::neg(one(inner)?),
            ExprNode::Pow(base, exponent) => Expr::pow(one(base)?, *exponent),
            ExprNode::Exp(inner) => Expr::exp(one(inner)?),
            ExprNode::Log(inner) => Expr::log(one(inner)?),
            ExprNode::Sqrt(inner) => Expr::sqrt(one(inner)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(json: &str) -> Result<Flowsheet, ModelFileError> {
        serde_json::from_str::<ModelDefinition>(json).expect("json").build()
    }

    #[test]
    fn builds_constraints_from_expression_trees() {
        let model = build(
            r#"{
                "blocks": [{"path": "fs", "unit": "FlowsheetBlock"}],
                "variables": [
                    {"path": "fs.x", "value": 2.0, "fixed": true},
                    {"path": "fs.y[0.0]", "value": 1.0, "lower": 0.0}
                ],
                "constraints": [
                    {"path": "fs.c", "body": {"sub": [{"var": "fs.y[0]"}, {"mul": [3, {"var": "m.fs.x"}]}]}, "equals": 0},
                    {"path": "fs.limit", "body": {"var": "fs.y"}, "upper": 10}
                ]
            }"#,
        )
        .expect("build");

        assert_eq!(model.degrees_of_freedom(), 0);
        let c = crate::model::resolve_constraint(&model, "fs.c").expect("c");
        assert_eq!(model.residual(c), Some(5.0));
        let limit = crate::model::resolve_constraint(&model, "fs.limit").expect("limit");
        assert!(!model.constraint(limit).is_equality());
    }

    #[test]
    fn reports_unknown_variables_and_conflicting_bounds() {
        let err = build(r#"{"constraints": [{"path": "c", "body": {"var": "nope"}, "equals": 0}]}"#)
            .unwrap_err();
        assert!(matches!(err, ModelFileError::UnknownVariable { .. }));

        let err = build(
            r#"{"variables": [{"path": "x"}],
                "constraints": [{"path": "c", "body": {"var": "x"}, "equals": 0, "lower": 1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModelFileError::ConflictingBounds { .. }));
    }

    #[test]
    fn inactive_blocks_deactivate_their_constraints() {
        let model = build(
            r#"{
                "blocks": [{"path": "fs.unit", "active": false}],
                "variables": [{"path": "fs.unit.x", "value": 1.0}],
                "constraints": [{"path": "fs.unit.c", "body": {"var": "fs.unit.x"}, "equals": 1}]
            }"#,
        )
        .expect("build");
        assert!(model.active_constraints().is_empty());
    }

    #[test]
    fn load_model_reports_missing_files() {
        let err = load_model(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ModelFileError::Io { .. }));
    }
}
