// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The flowsheet model instance and path resolution.
//!
//! A flowsheet is a containment tree of blocks holding variables and constraints; components are
//! addressed by dotted, indexed paths such as `fs.valve.inlet.pressure[0.0]`.

pub mod expr;
pub mod fixtures;
pub mod flowsheet;
pub mod ids;
pub mod jacobian;
pub mod path;
pub mod resolve;

pub use expr::Expr;
pub use flowsheet::{
    Block, BuildError, ComponentRef, Constraint, Flowsheet, MutationError, Variable, VariableSpec,
    DEFAULT_ROOT_ALIAS,
};
pub use ids::{BlockId, ConstraintId, Idx, VarId};
pub use path::{ComponentPath, PathError, PathSegment};
pub use resolve::{resolve, resolve_constraint, resolve_variable, ComponentKind, ResolveError};
