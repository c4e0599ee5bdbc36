// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Flowsheet MCP: a live, mutable process flowsheet exposed through MCP tools.
//!
//! The model is resolved by path, mutated in ordered best-effort batches, solved in place, and
//! explored through point tests and sweeps that restore their inputs afterwards.

pub mod diagnostics;
pub mod explore;
pub mod mcp;
pub mod model;
pub mod ops;
pub mod solve;
pub mod store;
