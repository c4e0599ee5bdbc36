// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Loading flowsheet definitions from disk.
//!
//! Model state is never written back; a restarted server starts from the definition again.

pub mod model_file;

pub use model_file::{load_model, ModelDefinition, ModelFileError};
