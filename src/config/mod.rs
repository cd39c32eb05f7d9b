// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads gantry.yaml, validates structure, resolves variable interpolation,
// and computes a deterministic config hash.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::{resolve_variables, resolve_with};
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, ToolsConfig};

/// Tool call timeout when `tools.timeout_ms` is absent.
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
