// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolve `${VAR}` and `${VAR:-fallback}` references from the process
/// environment. A referenced variable that is unset and has no fallback is
/// an error.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

/// Resolve references with a caller-supplied lookup.
pub fn resolve_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated reference is kept literally.
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((n, f)) => (n, Some(f)),
            None => (expr, None),
        };

        if name.is_empty() {
            out.push_str(&rest[start..start + 2 + end + 1]);
        } else {
            match (lookup(name), fallback) {
                (Some(value), _) => out.push_str(&value),
                (None, Some(f)) => out.push_str(f),
                (None, None) => {
                    return Err(ConfigError::UndefinedVariable {
                        name: name.to_string(),
                    })
                }
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
