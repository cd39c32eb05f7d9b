// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Tool-call accumulator
//
// Streaming backends deliver a tool call as a series of fragments keyed by
// index: the first fragment usually carries the id and function name, the
// rest carry slices of the argument string. Fragments for one index arrive
// in order but may interleave with other indices, and indices need not be
// dense.

use std::collections::HashMap;

use crate::message::{ToolCall, ToolCallChunk};

/// Upper bound on one call's accumulated argument string.
pub const MAX_ARGUMENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AccumulatorError {
    #[error("tool call {index} arguments exceed {limit} bytes")]
    Overflow { index: usize, limit: usize },
}

struct Slot {
    index: usize,
    call: ToolCall,
}

/// Folds tool-call fragments into complete calls.
#[derive(Default)]
pub struct ToolCallAccumulator {
    slots: Vec<Slot>,
    by_index: HashMap<usize, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fold one fragment. A new index opens a slot; id and name are taken
    /// from the first fragment that carries a non-empty value; argument
    /// fragments are appended.
    pub fn fold(&mut self, chunk: &ToolCallChunk) -> Result<(), AccumulatorError> {
        let position = match self.by_index.get(&chunk.index) {
            Some(&p) => p,
            None => {
                self.slots.push(Slot {
                    index: chunk.index,
                    call: ToolCall::new("", "", ""),
                });
                let p = self.slots.len() - 1;
                self.by_index.insert(chunk.index, p);
                p
            }
        };
        let call = &mut self.slots[position].call;

        if call.id.is_empty() {
            if let Some(id) = chunk.id.as_deref().filter(|s| !s.is_empty()) {
                call.id = id.to_string();
            }
        }
        if let Some(kind) = chunk.kind.as_deref().filter(|s| !s.is_empty()) {
            call.kind = kind.to_string();
        }

        let Some(function) = &chunk.function else {
            return Ok(());
        };
        if call.function.name.is_empty() {
            if let Some(name) = function.name.as_deref().filter(|s| !s.is_empty()) {
                call.function.name = name.to_string();
            }
        }
        if let Some(fragment) = function.arguments.as_deref() {
            if call.function.arguments.len() + fragment.len() > MAX_ARGUMENT_BYTES {
                return Err(AccumulatorError::Overflow {
                    index: chunk.index,
                    limit: MAX_ARGUMENT_BYTES,
                });
            }
            call.function.arguments.push_str(fragment);
        }
        Ok(())
    }

    /// Complete calls ordered by declared index. Gaps in the index sequence
    /// are kept, not dropped.
    pub fn finalize(self) -> Vec<ToolCall> {
        let mut slots = self.slots;
        slots.sort_by_key(|s| s.index);

        let dense = slots.iter().enumerate().all(|(i, s)| s.index == i);
        if !dense {
            let indices: Vec<usize> = slots.iter().map(|s| s.index).collect();
            tracing::debug!(?indices, "tool call indices are not contiguous");
        }

        slots.into_iter().map(|s| s.call).collect()
    }
}
