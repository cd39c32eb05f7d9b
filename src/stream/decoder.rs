// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Incremental framer
//
// Network chunks split events anywhere: mid-line, mid-field, inside a
// multi-byte UTF-8 sequence. The decoder keeps raw bytes until a whole
// group is present and only then decodes it as text.

use super::types::{Framing, StreamError};

/// Upper bound on bytes held for a group that has not terminated yet.
pub const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

pub struct FrameDecoder {
    framing: Framing,
    buf: Vec<u8>,
    /// Offset of the first line in `buf` not yet scanned for a terminator.
    scan: usize,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: Vec::new(),
            scan: 0,
        }
    }

    /// Feed bytes, returning every group completed by them.
    ///
    /// When the unterminated tail outgrows [`MAX_PENDING_BYTES`] the buffer
    /// is discarded and the push fails; the decoder stays usable.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, StreamError> {
        self.buf.extend_from_slice(bytes);

        let mut groups = Vec::new();
        let mut group_start = 0;
        let mut line_start = self.scan;

        while let Some(offset) = self.buf[line_start..].iter().position(|&b| b == b'\n') {
            let newline = line_start + offset;
            let line = &self.buf[line_start..newline];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            match self.framing {
                Framing::Sse => {
                    if line.is_empty() {
                        if line_start > group_start {
                            groups.push(decode(&self.buf[group_start..line_start]));
                        }
                        group_start = newline + 1;
                    }
                }
                Framing::JsonLines => {
                    if !line.iter().all(u8::is_ascii_whitespace) {
                        groups.push(decode(line));
                    }
                    group_start = newline + 1;
                }
            }
            line_start = newline + 1;
        }

        self.buf.drain(..group_start);
        self.scan = line_start - group_start;

        if self.buf.len() > MAX_PENDING_BYTES {
            let pending = self.buf.len();
            self.buf.clear();
            self.scan = 0;
            return Err(StreamError::MalformedFragment(format!(
                "unterminated frame exceeds {MAX_PENDING_BYTES} bytes ({pending} pending)"
            )));
        }
        Ok(groups)
    }

    /// Flush whatever is left once the source has closed. A backend that
    /// ends without a final blank line still gets its last group parsed.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scan = 0;
        let text = decode(&rest);
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
