//! Text normalization (spec §4.5, §6): converting a byte offset into a full
//! `{byte, line, column}` point, and resolving a Decorations request's
//! `location` into a concrete byte span.

use crate::collab::{LocationKind, RequestedLocation};
use crate::error::{EngineError, Result};
use xref_store::Point;

pub trait TextNormalizer: Send + Sync {
    /// Length of the text this normalizer was built from, in bytes.
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full point for a byte offset (0-based byte, 1-based line, 0-based
    /// column, matching Kythe's own point convention).
    fn byte_offset(&self, offset: u32) -> Point;

    /// Resolve a request's `location` into a concrete `[start, end)` byte
    /// span: a `File` location spans the whole text; a `Span` location uses
    /// its own bounds, validated against the text length.
    fn resolve_location(&self, loc: &RequestedLocation) -> Result<(u32, u32)> {
        match loc.kind {
            LocationKind::File => Ok((0, self.len())),
            LocationKind::Span => {
                let start = loc.start.ok_or_else(|| {
                    EngineError::invalid_argument("span location missing start offset")
                })?;
                let end = loc.end.ok_or_else(|| {
                    EngineError::invalid_argument("span location missing end offset")
                })?;
                if start > end || end > self.len() {
                    return Err(EngineError::invalid_argument(format!(
                        "span location [{start}, {end}) out of bounds for text of length {}",
                        self.len()
                    )));
                }
                Ok((start, end))
            }
        }
    }
}

/// Precomputes line-start byte offsets so `byte_offset` is a binary search
/// rather than a rescan.
pub struct LineIndexNormalizer {
    len: u32,
    line_starts: Vec<u32>,
}

impl LineIndexNormalizer {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            len: text.len() as u32,
            line_starts,
        }
    }
}

impl TextNormalizer for LineIndexNormalizer {
    fn len(&self) -> u32 {
        self.len
    }

    fn byte_offset(&self, offset: u32) -> Point {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        Point {
            byte_offset: offset,
            line_number: (line_idx + 1) as u32,
            column_offset: offset - line_start,
        }
    }
}
