//! Dirty-buffer anchor patching (spec §4.5, §6, §8 property 5): maps an
//! anchor's span in the file's on-disk text to its span in an unsaved,
//! edited buffer, so decorations stay aligned with what the caller is
//! actually looking at.

use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};

pub trait AnchorPatcher: Send + Sync {
    /// Returns `(patched_start, patched_end, exists)`. `exists` is false
    /// when the anchor falls inside a region the dirty buffer edited out
    /// from under it, in which case the offsets are passed through
    /// unchanged and the caller drops the anchor (spec §4.5 step 5).
    fn patch(&self, start: u32, end: u32) -> (u32, u32, bool);
}

/// No dirty buffer supplied: every anchor maps to itself.
pub struct IdentityPatcher;

impl AnchorPatcher for IdentityPatcher {
    fn patch(&self, start: u32, end: u32) -> (u32, u32, bool) {
        (start, end, true)
    }
}

struct Segment {
    orig: Range<usize>,
    dirty: Range<usize>,
    equal: bool,
}

/// Built from a byte-level Myers diff between the original and dirty texts.
/// An anchor patches successfully only when its whole span falls inside one
/// `Equal` segment; an anchor overlapping an edit, or spanning a segment
/// boundary, is reported as gone.
pub struct DiffPatcher {
    segments: Vec<Segment>,
}

impl DiffPatcher {
    pub fn new(original: &str, dirty: &str) -> Self {
        let ops = capture_diff_slices(Algorithm::Myers, original.as_bytes(), dirty.as_bytes());
        let segments = ops
            .into_iter()
            .map(|op| Segment {
                orig: op.old_range(),
                dirty: op.new_range(),
                equal: matches!(op.tag(), DiffTag::Equal),
            })
            .collect();
        Self { segments }
    }
}

impl AnchorPatcher for DiffPatcher {
    fn patch(&self, start: u32, end: u32) -> (u32, u32, bool) {
        let (start_us, end_us) = (start as usize, end as usize);
        for seg in &self.segments {
            if seg.orig.start <= start_us && end_us <= seg.orig.end {
                if !seg.equal {
                    return (start, end, false);
                }
                let delta = seg.dirty.start as i64 - seg.orig.start as i64;
                let patched_start = (start_us as i64 + delta) as u32;
                let patched_end = (end_us as i64 + delta) as u32;
                return (patched_start, patched_end, true);
            }
        }
        (start, end, false)
    }
}
