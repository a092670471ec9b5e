//! Pagination kernel (spec §4.2): page-size policy, opaque page tokens, and the
//! skip/limit accumulation cursor threaded through every engine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 2048;
pub const MAX_PAGE_SIZE: u32 = 10000;

/// Resolve the caller-requested page size per spec §4.2 / §6: negative is an
/// error, zero means "default", anything above the ceiling is clamped.
pub fn resolve_page_size(requested: i64) -> Result<u32> {
    if requested < 0 {
        return Err(EngineError::invalid_argument(format!(
            "invalid page_size: {requested} (must be >= 0)"
        )));
    }
    if requested == 0 {
        return Ok(DEFAULT_PAGE_SIZE);
    }
    Ok((requested as u64).min(MAX_PAGE_SIZE as u64) as u32)
}

/// A tagged page-token record. `secondary_token` is only populated by
/// CrossReferences' compound token (spec §4.2, §4.6); Edges only ever sets
/// `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub index: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secondary_token: String,
}

impl PageToken {
    pub fn simple(index: i32) -> Self {
        Self {
            index,
            secondary_token: String::new(),
        }
    }

    pub fn compound(index: i32, secondary_token: impl Into<String>) -> Self {
        Self {
            index,
            secondary_token: secondary_token.into(),
        }
    }

    /// Encode as base64-standard over a JSON payload (spec §4.2, §6). JSON
    /// keeps the token forward-compatible the way a tagged record would be,
    /// without a protobuf toolchain in this crate.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("PageToken always serializes");
        BASE64.encode(json)
    }

    /// Decode a caller-supplied token. Empty string means "start from the
    /// beginning" and decodes to the zero token rather than an error — callers
    /// pass `""` for the first page.
    pub fn decode(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Ok(Self::default());
        }
        let bytes = BASE64
            .decode(token)
            .map_err(|e| EngineError::invalid_argument(format!("invalid page_token: {e}")))?;
        let decoded: Self = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::invalid_argument(format!("invalid page_token: {e}")))?;
        if decoded.index < 0 {
            return Err(EngineError::invalid_argument(
                "invalid page_token: negative index",
            ));
        }
        Ok(decoded)
    }
}

/// Emit rule (spec §4.2): `NextPageToken` is present iff the cursor hasn't
/// exhausted `total_possible` and at least one item was returned this page.
pub fn next_token_index(page_token_index: u32, total_this_page: u32, total_possible: u32) -> Option<u32> {
    let consumed = page_token_index + total_this_page;
    if consumed < total_possible && total_this_page > 0 {
        Some(consumed)
    } else {
        None
    }
}

/// Skip/limit cursor threaded through accumulation (spec §4.2). `skip` is the
/// number of matching items still to be dropped before anything is kept;
/// `total`/`max` track how much has been kept so far against the page budget.
#[derive(Debug, Clone, Copy)]
pub struct FilterStats {
    pub skip: u32,
    pub total: u32,
    pub max: u32,
}

impl FilterStats {
    pub fn new(skip: u32, max: u32) -> Self {
        Self { skip, total: 0, max }
    }

    pub fn is_full(&self) -> bool {
        self.total >= self.max
    }

    /// Fast-path predicate for a known-length run (an overflow page's edge
    /// count) without materializing it: if the whole run would be skipped,
    /// consume it against `skip` and report `true` so the caller can avoid
    /// the fetch entirely (spec §4.2, §4.3 step 3.d).
    pub fn skip_run(&mut self, len: u32) -> bool {
        if len <= self.skip {
            self.skip -= len;
            true
        } else {
            false
        }
    }

    /// Apply the four-step kernel to one contiguous sequence, returning the
    /// sub-slice (by index range) that should be appended to the reply.
    /// Consumes ownership of `items` since truncation/draining is cheaper
    /// than cloning a retained prefix.
    pub fn accumulate<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        if self.is_full() {
            return Vec::new();
        }
        let len = items.len() as u32;
        if len <= self.skip {
            self.skip -= len;
            return Vec::new();
        }
        if self.skip > 0 {
            items.drain(0..self.skip as usize);
            self.skip = 0;
        }
        let remaining = self.max - self.total;
        if items.len() as u32 > remaining {
            items.truncate(remaining as usize);
        }
        self.total += items.len() as u32;
        items
    }
}

/// Guards a batch-lookup stream so it is always fully drained, even on an
/// early return (spec §4.1, §9 — the Rust analogue of a scope-guarded
/// `defer`). Note this is an explicit-call guard, not a `Drop` impl: `Drop`
/// cannot run async code, and the stream's own `Drop` already releases any
/// purely in-process resources (buffers, open generators) the moment it's
/// dropped. The explicit `drain()` exists for backends whose remaining items
/// represent in-flight I/O (e.g. a remote batch RPC) that should be allowed to
/// finish rather than be abandoned mid-flight — callers on every early-return
/// path must await it before returning.
pub struct BatchStreamGuard<'a, T> {
    stream: BoxStream<'a, T>,
}

impl<'a, T> BatchStreamGuard<'a, T> {
    pub fn new(stream: BoxStream<'a, T>) -> Self {
        Self { stream }
    }

    pub async fn next(&mut self) -> Option<T> {
        self.stream.next().await
    }

    /// Consume and discard whatever remains. Call this on every path that
    /// stops short of natural exhaustion.
    pub async fn drain(mut self) {
        while self.stream.next().await.is_some() {}
    }
}
