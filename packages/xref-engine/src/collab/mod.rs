//! Collaborator interfaces (spec §6): ticket canonicalization, fact-filter
//! compilation, text normalization, dirty-buffer patching, and Kythe-style
//! schema classification. The spec treats all of these as external services
//! consumed through stated interfaces; this module defines the traits plus
//! small reference implementations so the engine is runnable standalone.

pub mod filter;
pub mod normalizer;
pub mod patcher;
pub mod schema;
pub mod uri;

pub use filter::{FilterCompiler, Pattern, RegexFilterCompiler};
pub use normalizer::{LineIndexNormalizer, TextNormalizer};
pub use patcher::{AnchorPatcher, DiffPatcher, IdentityPatcher};
pub use schema::{KytheSchema, KytheSchemaImpl};
pub use uri::{IdentityUriCanonicalizer, UriCanonicalizer};

use xref_store::Point;

/// Where a Decorations request anchors its query (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    File,
    Span,
}

/// A Decorations request's `location` field.
#[derive(Debug, Clone)]
pub struct RequestedLocation {
    pub ticket: String,
    pub kind: LocationKind,
    pub start: Option<u32>,
    pub end: Option<u32>,
}

/// How a returned reference's span must relate to the requested span (spec
/// §4.5 step 6b, §8 property 8). `WithinSpan` requires the anchor to sit
/// entirely inside the requested bounds; `AroundSpan` requires the anchor to
/// entirely contain the requested bounds (used for `File`-kind locations,
/// where the "requested span" is the whole file and every anchor trivially
/// qualifies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    WithinSpan,
    AroundSpan,
}

/// Pure span predicate (spec §6 — free function, not a collaborator trait:
/// it is pure and total over its inputs, so there is nothing to swap out).
pub fn in_span_bounds(span_kind: SpanKind, start: u32, end: u32, lo: u32, hi: u32) -> bool {
    match span_kind {
        SpanKind::WithinSpan => lo <= start && end <= hi,
        SpanKind::AroundSpan => start <= lo && hi <= end,
    }
}

/// `Point` conversion helper shared by every engine that turns a byte offset
/// into a full `{byte, line, column}` triple via a `TextNormalizer`.
pub fn point_span(normalizer: &dyn TextNormalizer, start: u32, end: u32) -> (Point, Point) {
    (normalizer.byte_offset(start), normalizer.byte_offset(end))
}

/// "Slow" callers/documentation helpers (spec §6): the engine only forwards
/// the request and its own handle. Out of scope for this crate (§1) — the
/// trait exists so call sites that would delegate to it type-check against
/// the full collaborator surface; the reference implementation always
/// reports the operation as unimplemented.
#[async_trait::async_trait]
pub trait SlowCallersDocs: Send + Sync {
    async fn callers(&self, ticket: &str) -> crate::error::Result<Vec<String>>;
    async fn documentation(&self, ticket: &str) -> crate::error::Result<String>;
}

pub struct UnimplementedCallersDocs;

#[async_trait::async_trait]
impl SlowCallersDocs for UnimplementedCallersDocs {
    async fn callers(&self, _ticket: &str) -> crate::error::Result<Vec<String>> {
        Err(crate::error::EngineError::internal(
            "callers is a slow out-of-scope collaborator; not implemented",
        ))
    }

    async fn documentation(&self, _ticket: &str) -> crate::error::Result<String> {
        Err(crate::error::EngineError::internal(
            "documentation is a slow out-of-scope collaborator; not implemented",
        ))
    }
}
