//! `KvStore` — the narrow contract this crate consumes from "the key-value store
//! backing the lookup tables" (spec §1, out of scope to reimplement as a product).
//!
//! Point lookups return a single `Result`; batch lookups return a stream of
//! per-key results so a partial failure never has to fail the whole batch (spec
//! §4.1). Ordering across the stream is implementation-defined but must be stable
//! for a given store (spec §5).

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Request-scoped cancellation, threaded through every store call (spec §5).
#[derive(Clone)]
pub struct Context {
    pub cancellation: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// One item of a batch lookup's result stream: the key it answers plus its own
/// independently-tagged result.
pub type BatchItem = (Vec<u8>, Result<Vec<u8>>);

/// Point and batch lookup over an opaque byte-keyed store.
///
/// Implementations: `MemoryKv` (in-process, for tests and small corpora) and
/// `SqliteKv` (persisted, via `rusqlite`). Both live under `infrastructure/`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Point lookup. Returns `ErrorKind::NoSuchKey` if absent.
    async fn get(&self, ctx: &Context, key: &[u8]) -> Result<Vec<u8>>;

    /// Batch lookup. The returned stream must be drained even on early return
    /// (spec §4.1, §9) — callers should wrap consumption in `DrainOnDrop`
    /// (see `xref_engine::pagination`) rather than relying on discipline alone.
    async fn batch_get<'a>(&'a self, ctx: &'a Context, keys: Vec<Vec<u8>>) -> BoxStream<'a, BatchItem>;
}
