//! In-memory `KvStore`, backed by a lock-free concurrent map.
//!
//! Intended for tests and for embedding the engine against a corpus small
//! enough to fit in process memory. Reads vastly outnumber writes (the corpus
//! is built once, offline, then served many times), so `DashMap` — the same
//! lock-free map the teacher's orchestration crate uses for its dependency
//! graph — is a better fit here than a `RwLock<HashMap>`.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::domain::kv::{BatchItem, Context, KvStore};
use crate::domain::lookup::KvPut;
use crate::error::{Result, StoreError};

#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, ctx: &Context, key: &[u8]) -> Result<Vec<u8>> {
        if ctx.is_cancelled() {
            debug!(key = %String::from_utf8_lossy(key), "get on cancelled context");
            return Err(StoreError::cancelled());
        }
        self.entries
            .get(key)
            .map(|v| v.clone())
            .ok_or_else(|| StoreError::no_such_key(String::from_utf8_lossy(key)))
    }

    async fn batch_get<'a>(&'a self, ctx: &'a Context, keys: Vec<Vec<u8>>) -> BoxStream<'a, BatchItem> {
        if ctx.is_cancelled() {
            debug!(keys = keys.len(), "batch_get on cancelled context");
            return stream::iter(
                keys.into_iter()
                    .map(|k| (k, Err(StoreError::cancelled())))
                    .collect::<Vec<_>>(),
            )
            .boxed();
        }
        let items: Vec<BatchItem> = keys
            .into_iter()
            .map(|key| {
                let result = self
                    .entries
                    .get(&key)
                    .map(|v| v.clone())
                    .ok_or_else(|| StoreError::no_such_key(String::from_utf8_lossy(&key)));
                (key, result)
            })
            .collect();
        stream::iter(items).boxed()
    }
}

#[async_trait]
impl KvPut for MemoryKv {
    async fn put(&self, _ctx: &Context, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }
}
