//! SQLite-backed `KvStore`.
//!
//! Completes the teacher's `SqliteSnapshotStore` placeholder
//! (`todo!("RFC-102: Implement SQLite adapter")`) with an actual adapter: a
//! single `key TEXT PRIMARY KEY, value BLOB` table. `rusqlite` is synchronous,
//! so every call is dispatched onto the blocking thread pool via
//! `spawn_blocking`; a batch lookup fans its keys out onto that pool and
//! rejoins them with `FuturesOrdered` so results come back in the order the
//! futures were spawned (a reasonable, stable-for-this-store order — spec §5
//! asks only that ordering be stable per store, not that it match request
//! order).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{BoxStream, FuturesOrdered, StreamExt};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::domain::kv::{BatchItem, Context, KvStore};
use crate::domain::lookup::KvPut;
use crate::error::{Result, StoreError};

pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_blocking(conn: &Arc<Mutex<Connection>>, key: Vec<u8>) -> Result<Vec<u8>> {
        let key_str = String::from_utf8_lossy(&key).into_owned();
        let conn = conn.lock().expect("sqlite connection mutex poisoned");
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key_str], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::no_such_key(key_str),
            other => {
                warn!(key = %key_str, error = %other, "sqlite query failed");
                StoreError::from(other)
            }
        })
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, ctx: &Context, key: &[u8]) -> Result<Vec<u8>> {
        if ctx.is_cancelled() {
            debug!(key = %String::from_utf8_lossy(key), "get on cancelled context");
            return Err(StoreError::cancelled());
        }
        let conn = Arc::clone(&self.conn);
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || Self::get_blocking(&conn, key))
            .await
            .map_err(|e| StoreError::database(format!("blocking task join error: {e}")))?
    }

    async fn batch_get<'a>(&'a self, ctx: &'a Context, keys: Vec<Vec<u8>>) -> BoxStream<'a, BatchItem> {
        if ctx.is_cancelled() {
            let items: Vec<BatchItem> = keys
                .into_iter()
                .map(|k| (k, Err(StoreError::cancelled())))
                .collect();
            return futures::stream::iter(items).boxed();
        }

        let mut futs = FuturesOrdered::new();
        for key in keys {
            let conn = Arc::clone(&self.conn);
            let key_for_task = key.clone();
            futs.push_back(async move {
                let result = tokio::task::spawn_blocking(move || Self::get_blocking(&conn, key_for_task))
                    .await
                    .unwrap_or_else(|e| Err(StoreError::database(format!("blocking task join error: {e}"))));
                (key, result)
            });
        }
        futs.boxed()
    }
}

#[async_trait]
impl KvPut for SqliteKv {
    async fn put(&self, _ctx: &Context, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let key_str = String::from_utf8_lossy(&key).into_owned();
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key_str, value],
            )
            .map(|_| ())
            .map_err(|err| {
                warn!(key = %key_str, error = %err, "sqlite insert failed");
                StoreError::from(err)
            })
        })
        .await
        .map_err(|e| StoreError::database(format!("blocking task join error: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_is_no_such_key() {
        let kv = SqliteKv::open_in_memory().unwrap();
        let ctx = Context::new();
        let err = kv.get(&ctx, b"missing").await.unwrap_err();
        assert!(err.is_no_such_key());
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let kv = SqliteKv::open_in_memory().unwrap();
        let ctx = Context::new();
        kv.put(&ctx, b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(kv.get(&ctx, b"k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn batch_get_preserves_request_order() {
        let kv = SqliteKv::open_in_memory().unwrap();
        let ctx = Context::new();
        kv.put(&ctx, b"a".to_vec(), b"1".to_vec()).await.unwrap();
        kv.put(&ctx, b"b".to_vec(), b"2".to_vec()).await.unwrap();
        let results: Vec<BatchItem> = kv
            .batch_get(&ctx, vec![b"a".to_vec(), b"missing".to_vec(), b"b".to_vec()])
            .await
            .collect()
            .await;
        assert_eq!(results[0].0, b"a");
        assert_eq!(results[0].1.as_ref().unwrap(), b"1");
        assert!(results[1].1.as_ref().unwrap_err().is_no_such_key());
        assert_eq!(results[2].0, b"b");
        assert_eq!(results[2].1.as_ref().unwrap(), b"2");
    }

    #[tokio::test]
    async fn persists_across_handles_to_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.sqlite");
        {
            let kv = SqliteKv::open(&path).unwrap();
            let ctx = Context::new();
            kv.put(&ctx, b"k".to_vec(), b"v".to_vec()).await.unwrap();
        }
        let kv = SqliteKv::open(&path).unwrap();
        let ctx = Context::new();
        assert_eq!(kv.get(&ctx, b"k").await.unwrap(), b"v");
    }
}
