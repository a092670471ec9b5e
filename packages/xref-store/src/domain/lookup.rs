//! `Lookup` — the five serving-corpus operations (spec §4.1), composed over a
//! `KvStore` in either combined (one table, prefixed keys) or split (five
//! tables) form. The split/combined choice is a capability set: one trait,
//! two implementations, no inheritance (spec §9).

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::domain::kv::{Context, KvStore};
use crate::domain::model::{
    EdgePage, FileDecorations, PageKey, PagedCrossReferences, PagedCrossReferencesPage,
    PagedEdgeSet, Ticket,
};
use crate::error::{Result, StoreError};

/// One item of `paged_edge_sets`'s result stream.
pub type PagedEdgeSetItem = (Ticket, Result<PagedEdgeSet>);

#[async_trait]
pub trait Lookup: Send + Sync {
    async fn paged_edge_sets<'a>(
        &'a self,
        ctx: &'a Context,
        tickets: Vec<Ticket>,
    ) -> BoxStream<'a, PagedEdgeSetItem>;

    async fn edge_page(&self, ctx: &Context, key: &PageKey) -> Result<EdgePage>;

    async fn file_decorations(&self, ctx: &Context, ticket: &Ticket) -> Result<FileDecorations>;

    async fn cross_references(&self, ctx: &Context, ticket: &Ticket) -> Result<PagedCrossReferences>;

    async fn cross_references_page(
        &self,
        ctx: &Context,
        key: &PageKey,
    ) -> Result<PagedCrossReferencesPage>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Combined-keyspace key builders (spec §6 — literal, stable prefixes)
// ═══════════════════════════════════════════════════════════════════════════

pub fn edge_set_key(ticket: &str) -> Vec<u8> {
    format!("edgeSets:{ticket}").into_bytes()
}

pub fn edge_page_key(page_key: &str) -> Vec<u8> {
    format!("edgePages:{page_key}").into_bytes()
}

pub fn decorations_key(ticket: &str) -> Vec<u8> {
    format!("decor:{ticket}").into_bytes()
}

pub fn cross_references_key(ticket: &str) -> Vec<u8> {
    format!("xrefs:{ticket}").into_bytes()
}

pub fn cross_references_page_key(page_key: &str) -> Vec<u8> {
    format!("xrefPages:{page_key}").into_bytes()
}

fn decode<T: serde::de::DeserializeOwned>(bytes: Result<Vec<u8>>) -> Result<T> {
    let bytes = bytes?;
    serde_json::from_slice(&bytes).map_err(StoreError::from)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(StoreError::from)
}

// ═══════════════════════════════════════════════════════════════════════════
// CombinedLookup: one keyspace, five key prefixes
// ═══════════════════════════════════════════════════════════════════════════

pub struct CombinedLookup<S: KvStore> {
    store: S,
}

impl<S: KvStore> CombinedLookup<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Used by corpus-loading test fixtures; not part of the read-side contract.
    pub async fn put_edge_set(&self, ctx: &Context, ticket: &str, pes: &PagedEdgeSet) -> Result<()>
    where
        S: KvPut,
    {
        self.store.put(ctx, edge_set_key(ticket), encode(pes)?).await
    }
}

#[async_trait]
pub trait KvPut: Send + Sync {
    async fn put(&self, ctx: &Context, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl<S: KvStore> Lookup for CombinedLookup<S> {
    async fn paged_edge_sets<'a>(
        &'a self,
        ctx: &'a Context,
        tickets: Vec<Ticket>,
    ) -> BoxStream<'a, PagedEdgeSetItem> {
        let keys: Vec<Vec<u8>> = tickets.iter().map(|t| edge_set_key(t)).collect();
        let inner = self.store.batch_get(ctx, keys).await;
        inner
            .map(|(key, bytes)| {
                let key_str = String::from_utf8_lossy(&key);
                let ticket = key_str
                    .strip_prefix("edgeSets:")
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| key_str.into_owned());
                (ticket, decode(bytes))
            })
            .boxed()
    }

    async fn edge_page(&self, ctx: &Context, key: &PageKey) -> Result<EdgePage> {
        decode(self.store.get(ctx, &edge_page_key(key)).await)
    }

    async fn file_decorations(&self, ctx: &Context, ticket: &Ticket) -> Result<FileDecorations> {
        decode(self.store.get(ctx, &decorations_key(ticket)).await)
    }

    async fn cross_references(&self, ctx: &Context, ticket: &Ticket) -> Result<PagedCrossReferences> {
        decode(self.store.get(ctx, &cross_references_key(ticket)).await)
    }

    async fn cross_references_page(
        &self,
        ctx: &Context,
        key: &PageKey,
    ) -> Result<PagedCrossReferencesPage> {
        decode(self.store.get(ctx, &cross_references_page_key(key)).await)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SplitLookup: five distinct tables, raw ticket as key
// ═══════════════════════════════════════════════════════════════════════════

pub struct SplitLookup<S: KvStore> {
    pub edge_sets: S,
    pub edge_pages: S,
    pub decorations: S,
    pub cross_references: S,
    pub cross_reference_pages: S,
}

impl<S: KvStore> SplitLookup<S> {
    pub fn new(
        edge_sets: S,
        edge_pages: S,
        decorations: S,
        cross_references: S,
        cross_reference_pages: S,
    ) -> Self {
        Self {
            edge_sets,
            edge_pages,
            decorations,
            cross_references,
            cross_reference_pages,
        }
    }
}

#[async_trait]
impl<S: KvStore> Lookup for SplitLookup<S> {
    async fn paged_edge_sets<'a>(
        &'a self,
        ctx: &'a Context,
        tickets: Vec<Ticket>,
    ) -> BoxStream<'a, PagedEdgeSetItem> {
        let keys: Vec<Vec<u8>> = tickets.iter().map(|t| t.clone().into_bytes()).collect();
        let inner = self.edge_sets.batch_get(ctx, keys).await;
        inner
            .map(|(key, bytes)| (String::from_utf8_lossy(&key).into_owned(), decode(bytes)))
            .boxed()
    }

    async fn edge_page(&self, ctx: &Context, key: &PageKey) -> Result<EdgePage> {
        decode(self.edge_pages.get(ctx, key.as_bytes()).await)
    }

    async fn file_decorations(&self, ctx: &Context, ticket: &Ticket) -> Result<FileDecorations> {
        decode(self.decorations.get(ctx, ticket.as_bytes()).await)
    }

    async fn cross_references(&self, ctx: &Context, ticket: &Ticket) -> Result<PagedCrossReferences> {
        decode(self.cross_references.get(ctx, ticket.as_bytes()).await)
    }

    async fn cross_references_page(
        &self,
        ctx: &Context,
        key: &PageKey,
    ) -> Result<PagedCrossReferencesPage> {
        decode(self.cross_reference_pages.get(ctx, key.as_bytes()).await)
    }
}
