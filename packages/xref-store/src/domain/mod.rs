//! Domain layer: the serving-corpus data model (§3) and the two port traits
//! this crate exposes — `KvStore` (the external key-value contract) and
//! `Lookup` (the five C1 operations built over it).

pub mod kv;
pub mod lookup;
pub mod model;

pub use kv::{BatchItem, Context, KvStore};
pub use lookup::{
    cross_references_key, cross_references_page_key, decorations_key, edge_page_key,
    edge_set_key, CombinedLookup, KvPut, Lookup, PagedEdgeSetItem, SplitLookup,
};
pub use model::*;
