//! xref-store — the serving-corpus data model and lookup abstraction (spec §3, §4.1).
//!
//! This crate has no opinion about *how* a request uses the data it returns;
//! that's `xref-engine`. It only answers: given a ticket or page key, what
//! record does the corpus hold for it, point or batch, from either a combined
//! or split keyspace.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::{
    CombinedLookup, Context, KvPut, KvStore, Lookup, SplitLookup,
};
pub use domain::model::*;
pub use error::{ErrorKind, Result, StoreError};
pub use infrastructure::{MemoryKv, SqliteKv};
