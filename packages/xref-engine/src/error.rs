//! Error types for xref-engine (spec §7)

use std::fmt;
use thiserror::Error;

/// Engine error kinds, distinguishable by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad page size, bad page token, malformed location, ticket canonicalization
    /// failure.
    InvalidArgument,
    /// Decorations-specific: `DecorationsNotFound` sentinel. Other queries treat
    /// missing keys as "no data for that ticket" and skip silently rather than
    /// surfacing this kind.
    NotFound,
    /// Missing referenced `EdgePage` (dangling `PageIndex`), marshalling
    /// failures, invariant violations.
    Internal,
    /// Any store error that is not `ErrNoSuchKey`.
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
            ErrorKind::Transient => "transient",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct EngineError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// The one dedicated NotFound sentinel the spec names explicitly: a
    /// Decorations request whose file ticket has no corpus record.
    pub fn decorations_not_found(ticket: &str) -> Self {
        Self::not_found(format!("no decorations for file ticket: {ticket}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// A pagination/accounting invariant was violated — an engine bug, not
    /// a caller error (spec §4.3 step 4, §7). `debug_assert!` at the call
    /// site catches it in development; this is the typed error returned in
    /// release so the caller gets a clean failure instead of a panic.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::internal(message)
    }

    /// Wraps a non-`NoSuchKey` store error; `ErrNoSuchKey` itself is never
    /// turned into an `EngineError` by call sites — it's recovered (skip) at
    /// the point of the lookup.
    pub fn store(ticket_or_key: &str, source: xref_store::StoreError) -> Self {
        Self::new(
            ErrorKind::Transient,
            format!("store error for {ticket_or_key}: {source}"),
        )
        .with_source(source)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
