//! Ticket canonicalization (spec §6, §4.1): every incoming ticket is run
//! through this before it touches the store, so callers can pass whatever
//! spelling of a Kythe URI they like.

use crate::error::{EngineError, Result};

pub trait UriCanonicalizer: Send + Sync {
    fn fix(&self, ticket: &str) -> Result<String>;

    fn fix_all(&self, tickets: &[String]) -> Result<Vec<String>> {
        tickets.iter().map(|t| self.fix(t)).collect()
    }
}

/// Trims surrounding whitespace and rejects the empty ticket. Real URI
/// canonicalization (percent-decoding, query-parameter ordering) lives
/// upstream of this crate; this is the identity modulo the one malformed
/// input the spec calls out explicitly.
pub struct IdentityUriCanonicalizer;

impl UriCanonicalizer for IdentityUriCanonicalizer {
    fn fix(&self, ticket: &str) -> Result<String> {
        let trimmed = ticket.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_argument("empty ticket"));
        }
        Ok(trimmed.to_string())
    }
}
