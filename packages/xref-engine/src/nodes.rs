//! Nodes Engine (C4, spec §4.4): a thin projection over the same batch
//! lookup Edges uses — no pagination, no edge traversal.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};
use xref_store::{Context, Lookup, Node, Ticket};

use crate::collab::filter::project_node;
use crate::collab::uri::UriCanonicalizer;
use crate::collab::FilterCompiler;
use crate::error::Result;
use crate::pagination::BatchStreamGuard;

#[derive(Debug, Clone, Default)]
pub struct NodesRequest {
    pub tickets: Vec<String>,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodesReply {
    pub nodes: Vec<Node>,
}

pub struct NodesEngine {
    lookup: Arc<dyn Lookup>,
    uri: Arc<dyn UriCanonicalizer>,
    filters: Arc<dyn FilterCompiler>,
}

impl NodesEngine {
    pub fn new(
        lookup: Arc<dyn Lookup>,
        uri: Arc<dyn UriCanonicalizer>,
        filters: Arc<dyn FilterCompiler>,
    ) -> Self {
        Self {
            lookup,
            uri,
            filters,
        }
    }

    pub async fn nodes(&self, ctx: &Context, req: NodesRequest) -> Result<NodesReply> {
        let span = info_span!("nodes", tickets = req.tickets.len());
        self.nodes_inner(ctx, req).instrument(span).await
    }

    async fn nodes_inner(&self, ctx: &Context, req: NodesRequest) -> Result<NodesReply> {
        let tickets: Vec<Ticket> = self.uri.fix_all(&req.tickets)?;
        let patterns = self.filters.compile(&req.filters)?;

        let stream = self.lookup.paged_edge_sets(ctx, tickets).await;
        let mut guard = BatchStreamGuard::new(stream);
        let mut nodes = Vec::new();

        while let Some((ticket, result)) = guard.next().await {
            match result {
                Ok(pes) => {
                    if let Some(projected) = project_node(&pes.source, &patterns) {
                        nodes.push(projected);
                    }
                }
                Err(e) if e.is_no_such_key() => {
                    debug!(ticket = %ticket, "missing paged edge set");
                }
                Err(e) => {
                    guard.drain().await;
                    return Err(crate::error::EngineError::store(&ticket, e));
                }
            }
        }

        Ok(NodesReply { nodes })
    }
}
