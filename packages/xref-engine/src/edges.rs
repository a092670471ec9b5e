//! Edges Engine (C3, spec §4.3): paginated edge-set serving over a batch of
//! source tickets.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info_span, Instrument};
use xref_store::{Context, Edge, EdgeGroup, Lookup, Node, Ticket};

use crate::collab::filter::{project_node, Pattern};
use crate::collab::uri::UriCanonicalizer;
use crate::collab::FilterCompiler;
use crate::error::{EngineError, Result};
use crate::pagination::{next_token_index, resolve_page_size, BatchStreamGuard, FilterStats, PageToken};

/// The `kinds_predicate` of spec §4.3. Usually an allowlist derived from the
/// request's literal kind strings; the CrossReferences Engine's related-node
/// tail instead needs an arbitrary predicate (`!is_anchor_edge(kind)`), so
/// this is a small enum rather than a bare `Vec<String>`.
#[derive(Clone)]
pub enum KindsFilter {
    /// Empty allowlist: every kind passes.
    All,
    Allow(Vec<String>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Default for KindsFilter {
    fn default() -> Self {
        KindsFilter::All
    }
}

impl std::fmt::Debug for KindsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KindsFilter::All => write!(f, "KindsFilter::All"),
            KindsFilter::Allow(kinds) => write!(f, "KindsFilter::Allow({kinds:?})"),
            KindsFilter::Predicate(_) => write!(f, "KindsFilter::Predicate(..)"),
        }
    }
}

impl KindsFilter {
    fn allowed(&self, kind: &str) -> bool {
        match self {
            KindsFilter::All => true,
            KindsFilter::Allow(kinds) => kinds.is_empty() || kinds.iter().any(|k| k == kind),
            KindsFilter::Predicate(f) => f(kind),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgesRequest {
    pub tickets: Vec<String>,
    pub filters: Vec<String>,
    pub kinds: KindsFilter,
    pub page_size: i64,
    pub page_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSetReply {
    pub source_ticket: Ticket,
    pub groups: Vec<EdgeGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct EdgesReply {
    pub edge_sets: Vec<EdgeSetReply>,
    pub nodes: Vec<Node>,
    pub next_page_token: String,
}

pub struct EdgesEngine {
    lookup: Arc<dyn Lookup>,
    uri: Arc<dyn UriCanonicalizer>,
    filters: Arc<dyn FilterCompiler>,
}

impl EdgesEngine {
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

    pub async fn edges(&self, ctx: &Context, req: EdgesRequest) -> Result<EdgesReply> {
        let span = info_span!("edges", tickets = req.tickets.len());
        self.edges_inner(ctx, req).instrument(span).await
    }

    async fn edges_inner(&self, ctx: &Context, req: EdgesRequest) -> Result<EdgesReply> {
        let tickets: Vec<Ticket> = self.uri.fix_all(&req.tickets)?;
        let patterns = self.filters.compile(&req.filters)?;
        let page_size = resolve_page_size(req.page_size)?;
        let page_token = PageToken::decode(&req.page_token)?;

        let mut stats = FilterStats::new(page_token.index as u32, page_size);
        let mut total_possible: u32 = 0;
        let mut dedup: HashSet<Ticket> = HashSet::new();
        let mut reply = EdgesReply::default();

        let stream = self.lookup.paged_edge_sets(ctx, tickets).await;
        let mut guard = BatchStreamGuard::new(stream);

        while let Some((ticket, result)) = guard.next().await {
            let pes = match result {
                Ok(pes) => pes,
                Err(e) if e.is_no_such_key() => {
                    debug!(ticket = %ticket, "missing paged edge set");
                    continue;
                }
                Err(e) => {
                    guard.drain().await;
                    return Err(EngineError::store(&ticket, e));
                }
            };

            let inline_possible: u32 = pes
                .groups
                .iter()
                .filter(|g| req.kinds.allowed(&g.kind))
                .map(|g| g.edges.len() as u32)
                .sum();
            let paged_possible: u32 = pes
                .page_index
                .iter()
                .filter(|p| req.kinds.allowed(&p.kind))
                .map(|p| p.edge_count)
                .sum();
            total_possible += inline_possible + paged_possible;

            if stats.is_full() {
                continue;
            }

            let mut produced_groups: Vec<EdgeGroup> = Vec::new();

            for group in &pes.groups {
                if !req.kinds.allowed(&group.kind) {
                    continue;
                }
                let kept = stats.accumulate(group.edges.clone());
                if kept.is_empty() {
                    continue;
                }
                add_target_nodes(&kept, &patterns, &mut dedup, &mut reply.nodes);
                produced_groups.push(EdgeGroup {
                    kind: group.kind.clone(),
                    edges: kept,
                });
            }

            for page_index in &pes.page_index {
                if !req.kinds.allowed(&page_index.kind) {
                    continue;
                }
                if stats.is_full() {
                    break;
                }
                if stats.skip_run(page_index.edge_count) {
                    continue;
                }
                let page = self
                    .lookup
                    .edge_page(ctx, &page_index.page_key)
                    .await
                    .map_err(|e| {
                        EngineError::internal(format!(
                            "missing edge page {}: {e}",
                            page_index.page_key
                        ))
                        .with_source(e)
                    })?;
                let kept = stats.accumulate(page.group.edges);
                if kept.is_empty() {
                    continue;
                }
                add_target_nodes(&kept, &patterns, &mut dedup, &mut reply.nodes);
                produced_groups.push(EdgeGroup {
                    kind: page.group.kind,
                    edges: kept,
                });
            }

            if !produced_groups.is_empty() {
                if !patterns.is_empty() && dedup.insert(pes.source.ticket.clone()) {
                    if let Some(projected) = project_node(&pes.source, &patterns) {
                        reply.nodes.push(projected);
                    }
                }
                reply.edge_sets.push(EdgeSetReply {
                    source_ticket: pes.source.ticket.clone(),
                    groups: produced_groups,
                });
            }
        }

        if stats.total > stats.max || page_token.index as u32 + stats.total > total_possible {
            debug_assert!(
                false,
                "pagination invariant violated: total={}, max={}, token={}, total_possible={}",
                stats.total, stats.max, page_token.index, total_possible
            );
            return Err(EngineError::invariant(
                "pagination accounting invariant violated",
            ));
        }

        if let Some(next) = next_token_index(page_token.index as u32, stats.total, total_possible) {
            reply.next_page_token = PageToken::simple(next as i32).encode();
        }

        Ok(reply)
    }
}

fn add_target_nodes(
    edges: &[Edge],
    patterns: &[Pattern],
    dedup: &mut HashSet<Ticket>,
    nodes: &mut Vec<Node>,
) {
    if patterns.is_empty() {
        return;
    }
    for edge in edges {
        if dedup.insert(edge.target.ticket.clone()) {
            if let Some(projected) = project_node(&edge.target, patterns) {
                nodes.push(projected);
            }
        }
    }
}
