//! CrossReferences Engine (C6, spec §4.6): paginates an anchor set grouped
//! into definition/declaration/reference/documentation buckets, then chains
//! to the Edges Engine for a related-nodes tail.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info_span, Instrument};
use xref_store::{Context, ExpandedAnchor, Lookup, Node, Ticket};

use crate::collab::schema::KytheSchema;
use crate::collab::uri::UriCanonicalizer;
use crate::collab::FilterCompiler;
use crate::edges::{EdgesEngine, EdgesRequest, KindsFilter};
use crate::error::{EngineError, Result};
use crate::pagination::{next_token_index, resolve_page_size, FilterStats, PageToken};

const BATCH_CONCURRENCY: usize = 8;

/// Which anchor kinds a request wants populated (spec §4.6's
/// `{definition,declaration,reference,documentation}_kind` fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionInclusion {
    None,
    All,
    /// Used internally by the Decorations Engine's target-definition
    /// resolution (spec §4.5 step 7.i): only anchors whose edge kind is
    /// exactly `defines/binding`, never a reclassified plain `defines`.
    BindingOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    None,
    All,
}

#[derive(Debug, Clone)]
pub struct CrossReferencesRequest {
    pub tickets: Vec<String>,
    pub definition_kind: DefinitionInclusion,
    pub declaration_kind: Inclusion,
    pub reference_kind: Inclusion,
    pub documentation_kind: Inclusion,
    pub filter: Vec<String>,
    pub anchor_text: bool,
    pub page_size: i64,
    pub page_token: String,
}

impl Default for CrossReferencesRequest {
    fn default() -> Self {
        Self {
            tickets: Vec::new(),
            definition_kind: DefinitionInclusion::All,
            declaration_kind: Inclusion::All,
            reference_kind: Inclusion::All,
            documentation_kind: Inclusion::All,
            filter: Vec::new(),
            anchor_text: false,
            page_size: 0,
            page_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedNode {
    pub relation_kind: String,
    pub ticket: Ticket,
    pub ordinal: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceSetReply {
    pub definition: Vec<ExpandedAnchor>,
    pub declaration: Vec<ExpandedAnchor>,
    pub reference: Vec<ExpandedAnchor>,
    pub documentation: Vec<ExpandedAnchor>,
    pub related_node: Vec<RelatedNode>,
}

impl CrossReferenceSetReply {
    fn is_empty(&self) -> bool {
        self.definition.is_empty()
            && self.declaration.is_empty()
            && self.reference.is_empty()
            && self.documentation.is_empty()
            && self.related_node.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossReferencesReply {
    pub cross_references: HashMap<Ticket, CrossReferenceSetReply>,
    pub nodes: HashMap<Ticket, Node>,
    pub next_page_token: String,
}

enum Bucket {
    Definition,
    Declaration,
    Reference,
    Documentation,
}

fn classify(
    schema: &dyn KytheSchema,
    kind: &str,
    incomplete: bool,
    req: &CrossReferencesRequest,
) -> Option<Bucket> {
    let is_def = match req.definition_kind {
        DefinitionInclusion::None => false,
        DefinitionInclusion::BindingOnly => kind == crate::collab::schema::EDGE_DEFINES_BINDING,
        DefinitionInclusion::All => schema.is_def_kind(kind, incomplete),
    };
    if is_def {
        return Some(Bucket::Definition);
    }
    if req.declaration_kind == Inclusion::All && schema.is_decl_kind(kind, incomplete) {
        return Some(Bucket::Declaration);
    }
    if req.reference_kind == Inclusion::All && schema.is_ref_kind(kind) {
        return Some(Bucket::Reference);
    }
    if req.documentation_kind == Inclusion::All && schema.is_doc_kind(kind) {
        return Some(Bucket::Documentation);
    }
    None
}

fn bucket_mut<'a>(crs: &'a mut CrossReferenceSetReply, bucket: &Bucket) -> &'a mut Vec<ExpandedAnchor> {
    match bucket {
        Bucket::Definition => &mut crs.definition,
        Bucket::Declaration => &mut crs.declaration,
        Bucket::Reference => &mut crs.reference,
        Bucket::Documentation => &mut crs.documentation,
    }
}

fn project_anchor(anchor: ExpandedAnchor, schema: &dyn KytheSchema, anchor_text: bool) -> ExpandedAnchor {
    ExpandedAnchor {
        kind: schema.canonicalize(&anchor.kind),
        text: if anchor_text { anchor.text } else { None },
        ..anchor
    }
}

pub struct CrossReferencesEngine {
    lookup: Arc<dyn Lookup>,
    uri: Arc<dyn UriCanonicalizer>,
    filters: Arc<dyn FilterCompiler>,
    schema: Arc<dyn KytheSchema>,
    edges: Arc<EdgesEngine>,
}

impl CrossReferencesEngine {
    pub fn new(
        lookup: Arc<dyn Lookup>,
        uri: Arc<dyn UriCanonicalizer>,
        filters: Arc<dyn FilterCompiler>,
        schema: Arc<dyn KytheSchema>,
        edges: Arc<EdgesEngine>,
    ) -> Self {
        Self {
            lookup,
            uri,
            filters,
            schema,
            edges,
        }
    }

    pub async fn cross_references(
        &self,
        ctx: &Context,
        req: CrossReferencesRequest,
    ) -> Result<CrossReferencesReply> {
        let span = info_span!("cross_references", tickets = req.tickets.len());
        self.cross_references_inner(ctx, req).instrument(span).await
    }

    async fn cross_references_inner(
        &self,
        ctx: &Context,
        req: CrossReferencesRequest,
    ) -> Result<CrossReferencesReply> {
        let tickets: Vec<Ticket> = self.uri.fix_all(&req.tickets)?;
        let page_size = resolve_page_size(req.page_size)?;
        let compound = PageToken::decode(&req.page_token)?;

        let mut stats = FilterStats::new(compound.index as u32, page_size);
        let mut reply = CrossReferencesReply::default();
        let mut total_possible: u32 = 0;

        if compound.secondary_token.is_empty() {
            total_possible = self.anchor_phase(ctx, &tickets, &req, &mut stats, &mut reply).await?;
        }

        let related_secondary = if !req.filter.is_empty() && !stats.is_full() {
            self.related_nodes_phase(
                ctx,
                &tickets,
                &req,
                page_size,
                &compound.secondary_token,
                &stats,
                &mut reply,
            )
            .await?
        } else {
            None
        };

        let anchor_next = next_token_index(compound.index as u32, stats.total, total_possible);

        let next_token = if let Some(secondary) = related_secondary {
            Some(PageToken::compound(compound.index + stats.total as i32, secondary))
        } else {
            anchor_next.map(|idx| PageToken::simple(idx as i32))
        };

        if let Some(token) = next_token {
            reply.next_page_token = token.encode();
        }

        Ok(reply)
    }

    /// Runs the anchor phase; returns the total number of anchors that
    /// passed classification across every ticket (for the emit-rule check).
    async fn anchor_phase(
        &self,
        ctx: &Context,
        tickets: &[Ticket],
        req: &CrossReferencesRequest,
        stats: &mut FilterStats,
        reply: &mut CrossReferencesReply,
    ) -> Result<u32> {
        let order: HashMap<Ticket, usize> =
            tickets.iter().cloned().enumerate().map(|(i, t)| (t, i)).collect();

        let mut results: Vec<(Ticket, xref_store::Result<xref_store::PagedCrossReferences>)> =
            stream::iter(tickets.iter().cloned())
                .map(|ticket| {
                    let lookup = Arc::clone(&self.lookup);
                    let ctx = ctx.clone();
                    async move {
                        let result = lookup.cross_references(&ctx, &ticket).await;
                        (ticket, result)
                    }
                })
                .buffer_unordered(BATCH_CONCURRENCY)
                .collect()
                .await;
        results.sort_by_key(|(t, _)| *order.get(t).unwrap_or(&usize::MAX));

        let mut total_possible: u32 = 0;
        for (ticket, result) in results {
            let pcr = match result {
                Ok(pcr) => pcr,
                Err(e) if e.is_no_such_key() => {
                    debug!(ticket = %ticket, "missing cross references");
                    continue;
                }
                Err(e) => return Err(EngineError::store(&ticket, e)),
            };

            let inline_possible: u32 = pcr
                .groups
                .iter()
                .filter(|g| classify(self.schema.as_ref(), &g.kind, pcr.incomplete, req).is_some())
                .map(|g| g.anchors.len() as u32)
                .sum();
            let paged_possible: u32 = pcr
                .page_index
                .iter()
                .filter(|p| classify(self.schema.as_ref(), &p.kind, pcr.incomplete, req).is_some())
                .map(|p| p.anchor_count)
                .sum();
            total_possible += inline_possible + paged_possible;

            let mut crs = CrossReferenceSetReply::default();

            for group in &pcr.groups {
                let Some(bucket) = classify(self.schema.as_ref(), &group.kind, pcr.incomplete, req) else {
                    continue;
                };
                let kept = stats.accumulate(group.anchors.clone());
                if !kept.is_empty() {
                    let target = bucket_mut(&mut crs, &bucket);
                    target.extend(
                        kept.into_iter()
                            .map(|a| project_anchor(a, self.schema.as_ref(), req.anchor_text)),
                    );
                }
            }

            if !stats.is_full() {
                for page_index in &pcr.page_index {
                    let Some(bucket) =
                        classify(self.schema.as_ref(), &page_index.kind, pcr.incomplete, req)
                    else {
                        continue;
                    };
                    if stats.skip_run(page_index.anchor_count) {
                        continue;
                    }
                    let page = self
                        .lookup
                        .cross_references_page(ctx, &page_index.page_key)
                        .await
                        .map_err(|e| {
                            EngineError::internal(format!(
                                "missing cross reference page {}: {e}",
                                page_index.page_key
                            ))
                            .with_source(e)
                        })?;
                    let kept = stats.accumulate(page.group.anchors);
                    if !kept.is_empty() {
                        let target = bucket_mut(&mut crs, &bucket);
                        target.extend(
                            kept.into_iter()
                                .map(|a| project_anchor(a, self.schema.as_ref(), req.anchor_text)),
                        );
                    }
                    if stats.is_full() {
                        break;
                    }
                }
            }

            if !crs.is_empty() {
                reply.cross_references.insert(ticket, crs);
            }
        }

        Ok(total_possible)
    }

    async fn related_nodes_phase(
        &self,
        ctx: &Context,
        tickets: &[Ticket],
        req: &CrossReferencesRequest,
        page_size: u32,
        secondary_token: &str,
        stats: &FilterStats,
        reply: &mut CrossReferencesReply,
    ) -> Result<Option<String>> {
        let schema = Arc::clone(&self.schema);
        let edges_req = EdgesRequest {
            tickets: tickets.to_vec(),
            filters: req.filter.clone(),
            kinds: KindsFilter::Predicate(Arc::new(move |kind: &str| !schema.is_anchor_edge(kind))),
            page_size: (page_size - stats.total) as i64,
            page_token: secondary_token.to_string(),
        };
        let edges_reply = self.edges.edges(ctx, edges_req).await?;

        for edge_set in edges_reply.edge_sets {
            let crs = reply
                .cross_references
                .entry(edge_set.source_ticket.clone())
                .or_default();
            for group in edge_set.groups {
                for edge in group.edges {
                    crs.related_node.push(RelatedNode {
                        relation_kind: group.kind.clone(),
                        ticket: edge.target.ticket.clone(),
                        ordinal: edge.ordinal,
                    });
                }
            }
        }
        for node in edges_reply.nodes {
            reply.nodes.insert(node.ticket.clone(), node);
        }

        if edges_reply.next_page_token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(edges_reply.next_page_token))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::schema::{KytheSchemaImpl, EDGE_DEFINES_BINDING, EDGE_REF};
    use crate::collab::uri::IdentityUriCanonicalizer;
    use crate::collab::RegexFilterCompiler;
    use futures::stream::BoxStream;
    use xref_store::{CrossReferenceGroup, CrossReferencePageIndex, Node, PagedCrossReferences, Span};

    struct FakeLookup {
        xrefs: HashMap<Ticket, xref_store::Result<PagedCrossReferences>>,
    }

    fn anchor(ticket: &str, parent: &str, kind: &str) -> ExpandedAnchor {
        let point = Point {
            byte_offset: 0,
            line_number: 1,
            column_offset: 0,
        };
        ExpandedAnchor {
            ticket: ticket.to_string(),
            kind: kind.to_string(),
            parent: parent.to_string(),
            text: Some("x".to_string()),
            span: Span { start: point, end: point },
            snippet: String::new(),
            snippet_span: Span { start: point, end: point },
        }
    }

    #[async_trait::async_trait]
    impl Lookup for FakeLookup {
        async fn paged_edge_sets<'a>(
            &'a self,
            _ctx: &'a Context,
            _tickets: Vec<Ticket>,
        ) -> BoxStream<'a, (Ticket, xref_store::Result<xref_store::PagedEdgeSet>)> {
            futures::stream::empty().boxed()
        }

        async fn edge_page(
            &self,
            _ctx: &Context,
            _key: &xref_store::PageKey,
        ) -> xref_store::Result<xref_store::EdgePage> {
            unimplemented!()
        }

        async fn file_decorations(
            &self,
            _ctx: &Context,
            _ticket: &Ticket,
        ) -> xref_store::Result<xref_store::FileDecorations> {
            unimplemented!()
        }

        async fn cross_references(
            &self,
            _ctx: &Context,
            ticket: &Ticket,
        ) -> xref_store::Result<PagedCrossReferences> {
            self.xrefs
                .get(ticket)
                .cloned()
                .unwrap_or_else(|| Err(xref_store::StoreError::no_such_key(ticket)))
        }

        async fn cross_references_page(
            &self,
            _ctx: &Context,
            _key: &xref_store::PageKey,
        ) -> xref_store::Result<xref_store::PagedCrossReferencesPage> {
            unimplemented!()
        }
    }

    fn make_engine(lookup: FakeLookup) -> CrossReferencesEngine {
        let lookup: Arc<dyn Lookup> = Arc::new(lookup);
        let uri: Arc<dyn UriCanonicalizer> = Arc::new(IdentityUriCanonicalizer);
        let filters: Arc<dyn FilterCompiler> = Arc::new(RegexFilterCompiler);
        let schema: Arc<dyn KytheSchema> = Arc::new(KytheSchemaImpl);
        let edges = Arc::new(EdgesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
        ));
        CrossReferencesEngine::new(lookup, uri, filters, schema, edges)
    }

    #[tokio::test]
    async fn definition_anchor_is_grouped_and_bucketed() {
        let mut xrefs = HashMap::new();
        xrefs.insert(
            "T".to_string(),
            Ok(PagedCrossReferences {
                incomplete: false,
                groups: vec![CrossReferenceGroup {
                    kind: EDGE_DEFINES_BINDING.to_string(),
                    anchors: vec![anchor("A1", "T", EDGE_DEFINES_BINDING)],
                }],
                page_index: vec![],
            }),
        );
        let engine = make_engine(FakeLookup { xrefs });
        let reply = engine
            .cross_references(
                &Context::new(),
                CrossReferencesRequest {
                    tickets: vec!["T".to_string()],
                    page_size: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let crs = reply.cross_references.get("T").unwrap();
        assert_eq!(crs.definition.len(), 1);
        assert!(crs.declaration.is_empty());
    }

    #[tokio::test]
    async fn reference_kind_goes_to_reference_bucket() {
        let mut xrefs = HashMap::new();
        xrefs.insert(
            "T".to_string(),
            Ok(PagedCrossReferences {
                incomplete: false,
                groups: vec![CrossReferenceGroup {
                    kind: EDGE_REF.to_string(),
                    anchors: vec![anchor("A1", "T", EDGE_REF), anchor("A2", "T", EDGE_REF)],
                }],
                page_index: vec![],
            }),
        );
        let engine = make_engine(FakeLookup { xrefs });
        let reply = engine
            .cross_references(
                &Context::new(),
                CrossReferencesRequest {
                    tickets: vec!["T".to_string()],
                    page_size: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let crs = reply.cross_references.get("T").unwrap();
        assert_eq!(crs.reference.len(), 2);
    }

    #[tokio::test]
    async fn missing_ticket_is_skipped() {
        let engine = make_engine(FakeLookup { xrefs: HashMap::new() });
        let reply = engine
            .cross_references(
                &Context::new(),
                CrossReferencesRequest {
                    tickets: vec!["T".to_string()],
                    page_size: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(reply.cross_references.is_empty());
    }

    #[tokio::test]
    async fn overflow_page_fully_skipped_without_fetch() {
        let mut xrefs = HashMap::new();
        xrefs.insert(
            "T".to_string(),
            Ok(PagedCrossReferences {
                incomplete: false,
                groups: vec![],
                page_index: vec![CrossReferencePageIndex {
                    page_key: "p1".into(),
                    kind: EDGE_REF.to_string(),
                    anchor_count: 3,
                }],
            }),
        );
        let engine = make_engine(FakeLookup { xrefs });
        // skip (page_token index) already covers the whole overflow page, so
        // `cross_references_page` (unimplemented in this fake) is never called.
        let reply = engine
            .cross_references(
                &Context::new(),
                CrossReferencesRequest {
                    tickets: vec!["T".to_string()],
                    page_size: 1,
                    page_token: PageToken::simple(3).encode(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(reply.cross_references.is_empty());
    }
}
