//! Decorations Engine (C5, spec §4.5): file decorations retrieval,
//! dirty-buffer anchor patching, span filtering, and bounded transitive
//! target-definition resolution.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info_span, Instrument};
use xref_store::{Context, Lookup, Point, Ticket};

use crate::collab::filter::project_node;
use crate::collab::normalizer::LineIndexNormalizer;
use crate::collab::patcher::{AnchorPatcher, DiffPatcher, IdentityPatcher};
use crate::collab::schema::KytheSchema;
use crate::collab::uri::UriCanonicalizer;
use crate::collab::{
    in_span_bounds, FilterCompiler, LocationKind, RequestedLocation, SpanKind, TextNormalizer,
};
use crate::config::MAX_JUMPS;
use crate::cross_references::{
    CrossReferencesEngine, CrossReferencesRequest, DefinitionInclusion, Inclusion,
};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default)]
pub struct DecorationsRequest {
    pub location: RequestedLocation,
    pub dirty_buffer: Option<String>,
    pub source_text: bool,
    pub references: bool,
    pub filter: Vec<String>,
    pub span_kind: SpanKind,
    pub target_definitions: bool,
}

impl Default for RequestedLocation {
    fn default() -> Self {
        Self {
            ticket: String::new(),
            kind: LocationKind::File,
            start: None,
            end: None,
        }
    }
}

impl Default for SpanKind {
    fn default() -> Self {
        SpanKind::WithinSpan
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source_ticket: Ticket,
    pub target_ticket: Ticket,
    pub kind: String,
    pub anchor_start: Point,
    pub anchor_end: Point,
    pub target_definition: Option<Ticket>,
}

#[derive(Debug, Clone, Default)]
pub struct DecorationsReply {
    pub encoding: String,
    pub source_text: Option<String>,
    pub references: Vec<Reference>,
    pub nodes: Vec<xref_store::Node>,
    pub definition_locations: HashMap<Ticket, RequestedLocation>,
}

pub struct DecorationsEngine {
    lookup: Arc<dyn Lookup>,
    uri: Arc<dyn UriCanonicalizer>,
    filters: Arc<dyn FilterCompiler>,
    schema: Arc<dyn KytheSchema>,
    cross_references: Arc<CrossReferencesEngine>,
}

impl DecorationsEngine {
    pub fn new(
        lookup: Arc<dyn Lookup>,
        uri: Arc<dyn UriCanonicalizer>,
        filters: Arc<dyn FilterCompiler>,
        schema: Arc<dyn KytheSchema>,
        cross_references: Arc<CrossReferencesEngine>,
    ) -> Self {
        Self {
            lookup,
            uri,
            filters,
            schema,
            cross_references,
        }
    }

    pub async fn decorations(&self, ctx: &Context, req: DecorationsRequest) -> Result<DecorationsReply> {
        let span = info_span!("decorations", ticket = %req.location.ticket);
        self.decorations_inner(ctx, req).instrument(span).await
    }

    async fn decorations_inner(
        &self,
        ctx: &Context,
        req: DecorationsRequest,
    ) -> Result<DecorationsReply> {
        if req.location.ticket.trim().is_empty() {
            return Err(EngineError::invalid_argument("missing location"));
        }
        let ticket = self.uri.fix(&req.location.ticket)?;

        let decor = match self.lookup.file_decorations(ctx, &ticket).await {
            Ok(d) => d,
            Err(e) if e.is_no_such_key() => return Err(EngineError::decorations_not_found(&ticket)),
            Err(e) => return Err(EngineError::store(&ticket, e)),
        };

        let selected_text: &str = req
            .dirty_buffer
            .as_deref()
            .unwrap_or(decor.file.text.as_str());
        let normalizer = LineIndexNormalizer::new(selected_text);

        let (mut span_kind, location) = (req.span_kind, req.location.clone());
        let (lo, hi) = normalizer.resolve_location(&location)?;
        if matches!(location.kind, LocationKind::File) {
            span_kind = SpanKind::WithinSpan;
        }

        let mut reply = DecorationsReply {
            encoding: decor.file.encoding.clone(),
            ..Default::default()
        };

        if req.source_text {
            let text = if matches!(location.kind, LocationKind::File) {
                selected_text.to_string()
            } else {
                selected_text
                    .get(lo as usize..hi as usize)
                    .ok_or_else(|| EngineError::invalid_argument("span does not fall on a character boundary"))?
                    .to_string()
            };
            reply.source_text = Some(text);
        }

        if req.references {
            let patcher: Box<dyn AnchorPatcher> = match req.dirty_buffer.as_deref() {
                Some(dirty) => Box::new(DiffPatcher::new(&decor.file.text, dirty)),
                None => Box::new(IdentityPatcher),
            };
            let patterns = self.filters.compile(&req.filter)?;

            let mut node_targets: HashMap<Ticket, Ticket> = HashMap::new();
            let mut seen_targets: std::collections::HashSet<Ticket> = std::collections::HashSet::new();

            for decoration in &decor.decorations {
                let (patched_start, patched_end, exists) =
                    patcher.patch(decoration.anchor.start_offset, decoration.anchor.end_offset);
                if !exists {
                    continue;
                }
                if !in_span_bounds(span_kind, patched_start, patched_end, lo, hi) {
                    continue;
                }
                reply.references.push(Reference {
                    source_ticket: decoration.anchor.ticket.clone(),
                    target_ticket: decoration.target.ticket.clone(),
                    kind: decoration.kind.clone(),
                    anchor_start: normalizer.byte_offset(patched_start),
                    anchor_end: normalizer.byte_offset(patched_end),
                    target_definition: None,
                });
                if seen_targets.insert(decoration.target.ticket.clone()) {
                    if let Some(projected) = project_node(&decoration.target, &patterns) {
                        reply.nodes.push(projected);
                    }
                }
                node_targets
                    .entry(decoration.target.ticket.clone())
                    .or_insert_with(|| decoration.anchor.ticket.clone());
            }

            if req.target_definitions {
                self.resolve_target_definitions(ctx, node_targets, &mut reply)
                    .await?;
            }
        }

        Ok(reply)
    }

    /// Spec §4.5 step 7: at most `MAX_JUMPS` rounds of an internal
    /// CrossReferences call, chasing the mirror of `callableAs` when a
    /// target isn't itself singly-defined.
    async fn resolve_target_definitions(
        &self,
        ctx: &Context,
        mut node_targets: HashMap<Ticket, Ticket>,
        reply: &mut DecorationsReply,
    ) -> Result<()> {
        for _ in 0..MAX_JUMPS {
            if node_targets.is_empty() {
                break;
            }
            let keys: Vec<String> = node_targets.keys().cloned().collect();
            let xrefs = self
                .cross_references
                .cross_references(
                    ctx,
                    CrossReferencesRequest {
                        tickets: keys,
                        definition_kind: DefinitionInclusion::BindingOnly,
                        declaration_kind: Inclusion::None,
                        reference_kind: Inclusion::None,
                        documentation_kind: Inclusion::None,
                        filter: vec![self.schema.node_kind_fact_name().to_string()],
                        anchor_text: false,
                        page_size: 0,
                        page_token: String::new(),
                    },
                )
                .await?;

            let mut next_round: HashMap<Ticket, Ticket> = HashMap::new();

            for (target_ticket, ref_source) in &node_targets {
                let Some(crs) = xrefs.cross_references.get(target_ticket) else {
                    continue;
                };
                let singly_defined = crs
                    .definition
                    .iter()
                    .filter(|a| &a.ticket != ref_source)
                    .collect::<Vec<_>>();
                if singly_defined.len() == 1 {
                    let def = singly_defined[0];
                    let loc = RequestedLocation {
                        ticket: def.ticket.clone(),
                        kind: LocationKind::File,
                        start: None,
                        end: None,
                    };
                    for reference in reply.references.iter_mut() {
                        if &reference.target_ticket == target_ticket {
                            reference.target_definition = Some(def.ticket.clone());
                        }
                    }
                    reply
                        .definition_locations
                        .insert(def.ticket.clone(), loc);
                    continue;
                }

                let mirror = self.schema.mirror_edge(crate::collab::schema::EDGE_CALLABLE_AS);
                let related: Vec<_> = crs
                    .related_node
                    .iter()
                    .filter(|r| r.relation_kind == mirror)
                    .collect();
                if related.len() == 1 {
                    next_round.insert(related[0].ticket.clone(), ref_source.clone());
                }
            }

            node_targets = next_round;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::schema::{KytheSchemaImpl, EDGE_DEFINES_BINDING};
    use crate::collab::uri::IdentityUriCanonicalizer;
    use crate::collab::RegexFilterCompiler;
    use crate::edges::EdgesEngine;
    use futures::stream::{self, BoxStream};
    use xref_store::{Anchor, Decoration, ExpandedAnchor, File, Point as StorePoint, Span};

    struct FakeLookup {
        decor: HashMap<Ticket, xref_store::Result<FileDecorations>>,
        xrefs: HashMap<Ticket, xref_store::Result<xref_store::PagedCrossReferences>>,
    }

    #[async_trait::async_trait]
    impl Lookup for FakeLookup {
        async fn paged_edge_sets<'a>(
            &'a self,
            _ctx: &'a Context,
            _tickets: Vec<Ticket>,
        ) -> BoxStream<'a, (Ticket, xref_store::Result<xref_store::PagedEdgeSet>)> {
            stream::iter(Vec::new()).boxed()
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
            ticket: &Ticket,
        ) -> xref_store::Result<FileDecorations> {
            self.decor
                .get(ticket)
                .cloned()
                .unwrap_or_else(|| Err(xref_store::StoreError::no_such_key(ticket)))
        }

        async fn cross_references(
            &self,
            _ctx: &Context,
            ticket: &Ticket,
        ) -> xref_store::Result<xref_store::PagedCrossReferences> {
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

    fn engine(lookup: FakeLookup) -> DecorationsEngine {
        let lookup: Arc<dyn Lookup> = Arc::new(lookup);
        let uri: Arc<dyn crate::collab::UriCanonicalizer> = Arc::new(IdentityUriCanonicalizer);
        let filters: Arc<dyn FilterCompiler> = Arc::new(RegexFilterCompiler);
        let schema: Arc<dyn KytheSchema> = Arc::new(KytheSchemaImpl);
        let edges = Arc::new(EdgesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
        ));
        let cross_references = Arc::new(CrossReferencesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
            Arc::clone(&schema),
            edges,
        ));
        DecorationsEngine::new(lookup, uri, filters, schema, cross_references)
    }

    fn decor_with(text: &str, decorations: Vec<Decoration>) -> FileDecorations {
        FileDecorations {
            file: File {
                text: text.to_string(),
                encoding: "UTF-8".to_string(),
            },
            decorations,
        }
    }

    #[tokio::test]
    async fn basic_retrieval_returns_source_text_and_references() {
        let decor = decor_with(
            "abc def",
            vec![Decoration {
                anchor: Anchor {
                    ticket: "T".to_string(),
                    start_offset: 4,
                    end_offset: 7,
                },
                target: Node::new("T2"),
                kind: "/kythe/edge/ref".to_string(),
            }],
        );
        let eng = engine(FakeLookup {
            decor: HashMap::from([("T".to_string(), Ok(decor))]),
            xrefs: HashMap::new(),
        });
        let reply = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    location: RequestedLocation {
                        ticket: "T".to_string(),
                        kind: LocationKind::File,
                        start: None,
                        end: None,
                    },
                    source_text: true,
                    references: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.source_text.as_deref(), Some("abc def"));
        assert_eq!(reply.references.len(), 1);
        assert_eq!(reply.references[0].target_ticket, "T2");
        assert_eq!(reply.references[0].anchor_start.byte_offset, 4);
        assert_eq!(reply.references[0].anchor_end.byte_offset, 7);
        assert!(reply.nodes.is_empty());
    }

    #[tokio::test]
    async fn dirty_buffer_shifts_anchor_past_an_insertion() {
        let decor = decor_with(
            "abc def",
            vec![Decoration {
                anchor: Anchor {
                    ticket: "T".to_string(),
                    start_offset: 4,
                    end_offset: 7,
                },
                target: Node::new("T2"),
                kind: "/kythe/edge/ref".to_string(),
            }],
        );
        let eng = engine(FakeLookup {
            decor: HashMap::from([("T".to_string(), Ok(decor))]),
            xrefs: HashMap::new(),
        });
        let reply = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    location: RequestedLocation {
                        ticket: "T".to_string(),
                        kind: LocationKind::File,
                        start: None,
                        end: None,
                    },
                    dirty_buffer: Some("ab_c def".to_string()),
                    references: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.references.len(), 1);
        assert_eq!(reply.references[0].anchor_start.byte_offset, 5);
        assert_eq!(reply.references[0].anchor_end.byte_offset, 8);
    }

    #[tokio::test]
    async fn span_kind_filters_out_of_bounds_references() {
        let decor = decor_with(
            "abc def ghi",
            vec![
                Decoration {
                    anchor: Anchor {
                        ticket: "T".to_string(),
                        start_offset: 4,
                        end_offset: 7,
                    },
                    target: Node::new("INSIDE"),
                    kind: "/kythe/edge/ref".to_string(),
                },
                Decoration {
                    anchor: Anchor {
                        ticket: "T".to_string(),
                        start_offset: 8,
                        end_offset: 11,
                    },
                    target: Node::new("OUTSIDE"),
                    kind: "/kythe/edge/ref".to_string(),
                },
            ],
        );
        let eng = engine(FakeLookup {
            decor: HashMap::from([("T".to_string(), Ok(decor))]),
            xrefs: HashMap::new(),
        });
        let reply = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    location: RequestedLocation {
                        ticket: "T".to_string(),
                        kind: LocationKind::Span,
                        start: Some(3),
                        end: Some(7),
                    },
                    references: true,
                    span_kind: SpanKind::WithinSpan,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.references.len(), 1);
        assert_eq!(reply.references[0].target_ticket, "INSIDE");
    }

    #[tokio::test]
    async fn node_projection_only_happens_with_filters() {
        let decor = decor_with(
            "abc",
            vec![Decoration {
                anchor: Anchor {
                    ticket: "T".to_string(),
                    start_offset: 0,
                    end_offset: 3,
                },
                target: Node::with_facts(
                    "T2",
                    vec![xref_store::Fact::new("/kythe/node/kind", b"function".to_vec())],
                ),
                kind: "/kythe/edge/ref".to_string(),
            }],
        );
        let eng = engine(FakeLookup {
            decor: HashMap::from([("T".to_string(), Ok(decor))]),
            xrefs: HashMap::new(),
        });
        let req = DecorationsRequest {
            location: RequestedLocation {
                ticket: "T".to_string(),
                kind: LocationKind::File,
                start: None,
                end: None,
            },
            references: true,
            ..Default::default()
        };
        let reply = eng.decorations(&Context::new(), req.clone()).await.unwrap();
        assert!(reply.nodes.is_empty());

        let reply = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    filter: vec!["/kythe/node/kind".to_string()],
                    ..req
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.nodes.len(), 1);
        assert_eq!(reply.nodes[0].ticket, "T2");
    }

    #[tokio::test]
    async fn missing_file_decorations_is_decorations_not_found() {
        let eng = engine(FakeLookup {
            decor: HashMap::new(),
            xrefs: HashMap::new(),
        });
        let err = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    location: RequestedLocation {
                        ticket: "T".to_string(),
                        kind: LocationKind::File,
                        start: None,
                        end: None,
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn target_definitions_resolves_when_singly_defined() {
        let decor = decor_with(
            "abc",
            vec![Decoration {
                anchor: Anchor {
                    ticket: "T".to_string(),
                    start_offset: 0,
                    end_offset: 3,
                },
                target: Node::new("T2"),
                kind: "/kythe/edge/ref".to_string(),
            }],
        );
        let point = StorePoint {
            byte_offset: 0,
            line_number: 1,
            column_offset: 0,
        };
        let span = Span {
            start: point,
            end: point,
        };
        let definition_anchor = ExpandedAnchor {
            ticket: "DEF_ANCHOR".to_string(),
            kind: EDGE_DEFINES_BINDING.to_string(),
            parent: "DEF_FILE".to_string(),
            text: None,
            span,
            snippet: String::new(),
            snippet_span: span,
        };
        let xrefs = xref_store::PagedCrossReferences {
            incomplete: false,
            groups: vec![xref_store::CrossReferenceGroup {
                kind: EDGE_DEFINES_BINDING.to_string(),
                anchors: vec![definition_anchor],
            }],
            page_index: vec![],
        };
        let eng = engine(FakeLookup {
            decor: HashMap::from([("T".to_string(), Ok(decor))]),
            xrefs: HashMap::from([("T2".to_string(), Ok(xrefs))]),
        });
        let reply = eng
            .decorations(
                &Context::new(),
                DecorationsRequest {
                    location: RequestedLocation {
                        ticket: "T".to_string(),
                        kind: LocationKind::File,
                        start: None,
                        end: None,
                    },
                    references: true,
                    target_definitions: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.references.len(), 1);
        assert_eq!(
            reply.references[0].target_definition.as_deref(),
            Some("DEF_ANCHOR")
        );
        assert!(reply.definition_locations.contains_key("DEF_ANCHOR"));
    }
}
