//! Serving-corpus data model (spec §3)
//!
//! Every record here is written once by the offline pipeline and never mutated by
//! this crate. Ticket identity is a plain `String` — the corpus is URI-addressed and
//! always UTF-8, so there is no separate byte-string ticket type.

use serde::{Deserialize, Serialize};

/// Opaque URI-like identifier for a source node.
pub type Ticket = String;

/// A single `{name, value}` fact on a node. `value` is opaque bytes; most facts
/// carry UTF-8 text but the corpus does not guarantee it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub value: Vec<u8>,
}

impl Fact {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A node: a ticket plus its facts. Facts are sorted by name when returned to a
/// caller (I4) — this type does not enforce sortedness itself, since intermediate
/// nodes go through fact-filtering before the sort happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub ticket: Ticket,
    pub facts: Vec<Fact>,
}

impl Node {
    pub fn new(ticket: impl Into<Ticket>) -> Self {
        Self {
            ticket: ticket.into(),
            facts: Vec::new(),
        }
    }

    pub fn with_facts(ticket: impl Into<Ticket>, facts: Vec<Fact>) -> Self {
        Self {
            ticket: ticket.into(),
            facts,
        }
    }
}

/// An outgoing edge: target node plus its ordinal among same-kind edges from the
/// same source. Carries the target's own facts so a caller filtering by fact
/// pattern never needs a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: Node,
    pub ordinal: u32,
}

/// An ordered run of same-kind edges, inline in a `PagedEdgeSet` or the sole
/// payload of an `EdgePage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeGroup {
    pub kind: String,
    pub edges: Vec<Edge>,
}

/// Opaque key identifying a detachable overflow page (edge or cross-reference).
pub type PageKey = String;

/// One entry in a `PagedEdgeSet`'s page index: which kind and how many edges an
/// overflow page holds, without loading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIndex {
    pub page_key: PageKey,
    pub kind: String,
    pub edge_count: u32,
}

/// The full edge set for one source ticket: inline groups plus an index of
/// overflow pages. `total_edges == sum(inline edges) + sum(page_index.edge_count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedEdgeSet {
    pub source: Node,
    pub groups: Vec<EdgeGroup>,
    pub page_index: Vec<PageIndex>,
    pub total_edges: u32,
}

impl PagedEdgeSet {
    /// Checked invariant: `total_edges` matches the sum of inline + indexed counts.
    /// Exposed for tests and for defensive `debug_assert!`s at the call site.
    pub fn total_edges_consistent(&self) -> bool {
        let inline: u32 = self.groups.iter().map(|g| g.edges.len() as u32).sum();
        let paged: u32 = self.page_index.iter().map(|p| p.edge_count).sum();
        self.total_edges == inline + paged
    }
}

/// A single detachable overflow page: exactly one edge group of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePage {
    pub group: EdgeGroup,
}

/// File text plus the encoding it's stored in (UTF-8 assumed unless stated
/// otherwise by the corpus; kept as a field rather than hardcoded, since the
/// offline pipeline is free to record other encodings for legacy files).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub text: String,
    pub encoding: String,
}

/// A byte-span anchor inside a specific file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub ticket: Ticket,
    pub start_offset: u32,
    pub end_offset: u32,
}

/// A `(anchor, target, kind)` tuple rendering one piece of a code view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub anchor: Anchor,
    pub target: Node,
    pub kind: String,
}

/// Decorations for one file, in source order by start offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDecorations {
    pub file: File,
    pub decorations: Vec<Decoration>,
}

/// Byte offset / line / column — all three kept in sync by the `TextNormalizer`
/// collaborator; stored records may carry the byte offset alone, with line/column
/// resolved at serve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub byte_offset: u32,
    pub line_number: u32,
    pub column_offset: u32,
}

/// Start/end pair of `Point`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Point,
    pub end: Point,
}

/// An anchor expanded with classification, byte span, and optional snippet —
/// the unit a `CrossReferences` reply groups by definition/declaration/
/// reference/documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedAnchor {
    pub ticket: Ticket,
    pub kind: String,
    pub parent: Ticket,
    pub text: Option<String>,
    pub span: Span,
    pub snippet: String,
    pub snippet_span: Span,
}

/// One kind-tagged group of expanded anchors inline in a `PagedCrossReferences`
/// record, or the sole payload of an overflow page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReferenceGroup {
    pub kind: String,
    pub anchors: Vec<ExpandedAnchor>,
}

/// One entry in a `PagedCrossReferences`'s page index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReferencePageIndex {
    pub page_key: PageKey,
    pub kind: String,
    pub anchor_count: u32,
}

/// The full cross-reference set for one node ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedCrossReferences {
    pub incomplete: bool,
    pub groups: Vec<CrossReferenceGroup>,
    pub page_index: Vec<CrossReferencePageIndex>,
}

/// One detachable cross-reference overflow page: exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedCrossReferencesPage {
    pub group: CrossReferenceGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_new() {
        let f = Fact::new("/kythe/node/kind", b"function".to_vec());
        assert_eq!(f.name, "/kythe/node/kind");
        assert_eq!(f.value, b"function");
    }

    #[test]
    fn node_with_facts() {
        let n = Node::with_facts("kythe://foo", vec![Fact::new("a", b"1".to_vec())]);
        assert_eq!(n.ticket, "kythe://foo");
        assert_eq!(n.facts.len(), 1);
    }

    #[test]
    fn paged_edge_set_consistency() {
        let pes = PagedEdgeSet {
            source: Node::new("T"),
            groups: vec![EdgeGroup {
                kind: "ref".into(),
                edges: vec![
                    Edge {
                        target: Node::new("A"),
                        ordinal: 0,
                    },
                    Edge {
                        target: Node::new("B"),
                        ordinal: 1,
                    },
                ],
            }],
            page_index: vec![PageIndex {
                page_key: "p1".into(),
                kind: "ref".into(),
                edge_count: 3,
            }],
            total_edges: 5,
        };
        assert!(pes.total_edges_consistent());

        let mut broken = pes.clone();
        broken.total_edges = 4;
        assert!(!broken.total_edges_consistent());
    }

    #[test]
    fn serde_roundtrip_node() {
        let n = Node::with_facts("T", vec![Fact::new("k", b"v".to_vec())]);
        let json = serde_json::to_string(&n).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(n, back);
    }
}
