//! Kythe-style edge/fact schema (spec §4.3, §4.5, §4.6, §6): classifies
//! edge kinds into the reference/definition/declaration/documentation
//! families the CrossReferences engine groups by, and knows how to mirror
//! an edge kind to walk it in reverse.

pub const EDGE_REF: &str = "/kythe/edge/ref";
pub const EDGE_REF_CALL: &str = "/kythe/edge/ref/call";
pub const EDGE_DEFINES: &str = "/kythe/edge/defines";
pub const EDGE_DEFINES_BINDING: &str = "/kythe/edge/defines/binding";
pub const EDGE_DECLARES: &str = "/kythe/edge/declares";
pub const EDGE_DOCUMENTS: &str = "/kythe/edge/documents";
pub const EDGE_CALLABLE_AS: &str = "/kythe/edge/callableas";
pub const NODE_KIND_FACT: &str = "/kythe/node/kind";

/// Reverse-edge marker, matching Kythe's own convention of prefixing the
/// mirror of a forward edge kind with `%`.
const MIRROR_PREFIX: char = '%';

pub trait KytheSchema: Send + Sync {
    /// True for edge kinds whose source is always an anchor (ref, ref/call,
    /// defines, defines/binding, declares, documents) — the family the
    /// CrossReferences and Decorations engines walk from anchors.
    fn is_anchor_edge(&self, kind: &str) -> bool;

    /// `incomplete` is the owning cross-reference set's incomplete flag: a
    /// plain `defines` edge counts as a declaration when the set lacks a
    /// complete definition, and as a definition once it's complete.
    /// `defines/binding` is unconditionally a definition.
    fn is_def_kind(&self, kind: &str, incomplete: bool) -> bool;

    fn is_decl_kind(&self, kind: &str, incomplete: bool) -> bool;

    fn is_doc_kind(&self, kind: &str) -> bool;

    fn is_ref_kind(&self, kind: &str) -> bool;

    /// Collapses equivalent sub-kinds to their canonical spelling for
    /// grouping purposes. The reference schema treats every kind as already
    /// canonical.
    fn canonicalize(&self, kind: &str) -> String {
        kind.to_string()
    }

    /// The reverse direction of a schema-defined edge kind.
    fn mirror_edge(&self, kind: &str) -> String {
        match kind.strip_prefix(MIRROR_PREFIX) {
            Some(forward) => forward.to_string(),
            None => format!("{MIRROR_PREFIX}{kind}"),
        }
    }

    /// The fact name carrying a node's kind (used by target-definition
    /// resolution, spec §4.5 step 7).
    fn node_kind_fact_name(&self) -> &'static str {
        NODE_KIND_FACT
    }
}

pub struct KytheSchemaImpl;

impl KytheSchema for KytheSchemaImpl {
    fn is_anchor_edge(&self, kind: &str) -> bool {
        self.is_def_kind(kind, true)
            || self.is_def_kind(kind, false)
            || self.is_doc_kind(kind)
            || self.is_ref_kind(kind)
    }

    fn is_def_kind(&self, kind: &str, incomplete: bool) -> bool {
        kind == EDGE_DEFINES_BINDING || (kind == EDGE_DEFINES && !incomplete)
    }

    fn is_decl_kind(&self, kind: &str, incomplete: bool) -> bool {
        kind == EDGE_DECLARES || (kind == EDGE_DEFINES && incomplete)
    }

    fn is_doc_kind(&self, kind: &str) -> bool {
        kind == EDGE_DOCUMENTS
    }

    fn is_ref_kind(&self, kind: &str) -> bool {
        kind == EDGE_REF || kind == EDGE_REF_CALL
    }
}
