//! Cross-reference serving engine (spec §1): the pagination kernel and the
//! four query engines (Edges, Nodes, Decorations, CrossReferences) layered
//! over `xref-store`'s `Lookup` port.

pub mod collab;
pub mod config;
pub mod cross_references;
pub mod decorations;
pub mod edges;
pub mod error;
pub mod nodes;
pub mod pagination;

pub use config::EngineConfig;
pub use cross_references::{
    CrossReferenceSetReply, CrossReferencesEngine, CrossReferencesReply, CrossReferencesRequest,
    DefinitionInclusion, Inclusion, RelatedNode,
};
pub use decorations::{DecorationsEngine, DecorationsReply, DecorationsRequest, Reference};
pub use edges::{EdgesEngine, EdgesReply, EdgesRequest, EdgeSetReply, KindsFilter};
pub use error::{EngineError, ErrorKind, Result};
pub use nodes::{NodesEngine, NodesReply, NodesRequest};

use std::sync::Arc;

use collab::{IdentityUriCanonicalizer, KytheSchemaImpl, RegexFilterCompiler};
use xref_store::Lookup;

/// Wires up the four engines over a shared `Lookup` with the reference
/// collaborator implementations (spec §6). The natural construction point
/// for a transport layer that just wants working defaults.
pub struct Engines {
    pub edges: Arc<EdgesEngine>,
    pub nodes: Arc<NodesEngine>,
    pub cross_references: Arc<CrossReferencesEngine>,
    pub decorations: Arc<DecorationsEngine>,
}

impl Engines {
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        let uri: Arc<dyn collab::UriCanonicalizer> = Arc::new(IdentityUriCanonicalizer);
        let filters: Arc<dyn collab::FilterCompiler> = Arc::new(RegexFilterCompiler);
        let schema: Arc<dyn collab::KytheSchema> = Arc::new(KytheSchemaImpl);

        let edges = Arc::new(EdgesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
        ));
        let nodes = Arc::new(NodesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
        ));
        let cross_references = Arc::new(CrossReferencesEngine::new(
            Arc::clone(&lookup),
            Arc::clone(&uri),
            Arc::clone(&filters),
            Arc::clone(&schema),
            Arc::clone(&edges),
        ));
        let decorations = Arc::new(DecorationsEngine::new(
            lookup,
            uri,
            Arc::clone(&filters),
            schema,
            Arc::clone(&cross_references),
        ));

        Self {
            edges,
            nodes,
            cross_references,
            decorations,
        }
    }
}
