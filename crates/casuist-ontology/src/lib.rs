//! Casuist ontology: the data the relevance engine reads.
//!
//! - [`Section`]: a typed span of a case document (Facts, Issues, Rules,
//!   Analysis, Conclusion), supplied by document ingestion.
//! - [`Concept`]: an ontology entity (role, principle, obligation, precedent
//!   pattern, ...) belonging to a [`World`].
//! - [`ConceptGraph`]: the relationship graph of a world, stored as an
//!   explicit node/edge index so cycles need no shared ownership.
//! - [`OntologyService`] / [`CaseSections`]: the read-only service contracts,
//!   with in-memory implementations ([`WorldCatalog`], [`CaseLibrary`]).

pub mod cases;
pub mod concept;
pub mod fixture;
pub mod graph;
pub mod section;
pub mod world;

pub use cases::{CaseLibrary, CaseSections};
pub use concept::{Concept, ConceptCategory, ConceptId, Predicate, Relationship, WorldId};
pub use fixture::Fixture;
pub use graph::{ConceptGraph, NodeIx, Reach};
pub use section::{DocumentId, OutcomeLabel, Section, SectionId, SectionType, Verdict};
pub use world::{OntologyService, World, WorldCatalog, WorldSpec};

#[derive(Debug, thiserror::Error)]
pub enum OntologyError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Duplicate concept id: {0}")]
    DuplicateConcept(ConceptId),
    #[error("Unknown concept: {0}")]
    UnknownConcept(ConceptId),
    #[error("Unknown world: {0}")]
    UnknownWorld(WorldId),
}
