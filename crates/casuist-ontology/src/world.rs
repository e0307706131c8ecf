//! Worlds (ontology namespaces) and the read-only ontology service contract.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Concept, ConceptCategory, ConceptGraph, OntologyError, Relationship, WorldId};

#[derive(Debug, Clone)]
pub struct World {
    pub id: WorldId,
    pub label: String,
    pub graph: ConceptGraph,
}

impl World {
    pub fn new(
        id: impl Into<WorldId>,
        label: impl Into<String>,
        concepts: impl IntoIterator<Item = Concept>,
    ) -> Result<Self, OntologyError> {
        let id = id.into();
        let concepts: Vec<Concept> = concepts
            .into_iter()
            .map(|mut c| {
                if c.world_id.is_empty() {
                    c.world_id = id.clone();
                }
                c
            })
            .collect();
        if let Some(stray) = concepts.iter().find(|c| c.world_id != id) {
            return Err(OntologyError::Parse(format!(
                "concept {} belongs to world {} but was loaded into {}",
                stray.id, stray.world_id, id
            )));
        }
        Ok(Self {
            id,
            label: label.into(),
            graph: ConceptGraph::from_concepts(concepts)?,
        })
    }
}

/// Serialized form of a world (fixture files, authoring exports).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSpec {
    pub id: WorldId,
    #[serde(default)]
    pub label: String,
    pub concepts: Vec<Concept>,
}

impl TryFrom<WorldSpec> for World {
    type Error = OntologyError;

    fn try_from(spec: WorldSpec) -> Result<Self, Self::Error> {
        World::new(spec.id, spec.label, spec.concepts)
    }
}

/// Read-only view of the ontology/world service.
pub trait OntologyService: Send + Sync {
    fn world(&self, world_id: &str) -> Option<Arc<World>>;

    fn contains_world(&self, world_id: &str) -> bool {
        self.world(world_id).is_some()
    }

    fn concept(&self, world_id: &str, concept_id: &str) -> Option<Concept> {
        self.world(world_id)?.graph.get(concept_id).cloned()
    }

    fn concepts_by_category(&self, world_id: &str, category: ConceptCategory) -> Vec<Concept> {
        self.world(world_id)
            .map(|w| w.graph.by_category(category).into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory world registry.
///
/// Readers get cheap `Arc<World>` snapshots; authoring-side mutation swaps in
/// a modified copy so in-flight readers keep a consistent graph.
#[derive(Debug, Default)]
pub struct WorldCatalog {
    worlds: RwLock<HashMap<WorldId, Arc<World>>>,
}

impl WorldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_world(&self, world: World) {
        tracing::debug!(
            world = %world.id,
            concepts = world.graph.len(),
            edges = world.graph.edge_count(),
            "world loaded"
        );
        self.worlds.write().insert(world.id.clone(), Arc::new(world));
    }

    pub fn world_ids(&self) -> Vec<WorldId> {
        let mut ids: Vec<WorldId> = self.worlds.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn replace_relationships(
        &self,
        world_id: &str,
        concept_id: &str,
        relationships: Vec<Relationship>,
    ) -> Result<(), OntologyError> {
        let mut guard = self.worlds.write();
        let current = guard
            .get(world_id)
            .ok_or_else(|| OntologyError::UnknownWorld(world_id.to_string()))?;
        let mut next = World::clone(current);
        next.graph.replace_relationships(concept_id, relationships)?;
        guard.insert(world_id.to_string(), Arc::new(next));
        Ok(())
    }
}

impl OntologyService for WorldCatalog {
    fn world(&self, world_id: &str) -> Option<Arc<World>> {
        self.worlds.read().get(world_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Predicate;

    fn engineering() -> World {
        World::new(
            "engineering",
            "Engineering ethics",
            [
                Concept::new("safety", "", "Public Safety", ConceptCategory::Principle)
                    .with_priority(9),
                Concept::new("confidentiality", "", "Confidentiality", ConceptCategory::Obligation)
                    .with_priority(4),
            ],
        )
        .expect("world")
    }

    #[test]
    fn concepts_inherit_world_id() {
        let world = engineering();
        assert_eq!(world.graph.get("safety").unwrap().world_id, "engineering");
    }

    #[test]
    fn stray_world_ids_are_rejected() {
        let err = World::new(
            "engineering",
            "",
            [Concept::new("x", "medicine", "X", ConceptCategory::Role)],
        )
        .unwrap_err();
        assert!(matches!(err, OntologyError::Parse(_)));
    }

    #[test]
    fn catalog_swaps_world_on_relationship_change() {
        let catalog = WorldCatalog::new();
        catalog.insert_world(engineering());

        let before = catalog.world("engineering").unwrap();
        catalog
            .replace_relationships(
                "engineering",
                "safety",
                vec![Relationship::new(Predicate::Overrides, "confidentiality")],
            )
            .unwrap();
        let after = catalog.world("engineering").unwrap();

        assert_eq!(before.graph.edge_count(), 0);
        assert_eq!(after.graph.edge_count(), 1);
        assert!(after.graph.generation("confidentiality") > before.graph.generation("confidentiality"));
        assert!(catalog.contains_world("engineering"));
        assert!(!catalog.contains_world("medicine"));
        assert_eq!(
            catalog
                .concepts_by_category("engineering", ConceptCategory::Obligation)
                .len(),
            1
        );
    }
}
