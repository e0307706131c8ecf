//! ConceptGraph: explicit node/edge index over a world's concepts.
//!
//! Relationship graphs routinely contain cycles (obligations that reinforce
//! each other, principles that conflict both ways), so concepts live in a flat
//! `Vec` and edges refer to them by `u32` index. No node owns another.
//!
//! Every node carries a generation counter. Replacing a concept's
//! relationships bumps the generation of that concept and of every concept on
//! the other end of an added or removed edge; cached structural scores compare
//! generations to detect staleness.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Concept, ConceptCategory, ConceptId, OntologyError, Predicate, Relationship};

pub type NodeIx = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    predicate: Predicate,
    to: NodeIx,
}

/// A concept reached from some start concept during traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reach<'g> {
    pub concept: &'g Concept,
    pub depth: usize,
    /// Whether the shortest path that reached this concept crossed a
    /// `conflicts_with` / `overrides` edge.
    pub via_tension: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    nodes: Vec<Concept>,
    index: HashMap<ConceptId, NodeIx>,
    outgoing: Vec<Vec<Edge>>,
    incoming: Vec<Vec<Edge>>,
    generations: Vec<u64>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from concepts. Relationship targets that are not part of
    /// the graph are kept on the concept but produce no edge.
    pub fn from_concepts(
        concepts: impl IntoIterator<Item = Concept>,
    ) -> Result<Self, OntologyError> {
        let mut graph = ConceptGraph::new();
        for concept in concepts {
            if graph.index.contains_key(&concept.id) {
                return Err(OntologyError::DuplicateConcept(concept.id));
            }
            let ix = graph.nodes.len() as NodeIx;
            graph.index.insert(concept.id.clone(), ix);
            graph.nodes.push(concept);
            graph.outgoing.push(Vec::new());
            graph.incoming.push(Vec::new());
            graph.generations.push(0);
        }
        for ix in 0..graph.nodes.len() {
            let rels = graph.nodes[ix].relationships.clone();
            graph.link(ix as NodeIx, &rels);
        }
        Ok(graph)
    }

    fn link(&mut self, from: NodeIx, relationships: &[Relationship]) {
        for rel in relationships {
            let Some(&to) = self.index.get(&rel.target) else {
                tracing::warn!(
                    from = %self.nodes[from as usize].id,
                    target = %rel.target,
                    "relationship target not in graph; edge skipped"
                );
                continue;
            };
            self.outgoing[from as usize].push(Edge {
                predicate: rel.predicate.clone(),
                to,
            });
            self.incoming[to as usize].push(Edge {
                predicate: rel.predicate.clone(),
                to: from,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ix(&self, id: &str) -> Option<NodeIx> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.ix(id).map(|ix| &self.nodes[ix as usize])
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.nodes.iter()
    }

    pub fn by_category(&self, category: ConceptCategory) -> Vec<&Concept> {
        self.nodes.iter().filter(|c| c.category == category).collect()
    }

    pub fn generation(&self, id: &str) -> Option<u64> {
        self.ix(id).map(|ix| self.generations[ix as usize])
    }

    /// Sum of all node generations; changes whenever any relationship does.
    pub fn revision(&self) -> u64 {
        self.generations.iter().sum()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    /// Outgoing `(predicate, target)` pairs that resolved to graph nodes.
    pub fn outgoing(&self, id: &str) -> Vec<(&Predicate, &Concept)> {
        let Some(ix) = self.ix(id) else {
            return Vec::new();
        };
        self.outgoing[ix as usize]
            .iter()
            .map(|e| (&e.predicate, &self.nodes[e.to as usize]))
            .collect()
    }

    /// Replace a concept's outgoing relationships.
    ///
    /// Bumps the generation of the concept and of every concept whose incident
    /// edge set changed as a result.
    pub fn replace_relationships(
        &mut self,
        id: &str,
        relationships: Vec<Relationship>,
    ) -> Result<(), OntologyError> {
        let ix = self
            .ix(id)
            .ok_or_else(|| OntologyError::UnknownConcept(id.to_string()))?;

        let mut touched: HashSet<NodeIx> = HashSet::new();
        touched.insert(ix);

        let old = std::mem::take(&mut self.outgoing[ix as usize]);
        for edge in &old {
            touched.insert(edge.to);
            self.incoming[edge.to as usize].retain(|e| !(e.to == ix && e.predicate == edge.predicate));
        }

        self.nodes[ix as usize].relationships = relationships.clone();
        self.link(ix, &relationships);
        for edge in &self.outgoing[ix as usize] {
            touched.insert(edge.to);
        }

        for t in touched {
            self.generations[t as usize] += 1;
        }
        Ok(())
    }

    fn undirected_neighbors(&self, ix: NodeIx) -> impl Iterator<Item = &Edge> {
        self.outgoing[ix as usize]
            .iter()
            .chain(self.incoming[ix as usize].iter())
    }

    /// Hop count of the shortest undirected path between two concepts.
    pub fn shortest_distance(&self, a: &str, b: &str) -> Option<usize> {
        let target = self.ix(b)?;
        self.min_distance_to_ixs(a, &HashSet::from([target]))
    }

    /// Hop count from `a` to the nearest concept in `targets`.
    ///
    /// Ids that are not in the graph are ignored; returns `None` when none of
    /// the targets is reachable.
    pub fn min_distance_to_any<'a>(
        &self,
        a: &str,
        targets: impl IntoIterator<Item = &'a str>,
    ) -> Option<usize> {
        let targets: HashSet<NodeIx> = targets.into_iter().filter_map(|t| self.ix(t)).collect();
        if targets.is_empty() {
            return None;
        }
        self.min_distance_to_ixs(a, &targets)
    }

    fn min_distance_to_ixs(&self, a: &str, targets: &HashSet<NodeIx>) -> Option<usize> {
        let start = self.ix(a)?;
        if targets.contains(&start) {
            return Some(0);
        }
        let mut seen = vec![false; self.nodes.len()];
        seen[start as usize] = true;
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((ix, depth)) = queue.pop_front() {
            for edge in self.undirected_neighbors(ix) {
                if seen[edge.to as usize] {
                    continue;
                }
                if targets.contains(&edge.to) {
                    return Some(depth + 1);
                }
                seen[edge.to as usize] = true;
                queue.push_back((edge.to, depth + 1));
            }
        }
        None
    }

    /// Breadth-first traversal (edges in either direction) up to `max_depth`
    /// hops. Each reachable concept is reported once per tension state, at its
    /// minimal depth; the start concept itself is excluded.
    pub fn reachable(&self, start: &str, max_depth: usize) -> Vec<Reach<'_>> {
        let Some(start_ix) = self.ix(start) else {
            return Vec::new();
        };
        // State = (node, crossed tension edge yet?).
        let mut seen = vec![[false; 2]; self.nodes.len()];
        seen[start_ix as usize][0] = true;
        let mut queue = VecDeque::from([(start_ix, false, 0usize)]);
        let mut out = Vec::new();

        while let Some((ix, tension, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.undirected_neighbors(ix) {
                let next_tension = tension || edge.predicate.is_tension();
                let slot = &mut seen[edge.to as usize][next_tension as usize];
                if *slot {
                    continue;
                }
                *slot = true;
                if edge.to != start_ix {
                    out.push(Reach {
                        concept: &self.nodes[edge.to as usize],
                        depth: depth + 1,
                        via_tension: next_tension,
                    });
                }
                queue.push_back((edge.to, next_tension, depth + 1));
            }
        }
        out
    }

    /// Concepts reachable from `start` through at least one tension edge.
    pub fn reachable_in_tension(&self, start: &str, max_depth: usize) -> Vec<Reach<'_>> {
        self.reachable(start, max_depth)
            .into_iter()
            .filter(|r| r.via_tension)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, category: ConceptCategory) -> Concept {
        Concept::new(id, "eng", id, category)
    }

    fn cyclic() -> ConceptGraph {
        ConceptGraph::from_concepts([
            concept("a", ConceptCategory::Obligation).relate(Predicate::Supports, "b"),
            concept("b", ConceptCategory::Obligation).relate(Predicate::Supports, "c"),
            concept("c", ConceptCategory::Obligation).relate(Predicate::Supports, "a"),
            concept("d", ConceptCategory::Principle).relate(Predicate::Overrides, "c"),
            concept("island", ConceptCategory::Role),
        ])
        .expect("graph")
    }

    #[test]
    fn distances_survive_cycles() {
        let g = cyclic();
        assert_eq!(g.shortest_distance("a", "a"), Some(0));
        assert_eq!(g.shortest_distance("a", "b"), Some(1));
        assert_eq!(g.shortest_distance("a", "c"), Some(1));
        assert_eq!(g.shortest_distance("a", "d"), Some(2));
        assert_eq!(g.shortest_distance("a", "island"), None);
        assert_eq!(g.shortest_distance("a", "missing"), None);
    }

    #[test]
    fn min_distance_picks_nearest_target() {
        let g = cyclic();
        assert_eq!(g.min_distance_to_any("d", ["a", "c"]), Some(1));
        assert_eq!(g.min_distance_to_any("d", ["island"]), None);
        assert_eq!(g.min_distance_to_any("d", ["nope"]), None);
    }

    #[test]
    fn tension_reach_tracks_overrides_edges() {
        let g = cyclic();
        let reach = g.reachable_in_tension("c", 3);
        let ids: Vec<&str> = reach.iter().map(|r| r.concept.id.as_str()).collect();
        assert!(ids.contains(&"d"));
        let d = reach.iter().find(|r| r.concept.id == "d").unwrap();
        assert_eq!(d.depth, 1);

        let plain = g.reachable("a", 1);
        assert!(plain.iter().all(|r| !r.via_tension));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = ConceptGraph::from_concepts([
            concept("a", ConceptCategory::Role),
            concept("a", ConceptCategory::Role),
        ])
        .unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateConcept(id) if id == "a"));
    }

    #[test]
    fn replacing_relationships_bumps_generations_on_both_ends() {
        let mut g = cyclic();
        let before_a = g.generation("a").unwrap();
        let before_b = g.generation("b").unwrap();
        let before_d = g.generation("d").unwrap();
        let before_island = g.generation("island").unwrap();

        g.replace_relationships("a", vec![Relationship::new(Predicate::RelatedTo, "island")])
            .unwrap();

        assert_eq!(g.generation("a"), Some(before_a + 1));
        assert_eq!(g.generation("b"), Some(before_b + 1));
        assert_eq!(g.generation("island"), Some(before_island + 1));
        assert_eq!(g.generation("d"), Some(before_d));
        assert_eq!(g.shortest_distance("a", "island"), Some(1));
        assert_eq!(g.shortest_distance("a", "b"), Some(2));
    }
}
