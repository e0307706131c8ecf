//! Ontology concepts and their typed relationships.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::OntologyError;

pub type ConceptId = String;
pub type WorldId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptCategory {
    Role,
    Principle,
    Obligation,
    State,
    Action,
    Event,
    Capability,
    Constraint,
    PrecedentPattern,
}

impl ConceptCategory {
    pub const ALL: [ConceptCategory; 9] = [
        ConceptCategory::Role,
        ConceptCategory::Principle,
        ConceptCategory::Obligation,
        ConceptCategory::State,
        ConceptCategory::Action,
        ConceptCategory::Event,
        ConceptCategory::Capability,
        ConceptCategory::Constraint,
        ConceptCategory::PrecedentPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptCategory::Role => "role",
            ConceptCategory::Principle => "principle",
            ConceptCategory::Obligation => "obligation",
            ConceptCategory::State => "state",
            ConceptCategory::Action => "action",
            ConceptCategory::Event => "event",
            ConceptCategory::Capability => "capability",
            ConceptCategory::Constraint => "constraint",
            ConceptCategory::PrecedentPattern => "precedent_pattern",
        }
    }

    /// Normative categories carry a priority that decides collisions.
    pub fn is_normative(&self) -> bool {
        matches!(self, ConceptCategory::Principle | ConceptCategory::Obligation)
    }
}

impl fmt::Display for ConceptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConceptCategory {
    type Err = OntologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ConceptCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == norm)
            .ok_or_else(|| OntologyError::Parse(format!("unknown concept category: {s:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Requires,
    Supports,
    ConflictsWith,
    Overrides,
    SubclassOf,
    RelatedTo,
    Other(String),
}

impl Predicate {
    /// Edges that put two normative concepts at odds with each other.
    pub fn is_tension(&self) -> bool {
        matches!(self, Predicate::ConflictsWith | Predicate::Overrides)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub predicate: Predicate,
    pub target: ConceptId,
}

impl Relationship {
    pub fn new(predicate: Predicate, target: impl Into<ConceptId>) -> Self {
        Self {
            predicate,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    /// Filled from the owning world when left empty.
    #[serde(default)]
    pub world_id: WorldId,
    pub label: String,
    pub category: ConceptCategory,
    #[serde(default)]
    pub description: String,
    /// Higher priority wins when normative concepts collide.
    #[serde(default)]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Concept {
    pub fn new(
        id: impl Into<ConceptId>,
        world_id: impl Into<WorldId>,
        label: impl Into<String>,
        category: ConceptCategory,
    ) -> Self {
        Self {
            id: id.into(),
            world_id: world_id.into(),
            label: label.into(),
            category,
            description: String::new(),
            priority: 0,
            embedding: None,
            relationships: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn relate(mut self, predicate: Predicate, target: impl Into<ConceptId>) -> Self {
        self.relationships.push(Relationship::new(predicate, target));
        self
    }

    /// Label and description joined; the text side of term-overlap scoring.
    pub fn text(&self) -> String {
        if self.description.trim().is_empty() {
            self.label.clone()
        } else {
            format!("{} {}", self.label, self.description)
        }
    }

    /// Hash of everything about the concept that feeds a relevance score
    /// except its relationships (those are versioned by the graph).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.label.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.category.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.description.as_bytes());
        if let Some(embedding) = &self.embedding {
            hasher.update([1u8]);
            for x in embedding {
                hasher.update(x.to_le_bytes());
            }
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_accepts_loose_spellings() {
        assert_eq!(
            "Precedent Pattern".parse::<ConceptCategory>().unwrap(),
            ConceptCategory::PrecedentPattern
        );
        assert_eq!(
            "obligation".parse::<ConceptCategory>().unwrap(),
            ConceptCategory::Obligation
        );
        assert!("virtue".parse::<ConceptCategory>().is_err());
    }

    #[test]
    fn fingerprint_ignores_relationships_but_not_embedding() {
        let base = Concept::new("c1", "eng", "Public Safety", ConceptCategory::Principle);
        let related = base.clone().relate(Predicate::Overrides, "c2");
        assert_eq!(base.fingerprint(), related.fingerprint());

        let embedded = base.clone().with_embedding(vec![0.1, 0.2]);
        assert_ne!(base.fingerprint(), embedded.fingerprint());
    }

    #[test]
    fn predicate_serde_shape() {
        let json = serde_json::to_string(&Predicate::ConflictsWith).unwrap();
        assert_eq!(json, "\"conflicts_with\"");
        let other: Predicate = serde_json::from_str(r#"{"other":"mentors"}"#).unwrap();
        assert_eq!(other, Predicate::Other("mentors".to_string()));
    }
}
