//! Case sections: typed spans of a case document.
//!
//! Sections are produced by document ingestion (outside this workspace) and are
//! read-only here, except for the embedding slot which the relevance engine
//! fills in and caches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ConceptId, OntologyError};

pub type SectionId = String;
pub type DocumentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    #[serde(alias = "Facts")]
    Facts,
    #[serde(alias = "Issues")]
    Issues,
    #[serde(alias = "Rules")]
    Rules,
    #[serde(alias = "Analysis")]
    Analysis,
    #[serde(alias = "Conclusion")]
    Conclusion,
}

impl SectionType {
    pub const ALL: [SectionType; 5] = [
        SectionType::Facts,
        SectionType::Issues,
        SectionType::Rules,
        SectionType::Analysis,
        SectionType::Conclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Facts => "facts",
            SectionType::Issues => "issues",
            SectionType::Rules => "rules",
            SectionType::Analysis => "analysis",
            SectionType::Conclusion => "conclusion",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionType {
    type Err = OntologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facts" | "fact" => Ok(SectionType::Facts),
            "issues" | "issue" | "questions" | "question" => Ok(SectionType::Issues),
            "rules" | "rule" | "references" | "code" => Ok(SectionType::Rules),
            "analysis" | "discussion" => Ok(SectionType::Analysis),
            "conclusion" | "conclusions" => Ok(SectionType::Conclusion),
            other => Err(OntologyError::Parse(format!("unknown section type: {other:?}"))),
        }
    }
}

/// The professional determination recorded by a Conclusion section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ethical,
    Unethical,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLabel {
    /// Principle the determination turned on, when the board named one.
    #[serde(default)]
    pub principle_id: Option<ConceptId>,
    pub verdict: Verdict,
}

impl OutcomeLabel {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            principle_id: None,
            verdict,
        }
    }

    pub fn on_principle(mut self, principle_id: impl Into<ConceptId>) -> Self {
        self.principle_id = Some(principle_id.into());
        self
    }

    /// Two determinations disagree when their verdicts differ about the same
    /// principle. A label that names no principle is treated as speaking to
    /// whichever principle the other label names.
    pub fn disagrees_with(&self, other: &OutcomeLabel) -> bool {
        if self.verdict == other.verdict {
            return false;
        }
        match (&self.principle_id, &other.principle_id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub document_id: DocumentId,
    pub section_type: SectionType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_label: Option<OutcomeLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_year: Option<i32>,
    /// Edition of the professional code the case was decided under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_version: Option<String>,
}

impl Section {
    pub fn new(
        id: impl Into<SectionId>,
        document_id: impl Into<DocumentId>,
        section_type: SectionType,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            section_type,
            text: text.into(),
            embedding: None,
            outcome_label: None,
            decided_year: None,
            standard_version: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_outcome(mut self, label: OutcomeLabel) -> Self {
        self.outcome_label = Some(label);
        self
    }

    pub fn decided(mut self, year: i32, standard_version: Option<&str>) -> Self {
        self.decided_year = Some(year);
        self.standard_version = standard_version.map(str::to_string);
        self
    }

    /// SHA-256 over the section type, text, and (when present) embedding.
    ///
    /// Editing the text or re-embedding changes the hash, which is what
    /// invalidates cached relevance scores that reference this section.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.section_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        if let Some(embedding) = &self.embedding {
            hasher.update([1u8]);
            for x in embedding {
                hasher.update(x.to_le_bytes());
            }
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}
