//! JSON fixtures: a bundle of worlds plus committed case sections.
//!
//! ```json
//! {
//!   "worlds": [{ "id": "engineering", "concepts": [ ... ] }],
//!   "sections": [{ "id": "c12-facts", "document_id": "c12", "section_type": "facts", "text": "..." }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CaseLibrary, OntologyError, Section, World, WorldCatalog, WorldSpec};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub worlds: Vec<WorldSpec>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Fixture {
    pub fn from_json_str(json: &str) -> Result<Self, OntologyError> {
        serde_json::from_str(json).map_err(|e| OntologyError::Parse(format!("fixture: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, OntologyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Split the fixture into the two read-only services it describes.
    pub fn into_services(self) -> Result<(WorldCatalog, CaseLibrary), OntologyError> {
        let catalog = WorldCatalog::new();
        for spec in self.worlds {
            catalog.insert_world(World::try_from(spec)?);
        }
        Ok((catalog, CaseLibrary::from_sections(self.sections)))
    }
}
