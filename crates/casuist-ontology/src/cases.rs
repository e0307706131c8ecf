//! Read-only access to committed case sections (the document-ingestion side).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Section, SectionType};

pub trait CaseSections: Send + Sync {
    fn section(&self, section_id: &str) -> Option<Arc<Section>>;

    /// All sections of a document, in insertion order.
    fn sections_for(&self, document_id: &str) -> Vec<Arc<Section>>;

    fn facts_for(&self, document_id: &str) -> Option<Arc<Section>> {
        self.sections_for(document_id)
            .into_iter()
            .find(|s| s.section_type == SectionType::Facts)
    }
}

#[derive(Debug, Default)]
pub struct CaseLibrary {
    inner: RwLock<LibraryInner>,
}

#[derive(Debug, Default)]
struct LibraryInner {
    by_id: HashMap<String, Arc<Section>>,
    by_document: BTreeMap<String, Vec<String>>,
}

impl CaseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        let lib = Self::new();
        for s in sections {
            lib.insert(s);
        }
        lib
    }

    /// Insert or replace a section (re-ingestion after an edit).
    pub fn insert(&self, section: Section) {
        let mut inner = self.inner.write();
        let ids = inner.by_document.entry(section.document_id.clone()).or_default();
        if !ids.contains(&section.id) {
            ids.push(section.id.clone());
        }
        inner.by_id.insert(section.id.clone(), Arc::new(section));
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Arc<Section>> {
        let inner = self.inner.read();
        inner
            .by_document
            .values()
            .flatten()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn of_type(&self, section_type: SectionType) -> Vec<Arc<Section>> {
        self.all()
            .into_iter()
            .filter(|s| s.section_type == section_type)
            .collect()
    }
}

impl CaseSections for CaseLibrary {
    fn section(&self, section_id: &str) -> Option<Arc<Section>> {
        self.inner.read().by_id.get(section_id).cloned()
    }

    fn sections_for(&self, document_id: &str) -> Vec<Arc<Section>> {
        let inner = self.inner.read();
        inner
            .by_document
            .get(document_id)
            .map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}
