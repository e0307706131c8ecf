//! Integration tests for the complete Casuist pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Fixture → ontology services → engine
//! - Concept scoring → batch threshold
//! - Precedent retrieval → contradiction detection
//! - Generated reasoning → admissibility validation
//!
//! Run with: cargo test --test integration_tests

use std::path::PathBuf;
use std::sync::Arc;

use casuist_llm::chat::{ChatBackend, ChatJudge};
use casuist_llm::LlmError;
use casuist_ontology::{CaseLibrary, CaseSections, Fixture, Section, SectionType, WorldCatalog};
use casuist_relevance::{
    CancelToken, EmbeddingProvider, EngineConfig, Providers, RelevanceEngine, RelevanceError,
    ResolutionHint, TokenHashEmbedder,
};
use tempfile::tempdir;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/engineering_ethics.json")
}

fn load_fixture() -> Fixture {
    let mut fixture = Fixture::load(&fixture_path()).expect("fixture loads");
    let embedder = TokenHashEmbedder::default();
    for world in &mut fixture.worlds {
        for concept in &mut world.concepts {
            concept.embedding = Some(embedder.embed(&concept.text()).unwrap());
        }
    }
    fixture
}

fn engine_with(providers: Providers) -> (RelevanceEngine, Arc<CaseLibrary>) {
    let (catalog, library) = load_fixture().into_services().unwrap();
    let catalog: Arc<WorldCatalog> = Arc::new(catalog);
    let library = Arc::new(library);
    let engine = RelevanceEngine::new(EngineConfig::default(), catalog, library.clone(), providers)
        .unwrap();
    engine.index_corpus(&library.all(), Some("engineering")).unwrap();
    (engine, library)
}

// ============================================================================
// Fixtures
// ============================================================================

#[test]
fn test_fixture_round_trips_through_json() {
    let fixture = load_fixture();
    let dir = tempdir().unwrap();
    let path = dir.path().join("fixture.json");
    std::fs::write(&path, serde_json::to_string_pretty(&fixture).unwrap()).unwrap();

    let reloaded = Fixture::load(&path).unwrap();
    assert_eq!(reloaded.sections, fixture.sections);
    let (catalog, library) = reloaded.into_services().unwrap();
    assert_eq!(catalog.world_ids(), vec!["engineering".to_string()]);
    assert_eq!(library.len(), 7);
    assert!(library.facts_for("c90-5").is_some());
}

// ============================================================================
// Concept scoring
// ============================================================================

#[test]
fn test_rules_section_admits_public_safety() {
    let (engine, library) = engine_with(Providers::offline());
    let section = library.section("c11-1-rules").unwrap();
    let ranking = engine
        .score_concepts(&section, "engineering", &[], &CancelToken::new())
        .unwrap();

    assert_eq!(ranking.scores.len(), 7);
    assert!(ranking.skipped.is_empty());
    assert!(ranking.threshold.value >= 0.65);
    for s in &ranking.scores {
        assert!((0.0..=1.0).contains(&s.combined_score));
        assert!((s.weights_used.sum() - 1.0).abs() < 1e-9);
        assert_eq!(s.llm_score, None);
    }
    let threshold = engine.threshold(
        &ranking.scores.iter().map(|s| s.combined_score).collect::<Vec<_>>(),
        SectionType::Rules,
    );
    assert_eq!(threshold, ranking.threshold.value);
}

struct FixedJudge;

impl ChatBackend for FixedJudge {
    fn name(&self) -> &str {
        "fixed"
    }

    fn complete(&self, _: &str, _: &str, _: bool) -> Result<String, LlmError> {
        Ok("Relevance: {\"relevance\": 0.5}".to_string())
    }
}

#[test]
fn test_chat_judge_feeds_the_fourth_metric() {
    let providers = Providers::offline().with_judge(Arc::new(ChatJudge::new(FixedJudge)));
    let (engine, library) = engine_with(providers);
    let section = library.section("c76-4-facts").unwrap();
    let score = engine
        .score_in_world(&section, "engineering", "public_safety", &[])
        .unwrap();
    assert_eq!(score.llm_score, Some(0.5));
    assert!((score.weights_used.llm - 0.15).abs() < 1e-12);
}

// ============================================================================
// Retrieval and contradictions
// ============================================================================

#[test]
fn test_retrieval_then_contradictions() {
    let (engine, library) = engine_with(Providers::offline());
    let query = Section::new(
        "q-conclusion",
        "q",
        SectionType::Conclusion,
        "Engineer D was obligated to report the structural defects to the public authorities despite the client's request for confidentiality.",
    );
    let pool = library.of_type(SectionType::Conclusion);
    let matches = engine.retrieve(&query, &pool, 5).unwrap();
    assert!(matches.len() >= 2);
    for (i, m) in matches.iter().enumerate() {
        assert_eq!(m.rank, i + 1);
        assert_eq!(m.candidate_section_type, SectionType::Conclusion);
    }

    let records = engine.find_contradictions(&matches);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.query_section_id, "q-conclusion");
    // 1976 and 1990 editions of the code.
    assert_eq!(record.resolution_hint, ResolutionHint::Temporal);
    assert!(record.mutual_score >= engine.config().contradiction.similarity_floor);
}

#[test]
fn test_empty_pool_is_an_error() {
    let (engine, library) = engine_with(Providers::offline());
    let only = library.section("c11-1-rules").unwrap();
    let err = engine.retrieve(&only, &[only.clone()], 3).unwrap_err();
    assert!(matches!(err, RelevanceError::EmptyPool { query_section_id } if query_section_id == "c11-1-rules"));
}

// ============================================================================
// Admissibility
// ============================================================================

#[test]
fn test_confidentiality_over_safety_is_inadmissible() {
    let (engine, _) = engine_with(Providers::offline());
    let result = engine
        .validate(
            "Engineer A should keep the client information confidential.",
            "engineering",
        )
        .unwrap();
    assert!(!result.passed);
    assert_eq!(result.claims_checked, 1);
    assert!(result
        .conflicts
        .iter()
        .all(|c| c.conflicting_concept == "public_safety"));
}

#[test]
fn test_cancelled_validation_stops() {
    let (engine, _) = engine_with(Providers::offline());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = engine
        .validate_with_cancel("Engineers shall be honest.", "engineering", &cancel)
        .unwrap_err();
    assert!(matches!(err, RelevanceError::Cancelled));
}
