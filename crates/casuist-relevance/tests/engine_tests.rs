//! Engine-level behaviour: caching, invalidation, degradation, and errors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use casuist_ontology::{
    CaseLibrary, Concept, ConceptCategory, OntologyService, OutcomeLabel, Predicate, Relationship,
    Section, SectionType, Verdict, World, WorldCatalog,
};
use casuist_relevance::{
    CancelToken, EngineCaches, EngineConfig, LlmJudge, ProviderError, Providers, RelevanceEngine,
    RelevanceError, ResolutionHint, ScoringContext, TokenHashEmbedder,
};

fn embedded(concept: Concept) -> Concept {
    let e = TokenHashEmbedder::default();
    let v = e.embed_text(&concept.text());
    concept.with_embedding(v)
}

fn world() -> World {
    World::new(
        "engineering",
        "Engineering ethics",
        [
            embedded(
                Concept::new("public_safety", "", "Public safety", ConceptCategory::Principle)
                    .with_description("hold paramount the safety health and welfare of the public")
                    .with_priority(10),
            ),
            embedded(
                Concept::new("confidentiality", "", "Client confidentiality", ConceptCategory::Obligation)
                    .with_description("keep client information confidential")
                    .with_priority(5)
                    .relate(Predicate::ConflictsWith, "public_safety"),
            ),
            embedded(
                Concept::new("engineer", "", "Engineer", ConceptCategory::Role)
                    .with_description("licensed professional engineer")
                    .relate(Predicate::Requires, "confidentiality"),
            ),
            Concept::new("whistleblowing", "", "Whistleblowing", ConceptCategory::Action)
                .with_description("report a hazard to the authorities"),
        ],
    )
    .unwrap()
}

fn sections() -> Vec<Section> {
    vec![
        Section::new("c1-facts", "c1", SectionType::Facts, "Engineer A found a structural defect in a bridge and told the client."),
        Section::new("c1-concl", "c1", SectionType::Conclusion, "Engineer A was obligated to report the bridge defect to public authorities.")
            .with_outcome(OutcomeLabel::new(Verdict::Unethical).on_principle("public_safety")),
        Section::new("c2-facts", "c2", SectionType::Facts, "Engineer B found a structural defect in a bridge and told the client."),
        Section::new("c2-concl", "c2", SectionType::Conclusion, "Engineer B was obligated to report the bridge defect to public authorities.")
            .with_outcome(OutcomeLabel::new(Verdict::Ethical).on_principle("public_safety")),
    ]
}

fn setup(providers: Providers, caches: EngineCaches) -> (RelevanceEngine, Arc<WorldCatalog>, Arc<CaseLibrary>) {
    let catalog = Arc::new(WorldCatalog::new());
    catalog.insert_world(world());
    let library = Arc::new(CaseLibrary::from_sections(sections()));
    let engine = RelevanceEngine::with_caches(
        EngineConfig::default(),
        catalog.clone(),
        library.clone(),
        providers,
        caches,
    )
    .unwrap();
    (engine, catalog, library)
}

#[test]
fn repeated_scores_come_from_the_cache() {
    let (engine, catalog, _) = setup(Providers::offline(), EngineCaches::new());
    let w = catalog.world("engineering").unwrap();
    let section = Section::new("q", "q", SectionType::Rules, "Engineers shall hold paramount public safety.");
    let concept = w.graph.get("public_safety").unwrap();

    let first = engine.score(&section, concept, ScoringContext::default()).unwrap();
    let second = engine.score(&section, concept, ScoringContext::default()).unwrap();
    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first.combined_score));
    let stats = engine.caches().scores.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[test]
fn injected_caches_are_shared_between_engines() {
    let caches = EngineCaches::new();
    let (a, catalog, _) = setup(Providers::offline(), caches.clone());
    let (b, _, _) = setup(Providers::offline(), caches.clone());
    let w = catalog.world("engineering").unwrap();
    let section = Section::new("q", "q", SectionType::Rules, "Keep client information confidential.");
    let concept = w.graph.get("confidentiality").unwrap();

    a.score(&section, concept, ScoringContext::default()).unwrap();
    b.score(&section, concept, ScoringContext::default()).unwrap();
    assert_eq!(caches.scores.stats().hits, 1);
    assert!(!caches.embeddings.is_empty());
}

#[test]
fn relationship_change_invalidates_structural_scores() {
    let (engine, catalog, _) = setup(Providers::offline(), EngineCaches::new());
    let section = Section::new("q", "q", SectionType::Analysis, "The engineer weighed duties to the client.");
    let known = vec!["public_safety".to_string()];

    let before = {
        let w = catalog.world("engineering").unwrap();
        engine
            .score(&section, w.graph.get("engineer").unwrap(), ScoringContext::new(&w.graph, &known))
            .unwrap()
    };

    // engineer -> public_safety directly: distance drops from 2 to 1.
    catalog
        .replace_relationships(
            "engineering",
            "engineer",
            vec![Relationship::new(Predicate::Requires, "public_safety")],
        )
        .unwrap();

    let after = {
        let w = catalog.world("engineering").unwrap();
        engine
            .score(&section, w.graph.get("engineer").unwrap(), ScoringContext::new(&w.graph, &known))
            .unwrap()
    };
    assert_eq!(engine.caches().scores.stats().hits, 0);
    assert!(after.structural_score.unwrap() > before.structural_score.unwrap());
}

#[test]
fn zero_prior_scores_but_is_not_admitted() {
    let catalog = Arc::new(WorldCatalog::new());
    catalog.insert_world(
        World::new(
            "empty-ish",
            "",
            [Concept::new("blank", "", "the of", ConceptCategory::Principle)],
        )
        .unwrap(),
    );
    let engine = RelevanceEngine::new(
        EngineConfig::default(),
        catalog,
        Arc::new(CaseLibrary::new()),
        Providers::offline(),
    )
    .unwrap();
    engine.structural().set_prior(SectionType::Rules, ConceptCategory::Principle, 0.0);

    // No tokens and no embedding, but a structural prior exists.
    let section = Section::new("s", "d", SectionType::Rules, "anything");
    let ranking = engine
        .score_concepts(&section, "empty-ish", &[], &CancelToken::new())
        .unwrap();
    assert_eq!(ranking.scores.len(), 1);
    assert!(ranking.admitted.is_empty());
}

#[test]
fn concept_batches_are_sorted_and_thresholded() {
    let (engine, _, library) = setup(Providers::offline(), EngineCaches::new());
    engine.index_corpus(&library.all(), Some("engineering")).unwrap();
    let section = Section::new(
        "rules",
        "c3",
        SectionType::Rules,
        "Engineers shall hold paramount the safety health and welfare of the public.",
    );
    let ranking = engine
        .score_concepts(&section, "engineering", &[], &CancelToken::new())
        .unwrap();
    assert_eq!(ranking.scores.len(), 4);
    assert!(ranking.threshold.value >= 0.65);
    for pair in ranking.scores.windows(2) {
        assert!(pair[0].combined_score >= pair[1].combined_score);
    }
    for s in &ranking.admitted {
        assert!(s.combined_score >= ranking.threshold.value);
    }
    assert_eq!(ranking.scores[0].concept_id, "public_safety");
}

#[test]
fn unknown_world_is_reported() {
    let (engine, _, _) = setup(Providers::offline(), EngineCaches::new());
    let err = engine.validate("Anything.", "medicine").unwrap_err();
    assert!(matches!(err, RelevanceError::UnknownWorld { world_id } if world_id == "medicine"));

    let section = Section::new("s", "d", SectionType::Rules, "x");
    let err = engine
        .score_concepts(&section, "medicine", &[], &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, RelevanceError::UnknownWorld { .. }));
}

/// Times out on its first `failures` calls, then answers 0.9.
struct FlakyJudge {
    calls: AtomicUsize,
    failures: usize,
}

impl LlmJudge for FlakyJudge {
    fn judge_relevance(&self, _: &str, _: &str) -> Result<f64, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(ProviderError::Timeout(30_000))
        } else {
            Ok(0.9)
        }
    }
}

#[test]
fn judge_timeouts_degrade_to_three_metrics() {
    let judge = Arc::new(FlakyJudge {
        calls: AtomicUsize::new(0),
        failures: 1,
    });
    let (engine, catalog, _) = setup(
        Providers::offline().with_judge(judge.clone()),
        EngineCaches::new(),
    );
    let w = catalog.world("engineering").unwrap();
    let section = Section::new("q", "q", SectionType::Rules, "Engineers shall hold paramount public safety.");
    let concept = w.graph.get("public_safety").unwrap();
    let score = engine
        .score(&section, concept, ScoringContext::default())
        .unwrap();
    assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    assert_eq!(score.llm_score, None);
    assert_eq!(score.weights_used.llm, 0.0);
    assert!((score.weights_used.sum() - 1.0).abs() < 1e-12);

    // The degraded score was not cached: the judge is asked again and recovers.
    let recovered = engine
        .score(&section, concept, ScoringContext::default())
        .unwrap();
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
    assert_eq!(recovered.llm_score, Some(0.9));
    assert!(recovered.weights_used.llm > 0.0);

    // A complete score is cached.
    let cached = engine
        .score(&section, concept, ScoringContext::default())
        .unwrap();
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
    assert_eq!(cached, recovered);
}

#[test]
fn retrieval_feeds_contradiction_detection() {
    let mut config = EngineConfig::default();
    config.threshold.base_floors.conclusion = 0.0;
    config.contradiction.similarity_floor = 0.5;
    let catalog = Arc::new(WorldCatalog::new());
    catalog.insert_world(world());
    let library = Arc::new(CaseLibrary::from_sections(sections()));
    let engine = RelevanceEngine::new(config, catalog, library.clone(), Providers::offline()).unwrap();

    let query = Section::new(
        "q-concl",
        "q",
        SectionType::Conclusion,
        "Engineer C was obligated to report the bridge defect to public authorities.",
    );
    let pool = library.of_type(SectionType::Conclusion);
    let matches = engine.retrieve(&query, &pool, 5).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].rank, 1);

    let records = engine.find_contradictions(&matches);
    assert_eq!(records.len(), 1);
    // Both Facts sections are near-identical: no distinguishing facts.
    assert_eq!(records[0].resolution_hint, ResolutionHint::Unresolved);
}
