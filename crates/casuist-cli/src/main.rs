//! Casuist CLI
//!
//! Runs the relevance engine over a JSON fixture of worlds and committed case
//! sections:
//! - `concepts`: score a section against every concept of a world
//! - `score`: score a single (section, concept) pair
//! - `retrieve`: two-phase precedent retrieval
//! - `contradictions`: retrieval followed by outcome-conflict detection
//! - `validate`: admissibility check of generated reasoning text

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use casuist_ontology::{
    CaseLibrary, CaseSections, ConceptId, Fixture, OntologyError, Section, SectionType,
    WorldCatalog,
};
use casuist_relevance::{CancelToken, EmbeddingProvider, EngineConfig, RelevanceEngine};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod backends;
mod report;

const LOG_ENV: &str = "CASUIST_LOG";

#[derive(Parser)]
#[command(name = "casuist")]
#[command(
    author,
    version,
    about = "Casuist: relevance scoring and precedent reasoning for professional-ethics cases"
)]
struct Cli {
    /// Fixture with worlds and case sections (JSON).
    #[arg(long, short = 'f')]
    fixture: PathBuf,
    /// Engine config (JSON). Omitted fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print JSON instead of a readable report.
    #[arg(long, global = true)]
    json: bool,
    #[command(flatten)]
    backends: backends::BackendArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Id of a fixture section to use as the query.
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    section: Option<String>,
    /// Ad-hoc section text (requires `--section-type`).
    #[arg(long, requires = "section_type")]
    text: Option<String>,
    #[arg(long, value_parser = parse_section_type)]
    section_type: Option<SectionType>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a section against every concept in a world and apply the batch threshold.
    Concepts {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        world: String,
        /// Concepts already known to be relevant (comma-separated); feeds graph proximity.
        #[arg(long, value_delimiter = ',')]
        known: Vec<ConceptId>,
        /// Show every scored concept, not only the admitted ones.
        #[arg(long)]
        all: bool,
    },
    /// Score a section against one concept.
    Score {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        world: String,
        #[arg(long)]
        concept: ConceptId,
        #[arg(long, value_delimiter = ',')]
        known: Vec<ConceptId>,
    },
    /// Retrieve the top-k precedent sections of the query's type.
    Retrieve {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, short = 'k', default_value_t = 5)]
        k: usize,
        /// Also index this world's concept texts into the term statistics.
        #[arg(long)]
        world: Option<String>,
    },
    /// Retrieve precedents and report pairs with conflicting outcomes.
    Contradictions {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, short = 'k', default_value_t = 10)]
        k: usize,
        #[arg(long)]
        world: Option<String>,
    },
    /// Check generated reasoning against a world's normative priorities.
    ///
    /// Reads the text from `--text`, `--input`, or stdin.
    Validate {
        #[arg(long)]
        world: String,
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

impl Commands {
    fn world(&self) -> Option<&str> {
        match self {
            Commands::Concepts { world, .. }
            | Commands::Score { world, .. }
            | Commands::Validate { world, .. } => Some(world.as_str()),
            Commands::Retrieve { world, .. } | Commands::Contradictions { world, .. } => {
                world.as_deref()
            }
        }
    }
}

fn parse_section_type(s: &str) -> std::result::Result<SectionType, String> {
    s.parse().map_err(|e: OntologyError| e.to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env_overrides()?)
}

/// Concepts authored without a vector get one from the active embedder.
/// Failures leave the concept unembedded; it is still scored on the other metrics.
fn embed_concepts(fixture: &mut Fixture, embedder: &dyn EmbeddingProvider) {
    for world in &mut fixture.worlds {
        for concept in &mut world.concepts {
            if concept.embedding.is_some() {
                continue;
            }
            match embedder.embed(&concept.text()) {
                Ok(v) => concept.embedding = Some(v),
                Err(e) => {
                    tracing::warn!(concept = %concept.id, error = %e, "concept left without embedding")
                }
            }
        }
    }
}

fn resolve_query(query: &QueryArgs, library: &CaseLibrary) -> Result<Arc<Section>> {
    if let Some(id) = &query.section {
        return library
            .section(id)
            .ok_or_else(|| anyhow!("no section {id:?} in the fixture"));
    }
    let (Some(text), Some(section_type)) = (&query.text, query.section_type) else {
        return Err(anyhow!("pass --section, or --text with --section-type"));
    };
    Ok(Arc::new(Section::new("query", "query", section_type, text.as_str())))
}

fn read_reasoning(text: Option<String>, input: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = input {
        return fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read reasoning text from stdin")?;
    Ok(buf)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let providers = cli.backends.providers()?;

    let mut fixture = Fixture::load(&cli.fixture)
        .with_context(|| format!("failed to load fixture {}", cli.fixture.display()))?;
    if let Some(embedder) = &providers.embedder {
        embed_concepts(&mut fixture, embedder.as_ref());
    }
    let (catalog, library) = fixture.into_services()?;
    let catalog: Arc<WorldCatalog> = Arc::new(catalog);
    let library: Arc<CaseLibrary> = Arc::new(library);

    let engine = RelevanceEngine::new(config, catalog, library.clone(), providers)?;
    engine.index_corpus(&library.all(), cli.command.world())?;

    match cli.command {
        Commands::Concepts {
            query,
            world,
            known,
            all,
        } => {
            let section = resolve_query(&query, &library)?;
            let ranking = engine.score_concepts(&section, &world, &known, &CancelToken::new())?;
            if cli.json {
                print_json(&ranking)?;
            } else {
                report::concepts(&ranking, all);
            }
        }
        Commands::Score {
            query,
            world,
            concept,
            known,
        } => {
            let section = resolve_query(&query, &library)?;
            let score = engine.score_in_world(&section, &world, &concept, &known)?;
            if cli.json {
                print_json(&score)?;
            } else {
                report::score(&score);
            }
        }
        Commands::Retrieve { query, k, .. } => {
            let section = resolve_query(&query, &library)?;
            let pool = library.of_type(section.section_type);
            let retrieval = engine.retrieve_detailed(&section, &pool, k, &CancelToken::new())?;
            if cli.json {
                print_json(&retrieval)?;
            } else {
                report::retrieval(&retrieval);
            }
        }
        Commands::Contradictions { query, k, .. } => {
            let section = resolve_query(&query, &library)?;
            let pool = library.of_type(section.section_type);
            let matches = engine.retrieve(&section, &pool, k)?;
            let records = engine.find_contradictions(&matches);
            if cli.json {
                print_json(&records)?;
            } else {
                report::contradictions(&section.id, &records);
            }
        }
        Commands::Validate { world, text, input } => {
            let text = read_reasoning(text, input.as_deref())?;
            let result = engine.validate(&text, &world)?;
            if cli.json {
                print_json(&result)?;
            } else {
                report::validation(&result);
            }
            if !result.passed {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}
