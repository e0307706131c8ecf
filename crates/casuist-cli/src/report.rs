//! Human-readable reports.

use casuist_ontology::Verdict;
use casuist_relevance::{
    ConceptRanking, ConflictKind, ContradictionRecord, MetricScores, RelevanceScore,
    ResolutionHint, Retrieval, ThresholdDecision, ThresholdStrategy, ValidationResult,
};
use colored::Colorize;

fn metric(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
}

fn metrics_line(m: &MetricScores) -> String {
    format!(
        "vector {}  term {}  structural {}  llm {}",
        metric(m.vector),
        metric(m.term),
        metric(m.structural),
        metric(m.llm)
    )
}

fn threshold_line(t: &ThresholdDecision) -> String {
    let strategy = match t.strategy {
        ThresholdStrategy::Empty => "empty batch",
        ThresholdStrategy::TightCluster => "tight cluster",
        ThresholdStrategy::Percentile => "percentile",
    };
    format!(
        "threshold {:.3} ({strategy}, {} floor {:.2}, n={}, mean {:.3}, sd {:.3})",
        t.value, t.section_type, t.base_floor, t.batch_size, t.mean, t.std_dev
    )
}

pub fn concepts(ranking: &ConceptRanking, all: bool) {
    println!(
        "{} {} in world {}",
        "Section".bold(),
        ranking.section_id,
        ranking.world_id.cyan()
    );
    println!("{}", threshold_line(&ranking.threshold).dimmed());
    for s in &ranking.scores {
        let admitted = ranking.threshold.admits(s.combined_score);
        if !admitted && !all {
            continue;
        }
        let mark = if admitted { "+".green() } else { " ".normal() };
        let score = format!("{:.3}", s.combined_score);
        let score = if admitted { score.green().bold() } else { score.dimmed() };
        println!(
            "  {mark} {score}  {:<24} {}",
            s.concept_id,
            metrics_line(&s.metrics()).dimmed()
        );
    }
    if ranking.admitted.is_empty() {
        println!("  {}", "no concept cleared the threshold".yellow());
    }
    if !ranking.skipped.is_empty() {
        println!(
            "  {} {}",
            "skipped (no signal):".yellow(),
            ranking.skipped.join(", ")
        );
    }
}

pub fn score(s: &RelevanceScore) {
    println!(
        "{} {} / {}: {}",
        "Score".bold(),
        s.section_id,
        s.concept_id.cyan(),
        format!("{:.4}", s.combined_score).green().bold()
    );
    println!("  {}", metrics_line(&s.metrics()));
    let w = &s.weights_used;
    println!(
        "  {}",
        format!(
            "weights vector {:.3}  term {:.3}  structural {:.3}  llm {:.3}",
            w.vector, w.term, w.structural, w.llm
        )
        .dimmed()
    );
}

pub fn retrieval(r: &Retrieval) {
    println!(
        "{} for {} (pool {}, coarse {})",
        "Precedents".bold(),
        r.query_section_id,
        r.pool_size,
        r.coarse_size
    );
    println!("{}", threshold_line(&r.threshold).dimmed());
    if r.matches.is_empty() {
        println!("  {}", "no precedent cleared the threshold".yellow());
    }
    for m in &r.matches {
        println!(
            "  {:>2}. {}  {} ({})  {}",
            m.rank,
            format!("{:.3}", m.combined_score).green(),
            m.candidate_id,
            m.candidate_document_id,
            metrics_line(&m.metrics).dimmed()
        );
    }
}

fn verdict(v: Verdict) -> colored::ColoredString {
    match v {
        Verdict::Ethical => "ethical".green(),
        Verdict::Unethical => "unethical".red(),
        Verdict::Mixed => "mixed".yellow(),
    }
}

pub fn contradictions(query_id: &str, records: &[ContradictionRecord]) {
    if records.is_empty() {
        println!("{} among precedents of {query_id}", "No contradictions".green());
        return;
    }
    println!(
        "{} among precedents of {query_id}: {}",
        "Contradictions".bold(),
        records.len()
    );
    for r in records {
        let hint = match r.resolution_hint {
            ResolutionHint::Temporal => "temporal".cyan(),
            ResolutionHint::Contextual => "contextual".cyan(),
            ResolutionHint::Unresolved => "unresolved".red().bold(),
        };
        println!(
            "  {} ({}) vs {} ({})  mutual {:.3}  [{hint}]",
            r.first.candidate_id,
            verdict(r.first_outcome.verdict),
            r.second.candidate_id,
            verdict(r.second_outcome.verdict),
            r.mutual_score
        );
    }
}

pub fn validation(v: &ValidationResult) {
    let status = if v.passed {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "{} {status} in world {} ({} claims checked, {} unmapped)",
        "Admissibility".bold(),
        v.world_id.cyan(),
        v.claims_checked,
        v.unmapped_claims.len()
    );
    for c in &v.conflicts {
        let why = match c.kind {
            ConflictKind::OutrankedByReachable => "outranked by",
            ConflictKind::DeniesOverridingNorm => "denies overriding norm",
        };
        println!(
            "  {} {:?}\n      maps to {} ({:.3}), {why} {} ({})",
            "-".red(),
            c.claim.text,
            c.mapped_concept,
            c.match_score,
            c.conflicting_concept.yellow(),
            c.conflicting_label
        );
    }
}
