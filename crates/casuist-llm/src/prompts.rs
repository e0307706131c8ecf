//! Prompt templates for the relevance judge and the claim extractor.

pub const JUDGE_INSTRUCTIONS: &str = "You grade how relevant a section of a professional-ethics case is to one \
ethical concept. Reply with a single JSON object {\"relevance\": x} where x is a number between 0 and 1. \
0 means unrelated, 1 means the section is directly about the concept. Do not explain.";

pub const CLAIM_INSTRUCTIONS: &str = "You split ethical reasoning into atomic claims. Reply with a single JSON \
object {\"claims\": [{\"text\": \"...\", \"stance\": \"affirms\" | \"denies\"}]}. A claim denies when it \
says an action is not permitted, not required, or should not happen. Keep each claim to one sentence and \
copy wording from the input where possible.";

/// Sections longer than this are cut before being sent to the model.
pub const MAX_SECTION_CHARS: usize = 6_000;

pub fn judge_prompt(section_text: &str, concept_label: &str) -> String {
    format!(
        "Concept: {concept_label}\n\nSection:\n{}\n\nRelevance JSON:",
        clip(section_text)
    )
}

pub fn claims_prompt(text: &str) -> String {
    format!("Reasoning:\n{}\n\nClaims JSON:", clip(text))
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_SECTION_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
