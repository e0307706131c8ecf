//! Offline claim extraction: one claim per sentence, stance from negation cues.

use crate::error::ProviderError;
use crate::provider::{Claim, ClaimExtractor, Stance};
use crate::text::{raw_tokens, tokenize};

/// Single-token cues that flip a sentence to [`Stance::Denies`].
/// Contractions arrive apostrophe-free ("shouldn't" -> "shouldnt").
const NEGATION_CUES: &[&str] = &[
    "cannot",
    "cant",
    "doesnt",
    "dont",
    "forbidden",
    "impermissible",
    "mustnt",
    "never",
    "no",
    "not",
    "prohibited",
    "shouldnt",
    "unethical",
    "wont",
];

#[derive(Debug, Clone, Default)]
pub struct SentenceClaimExtractor;

impl SentenceClaimExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn stance_of(sentence: &str) -> Stance {
        let negated = raw_tokens(sentence)
            .iter()
            .any(|t| NEGATION_CUES.binary_search(&t.as_str()).is_ok());
        if negated {
            Stance::Denies
        } else {
            Stance::Affirms
        }
    }
}

impl ClaimExtractor for SentenceClaimExtractor {
    fn extract(&self, text: &str) -> Result<Vec<Claim>, ProviderError> {
        Ok(split_sentences(text)
            .into_iter()
            .filter(|s| !tokenize(s).is_empty())
            .map(|s| Claim::new(s, Self::stance_of(s)))
            .collect())
    }
}

/// Split on sentence terminators and line breaks, trimming whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | '!' | '?' | ';' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
