//! Deterministic tokenization shared by term overlap, token-hash embeddings,
//! and claim extraction.
//!
//! - Split on non-alphanumeric characters and on camelCase boundaries.
//! - Lowercase everything.
//! - Drop single-character tokens and English stopwords.
//! - Light lemmatization by suffix stripping, so "obligations" / "obligated"
//!   and "disclosing" / "disclosed" land on shared stems.

const MAX_TOKEN_LEN: usize = 64;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "an", "and", "any", "are", "as",
    "at", "be", "been", "being", "both", "but", "by", "can", "could", "did", "do", "does",
    "each", "for", "from", "had", "has", "have", "he", "her", "his", "how", "if", "in", "into",
    "is", "it", "its", "more", "most", "of", "on", "or", "other", "our", "she", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "under", "upon", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "with", "would", "you", "your",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Lowercased raw tokens without stopword filtering or lemmatization.
pub fn raw_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_was_lower = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            // "publicSafety" -> "public" "safety"
            if c.is_uppercase() && prev_was_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_was_lower = c.is_lowercase();
            if current.len() < MAX_TOKEN_LEN {
                current.extend(c.to_lowercase());
            }
            continue;
        }
        // Keep contractions like "don't" together as "dont".
        if c == '\'' && !current.is_empty() {
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_was_lower = false;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Content tokens: stopword-filtered and lemmatized, in text order
/// (duplicates kept so callers can count term frequency).
pub fn tokenize(text: &str) -> Vec<String> {
    raw_tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 1 && !is_stopword(t))
        .map(|t| lemmatize(&t))
        .collect()
}

/// Suffix-stripping lemmatizer. Deliberately conservative: it only strips
/// when a stem of at least three characters remains.
pub fn lemmatize(token: &str) -> String {
    if !token.is_ascii() || token.len() <= 3 || token.bytes().all(|b| b.is_ascii_digit()) {
        return token.to_string();
    }
    let rules: &[(&str, &str)] = &[
        ("ational", "ate"),
        ("ization", "ize"),
        ("iveness", "ive"),
        ("fulness", "ful"),
        ("ousness", "ous"),
        ("ations", "ate"),
        ("ation", "ate"),
        ("ments", "ment"),
        ("ities", "ity"),
        ("ingly", ""),
        ("ies", "y"),
        ("ied", "y"),
        ("sses", "ss"),
        ("ing", ""),
        ("ed", ""),
        ("es", "e"),
        ("s", ""),
    ];
    for (suffix, replacement) in rules {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.len() < 3 {
                continue;
            }
            if *suffix == "s" && (stem.ends_with('s') || stem.ends_with('u') || stem.ends_with('i')) {
                // "class", "status", "analysis"
                return token.to_string();
            }
            let mut out = format!("{stem}{replacement}");
            // "disclosed" -> "disclos" -> "disclose" style repair is not worth
            // it; instead collapse a trailing 'e' so both forms share a stem.
            if out.ends_with('e') && out.len() > 4 {
                out.pop();
            }
            return out;
        }
    }
    let mut out = token.to_string();
    if out.ends_with('e') && out.len() > 4 {
        out.pop();
    }
    out
}
