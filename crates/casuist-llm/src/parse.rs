//! Parsing model output into judge scores and claims.
//!
//! Models wrap JSON in prose or markdown fences often enough that every
//! parser here first tries strict JSON and then the first balanced object.

use std::sync::OnceLock;

use casuist_relevance::{Claim, Stance};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::LlmError;

pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }
    let Some(start) = trimmed.find('{') else {
        return Err(LlmError::Parse("model did not return JSON (no '{' found)".to_string()));
    };

    // Brace balancing outside string literals.
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;
    let mut end: Option<usize> = None;
    for (idx, ch) in trimmed.char_indices().skip_while(|(i, _)| *i < start) {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(end) = end else {
        return Err(LlmError::Parse("model returned an unterminated JSON object".to_string()));
    };
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| LlmError::Parse(format!("model returned invalid JSON: {e}")))
}

#[derive(Deserialize)]
struct RelevancePayload {
    #[serde(alias = "score")]
    relevance: f64,
}

fn first_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex"))
}

/// A relevance estimate in `[0, 1]`.
///
/// Accepts `{"relevance": x}` / `{"score": x}` or, failing that, the first
/// number in the text. Values on a 0-10 or 0-100 scale are rescaled.
pub fn parse_relevance(text: &str) -> Result<f64, LlmError> {
    let raw = match parse_json_object::<RelevancePayload>(text) {
        Ok(p) => p.relevance,
        Err(_) => first_number()
            .find(text)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| LlmError::Parse(format!("no relevance score in {:?}", truncate(text))))?,
    };
    let scaled = if raw > 10.0 {
        raw / 100.0
    } else if raw > 1.0 {
        raw / 10.0
    } else {
        raw
    };
    if !scaled.is_finite() || !(0.0..=1.0).contains(&scaled) {
        return Err(LlmError::Parse(format!("relevance {raw} is out of range")));
    }
    Ok(scaled)
}

#[derive(Deserialize)]
struct ClaimsPayload {
    claims: Vec<ClaimRow>,
}

#[derive(Deserialize)]
struct ClaimRow {
    text: String,
    #[serde(default)]
    stance: Option<String>,
}

pub fn parse_claims(text: &str) -> Result<Vec<Claim>, LlmError> {
    let payload: ClaimsPayload = parse_json_object(text)?;
    Ok(payload
        .claims
        .into_iter()
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| {
            let stance = match c.stance.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("denies") | Some("deny") | Some("negative") => Stance::Denies,
                _ => Stance::Affirms,
            };
            Claim::new(c.text.trim(), stance)
        })
        .collect())
}

fn truncate(text: &str) -> String {
    text.chars().take(80).collect()
}
