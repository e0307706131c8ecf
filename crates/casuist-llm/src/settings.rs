//! Environment-driven provider settings.

use std::time::Duration;

use crate::LlmError;

pub const CASUIST_LLM_TIMEOUT_SECS_ENV: &str = "CASUIST_LLM_TIMEOUT_SECS";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Resolve the effective provider timeout.
///
/// Precedence:
/// 1) explicit override (`timeout_secs_override`)
/// 2) env var `CASUIST_LLM_TIMEOUT_SECS`
/// 3) default (`DEFAULT_LLM_TIMEOUT_SECS`)
///
/// `0` disables the timeout.
pub fn llm_timeout(timeout_secs_override: Option<u64>) -> Result<Option<Duration>, LlmError> {
    let secs = match timeout_secs_override {
        Some(v) => v,
        None => match std::env::var(CASUIST_LLM_TIMEOUT_SECS_ENV) {
            Ok(v) => parse_timeout_secs(&v)?,
            Err(std::env::VarError::NotPresent) => DEFAULT_LLM_TIMEOUT_SECS,
            Err(e) => {
                return Err(LlmError::Config(format!(
                    "failed to read {CASUIST_LLM_TIMEOUT_SECS_ENV}: {e}"
                )))
            }
        },
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn parse_timeout_secs(v: &str) -> Result<u64, LlmError> {
    let v = v.trim();
    if v.is_empty() {
        return Ok(DEFAULT_LLM_TIMEOUT_SECS);
    }
    v.parse::<u64>().map_err(|_| {
        LlmError::Config(format!(
            "invalid {CASUIST_LLM_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds; 0 disables)"
        ))
    })
}

pub fn normalize_ollama_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        // IPv4 loopback: `localhost` may resolve to ::1 where Ollama isn't listening.
        host = DEFAULT_OLLAMA_HOST.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

pub fn default_ollama_host() -> String {
    normalize_ollama_host(
        &std::env::var(OLLAMA_HOST_ENV).unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
    )
}

pub fn normalize_http_base_url(base_url: &str, default: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = default.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{host}");
    }
    host.trim_end_matches('/').to_string()
}

pub fn default_openai_base_url() -> String {
    normalize_http_base_url(
        &std::env::var(OPENAI_BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
        DEFAULT_OPENAI_BASE_URL,
    )
}

pub fn openai_api_key() -> Result<String, LlmError> {
    let key = std::env::var(OPENAI_API_KEY_ENV).unwrap_or_default();
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(LlmError::Config(format!(
            "OpenAI backend requires {OPENAI_API_KEY_ENV} (set it in your env; do not hardcode secrets in scripts)"
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_timeout_wins() {
        assert_eq!(llm_timeout(Some(7)).unwrap(), Some(Duration::from_secs(7)));
        assert_eq!(llm_timeout(Some(0)).unwrap(), None);
    }

    #[test]
    fn timeout_values_parse() {
        assert_eq!(parse_timeout_secs("  ").unwrap(), DEFAULT_LLM_TIMEOUT_SECS);
        assert_eq!(parse_timeout_secs("12").unwrap(), 12);
        assert!(matches!(parse_timeout_secs("soon"), Err(LlmError::Config(_))));
    }

    #[test]
    fn hosts_are_normalized() {
        assert_eq!(normalize_ollama_host(""), "http://127.0.0.1:11434");
        assert_eq!(normalize_ollama_host("gpu-box:11434/"), "http://gpu-box:11434");
        assert_eq!(
            normalize_http_base_url("api.example.com/", DEFAULT_OPENAI_BASE_URL),
            "https://api.example.com"
        );
        assert_eq!(
            normalize_http_base_url(" ", DEFAULT_OPENAI_BASE_URL),
            "https://api.openai.com"
        );
    }
}
