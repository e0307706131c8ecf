//! Networked providers for the relevance engine.
//!
//! - [`ollama`]: local Ollama server (`/api/embed`, `/api/chat`).
//! - [`openai`]: OpenAI API (`/v1/embeddings`, `/v1/responses`).
//! - [`chat`]: an LLM judge and a claim extractor over any [`chat::ChatBackend`].
//!
//! Every call runs under the client timeout from [`settings::llm_timeout`]; a
//! timeout surfaces as `ProviderError::Timeout` so the engine drops the metric
//! instead of failing the request.

pub mod chat;
pub mod parse;
pub mod prompts;
pub mod settings;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

use casuist_relevance::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    Parse(String),
}

impl From<LlmError> for ProviderError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(ms) => ProviderError::Timeout(ms),
            LlmError::Parse(msg) => ProviderError::BadResponse(msg),
            other => ProviderError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(any(feature = "ollama", feature = "openai"))]
pub(crate) fn http_client(timeout: Option<std::time::Duration>) -> Result<reqwest::blocking::Client, LlmError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::Config(format!("failed to build http client: {e}")))
}

#[cfg(any(feature = "ollama", feature = "openai"))]
pub(crate) fn transport_error(
    e: reqwest::Error,
    url: &str,
    timeout: Option<std::time::Duration>,
) -> LlmError {
    if e.is_timeout() {
        let ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
        LlmError::Timeout(ms)
    } else {
        LlmError::Transport(format!("failed to reach {url}: {e}"))
    }
}
