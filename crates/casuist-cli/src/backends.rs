//! Provider selection from command-line flags.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use casuist_llm::chat::{ChatBackend, ChatClaimExtractor, ChatJudge};
use casuist_llm::settings::llm_timeout;
use casuist_relevance::{EmbeddingProvider, Providers, TokenHashEmbedder};
use clap::{Args, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbedBackend {
    /// Deterministic local hashing embedder (no network).
    TokenHash,
    Ollama,
    Openai,
    /// No embeddings: vector metric off, retrieval unavailable.
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum JudgeBackend {
    None,
    Ollama,
    Openai,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClaimsBackend {
    /// Sentence splitting with negation cues.
    Sentences,
    Ollama,
    Openai,
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    #[arg(long, value_enum, default_value_t = EmbedBackend::TokenHash)]
    pub embed: EmbedBackend,
    #[arg(long)]
    pub embed_model: Option<String>,
    /// Embedding dimension (required to match the model).
    #[arg(long)]
    pub embed_dim: Option<usize>,
    #[arg(long, value_enum, default_value_t = JudgeBackend::None)]
    pub judge: JudgeBackend,
    #[arg(long, value_enum, default_value_t = ClaimsBackend::Sentences)]
    pub claims: ClaimsBackend,
    /// Chat model for the judge and claim extraction.
    #[arg(long)]
    pub chat_model: Option<String>,
    /// Ollama host (defaults to `OLLAMA_HOST` or http://127.0.0.1:11434).
    #[arg(long)]
    pub ollama_host: Option<String>,
    /// OpenAI-compatible base URL (defaults to `OPENAI_BASE_URL` or https://api.openai.com).
    #[arg(long)]
    pub openai_base_url: Option<String>,
    /// Provider timeout in seconds; 0 disables. Defaults to `CASUIST_LLM_TIMEOUT_SECS` or 30.
    #[arg(long)]
    pub llm_timeout_secs: Option<u64>,
}

const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text";
const DEFAULT_OLLAMA_EMBED_DIM: usize = 768;
const DEFAULT_OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_EMBED_DIM: usize = 1536;
const DEFAULT_OLLAMA_CHAT_MODEL: &str = "llama3.1";
const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

impl BackendArgs {
    pub fn providers(&self) -> Result<Providers> {
        let timeout = llm_timeout(self.llm_timeout_secs)?;
        let mut providers = Providers::offline();
        providers.embedder = self.embedder(timeout)?;

        let judge = match self.judge {
            JudgeBackend::None => None,
            JudgeBackend::Ollama => Some(self.ollama_chat(timeout)?),
            JudgeBackend::Openai => Some(self.openai_chat(timeout)?),
        };
        if let Some(chat) = judge {
            providers = providers.with_judge(Arc::new(ChatJudge::new(chat)));
        }

        let extractor = match self.claims {
            ClaimsBackend::Sentences => None,
            ClaimsBackend::Ollama => Some(self.ollama_chat(timeout)?),
            ClaimsBackend::Openai => Some(self.openai_chat(timeout)?),
        };
        if let Some(chat) = extractor {
            providers = providers.with_claim_extractor(Arc::new(ChatClaimExtractor::new(chat)));
        }

        tracing::debug!(
            embed = ?self.embed,
            judge = ?self.judge,
            claims = ?self.claims,
            "providers selected"
        );
        Ok(providers)
    }

    fn embedder(&self, timeout: Option<Duration>) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        Ok(match self.embed {
            EmbedBackend::None => None,
            EmbedBackend::TokenHash => {
                let embedder = match self.embed_dim {
                    Some(0) => return Err(anyhow!("--embed-dim must be positive")),
                    Some(dim) => TokenHashEmbedder::new(dim),
                    None => TokenHashEmbedder::default(),
                };
                Some(Arc::new(embedder) as Arc<dyn EmbeddingProvider>)
            }
            EmbedBackend::Ollama => Some(self.ollama_embedder(timeout)?),
            EmbedBackend::Openai => Some(self.openai_embedder(timeout)?),
        })
    }

    #[cfg(feature = "llm-ollama")]
    fn ollama_embedder(&self, timeout: Option<Duration>) -> Result<Arc<dyn EmbeddingProvider>> {
        let model = self.embed_model.as_deref().unwrap_or(DEFAULT_OLLAMA_EMBED_MODEL);
        let dim = self.embed_dim.unwrap_or(DEFAULT_OLLAMA_EMBED_DIM);
        Ok(Arc::new(casuist_llm::ollama::OllamaEmbedder::new(
            self.ollama_host.as_deref(),
            model,
            dim,
            timeout,
        )?))
    }

    #[cfg(not(feature = "llm-ollama"))]
    fn ollama_embedder(&self, _timeout: Option<Duration>) -> Result<Arc<dyn EmbeddingProvider>> {
        let _ = (DEFAULT_OLLAMA_EMBED_MODEL, DEFAULT_OLLAMA_EMBED_DIM);
        Err(anyhow!("casuist was built without the `llm-ollama` feature"))
    }

    #[cfg(feature = "llm-ollama")]
    fn ollama_chat(&self, timeout: Option<Duration>) -> Result<Arc<dyn ChatBackend>> {
        let model = self.chat_model.as_deref().unwrap_or(DEFAULT_OLLAMA_CHAT_MODEL);
        Ok(Arc::new(casuist_llm::ollama::OllamaChat::new(
            self.ollama_host.as_deref(),
            model,
            timeout,
        )?))
    }

    #[cfg(not(feature = "llm-ollama"))]
    fn ollama_chat(&self, _timeout: Option<Duration>) -> Result<Arc<dyn ChatBackend>> {
        let _ = DEFAULT_OLLAMA_CHAT_MODEL;
        Err(anyhow!("casuist was built without the `llm-ollama` feature"))
    }

    #[cfg(feature = "llm-openai")]
    fn openai_embedder(&self, timeout: Option<Duration>) -> Result<Arc<dyn EmbeddingProvider>> {
        let model = self.embed_model.as_deref().unwrap_or(DEFAULT_OPENAI_EMBED_MODEL);
        let dim = self.embed_dim.unwrap_or(DEFAULT_OPENAI_EMBED_DIM);
        Ok(Arc::new(casuist_llm::openai::OpenAiEmbedder::new(
            self.openai_base_url.as_deref(),
            model,
            dim,
            timeout,
        )?))
    }

    #[cfg(not(feature = "llm-openai"))]
    fn openai_embedder(&self, _timeout: Option<Duration>) -> Result<Arc<dyn EmbeddingProvider>> {
        let _ = (DEFAULT_OPENAI_EMBED_MODEL, DEFAULT_OPENAI_EMBED_DIM);
        Err(anyhow!("casuist was built without the `llm-openai` feature"))
    }

    #[cfg(feature = "llm-openai")]
    fn openai_chat(&self, timeout: Option<Duration>) -> Result<Arc<dyn ChatBackend>> {
        let model = self.chat_model.as_deref().unwrap_or(DEFAULT_OPENAI_CHAT_MODEL);
        Ok(Arc::new(casuist_llm::openai::OpenAiChat::new(
            self.openai_base_url.as_deref(),
            model,
            timeout,
        )?))
    }

    #[cfg(not(feature = "llm-openai"))]
    fn openai_chat(&self, _timeout: Option<Duration>) -> Result<Arc<dyn ChatBackend>> {
        let _ = DEFAULT_OPENAI_CHAT_MODEL;
        Err(anyhow!("casuist was built without the `llm-openai` feature"))
    }
}
