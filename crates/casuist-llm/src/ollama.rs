//! Ollama backends (local inference server).

use std::time::Duration;

use casuist_relevance::{EmbeddingProvider, ProviderError};
use serde::Deserialize;
use serde_json::json;

use crate::chat::ChatBackend;
use crate::settings::{default_ollama_host, normalize_ollama_host};
use crate::{http_client, transport_error, LlmError};

fn unreachable_hint(url: &str) -> impl Fn(reqwest::Error) -> LlmError + '_ {
    move |e| match transport_error(e, url, None) {
        LlmError::Transport(msg) => LlmError::Transport(format!(
            "{msg}. Try: `ollama serve` or set OLLAMA_HOST"
        )),
        other => other,
    }
}

fn http_error(resp: reqwest::blocking::Response) -> LlmError {
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    LlmError::Status { status, body }
}

/// Embeddings from `/api/embed`, falling back to `/api/embeddings` on older servers.
pub struct OllamaEmbedder {
    host: String,
    model: String,
    model_id: String,
    dimension: usize,
    timeout: Option<Duration>,
    client: reqwest::blocking::Client,
}

impl OllamaEmbedder {
    /// `dimension` must match the model's output; mismatched vectors are rejected.
    pub fn new(
        host: Option<&str>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Option<Duration>,
    ) -> Result<Self, LlmError> {
        let model = model.into();
        if dimension == 0 {
            return Err(LlmError::Config("embedding dimension must be positive".to_string()));
        }
        Ok(Self {
            host: host.map(normalize_ollama_host).unwrap_or_else(default_ollama_host),
            model_id: format!("ollama:{model}"),
            model,
            dimension,
            timeout,
            client: http_client(timeout)?,
        })
    }

    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url_embed = format!("{}/api/embed", self.host);
        let body = json!({
            "model": self.model,
            "input": texts,
            "truncate": true
        });
        let resp = self
            .client
            .post(&url_embed)
            .json(&body)
            .send()
            .map_err(|e| self.transport(e, &url_embed))?;

        let vectors = if resp.status().is_success() {
            #[derive(Deserialize)]
            struct EmbedResp {
                embeddings: Vec<Vec<f32>>,
            }
            let out: EmbedResp = resp
                .json()
                .map_err(|e| LlmError::Parse(format!("ollama /api/embed returned invalid JSON: {e}")))?;
            if out.embeddings.len() != texts.len() {
                return Err(LlmError::Parse(format!(
                    "ollama /api/embed returned {} embeddings for {} inputs",
                    out.embeddings.len(),
                    texts.len()
                )));
            }
            out.embeddings
        } else {
            tracing::debug!(status = %resp.status(), "ollama /api/embed rejected; using /api/embeddings");
            self.embed_legacy(texts)?
        };

        for v in &vectors {
            if v.len() != self.dimension {
                return Err(LlmError::Parse(format!(
                    "ollama model {} returned dimension {}, expected {}",
                    self.model,
                    v.len(),
                    self.dimension
                )));
            }
        }
        Ok(vectors)
    }

    fn embed_legacy(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        #[derive(Deserialize)]
        struct EmbeddingsResp {
            embedding: Vec<f32>,
        }
        let url = format!("{}/api/embeddings", self.host);
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            let body = json!({ "model": self.model, "prompt": t });
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| self.transport(e, &url))?;
            if !resp.status().is_success() {
                return Err(http_error(resp));
            }
            let r: EmbeddingsResp = resp
                .json()
                .map_err(|e| LlmError::Parse(format!("ollama /api/embeddings returned invalid JSON: {e}")))?;
            out.push(r.embedding);
        }
        Ok(out)
    }

    fn transport(&self, e: reqwest::Error, url: &str) -> LlmError {
        if e.is_timeout() {
            return transport_error(e, url, self.timeout);
        }
        unreachable_hint(url)(e)
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop()
            .ok_or_else(|| ProviderError::BadResponse("ollama returned no embedding".to_string()))
    }
}

/// Non-streaming `/api/chat` at temperature 0.
pub struct OllamaChat {
    host: String,
    model: String,
    timeout: Option<Duration>,
    client: reqwest::blocking::Client,
}

impl OllamaChat {
    pub fn new(host: Option<&str>, model: impl Into<String>, timeout: Option<Duration>) -> Result<Self, LlmError> {
        Ok(Self {
            host: host.map(normalize_ollama_host).unwrap_or_else(default_ollama_host),
            model: model.into(),
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl ChatBackend for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    fn complete(&self, instructions: &str, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.host);
        let mut body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": prompt }
            ],
            "options": { "temperature": 0 }
        });
        if json_mode {
            body["format"] = json!("json");
        }

        let send = |payload: &serde_json::Value| {
            self.client.post(&url).json(payload).send().map_err(|e| {
                if e.is_timeout() {
                    transport_error(e, &url, self.timeout)
                } else {
                    unreachable_hint(&url)(e)
                }
            })
        };

        let mut resp = send(&body)?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            // Some versions want a JSON schema in `format`; retry once without it.
            if json_mode && text.contains("invalid JSON schema in format") {
                if let Some(obj) = body.as_object_mut() {
                    obj.remove("format");
                }
                resp = send(&body)?;
                if !resp.status().is_success() {
                    return Err(http_error(resp));
                }
            } else {
                return Err(LlmError::Status { status, body: text });
            }
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatResp {
            message: ChatMessage,
        }
        let out: ChatResp = resp
            .json()
            .map_err(|e| LlmError::Parse(format!("ollama /api/chat returned invalid JSON: {e}")))?;
        Ok(out.message.content)
    }
}
