use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tokio::runtime::Runtime;

use queryfit_core::RefineError;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// JSON keys under which a generation response may carry the candidate
/// replacement text. The Turkish spelling is what the prompt historically
/// asked for; the English ones cover models that anglicize the schema.
pub const CANDIDATE_KEYS: [&str; 3] = ["improved_text", "Improved Text", "Geliştirilmiş Metin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAi,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "ollama" => Some(LlmProvider::Ollama),
            "openai" => Some(LlmProvider::OpenAi),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    Ollama(OllamaConfig),
    OpenAi(OpenAiConfig),
    Local,
}

#[derive(Clone)]
struct OllamaConfig {
    base_url: String,
}

#[derive(Clone)]
struct OpenAiConfig {
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let timeout = env::var("QUERYFIT_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("failed to build http client")?;
        let config = match provider {
            LlmProvider::Ollama => ProviderConfig::Ollama(OllamaConfig {
                base_url: env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            }),
            LlmProvider::OpenAi => ProviderConfig::OpenAi(OpenAiConfig {
                api_key: env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY is not set"))?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            }),
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http,
            provider,
            model,
            config,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<String> {
        match &self.config {
            ProviderConfig::Ollama(cfg) => self.chat_ollama(cfg, req).await,
            ProviderConfig::OpenAi(cfg) => self.chat_openai(cfg, req).await,
            ProviderConfig::Local => Ok(synthesize_local_response(req)),
        }
    }

    /// The refinement loop is synchronous by design; callers hand in a
    /// runtime and block per attempt.
    pub fn chat_blocking(&self, rt: &Runtime, req: &LlmRequest) -> Result<String> {
        rt.block_on(self.chat(req))
    }

    async fn chat_ollama(&self, cfg: &OllamaConfig, req: &LlmRequest) -> Result<String> {
        let url = format!("{}/api/chat", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("ollama request to {url} failed"))?
            .error_for_status()
            .context("ollama returned an error")?
            .json::<OllamaResponse>()
            .await
            .context("failed to decode ollama response")?;
        Ok(response.message.content)
    }

    async fn chat_openai(&self, cfg: &OpenAiConfig, req: &LlmRequest) -> Result<String> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| "openai request failed")?
            .error_for_status()
            .context("openai returned an error")?
            .json::<ChatResponse>()
            .await
            .context("failed to decode openai response")?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("missing text in OpenAI response"))
    }
}

/// Offline provider: echoes a well-formed response that blends the query
/// into the current text. Keeps the binary runnable (and demos honest)
/// with no model server.
fn synthesize_local_response(req: &LlmRequest) -> String {
    let query = extract_field_line(&req.user, "Query:");
    let current = extract_field_line(&req.user, "Current text:");
    let mut improved = current.trim().to_string();
    if !query.is_empty() && !improved.to_lowercase().contains(&query.to_lowercase()) {
        if improved.is_empty() {
            improved = query.clone();
        } else {
            improved = format!("{query}: {improved}");
        }
    }
    json!({ "improved_text": improved }).to_string()
}

fn extract_field_line(text: &str, marker: &str) -> String {
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix(marker) {
            return rest.trim().trim_matches('"').to_string();
        }
    }
    String::new()
}

/// Greedy scan for the first `{...}` span in free-form model output,
/// decoded as JSON. This is deliberately a bounded scan-and-decode, not a
/// parser: models wrap the object in prose and code fences all the time.
pub fn extract_json_object(raw: &str) -> Result<Value, RefineError> {
    let start = raw
        .find('{')
        .ok_or_else(|| RefineError::GenerationParse("no JSON object in response".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| RefineError::GenerationParse("unterminated JSON object".to_string()))?;
    serde_json::from_str(&raw[start..=end])
        .map_err(|err| RefineError::GenerationParse(err.to_string()))
}

/// Pulls the candidate replacement text out of a raw response. Empty or
/// whitespace-only candidates are reported as parse failures so the loop
/// can fall back to its no-op candidate.
pub fn extract_candidate(raw: &str) -> Result<String, RefineError> {
    let object = extract_json_object(raw)?;
    for key in CANDIDATE_KEYS {
        if let Some(text) = object.get(key).and_then(|v| v.as_str()) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }
    Err(RefineError::GenerationParse(
        "no candidate text under a recognized key".to_string(),
    ))
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
