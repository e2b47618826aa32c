// src/llm.rs
//! Language-model clients used after detection: explanations and build ideas.
//!
//! Both providers speak the chat-completions protocol. `openai` targets the
//! OpenAI API (or any compatible endpoint) and needs `OPENAI_API_KEY`; `local`
//! targets a self-hosted server (Ollama, LM Studio, vLLM) and also accepts the
//! bare `response` / `message` reply shapes those servers use.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::pipeline::LlmCfg;
use crate::error::ConfigError;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_LOCAL_BASE_URL: &str = "LOCAL_LLM_BASE_URL";
pub const ENV_LOCAL_MODEL: &str = "LOCAL_LLM_MODEL";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const LOCAL_BASE_URL: &str = "http://localhost:11434";
const LOCAL_MODEL: &str = "llama3";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
    /// Provider name for logs.
    fn name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// No model; explanations come from templates.
    #[default]
    Template,
    OpenAi,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Template => "template",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Local => "local",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" | "none" | "" => Ok(LlmProvider::Template),
            "openai" => Ok(LlmProvider::OpenAi),
            "local" => Ok(LlmProvider::Local),
            _ => Err(ConfigError::UnknownLlmProvider(s.to_string())),
        }
    }
}

/// Chat-completions client over `reqwest`.
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    provider: LlmProvider,
}

impl ChatClient {
    pub fn openai(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: Some(api_key),
            model: model.to_string(),
            provider: LlmProvider::OpenAi,
        })
    }

    pub fn local(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: None,
            model: model.to_string(),
            provider: LlmProvider::Local,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("narrative-radar/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
        .context("building llm http client")
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            stream: bool,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
            stream: false,
        };

        let mut call = self.http.post(&self.url).json(&req);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let body: Value = call
            .send()
            .await
            .with_context(|| format!("llm POST {}", self.url))?
            .error_for_status()
            .with_context(|| format!("llm status {}", self.url))?
            .json()
            .await
            .context("llm response json")?;
        completion_text(&body)
    }

    fn name(&self) -> &'static str {
        self.provider.as_str()
    }
}

/// Reply text from `choices[0].message.content`, or from the `response` /
/// `message` fields some self-hosted servers return instead.
pub fn completion_text(body: &Value) -> Result<String> {
    if let Some(choices) = body.get("choices") {
        return choices
            .get(0)
            .and_then(|c| c.pointer("/message/content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("completion has no choices[0].message.content"));
    }
    if let Some(text) = body.get("response").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    match body.get("message") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(m) => m
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("message without content")),
        None => Err(anyhow!("unknown completion format")),
    }
}

/// Build the configured client. `None` means template-only: either no model is
/// configured, or the configured one is unusable (logged).
pub fn client_from_config(cfg: &LlmCfg) -> Option<DynLlm> {
    let provider = match cfg.provider.parse::<LlmProvider>() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(target: "llm", error = %e, "falling back to template explanations");
            return None;
        }
    };
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let env = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

    let built = match provider {
        LlmProvider::Template => return None,
        LlmProvider::OpenAi => {
            let Some(key) = env(ENV_OPENAI_API_KEY) else {
                tracing::warn!(target: "llm", "{ENV_OPENAI_API_KEY} not set; using template explanations");
                return None;
            };
            let base = env(ENV_OPENAI_BASE_URL)
                .or_else(|| cfg.base_url.clone())
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            let model = env(ENV_OPENAI_MODEL)
                .or_else(|| cfg.model.clone())
                .unwrap_or_else(|| OPENAI_MODEL.to_string());
            ChatClient::openai(key, &base, &model, timeout)
        }
        LlmProvider::Local => {
            let base = env(ENV_LOCAL_BASE_URL)
                .or_else(|| cfg.base_url.clone())
                .unwrap_or_else(|| LOCAL_BASE_URL.to_string());
            let model = env(ENV_LOCAL_MODEL)
                .or_else(|| cfg.model.clone())
                .unwrap_or_else(|| LOCAL_MODEL.to_string());
            ChatClient::local(&base, &model, timeout)
        }
    };

    match built {
        Ok(client) => {
            tracing::info!(target: "llm", provider = provider.as_str(), url = client.url(), "llm client ready");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(target: "llm", error = ?e, "llm client unavailable; using template explanations");
            None
        }
    }
}
