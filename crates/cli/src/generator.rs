//! OpenAI-compatible chat completions endpoint as a [`TextGenerator`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use atlas_summarizer::{GenerationRequest, SummarizerError, TextGenerator};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You summarize source code clusters. Answer with strict JSON only and never mention files that were not shown to you.";

pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatCompletionsGenerator {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "generator URL must be an http(s) URL"
        );
        anyhow::ensure!(!model.trim().is_empty(), "missing generator model name");
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .context("invalid generator API key")?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // Per-call timeouts are applied by the summarizer.
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build generator HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest) -> atlas_summarizer::Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| SummarizerError::Generation(format!("chat completions call failed: {err}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SummarizerError::Generation(format!(
                "generator returned {status}: {text}"
            )));
        }
        let parsed: ChatResponse = resp.json().await.map_err(|err| {
            SummarizerError::Generation(format!("failed to parse chat completions response: {err}"))
        })?;
        Ok(parsed.into_text())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// First choice's content; an empty reply is handed to the output parser as-is.
    fn into_text(self) -> String {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
