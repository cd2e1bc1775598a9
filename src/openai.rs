//! Minimal OpenAI client for diagnostics, study plans and answer explanations.
//!
//! We only call chat.completions in JSON-object mode and hand the raw text back
//! for validation; nothing is parsed here beyond the completion envelope.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analyst::{AnalysisPrompt, Analyst, UpstreamError};
use crate::config::env_nonempty;
use crate::domain::{ExplainRequest, PlanBrief, QuizAnalysisInput};
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = env_nonempty("OPENAI_API_KEY")?;
    let base_url = env_nonempty("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".into());
    let model = env_nonempty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into());
    let timeout_secs = env_nonempty("OPENAI_TIMEOUT_SECS")
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(90);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, temperature: 0.3 })
  }

  /// JSON-object chat completion; returns the raw message content.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn chat_json_text(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let started = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "quizgap-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(transport_error)?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      warn!(status = status.as_u16(), error = %msg, "OpenAI returned an error status");
      return Err(UpstreamError { status: status.as_u16(), message: format!("OpenAI HTTP {}: {}", status, msg) });
    }

    let body: ChatCompletionResponse = res.json().await.map_err(transport_error)?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    info!(elapsed_ms = started.elapsed().as_millis() as u64, response_len = text.len(), "OpenAI completion received");

    Ok(text)
  }
}

#[async_trait]
impl Analyst for OpenAI {
  fn name(&self) -> &'static str {
    "openai"
  }

  async fn analyze(&self, _input: &QuizAnalysisInput, prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    self.chat_json_text(&prompt.system, &prompt.user).await
  }

  async fn plan(&self, _brief: &PlanBrief, prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    self.chat_json_text(&prompt.system, &prompt.user).await
  }

  async fn explain(&self, _request: &ExplainRequest, prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    self.chat_json_text(&prompt.system, &prompt.user).await
  }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
  let status = if e.is_timeout() {
    408
  } else {
    e.status().map(|s| s.as_u16()).unwrap_or(502)
  };
  UpstreamError { status, message: e.to_string() }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
