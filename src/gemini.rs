//! Minimal Gemini client for question generation.
//!
//! We only call `models/{model}:generateContent` and always request a JSON
//! array constrained by a response schema. Calls are instrumented and log the
//! model name, latency and token usage (not contents).
//!
//! NOTE: the API key travels in the `x-goog-api-key` header and is never logged.

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::error::GenerationError;
use crate::questions::{GenerationRequest, QuestionGenerator, RawQuestion};
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY (or API_KEY); otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY")
      .or_else(|_| std::env::var("API_KEY"))
      .ok()
      .filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    // A 20-question set with inline SVG takes a while.
    let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(120);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  /// JSON-constrained content generation. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, prompt, schema), fields(model = %self.model))]
  async fn generate_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    prompt: &str,
    schema: Value,
    temperature: f32,
  ) -> Result<T, GenerationError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateContentRequest {
      system_instruction: (!system.is_empty()).then(|| Content { role: None, parts: vec![Part { text: system.into() }] }),
      contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: prompt.into() }] }],
      generation_config: GenerationConfig {
        response_mime_type: "application/json".into(),
        response_schema: schema,
        temperature,
      },
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "bevuihoc-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await.map_err(|e| GenerationError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
      return Err(GenerationError::Http { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| GenerationError::Parse(e.to_string()))?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, candidates_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    let text = body.candidates.first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
      .unwrap_or_default();
    if text.trim().is_empty() {
      return Err(GenerationError::EmptyResponse);
    }

    serde_json::from_str::<T>(&text).map_err(|e| GenerationError::Parse(e.to_string()))
  }
}

impl QuestionGenerator for Gemini {
  #[instrument(level = "info", skip(self, request), fields(subject = %request.subject, model = %self.model))]
  async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawQuestion>, GenerationError> {
    let start = Instant::now();
    let result = self
      .generate_json::<Vec<RawQuestion>>(&request.system, &request.prompt, quiz_schema(), request.temperature)
      .await;
    let elapsed = start.elapsed();

    match &result {
      Ok(qs) => info!(?elapsed, count = qs.len(), "Model response received successfully"),
      Err(e) => error!(?elapsed, error = %e, "Model call failed during quiz generation"),
    }
    result
  }
}

/// Response schema: an array of question objects.
pub fn quiz_schema() -> Value {
  json!({
    "type": "ARRAY",
    "items": {
      "type": "OBJECT",
      "properties": {
        "questionText": {
          "type": "STRING",
          "description": "Nội dung câu hỏi, trình độ nâng cao lớp 2."
        },
        "options": {
          "type": "ARRAY",
          "items": { "type": "STRING" },
          "description": "Đúng 4 phương án trả lời (A, B, C, D)."
        },
        "correctAnswerIndex": {
          "type": "INTEGER",
          "description": "Chỉ số đáp án đúng trong options (0, 1, 2 hoặc 3)."
        },
        "explanation": {
          "type": "STRING",
          "description": "Giải thích chi tiết cách giải."
        },
        "svgImage": {
          "type": "STRING",
          "description": "Mã SVG đầy đủ (bắt đầu bằng <svg) minh họa câu hỏi; để trống nếu không cần."
        }
      },
      "required": ["questionText", "options", "correctAnswerIndex", "explanation"]
    }
  })
}

// --- Gemini DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}
#[derive(Serialize)]
struct Content {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  parts: Vec<Part>,
}
#[derive(Serialize)]
struct Part { text: String }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  response_mime_type: String,
  response_schema: Value,
  temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
