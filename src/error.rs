//! Error taxonomy for the quiz backend.
//!
//! - `GenerationError`: the question generator failed or returned unusable data.
//! - `StoreError`: a read/write against the result store failed.
//! - `ValidationError`: an import payload is not a list of results.
//! - `SessionError`: a transition the current screen does not allow.
//!
//! None of these is fatal; callers always land on a stable screen.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("question generator is not configured")]
  NotConfigured,
  #[error("generator request failed: {0}")]
  Transport(String),
  #[error("generator HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("generator returned no content")]
  EmptyResponse,
  #[error("generator JSON parse error: {0}")]
  Parse(String),
  #[error("question {index} is invalid: {reason}")]
  InvalidQuestion { index: usize, reason: String },
  #[error("generator returned an empty question set")]
  NoQuestions,
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store request failed: {0}")]
  Transport(String),
  #[error("store HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("store returned malformed rows: {0}")]
  Decode(String),
  #[error("{failed} of {requested} imported results could not be saved")]
  PartialImport { requested: usize, failed: usize },
  #[error("history reload after import failed: {0}")]
  Reload(Box<StoreError>),
}

impl From<reqwest::Error> for StoreError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() { Self::Decode(e.to_string()) } else { Self::Transport(e.to_string()) }
  }
}

#[derive(Debug, Error)]
pub enum ValidationError {
  #[error("import payload is not valid JSON: {0}")]
  Json(String),
  #[error("import payload must be a list of results")]
  NotAnArray,
  #[error("record {index}: {reason}")]
  Record { index: usize, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("not allowed on the {current} screen")]
  WrongScreen { current: &'static str },
  #[error("question index {index} out of range (quiz has {len})")]
  QuestionOutOfRange { index: usize, len: usize },
  #[error("option index {index} out of range")]
  OptionOutOfRange { index: usize },
  #[error("{unanswered} question(s) still unanswered")]
  Incomplete { unanswered: usize },
  #[error("action requires confirmation")]
  NotConfirmed,
}

/// Error surfaced to HTTP clients as `{ "error": message }`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Session(#[from] SessionError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("{0}")]
  Conflict(String),
  #[error("serialization error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Session(SessionError::QuestionOutOfRange { .. })
      | ApiError::Session(SessionError::OptionOutOfRange { .. }) => StatusCode::BAD_REQUEST,
      ApiError::Session(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Store(_) => StatusCode::BAD_GATEWAY,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> axum::response::Response {
    (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
  }
}
