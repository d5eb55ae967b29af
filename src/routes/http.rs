//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::State,
  http::header,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::history::ResultStore;
use crate::logic;
use crate::protocol::*;
use crate::questions::QuestionGenerator;
use crate::state::AppState;

type Shared<G, S> = State<Arc<AppState<G, S>>>;

#[instrument(level = "info", skip(state))]
pub async fn http_health<G: QuestionGenerator, S: ResultStore>(State(state): Shared<G, S>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    generator_enabled: state.generator.is_some(),
    store_enabled: state.history.is_enabled(),
  })
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_state<G: QuestionGenerator, S: ResultStore>(State(state): Shared<G, S>) -> Json<SessionView> {
  Json(logic::current_view(&state).await)
}

#[instrument(level = "info", skip(state), fields(subject = %body.subject))]
pub async fn http_start_quiz<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
  Json(body): Json<StartQuizIn>,
) -> Result<Json<SessionView>, ApiError> {
  let view = logic::start_quiz(&state, body.subject).await?;
  info!(target: "quiz", subject = %body.subject, screen = view_name(&view), "HTTP start_quiz finished");
  Ok(Json(view))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_select_answer<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::select_answer(&state, body.question_index, body.option_index).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_submit<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::submit(&state).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_exit_quiz<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
  Json(body): Json<ConfirmIn>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::exit_quiz(&state, body.confirmed).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_new_quiz<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::new_quiz_same_subject(&state).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_go_home<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::go_home(&state).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_open_history<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(logic::open_history(&state).await?))
}

/// Download the history as a pretty-printed JSON attachment.
#[instrument(level = "info", skip(state))]
pub async fn http_export_history<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
) -> Result<impl IntoResponse, ApiError> {
  let out = logic::export(&state).await?;
  let disposition = format!("attachment; filename=\"{}\"", out.filename);
  Ok((
    [
      (header::CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
      (header::CONTENT_DISPOSITION, disposition),
    ],
    out.content,
  ))
}

#[instrument(level = "info", skip(state, body), fields(confirmed = body.confirmed))]
pub async fn http_import_history<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
  Json(body): Json<ImportIn>,
) -> Result<Json<ImportOut>, ApiError> {
  let out = logic::import(&state, body.confirmed, body.records).await?;
  info!(target: "history", "HTTP import handled");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_history<G: QuestionGenerator, S: ResultStore>(
  State(state): Shared<G, S>,
  Json(body): Json<ConfirmIn>,
) -> Result<Json<ClearOut>, ApiError> {
  Ok(Json(logic::clear(&state, body.confirmed).await?))
}

fn view_name(v: &SessionView) -> &'static str {
  match v {
    SessionView::Home { .. } => "home",
    SessionView::Generating { .. } => "generating",
    SessionView::Taking { .. } => "taking",
    SessionView::Result { .. } => "result",
    SessionView::History { .. } => "history",
  }
}
