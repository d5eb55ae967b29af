//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Driving the session through generation (outside the lock, token-tagged)
//!   - Answer selection, submission with optimistic history update
//!   - Export / import / clear of the result history
//!
//! Every operation returns the view of the screen it lands on. Remote work
//! (generation, import, clear) runs in its own task holding an `Arc` of the
//! state, so a caller that goes away never leaves the session half-applied.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinError;
use tracing::{error, info, instrument, warn};

use crate::domain::{QuizResult, Subject};
use crate::error::{ApiError, SessionError, StoreError};
use crate::history::{export_history, parse_import, ResultStore};
use crate::protocol::{render, ClearOut, ExportOut, ImportOut, SessionView};
use crate::questions::{acquire, QuestionGenerator};
use crate::session::Completion;
use crate::state::AppState;
use crate::util::now_ms;

pub const NOTHING_TO_EXPORT: &str = "Chưa có dữ liệu để sao lưu!";
pub const STORE_DISABLED: &str = "Cần cấu hình Supabase để sử dụng tính năng đồng bộ.";

type Shared<G, S> = Arc<AppState<G, S>>;

fn task_failed(e: JoinError) -> ApiError {
  error!(target: "bevuihoc_backend", error = %e, "Background task failed");
  ApiError::Internal(e.to_string())
}

pub async fn current_view<G: QuestionGenerator, S: ResultStore>(state: &AppState<G, S>) -> SessionView {
  let model = state.model().await;
  render(&model, state.history.is_enabled())
}

/// Home → Generating → Taking (or back to Home on failure).
#[instrument(level = "info", skip(state), fields(%subject))]
pub async fn start_quiz<G: QuestionGenerator, S: ResultStore>(
  state: &Shared<G, S>,
  subject: Subject,
) -> Result<SessionView, SessionError> {
  let token = state.model().await.session.begin_generation(subject)?;
  Ok(spawn_generation(state, subject, token).await)
}

/// Result → Generating with the same subject.
#[instrument(level = "info", skip(state))]
pub async fn new_quiz_same_subject<G: QuestionGenerator, S: ResultStore>(
  state: &Shared<G, S>,
) -> Result<SessionView, SessionError> {
  let (subject, token) = state.model().await.session.generate_again()?;
  Ok(spawn_generation(state, subject, token).await)
}

/// Run the generation in its own task and wait for it. Dropping the caller
/// only detaches the wait; the task still completes the session transition.
async fn spawn_generation<G: QuestionGenerator, S: ResultStore>(
  state: &Shared<G, S>,
  subject: Subject,
  token: u64,
) -> SessionView {
  let task = tokio::spawn({
    let state = state.clone();
    async move { run_generation(&state, subject, token).await }
  });
  match task.await {
    Ok(view) => view,
    Err(e) => {
      task_failed(e);
      current_view(state).await
    }
  }
}

async fn run_generation<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
  subject: Subject,
  token: u64,
) -> SessionView {
  let outcome = acquire(state.generator.as_ref(), &state.prompts, &state.generation, subject).await;

  let mut model = state.model().await;
  match model.session.complete_generation(token, outcome, now_ms()) {
    Completion::Started => info!(target: "quiz", %subject, token, "Quiz started"),
    Completion::Failed => warn!(target: "quiz", %subject, token, "Quiz generation failed"),
    Completion::Stale => info!(target: "quiz", %subject, token, "Generation finished after being abandoned"),
  }
  render(&model, state.history.is_enabled())
}

#[instrument(level = "debug", skip(state))]
pub async fn select_answer<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
  question_index: usize,
  option_index: usize,
) -> Result<SessionView, SessionError> {
  let mut model = state.model().await;
  model.session.select_answer(question_index, option_index)?;
  Ok(render(&model, state.history.is_enabled()))
}

/// Taking → Result. History is updated before the detached store write starts.
#[instrument(level = "info", skip(state))]
pub async fn submit<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
) -> Result<SessionView, SessionError> {
  let mut model = state.model().await;
  let result = model.session.submit(now_ms())?;
  // Detached: the handle is dropped on purpose, failures are logged by the task.
  let _ = state.history.record_result(&mut model.history, result, &state.device_id);
  Ok(render(&model, state.history.is_enabled()))
}

#[instrument(level = "info", skip(state))]
pub async fn exit_quiz<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
  confirmed: bool,
) -> Result<SessionView, SessionError> {
  let mut model = state.model().await;
  model.session.exit_quiz(confirmed)?;
  Ok(render(&model, state.history.is_enabled()))
}

#[instrument(level = "info", skip(state))]
pub async fn go_home<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
) -> Result<SessionView, SessionError> {
  let mut model = state.model().await;
  model.session.return_home()?;
  Ok(render(&model, state.history.is_enabled()))
}

#[instrument(level = "info", skip(state))]
pub async fn open_history<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
) -> Result<SessionView, SessionError> {
  let mut model = state.model().await;
  model.session.open_history()?;
  Ok(render(&model, state.history.is_enabled()))
}

/// Pretty JSON snapshot of the local history plus a dated filename.
#[instrument(level = "info", skip(state))]
pub async fn export<G: QuestionGenerator, S: ResultStore>(state: &AppState<G, S>) -> Result<ExportOut, ApiError> {
  let model = state.model().await;
  if model.history.is_empty() {
    return Err(ApiError::Conflict(NOTHING_TO_EXPORT.into()));
  }
  let content = export_history(model.history.records()).map_err(|e| ApiError::Internal(e.to_string()))?;
  let filename = format!("lich-su-hoc-tap-{}.json", Utc::now().format("%Y-%m-%d"));
  info!(target: "history", count = model.history.len(), %filename, "History exported");
  Ok(ExportOut { filename, content })
}

/// Validate, confirm, insert everything, then adopt the store's history.
#[instrument(level = "info", skip(state, payload))]
pub async fn import<G: QuestionGenerator, S: ResultStore>(
  state: &Shared<G, S>,
  confirmed: bool,
  payload: Value,
) -> Result<ImportOut, ApiError> {
  state.model().await.session.check_history_action()?;
  if !state.history.is_enabled() {
    return Ok(ImportOut::Disabled { message: STORE_DISABLED });
  }
  let records = parse_import(payload)?;
  if !confirmed {
    return Ok(ImportOut::NeedsConfirmation { count: records.len() });
  }

  let task = tokio::spawn({
    let state = state.clone();
    async move { run_import(&state, records).await }
  });
  task.await.map_err(task_failed)?
}

async fn run_import<G: QuestionGenerator, S: ResultStore>(
  state: &AppState<G, S>,
  records: Vec<QuizResult>,
) -> Result<ImportOut, ApiError> {
  state.model().await.begin_history_op();
  let report = state.history.import_records(records, &state.device_id).await;

  let mut model = state.model().await;
  model.end_history_op();
  let Some(report) = report else {
    return Ok(ImportOut::Disabled { message: STORE_DISABLED });
  };

  let reload_error = match report.reloaded {
    Ok(records) => {
      model.history.replace(records);
      None
    }
    Err(e) => Some(e),
  };
  if report.failed > 0 {
    return Err(StoreError::PartialImport { requested: report.requested, failed: report.failed }.into());
  }
  if let Some(e) = reload_error {
    return Err(StoreError::Reload(Box::new(e)).into());
  }
  Ok(ImportOut::Imported { inserted: report.inserted, state: render(&model, true) })
}

/// Delete the device's remote history; local history is emptied only on success.
#[instrument(level = "info", skip(state))]
pub async fn clear<G: QuestionGenerator, S: ResultStore>(
  state: &Shared<G, S>,
  confirmed: bool,
) -> Result<ClearOut, ApiError> {
  state.model().await.session.check_history_action()?;
  if !state.history.is_enabled() {
    return Ok(ClearOut::Disabled { message: STORE_DISABLED });
  }
  if !confirmed {
    return Ok(ClearOut::NeedsConfirmation);
  }

  let task = tokio::spawn({
    let state = state.clone();
    async move { run_clear(&state).await }
  });
  task.await.map_err(task_failed)?
}

async fn run_clear<G: QuestionGenerator, S: ResultStore>(state: &AppState<G, S>) -> Result<ClearOut, ApiError> {
  state.model().await.begin_history_op();
  let outcome = state.history.clear(&state.device_id).await;

  let mut model = state.model().await;
  model.end_history_op();
  match outcome {
    Some(Ok(())) => {
      model.history.clear();
      Ok(ClearOut::Cleared { state: render(&model, true) })
    }
    Some(Err(e)) => Err(e.into()),
    None => Ok(ClearOut::Disabled { message: STORE_DISABLED }),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use serde_json::json;

  use super::*;
  use crate::config::QuizConfig;
  use crate::error::ValidationError;
  use crate::session::{Screen, GENERATION_FAILED_MESSAGE};
  use crate::testing::{result, MemoryStore, ScriptedGenerator};

  const DEVICE: &str = "user_dev";

  type TestState = Arc<AppState<ScriptedGenerator, MemoryStore>>;

  fn app(gen: ScriptedGenerator, store: Option<MemoryStore>) -> TestState {
    Arc::new(AppState::new(Some(gen), store, QuizConfig::default(), DEVICE.into()))
  }

  /// Yield until `done` holds for the model, failing after a bounded number of turns.
  async fn settle(state: &TestState, done: impl Fn(&crate::state::AppModel) -> bool) {
    for _ in 0..10_000 {
      if done(&*state.model().await) {
        return;
      }
      tokio::task::yield_now().await;
    }
    panic!("state did not settle");
  }

  async fn answer_all(state: &AppState<ScriptedGenerator, MemoryStore>, n: usize, correct: usize) {
    // ScriptedGenerator makes question i's answer i % 4.
    for i in 0..n {
      let pick = if i < correct { i % 4 } else { (i + 1) % 4 };
      select_answer(state, i, pick).await.unwrap();
    }
  }

  #[tokio::test]
  async fn fourteen_of_twenty_math_scores_seventy() {
    let store = MemoryStore::default();
    let state = app(ScriptedGenerator::ok(20), Some(store.clone()));
    let view = start_quiz(&state, Subject::Math).await.unwrap();
    assert!(matches!(view, SessionView::Taking { can_submit: false, .. }));

    answer_all(&state, 20, 14).await;
    let view = submit(&state).await.unwrap();
    let SessionView::Result { result, feedback, .. } = view else { panic!("expected result view") };
    assert_eq!(result.score, 70);
    assert_eq!(result.subject, Subject::Math);
    assert_eq!(feedback.tier, crate::scoring::FeedbackTier::Mid);

    let model = state.model().await;
    assert_eq!(model.history.records()[0], result);
  }

  #[tokio::test]
  async fn submit_is_rejected_until_complete() {
    let state = app(ScriptedGenerator::ok(3), None);
    start_quiz(&state, Subject::Vietnamese).await.unwrap();
    select_answer(&state, 0, 0).await.unwrap();
    select_answer(&state, 1, 0).await.unwrap();
    assert_eq!(submit(&state).await.unwrap_err(), SessionError::Incomplete { unanswered: 1 });
    assert!(state.model().await.history.is_empty());

    let view = select_answer(&state, 2, 0).await.unwrap();
    assert!(matches!(view, SessionView::Taking { can_submit: true, .. }));
    submit(&state).await.unwrap();
    assert_eq!(state.model().await.history.len(), 1);
  }

  #[tokio::test]
  async fn failing_store_never_blocks_submission() {
    let store = MemoryStore::default();
    store.fail_inserts(true);
    let state = app(ScriptedGenerator::ok(1), Some(store));
    start_quiz(&state, Subject::Math).await.unwrap();
    select_answer(&state, 0, 0).await.unwrap();
    assert!(matches!(submit(&state).await.unwrap(), SessionView::Result { .. }));
    assert_eq!(state.model().await.history.len(), 1);
  }

  #[tokio::test]
  async fn generation_failure_returns_home_and_keeps_history() {
    let state = app(ScriptedGenerator::failing(), None);
    state.model().await.history.prepend(result("kept", 90, 1));

    let view = start_quiz(&state, Subject::Math).await.unwrap();
    let SessionView::Home { error, history_count, .. } = view else { panic!("expected home view") };
    assert_eq!(error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
    assert_eq!(history_count, 1);
  }

  #[tokio::test]
  async fn abandoned_generation_does_not_overwrite_home() {
    let gen = ScriptedGenerator::ok(4);
    let gate = gen.hold_next();
    let state = app(gen, None);

    let pending = tokio::spawn({
      let state = state.clone();
      async move { start_quiz(&state, Subject::Math).await }
    });
    settle(&state, |m| matches!(m.session.screen(), Screen::Generating { .. })).await;
    go_home(&state).await.unwrap();
    gate.notify_one();

    let view = pending.await.unwrap().unwrap();
    assert!(matches!(view, SessionView::Home { .. }));
    assert_eq!(state.model().await.session.screen(), &Screen::Home);
  }

  #[tokio::test]
  async fn new_quiz_keeps_subject() {
    let gen = ScriptedGenerator::ok(1);
    let state = app(gen.clone(), None);
    start_quiz(&state, Subject::Vietnamese).await.unwrap();
    select_answer(&state, 0, 2).await.unwrap();
    submit(&state).await.unwrap();
    let view = new_quiz_same_subject(&state).await.unwrap();
    assert!(matches!(view, SessionView::Taking { .. }));
    let reqs = gen.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].subject, Subject::Vietnamese);
  }

  #[tokio::test]
  async fn exit_and_navigation() {
    let state = app(ScriptedGenerator::ok(2), None);
    assert!(matches!(open_history(&state).await.unwrap(), SessionView::History { .. }));
    assert!(matches!(go_home(&state).await.unwrap(), SessionView::Home { .. }));

    start_quiz(&state, Subject::Math).await.unwrap();
    assert_eq!(exit_quiz(&state, false).await.unwrap_err(), SessionError::NotConfirmed);
    assert!(matches!(exit_quiz(&state, true).await.unwrap(), SessionView::Home { .. }));
  }

  #[tokio::test]
  async fn import_three_records_then_reload() {
    let store = MemoryStore::default();
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    let payload = serde_json::to_value(vec![result("a", 10, 1), result("b", 20, 2), result("c", 30, 3)]).unwrap();

    let out = import(&state, false, payload.clone()).await.unwrap();
    assert!(matches!(out, ImportOut::NeedsConfirmation { count: 3 }));
    assert_eq!(store.insert_calls(), 0);

    let out = import(&state, true, payload).await.unwrap();
    assert!(matches!(out, ImportOut::Imported { inserted: 3, .. }));
    assert_eq!(store.insert_calls(), 3);
    assert_eq!(store.select_calls(), 1);
    let model = state.model().await;
    assert_eq!(model.history.len(), 3);
    assert_eq!(model.history.records()[0].quiz_id, "c");
    assert!(!model.history_loading());
  }

  #[tokio::test]
  async fn import_adopts_store_state_not_payload() {
    let store = MemoryStore::default();
    store.seed(DEVICE, vec![result("remote", 50, 10)]);
    let state = app(ScriptedGenerator::ok(1), Some(store));
    let payload = serde_json::to_value(vec![result("file", 60, 5)]).unwrap();
    import(&state, true, payload).await.unwrap();
    let ids: Vec<_> = state.model().await.history.records().iter().map(|r| r.quiz_id.clone()).collect();
    assert_eq!(ids, vec!["remote", "file"]);
  }

  #[tokio::test]
  async fn import_rejects_non_arrays_without_mutation() {
    let store = MemoryStore::default();
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    state.model().await.history.prepend(result("kept", 90, 1));

    let err = import(&state, true, json!({ "quizId": "x" })).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(ValidationError::NotAnArray)));
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(state.model().await.history.len(), 1);
  }

  #[tokio::test]
  async fn import_with_failed_inserts_is_reported() {
    let store = MemoryStore::default();
    store.fail_inserts(true);
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    let payload = serde_json::to_value(vec![result("a", 10, 1), result("b", 20, 2)]).unwrap();
    let err = import(&state, true, payload).await.unwrap_err();
    assert!(matches!(err, ApiError::Store(StoreError::PartialImport { requested: 2, failed: 2 })));
    assert_eq!(store.select_calls(), 1);
  }

  #[tokio::test]
  async fn clear_is_all_or_nothing() {
    let store = MemoryStore::default();
    store.seed(DEVICE, vec![result("a", 10, 1)]);
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    state.refresh_history().await;
    let before = state.model().await.history.clone();

    assert!(matches!(clear(&state, false).await.unwrap(), ClearOut::NeedsConfirmation));
    assert_eq!(state.model().await.history, before);

    store.fail_deletes(true);
    assert!(clear(&state, true).await.is_err());
    assert_eq!(state.model().await.history, before);

    store.fail_deletes(false);
    assert!(matches!(clear(&state, true).await.unwrap(), ClearOut::Cleared { .. }));
    assert!(state.model().await.history.is_empty());
    assert!(store.rows().is_empty());
  }

  #[tokio::test]
  async fn unconfigured_store_makes_remote_operations_inert() {
    let state = app(ScriptedGenerator::ok(1), None);
    start_quiz(&state, Subject::Math).await.unwrap();
    select_answer(&state, 0, 0).await.unwrap();
    submit(&state).await.unwrap();
    go_home(&state).await.unwrap();
    let before = state.model().await.history.clone();
    assert_eq!(before.len(), 1);

    let out = import(&state, true, json!([])).await.unwrap();
    assert!(matches!(out, ImportOut::Disabled { .. }));
    let out = import(&state, true, json!("garbage")).await.unwrap();
    assert!(matches!(out, ImportOut::Disabled { .. }));
    assert!(matches!(clear(&state, true).await.unwrap(), ClearOut::Disabled { .. }));
    state.refresh_history().await;
    assert_eq!(state.model().await.history, before);
  }

  #[tokio::test]
  async fn export_needs_history_and_round_trips() {
    let state = app(ScriptedGenerator::ok(1), None);
    assert!(matches!(export(&state).await, Err(ApiError::Conflict(_))));

    state.model().await.history.replace(vec![result("b", 20, 2), result("a", 10, 1)]);
    let out = export(&state).await.unwrap();
    assert!(out.filename.starts_with("lich-su-hoc-tap-"));
    assert!(out.filename.ends_with(".json"));
    let back = crate::history::parse_import_str(&out.content).unwrap();
    assert_eq!(back, state.model().await.history.records());
  }

  #[tokio::test]
  async fn dropped_caller_still_completes_generation() {
    let gen = ScriptedGenerator::ok(2);
    let gate = gen.hold_next();
    let state = app(gen, None);

    let pending = tokio::spawn({
      let state = state.clone();
      async move { start_quiz(&state, Subject::Vietnamese).await }
    });
    settle(&state, |m| matches!(m.session.screen(), Screen::Generating { .. })).await;
    pending.abort();
    gate.notify_one();

    settle(&state, |m| matches!(m.session.screen(), Screen::Taking { .. })).await;
    select_answer(&state, 0, 0).await.unwrap();
  }

  #[tokio::test]
  async fn dropped_caller_still_finishes_import() {
    let store = MemoryStore::default();
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    let payload = serde_json::to_value(vec![result("a", 10, 1), result("b", 20, 2)]).unwrap();

    let pending = tokio::spawn({
      let state = state.clone();
      async move { import(&state, true, payload).await }
    });
    settle(&state, |m| m.history_loading() || m.history.len() == 2).await;
    pending.abort();

    settle(&state, |m| !m.history_loading() && m.history.len() == 2).await;
    assert_eq!(store.rows().len(), 2);
    assert_eq!(store.select_calls(), 1);
  }

  #[tokio::test]
  async fn failed_reload_keeps_local_history() {
    let store = MemoryStore::default();
    let state = app(ScriptedGenerator::ok(1), Some(store.clone()));
    state.model().await.history.prepend(result("local", 40, 1));
    let before = state.model().await.history.clone();
    store.fail_reads(true);

    let payload = serde_json::to_value(vec![result("a", 10, 2)]).unwrap();
    let err = import(&state, true, payload).await.unwrap_err();
    assert!(matches!(err, ApiError::Store(StoreError::Reload(_))));
    assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    assert_eq!(store.insert_calls(), 1);

    let model = state.model().await;
    assert_eq!(model.history, before);
    assert!(!model.history_loading());
  }

  #[tokio::test]
  async fn history_actions_are_refused_while_taking() {
    let store = MemoryStore::default();
    store.seed(DEVICE, vec![result("a", 10, 1)]);
    let state = app(ScriptedGenerator::ok(2), Some(store.clone()));
    start_quiz(&state, Subject::Math).await.unwrap();

    let err = import(&state, true, json!([])).await.unwrap_err();
    assert!(matches!(err, ApiError::Session(SessionError::WrongScreen { current: "taking" })));
    let err = clear(&state, true).await.unwrap_err();
    assert!(matches!(err, ApiError::Session(SessionError::WrongScreen { .. })));
    assert_eq!(store.rows().len(), 1);

    open_history(&state).await.unwrap_err();
    exit_quiz(&state, true).await.unwrap();
    open_history(&state).await.unwrap();
    assert!(matches!(clear(&state, true).await.unwrap(), ClearOut::Cleared { .. }));
  }
}
