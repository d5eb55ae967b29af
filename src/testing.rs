//! Test doubles and fixtures shared by unit tests.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Mutex,
};

use tokio::sync::Notify;

use crate::domain::{Question, QuizResult, Subject};
use crate::error::{GenerationError, StoreError};
use crate::history::{ResultRow, ResultStore};
use crate::questions::{GenerationRequest, QuestionGenerator, RawQuestion};

pub fn question(id: u32, correct: usize) -> Question {
  Question {
    id,
    question_text: format!("Câu hỏi {id}"),
    options: ["A".into(), "B".into(), "C".into(), "D".into()],
    correct_answer_index: correct,
    explanation: "Vì vậy.".into(),
    svg_image: None,
  }
}

/// `n` questions; question `i` (0-based) has correct option `i % 4`.
pub fn questions(n: usize) -> Vec<Question> {
  (0..n).map(|i| question(i as u32 + 1, i % 4)).collect()
}

pub fn raw_question(correct: i64) -> RawQuestion {
  RawQuestion {
    question_text: Some("2 + 3 = ?".into()),
    options: Some(vec!["4".into(), "5".into(), "6".into(), "7".into()]),
    correct_answer_index: Some(correct),
    explanation: Some("2 + 3 = 5".into()),
    svg_image: None,
  }
}

/// A 20-question math result answered all-A.
pub fn result(quiz_id: &str, score: u32, date: i64) -> QuizResult {
  QuizResult {
    quiz_id: quiz_id.to_string(),
    subject: Subject::Math,
    score,
    total_questions: 20,
    date,
    user_answers: vec![0; 20],
  }
}

#[derive(Default)]
struct GenInner {
  /// `None` makes every call fail.
  count: Mutex<Option<usize>>,
  requests: Mutex<Vec<GenerationRequest>>,
  gate: Mutex<Option<Arc<Notify>>>,
}

/// Generator returning `n` canned questions, or failing on demand.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
  inner: Arc<GenInner>,
}

impl ScriptedGenerator {
  pub fn ok(n: usize) -> Self {
    let g = Self::default();
    g.set_count(Some(n));
    g
  }

  pub fn failing() -> Self {
    Self::default()
  }

  pub fn set_count(&self, n: Option<usize>) {
    *self.inner.count.lock().unwrap() = n;
  }

  /// Make the next call wait until the returned handle is notified.
  pub fn hold_next(&self) -> Arc<Notify> {
    let n = Arc::new(Notify::new());
    *self.inner.gate.lock().unwrap() = Some(n.clone());
    n
  }

  pub fn requests(&self) -> Vec<GenerationRequest> {
    self.inner.requests.lock().unwrap().clone()
  }
}

impl QuestionGenerator for ScriptedGenerator {
  async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawQuestion>, GenerationError> {
    self.inner.requests.lock().unwrap().push(request.clone());
    let gate = self.inner.gate.lock().unwrap().take();
    if let Some(gate) = gate {
      gate.notified().await;
    }
    let count = *self.inner.count.lock().unwrap();
    match count {
      Some(n) => Ok((0..n).map(|i| raw_question((i % 4) as i64)).collect()),
      None => Err(GenerationError::Transport("scripted failure".into())),
    }
  }
}

#[derive(Default)]
struct StoreInner {
  rows: Mutex<Vec<ResultRow>>,
  fail_inserts: Mutex<bool>,
  fail_reads: Mutex<bool>,
  fail_deletes: Mutex<bool>,
  insert_calls: AtomicUsize,
  select_calls: AtomicUsize,
}

/// In-memory result store with failure switches and call counters.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<StoreInner>,
}

impl MemoryStore {
  pub fn seed(&self, device_id: &str, results: Vec<QuizResult>) {
    let mut rows = self.inner.rows.lock().unwrap();
    rows.extend(results.iter().map(|r| ResultRow::from_result(r, device_id)));
  }

  pub fn rows(&self) -> Vec<ResultRow> {
    self.inner.rows.lock().unwrap().clone()
  }

  pub fn fail_inserts(&self, on: bool) {
    *self.inner.fail_inserts.lock().unwrap() = on;
  }

  pub fn fail_reads(&self, on: bool) {
    *self.inner.fail_reads.lock().unwrap() = on;
  }

  pub fn fail_deletes(&self, on: bool) {
    *self.inner.fail_deletes.lock().unwrap() = on;
  }

  pub fn insert_calls(&self) -> usize {
    self.inner.insert_calls.load(Ordering::SeqCst)
  }

  pub fn select_calls(&self) -> usize {
    self.inner.select_calls.load(Ordering::SeqCst)
  }

  fn unavailable() -> StoreError {
    StoreError::Http { status: 503, message: "store unavailable".into() }
  }
}

impl ResultStore for MemoryStore {
  async fn insert(&self, row: &ResultRow) -> Result<(), StoreError> {
    self.inner.insert_calls.fetch_add(1, Ordering::SeqCst);
    tokio::task::yield_now().await;
    if *self.inner.fail_inserts.lock().unwrap() {
      return Err(Self::unavailable());
    }
    self.inner.rows.lock().unwrap().push(row.clone());
    Ok(())
  }

  async fn select_all(&self, device_id: &str) -> Result<Vec<ResultRow>, StoreError> {
    self.inner.select_calls.fetch_add(1, Ordering::SeqCst);
    if *self.inner.fail_reads.lock().unwrap() {
      return Err(Self::unavailable());
    }
    let mut rows: Vec<ResultRow> = self
      .inner
      .rows
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.user_id == device_id)
      .cloned()
      .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
  }

  async fn delete_all(&self, device_id: &str) -> Result<(), StoreError> {
    if *self.inner.fail_deletes.lock().unwrap() {
      return Err(Self::unavailable());
    }
    self.inner.rows.lock().unwrap().retain(|r| r.user_id != device_id);
    Ok(())
  }
}
