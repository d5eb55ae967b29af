//! Domain models: subjects, questions, quizzes, answer sets and results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every question offers exactly this many options (A, B, C, D).
pub const OPTION_COUNT: usize = 4;

/// School subject a quiz is generated for.
///
/// Wire values are the display labels used by exported history files;
/// the enum-style names are accepted on input too.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Subject {
  #[serde(rename = "Toán", alias = "MATH")]
  Math,
  #[serde(rename = "Tiếng Việt", alias = "VIETNAMESE")]
  Vietnamese,
}

impl Subject {
  pub fn label(self) -> &'static str {
    match self {
      Subject::Math => "Toán",
      Subject::Vietnamese => "Tiếng Việt",
    }
  }
}

impl fmt::Display for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// A validated multiple-choice question. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  /// 1-based position within the quiz.
  pub id: u32,
  pub question_text: String,
  pub options: [String; OPTION_COUNT],
  pub correct_answer_index: usize,
  pub explanation: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub svg_image: Option<String>,
}

/// A generated quiz owned by the active session.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizData {
  pub id: String,
  pub subject: Subject,
  pub questions: Vec<Question>,
  /// Unix millis.
  pub created_at: i64,
}

impl QuizData {
  /// Build a quiz stamped with `now_ms`; the id is derived from the same instant.
  pub fn new(subject: Subject, questions: Vec<Question>, now_ms: i64) -> Self {
    Self { id: now_ms.to_string(), subject, questions, created_at: now_ms }
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }
}

/// Per-question selections. Length is fixed when the quiz starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerSet {
  slots: Vec<Option<usize>>,
}

impl AnswerSet {
  pub fn unanswered(len: usize) -> Self {
    Self { slots: vec![None; len] }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn get(&self, index: usize) -> Option<usize> {
    self.slots.get(index).copied().flatten()
  }

  /// Store `option` for question `index`. Re-selecting is allowed.
  /// Returns false when `index` is outside the set.
  pub fn select(&mut self, index: usize, option: usize) -> bool {
    match self.slots.get_mut(index) {
      Some(slot) => {
        *slot = Some(option);
        true
      }
      None => false,
    }
  }

  pub fn answered_count(&self) -> usize {
    self.slots.iter().filter(|s| s.is_some()).count()
  }

  pub fn is_complete(&self) -> bool {
    self.slots.iter().all(Option::is_some)
  }

  /// Frozen copy of the selections, only once every slot is filled.
  pub fn freeze(&self) -> Option<Vec<usize>> {
    self.slots.iter().copied().collect()
  }

  /// Wire form: unanswered slots become -1.
  pub fn to_wire(&self) -> Vec<i64> {
    self.slots.iter().map(|s| s.map(|v| v as i64).unwrap_or(-1)).collect()
  }
}

/// Outcome of one submitted quiz.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
  pub quiz_id: String,
  pub subject: Subject,
  pub score: u32,
  pub total_questions: u32,
  /// Unix millis.
  pub date: i64,
  pub user_answers: Vec<usize>,
}
