//! Result scoring and feedback banding. Pure functions, no I/O.

use serde::Serialize;

use crate::domain::{AnswerSet, Question};

/// Number of questions whose selected option matches the correct one.
pub fn count_correct(questions: &[Question], answers: &AnswerSet) -> usize {
  questions
    .iter()
    .enumerate()
    .filter(|(i, q)| answers.get(*i) == Some(q.correct_answer_index))
    .count()
}

/// `correct * 100 / total`, in [0, 100]. A 20-question quiz scores in steps of 5.
pub fn score(correct: usize, total: usize) -> u32 {
  if total == 0 {
    return 0;
  }
  let correct = correct.min(total);
  (correct * 100 / total) as u32
}

/// Feedback band shown on the result screen.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
  Top,
  High,
  Mid,
  Low,
}

impl FeedbackTier {
  pub fn for_score(score: u32) -> Self {
    if score == 100 {
      FeedbackTier::Top
    } else if score >= 80 {
      FeedbackTier::High
    } else if score >= 50 {
      FeedbackTier::Mid
    } else {
      FeedbackTier::Low
    }
  }

  pub fn message(self) -> &'static str {
    match self {
      FeedbackTier::Top => "Xuất sắc! Thiên tài tương lai đây rồi!",
      FeedbackTier::High => "Giỏi lắm! Bé nắm bài rất chắc!",
      FeedbackTier::Mid => "Bé làm khá tốt, nhưng đề này hơi khó phải không?",
      FeedbackTier::Low => "Đề nâng cao khó quá! Bé đừng nản nhé!",
    }
  }

  /// Accent colour the result screen uses for the message.
  pub fn color(self) -> &'static str {
    match self {
      FeedbackTier::Top => "yellow",
      FeedbackTier::High => "green",
      FeedbackTier::Mid => "blue",
      FeedbackTier::Low => "gray",
    }
  }
}
