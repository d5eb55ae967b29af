//! Question set acquisition: the boundary between the external generator and
//! the typed `Question` model.
//!
//! The generator only transports; everything it returns is treated as
//! untrusted until `validate_question` has checked it. Ids are assigned here
//! from position, never taken from the payload.

use std::future::Future;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::{GenerationCfg, Prompts};
use crate::domain::{Question, Subject, OPTION_COUNT};
use crate::error::GenerationError;
use crate::util::fill_template;

/// Fully rendered request handed to a generator.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub subject: Subject,
  pub system: String,
  pub prompt: String,
  pub temperature: f32,
}

/// Question record as the generator returns it, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
  #[serde(default)] pub question_text: Option<String>,
  #[serde(default)] pub options: Option<Vec<String>>,
  #[serde(default)] pub correct_answer_index: Option<i64>,
  #[serde(default)] pub explanation: Option<String>,
  #[serde(default)] pub svg_image: Option<String>,
}

/// External source of question sets.
pub trait QuestionGenerator: Send + Sync + 'static {
  fn generate(
    &self,
    request: &GenerationRequest,
  ) -> impl Future<Output = Result<Vec<RawQuestion>, GenerationError>> + Send;
}

/// Render the configured prompt for `subject`.
pub fn build_request(prompts: &Prompts, generation: &GenerationCfg, subject: Subject) -> GenerationRequest {
  let count = generation.question_count.to_string();
  let pairs = [("subject", subject.label()), ("count", count.as_str())];
  GenerationRequest {
    subject,
    system: fill_template(&prompts.system, &pairs),
    prompt: fill_template(&prompts.user_template, &pairs),
    temperature: generation.temperature,
  }
}

/// Ask the generator for a quiz and convert the answer into typed questions.
/// Any failure rejects the whole set.
#[instrument(level = "info", skip(generator, prompts, generation), fields(%subject))]
pub async fn acquire<G: QuestionGenerator>(
  generator: Option<&G>,
  prompts: &Prompts,
  generation: &GenerationCfg,
  subject: Subject,
) -> Result<Vec<Question>, GenerationError> {
  let generator = generator.ok_or(GenerationError::NotConfigured)?;
  let request = build_request(prompts, generation, subject);
  let raw = generator.generate(&request).await?;
  let questions = into_questions(raw)?;

  if questions.len() != generation.question_count {
    warn!(target: "quiz", expected = generation.question_count, got = questions.len(), "Generator returned an unexpected number of questions");
  }
  info!(target: "quiz", count = questions.len(), with_images = questions.iter().filter(|q| q.svg_image.is_some()).count(), "Question set accepted");
  Ok(questions)
}

/// Validate every record and number them 1..=n by position.
pub fn into_questions(raw: Vec<RawQuestion>) -> Result<Vec<Question>, GenerationError> {
  if raw.is_empty() {
    return Err(GenerationError::NoQuestions);
  }
  raw.into_iter().enumerate().map(|(i, r)| validate_question(i, r)).collect()
}

fn validate_question(index: usize, raw: RawQuestion) -> Result<Question, GenerationError> {
  let invalid = |reason: &str| GenerationError::InvalidQuestion { index, reason: reason.to_string() };

  let question_text = raw
    .question_text
    .filter(|t| !t.trim().is_empty())
    .ok_or_else(|| invalid("missing questionText"))?;
  let explanation = raw.explanation.ok_or_else(|| invalid("missing explanation"))?;

  let options = raw.options.ok_or_else(|| invalid("missing options"))?;
  if options.iter().any(|o| o.trim().is_empty()) {
    return Err(invalid("blank option"));
  }
  let options: [String; OPTION_COUNT] = options
    .try_into()
    .map_err(|v: Vec<String>| invalid(&format!("expected {} options, got {}", OPTION_COUNT, v.len())))?;

  let correct_answer_index = raw
    .correct_answer_index
    .and_then(|i| usize::try_from(i).ok())
    .filter(|i| *i < OPTION_COUNT)
    .ok_or_else(|| invalid("correctAnswerIndex out of range"))?;

  let svg_image = raw.svg_image.filter(|s| !s.trim().is_empty());

  Ok(Question {
    id: index as u32 + 1,
    question_text,
    options,
    correct_answer_index,
    explanation,
    svg_image,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{raw_question, ScriptedGenerator};

  #[test]
  fn ids_come_from_position() {
    let raw = vec![raw_question(2), raw_question(0), raw_question(3)];
    let qs = into_questions(raw).unwrap();
    assert_eq!(qs.iter().map(|q| q.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(qs[0].correct_answer_index, 2);
  }

  #[test]
  fn blank_svg_is_dropped() {
    let mut r = raw_question(0);
    r.svg_image = Some("  ".into());
    let qs = into_questions(vec![r]).unwrap();
    assert_eq!(qs[0].svg_image, None);

    let mut r = raw_question(0);
    r.svg_image = Some("<svg></svg>".into());
    let qs = into_questions(vec![r]).unwrap();
    assert_eq!(qs[0].svg_image.as_deref(), Some("<svg></svg>"));
  }

  #[test]
  fn malformed_records_reject_the_whole_set() {
    let mut three = raw_question(0);
    three.options = Some(vec!["a".into(), "b".into(), "c".into()]);
    assert!(matches!(
      into_questions(vec![raw_question(1), three]),
      Err(GenerationError::InvalidQuestion { index: 1, .. })
    ));

    let mut out_of_range = raw_question(0);
    out_of_range.correct_answer_index = Some(4);
    assert!(into_questions(vec![out_of_range]).is_err());

    let mut negative = raw_question(0);
    negative.correct_answer_index = Some(-1);
    assert!(into_questions(vec![negative]).is_err());

    let mut no_text = raw_question(0);
    no_text.question_text = None;
    assert!(into_questions(vec![no_text]).is_err());

    assert!(matches!(into_questions(vec![]), Err(GenerationError::NoQuestions)));
  }

  #[test]
  fn prompt_mentions_subject_and_count() {
    let req = build_request(&Prompts::default(), &GenerationCfg::default(), Subject::Vietnamese);
    assert!(req.prompt.contains("Tiếng Việt"));
    assert!(req.prompt.contains("20"));
    assert!(!req.prompt.contains("{subject}"));
  }

  #[tokio::test]
  async fn acquire_without_generator_fails() {
    let r = acquire::<ScriptedGenerator>(None, &Prompts::default(), &GenerationCfg::default(), Subject::Math).await;
    assert!(matches!(r, Err(GenerationError::NotConfigured)));
  }

  #[tokio::test]
  async fn acquire_passes_rendered_request_to_generator() {
    let gen = ScriptedGenerator::ok(5);
    let qs = acquire(Some(&gen), &Prompts::default(), &GenerationCfg::default(), Subject::Math).await.unwrap();
    assert_eq!(qs.len(), 5);
    let seen = gen.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].subject, Subject::Math);
    assert!((seen[0].temperature - 0.8).abs() < f32::EPSILON);
  }
}
