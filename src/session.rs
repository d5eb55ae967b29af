//! Quiz session state machine.
//!
//! Screens: Home → Generating → Taking → Result, plus History off Home.
//! Transitions are synchronous; the caller performs the generator call between
//! `begin_generation` and `complete_generation`, tagging it with the returned
//! token so an abandoned request can never overwrite a newer screen.

use tracing::{debug, info, warn};

use crate::domain::{AnswerSet, Question, QuizData, QuizResult, Subject, OPTION_COUNT};
use crate::error::{GenerationError, SessionError};
use crate::scoring::{count_correct, score};

pub const GENERATION_FAILED_MESSAGE: &str = "Có lỗi xảy ra khi tạo đề. Bé hãy thử lại nhé!";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    Home,
    Generating {
        subject: Subject,
        token: u64,
    },
    Taking {
        quiz: QuizData,
        answers: AnswerSet,
    },
    Result {
        quiz: QuizData,
        answers: AnswerSet,
        result: QuizResult,
    },
    History,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Home => "home",
            Screen::Generating { .. } => "generating",
            Screen::Taking { .. } => "taking",
            Screen::Result { .. } => "result",
            Screen::History => "history",
        }
    }
}

/// What happened to a finished generator call.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Quiz built; session is now `Taking`.
    Started,
    /// Generation failed; session is back on `Home` with an error message.
    Failed,
    /// The request was abandoned or superseded; nothing changed.
    Stale,
}

#[derive(Debug)]
pub struct QuizSession {
    screen: Screen,
    error: Option<String>,
    last_token: u64,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizSession {
    pub fn new() -> Self {
        Self { screen: Screen::Home, error: None, last_token: 0 }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// User-visible message left by the last failed generation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn wrong_screen(&self) -> SessionError {
        SessionError::WrongScreen { current: self.screen.name() }
    }

    fn start_generating(&mut self, subject: Subject) -> u64 {
        self.last_token += 1;
        let token = self.last_token;
        self.error = None;
        self.screen = Screen::Generating { subject, token };
        info!(target: "quiz", %subject, token, "Generation requested");
        token
    }

    /// Home → Generating for `subject`. Returns the generation token.
    pub fn begin_generation(&mut self, subject: Subject) -> Result<u64, SessionError> {
        match self.screen {
            Screen::Home => Ok(self.start_generating(subject)),
            _ => Err(self.wrong_screen()),
        }
    }

    /// Result → Generating with the subject of the finished quiz.
    pub fn generate_again(&mut self) -> Result<(Subject, u64), SessionError> {
        let subject = match &self.screen {
            Screen::Result { quiz, .. } => quiz.subject,
            _ => return Err(self.wrong_screen()),
        };
        Ok((subject, self.start_generating(subject)))
    }

    /// Apply the outcome of the generator call tagged `token`.
    pub fn complete_generation(
        &mut self,
        token: u64,
        outcome: Result<Vec<Question>, GenerationError>,
        now_ms: i64,
    ) -> Completion {
        let subject = match self.screen {
            Screen::Generating { subject, token: active } if active == token => subject,
            _ => {
                debug!(target: "quiz", token, screen = self.screen.name(), "Discarding stale generation result");
                return Completion::Stale;
            }
        };

        match outcome {
            Ok(questions) => {
                let quiz = QuizData::new(subject, questions, now_ms);
                let answers = AnswerSet::unanswered(quiz.len());
                info!(target: "quiz", %subject, quiz_id = %quiz.id, questions = quiz.len(), "Quiz ready");
                self.screen = Screen::Taking { quiz, answers };
                Completion::Started
            }
            Err(e) => {
                warn!(target: "quiz", %subject, error = %e, "Generation failed; back to home");
                self.error = Some(GENERATION_FAILED_MESSAGE.to_string());
                self.screen = Screen::Home;
                Completion::Failed
            }
        }
    }

    /// Record `option` for question `index` (0-based) while taking a quiz.
    pub fn select_answer(&mut self, index: usize, option: usize) -> Result<(), SessionError> {
        let current = self.screen.name();
        let Screen::Taking { answers, .. } = &mut self.screen else {
            return Err(SessionError::WrongScreen { current });
        };
        if index >= answers.len() {
            return Err(SessionError::QuestionOutOfRange { index, len: answers.len() });
        }
        if option >= OPTION_COUNT {
            return Err(SessionError::OptionOutOfRange { index: option });
        }
        answers.select(index, option);
        Ok(())
    }

    /// Taking → Result. Rejected without any change while a question is unanswered.
    pub fn submit(&mut self, now_ms: i64) -> Result<QuizResult, SessionError> {
        let result = match &self.screen {
            Screen::Taking { quiz, answers } => grade(quiz, answers, now_ms)?,
            _ => return Err(self.wrong_screen()),
        };
        info!(target: "quiz", quiz_id = %result.quiz_id, total = result.total_questions, score = result.score, "Quiz submitted");

        if let Screen::Taking { quiz, answers } = std::mem::replace(&mut self.screen, Screen::Home) {
            self.screen = Screen::Result { quiz, answers, result: result.clone() };
        }
        Ok(result)
    }

    /// Taking → Home, discarding the quiz. Needs the user's confirmation.
    pub fn exit_quiz(&mut self, confirmed: bool) -> Result<(), SessionError> {
        if !matches!(self.screen, Screen::Taking { .. }) {
            return Err(self.wrong_screen());
        }
        if !confirmed {
            return Err(SessionError::NotConfirmed);
        }
        self.screen = Screen::Home;
        Ok(())
    }

    /// Back to Home from Generating (abandons the request), Result or History.
    pub fn return_home(&mut self) -> Result<(), SessionError> {
        match self.screen {
            Screen::Home => Ok(()),
            Screen::Generating { .. } | Screen::Result { .. } | Screen::History => {
                self.screen = Screen::Home;
                Ok(())
            }
            Screen::Taking { .. } => Err(self.wrong_screen()),
        }
    }

    /// Import and clear are offered on Home and History only.
    pub fn check_history_action(&self) -> Result<(), SessionError> {
        match self.screen {
            Screen::Home | Screen::History => Ok(()),
            _ => Err(self.wrong_screen()),
        }
    }

    pub fn open_history(&mut self) -> Result<(), SessionError> {
        match self.screen {
            Screen::Home => {
                self.screen = Screen::History;
                Ok(())
            }
            _ => Err(self.wrong_screen()),
        }
    }
}

/// Score a completed answer set against its quiz.
fn grade(quiz: &QuizData, answers: &AnswerSet, now_ms: i64) -> Result<QuizResult, SessionError> {
    let user_answers = answers.freeze().ok_or(SessionError::Incomplete {
        unanswered: answers.len() - answers.answered_count(),
    })?;
    let total = quiz.len();
    let correct = count_correct(&quiz.questions, answers);
    Ok(QuizResult {
        quiz_id: quiz.id.clone(),
        subject: quiz.subject,
        score: score(correct, total),
        total_questions: total as u32,
        date: now_ms,
        user_answers,
    })
}
