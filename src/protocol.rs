//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Each screen is rendered into one `SessionView`; keep these small and stable
//! so the frontend can evolve independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Question, QuizData, QuizResult, Subject, OPTION_COUNT};
use crate::history::History;
use crate::scoring::FeedbackTier;
use crate::session::Screen;
use crate::state::AppModel;

/// How many results the home screen previews.
pub const RECENT_ON_HOME: usize = 3;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetState,
    StartQuiz {
        subject: Subject,
    },
    SelectAnswer {
        #[serde(rename = "questionIndex")]
        question_index: usize,
        #[serde(rename = "optionIndex")]
        option_index: usize,
    },
    Submit,
    ExitQuiz {
        #[serde(default)]
        confirmed: bool,
    },
    NewQuiz,
    GoHome,
    OpenHistory,
    ExportHistory,
    ImportHistory {
        #[serde(default)]
        confirmed: bool,
        records: Value,
    },
    ClearHistory {
        #[serde(default)]
        confirmed: bool,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State { state: SessionView },
    Export { filename: String, content: String },
    Import { outcome: ImportOut },
    Clear { outcome: ClearOut },
    Error { message: String },
}

/// What the current screen needs to render.
#[derive(Debug, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum SessionView {
    #[serde(rename_all = "camelCase")]
    Home {
        error: Option<String>,
        store_enabled: bool,
        history_loading: bool,
        recent: Vec<QuizResult>,
        history_count: usize,
    },
    Generating {
        subject: Subject,
    },
    #[serde(rename_all = "camelCase")]
    Taking {
        quiz: QuizOut,
        /// -1 marks an unanswered question.
        answers: Vec<i64>,
        answered_count: usize,
        can_submit: bool,
    },
    Result {
        result: QuizResult,
        feedback: FeedbackOut,
        review: Vec<ReviewItem>,
    },
    #[serde(rename_all = "camelCase")]
    History {
        records: Vec<QuizResult>,
        store_enabled: bool,
        history_loading: bool,
    },
}

/// Quiz as shown while answering: no correct answers, no explanations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOut {
    pub id: String,
    pub subject: Subject,
    pub created_at: i64,
    pub questions: Vec<QuestionOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: u32,
    pub question_text: String,
    pub options: [String; OPTION_COUNT],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackOut {
    pub tier: FeedbackTier,
    pub message: &'static str,
    pub color: &'static str,
}

/// One reviewed question on the result screen.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub question: Question,
    pub user_answer: i64,
    pub correct: bool,
}

fn quiz_out(q: &QuizData) -> QuizOut {
    QuizOut {
        id: q.id.clone(),
        subject: q.subject,
        created_at: q.created_at,
        questions: q
            .questions
            .iter()
            .map(|q| QuestionOut {
                id: q.id,
                question_text: q.question_text.clone(),
                options: q.options.clone(),
                svg_image: q.svg_image.clone(),
            })
            .collect(),
    }
}

/// Render the current screen of `model`.
pub fn render(model: &AppModel, store_enabled: bool) -> SessionView {
    let history: &History = &model.history;
    match model.session.screen() {
        Screen::Home => SessionView::Home {
            error: model.session.error().map(str::to_string),
            store_enabled,
            history_loading: model.history_loading(),
            recent: history.recent(RECENT_ON_HOME).to_vec(),
            history_count: history.len(),
        },
        Screen::Generating { subject, .. } => SessionView::Generating { subject: *subject },
        Screen::Taking { quiz, answers } => SessionView::Taking {
            quiz: quiz_out(quiz),
            answers: answers.to_wire(),
            answered_count: answers.answered_count(),
            can_submit: answers.is_complete(),
        },
        Screen::Result { quiz, answers, result } => {
            let tier = FeedbackTier::for_score(result.score);
            let wire = answers.to_wire();
            SessionView::Result {
                result: result.clone(),
                feedback: FeedbackOut { tier, message: tier.message(), color: tier.color() },
                review: quiz
                    .questions
                    .iter()
                    .zip(wire)
                    .map(|(q, a)| ReviewItem {
                        question: q.clone(),
                        user_answer: a,
                        correct: a == q.correct_answer_index as i64,
                    })
                    .collect(),
            }
        }
        Screen::History => SessionView::History {
            records: history.records().to_vec(),
            store_enabled,
            history_loading: model.history_loading(),
        },
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct StartQuizIn {
    pub subject: Subject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub question_index: usize,
    pub option_index: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmIn {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportIn {
    #[serde(default)]
    pub confirmed: bool,
    pub records: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOut {
    /// Payload is valid; ask the user before syncing `count` results.
    NeedsConfirmation { count: usize },
    Disabled { message: &'static str },
    Imported { inserted: usize, state: SessionView },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClearOut {
    NeedsConfirmation,
    Disabled { message: &'static str },
    Cleared { state: SessionView },
}

#[derive(Debug, Serialize)]
pub struct ExportOut {
    pub filename: String,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub generator_enabled: bool,
    pub store_enabled: bool,
}
