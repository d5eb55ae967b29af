//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{info, error, instrument, debug};

use crate::error::ApiError;
use crate::history::ResultStore;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage, SessionView};
use crate::questions::QuestionGenerator;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade<G: QuestionGenerator, S: ResultStore>(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState<G, S>>>,
) -> impl IntoResponse {
  info!(target: "bevuihoc_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws<G: QuestionGenerator, S: ResultStore>(mut socket: WebSocket, state: Arc<AppState<G, S>>) {
  info!(target: "bevuihoc_backend", "WebSocket connected");
  // Replies from long-running operations arrive here so the read side never blocks on them.
  let (tx, mut rx) = mpsc::unbounded_channel::<ServerWsMessage>();

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "bevuihoc_backend", "WS received: {:?}", &incoming);
              dispatch(incoming, &state, &tx).await;
            }
            Err(e) => {
              let _ = tx.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) });
            }
          },
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(reply) = rx.recv() => {
        let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "bevuihoc_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "bevuihoc_backend", "WebSocket disconnected");
}

/// Generation, import and clear wait on remote calls.
fn is_long_running(msg: &ClientWsMessage) -> bool {
  matches!(
    msg,
    ClientWsMessage::StartQuiz { .. }
      | ClientWsMessage::NewQuiz
      | ClientWsMessage::ImportHistory { .. }
      | ClientWsMessage::ClearHistory { .. }
  )
}

/// Answer quick messages in order; run long ones in their own task and
/// deliver the reply through `tx` when it is ready.
async fn dispatch<G: QuestionGenerator, S: ResultStore>(
  msg: ClientWsMessage,
  state: &Arc<AppState<G, S>>,
  tx: &mpsc::UnboundedSender<ServerWsMessage>,
) {
  if is_long_running(&msg) {
    let state = state.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
      let reply = handle_client_ws(msg, &state).await;
      let _ = tx.send(reply);
    });
  } else {
    let _ = tx.send(handle_client_ws(msg, state).await);
  }
}

fn state_or_error<E: Into<ApiError>>(r: Result<SessionView, E>) -> ServerWsMessage {
  match r {
    Ok(state) => ServerWsMessage::State { state },
    Err(e) => ServerWsMessage::Error { message: e.into().to_string() },
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws<G: QuestionGenerator, S: ResultStore>(
  msg: ClientWsMessage,
  state: &Arc<AppState<G, S>>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetState => ServerWsMessage::State { state: logic::current_view(state).await },

    ClientWsMessage::StartQuiz { subject } => {
      let r = logic::start_quiz(state, subject).await;
      info!(target: "quiz", %subject, ok = r.is_ok(), "WS start_quiz handled");
      state_or_error(r)
    }

    ClientWsMessage::SelectAnswer { question_index, option_index } =>
      state_or_error(logic::select_answer(state, question_index, option_index).await),

    ClientWsMessage::Submit => state_or_error(logic::submit(state).await),

    ClientWsMessage::ExitQuiz { confirmed } => state_or_error(logic::exit_quiz(state, confirmed).await),

    ClientWsMessage::NewQuiz => state_or_error(logic::new_quiz_same_subject(state).await),

    ClientWsMessage::GoHome => state_or_error(logic::go_home(state).await),

    ClientWsMessage::OpenHistory => state_or_error(logic::open_history(state).await),

    ClientWsMessage::ExportHistory => match logic::export(state).await {
      Ok(out) => ServerWsMessage::Export { filename: out.filename, content: out.content },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::ImportHistory { confirmed, records } => match logic::import(state, confirmed, records).await {
      Ok(outcome) => ServerWsMessage::Import { outcome },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::ClearHistory { confirmed } => match logic::clear(state, confirmed).await {
      Ok(outcome) => ServerWsMessage::Clear { outcome },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },
  }
}
