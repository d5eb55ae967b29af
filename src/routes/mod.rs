//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::history::ResultStore;
use crate::questions::QuestionGenerator;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router<G: QuestionGenerator, S: ResultStore>(state: Arc<AppState<G, S>>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade::<G, S>))
        // Session
        .route("/api/v1/health", get(http::http_health::<G, S>))
        .route("/api/v1/state", get(http::http_get_state::<G, S>))
        .route("/api/v1/quiz", post(http::http_start_quiz::<G, S>))
        .route("/api/v1/quiz/answer", post(http::http_select_answer::<G, S>))
        .route("/api/v1/quiz/submit", post(http::http_submit::<G, S>))
        .route("/api/v1/quiz/exit", post(http::http_exit_quiz::<G, S>))
        .route("/api/v1/quiz/again", post(http::http_new_quiz::<G, S>))
        .route("/api/v1/home", post(http::http_go_home::<G, S>))
        // History
        .route("/api/v1/history/open", post(http::http_open_history::<G, S>))
        .route("/api/v1/history/export", get(http::http_export_history::<G, S>))
        .route("/api/v1/history/import", post(http::http_import_history::<G, S>))
        .route("/api/v1/history/clear", post(http::http_clear_history::<G, S>))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
