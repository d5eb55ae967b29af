//! Application state: the session model, question generator, history sync,
//! prompts and the device identity.
//!
//! This module owns:
//!   - the quiz session (screen + answers) and the local history, behind one lock
//!   - the optional question generator (Gemini)
//!   - the history sync over the optional result store (Supabase)
//!   - prompts and generation knobs (from TOML or defaults)
//!
//! The lock is only ever held for synchronous transitions, never across a
//! generator or store call.

use std::path::Path;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

use crate::config::{load_config_from_env, GenerationCfg, Prompts, QuizConfig};
use crate::device::get_or_create_device_id;
use crate::gemini::Gemini;
use crate::history::{History, HistorySync, ResultStore};
use crate::questions::QuestionGenerator;
use crate::session::QuizSession;
use crate::supabase::SupabaseStore;

/// Everything a screen is rendered from.
#[derive(Debug, Default)]
pub struct AppModel {
    pub session: QuizSession,
    pub history: History,
    /// Startup loads, imports and clears currently in flight.
    history_ops: usize,
}

impl AppModel {
    pub fn history_loading(&self) -> bool {
        self.history_ops > 0
    }

    pub fn begin_history_op(&mut self) {
        self.history_ops += 1;
    }

    pub fn end_history_op(&mut self) {
        self.history_ops = self.history_ops.saturating_sub(1);
    }
}

pub struct AppState<G, S> {
    model: Mutex<AppModel>,
    pub generator: Option<G>,
    pub history: HistorySync<S>,
    pub prompts: Prompts,
    pub generation: GenerationCfg,
    pub device_id: String,
}

/// Production wiring.
pub type LiveState = AppState<Gemini, SupabaseStore>;

impl LiveState {
    /// Build state from env: load config, resolve the device id, init Gemini and Supabase.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let cfg = load_config_from_env();
        let device_id = get_or_create_device_id(Path::new(&cfg.storage.device_id_path));

        let generator = Gemini::from_env();
        if let Some(g) = &generator {
            info!(target: "bevuihoc_backend", base_url = %g.base_url, model = %g.model, "Gemini enabled.");
        } else {
            info!(target: "bevuihoc_backend", "Gemini disabled (no GEMINI_API_KEY). Quiz generation will fail until configured.");
        }

        let store = SupabaseStore::from_env(&cfg.storage.results_table);
        if let Some(s) = &store {
            info!(target: "bevuihoc_backend", url = %s.url, table = %s.table, "Supabase enabled.");
        } else {
            info!(target: "bevuihoc_backend", "Supabase disabled (no SUPABASE_URL/SUPABASE_ANON_KEY). History is local only.");
        }

        Self::new(generator, store, cfg, device_id)
    }
}

impl<G: QuestionGenerator, S: ResultStore> AppState<G, S> {
    pub fn new(generator: Option<G>, store: Option<S>, cfg: QuizConfig, device_id: String) -> Self {
        info!(target: "bevuihoc_backend", %device_id, questions = cfg.generation.question_count, "Session state ready");
        Self {
            model: Mutex::new(AppModel::default()),
            generator,
            history: HistorySync::new(store),
            prompts: cfg.prompts,
            generation: cfg.generation,
            device_id,
        }
    }

    pub async fn model(&self) -> MutexGuard<'_, AppModel> {
        self.model.lock().await
    }

    /// Replace local history with the store's content. Runs once at startup;
    /// a no-op without a store.
    #[instrument(level = "info", skip(self))]
    pub async fn refresh_history(&self) {
        if !self.history.is_enabled() {
            return;
        }
        self.model().await.begin_history_op();
        let records = self.history.load_history(&self.device_id).await;
        let mut model = self.model().await;
        model.history.replace(records);
        model.end_history_op();
    }
}
