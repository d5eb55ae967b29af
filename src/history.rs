//! Result history and its synchronization with the remote result store.
//!
//! Policy is optimistic: local history changes first, the remote write follows
//! in a detached task and its failure is only logged. Import and clear are the
//! exceptions; they are awaited and their failures reach the user.
//!
//! Without a configured store every remote operation is a silent no-op and the
//! app runs in local-only mode.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, instrument, warn};

use crate::domain::{QuizResult, Subject, OPTION_COUNT};
use crate::error::{StoreError, ValidationError};

/// Row shape of the remote `quiz_results` table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRow {
    pub user_id: String,
    pub quiz_id: String,
    pub subject: Subject,
    pub score: u32,
    pub total_questions: u32,
    pub user_answers: Vec<usize>,
    pub created_at: DateTime<Utc>,
}

impl ResultRow {
    pub fn from_result(result: &QuizResult, device_id: &str) -> Self {
        let created_at = Utc
            .timestamp_millis_opt(result.date)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            user_id: device_id.to_string(),
            quiz_id: result.quiz_id.clone(),
            subject: result.subject,
            score: result.score,
            total_questions: result.total_questions,
            user_answers: result.user_answers.clone(),
            created_at,
        }
    }

    pub fn into_result(self) -> QuizResult {
        QuizResult {
            quiz_id: self.quiz_id,
            subject: self.subject,
            score: self.score,
            total_questions: self.total_questions,
            date: self.created_at.timestamp_millis(),
            user_answers: self.user_answers,
        }
    }
}

/// Remote store partitioned by device id.
pub trait ResultStore: Send + Sync + 'static {
    fn insert(&self, row: &ResultRow) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All rows for `device_id`, newest `created_at` first.
    fn select_all(&self, device_id: &str) -> impl Future<Output = Result<Vec<ResultRow>, StoreError>> + Send;

    fn delete_all(&self, device_id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Local newest-first history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    records: Vec<QuizResult>,
}

impl History {
    pub fn records(&self) -> &[QuizResult] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn prepend(&mut self, result: QuizResult) {
        self.records.insert(0, result);
    }

    pub fn replace(&mut self, records: Vec<QuizResult>) {
        self.records = records;
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The `n` most recent results.
    pub fn recent(&self, n: usize) -> &[QuizResult] {
        &self.records[..n.min(self.records.len())]
    }
}

/// Outcome of an awaited bulk import.
#[derive(Debug)]
pub struct ImportReport {
    pub requested: usize,
    pub inserted: usize,
    pub failed: usize,
    /// Store contents after the import, or why they could not be read back.
    pub reloaded: Result<Vec<QuizResult>, StoreError>,
}

pub struct HistorySync<S> {
    store: Option<Arc<S>>,
}

impl<S: ResultStore> HistorySync<S> {
    pub fn new(store: Option<S>) -> Self {
        Self { store: store.map(Arc::new) }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Read every result for `device_id` from the store, newest first.
    async fn fetch(store: &S, device_id: &str) -> Result<Vec<QuizResult>, StoreError> {
        let rows = store.select_all(device_id).await?;
        Ok(rows.into_iter().map(ResultRow::into_result).collect())
    }

    /// Startup load. Never fails: store errors are logged and yield an empty list.
    #[instrument(level = "info", skip(self), fields(enabled = self.is_enabled()))]
    pub async fn load_history(&self, device_id: &str) -> Vec<QuizResult> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match Self::fetch(store, device_id).await {
            Ok(records) => {
                info!(target: "history", count = records.len(), "History loaded");
                records
            }
            Err(e) => {
                error!(target: "history", error = %e, "History load failed; showing empty history");
                Vec::new()
            }
        }
    }

    /// Prepend `result` locally, then persist it in a detached task.
    /// The returned handle may be dropped; failures are logged only.
    pub fn record_result(
        &self,
        history: &mut History,
        result: QuizResult,
        device_id: &str,
    ) -> Option<JoinHandle<()>> {
        let row = ResultRow::from_result(&result, device_id);
        history.prepend(result);

        let store = self.store.clone()?;
        Some(tokio::spawn(async move {
            match store.insert(&row).await {
                Ok(()) => info!(target: "history", quiz_id = %row.quiz_id, "Result saved to store"),
                Err(e) => error!(target: "history", quiz_id = %row.quiz_id, error = %e, "Saving result failed; kept locally only"),
            }
        }))
    }

    /// Insert every record concurrently, wait for all of them to settle, then
    /// read the authoritative history back. `None` when no store is configured.
    #[instrument(level = "info", skip(self, records), fields(count = records.len()))]
    pub async fn import_records(&self, records: Vec<QuizResult>, device_id: &str) -> Option<ImportReport> {
        let store = self.store.clone()?;
        let requested = records.len();

        let mut tasks = JoinSet::new();
        for r in &records {
            let row = ResultRow::from_result(r, device_id);
            let store = store.clone();
            tasks.spawn(async move { store.insert(&row).await });
        }

        let mut inserted = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => inserted += 1,
                Ok(Err(e)) => warn!(target: "history", error = %e, "Import insert failed"),
                Err(e) => warn!(target: "history", error = %e, "Import insert task aborted"),
            }
        }
        let failed = requested - inserted;
        info!(target: "history", requested, inserted, failed, "Import inserts settled; reloading");

        let reloaded = Self::fetch(&store, device_id).await;
        if let Err(e) = &reloaded {
            error!(target: "history", error = %e, "Reload after import failed");
        }
        Some(ImportReport { requested, inserted, failed, reloaded })
    }

    /// Delete every remote result for the device. `None` when no store is configured.
    #[instrument(level = "info", skip(self))]
    pub async fn clear(&self, device_id: &str) -> Option<Result<(), StoreError>> {
        let store = self.store.as_ref()?;
        let res = store.delete_all(device_id).await;
        match &res {
            Ok(()) => info!(target: "history", "Remote history cleared"),
            Err(e) => error!(target: "history", error = %e, "Clearing remote history failed"),
        }
        Some(res)
    }
}

/// Pretty-printed, order-preserving JSON array of results.
pub fn export_history(records: &[QuizResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

/// Parse import file contents.
pub fn parse_import_str(s: &str) -> Result<Vec<QuizResult>, ValidationError> {
    let value: Value = serde_json::from_str(s).map_err(|e| ValidationError::Json(e.to_string()))?;
    parse_import(value)
}

/// Validate an import payload: a JSON array whose every element is a result.
/// One bad element rejects the whole payload.
pub fn parse_import(value: Value) -> Result<Vec<QuizResult>, ValidationError> {
    let Value::Array(items) = value else {
        return Err(ValidationError::NotAnArray);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let r: QuizResult = serde_json::from_value(item)
                .map_err(|e| ValidationError::Record { index, reason: e.to_string() })?;
            check_result(&r).map_err(|reason| ValidationError::Record { index, reason })?;
            Ok(r)
        })
        .collect()
}

fn check_result(r: &QuizResult) -> Result<(), String> {
    if r.score > 100 {
        return Err(format!("score {} exceeds 100", r.score));
    }
    if r.total_questions == 0 {
        return Err("totalQuestions must be positive".into());
    }
    if r.user_answers.len() != r.total_questions as usize {
        return Err(format!(
            "{} answers for {} questions",
            r.user_answers.len(),
            r.total_questions
        ));
    }
    if let Some(a) = r.user_answers.iter().find(|a| **a >= OPTION_COUNT) {
        return Err(format!("answer index {} out of range", a));
    }
    Ok(())
}
