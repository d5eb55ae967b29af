//! Result store backed by a Supabase table, reached through its PostgREST API.
//!
//! Only three calls are needed: insert a row, select all rows for a device
//! (newest first) and delete all rows for a device.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::history::{ResultRow, ResultStore};
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct SupabaseStore {
  pub client: reqwest::Client,
  pub url: String,
  pub anon_key: String,
  pub table: String,
}

impl SupabaseStore {
  /// Construct the store only when SUPABASE_URL and SUPABASE_ANON_KEY are both non-empty.
  pub fn from_env(table: &str) -> Option<Self> {
    let url = std::env::var("SUPABASE_URL").ok().filter(|s| !s.trim().is_empty())?;
    let anon_key = std::env::var("SUPABASE_ANON_KEY").ok().filter(|s| !s.trim().is_empty())?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, url: url.trim_end_matches('/').to_string(), anon_key, table: table.to_string() })
  }

  fn table_url(&self) -> String {
    format!("{}/rest/v1/{}", self.url, self.table)
  }

  fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
    self.client.request(method, url)
      .header(USER_AGENT, "bevuihoc-backend/0.1")
      .header("apikey", &self.anon_key)
      .header(AUTHORIZATION, format!("Bearer {}", self.anon_key))
  }
}

/// PostgREST filter value for an exact match on `user_id`.
fn eq_filter(device_id: &str) -> String {
  format!("eq.{}", device_id)
}

/// Turn a non-2xx response into a `StoreError`, keeping PostgREST's message when present.
async fn check(res: reqwest::Response) -> Result<reqwest::Response, StoreError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  let message = extract_postgrest_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
  Err(StoreError::Http { status, message })
}

fn extract_postgrest_error(body: &str) -> Option<String> {
  #[derive(serde::Deserialize)]
  struct PgError { message: String }
  serde_json::from_str::<PgError>(body).ok().map(|e| e.message)
}

impl ResultStore for SupabaseStore {
  #[instrument(level = "debug", skip(self, row), fields(quiz_id = %row.quiz_id))]
  async fn insert(&self, row: &ResultRow) -> Result<(), StoreError> {
    let res = self.request(reqwest::Method::POST, &self.table_url())
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=minimal")
      .json(row)
      .send().await?;
    check(res).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn select_all(&self, device_id: &str) -> Result<Vec<ResultRow>, StoreError> {
    let res = self.request(reqwest::Method::GET, &self.table_url())
      .query(&[("select", "*".to_string()), ("user_id", eq_filter(device_id)), ("order", "created_at.desc".to_string())])
      .send().await?;
    let rows: Vec<ResultRow> = check(res).await?.json().await?;
    debug!(target: "history", count = rows.len(), "Rows fetched");
    Ok(rows)
  }

  #[instrument(level = "debug", skip(self))]
  async fn delete_all(&self, device_id: &str) -> Result<(), StoreError> {
    let res = self.request(reqwest::Method::DELETE, &self.table_url())
      .query(&[("user_id", eq_filter(device_id))])
      .send().await?;
    check(res).await?;
    Ok(())
  }
}
