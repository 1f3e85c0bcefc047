use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// One row per advisor run, success or failure, keyed by the portfolio
/// slot. The raw LLM response is kept for diagnostics.
pub async fn record_success(
    pool: &sqlx::PgPool,
    slot_key: &str,
    query: &str,
    provider: &str,
    summary: &str,
    suggestion_count: i32,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO suggestion_runs (id, slot_key, query, provider, status, summary, suggestion_count, error, raw_llm_response, generated_at) \
         VALUES ($1, $2, $3, $4, 'success', $5, $6, NULL, $7, $8)",
    )
    .persistent(false)
    .bind(id)
    .bind(slot_key)
    .bind(query)
    .bind(provider)
    .bind(summary)
    .bind(suggestion_count)
    .bind(raw_llm_response)
    .bind(generated_at)
    .execute(pool)
    .await
    .context("insert success suggestion_runs failed")?;

    Ok(id)
}

pub async fn record_failure(
    pool: &sqlx::PgPool,
    slot_key: &str,
    query: &str,
    provider: &str,
    error: &str,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO suggestion_runs (id, slot_key, query, provider, status, summary, suggestion_count, error, raw_llm_response, generated_at) \
         VALUES ($1, $2, $3, $4, 'error', NULL, NULL, $5, $6, $7)",
    )
    .persistent(false)
    .bind(id)
    .bind(slot_key)
    .bind(query)
    .bind(provider)
    .bind(error)
    .bind(raw_llm_response)
    .bind(generated_at)
    .execute(pool)
    .await
    .context("insert error suggestion_runs failed")?;

    Ok(id)
}
