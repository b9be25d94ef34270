use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo_types::{AiRequestLog, AiRequestStatus, AiUsage, NewAiRequestLog};
use crate::config::AiCacheScope;
use crate::error::{db_err, DataError, DataResult};

const COLUMNS: &str = "id, user_id, prompt_hash, prompt, response, model_used, tokens_used, \
                       cost, request_type, status, error_message, created_at, updated_at";

pub(crate) fn validate(new: &NewAiRequestLog) -> DataResult<()> {
    if new.prompt_hash.len() != 64 || !new.prompt_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DataError::validation(
            "ai_request_log",
            "prompt_hash",
            "must be 64 hex characters",
        ));
    }
    let model = new.model_used.trim();
    if model.is_empty() || model.chars().count() > 50 {
        return Err(DataError::validation(
            "ai_request_log",
            "model_used",
            "must be 1 to 50 characters",
        ));
    }
    if new.tokens_used.is_some_and(|t| t < 0) || new.cost.is_some_and(|c| c < 0) {
        return Err(DataError::validation(
            "ai_request_log",
            "cost",
            "tokens and cost cannot be negative",
        ));
    }
    match new.status {
        AiRequestStatus::Success if new.response.is_none() => Err(DataError::validation(
            "ai_request_log",
            "response",
            "a successful call must store its response",
        )),
        AiRequestStatus::Error if new.error_message.is_none() => Err(DataError::validation(
            "ai_request_log",
            "error_message",
            "a failed call must store its error",
        )),
        _ => Ok(()),
    }
}

#[instrument(skip(db, new), fields(user_id = %new.user_id, status = ?new.status))]
pub async fn record(db: &PgPool, new: NewAiRequestLog) -> DataResult<AiRequestLog> {
    validate(&new)?;
    let sql = format!(
        "INSERT INTO ai_request_logs (id, user_id, prompt_hash, prompt, response, model_used, \
                                      tokens_used, cost, request_type, status, error_message) \
         VALUES ($1, $2, lower($3), $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, AiRequestLog>(&sql)
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.prompt_hash)
        .bind(new.prompt)
        .bind(new.response)
        .bind(new.model_used.trim())
        .bind(new.tokens_used)
        .bind(new.cost)
        .bind(new.request_type)
        .bind(new.status)
        .bind(new.error_message)
        .fetch_one(db)
        .await
        .map_err(db_err("ai_request_log"))?;
    debug!(log_id = %row.id, "AI request logged");
    Ok(row)
}

pub async fn get(db: &PgPool, log_id: Uuid) -> DataResult<AiRequestLog> {
    let sql = format!("SELECT {COLUMNS} FROM ai_request_logs WHERE id = $1");
    sqlx::query_as::<_, AiRequestLog>(&sql)
        .bind(log_id)
        .fetch_optional(db)
        .await
        .map_err(db_err("ai_request_log"))?
        .ok_or_else(|| DataError::not_found("ai_request_log", log_id))
}

/// Most recent successful call with this hash, within `scope`.
#[instrument(skip(db))]
pub async fn find_success(
    db: &PgPool,
    user_id: Uuid,
    prompt_hash: &str,
    scope: AiCacheScope,
) -> DataResult<Option<AiRequestLog>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM ai_request_logs \
          WHERE prompt_hash = lower($1) AND status = $2 AND response IS NOT NULL \
            AND ($3 OR user_id = $4) \
          ORDER BY created_at DESC \
          LIMIT 1"
    );
    sqlx::query_as::<_, AiRequestLog>(&sql)
        .bind(prompt_hash)
        .bind(AiRequestStatus::Success)
        .bind(scope == AiCacheScope::Global)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(db_err("ai_request_log"))
}

pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> DataResult<Vec<AiRequestLog>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM ai_request_logs \
          WHERE user_id = $1 \
          ORDER BY created_at DESC \
          LIMIT $2 OFFSET $3"
    );
    sqlx::query_as::<_, AiRequestLog>(&sql)
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(db)
        .await
        .map_err(db_err("ai_request_log"))
}

pub async fn usage_for_user(db: &PgPool, user_id: Uuid) -> DataResult<AiUsage> {
    sqlx::query_as::<_, AiUsage>(
        r#"
        SELECT COUNT(*)                                          AS calls,
               COUNT(*) FILTER (WHERE status = 'error')          AS failed_calls,
               COALESCE(SUM(tokens_used), 0)::BIGINT             AS tokens_used,
               COALESCE(SUM(cost), 0)::BIGINT                    AS cost
          FROM ai_request_logs
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await
    .map_err(db_err("ai_request_log"))
}
