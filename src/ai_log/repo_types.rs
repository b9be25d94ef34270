use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::Audit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ai_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AiRequestStatus {
    #[default]
    Success,
    Error,
}

/// One external AI call: cost tracking and response cache in one row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiRequestLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt_hash: String,
    pub prompt: String,
    pub response: Option<String>,
    pub model_used: String,
    pub tokens_used: Option<i32>,
    /// Smallest currency unit.
    pub cost: Option<i32>,
    pub request_type: Option<String>,
    pub status: AiRequestStatus,
    pub error_message: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

impl AiRequestLog {
    /// Only successful calls with a stored response can answer a later request.
    pub fn is_cacheable(&self) -> bool {
        self.status == AiRequestStatus::Success && self.response.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewAiRequestLog {
    pub user_id: Uuid,
    pub prompt_hash: String,
    pub prompt: String,
    pub response: Option<String>,
    pub model_used: String,
    pub tokens_used: Option<i32>,
    pub cost: Option<i32>,
    pub request_type: Option<String>,
    pub status: AiRequestStatus,
    pub error_message: Option<String>,
}

/// Aggregated spend of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct AiUsage {
    pub calls: i64,
    pub failed_calls: i64,
    pub tokens_used: i64,
    pub cost: i64,
}
