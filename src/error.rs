use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Which kind of database constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl ConstraintKind {
    /// Maps a Postgres SQLSTATE from the integrity-constraint class (23xxx).
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23505" => Some(Self::Unique),
            "23503" => Some(Self::ForeignKey),
            "23502" => Some(Self::NotNull),
            "23514" => Some(Self::Check),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::NotNull => "not null",
            Self::Check => "check",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{entity}.{field}: {message}")]
    Validation {
        entity: &'static str,
        field: &'static str,
        message: String,
    },
    #[error("{entity}: {kind} constraint `{constraint}` violated")]
    ConstraintViolation {
        entity: &'static str,
        constraint: String,
        kind: ConstraintKind,
    },
    #[error("{entity}: {message}")]
    ReferentialInconsistency {
        entity: &'static str,
        message: String,
    },
    #[error("{entity}: cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("recipe {recipe_id} is referenced by history or meal plans; its composition and servings are frozen")]
    RecipeInUse { recipe_id: Uuid },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("AI call failed (logged as {log_id}): {message}")]
    AiCall { log_id: Uuid, message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    pub fn validation(entity: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            field,
            message: message.into(),
        }
    }

    pub fn inconsistent(entity: &'static str, message: impl Into<String>) -> Self {
        Self::ReferentialInconsistency {
            entity,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Converts a sqlx error, lifting integrity violations into `ConstraintViolation` with context.
    pub fn from_sqlx(entity: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(kind) = db.code().as_deref().and_then(ConstraintKind::from_sqlstate) {
                return Self::ConstraintViolation {
                    entity,
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                    kind,
                };
            }
        }
        Self::Database(err)
    }

    /// True for failures the caller may simply retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AiCall { .. })
    }
}

/// `map_err` adapter: `.map_err(db_err("user"))`.
pub fn db_err(entity: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |e| DataError::from_sqlx(entity, e)
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn sqlstate_mapping_covers_integrity_class() {
        assert_eq!(ConstraintKind::from_sqlstate("23505"), Some(ConstraintKind::Unique));
        assert_eq!(ConstraintKind::from_sqlstate("23503"), Some(ConstraintKind::ForeignKey));
        assert_eq!(ConstraintKind::from_sqlstate("23502"), Some(ConstraintKind::NotNull));
        assert_eq!(ConstraintKind::from_sqlstate("23514"), Some(ConstraintKind::Check));
        assert_eq!(ConstraintKind::from_sqlstate("40001"), None);
    }

    #[test]
    fn non_database_errors_stay_database_errors() {
        let err = DataError::from_sqlx("user", sqlx::Error::RowNotFound);
        assert!(matches!(err, DataError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn messages_carry_entity_and_field() {
        let err = DataError::validation("meal_plan", "end_date", "before start_date");
        assert_eq!(err.to_string(), "meal_plan.end_date: before start_date");

        let err = DataError::ConstraintViolation {
            entity: "user",
            constraint: "users_device_id_key".into(),
            kind: ConstraintKind::Unique,
        };
        assert_eq!(
            err.to_string(),
            "user: unique constraint `users_device_id_key` violated"
        );
    }

    #[test]
    fn only_ai_failures_are_recoverable() {
        let ai = DataError::AiCall {
            log_id: Uuid::new_v4(),
            message: "timeout".into(),
        };
        assert!(ai.is_recoverable());
        assert!(!DataError::not_found("recipe", Uuid::nil()).is_recoverable());
    }
}
