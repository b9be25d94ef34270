//! What a user has cooked, and how it went.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::common::Audit;
use crate::error::{db_err, DataError, DataResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecipeHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipe_id: Uuid,
    pub cooked_on: OffsetDateTime,
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub servings_made: Option<i32>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookedRecipe {
    pub recipe_id: Uuid,
    pub cooked_on: Option<OffsetDateTime>,
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub servings_made: Option<i32>,
}

impl CookedRecipe {
    fn validate(&self) -> DataResult<()> {
        if self.rating.is_some_and(|r| !(1..=5).contains(&r)) {
            return Err(DataError::validation(
                "user_recipe_history",
                "rating",
                "must be between 1 and 5",
            ));
        }
        if self.servings_made.is_some_and(|s| s < 1) {
            return Err(DataError::validation(
                "user_recipe_history",
                "servings_made",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[instrument(skip(db, cooked), fields(recipe_id = %cooked.recipe_id))]
pub async fn record_cooked(
    db: &PgPool,
    user_id: Uuid,
    cooked: CookedRecipe,
) -> DataResult<UserRecipeHistory> {
    cooked.validate()?;
    let row = sqlx::query_as::<_, UserRecipeHistory>(
        r#"
        INSERT INTO user_recipe_history (id, user_id, recipe_id, cooked_on, rating, notes, servings_made)
        VALUES ($1, $2, $3, COALESCE($4, now()), $5, $6, $7)
        RETURNING id, user_id, recipe_id, cooked_on, rating, notes, servings_made,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(cooked.recipe_id)
    .bind(cooked.cooked_on)
    .bind(cooked.rating)
    .bind(cooked.notes)
    .bind(cooked.servings_made)
    .fetch_one(db)
    .await
    .map_err(db_err("user_recipe_history"))?;
    debug!(history_id = %row.id, %user_id, "recipe cooked");
    Ok(row)
}

/// Most recent first.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> DataResult<Vec<UserRecipeHistory>> {
    let rows = sqlx::query_as::<_, UserRecipeHistory>(
        r#"
        SELECT id, user_id, recipe_id, cooked_on, rating, notes, servings_made,
               created_at, updated_at
        FROM user_recipe_history
        WHERE user_id = $1
        ORDER BY cooked_on DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .map_err(db_err("user_recipe_history"))?;
    Ok(rows)
}

pub async fn times_cooked(db: &PgPool, user_id: Uuid, recipe_id: Uuid) -> DataResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM user_recipe_history WHERE user_id = $1 AND recipe_id = $2",
    )
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(db)
    .await
    .map_err(db_err("user_recipe_history"))?;
    Ok(n)
}
