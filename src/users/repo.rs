use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::repo_types::{validate_device_id, validate_name, CascadeReport, ProfileUpdate, User};
use crate::error::{db_err, DataError, DataResult};

impl User {
    /// Register a new device. Fails with a unique violation if the device is known.
    #[instrument(skip(db))]
    pub async fn create(db: &PgPool, device_id: &str, name: Option<&str>) -> DataResult<User> {
        let device_id = validate_device_id(device_id)?;
        let name = validate_name(name)?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, device_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, device_id, name, household_size, monthly_budget, currency,
                      dietary_preferences, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&device_id)
        .bind(name)
        .fetch_one(db)
        .await
        .map_err(db_err("user"))?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Find a user by the device id sent by the client.
    pub async fn find_by_device_id(db: &PgPool, device_id: &str) -> DataResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, device_id, name, household_size, monthly_budget, currency,
                   dietary_preferences, created_at, updated_at
            FROM users
            WHERE device_id = $1
            "#,
        )
        .bind(device_id.trim())
        .fetch_optional(db)
        .await
        .map_err(db_err("user"))?;
        Ok(user)
    }

    pub async fn get(db: &PgPool, id: Uuid) -> DataResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, device_id, name, household_size, monthly_budget, currency,
                   dietary_preferences, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(db_err("user"))?
        .ok_or_else(|| DataError::not_found("user", id))
    }

    /// Resolve the acting user for a device, registering it on first contact.
    #[instrument(skip(db))]
    pub async fn get_or_create_by_device(db: &PgPool, device_id: &str) -> DataResult<User> {
        let device_id = validate_device_id(device_id)?;
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, device_id)
            VALUES ($1, $2)
            ON CONFLICT (device_id) DO NOTHING
            RETURNING id, device_id, name, household_size, monthly_budget, currency,
                      dietary_preferences, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&device_id)
        .fetch_optional(db)
        .await
        .map_err(db_err("user"))?;

        if let Some(user) = inserted {
            info!(user_id = %user.id, "user registered on first contact");
            return Ok(user);
        }
        Self::find_by_device_id(db, &device_id)
            .await?
            .ok_or_else(|| DataError::not_found("user", device_id))
    }

    #[instrument(skip(db, update))]
    pub async fn update_profile(db: &PgPool, id: Uuid, update: ProfileUpdate) -> DataResult<User> {
        let update = update.validated()?;
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   household_size = COALESCE($3, household_size),
                   monthly_budget = COALESCE($4, monthly_budget),
                   currency = COALESCE($5, currency),
                   dietary_preferences = COALESCE($6, dietary_preferences)
             WHERE id = $1
            RETURNING id, device_id, name, household_size, monthly_budget, currency,
                      dietary_preferences, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.household_size)
        .bind(update.monthly_budget)
        .bind(update.currency)
        .bind(update.dietary_preferences)
        .fetch_optional(db)
        .await
        .map_err(db_err("user"))?
        .ok_or_else(|| DataError::not_found("user", id))?;
        debug!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    /// Delete a user and everything it owns in one transaction.
    ///
    /// Children go before parents; if any statement fails the transaction is
    /// dropped and nothing is removed. Catalog rows and recipes are shared and
    /// stay; recipes generated from this user's AI calls lose their log link.
    #[instrument(skip(db))]
    pub async fn delete_cascade(db: &PgPool, id: Uuid) -> DataResult<CascadeReport> {
        let mut tx = db.begin().await.map_err(db_err("user"))?;

        let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("user"))?;
        if exists.is_none() {
            return Err(DataError::not_found("user", id));
        }

        let mut report = CascadeReport::default();

        report.shopping_list_items = sqlx::query(
            r#"
            DELETE FROM shopping_list_items
             WHERE shopping_list_id IN (SELECT id FROM shopping_lists WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("shopping_list_item"))?
        .rows_affected();

        report.shopping_lists = sqlx::query("DELETE FROM shopping_lists WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("shopping_list"))?
            .rows_affected();

        report.meal_plan_entries = sqlx::query(
            r#"
            DELETE FROM meal_plan_entries
             WHERE meal_plan_id IN (SELECT id FROM meal_plans WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("meal_plan_entry"))?
        .rows_affected();

        report.meal_plans = sqlx::query("DELETE FROM meal_plans WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("meal_plan"))?
            .rows_affected();

        report.pantry_items = sqlx::query("DELETE FROM pantry_items WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("pantry_item"))?
            .rows_affected();

        report.recipe_history = sqlx::query("DELETE FROM user_recipe_history WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("user_recipe_history"))?
            .rows_affected();

        sqlx::query(
            r#"
            UPDATE recipes
               SET ai_request_log_id = NULL
             WHERE ai_request_log_id IN (SELECT id FROM ai_request_logs WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("recipe"))?;

        report.ai_request_logs = sqlx::query("DELETE FROM ai_request_logs WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("ai_request_log"))?
            .rows_affected();

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("user"))?;

        tx.commit().await.map_err(db_err("user"))?;
        info!(user_id = %id, removed = report.total(), "user deleted with owned data");
        Ok(report)
    }
}
