use sqlx::{PgPool, Postgres, Transaction};
use time::Date;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{
    ensure_slot_free, entries_outside, validate_range, MealPlan, MealPlanEntry, MealPlanStatus,
    NewEntry, NewMealPlan,
};
use crate::error::{db_err, DataError, DataResult};
use crate::recipes;

#[instrument(skip(db, new), fields(title = %new.title))]
pub async fn create_plan(db: &PgPool, user_id: Uuid, new: NewMealPlan) -> DataResult<MealPlan> {
    let new = new.validated()?;
    let plan = sqlx::query_as::<_, MealPlan>(
        r#"
        INSERT INTO meal_plans (id, user_id, title, start_date, end_date, persons_count, budget)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, user_id, title, start_date, end_date, persons_count, budget, status,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&new.title)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.persons_count)
    .bind(new.budget)
    .fetch_one(db)
    .await
    .map_err(db_err("meal_plan"))?;
    info!(plan_id = %plan.id, %user_id, "meal plan created");
    Ok(plan)
}

pub async fn get_plan<'e, E>(exec: E, user_id: Uuid, plan_id: Uuid) -> DataResult<MealPlan>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, user_id, title, start_date, end_date, persons_count, budget, status,
               created_at, updated_at
        FROM meal_plans
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(plan_id)
    .bind(user_id)
    .fetch_optional(exec)
    .await
    .map_err(db_err("meal_plan"))?
    .ok_or_else(|| DataError::not_found("meal_plan", plan_id))
}

/// Lock the plan row for the rest of the transaction.
pub(crate) async fn lock_plan(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    plan_id: Uuid,
) -> DataResult<MealPlan> {
    sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, user_id, title, start_date, end_date, persons_count, budget, status,
               created_at, updated_at
        FROM meal_plans
        WHERE id = $1 AND user_id = $2
        FOR UPDATE
        "#,
    )
    .bind(plan_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err("meal_plan"))?
    .ok_or_else(|| DataError::not_found("meal_plan", plan_id))
}

pub async fn list_plans(
    db: &PgPool,
    user_id: Uuid,
    status: Option<MealPlanStatus>,
) -> DataResult<Vec<MealPlan>> {
    let rows = sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, user_id, title, start_date, end_date, persons_count, budget, status,
               created_at, updated_at
        FROM meal_plans
        WHERE user_id = $1
          AND ($2::meal_plan_status IS NULL OR status = $2)
        ORDER BY start_date DESC, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(db)
    .await
    .map_err(db_err("meal_plan"))?;
    Ok(rows)
}

pub async fn list_entries<'e, E>(exec: E, plan_id: Uuid) -> DataResult<Vec<MealPlanEntry>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, MealPlanEntry>(
        r#"
        SELECT id, meal_plan_id, recipe_id, scheduled_date, meal_type, servings, notes,
               created_at, updated_at
        FROM meal_plan_entries
        WHERE meal_plan_id = $1
        ORDER BY scheduled_date, meal_type, created_at
        "#,
    )
    .bind(plan_id)
    .fetch_all(exec)
    .await
    .map_err(db_err("meal_plan_entry"))?;
    Ok(rows)
}

/// Move the plan's date range. Fails if an existing entry would end up outside it.
#[instrument(skip(db))]
pub async fn reschedule(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    start_date: Date,
    end_date: Date,
) -> DataResult<MealPlan> {
    validate_range(start_date, end_date)?;
    let mut tx = db.begin().await.map_err(db_err("meal_plan"))?;
    let plan = lock_plan(&mut tx, user_id, plan_id).await?;
    plan.ensure_editable()?;

    let entries = list_entries(&mut *tx, plan_id).await?;
    let stranded = entries_outside(&entries, start_date, end_date);
    if let Some(first) = stranded.first() {
        return Err(DataError::inconsistent(
            "meal_plan",
            format!(
                "{} entries would fall outside {start_date}..={end_date}, first on {}",
                stranded.len(),
                first.scheduled_date
            ),
        ));
    }

    let plan = sqlx::query_as::<_, MealPlan>(
        r#"
        UPDATE meal_plans
           SET start_date = $2, end_date = $3
         WHERE id = $1
        RETURNING id, user_id, title, start_date, end_date, persons_count, budget, status,
                  created_at, updated_at
        "#,
    )
    .bind(plan_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err("meal_plan"))?;
    tx.commit().await.map_err(db_err("meal_plan"))?;
    Ok(plan)
}

async fn write_status(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: Uuid,
    status: MealPlanStatus,
) -> DataResult<MealPlan> {
    sqlx::query_as::<_, MealPlan>(
        r#"
        UPDATE meal_plans
           SET status = $2
         WHERE id = $1
        RETURNING id, user_id, title, start_date, end_date, persons_count, budget, status,
                  created_at, updated_at
        "#,
    )
    .bind(plan_id)
    .bind(status)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err("meal_plan"))
}

/// Normal lifecycle move; only forward transitions are accepted.
#[instrument(skip(db))]
pub async fn transition_status(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    next: MealPlanStatus,
) -> DataResult<MealPlan> {
    let mut tx = db.begin().await.map_err(db_err("meal_plan"))?;
    let plan = lock_plan(&mut tx, user_id, plan_id).await?;
    if !plan.status.can_transition_to(next) {
        return Err(DataError::InvalidTransition {
            entity: "meal_plan",
            from: plan.status.to_string(),
            to: next.to_string(),
        });
    }
    let updated = write_status(&mut tx, plan_id, next).await?;
    tx.commit().await.map_err(db_err("meal_plan"))?;
    debug!(%plan_id, from = %plan.status, to = %next, "meal plan status changed");
    Ok(updated)
}

/// Administrative status change that bypasses the forward-only rule. Always logged.
#[instrument(skip(db, reason))]
pub async fn override_status(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    next: MealPlanStatus,
    reason: &str,
) -> DataResult<MealPlan> {
    if reason.trim().is_empty() {
        return Err(DataError::validation(
            "meal_plan",
            "status",
            "an override needs a reason",
        ));
    }
    let mut tx = db.begin().await.map_err(db_err("meal_plan"))?;
    let plan = lock_plan(&mut tx, user_id, plan_id).await?;
    let updated = write_status(&mut tx, plan_id, next).await?;
    tx.commit().await.map_err(db_err("meal_plan"))?;
    warn!(%plan_id, %user_id, from = %plan.status, to = %next, reason, "meal plan status overridden");
    Ok(updated)
}

/// Schedule a recipe in a plan slot.
///
/// The plan row is locked while the range and slot checks run so two
/// concurrent inserts cannot both claim the same slot.
#[instrument(skip(db, new), fields(date = %new.scheduled_date, meal = %new.meal_type))]
pub async fn add_entry(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    new: NewEntry,
    allow_multiple_per_slot: bool,
) -> DataResult<MealPlanEntry> {
    new.validate()?;
    let mut tx = db.begin().await.map_err(db_err("meal_plan_entry"))?;
    let plan = lock_plan(&mut tx, user_id, plan_id).await?;
    plan.ensure_editable()?;
    plan.ensure_contains(new.scheduled_date)?;

    recipes::repo::get(&mut *tx, new.recipe_id).await?;

    let existing = list_entries(&mut *tx, plan_id).await?;
    ensure_slot_free(&existing, new.scheduled_date, new.meal_type, allow_multiple_per_slot)?;

    let entry = sqlx::query_as::<_, MealPlanEntry>(
        r#"
        INSERT INTO meal_plan_entries (id, meal_plan_id, recipe_id, scheduled_date, meal_type, servings, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, meal_plan_id, recipe_id, scheduled_date, meal_type, servings, notes,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(plan_id)
    .bind(new.recipe_id)
    .bind(new.scheduled_date)
    .bind(new.meal_type)
    .bind(new.servings)
    .bind(&new.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err("meal_plan_entry"))?;
    tx.commit().await.map_err(db_err("meal_plan_entry"))?;

    debug!(entry_id = %entry.id, %plan_id, "meal plan entry added");
    Ok(entry)
}

pub async fn remove_entry(db: &PgPool, user_id: Uuid, plan_id: Uuid, entry_id: Uuid) -> DataResult<()> {
    let mut tx = db.begin().await.map_err(db_err("meal_plan_entry"))?;
    let plan = lock_plan(&mut tx, user_id, plan_id).await?;
    plan.ensure_editable()?;
    let res = sqlx::query("DELETE FROM meal_plan_entries WHERE id = $1 AND meal_plan_id = $2")
        .bind(entry_id)
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("meal_plan_entry"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("meal_plan_entry", entry_id));
    }
    tx.commit().await.map_err(db_err("meal_plan_entry"))?;
    Ok(())
}

/// Delete a plan and its entries. Shopping lists generated from it are kept but unlinked.
#[instrument(skip(db))]
pub async fn delete_plan(db: &PgPool, user_id: Uuid, plan_id: Uuid) -> DataResult<()> {
    let mut tx = db.begin().await.map_err(db_err("meal_plan"))?;
    lock_plan(&mut tx, user_id, plan_id).await?;

    sqlx::query("UPDATE shopping_lists SET meal_plan_id = NULL WHERE meal_plan_id = $1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("shopping_list"))?;
    let entries = sqlx::query("DELETE FROM meal_plan_entries WHERE meal_plan_id = $1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("meal_plan_entry"))?
        .rows_affected();
    sqlx::query("DELETE FROM meal_plans WHERE id = $1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("meal_plan"))?;

    tx.commit().await.map_err(db_err("meal_plan"))?;
    info!(%plan_id, entries, "meal plan deleted");
    Ok(())
}
