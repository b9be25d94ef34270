use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo_types::{validate_quantity, NewPantryItem, PantryItem};
use crate::catalog::InventoryType;
use crate::error::{db_err, DataError, DataResult};

#[instrument(skip(db, new))]
pub async fn add_item(db: &PgPool, user_id: Uuid, new: NewPantryItem) -> DataResult<PantryItem> {
    let new = new.validated()?;
    let row = sqlx::query_as::<_, PantryItem>(
        r#"
        INSERT INTO pantry_items (id, user_id, item_id, quantity, unit, expiry_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, item_id, quantity, unit, added_at, expiry_date,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(new.item_id)
    .bind(new.quantity)
    .bind(&new.unit)
    .bind(new.expiry_date)
    .fetch_one(db)
    .await
    .map_err(db_err("pantry_item"))?;
    debug!(pantry_item_id = %row.id, %user_id, item_id = %row.item_id, "pantry item added");
    Ok(row)
}

/// Overwrite the held quantity. Concurrent writers: last one wins.
#[instrument(skip(db))]
pub async fn set_quantity(
    db: &PgPool,
    user_id: Uuid,
    pantry_item_id: Uuid,
    quantity: f64,
) -> DataResult<PantryItem> {
    validate_quantity(quantity)?;
    sqlx::query_as::<_, PantryItem>(
        r#"
        UPDATE pantry_items
           SET quantity = $3
         WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, item_id, quantity, unit, added_at, expiry_date,
                  created_at, updated_at
        "#,
    )
    .bind(pantry_item_id)
    .bind(user_id)
    .bind(quantity)
    .fetch_optional(db)
    .await
    .map_err(db_err("pantry_item"))?
    .ok_or_else(|| DataError::not_found("pantry_item", pantry_item_id))
}

pub async fn set_expiry(
    db: &PgPool,
    user_id: Uuid,
    pantry_item_id: Uuid,
    expiry_date: Option<OffsetDateTime>,
) -> DataResult<PantryItem> {
    sqlx::query_as::<_, PantryItem>(
        r#"
        UPDATE pantry_items
           SET expiry_date = $3
         WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, item_id, quantity, unit, added_at, expiry_date,
                  created_at, updated_at
        "#,
    )
    .bind(pantry_item_id)
    .bind(user_id)
    .bind(expiry_date)
    .fetch_optional(db)
    .await
    .map_err(db_err("pantry_item"))?
    .ok_or_else(|| DataError::not_found("pantry_item", pantry_item_id))
}

pub async fn remove_item(db: &PgPool, user_id: Uuid, pantry_item_id: Uuid) -> DataResult<()> {
    let res = sqlx::query("DELETE FROM pantry_items WHERE id = $1 AND user_id = $2")
        .bind(pantry_item_id)
        .bind(user_id)
        .execute(db)
        .await
        .map_err(db_err("pantry_item"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("pantry_item", pantry_item_id));
    }
    Ok(())
}

/// The user's pantry, optionally filtered to ingredients or utensils.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    kind: Option<InventoryType>,
) -> DataResult<Vec<PantryItem>> {
    let rows = sqlx::query_as::<_, PantryItem>(
        r#"
        SELECT p.id, p.user_id, p.item_id, p.quantity, p.unit, p.added_at, p.expiry_date,
               p.created_at, p.updated_at
          FROM pantry_items p
          JOIN catalog_items c ON c.id = p.item_id
         WHERE p.user_id = $1
           AND ($2::inventory_type IS NULL OR c.type = $2)
         ORDER BY c.name, p.added_at
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .fetch_all(db)
    .await
    .map_err(db_err("pantry_item"))?;
    Ok(rows)
}

/// Held items that expire before `cutoff`, soonest first. Already expired items are included.
pub async fn list_expiring(
    db: &PgPool,
    user_id: Uuid,
    cutoff: OffsetDateTime,
) -> DataResult<Vec<PantryItem>> {
    let rows = sqlx::query_as::<_, PantryItem>(
        r#"
        SELECT id, user_id, item_id, quantity, unit, added_at, expiry_date,
               created_at, updated_at
          FROM pantry_items
         WHERE user_id = $1
           AND expiry_date IS NOT NULL
           AND expiry_date < $2
           AND quantity > 0
         ORDER BY expiry_date
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_all(db)
    .await
    .map_err(db_err("pantry_item"))?;
    Ok(rows)
}

/// Pantry rows for the given catalog items, used by sufficiency checks.
pub(crate) async fn holdings_for_items<'e, E>(
    exec: E,
    user_id: Uuid,
    item_ids: &[Uuid],
) -> DataResult<Vec<PantryItem>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, PantryItem>(
        r#"
        SELECT id, user_id, item_id, quantity, unit, added_at, expiry_date,
               created_at, updated_at
          FROM pantry_items
         WHERE user_id = $1 AND item_id = ANY($2)
         ORDER BY added_at
        "#,
    )
    .bind(user_id)
    .bind(item_ids)
    .fetch_all(exec)
    .await
    .map_err(db_err("pantry_item"))?;
    Ok(rows)
}
