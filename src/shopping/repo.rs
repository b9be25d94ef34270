use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::generate::ShoppingLine;
use super::repo_types::{
    validate_price, Estimate, NewShoppingItem, ShoppingList, ShoppingListItem, ShoppingListStatus,
    ShoppingListWithItems,
};
use crate::error::{db_err, DataError, DataResult};

pub(crate) async fn insert_list(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal_plan_id: Option<Uuid>,
    title: Option<&str>,
) -> DataResult<ShoppingList> {
    sqlx::query_as::<_, ShoppingList>(
        r#"
        INSERT INTO shopping_lists (id, user_id, meal_plan_id, title)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(meal_plan_id)
    .bind(title)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err("shopping_list"))
}

pub(crate) async fn insert_line(
    tx: &mut Transaction<'_, Postgres>,
    list_id: Uuid,
    line: &ShoppingLine,
) -> DataResult<()> {
    sqlx::query(
        r#"
        INSERT INTO shopping_list_items (id, shopping_list_id, item_id, quantity, unit)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(list_id)
    .bind(line.item_id)
    .bind(line.quantity)
    .bind(&line.unit)
    .execute(&mut **tx)
    .await
    .map_err(db_err("shopping_list_item"))?;
    Ok(())
}

pub(crate) async fn lock_list(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    list_id: Uuid,
) -> DataResult<ShoppingList> {
    sqlx::query_as::<_, ShoppingList>(
        r#"
        SELECT id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
               created_at, updated_at
        FROM shopping_lists
        WHERE id = $1 AND user_id = $2
        FOR UPDATE
        "#,
    )
    .bind(list_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err("shopping_list"))?
    .ok_or_else(|| DataError::not_found("shopping_list", list_id))
}

/// Most recent list generated from the plan that is not completed yet, locked.
pub(crate) async fn lock_open_for_plan(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    plan_id: Uuid,
) -> DataResult<Option<ShoppingList>> {
    sqlx::query_as::<_, ShoppingList>(
        r#"
        SELECT id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
               created_at, updated_at
        FROM shopping_lists
        WHERE user_id = $1 AND meal_plan_id = $2 AND status <> $3
        ORDER BY generated_at DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(plan_id)
    .bind(ShoppingListStatus::Completed)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err("shopping_list"))
}

pub(crate) async fn clear_unpurchased(tx: &mut Transaction<'_, Postgres>, list_id: Uuid) -> DataResult<u64> {
    let res = sqlx::query(
        "DELETE FROM shopping_list_items WHERE shopping_list_id = $1 AND NOT is_purchased",
    )
    .bind(list_id)
    .execute(&mut **tx)
    .await
    .map_err(db_err("shopping_list_item"))?;
    Ok(res.rows_affected())
}

pub(crate) async fn mark_regenerated(tx: &mut Transaction<'_, Postgres>, list_id: Uuid) -> DataResult<()> {
    sqlx::query("UPDATE shopping_lists SET generated_at = now() WHERE id = $1")
        .bind(list_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err("shopping_list"))?;
    Ok(())
}

pub async fn items_of<'e, E>(exec: E, list_id: Uuid) -> DataResult<Vec<ShoppingListItem>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ShoppingListItem>(
        r#"
        SELECT id, shopping_list_id, item_id, quantity, unit, is_purchased, estimated_price,
               notes, created_at, updated_at
        FROM shopping_list_items
        WHERE shopping_list_id = $1
        ORDER BY item_id, unit, created_at
        "#,
    )
    .bind(list_id)
    .fetch_all(exec)
    .await
    .map_err(db_err("shopping_list_item"))?;
    Ok(rows)
}

/// Recompute status and estimated total from the items, in the caller's transaction.
pub(crate) async fn refresh_summary(
    tx: &mut Transaction<'_, Postgres>,
    list_id: Uuid,
) -> DataResult<ShoppingListWithItems> {
    let items = items_of(&mut **tx, list_id).await?;
    let purchased = items.iter().filter(|i| i.is_purchased).count();
    let status = ShoppingListStatus::from_progress(purchased, items.len());
    let estimate = Estimate::of(&items);

    let list = sqlx::query_as::<_, ShoppingList>(
        r#"
        UPDATE shopping_lists
           SET status = $2, estimated_total = $3
         WHERE id = $1
        RETURNING id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
                  created_at, updated_at
        "#,
    )
    .bind(list_id)
    .bind(status)
    .bind(estimate.stored_total())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err("shopping_list"))?;

    Ok(ShoppingListWithItems {
        list,
        items,
        estimate,
    })
}

/// Ad-hoc list not tied to a meal plan.
#[instrument(skip(db, items))]
pub async fn create_list(
    db: &PgPool,
    user_id: Uuid,
    title: Option<&str>,
    items: Vec<NewShoppingItem>,
) -> DataResult<ShoppingListWithItems> {
    let items = items
        .into_iter()
        .map(NewShoppingItem::validated)
        .collect::<DataResult<Vec<_>>>()?;

    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;
    let list = insert_list(&mut tx, user_id, None, title.map(str::trim)).await?;
    for item in &items {
        insert_item(&mut tx, list.id, item).await?;
    }
    let summary = refresh_summary(&mut tx, list.id).await?;
    tx.commit().await.map_err(db_err("shopping_list"))?;
    debug!(list_id = %list.id, items = summary.items.len(), "shopping list created");
    Ok(summary)
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    list_id: Uuid,
    item: &NewShoppingItem,
) -> DataResult<ShoppingListItem> {
    sqlx::query_as::<_, ShoppingListItem>(
        r#"
        INSERT INTO shopping_list_items (id, shopping_list_id, item_id, quantity, unit,
                                         estimated_price, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, shopping_list_id, item_id, quantity, unit, is_purchased, estimated_price,
                  notes, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(list_id)
    .bind(item.item_id)
    .bind(item.quantity)
    .bind(&item.unit)
    .bind(item.estimated_price)
    .bind(&item.notes)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err("shopping_list_item"))
}

#[instrument(skip(db, item))]
pub async fn add_item(
    db: &PgPool,
    user_id: Uuid,
    list_id: Uuid,
    item: NewShoppingItem,
) -> DataResult<ShoppingListWithItems> {
    let item = item.validated()?;
    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;
    lock_list(&mut tx, user_id, list_id).await?;
    insert_item(&mut tx, list_id, &item).await?;
    let summary = refresh_summary(&mut tx, list_id).await?;
    tx.commit().await.map_err(db_err("shopping_list"))?;
    Ok(summary)
}

/// Toggle an item's purchased flag; the list status follows in the same transaction.
#[instrument(skip(db))]
pub async fn set_purchased(
    db: &PgPool,
    user_id: Uuid,
    list_id: Uuid,
    item_id: Uuid,
    purchased: bool,
) -> DataResult<ShoppingListWithItems> {
    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;
    let before = lock_list(&mut tx, user_id, list_id).await?;
    let res = sqlx::query(
        "UPDATE shopping_list_items SET is_purchased = $3 WHERE id = $1 AND shopping_list_id = $2",
    )
    .bind(item_id)
    .bind(list_id)
    .bind(purchased)
    .execute(&mut *tx)
    .await
    .map_err(db_err("shopping_list_item"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("shopping_list_item", item_id));
    }
    let summary = refresh_summary(&mut tx, list_id).await?;
    tx.commit().await.map_err(db_err("shopping_list"))?;
    if before.status != summary.list.status {
        debug!(%list_id, from = %before.status, to = %summary.list.status, "shopping list status changed");
    }
    Ok(summary)
}

/// Set or clear the per-unit price of an item and refresh the list estimate.
#[instrument(skip(db))]
pub async fn set_price(
    db: &PgPool,
    user_id: Uuid,
    list_id: Uuid,
    item_id: Uuid,
    price: Option<f64>,
) -> DataResult<ShoppingListWithItems> {
    validate_price(price)?;
    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;
    lock_list(&mut tx, user_id, list_id).await?;
    let res = sqlx::query(
        "UPDATE shopping_list_items SET estimated_price = $3 WHERE id = $1 AND shopping_list_id = $2",
    )
    .bind(item_id)
    .bind(list_id)
    .bind(price)
    .execute(&mut *tx)
    .await
    .map_err(db_err("shopping_list_item"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("shopping_list_item", item_id));
    }
    let summary = refresh_summary(&mut tx, list_id).await?;
    tx.commit().await.map_err(db_err("shopping_list"))?;
    Ok(summary)
}

pub async fn get_with_items(db: &PgPool, user_id: Uuid, list_id: Uuid) -> DataResult<ShoppingListWithItems> {
    let list = sqlx::query_as::<_, ShoppingList>(
        r#"
        SELECT id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
               created_at, updated_at
        FROM shopping_lists
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(list_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(db_err("shopping_list"))?
    .ok_or_else(|| DataError::not_found("shopping_list", list_id))?;
    let items = items_of(db, list_id).await?;
    let estimate = Estimate::of(&items);
    Ok(ShoppingListWithItems {
        list,
        items,
        estimate,
    })
}

pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    status: Option<ShoppingListStatus>,
) -> DataResult<Vec<ShoppingList>> {
    let rows = sqlx::query_as::<_, ShoppingList>(
        r#"
        SELECT id, user_id, meal_plan_id, title, generated_at, status, estimated_total,
               created_at, updated_at
        FROM shopping_lists
        WHERE user_id = $1
          AND ($2::shopping_list_status IS NULL OR status = $2)
        ORDER BY generated_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(db)
    .await
    .map_err(db_err("shopping_list"))?;
    Ok(rows)
}

#[instrument(skip(db))]
pub async fn delete_list(db: &PgPool, user_id: Uuid, list_id: Uuid) -> DataResult<()> {
    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;
    lock_list(&mut tx, user_id, list_id).await?;
    sqlx::query("DELETE FROM shopping_list_items WHERE shopping_list_id = $1")
        .bind(list_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("shopping_list_item"))?;
    sqlx::query("DELETE FROM shopping_lists WHERE id = $1")
        .bind(list_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("shopping_list"))?;
    tx.commit().await.map_err(db_err("shopping_list"))?;
    Ok(())
}
