use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo_types::{
    ensure_kind_matches, validate_name, CatalogItem, InventoryCategory, InventoryType,
    NewCatalogItem, NewCategory,
};
use crate::error::{db_err, DataError, DataResult};

/// Insert a category or refresh the description of the existing one with the same name.
///
/// Re-running an import is idempotent. Changing the type of an existing
/// category is rejected because its items would no longer match it.
#[instrument(skip(db))]
pub async fn upsert_category(db: &PgPool, new: &NewCategory) -> DataResult<InventoryCategory> {
    let name = validate_name("inventory_category", &new.name, 100)?;

    let row = sqlx::query_as::<_, InventoryCategory>(
        r#"
        INSERT INTO inventory_categories (id, name, type, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE
            SET description = COALESCE(EXCLUDED.description, inventory_categories.description)
            WHERE inventory_categories.type = EXCLUDED.type
        RETURNING id, name, type, description, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(new.kind)
    .bind(&new.description)
    .fetch_optional(db)
    .await
    .map_err(db_err("inventory_category"))?;

    match row {
        Some(category) => {
            debug!(category_id = %category.id, name = %category.name, "category upserted");
            Ok(category)
        }
        None => Err(DataError::inconsistent(
            "inventory_category",
            format!("category `{name}` already exists with a different type"),
        )),
    }
}

#[instrument(skip(db))]
pub async fn find_category_by_name(db: &PgPool, name: &str) -> DataResult<Option<InventoryCategory>> {
    let row = sqlx::query_as::<_, InventoryCategory>(
        r#"
        SELECT id, name, type, description, created_at, updated_at
        FROM inventory_categories
        WHERE name = $1
        "#,
    )
    .bind(name.trim())
    .fetch_optional(db)
    .await
    .map_err(db_err("inventory_category"))?;
    Ok(row)
}

pub async fn get_category(db: &PgPool, id: Uuid) -> DataResult<InventoryCategory> {
    sqlx::query_as::<_, InventoryCategory>(
        r#"
        SELECT id, name, type, description, created_at, updated_at
        FROM inventory_categories
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(db_err("inventory_category"))?
    .ok_or_else(|| DataError::not_found("inventory_category", id))
}

/// All categories, optionally restricted to one type, ordered by name.
pub async fn list_categories(
    db: &PgPool,
    kind: Option<InventoryType>,
) -> DataResult<Vec<InventoryCategory>> {
    let rows = sqlx::query_as::<_, InventoryCategory>(
        r#"
        SELECT id, name, type, description, created_at, updated_at
        FROM inventory_categories
        WHERE $1::inventory_type IS NULL OR type = $1
        ORDER BY name
        "#,
    )
    .bind(kind)
    .fetch_all(db)
    .await
    .map_err(db_err("inventory_category"))?;
    Ok(rows)
}

/// Insert or update a catalog item keyed by name.
///
/// The item's type is checked against its category inside the same
/// transaction that writes it; an existing item can be re-categorised but
/// never change type.
#[instrument(skip(db))]
pub async fn upsert_item(db: &PgPool, new: &NewCatalogItem) -> DataResult<CatalogItem> {
    let name = validate_name("catalog_item", &new.name, 200)?;

    let mut tx = db.begin().await.map_err(db_err("catalog_item"))?;

    let category = sqlx::query_as::<_, InventoryCategory>(
        r#"
        SELECT id, name, type, description, created_at, updated_at
        FROM inventory_categories
        WHERE id = $1
        FOR SHARE
        "#,
    )
    .bind(new.category_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err("catalog_item"))?
    .ok_or_else(|| DataError::not_found("inventory_category", new.category_id))?;

    ensure_kind_matches(new.kind, &category)?;

    let item = sqlx::query_as::<_, CatalogItem>(
        r#"
        INSERT INTO catalog_items (id, name, category_id, type, unit, image_url, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (name) DO UPDATE
            SET category_id = EXCLUDED.category_id,
                unit = COALESCE(EXCLUDED.unit, catalog_items.unit),
                image_url = COALESCE(EXCLUDED.image_url, catalog_items.image_url),
                description = COALESCE(EXCLUDED.description, catalog_items.description)
            WHERE catalog_items.type = EXCLUDED.type
        RETURNING id, name, category_id, type, unit, image_url, description, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(category.id)
    .bind(new.kind)
    .bind(&new.unit)
    .bind(&new.image_url)
    .bind(&new.description)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err("catalog_item"))?
    .ok_or_else(|| {
        DataError::inconsistent(
            "catalog_item",
            format!("item `{name}` already exists with a different type"),
        )
    })?;

    tx.commit().await.map_err(db_err("catalog_item"))?;
    debug!(item_id = %item.id, name = %item.name, "catalog item upserted");
    Ok(item)
}

pub async fn get_item(db: &PgPool, id: Uuid) -> DataResult<CatalogItem> {
    sqlx::query_as::<_, CatalogItem>(
        r#"
        SELECT id, name, category_id, type, unit, image_url, description, created_at, updated_at
        FROM catalog_items
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(db_err("catalog_item"))?
    .ok_or_else(|| DataError::not_found("catalog_item", id))
}

/// Exact lookup by name, the same key `upsert_item` conflicts on.
#[instrument(skip(db))]
pub async fn find_item_by_name(db: &PgPool, name: &str) -> DataResult<Option<CatalogItem>> {
    let row = sqlx::query_as::<_, CatalogItem>(
        r#"
        SELECT id, name, category_id, type, unit, image_url, description, created_at, updated_at
        FROM catalog_items
        WHERE name = $1
        "#,
    )
    .bind(name.trim())
    .fetch_optional(db)
    .await
    .map_err(db_err("catalog_item"))?;
    Ok(row)
}

pub async fn list_items_by_category(db: &PgPool, category_id: Uuid) -> DataResult<Vec<CatalogItem>> {
    let rows = sqlx::query_as::<_, CatalogItem>(
        r#"
        SELECT id, name, category_id, type, unit, image_url, description, created_at, updated_at
        FROM catalog_items
        WHERE category_id = $1
        ORDER BY name
        "#,
    )
    .bind(category_id)
    .fetch_all(db)
    .await
    .map_err(db_err("catalog_item"))?;
    Ok(rows)
}

pub async fn list_items_by_type(db: &PgPool, kind: InventoryType) -> DataResult<Vec<CatalogItem>> {
    let rows = sqlx::query_as::<_, CatalogItem>(
        r#"
        SELECT id, name, category_id, type, unit, image_url, description, created_at, updated_at
        FROM catalog_items
        WHERE type = $1
        ORDER BY name
        "#,
    )
    .bind(kind)
    .fetch_all(db)
    .await
    .map_err(db_err("catalog_item"))?;
    Ok(rows)
}

/// Items of the given ids, used to validate recipe composition in bulk.
pub(crate) async fn kinds_of<'e, E>(exec: E, ids: &[Uuid]) -> DataResult<Vec<(Uuid, InventoryType)>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, (Uuid, InventoryType)>(
        r#"
        SELECT id, type
        FROM catalog_items
        WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(exec)
    .await
    .map_err(db_err("catalog_item"))?;
    Ok(rows)
}

/// Remove an item nobody references. Referenced items fail with a foreign key violation.
#[instrument(skip(db))]
pub async fn delete_item(db: &PgPool, id: Uuid) -> DataResult<()> {
    let res = sqlx::query("DELETE FROM catalog_items WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err("catalog_item"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("catalog_item", id));
    }
    Ok(())
}
