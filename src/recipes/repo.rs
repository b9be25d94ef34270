use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::repo_types::{
    Composition, NewRecipe, Recipe, RecipeDetailsUpdate, RecipeFilter, RecipeIngredient,
    RecipeSource, RecipeUtensil, RecipeWithComposition,
};
use crate::ai_log::AiRequestStatus;
use crate::catalog::{repo::kinds_of, InventoryType};
use crate::common::normalize_text;
use crate::error::{db_err, DataError, DataResult};

/// Every catalog item referenced by the composition exists and has the right kind.
async fn check_composition_items(
    tx: &mut Transaction<'_, Postgres>,
    composition: &Composition,
) -> DataResult<()> {
    let mut ids = composition.ingredient_ids();
    ids.extend(composition.utensil_ids());
    if ids.is_empty() {
        return Ok(());
    }
    let kinds = kinds_of(&mut **tx, &ids).await?;
    let kind_of = |id: Uuid| kinds.iter().find(|(k, _)| *k == id).map(|(_, t)| *t);

    for (id, expected, entity) in composition
        .ingredient_ids()
        .into_iter()
        .map(|id| (id, InventoryType::Ingredient, "recipe_ingredient"))
        .chain(
            composition
                .utensil_ids()
                .into_iter()
                .map(|id| (id, InventoryType::Utensil, "recipe_utensil")),
        )
    {
        match kind_of(id) {
            None => return Err(DataError::not_found("catalog_item", id)),
            Some(actual) if actual != expected => {
                return Err(DataError::inconsistent(
                    entity,
                    format!("catalog item {id} is a {actual}, expected {expected}"),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

async fn insert_composition(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    composition: &Composition,
) -> DataResult<()> {
    for ing in &composition.ingredients {
        sqlx::query(
            r#"
            INSERT INTO recipe_ingredients (id, recipe_id, item_id, quantity, unit, is_optional, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipe_id)
        .bind(ing.item_id)
        .bind(ing.quantity)
        .bind(&ing.unit)
        .bind(ing.is_optional)
        .bind(&ing.notes)
        .execute(&mut **tx)
        .await
        .map_err(db_err("recipe_ingredient"))?;
    }
    for ut in &composition.utensils {
        sqlx::query(
            r#"
            INSERT INTO recipe_utensils (id, recipe_id, item_id, is_optional, notes)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipe_id)
        .bind(ut.item_id)
        .bind(ut.is_optional)
        .bind(&ut.notes)
        .execute(&mut **tx)
        .await
        .map_err(db_err("recipe_utensil"))?;
    }
    Ok(())
}

/// Insert a recipe with all its ingredient and utensil lines atomically.
#[instrument(skip(db, new), fields(title = %new.title))]
pub async fn create(db: &PgPool, new: NewRecipe) -> DataResult<RecipeWithComposition> {
    let new = new.validated()?;
    let mut tx = db.begin().await.map_err(db_err("recipe"))?;

    if let Some(log_id) = new.ai_request_log_id {
        let status = sqlx::query_scalar::<_, AiRequestStatus>(
            "SELECT status FROM ai_request_logs WHERE id = $1",
        )
        .bind(log_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("recipe"))?
        .ok_or_else(|| DataError::not_found("ai_request_log", log_id))?;
        if status != AiRequestStatus::Success {
            return Err(DataError::inconsistent(
                "recipe",
                format!("AI request {log_id} did not succeed and cannot source a recipe"),
            ));
        }
    }

    check_composition_items(&mut tx, &new.composition).await?;

    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        INSERT INTO recipes (id, title, description, instructions, cuisine_type, meal_type,
                             prep_time, cook_time, servings, estimated_cost, dietary_tags,
                             source, image_url, ai_request_log_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id, title, description, instructions, cuisine_type, meal_type, prep_time,
                  cook_time, servings, estimated_cost, dietary_tags, source, image_url,
                  ai_request_log_id, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.instructions)
    .bind(&new.cuisine_type)
    .bind(new.meal_type)
    .bind(new.prep_time)
    .bind(new.cook_time)
    .bind(new.servings)
    .bind(new.estimated_cost)
    .bind(&new.dietary_tags)
    .bind(new.source)
    .bind(&new.image_url)
    .bind(new.ai_request_log_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err("recipe"))?;

    insert_composition(&mut tx, recipe.id, &new.composition).await?;
    let ingredients = ingredients_for(&mut *tx, &[recipe.id]).await?;
    let utensils = utensils_for(&mut *tx, recipe.id).await?;
    tx.commit().await.map_err(db_err("recipe"))?;

    info!(recipe_id = %recipe.id, source = ?recipe.source, ingredients = ingredients.len(), "recipe created");
    Ok(RecipeWithComposition {
        recipe,
        ingredients,
        utensils,
    })
}

pub async fn get<'e, E>(exec: E, id: Uuid) -> DataResult<Recipe>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, title, description, instructions, cuisine_type, meal_type, prep_time,
               cook_time, servings, estimated_cost, dietary_tags, source, image_url,
               ai_request_log_id, created_at, updated_at
        FROM recipes
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
    .map_err(db_err("recipe"))?
    .ok_or_else(|| DataError::not_found("recipe", id))
}

pub(crate) async fn get_many<'e, E>(exec: E, ids: &[Uuid]) -> DataResult<Vec<Recipe>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, title, description, instructions, cuisine_type, meal_type, prep_time,
               cook_time, servings, estimated_cost, dietary_tags, source, image_url,
               ai_request_log_id, created_at, updated_at
        FROM recipes
        WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(exec)
    .await
    .map_err(db_err("recipe"))?;
    Ok(rows)
}

pub(crate) async fn ingredients_for<'e, E>(exec: E, recipe_ids: &[Uuid]) -> DataResult<Vec<RecipeIngredient>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, RecipeIngredient>(
        r#"
        SELECT id, recipe_id, item_id, quantity, unit, is_optional, notes, created_at, updated_at
        FROM recipe_ingredients
        WHERE recipe_id = ANY($1)
        ORDER BY recipe_id, created_at, id
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(exec)
    .await
    .map_err(db_err("recipe_ingredient"))?;
    Ok(rows)
}

async fn utensils_for<'e, E>(exec: E, recipe_id: Uuid) -> DataResult<Vec<RecipeUtensil>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, RecipeUtensil>(
        r#"
        SELECT id, recipe_id, item_id, is_optional, notes, created_at, updated_at
        FROM recipe_utensils
        WHERE recipe_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(exec)
    .await
    .map_err(db_err("recipe_utensil"))?;
    Ok(rows)
}

pub async fn get_with_composition(db: &PgPool, id: Uuid) -> DataResult<RecipeWithComposition> {
    let recipe = get(db, id).await?;
    let ingredients = ingredients_for(db, &[id]).await?;
    let utensils = utensils_for(db, id).await?;
    Ok(RecipeWithComposition {
        recipe,
        ingredients,
        utensils,
    })
}

#[instrument(skip(db))]
pub async fn list(db: &PgPool, filter: &RecipeFilter) -> DataResult<Vec<Recipe>> {
    let tag = filter.dietary_tag.as_deref().map(normalize_text);
    let title = filter
        .title_contains
        .as_deref()
        .map(|t| format!("%{}%", t.trim()));
    let rows = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, title, description, instructions, cuisine_type, meal_type, prep_time,
               cook_time, servings, estimated_cost, dietary_tags, source, image_url,
               ai_request_log_id, created_at, updated_at
        FROM recipes
        WHERE ($1::meal_type IS NULL OR meal_type = $1)
          AND ($2::recipe_source IS NULL OR source = $2)
          AND ($3::text IS NULL OR $3 = ANY(dietary_tags))
          AND ($4::text IS NULL OR title ILIKE $4)
        ORDER BY title, id
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(filter.meal_type)
    .bind(filter.source)
    .bind(tag)
    .bind(title)
    .bind(filter.limit.clamp(1, 200))
    .bind(filter.offset.max(0))
    .fetch_all(db)
    .await
    .map_err(db_err("recipe"))?;
    Ok(rows)
}

/// Edit recipe metadata.
///
/// `servings` is the base every ingredient quantity is scaled from, so it is
/// frozen together with the composition once the recipe is referenced.
#[instrument(skip(db, update))]
pub async fn update_details(db: &PgPool, id: Uuid, update: RecipeDetailsUpdate) -> DataResult<Recipe> {
    let update = update.validated()?;
    let mut tx = db.begin().await.map_err(db_err("recipe"))?;

    let current = lock_recipe(&mut tx, id).await?;
    if update.servings.is_some_and(|s| s != current.servings) && is_referenced(&mut *tx, id).await? {
        return Err(DataError::RecipeInUse { recipe_id: id });
    }

    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        UPDATE recipes
           SET title = COALESCE($2, title),
               description = COALESCE($3, description),
               instructions = COALESCE($4, instructions),
               cuisine_type = COALESCE($5, cuisine_type),
               meal_type = COALESCE($6, meal_type),
               prep_time = COALESCE($7, prep_time),
               cook_time = COALESCE($8, cook_time),
               servings = COALESCE($9, servings),
               estimated_cost = COALESCE($10, estimated_cost),
               dietary_tags = COALESCE($11, dietary_tags),
               image_url = COALESCE($12, image_url)
         WHERE id = $1
        RETURNING id, title, description, instructions, cuisine_type, meal_type, prep_time,
                  cook_time, servings, estimated_cost, dietary_tags, source, image_url,
                  ai_request_log_id, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(update.title)
    .bind(update.description)
    .bind(update.instructions)
    .bind(update.cuisine_type)
    .bind(update.meal_type)
    .bind(update.prep_time)
    .bind(update.cook_time)
    .bind(update.servings)
    .bind(update.estimated_cost)
    .bind(update.dietary_tags)
    .bind(update.image_url)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err("recipe"))?;
    tx.commit().await.map_err(db_err("recipe"))?;

    debug!(recipe_id = %recipe.id, "recipe details updated");
    Ok(recipe)
}

async fn lock_recipe(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> DataResult<Recipe> {
    sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, title, description, instructions, cuisine_type, meal_type, prep_time,
               cook_time, servings, estimated_cost, dietary_tags, source, image_url,
               ai_request_log_id, created_at, updated_at
        FROM recipes
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err("recipe"))?
    .ok_or_else(|| DataError::not_found("recipe", id))
}

/// Whether history rows or meal-plan entries point at the recipe.
pub(crate) async fn is_referenced<'e, E>(exec: E, id: Uuid) -> DataResult<bool>
where
    E: sqlx::PgExecutor<'e>,
{
    let referenced = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (SELECT 1 FROM user_recipe_history WHERE recipe_id = $1)
            OR EXISTS (SELECT 1 FROM meal_plan_entries WHERE recipe_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(exec)
    .await
    .map_err(db_err("recipe"))?;
    Ok(referenced)
}

/// Swap the whole ingredient/utensil list of a recipe nobody has used yet.
///
/// Once history or a meal plan references the recipe its composition is
/// frozen; callers create a new recipe instead.
#[instrument(skip(db, composition))]
pub async fn replace_composition(
    db: &PgPool,
    id: Uuid,
    composition: Composition,
) -> DataResult<RecipeWithComposition> {
    let composition = composition.validated()?;
    let mut tx = db.begin().await.map_err(db_err("recipe"))?;

    let recipe = lock_recipe(&mut tx, id).await?;

    if is_referenced(&mut *tx, id).await? {
        return Err(DataError::RecipeInUse { recipe_id: id });
    }
    check_composition_items(&mut tx, &composition).await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("recipe_ingredient"))?;
    sqlx::query("DELETE FROM recipe_utensils WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("recipe_utensil"))?;
    insert_composition(&mut tx, id, &composition).await?;

    let ingredients = ingredients_for(&mut *tx, &[id]).await?;
    let utensils = utensils_for(&mut *tx, id).await?;
    tx.commit().await.map_err(db_err("recipe"))?;

    debug!(recipe_id = %id, "recipe composition replaced");
    Ok(RecipeWithComposition {
        recipe,
        ingredients,
        utensils,
    })
}

/// Delete an unused recipe together with its composition lines.
#[instrument(skip(db))]
pub async fn delete(db: &PgPool, id: Uuid) -> DataResult<()> {
    let mut tx = db.begin().await.map_err(db_err("recipe"))?;
    if is_referenced(&mut *tx, id).await? {
        return Err(DataError::RecipeInUse { recipe_id: id });
    }
    let res = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("recipe"))?;
    if res.rows_affected() == 0 {
        return Err(DataError::not_found("recipe", id));
    }
    tx.commit().await.map_err(db_err("recipe"))?;
    info!(recipe_id = %id, "recipe deleted");
    Ok(())
}

/// Recipes produced by a given AI request.
pub async fn list_by_ai_request(db: &PgPool, log_id: Uuid) -> DataResult<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, title, description, instructions, cuisine_type, meal_type, prep_time,
               cook_time, servings, estimated_cost, dietary_tags, source, image_url,
               ai_request_log_id, created_at, updated_at
        FROM recipes
        WHERE ai_request_log_id = $1 AND source = $2
        ORDER BY created_at
        "#,
    )
    .bind(log_id)
    .bind(RecipeSource::AiGenerated)
    .fetch_all(db)
    .await
    .map_err(db_err("recipe"))?;
    Ok(rows)
}
