use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::generate::{net_of_purchased, shortfalls};
use super::repo;
use super::repo_types::{Estimate, ShoppingListWithItems};
use crate::error::{db_err, DataResult};
use crate::meal_plans;
use crate::pantry::{self, sufficiency::Holding, sufficiency::UnitConversion};
use crate::recipes;

/// Longest title a shopping list can store.
const LIST_TITLE_MAX: usize = 200;

fn list_title(plan_title: &str) -> String {
    format!("Shopping for {plan_title}")
        .chars()
        .take(LIST_TITLE_MAX)
        .collect()
}

/// Build the shopping list for a meal plan.
///
/// Everything happens in one transaction. If the plan already has a list
/// that is not completed, its unpurchased lines are replaced instead of
/// creating a second list, and what was already bought on it is subtracted.
/// Running this again with the same plan and pantry yields the same items.
#[instrument(skip(db, units))]
pub async fn generate_for_plan(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    now: OffsetDateTime,
    units: &dyn UnitConversion,
) -> DataResult<ShoppingListWithItems> {
    let mut tx = db.begin().await.map_err(db_err("shopping_list"))?;

    let plan = meal_plans::repo::lock_plan(&mut tx, user_id, plan_id).await?;
    let entries = meal_plans::repo::list_entries(&mut *tx, plan_id).await?;

    let mut recipe_ids: Vec<Uuid> = entries.iter().map(|e| e.recipe_id).collect();
    recipe_ids.sort_unstable();
    recipe_ids.dedup();
    let plan_recipes = recipes::repo::get_many(&mut *tx, &recipe_ids).await?;
    let ingredients = recipes::repo::ingredients_for(&mut *tx, &recipe_ids).await?;

    let mut item_ids: Vec<Uuid> = ingredients.iter().map(|i| i.item_id).collect();
    item_ids.sort_unstable();
    item_ids.dedup();
    let holdings: Vec<Holding> = pantry::repo::holdings_for_items(&mut *tx, user_id, &item_ids)
        .await?
        .iter()
        .map(Holding::from)
        .collect();

    let mut lines = shortfalls(&entries, &plan_recipes, &ingredients, &holdings, now, units);

    let list = match repo::lock_open_for_plan(&mut tx, user_id, plan_id).await? {
        Some(existing) => {
            repo::clear_unpurchased(&mut tx, existing.id).await?;
            repo::mark_regenerated(&mut tx, existing.id).await?;
            let kept = repo::items_of(&mut *tx, existing.id).await?;
            lines = net_of_purchased(lines, &kept);
            existing
        }
        None => {
            let title = list_title(&plan.title);
            repo::insert_list(&mut tx, user_id, Some(plan_id), Some(&title)).await?
        }
    };
    for line in &lines {
        repo::insert_line(&mut tx, list.id, line).await?;
    }
    let summary = repo::refresh_summary(&mut tx, list.id).await?;
    tx.commit().await.map_err(db_err("shopping_list"))?;

    info!(%plan_id, list_id = %list.id, lines = lines.len(), "shopping list generated");
    Ok(summary)
}

/// Current estimate for a list.
pub async fn estimate(db: &PgPool, user_id: Uuid, list_id: Uuid) -> DataResult<Estimate> {
    Ok(repo::get_with_items(db, user_id, list_id).await?.estimate)
}

#[cfg(test)]
mod services_tests {
    use super::*;

    #[test]
    fn list_title_fits_the_column() {
        assert_eq!(list_title("Week 1"), "Shopping for Week 1");
        let long = list_title(&"é".repeat(200));
        assert_eq!(long.chars().count(), LIST_TITLE_MAX);
        assert!(long.starts_with("Shopping for "));
    }
}
