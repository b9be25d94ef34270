use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo;
use super::sufficiency::{evaluate, Holding, Requirement, SufficiencyReport, UnitConversion};
use crate::error::DataResult;
use crate::recipes;

/// Can the user cook `recipe_id` for `servings` with what is in the pantry right now?
#[instrument(skip(db, units))]
pub async fn check_recipe(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: Uuid,
    servings: Option<i32>,
    now: OffsetDateTime,
    units: &dyn UnitConversion,
) -> DataResult<SufficiencyReport> {
    let recipe = recipes::repo::get(db, recipe_id).await?;
    let factor = match servings {
        Some(s) if s > 0 => f64::from(s) / f64::from(recipe.servings.max(1)),
        _ => 1.0,
    };
    let requirements: Vec<Requirement> = recipes::repo::ingredients_for(db, &[recipe_id])
        .await?
        .into_iter()
        .map(|ing| Requirement {
            item_id: ing.item_id,
            quantity: ing.quantity * factor,
            unit: ing.unit,
            is_optional: ing.is_optional,
        })
        .collect();

    let item_ids: Vec<Uuid> = requirements.iter().map(|r| r.item_id).collect();
    let holdings: Vec<Holding> = repo::holdings_for_items(db, user_id, &item_ids)
        .await?
        .iter()
        .map(Holding::from)
        .collect();

    let report = evaluate(&requirements, &holdings, now, units);
    debug!(%recipe_id, missing = report.missing().count(), "pantry check done");
    Ok(report)
}
