use anyhow::Context;

use pantry_planner::catalog::{self, InventoryType};
use pantry_planner::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "pantry_planner=debug,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    sqlx::migrate!("./migrations")
        .run(&app_state.db)
        .await
        .context("run migrations")?;
    tracing::info!("schema up to date");

    for kind in [InventoryType::Ingredient, InventoryType::Utensil] {
        let categories = catalog::repo::list_categories(&app_state.db, Some(kind))
            .await
            .with_context(|| format!("list {kind} categories"))?;
        let items = catalog::repo::list_items_by_type(&app_state.db, kind)
            .await
            .with_context(|| format!("list {kind} items"))?;
        tracing::info!(%kind, categories = categories.len(), items = items.len(), "catalog");
    }

    tracing::info!(
        ai_cache_scope = ?app_state.config.ai_cache_scope,
        multiple_dishes_per_slot = app_state.config.planning.allow_multiple_dishes_per_slot,
        "ready"
    );
    Ok(())
}
