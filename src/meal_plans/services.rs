use uuid::Uuid;

use super::repo;
use super::repo_types::{MealPlanEntry, NewEntry};
use crate::error::DataResult;
use crate::state::AppState;

/// Add an entry using the configured slot policy.
pub async fn schedule_recipe(
    st: &AppState,
    user_id: Uuid,
    plan_id: Uuid,
    entry: NewEntry,
) -> DataResult<MealPlanEntry> {
    repo::add_entry(
        &st.db,
        user_id,
        plan_id,
        entry,
        st.config.planning.allow_multiple_dishes_per_slot,
    )
    .await
}
