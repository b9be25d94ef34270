//! Date-ranged meal plans and their (date, meal type) entries.

pub mod repo;
pub mod repo_types;
pub mod services;

pub use repo_types::{MealPlan, MealPlanEntry, MealPlanStatus, NewEntry, NewMealPlan};
