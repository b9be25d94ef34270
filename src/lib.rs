//! Persistence layer for a pantry-driven meal planner.

pub mod ai_log;
pub mod catalog;
pub mod common;
pub mod config;
pub mod error;
pub mod history;
pub mod meal_plans;
pub mod pantry;
pub mod recipes;
pub mod shopping;
pub mod state;
pub mod users;

pub use error::{DataError, DataResult};
pub use state::AppState;
